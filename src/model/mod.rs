//! The project-wide build model.
//!
//! Every mutation the interpreter performs funnels through the `add_*`
//! methods here, which reject duplicate canonical names and dependency
//! cycles. Targets are owned by one name-keyed container; everything
//! else refers to them by name handle.

pub mod target;

use std::collections::BTreeMap;

use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

pub use target::{
    expand_output_template, BuildTarget, GeneratedList, Generator, GeneratorExe, IncludeDirs,
    TargetKind,
};

use crate::error::{ConfigureError, Result};

/// One registered test or benchmark.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEntry {
    pub name: String,
    /// Name handle of the executable target under test.
    pub exe_target: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub workdir: Option<String>,
    pub timeout_secs: u64,
    pub suites: Vec<String>,
    pub is_parallel: bool,
    pub is_cross: bool,
    pub exe_wrapper: Option<Vec<String>>,
}

/// A group of headers installed into one include subdirectory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInstall {
    pub subdir: String,
    pub sources: Vec<String>,
    /// Source subdir the header paths are relative to.
    pub source_subdir: String,
}

/// Man pages; each source must end in a section digit 1-8.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManInstall {
    pub sources: Vec<String>,
    pub source_subdir: String,
}

/// Data files installed under the data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataInstall {
    pub subdir: String,
    pub sources: Vec<String>,
    pub source_subdir: String,
}

/// Record of one `configure_file()` call, kept for introspection and
/// manifest regeneration dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureFileRecord {
    pub subdir: String,
    pub input: String,
    pub output: String,
}

/// The root build model, rebuilt from scratch by every configure run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Build {
    pub project_name: String,
    pub project_version: String,
    pub languages: Vec<String>,
    targets: BTreeMap<String, BuildTarget>,
    /// Declaration order of target names.
    target_order: Vec<String>,
    pub tests: Vec<TestEntry>,
    pub benchmarks: Vec<TestEntry>,
    pub headers: Vec<HeaderInstall>,
    pub man: Vec<ManInstall>,
    pub data: Vec<DataInstall>,
    pub configure_files: Vec<ConfigureFileRecord>,
    pub subprojects: Vec<String>,
    /// Project-wide compile arguments per language id.
    pub global_args: BTreeMap<String, Vec<String>>,
    /// Project-wide link arguments per language id.
    pub global_link_args: BTreeMap<String, Vec<String>>,
    /// Every build definition file read during configure, source-root
    /// relative; the manifest regeneration statement depends on these.
    pub build_def_files: Vec<String>,
    /// Generated output file -> producing target name.
    generated_outputs: BTreeMap<String, String>,
}

impl Build {
    pub fn new() -> Self {
        Build::default()
    }

    pub fn target(&self, name: &str) -> Option<&BuildTarget> {
        self.targets.get(name)
    }

    pub fn target_names(&self) -> &[String] {
        &self.target_order
    }

    /// Targets in declaration order.
    pub fn targets(&self) -> impl Iterator<Item = &BuildTarget> {
        self.target_order
            .iter()
            .filter_map(move |name| self.targets.get(name))
    }

    pub fn has_targets(&self) -> bool {
        !self.target_order.is_empty()
    }

    /// Add a target. Rejects duplicate names, references to targets not
    /// yet in the model, and dependency cycles.
    pub fn add_target(&mut self, target: BuildTarget) -> Result<()> {
        if self.targets.contains_key(&target.name) {
            return Err(ConfigureError::invalid_code(format!(
                "a target named '{}' already exists",
                target.name
            )));
        }
        for dep in &target.dependencies {
            if !self.targets.contains_key(dep) {
                return Err(ConfigureError::invalid_code(format!(
                    "target '{}' links with '{}', which is not a previously \
                     defined library target",
                    target.name, dep
                )));
            }
        }
        if target.kind == TargetKind::SharedLibrary || target.aliases.is_empty() {
            // Aliases exist only for shared libraries; other kinds never
            // populate the list.
        } else {
            return Err(ConfigureError::internal(format!(
                "non-shared target '{}' carries aliases.",
                target.name
            )));
        }

        self.target_order.push(target.name.clone());
        self.targets.insert(target.name.clone(), target);

        if self.find_cycle().is_some() {
            let name = self.target_order.pop().expect("just pushed");
            let target = self.targets.remove(&name).expect("just inserted");
            return Err(ConfigureError::invalid_code(format!(
                "adding target '{}' would create a dependency cycle",
                target.name
            )));
        }
        Ok(())
    }

    /// Depth-first cycle scan over the target dependency graph.
    fn find_cycle(&self) -> Option<String> {
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        let index: BTreeMap<&str, usize> = self
            .target_order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        for (i, name) in self.target_order.iter().enumerate() {
            graph.add_node(i);
            for dep in &self.targets[name].dependencies {
                if let Some(&j) = index.get(dep.as_str()) {
                    graph.add_edge(i, j, ());
                }
            }
        }
        if petgraph::algo::is_cyclic_directed(&graph) {
            self.target_order.last().cloned()
        } else {
            None
        }
    }

    /// Targets in emission order: dependencies strictly before their
    /// dependents, declaration order otherwise.
    pub fn emission_order(&self) -> Vec<&BuildTarget> {
        let mut emitted: Vec<&BuildTarget> = Vec::new();
        let mut done: BTreeMap<&str, bool> = BTreeMap::new();
        for name in &self.target_order {
            self.emit_after_deps(name, &mut emitted, &mut done);
        }
        emitted
    }

    fn emit_after_deps<'a>(
        &'a self,
        name: &'a str,
        emitted: &mut Vec<&'a BuildTarget>,
        done: &mut BTreeMap<&'a str, bool>,
    ) {
        if done.contains_key(name) {
            return;
        }
        done.insert(name, true);
        let target = &self.targets[name];
        for dep in &target.dependencies {
            self.emit_after_deps(dep, emitted, done);
        }
        emitted.push(target);
    }

    pub fn add_test(&mut self, test: TestEntry) -> Result<()> {
        if self.tests.iter().any(|t| t.name == test.name) {
            return Err(ConfigureError::invalid_code(format!(
                "a test named '{}' already exists",
                test.name
            )));
        }
        self.tests.push(test);
        Ok(())
    }

    pub fn add_benchmark(&mut self, benchmark: TestEntry) -> Result<()> {
        if self.benchmarks.iter().any(|t| t.name == benchmark.name) {
            return Err(ConfigureError::invalid_code(format!(
                "a benchmark named '{}' already exists",
                benchmark.name
            )));
        }
        self.benchmarks.push(benchmark);
        Ok(())
    }

    pub fn add_header_install(&mut self, headers: HeaderInstall) -> Result<()> {
        self.headers.push(headers);
        Ok(())
    }

    pub fn add_man_install(&mut self, man: ManInstall) -> Result<()> {
        for source in &man.sources {
            let section = source.rsplit('.').next().unwrap_or("");
            let valid = section.len() == 1
                && section.chars().all(|c| ('1'..='8').contains(&c));
            if !valid {
                return Err(ConfigureError::invalid_arguments(format!(
                    "man file '{source}' must end in a section number between 1 and 8"
                )));
            }
        }
        self.man.push(man);
        Ok(())
    }

    pub fn add_data_install(&mut self, data: DataInstall) -> Result<()> {
        self.data.push(data);
        Ok(())
    }

    pub fn add_configure_file(&mut self, record: ConfigureFileRecord) -> Result<()> {
        if self
            .configure_files
            .iter()
            .any(|c| c.subdir == record.subdir && c.output == record.output)
        {
            return Err(ConfigureError::invalid_code(format!(
                "configure_file output '{}' is generated twice",
                record.output
            )));
        }
        self.configure_files.push(record);
        Ok(())
    }

    /// Record the declared outputs of a generator application so later
    /// targets can depend on them. Two producers for one output is an
    /// error.
    pub fn register_generator_result(
        &mut self,
        target_name: &str,
        outputs: &[String],
    ) -> Result<()> {
        for output in outputs {
            if let Some(previous) = self.generated_outputs.get(output) {
                return Err(ConfigureError::invalid_code(format!(
                    "generated file '{output}' is produced by both '{previous}' \
                     and '{target_name}'"
                )));
            }
            self.generated_outputs
                .insert(output.clone(), target_name.to_string());
        }
        Ok(())
    }

    pub fn generator_of_output(&self, output: &str) -> Option<&str> {
        self.generated_outputs.get(output).map(|s| s.as_str())
    }

    pub fn add_build_def_file(&mut self, path: &str) {
        if !self.build_def_files.iter().any(|f| f == path) {
            self.build_def_files.push(path.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(name: &str, kind: TargetKind, deps: &[&str]) -> BuildTarget {
        let mut t = BuildTarget::new(name, kind, "");
        t.dependencies = deps.iter().map(|d| d.to_string()).collect();
        t
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let mut build = Build::new();
        build
            .add_target(target("a", TargetKind::Executable, &[]))
            .unwrap();
        let err = build
            .add_target(target("a", TargetKind::Executable, &[]))
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut build = Build::new();
        let err = build
            .add_target(target("app", TargetKind::Executable, &["lib"]))
            .unwrap_err();
        assert!(err.to_string().contains("not a previously defined"));
    }

    #[test]
    fn test_dependencies_already_present_after_add() {
        let mut build = Build::new();
        build
            .add_target(target("lib", TargetKind::StaticLibrary, &[]))
            .unwrap();
        build
            .add_target(target("app", TargetKind::Executable, &["lib"]))
            .unwrap();
        for t in build.targets() {
            for dep in &t.dependencies {
                assert!(build.target(dep).is_some());
            }
        }
    }

    #[test]
    fn test_emission_order_puts_deps_first() {
        let mut build = Build::new();
        build
            .add_target(target("base", TargetKind::StaticLibrary, &[]))
            .unwrap();
        build
            .add_target(target("mid", TargetKind::StaticLibrary, &["base"]))
            .unwrap();
        build
            .add_target(target("app", TargetKind::Executable, &["mid", "base"]))
            .unwrap();
        let order: Vec<&str> = build.emission_order().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(order, vec!["base", "mid", "app"]);
    }

    #[test]
    fn test_man_section_validation() {
        let mut build = Build::new();
        assert!(build
            .add_man_install(ManInstall {
                sources: vec!["tool.1".to_string()],
                source_subdir: String::new(),
            })
            .is_ok());
        assert!(build
            .add_man_install(ManInstall {
                sources: vec!["tool.9".to_string()],
                source_subdir: String::new(),
            })
            .is_err());
        assert!(build
            .add_man_install(ManInstall {
                sources: vec!["tool.txt".to_string()],
                source_subdir: String::new(),
            })
            .is_err());
    }

    #[test]
    fn test_duplicate_generated_output_rejected() {
        let mut build = Build::new();
        build
            .register_generator_result("a", &["gen.h".to_string()])
            .unwrap();
        let err = build
            .register_generator_result("b", &["gen.h".to_string()])
            .unwrap_err();
        assert!(err.to_string().contains("produced by both"));
    }

    #[test]
    fn test_duplicate_test_rejected() {
        let mut build = Build::new();
        let entry = TestEntry {
            name: "smoke".to_string(),
            exe_target: "app".to_string(),
            args: vec![],
            env: vec![],
            workdir: None,
            timeout_secs: 30,
            suites: vec![],
            is_parallel: true,
            is_cross: false,
            exe_wrapper: None,
        };
        build.add_test(entry.clone()).unwrap();
        assert!(build.add_test(entry).is_err());
    }
}
