//! Build target definitions.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::deps::Dependency;
use crate::environment::Environment;

/// What kind of artifact a target produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Executable,
    StaticLibrary,
    SharedLibrary,
    CustomTarget,
    RunTarget,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Executable => "executable",
            TargetKind::StaticLibrary => "static_library",
            TargetKind::SharedLibrary => "shared_library",
            TargetKind::CustomTarget => "custom_target",
            TargetKind::RunTarget => "run_target",
        }
    }

    pub fn is_library(&self) -> bool {
        matches!(self, TargetKind::StaticLibrary | TargetKind::SharedLibrary)
    }

    /// Targets that produce linkable or installable files.
    pub fn produces_output(&self) -> bool {
        !matches!(self, TargetKind::RunTarget)
    }
}

/// An executable reference plus argument template. Applying the
/// generator to a source list produces one output per input in the
/// consuming target's private directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    /// Path of the generator program, or the name of a built target used
    /// as the generator.
    pub exe: GeneratorExe,
    /// Argument template; `@INPUT@`, `@OUTPUT@`, `@BASENAME@`, and
    /// `@PLAINNAME@` are substituted per input file.
    pub arguments: Vec<String>,
    /// Output name templates, `@BASENAME@`/`@PLAINNAME@` substituted.
    pub outputs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneratorExe {
    Program(String),
    /// A target in this project; the generator step depends on it.
    Target(String),
}

/// Expand one output template for an input file.
pub fn expand_output_template(template: &str, input: &str) -> String {
    let file_name = Path::new(input)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string());
    let base_name = Path::new(&file_name)
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());
    template
        .replace("@BASENAME@", &base_name)
        .replace("@PLAINNAME@", &file_name)
}

/// A generator applied to a concrete input list. Outputs are declared
/// eagerly so downstream targets can depend on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedList {
    pub generator: Generator,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

impl GeneratedList {
    pub fn new(generator: Generator, inputs: Vec<String>) -> Self {
        let outputs = inputs
            .iter()
            .flat_map(|input| {
                generator
                    .outputs
                    .iter()
                    .map(|t| expand_output_template(t, input))
            })
            .collect();
        GeneratedList {
            generator,
            inputs,
            outputs,
        }
    }
}

/// An include directory group: a base directory (relative to the source
/// root) and subdirectories under it. The backend emits both the
/// source-relative and build-relative form of each entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeDirs {
    pub base: String,
    pub dirs: Vec<String>,
}

/// One build target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTarget {
    pub name: String,
    pub kind: TargetKind,
    /// Subdirectory relative to the source root this target was declared in.
    pub subdir: String,
    pub sources: Vec<String>,
    pub generated: Vec<GeneratedList>,
    /// Names of targets this one links against, in declaration order.
    pub dependencies: Vec<String>,
    pub external_deps: Vec<Dependency>,
    /// Extra compile arguments per language id.
    pub extra_args: BTreeMap<String, Vec<String>>,
    pub include_dirs: Vec<IncludeDirs>,
    pub pch: Vec<String>,
    pub install: bool,
    pub install_dir: Option<String>,
    /// Alias filenames; only shared libraries have them.
    pub aliases: Vec<String>,
    /// Output filename, derived from kind, platform, and soversion.
    pub filename: String,
    pub soversion: Option<String>,
    /// Command line for custom and run targets.
    pub command: Vec<String>,
    /// Declared outputs of a custom target.
    pub outputs: Vec<String>,
}

impl BuildTarget {
    pub fn new(name: impl Into<String>, kind: TargetKind, subdir: impl Into<String>) -> Self {
        BuildTarget {
            name: name.into(),
            kind,
            subdir: subdir.into(),
            sources: Vec::new(),
            generated: Vec::new(),
            dependencies: Vec::new(),
            external_deps: Vec::new(),
            extra_args: BTreeMap::new(),
            include_dirs: Vec::new(),
            pch: Vec::new(),
            install: false,
            install_dir: None,
            aliases: Vec::new(),
            filename: String::new(),
            soversion: None,
            command: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Derive the output filename and alias list for the host platform.
    pub fn assign_filename(&mut self, env: &Environment) {
        match self.kind {
            TargetKind::Executable => {
                let suffix = env.exe_suffix();
                self.filename = if suffix.is_empty() {
                    self.name.clone()
                } else {
                    format!("{}.{}", self.name, suffix)
                };
            }
            TargetKind::StaticLibrary => {
                self.filename = format!(
                    "{}{}.{}",
                    env.static_lib_prefix(),
                    self.name,
                    env.static_lib_suffix()
                );
            }
            TargetKind::SharedLibrary => {
                let prefix = env.shared_lib_prefix();
                let suffix = env.shared_lib_suffix();
                let plain = format!("{prefix}{}.{suffix}", self.name);
                match (&self.soversion, suffix) {
                    (Some(version), "dylib") => {
                        self.filename = format!("{prefix}{}.{version}.dylib", self.name);
                        self.aliases = vec![plain];
                    }
                    (Some(version), "so") => {
                        self.filename = format!("{plain}.{version}");
                        self.aliases = vec![plain];
                    }
                    // PE has no versioned library names.
                    _ => self.filename = plain,
                }
            }
            TargetKind::CustomTarget => {
                self.filename = self.outputs.first().cloned().unwrap_or_default();
            }
            TargetKind::RunTarget => self.filename = String::new(),
        }
    }

    /// The private directory for this target's generated files, relative
    /// to the build root.
    pub fn private_dir(&self) -> String {
        let base = format!("{}.dir", self.name);
        if self.subdir.is_empty() {
            base
        } else {
            format!("{}/{}", self.subdir, base)
        }
    }

    /// Output path relative to the build root.
    pub fn output_path(&self) -> String {
        if self.subdir.is_empty() {
            self.filename.clone()
        } else {
            format!("{}/{}", self.subdir, self.filename)
        }
    }

    pub fn has_pch(&self) -> bool {
        !self.pch.is_empty()
    }

    /// Header files produced by this target's generators.
    pub fn generated_headers(&self) -> Vec<String> {
        self.generated
            .iter()
            .flat_map(|g| g.outputs.iter())
            .filter(|o| crate::toolchain::is_header(Path::new(o)))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linux_env() -> Environment {
        Environment::new("/src", "/build", None, None)
    }

    #[test]
    fn test_executable_filename() {
        let mut t = BuildTarget::new("app", TargetKind::Executable, "");
        t.assign_filename(&linux_env());
        if cfg!(unix) {
            assert_eq!(t.filename, "app");
        }
    }

    #[test]
    fn test_static_library_filename() {
        let mut t = BuildTarget::new("util", TargetKind::StaticLibrary, "sub");
        t.assign_filename(&linux_env());
        assert_eq!(t.filename, "libutil.a");
        assert_eq!(t.output_path(), "sub/libutil.a");
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_shared_library_soversion_and_alias() {
        let mut t = BuildTarget::new("foo", TargetKind::SharedLibrary, "");
        t.soversion = Some("1".to_string());
        t.assign_filename(&linux_env());
        assert_eq!(t.filename, "libfoo.so.1");
        assert_eq!(t.aliases, vec!["libfoo.so".to_string()]);
    }

    #[test]
    fn test_generator_output_expansion() {
        assert_eq!(
            expand_output_template("moc_@BASENAME@.cpp", "widgets/window.h"),
            "moc_window.cpp"
        );
        assert_eq!(
            expand_output_template("@PLAINNAME@.c", "gen/schema.xml"),
            "schema.xml.c"
        );
    }

    #[test]
    fn test_generated_list_outputs_declared_eagerly() {
        let generator = Generator {
            exe: GeneratorExe::Program("/usr/bin/flex".to_string()),
            arguments: vec!["-o".to_string(), "@OUTPUT@".to_string(), "@INPUT@".to_string()],
            outputs: vec!["@BASENAME@.c".to_string()],
        };
        let list = GeneratedList::new(generator, vec!["lexer.l".to_string()]);
        assert_eq!(list.outputs, vec!["lexer.c".to_string()]);
    }

    #[test]
    fn test_generated_headers() {
        let generator = Generator {
            exe: GeneratorExe::Program("gen".to_string()),
            arguments: vec![],
            outputs: vec!["@BASENAME@.h".to_string(), "@BASENAME@.c".to_string()],
        };
        let mut t = BuildTarget::new("x", TargetKind::Executable, "");
        t.generated
            .push(GeneratedList::new(generator, vec!["api.def".to_string()]));
        assert_eq!(t.generated_headers(), vec!["api.h".to_string()]);
    }
}
