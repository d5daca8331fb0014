//! Builtin functions and handle methods.
//!
//! Functions are dispatched by name from a closed table; handle methods
//! are dispatched on the receiver's value kind. Everything that touches
//! the build model goes through the model's `add_*` mutators.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{info, warn};

use super::configfile;
use super::value::{ExternalProgram, Value};
use super::Interpreter;
use crate::coredata::OptionValue;
use crate::deps::{self, FindKwargs};
use crate::environment::BUILD_FILE_NAME;
use crate::error::{ConfigureError, Result};
use crate::model::{
    BuildTarget, ConfigureFileRecord, DataInstall, GeneratedList, Generator, GeneratorExe,
    HeaderInstall, IncludeDirs, ManInstall, TargetKind, TestEntry,
};
use crate::syntax::Node;
use crate::toolchain::{detect_compiler, detect_static_linker, Language};

impl<'a> Interpreter<'a> {
    pub(crate) fn call_function(
        &mut self,
        node: &Node,
        name: &str,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        match name {
            "project" => self.func_project(node, positional, keywords),
            "message" => self.func_message(node, positional),
            "warning" => self.func_warning(node, positional),
            "error" => self.func_error(node, positional),
            "executable" => {
                self.func_build_target(node, TargetKind::Executable, positional, keywords)
            }
            "static_library" => {
                self.func_build_target(node, TargetKind::StaticLibrary, positional, keywords)
            }
            "shared_library" => {
                self.func_build_target(node, TargetKind::SharedLibrary, positional, keywords)
            }
            "library" => {
                let kind = match self.coredata.builtin_string("default_library").as_str() {
                    "static" => TargetKind::StaticLibrary,
                    _ => TargetKind::SharedLibrary,
                };
                self.func_build_target(node, kind, positional, keywords)
            }
            "custom_target" => self.func_custom_target(node, positional, keywords),
            "run_target" => self.func_run_target(node, positional, keywords),
            "generator" => self.func_generator(node, positional, keywords),
            "dependency" => self.func_dependency(node, positional, keywords),
            "find_program" => self.func_find_program(node, positional, keywords),
            "include_directories" => self.func_include_directories(node, positional),
            "configuration_data" => Ok(Value::ConfigData(Rc::new(RefCell::new(BTreeMap::new())))),
            "configure_file" => self.func_configure_file(node, keywords),
            "subdir" => self.func_subdir(node, positional),
            "subproject" => self.func_subproject(node, positional),
            "test" => self.func_test(node, positional, keywords, false),
            "benchmark" => self.func_test(node, positional, keywords, true),
            "install_headers" => self.func_install_headers(node, positional, keywords),
            "install_man" => self.func_install_man(node, positional),
            "install_data" => self.func_install_data(node, positional, keywords),
            "add_global_arguments" => self.func_add_global_arguments(node, positional, keywords, false),
            "add_global_link_arguments" => {
                self.func_add_global_arguments(node, positional, keywords, true)
            }
            "get_option" => self.func_get_option(node, positional),
            "get_compiler" => self.func_get_compiler(node, positional),
            other => Err(ConfigureError::invalid_code(format!("unknown function '{other}'"))
                .at(self.loc(node))),
        }
    }

    fn func_project(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        if self.project_declared {
            return Err(
                ConfigureError::invalid_code("second call to project()").at(self.loc(node))
            );
        }
        if positional.len() < 2 {
            return Err(ConfigureError::invalid_arguments(
                "project() needs at least the project name and one language",
            )
            .at(self.loc(node)));
        }
        let mut names = Vec::with_capacity(positional.len());
        for value in &positional {
            match value.as_str() {
                Some(s) => names.push(s.to_string()),
                None => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "project() arguments must be strings, not {}",
                        value.type_name()
                    ))
                    .at(self.loc(node)));
                }
            }
        }
        let project_name = names[0].clone();

        if let Some(constraint) = keywords.get("meson_version") {
            let constraint = self.expect_str(node, "meson_version", constraint)?;
            if !deps::version::satisfies(env!("CARGO_PKG_VERSION"), &constraint) {
                return Err(ConfigureError::invalid_code(format!(
                    "project requires build language version {constraint}, \
                     this tool provides {}",
                    env!("CARGO_PKG_VERSION")
                ))
                .at(self.loc(node)));
            }
        }
        if let Some(defaults) = keywords.get("default_options") {
            self.apply_default_options(node, defaults)?;
        }
        let version = match keywords.get("version") {
            Some(v) => self.expect_str(node, "version", v)?,
            None => "undefined".to_string(),
        };
        // The 'license' keyword is accepted and recorded nowhere; it has
        // no effect on the emitted manifest.
        if self.subproject.is_none() {
            self.build.project_name = project_name.clone();
            self.build.project_version = version;
        }
        info!("project name: {project_name}");

        for lang_name in &names[1..] {
            let language = Language::from_user_name(lang_name).ok_or_else(|| {
                ConfigureError::invalid_code(format!("unknown language '{lang_name}'"))
                    .at(self.loc(node))
            })?;
            if self.compiler_for(language).is_some() {
                continue;
            }
            let compiler = detect_compiler(language, self.env)?;
            self.coredata.record_compiler(compiler.identity())?;
            if !self.build.languages.iter().any(|l| l == language.id()) {
                self.build.languages.push(language.id().to_string());
            }
            self.compilers.push(compiler);
        }
        self.project_declared = true;
        self.debug_state();
        Ok(Value::Void)
    }

    fn apply_default_options(&mut self, node: &Node, defaults: &Value) -> Result<()> {
        let entries = match defaults {
            Value::Array(items) => items.clone(),
            single @ Value::Str(_) => vec![single.clone()],
            other => {
                return Err(ConfigureError::invalid_arguments(format!(
                    "default_options must be an array of 'name=value' strings, not {}",
                    other.type_name()
                ))
                .at(self.loc(node)));
            }
        };
        for entry in entries {
            let text = entry.as_str().ok_or_else(|| {
                ConfigureError::invalid_arguments("default_options entries must be strings")
                    .at(self.loc(node))
            })?;
            let (key, value) = text.split_once('=').ok_or_else(|| {
                ConfigureError::invalid_arguments(format!(
                    "malformed default_options entry '{text}', expected 'name=value'"
                ))
                .at(self.loc(node))
            })?;
            // Project defaults never override a value the user changed.
            let at_default = self
                .coredata
                .option(key)
                .map(|o| o.value == o.default)
                .unwrap_or(false);
            if at_default {
                self.coredata.set_option(key, value)?;
            }
        }
        Ok(())
    }

    fn func_message(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let value = positional.first().ok_or_else(|| {
            ConfigureError::invalid_arguments("message() needs an argument").at(self.loc(node))
        })?;
        info!("Message: {}", value.display_string());
        Ok(Value::Void)
    }

    fn func_warning(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let value = positional.first().ok_or_else(|| {
            ConfigureError::invalid_arguments("warning() needs an argument").at(self.loc(node))
        })?;
        warn!("Warning: {}", value.display_string());
        Ok(Value::Void)
    }

    fn func_error(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let text = positional
            .first()
            .map(|v| v.display_string())
            .unwrap_or_else(|| "error() called".to_string());
        Err(ConfigureError::invalid_code(text).at(self.loc(node)))
    }

    fn func_build_target(
        &mut self,
        node: &Node,
        kind: TargetKind,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments(
                    "the first argument must be the target name, a string",
                )
                .at(self.loc(node))
            })?
            .to_string();

        if kind == TargetKind::StaticLibrary && self.static_linker.is_none() {
            *self.static_linker = Some(detect_static_linker(self.env)?);
        }

        let mut target = BuildTarget::new(&name, kind, self.subdir.clone());

        let mut source_values: Vec<Value> = positional[1..].to_vec();
        if let Some(extra) = keywords.get("sources") {
            source_values.push(extra.clone());
        }
        self.collect_sources(node, source_values, &mut target)?;

        for value in self.kw_values(&keywords, "link_with") {
            match value {
                Value::Target(dep_name) => {
                    let dep = self.build.target(&dep_name).ok_or_else(|| {
                        ConfigureError::internal(format!("dangling target handle '{dep_name}'."))
                    })?;
                    if !dep.kind.is_library() {
                        return Err(ConfigureError::invalid_arguments(format!(
                            "link_with target '{dep_name}' is not a library"
                        ))
                        .at(self.loc(node)));
                    }
                    target.dependencies.push(dep_name);
                }
                other => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "link_with needs build targets, not {}",
                        other.type_name()
                    ))
                    .at(self.loc(node)));
                }
            }
        }

        for value in self.kw_values(&keywords, "dependencies") {
            match value {
                Value::Dep(dep) => {
                    if !dep.found {
                        return Err(ConfigureError::invalid_arguments(format!(
                            "target '{name}' uses dependency '{}', which was not found",
                            dep.name
                        ))
                        .at(self.loc(node)));
                    }
                    // Vendored sources contributed by the dependency are
                    // compiled as part of the consuming target.
                    target.sources.extend(dep.sources.iter().cloned());
                    self.attach_precompile_rules(node, &keywords, &dep, &mut target)?;
                    target.external_deps.push(*dep);
                }
                other => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "dependencies needs dependency objects, not {}",
                        other.type_name()
                    ))
                    .at(self.loc(node)));
                }
            }
        }

        for value in self.kw_values(&keywords, "include_directories") {
            match value {
                Value::IncludeDirs(dirs) => target.include_dirs.push(dirs),
                Value::Str(dir) => target.include_dirs.push(IncludeDirs {
                    base: self.subdir.clone(),
                    dirs: vec![dir],
                }),
                other => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "include_directories needs include handles or strings, not {}",
                        other.type_name()
                    ))
                    .at(self.loc(node)));
                }
            }
        }

        for (kwarg, lang) in [("c_args", Language::C), ("cpp_args", Language::Cpp)] {
            let args = self.kw_string_list(node, &keywords, kwarg)?;
            if !args.is_empty() {
                target.extra_args.insert(lang.id().to_string(), args);
            }
        }

        target.pch = self.kw_string_list(node, &keywords, "pch")?;
        for pch in &target.pch {
            if !pch.contains('/') {
                return Err(ConfigureError::invalid_arguments(format!(
                    "precompiled header '{pch}' must live in a subdirectory, \
                     not next to the sources"
                ))
                .at(self.loc(node)));
            }
        }

        target.install = self.kw_bool(node, &keywords, "install", false)?;
        target.install_dir = self.kw_str_opt(node, &keywords, "install_dir")?;

        if let Some(soversion) = keywords.get("soversion") {
            if kind != TargetKind::SharedLibrary {
                return Err(ConfigureError::invalid_arguments(
                    "soversion is only valid for shared libraries",
                )
                .at(self.loc(node)));
            }
            target.soversion = Some(match soversion {
                Value::Str(s) => s.clone(),
                Value::Int(i) => i.to_string(),
                other => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "soversion must be a string or integer, not {}",
                        other.type_name()
                    ))
                    .at(self.loc(node)));
                }
            });
        }

        if target.sources.is_empty() && target.generated.is_empty() {
            return Err(ConfigureError::invalid_arguments(format!(
                "target '{name}' has no source files"
            ))
            .at(self.loc(node)));
        }

        target.assign_filename(self.env);
        let generated_outputs: Vec<String> = target
            .generated
            .iter()
            .flat_map(|g| g.outputs.iter())
            .map(|o| format!("{}/{}", target.private_dir(), o))
            .collect();
        let loc = self.loc(node);
        self.build
            .add_target(target)
            .map_err(|e| e.at(loc.clone()))?;
        self.build
            .register_generator_result(&name, &generated_outputs)
            .map_err(|e| e.at(loc))?;
        info!("creating build target '{name}'");
        Ok(Value::Target(name))
    }

    fn collect_sources(
        &mut self,
        node: &Node,
        values: Vec<Value>,
        target: &mut BuildTarget,
    ) -> Result<()> {
        for value in values {
            match value {
                Value::Str(s) => target.sources.push(s),
                Value::Array(items) => self.collect_sources(node, items, target)?,
                Value::GeneratedList(list) => target.generated.push(*list),
                other => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "source arguments must be file names or generated lists, not {}",
                        other.type_name()
                    ))
                    .at(self.loc(node)));
                }
            }
        }
        Ok(())
    }

    /// Hook a dependency's published pre-compile rules (e.g. Qt moc) up
    /// to the source lists named by their keywords.
    fn attach_precompile_rules(
        &mut self,
        node: &Node,
        keywords: &BTreeMap<String, Value>,
        dep: &deps::Dependency,
        target: &mut BuildTarget,
    ) -> Result<()> {
        for rule in &dep.precompile_rules {
            let inputs = self.kw_string_list(node, keywords, &rule.src_keyword)?;
            if inputs.is_empty() {
                continue;
            }
            let generator = Generator {
                exe: GeneratorExe::Program(rule.cmd_list[0].clone()),
                arguments: rule.cmd_list[1..]
                    .iter()
                    .map(|a| a.replace("@INFILE@", "@INPUT@").replace("@OUTFILE@", "@OUTPUT@"))
                    .collect(),
                outputs: vec![rule.name_template.clone()],
            };
            target.generated.push(GeneratedList::new(generator, inputs));
        }
        Ok(())
    }

    fn func_custom_target(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments("custom_target() needs a name").at(self.loc(node))
            })?
            .to_string();
        let mut target = BuildTarget::new(&name, TargetKind::CustomTarget, self.subdir.clone());

        target.outputs = self.kw_string_list(node, &keywords, "output")?;
        if target.outputs.is_empty() {
            return Err(ConfigureError::invalid_arguments(format!(
                "custom_target '{name}' must declare its outputs"
            ))
            .at(self.loc(node)));
        }
        target.sources = self.kw_string_list(node, &keywords, "input")?;

        let command_values = self.kw_values(&keywords, "command");
        if command_values.is_empty() {
            return Err(ConfigureError::invalid_arguments(format!(
                "custom_target '{name}' needs a command"
            ))
            .at(self.loc(node)));
        }
        for value in command_values {
            match value {
                Value::Str(s) => target.command.push(s),
                Value::Program(p) => {
                    let path = p.path.as_ref().ok_or_else(|| {
                        ConfigureError::invalid_arguments(format!(
                            "custom_target '{name}' command uses program '{}', \
                             which was not found",
                            p.name
                        ))
                        .at(self.loc(node))
                    })?;
                    target.command.push(path.display().to_string());
                }
                Value::Target(dep_name) => {
                    let dep = self.build.target(&dep_name).ok_or_else(|| {
                        ConfigureError::internal(format!("dangling target handle '{dep_name}'."))
                    })?;
                    target.command.push(dep.output_path());
                    target.dependencies.push(dep_name);
                }
                other => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "custom_target command entries must be strings, programs, \
                         or targets, not {}",
                        other.type_name()
                    ))
                    .at(self.loc(node)));
                }
            }
        }

        target.install = self.kw_bool(node, &keywords, "install", false)?;
        target.install_dir = self.kw_str_opt(node, &keywords, "install_dir")?;
        target.assign_filename(self.env);

        let qualified: Vec<String> = target
            .outputs
            .iter()
            .map(|o| {
                if self.subdir.is_empty() {
                    o.clone()
                } else {
                    format!("{}/{}", self.subdir, o)
                }
            })
            .collect();
        let loc = self.loc(node);
        self.build.add_target(target).map_err(|e| e.at(loc.clone()))?;
        self.build
            .register_generator_result(&name, &qualified)
            .map_err(|e| e.at(loc))?;
        Ok(Value::Target(name))
    }

    fn func_run_target(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments("run_target() needs a name").at(self.loc(node))
            })?
            .to_string();
        let mut target = BuildTarget::new(&name, TargetKind::RunTarget, self.subdir.clone());
        target.command = self.kw_string_list(node, &keywords, "command")?;
        if target.command.is_empty() {
            return Err(ConfigureError::invalid_arguments(format!(
                "run_target '{name}' needs a command"
            ))
            .at(self.loc(node)));
        }
        let loc = self.loc(node);
        self.build.add_target(target).map_err(|e| e.at(loc))?;
        Ok(Value::Target(name))
    }

    fn func_generator(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let exe = match positional.first() {
            Some(Value::Program(p)) => {
                let path = p.path.as_ref().ok_or_else(|| {
                    ConfigureError::invalid_arguments(format!(
                        "generator program '{}' was not found",
                        p.name
                    ))
                    .at(self.loc(node))
                })?;
                GeneratorExe::Program(path.display().to_string())
            }
            Some(Value::Target(name)) => GeneratorExe::Target(name.clone()),
            Some(Value::Str(path)) => GeneratorExe::Program(path.clone()),
            _ => {
                return Err(ConfigureError::invalid_arguments(
                    "generator() needs a program or build target",
                )
                .at(self.loc(node)));
            }
        };
        let arguments = self.kw_string_list(node, &keywords, "arguments")?;
        let outputs = self.kw_string_list(node, &keywords, "output")?;
        if outputs.is_empty() {
            return Err(
                ConfigureError::invalid_arguments("generator() needs an output template")
                    .at(self.loc(node)),
            );
        }
        for template in &outputs {
            if !template.contains("@BASENAME@") && !template.contains("@PLAINNAME@") {
                return Err(ConfigureError::invalid_arguments(format!(
                    "generator output '{template}' must contain @BASENAME@ or @PLAINNAME@"
                ))
                .at(self.loc(node)));
            }
        }
        Ok(Value::Generator(Box::new(Generator {
            exe,
            arguments,
            outputs,
        })))
    }

    fn func_dependency(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments("dependency() needs a name").at(self.loc(node))
            })?
            .to_string();

        let mut kwargs = FindKwargs {
            required: self.kw_bool(node, &keywords, "required", true)?,
            version: self.kw_string_list(node, &keywords, "version")?,
            modules: self.kw_string_list(node, &keywords, "modules")?,
            static_link: self.kw_bool(node, &keywords, "static", false)?,
            native: self.kw_bool(node, &keywords, "native", false)?,
            fallback: None,
        };
        if keywords.contains_key("fallback") {
            let parts = self.kw_string_list(node, &keywords, "fallback")?;
            if parts.len() != 2 {
                return Err(ConfigureError::invalid_arguments(
                    "fallback must be [subproject_name, variable_name]",
                )
                .at(self.loc(node)));
            }
            kwargs.fallback = Some((parts[0].clone(), parts[1].clone()));
        }

        // With a fallback the primary lookup is never fatal.
        let mut primary = kwargs.clone();
        primary.required = kwargs.required && kwargs.fallback.is_none();
        let dep = deps::find_external_dependency(&name, &primary, self.env, self.coredata)
            .map_err(|e| e.or_at(self.loc(node)))?;
        if dep.found {
            return Ok(Value::Dep(Box::new(dep)));
        }

        if let Some((subproject_name, variable)) = kwargs.fallback.clone() {
            let handle = self.do_subproject(node, &subproject_name)?;
            match handle.get(&variable) {
                Some(Value::Dep(sub_dep)) => {
                    let sub_dep = sub_dep.clone();
                    if let (Some(found), false) = (&sub_dep.version, kwargs.version.is_empty()) {
                        if !deps::version::satisfies_all(found, &kwargs.version) {
                            if kwargs.required {
                                return Err(ConfigureError::dependency(format!(
                                    "required dependency '{name}' not found (subproject \
                                     '{subproject_name}' provides version {found}, need [{}])",
                                    kwargs.version.join(", ")
                                ))
                                .at(self.loc(node)));
                            }
                            return Ok(Value::Dep(Box::new(deps::Dependency::not_found(name))));
                        }
                    }
                    return Ok(Value::Dep(sub_dep));
                }
                Some(other) => {
                    return Err(ConfigureError::invalid_code(format!(
                        "fallback variable '{variable}' of subproject \
                         '{subproject_name}' is {}, not a dependency",
                        other.type_name()
                    ))
                    .at(self.loc(node)));
                }
                None => {
                    if kwargs.required {
                        return Err(ConfigureError::dependency(format!(
                            "required dependency '{name}' not found (subproject \
                             '{subproject_name}' does not define '{variable}')"
                        ))
                        .at(self.loc(node)));
                    }
                }
            }
        }
        Ok(Value::Dep(Box::new(dep)))
    }

    fn func_find_program(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments("find_program() needs a program name")
                    .at(self.loc(node))
            })?
            .to_string();
        let required = self.kw_bool(node, &keywords, "required", true)?;

        let path = self
            .env
            .machine_binary(&name, true)
            .and_then(|words| words.into_iter().next().map(PathBuf::from))
            .or_else(|| crate::util::process::find_executable(&name));
        if path.is_none() && required {
            return Err(ConfigureError::dependency(format!(
                "required program '{name}' not found in PATH"
            ))
            .at(self.loc(node)));
        }
        info!(
            "program {} found: {}",
            name,
            path.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "NO".to_string())
        );
        Ok(Value::Program(ExternalProgram { name, path }))
    }

    fn func_include_directories(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let mut dirs = Vec::with_capacity(positional.len());
        for value in positional {
            match value.as_str() {
                Some(s) => dirs.push(s.to_string()),
                None => {
                    return Err(ConfigureError::invalid_arguments(
                        "include_directories() arguments must be strings",
                    )
                    .at(self.loc(node)));
                }
            }
        }
        Ok(Value::IncludeDirs(IncludeDirs {
            base: self.subdir.clone(),
            dirs,
        }))
    }

    fn func_configure_file(
        &mut self,
        node: &Node,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let input = self.kw_str(node, &keywords, "input")?;
        let output = self.kw_str(node, &keywords, "output")?;
        let values = match keywords.get("configuration") {
            Some(Value::ConfigData(data)) => data.borrow().clone(),
            Some(other) => {
                return Err(ConfigureError::invalid_arguments(format!(
                    "configuration must be configuration data, not {}",
                    other.type_name()
                ))
                .at(self.loc(node)));
            }
            None => {
                return Err(ConfigureError::invalid_arguments(
                    "configure_file() needs a 'configuration' keyword",
                )
                .at(self.loc(node)));
            }
        };

        let input_path = self.env.source_dir.join(&self.subdir).join(&input);
        let output_dir = self.env.build_dir.join(&self.subdir);
        let output_path = output_dir.join(&output);
        configfile::generate(&input_path, &output_path, &values)
            .map_err(|e| e.or_at(self.loc(node)))?;

        let loc = self.loc(node);
        self.build
            .add_configure_file(ConfigureFileRecord {
                subdir: self.subdir.clone(),
                input: input.clone(),
                output,
            })
            .map_err(|e| e.at(loc))?;
        // The output depends on the input's content: a change must
        // trigger reconfiguration.
        let rel_input = if self.subdir.is_empty() {
            input
        } else {
            format!("{}/{}", self.subdir, input)
        };
        self.build.add_build_def_file(&rel_input);
        Ok(Value::Void)
    }

    fn func_subdir(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments("subdir() needs a directory name")
                    .at(self.loc(node))
            })?
            .to_string();
        let new_subdir = if self.subdir.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", self.subdir, name)
        };
        let dir = self.env.source_dir.join(&new_subdir);
        let canonical = dir.canonicalize().unwrap_or_else(|_| dir.clone());
        self.check_subdir_reentry(canonical, node)?;
        let build_file = dir.join(BUILD_FILE_NAME);
        if !build_file.is_file() {
            return Err(ConfigureError::environment(format!(
                "subdir('{name}') has no {} file",
                BUILD_FILE_NAME
            ))
            .at(self.loc(node)));
        }
        info!("entering subdirectory '{new_subdir}'");
        self.evaluate_subdir_file(&build_file, &new_subdir)?;
        Ok(Value::Void)
    }

    fn func_subproject(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments("subproject() needs a name").at(self.loc(node))
            })?
            .to_string();
        if self.subproject.is_some() {
            return Err(ConfigureError::invalid_code(
                "subprojects cannot contain further subprojects",
            )
            .at(self.loc(node)));
        }
        if !self.subdir.is_empty() {
            return Err(ConfigureError::invalid_code(
                "subprojects may only be entered from the top-level build file",
            )
            .at(self.loc(node)));
        }
        let handle = self.do_subproject(node, &name)?;
        Ok(Value::Subproject(handle))
    }

    pub(crate) fn do_subproject(
        &mut self,
        node: &Node,
        name: &str,
    ) -> Result<super::value::SubprojectHandle> {
        if let Some(handle) = self.subproject_handles.get(name) {
            return Ok(handle.clone());
        }

        let subproject_dir = self.env.source_dir.join("subprojects").join(name);
        let build_file = subproject_dir.join(BUILD_FILE_NAME);
        if !build_file.is_file() {
            let wrap_file = self
                .env
                .source_dir
                .join("subprojects")
                .join(format!("{name}.wrap"));
            let hint = if wrap_file.is_file() {
                format!(
                    "; a wrap file exists at {}, run the wrap tool to download \
                     and unpack the sources",
                    wrap_file.display()
                )
            } else {
                String::new()
            };
            return Err(ConfigureError::dependency(format!(
                "subproject '{name}' has no source directory{hint}"
            ))
            .at(self.loc(node)));
        }

        // Subproject options live under a name-prefixed namespace.
        let option_file = subproject_dir.join(crate::options::OPTION_FILE_NAME);
        if option_file.is_file() {
            for (opt_name, mut option) in crate::options::load_option_file(&option_file)? {
                let qualified = format!("{name}:{opt_name}");
                if !self.coredata.project_options.contains_key(&qualified) {
                    option.name = qualified.clone();
                    self.coredata.project_options.insert(qualified, option);
                }
            }
        }

        info!("configuring subproject '{name}'");
        let saved_variables = self.swap_variables(Interpreter::fresh_variables());
        let saved_visited = self.take_visited_subdirs();
        let saved_subproject = self.subproject.replace(name.to_string());
        let saved_project_declared = std::mem::replace(&mut self.project_declared, false);

        let result =
            self.evaluate_project_file(&build_file, &format!("subprojects/{name}"));

        let exported = self.variables_snapshot();
        self.swap_variables(saved_variables);
        self.restore_visited_subdirs(saved_visited);
        self.subproject = saved_subproject;
        self.project_declared = saved_project_declared;
        result?;

        let handle: super::value::SubprojectHandle = Rc::new(exported);
        self.subproject_handles
            .insert(name.to_string(), handle.clone());
        if !self.build.subprojects.iter().any(|s| s == name) {
            self.build.subprojects.push(name.to_string());
        }
        Ok(handle)
    }

    fn func_test(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
        benchmark: bool,
    ) -> Result<Value> {
        let what = if benchmark { "benchmark" } else { "test" };
        if positional.len() != 2 {
            return Err(ConfigureError::invalid_arguments(format!(
                "{what}() needs a name and an executable"
            ))
            .at(self.loc(node)));
        }
        let name = positional[0]
            .as_str()
            .ok_or_else(|| {
                ConfigureError::invalid_arguments(format!("{what}() name must be a string"))
                    .at(self.loc(node))
            })?
            .to_string();
        let exe_target = match &positional[1] {
            Value::Target(target_name) => {
                let target = self.build.target(target_name).ok_or_else(|| {
                    ConfigureError::internal(format!("dangling target handle '{target_name}'."))
                })?;
                if target.kind != TargetKind::Executable {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "{what}() needs an executable target, '{target_name}' is a {}",
                        target.kind.as_str()
                    ))
                    .at(self.loc(node)));
                }
                target_name.clone()
            }
            other => {
                return Err(ConfigureError::invalid_arguments(format!(
                    "{what}() needs an executable target, not {}",
                    other.type_name()
                ))
                .at(self.loc(node)));
            }
        };

        let mut env_pairs = Vec::new();
        for entry in self.kw_string_list(node, &keywords, "env")? {
            match entry.split_once('=') {
                Some((k, v)) => env_pairs.push((k.to_string(), v.to_string())),
                None => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "env entry '{entry}' is not of the form NAME=value"
                    ))
                    .at(self.loc(node)));
                }
            }
        }

        let timeout = match keywords.get("timeout") {
            Some(Value::Int(t)) if *t > 0 => *t as u64,
            Some(Value::Int(_)) => {
                return Err(ConfigureError::invalid_arguments(
                    "timeout must be a positive number of seconds",
                )
                .at(self.loc(node)));
            }
            Some(other) => {
                return Err(ConfigureError::invalid_arguments(format!(
                    "timeout must be an integer, not {}",
                    other.type_name()
                ))
                .at(self.loc(node)));
            }
            None => 30,
        };

        let entry = TestEntry {
            name: name.clone(),
            exe_target,
            args: self.kw_string_list(node, &keywords, "args")?,
            env: env_pairs,
            workdir: self.kw_str_opt(node, &keywords, "workdir")?,
            timeout_secs: timeout,
            suites: self.kw_string_list(node, &keywords, "suite")?,
            is_parallel: self.kw_bool(node, &keywords, "is_parallel", true)?,
            is_cross: self.env.is_cross(),
            exe_wrapper: self.env.exe_wrapper(),
        };
        let loc = self.loc(node);
        let result = if benchmark {
            self.build.add_benchmark(entry)
        } else {
            self.build.add_test(entry)
        };
        result.map_err(|e| e.at(loc))?;
        info!("adding {what} '{name}'");
        Ok(Value::Void)
    }

    fn func_install_headers(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let sources = self.positional_strings(node, positional)?;
        let subdir = self
            .kw_str_opt(node, &keywords, "subdir")?
            .unwrap_or_default();
        let loc = self.loc(node);
        self.build
            .add_header_install(HeaderInstall {
                subdir,
                sources,
                source_subdir: self.subdir.clone(),
            })
            .map_err(|e| e.at(loc))?;
        Ok(Value::Void)
    }

    fn func_install_man(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let sources = self.positional_strings(node, positional)?;
        let loc = self.loc(node);
        self.build
            .add_man_install(ManInstall {
                sources,
                source_subdir: self.subdir.clone(),
            })
            .map_err(|e| e.at(loc))?;
        Ok(Value::Void)
    }

    fn func_install_data(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        let sources = self.positional_strings(node, positional)?;
        let subdir = self
            .kw_str_opt(node, &keywords, "install_dir")?
            .unwrap_or_default();
        let loc = self.loc(node);
        self.build
            .add_data_install(DataInstall {
                subdir,
                sources,
                source_subdir: self.subdir.clone(),
            })
            .map_err(|e| e.at(loc))?;
        Ok(Value::Void)
    }

    fn func_add_global_arguments(
        &mut self,
        node: &Node,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
        link: bool,
    ) -> Result<Value> {
        if self.build.has_targets() {
            return Err(ConfigureError::invalid_code(
                "global arguments must be added before any target is defined",
            )
            .at(self.loc(node)));
        }
        let args = self.positional_strings(node, positional)?;
        let languages = self.kw_string_list(node, &keywords, "language")?;
        if languages.is_empty() {
            return Err(ConfigureError::invalid_arguments(
                "the 'language' keyword is required",
            )
            .at(self.loc(node)));
        }
        for lang_name in languages {
            let language = Language::from_user_name(&lang_name).ok_or_else(|| {
                ConfigureError::invalid_code(format!("unknown language '{lang_name}'"))
                    .at(self.loc(node))
            })?;
            let table = if link {
                &mut self.build.global_link_args
            } else {
                &mut self.build.global_args
            };
            table
                .entry(language.id().to_string())
                .or_default()
                .extend(args.iter().cloned());
        }
        Ok(Value::Void)
    }

    fn func_get_option(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments("get_option() needs an option name")
                    .at(self.loc(node))
            })?
            .to_string();
        // Inside a subproject, its own namespaced options win.
        let option = self
            .subproject
            .as_ref()
            .and_then(|sub| self.coredata.project_options.get(&format!("{sub}:{name}")))
            .or_else(|| self.coredata.option(&name))
            .ok_or_else(|| {
                ConfigureError::invalid_arguments(format!("unknown option '{name}'"))
                    .at(self.loc(node))
            })?;
        Ok(option_value_to_value(&option.value))
    }

    fn func_get_compiler(&mut self, node: &Node, positional: Vec<Value>) -> Result<Value> {
        let lang_name = positional
            .first()
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ConfigureError::invalid_arguments("get_compiler() needs a language name")
                    .at(self.loc(node))
            })?
            .to_string();
        let language = Language::from_user_name(&lang_name).ok_or_else(|| {
            ConfigureError::invalid_code(format!("unknown language '{lang_name}'"))
                .at(self.loc(node))
        })?;
        if self.compiler_for(language).is_none() {
            return Err(ConfigureError::invalid_code(format!(
                "no compiler for language '{lang_name}'; list it in project()"
            ))
            .at(self.loc(node)));
        }
        Ok(Value::Compiler(language))
    }

    // ---- keyword helpers -------------------------------------------------

    /// The values of a kwarg that may be a single value or an array.
    fn kw_values(&self, keywords: &BTreeMap<String, Value>, name: &str) -> Vec<Value> {
        match keywords.get(name) {
            Some(Value::Array(items)) => items.clone(),
            Some(single) => vec![single.clone()],
            None => Vec::new(),
        }
    }

    pub(crate) fn kw_bool(
        &self,
        node: &Node,
        keywords: &BTreeMap<String, Value>,
        name: &str,
        default: bool,
    ) -> Result<bool> {
        match keywords.get(name) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(ConfigureError::invalid_arguments(format!(
                "keyword '{name}' must be a boolean, not {}",
                other.type_name()
            ))
            .at(self.loc(node))),
            None => Ok(default),
        }
    }

    pub(crate) fn kw_str(
        &self,
        node: &Node,
        keywords: &BTreeMap<String, Value>,
        name: &str,
    ) -> Result<String> {
        self.kw_str_opt(node, keywords, name)?.ok_or_else(|| {
            ConfigureError::invalid_arguments(format!("the '{name}' keyword is required"))
                .at(self.loc(node))
        })
    }

    pub(crate) fn kw_str_opt(
        &self,
        node: &Node,
        keywords: &BTreeMap<String, Value>,
        name: &str,
    ) -> Result<Option<String>> {
        match keywords.get(name) {
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(other) => Err(ConfigureError::invalid_arguments(format!(
                "keyword '{name}' must be a string, not {}",
                other.type_name()
            ))
            .at(self.loc(node))),
            None => Ok(None),
        }
    }

    /// A kwarg accepting one string or an array of strings.
    pub(crate) fn kw_string_list(
        &self,
        node: &Node,
        keywords: &BTreeMap<String, Value>,
        name: &str,
    ) -> Result<Vec<String>> {
        match keywords.get(name) {
            None => Ok(Vec::new()),
            Some(Value::Str(s)) => Ok(vec![s.clone()]),
            Some(Value::Array(items)) => {
                let mut result = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str() {
                        Some(s) => result.push(s.to_string()),
                        None => {
                            return Err(ConfigureError::invalid_arguments(format!(
                                "keyword '{name}' must contain strings, found {}",
                                item.type_name()
                            ))
                            .at(self.loc(node)));
                        }
                    }
                }
                Ok(result)
            }
            Some(other) => Err(ConfigureError::invalid_arguments(format!(
                "keyword '{name}' must be a string or array of strings, not {}",
                other.type_name()
            ))
            .at(self.loc(node))),
        }
    }

    fn positional_strings(&self, node: &Node, positional: Vec<Value>) -> Result<Vec<String>> {
        let mut result = Vec::with_capacity(positional.len());
        for value in positional {
            match value {
                Value::Str(s) => result.push(s),
                Value::Array(items) => {
                    result.extend(self.positional_strings(node, items)?);
                }
                other => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "expected string arguments, found {}",
                        other.type_name()
                    ))
                    .at(self.loc(node)));
                }
            }
        }
        Ok(result)
    }

    fn expect_str(&self, node: &Node, what: &str, value: &Value) -> Result<String> {
        value.as_str().map(|s| s.to_string()).ok_or_else(|| {
            ConfigureError::invalid_arguments(format!(
                "'{what}' must be a string, not {}",
                value.type_name()
            ))
            .at(self.loc(node))
        })
    }
}

fn option_value_to_value(value: &OptionValue) -> Value {
    match value {
        OptionValue::String(s) => Value::Str(s.clone()),
        OptionValue::Boolean(b) => Value::Bool(*b),
        OptionValue::Integer(i) => Value::Int(*i),
        OptionValue::Array(items) => {
            Value::Array(items.iter().map(|s| Value::Str(s.clone())).collect())
        }
    }
}
