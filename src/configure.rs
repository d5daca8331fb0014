//! The configure driver: one call runs the whole pipeline from command
//! line options to manifests on disk.
//!
//! Ordering matters here: the lock is taken first, persisted state is
//! loaded, the option file and `-D` overrides are applied, the
//! interpreter populates the build model, and only then do the backend
//! writers run. Core data is saved last, after everything else
//! succeeded, so a failed run never records state the manifests do not
//! reflect.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::backend::{self, BackendContext};
use crate::coredata::CoreData;
use crate::environment::{BuildDirLock, Environment, BUILD_FILE_NAME};
use crate::error::{ConfigureError, Result};
use crate::interp::Interpreter;
use crate::machine::MachineFile;
use crate::options;
use crate::toolchain::{Compiler, StaticLinker};

/// Options for one `setup` invocation.
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    /// `-Dname=value` overrides, in command-line order.
    pub defines: Vec<(String, String)>,
    pub cross_file: Option<PathBuf>,
    pub native_file: Option<PathBuf>,
    pub backend: String,
    pub reconfigure: bool,
    pub wipe: bool,
    /// Raise the console and log-file level to debug.
    pub verbose: bool,
}

impl SetupOptions {
    pub fn new(source_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
        SetupOptions {
            source_dir: source_dir.into(),
            build_dir: build_dir.into(),
            backend: "ninja".to_string(),
            ..Default::default()
        }
    }
}

/// Parse one `-D` argument of the form `name=value`.
pub fn parse_define(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(ConfigureError::invalid_arguments(format!(
            "malformed option '{raw}', expected -D name=value"
        ))),
    }
}

/// Run a full configure.
pub fn run_setup(opts: &SetupOptions) -> Result<()> {
    if opts.backend != "ninja" {
        return Err(ConfigureError::invalid_arguments(format!(
            "backend '{}' is not supported, only 'ninja' is",
            opts.backend
        )));
    }
    if !opts.source_dir.join(BUILD_FILE_NAME).is_file() {
        return Err(ConfigureError::environment(format!(
            "source directory {} does not contain a {} file",
            opts.source_dir.display(),
            BUILD_FILE_NAME
        )));
    }

    std::fs::create_dir_all(&opts.build_dir)?;

    let mut defines = opts.defines.clone();
    if opts.wipe || opts.reconfigure {
        let recorded = read_cmd_line(&cmd_line_path(&opts.build_dir))?;
        let mut merged = recorded.defines;
        merged.extend(defines);
        defines = merged;
    }
    if opts.wipe {
        crate::util::fs::clear_dir(&opts.build_dir)
            .map_err(|e| ConfigureError::environment(e.to_string()))?;
    }

    crate::util::logging::init(
        &opts.build_dir.join(crate::util::logging::LOG_DIR_NAME),
        opts.verbose,
    )
    .map_err(|e| ConfigureError::environment(e.to_string()))?;
    if opts.wipe {
        info!("wiped build directory {}", opts.build_dir.display());
    }

    let cross_file = opts
        .cross_file
        .as_ref()
        .map(|p| MachineFile::load(p))
        .transpose()?;
    let native_file = opts
        .native_file
        .as_ref()
        .map(|p| MachineFile::load(p))
        .transpose()?;
    let env = Environment::new(&opts.source_dir, &opts.build_dir, cross_file, native_file);

    let _lock = BuildDirLock::acquire(&env.private_dir())?;

    let mut coredata = if env.coredata_path().is_file() {
        CoreData::load(&env.coredata_path())?
    } else {
        CoreData::new()
    };

    apply_option_file(&env, &mut coredata)?;
    for (name, value) in &defines {
        coredata.set_option(name, value)?;
    }

    let mut build = crate::model::Build::new();
    let mut compilers: Vec<Box<dyn Compiler>> = Vec::new();
    let mut static_linker: Option<StaticLinker> = None;
    {
        let mut interp = Interpreter::new(
            &env,
            &mut coredata,
            &mut build,
            &mut compilers,
            &mut static_linker,
        );
        interp.run()?;
    }

    let ctx = BackendContext {
        env: &env,
        coredata: &coredata,
        build: &build,
        compilers: &compilers,
        static_linker: static_linker.as_ref(),
    };
    backend::generate(&ctx)?;

    coredata.save(&env.coredata_path())?;
    write_cmd_line(&env, opts, &defines)?;
    info!("configure finished, build files written to {}", opts.build_dir.display());
    Ok(())
}

/// `configure <builddir>`: change persisted options and re-run the
/// pipeline with them.
pub fn run_configure(
    build_dir: &Path,
    defines: Vec<(String, String)>,
    verbose: bool,
) -> Result<()> {
    let recorded = read_cmd_line(&cmd_line_path(build_dir))?;
    let source_dir = recorded.source_dir.ok_or_else(|| {
        ConfigureError::environment(format!(
            "{} does not record a source directory; run setup first",
            cmd_line_path(build_dir).display()
        ))
    })?;
    let mut opts = SetupOptions::new(source_dir, build_dir);
    opts.defines = defines;
    opts.cross_file = recorded.cross_file;
    opts.native_file = recorded.native_file;
    opts.reconfigure = true;
    opts.verbose = verbose;
    run_setup(&opts)
}

/// Merge the project's option file into core data: new declarations are
/// added, values of re-declared options survive, and options no longer
/// declared anywhere are dropped.
fn apply_option_file(env: &Environment, coredata: &mut CoreData) -> Result<()> {
    let path = env.source_dir.join(options::OPTION_FILE_NAME);
    let declared = if path.is_file() {
        options::load_option_file(&path)?
    } else {
        BTreeMap::new()
    };
    let mut merged = BTreeMap::new();
    for (name, option) in declared {
        match coredata.project_options.get(&name) {
            Some(existing) if existing.kind == option.kind => {
                let mut kept = option;
                kept.value = existing.value.clone();
                merged.insert(name, kept);
            }
            _ => {
                merged.insert(name, option);
            }
        }
    }
    // Subproject options are namespaced with a colon and declared by the
    // subproject's own option file during interpretation.
    for (name, option) in &coredata.project_options {
        if name.contains(':') {
            merged.insert(name.clone(), option.clone());
        }
    }
    coredata.project_options = merged;
    Ok(())
}

fn cmd_line_path(build_dir: &Path) -> PathBuf {
    build_dir
        .join(crate::environment::PRIVATE_DIR_NAME)
        .join(crate::environment::CMD_LINE_FILE)
}

/// The recorded command line of the most recent successful configure.
#[derive(Debug, Default)]
pub struct RecordedCmdLine {
    pub source_dir: Option<PathBuf>,
    pub cross_file: Option<PathBuf>,
    pub native_file: Option<PathBuf>,
    pub defines: Vec<(String, String)>,
}

fn write_cmd_line(
    env: &Environment,
    opts: &SetupOptions,
    defines: &[(String, String)],
) -> Result<()> {
    let mut text = String::new();
    text.push_str(&format!("source_dir = {}\n", env.source_dir.display()));
    if let Some(path) = &opts.cross_file {
        text.push_str(&format!("cross_file = {}\n", path.display()));
    }
    if let Some(path) = &opts.native_file {
        text.push_str(&format!("native_file = {}\n", path.display()));
    }
    for (name, value) in defines {
        text.push_str(&format!("-D{name}={value}\n"));
    }
    crate::util::fs::write_atomic(&env.cmd_line_path(), text.as_bytes())
        .map_err(|e| ConfigureError::environment(e.to_string()))?;
    Ok(())
}

fn read_cmd_line(path: &Path) -> Result<RecordedCmdLine> {
    let mut recorded = RecordedCmdLine::default();
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(_) => {
            return Err(ConfigureError::environment(format!(
                "no previous configure recorded at {}; run setup without \
                 --reconfigure first",
                path.display()
            )));
        }
    };
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("source_dir = ") {
            recorded.source_dir = Some(PathBuf::from(value));
        } else if let Some(value) = line.strip_prefix("cross_file = ") {
            recorded.cross_file = Some(PathBuf::from(value));
        } else if let Some(value) = line.strip_prefix("native_file = ") {
            recorded.native_file = Some(PathBuf::from(value));
        } else if let Some(rest) = line.strip_prefix("-D") {
            recorded.defines.push(parse_define(rest)?);
        }
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define() {
        assert_eq!(
            parse_define("buildtype=release").unwrap(),
            ("buildtype".to_string(), "release".to_string())
        );
        assert!(parse_define("nonsense").is_err());
        assert!(parse_define("=x").is_err());
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let mut opts = SetupOptions::new("/s", "/b");
        opts.backend = "xcode".to_string();
        let err = run_setup(&opts).unwrap_err();
        assert!(err.to_string().contains("only 'ninja'"));
    }

    #[test]
    fn test_option_file_merge_keeps_values_and_prunes_stale_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let source_dir = tmp.path().join("src");
        std::fs::create_dir_all(&source_dir).unwrap();
        std::fs::write(
            source_dir.join(options::OPTION_FILE_NAME),
            "option('kept', type : 'boolean', value : false)\n",
        )
        .unwrap();
        let env = Environment::new(&source_dir, tmp.path().join("build"), None, None);

        let mut coredata = CoreData::new();
        // A previous configure declared 'kept' (user set it to true) and
        // 'stale' (no longer in the option file).
        coredata.project_options.insert(
            "kept".to_string(),
            crate::coredata::UserOption {
                name: "kept".to_string(),
                kind: crate::coredata::OptionKind::Boolean,
                description: String::new(),
                value: crate::coredata::OptionValue::Boolean(true),
                default: crate::coredata::OptionValue::Boolean(false),
                choices: vec![],
            },
        );
        coredata.project_options.insert(
            "stale".to_string(),
            crate::coredata::UserOption {
                name: "stale".to_string(),
                kind: crate::coredata::OptionKind::String,
                description: String::new(),
                value: crate::coredata::OptionValue::String("x".to_string()),
                default: crate::coredata::OptionValue::String("x".to_string()),
                choices: vec![],
            },
        );

        apply_option_file(&env, &mut coredata).unwrap();
        assert!(coredata.project_options.contains_key("kept"));
        assert!(!coredata.project_options.contains_key("stale"));
        assert_eq!(
            coredata.project_options["kept"].value,
            crate::coredata::OptionValue::Boolean(true),
            "user-set value survives redeclaration"
        );
    }
}
