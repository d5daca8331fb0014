//! Data that persists across configure runs.
//!
//! Core data is the record of everything decided during the first
//! configure that later runs must agree with: option values, detected
//! compiler identities, and the external dependency cache. It lives in
//! `meson-private/coredata.dat` and is swapped atomically through a
//! `.prev` sibling so an interrupted write never corrupts the record.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigureError, Result};
use crate::util::record::{self, RecordError};

pub const COREDATA_FILE: &str = "coredata.dat";
const COREDATA_MAGIC: &[u8; 8] = b"DRYCORED";
const COREDATA_VERSION: u32 = 1;

/// The kind of a user-settable option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
    String,
    Boolean,
    Combo,
    Integer,
    Array,
}

impl OptionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKind::String => "string",
            OptionKind::Boolean => "boolean",
            OptionKind::Combo => "combo",
            OptionKind::Integer => "integer",
            OptionKind::Array => "array",
        }
    }
}

/// A typed option value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Array(Vec<String>),
}

impl OptionValue {
    pub fn as_display_string(&self) -> String {
        match self {
            OptionValue::String(s) => s.clone(),
            OptionValue::Boolean(b) => b.to_string(),
            OptionValue::Integer(i) => i.to_string(),
            OptionValue::Array(items) => items.join(","),
        }
    }
}

/// One declared option: builtin or from the project option file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserOption {
    pub name: String,
    pub kind: OptionKind,
    pub description: String,
    pub value: OptionValue,
    pub default: OptionValue,
    /// Valid values; only meaningful for combo options.
    pub choices: Vec<String>,
}

impl UserOption {
    /// Parse and set a new value from its command-line string form.
    pub fn set_from_string(&mut self, raw: &str) -> Result<()> {
        let value = match self.kind {
            OptionKind::String => OptionValue::String(raw.to_string()),
            OptionKind::Boolean => match raw {
                "true" => OptionValue::Boolean(true),
                "false" => OptionValue::Boolean(false),
                other => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "option '{}' is boolean, cannot be set to '{}'",
                        self.name, other
                    )));
                }
            },
            OptionKind::Combo => {
                if !self.choices.iter().any(|c| c == raw) {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "option '{}' must be one of [{}], not '{}'",
                        self.name,
                        self.choices.join(", "),
                        raw
                    )));
                }
                OptionValue::String(raw.to_string())
            }
            OptionKind::Integer => OptionValue::Integer(raw.parse::<i64>().map_err(|_| {
                ConfigureError::invalid_arguments(format!(
                    "option '{}' is an integer, cannot be set to '{}'",
                    self.name, raw
                ))
            })?),
            OptionKind::Array => OptionValue::Array(
                raw.split(',')
                    .filter(|s| !s.is_empty())
                    .map(|s| s.trim().to_string())
                    .collect(),
            ),
        };
        self.value = value;
        Ok(())
    }
}

fn string_option(name: &str, description: &str, default: &str) -> UserOption {
    UserOption {
        name: name.to_string(),
        kind: OptionKind::String,
        description: description.to_string(),
        value: OptionValue::String(default.to_string()),
        default: OptionValue::String(default.to_string()),
        choices: Vec::new(),
    }
}

fn bool_option(name: &str, description: &str, default: bool) -> UserOption {
    UserOption {
        name: name.to_string(),
        kind: OptionKind::Boolean,
        description: description.to_string(),
        value: OptionValue::Boolean(default),
        default: OptionValue::Boolean(default),
        choices: Vec::new(),
    }
}

fn combo_option(name: &str, description: &str, choices: &[&str], default: &str) -> UserOption {
    UserOption {
        name: name.to_string(),
        kind: OptionKind::Combo,
        description: description.to_string(),
        value: OptionValue::String(default.to_string()),
        default: OptionValue::String(default.to_string()),
        choices: choices.iter().map(|s| s.to_string()).collect(),
    }
}

/// Names every build type the `buildtype` option accepts.
pub const BUILD_TYPES: &[&str] = &["plain", "debug", "debugoptimized", "release", "minsize"];

/// The fixed builtin option set, in presentation order.
pub fn builtin_options() -> BTreeMap<String, UserOption> {
    let options = [
        combo_option("buildtype", "Build type to use", BUILD_TYPES, "debug"),
        combo_option(
            "warning_level",
            "Compiler warning level to use",
            &["1", "2", "3"],
            "1",
        ),
        bool_option("strip", "Strip targets on install", false),
        bool_option("coverage", "Enable coverage tracking", false),
        combo_option(
            "default_library",
            "Default library type",
            &["shared", "static", "both"],
            "shared",
        ),
        bool_option("unity", "Unity build", false),
        string_option("prefix", "Installation prefix", "/usr/local"),
        string_option("libdir", "Library directory", "lib"),
        string_option("bindir", "Executable directory", "bin"),
        string_option("includedir", "Header file directory", "include"),
        string_option("datadir", "Data file directory", "share"),
        string_option("mandir", "Manual page directory", "share/man"),
        string_option("localedir", "Locale data directory", "share/locale"),
    ];
    options
        .into_iter()
        .map(|o| (o.name.clone(), o))
        .collect()
}

/// True when `name` is reserved for a builtin option.
pub fn is_builtin_option(name: &str) -> bool {
    builtin_options().contains_key(name)
}

/// The identity of a detected compiler, pinned across reconfigures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerIdentity {
    pub language: String,
    pub family: String,
    pub exelist: Vec<String>,
    pub version: String,
}

impl CompilerIdentity {
    pub fn describe(&self) -> String {
        format!("{} ({} {})", self.exelist.join(" "), self.family, self.version)
    }
}

/// Everything that persists over multiple invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreData {
    pub builtin_options: BTreeMap<String, UserOption>,
    pub project_options: BTreeMap<String, UserOption>,
    /// Extra compile arguments per language, e.g. from `c_args`.
    pub compile_args: BTreeMap<String, Vec<String>>,
    /// Extra link arguments per language.
    pub link_args: BTreeMap<String, Vec<String>>,
    /// Detected compilers keyed by language name.
    pub compilers: BTreeMap<String, CompilerIdentity>,
    /// External dependency cache keyed by canonical identifier.
    pub deps: BTreeMap<String, crate::deps::Dependency>,
}

impl Default for CoreData {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreData {
    pub fn new() -> Self {
        CoreData {
            builtin_options: builtin_options(),
            project_options: BTreeMap::new(),
            compile_args: BTreeMap::new(),
            link_args: BTreeMap::new(),
            compilers: BTreeMap::new(),
            deps: BTreeMap::new(),
        }
    }

    /// Look up an option by name, builtins first.
    pub fn option(&self, name: &str) -> Option<&UserOption> {
        self.builtin_options
            .get(name)
            .or_else(|| self.project_options.get(name))
    }

    /// Apply a `-Dname=value` override. The option must already exist,
    /// either as a builtin, a per-language argument array, or an option
    /// declared in the project option file.
    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        if let Some(opt) = self.builtin_options.get_mut(name) {
            return opt.set_from_string(value);
        }
        if let Some(lang) = name.strip_suffix("_link_args") {
            let args = value.split_whitespace().map(|s| s.to_string()).collect();
            self.link_args.insert(lang.to_string(), args);
            return Ok(());
        }
        if let Some(lang) = name.strip_suffix("_args") {
            let args = value.split_whitespace().map(|s| s.to_string()).collect();
            self.compile_args.insert(lang.to_string(), args);
            return Ok(());
        }
        if let Some(opt) = self.project_options.get_mut(name) {
            return opt.set_from_string(value);
        }
        Err(ConfigureError::invalid_arguments(format!(
            "unknown option '{name}'"
        )))
    }

    pub fn builtin_string(&self, name: &str) -> String {
        match self.builtin_options.get(name).map(|o| &o.value) {
            Some(OptionValue::String(s)) => s.clone(),
            other => panic!("builtin option {name} missing or not a string: {other:?}"),
        }
    }

    pub fn builtin_bool(&self, name: &str) -> bool {
        match self.builtin_options.get(name).map(|o| &o.value) {
            Some(OptionValue::Boolean(b)) => *b,
            other => panic!("builtin option {name} missing or not boolean: {other:?}"),
        }
    }

    pub fn buildtype(&self) -> String {
        self.builtin_string("buildtype")
    }

    pub fn coverage(&self) -> bool {
        self.builtin_bool("coverage")
    }

    /// Record a detected compiler. The identity for a language may never
    /// change once recorded; changing compilers requires wiping the build
    /// directory.
    pub fn record_compiler(&mut self, identity: CompilerIdentity) -> Result<()> {
        if let Some(existing) = self.compilers.get(&identity.language) {
            if *existing != identity {
                return Err(ConfigureError::environment(format!(
                    "compiler for language '{}' changed from {} to {}; \
                     wipe the build directory to switch compilers",
                    identity.language,
                    existing.describe(),
                    identity.describe()
                )));
            }
            return Ok(());
        }
        self.compilers.insert(identity.language.clone(), identity);
        Ok(())
    }

    /// Load core data from `meson-private/coredata.dat`.
    pub fn load(path: &Path) -> Result<CoreData> {
        let bytes = fs::read(path).map_err(|e| {
            ConfigureError::environment(format!(
                "could not read core data file {}: {}",
                path.display(),
                e
            ))
        })?;
        record::decode(COREDATA_MAGIC, COREDATA_VERSION, &bytes).map_err(|e| match e {
            RecordError::VersionMismatch { .. } | RecordError::BadMagic => {
                ConfigureError::environment(format!(
                    "{}; the build directory was configured by an incompatible \
                     drydock version, wipe it and configure again",
                    e
                ))
            }
            RecordError::Corrupt(msg) => {
                ConfigureError::environment(format!("core data file is corrupted: {msg}"))
            }
        })
    }

    /// Save core data: serialise to the `.prev` sibling, then rename it
    /// over the live file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = record::encode(COREDATA_MAGIC, COREDATA_VERSION, self)
            .map_err(|e| ConfigureError::internal(format!("could not serialise core data: {e}.")))?;
        let prev = path.with_extension("dat.prev");
        fs::write(&prev, &bytes).map_err(|e| {
            ConfigureError::environment(format!("could not write {}: {}", prev.display(), e))
        })?;
        fs::rename(&prev, path).map_err(|e| {
            ConfigureError::environment(format!(
                "could not rename {} over {}: {}",
                prev.display(),
                path.display(),
                e
            ))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_defaults() {
        let core = CoreData::new();
        assert_eq!(core.buildtype(), "debug");
        assert!(!core.coverage());
        assert_eq!(core.builtin_string("prefix"), "/usr/local");
        assert_eq!(core.builtin_string("mandir"), "share/man");
    }

    #[test]
    fn test_set_option_validates_combo() {
        let mut core = CoreData::new();
        core.set_option("buildtype", "release").unwrap();
        assert_eq!(core.buildtype(), "release");
        assert!(core.set_option("buildtype", "superfast").is_err());
    }

    #[test]
    fn test_set_unknown_option_fails() {
        let mut core = CoreData::new();
        let err = core.set_option("no_such_option", "1").unwrap_err();
        assert!(err.to_string().contains("unknown option"));
    }

    #[test]
    fn test_save_load_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("coredata.dat");
        let mut core = CoreData::new();
        core.set_option("coverage", "true").unwrap();
        let mut zlib = crate::deps::Dependency::found("zlib", Some("1.2.13".to_string()));
        zlib.link_args = vec!["-lz".to_string()];
        core.deps.insert("zlib|static=false".to_string(), zlib);
        core.save(&path).unwrap();
        assert!(!tmp.path().join("coredata.dat.prev").exists());
        let loaded = CoreData::load(&path).unwrap();
        assert!(loaded.coverage());
        assert_eq!(loaded.deps.len(), 1);
    }

    #[test]
    fn test_load_rejects_foreign_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("coredata.dat");
        fs::write(&path, b"not a coredata file at all").unwrap();
        let err = CoreData::load(&path).unwrap_err();
        assert!(err.to_string().contains("wipe"));
    }

    #[test]
    fn test_compiler_identity_is_pinned() {
        let mut core = CoreData::new();
        let gcc = CompilerIdentity {
            language: "c".to_string(),
            family: "gcc".to_string(),
            exelist: vec!["cc".to_string()],
            version: "13.2.0".to_string(),
        };
        core.record_compiler(gcc.clone()).unwrap();
        core.record_compiler(gcc.clone()).unwrap();
        let clang = CompilerIdentity {
            family: "clang".to_string(),
            exelist: vec!["clang".to_string()],
            ..gcc
        };
        let err = core.record_compiler(clang).unwrap_err();
        assert!(err.to_string().contains("wipe the build directory"));
    }
}
