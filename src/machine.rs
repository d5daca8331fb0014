//! Machine description files.
//!
//! Cross and native files describe a machine drydock cannot probe on its
//! own: which binaries to use for each language, free-form properties
//! (answers for capability probes that cannot run), and what the host
//! machine looks like. The format is TOML with three tables.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ConfigureError, Result};

/// Description of the machine the produced binaries will run on.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MachineInfo {
    pub system: String,
    pub cpu_family: String,
    #[serde(default)]
    pub cpu: String,
    pub endian: String,
}

/// A parsed machine description file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MachineFile {
    /// Tool overrides keyed by language name (`c`, `cpp`) or tool name
    /// (`ar`, `pkgconfig`, `exe_wrapper`).
    pub binaries: BTreeMap<String, String>,
    /// Free-form probe answers, e.g. `sizeof_int = 4`.
    pub properties: BTreeMap<String, toml::Value>,
    pub host_machine: Option<MachineInfo>,
}

impl MachineFile {
    pub fn load(path: &Path) -> Result<MachineFile> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigureError::environment(format!(
                "could not read machine file {}: {}",
                path.display(),
                e
            ))
        })?;
        toml::from_str(&text).map_err(|e| {
            ConfigureError::environment(format!(
                "malformed machine file {}: {}",
                path.display(),
                e
            ))
        })
    }

    /// The binary configured for a language or tool, split into argv words.
    pub fn binary(&self, name: &str) -> Option<Vec<String>> {
        self.binaries
            .get(name)
            .map(|cmd| cmd.split_whitespace().map(|s| s.to_string()).collect())
    }

    pub fn exe_wrapper(&self) -> Option<Vec<String>> {
        self.binary("exe_wrapper")
    }

    pub fn property_int(&self, key: &str) -> Option<i64> {
        match self.properties.get(key) {
            Some(toml::Value::Integer(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn property_bool(&self, key: &str) -> Option<bool> {
        match self.properties.get(key) {
            Some(toml::Value::Boolean(v)) => Some(*v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const EXAMPLE: &str = r#"
[binaries]
c = "arm-linux-gnueabihf-gcc"
ar = "arm-linux-gnueabihf-ar"
exe_wrapper = "qemu-arm -L /usr/arm-linux-gnueabihf"

[properties]
sizeof_int = 4
has_function_printf = true

[host_machine]
system = "linux"
cpu_family = "arm"
cpu = "armv7hl"
endian = "little"
"#;

    #[test]
    fn test_load_machine_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cross.toml");
        std::fs::write(&path, EXAMPLE).unwrap();
        let machine = MachineFile::load(&path).unwrap();
        assert_eq!(
            machine.binary("c"),
            Some(vec!["arm-linux-gnueabihf-gcc".to_string()])
        );
        assert_eq!(machine.exe_wrapper().unwrap().len(), 3);
        assert_eq!(machine.property_int("sizeof_int"), Some(4));
        assert_eq!(machine.property_bool("has_function_printf"), Some(true));
        assert_eq!(machine.host_machine.unwrap().cpu_family, "arm");
    }

    #[test]
    fn test_malformed_file_is_environment_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cross.toml");
        std::fs::write(&path, "[binaries\nc = ").unwrap();
        let err = MachineFile::load(&path).unwrap_err();
        assert!(err.to_string().contains("malformed machine file"));
    }
}
