//! The closed value domain of the build description language.
//!
//! Every expression evaluates to one of these kinds. Arithmetic and
//! method dispatch branch on the tag with exhaustive matches; nothing is
//! implicitly truthy and nothing coerces.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use crate::deps::Dependency;
use crate::model::{GeneratedList, Generator, IncludeDirs};
use crate::toolchain::probes::RunResult;
use crate::toolchain::Language;

/// A value stored in a configuration-data handle.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Str(String),
    Bool(bool),
    Int(i64),
}

impl ConfigValue {
    /// The textual form used by `@VAR@` substitution; booleans are not
    /// string-like.
    pub fn as_substitution_string(&self) -> Option<String> {
        match self {
            ConfigValue::Str(s) => Some(s.clone()),
            ConfigValue::Int(i) => Some(i.to_string()),
            ConfigValue::Bool(_) => None,
        }
    }
}

/// Shared, mutable configuration data. Handles copy by reference, the
/// way every other handle kind does.
pub type ConfigData = Rc<RefCell<BTreeMap<String, ConfigValue>>>;

/// An external program located by `find_program()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalProgram {
    pub name: String,
    pub path: Option<PathBuf>,
}

impl ExternalProgram {
    pub fn found(&self) -> bool {
        self.path.is_some()
    }
}

/// Exported variables of an evaluated subproject.
pub type SubprojectHandle = Rc<BTreeMap<String, Value>>;

/// One interpreter value.
#[derive(Debug, Clone)]
pub enum Value {
    /// The void / not-found sentinel: the "result" of statements and
    /// functions that produce nothing.
    Void,
    Bool(bool),
    Int(i64),
    Str(String),
    Array(Vec<Value>),
    Dict(BTreeMap<String, Value>),
    /// Name handle of a target owned by the build model.
    Target(String),
    Dep(Box<Dependency>),
    Program(ExternalProgram),
    Generator(Box<Generator>),
    GeneratedList(Box<GeneratedList>),
    IncludeDirs(IncludeDirs),
    ConfigData(ConfigData),
    Subproject(SubprojectHandle),
    Compiler(Language),
    /// Machine info handle; true selects the host machine, false the
    /// build machine.
    Machine { host: bool },
    RunResult(Box<RunResult>),
}

impl Value {
    /// The user-facing name of this value's kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Void => "void",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Dict(_) => "dictionary",
            Value::Target(_) => "build target",
            Value::Dep(_) => "dependency",
            Value::Program(_) => "external program",
            Value::Generator(_) => "generator",
            Value::GeneratedList(_) => "generated list",
            Value::IncludeDirs(_) => "include directories",
            Value::ConfigData(_) => "configuration data",
            Value::Subproject(_) => "subproject",
            Value::Compiler(_) => "compiler",
            Value::Machine { .. } => "machine",
            Value::RunResult(_) => "run result",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Structural equality where it is defined; `None` when the two
    /// kinds cannot be compared.
    pub fn try_eq(&self, other: &Value) -> Option<bool> {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => Some(a == b),
            (Value::Int(a), Value::Int(b)) => Some(a == b),
            (Value::Str(a), Value::Str(b)) => Some(a == b),
            (Value::Void, Value::Void) => Some(true),
            (Value::Array(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return Some(false);
                }
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.try_eq(y) {
                        Some(true) => continue,
                        Some(false) => return Some(false),
                        None => return None,
                    }
                }
                Some(true)
            }
            _ => None,
        }
    }

    /// Human-readable form used by `message()` and string formatting.
    pub fn display_string(&self) -> String {
        match self {
            Value::Void => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Str(s) => s.clone(),
            Value::Array(items) => {
                let inner: Vec<String> = items.iter().map(|v| v.display_string()).collect();
                format!("[{}]", inner.join(", "))
            }
            Value::Dict(map) => {
                let inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("{k}: {}", v.display_string()))
                    .collect();
                format!("{{{}}}", inner.join(", "))
            }
            Value::Target(name) => name.clone(),
            Value::Dep(dep) => dep.name.clone(),
            Value::Program(prog) => prog.name.clone(),
            other => other.type_name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_eq_same_kind() {
        assert_eq!(Value::Int(3).try_eq(&Value::Int(3)), Some(true));
        assert_eq!(
            Value::Str("a".to_string()).try_eq(&Value::Str("b".to_string())),
            Some(false)
        );
    }

    #[test]
    fn test_try_eq_mismatched_kinds() {
        assert_eq!(Value::Int(1).try_eq(&Value::Str("1".to_string())), None);
        assert_eq!(Value::Bool(true).try_eq(&Value::Int(1)), None);
    }

    #[test]
    fn test_array_equality_is_elementwise() {
        let a = Value::Array(vec![Value::Int(1), Value::Str("x".to_string())]);
        let b = Value::Array(vec![Value::Int(1), Value::Str("x".to_string())]);
        assert_eq!(a.try_eq(&b), Some(true));
    }

    #[test]
    fn test_config_value_substitution_strings() {
        assert_eq!(
            ConfigValue::Str("v".to_string()).as_substitution_string(),
            Some("v".to_string())
        );
        assert_eq!(ConfigValue::Int(7).as_substitution_string(), Some("7".to_string()));
        assert_eq!(ConfigValue::Bool(true).as_substitution_string(), None);
    }
}
