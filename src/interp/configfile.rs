//! `configure_file()` substitution.
//!
//! Two forms are recognised: `@VAR@` anywhere in a line, and a line
//! consisting of `#mesondefine VAR`. Output is written atomically and
//! the destination's timestamp is preserved when its content would not
//! change, so no-op reconfigures do not trigger rebuilds downstream.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use super::value::ConfigValue;
use crate::error::{ConfigureError, Result};

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"@([A-Za-z_][A-Za-z0-9_]*)@").expect("valid regex"))
}

/// Apply substitutions to the whole input text.
pub fn substitute(input: &str, values: &BTreeMap<String, ConfigValue>) -> Result<String> {
    let mut output = String::with_capacity(input.len());
    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        if let Some(rest) = line.trim_start().strip_prefix("#mesondefine") {
            output.push_str(&mesondefine_line(rest, values, line_no)?);
        } else {
            output.push_str(&replace_vars(line, values, line_no)?);
        }
        output.push('\n');
    }
    Ok(output)
}

fn replace_vars(
    line: &str,
    values: &BTreeMap<String, ConfigValue>,
    line_no: usize,
) -> Result<String> {
    let mut result = String::with_capacity(line.len());
    let mut last = 0;
    for caps in var_pattern().captures_iter(line) {
        let whole = caps.get(0).expect("match");
        let name = &caps[1];
        result.push_str(&line[last..whole.start()]);
        let value = values.get(name).ok_or_else(|| {
            ConfigureError::invalid_arguments(format!(
                "line {line_no}: configuration value '{name}' is not defined"
            ))
        })?;
        let text = value.as_substitution_string().ok_or_else(|| {
            ConfigureError::invalid_arguments(format!(
                "line {line_no}: configuration value '{name}' is not a string-like value"
            ))
        })?;
        result.push_str(&text);
        last = whole.end();
    }
    result.push_str(&line[last..]);
    Ok(result)
}

fn mesondefine_line(
    rest: &str,
    values: &BTreeMap<String, ConfigValue>,
    line_no: usize,
) -> Result<String> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    if tokens.len() != 1 {
        return Err(ConfigureError::invalid_arguments(format!(
            "line {line_no}: #mesondefine does not contain exactly two tokens"
        )));
    }
    let name = tokens[0];
    let enabled = match values.get(name) {
        Some(ConfigValue::Bool(b)) => *b,
        None => false,
        Some(_) => {
            return Err(ConfigureError::invalid_arguments(format!(
                "line {line_no}: #mesondefine argument '{name}' is not boolean"
            )));
        }
    };
    if enabled {
        Ok(format!("#define {name}"))
    } else {
        Ok(format!("/* #undef {name} */"))
    }
}

/// Substitute `input_path` into `output_path`. Returns true when the
/// output file changed on disk.
pub fn generate(
    input_path: &Path,
    output_path: &Path,
    values: &BTreeMap<String, ConfigValue>,
) -> Result<bool> {
    let text = std::fs::read_to_string(input_path).map_err(|e| {
        ConfigureError::environment(format!(
            "could not read configure_file input {}: {}",
            input_path.display(),
            e
        ))
    })?;
    let substituted = substitute(&text, values)?;
    crate::util::fs::write_if_changed(output_path, substituted.as_bytes())
        .map_err(|e| ConfigureError::environment(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> BTreeMap<String, ConfigValue> {
        let mut map = BTreeMap::new();
        map.insert("NAME".to_string(), ConfigValue::Str("demo".to_string()));
        map.insert("COUNT".to_string(), ConfigValue::Int(4));
        map.insert("HAVE_FOO".to_string(), ConfigValue::Bool(true));
        map.insert("HAVE_BAR".to_string(), ConfigValue::Bool(false));
        map
    }

    #[test]
    fn test_var_substitution() {
        let out = substitute("name = \"@NAME@\" (@COUNT@)\n", &values()).unwrap();
        assert_eq!(out, "name = \"demo\" (4)\n");
    }

    #[test]
    fn test_mesondefine_true_and_false() {
        let out = substitute("#mesondefine HAVE_FOO\n#mesondefine HAVE_BAR\n", &values()).unwrap();
        assert_eq!(out, "#define HAVE_FOO\n/* #undef HAVE_BAR */\n");
    }

    #[test]
    fn test_undefined_mesondefine_is_undef() {
        let out = substitute("#mesondefine HAVE_MISSING\n", &values()).unwrap();
        assert_eq!(out, "/* #undef HAVE_MISSING */\n");
    }

    #[test]
    fn test_missing_variable_fails() {
        let err = substitute("x = @NOPE@\n", &values()).unwrap_err();
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn test_boolean_variable_is_not_stringlike() {
        let err = substitute("x = @HAVE_FOO@\n", &values()).unwrap_err();
        assert!(err.to_string().contains("not a string-like"));
    }

    #[test]
    fn test_mesondefine_rejects_non_boolean() {
        let err = substitute("#mesondefine NAME\n", &values()).unwrap_err();
        assert!(err.to_string().contains("not boolean"));
    }

    #[test]
    fn test_mesondefine_token_count() {
        let err = substitute("#mesondefine A B\n", &values()).unwrap_err();
        assert!(err.to_string().contains("exactly two tokens"));
    }
}
