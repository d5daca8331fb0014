//! Project option file loader.
//!
//! `meson_options.txt` is evaluated by a deliberately restricted
//! interpreter: the only construct it accepts is a sequence of
//! `option(...)` calls with literal arguments. Anything else in the file
//! is invalid code.

use std::collections::BTreeMap;
use std::path::Path;

use crate::coredata::{is_builtin_option, OptionKind, OptionValue, UserOption};
use crate::error::{ConfigureError, Location, Result};
use crate::syntax::{self, Node, NodeKind};

pub const OPTION_FILE_NAME: &str = "meson_options.txt";

/// Load and evaluate the option file at `path`.
pub fn load_option_file(path: &Path) -> Result<BTreeMap<String, UserOption>> {
    let src = std::fs::read_to_string(path).map_err(|e| {
        ConfigureError::environment(format!("could not read {}: {}", path.display(), e))
    })?;
    parse_option_file(&src, path)
}

/// Evaluate option file source text.
pub fn parse_option_file(src: &str, file: &Path) -> Result<BTreeMap<String, UserOption>> {
    let root = syntax::parse(src, file)?;
    let statements = match &root.kind {
        NodeKind::CodeBlock(stmts) => stmts,
        _ => {
            return Err(ConfigureError::internal(
                "option file parse did not produce a code block.",
            ))
        }
    };

    let mut options = BTreeMap::new();
    for stmt in statements {
        let loc = location(file, stmt);
        let args = match &stmt.kind {
            NodeKind::FunctionCall { name, args } if name == "option" => args,
            _ => {
                return Err(ConfigureError::invalid_code(
                    "only option() calls are allowed in the option file",
                )
                .at(loc));
            }
        };
        let option = evaluate_option(file, stmt, &args.positional, &args.keywords)?;
        if options.contains_key(&option.name) {
            return Err(ConfigureError::invalid_code(format!(
                "option '{}' is declared twice",
                option.name
            ))
            .at(loc));
        }
        options.insert(option.name.clone(), option);
    }
    Ok(options)
}

fn location(file: &Path, node: &Node) -> Location {
    Location::new(file, node.span.line, node.span.column)
}

fn evaluate_option(
    file: &Path,
    call: &Node,
    positional: &[Node],
    keywords: &[(String, Node)],
) -> Result<UserOption> {
    let loc = location(file, call);
    if positional.len() != 1 {
        return Err(ConfigureError::invalid_arguments(
            "option() requires exactly one positional argument: the option name",
        )
        .at(loc));
    }
    let name = literal_string(file, &positional[0])?;
    validate_name(&name, &loc)?;

    let mut kind = None;
    let mut description = String::new();
    let mut value_node = None;
    let mut choices = Vec::new();
    for (key, node) in keywords {
        match key.as_str() {
            "type" => {
                let type_name = literal_string(file, node)?;
                kind = Some(match type_name.as_str() {
                    "string" => OptionKind::String,
                    "boolean" => OptionKind::Boolean,
                    "combo" => OptionKind::Combo,
                    "integer" => OptionKind::Integer,
                    "array" => OptionKind::Array,
                    other => {
                        return Err(ConfigureError::invalid_arguments(format!(
                            "unknown option type '{other}'"
                        ))
                        .at(location(file, node)));
                    }
                });
            }
            "description" => description = literal_string(file, node)?,
            "value" => value_node = Some(node),
            "choices" => choices = literal_string_array(file, node)?,
            other => {
                return Err(ConfigureError::invalid_arguments(format!(
                    "unknown keyword argument '{other}' to option()"
                ))
                .at(location(file, node)));
            }
        }
    }

    let kind = kind.ok_or_else(|| {
        ConfigureError::invalid_arguments(format!("option '{name}' is missing the 'type' keyword"))
            .at(loc.clone())
    })?;

    let default = match (kind, value_node) {
        (OptionKind::String, Some(n)) => OptionValue::String(literal_string(file, n)?),
        (OptionKind::String, None) => OptionValue::String(String::new()),
        (OptionKind::Boolean, Some(n)) => OptionValue::Boolean(literal_bool(file, n)?),
        (OptionKind::Boolean, None) => OptionValue::Boolean(true),
        (OptionKind::Combo, Some(n)) => {
            let v = literal_string(file, n)?;
            if !choices.iter().any(|c| *c == v) {
                return Err(ConfigureError::invalid_arguments(format!(
                    "default value '{}' of option '{}' is not one of its choices [{}]",
                    v,
                    name,
                    choices.join(", ")
                ))
                .at(loc));
            }
            OptionValue::String(v)
        }
        (OptionKind::Combo, None) => {
            let first = choices.first().cloned().ok_or_else(|| {
                ConfigureError::invalid_arguments(format!(
                    "combo option '{name}' needs a 'choices' keyword"
                ))
                .at(loc.clone())
            })?;
            OptionValue::String(first)
        }
        (OptionKind::Integer, Some(n)) => OptionValue::Integer(literal_int(file, n)?),
        (OptionKind::Integer, None) => OptionValue::Integer(0),
        (OptionKind::Array, Some(n)) => OptionValue::Array(literal_string_array(file, n)?),
        (OptionKind::Array, None) => OptionValue::Array(Vec::new()),
    };

    if kind == OptionKind::Combo && choices.is_empty() {
        return Err(ConfigureError::invalid_arguments(format!(
            "combo option '{name}' needs a 'choices' keyword"
        ))
        .at(loc));
    }

    Ok(UserOption {
        name,
        kind,
        description,
        value: default.clone(),
        default,
        choices,
    })
}

fn validate_name(name: &str, loc: &Location) -> Result<()> {
    let well_formed = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !well_formed {
        return Err(ConfigureError::invalid_arguments(format!(
            "option name '{name}' may only contain letters, digits, underscores, and dashes"
        ))
        .at(loc.clone()));
    }
    if is_builtin_option(name) {
        return Err(ConfigureError::invalid_code(format!(
            "option name '{name}' is reserved for a builtin option"
        ))
        .at(loc.clone()));
    }
    Ok(())
}

fn literal_string(file: &Path, node: &Node) -> Result<String> {
    match &node.kind {
        NodeKind::Str(s) => Ok(s.clone()),
        _ => Err(
            ConfigureError::invalid_arguments("expected a string literal").at(location(file, node))
        ),
    }
}

fn literal_bool(file: &Path, node: &Node) -> Result<bool> {
    match &node.kind {
        NodeKind::Bool(b) => Ok(*b),
        _ => Err(
            ConfigureError::invalid_arguments("expected a boolean literal").at(location(file, node))
        ),
    }
}

fn literal_int(file: &Path, node: &Node) -> Result<i64> {
    match &node.kind {
        NodeKind::Int(i) => Ok(*i),
        _ => Err(
            ConfigureError::invalid_arguments("expected an integer literal").at(location(file, node))
        ),
    }
}

fn literal_string_array(file: &Path, node: &Node) -> Result<Vec<String>> {
    match &node.kind {
        NodeKind::Array(items) => items.iter().map(|n| literal_string(file, n)).collect(),
        _ => Err(
            ConfigureError::invalid_arguments("expected an array of strings").at(location(file, node))
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(src: &str) -> Result<BTreeMap<String, UserOption>> {
        parse_option_file(src, &PathBuf::from("meson_options.txt"))
    }

    #[test]
    fn test_declares_all_types() {
        let opts = parse(concat!(
            "option('with-docs', type : 'boolean', value : false, description : 'Build docs')\n",
            "option('backend_name', type : 'string', value : 'native')\n",
            "option('level', type : 'integer', value : 3)\n",
            "option('mode', type : 'combo', choices : ['fast', 'small'], value : 'small')\n",
            "option('extras', type : 'array', value : ['a', 'b'])\n",
        ))
        .unwrap();
        assert_eq!(opts.len(), 5);
        assert_eq!(opts["with-docs"].value, OptionValue::Boolean(false));
        assert_eq!(opts["level"].value, OptionValue::Integer(3));
        assert_eq!(
            opts["extras"].value,
            OptionValue::Array(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_rejects_non_option_statement() {
        let err = parse("x = 3\n").unwrap_err();
        assert!(err.to_string().contains("only option() calls"));
    }

    #[test]
    fn test_rejects_builtin_name() {
        let err = parse("option('buildtype', type : 'string')\n").unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_rejects_bad_name() {
        let err = parse("option('with docs', type : 'boolean')\n").unwrap_err();
        assert!(err.to_string().contains("may only contain"));
    }

    #[test]
    fn test_combo_default_must_be_choice() {
        let err =
            parse("option('mode', type : 'combo', choices : ['a'], value : 'b')\n").unwrap_err();
        assert!(err.to_string().contains("not one of its choices"));
    }

    #[test]
    fn test_duplicate_declaration() {
        let err = parse(
            "option('x', type : 'boolean')\noption('x', type : 'boolean')\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }
}
