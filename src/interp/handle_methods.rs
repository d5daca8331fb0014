//! Methods on handle values: compilers, dependencies, targets, programs,
//! configuration data, subprojects, machines, generators, run results.

use std::collections::BTreeMap;

use tracing::info;

use super::value::{ConfigValue, Value};
use super::Interpreter;
use crate::error::{ConfigureError, Result};
use crate::model::GeneratedList;
use crate::syntax::Node;
use crate::toolchain::probes;

pub(crate) fn handle_method(
    interp: &mut Interpreter,
    node: &Node,
    receiver: Value,
    name: &str,
    positional: Vec<Value>,
    keywords: BTreeMap<String, Value>,
) -> Result<Value> {
    match receiver {
        Value::Dep(dep) => dependency_method(interp, node, &dep, name, &positional),
        Value::Program(program) => match name {
            "found" => Ok(Value::Bool(program.found())),
            "path" => match &program.path {
                Some(path) => Ok(Value::Str(path.display().to_string())),
                None => Err(ConfigureError::invalid_code(format!(
                    "program '{}' was not found, it has no path",
                    program.name
                ))
                .at(interp.loc(node))),
            },
            other => Err(interp.unknown_method("external program", other, node)),
        },
        Value::Target(target_name) => target_method(interp, node, &target_name, name, &positional),
        Value::Generator(generator) => match name {
            "process" => {
                let mut inputs = Vec::new();
                collect_strings(interp, node, &positional, &mut inputs)?;
                if inputs.is_empty() {
                    return Err(ConfigureError::invalid_arguments(
                        "process() needs at least one input file",
                    )
                    .at(interp.loc(node)));
                }
                Ok(Value::GeneratedList(Box::new(GeneratedList::new(
                    *generator, inputs,
                ))))
            }
            other => Err(interp.unknown_method("generator", other, node)),
        },
        Value::ConfigData(data) => config_data_method(interp, node, &data, name, &positional),
        Value::Subproject(handle) => match name {
            "get_variable" => {
                let variable = string_arg(interp, node, &positional, 0, "get_variable")?;
                match handle.get(&variable) {
                    Some(value) => Ok(value.clone()),
                    None => match positional.get(1) {
                        Some(fallback) => Ok(fallback.clone()),
                        None => Err(ConfigureError::invalid_code(format!(
                            "subproject does not define a variable '{variable}'"
                        ))
                        .at(interp.loc(node))),
                    },
                }
            }
            other => Err(interp.unknown_method("subproject", other, node)),
        },
        Value::Compiler(language) => {
            compiler_method(interp, node, language, name, &positional, &keywords)
        }
        Value::Machine { host } => {
            let machine = if host {
                interp.env.host_machine()
            } else {
                crate::environment::build_machine_info()
            };
            match name {
                "system" => Ok(Value::Str(machine.system)),
                "cpu_family" => Ok(Value::Str(machine.cpu_family)),
                "cpu" => Ok(Value::Str(machine.cpu)),
                "endian" => Ok(Value::Str(machine.endian)),
                other => Err(interp.unknown_method("machine", other, node)),
            }
        }
        Value::RunResult(result) => match name {
            "returncode" => Ok(Value::Int(result.returncode as i64)),
            "stdout" => Ok(Value::Str(result.stdout.clone())),
            "stderr" => Ok(Value::Str(result.stderr.clone())),
            "compiled" => Ok(Value::Bool(result.compiled)),
            other => Err(interp.unknown_method("run result", other, node)),
        },
        other => Err(ConfigureError::invalid_code(format!(
            "{} values have no method '{name}'",
            other.type_name()
        ))
        .at(interp.loc(node))),
    }
}

fn dependency_method(
    interp: &Interpreter,
    node: &Node,
    dep: &crate::deps::Dependency,
    name: &str,
    positional: &[Value],
) -> Result<Value> {
    match name {
        "found" => Ok(Value::Bool(dep.found)),
        "name" => Ok(Value::Str(dep.name.clone())),
        "version" => Ok(Value::Str(
            dep.version.clone().unwrap_or_else(|| "undefined".to_string()),
        )),
        "get_pkgconfig_variable" => {
            let variable = string_arg(interp, node, positional, 0, "get_pkgconfig_variable")?;
            let binary = crate::deps::pkgconfig::pkg_config_binary(interp.env).ok_or_else(|| {
                ConfigureError::dependency("pkg-config is not available").at(interp.loc(node))
            })?;
            let variable_arg = format!("--variable={variable}");
            let value = crate::util::process::capture_stdout(
                binary,
                &[variable_arg.as_str(), dep.name.as_str()],
            )
            .unwrap_or_default();
            Ok(Value::Str(value))
        }
        other => Err(interp.unknown_method("dependency", other, node)),
    }
}

fn target_method(
    interp: &Interpreter,
    node: &Node,
    target_name: &str,
    name: &str,
    positional: &[Value],
) -> Result<Value> {
    let target = interp.build.target(target_name).ok_or_else(|| {
        ConfigureError::internal(format!("dangling target handle '{target_name}'."))
    })?;
    match name {
        "name" => Ok(Value::Str(target.name.clone())),
        "full_path" => Ok(Value::Str(
            interp
                .env
                .build_dir
                .join(target.output_path())
                .display()
                .to_string(),
        )),
        "extract_objects" => {
            let mut sources = Vec::new();
            collect_strings(interp, node, positional, &mut sources)?;
            let objects = sources
                .into_iter()
                .map(|src| {
                    let file_name = std::path::Path::new(&src)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or(src);
                    Value::Str(format!(
                        "{}/{}.{}",
                        target.private_dir(),
                        file_name,
                        interp.env.object_suffix()
                    ))
                })
                .collect();
            Ok(Value::Array(objects))
        }
        other => Err(interp.unknown_method("build target", other, node)),
    }
}

fn config_data_method(
    interp: &Interpreter,
    node: &Node,
    data: &super::value::ConfigData,
    name: &str,
    positional: &[Value],
) -> Result<Value> {
    match name {
        "set" => {
            let key = string_arg(interp, node, positional, 0, "set")?;
            let value = match positional.get(1) {
                Some(Value::Str(s)) => ConfigValue::Str(s.clone()),
                Some(Value::Bool(b)) => ConfigValue::Bool(*b),
                Some(Value::Int(i)) => ConfigValue::Int(*i),
                Some(other) => {
                    return Err(ConfigureError::invalid_arguments(format!(
                        "configuration values must be strings, booleans, or \
                         integers, not {}",
                        other.type_name()
                    ))
                    .at(interp.loc(node)));
                }
                None => {
                    return Err(ConfigureError::invalid_arguments(
                        "set() needs a name and a value",
                    )
                    .at(interp.loc(node)));
                }
            };
            data.borrow_mut().insert(key, value);
            Ok(Value::Void)
        }
        "set10" => {
            let key = string_arg(interp, node, positional, 0, "set10")?;
            let flag = positional.get(1).and_then(|v| v.as_bool()).ok_or_else(|| {
                ConfigureError::invalid_arguments("set10() needs a name and a boolean")
                    .at(interp.loc(node))
            })?;
            data.borrow_mut()
                .insert(key, ConfigValue::Int(if flag { 1 } else { 0 }));
            Ok(Value::Void)
        }
        "get" => {
            let key = string_arg(interp, node, positional, 0, "get")?;
            match data.borrow().get(&key) {
                Some(ConfigValue::Str(s)) => Ok(Value::Str(s.clone())),
                Some(ConfigValue::Bool(b)) => Ok(Value::Bool(*b)),
                Some(ConfigValue::Int(i)) => Ok(Value::Int(*i)),
                None => match positional.get(1) {
                    Some(fallback) => Ok(fallback.clone()),
                    None => Err(ConfigureError::invalid_arguments(format!(
                        "configuration data has no entry '{key}'"
                    ))
                    .at(interp.loc(node))),
                },
            }
        }
        "has" => {
            let key = string_arg(interp, node, positional, 0, "has")?;
            Ok(Value::Bool(data.borrow().contains_key(&key)))
        }
        other => Err(interp.unknown_method("configuration data", other, node)),
    }
}

fn compiler_method(
    interp: &mut Interpreter,
    node: &Node,
    language: crate::toolchain::Language,
    name: &str,
    positional: &[Value],
    keywords: &BTreeMap<String, Value>,
) -> Result<Value> {
    let compiler = interp.compiler_for(language).ok_or_else(|| {
        ConfigureError::internal(format!(
            "compiler handle for '{}' has no detected compiler.",
            language.id()
        ))
    })?;
    let prefix = match keywords.get("prefix") {
        Some(Value::Str(s)) => s.clone(),
        Some(other) => {
            return Err(ConfigureError::invalid_arguments(format!(
                "'prefix' must be a string, not {}",
                other.type_name()
            ))
            .at(interp.loc(node)));
        }
        None => String::new(),
    };
    let extra_args = interp.kw_string_list(node, keywords, "args")?;

    match name {
        "get_id" => Ok(Value::Str(compiler.family().id().to_string())),
        "version" => Ok(Value::Str(compiler.version().to_string())),
        "has_header" => {
            let header = string_arg(interp, node, positional, 0, "has_header")?;
            let found = probes::has_header(compiler, interp.env, &header)?;
            info!("checking for header <{header}>: {}", yes_no(found));
            Ok(Value::Bool(found))
        }
        "has_function" => {
            let function = string_arg(interp, node, positional, 0, "has_function")?;
            let found = probes::has_function(compiler, interp.env, &function, &prefix)?;
            info!("checking for function {function}: {}", yes_no(found));
            Ok(Value::Bool(found))
        }
        "has_type" => {
            let typename = string_arg(interp, node, positional, 0, "has_type")?;
            let found = probes::has_type(compiler, interp.env, &typename, &prefix)?;
            info!("checking for type {typename}: {}", yes_no(found));
            Ok(Value::Bool(found))
        }
        "has_member" => {
            let typename = string_arg(interp, node, positional, 0, "has_member")?;
            let member = string_arg(interp, node, positional, 1, "has_member")?;
            let found = probes::has_member(compiler, interp.env, &typename, &member, &prefix)?;
            info!(
                "checking whether type {typename} has member {member}: {}",
                yes_no(found)
            );
            Ok(Value::Bool(found))
        }
        "sizeof" => {
            let typename = string_arg(interp, node, positional, 0, "sizeof")?;
            let size = probes::sizeof(compiler, interp.env, &typename, &prefix)?;
            info!("sizeof {typename}: {size}");
            Ok(Value::Int(size))
        }
        "alignment" => {
            let typename = string_arg(interp, node, positional, 0, "alignment")?;
            let align = probes::alignment(compiler, interp.env, &typename, &prefix)?;
            info!("alignment of {typename}: {align}");
            Ok(Value::Int(align))
        }
        "has_argument" => {
            let argument = string_arg(interp, node, positional, 0, "has_argument")?;
            let accepted = probes::has_argument(compiler, interp.env, &argument)?;
            info!("compiler accepts argument {argument}: {}", yes_no(accepted));
            Ok(Value::Bool(accepted))
        }
        "compiles" => {
            let code = string_arg(interp, node, positional, 0, "compiles")?;
            Ok(Value::Bool(probes::compiles(
                compiler, interp.env, &code, &extra_args,
            )?))
        }
        "links" => {
            let code = string_arg(interp, node, positional, 0, "links")?;
            Ok(Value::Bool(probes::links(
                compiler, interp.env, &code, &extra_args,
            )?))
        }
        "run" => {
            let code = string_arg(interp, node, positional, 0, "run")?;
            let result = probes::run(compiler, interp.env, &code, &extra_args)?;
            Ok(Value::RunResult(Box::new(result)))
        }
        other => Err(interp.unknown_method("compiler", other, node)),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "YES"
    } else {
        "NO"
    }
}

fn string_arg(
    interp: &Interpreter,
    node: &Node,
    positional: &[Value],
    index: usize,
    method: &str,
) -> Result<String> {
    positional
        .get(index)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            ConfigureError::invalid_arguments(format!(
                "{method}() needs a string as argument {}",
                index + 1
            ))
            .at(interp.loc(node))
        })
}

fn collect_strings(
    interp: &Interpreter,
    node: &Node,
    values: &[Value],
    out: &mut Vec<String>,
) -> Result<()> {
    for value in values {
        match value {
            Value::Str(s) => out.push(s.clone()),
            Value::Array(items) => collect_strings(interp, node, items, out)?,
            other => {
                return Err(ConfigureError::invalid_arguments(format!(
                    "expected file name strings, found {}",
                    other.type_name()
                ))
                .at(interp.loc(node)));
            }
        }
    }
    Ok(())
}
