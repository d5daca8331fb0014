//! The tree-walking interpreter.
//!
//! One interpreter instance per build tree. Evaluation is synchronous
//! and strictly source-ordered: statements execute in the order written,
//! and every side effect on the build model happens through the model's
//! own mutators. Subdirectories share the variable environment by
//! reference; subprojects are evaluated in an isolated environment and
//! expose values through a handle.

pub mod configfile;
mod functions;
mod handle_methods;
pub mod value;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::coredata::CoreData;
use crate::environment::{Environment, BUILD_FILE_NAME};
use crate::error::{ConfigureError, Location, Result};
use crate::model::Build;
use crate::syntax::{self, Args, BinOp, Node, NodeKind};
use crate::toolchain::{Compiler, StaticLinker};

pub use value::{ConfigValue, Value};

/// Control flow result of one statement or block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Mutable configure state the interpreter drives.
pub struct Interpreter<'a> {
    pub(crate) env: &'a Environment,
    pub(crate) coredata: &'a mut CoreData,
    pub(crate) build: &'a mut Build,
    pub(crate) compilers: &'a mut Vec<Box<dyn Compiler>>,
    pub(crate) static_linker: &'a mut Option<StaticLinker>,
    variables: HashMap<String, Value>,
    /// Current subdirectory relative to the source root.
    pub(crate) subdir: String,
    pub(crate) current_file: PathBuf,
    visited_subdirs: HashSet<PathBuf>,
    /// Name of the subproject being evaluated, if any.
    pub(crate) subproject: Option<String>,
    pub(crate) subproject_handles: BTreeMap<String, value::SubprojectHandle>,
    loop_depth: u32,
    pub(crate) project_declared: bool,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        env: &'a Environment,
        coredata: &'a mut CoreData,
        build: &'a mut Build,
        compilers: &'a mut Vec<Box<dyn Compiler>>,
        static_linker: &'a mut Option<StaticLinker>,
    ) -> Self {
        let mut variables = HashMap::new();
        variables.insert("host_machine".to_string(), Value::Machine { host: true });
        variables.insert("build_machine".to_string(), Value::Machine { host: false });
        Interpreter {
            env,
            coredata,
            build,
            compilers,
            static_linker,
            variables,
            subdir: String::new(),
            current_file: PathBuf::new(),
            visited_subdirs: HashSet::new(),
            subproject: None,
            subproject_handles: BTreeMap::new(),
            loop_depth: 0,
            project_declared: false,
        }
    }

    /// Evaluate the whole project starting at `source_root/meson.build`.
    pub fn run(&mut self) -> Result<()> {
        let root_file = self.env.source_dir.join(BUILD_FILE_NAME);
        self.evaluate_project_file(&root_file, "")
    }

    /// Read, parse, and evaluate one project root file (the top level
    /// project or a subproject). The first statement must be `project()`.
    pub(crate) fn evaluate_project_file(&mut self, path: &Path, subdir: &str) -> Result<()> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ConfigureError::environment(format!("could not read {}: {}", path.display(), e))
        })?;
        let root = syntax::parse(&source, path)?;
        let statements = match &root.kind {
            NodeKind::CodeBlock(stmts) => stmts,
            _ => return Err(ConfigureError::internal("parser returned a non-block root.")),
        };
        match statements.first() {
            Some(first) if is_project_call(first) => {}
            Some(first) => {
                return Err(ConfigureError::invalid_code(
                    "the first statement must be a call to project()",
                )
                .at(self.node_loc_in(path, first)));
            }
            None => {
                return Err(ConfigureError::invalid_code(format!(
                    "{} contains no statements",
                    path.display()
                )));
            }
        }
        self.record_build_def_file(path);
        let prev_file = std::mem::replace(&mut self.current_file, path.to_path_buf());
        let prev_subdir = std::mem::replace(&mut self.subdir, subdir.to_string());
        let result = self.eval_block_node(&root);
        self.current_file = prev_file;
        self.subdir = prev_subdir;
        result.map(|_| ())
    }

    /// Evaluate one `meson.build` from `subdir()`, sharing the variable
    /// environment.
    pub(crate) fn evaluate_subdir_file(&mut self, path: &Path, subdir: &str) -> Result<()> {
        let source = std::fs::read_to_string(path).map_err(|e| {
            ConfigureError::environment(format!("could not read {}: {}", path.display(), e))
        })?;
        let root = syntax::parse(&source, path)?;
        self.record_build_def_file(path);
        let prev_file = std::mem::replace(&mut self.current_file, path.to_path_buf());
        let prev_subdir = std::mem::replace(&mut self.subdir, subdir.to_string());
        let result = self.eval_block_node(&root);
        self.current_file = prev_file;
        self.subdir = prev_subdir;
        result.map(|_| ())
    }

    fn record_build_def_file(&mut self, path: &Path) {
        let rel = crate::util::fs::relative_path(&self.env.source_dir, path);
        self.build.add_build_def_file(&rel.display().to_string());
    }

    pub(crate) fn loc(&self, node: &Node) -> Location {
        Location::new(&self.current_file, node.span.line, node.span.column)
    }

    fn node_loc_in(&self, file: &Path, node: &Node) -> Location {
        Location::new(file, node.span.line, node.span.column)
    }

    /// Has this exact source directory been evaluated before?
    pub(crate) fn check_subdir_reentry(&mut self, canonical: PathBuf, node: &Node) -> Result<()> {
        if !self.visited_subdirs.insert(canonical.clone()) {
            return Err(ConfigureError::invalid_code(format!(
                "subdir('{}') was already entered earlier in this configure; \
                 re-entering a directory would evaluate it twice",
                canonical.display()
            ))
            .at(self.loc(node)));
        }
        Ok(())
    }

    fn eval_block_node(&mut self, node: &Node) -> Result<Flow> {
        let statements = match &node.kind {
            NodeKind::CodeBlock(stmts) => stmts,
            _ => return Err(ConfigureError::internal("expected a code block node.")),
        };
        for stmt in statements {
            match self.eval_statement(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_statement(&mut self, node: &Node) -> Result<Flow> {
        match &node.kind {
            NodeKind::If {
                branches,
                else_block,
            } => {
                for (condition, block) in branches {
                    let value = self.eval_expression(condition)?;
                    let truth = value.as_bool().ok_or_else(|| {
                        ConfigureError::invalid_code(format!(
                            "if condition must be a boolean, not {}",
                            value.type_name()
                        ))
                        .at(self.loc(condition))
                    })?;
                    if truth {
                        return self.eval_block_node(block);
                    }
                }
                if let Some(block) = else_block {
                    return self.eval_block_node(block);
                }
                Ok(Flow::Normal)
            }
            NodeKind::Foreach {
                variables,
                iterable,
                body,
            } => self.eval_foreach(node, variables, iterable, body),
            NodeKind::Break => {
                if self.loop_depth == 0 {
                    return Err(ConfigureError::invalid_code("break outside of a loop")
                        .at(self.loc(node)));
                }
                Ok(Flow::Break)
            }
            NodeKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(ConfigureError::invalid_code("continue outside of a loop")
                        .at(self.loc(node)));
                }
                Ok(Flow::Continue)
            }
            _ => {
                self.eval_expression(node)?;
                Ok(Flow::Normal)
            }
        }
    }

    fn eval_foreach(
        &mut self,
        node: &Node,
        loop_vars: &[String],
        iterable: &Node,
        body: &Node,
    ) -> Result<Flow> {
        let container = self.eval_expression(iterable)?;
        // Iteration walks a snapshot; mutating the iterated variable
        // inside the body is rejected where the comparison is defined.
        let watched = match &iterable.kind {
            NodeKind::Id(name) => Some(name.clone()),
            _ => None,
        };

        self.loop_depth += 1;
        let run = self.run_foreach(node, loop_vars, iterable, body, &container, watched.as_deref());
        self.loop_depth -= 1;
        run
    }

    fn run_foreach(
        &mut self,
        node: &Node,
        loop_vars: &[String],
        iterable: &Node,
        body: &Node,
        container: &Value,
        watched: Option<&str>,
    ) -> Result<Flow> {
        match container {
            Value::Array(items) => {
                if loop_vars.len() != 1 {
                    return Err(ConfigureError::invalid_code(
                        "foreach over an array takes exactly one loop variable",
                    )
                    .at(self.loc(node)));
                }
                for item in items.clone() {
                    self.variables.insert(loop_vars[0].clone(), item);
                    if self.eval_block_node(body)? == Flow::Break {
                        break;
                    }
                    self.check_container_unchanged(node, container, watched)?;
                }
                Ok(Flow::Normal)
            }
            Value::Dict(map) => {
                if loop_vars.len() != 2 {
                    return Err(ConfigureError::invalid_code(
                        "foreach over a dictionary takes exactly two loop variables",
                    )
                    .at(self.loc(node)));
                }
                for (key, item) in map.clone() {
                    self.variables
                        .insert(loop_vars[0].clone(), Value::Str(key));
                    self.variables.insert(loop_vars[1].clone(), item);
                    if self.eval_block_node(body)? == Flow::Break {
                        break;
                    }
                }
                Ok(Flow::Normal)
            }
            other => Err(ConfigureError::invalid_code(format!(
                "foreach needs an array or dictionary, not {}",
                other.type_name()
            ))
            .at(self.loc(iterable))),
        }
    }

    fn check_container_unchanged(
        &self,
        node: &Node,
        original: &Value,
        watched: Option<&str>,
    ) -> Result<()> {
        if let Some(name) = watched {
            if let Some(current) = self.variables.get(name) {
                if original.try_eq(current) == Some(false) {
                    return Err(ConfigureError::invalid_code(format!(
                        "container '{name}' was modified during foreach iteration"
                    ))
                    .at(self.loc(node)));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn eval_expression(&mut self, node: &Node) -> Result<Value> {
        match &node.kind {
            NodeKind::Bool(b) => Ok(Value::Bool(*b)),
            NodeKind::Int(i) => Ok(Value::Int(*i)),
            NodeKind::Str(s) => Ok(Value::Str(s.clone())),
            NodeKind::Id(name) => self
                .variables
                .get(name)
                .cloned()
                .ok_or_else(|| {
                    ConfigureError::invalid_code(format!("unknown variable '{name}'"))
                        .at(self.loc(node))
                }),
            NodeKind::Array(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expression(item)?);
                }
                Ok(Value::Array(values))
            }
            NodeKind::Dict(entries) => {
                let mut map = BTreeMap::new();
                for (key_node, value_node) in entries {
                    let key = match self.eval_expression(key_node)? {
                        Value::Str(s) => s,
                        other => {
                            return Err(ConfigureError::invalid_code(format!(
                                "dictionary keys must be strings, not {}",
                                other.type_name()
                            ))
                            .at(self.loc(key_node)));
                        }
                    };
                    let value = self.eval_expression(value_node)?;
                    map.insert(key, value);
                }
                Ok(Value::Dict(map))
            }
            NodeKind::Not(inner) => {
                let value = self.eval_expression(inner)?;
                match value {
                    Value::Bool(b) => Ok(Value::Bool(!b)),
                    other => Err(ConfigureError::invalid_code(format!(
                        "'not' needs a boolean, not {}",
                        other.type_name()
                    ))
                    .at(self.loc(inner))),
                }
            }
            NodeKind::Neg(inner) => {
                let value = self.eval_expression(inner)?;
                match value {
                    Value::Int(i) => Ok(Value::Int(-i)),
                    other => Err(ConfigureError::invalid_code(format!(
                        "unary minus needs an integer, not {}",
                        other.type_name()
                    ))
                    .at(self.loc(inner))),
                }
            }
            NodeKind::BinOp { op, lhs, rhs } => self.eval_binop(node, *op, lhs, rhs),
            NodeKind::Index { object, index } => self.eval_index(object, index),
            NodeKind::Ternary {
                condition,
                then,
                otherwise,
            } => {
                let value = self.eval_expression(condition)?;
                let truth = value.as_bool().ok_or_else(|| {
                    ConfigureError::invalid_code(format!(
                        "ternary condition must be a boolean, not {}",
                        value.type_name()
                    ))
                    .at(self.loc(condition))
                })?;
                if truth {
                    self.eval_expression(then)
                } else {
                    self.eval_expression(otherwise)
                }
            }
            NodeKind::Assign { name, value } => {
                if name == "host_machine" || name == "build_machine" {
                    return Err(ConfigureError::invalid_code(format!(
                        "'{name}' is a read-only builtin and cannot be reassigned"
                    ))
                    .at(self.loc(node)));
                }
                let evaluated = self.eval_expression(value)?;
                if matches!(evaluated, Value::Void) {
                    return Err(ConfigureError::invalid_code(
                        "cannot assign the result of a function that returns nothing",
                    )
                    .at(self.loc(node)));
                }
                self.variables.insert(name.clone(), evaluated.clone());
                Ok(evaluated)
            }
            NodeKind::PlusAssign { name, value } => {
                let addition = self.eval_expression(value)?;
                let current = self.variables.get(name).cloned().ok_or_else(|| {
                    ConfigureError::invalid_code(format!("unknown variable '{name}'"))
                        .at(self.loc(node))
                })?;
                let combined = match (current, addition) {
                    // Appending a single element to an array is allowed.
                    (Value::Array(mut items), Value::Array(more)) => {
                        items.extend(more);
                        Value::Array(items)
                    }
                    (Value::Array(mut items), single) => {
                        items.push(single);
                        Value::Array(items)
                    }
                    (lhs, rhs) => self.add_values(node, lhs, rhs)?,
                };
                self.variables.insert(name.clone(), combined.clone());
                Ok(combined)
            }
            NodeKind::FunctionCall { name, args } => {
                let (positional, keywords) = self.reduce_args(args)?;
                self.call_function(node, name, positional, keywords)
            }
            NodeKind::MethodCall { object, name, args } => {
                let receiver = self.eval_expression(object)?;
                let (positional, keywords) = self.reduce_args(args)?;
                self.call_method(node, receiver, name, positional, keywords)
            }
            NodeKind::If { .. }
            | NodeKind::Foreach { .. }
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::CodeBlock(_) => Err(ConfigureError::internal(
                "statement node evaluated as an expression.",
            )),
        }
    }

    fn eval_binop(&mut self, node: &Node, op: BinOp, lhs: &Node, rhs: &Node) -> Result<Value> {
        // and/or short-circuit before the right side is evaluated.
        if matches!(op, BinOp::And | BinOp::Or) {
            let left = self.eval_expression(lhs)?;
            let left_bool = left.as_bool().ok_or_else(|| {
                self.binop_type_error(lhs, op, &left)
            })?;
            match (op, left_bool) {
                (BinOp::And, false) => return Ok(Value::Bool(false)),
                (BinOp::Or, true) => return Ok(Value::Bool(true)),
                _ => {}
            }
            let right = self.eval_expression(rhs)?;
            let right_bool = right.as_bool().ok_or_else(|| {
                self.binop_type_error(rhs, op, &right)
            })?;
            return Ok(Value::Bool(right_bool));
        }

        let left = self.eval_expression(lhs)?;
        let right = self.eval_expression(rhs)?;
        match op {
            BinOp::Eq | BinOp::Ne => {
                let equal = left.try_eq(&right).ok_or_else(|| {
                    ConfigureError::invalid_code(format!(
                        "cannot compare {} and {}",
                        left.type_name(),
                        right.type_name()
                    ))
                    .at(self.loc(node))
                })?;
                Ok(Value::Bool(if op == BinOp::Eq { equal } else { !equal }))
            }
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => a.cmp(b),
                    (Value::Str(a), Value::Str(b)) => a.cmp(b),
                    _ => {
                        return Err(ConfigureError::invalid_code(format!(
                            "cannot order {} and {}",
                            left.type_name(),
                            right.type_name()
                        ))
                        .at(self.loc(node)));
                    }
                };
                let result = match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    BinOp::Ge => ordering.is_ge(),
                    _ => unreachable!(),
                };
                Ok(Value::Bool(result))
            }
            BinOp::In | BinOp::NotIn => {
                let contained = self.membership(node, &left, &right)?;
                Ok(Value::Bool(if op == BinOp::In {
                    contained
                } else {
                    !contained
                }))
            }
            BinOp::Add => self.add_values(node, left, right),
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => {
                let (a, b) = match (&left, &right) {
                    (Value::Int(a), Value::Int(b)) => (*a, *b),
                    _ => {
                        return Err(ConfigureError::invalid_code(format!(
                            "operator '{}' needs integers, got {} and {}",
                            op.as_str(),
                            left.type_name(),
                            right.type_name()
                        ))
                        .at(self.loc(node)));
                    }
                };
                match op {
                    BinOp::Sub => Ok(Value::Int(a - b)),
                    BinOp::Mul => Ok(Value::Int(a * b)),
                    BinOp::Div | BinOp::Mod => {
                        if b <= 0 {
                            return Err(ConfigureError::invalid_code(format!(
                                "the right-hand side of '{}' must be a positive integer",
                                op.as_str()
                            ))
                            .at(self.loc(node)));
                        }
                        if op == BinOp::Div {
                            Ok(Value::Int(a / b))
                        } else {
                            Ok(Value::Int(a % b))
                        }
                    }
                    _ => unreachable!(),
                }
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        }
    }

    fn binop_type_error(&self, node: &Node, op: BinOp, value: &Value) -> ConfigureError {
        ConfigureError::invalid_code(format!(
            "operator '{}' needs boolean operands, got {}",
            op.as_str(),
            value.type_name()
        ))
        .at(self.loc(node))
    }

    fn membership(&self, node: &Node, needle: &Value, haystack: &Value) -> Result<bool> {
        match haystack {
            Value::Array(items) => {
                for item in items {
                    if needle.try_eq(item) == Some(true) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Dict(map) => {
                let key = needle.as_str().ok_or_else(|| {
                    ConfigureError::invalid_code(
                        "'in' on a dictionary needs a string key",
                    )
                    .at(self.loc(node))
                })?;
                Ok(map.contains_key(key))
            }
            other => Err(ConfigureError::invalid_code(format!(
                "'in' needs an array or dictionary on the right, not {}",
                other.type_name()
            ))
            .at(self.loc(node))),
        }
    }

    fn add_values(&self, node: &Node, left: Value, right: Value) -> Result<Value> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            (Value::Str(a), Value::Str(b)) => Ok(Value::Str(a + &b)),
            (Value::Array(mut a), Value::Array(b)) => {
                a.extend(b);
                Ok(Value::Array(a))
            }
            (left, right) => Err(ConfigureError::invalid_code(format!(
                "operator '+' cannot combine {} and {}",
                left.type_name(),
                right.type_name()
            ))
            .at(self.loc(node))),
        }
    }

    fn eval_index(&mut self, object: &Node, index: &Node) -> Result<Value> {
        let container = self.eval_expression(object)?;
        let key = self.eval_expression(index)?;
        match (&container, &key) {
            (Value::Array(items), Value::Int(i)) => {
                let len = items.len() as i64;
                let resolved = if *i < 0 { len + *i } else { *i };
                if resolved < 0 || resolved >= len {
                    return Err(ConfigureError::invalid_code(format!(
                        "array index {i} out of bounds (length {len})"
                    ))
                    .at(self.loc(index)));
                }
                Ok(items[resolved as usize].clone())
            }
            (Value::Dict(map), Value::Str(k)) => map.get(k).cloned().ok_or_else(|| {
                ConfigureError::invalid_code(format!("dictionary has no key '{k}'"))
                    .at(self.loc(index))
            }),
            _ => Err(ConfigureError::invalid_code(format!(
                "cannot index {} with {}",
                container.type_name(),
                key.type_name()
            ))
            .at(self.loc(index))),
        }
    }

    fn reduce_args(&mut self, args: &Args) -> Result<(Vec<Value>, BTreeMap<String, Value>)> {
        let mut positional = Vec::with_capacity(args.positional.len());
        for node in &args.positional {
            positional.push(self.eval_expression(node)?);
        }
        let mut keywords = BTreeMap::new();
        for (name, node) in &args.keywords {
            keywords.insert(name.clone(), self.eval_expression(node)?);
        }
        Ok((positional, keywords))
    }

    /// Dispatch a method call on the receiver's value kind.
    fn call_method(
        &mut self,
        node: &Node,
        receiver: Value,
        name: &str,
        positional: Vec<Value>,
        keywords: BTreeMap<String, Value>,
    ) -> Result<Value> {
        match receiver {
            Value::Str(s) => self.string_method(node, &s, name, &positional),
            Value::Bool(b) => self.bool_method(node, b, name),
            Value::Int(i) => self.int_method(node, i, name),
            Value::Array(items) => self.array_method(node, &items, name, &positional),
            Value::Dict(map) => self.dict_method(node, &map, name, &positional),
            other => handle_methods::handle_method(self, node, other, name, positional, keywords),
        }
    }

    fn string_method(
        &mut self,
        node: &Node,
        receiver: &str,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        let arg_str = |i: usize| -> Result<&str> {
            args.get(i).and_then(|v| v.as_str()).ok_or_else(|| {
                ConfigureError::invalid_arguments(format!(
                    "string method '{name}' needs a string argument"
                ))
                .at(self.loc(node))
            })
        };
        match name {
            "strip" => Ok(Value::Str(receiver.trim().to_string())),
            "to_upper" => Ok(Value::Str(receiver.to_uppercase())),
            "to_lower" => Ok(Value::Str(receiver.to_lowercase())),
            "underscorify" => Ok(Value::Str(
                receiver
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                    .collect(),
            )),
            "contains" => Ok(Value::Bool(receiver.contains(arg_str(0)?))),
            "startswith" => Ok(Value::Bool(receiver.starts_with(arg_str(0)?))),
            "endswith" => Ok(Value::Bool(receiver.ends_with(arg_str(0)?))),
            "split" => {
                let parts: Vec<Value> = if args.is_empty() {
                    receiver
                        .split_whitespace()
                        .map(|p| Value::Str(p.to_string()))
                        .collect()
                } else {
                    receiver
                        .split(arg_str(0)?)
                        .map(|p| Value::Str(p.to_string()))
                        .collect()
                };
                Ok(Value::Array(parts))
            }
            "join" => match args.first() {
                Some(Value::Array(items)) => {
                    let mut parts = Vec::with_capacity(items.len());
                    for item in items {
                        match item.as_str() {
                            Some(s) => parts.push(s.to_string()),
                            None => {
                                return Err(ConfigureError::invalid_arguments(
                                    "join() needs an array of strings",
                                )
                                .at(self.loc(node)));
                            }
                        }
                    }
                    Ok(Value::Str(parts.join(receiver)))
                }
                _ => Err(ConfigureError::invalid_arguments(
                    "join() needs an array of strings",
                )
                .at(self.loc(node))),
            },
            "format" => {
                let mut result = receiver.to_string();
                for (i, arg) in args.iter().enumerate() {
                    result = result.replace(&format!("@{i}@"), &arg.display_string());
                }
                Ok(Value::Str(result))
            }
            "version_compare" => Ok(Value::Bool(crate::deps::version::satisfies(
                receiver,
                arg_str(0)?,
            ))),
            "to_int" => receiver.trim().parse::<i64>().map(Value::Int).map_err(|_| {
                ConfigureError::invalid_arguments(format!(
                    "string '{receiver}' cannot be converted to an integer"
                ))
                .at(self.loc(node))
            }),
            other => Err(self.unknown_method("string", other, node)),
        }
    }

    fn bool_method(&self, node: &Node, receiver: bool, name: &str) -> Result<Value> {
        match name {
            "to_string" => Ok(Value::Str(receiver.to_string())),
            "to_int" => Ok(Value::Int(if receiver { 1 } else { 0 })),
            other => Err(self.unknown_method("boolean", other, node)),
        }
    }

    fn int_method(&self, node: &Node, receiver: i64, name: &str) -> Result<Value> {
        match name {
            "is_even" => Ok(Value::Bool(receiver % 2 == 0)),
            "is_odd" => Ok(Value::Bool(receiver % 2 != 0)),
            "to_string" => Ok(Value::Str(receiver.to_string())),
            other => Err(self.unknown_method("integer", other, node)),
        }
    }

    fn array_method(
        &self,
        node: &Node,
        items: &[Value],
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        match name {
            "length" => Ok(Value::Int(items.len() as i64)),
            "contains" => {
                let needle = args.first().ok_or_else(|| {
                    ConfigureError::invalid_arguments("contains() needs an argument")
                        .at(self.loc(node))
                })?;
                Ok(Value::Bool(
                    items.iter().any(|item| needle.try_eq(item) == Some(true)),
                ))
            }
            "get" => {
                let index = args.first().and_then(|v| v.as_int()).ok_or_else(|| {
                    ConfigureError::invalid_arguments("get() needs an integer index")
                        .at(self.loc(node))
                })?;
                let len = items.len() as i64;
                let resolved = if index < 0 { len + index } else { index };
                if resolved >= 0 && resolved < len {
                    Ok(items[resolved as usize].clone())
                } else if let Some(fallback) = args.get(1) {
                    Ok(fallback.clone())
                } else {
                    Err(ConfigureError::invalid_arguments(format!(
                        "array index {index} out of bounds (length {len})"
                    ))
                    .at(self.loc(node)))
                }
            }
            other => Err(self.unknown_method("array", other, node)),
        }
    }

    fn dict_method(
        &self,
        node: &Node,
        map: &BTreeMap<String, Value>,
        name: &str,
        args: &[Value],
    ) -> Result<Value> {
        let arg_str = |i: usize| -> Result<&str> {
            args.get(i).and_then(|v| v.as_str()).ok_or_else(|| {
                ConfigureError::invalid_arguments(format!(
                    "dictionary method '{name}' needs a string key"
                ))
                .at(self.loc(node))
            })
        };
        match name {
            "has_key" => Ok(Value::Bool(map.contains_key(arg_str(0)?))),
            "keys" => Ok(Value::Array(
                map.keys().map(|k| Value::Str(k.clone())).collect(),
            )),
            "get" => {
                let key = arg_str(0)?;
                match map.get(key) {
                    Some(value) => Ok(value.clone()),
                    None => match args.get(1) {
                        Some(fallback) => Ok(fallback.clone()),
                        None => Err(ConfigureError::invalid_arguments(format!(
                            "dictionary has no key '{key}'"
                        ))
                        .at(self.loc(node))),
                    },
                }
            }
            other => Err(self.unknown_method("dictionary", other, node)),
        }
    }

    pub(crate) fn unknown_method(
        &self,
        kind: &str,
        method: &str,
        node: &Node,
    ) -> ConfigureError {
        ConfigureError::invalid_code(format!("{kind} values have no method '{method}'"))
            .at(self.loc(node))
    }

    pub(crate) fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub(crate) fn set_variable(&mut self, name: &str, value: Value) {
        self.variables.insert(name.to_string(), value);
    }

    /// Swap out the whole variable environment; used around subproject
    /// evaluation, which must not see the caller's variables.
    pub(crate) fn swap_variables(
        &mut self,
        fresh: HashMap<String, Value>,
    ) -> HashMap<String, Value> {
        std::mem::replace(&mut self.variables, fresh)
    }

    pub(crate) fn fresh_variables() -> HashMap<String, Value> {
        let mut variables = HashMap::new();
        variables.insert("host_machine".to_string(), Value::Machine { host: true });
        variables.insert("build_machine".to_string(), Value::Machine { host: false });
        variables
    }

    pub(crate) fn take_visited_subdirs(&mut self) -> HashSet<PathBuf> {
        std::mem::take(&mut self.visited_subdirs)
    }

    pub(crate) fn restore_visited_subdirs(&mut self, set: HashSet<PathBuf>) {
        self.visited_subdirs = set;
    }

    pub(crate) fn variables_snapshot(&self) -> BTreeMap<String, Value> {
        self.variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub(crate) fn compiler_for(&self, language: crate::toolchain::Language) -> Option<&dyn Compiler> {
        self.compilers
            .iter()
            .find(|c| c.language() == language)
            .map(|c| c.as_ref())
    }

    pub(crate) fn debug_state(&self) {
        debug!(
            "interpreter at subdir '{}', {} variables, {} targets",
            self.subdir,
            self.variables.len(),
            self.build.target_names().len()
        );
    }
}

fn is_project_call(node: &Node) -> bool {
    matches!(&node.kind, NodeKind::FunctionCall { name, .. } if name == "project")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    /// Evaluate a build definition fragment (no project() required) and
    /// return the resulting variable bindings.
    fn eval(src: &str) -> Result<BTreeMap<String, Value>> {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("src");
        let build_dir = tmp.path().join("build");
        std::fs::create_dir_all(&source_dir).unwrap();
        let fragment = source_dir.join(BUILD_FILE_NAME);
        std::fs::write(&fragment, src).unwrap();

        let env = Environment::new(&source_dir, &build_dir, None, None);
        let mut coredata = crate::coredata::CoreData::new();
        let mut build = Build::new();
        let mut compilers = Vec::new();
        let mut static_linker = None;
        let mut interp = Interpreter::new(
            &env,
            &mut coredata,
            &mut build,
            &mut compilers,
            &mut static_linker,
        );
        interp.evaluate_subdir_file(&fragment, "")?;
        Ok(interp.variables_snapshot())
    }

    fn int_var(vars: &BTreeMap<String, Value>, name: &str) -> i64 {
        vars[name].as_int().expect("integer variable")
    }

    fn str_var(vars: &BTreeMap<String, Value>, name: &str) -> String {
        vars[name].as_str().expect("string variable").to_string()
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        let vars = eval("x = 1 + 2 * 3\ny = (10 - 4) / 2\nz = 17 % 5\n").unwrap();
        assert_eq!(int_var(&vars, "x"), 7);
        assert_eq!(int_var(&vars, "y"), 3);
        assert_eq!(int_var(&vars, "z"), 2);
    }

    #[test]
    fn test_division_truncates_toward_zero() {
        let vars = eval("x = -7 / 2\n").unwrap();
        assert_eq!(int_var(&vars, "x"), -3);
    }

    #[test]
    fn test_negative_divisor_rejected() {
        let err = eval("x = 7 / -2\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);
        assert!(err.to_string().contains("positive"));
    }

    #[test]
    fn test_mixed_type_addition_is_an_error() {
        let err = eval("x = 1 + 'a'\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);
    }

    #[test]
    fn test_string_methods() {
        let vars = eval(concat!(
            "a = '  hello  '.strip()\n",
            "b = 'a-b c'.underscorify()\n",
            "c = 'x,y,z'.split(',')[1]\n",
            "d = 'v@0@.@1@'.format(1, 2)\n",
            "e = '1.2.3'.version_compare('>=1.2')\n",
            "f = '42'.to_int()\n",
        ))
        .unwrap();
        assert_eq!(str_var(&vars, "a"), "hello");
        assert_eq!(str_var(&vars, "b"), "a_b_c");
        assert_eq!(str_var(&vars, "c"), "y");
        assert_eq!(str_var(&vars, "d"), "v1.2");
        assert_eq!(vars["e"].as_bool(), Some(true));
        assert_eq!(int_var(&vars, "f"), 42);
    }

    #[test]
    fn test_foreach_with_break_and_continue() {
        let vars = eval(concat!(
            "total = 0\n",
            "foreach n : [1, 2, 3, 4, 5]\n",
            "  if n == 2\n",
            "    continue\n",
            "  endif\n",
            "  if n == 5\n",
            "    break\n",
            "  endif\n",
            "  total += n\n",
            "endforeach\n",
        ))
        .unwrap();
        assert_eq!(int_var(&vars, "total"), 1 + 3 + 4);
    }

    #[test]
    fn test_foreach_over_dictionary() {
        let vars = eval(concat!(
            "keys = []\n",
            "foreach k, v : {'b' : 2, 'a' : 1}\n",
            "  keys += k\n",
            "endforeach\n",
        ))
        .unwrap();
        match &vars["keys"] {
            Value::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_break_outside_loop() {
        let err = eval("break\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCode);
        assert!(err.to_string().contains("outside of a loop"));
    }

    #[test]
    fn test_if_condition_must_be_boolean() {
        let err = eval("if 1\n x = 2\nendif\n").unwrap_err();
        assert!(err.to_string().contains("must be a boolean"));
    }

    #[test]
    fn test_ternary_and_logic() {
        let vars = eval(concat!(
            "a = true and false or true\n",
            "b = a ? 'yes' : 'no'\n",
            "c = not false\n",
        ))
        .unwrap();
        assert_eq!(str_var(&vars, "b"), "yes");
        assert_eq!(vars["c"].as_bool(), Some(true));
    }

    #[test]
    fn test_in_and_not_in() {
        let vars = eval(concat!(
            "a = 'x' in ['x', 'y']\n",
            "b = 'k' not in {'k' : 1}\n",
        ))
        .unwrap();
        assert_eq!(vars["a"].as_bool(), Some(true));
        assert_eq!(vars["b"].as_bool(), Some(false));
    }

    #[test]
    fn test_plus_assign_appends_to_array() {
        let vars = eval("srcs = ['a.c']\nsrcs += 'b.c'\nsrcs += ['c.c']\nn = srcs.length()\n")
            .unwrap();
        assert_eq!(int_var(&vars, "n"), 3);
    }

    #[test]
    fn test_unknown_variable_and_function() {
        assert!(eval("x = nope\n").unwrap_err().to_string().contains("unknown variable"));
        assert!(eval("frobnicate()\n")
            .unwrap_err()
            .to_string()
            .contains("unknown function"));
    }

    #[test]
    fn test_void_result_cannot_be_assigned() {
        let err = eval("x = message('hi')\n").unwrap_err();
        assert!(err.to_string().contains("returns nothing"));
    }

    #[test]
    fn test_builtin_machine_objects() {
        let vars = eval("sys = build_machine.system()\n").unwrap();
        assert!(!str_var(&vars, "sys").is_empty());
        let err = eval("host_machine = 3\n").unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_configuration_data_handle() {
        let vars = eval(concat!(
            "conf = configuration_data()\n",
            "conf.set('NAME', 'demo')\n",
            "conf.set10('FLAG', true)\n",
            "has = conf.has('NAME')\n",
            "val = conf.get('FLAG')\n",
            "missing = conf.get('ABSENT', 'fallback')\n",
        ))
        .unwrap();
        assert_eq!(vars["has"].as_bool(), Some(true));
        assert_eq!(int_var(&vars, "val"), 1);
        assert_eq!(str_var(&vars, "missing"), "fallback");
    }

    #[test]
    fn test_get_option_reads_builtins() {
        let vars = eval("bt = get_option('buildtype')\n").unwrap();
        assert_eq!(str_var(&vars, "bt"), "debug");
    }

    #[test]
    fn test_errors_carry_positions() {
        let err = eval("x = 1\ny = unknown_name\n").unwrap_err();
        let location = err.location().cloned().expect("position attached");
        assert_eq!(location.line, 2);
    }

    #[test]
    fn test_generator_process_declares_outputs() {
        let vars = eval(concat!(
            "gen = generator('/usr/bin/flex', arguments : ['-o', '@OUTPUT@', '@INPUT@'], \
             output : '@BASENAME@.c')\n",
            "lst = gen.process('lexer.l')\n",
        ))
        .unwrap();
        match &vars["lst"] {
            Value::GeneratedList(list) => {
                assert_eq!(list.outputs, vec!["lexer.c".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
