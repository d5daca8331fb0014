//! The ninja-format manifest serialiser.
//!
//! Rules are emitted once per (language, operation) pair, build
//! statements in dependency order, and the finished text is renamed over
//! `build.ninja` only when complete, so a failed configure leaves the
//! previous manifest untouched.

use std::fmt::Write as _;

use tracing::{debug, warn};

use super::BackendContext;
use crate::error::{ConfigureError, Result};
use crate::model::{BuildTarget, GeneratorExe, TargetKind};
use crate::toolchain::Compiler;
use crate::util::process::find_executable;

pub const NINJA_FILE: &str = "build.ninja";

#[cfg(windows)]
const QUOTE: char = '"';
#[cfg(not(windows))]
const QUOTE: char = '\'';

#[cfg(windows)]
const EXECUTE_WRAPPER: &str = "cmd /c ";
#[cfg(not(windows))]
const EXECUTE_WRAPPER: &str = "";

/// Escape one path or word for the manifest: `$` doubles, spaces become
/// `$ `, and path separators are normalised to forward slashes.
pub fn ninja_quote(text: &str) -> String {
    text.replace('\\', "/").replace('$', "$$").replace(' ', "$ ")
}

/// One `build` statement under construction.
struct BuildElement {
    outs: Vec<String>,
    rule: String,
    ins: Vec<String>,
    deps: Vec<String>,
    orderdeps: Vec<String>,
    vars: Vec<(String, Vec<String>)>,
}

impl BuildElement {
    fn new(outs: impl Into<Vec<String>>, rule: &str, ins: impl Into<Vec<String>>) -> Self {
        BuildElement {
            outs: outs.into(),
            rule: rule.to_string(),
            ins: ins.into(),
            deps: Vec::new(),
            orderdeps: Vec::new(),
            vars: Vec::new(),
        }
    }

    fn one(out: &str, rule: &str, ins: impl Into<Vec<String>>) -> Self {
        Self::new(vec![out.to_string()], rule, ins)
    }

    fn dep(mut self, dep: impl Into<String>) -> Self {
        self.deps.push(dep.into());
        self
    }

    fn deps(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.deps.extend(deps);
        self
    }

    fn orderdeps(mut self, deps: impl IntoIterator<Item = String>) -> Self {
        self.orderdeps.extend(deps);
        self
    }

    fn var(mut self, name: &str, values: impl Into<Vec<String>>) -> Self {
        self.vars.push((name.to_string(), values.into()));
        self
    }

    fn write(self, out: &mut String) {
        let outs: Vec<String> = self.outs.iter().map(|o| ninja_quote(o)).collect();
        let ins: Vec<String> = self.ins.iter().map(|i| ninja_quote(i)).collect();
        let _ = write!(out, "build {}: {} {}", outs.join(" "), self.rule, ins.join(" "));
        if !self.deps.is_empty() {
            let deps: Vec<String> = self.deps.iter().map(|d| ninja_quote(d)).collect();
            let _ = write!(out, " | {}", deps.join(" "));
        }
        if !self.orderdeps.is_empty() {
            let deps: Vec<String> = self.orderdeps.iter().map(|d| ninja_quote(d)).collect();
            let _ = write!(out, " || {}", deps.join(" "));
        }
        out.push('\n');
        for (name, values) in &self.vars {
            // Command words are shell-quoted and escaped. DEPFILE is read
            // by the executor itself, so it is escaped but never shell
            // quoted. DESC is progress text that may reference the edge's
            // $out/$in; escaping it would print the literal token, so it
            // passes through verbatim.
            let rendered: Vec<String> = values
                .iter()
                .map(|v| {
                    if name == "DESC" {
                        v.clone()
                    } else if name == "DEPFILE" || v == "&&" {
                        ninja_quote(v)
                    } else {
                        format!("{QUOTE}{}{QUOTE}", ninja_quote(v))
                    }
                })
                .collect();
            let _ = writeln!(out, " {} = {}", name, rendered.join(" "));
        }
        out.push('\n');
    }
}

/// Serialise the build model into `<builddir>/build.ninja`.
pub fn generate(ctx: &BackendContext) -> Result<()> {
    let mut out = String::with_capacity(16 * 1024);
    let _ = writeln!(
        out,
        "# This is the build file for project \"{}\"",
        ctx.build.project_name
    );
    out.push_str("# It is autogenerated by the drydock build system.\n");
    out.push_str("# Do not edit by hand.\n\n");

    write_rules(ctx, &mut out)?;

    out.push_str("# Build rules for targets\n\n");
    for target in ctx.build.emission_order() {
        write_target(ctx, target, &mut out)?;
    }

    out.push_str("# Test rules\n\n");
    write_test_statements(ctx, &mut out);
    out.push_str("# Install rules\n\n");
    write_install_statement(ctx, &mut out);
    if ctx.coredata.coverage() {
        out.push_str("# Coverage rules\n\n");
        write_coverage_statements(ctx, &mut out);
    }
    out.push_str("# Suffix\n\n");
    write_ending(ctx, &mut out)?;

    let path = ctx.env.build_dir.join(NINJA_FILE);
    crate::util::fs::write_atomic(&path, out.as_bytes())
        .map_err(|e| ConfigureError::environment(e.to_string()))?;
    debug!("wrote {}", path.display());
    Ok(())
}

fn write_rules(ctx: &BackendContext, out: &mut String) -> Result<()> {
    out.push_str("# Rules for compiling.\n\n");
    for compiler in ctx.compilers {
        let lang = compiler.language().id();
        let _ = writeln!(out, "rule {lang}_COMPILER");
        let depflags = compiler.depfile_gen_args("$out", "$DEPFILE");
        let quoted_depflags: Vec<String> = depflags
            .iter()
            .map(|d| format!("{QUOTE}{d}{QUOTE}"))
            .collect();
        let _ = writeln!(
            out,
            " command = {} $FLAGS {} {} {} $in",
            compiler.exelist().join(" "),
            quoted_depflags.join(" "),
            compiler.output_args("$out").join(" "),
            compiler.compile_only_args().join(" "),
        );
        if !depflags.is_empty() {
            out.push_str(" depfile = $DEPFILE\n");
        }
        let _ = writeln!(out, " description = Compiling {lang} object $out");
        out.push('\n');
    }

    out.push_str("# Rules for linking.\n\n");
    if let Some(static_linker) = ctx.static_linker {
        out.push_str("rule STATIC_LINKER\n");
        let _ = writeln!(
            out,
            " command = {}  $LINK_FLAGS $out $in",
            static_linker.exelist.join(" ")
        );
        out.push_str(" description = Static linking library $out\n\n");
    }
    for compiler in ctx.compilers {
        let lang = compiler.language().id();
        let _ = writeln!(out, "rule {lang}_LINKER");
        let _ = writeln!(
            out,
            " command = {}{} $FLAGS {} $in $LINK_FLAGS $aliasing",
            EXECUTE_WRAPPER,
            compiler.exelist().join(" "),
            compiler.output_args("$out").join(" "),
        );
        out.push_str(" description = Linking target $out\n\n");
    }

    out.push_str("# Other rules\n\n");
    out.push_str("rule CUSTOM_COMMAND\n");
    out.push_str(" command = $COMMAND\n");
    out.push_str(" description = $DESC\n");
    out.push_str(" restat = 1\n\n");

    let driver = std::env::current_exe()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "drydock".to_string());
    out.push_str("rule REGENERATE_BUILD\n");
    let _ = writeln!(
        out,
        " command = {QUOTE}{}{QUOTE} setup {QUOTE}{}{QUOTE} {QUOTE}{}{QUOTE} --reconfigure --backend ninja",
        ninja_quote(&driver),
        ninja_quote(&ctx.env.source_dir.display().to_string()),
        ninja_quote(&ctx.env.build_dir.display().to_string()),
    );
    out.push_str(" description = Regenerating build files\n");
    out.push_str(" generator = 1\n\n");
    Ok(())
}

/// Compile flags common to every source of `target` built by `compiler`.
fn basic_compiler_flags(
    ctx: &BackendContext,
    target: &BuildTarget,
    compiler: &dyn Compiler,
) -> Vec<String> {
    let lang = compiler.language().id();
    let buildtype = ctx.coredata.buildtype();
    let mut flags = Vec::new();
    flags.extend(compiler.buildtype_args(&buildtype));
    if buildtype != "plain" {
        let warning_level: u32 = ctx
            .coredata
            .builtin_string("warning_level")
            .parse()
            .unwrap_or(1);
        flags.extend(compiler.warn_args(warning_level));
    }
    if let Some(global) = ctx.build.global_args.get(lang) {
        flags.extend(global.iter().cloned());
    }
    if let Some(user) = ctx.coredata.compile_args.get(lang) {
        flags.extend(user.iter().cloned());
    }
    if let Some(extra) = target.extra_args.get(lang) {
        flags.extend(extra.iter().cloned());
    }
    if ctx.coredata.coverage() {
        flags.extend(compiler.coverage_args());
    }
    if target.kind == TargetKind::SharedLibrary {
        flags.extend(compiler.pic_args());
    }
    flags
}

/// Include flags: the target's private dir first, then each declared
/// include directory in both its build-relative and source-relative form.
fn include_flags(ctx: &BackendContext, target: &BuildTarget, compiler: &dyn Compiler) -> Vec<String> {
    let mut flags = vec![compiler.include_arg(&target.private_dir())];
    for group in &target.include_dirs {
        for dir in &group.dirs {
            let expdir = if group.base.is_empty() {
                dir.clone()
            } else {
                format!("{}/{}", group.base, dir)
            };
            let source_side = format!("{}/{}", ctx.build_to_src(), expdir);
            flags.push(compiler.include_arg(&expdir));
            flags.push(compiler.include_arg(&source_side));
        }
    }
    flags
}

fn pch_include_flags(target: &BuildTarget, compiler: &dyn Compiler) -> Vec<String> {
    let mut flags = Vec::new();
    for pch in &target.pch {
        if compiler.can_compile(std::path::Path::new(pch)) {
            let header_name = pch.rsplit('/').next().unwrap_or(pch);
            flags.extend(compiler.pch_use_args(&target.private_dir(), header_name));
        }
    }
    flags
}

fn write_target(ctx: &BackendContext, target: &BuildTarget, out: &mut String) -> Result<()> {
    debug!("emitting target {}", target.name);
    match target.kind {
        TargetKind::CustomTarget => write_custom_target(ctx, target, out),
        TargetKind::RunTarget => {
            write_run_target(ctx, target, out);
            Ok(())
        }
        _ => write_compiled_target(ctx, target, out),
    }
}

fn write_custom_target(ctx: &BackendContext, target: &BuildTarget, out: &mut String) -> Result<()> {
    let outs: Vec<String> = target
        .outputs
        .iter()
        .map(|o| qualified_output(target, o))
        .collect();
    let ins: Vec<String> = target
        .sources
        .iter()
        .map(|s| ctx.source_path(target, s))
        .collect();
    let mut command = Vec::with_capacity(target.command.len());
    for word in &target.command {
        let word = word
            .replace("@OUTPUT@", outs.first().map(String::as_str).unwrap_or(""))
            .replace("@INPUT@", ins.first().map(String::as_str).unwrap_or(""));
        command.push(word);
    }
    let dep_outputs = dependency_outputs(ctx, target)?;
    BuildElement::new(outs, "CUSTOM_COMMAND", ins)
        .deps(dep_outputs)
        .var("COMMAND", command)
        .var("DESC", vec!["Generating".to_string(), "$out".to_string()])
        .write(out);
    Ok(())
}

fn write_run_target(ctx: &BackendContext, target: &BuildTarget, out: &mut String) {
    let dep_outputs: Vec<String> = target
        .dependencies
        .iter()
        .filter_map(|d| ctx.build.target(d))
        .map(|d| d.output_path())
        .collect();
    BuildElement::one(&target.name, "CUSTOM_COMMAND", Vec::new())
        .deps(dep_outputs)
        .var("COMMAND", target.command.clone())
        .var(
            "DESC",
            vec!["Running".to_string(), format!("target {}.", target.name)],
        )
        .write(out);
}

fn dependency_outputs(ctx: &BackendContext, target: &BuildTarget) -> Result<Vec<String>> {
    let mut outputs = Vec::with_capacity(target.dependencies.len());
    for name in &target.dependencies {
        let dep = ctx.build.target(name).ok_or_else(|| {
            ConfigureError::internal(format!("target '{}' vanished from the model.", name))
        })?;
        outputs.push(dep.output_path());
    }
    Ok(outputs)
}

/// Expanded command and per-input output paths for one generator list.
fn write_generator_statements(
    ctx: &BackendContext,
    target: &BuildTarget,
    out: &mut String,
) -> Result<()> {
    for genlist in &target.generated {
        let per_input = genlist.generator.outputs.len();
        let (exe_path, exe_dep) = match &genlist.generator.exe {
            GeneratorExe::Program(path) => (path.clone(), None),
            GeneratorExe::Target(name) => {
                let exe_target = ctx.build.target(name).ok_or_else(|| {
                    ConfigureError::internal(format!("generator target '{name}' is missing."))
                })?;
                (exe_target.output_path(), Some(exe_target.output_path()))
            }
        };
        for (index, input) in genlist.inputs.iter().enumerate() {
            let infile = ctx.source_path(target, input);
            let outputs: Vec<String> = genlist.outputs
                [index * per_input..(index + 1) * per_input]
                .iter()
                .map(|o| format!("{}/{}", target.private_dir(), o))
                .collect();
            let primary_out = outputs[0].clone();
            let mut command = vec![exe_path.clone()];
            for arg in &genlist.generator.arguments {
                command.push(
                    arg.replace("@INPUT@", &infile)
                        .replace("@OUTPUT@", &primary_out),
                );
            }
            let mut elem = BuildElement::new(outputs, "CUSTOM_COMMAND", vec![infile]);
            if let Some(dep) = &exe_dep {
                elem = elem.dep(dep.clone());
            }
            elem.var("DESC", vec!["Generating".to_string(), "$out".to_string()])
                .var("COMMAND", command)
                .write(out);
        }
    }
    Ok(())
}

fn write_pch_statements(
    ctx: &BackendContext,
    target: &BuildTarget,
    out: &mut String,
) -> Result<Vec<String>> {
    let mut pch_outputs = Vec::new();
    for pch in &target.pch {
        let compiler = ctx.compiler_for_source(pch)?;
        let src = ctx.source_path(target, pch);
        let header_name = pch.rsplit('/').next().unwrap_or(pch);
        let dst = format!(
            "{}/{}.{}",
            target.private_dir(),
            header_name,
            compiler.pch_suffix()
        );
        let depfile = format!("{}.{}", dst, compiler.depfile_suffix());
        let flags = basic_compiler_flags(ctx, target, compiler);
        BuildElement::one(&dst, &format!("{}_COMPILER", compiler.language().id()), vec![src])
            .var("FLAGS", flags)
            .var("DEPFILE", vec![depfile])
            .write(out);
        pch_outputs.push(dst);
    }
    Ok(pch_outputs)
}

fn write_compiled_target(
    ctx: &BackendContext,
    target: &BuildTarget,
    out: &mut String,
) -> Result<()> {
    write_generator_statements(ctx, target, out)?;
    let pch_outputs = write_pch_statements(ctx, target, out)?;

    let generated_headers: Vec<String> = target
        .generated_headers()
        .iter()
        .map(|h| format!("{}/{}", target.private_dir(), h))
        .collect();

    let mut objects = Vec::new();

    // Generated sources compile out of the private dir.
    for genlist in &target.generated {
        for gen_out in &genlist.outputs {
            if crate::toolchain::is_header(std::path::Path::new(gen_out)) {
                continue;
            }
            let src = format!("{}/{}", target.private_dir(), gen_out);
            objects.push(write_single_compile(
                ctx,
                target,
                &src,
                gen_out,
                &generated_headers,
                &pch_outputs,
                out,
            )?);
        }
    }

    for source in &target.sources {
        if crate::toolchain::is_header(std::path::Path::new(source)) {
            continue;
        }
        let src = ctx.source_path(target, source);
        objects.push(write_single_compile(
            ctx,
            target,
            &src,
            source,
            &generated_headers,
            &pch_outputs,
            out,
        )?);
    }

    write_link(ctx, target, objects, out)
}

#[allow(clippy::too_many_arguments)]
fn write_single_compile(
    ctx: &BackendContext,
    target: &BuildTarget,
    src: &str,
    source_name: &str,
    generated_headers: &[String],
    pch_outputs: &[String],
    out: &mut String,
) -> Result<String> {
    let compiler = ctx.compiler_for_source(source_name)?;

    let obj_stem = if std::path::Path::new(source_name).is_absolute() {
        std::path::Path::new(source_name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source_name.to_string())
    } else {
        source_name.to_string()
    };
    let obj = format!(
        "{}/{}.{}",
        target.private_dir(),
        obj_stem,
        ctx.env.object_suffix()
    );
    let depfile = format!("{}.{}", obj, compiler.depfile_suffix());

    let mut flags = basic_compiler_flags(ctx, target, compiler);
    flags.extend(include_flags(ctx, target, compiler));
    flags.extend(pch_include_flags(target, compiler));
    for dep in &target.external_deps {
        flags.extend(dep.compile_args.iter().cloned());
    }

    let mut elem = BuildElement::one(
        &obj,
        &format!("{}_COMPILER", compiler.language().id()),
        vec![src.to_string()],
    );
    elem = elem.deps(generated_headers.iter().cloned());
    elem = elem.orderdeps(pch_outputs.iter().cloned());
    elem.var("DEPFILE", vec![depfile])
        .var("FLAGS", flags)
        .write(out);
    Ok(obj)
}

fn write_link(
    ctx: &BackendContext,
    target: &BuildTarget,
    objects: Vec<String>,
    out: &mut String,
) -> Result<()> {
    let buildtype = ctx.coredata.buildtype();
    let (rule, mut link_flags) = if target.kind == TargetKind::StaticLibrary {
        let static_linker = ctx.static_linker.ok_or_else(|| {
            ConfigureError::internal("static library emitted without a static linker.")
        })?;
        ("STATIC_LINKER".to_string(), static_linker.std_link_args())
    } else {
        let linker = link_driver(ctx, target)?;
        let mut flags = linker.buildtype_linker_args(&buildtype);
        if target.kind == TargetKind::SharedLibrary {
            flags.extend(linker.shared_lib_link_args());
            flags.extend(linker.pic_args());
            flags.extend(
                linker.soname_args(&target.filename, &ctx.env.host_machine().system),
            );
        }
        if let Some(user) = ctx.coredata.link_args.get(linker.language().id()) {
            flags.extend(user.iter().cloned());
        }
        if let Some(global) = ctx.build.global_link_args.get(linker.language().id()) {
            flags.extend(global.iter().cloned());
        }
        (format!("{}_LINKER", linker.language().id()), flags)
    };

    if target.kind != TargetKind::StaticLibrary {
        for dep in &target.external_deps {
            link_flags.extend(dep.link_args.iter().cloned());
        }
        // Direct library dependencies link by path; the ./ prefix keeps
        // the dynamic loader looking in the build tree during tests.
        for dep_output in dependency_outputs(ctx, target)? {
            link_flags.push(format!("./{dep_output}"));
        }
        if ctx.coredata.coverage() {
            let linker = link_driver(ctx, target)?;
            link_flags.extend(linker.coverage_link_args());
        }
    }

    let dep_targets = dependency_outputs(ctx, target)?;
    let mut aliasing = Vec::new();
    for alias in &target.aliases {
        let alias_path = if target.subdir.is_empty() {
            alias.clone()
        } else {
            format!("{}/{}", target.subdir, alias)
        };
        aliasing.extend([
            "&&".to_string(),
            "ln".to_string(),
            "-s".to_string(),
            "-f".to_string(),
            target.filename.clone(),
            alias_path,
        ]);
    }

    BuildElement::one(&target.output_path(), &rule, objects)
        .deps(dep_targets)
        .var("LINK_FLAGS", link_flags)
        .var("aliasing", aliasing)
        .write(out);
    Ok(())
}

/// The compiler driving this target's link step: the first configured
/// compiler that can compile one of its sources.
fn link_driver<'a>(ctx: &'a BackendContext, target: &BuildTarget) -> Result<&'a dyn Compiler> {
    for source in &target.sources {
        if let Ok(compiler) = ctx.compiler_for_source(source) {
            return Ok(compiler);
        }
    }
    ctx.compilers
        .first()
        .map(|c| c.as_ref())
        .ok_or_else(|| ConfigureError::internal("no compilers configured at link time."))
}

fn qualified_output(target: &BuildTarget, output: &str) -> String {
    if target.subdir.is_empty() {
        output.to_string()
    } else {
        format!("{}/{}", target.subdir, output)
    }
}

fn write_test_statements(ctx: &BackendContext, out: &mut String) {
    let test_data = ctx.env.test_data_path().display().to_string();
    BuildElement::one("test", "CUSTOM_COMMAND", vec!["all".to_string()])
        .var(
            "COMMAND",
            vec!["drydock-test".to_string(), test_data.clone()],
        )
        .var("DESC", vec!["Running".to_string(), "test".to_string(), "suite.".to_string()])
        .write(out);

    if let Some(valgrind) = find_executable("valgrind") {
        BuildElement::one("test-valgrind", "CUSTOM_COMMAND", vec!["all".to_string()])
            .var(
                "COMMAND",
                vec![
                    "drydock-test".to_string(),
                    test_data,
                    format!("--wrapper={}", valgrind.display()),
                ],
            )
            .var(
                "DESC",
                vec![
                    "Running".to_string(),
                    "test".to_string(),
                    "suite".to_string(),
                    "under".to_string(),
                    "Valgrind.".to_string(),
                ],
            )
            .write(out);
    }
}

fn write_install_statement(ctx: &BackendContext, out: &mut String) {
    let install_data = ctx.env.install_data_path().display().to_string();
    BuildElement::one("install", "CUSTOM_COMMAND", Vec::new())
        .dep("all")
        .var("COMMAND", vec!["drydock-install".to_string(), install_data])
        .var("DESC", vec!["Installing".to_string(), "files.".to_string()])
        .write(out);
}

fn write_coverage_statements(ctx: &BackendContext, out: &mut String) {
    let build_dir = ctx.env.build_dir.display().to_string();
    let mut added = false;
    if let Some(gcovr) = find_executable("gcovr") {
        added = true;
        BuildElement::one("coverage-xml", "CUSTOM_COMMAND", Vec::new())
            .var(
                "COMMAND",
                vec![
                    gcovr.display().to_string(),
                    "-x".to_string(),
                    "-r".to_string(),
                    build_dir.clone(),
                    "-o".to_string(),
                    "coverage.xml".to_string(),
                ],
            )
            .var(
                "DESC",
                vec![
                    "Generating".to_string(),
                    "XML".to_string(),
                    "coverage".to_string(),
                    "report.".to_string(),
                ],
            )
            .write(out);
        BuildElement::one("coverage-text", "CUSTOM_COMMAND", Vec::new())
            .var(
                "COMMAND",
                vec![
                    gcovr.display().to_string(),
                    "-r".to_string(),
                    build_dir.clone(),
                    "-o".to_string(),
                    "coverage.txt".to_string(),
                ],
            )
            .var(
                "DESC",
                vec![
                    "Generating".to_string(),
                    "text".to_string(),
                    "coverage".to_string(),
                    "report.".to_string(),
                ],
            )
            .write(out);
    }
    let lcov = find_executable("lcov");
    let genhtml = find_executable("genhtml");
    if let (Some(lcov), Some(genhtml)) = (lcov, genhtml) {
        added = true;
        BuildElement::one(
            "coverage-html",
            "phony",
            vec!["coveragereport/index.html".to_string()],
        )
        .write(out);
        let command = vec![
            lcov.display().to_string(),
            "--directory".to_string(),
            build_dir.clone(),
            "--capture".to_string(),
            "--output-file".to_string(),
            "coverage.info".to_string(),
            "--no-checksum".to_string(),
            "&&".to_string(),
            genhtml.display().to_string(),
            "--prefix".to_string(),
            build_dir,
            "--output-directory".to_string(),
            "coveragereport".to_string(),
            "--title".to_string(),
            "Code coverage".to_string(),
            "--legend".to_string(),
            "--show-details".to_string(),
            "coverage.info".to_string(),
        ];
        BuildElement::one("coveragereport/index.html", "CUSTOM_COMMAND", Vec::new())
            .var("COMMAND", command)
            .var(
                "DESC",
                vec![
                    "Generating".to_string(),
                    "HTML".to_string(),
                    "coverage".to_string(),
                    "report.".to_string(),
                ],
            )
            .write(out);
    }
    if !added {
        warn!("coverage requested but neither gcovr nor lcov/genhtml found");
    }
}

fn write_gcov_clean(out: &mut String) {
    for (phony, suffix) in [("clean-gcno", "gcno"), ("clean-gcda", "gcda")] {
        BuildElement::one(phony, "CUSTOM_COMMAND", Vec::new())
            .var(
                "COMMAND",
                vec![
                    "find".to_string(),
                    ".".to_string(),
                    "-name".to_string(),
                    format!("*.{suffix}"),
                    "-delete".to_string(),
                ],
            )
            .var(
                "DESC",
                vec![format!("Deleting {suffix} files.")],
            )
            .write(out);
    }
}

fn write_ending(ctx: &BackendContext, out: &mut String) -> Result<()> {
    let all_outputs: Vec<String> = ctx
        .build
        .emission_order()
        .iter()
        .filter(|t| t.kind.produces_output())
        .map(|t| t.output_path())
        .collect();
    BuildElement::new(vec!["all".to_string()], "phony", all_outputs).write(out);

    out.push_str("default all\n\n");

    let mut clean = BuildElement::one("clean", "CUSTOM_COMMAND", Vec::new())
        .var(
            "COMMAND",
            vec!["ninja".to_string(), "-t".to_string(), "clean".to_string()],
        )
        .var("DESC", vec!["Cleaning.".to_string()]);
    if ctx.coredata.coverage() {
        write_gcov_clean(out);
        clean = clean.dep("clean-gcda").dep("clean-gcno");
    }
    clean.write(out);

    let build_to_src = ctx.build_to_src();
    let def_files: Vec<String> = ctx
        .build
        .build_def_files
        .iter()
        .map(|f| format!("{build_to_src}/{f}"))
        .collect();
    BuildElement::one(NINJA_FILE, "REGENERATE_BUILD", def_files.clone()).write(out);
    // Build definition files must not fail the build when ninja stats
    // them; a phony statement keeps them harmless.
    BuildElement::new(def_files, "phony", Vec::new()).write(out);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ninja_quote_spaces_and_dollars() {
        assert_eq!(ninja_quote("a b"), "a$ b");
        assert_eq!(ninja_quote("pre$var"), "pre$$var");
        assert_eq!(ninja_quote("dir\\file"), "dir/file");
    }

    #[test]
    fn test_build_element_layout() {
        let mut out = String::new();
        BuildElement::one("main.o", "c_COMPILER", vec!["main.c".to_string()])
            .dep("gen.h".to_string())
            .orderdeps(vec!["pch.h.gch".to_string()])
            .var("DEPFILE", vec!["main.o.d".to_string()])
            .var("FLAGS", vec!["-g".to_string(), "-Wall".to_string()])
            .write(&mut out);
        let expected = "build main.o: c_COMPILER main.c | gen.h || pch.h.gch\n \
                        DEPFILE = main.o.d\n FLAGS = '-g' '-Wall'\n\n";
        if cfg!(not(windows)) {
            assert_eq!(out, expected);
        }
    }

    #[test]
    fn test_desc_passes_dollar_tokens_through() {
        let mut out = String::new();
        BuildElement::one("x", "CUSTOM_COMMAND", Vec::new())
            .var("DESC", vec!["Generating".to_string(), "$out".to_string()])
            .write(&mut out);
        // $out must stay expandable so the executor prints the real path.
        assert!(out.contains(" DESC = Generating $out\n"));
    }
}
