//! Compiler and archiver detection.
//!
//! Executables are resolved from, in order: the machine description
//! file, the per-language environment variable, and a default candidate
//! list. The chosen executable is classified into a family from its
//! version output and must pass a write-compile-run sanity check before
//! configuration continues.

use std::path::Path;

use tracing::{debug, info};

use super::probes::{exe_file_name, ScratchScope};
use super::{Compiler, CompilerFamily, GnuLikeCompiler, Language, MsvcCompiler};
use crate::environment::{compiler_env_var, default_compiler_candidates, Environment};
use crate::error::{ConfigureError, Result};
use crate::util::process::{find_executable, ProcessBuilder};

/// Detect the compiler for one language, classify it, and sanity check it.
pub fn detect_compiler(language: Language, env: &Environment) -> Result<Box<dyn Compiler>> {
    let exelist = resolve_exelist(language, env)?;
    let (family, version) = classify_compiler(&exelist)?;
    debug!(
        "classified {} as family '{}' version {}",
        exelist.join(" "),
        family.id(),
        version
    );

    let compiler: Box<dyn Compiler> = if family.is_gnu_like() {
        Box::new(GnuLikeCompiler::new(language, family, exelist, version))
    } else if family == CompilerFamily::Msvc {
        Box::new(MsvcCompiler::new(language, exelist, version))
    } else {
        return Err(ConfigureError::environment(format!(
            "detected compiler family '{}' for language '{}', which drydock \
             cannot drive; use a gcc, clang, or msvc toolchain",
            family.id(),
            language.id()
        )));
    };

    sanity_check(compiler.as_ref(), env)?;
    info!(
        "{} compiler: {} ({} {})",
        language.id(),
        compiler.exelist().join(" "),
        compiler.family().id(),
        compiler.version()
    );
    Ok(compiler)
}

fn resolve_exelist(language: Language, env: &Environment) -> Result<Vec<String>> {
    if let Some(exelist) = env.machine_binary(language.id(), false) {
        return Ok(exelist);
    }
    if let Some(var) = compiler_env_var(language.id()) {
        if let Ok(value) = std::env::var(var) {
            if !value.trim().is_empty() {
                return Ok(value.split_whitespace().map(|s| s.to_string()).collect());
            }
        }
    }
    for candidate in default_compiler_candidates(language.id()) {
        if let Some(path) = find_executable(candidate) {
            return Ok(vec![path.display().to_string()]);
        }
    }
    Err(ConfigureError::environment(format!(
        "no {} compiler found; set {} or install one of [{}]",
        language.id(),
        compiler_env_var(language.id()).unwrap_or("a compiler override"),
        default_compiler_candidates(language.id()).join(", ")
    )))
}

/// Run the version probe and classify its output into a family.
fn classify_compiler(exelist: &[String]) -> Result<(CompilerFamily, String)> {
    let output = ProcessBuilder::new(&exelist[0])
        .args(&exelist[1..])
        .arg("--version")
        .exec()
        .map_err(|e| {
            ConfigureError::environment(format!(
                "could not run compiler candidate '{}': {}",
                exelist.join(" "),
                e
            ))
        })?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let combined = format!("{stdout}\n{stderr}");

    let family = classify_version_output(&combined).ok_or_else(|| {
        ConfigureError::environment(format!(
            "could not classify compiler '{}' from its version output",
            exelist.join(" ")
        ))
    })?;
    Ok((family, extract_version(&combined)))
}

fn classify_version_output(text: &str) -> Option<CompilerFamily> {
    let lower = text.to_lowercase();
    // clang identifies itself before mentioning gcc compatibility, so it
    // must be tested first.
    if lower.contains("clang") {
        return Some(CompilerFamily::Clang);
    }
    if text.contains("Free Software Foundation") || lower.starts_with("gcc") || lower.starts_with("cc ") {
        return Some(CompilerFamily::Gcc);
    }
    if text.contains("Microsoft") {
        return Some(CompilerFamily::Msvc);
    }
    if text.contains("(ICC)") || lower.contains("intel") {
        return Some(CompilerFamily::Intel);
    }
    if text.contains("Sun C") {
        return Some(CompilerFamily::Sun);
    }
    if text.contains("PGI") {
        return Some(CompilerFamily::Pgi);
    }
    if text.contains("PathScale") {
        return Some(CompilerFamily::Pathscale);
    }
    if text.contains("Open64") {
        return Some(CompilerFamily::Open64);
    }
    if lower.contains("g95") {
        return Some(CompilerFamily::G95);
    }
    if text.contains("NAG Fortran") {
        return Some(CompilerFamily::Nagfor);
    }
    if text.contains("DMD") {
        return Some(CompilerFamily::Dmd);
    }
    if text.contains("LDC") {
        return Some(CompilerFamily::Ldc);
    }
    if lower.contains("gdc") {
        return Some(CompilerFamily::Gdc);
    }
    if text.contains("Mono") {
        return Some(CompilerFamily::Mono);
    }
    if text.contains("Vala") {
        return Some(CompilerFamily::Valac);
    }
    if lower.contains("rustc") {
        return Some(CompilerFamily::Rustc);
    }
    if lower.contains("javac") {
        return Some(CompilerFamily::Javac);
    }
    None
}

/// Pull the first dotted number out of version output.
fn extract_version(text: &str) -> String {
    for token in text.split_whitespace() {
        let candidate = token.trim_matches(|c: char| !c.is_ascii_digit() && c != '.');
        if candidate.contains('.')
            && candidate
                .chars()
                .all(|c| c.is_ascii_digit() || c == '.')
            && candidate.chars().any(|c| c.is_ascii_digit())
        {
            return candidate.to_string();
        }
    }
    "unknown".to_string()
}

/// Write, compile, and run a trivial program in the language's scratch
/// directory. Under cross compilation without an executable wrapper the
/// run step is skipped.
pub fn sanity_check(compiler: &dyn Compiler, env: &Environment) -> Result<()> {
    let scratch = env.scratch_dir(compiler.language().id());
    let scope = ScratchScope::new(&scratch)?;

    let src_name = format!("sanitycheck.{}", compiler.language().probe_suffix());
    let src = scratch.join(&src_name);
    let exe = scratch.join(exe_file_name(env, "sanitycheck"));
    std::fs::write(&src, "int main(int argc, char **argv) { return 0; }\n")?;

    let exelist = compiler.exelist();
    let output = ProcessBuilder::new(&exelist[0])
        .args(&exelist[1..])
        .arg(src.display().to_string())
        .args(compiler.output_args(&exe.display().to_string()))
        .cwd(&scratch)
        .exec()
        .map_err(|e| {
            ConfigureError::environment(format!(
                "could not run compiler {}: {}",
                exelist.join(" "),
                e
            ))
        })?;
    if !output.status.success() {
        return Err(ConfigureError::environment(format!(
            "compiler {} can not compile programs:\n{}",
            exelist.join(" "),
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    if env.is_cross() {
        match env.exe_wrapper() {
            Some(wrapper) => {
                let status = ProcessBuilder::new(&wrapper[0])
                    .args(&wrapper[1..])
                    .arg(exe.display().to_string())
                    .exec()?;
                if !status.status.success() {
                    return Err(ConfigureError::environment(format!(
                        "executables created by {} are not runnable under the \
                         configured exe wrapper",
                        exelist.join(" ")
                    )));
                }
            }
            // No wrapper: the run step is assumed to succeed.
            None => debug!("cross build without exe wrapper, skipping sanity run"),
        }
    } else {
        let status = ProcessBuilder::new(&exe).exec()?;
        if !status.status.success() {
            return Err(ConfigureError::environment(format!(
                "executables created by compiler {} are not runnable",
                exelist.join(" ")
            )));
        }
    }

    drop(scope);
    Ok(())
}

/// The static archiver used for static-library targets.
#[derive(Debug, Clone)]
pub struct StaticLinker {
    pub exelist: Vec<String>,
}

impl StaticLinker {
    /// Archive creation flags passed through `LINK_FLAGS`.
    pub fn std_link_args(&self) -> Vec<String> {
        vec!["csr".to_string()]
    }
}

/// Detect the static archiver: `AR`, then the machine file, then PATH.
pub fn detect_static_linker(env: &Environment) -> Result<StaticLinker> {
    if let Ok(ar) = std::env::var("AR") {
        if !ar.trim().is_empty() {
            return Ok(StaticLinker {
                exelist: ar.split_whitespace().map(|s| s.to_string()).collect(),
            });
        }
    }
    if let Some(exelist) = env.machine_binary("ar", false) {
        return Ok(StaticLinker { exelist });
    }
    for candidate in ["ar", "llvm-ar"] {
        if let Some(path) = find_executable(candidate) {
            return Ok(StaticLinker {
                exelist: vec![path.display().to_string()],
            });
        }
    }
    Err(ConfigureError::environment(
        "no static archiver found; set AR or install ar",
    ))
}

/// True when `path` names a file a detected compiler could compile; used
/// by tests and the backend's compiler-for-source lookup.
pub fn compiler_for_source<'a>(
    compilers: &'a [Box<dyn Compiler>],
    src: &Path,
) -> Option<&'a dyn Compiler> {
    compilers
        .iter()
        .find(|c| c.can_compile(src))
        .map(|c| c.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_gcc_banner() {
        let text = "cc (Debian 12.2.0-14) 12.2.0\nCopyright (C) 2022 Free Software Foundation, Inc.";
        assert_eq!(classify_version_output(text), Some(CompilerFamily::Gcc));
        assert_eq!(extract_version(text), "12.2.0");
    }

    #[test]
    fn test_classify_clang_banner() {
        let text = "Apple clang version 15.0.0 (clang-1500.1.0.2.5)";
        assert_eq!(classify_version_output(text), Some(CompilerFamily::Clang));
        assert_eq!(extract_version(text), "15.0.0");
    }

    #[test]
    fn test_classify_msvc_banner() {
        let text = "Microsoft (R) C/C++ Optimizing Compiler Version 19.29.30133 for x64";
        assert_eq!(classify_version_output(text), Some(CompilerFamily::Msvc));
        assert_eq!(extract_version(text), "19.29.30133");
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify_version_output("mystery tool v7"), None);
    }
}
