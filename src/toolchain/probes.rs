//! Capability probes.
//!
//! Each probe synthesises a minimal source snippet, invokes the compiler
//! in the language's scratch directory, and reads the exit status (and
//! stdout for the run-based probes). Scratch files are removed on every
//! exit path by `ScratchScope`, including probe failure.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Compiler, Language};
use crate::environment::Environment;
use crate::error::{ConfigureError, Result};
use crate::util::process::ProcessBuilder;

/// Owns the scratch directory for the duration of one probe: created and
/// emptied on entry, emptied again on drop no matter how the probe exits.
pub struct ScratchScope {
    dir: PathBuf,
}

impl ScratchScope {
    pub fn new(dir: &Path) -> Result<ScratchScope> {
        fs::create_dir_all(dir)?;
        crate::util::fs::clear_dir(dir)
            .map_err(|e| ConfigureError::environment(e.to_string()))?;
        Ok(ScratchScope {
            dir: dir.to_path_buf(),
        })
    }
}

impl Drop for ScratchScope {
    fn drop(&mut self) {
        let _ = crate::util::fs::clear_dir(&self.dir);
    }
}

/// Result of compiling and running a snippet.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub compiled: bool,
    pub returncode: i32,
    pub stdout: String,
    pub stderr: String,
}

pub(crate) fn exe_file_name(env: &Environment, base: &str) -> String {
    let suffix = env.exe_suffix();
    if suffix.is_empty() {
        base.to_string()
    } else {
        format!("{base}.{suffix}")
    }
}

fn probe_source_name(language: Language) -> String {
    format!("probe.{}", language.probe_suffix())
}

enum ProbeMode {
    CompileOnly,
    Link,
}

/// Compile `code` in the scratch directory. Returns whether the compiler
/// accepted it; the output path is only meaningful within `scope`.
fn invoke(
    compiler: &dyn Compiler,
    env: &Environment,
    scratch: &Path,
    code: &str,
    extra_args: &[String],
    mode: ProbeMode,
) -> Result<(bool, PathBuf, String)> {
    let src = scratch.join(probe_source_name(compiler.language()));
    fs::write(&src, code)?;
    let out = match mode {
        ProbeMode::CompileOnly => scratch.join("probe.o"),
        ProbeMode::Link => scratch.join(exe_file_name(env, "probe")),
    };

    let exelist = compiler.exelist();
    let mut builder = ProcessBuilder::new(&exelist[0]).args(&exelist[1..]);
    if matches!(mode, ProbeMode::CompileOnly) {
        builder = builder.args(compiler.compile_only_args());
    }
    builder = builder
        .arg(src.display().to_string())
        .args(compiler.output_args(&out.display().to_string()))
        .args(extra_args.iter())
        .cwd(scratch);

    let output = builder.exec().map_err(|e| {
        ConfigureError::environment(format!(
            "could not invoke compiler {}: {}",
            exelist.join(" "),
            e
        ))
    })?;
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    Ok((output.status.success(), out, stderr))
}

/// Does the compiler accept this snippet at compile time?
pub fn compiles(
    compiler: &dyn Compiler,
    env: &Environment,
    code: &str,
    extra_args: &[String],
) -> Result<bool> {
    let scratch = env.scratch_dir(compiler.language().id());
    let _scope = ScratchScope::new(&scratch)?;
    let (ok, _, _) = invoke(compiler, env, &scratch, code, extra_args, ProbeMode::CompileOnly)?;
    Ok(ok)
}

/// Does this snippet compile and link into an executable?
pub fn links(
    compiler: &dyn Compiler,
    env: &Environment,
    code: &str,
    extra_args: &[String],
) -> Result<bool> {
    let scratch = env.scratch_dir(compiler.language().id());
    let _scope = ScratchScope::new(&scratch)?;
    let (ok, _, _) = invoke(compiler, env, &scratch, code, extra_args, ProbeMode::Link)?;
    Ok(ok)
}

/// Compile, link, and run a snippet, capturing its output.
pub fn run(
    compiler: &dyn Compiler,
    env: &Environment,
    code: &str,
    extra_args: &[String],
) -> Result<RunResult> {
    let scratch = env.scratch_dir(compiler.language().id());
    let _scope = ScratchScope::new(&scratch)?;
    let (ok, exe, stderr) = invoke(compiler, env, &scratch, code, extra_args, ProbeMode::Link)?;
    if !ok {
        return Ok(RunResult {
            compiled: false,
            returncode: -1,
            stdout: String::new(),
            stderr,
        });
    }

    let output = if env.is_cross() {
        let wrapper = env.exe_wrapper().ok_or_else(|| {
            ConfigureError::environment(
                "can not run test programs in this cross build without an exe wrapper",
            )
        })?;
        ProcessBuilder::new(&wrapper[0])
            .args(&wrapper[1..])
            .arg(exe.display().to_string())
            .exec()?
    } else {
        ProcessBuilder::new(&exe).exec()?
    };
    Ok(RunResult {
        compiled: true,
        returncode: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

fn property_key(prefix: &str, name: &str) -> String {
    format!("{}_{}", prefix, name.replace(' ', "_"))
}

/// `sizeof(typename)` on the host machine. Under cross compilation
/// without a runner this reads the machine file instead of running code.
pub fn sizeof(
    compiler: &dyn Compiler,
    env: &Environment,
    typename: &str,
    prefix: &str,
) -> Result<i64> {
    if env.is_cross() && env.exe_wrapper().is_none() {
        let key = property_key("sizeof", typename);
        return env.cross_property_int(&key).ok_or_else(|| {
            ConfigureError::environment(format!(
                "cannot determine sizeof({typename}) when cross compiling without \
                 an exe wrapper; add '{key}' to the [properties] section of the \
                 cross file"
            ))
        });
    }
    let code = format!(
        "#include <stdio.h>\n{prefix}\nint main(int argc, char **argv) {{\n  \
         printf(\"%ld\", (long)(sizeof({typename})));\n  return 0;\n}}\n"
    );
    let res = run(compiler, env, &code, &[])?;
    if !res.compiled {
        return Err(ConfigureError::environment(format!(
            "could not compile sizeof test for type '{typename}'"
        )));
    }
    if res.returncode != 0 {
        return Err(ConfigureError::environment(format!(
            "could not run sizeof test binary for type '{typename}'"
        )));
    }
    res.stdout.trim().parse::<i64>().map_err(|_| {
        ConfigureError::environment(format!(
            "sizeof test for '{typename}' printed '{}', not a number",
            res.stdout.trim()
        ))
    })
}

/// Alignment of `typename`, measured through `offsetof` on a probe struct.
pub fn alignment(
    compiler: &dyn Compiler,
    env: &Environment,
    typename: &str,
    prefix: &str,
) -> Result<i64> {
    if env.is_cross() && env.exe_wrapper().is_none() {
        let key = property_key("alignment", typename);
        return env.cross_property_int(&key).ok_or_else(|| {
            ConfigureError::environment(format!(
                "cannot determine alignment of {typename} when cross compiling \
                 without an exe wrapper; add '{key}' to the [properties] section \
                 of the cross file"
            ))
        });
    }
    let code = format!(
        "#include <stdio.h>\n#include <stddef.h>\n{prefix}\n\
         struct probe_align {{\n  char c;\n  {typename} target;\n}};\n\n\
         int main(int argc, char **argv) {{\n  \
         printf(\"%d\", (int)offsetof(struct probe_align, target));\n  return 0;\n}}\n"
    );
    let res = run(compiler, env, &code, &[])?;
    if !res.compiled {
        return Err(ConfigureError::environment(format!(
            "could not compile alignment test for type '{typename}'"
        )));
    }
    if res.returncode != 0 {
        return Err(ConfigureError::environment(format!(
            "could not run alignment test binary for type '{typename}'"
        )));
    }
    let align: i64 = res.stdout.trim().parse().map_err(|_| {
        ConfigureError::environment(format!(
            "alignment test for '{typename}' printed '{}', not a number",
            res.stdout.trim()
        ))
    })?;
    if align == 0 {
        return Err(ConfigureError::environment(format!(
            "could not determine alignment of '{typename}'"
        )));
    }
    Ok(align)
}

/// Is the named header includable?
pub fn has_header(compiler: &dyn Compiler, env: &Environment, header: &str) -> Result<bool> {
    let code = format!("#include <{header}>\nint main(int argc, char **argv) {{ return 0; }}\n");
    compiles(compiler, env, &code, &[])
}

/// Does the environment provide `funcname`?
///
/// Three stages, any positive wins: (1) a linkable symbol, probed with
/// the candidate undefined to defeat macros and with glibc `__stub_`
/// sentinels rejected, (2) a definition provided by the headers in
/// `prefix`, probed at -O0 so it is not folded away, (3) a compiler
/// builtin.
pub fn has_function(
    compiler: &dyn Compiler,
    env: &Environment,
    funcname: &str,
    prefix: &str,
) -> Result<bool> {
    let stubs_fail = format!(
        "#if defined __stub_{funcname} || defined __stub___{funcname}\n\
         fail fail fail this function is not going to work\n\
         #endif\n"
    );

    let symbol_probe = format!(
        "#define {funcname} drydock_disable_define_of_{funcname}\n\
         #include <limits.h>\n\
         {prefix}\n\
         #undef {funcname}\n\
         #ifdef __cplusplus\n\
         extern \"C\"\n\
         #endif\n\
         char {funcname} ();\n\
         {stubs_fail}\
         int main () {{ return {funcname} (); }}\n"
    );
    if links(compiler, env, &symbol_probe, &[])? {
        return Ok(true);
    }

    let no_opt = compiler.no_optimization_args();
    let header_probe = format!(
        "#include <limits.h>\n{prefix}\n{stubs_fail}\nint main () {{ {funcname}; return 0; }}\n"
    );
    if links(compiler, env, &header_probe, &no_opt)? {
        return Ok(true);
    }

    let builtin_probe = format!("int main () {{ __builtin_{funcname}; return 0; }}\n");
    links(compiler, env, &builtin_probe, &no_opt)
}

/// Does `typename` name a type, given the includes in `prefix`?
pub fn has_type(
    compiler: &dyn Compiler,
    env: &Environment,
    typename: &str,
    prefix: &str,
) -> Result<bool> {
    let code = format!("{prefix}\nvoid probe_fn() {{ (void)sizeof({typename}); }}\n");
    compiles(compiler, env, &code, &[])
}

/// Does `typename` have the named member?
pub fn has_member(
    compiler: &dyn Compiler,
    env: &Environment,
    typename: &str,
    member: &str,
    prefix: &str,
) -> Result<bool> {
    let code = format!(
        "{prefix}\nvoid probe_fn() {{\n  {typename} probe_var;\n  (void)probe_var.{member};\n}}\n"
    );
    compiles(compiler, env, &code, &[])
}

/// Does the compiler accept the given command line argument?
pub fn has_argument(compiler: &dyn Compiler, env: &Environment, arg: &str) -> Result<bool> {
    let mut extra = vec![arg.to_string()];
    if compiler.family().is_gnu_like() {
        // Unknown options only warn without this.
        extra.push("-Werror".to_string());
    }
    debug!("checking whether {} accepts '{arg}'", compiler.exelist().join(" "));
    compiles(
        compiler,
        env,
        "int main(int argc, char **argv) { return 0; }\n",
        &extra,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scratch_scope_cleans_up() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("sanity-c");
        {
            let _scope = ScratchScope::new(&dir).unwrap();
            fs::write(dir.join("probe.c"), "int main(){}").unwrap();
            assert!(dir.join("probe.c").exists());
        }
        assert!(dir.exists());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn test_property_key_normalises_spaces() {
        assert_eq!(property_key("sizeof", "unsigned int"), "sizeof_unsigned_int");
    }
}
