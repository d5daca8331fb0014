//! The pkg-config resolution strategy.
//!
//! The pkg-config binary itself is located once per process and the
//! result cached; after initialisation the cached value is read-only.
//! `PKG_CONFIG_PATH` is inherited by every query invocation.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

use super::{Dependency, FindKwargs};
use crate::environment::Environment;
use crate::error::{ConfigureError, Result};
use crate::util::process::{find_executable, ProcessBuilder};

static PKG_CONFIG: OnceLock<Option<PathBuf>> = OnceLock::new();

/// The pkg-config binary, located on first use.
pub fn pkg_config_binary(env: &Environment) -> Option<&'static Path> {
    PKG_CONFIG
        .get_or_init(|| {
            let path = env
                .machine_binary("pkgconfig", false)
                .and_then(|words| words.into_iter().next().map(PathBuf::from))
                .or_else(|| find_executable("pkg-config"))?;
            // Confirm it answers at all before trusting it.
            match ProcessBuilder::new(&path).arg("--version").exec() {
                Ok(out) if out.status.success() => {
                    debug!(
                        "found pkg-config {} at {}",
                        String::from_utf8_lossy(&out.stdout).trim(),
                        path.display()
                    );
                    Some(path)
                }
                _ => None,
            }
        })
        .as_deref()
}

/// Query pkg-config for one module. A missing module or a missing
/// pkg-config binary yields a not-found dependency; infrastructure
/// failures after the module is known are hard errors.
pub fn query(name: &str, kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    let binary = match pkg_config_binary(env) {
        Some(b) => b,
        None => {
            debug!("no pkg-config binary available, '{name}' cannot be found this way");
            return Ok(Dependency::not_found(name));
        }
    };

    let version_out = ProcessBuilder::new(binary)
        .args(["--modversion", name])
        .exec()?;
    if !version_out.status.success() {
        return Ok(Dependency::not_found(name));
    }
    let version = String::from_utf8_lossy(&version_out.stdout).trim().to_string();

    let cflags_out = ProcessBuilder::new(binary).args(["--cflags", name]).exec()?;
    if !cflags_out.status.success() {
        return Err(ConfigureError::dependency(format!(
            "pkg-config could not generate cflags for '{name}'"
        )));
    }
    let compile_args: Vec<String> = String::from_utf8_lossy(&cflags_out.stdout)
        .split_whitespace()
        .map(|s| s.to_string())
        .collect();

    let mut libs_cmd = ProcessBuilder::new(binary);
    if kwargs.static_link {
        libs_cmd = libs_cmd.arg("--static");
    }
    let libs_out = libs_cmd.args(["--libs", name]).exec()?;
    if !libs_out.status.success() {
        return Err(ConfigureError::dependency(format!(
            "pkg-config could not generate libs for '{name}'"
        )));
    }
    let link_args: Vec<String> = String::from_utf8_lossy(&libs_out.stdout)
        .split_whitespace()
        .map(|s| resolve_la_archive(s))
        .collect();

    let mut dep = Dependency::found(name, Some(version));
    dep.compile_args = compile_args;
    dep.link_args = link_args;
    Ok(dep)
}

/// A libtool `.la` archive path is resolved to its backing shared
/// library by reading the archive's `dlname` and `libdir` fields; any
/// other argument passes through unchanged.
fn resolve_la_archive(arg: &str) -> String {
    if !arg.ends_with(".la") {
        return arg.to_string();
    }
    match parse_la_file(Path::new(arg)) {
        Some(resolved) => resolved.display().to_string(),
        None => arg.to_string(),
    }
}

fn parse_la_file(path: &Path) -> Option<PathBuf> {
    let text = std::fs::read_to_string(path).ok()?;
    let mut dlname = None;
    let mut libdir = None;
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("dlname=") {
            dlname = Some(value.trim().trim_matches('\'').to_string());
        } else if let Some(value) = line.strip_prefix("libdir=") {
            libdir = Some(value.trim().trim_matches('\'').to_string());
        }
    }
    let dlname = dlname.filter(|s| !s.is_empty())?;
    let libdir = libdir.filter(|s| !s.is_empty())?;
    Some(PathBuf::from(libdir).join(dlname))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_la_file_resolution() {
        let tmp = TempDir::new().unwrap();
        let la = tmp.path().join("libdemo.la");
        std::fs::write(
            &la,
            "# libdemo.la - a libtool library file\n\
             dlname='libdemo.so.3'\n\
             library_names='libdemo.so.3.1.0 libdemo.so.3 libdemo.so'\n\
             libdir='/usr/lib/demo'\n",
        )
        .unwrap();
        let resolved = resolve_la_archive(&la.display().to_string());
        assert_eq!(resolved, "/usr/lib/demo/libdemo.so.3");
    }

    #[test]
    fn test_non_la_arg_passes_through() {
        assert_eq!(resolve_la_archive("-lz"), "-lz");
        assert_eq!(resolve_la_archive("/usr/lib/libz.so"), "/usr/lib/libz.so");
    }

    #[test]
    fn test_unreadable_la_passes_through() {
        assert_eq!(
            resolve_la_archive("/no/such/file.la"),
            "/no/such/file.la"
        );
    }
}
