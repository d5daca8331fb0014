//! Hand-coded dependency providers.
//!
//! These cover packages that do not ship usable pkg-config metadata.
//! Each provider follows the same contract as the pkg-config strategy:
//! it reports found/not-found and fills in compile args, link args, and,
//! where the package works that way, extra sources or pre-compile rules.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{pkgconfig, Dependency, FindKwargs, PrecompileRule};
use crate::environment::Environment;
use crate::error::{ConfigureError, Result};
use crate::util::process::{find_executable, ProcessBuilder};

pub type Provider = fn(&FindKwargs, &Environment) -> Result<Dependency>;

/// The provider claiming this (lowercased) dependency name, if any.
pub fn provider_for(lower_name: &str) -> Option<Provider> {
    Some(match lower_name {
        "boost" => boost,
        "gtest" => gtest,
        "gmock" => gmock,
        "qt5" => qt5,
        "gnustep" => gnustep,
        "wxwidgets" => wxwidgets,
        "sdl2" => sdl2,
        "gl" => gl,
        "threads" => threads,
        "python3" => python3,
        "appleframeworks" => apple_frameworks,
        _ => return None,
    })
}

fn capture(tool: &Path, args: &[&str]) -> Option<Vec<String>> {
    let out = ProcessBuilder::new(tool).args(args).exec().ok()?;
    if !out.status.success() {
        return None;
    }
    Some(
        String::from_utf8_lossy(&out.stdout)
            .split_whitespace()
            .map(|s| s.to_string())
            .collect(),
    )
}

/// Boost: seeded by `BOOST_ROOT`, otherwise the system locations. The
/// version is read out of `version.hpp`; each requested module must have
/// a matching header directory, and linkable modules gain `-lboost_*`.
fn boost(kwargs: &FindKwargs, _env: &Environment) -> Result<Dependency> {
    let (incdir, libdir, custom_root) = match std::env::var("BOOST_ROOT") {
        Ok(root) if !root.is_empty() => {
            let root = PathBuf::from(root);
            (root.join("include").join("boost"), root.join("lib"), true)
        }
        _ => (
            PathBuf::from("/usr/include/boost"),
            PathBuf::from("/usr/lib"),
            false,
        ),
    };

    let version = match boost_version(&incdir) {
        Some(v) => v,
        None => return Ok(Dependency::not_found("boost")),
    };

    for module in &kwargs.modules {
        if !incdir.join(module).is_dir() {
            debug!("requested boost module '{module}' has no header directory");
            return Ok(Dependency::not_found("boost"));
        }
    }

    let mut dep = Dependency::found("boost", Some(version));
    if custom_root {
        if let Some(parent) = incdir.parent() {
            dep.compile_args.push(format!("-I{}", parent.display()));
        }
        dep.link_args.push(format!("-L{}", libdir.display()));
    }
    for module in &kwargs.modules {
        if boost_module_has_library(&libdir, module) {
            dep.link_args.push(format!("-lboost_{module}"));
        }
    }
    Ok(dep)
}

fn boost_version(incdir: &Path) -> Option<String> {
    let text = std::fs::read_to_string(incdir.join("version.hpp")).ok()?;
    for line in text.lines() {
        if line.starts_with("#define") && line.contains("BOOST_LIB_VERSION") {
            let raw = line.split_whitespace().last()?;
            return Some(raw.trim_matches('"').replace('_', "."));
        }
    }
    None
}

fn boost_module_has_library(libdir: &Path, module: &str) -> bool {
    let entries = match std::fs::read_dir(libdir) {
        Ok(e) => e,
        Err(_) => return false,
    };
    let stem = format!("libboost_{module}.");
    entries
        .filter_map(|e| e.ok())
        .any(|e| e.file_name().to_string_lossy().starts_with(&stem))
}

/// GTest: prefer the installed library, fall back to the vendored
/// sources under /usr/src/gtest which consumers must compile themselves.
fn gtest(_kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    let libname = format!("libgtest.{}", env.shared_lib_suffix());
    if Path::new("/usr/lib").join(&libname).exists() {
        let mut dep = Dependency::found("gtest", None);
        dep.link_args = vec!["-lgtest".to_string(), "-lpthread".to_string()];
        return Ok(dep);
    }
    let all_src = Path::new("/usr/src/gtest/src/gtest-all.cc");
    let main_src = Path::new("/usr/src/gtest/src/gtest_main.cc");
    if all_src.exists() {
        let mut dep = Dependency::found("gtest", None);
        dep.compile_args = vec!["-I/usr/src/gtest".to_string()];
        dep.link_args = vec!["-lpthread".to_string()];
        dep.sources.push(all_src.display().to_string());
        if main_src.exists() {
            dep.sources.push(main_src.display().to_string());
        }
        return Ok(dep);
    }
    Ok(Dependency::not_found("gtest"))
}

fn gmock(_kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    let libname = format!("libgmock.{}", env.shared_lib_suffix());
    if Path::new("/usr/lib").join(&libname).exists() {
        let mut dep = Dependency::found("gmock", None);
        dep.link_args = vec!["-lgmock".to_string()];
        return Ok(dep);
    }
    Ok(Dependency::not_found("gmock"))
}

/// Qt 5: each requested module resolves through pkg-config, and the
/// moc/uic code generators are located and version checked. Targets
/// linking Qt receive moc and uic pre-compile rules.
fn qt5(kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    if kwargs.modules.is_empty() {
        return Err(ConfigureError::invalid_arguments(
            "the qt5 dependency requires at least one entry in 'modules'",
        ));
    }

    let mut compile_args = Vec::new();
    let mut link_args = Vec::new();
    let mut version = None;
    for module in &kwargs.modules {
        let pkg_name = format!("Qt5{module}");
        let module_dep = pkgconfig::query(&pkg_name, kwargs, env)?;
        if !module_dep.found {
            debug!("qt5 module '{module}' not found via pkg-config");
            return Ok(Dependency::not_found("qt5"));
        }
        if version.is_none() {
            version = module_dep.version.clone();
        }
        compile_args.extend(module_dep.compile_args);
        link_args.extend(module_dep.link_args);
    }

    let moc = match find_executable("moc") {
        Some(p) => p,
        None => return Ok(Dependency::not_found("qt5")),
    };
    let uic = match find_executable("uic") {
        Some(p) => p,
        None => return Ok(Dependency::not_found("qt5")),
    };
    // moc and uic write their version banners to stderr.
    verify_qt_tool_version(&moc, "moc")?;
    verify_qt_tool_version(&uic, "uic")?;
    let rcc = find_executable("rcc");

    let mut dep = Dependency::found("qt5", version);
    dep.compile_args = compile_args;
    dep.link_args = link_args;
    dep.precompile_rules.push(PrecompileRule {
        name: "moc_compile".to_string(),
        cmd_list: vec![
            moc.display().to_string(),
            "@INFILE@".to_string(),
            "-o".to_string(),
            "@OUTFILE@".to_string(),
        ],
        name_template: "moc_@BASENAME@.cpp".to_string(),
        src_keyword: "moc_headers".to_string(),
        description: "Compiling @INFILE@ with the moc preprocessor".to_string(),
    });
    dep.precompile_rules.push(PrecompileRule {
        name: "ui_compile".to_string(),
        cmd_list: vec![
            uic.display().to_string(),
            "@INFILE@".to_string(),
            "-o".to_string(),
            "@OUTFILE@".to_string(),
        ],
        name_template: "ui_@BASENAME@.h".to_string(),
        src_keyword: "ui_files".to_string(),
        description: "Compiling @INFILE@ with the ui compiler".to_string(),
    });
    if let Some(rcc) = rcc {
        dep.precompile_rules.push(PrecompileRule {
            name: "rc_compile".to_string(),
            cmd_list: vec![
                rcc.display().to_string(),
                "@INFILE@".to_string(),
                "-o".to_string(),
                "@OUTFILE@".to_string(),
            ],
            name_template: "rc_@BASENAME@.cpp".to_string(),
            src_keyword: "qresources".to_string(),
            description: "Compiling @INFILE@ with the rcc compiler".to_string(),
        });
    }
    Ok(dep)
}

fn verify_qt_tool_version(tool: &Path, name: &str) -> Result<()> {
    let out = ProcessBuilder::new(tool).arg("-v").exec()?;
    let banner = format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    if banner.contains('5') {
        Ok(())
    } else {
        Err(ConfigureError::dependency(format!(
            "the {name} tool at {} is not for Qt 5 (reported: {})",
            tool.display(),
            banner.trim()
        )))
    }
}

/// GNUstep via gnustep-config. The tool emits a pile of flags irrelevant
/// to consumers; only defines, include paths, and pthread survive.
fn gnustep(kwargs: &FindKwargs, _env: &Environment) -> Result<Dependency> {
    let config = match find_executable("gnustep-config") {
        Some(p) => p,
        None => return Ok(Dependency::not_found("gnustep")),
    };
    let flags = match capture(&config, &["--objc-flags"]) {
        Some(f) => f,
        None => return Ok(Dependency::not_found("gnustep")),
    };
    let libs_arg = if kwargs.modules.iter().any(|m| m == "gui") {
        "--gui-libs"
    } else {
        "--base-libs"
    };
    let libs = capture(&config, &[libs_arg]).unwrap_or_default();

    let mut dep = Dependency::found("gnustep", None);
    dep.compile_args = flags
        .into_iter()
        .filter(|f| {
            f.starts_with("-D")
                || f.starts_with("-f")
                || f.starts_with("-I")
                || f == "-pthread"
                || (f.starts_with("-W") && f != "-Wall")
        })
        .collect();
    dep.link_args = libs;
    Ok(dep)
}

fn wxwidgets(kwargs: &FindKwargs, _env: &Environment) -> Result<Dependency> {
    let config = match find_executable("wx-config") {
        Some(p) => p,
        None => return Ok(Dependency::not_found("wxwidgets")),
    };
    let version = capture(&config, &["--version"]).and_then(|v| v.into_iter().next());
    let compile_args = match capture(&config, &["--cxxflags"]) {
        Some(f) => f,
        None => return Ok(Dependency::not_found("wxwidgets")),
    };
    let mut libs_args: Vec<&str> = vec!["--libs"];
    let module_refs: Vec<&str> = kwargs.modules.iter().map(|m| m.as_str()).collect();
    libs_args.extend(module_refs);
    let link_args = capture(&config, &libs_args).unwrap_or_default();

    let mut dep = Dependency::found("wxwidgets", version);
    dep.compile_args = compile_args;
    dep.link_args = link_args;
    Ok(dep)
}

fn sdl2(kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    if let Some(config) = find_executable("sdl2-config") {
        if let (Some(cflags), Some(libs)) = (
            capture(&config, &["--cflags"]),
            capture(&config, &["--libs"]),
        ) {
            let version = capture(&config, &["--version"]).and_then(|v| v.into_iter().next());
            let mut dep = Dependency::found("sdl2", version);
            dep.compile_args = cflags;
            dep.link_args = libs;
            return Ok(dep);
        }
    }
    pkgconfig::query("sdl2", kwargs, env)
}

/// OpenGL: a framework on Apple, a system library elsewhere.
fn gl(kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    if env.host_is_darwin() {
        let mut dep = Dependency::found("gl", None);
        dep.link_args = vec!["-framework".to_string(), "OpenGL".to_string()];
        return Ok(dep);
    }
    if env.host_is_windows() {
        let mut dep = Dependency::found("gl", None);
        dep.link_args = vec!["-lopengl32".to_string()];
        return Ok(dep);
    }
    let pkg = pkgconfig::query("gl", kwargs, env)?;
    if pkg.found {
        return Ok(pkg);
    }
    let mut dep = Dependency::found("gl", None);
    dep.link_args = vec!["-lGL".to_string()];
    Ok(dep)
}

fn threads(_kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    let mut dep = Dependency::found("threads", None);
    if !env.host_is_windows() {
        dep.compile_args = vec!["-pthread".to_string()];
        dep.link_args = vec!["-pthread".to_string()];
    }
    Ok(dep)
}

fn python3(_kwargs: &FindKwargs, _env: &Environment) -> Result<Dependency> {
    let config = match find_executable("python3-config") {
        Some(p) => p,
        None => return Ok(Dependency::not_found("python3")),
    };
    let compile_args = match capture(&config, &["--includes"]) {
        Some(f) => f,
        None => return Ok(Dependency::not_found("python3")),
    };
    let link_args = capture(&config, &["--ldflags", "--embed"])
        .or_else(|| capture(&config, &["--ldflags"]))
        .unwrap_or_default();
    let version = find_executable("python3").and_then(|py| {
        let out = ProcessBuilder::new(&py).arg("--version").exec().ok()?;
        String::from_utf8_lossy(&out.stdout)
            .split_whitespace()
            .nth(1)
            .map(|s| s.to_string())
    });

    let mut dep = Dependency::found("python3", version);
    dep.compile_args = compile_args;
    dep.link_args = link_args;
    Ok(dep)
}

fn apple_frameworks(kwargs: &FindKwargs, env: &Environment) -> Result<Dependency> {
    if kwargs.modules.is_empty() {
        return Err(ConfigureError::invalid_arguments(
            "the appleframeworks dependency requires at least one entry in 'modules'",
        ));
    }
    if !env.host_is_darwin() {
        return Ok(Dependency::not_found("appleframeworks"));
    }
    let mut dep = Dependency::found("appleframeworks", None);
    for framework in &kwargs.modules {
        dep.link_args.push("-framework".to_string());
        dep.link_args.push(framework.clone());
    }
    Ok(dep)
}

/// On Apple hosts, an otherwise-unresolved name may be a system
/// framework bundle.
pub fn extra_framework(name: &str) -> Option<Dependency> {
    let bundle = PathBuf::from("/System/Library/Frameworks").join(format!("{name}.framework"));
    if !bundle.is_dir() {
        return None;
    }
    let mut dep = Dependency::found(name, None);
    dep.link_args = vec!["-framework".to_string(), name.to_string()];
    Some(dep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coredata::CoreData;
    use crate::deps::find_external_dependency;

    #[test]
    fn test_provider_table_is_closed() {
        for name in [
            "boost",
            "gtest",
            "gmock",
            "qt5",
            "gnustep",
            "wxwidgets",
            "sdl2",
            "gl",
            "threads",
            "python3",
            "appleframeworks",
        ] {
            assert!(provider_for(name).is_some(), "missing provider for {name}");
        }
        assert!(provider_for("zlib").is_none());
    }

    #[test]
    fn test_threads_always_found() {
        let env = Environment::new("/s", "/b", None, None);
        let mut core = CoreData::new();
        let dep =
            find_external_dependency("threads", &FindKwargs::required(), &env, &mut core).unwrap();
        assert!(dep.found);
        if !env.host_is_windows() {
            assert!(dep.link_args.contains(&"-pthread".to_string()));
        }
    }

    #[test]
    fn test_qt5_without_modules_is_invalid() {
        let env = Environment::new("/s", "/b", None, None);
        let mut core = CoreData::new();
        let err = find_external_dependency("qt5", &FindKwargs::required(), &env, &mut core)
            .unwrap_err();
        assert!(err.to_string().contains("modules"));
    }
}
