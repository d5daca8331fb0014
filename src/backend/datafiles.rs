//! Writers for the data files under `meson-private/` consumed by the
//! external installer and test runner, plus the build model snapshot
//! that feeds introspection and reconfigure.

use serde::{Deserialize, Serialize};

use super::BackendContext;
use crate::error::{ConfigureError, Result};
use crate::model::{Build, TargetKind, TestEntry};
use crate::util::record;

const INSTALL_MAGIC: &[u8; 8] = b"DRYINSTL";
const INSTALL_VERSION: u32 = 1;
const TEST_MAGIC: &[u8; 8] = b"DRYTESTS";
const TEST_VERSION: u32 = 1;
const BUILD_MAGIC: &[u8; 8] = b"DRYBUILD";
const BUILD_VERSION: u32 = 1;

/// How the installer combines `DESTDIR` with the install prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DestdirJoin {
    /// `DESTDIR` is prepended to the absolute destination path.
    Prepend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetInstall {
    /// Built file, relative to the build directory.
    pub path: String,
    /// Destination directory under the prefix.
    pub install_dir: String,
    pub aliases: Vec<String>,
    pub strip: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInstall {
    /// Absolute source path.
    pub source: String,
    /// Destination: a directory for headers and data, a full path for
    /// man pages (which gain a .gz suffix).
    pub destination: String,
}

/// Everything the external installer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallManifest {
    pub prefix: String,
    pub targets: Vec<TargetInstall>,
    pub headers: Vec<FileInstall>,
    pub man: Vec<FileInstall>,
    pub data: Vec<FileInstall>,
    pub umask: u32,
    pub destdir_join: DestdirJoin,
    pub install_scripts: Vec<Vec<String>>,
}

/// One test or benchmark record for the external runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    /// Executable path relative to the build directory.
    pub exe: String,
    pub args: Vec<String>,
    pub workdir: Option<String>,
    pub env: Vec<(String, String)>,
    pub timeout_secs: u64,
    pub suites: Vec<String>,
    pub is_parallel: bool,
    pub is_cross: bool,
    pub exe_wrapper: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestManifest {
    pub tests: Vec<TestRecord>,
}

#[cfg(unix)]
fn current_umask() -> u32 {
    // umask can only be read by setting it; set and restore.
    unsafe {
        let current = libc::umask(0);
        libc::umask(current);
        current as u32
    }
}

#[cfg(not(unix))]
fn current_umask() -> u32 {
    0o022
}

/// Build the install manifest from the model.
pub fn install_manifest(ctx: &BackendContext) -> InstallManifest {
    let core = ctx.coredata;
    let strip = core.builtin_bool("strip");
    let bindir = core.builtin_string("bindir");
    let libdir = core.builtin_string("libdir");
    let includedir = core.builtin_string("includedir");
    let datadir = core.builtin_string("datadir");
    let mandir = core.builtin_string("mandir");

    let mut targets = Vec::new();
    for target in ctx.build.targets() {
        if !target.install || !target.kind.produces_output() {
            continue;
        }
        let default_dir = match target.kind {
            TargetKind::Executable => bindir.clone(),
            _ => libdir.clone(),
        };
        targets.push(TargetInstall {
            path: target.output_path(),
            install_dir: target.install_dir.clone().unwrap_or(default_dir),
            aliases: target.aliases.clone(),
            strip,
        });
    }

    let source_dir = &ctx.env.source_dir;
    let mut headers = Vec::new();
    for group in &ctx.build.headers {
        let destination = if group.subdir.is_empty() {
            includedir.clone()
        } else {
            format!("{includedir}/{}", group.subdir)
        };
        for file in &group.sources {
            headers.push(FileInstall {
                source: source_dir
                    .join(&group.source_subdir)
                    .join(file)
                    .display()
                    .to_string(),
                destination: destination.clone(),
            });
        }
    }

    let mut man = Vec::new();
    for group in &ctx.build.man {
        for file in &group.sources {
            let section = file.rsplit('.').next().unwrap_or("1");
            let file_name = file.rsplit('/').next().unwrap_or(file);
            man.push(FileInstall {
                source: source_dir
                    .join(&group.source_subdir)
                    .join(file)
                    .display()
                    .to_string(),
                destination: format!("{mandir}/man{section}/{file_name}.gz"),
            });
        }
    }

    let mut data = Vec::new();
    for group in &ctx.build.data {
        let destination = if group.subdir.is_empty() {
            datadir.clone()
        } else {
            format!("{datadir}/{}", group.subdir)
        };
        for file in &group.sources {
            data.push(FileInstall {
                source: source_dir
                    .join(&group.source_subdir)
                    .join(file)
                    .display()
                    .to_string(),
                destination: destination.clone(),
            });
        }
    }

    InstallManifest {
        prefix: core.builtin_string("prefix"),
        targets,
        headers,
        man,
        data,
        umask: current_umask(),
        destdir_join: DestdirJoin::Prepend,
        install_scripts: Vec::new(),
    }
}

pub fn write_install_data(ctx: &BackendContext) -> Result<()> {
    let manifest = install_manifest(ctx);
    let bytes = record::encode(INSTALL_MAGIC, INSTALL_VERSION, &manifest)
        .map_err(|e| ConfigureError::internal(format!("install manifest encoding failed: {e}.")))?;
    crate::util::fs::write_atomic(&ctx.env.install_data_path(), &bytes)
        .map_err(|e| ConfigureError::environment(e.to_string()))?;
    Ok(())
}

fn test_records(ctx: &BackendContext, entries: &[TestEntry]) -> Result<Vec<TestRecord>> {
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        let target = ctx.build.target(&entry.exe_target).ok_or_else(|| {
            ConfigureError::internal(format!(
                "test '{}' references missing target '{}'.",
                entry.name, entry.exe_target
            ))
        })?;
        records.push(TestRecord {
            name: entry.name.clone(),
            exe: target.output_path(),
            args: entry.args.clone(),
            workdir: entry.workdir.clone(),
            env: entry.env.clone(),
            timeout_secs: entry.timeout_secs,
            suites: entry.suites.clone(),
            is_parallel: entry.is_parallel,
            is_cross: entry.is_cross,
            exe_wrapper: entry.exe_wrapper.clone(),
        });
    }
    Ok(records)
}

pub fn write_test_data(ctx: &BackendContext) -> Result<()> {
    let tests = TestManifest {
        tests: test_records(ctx, &ctx.build.tests)?,
    };
    let bytes = record::encode(TEST_MAGIC, TEST_VERSION, &tests)
        .map_err(|e| ConfigureError::internal(format!("test manifest encoding failed: {e}.")))?;
    crate::util::fs::write_atomic(&ctx.env.test_data_path(), &bytes)
        .map_err(|e| ConfigureError::environment(e.to_string()))?;

    let benchmarks = TestManifest {
        tests: test_records(ctx, &ctx.build.benchmarks)?,
    };
    let bytes = record::encode(TEST_MAGIC, TEST_VERSION, &benchmarks)
        .map_err(|e| ConfigureError::internal(format!("benchmark manifest encoding failed: {e}.")))?;
    crate::util::fs::write_atomic(&ctx.env.benchmark_data_path(), &bytes)
        .map_err(|e| ConfigureError::environment(e.to_string()))?;
    Ok(())
}

/// Snapshot of the whole build model, read back by introspection.
pub fn write_build_snapshot(ctx: &BackendContext) -> Result<()> {
    let bytes = record::encode(BUILD_MAGIC, BUILD_VERSION, ctx.build)
        .map_err(|e| ConfigureError::internal(format!("build snapshot encoding failed: {e}.")))?;
    crate::util::fs::write_atomic(&ctx.env.build_snapshot_path(), &bytes)
        .map_err(|e| ConfigureError::environment(e.to_string()))?;
    Ok(())
}

pub fn load_build_snapshot(path: &std::path::Path) -> Result<Build> {
    let bytes = std::fs::read(path).map_err(|e| {
        ConfigureError::environment(format!(
            "could not read build snapshot {}: {} (has this directory been configured?)",
            path.display(),
            e
        ))
    })?;
    record::decode(BUILD_MAGIC, BUILD_VERSION, &bytes).map_err(|e| {
        ConfigureError::environment(format!(
            "{e}; the build directory was configured by an incompatible drydock \
             version, wipe it and configure again"
        ))
    })
}

pub fn load_test_manifest(path: &std::path::Path) -> Result<TestManifest> {
    let bytes = std::fs::read(path).map_err(|e| {
        ConfigureError::environment(format!("could not read {}: {}", path.display(), e))
    })?;
    record::decode(TEST_MAGIC, TEST_VERSION, &bytes)
        .map_err(|e| ConfigureError::environment(e.to_string()))
}

pub fn load_install_manifest(path: &std::path::Path) -> Result<InstallManifest> {
    let bytes = std::fs::read(path).map_err(|e| {
        ConfigureError::environment(format!("could not read {}: {}", path.display(), e))
    })?;
    record::decode(INSTALL_MAGIC, INSTALL_VERSION, &bytes)
        .map_err(|e| ConfigureError::environment(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_manifest_round_trip() {
        let manifest = InstallManifest {
            prefix: "/usr/local".to_string(),
            targets: vec![TargetInstall {
                path: "app".to_string(),
                install_dir: "bin".to_string(),
                aliases: vec![],
                strip: false,
            }],
            headers: vec![],
            man: vec![],
            data: vec![],
            umask: 0o022,
            destdir_join: DestdirJoin::Prepend,
            install_scripts: vec![],
        };
        let bytes = record::encode(INSTALL_MAGIC, INSTALL_VERSION, &manifest).unwrap();
        let back: InstallManifest = record::decode(INSTALL_MAGIC, INSTALL_VERSION, &bytes).unwrap();
        assert_eq!(manifest, back);
    }

    #[test]
    fn test_test_manifest_round_trip() {
        let manifest = TestManifest {
            tests: vec![TestRecord {
                name: "smoke".to_string(),
                exe: "app".to_string(),
                args: vec!["--fast".to_string()],
                workdir: None,
                env: vec![("KEY".to_string(), "value".to_string())],
                timeout_secs: 30,
                suites: vec!["unit".to_string()],
                is_parallel: true,
                is_cross: false,
                exe_wrapper: None,
            }],
        };
        let bytes = record::encode(TEST_MAGIC, TEST_VERSION, &manifest).unwrap();
        let back: TestManifest = record::decode(TEST_MAGIC, TEST_VERSION, &bytes).unwrap();
        assert_eq!(manifest, back);
    }
}
