//! Backends: serialisers from the populated build model to files the
//! downstream executor, installer, and test runner consume.

pub mod datafiles;
pub mod ninja;

use crate::coredata::CoreData;
use crate::environment::Environment;
use crate::error::{ConfigureError, Result};
use crate::model::{Build, BuildTarget};
use crate::toolchain::{Compiler, StaticLinker};

/// Everything a backend reads. The build model is taken by shared
/// reference: backends never mutate it.
pub struct BackendContext<'a> {
    pub env: &'a Environment,
    pub coredata: &'a CoreData,
    pub build: &'a Build,
    pub compilers: &'a [Box<dyn Compiler>],
    pub static_linker: Option<&'a StaticLinker>,
}

impl<'a> BackendContext<'a> {
    /// Relative path from the build directory back to the source root.
    pub fn build_to_src(&self) -> String {
        crate::util::fs::relative_path(&self.env.build_dir, &self.env.source_dir)
            .display()
            .to_string()
            .replace('\\', "/")
    }

    /// The compiler that handles `src`, by suffix.
    pub fn compiler_for_source(&self, src: &str) -> Result<&dyn Compiler> {
        crate::toolchain::compiler_for_source(self.compilers, std::path::Path::new(src))
            .ok_or_else(|| {
                ConfigureError::environment(format!(
                    "no configured compiler can handle file '{src}'"
                ))
            })
    }

    /// Source path of `file` in target `target`, relative to the build
    /// directory (or absolute when `file` is absolute).
    pub fn source_path(&self, target: &BuildTarget, file: &str) -> String {
        if std::path::Path::new(file).is_absolute() {
            return file.replace('\\', "/");
        }
        let mut parts = vec![self.build_to_src()];
        if !target.subdir.is_empty() {
            parts.push(target.subdir.clone());
        }
        parts.push(file.to_string());
        parts.join("/")
    }
}

/// Run the ninja backend plus the data-file writers.
pub fn generate(ctx: &BackendContext) -> Result<()> {
    ninja::generate(ctx)?;
    datafiles::write_install_data(ctx)?;
    datafiles::write_test_data(ctx)?;
    datafiles::write_build_snapshot(ctx)?;
    Ok(())
}
