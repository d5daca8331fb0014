//! Read-only introspection over a configured build directory.
//!
//! Each query loads the persisted snapshots and prints newline-delimited
//! JSON records on stdout. Nothing here mutates the build tree.

use std::io::Write;
use std::path::Path;

use serde_json::json;

use crate::backend::datafiles;
use crate::coredata::CoreData;
use crate::environment::PRIVATE_DIR_NAME;
use crate::error::{ConfigureError, Result};

/// Which dump to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Targets,
    TargetFiles(String),
    BuildsystemFiles,
    BuildOptions,
    Tests,
    Dependencies,
    ProjectInfo,
}

pub fn introspect(build_dir: &Path, query: &Query, out: &mut dyn Write) -> Result<()> {
    let private = build_dir.join(PRIVATE_DIR_NAME);
    let build = datafiles::load_build_snapshot(
        &private.join(crate::environment::BUILD_SNAPSHOT_FILE),
    )?;
    let coredata = CoreData::load(&private.join(crate::coredata::COREDATA_FILE))?;

    let write_record = |out: &mut dyn Write, record: serde_json::Value| -> Result<()> {
        writeln!(out, "{record}").map_err(|e| ConfigureError::environment(e.to_string()))
    };

    match query {
        Query::Targets => {
            for target in build.targets() {
                write_record(
                    out,
                    json!({
                        "name": target.name,
                        "id": target.name,
                        "type": target.kind.as_str(),
                        "filename": target.output_path(),
                        "installed": target.install,
                    }),
                )?;
            }
        }
        Query::TargetFiles(name) => {
            let target = build.target(name).ok_or_else(|| {
                ConfigureError::invalid_arguments(format!("no target named '{name}'"))
            })?;
            for source in &target.sources {
                let path = if target.subdir.is_empty() {
                    source.clone()
                } else {
                    format!("{}/{}", target.subdir, source)
                };
                write_record(out, json!(path))?;
            }
        }
        Query::BuildsystemFiles => {
            for file in &build.build_def_files {
                write_record(out, json!(file))?;
            }
        }
        Query::BuildOptions => {
            for option in coredata
                .builtin_options
                .values()
                .chain(coredata.project_options.values())
            {
                write_record(
                    out,
                    json!({
                        "name": option.name,
                        "type": option.kind.as_str(),
                        "value": option.value.as_display_string(),
                        "description": option.description,
                        "choices": option.choices,
                    }),
                )?;
            }
        }
        Query::Tests => {
            for test in &build.tests {
                write_record(
                    out,
                    json!({
                        "name": test.name,
                        "exe": test.exe_target,
                        "args": test.args,
                        "env": test.env,
                        "timeout": test.timeout_secs,
                        "suites": test.suites,
                        "is_parallel": test.is_parallel,
                        "is_cross": test.is_cross,
                    }),
                )?;
            }
        }
        Query::Dependencies => {
            for dep in coredata.deps.values() {
                write_record(
                    out,
                    json!({
                        "name": dep.name,
                        "found": dep.found,
                        "version": dep.version,
                        "compile_args": dep.compile_args,
                        "link_args": dep.link_args,
                    }),
                )?;
            }
        }
        Query::ProjectInfo => {
            write_record(
                out,
                json!({
                    "name": build.project_name,
                    "version": build.project_version,
                    "subprojects": build.subprojects,
                }),
            )?;
        }
    }
    Ok(())
}
