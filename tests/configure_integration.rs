//! End-to-end configure scenarios driven through the real binary.
//!
//! Scenarios that need a working C toolchain skip themselves when none
//! is installed; everything else runs everywhere.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

fn drydock() -> Command {
    Command::cargo_bin("drydock").unwrap()
}

/// Is there a usable C compiler on this machine?
fn has_c_compiler() -> bool {
    if let Ok(cc) = std::env::var("CC") {
        if which::which(cc.split_whitespace().next().unwrap_or("cc")).is_ok() {
            return true;
        }
    }
    ["cc", "gcc", "clang"]
        .iter()
        .any(|name| which::which(name).is_ok())
}

macro_rules! require_c_compiler {
    () => {
        if !has_c_compiler() {
            eprintln!("no C compiler found, skipping");
            return;
        }
    };
}

struct Project {
    _tmp: TempDir,
    source_dir: PathBuf,
    build_dir: PathBuf,
}

impl Project {
    fn new(build_definition: &str) -> Project {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("src");
        let build_dir = tmp.path().join("build");
        fs::create_dir_all(&source_dir).unwrap();
        fs::write(source_dir.join("meson.build"), build_definition).unwrap();
        Project {
            _tmp: tmp,
            source_dir,
            build_dir,
        }
    }

    fn file(&self, name: &str, contents: &str) -> &Self {
        let path = self.source_dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
        self
    }

    fn setup(&self) -> assert_cmd::assert::Assert {
        drydock()
            .arg("setup")
            .arg(&self.source_dir)
            .arg(&self.build_dir)
            .assert()
    }

    fn manifest(&self) -> String {
        fs::read_to_string(self.build_dir.join("build.ninja")).unwrap()
    }

    fn manifest_path(&self) -> PathBuf {
        self.build_dir.join("build.ninja")
    }
}

const TRIVIAL_MAIN: &str = "int main(int argc, char **argv) { return 0; }\n";

// ============================================================================
// Scenario: trivial executable
// ============================================================================

#[test]
fn test_trivial_executable() {
    require_c_compiler!();
    let project = Project::new("project('triv', 'c')\nexecutable('a', 'a.c')\n");
    project.file("a.c", TRIVIAL_MAIN);

    project.setup().success();

    let manifest = project.manifest();
    assert_eq!(manifest.matches("rule c_COMPILER\n").count(), 1);
    assert_eq!(manifest.matches("rule c_LINKER\n").count(), 1);
    assert!(manifest.contains("a.c.o"));
    assert!(manifest.lines().any(|l| l.starts_with("build a: c_LINKER")));
    let all_line = manifest
        .lines()
        .find(|l| l.starts_with("build all: phony"))
        .expect("all phony present");
    assert!(all_line.contains('a'));
    assert!(manifest.contains("default all"));
}

// ============================================================================
// Scenario: static library consumed by an executable
// ============================================================================

#[test]
fn test_static_library_link() {
    require_c_compiler!();
    let project = Project::new(
        "project('p', 'c')\n\
         l = static_library('lib', 'lib.c')\n\
         executable('e', 'main.c', link_with : l)\n",
    );
    project.file("lib.c", "int answer(void) { return 42; }\n");
    project.file("main.c", "int answer(void);\nint main(void) { return answer() - 42; }\n");

    project.setup().success();

    let manifest = project.manifest();
    assert!(manifest.contains("lib.c.o"));
    assert!(manifest
        .lines()
        .any(|l| l.starts_with("build liblib.a: STATIC_LINKER")));
    assert!(manifest.contains("main.c.o"));

    let link_line_index = manifest.find("build e: c_LINKER").expect("link statement");
    let archive_index = manifest.find("build liblib.a:").expect("archive statement");
    assert!(archive_index < link_line_index, "library emitted before consumer");

    let e_statement = &manifest[link_line_index..];
    let first_block: String = e_statement
        .lines()
        .take_while(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(first_block.contains("| liblib.a"), "direct dependency listed");
    assert!(first_block.contains("./liblib.a"), "LINK_FLAGS contains the archive path");
}

// ============================================================================
// Scenario: shared library with a soname alias
// ============================================================================

#[test]
#[cfg(target_os = "linux")]
fn test_shared_library_alias() {
    require_c_compiler!();
    let project = Project::new(
        "project('s', 'c')\nshared_library('foo', 'foo.c', soversion : '1')\n",
    );
    project.file("foo.c", "int foo_fn(void) { return 1; }\n");

    project.setup().success();

    let manifest = project.manifest();
    assert!(manifest
        .lines()
        .any(|l| l.starts_with("build libfoo.so.1: c_LINKER")));
    assert!(manifest.contains("-Wl,-soname,libfoo.so.1"));
    let statement_start = manifest.find("build libfoo.so.1:").unwrap();
    let statement: String = manifest[statement_start..]
        .lines()
        .take_while(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    assert!(statement.contains("aliasing"));
    assert!(statement.contains("ln"));
    assert!(statement.contains("libfoo.so"));
}

// ============================================================================
// Scenario: missing dependencies, required and optional
// ============================================================================

#[test]
fn test_missing_required_dependency_fails() {
    require_c_compiler!();
    let project = Project::new(
        "project('d', 'c')\ndependency('definitely-missing-xyz')\nexecutable('a', 'a.c')\n",
    );
    project.file("a.c", TRIVIAL_MAIN);

    project
        .setup()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("definitely-missing-xyz"))
        .stderr(predicate::str::contains("not found"));
    assert!(!project.manifest_path().exists());
}

#[test]
fn test_failed_configure_keeps_previous_manifest() {
    require_c_compiler!();
    let project = Project::new("project('d', 'c')\nexecutable('a', 'a.c')\n");
    project.file("a.c", TRIVIAL_MAIN);
    project.setup().success();
    let before = project.manifest();

    fs::write(
        project.source_dir.join("meson.build"),
        "project('d', 'c')\ndependency('definitely-missing-xyz')\nexecutable('a', 'a.c')\n",
    )
    .unwrap();
    project.setup().failure().code(1);
    assert_eq!(project.manifest(), before, "previous manifest intact");
}

#[test]
fn test_optional_missing_dependency() {
    require_c_compiler!();
    let project = Project::new(
        "project('d', 'c')\n\
         d = dependency('definitely-missing-xyz', required : false)\n\
         if d.found()\n\
           error('should not be reached')\n\
         endif\n\
         executable('a', 'a.c')\n",
    );
    project.file("a.c", TRIVIAL_MAIN);

    project.setup().success();
    let manifest = project.manifest();
    assert!(!manifest.contains("definitely-missing-xyz"));
}

// ============================================================================
// Scenario: configure_file idempotence and manifest idempotence
// ============================================================================

#[test]
fn test_configure_file_preserves_mtime() {
    require_c_compiler!();
    let project = Project::new(
        "project('cf', 'c')\n\
         conf = configuration_data()\n\
         conf.set('NAME', 'demo')\n\
         conf.set('HAVE_THING', true)\n\
         configure_file(input : 'config.h.in', output : 'config.h', configuration : conf)\n\
         executable('a', 'a.c')\n",
    );
    project.file(
        "config.h.in",
        "#define NAME \"@NAME@\"\n#mesondefine HAVE_THING\n",
    );
    project.file("a.c", TRIVIAL_MAIN);

    project.setup().success();
    let output = project.build_dir.join("config.h");
    let contents = fs::read_to_string(&output).unwrap();
    assert!(contents.contains("#define NAME \"demo\""));
    assert!(contents.contains("#define HAVE_THING"));
    let mtime_before = fs::metadata(&output).unwrap().modified().unwrap();

    std::thread::sleep(std::time::Duration::from_millis(30));
    project.setup().success();
    let mtime_after = fs::metadata(&output).unwrap().modified().unwrap();
    assert_eq!(mtime_before, mtime_after, "unchanged output keeps its mtime");
    assert_eq!(contents, fs::read_to_string(&output).unwrap());
}

#[test]
fn test_manifest_is_idempotent() {
    require_c_compiler!();
    let project = Project::new("project('idem', 'c')\nexecutable('a', 'a.c')\n");
    project.file("a.c", TRIVIAL_MAIN);

    project.setup().success();
    let first = project.manifest();
    project.setup().success();
    let second = project.manifest();
    assert_eq!(first, second, "reconfiguring unchanged inputs is byte-identical");
}

// ============================================================================
// Introspection and reconfigure
// ============================================================================

#[test]
fn test_introspect_targets_and_options() {
    require_c_compiler!();
    let project = Project::new(
        "project('intro', 'c')\n\
         lib = static_library('util', 'util.c')\n\
         e = executable('app', 'main.c', link_with : lib, install : true)\n\
         test('smoke', e)\n",
    );
    project.file("util.c", "int u(void) { return 0; }\n");
    project.file("main.c", TRIVIAL_MAIN);
    project.setup().success();

    drydock()
        .args(["introspect", "--targets"])
        .arg(&project.build_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\":\"app\""))
        .stdout(predicate::str::contains("\"type\":\"static_library\""));

    drydock()
        .args(["introspect", "--buildoptions"])
        .arg(&project.build_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\":\"buildtype\""));

    drydock()
        .args(["introspect", "--tests"])
        .arg(&project.build_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\":\"smoke\""));

    drydock()
        .args(["introspect", "--buildsystem-files"])
        .arg(&project.build_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("meson.build"));
}

#[test]
fn test_reconfigure_keeps_options() {
    require_c_compiler!();
    let project = Project::new("project('re', 'c')\nexecutable('a', 'a.c')\n");
    project.file("a.c", TRIVIAL_MAIN);

    drydock()
        .arg("setup")
        .arg(&project.source_dir)
        .arg(&project.build_dir)
        .args(["-D", "buildtype=release"])
        .assert()
        .success();
    assert!(project.manifest().contains("-O3"));

    drydock()
        .arg("setup")
        .arg(&project.source_dir)
        .arg(&project.build_dir)
        .arg("--reconfigure")
        .assert()
        .success();
    assert!(project.manifest().contains("-O3"), "recorded options survive");
}

#[test]
fn test_project_options_are_visible() {
    require_c_compiler!();
    let project = Project::new(
        "project('opt', 'c')\n\
         if get_option('fancy')\n\
           add_global_arguments('-DFANCY', language : 'c')\n\
         endif\n\
         executable('a', 'a.c')\n",
    );
    project.file(
        "meson_options.txt",
        "option('fancy', type : 'boolean', value : true, description : 'extra mode')\n",
    );
    project.file("a.c", TRIVIAL_MAIN);
    project.setup().success();
    assert!(project.manifest().contains("-DFANCY"));
}

// ============================================================================
// Failure modes that need no toolchain
// ============================================================================

#[test]
fn test_parse_error_exit_code() {
    let project = Project::new("project('bad', 'c'\n");
    project
        .setup()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("parse error"));
}

#[test]
fn test_first_statement_must_be_project() {
    let project = Project::new("x = 3\nproject('late', 'c')\n");
    project
        .setup()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("project()"));
}

#[test]
fn test_keyword_before_positional_rejected() {
    let project = Project::new("project('kw', 'c')\nexecutable(sources : 'a.c', 'a')\n");
    project
        .setup()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("positional argument after keyword"));
}

#[test]
fn test_missing_source_dir() {
    let tmp = TempDir::new().unwrap();
    drydock()
        .arg("setup")
        .arg(tmp.path().join("nowhere"))
        .arg(tmp.path().join("build"))
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("meson.build"));
}

#[test]
fn test_unknown_backend_rejected() {
    let project = Project::new("project('b', 'c')\n");
    drydock()
        .arg("setup")
        .arg(&project.source_dir)
        .arg(&project.build_dir)
        .args(["--backend", "xcode"])
        .assert()
        .failure()
        .code(1);
}

// ============================================================================
// Subdirectories and generated headers
// ============================================================================

#[test]
fn test_subdir_targets_and_reentry() {
    require_c_compiler!();
    let project = Project::new(
        "project('sub', 'c')\nsubdir('one')\nexecutable('a', 'a.c', link_with : inner)\n",
    );
    project.file("one/meson.build", "inner = static_library('inner', 'inner.c')\n");
    project.file("one/inner.c", "int inner_fn(void) { return 0; }\n");
    project.file("a.c", TRIVIAL_MAIN);
    project.setup().success();
    let manifest = project.manifest();
    assert!(manifest.contains("one/libinner.a"));

    // Entering the same directory twice is rejected.
    fs::write(
        project.source_dir.join("meson.build"),
        "project('sub', 'c')\nsubdir('one')\nsubdir('one')\n",
    )
    .unwrap();
    let build2 = project._tmp.path().join("build2");
    drydock()
        .arg("setup")
        .arg(&project.source_dir)
        .arg(&build2)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already entered"));
}

#[test]
fn test_duplicate_target_name_across_subdirs() {
    require_c_compiler!();
    let project = Project::new("project('dup', 'c')\nexecutable('a', 'a.c')\nsubdir('one')\n");
    project.file("one/meson.build", "executable('a', 'b.c')\n");
    project.file("a.c", TRIVIAL_MAIN);
    project.file("one/b.c", TRIVIAL_MAIN);
    project
        .setup()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("already exists"));
}

// ============================================================================
// Wipe
// ============================================================================

#[test]
fn test_wipe_reconfigures_from_recorded_options() {
    require_c_compiler!();
    let project = Project::new("project('w', 'c')\nexecutable('a', 'a.c')\n");
    project.file("a.c", TRIVIAL_MAIN);
    drydock()
        .arg("setup")
        .arg(&project.source_dir)
        .arg(&project.build_dir)
        .args(["-D", "buildtype=release"])
        .assert()
        .success();

    let stamp = project.build_dir.join("stale.txt");
    fs::write(&stamp, "junk").unwrap();

    drydock()
        .arg("setup")
        .arg(&project.source_dir)
        .arg(&project.build_dir)
        .arg("--wipe")
        .assert()
        .success();
    assert!(!stamp.exists(), "wipe removed stale content");
    assert!(project.manifest().contains("-O3"), "recorded options reapplied");
}
