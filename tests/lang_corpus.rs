//! A language-tour project exercising the whole description language in
//! one configure: control flow, containers, string methods, options,
//! generators, tests, and install groups. Needs a C compiler; skips
//! itself otherwise.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::TempDir;

fn drydock() -> Command {
    Command::cargo_bin("drydock").unwrap()
}

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

const TOUR: &str = r#"project('tour', 'c', version : '1.4.0', default_options : ['warning_level=2'])

message('configuring ' + 'tour')

sources = ['main.c']
extras = {'timer' : 'timer.c', 'list' : 'list.c'}
foreach name, file : extras
  sources += file
endforeach

mode = get_option('buildtype') == 'debug' ? 'dev' : 'prod'
if mode == 'dev'
  add_global_arguments('-DDEV_BUILD', language : 'c')
endif

cc = get_compiler('c')
conf = configuration_data()
conf.set('VERSION', '1.4.0')
conf.set10('HAVE_STDIO', cc.has_header('stdio.h'))
configure_file(input : 'config.h.in', output : 'config.h', configuration : conf)

core = static_library('core', 'core.c', c_args : ['-DCORE_INTERNAL'])
app = executable('tour', sources, link_with : core, install : true)

test('smoke', app, args : ['--self-check'], timeout : 10, suite : 'unit')

install_headers('core.h', subdir : 'tour')
install_man('tour.1')
install_data('tour.cfg', install_dir : 'tour')
"#;

#[test]
fn test_language_tour_configures() {
    if !has_c_compiler() {
        eprintln!("no C compiler found, skipping");
        return;
    }
    let tmp = TempDir::new().unwrap();
    let source_dir: PathBuf = tmp.path().join("src");
    let build_dir = tmp.path().join("build");
    fs::create_dir_all(&source_dir).unwrap();

    fs::write(source_dir.join("meson.build"), TOUR).unwrap();
    fs::write(source_dir.join("config.h.in"), "#define VERSION \"@VERSION@\"\n#mesondefine HAVE_STDIO\n").unwrap();
    fs::write(source_dir.join("core.c"), "int core_fn(void) { return 0; }\n").unwrap();
    fs::write(source_dir.join("core.h"), "int core_fn(void);\n").unwrap();
    fs::write(source_dir.join("main.c"), "int main(void) { return 0; }\n").unwrap();
    fs::write(source_dir.join("timer.c"), "int timer_fn(void) { return 1; }\n").unwrap();
    fs::write(source_dir.join("list.c"), "int list_fn(void) { return 2; }\n").unwrap();
    fs::write(source_dir.join("tour.1"), ".TH TOUR 1\n").unwrap();
    fs::write(source_dir.join("tour.cfg"), "mode=fast\n").unwrap();

    drydock()
        .arg("setup")
        .arg(&source_dir)
        .arg(&build_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Message: configuring tour"));

    let manifest = fs::read_to_string(build_dir.join("build.ninja")).unwrap();
    // Dict-driven foreach collected every source.
    for obj in ["main.c.o", "timer.c.o", "list.c.o", "core.c.o"] {
        assert!(manifest.contains(obj), "missing compile for {obj}");
    }
    assert!(manifest.contains("-DDEV_BUILD"), "conditional global args applied");
    assert!(manifest.contains("-DCORE_INTERNAL"), "per-target args applied");
    assert!(manifest.contains("-Wextra"), "default_options raised warning level");

    let config_h = fs::read_to_string(build_dir.join("config.h")).unwrap();
    assert!(config_h.contains("#define VERSION \"1.4.0\""));
    assert!(config_h.contains("#define HAVE_STDIO"));

    // The data files for the external collaborators exist.
    let private = build_dir.join("meson-private");
    for file in [
        "coredata.dat",
        "build.dat",
        "install.dat",
        "meson_test_setup.dat",
        "meson_benchmark_setup.dat",
        "cmd_line.txt",
    ] {
        assert!(private.join(file).is_file(), "missing {file}");
    }

    drydock()
        .args(["introspect", "--projectinfo"])
        .arg(&build_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"version\":\"1.4.0\""));

    drydock()
        .args(["introspect", "--dependencies"])
        .arg(&build_dir)
        .assert()
        .success();
}
