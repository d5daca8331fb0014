//! Compilers speaking the gcc flag dialect: gcc itself and clang.

use super::{Compiler, CompilerFamily, Language};

#[derive(Debug, Clone)]
pub struct GnuLikeCompiler {
    language: Language,
    family: CompilerFamily,
    exelist: Vec<String>,
    version: String,
}

impl GnuLikeCompiler {
    pub fn new(
        language: Language,
        family: CompilerFamily,
        exelist: Vec<String>,
        version: String,
    ) -> Self {
        GnuLikeCompiler {
            language,
            family,
            exelist,
            version,
        }
    }
}

impl Compiler for GnuLikeCompiler {
    fn language(&self) -> Language {
        self.language
    }

    fn family(&self) -> CompilerFamily {
        self.family
    }

    fn exelist(&self) -> &[String] {
        &self.exelist
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn output_args(&self, target: &str) -> Vec<String> {
        vec!["-o".to_string(), target.to_string()]
    }

    fn compile_only_args(&self) -> Vec<String> {
        vec!["-c".to_string()]
    }

    fn include_arg(&self, dir: &str) -> String {
        format!("-I{dir}")
    }

    fn warn_args(&self, level: u32) -> Vec<String> {
        let mut args: Vec<String> = vec!["-Wall".to_string(), "-Winvalid-pch".to_string()];
        if level >= 2 {
            args.push("-Wextra".to_string());
        }
        if level >= 3 {
            args.push("-Wpedantic".to_string());
        }
        args
    }

    fn buildtype_args(&self, buildtype: &str) -> Vec<String> {
        match buildtype {
            "plain" => vec![],
            "debug" => vec!["-g".to_string()],
            "debugoptimized" => vec!["-O2".to_string(), "-g".to_string()],
            "release" => vec!["-O3".to_string()],
            "minsize" => vec!["-Os".to_string(), "-g".to_string()],
            _ => vec![],
        }
    }

    fn buildtype_linker_args(&self, _buildtype: &str) -> Vec<String> {
        vec![]
    }

    fn pic_args(&self) -> Vec<String> {
        vec!["-fPIC".to_string()]
    }

    fn shared_lib_link_args(&self) -> Vec<String> {
        vec!["-shared".to_string()]
    }

    fn depfile_gen_args(&self, out: &str, depfile: &str) -> Vec<String> {
        vec![
            "-MMD".to_string(),
            "-MQ".to_string(),
            out.to_string(),
            "-MF".to_string(),
            depfile.to_string(),
        ]
    }

    fn depfile_suffix(&self) -> &'static str {
        "d"
    }

    fn pch_suffix(&self) -> &'static str {
        match self.family {
            CompilerFamily::Clang => "pch",
            _ => "gch",
        }
    }

    fn pch_use_args(&self, pch_dir: &str, header_name: &str) -> Vec<String> {
        vec![
            self.include_arg(pch_dir),
            "-include".to_string(),
            header_name.to_string(),
        ]
    }

    fn soname_args(&self, soname: &str, host_system: &str) -> Vec<String> {
        match host_system {
            "darwin" => vec!["-install_name".to_string(), soname.to_string()],
            "windows" => vec![],
            _ => vec![format!("-Wl,-soname,{soname}")],
        }
    }

    fn coverage_args(&self) -> Vec<String> {
        vec!["--coverage".to_string()]
    }

    fn coverage_link_args(&self) -> Vec<String> {
        vec!["--coverage".to_string()]
    }

    fn no_optimization_args(&self) -> Vec<String> {
        vec!["-O0".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn gcc() -> GnuLikeCompiler {
        GnuLikeCompiler::new(
            Language::C,
            CompilerFamily::Gcc,
            vec!["cc".to_string()],
            "13.2.0".to_string(),
        )
    }

    #[test]
    fn test_flag_forms() {
        let comp = gcc();
        assert_eq!(comp.output_args("x.o"), vec!["-o", "x.o"]);
        assert_eq!(comp.include_arg("inc"), "-Iinc");
        assert_eq!(comp.compile_only_args(), vec!["-c"]);
    }

    #[test]
    fn test_warning_levels_accumulate() {
        let comp = gcc();
        assert!(comp.warn_args(1).contains(&"-Wall".to_string()));
        assert!(comp.warn_args(3).contains(&"-Wpedantic".to_string()));
        assert!(!comp.warn_args(1).contains(&"-Wextra".to_string()));
    }

    #[test]
    fn test_buildtype_flags() {
        let comp = gcc();
        assert_eq!(comp.buildtype_args("plain"), Vec::<String>::new());
        assert_eq!(comp.buildtype_args("release"), vec!["-O3"]);
        assert_eq!(comp.buildtype_args("debugoptimized"), vec!["-O2", "-g"]);
    }

    #[test]
    fn test_soname_per_platform() {
        let comp = gcc();
        assert_eq!(
            comp.soname_args("libfoo.so.1", "linux"),
            vec!["-Wl,-soname,libfoo.so.1"]
        );
        assert_eq!(
            comp.soname_args("libfoo.1.dylib", "darwin"),
            vec!["-install_name", "libfoo.1.dylib"]
        );
        assert!(comp.soname_args("foo.dll", "windows").is_empty());
    }

    #[test]
    fn test_can_compile_by_suffix() {
        let comp = gcc();
        assert!(comp.can_compile(&PathBuf::from("main.c")));
        assert!(comp.can_compile(&PathBuf::from("api.h")));
        assert!(!comp.can_compile(&PathBuf::from("main.cpp")));
    }

    #[test]
    fn test_clang_pch_suffix() {
        let clang = GnuLikeCompiler::new(
            Language::Cpp,
            CompilerFamily::Clang,
            vec!["clang++".to_string()],
            "17.0.1".to_string(),
        );
        assert_eq!(clang.pch_suffix(), "pch");
        assert_eq!(gcc().pch_suffix(), "gch");
    }
}
