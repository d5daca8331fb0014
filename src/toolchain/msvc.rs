//! The Microsoft Visual C++ family.
//!
//! MSVC diverges from the gcc dialect in every flag form; the PE format
//! also has no soname, so that query answers empty.

use super::{Compiler, CompilerFamily, Language};

#[derive(Debug, Clone)]
pub struct MsvcCompiler {
    language: Language,
    exelist: Vec<String>,
    version: String,
}

impl MsvcCompiler {
    pub fn new(language: Language, exelist: Vec<String>, version: String) -> Self {
        MsvcCompiler {
            language,
            exelist,
            version,
        }
    }
}

impl Compiler for MsvcCompiler {
    fn language(&self) -> Language {
        self.language
    }

    fn family(&self) -> CompilerFamily {
        CompilerFamily::Msvc
    }

    fn exelist(&self) -> &[String] {
        &self.exelist
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn output_args(&self, target: &str) -> Vec<String> {
        if target.ends_with(".exe") || target.ends_with(".dll") {
            vec![format!("/Fe{target}")]
        } else {
            vec![format!("/Fo{target}")]
        }
    }

    fn compile_only_args(&self) -> Vec<String> {
        vec!["/nologo".to_string(), "/c".to_string()]
    }

    fn include_arg(&self, dir: &str) -> String {
        format!("/I{dir}")
    }

    fn warn_args(&self, level: u32) -> Vec<String> {
        match level {
            1 => vec!["/W2".to_string()],
            2 => vec!["/W3".to_string()],
            _ => vec!["/W4".to_string()],
        }
    }

    fn buildtype_args(&self, buildtype: &str) -> Vec<String> {
        match buildtype {
            "plain" => vec![],
            "debug" => vec!["/Zi".to_string(), "/Od".to_string()],
            "debugoptimized" => vec!["/Zi".to_string(), "/O2".to_string()],
            "release" => vec!["/O2".to_string()],
            "minsize" => vec!["/O1".to_string()],
            _ => vec![],
        }
    }

    fn buildtype_linker_args(&self, buildtype: &str) -> Vec<String> {
        match buildtype {
            "debug" | "debugoptimized" => vec!["/DEBUG".to_string()],
            _ => vec![],
        }
    }

    fn pic_args(&self) -> Vec<String> {
        // All Windows code is relocatable.
        vec![]
    }

    fn shared_lib_link_args(&self) -> Vec<String> {
        vec!["/LD".to_string()]
    }

    fn depfile_gen_args(&self, _out: &str, _depfile: &str) -> Vec<String> {
        // cl has no depfile emission; header tracking is left to the
        // executor's own /showIncludes support.
        vec![]
    }

    fn depfile_suffix(&self) -> &'static str {
        "d"
    }

    fn pch_suffix(&self) -> &'static str {
        "pch"
    }

    fn pch_use_args(&self, _pch_dir: &str, header_name: &str) -> Vec<String> {
        vec![format!("/Yu{header_name}")]
    }

    fn soname_args(&self, _soname: &str, _host_system: &str) -> Vec<String> {
        vec![]
    }

    fn coverage_args(&self) -> Vec<String> {
        vec![]
    }

    fn coverage_link_args(&self) -> Vec<String> {
        vec![]
    }

    fn no_optimization_args(&self) -> Vec<String> {
        vec!["/Od".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cl() -> MsvcCompiler {
        MsvcCompiler::new(
            Language::C,
            vec!["cl".to_string()],
            "19.29.30133".to_string(),
        )
    }

    #[test]
    fn test_output_flag_forms() {
        let comp = cl();
        assert_eq!(comp.output_args("main.o"), vec!["/Fomain.o"]);
        assert_eq!(comp.output_args("app.exe"), vec!["/Feapp.exe"]);
    }

    #[test]
    fn test_no_soname_on_pe() {
        assert!(cl().soname_args("foo.dll", "windows").is_empty());
    }

    #[test]
    fn test_include_and_warnings() {
        let comp = cl();
        assert_eq!(comp.include_arg("inc"), "/Iinc");
        assert_eq!(comp.warn_args(3), vec!["/W4"]);
    }
}
