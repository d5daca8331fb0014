//! Compiler and linker abstraction.
//!
//! A `Compiler` answers the closed set of questions the rest of the
//! pipeline asks: which flag forms it uses, what it can compile, and the
//! capability probes of `probes`. Detection lives in `detect`, the probe
//! drivers in `probes`. All toolchain invocations made here are
//! environment checks; actual builds are delegated to the emitted
//! manifest.

use std::path::Path;

use serde::{Deserialize, Serialize};

mod detect;
mod gnu;
mod msvc;
pub mod probes;

pub use detect::{compiler_for_source, detect_compiler, detect_static_linker, StaticLinker};
pub use gnu::GnuLikeCompiler;
pub use msvc::MsvcCompiler;

use crate::coredata::CompilerIdentity;

/// A language drydock can configure compilers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    C,
    Cpp,
}

impl Language {
    /// The canonical short id used in rule names, option names, and the
    /// core data record.
    pub fn id(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
        }
    }

    /// Parse the spelling used in `project()` language lists.
    pub fn from_user_name(name: &str) -> Option<Language> {
        match name.to_lowercase().as_str() {
            "c" => Some(Language::C),
            "c++" | "cpp" => Some(Language::Cpp),
            _ => None,
        }
    }

    pub fn source_suffixes(&self) -> &'static [&'static str] {
        match self {
            Language::C => &["c"],
            Language::Cpp => &["cc", "cpp", "cxx", "c++"],
        }
    }

    pub fn header_suffixes(&self) -> &'static [&'static str] {
        match self {
            Language::C => &["h"],
            Language::Cpp => &["h", "hh", "hpp", "hxx"],
        }
    }

    /// Suffix used for probe source files in the scratch directory.
    pub fn probe_suffix(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cc",
        }
    }
}

/// True when the file is a header for any supported language.
pub fn is_header(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("h") | Some("hh") | Some("hpp") | Some("hxx")
    )
}

/// Compiler family, classified from the version probe output. The closed
/// set covers every family a machine file may name; full flag tables
/// exist for the gcc-like and msvc families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompilerFamily {
    Gcc,
    Clang,
    Msvc,
    Intel,
    Sun,
    Pgi,
    Pathscale,
    Open64,
    G95,
    Nagfor,
    Dmd,
    Ldc,
    Gdc,
    Mono,
    Valac,
    Rustc,
    Javac,
}

impl CompilerFamily {
    pub fn id(&self) -> &'static str {
        match self {
            CompilerFamily::Gcc => "gcc",
            CompilerFamily::Clang => "clang",
            CompilerFamily::Msvc => "msvc",
            CompilerFamily::Intel => "intel",
            CompilerFamily::Sun => "sun",
            CompilerFamily::Pgi => "pgi",
            CompilerFamily::Pathscale => "pathscale",
            CompilerFamily::Open64 => "open64",
            CompilerFamily::G95 => "g95",
            CompilerFamily::Nagfor => "nagfor",
            CompilerFamily::Dmd => "dmd",
            CompilerFamily::Ldc => "ldc",
            CompilerFamily::Gdc => "gdc",
            CompilerFamily::Mono => "mono",
            CompilerFamily::Valac => "valac",
            CompilerFamily::Rustc => "rustc",
            CompilerFamily::Javac => "javac",
        }
    }

    /// Families that accept the gcc flag dialect.
    pub fn is_gnu_like(&self) -> bool {
        matches!(self, CompilerFamily::Gcc | CompilerFamily::Clang)
    }
}

/// Flag forms and toolchain queries, answered per compiler family.
pub trait Compiler: Send + Sync {
    fn language(&self) -> Language;
    fn family(&self) -> CompilerFamily;
    fn exelist(&self) -> &[String];
    fn version(&self) -> &str;

    /// The persisted identity this compiler is pinned under.
    fn identity(&self) -> CompilerIdentity {
        CompilerIdentity {
            language: self.language().id().to_string(),
            family: self.family().id().to_string(),
            exelist: self.exelist().to_vec(),
            version: self.version().to_string(),
        }
    }

    /// Whether this compiler handles the given source or header file.
    fn can_compile(&self, path: &Path) -> bool {
        let suffix = match path.extension().and_then(|e| e.to_str()) {
            Some(s) => s,
            None => return false,
        };
        self.language().source_suffixes().contains(&suffix)
            || self.language().header_suffixes().contains(&suffix)
    }

    /// Output-file flag form, e.g. `-o <target>`.
    fn output_args(&self, target: &str) -> Vec<String>;

    /// Compile-without-linking flags.
    fn compile_only_args(&self) -> Vec<String>;

    /// Include-path flag form.
    fn include_arg(&self, dir: &str) -> String;

    /// Warning flags for levels 1 through 3.
    fn warn_args(&self, level: u32) -> Vec<String>;

    /// Debug/optimisation flags for one build type.
    fn buildtype_args(&self, buildtype: &str) -> Vec<String>;

    /// Linker flags for one build type.
    fn buildtype_linker_args(&self, buildtype: &str) -> Vec<String>;

    /// Position-independent-code flags.
    fn pic_args(&self) -> Vec<String>;

    /// Flags to produce a shared library.
    fn shared_lib_link_args(&self) -> Vec<String>;

    /// Dependency-file generation flags; `$out` and the depfile path are
    /// interpolated by the backend.
    fn depfile_gen_args(&self, out: &str, depfile: &str) -> Vec<String>;

    fn depfile_suffix(&self) -> &'static str;

    /// Precompiled header file suffix.
    fn pch_suffix(&self) -> &'static str;

    /// Flags adding the private dir and `-include` entries for each PCH.
    fn pch_use_args(&self, pch_dir: &str, header_name: &str) -> Vec<String>;

    /// Soname flag form for the host system; empty when the format has
    /// no soname concept.
    fn soname_args(&self, soname: &str, host_system: &str) -> Vec<String>;

    /// Coverage instrumentation flags.
    fn coverage_args(&self) -> Vec<String>;

    fn coverage_link_args(&self) -> Vec<String>;

    /// Flags that disable optimisation, used by capability probes that
    /// must not have symbols folded away.
    fn no_optimization_args(&self) -> Vec<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_language_ids() {
        assert_eq!(Language::from_user_name("C++"), Some(Language::Cpp));
        assert_eq!(Language::from_user_name("c"), Some(Language::C));
        assert_eq!(Language::from_user_name("fortran"), None);
        assert_eq!(Language::Cpp.id(), "cpp");
    }

    #[test]
    fn test_header_detection() {
        assert!(is_header(&PathBuf::from("api.h")));
        assert!(is_header(&PathBuf::from("impl.hpp")));
        assert!(!is_header(&PathBuf::from("main.c")));
    }
}
