//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Drydock - a meta-build tool emitting ninja manifests
#[derive(Parser)]
#[command(name = "drydock")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output (debug/info)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure a source tree into a build directory
    Setup(SetupArgs),

    /// Change the options of an already configured build directory
    Configure(ConfigureArgs),

    /// Dump information about a configured build directory
    Introspect(IntrospectArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    #[default]
    Ninja,
    Vs,
    Xcode,
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Ninja => "ninja",
            Backend::Vs => "vs",
            Backend::Xcode => "xcode",
        }
    }
}

#[derive(Args)]
pub struct SetupArgs {
    /// Source directory containing the top level meson.build
    pub source_dir: PathBuf,

    /// Build directory to generate into
    pub build_dir: PathBuf,

    /// Set an option: -D name=value (repeatable)
    #[arg(short = 'D', value_name = "NAME=VALUE")]
    pub define: Vec<String>,

    /// Installation prefix
    #[arg(long)]
    pub prefix: Option<String>,

    /// Library directory (relative to prefix)
    #[arg(long)]
    pub libdir: Option<String>,

    /// Executable directory (relative to prefix)
    #[arg(long)]
    pub bindir: Option<String>,

    /// Header directory (relative to prefix)
    #[arg(long)]
    pub includedir: Option<String>,

    /// Data file directory (relative to prefix)
    #[arg(long)]
    pub datadir: Option<String>,

    /// Manual page directory (relative to prefix)
    #[arg(long)]
    pub mandir: Option<String>,

    /// Locale data directory (relative to prefix)
    #[arg(long)]
    pub localedir: Option<String>,

    /// Build type
    #[arg(long, value_name = "TYPE")]
    pub buildtype: Option<String>,

    /// Strip targets on install
    #[arg(long)]
    pub strip: bool,

    /// Enable coverage tracking
    #[arg(long)]
    pub coverage: bool,

    /// Default library kind
    #[arg(long, value_name = "KIND")]
    pub default_library: Option<String>,

    /// Cross compilation machine description file
    #[arg(long, value_name = "PATH")]
    pub cross_file: Option<PathBuf>,

    /// Build machine description file
    #[arg(long, value_name = "PATH")]
    pub native_file: Option<PathBuf>,

    /// Backend to generate for
    #[arg(long, value_enum, default_value = "ninja")]
    pub backend: Backend,

    /// Re-run the configure using the previously recorded options
    #[arg(long)]
    pub reconfigure: bool,

    /// Delete the build directory contents and configure from scratch
    /// using the previously recorded options
    #[arg(long)]
    pub wipe: bool,
}

#[derive(Args)]
pub struct ConfigureArgs {
    /// Build directory to reconfigure
    pub build_dir: PathBuf,

    /// Set an option: -D name=value (repeatable)
    #[arg(short = 'D', value_name = "NAME=VALUE")]
    pub define: Vec<String>,
}

#[derive(Args)]
pub struct IntrospectArgs {
    /// Build directory to inspect (defaults to the current directory)
    pub build_dir: Option<PathBuf>,

    /// List all build targets
    #[arg(long)]
    pub targets: bool,

    /// List the source files of one target
    #[arg(long, value_name = "TARGET")]
    pub target_files: Option<String>,

    /// List every build definition file read during configure
    #[arg(long)]
    pub buildsystem_files: bool,

    /// List all options with their current values
    #[arg(long)]
    pub buildoptions: bool,

    /// List all registered tests
    #[arg(long)]
    pub tests: bool,

    /// Summarise external dependency lookups
    #[arg(long)]
    pub dependencies: bool,

    /// Show the project name, version, and subprojects
    #[arg(long)]
    pub projectinfo: bool,
}
