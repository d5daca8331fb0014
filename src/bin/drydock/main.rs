//! Drydock CLI - configure driver and introspection front end.

use clap::Parser;

use drydock::configure::{parse_define, run_configure, run_setup, SetupOptions};
use drydock::error::{ConfigureError, Result};
use drydock::introspect::{self, Query};

mod cli;

use cli::{Cli, Commands, ConfigureArgs, IntrospectArgs, SetupArgs};

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("{e}");
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Setup(args) => setup(args, cli.verbose),
        Commands::Configure(args) => configure(args, cli.verbose),
        Commands::Introspect(args) => introspect_cmd(args),
    }
}

fn setup(args: SetupArgs, verbose: bool) -> Result<()> {
    let mut opts = SetupOptions::new(&args.source_dir, &args.build_dir);
    opts.cross_file = args.cross_file.clone();
    opts.native_file = args.native_file.clone();
    opts.backend = args.backend.as_str().to_string();
    opts.reconfigure = args.reconfigure;
    opts.wipe = args.wipe;
    opts.verbose = verbose;

    // Long-option shortcuts are sugar for the corresponding -D options;
    // explicit -D entries come last and win.
    let shortcuts = [
        ("prefix", args.prefix.clone()),
        ("libdir", args.libdir.clone()),
        ("bindir", args.bindir.clone()),
        ("includedir", args.includedir.clone()),
        ("datadir", args.datadir.clone()),
        ("mandir", args.mandir.clone()),
        ("localedir", args.localedir.clone()),
        ("buildtype", args.buildtype.clone()),
        ("default_library", args.default_library.clone()),
    ];
    for (name, value) in shortcuts {
        if let Some(value) = value {
            opts.defines.push((name.to_string(), value));
        }
    }
    if args.strip {
        opts.defines.push(("strip".to_string(), "true".to_string()));
    }
    if args.coverage {
        opts.defines
            .push(("coverage".to_string(), "true".to_string()));
    }
    for raw in &args.define {
        opts.defines.push(parse_define(raw)?);
    }

    run_setup(&opts)
}

fn configure(args: ConfigureArgs, verbose: bool) -> Result<()> {
    let mut defines = Vec::with_capacity(args.define.len());
    for raw in &args.define {
        defines.push(parse_define(raw)?);
    }
    run_configure(&args.build_dir, defines, verbose)
}

fn introspect_cmd(args: IntrospectArgs) -> Result<()> {
    let build_dir = args
        .build_dir
        .clone()
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let query = if args.targets {
        Query::Targets
    } else if let Some(target) = args.target_files.clone() {
        Query::TargetFiles(target)
    } else if args.buildsystem_files {
        Query::BuildsystemFiles
    } else if args.buildoptions {
        Query::BuildOptions
    } else if args.tests {
        Query::Tests
    } else if args.dependencies {
        Query::Dependencies
    } else if args.projectinfo {
        Query::ProjectInfo
    } else {
        return Err(ConfigureError::invalid_arguments(
            "introspect needs one of --targets, --target-files, \
             --buildsystem-files, --buildoptions, --tests, --dependencies, \
             or --projectinfo",
        ));
    };
    let stdout = std::io::stdout();
    introspect::introspect(&build_dir, &query, &mut stdout.lock())
}
