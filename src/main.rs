use clap::Parser;
use plugkit::commands::{config::Config, exit_code, launch};
use plugkit::layout::ROOT_ENV;
use plugkit::project::PROJECT_ENV;
use std::path::PathBuf;

/// plugkit - pluggable command runner
///
/// Resolves MODULE among the built-in commands, the modules of the current
/// project and the globally installed modules, then runs it with ARGS.
///
/// Examples:
///   plugkit pm list -v            # List installed items
///   plugkit pm install --zip b.zip
///   plugkit hello world           # Run the module 'hello'
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Data root directory (overrides defaults; also via PLUGKIT_ROOT)
    #[arg(long = "root", short = 'r', env = ROOT_ENV, value_name = "PATH")]
    pub data_root: Option<PathBuf>,

    /// Project root directory (discovered from the current directory by default)
    #[arg(long = "project", env = PROJECT_ENV, value_name = "PATH")]
    pub project_root: Option<PathBuf>,

    /// Collect the module output and print it with the exit status as JSON
    #[arg(long)]
    pub capture: bool,

    /// Module to run
    #[arg(value_name = "MODULE")]
    pub module: String,

    /// Arguments passed to the module
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub args: Vec<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let runtime = plugkit::runtime::RealRuntime;

    let result = Config::new(runtime, cli.data_root, cli.project_root)
        .and_then(|config| launch(config, &cli.module, &cli.args, cli.capture));

    match result {
        Ok(status) => std::process::exit(status),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(exit_code(&e));
        }
    }
}
