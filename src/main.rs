mod cli;
mod config;
mod error;
mod render;
mod template;

use config::ProcessConfig;
use error::{TplError, EXIT_FAILURE, EXIT_SUCCESS};
use std::io;
use template::{FuncRegistry, TemplateSet};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives
const LOG_VAR: &str = "TPL_LOG";

fn main() {
    init_logging();

    match run() {
        Ok(()) => std::process::exit(EXIT_SUCCESS),
        Err(e) => {
            // Print machine-readable error message to stderr
            eprintln!("{}", e.format_machine_readable());
            eprintln!("{}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Log to stderr so stdout carries only rendered output
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<(), TplError> {
    // 1. Read process configuration
    let config = ProcessConfig::from_env()?;
    tracing::debug!(
        glob = %config.glob.display(),
        streaming = config.streaming,
        "configuration loaded"
    );

    // 2. Load and compile every template
    let set = TemplateSet::from_glob(&config.glob_pattern(), FuncRegistry::standard())?;

    // 3. Build the command surface
    let subcommands = cli::synthesize(&config, &set);
    let matches = match cli::build_cli(&config, &subcommands).try_get_matches() {
        Ok(matches) => matches,
        Err(e) => {
            let code = if e.use_stderr() {
                EXIT_FAILURE
            } else {
                EXIT_SUCCESS
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    // 4. Render
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    cli::dispatch(&config, &set, &subcommands, &matches, stdin.lock(), &mut out)
}
