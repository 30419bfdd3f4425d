mod commands;

use clap::Parser;
use ramancal_core::domain::CalibrationError;
use std::path::PathBuf;

pub fn run_from_env() -> i32 {
    let args: Vec<String> = std::env::args().collect();
    match parse_and_dispatch(args) {
        Ok(code) => code,
        Err(error) => {
            let diagnostic = error.as_calibration_error();
            eprintln!("{}", diagnostic.diagnostic_line());
            diagnostic.exit_code()
        }
    }
}

fn parse_and_dispatch(args: Vec<String>) -> Result<i32, CliError> {
    match Cli::try_parse_from(&args) {
        Ok(cli) => dispatch_parsed(cli.command),
        Err(err) => match err.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                print!("{}", err);
                Ok(0)
            }
            _ => Err(CliError::Usage(err.to_string())),
        },
    }
}

#[derive(Parser)]
#[command(
    name = "ramancal",
    about = "Raman spectrometer wavelength-sensitivity calibration"
)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(clap::Subcommand)]
enum CliCommand {
    /// Run every configured per-degree fit and emit correction curves
    Fit(RunArgs),
    /// Load the run config and input tables, report problem shape, fit nothing
    Validate(RunArgs),
}

#[derive(clap::Args)]
struct RunArgs {
    /// Run configuration JSON path
    #[arg(long, default_value = "run.json")]
    config: PathBuf,

    /// Directory input/output paths in the config are resolved against
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,
}

fn dispatch_parsed(command: CliCommand) -> Result<i32, CliError> {
    match command {
        CliCommand::Fit(args) => commands::run_fit_command(&args.config, &args.base_dir),
        CliCommand::Validate(args) => {
            commands::run_validate_command(&args.config, &args.base_dir)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Compute(CalibrationError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CliError {
    fn as_calibration_error(&self) -> CalibrationError {
        match self {
            Self::Usage(message) => {
                CalibrationError::input_validation("INPUT.CLI_USAGE", message.clone())
            }
            Self::Compute(error) => error.clone(),
            Self::Internal(error) => CalibrationError::io_system("IO.CLI", format!("{error:#}")),
        }
    }
}
