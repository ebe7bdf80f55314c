mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "planche")]
#[command(about = "Run the planning and export widgets against a JSON document")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, env = "PLANCHE_CONFIG", help = "Widget settings (TOML)")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Widget settings as a URL query, e.g. mode=fin&unit=days")]
    pub query: Option<String>,
    #[arg(long, short, global = true, help = "Verbose logging on stderr")]
    pub verbose: bool,
    #[arg(long, global = true, help = "Do not write the JSON log file")]
    pub no_log_file: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Print the calendar records of a table")]
    Project {
        #[arg(long, help = "Document JSON: table id to columnar table")]
        document: PathBuf,
        #[arg(long, help = "Bound table id")]
        table: String,
        #[arg(long, help = "Column mapping JSON")]
        mapping: PathBuf,
    },
    #[command(about = "Apply an edit intent and save the document")]
    Edit {
        #[arg(long, help = "Document JSON: table id to columnar table")]
        document: PathBuf,
        #[arg(long, help = "Bound table id")]
        table: String,
        #[arg(long, help = "Column mapping JSON")]
        mapping: PathBuf,
        #[arg(long, help = "Edit intent JSON")]
        intent: PathBuf,
        #[arg(long, help = "Where to save the document (defaults to --document)")]
        output: Option<PathBuf>,
    },
    #[command(about = "Build the timeline document of an export settings record")]
    Export {
        #[arg(long, help = "Document JSON: table id to columnar table")]
        document: PathBuf,
        #[arg(long, default_value = "Exports", help = "Table holding export settings")]
        settings_table: String,
        #[arg(long, help = "Row id of the settings record")]
        row: i64,
        #[arg(long, help = "Column mapping JSON of the settings table")]
        mapping: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        logging::LoggingConfig::verbose()
    } else {
        logging::LoggingConfig::default()
    };
    if cli.no_log_file {
        log_config = log_config.without_files();
    }
    if let Err(e) = logging::init(log_config) {
        eprintln!("Warning: logging disabled: {:#}", e);
    }

    let result = match commands::load_config(cli.config.as_deref(), cli.query.as_deref()) {
        Ok(config) => match cli.command {
            Commands::Project {
                document,
                table,
                mapping,
            } => commands::project(&document, &table, &mapping, config).await,
            Commands::Edit {
                document,
                table,
                mapping,
                intent,
                output,
            } => {
                let output = output.unwrap_or_else(|| document.clone());
                commands::edit(&document, &table, &mapping, &intent, &output, config).await
            }
            Commands::Export {
                document,
                settings_table,
                row,
                mapping,
            } => commands::export(&document, &settings_table, row, &mapping, config).await,
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
