#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line tools for the survey map.
//!
//! ```text
//! survey_map_cli list
//! survey_map_cli export [--output encuestas_pavas.csv]
//! survey_map_cli reconcile
//! survey_map_cli delete <ROW>...
//! survey_map_cli clear [--yes]
//! survey_map_cli serve [--interactive]
//! ```
//!
//! Running with no subcommand enters interactive mode. The store is
//! selected through the same environment variables the server reads.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use dialoguer::{Confirm, Input, Select};
use survey_map_survey::SurveyService;
use survey_map_survey::export::EXPORT_FILE_NAME;

#[derive(Parser)]
#[command(name = "survey_map_cli", about = "Manage survey responses")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored responses
    List,
    /// Export every response as CSV
    Export {
        /// Destination file
        #[arg(long, short, default_value = EXPORT_FILE_NAME)]
        output: PathBuf,
    },
    /// Bring the worksheet header to the current column set
    Reconcile,
    /// Delete responses by spreadsheet row number
    Delete {
        /// Row numbers as shown by `list` (2 or greater)
        #[arg(required = true)]
        rows: Vec<u32>,
    },
    /// Delete every response, keeping the header
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Start the API server
    Serve {
        /// Prompt for store, bind address and port first
        #[arg(long)]
        interactive: bool,
    },
}

/// Actions offered in interactive mode.
enum Tool {
    List,
    Export,
    Reconcile,
    Delete,
    Clear,
    Server,
}

impl Tool {
    const ALL: &[Self] = &[
        Self::List,
        Self::Export,
        Self::Reconcile,
        Self::Delete,
        Self::Clear,
        Self::Server,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::List => "List responses",
            Self::Export => "Export responses to CSV",
            Self::Reconcile => "Reconcile worksheet columns",
            Self::Delete => "Delete responses",
            Self::Clear => "Delete all responses",
            Self::Server => "Start server",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let command = match cli.command {
        Some(command) => command,
        None => prompt_command()?,
    };

    if let Commands::Serve { interactive } = command {
        // The server uses actix-web's runtime, so we need to run it
        // in a blocking task to avoid nesting tokio runtimes.
        tokio::task::spawn_blocking(move || {
            actix_web::rt::System::new().block_on(async move {
                if interactive {
                    survey_map_server::interactive::run().await
                } else {
                    survey_map_server::run_server().await
                }
            })
        })
        .await??;
        return Ok(());
    }

    let survey = SurveyService::from_env()?;

    match command {
        Commands::List => list(&survey).await?,
        Commands::Export { output } => export(&survey, &output).await?,
        Commands::Reconcile => reconcile(&survey).await?,
        Commands::Delete { rows } => {
            let rows: BTreeSet<u32> = rows.into_iter().collect();
            let deleted = survey.delete(&rows).await?;
            println!("Deleted {deleted} response(s).");
        }
        Commands::Clear { yes } => {
            if !yes
                && !Confirm::new()
                    .with_prompt("Delete every response? The header row is kept.")
                    .default(false)
                    .interact()?
            {
                println!("Cancelled.");
                return Ok(());
            }
            survey.clear_all().await?;
            println!("All responses deleted.");
        }
        Commands::Serve { .. } => {}
    }

    Ok(())
}

/// Asks which action to run and collects its arguments.
fn prompt_command() -> Result<Commands, Box<dyn std::error::Error>> {
    println!("Survey Map");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();

    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(match Tool::ALL[idx] {
        Tool::List => Commands::List,
        Tool::Export => {
            let output: String = Input::new()
                .with_prompt("Output file")
                .default(EXPORT_FILE_NAME.to_string())
                .interact_text()?;
            Commands::Export {
                output: PathBuf::from(output),
            }
        }
        Tool::Reconcile => Commands::Reconcile,
        Tool::Delete => {
            let raw: String = Input::new()
                .with_prompt("Row numbers (space or comma separated)")
                .interact_text()?;
            Commands::Delete {
                rows: parse_rows(&raw)?,
            }
        }
        Tool::Clear => Commands::Clear { yes: false },
        Tool::Server => Commands::Serve { interactive: true },
    })
}

/// Parses a list of row numbers separated by commas or whitespace.
fn parse_rows(raw: &str) -> Result<Vec<u32>, std::num::ParseIntError> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

async fn list(survey: &SurveyService) -> Result<(), Box<dyn std::error::Error>> {
    let records = survey.fetch_all().await?;

    if records.is_empty() {
        println!("No responses found.");
        return Ok(());
    }

    println!("{:<5} {:<20} {:<24} {:<4} FACTORS", "ROW", "DATE", "BARRIO", "EST.");
    println!("{}", "-".repeat(100));

    for record in records.iter() {
        let neighborhood: String = record.neighborhood.chars().take(24).collect();
        let location = record.location.map_or_else(
            || "(sin punto)".to_string(),
            |c| format!("{:.6},{:.6}", c.latitude, c.longitude),
        );
        println!(
            "{:<5} {:<20} {:<24} {:<4} {} [{location}]",
            record.row_number,
            record.submitted_at,
            neighborhood,
            record.linked_to_structure,
            record.risk_factors.join("; "),
        );
    }

    println!("\n{} response(s)", records.len());
    Ok(())
}

async fn export(survey: &SurveyService, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let count = survey.export_csv_file(output).await?;
    log::info!("Wrote {count} response(s) to {}", output.display());
    println!("Exported {count} response(s) to {}", output.display());
    Ok(())
}

async fn reconcile(survey: &SurveyService) -> Result<(), Box<dyn std::error::Error>> {
    let edits = survey.reconcile().await?;
    if edits.is_empty() {
        println!("Worksheet columns are already up to date.");
    } else {
        for edit in &edits {
            println!("  {edit}");
        }
        println!("Applied {} column change(s).", edits.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_separators() {
        assert_eq!(parse_rows("2, 5 7,,9").unwrap(), vec![2, 5, 7, 9]);
        assert!(parse_rows("").unwrap().is_empty());
        assert!(parse_rows("3, x").is_err());
    }

    #[test]
    fn delete_requires_rows() {
        assert!(Cli::try_parse_from(["survey_map_cli", "delete"]).is_err());
        let cli = Cli::try_parse_from(["survey_map_cli", "delete", "3", "4"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Delete { rows }) if rows == vec![3, 4]));
    }

    #[test]
    fn export_defaults_to_download_name() {
        let cli = Cli::try_parse_from(["survey_map_cli", "export"]).unwrap();
        let Some(Commands::Export { output }) = cli.command else {
            panic!("expected export");
        };
        assert_eq!(output, PathBuf::from(EXPORT_FILE_NAME));
    }

    #[test]
    fn no_subcommand_is_interactive() {
        let cli = Cli::try_parse_from(["survey_map_cli"]).unwrap();
        assert!(cli.command.is_none());
    }
}
