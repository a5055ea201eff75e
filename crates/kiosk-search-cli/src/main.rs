//! Kiosk Search CLI - inspect filters, plans and suggestions from a shell.
//!
//! Filters are read from JSON files in the same camelCase shape the kiosk
//! front end sends. Results are printed to stdout as JSON.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kiosk_search::ContentType;
use std::path::PathBuf;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "kiosk-search")]
#[command(about = "Compile, explain and rank kiosk searches")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// JSON configuration file (cache sizes, TTLs, ranker limits)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a filter file and report field-level issues
    Validate { filter: PathBuf },

    /// Print the SQL and parameters a filter compiles to
    Compile {
        filter: PathBuf,
        /// The file holds a visual-builder tree instead of a flat filter
        #[arg(long)]
        tree: bool,
        /// Rewrite the SQL into its canonical form
        #[arg(long)]
        optimize: bool,
    },

    /// Show how the database would run a filter
    Explain {
        filter: PathBuf,
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        tree: bool,
    },

    /// Run a filter and print the matching rows
    Search {
        filter: PathBuf,
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        tree: bool,
    },

    /// Suggest indexes for the columns a filter constrains
    Indexes { filter: PathBuf },

    /// Rank autocomplete suggestions for some input
    Suggest {
        input: String,
        #[arg(long)]
        history_db: Option<PathBuf>,
        #[arg(long, value_parser = parse_content_type)]
        content_type: Option<ContentType>,
    },

    /// Add a completed search to the history
    Record {
        query: String,
        #[arg(long)]
        results: u64,
        #[arg(long)]
        history_db: Option<PathBuf>,
    },
}

fn parse_content_type(s: &str) -> std::result::Result<ContentType, String> {
    ContentType::from_str(s).ok_or_else(|| {
        format!(
            "unknown content type {:?}; expected one of {}",
            s,
            ContentType::ALL.map(|c| c.as_str()).join(", ")
        )
    })
}

/// Default location of the history database.
fn default_history_db() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kiosk-search")
        .join("history.db")
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = commands::load_config(args.config.as_deref())?;
    debug!("Using configuration: {:?}", config);

    let output = match args.command {
        Command::Validate { filter } => commands::validate(&filter)?,
        Command::Compile {
            filter,
            tree,
            optimize,
        } => commands::compile(&filter, tree, optimize)?,
        Command::Explain { filter, db, tree } => commands::explain(&config, &filter, &db, tree).await?,
        Command::Search { filter, db, tree } => commands::search(&config, &filter, &db, tree).await?,
        Command::Indexes { filter } => commands::indexes(&filter)?,
        Command::Suggest {
            input,
            history_db,
            content_type,
        } => {
            let history_db = history_db.unwrap_or_else(default_history_db);
            commands::suggest(&config, &history_db, &input, content_type)?
        }
        Command::Record {
            query,
            results,
            history_db,
        } => {
            let history_db = history_db.unwrap_or_else(default_history_db);
            commands::record(&config, &history_db, &query, results)?
        }
    };

    // Results go to stdout, logs to stderr
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_compile_flags() {
        let args =
            Args::try_parse_from(["kiosk-search", "compile", "f.json", "--tree", "--optimize"]).unwrap();
        match args.command {
            Command::Compile {
                filter,
                tree,
                optimize,
            } => {
                assert_eq!(filter, PathBuf::from("f.json"));
                assert!(tree);
                assert!(optimize);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_content_type() {
        let args = Args::try_parse_from([
            "kiosk-search",
            "suggest",
            "law",
            "--content-type",
            "Publications",
            "--debug",
        ])
        .unwrap();
        assert!(args.debug);
        assert!(matches!(
            args.command,
            Command::Suggest {
                content_type: Some(ContentType::Publications),
                ..
            }
        ));

        assert!(Args::try_parse_from(["kiosk-search", "suggest", "x", "--content-type", "books"]).is_err());
    }

    #[test]
    fn test_record_requires_results() {
        assert!(Args::try_parse_from(["kiosk-search", "record", "torts"]).is_err());
    }

    #[test]
    fn test_default_history_db_location() {
        let path = default_history_db();
        assert!(path.ends_with("kiosk-search/history.db"));
    }
}
