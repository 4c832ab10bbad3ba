use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use sportmap_facilities::config::AppConfig;
use sportmap_facilities::ingest::{CsvLoader, IngestError, LoadMode};
use sportmap_facilities::store::PgFacilityStore;
use sportmap_shared::clients::db::create_pool;

/// Load a facility catalog CSV export into the facility table.
#[derive(Debug, Parser)]
#[command(name = "load_csv", version)]
struct Cli {
    /// Path to the CSV file
    csv_file_path: PathBuf,

    /// Import even if facilities already exist, merging with them
    #[arg(long, conflicts_with = "clear")]
    force: bool,

    /// Empty the facility table before importing (once the file is open)
    #[arg(long)]
    clear: bool,

    /// Overrides SPORTMAP_FACILITIES__DATABASE_URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

impl Cli {
    fn mode(&self) -> LoadMode {
        match (self.force, self.clear) {
            (_, true) => LoadMode::Clear,
            (true, false) => LoadMode::Force,
            (false, false) => LoadMode::Guarded,
        }
    }
}

fn main() -> ExitCode {
    sportmap_shared::middleware::init_cli_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<IngestError>() {
                Some(IngestError::ExistingData { .. }) => {
                    tracing::error!("{e}");
                    tracing::error!("import cancelled to avoid duplicates");
                }
                _ => tracing::error!("{e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let database_url = match &cli.database_url {
        Some(url) => url.clone(),
        None => AppConfig::load()?.database_url,
    };

    let pool = create_pool(&database_url, 2).context("failed to connect to the database")?;
    let store = PgFacilityStore::new(pool);

    let report = CsvLoader::new(&store).load_path(&cli.csv_file_path, cli.mode())?;
    println!(
        "CSV import completed\n  rows processed: {}\n  imported: {}\n  errors: {}\n  facilities in store: {}",
        report.rows_seen, report.inserted, report.errored, report.store_total
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_select_the_load_mode() {
        let cli = Cli::parse_from(["load_csv", "data.csv"]);
        assert_eq!(cli.mode(), LoadMode::Guarded);

        let cli = Cli::parse_from(["load_csv", "data.csv", "--force"]);
        assert_eq!(cli.mode(), LoadMode::Force);

        let cli = Cli::parse_from(["load_csv", "--clear", "data.csv"]);
        assert_eq!(cli.mode(), LoadMode::Clear);
    }

    #[test]
    fn force_and_clear_are_exclusive() {
        assert!(Cli::try_parse_from(["load_csv", "data.csv", "--force", "--clear"]).is_err());
    }
}
