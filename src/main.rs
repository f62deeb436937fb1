use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use prettytable::{Cell, Row as PrettyRow, Table};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use reconcile::catalog::chpl::decode_batch;
use reconcile::catalog::endpoint_list::{EndpointListAccumulator, ServiceBaseUrlList};
use reconcile::catalog::{BatchReport, CatalogIngestor, CatalogRun};
use reconcile::db::Database;
use reconcile::environment::Settings;
use reconcile::error::{find_reconcile_error, ReconcileError};
use reconcile::history::{prune_history, PruningConfig};
use reconcile::matching::link_all_orgs_and_endpoints;
use reconcile::matching::types::{EndpointRecord, OrganizationRecord};
use reconcile::registry::{ChplClient, RegistryFetcher, RegistryQuery};

#[derive(Parser)]
#[command(author, version, about = "Reconcile healthcare registry feeds against the local store", long_about = None)]
struct Cli {
    /// Log organization names that match nothing
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CatalogFeed {
    All,
    Criteria,
    Vendors,
    Products,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch CHPL catalogs and reconcile them into the store
    Ingest {
        #[arg(short, long, value_enum, default_value = "all")]
        feed: CatalogFeed,
    },

    /// Link stored endpoints to stored organizations
    Link {
        /// Minimum name similarity (0.0-1.0); defaults to LINK_THRESHOLD
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Remove redundant rows from the history log
    Prune {
        /// Protected window in minutes; defaults to PRUNING_THRESHOLD_MINUTES
        #[arg(short, long)]
        threshold_minutes: Option<i64>,
    },

    /// Load organizations from a JSON array
    ImportOrganizations {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Load endpoints from a JSON array
    ImportEndpoints {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Add newly published CHPL service base URLs to an endpoint list file
    EndpointList {
        /// URL of the CHPL service base URL list
        #[arg(short, long)]
        url: String,

        /// Endpoint list file to extend in place
        #[arg(short, long)]
        list: PathBuf,
    },
}

fn cancellation_channel() -> watch::Receiver<bool> {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            error!("Failed to listen for ctrl-c");
            return;
        }
        warn!("Cancellation requested, stopping after the current record");
        let _ = cancel_tx.send(true);
    });
    cancel_rx
}

fn print_reports(reports: &[BatchReport]) {
    let mut table = Table::new();
    table.add_row(PrettyRow::new(vec![
        Cell::new("Feed"),
        Cell::new("Total"),
        Cell::new("Inserted"),
        Cell::new("Updated"),
        Cell::new("Unchanged"),
        Cell::new("Conflicts"),
        Cell::new("Failed"),
    ]));
    for report in reports {
        table.add_row(PrettyRow::new(vec![
            Cell::new(report.entity.as_str()),
            Cell::new(&report.total.to_string()),
            Cell::new(&report.inserted.to_string()),
            Cell::new(&report.updated.to_string()),
            Cell::new(&report.unchanged.to_string()),
            Cell::new(&report.conflicts.to_string()),
            Cell::new(&report.failed.to_string()),
        ]));
    }
    table.printstd();
}

fn single_feed(result: Result<BatchReport, ReconcileError>) -> CatalogRun {
    match result {
        Ok(report) => CatalogRun {
            reports: vec![report],
            cancelled: None,
        },
        Err(e) => CatalogRun {
            reports: Vec::new(),
            cancelled: Some(e),
        },
    }
}

/// Cancellation ends the run with its partial progress; other errors propagate.
fn report_run_error(err: anyhow::Error) -> Result<()> {
    match find_reconcile_error(&err) {
        Some(domain) if domain.is_cancellation() => {
            warn!("{}", domain);
            Ok(())
        }
        _ => Err(err),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    reconcile::logging::configure_logging(cli.verbose);

    let settings = Settings::from_env()?;
    let db = Database::new(&settings.database_path)
        .await
        .context("Failed to connect to database")?;
    let cancel_rx = cancellation_channel();

    match cli.command {
        Commands::Ingest { feed } => {
            let fetcher = Arc::new(ChplClient::new(&settings)?);
            let ingestor = CatalogIngestor::new(fetcher, Arc::new(db));
            let run = match feed {
                CatalogFeed::All => ingestor.run(cancel_rx).await,
                CatalogFeed::Criteria => single_feed(ingestor.run_criteria(&cancel_rx).await),
                CatalogFeed::Vendors => single_feed(ingestor.run_vendors(&cancel_rx).await),
                CatalogFeed::Products => single_feed(ingestor.run_products(&cancel_rx).await),
            };
            if !run.reports.is_empty() {
                print_reports(&run.reports);
            }
            if let Some(e) = run.cancelled {
                report_run_error(e.into())?;
            }
        }

        Commands::Link { threshold } => {
            let threshold = threshold.unwrap_or(settings.link_threshold);
            if !(0.0..=1.0).contains(&threshold) {
                return Err(anyhow!("threshold must be between 0 and 1, got {}", threshold));
            }
            match link_all_orgs_and_endpoints(&db, threshold, cli.verbose, &cancel_rx).await {
                Ok(summary) => {
                    println!(
                        "Matched {}/{} endpoints ({} failed), {} links written, {} failed",
                        summary.matched_endpoints,
                        summary.endpoints,
                        summary.endpoints_failed,
                        summary.links_written,
                        summary.links_failed
                    );
                    for name in summary.unmatchable {
                        println!("unmatchable: {}", name);
                    }
                }
                Err(e) => report_run_error(e)?,
            }
        }

        Commands::Prune { threshold_minutes } => {
            let mut config = PruningConfig::from_settings(&settings);
            if let Some(minutes) = threshold_minutes {
                config.threshold = chrono::Duration::minutes(minutes);
            }
            match prune_history(&db, &config, Utc::now(), &cancel_rx).await {
                Ok(outcome) => println!(
                    "Pruned {} of {} history rows ({} failed)",
                    outcome.rows_pruned, outcome.rows_processed, outcome.rows_failed
                ),
                Err(e) => report_run_error(e)?,
            }
        }

        Commands::ImportOrganizations { file } => {
            let raw = fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let organizations: Vec<OrganizationRecord> =
                serde_json::from_slice(&raw).context("Failed to parse organizations")?;
            for organization in &organizations {
                db.upsert_organization(organization).await?;
            }
            info!("Imported {} organizations", organizations.len());
        }

        Commands::ImportEndpoints { file } => {
            let raw = fs::read(&file).with_context(|| format!("Failed to read {:?}", file))?;
            let endpoints: Vec<EndpointRecord> =
                serde_json::from_slice(&raw).context("Failed to parse endpoints")?;
            for endpoint in &endpoints {
                db.upsert_endpoint(endpoint).await?;
            }
            info!("Imported {} endpoints", endpoints.len());
        }

        Commands::EndpointList { url, list } => {
            let client = ChplClient::new(&settings)?;
            let body = client
                .fetch_batch(&RegistryQuery::EndpointList { url })
                .await?;
            let published: ServiceBaseUrlList = decode_batch(&body)?;

            let existing = fs::read(&list).with_context(|| format!("Failed to read {:?}", list))?;
            let mut accumulator = EndpointListAccumulator::from_json(&existing)?;
            let added = accumulator.absorb(&published.results);

            if added.is_empty() {
                info!("CHPL list does not need to be updated.");
                return Ok(());
            }

            let updated = serde_json::to_vec_pretty(accumulator.entries())?;
            fs::write(&list, updated).with_context(|| format!("Failed to write {:?}", list))?;
            for url in &added {
                println!("{}", url);
            }
            info!("Endpoint list has been updated with {} new entries", added.len());
        }
    }

    Ok(())
}
