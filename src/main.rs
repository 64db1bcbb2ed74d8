mod db;
mod error;
mod fetcher;
mod listing;
mod model;
mod output;
mod parser;
mod pipeline;
mod quality;
mod settings;
mod site;
mod source;
mod validate;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::db::{SqliteCache, StagingLoader};
use crate::fetcher::{MemoryCache, PageCache, RateLimitedFetcher};
use crate::pipeline::Pipeline;
use crate::quality::QualityGate;
use crate::settings::{Settings, SourceKind};
use crate::site::Site;
use crate::source::{HttpSource, Source, SpiderSource};
use crate::validate::RecordValidator;

#[derive(Parser)]
#[command(name = "filmes_scraper", about = "Movie listing scraper with staged SQLite loads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape a site's listing and detail pages, then merge the accepted movies
    Run {
        #[arg(long, value_enum, default_value = "gratis")]
        site: Site,
        /// Max detail pages to scrape (default: every link on the listing)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Fetch every page live, without reading or writing the page cache
        #[arg(long)]
        no_cache: bool,
        /// Where to write the accepted movies (.json for an array, JSON lines otherwise)
        #[arg(short, long, default_value = "data/movies.jsonl")]
        output: PathBuf,
        /// Scrape and write output only
        #[arg(long)]
        skip_load: bool,
    },
    /// Merge rows left in staging by a failed load
    Recover,
    /// Show table and cache counts
    Stats,
    /// Movies overview table
    Overview {
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "30")]
        limit: usize,
    },
    /// Re-run the quality checks over the stored movies
    Audit,
    /// Dump the canonical table
    Export {
        #[arg(short, long, default_value = "data/filmes_export.jsonl")]
        output: PathBuf,
    },
    /// Page cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete entries older than the cache TTL
    Purge,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load().context("Failed to load configuration")?;

    let result = match cli.command {
        Commands::Run {
            site,
            limit,
            no_cache,
            output,
            skip_load,
        } => {
            let conn = open_db(&settings.db_path)?;
            let loader = StagingLoader::new(&conn)?;
            let source = build_source(&settings)?;
            let opts = settings.fetcher_options();

            if no_cache {
                let fetcher = RateLimitedFetcher::new(source, MemoryCache::new(), opts);
                run_batch(&settings, site, limit, &output, skip_load, &loader, fetcher, true).await
            } else {
                let cache = SqliteCache::open(&settings.db_path)?;
                let fetcher = RateLimitedFetcher::new(source, cache, opts);
                run_batch(&settings, site, limit, &output, skip_load, &loader, fetcher, false).await
            }
        }
        Commands::Recover => {
            let conn = open_db(&settings.db_path)?;
            let loader = StagingLoader::new(&conn)?;
            let merged = loader.recover().context("Recovery merge failed")?;
            if merged == 0 {
                println!("Staging is empty, nothing to recover.");
            } else {
                println!("Merged {} leftover staging rows.", merged);
            }
            Ok(())
        }
        Commands::Stats => {
            let conn = open_db(&settings.db_path)?;
            let s = db::get_stats(&conn)?;
            println!("Movies:      {}", s.movies);
            println!("Dubbed:      {}", s.dubbed);
            println!("Staged:      {}", s.staged);
            println!("Cached:      {}", s.cached);
            println!("Last update: {}", s.last_update.as_deref().unwrap_or("-"));
            Ok(())
        }
        Commands::Overview { limit } => {
            let conn = open_db(&settings.db_path)?;
            let rows = db::fetch_overview(&conn, limit)?;
            if rows.is_empty() {
                println!("No movies stored. Run 'run' first.");
                return Ok(());
            }

            println!(
                "{:>3} | {:<32} | {:>4} | {:>4} | {:<24} | {:<14} | {:<3}",
                "#", "Title", "Year", "IMDb", "Genre", "Quality", "Dub"
            );
            println!("{}", "-".repeat(102));
            for (i, r) in rows.iter().enumerate() {
                let year = r.ano.map(|y| y.to_string()).unwrap_or_else(|| "-".into());
                let imdb = r.imdb.map(|s| format!("{:.1}", s)).unwrap_or_else(|| "-".into());
                println!(
                    "{:>3} | {:<32} | {:>4} | {:>4} | {:<24} | {:<14} | {:<3}",
                    i + 1,
                    truncate(&r.title, 32),
                    year,
                    imdb,
                    truncate(&r.genero, 24),
                    truncate(&r.qualidade, 14),
                    if r.dublado { "yes" } else { "no" },
                );
            }
            println!("\n{} movies", rows.len());
            Ok(())
        }
        Commands::Audit => {
            let conn = open_db(&settings.db_path)?;
            let movies = db::fetch_movies(&conn)?;
            let mut gate = QualityGate::new(settings.min_fields_filled);
            let summary = gate.check_batch(&movies);
            println!(
                "{} movies: {} passed, {} failed ({:.1}% pass rate)",
                summary.total,
                summary.passed,
                summary.failed,
                summary.pass_rate * 100.0
            );
            if summary.failed > 0 {
                print!("{}", gate.report());
            }
            Ok(())
        }
        Commands::Export { output } => {
            let conn = open_db(&settings.db_path)?;
            let movies = db::fetch_movies(&conn)?;
            output::save(&output, &movies)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Exported {} movies to {}", movies.len(), output.display());
            Ok(())
        }
        Commands::Cache {
            action: CacheAction::Purge,
        } => {
            let cache = open_db(&settings.db_path)
                .and_then(|conn| SqliteCache::new(conn).context("Failed to open page cache"))?;
            let purged = cache.purge_expired(settings.cache_ttl())?;
            println!(
                "Purged {} expired pages ({} remain).",
                purged,
                cache.entry_count()?
            );
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

#[allow(clippy::too_many_arguments)]
async fn run_batch<C: PageCache>(
    settings: &Settings,
    site: Site,
    limit: Option<usize>,
    output: &Path,
    skip_load: bool,
    loader: &StagingLoader<'_>,
    fetcher: RateLimitedFetcher<Source, C>,
    bypass_cache: bool,
) -> Result<()> {
    let validator = RecordValidator::with_year_buffer(settings.year_buffer);
    info!(%site, max_year = validator.max_year(), "starting run");

    let mut pipeline = Pipeline::new(fetcher, validator, QualityGate::new(settings.min_fields_filled))
        .bypass_cache(bypass_cache);
    let mut outcome = pipeline.scrape(site, settings.listing_url(site), limit).await;

    if !pipeline.quality().issues().is_empty() {
        info!("{}", pipeline.quality().report().trim_end());
    }

    output::save(output, &outcome.movies)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {} movies to {}", outcome.movies.len(), output.display());

    if !skip_load {
        pipeline::load(loader, &outcome.movies, &mut outcome.report).context("Load phase failed")?;
    }

    println!("{}", outcome.report);
    for issue in outcome.report.health_issues(settings.min_movies) {
        warn!("health check: {issue}");
    }
    Ok(())
}

fn build_source(settings: &Settings) -> Result<Source> {
    Ok(match settings.source {
        SourceKind::Http => Source::Http(HttpSource::new(settings.request_timeout())?),
        SourceKind::Spider => Source::Spider(SpiderSource::from_env()?),
    })
}

fn open_db(path: &Path) -> Result<Connection> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let conn = db::connect(path).with_context(|| format!("Failed to open {}", path.display()))?;
    db::init_schema(&conn, &db::warehouse_schema()?)?;
    Ok(conn)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_read_naturally() {
        assert_eq!(format_duration(std::time::Duration::from_millis(2500)), "2.5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_duration(std::time::Duration::from_secs(3725)), "1h 2m 5s");
    }

    #[test]
    fn long_titles_are_cut() {
        assert_eq!(truncate("Matrix", 10), "Matrix");
        assert_eq!(truncate("Duna: Parte Dois", 10), "Duna: P...");
    }

    #[test]
    fn cli_parses_run_flags() {
        let cli = Cli::try_parse_from([
            "filmes_scraper", "run", "--site", "comando", "-n", "5", "--no-cache", "--skip-load",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { site, limit, no_cache, skip_load, .. } => {
                assert_eq!(site, Site::Comando);
                assert_eq!(limit, Some(5));
                assert!(no_cache);
                assert!(skip_load);
            }
            _ => panic!("expected run"),
        }
    }
}
