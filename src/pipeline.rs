use std::fmt;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info, warn};

use crate::db::StagingLoader;
use crate::error::{FetchError, LinkFailure, LoadError};
use crate::fetcher::{PageCache, RateLimitedFetcher};
use crate::listing;
use crate::model::Movie;
use crate::parser;
use crate::quality::QualityGate;
use crate::site::Site;
use crate::source::PageSource;
use crate::validate::RecordValidator;

const MIN_LOAD_RATE: f64 = 0.5;

/// Counts for one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    pub links_found: usize,
    pub scraped: usize,
    pub fetch_failures: usize,
    pub parse_failures: usize,
    pub schema_failures: usize,
    pub quality_failures: usize,
    /// `None` when the load phase was skipped.
    pub rows_merged: Option<usize>,
}

impl RunReport {
    fn record(&mut self, failure: &LinkFailure) {
        match failure {
            LinkFailure::Fetch(_) => self.fetch_failures += 1,
            LinkFailure::Parse(_) => self.parse_failures += 1,
            LinkFailure::Schema(_) => self.schema_failures += 1,
            LinkFailure::Quality(_) => self.quality_failures += 1,
        }
    }

    pub fn failed(&self) -> usize {
        self.fetch_failures + self.parse_failures + self.schema_failures + self.quality_failures
    }

    /// Anomalies worth alerting on: too few movies, nothing merged, or most of the batch lost at load.
    pub fn health_issues(&self, min_movies: usize) -> Vec<String> {
        let mut issues = Vec::new();
        if self.scraped < min_movies {
            issues.push(format!(
                "low movie count: {} (expected >= {min_movies})",
                self.scraped
            ));
        }
        if let Some(merged) = self.rows_merged {
            if self.scraped > 0 {
                let rate = merged as f64 / self.scraped as f64;
                if merged == 0 {
                    issues.push(format!(
                        "no rows merged despite scraping {} movies",
                        self.scraped
                    ));
                } else if rate < MIN_LOAD_RATE {
                    issues.push(format!("low load rate: {:.1}%", rate * 100.0));
                }
            }
        }
        issues
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Links found:      {}", self.links_found)?;
        writeln!(f, "Movies scraped:   {}", self.scraped)?;
        writeln!(f, "Fetch failures:   {}", self.fetch_failures)?;
        writeln!(f, "Parse failures:   {}", self.parse_failures)?;
        writeln!(f, "Schema failures:  {}", self.schema_failures)?;
        writeln!(f, "Quality rejected: {}", self.quality_failures)?;
        match self.rows_merged {
            Some(n) => write!(f, "Rows merged:      {n}"),
            None => write!(f, "Rows merged:      (load skipped)"),
        }
    }
}

/// Accepted movies plus the counts that produced them.
pub struct BatchOutcome {
    pub movies: Vec<Movie>,
    pub report: RunReport,
}

/// Listing → detail pages → typed, quality-checked movies, one link at a time.
pub struct Pipeline<S, C> {
    fetcher: RateLimitedFetcher<S, C>,
    validator: RecordValidator,
    gate: QualityGate,
    use_cache: bool,
}

impl<S: PageSource, C: PageCache> Pipeline<S, C> {
    pub fn new(fetcher: RateLimitedFetcher<S, C>, validator: RecordValidator, gate: QualityGate) -> Self {
        Self {
            fetcher,
            validator,
            gate,
            use_cache: true,
        }
    }

    /// Force live fetches for every page of the run.
    pub fn bypass_cache(mut self, bypass: bool) -> Self {
        self.use_cache = !bypass;
        self
    }

    pub fn quality(&self) -> &QualityGate {
        &self.gate
    }

    async fn get(&mut self, url: &str) -> Result<String, FetchError> {
        if self.use_cache {
            self.fetcher.fetch(url).await
        } else {
            self.fetcher.fetch_uncached(url).await
        }
    }

    /// Runs the whole batch. A listing that cannot be fetched ends the batch
    /// with no links; per-link failures are counted and skipped.
    pub async fn scrape(&mut self, site: Site, listing_url: &str, limit: Option<usize>) -> BatchOutcome {
        let mut report = RunReport::default();
        let mut movies = Vec::new();

        let listing = match self.get(listing_url).await {
            Ok(html) => html,
            Err(e) => {
                error!(url = listing_url, "listing fetch failed: {e}");
                report.fetch_failures += 1;
                return BatchOutcome { movies, report };
            }
        };

        let mut links = listing::collect(&listing, site);
        report.links_found = links.len();
        if let Some(n) = limit {
            links.truncate(n);
        }
        info!(%site, found = report.links_found, processing = links.len(), "scraping detail pages");

        let pb = ProgressBar::new(links.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        for link in &links {
            pb.set_message(link.clone());
            match self.process_link(link, site).await {
                Ok(movie) => {
                    info!(url = %link, title = movie.display_title(), "accepted");
                    movies.push(movie);
                }
                Err(failure) => {
                    warn!(url = %link, "skipped: {failure}");
                    report.record(&failure);
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        report.scraped = movies.len();
        info!(
            scraped = report.scraped,
            failed = report.failed(),
            "batch finished"
        );
        BatchOutcome { movies, report }
    }

    async fn process_link(&mut self, link: &str, site: Site) -> Result<Movie, LinkFailure> {
        let html = self.get(link).await?;
        let raw = parser::extract_fields(&html, site)?;
        let movie = self.validator.validate(raw, link)?;
        if !self.gate.check(&movie) {
            let issues = self
                .gate
                .issues()
                .last()
                .map(|i| i.issues.clone())
                .unwrap_or_default();
            return Err(LinkFailure::Quality(issues));
        }
        Ok(movie)
    }
}

/// Re-applies any stranded staging rows, then loads the batch.
pub fn load(loader: &StagingLoader<'_>, movies: &[Movie], report: &mut RunReport) -> Result<usize, LoadError> {
    let recovered = loader.recover()?;
    if recovered > 0 {
        warn!(rows = recovered, "recovered rows from a previous failed load");
    }
    let merged = loader.load(movies)?;
    report.rows_merged = Some(merged);
    Ok(merged)
}
