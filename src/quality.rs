use std::fmt::Write as _;

use crate::model::Movie;

pub const QUALITY_MIN_YEAR: i32 = 1888;
pub const QUALITY_MAX_YEAR: i32 = 2030;
pub const DEFAULT_MIN_FILLED: f64 = 0.7;
const REPORT_LIMIT: usize = 10;

/// Reasons one record was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityIssue {
    pub link: String,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub pass_rate: f64,
}

/// Batch-scoped record checker. Issues accumulate for the life of the gate.
pub struct QualityGate {
    min_filled: f64,
    issues: Vec<QualityIssue>,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_FILLED)
    }
}

impl QualityGate {
    pub fn new(min_filled: f64) -> Self {
        QualityGate {
            min_filled,
            issues: Vec::new(),
        }
    }

    /// Problems with `movie`, empty when it passes. Does not record anything.
    pub fn inspect(&self, movie: &Movie) -> Vec<String> {
        let mut found = Vec::new();

        if movie.titulo_dublado.is_none() && movie.titulo_original.is_none() {
            found.push("missing both titles".to_string());
        }
        if movie.link.trim().is_empty() {
            found.push("missing link".to_string());
        }

        let ratio = movie.field_fill_ratio();
        if ratio < self.min_filled {
            found.push(format!(
                "only {:.0}% of fields filled (min {:.0}%)",
                ratio * 100.0,
                self.min_filled * 100.0
            ));
        }

        if let Some(y) = movie.ano {
            if !(QUALITY_MIN_YEAR..=QUALITY_MAX_YEAR).contains(&y) {
                found.push(format!("year {y} outside {QUALITY_MIN_YEAR}-{QUALITY_MAX_YEAR}"));
            }
        }
        if let Some(r) = movie.imdb {
            if !r.is_finite() || !(0.0..=10.0).contains(&r) {
                found.push(format!("rating {r} outside 0-10"));
            }
        }

        found
    }

    /// Passes or rejects `movie`, remembering the reasons for a rejection.
    pub fn check(&mut self, movie: &Movie) -> bool {
        let found = self.inspect(movie);
        if found.is_empty() {
            return true;
        }
        self.issues.push(QualityIssue {
            link: movie.link.clone(),
            issues: found,
        });
        false
    }

    pub fn check_batch(&mut self, movies: &[Movie]) -> BatchSummary {
        let total = movies.len();
        let passed = movies.iter().filter(|m| self.check(m)).count();
        let pass_rate = if total == 0 {
            0.0
        } else {
            passed as f64 / total as f64
        };
        BatchSummary {
            total,
            passed,
            failed: total - passed,
            pass_rate,
        }
    }

    pub fn issues(&self) -> &[QualityIssue] {
        &self.issues
    }

    /// Human-readable summary: the first ten rejections and a count of the rest.
    pub fn report(&self) -> String {
        if self.issues.is_empty() {
            return "No quality issues.".to_string();
        }
        let mut out = format!("{} records failed quality checks:\n", self.issues.len());
        for issue in self.issues.iter().take(REPORT_LIMIT) {
            let _ = writeln!(out, "  {}: {}", issue.link, issue.issues.join(", "));
        }
        if self.issues.len() > REPORT_LIMIT {
            let _ = writeln!(out, "  ... and {} more", self.issues.len() - REPORT_LIMIT);
        }
        out
    }
}
