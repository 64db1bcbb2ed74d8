use std::sync::LazyLock;

use regex::Regex;

static LABEL_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":[ \t]*\r?\n[ \t]*").unwrap());
static SIZE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+(?:[.,]\d+)?)\s*(gb|mb|g|m)?").unwrap());
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(\d+)\s*h(?:oras?|rs?)?\.?)?\s*(?:(\d+)\s*(?:min(?:utos?|s)?\.?)?)?").unwrap()
});
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{4}$").unwrap());

pub const MB_PER_GB: f64 = 1024.0;

/// Join a label and a value that the page split across lines (`Label: \nvalue`).
pub fn join_label_breaks(text: &str) -> String {
    LABEL_BREAK_RE.replace_all(text, ": ").into_owned()
}

/// Trim whitespace and the `:` left behind when a label is stripped off a value.
pub fn strip_label_colon(raw: &str) -> Option<String> {
    let cleaned = raw.trim().trim_start_matches(':').trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Size in megabytes. GB values are scaled by 1024; MB or unit-less values pass through.
/// Only the first `|`-separated alternative is considered.
pub fn parse_size_mb(raw: &str) -> Option<f64> {
    let first = raw.split('|').next()?.trim().trim_start_matches(':');
    let caps = SIZE_RE.captures(first)?;
    let value: f64 = caps[1].replace(',', ".").parse().ok()?;
    let is_gb = caps
        .get(2)
        .map(|u| u.as_str().to_ascii_lowercase().starts_with('g'))
        .unwrap_or(false);
    Some(if is_gb { value * MB_PER_GB } else { value })
}

/// Runtime in minutes from `"Xh Y Min."`, `"N Min."`, `"N Minutos"` or a bare count.
/// Alternatives separated by `|` keep only the first.
pub fn parse_duration_minutes(raw: &str) -> Option<i32> {
    let first = raw.split('|').next()?.trim().trim_start_matches(':').trim();
    let caps = DURATION_RE.captures(first)?;
    let hours = caps.get(1).and_then(|h| h.as_str().parse::<i32>().ok());
    let minutes = caps.get(2).and_then(|m| m.as_str().parse::<i32>().ok());
    match (hours, minutes) {
        (None, None) => None,
        (h, m) => h.unwrap_or(0).checked_mul(60)?.checked_add(m.unwrap_or(0)),
    }
}

/// Genres joined by `", "` whatever separator the site used (`/`, `|` or `,`).
pub fn normalize_genre(raw: &str) -> Option<String> {
    let parts: Vec<&str> = raw
        .split(['/', '|', ','])
        .map(|g| g.trim().trim_start_matches(':').trim())
        .filter(|g| !g.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// `"???"` and dashes mean the site has no rating.
pub fn is_missing_rating(raw: &str) -> bool {
    let t = raw.trim().trim_start_matches(':').trim();
    t.is_empty() || t == "???" || t.contains('–') || t.contains('—') || t == "-"
}

/// Decimal score, accepting a comma decimal separator and a trailing `/10`.
pub fn parse_rating(raw: &str) -> Option<f64> {
    if is_missing_rating(raw) {
        return None;
    }
    let t = raw.trim().trim_start_matches(':').trim();
    let score = t.split('/').next()?.trim().replace(',', ".");
    score.parse::<f64>().ok()
}

pub fn parse_year(raw: &str) -> Option<i32> {
    let t = raw.trim().trim_start_matches(':').trim();
    if !YEAR_RE.is_match(t) {
        return None;
    }
    t.parse().ok()
}

pub fn looks_like_year(raw: &str) -> bool {
    raw.trim().starts_with("20")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gigabytes_become_megabytes() {
        assert_eq!(parse_size_mb("2.5 GB"), Some(2560.0));
        assert_eq!(parse_size_mb("1 GB"), Some(1024.0));
        assert_eq!(parse_size_mb(": 1,5 GB"), Some(1536.0));
        assert_eq!(parse_size_mb("4.37 GB | 2.1 GB"), Some(4.37 * 1024.0));
    }

    #[test]
    fn megabytes_and_bare_numbers_pass_through() {
        assert_eq!(parse_size_mb("700 MB"), Some(700.0));
        assert_eq!(parse_size_mb("850.5"), Some(850.5));
        assert_eq!(parse_size_mb("desconhecido"), None);
    }

    #[test]
    fn durations_in_hours_and_minutes() {
        assert_eq!(parse_duration_minutes("2h 16 Min."), Some(136));
        assert_eq!(parse_duration_minutes("1h 30 Min. | 1h 40 Min."), Some(90));
        assert_eq!(parse_duration_minutes("2h"), Some(120));
    }

    #[test]
    fn durations_in_plain_minutes() {
        assert_eq!(parse_duration_minutes("136 Min."), Some(136));
        assert_eq!(parse_duration_minutes("136 Minutos"), Some(136));
        assert_eq!(parse_duration_minutes(": 98"), Some(98));
        assert_eq!(parse_duration_minutes("N/A"), None);
    }

    #[test]
    fn oversized_durations_are_absent() {
        assert_eq!(parse_duration_minutes("99999999h 10 Min."), None);
        assert_eq!(parse_duration_minutes("35791394h 8 Min."), None);
        assert_eq!(parse_duration_minutes("99999999999 Min."), None);
    }

    #[test]
    fn genre_separators_are_unified() {
        assert_eq!(
            normalize_genre("Ação / Ficção Científica").as_deref(),
            Some("Ação, Ficção Científica")
        );
        assert_eq!(
            normalize_genre("Drama | Suspense|Crime").as_deref(),
            Some("Drama, Suspense, Crime")
        );
        assert_eq!(normalize_genre("  "), None);
    }

    #[test]
    fn genre_normalization_is_idempotent() {
        let once = normalize_genre("Terror / Mistério | Suspense").unwrap();
        assert_eq!(normalize_genre(&once).as_deref(), Some(once.as_str()));
        assert_eq!(
            normalize_genre("Comédia, Romance").as_deref(),
            Some("Comédia, Romance")
        );
    }

    #[test]
    fn rating_placeholders_are_absent() {
        assert_eq!(parse_rating("???"), None);
        assert_eq!(parse_rating("–"), None);
        assert_eq!(parse_rating(": 7,4"), Some(7.4));
        assert_eq!(parse_rating("8.7/10"), Some(8.7));
    }

    #[test]
    fn years_need_four_digits() {
        assert_eq!(parse_year(": 1999"), Some(1999));
        assert_eq!(parse_year("99"), None);
        assert_eq!(parse_year("Ação, Drama"), None);
    }

    #[test]
    fn label_breaks_are_joined() {
        assert_eq!(
            join_label_breaks("Imdb: \n8.7/10\nLançamento:\n 1999"),
            "Imdb: 8.7/10\nLançamento: 1999"
        );
    }
}
