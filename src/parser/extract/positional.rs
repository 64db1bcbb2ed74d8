use scraper::Html;

use super::{extract_poster, extract_synopsis};
use crate::error::ParseError;
use crate::model::RawFields;
use crate::parser::html;
use crate::parser::normalize::{is_missing_rating, looks_like_year, parse_year, strip_label_colon};
use crate::site::Site;

/// Fewest tokens a usable info block has once optional markers are removed.
pub const MIN_TOKENS: usize = 12;

const TITLE_DUB: usize = 0;
const TITLE_ORIGINAL: usize = 1;
const RATING: usize = 2;
const YEAR: usize = 3;
const GENRE: usize = 4;
const QUALITY_LABEL: usize = 6;
const AUDIO: usize = 7;
/// Start of the size / duration / video-score triplet.
const TRIPLET: usize = 9;

/// Tokens that sometimes precede the triplet and must be dropped before indexing.
const CONTAINER_MARKERS: &[&str] = &["MKV"];

/// Fixed-index extraction over the bare text tokens of the info paragraph.
pub fn extract(doc: &Html, site: Site) -> Result<RawFields, ParseError> {
    let info = html::select_first(doc, site.info_selector())
        .ok_or(ParseError::MissingInfoBlock(site.info_selector()))?;

    let mut tokens = html::direct_text_tokens(info);
    let anchors = html::anchor_texts(info);
    tracing::debug!(?tokens, ?anchors, "positional info block");

    if tokens
        .get(TRIPLET)
        .is_some_and(|t| CONTAINER_MARKERS.iter().any(|m| t.contains(m)))
    {
        tokens.remove(TRIPLET);
    }

    if tokens.len() < MIN_TOKENS {
        return Err(ParseError::TooFewTokens {
            expected: MIN_TOKENS,
            found: tokens.len(),
        });
    }

    // A size sitting in the duration slot means the triplet starts one token later.
    let offset = usize::from(tokens.get(TRIPLET + 1).is_some_and(|t| t.contains("GB")));
    let token = |idx: usize| tokens.get(idx).and_then(|t| strip_label_colon(t));

    let dublado = tokens
        .get(AUDIO)
        .is_some_and(|a| a.contains("Português"));

    Ok(RawFields {
        titulo_dublado: token(TITLE_DUB),
        titulo_original: token(TITLE_ORIGINAL),
        imdb: pick_rating(&anchors, token(RATING)),
        ano: pick_year(&anchors, &tokens),
        genero: token(GENRE),
        tamanho: token(TRIPLET + offset),
        duracao: token(TRIPLET + offset + 1),
        qualidade_video: token(TRIPLET + offset + 2),
        qualidade: token(QUALITY_LABEL),
        dublado,
        sinopse: extract_synopsis(doc, site),
        poster_url: extract_poster(doc, site),
    })
}

/// The first anchor usually links the IMDb rating. When it reads like a year the
/// rating link is missing and the positional token is used instead.
fn pick_rating(anchors: &[String], positional: Option<String>) -> Option<String> {
    let chosen = match anchors.first() {
        Some(a) if !looks_like_year(a) => Some(a.clone()),
        _ => positional,
    };
    chosen.filter(|r| !is_missing_rating(r))
}

/// Year link is the second anchor when two exist, otherwise the only one.
/// A comma there means the genre list leaked into the slot: no year.
fn pick_year(anchors: &[String], tokens: &[String]) -> Option<String> {
    let anchor = anchors.get(1).or_else(|| anchors.first());
    if let Some(a) = anchor {
        if a.contains(',') {
            return None;
        }
        if parse_year(a).is_some() {
            return Some(a.trim().to_string());
        }
    }

    if let Some(y) = tokens.get(YEAR).and_then(|t| parse_year(t)) {
        return Some(y.to_string());
    }
    tokens
        .iter()
        .filter_map(|t| parse_year(t))
        .find(|y| (1888..=2100).contains(y))
        .map(|y| y.to_string())
}
