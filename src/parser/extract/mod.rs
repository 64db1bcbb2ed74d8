pub mod labeled;
pub mod positional;

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use super::html;
use super::normalize::strip_label_colon;
use crate::error::ParseError;
use crate::model::RawFields;
use crate::site::{Layout, Site};

static SYNOPSIS_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:Descrição|Sinopse)\s*:?").unwrap());

/// Parse a detail page into raw field strings using the site's layout.
pub fn extract_fields(page: &str, site: Site) -> Result<RawFields, ParseError> {
    let doc = html::parse(page);
    match site.layout() {
        Layout::Labeled => labeled::extract(&doc, site),
        Layout::Positional => positional::extract(&doc, site),
    }
}

/// First non-empty synopsis block, without its label.
pub(super) fn extract_synopsis(doc: &Html, site: Site) -> Option<String> {
    site.synopsis_selectors().iter().find_map(|css| {
        let el = html::select_first(doc, css)?;
        let text = html::element_text(el);
        strip_label_colon(&SYNOPSIS_LABEL_RE.replace(&text, ""))
    })
}

pub(super) fn extract_poster(doc: &Html, site: Site) -> Option<String> {
    html::attr(doc, site.poster_selector(), "src")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{name}")).unwrap()
    }

    #[test]
    fn gratis_detail_fixture() {
        let raw = extract_fields(&fixture("gratis_detail.html"), Site::Gratis).unwrap();
        assert_eq!(raw.titulo_dublado.as_deref(), Some("Matrix"));
        assert_eq!(raw.titulo_original.as_deref(), Some("The Matrix"));
        assert_eq!(raw.imdb.as_deref(), Some("8.7"));
        assert_eq!(raw.ano.as_deref(), Some("1999"));
        assert_eq!(raw.tamanho.as_deref(), Some("2.5 GB"));
        assert_eq!(raw.duracao.as_deref(), Some("136 Minutos"));
        assert!(raw.dublado);
        assert_eq!(
            raw.sinopse.as_deref(),
            Some("Um programador descobre que o mundo em que vive é uma simulação.")
        );
        assert_eq!(
            raw.poster_url.as_deref(),
            Some("https://gratistorrent.com/wp-content/uploads/matrix.jpg")
        );
    }

    #[test]
    fn comando_detail_fixture() {
        let raw = extract_fields(&fixture("comando_detail.html"), Site::Comando).unwrap();
        assert_eq!(raw.titulo_dublado.as_deref(), Some("Duna: Parte Dois"));
        assert_eq!(raw.titulo_original.as_deref(), Some("Dune: Part Two"));
        assert_eq!(raw.imdb.as_deref(), Some("8,6"));
        assert_eq!(raw.ano.as_deref(), Some("2024"));
        assert_eq!(raw.genero.as_deref(), Some("Ação | Aventura | Ficção"));
        assert_eq!(raw.tamanho.as_deref(), Some("4.2 GB | 7.8 GB"));
        assert_eq!(raw.duracao.as_deref(), Some("2h 46 Min."));
        assert_eq!(raw.qualidade_video.as_deref(), Some("10"));
        assert!(raw.dublado);
        assert_eq!(
            raw.sinopse.as_deref(),
            Some("Paul Atreides se une aos Fremen em busca de vingança.")
        );
    }

    #[test]
    fn comando_mkv_fixture_aligns_triplet() {
        let raw = extract_fields(&fixture("comando_detail_mkv.html"), Site::Comando).unwrap();
        assert_eq!(raw.imdb, None);
        assert_eq!(raw.tamanho.as_deref(), Some("1.9 GB"));
        assert_eq!(raw.duracao.as_deref(), Some("1h 58 Min."));
        assert_eq!(raw.qualidade_video.as_deref(), Some("9"));
        assert!(!raw.dublado);
        // empty fourth paragraph, synopsis sits in the fifth
        assert_eq!(raw.sinopse.as_deref(), Some("Um thriller silencioso."));
    }

    #[test]
    fn synopsis_label_is_stripped() {
        let doc = html::parse(r#"<div id="sinopse"><p>Sinopse: Texto curto.</p></div>"#);
        assert_eq!(extract_synopsis(&doc, Site::Gratis).as_deref(), Some("Texto curto."));
    }
}
