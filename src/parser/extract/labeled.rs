use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

use super::{extract_poster, extract_synopsis};
use crate::error::ParseError;
use crate::model::RawFields;
use crate::parser::html;
use crate::parser::normalize::{is_missing_rating, join_label_breaks};
use crate::site::Site;

const KNOWN_LABELS: &str = "Baixar|Título Original|Imdb|IMDb|Lançamento|Gêneros?|Idioma|Áudio|Legendas?|Formato|Qualidade|Tamanho|Duração|Vídeo";

/// Value after `label:` up to the end of the line or the next known label.
fn line_field(label: &str) -> Regex {
    Regex::new(&format!(
        r"(?m){label}:[ \t]*(.+?)\s*(?:(?:{KNOWN_LABELS}):|$)"
    ))
    .unwrap()
}

static LEADING_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"^(?:{KNOWN_LABELS})\s*:")).unwrap());
static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Baixar\s+(.+?)\s+Torrent").unwrap());
static ORIGINAL_RE: LazyLock<Regex> = LazyLock::new(|| line_field("Título Original"));
static IMDB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)imdb:[ \t]*([^/\n]+?)\s*/").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Lançamento:[ \t]*(\d{4})").unwrap());
static GENRE_UNTIL_LANG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Gêneros?:[ \t]*(.+?)\s*Idioma:").unwrap());
static GENRE_RE: LazyLock<Regex> = LazyLock::new(|| line_field("Gêneros?"));
static LANGUAGE_RE: LazyLock<Regex> = LazyLock::new(|| line_field("Idioma"));
static AUDIO_RE: LazyLock<Regex> = LazyLock::new(|| line_field("Áudio"));
static SIZE_RE: LazyLock<Regex> = LazyLock::new(|| line_field("Tamanho"));
static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| line_field("Duração"));
static VIDEO_SCORE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Vídeo:[ \t]*([0-9]+(?:[.,][0-9]+)?)\s*\|").unwrap());
static QUALITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Qualidade:[ \t]*([0-9a-zA-Z |]+)").unwrap());

/// Group 1 of `re`, unless the label was empty and the match ran into the next label.
fn capture(re: &Regex, text: &str) -> Option<String> {
    let m = re.captures(text)?.get(1)?;
    if LEADING_LABEL_RE.is_match(text[m.start()..].trim_start()) {
        return None;
    }
    Some(m.as_str().trim().to_string()).filter(|s| !s.is_empty())
}

/// Pattern-anchored extraction: each field is found by its label, wherever it sits.
pub fn extract(doc: &Html, site: Site) -> Result<RawFields, ParseError> {
    let info = html::select_first(doc, site.info_selector())
        .ok_or(ParseError::MissingInfoBlock(site.info_selector()))?;
    let text = join_label_breaks(&html::element_text(info));
    tracing::debug!(info = %text, "labeled info block");

    let imdb = capture(&IMDB_RE, &text).filter(|r| !is_missing_rating(r));
    let genero = capture(&GENRE_UNTIL_LANG_RE, &text).or_else(|| capture(&GENRE_RE, &text));
    // `Áudio:` doubles as the numeric score line on some pages
    let language = capture(&LANGUAGE_RE, &text).or_else(|| {
        capture(&AUDIO_RE, &text).filter(|a| !a.starts_with(|c: char| c.is_ascii_digit()))
    });
    let dublado = match language {
        Some(lang) => lang.contains("Português"),
        None => text.contains("Português"),
    };
    let qualidade = capture(&QUALITY_RE, &text)
        .map(|q| q.trim_end_matches('|').trim().to_string())
        .filter(|q| !q.is_empty());

    Ok(RawFields {
        titulo_dublado: capture(&TITLE_RE, &text),
        titulo_original: capture(&ORIGINAL_RE, &text),
        imdb,
        ano: capture(&YEAR_RE, &text),
        genero,
        tamanho: capture(&SIZE_RE, &text),
        duracao: capture(&DURATION_RE, &text),
        qualidade_video: capture(&VIDEO_SCORE_RE, &text),
        qualidade,
        dublado,
        sinopse: extract_synopsis(doc, site),
        poster_url: extract_poster(doc, site),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail(info: &str) -> Html {
        html::parse(&format!(
            r#"<html><body><div id="informacoes"><p>{info}</p></div>
            <div id="sinopse"><p>Descrição: Um hacker descobre a verdade.</p></div></body></html>"#
        ))
    }

    #[test]
    fn matrix_fields_by_label() {
        let doc = detail(
            "Baixar Matrix Torrent<br>Título Original: The Matrix<br>Imdb: 8.7/10<br>\
             Lançamento: 1999<br>Gêneros: Ação / Ficção Científica<br>Idioma: Português<br>\
             Tamanho: 2.5 GB<br>Duração: 136 Minutos<br>Qualidade: 1080p<br>\
             Áudio: 10 | Vídeo: 10 |",
        );
        let raw = extract(&doc, Site::Gratis).unwrap();
        assert_eq!(raw.titulo_dublado.as_deref(), Some("Matrix"));
        assert_eq!(raw.titulo_original.as_deref(), Some("The Matrix"));
        assert_eq!(raw.imdb.as_deref(), Some("8.7"));
        assert_eq!(raw.ano.as_deref(), Some("1999"));
        assert_eq!(raw.genero.as_deref(), Some("Ação / Ficção Científica"));
        assert_eq!(raw.tamanho.as_deref(), Some("2.5 GB"));
        assert_eq!(raw.duracao.as_deref(), Some("136 Minutos"));
        assert_eq!(raw.qualidade.as_deref(), Some("1080p"));
        assert_eq!(raw.qualidade_video.as_deref(), Some("10"));
        assert!(raw.dublado);
        assert_eq!(raw.sinopse.as_deref(), Some("Um hacker descobre a verdade."));
    }

    #[test]
    fn labels_on_one_line_do_not_bleed() {
        let doc = detail("Título Original: The Matrix Imdb: 8.7/10 Lançamento: 1999");
        let raw = extract(&doc, Site::Gratis).unwrap();
        assert_eq!(raw.titulo_original.as_deref(), Some("The Matrix"));
        assert_eq!(raw.ano.as_deref(), Some("1999"));
        assert_eq!(raw.titulo_dublado, None);
    }

    #[test]
    fn value_on_next_line_after_label() {
        let doc = detail("Título Original: \nThe Matrix<br>Imdb: ???/10");
        let raw = extract(&doc, Site::Gratis).unwrap();
        assert_eq!(raw.titulo_original.as_deref(), Some("The Matrix"));
        assert_eq!(raw.imdb, None);
    }

    #[test]
    fn empty_label_does_not_take_the_next_line() {
        let doc = detail(
            "Baixar Matrix Torrent<br><strong>Título Original:</strong> <br>Imdb: 8.7/10<br>\
             <strong>Tamanho:</strong> <br>Duração: 136 Minutos<br>\
             <strong>Qualidade:</strong> <br>Lançamento: 1999",
        );
        let raw = extract(&doc, Site::Gratis).unwrap();
        assert_eq!(raw.titulo_original, None);
        assert_eq!(raw.tamanho, None);
        assert_eq!(raw.qualidade, None);
        assert_eq!(raw.imdb.as_deref(), Some("8.7"));
        assert_eq!(raw.duracao.as_deref(), Some("136 Minutos"));
        assert_eq!(raw.ano.as_deref(), Some("1999"));
    }

    #[test]
    fn score_line_audio_is_not_a_language() {
        let doc = detail("Baixar Matrix Torrent<br>Áudio: 10 | Vídeo: 10 |<br>Versão em Português");
        let raw = extract(&doc, Site::Gratis).unwrap();
        assert!(raw.dublado);
        assert_eq!(raw.qualidade_video.as_deref(), Some("10"));
    }

    #[test]
    fn english_only_audio_is_not_dubbed() {
        let doc = detail("Baixar Tenet Torrent<br>Idioma: Inglês<br>Legenda: Português");
        let raw = extract(&doc, Site::Gratis).unwrap();
        assert!(!raw.dublado);
    }

    #[test]
    fn missing_info_block_is_a_parse_error() {
        let doc = html::parse("<html><body><p>nada</p></body></html>");
        assert_eq!(
            extract(&doc, Site::Gratis),
            Err(ParseError::MissingInfoBlock("#informacoes > p"))
        );
    }
}
