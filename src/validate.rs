use chrono::{Datelike, Utc};

use crate::error::SchemaViolation;
use crate::model::{Movie, RawFields};
use crate::parser::normalize::{
    normalize_genre, parse_duration_minutes, parse_rating, parse_size_mb, parse_year,
    strip_label_colon,
};

pub const MIN_YEAR: i32 = 1888;
pub const MAX_RATING: f64 = 10.0;

/// Turns raw extracted strings into a typed [`Movie`], enforcing domain ranges.
///
/// Values that cannot be parsed at all become `None`; values that parse but
/// fall outside their range reject the whole record.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    max_year: i32,
}

impl RecordValidator {
    pub fn new(max_year: i32) -> Self {
        Self { max_year }
    }

    /// Upper year bound is the current year plus `buffer`.
    pub fn with_year_buffer(buffer: i32) -> Self {
        Self::new(Utc::now().year() + buffer)
    }

    pub fn max_year(&self) -> i32 {
        self.max_year
    }

    pub fn validate(&self, raw: RawFields, link: &str) -> Result<Movie, SchemaViolation> {
        let imdb = raw.imdb.as_deref().and_then(parse_rating);
        if let Some(r) = imdb {
            check(!(0.0..=MAX_RATING).contains(&r), "imdb", r, "[0, 10]")?;
        }

        let ano = raw.ano.as_deref().and_then(parse_year);
        if let Some(y) = ano {
            check(
                !(MIN_YEAR..=self.max_year).contains(&y),
                "ano",
                y,
                &format!("[{MIN_YEAR}, {}]", self.max_year),
            )?;
        }

        let duracao_minutos = raw.duracao.as_deref().and_then(parse_duration_minutes);
        if let Some(d) = duracao_minutos {
            check(d < 1, "duracao_minutos", d, ">= 1")?;
        }

        let qualidade_video = raw.qualidade_video.as_deref().and_then(parse_rating);
        if let Some(q) = qualidade_video {
            check(q < 0.0, "qualidade_video", q, ">= 0")?;
        }

        Ok(Movie {
            titulo_dublado: raw.titulo_dublado.as_deref().and_then(strip_label_colon),
            titulo_original: raw.titulo_original.as_deref().and_then(strip_label_colon),
            imdb,
            ano,
            genero: raw.genero.as_deref().and_then(normalize_genre),
            tamanho: raw.tamanho.as_deref().and_then(parse_size_mb),
            duracao_minutos,
            qualidade_video,
            qualidade: raw.qualidade.as_deref().and_then(strip_label_colon),
            dublado: raw.dublado,
            sinopse: raw.sinopse.as_deref().and_then(strip_label_colon),
            poster_url: raw.poster_url.as_deref().and_then(strip_label_colon),
            link: link.trim().to_string(),
            date_updated: None,
        })
    }
}

fn check(
    violated: bool,
    field: &'static str,
    value: impl ToString,
    allowed: &str,
) -> Result<(), SchemaViolation> {
    if violated {
        return Err(SchemaViolation {
            field,
            value: value.to_string(),
            allowed: allowed.to_string(),
        });
    }
    Ok(())
}
