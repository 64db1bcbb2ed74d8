use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Untyped field values pulled out of one detail page, before validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    pub titulo_dublado: Option<String>,
    pub titulo_original: Option<String>,
    pub imdb: Option<String>,
    pub ano: Option<String>,
    pub genero: Option<String>,
    pub tamanho: Option<String>,
    pub duracao: Option<String>,
    pub qualidade_video: Option<String>,
    pub qualidade: Option<String>,
    pub dublado: bool,
    pub sinopse: Option<String>,
    pub poster_url: Option<String>,
}

/// Canonical movie record. Column names follow `schema.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Movie {
    pub titulo_dublado: Option<String>,
    pub titulo_original: Option<String>,
    pub imdb: Option<f64>,
    pub ano: Option<i32>,
    pub genero: Option<String>,
    /// Size in megabytes.
    pub tamanho: Option<f64>,
    pub duracao_minutos: Option<i32>,
    pub qualidade_video: Option<f64>,
    pub qualidade: Option<String>,
    pub dublado: bool,
    pub sinopse: Option<String>,
    pub poster_url: Option<String>,
    pub link: String,
    /// Stamped by the loader, never by the parser.
    pub date_updated: Option<DateTime<Utc>>,
}

impl Movie {
    pub const DATA_FIELDS: usize = 13;

    /// Fraction of data fields (everything except `date_updated`) holding a value.
    pub fn field_fill_ratio(&self) -> f64 {
        let optional = [
            self.titulo_dublado.is_some(),
            self.titulo_original.is_some(),
            self.imdb.is_some(),
            self.ano.is_some(),
            self.genero.is_some(),
            self.tamanho.is_some(),
            self.duracao_minutos.is_some(),
            self.qualidade_video.is_some(),
            self.qualidade.is_some(),
            self.sinopse.is_some(),
            self.poster_url.is_some(),
        ];
        // dublado is always set
        let filled = optional.iter().filter(|f| **f).count()
            + 1
            + usize::from(!self.link.trim().is_empty());
        filled as f64 / Self::DATA_FIELDS as f64
    }

    pub fn display_title(&self) -> &str {
        self.titulo_dublado
            .as_deref()
            .or(self.titulo_original.as_deref())
            .unwrap_or("-")
    }
}

#[cfg(test)]
pub(crate) fn sample_movie(link: &str) -> Movie {
    Movie {
        titulo_dublado: Some("Matrix".into()),
        titulo_original: Some("The Matrix".into()),
        imdb: Some(8.7),
        ano: Some(1999),
        genero: Some("Ação, Ficção Científica".into()),
        tamanho: Some(2560.0),
        duracao_minutos: Some(136),
        qualidade_video: Some(10.0),
        qualidade: Some("1080p BluRay".into()),
        dublado: true,
        sinopse: Some("Um hacker descobre a verdade.".into()),
        poster_url: Some("https://img.example/matrix.jpg".into()),
        link: link.to_string(),
        date_updated: None,
    }
}
