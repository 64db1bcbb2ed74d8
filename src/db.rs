use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::error::LoadError;
use crate::fetcher::PageCache;
use crate::model::Movie;

const SCHEMA_JSON: &str = include_str!("../schema.json");

pub const CANONICAL_TABLE: &str = "filmes";
pub const STAGING_TABLE: &str = "stg_filmes";
const KEY_COLUMN: &str = "link";
const STAMP_COLUMN: &str = "date_updated";

/// One column of the warehouse schema shared by the canonical and staging tables.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mode: Option<String>,
}

impl SchemaField {
    fn sql_type(&self) -> &'static str {
        match self.kind.as_str() {
            "INTEGER" | "INT64" | "BOOLEAN" | "BOOL" => "INTEGER",
            "FLOAT" | "FLOAT64" | "NUMERIC" => "REAL",
            _ => "TEXT",
        }
    }

    fn is_required(&self) -> bool {
        self.mode.as_deref() == Some("REQUIRED")
    }
}

pub fn warehouse_schema() -> Result<Vec<SchemaField>, LoadError> {
    serde_json::from_str(SCHEMA_JSON).map_err(LoadError::Schema)
}

pub fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
    Ok(conn)
}

fn create_table_sql(table: &str, schema: &[SchemaField]) -> String {
    let cols: Vec<String> = schema
        .iter()
        .map(|f| {
            let not_null = if f.is_required() { " NOT NULL" } else { "" };
            format!("{} {}{}", f.name, f.sql_type(), not_null)
        })
        .collect();
    format!("CREATE TABLE IF NOT EXISTS {table} ({})", cols.join(", "))
}

/// Canonical and staging tables from the one schema, plus the page cache.
pub fn init_schema(conn: &Connection, schema: &[SchemaField]) -> Result<(), LoadError> {
    conn.execute_batch(&format!(
        "{};
        {};
        CREATE UNIQUE INDEX IF NOT EXISTS idx_{CANONICAL_TABLE}_{KEY_COLUMN}
            ON {CANONICAL_TABLE}({KEY_COLUMN});
        CREATE INDEX IF NOT EXISTS idx_{CANONICAL_TABLE}_ano ON {CANONICAL_TABLE}(ano);",
        create_table_sql(CANONICAL_TABLE, schema),
        create_table_sql(STAGING_TABLE, schema),
    ))?;
    init_cache_table(conn)?;
    Ok(())
}

fn init_cache_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS page_cache (
            url        TEXT PRIMARY KEY,
            html       TEXT NOT NULL,
            fetched_at INTEGER NOT NULL
        );",
    )
}

// ── Staging and merge ──

/// Two-phase writer: stage the batch, upsert it into the canonical table on
/// `link`, then clear staging. Staging is only cleared after a merge commits.
pub struct StagingLoader<'c> {
    conn: &'c Connection,
    schema: Vec<SchemaField>,
}

impl<'c> StagingLoader<'c> {
    pub fn new(conn: &'c Connection) -> Result<Self, LoadError> {
        let schema = warehouse_schema()?;
        init_schema(conn, &schema)?;
        Ok(Self { conn, schema })
    }

    pub fn staged_rows(&self) -> rusqlite::Result<usize> {
        self.conn
            .query_row(&format!("SELECT COUNT(*) FROM {STAGING_TABLE}"), [], |r| r.get(0))
    }

    pub fn load(&self, movies: &[Movie]) -> Result<usize, LoadError> {
        self.load_at(movies, Utc::now())
    }

    /// Like [`load`](Self::load) with an explicit merge timestamp.
    pub fn load_at(&self, movies: &[Movie], now: DateTime<Utc>) -> Result<usize, LoadError> {
        if movies.iter().any(|m| m.link.trim().is_empty()) {
            return Err(LoadError::MissingKey);
        }
        let leftover = self.staged_rows()?;
        if leftover > 0 {
            return Err(LoadError::StagingNotEmpty {
                table: STAGING_TABLE.to_string(),
                rows: leftover,
            });
        }
        if movies.is_empty() {
            return Ok(0);
        }

        self.stage(movies)?;
        let merged = self.merge(now)?;
        self.truncate()?;
        info!(staged = movies.len(), merged, "load complete");
        Ok(merged)
    }

    /// Re-applies whatever a failed run left in staging.
    pub fn recover(&self) -> Result<usize, LoadError> {
        self.recover_at(Utc::now())
    }

    pub fn recover_at(&self, now: DateTime<Utc>) -> Result<usize, LoadError> {
        let leftover = self.staged_rows()?;
        if leftover == 0 {
            return Ok(0);
        }
        warn!(rows = leftover, "merging leftover staging rows");
        let merged = self.merge(now)?;
        self.truncate()?;
        Ok(merged)
    }

    fn stage(&self, movies: &[Movie]) -> Result<(), LoadError> {
        let cols: Vec<&str> = self.schema.iter().map(|f| f.name.as_str()).collect();
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO {STAGING_TABLE} ({}) VALUES ({})",
            cols.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.unchecked_transaction().map_err(LoadError::Stage)?;
        {
            let mut stmt = tx.prepare(&sql).map_err(LoadError::Stage)?;
            for movie in movies {
                let row = self.to_row(movie)?;
                stmt.execute(params_from_iter(row)).map_err(LoadError::Stage)?;
            }
        }
        tx.commit().map_err(LoadError::Stage)?;
        Ok(())
    }

    fn to_row(&self, movie: &Movie) -> Result<Vec<SqlValue>, LoadError> {
        let value = serde_json::to_value(movie).map_err(LoadError::Encode)?;
        Ok(self
            .schema
            .iter()
            .map(|f| json_to_sql(value.get(&f.name).unwrap_or(&Value::Null), f))
            .collect())
    }

    fn merge(&self, now: DateTime<Utc>) -> Result<usize, LoadError> {
        let merge_err = |source| LoadError::Merge {
            table: CANONICAL_TABLE.to_string(),
            source,
        };

        let data_cols: Vec<&str> = self
            .schema
            .iter()
            .map(|f| f.name.as_str())
            .filter(|c| *c != STAMP_COLUMN)
            .collect();
        let updates: Vec<String> = data_cols
            .iter()
            .filter(|c| **c != KEY_COLUMN)
            .chain(std::iter::once(&STAMP_COLUMN))
            .map(|c| format!("{c} = excluded.{c}"))
            .collect();
        // `WHERE true` keeps SQLite from reading ON CONFLICT as a join clause
        let sql = format!(
            "INSERT INTO {CANONICAL_TABLE} ({cols}, {STAMP_COLUMN})
             SELECT {cols}, ?1 FROM {STAGING_TABLE} WHERE true
             ON CONFLICT({KEY_COLUMN}) DO UPDATE SET {updates}",
            cols = data_cols.join(", "),
            updates = updates.join(", "),
        );

        let tx = self.conn.unchecked_transaction().map_err(merge_err)?;
        let changed = tx.execute(&sql, params![now.to_rfc3339()]).map_err(merge_err)?;
        tx.commit().map_err(merge_err)?;
        Ok(changed)
    }

    fn truncate(&self) -> Result<(), LoadError> {
        self.conn
            .execute(&format!("DELETE FROM {STAGING_TABLE}"), [])
            .map_err(|source| LoadError::Truncate {
                table: STAGING_TABLE.to_string(),
                source,
            })?;
        Ok(())
    }
}

fn json_to_sql(value: &Value, field: &SchemaField) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) if field.sql_type() == "INTEGER" => {
            n.as_i64().map(SqlValue::Integer).unwrap_or(SqlValue::Null)
        }
        Value::Number(n) => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

// ── Page cache ──

/// Page cache backed by its own SQLite connection.
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    pub fn new(conn: Connection) -> rusqlite::Result<Self> {
        init_cache_table(&conn)?;
        Ok(Self { conn })
    }

    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Self::new(connect(path)?)
    }

    /// Deletes entries older than `ttl`, returning how many went.
    pub fn purge_expired(&self, ttl: Duration) -> rusqlite::Result<usize> {
        let cutoff = Utc::now().timestamp() - ttl.as_secs() as i64;
        self.conn
            .execute("DELETE FROM page_cache WHERE fetched_at <= ?1", params![cutoff])
    }

    pub fn entry_count(&self) -> rusqlite::Result<usize> {
        self.conn
            .query_row("SELECT COUNT(*) FROM page_cache", [], |r| r.get(0))
    }
}

impl PageCache for SqliteCache {
    fn get(&self, url: &str, ttl: Duration) -> Option<String> {
        let row: Option<(String, i64)> = match self
            .conn
            .query_row(
                "SELECT html, fetched_at FROM page_cache WHERE url = ?1",
                params![url],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()
        {
            Ok(row) => row,
            Err(e) => {
                warn!(url, "cache read failed: {e}");
                return None;
            }
        };
        let (html, fetched_at) = row?;
        let age = Utc::now().timestamp() - fetched_at;
        (age < ttl.as_secs() as i64).then_some(html)
    }

    fn put(&mut self, url: &str, html: &str) {
        if let Err(e) = self.conn.execute(
            "INSERT OR REPLACE INTO page_cache (url, html, fetched_at) VALUES (?1, ?2, ?3)",
            params![url, html, Utc::now().timestamp()],
        ) {
            warn!(url, "cache write failed: {e}");
        }
    }
}

// ── Reports ──

pub struct Stats {
    pub movies: usize,
    pub staged: usize,
    pub cached: usize,
    pub dubbed: usize,
    pub last_update: Option<String>,
}

pub fn get_stats(conn: &Connection) -> rusqlite::Result<Stats> {
    let count = |sql: &str| -> rusqlite::Result<usize> { conn.query_row(sql, [], |r| r.get(0)) };
    Ok(Stats {
        movies: count(&format!("SELECT COUNT(*) FROM {CANONICAL_TABLE}"))?,
        staged: count(&format!("SELECT COUNT(*) FROM {STAGING_TABLE}"))?,
        cached: count("SELECT COUNT(*) FROM page_cache")?,
        dubbed: count(&format!(
            "SELECT COUNT(*) FROM {CANONICAL_TABLE} WHERE dublado = 1"
        ))?,
        last_update: conn.query_row(
            &format!("SELECT MAX({STAMP_COLUMN}) FROM {CANONICAL_TABLE}"),
            [],
            |r| r.get(0),
        )?,
    })
}

pub struct OverviewRow {
    pub title: String,
    pub ano: Option<i32>,
    pub imdb: Option<f64>,
    pub genero: String,
    pub qualidade: String,
    pub dublado: bool,
}

pub fn fetch_overview(conn: &Connection, limit: usize) -> rusqlite::Result<Vec<OverviewRow>> {
    let sql = format!(
        "SELECT COALESCE(titulo_dublado, titulo_original, ''), ano, imdb,
                COALESCE(genero, ''), COALESCE(qualidade, ''), COALESCE(dublado, 0)
         FROM {CANONICAL_TABLE}
         ORDER BY ano DESC, imdb DESC
         LIMIT {limit}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(OverviewRow {
                title: row.get(0)?,
                ano: row.get(1)?,
                imdb: row.get(2)?,
                genero: row.get(3)?,
                qualidade: row.get(4)?,
                dublado: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Every canonical row as a [`Movie`], ordered by link.
pub fn fetch_movies(conn: &Connection) -> rusqlite::Result<Vec<Movie>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT titulo_dublado, titulo_original, imdb, ano, genero, tamanho,
                duracao_minutos, qualidade_video, qualidade, dublado, sinopse,
                poster_url, link, date_updated
         FROM {CANONICAL_TABLE}
         ORDER BY link"
    ))?;
    let rows = stmt
        .query_map([], |row| {
            let stamp: Option<String> = row.get(13)?;
            Ok(Movie {
                titulo_dublado: row.get(0)?,
                titulo_original: row.get(1)?,
                imdb: row.get(2)?,
                ano: row.get(3)?,
                genero: row.get(4)?,
                tamanho: row.get(5)?,
                duracao_minutos: row.get(6)?,
                qualidade_video: row.get(7)?,
                qualidade: row.get(8)?,
                dublado: row.get::<_, Option<bool>>(9)?.unwrap_or(false),
                sinopse: row.get(10)?,
                poster_url: row.get(11)?,
                link: row.get(12)?,
                date_updated: stamp
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|d| d.with_timezone(&Utc)),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
