use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

/// One JSON object per line.
pub fn write_jsonl<W: Write, T: Serialize>(mut out: W, records: &[T]) -> io::Result<()> {
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}

/// A single pretty-printed JSON array.
pub fn write_json_array<W: Write, T: Serialize>(mut out: W, records: &[T]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut out, records)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Writes `records` to `path`: a `.json` extension gets an array, anything else JSON lines.
pub fn save<T: Serialize>(path: &Path, records: &[T]) -> io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let out = BufWriter::new(File::create(path)?);
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => write_json_array(out, records),
        _ => write_jsonl(out, records),
    }
}
