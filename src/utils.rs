//! Small helpers shared by the job, the API client and the stores.
//!
//! - String truncation for log output
//! - JSON truthiness for the "nothing to ingest" check
//! - Response size accounting in the news API's own JSON dialect
//! - File system validation for file-backed stores

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::Formatter;
use std::io::{self, Write};
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary) and
/// get an ellipsis and the number of dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Whether a decoded response body counts as empty.
///
/// `null`, `false`, `0`, `""`, `[]` and `{}` are all "nothing to ingest".
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
    }
}

/// JSON formatter matching the default output of Python's `json.dumps`.
///
/// Items are separated by `", "`, keys by `": "`, and every character outside
/// printable ASCII is written as a lowercase `\uXXXX` escape (UTF-16 surrogate
/// pairs above the BMP).
#[derive(Debug, Default)]
struct PythonJsonFormatter;

impl Formatter for PythonJsonFormatter {
    fn begin_array_value<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W: ?Sized + Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W: ?Sized + Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        if fragment.bytes().all(|b| b < 0x7f) {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if (c as u32) < 0x7f {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Byte length of `value` as the news API's Python tooling serializes it.
///
/// This is the size recorded in the run log, so it has to agree with what
/// `json.dumps(data)` reports for the same payload rather than with the raw
/// bytes on the wire.
///
/// # Arguments
///
/// * `value` - A decoded response body
///
/// # Returns
///
/// The number of bytes of the `json.dumps`-style rendering, or a serde error.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(python_json_len(&json!({"response": []}))?, 16);
/// assert_eq!(python_json_len(&json!({"h": "é"}))?, 15);
/// ```
pub fn python_json_len(value: &Value) -> Result<usize, serde_json::Error> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, PythonJsonFormatter);
    value.serialize(&mut serializer)?;
    Ok(out.len())
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then writes and removes a probe
/// file so permission problems surface before the first insert.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    fs::write(&probe_path, b"").await?;
    let _ = fs::remove_file(&probe_path).await;
    info!("Store directory is writable");
    Ok(())
}
