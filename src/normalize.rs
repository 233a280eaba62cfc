//! Flattening of the nested API response into stored news records.
//!
//! The response is walked preference → category → article, and every article
//! becomes one [`NewsRecord`] carrying its enclosing preference and category
//! name. Missing structure at any level just means "no data here". The only
//! hard requirement is a numeric `datetime` on each category, because every
//! record built from that category takes its timestamp from it.
//!
//! [`normalize`] is pure. [`ingest`] runs it to completion before the first
//! insert, so a bad `datetime` anywhere in the payload stores nothing, while a
//! store failure leaves the records inserted before it in place.

use crate::error::NormalizeError;
use crate::models::{NewsRecord, RawApiResponse};
use crate::store::{self, DocumentStore};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, error, info, instrument};

const MICROS_PER_SEC: f64 = 1_000_000.0;

/// Convert unix seconds (integer or fractional) to a UTC instant.
///
/// Fractional values are rounded to the nearest microsecond.
///
/// # Arguments
///
/// * `category` - Name of the category the value came from, used in the error
/// * `value` - The category's raw `datetime`, `None` when the key was absent
///
/// # Returns
///
/// The instant, or [`NormalizeError::TypeConversion`] when the value is absent,
/// not a number, or outside chrono's representable range.
///
/// # Examples
///
/// ```ignore
/// let at = epoch_to_utc("Science", Some(&json!(1723563316)))?;
/// assert_eq!(at.to_rfc3339(), "2024-08-13T15:35:16+00:00");
///
/// assert!(epoch_to_utc("Science", Some(&json!("yesterday"))).is_err());
/// ```
pub fn epoch_to_utc(category: &str, value: Option<&Value>) -> Result<DateTime<Utc>, NormalizeError> {
    let conversion_error = |found: String| NormalizeError::TypeConversion {
        category: category.to_string(),
        found,
    };

    let number = match value {
        Some(Value::Number(n)) => n,
        Some(other) => return Err(conversion_error(describe(other).to_string())),
        None => return Err(conversion_error("no value".to_string())),
    };

    let converted = match number.as_i64() {
        Some(secs) => DateTime::from_timestamp(secs, 0),
        None => number
            .as_f64()
            .filter(|f| f.is_finite())
            .and_then(from_fractional_secs),
    };

    converted.ok_or_else(|| conversion_error(format!("out-of-range value {number}")))
}

fn from_fractional_secs(secs: f64) -> Option<DateTime<Utc>> {
    let whole = secs.floor();
    let mut micros = ((secs - whole) * MICROS_PER_SEC).round() as i64;
    let mut whole = whole as i64;
    if micros >= MICROS_PER_SEC as i64 {
        whole = whole.checked_add(1)?;
        micros = 0;
    }
    DateTime::from_timestamp(whole, (micros * 1_000) as u32)
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Build one [`NewsRecord`] per article, in response order.
///
/// A payload that is not a JSON object yields no records. All records share
/// `inserted_at`.
///
/// # Arguments
///
/// * `payload` - The decoded API response body
/// * `inserted_at` - Timestamp stamped on every record
///
/// # Returns
///
/// The flattened records, or the first conversion error met while walking the
/// categories. A present field of the wrong type is
/// [`NormalizeError::Malformed`].
///
/// # Examples
///
/// ```ignore
/// let payload = json!({"response": [{"preference": "Science", "agent_response": {
///     "news_fetched": [{"name": "Space", "datetime": 1723563316, "news": [{"heading": "H1"}]}]
/// }}]});
/// let records = normalize(&payload, Utc::now())?;
/// assert_eq!(records[0].category, "Space");
/// assert_eq!(records[0].description, "");
/// ```
pub fn normalize(payload: &Value, inserted_at: DateTime<Utc>) -> Result<Vec<NewsRecord>, NormalizeError> {
    if !payload.is_object() {
        return Ok(Vec::new());
    }
    let raw = RawApiResponse::deserialize(payload)?;

    let mut records = Vec::new();
    for block in raw.response {
        let preference = block.preference;
        for category in block.agent_response.news_fetched {
            let news_datetime = epoch_to_utc(&category.name, category.datetime.as_ref())?;
            debug!(
                preference = ?preference,
                category = %category.name,
                articles = category.news.len(),
                %news_datetime,
                "Normalizing category"
            );

            records.extend(category.news.into_iter().map(|article| NewsRecord {
                preference: preference.clone(),
                category: category.name.clone(),
                heading: article.heading,
                description: article.news,
                news_datetime,
                image: article.image,
                src: article.src,
                inserted_at,
            }));
        }
    }
    Ok(records)
}

/// Normalize `payload` and insert every record, one at a time and in order.
///
/// Returns the number of records inserted. The first store failure stops the
/// loop and is returned; there is no rollback of earlier inserts.
///
/// # Arguments
///
/// * `store` - Destination for the `news` collection
/// * `payload` - The decoded API response body
///
/// # Errors
///
/// Any [`normalize`] error (nothing has been inserted yet), or
/// [`NormalizeError::Store`] for the first failed insert.
///
/// # Examples
///
/// ```ignore
/// let inserted = ingest(store.as_ref(), &body.value).await?;
/// info!(inserted, "News stored");
/// ```
#[instrument(level = "info", skip_all)]
pub async fn ingest(store: &dyn DocumentStore, payload: &Value) -> Result<usize, NormalizeError> {
    let records = normalize(payload, Utc::now())?;
    info!(count = records.len(), "Normalized news records");

    for (index, record) in records.iter().enumerate() {
        if let Err(e) = store::insert(store, record).await {
            error!(index, total = records.len(), error = %e, "News insert failed; earlier records remain");
            return Err(e.into());
        }
    }

    info!(count = records.len(), "Inserted news records");
    Ok(records.len())
}
