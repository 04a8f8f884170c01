//! Built-in casts.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use super::{Affinity, Cast};
use metaorm_proto::{Raw, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const DATETIME_T_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

fn mismatch(expected: &str, value: &Value) -> String {
    format!("expected {} value, got {}", expected, value.kind())
}

fn text_of(raw: &Raw) -> String {
    raw.as_text().map(|t| t.into_owned()).unwrap_or_default()
}

/// Natural mapping between storage classes and values.
///
/// Default for columns without a declared cast: integers stay integers, reals
/// stay floats, text stays a string.
pub struct RawCast;

impl Cast for RawCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::Int(i) => Ok(Raw::Integer(*i)),
            Value::Float(f) if f.is_finite() => Ok(Raw::Real(*f)),
            Value::String(s) => Ok(Raw::Text(s.clone())),
            other => Err(format!(
                "{} values need a declared cast on this column",
                other.kind()
            )),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        match raw {
            Raw::Integer(i) => Ok(Value::Int(*i)),
            Raw::Real(f) => Ok(Value::Float(*f)),
            Raw::Text(s) => Ok(Value::String(s.clone())),
            Raw::Null => Err("NULL has no value".into()),
        }
    }
}

/// String pass-through.
pub struct StringCast;

impl Cast for StringCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::String(s) => Ok(Raw::Text(s.clone())),
            other => Err(mismatch("string", other)),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        Ok(Value::String(text_of(raw)))
    }
}

/// Scalars stored as their text form, always read back as strings.
///
/// Default for meta keys without a declared cast: integers, floats, booleans
/// (`1` / `0`) and temporal values are written as text, so any scalar can be
/// stored under an undeclared key.
pub struct TextCast;

impl Cast for TextCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::String(s) => Ok(Raw::Text(s.clone())),
            Value::Int(i) => Ok(Raw::Text(i.to_string())),
            Value::Float(f) if f.is_finite() => Ok(Raw::Text(f.to_string())),
            Value::Bool(b) => Ok(Raw::Text(i64::from(*b).to_string())),
            Value::Date(d) => Ok(Raw::Text(d.format(DATE_FORMAT).to_string())),
            Value::DateTime(dt) => Ok(Raw::Text(dt.format(DATETIME_FORMAT).to_string())),
            other => Err(format!(
                "{} values need a declared cast on this key",
                other.kind()
            )),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        Ok(Value::String(text_of(raw)))
    }
}

/// 64-bit integer.
pub struct IntegerCast;

impl Cast for IntegerCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::Int(i) => Ok(Raw::Integer(*i)),
            other => Err(mismatch("integer", other)),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        match raw {
            Raw::Integer(i) => Ok(Value::Int(*i)),
            Raw::Real(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(Value::Int(*f as i64))
            }
            Raw::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{}' is not an integer", s)),
            other => Err(format!("{:?} is not an integer", other)),
        }
    }

    fn affinity(&self) -> Affinity {
        Affinity::Integer
    }
}

/// 64-bit floating point.
///
/// Stored as the shortest decimal text that parses back to the same `f64`, so
/// a TEXT column keeps every bit of the value.
pub struct FloatCast;

impl Cast for FloatCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::Float(f) if f.is_finite() => Ok(Raw::Text(f.to_string())),
            Value::Float(f) => Err(format!("{} is not a finite number", f)),
            other => Err(mismatch("float", other)),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        match raw {
            Raw::Real(f) => Ok(Value::Float(*f)),
            Raw::Integer(i) => Ok(Value::Float(*i as f64)),
            Raw::Text(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
                .ok_or_else(|| format!("'{}' is not a number", s)),
            Raw::Null => Err("NULL has no value".into()),
        }
    }

    fn affinity(&self) -> Affinity {
        Affinity::Real
    }
}

const TRUE_FORMS: [&str; 4] = ["1", "true", "yes", "on"];
const FALSE_FORMS: [&str; 5] = ["0", "false", "no", "off", ""];

/// Boolean stored as `1` / `0`.
///
/// Decoding also accepts the textual forms found in key-value storage:
/// `"1"`/`"0"`, `true`/`false`, `yes`/`no`, `on`/`off` and the empty string.
/// Equality predicates match every one of those forms.
pub struct BooleanCast;

impl Cast for BooleanCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::Bool(b) => Ok(Raw::Integer(i64::from(*b))),
            other => Err(mismatch("boolean", other)),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        match raw {
            Raw::Integer(0) => Ok(Value::Bool(false)),
            Raw::Integer(1) => Ok(Value::Bool(true)),
            Raw::Text(s) => {
                let folded = s.trim().to_ascii_lowercase();
                if TRUE_FORMS.contains(&folded.as_str()) {
                    Ok(Value::Bool(true))
                } else if FALSE_FORMS.contains(&folded.as_str()) {
                    Ok(Value::Bool(false))
                } else {
                    Err(format!("'{}' is not a boolean", s))
                }
            }
            other => Err(format!("{:?} is not a boolean", other)),
        }
    }

    fn affinity(&self) -> Affinity {
        Affinity::Integer
    }

    fn equality_forms(&self, raw: &Raw) -> Option<Vec<String>> {
        let forms: &[&str] = match raw {
            Raw::Integer(1) => &TRUE_FORMS,
            Raw::Integer(0) => &FALSE_FORMS,
            _ => return None,
        };
        Some(forms.iter().map(|f| f.to_string()).collect())
    }
}

/// Calendar date as `YYYY-MM-DD`.
pub struct DateCast;

impl Cast for DateCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::Date(d) => Ok(Raw::Text(d.format(DATE_FORMAT).to_string())),
            other => Err(mismatch("date", other)),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        let text = text_of(raw);
        let trimmed = text.trim();
        NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
            .or_else(|_| parse_datetime(trimmed).map(|dt| dt.date()).ok_or(()))
            .map(Value::Date)
            .map_err(|_| format!("'{}' is not a date", text))
    }
}

/// Date and time as `YYYY-MM-DD HH:MM:SS[.fraction]`.
///
/// Decoding also accepts a `T` separator, RFC 3339 timestamps (normalized to
/// UTC) and integer Unix timestamps.
pub struct DateTimeCast;

impl Cast for DateTimeCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::DateTime(dt) => Ok(Raw::Text(dt.format(DATETIME_FORMAT).to_string())),
            other => Err(mismatch("datetime", other)),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        if let Raw::Integer(secs) = raw {
            return DateTime::from_timestamp(*secs, 0)
                .map(|dt| Value::DateTime(dt.naive_utc()))
                .ok_or_else(|| format!("{} is out of range for a timestamp", secs));
        }
        let text = text_of(raw);
        parse_datetime(text.trim())
            .map(Value::DateTime)
            .ok_or_else(|| format!("'{}' is not a datetime", text))
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, DATETIME_T_FORMAT))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Ordered collection stored as a JSON array.
///
/// Elements may be booleans, integers, floats, strings or nested arrays.
pub struct ArrayCast;

impl ArrayCast {
    fn element_to_json(value: &Value) -> Result<serde_json::Value, String> {
        match value {
            Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
            Value::Int(i) => Ok(serde_json::Value::from(*i)),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| format!("{} is not a finite number", f)),
            Value::String(s) => Ok(serde_json::Value::String(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::element_to_json)
                .collect::<Result<Vec<_>, _>>()
                .map(serde_json::Value::Array),
            other => Err(format!("{} values cannot be array elements", other.kind())),
        }
    }

    fn element_from_json(json: serde_json::Value) -> Result<Value, String> {
        match json {
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| format!("{} is out of range", n)),
            },
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Array(items) => items
                .into_iter()
                .map(Self::element_from_json)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            serde_json::Value::Null => Err("null is not a valid array element".into()),
            serde_json::Value::Object(_) => Err("objects are not valid array elements".into()),
        }
    }
}

impl Cast for ArrayCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::Array(_) => {
                let json = Self::element_to_json(value)?;
                serde_json::to_string(&json)
                    .map(Raw::Text)
                    .map_err(|e| e.to_string())
            }
            other => Err(mismatch("array", other)),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        let text = text_of(raw);
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| format!("malformed array: {}", e))?;
        match json {
            serde_json::Value::Array(_) => Self::element_from_json(json),
            _ => Err(format!("'{}' is not an array", text)),
        }
    }
}

/// Arbitrary JSON document.
pub struct JsonCast;

impl Cast for JsonCast {
    fn encode(&self, value: &Value) -> Result<Raw, String> {
        match value {
            Value::Json(doc) => serde_json::to_string(doc)
                .map(Raw::Text)
                .map_err(|e| e.to_string()),
            other => Err(mismatch("json", other)),
        }
    }

    fn decode(&self, raw: &Raw) -> Result<Value, String> {
        let text = text_of(raw);
        serde_json::from_str(&text)
            .map(Value::Json)
            .map_err(|e| format!("malformed json: {}", e))
    }
}
