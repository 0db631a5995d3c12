//! Typed reads over a snapshot.
//!
//! Every accessor is total: when a flag cannot be read as the requested type
//! the caller's default is returned and the reason is logged.

use crate::decode::Decode;
use crate::metrics_defs::ACCESSOR_DEFAULTED;
use crate::snapshot::Snapshot;
use shared::counter;
use std::fmt;

/// Declared type of a flag, stored in its `<key>.type` sibling entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeTag {
    Boolean,
    String,
    Number,
}

impl TypeTag {
    pub const fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Boolean => "boolean",
            TypeTag::String => "string",
            TypeTag::Number => "number",
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a flag could not be served.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum AccessError {
    #[error("feature toggles are not initiated")]
    NotInitiated,

    #[error("key not found")]
    MissingKey,

    #[error("value is empty")]
    EmptyValue,

    #[error("type tag is missing or empty")]
    MissingTypeTag,

    #[error("type tag {actual:?} does not match {expected}")]
    TypeMismatch { expected: TypeTag, actual: String },

    #[error("cannot parse {value:?} as {expected}: {reason}")]
    Parse {
        expected: &'static str,
        value: String,
        reason: String,
    },

    #[error("percentage {0} is outside 0..=100")]
    OutOfRange(i64),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl AccessError {
    /// Absence is the normal state of an unset flag.
    fn is_absence(&self) -> bool {
        matches!(self, AccessError::NotInitiated | AccessError::MissingKey)
    }
}

/// The raw value of `key`, which must be present and not blank.
pub fn raw_value<'a>(snapshot: Option<&'a Snapshot>, key: &str) -> Result<&'a str, AccessError> {
    let snapshot = snapshot.ok_or(AccessError::NotInitiated)?;
    let value = snapshot.get(key).ok_or(AccessError::MissingKey)?;
    if value.trim().is_empty() {
        return Err(AccessError::EmptyValue);
    }
    Ok(value)
}

/// The raw value of `key`, provided its type tag declares `expected`.
pub fn tagged_value<'a>(
    snapshot: Option<&'a Snapshot>,
    key: &str,
    expected: TypeTag,
) -> Result<&'a str, AccessError> {
    let value = raw_value(snapshot, key)?;

    // raw_value succeeded, so the snapshot is present
    let tag = snapshot
        .and_then(|s| s.type_tag(key))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .ok_or(AccessError::MissingTypeTag)?;

    if tag != expected.as_str() {
        return Err(AccessError::TypeMismatch {
            expected,
            actual: tag.to_string(),
        });
    }

    Ok(value)
}

/// Boolean literals: `1`, `t`, `true`, `0`, `f`, `false`, in any case.
pub fn parse_bool(raw: &str) -> Result<bool, AccessError> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" => Ok(true),
        "0" | "f" | "false" => Ok(false),
        _ => Err(AccessError::Parse {
            expected: "boolean",
            value: raw.to_string(),
            reason: "not a boolean literal".into(),
        }),
    }
}

/// Float parse. A finite literal too large for `f64` is out of range;
/// only the spelled-out `inf`/`infinity`/`nan` forms yield non-finite values.
pub fn parse_number(raw: &str) -> Result<f64, AccessError> {
    let parse_error = |reason: String| AccessError::Parse {
        expected: "number",
        value: raw.to_string(),
        reason,
    };

    let value = raw.parse::<f64>().map_err(|e| parse_error(e.to_string()))?;
    if !value.is_finite() && !is_non_finite_literal(raw) {
        return Err(parse_error("value out of range".into()));
    }
    Ok(value)
}

fn is_non_finite_literal(raw: &str) -> bool {
    let unsigned = raw.strip_prefix(['+', '-']).unwrap_or(raw);
    ["inf", "infinity", "nan"]
        .iter()
        .any(|literal| unsigned.eq_ignore_ascii_case(literal))
}

pub fn try_is_enabled(snapshot: Option<&Snapshot>, key: &str) -> Result<bool, AccessError> {
    tagged_value(snapshot, key, TypeTag::Boolean).and_then(parse_bool)
}

pub fn try_get_string(snapshot: Option<&Snapshot>, key: &str) -> Result<String, AccessError> {
    tagged_value(snapshot, key, TypeTag::String).map(str::to_string)
}

pub fn try_get_number(snapshot: Option<&Snapshot>, key: &str) -> Result<f64, AccessError> {
    tagged_value(snapshot, key, TypeTag::Number).and_then(parse_number)
}

/// Untagged read: the type tag is not consulted.
pub fn try_get<T: Decode>(snapshot: Option<&Snapshot>, key: &str) -> Result<T, AccessError> {
    let raw = raw_value(snapshot, key)?;
    T::decode(raw).map_err(|e| AccessError::Parse {
        expected: std::any::type_name::<T>(),
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

pub fn is_enabled(snapshot: Option<&Snapshot>, key: &str, default: bool) -> bool {
    or_default("is_enabled", key, try_is_enabled(snapshot, key), default)
}

pub fn get_string(snapshot: Option<&Snapshot>, key: &str, default: String) -> String {
    or_default("get_string", key, try_get_string(snapshot, key), default)
}

pub fn get_number(snapshot: Option<&Snapshot>, key: &str, default: f64) -> f64 {
    or_default("get_number", key, try_get_number(snapshot, key), default)
}

pub fn get<T: Decode>(snapshot: Option<&Snapshot>, key: &str, default: T) -> T {
    or_default("get", key, try_get(snapshot, key), default)
}

/// Unwraps an accessor result, logging and counting the fallback.
pub(crate) fn or_default<T>(
    accessor: &'static str,
    key: &str,
    result: Result<T, AccessError>,
    default: T,
) -> T {
    match result {
        Ok(value) => value,
        Err(reason) => {
            if reason.is_absence() {
                tracing::debug!(key, accessor, %reason, "Returning default for feature toggle");
            } else {
                tracing::warn!(key, accessor, %reason, "Returning default for feature toggle");
            }
            counter!(ACCESSOR_DEFAULTED, "accessor" => accessor).increment(1);
            default
        }
    }
}
