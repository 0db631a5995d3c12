//! Probabilistic rollout gates.
//!
//! A number-tagged flag holding an integer `n` in `0..=100` admits a call
//! when a fresh draw `r` from `0..100` satisfies `r <= n`. The comparison is
//! inclusive, so `"0"` still admits about one call in a hundred and `"100"`
//! admits every call. Deployed rollouts depend on the inclusive bound.

use crate::accessor::{AccessError, TypeTag, or_default, tagged_value};
use crate::snapshot::Snapshot;
use rand::Rng;

/// Parses the rollout percentage of `key`.
pub fn rollout_percentage(snapshot: Option<&Snapshot>, key: &str) -> Result<u8, AccessError> {
    let raw = tagged_value(snapshot, key, TypeTag::Number)?;
    let n = raw.parse::<i64>().map_err(|e| AccessError::Parse {
        expected: "integer percentage",
        value: raw.to_string(),
        reason: e.to_string(),
    })?;

    match u8::try_from(n) {
        Ok(n) if n <= 100 => Ok(n),
        _ => Err(AccessError::OutOfRange(n)),
    }
}

/// Draws once and admits if the draw does not exceed `percentage`.
pub fn admit<R: Rng + ?Sized>(percentage: u8, rng: &mut R) -> bool {
    let draw: u8 = rng.random_range(0..100);
    draw <= percentage
}

pub fn is_enabled_by_percent(snapshot: Option<&Snapshot>, key: &str) -> bool {
    is_enabled_by_percent_with(snapshot, key, &mut rand::rng())
}

/// Like [`is_enabled_by_percent`] with a caller-provided random source.
pub fn is_enabled_by_percent_with<R: Rng + ?Sized>(
    snapshot: Option<&Snapshot>,
    key: &str,
    rng: &mut R,
) -> bool {
    let admitted = rollout_percentage(snapshot, key).map(|n| admit(n, rng));
    or_default("is_enabled_by_percent", key, admitted, false)
}
