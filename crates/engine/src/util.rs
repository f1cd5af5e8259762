//! Internal helpers for model validation and conversion.
//!
//! These utilities are **not** part of the public API.

use uuid::Uuid;

use crate::{EngineError, ResultEngine};

/// Parse a UUID from storage and return a labeled error on failure.
pub(crate) fn parse_uuid(value: &str, label: &str) -> ResultEngine<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| EngineError::InvalidId(format!("invalid {label} id: {value}")))
}

pub(crate) fn parse_optional_uuid(value: Option<&str>, label: &str) -> ResultEngine<Option<Uuid>> {
    value.map(|raw| parse_uuid(raw, label)).transpose()
}

pub(crate) fn normalize_required_name(value: &str, label: &str) -> ResultEngine<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidName(format!(
            "{label} name must not be empty"
        )));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn normalize_optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

/// Validate a strictly positive amount in minor units.
pub(crate) fn ensure_positive(amount_minor: i64, label: &str) -> ResultEngine<()> {
    if amount_minor <= 0 {
        return Err(EngineError::InvalidAmount(format!("{label} must be > 0")));
    }
    Ok(())
}
