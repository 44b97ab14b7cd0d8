use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::analytics::constants::{
    DEFAULT_MAX_EVENT_NAME_LENGTH, DEFAULT_MAX_PARAMS, DEFAULT_MAX_PARAM_KEY_LENGTH,
    DEFAULT_MAX_PARAM_VALUE_LENGTH,
};
use crate::analytics::error::{invalid_argument, AnalyticsResult};

/// Scalar value attached to an event parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Flag(bool),
    Integer(i64),
    Number(f64),
    Text(String),
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Flag(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(value.into())
    }
}

impl From<usize> for ParamValue {
    fn from(value: usize) -> Self {
        ParamValue::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

pub type EventParams = BTreeMap<String, ParamValue>;

/// Builds an [`EventParams`] map from `(key, value)` pairs.
pub fn params<K, V, I>(entries: I) -> EventParams
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<ParamValue>,
{
    entries
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}

/// An enriched event as it sits in the queue. Immutable once enqueued.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    pub name: String,
    pub params: EventParams,
    pub timestamp_ms: i64,
    pub client_id: String,
    pub session_id: String,
}

/// Identity attached to every event at enqueue time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityContext {
    pub client_id: String,
    pub session_id: String,
}

/// Bounds applied to events before they are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationLimits {
    pub max_event_name_length: usize,
    pub max_params: usize,
    pub max_param_key_length: usize,
    pub max_param_value_length: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_event_name_length: DEFAULT_MAX_EVENT_NAME_LENGTH,
            max_params: DEFAULT_MAX_PARAMS,
            max_param_key_length: DEFAULT_MAX_PARAM_KEY_LENGTH,
            max_param_value_length: DEFAULT_MAX_PARAM_VALUE_LENGTH,
        }
    }
}

/// Letters, digits and underscores; non-empty; no leading digit.
pub fn is_identifier(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn validate_event_name(name: &str, limits: &ValidationLimits) -> AnalyticsResult<()> {
    if !is_identifier(name) {
        return Err(invalid_argument(format!(
            "Event name `{name}` must contain only letters, digits and underscores and must not start with a digit"
        )));
    }
    if name.len() > limits.max_event_name_length {
        return Err(invalid_argument(format!(
            "Event name `{name}` exceeds {} characters",
            limits.max_event_name_length
        )));
    }
    Ok(())
}

pub fn validate_params(params: &EventParams, limits: &ValidationLimits) -> AnalyticsResult<()> {
    if params.len() > limits.max_params {
        return Err(invalid_argument(format!(
            "Events may carry at most {} parameters, got {}",
            limits.max_params,
            params.len()
        )));
    }
    for (key, value) in params {
        if !is_identifier(key) || key.len() > limits.max_param_key_length {
            return Err(invalid_argument(format!("Invalid parameter name `{key}`")));
        }
        match value {
            ParamValue::Number(number) if !number.is_finite() => {
                return Err(invalid_argument(format!(
                    "Parameter `{key}` must be a finite number"
                )));
            }
            ParamValue::Text(text) if text.chars().count() > limits.max_param_value_length => {
                return Err(invalid_argument(format!(
                    "Parameter `{key}` exceeds {} characters",
                    limits.max_param_value_length
                )));
            }
            _ => {}
        }
    }
    Ok(())
}
