//! Query DTOs

pub mod pagination;
pub mod users_list_filter;

use serde_json::Value;

use crate::error::{Result, ValidationError};

/// Decode a JSON-encoded query parameter
pub(crate) fn parse_json_param(param: &str, raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| ValidationError::MalformedJson {
        param: param.to_string(),
        reason: e.to_string(),
    })
}
