//! Tool entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named invocable operation belonging to exactly one service
///
/// ## Business Rules
///
/// - `(service_id, tool_name)` is unique
/// - a tool participates in the tool index only when its own `is_active`
///   flag is set and its parent service is active
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub id: i32,
    pub service_id: i32,
    /// Parent service name, denormalized by the catalog reader so the text
    /// composer does not need a second lookup
    pub service_name: String,
    pub tool_name: String,
    pub description: String,
    pub input_schema: Option<Value>,
    pub output_schema: Option<Value>,
    pub example_calls: Option<Value>,
    pub validation_rules: Option<Value>,
    pub version: Option<String>,
    pub is_active: bool,
    pub deprecation_date: Option<DateTime<Utc>>,
    pub deprecation_notice: Option<String>,
}

impl Tool {
    /// Property names of a JSON schema's `properties` object, in order
    pub fn schema_property_names(schema: Option<&Value>) -> Vec<String> {
        schema
            .and_then(|s| s.get("properties"))
            .and_then(|p| p.as_object())
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default()
    }
}
