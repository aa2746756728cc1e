//! Deterministic entity-to-text composition
//!
//! Every function here is a pure function of its input: the same entity
//! always composes to the same string, across calls and across processes.
//! The composed strings are what the embedder sees, so their exact shape is
//! part of the index format.

use sha2::{Digest, Sha256};

use kpath_domain::entities::{Capability, Service, Tool};

/// Name repetition factor for services and tools
///
/// Repeating the name triples its weight in the bag of features the
/// embedder extracts. Changing this invalidates persisted indexes.
const NAME_WEIGHT: usize = 3;

/// Domain abbreviations expanded during query preparation
///
/// The original token is kept alongside its expansion so exact matches
/// still score.
const ABBREVIATIONS: &[(&str, &str)] = &[
    ("mgmt", "management"),
    ("admin", "administration administrator"),
    ("auth", "authentication authorization"),
    ("db", "database"),
    ("api", "application programming interface"),
    ("ui", "user interface"),
    ("ux", "user experience"),
    ("hr", "human resources"),
    ("crm", "customer relationship management"),
    ("erp", "enterprise resource planning"),
];

/// Compose the searchable text for a service
///
/// Name (tripled) then description, capability descriptions, domains, and
/// tags, space-joined.
pub fn service_text(service: &Service) -> String {
    let mut parts: Vec<&str> = Vec::new();

    for _ in 0..NAME_WEIGHT {
        parts.push(&service.name);
    }
    if !service.description.is_empty() {
        parts.push(&service.description);
    }
    for capability in &service.capabilities {
        if !capability.description.is_empty() {
            parts.push(&capability.description);
        }
    }
    for domain in &service.domains {
        parts.push(domain);
    }
    for tag in &service.tags {
        parts.push(tag);
    }

    parts.join(" ")
}

/// Compose the searchable text for a tool
///
/// Labels each section so the embedding distinguishes a tool named "email"
/// from a service about email, and folds in schema property names and
/// example-call labels.
pub fn tool_text(tool: &Tool) -> String {
    let mut parts: Vec<String> = vec![
        format!("Tool: {}", tool.tool_name),
        format!("Purpose: {}", tool.description),
        format!("Service: {}", tool.service_name),
    ];

    let inputs = Tool::schema_property_names(tool.input_schema.as_ref());
    if !inputs.is_empty() {
        parts.push(format!("Inputs: {}", inputs.join(", ")));
    }
    let outputs = Tool::schema_property_names(tool.output_schema.as_ref());
    if !outputs.is_empty() {
        parts.push(format!("Outputs: {}", outputs.join(", ")));
    }

    if let Some(examples) = &tool.example_calls {
        if let Some(map) = examples.as_object() {
            if !map.is_empty() {
                let labels: Vec<&str> = map.keys().map(String::as_str).collect();
                parts.push(format!("Examples: {}", labels.join(", ")));
            }
        } else if let Some(list) = examples.as_array() {
            if !list.is_empty() {
                parts.push(format!("Examples: {} available", list.len()));
            }
        }
    }

    parts.join(" ")
}

/// Project a capability row to one searchable line
pub fn capability_line(capability: &Capability) -> String {
    match &capability.name {
        Some(name) if !name.is_empty() => format!("{} {}", name, capability.description),
        _ => capability.description.clone(),
    }
}

/// Project a tool to one capability-style searchable line
pub fn tool_capability_line(tool: &Tool) -> String {
    format!("{} {}", tool.tool_name, tool.description)
}

/// Synthesize the description of an observed invocation pattern
pub fn workflow_description(initiator: &str, target: &str, tool_name: &str) -> String {
    format!("{} calls {} using {}", initiator, target, tool_name)
}

/// Prepare a raw user query for embedding
///
/// Collapses whitespace, lowercases, and expands the fixed abbreviation
/// table. Purely lexical; no runtime state.
pub fn prepare_query(query: &str) -> String {
    let mut expanded: Vec<String> = Vec::new();

    for word in query.split_whitespace() {
        let lower = word.to_lowercase();
        match ABBREVIATIONS.iter().find(|(abbr, _)| *abbr == lower) {
            Some((abbr, expansion)) => expanded.push(format!("{} {}", abbr, expansion)),
            None => expanded.push(lower),
        }
    }

    expanded.join(" ")
}

/// Hash a query for grouping equal queries in feedback records
///
/// SHA-256 over the lowercased, trimmed query, hex-encoded.
pub fn query_hash(query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}
