//! Semantic-graph handling for sensor schemas
//!
//! Sensors describe their readings with a JSON-LD style document: an
//! `@context` mapping short terms to vocabulary IRIs plus `@type`
//! annotations. Before a field is announced to the metadata service the
//! schema and the field's value are expanded into fully-qualified nodes and
//! a flat list of discovery tags is harvested from the result.

mod expand;
mod tags;

use serde_json::Value;

use crate::Result;

pub use expand::ContextExpander;
pub use tags::harvest_tags;

/// Expands a context document into a list of fully-qualified graph nodes
pub trait GraphExpander: Send + Sync {
    /// Expand `document`
    ///
    /// # Errors
    ///
    /// Returns `Expansion` if the document or its context is malformed
    fn expand(&self, document: &Value) -> Result<Vec<Value>>;
}

/// Build the document for one field: the message schema plus the field's
/// value under its key
#[must_use]
pub fn field_document(schema: &Value, key: &str, value: &Value) -> Value {
    let mut document = match schema {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    document.insert(key.to_string(), value.clone());
    Value::Object(document)
}

/// Expand a field and harvest its tags in one step
///
/// # Errors
///
/// Returns `Expansion` if the schema cannot be expanded
pub fn tags_for_field(
    expander: &dyn GraphExpander,
    schema: &Value,
    key: &str,
    value: &Value,
) -> Result<Vec<String>> {
    let expanded = expander.expand(&field_document(schema, key, value))?;
    Ok(harvest_tags(&expanded))
}
