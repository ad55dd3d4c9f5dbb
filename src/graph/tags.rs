//! Discovery tags from expanded graph nodes

use serde_json::Value;

/// Harvest a flat list of tags from expanded nodes
///
/// Every `@type` contributes its first IRI. Every property holding a list is
/// walked with the property IRI as the parent label, and a literal
/// (`@value`) contributes the label of the property it sits under. The
/// result may contain duplicates.
#[must_use]
pub fn harvest_tags(nodes: &[Value]) -> Vec<String> {
    let mut tags = Vec::new();
    for node in nodes {
        harvest(node, "", &mut tags);
    }
    tags
}

fn harvest(node: &Value, parent: &str, tags: &mut Vec<String>) {
    let Value::Object(map) = node else {
        return;
    };

    for (key, value) in map {
        match (key.as_str(), value) {
            ("@type", Value::Array(types)) => {
                if let Some(first) = types.first().and_then(Value::as_str) {
                    tags.push(first.to_string());
                }
            }
            ("@type", _) => {}
            ("@value", _) => {
                if !parent.is_empty() {
                    tags.push(parent.to_string());
                }
            }
            (_, Value::Array(items)) => {
                for item in items {
                    harvest(item, key, tags);
                }
            }
            _ => {}
        }
    }
}
