//! Context-driven expansion of sensor schemas

use serde_json::{Map, Value};

use super::GraphExpander;
use crate::{Error, Result};

/// Maximum number of prefix hops followed while resolving a term
const MAX_RESOLUTION_DEPTH: usize = 16;

const CONTEXT: &str = "@context";
const TYPE: &str = "@type";
const ID: &str = "@id";
const VALUE: &str = "@value";

/// JSON-LD style expander covering what sensor schemas use
///
/// Terms in `@context` map to absolute IRIs, to compact IRIs
/// (`prefix:suffix`) resolved through other terms, or to `{"@id": ...}`
/// definitions. Keys that do not resolve to an absolute IRI are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextExpander;

impl ContextExpander {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl GraphExpander for ContextExpander {
    fn expand(&self, document: &Value) -> Result<Vec<Value>> {
        let Value::Object(root) = document else {
            return Err(Error::Expansion("document is not an object".to_string()));
        };

        let context = Context::from_document(root)?;
        Ok(context.expand_node(root)?.into_iter().collect())
    }
}

struct Context<'a> {
    terms: &'a Map<String, Value>,
}

impl<'a> Context<'a> {
    fn from_document(document: &'a Map<String, Value>) -> Result<Self> {
        static EMPTY: std::sync::LazyLock<Map<String, Value>> = std::sync::LazyLock::new(Map::new);

        let terms = match document.get(CONTEXT) {
            None => &*EMPTY,
            Some(Value::Object(terms)) => terms,
            Some(other) => {
                return Err(Error::Expansion(format!(
                    "@context must be an object, got {other}"
                )));
            }
        };

        for (term, definition) in terms {
            match definition {
                Value::String(_) => {}
                Value::Object(def) if def.get(ID).is_some_and(Value::is_string) => {}
                _ => {
                    return Err(Error::Expansion(format!(
                        "invalid definition for term {term}: {definition}"
                    )));
                }
            }
        }

        Ok(Self { terms })
    }

    fn definition(&self, term: &str) -> Option<&'a str> {
        match self.terms.get(term)? {
            Value::String(iri) => Some(iri),
            Value::Object(def) => def.get(ID).and_then(Value::as_str),
            _ => None,
        }
    }

    /// Resolve a term or compact IRI to an absolute IRI
    fn resolve(&self, name: &str) -> Result<Option<String>> {
        self.resolve_at(name, 0)
    }

    fn resolve_at(&self, name: &str, depth: usize) -> Result<Option<String>> {
        if depth > MAX_RESOLUTION_DEPTH {
            return Err(Error::Expansion(format!(
                "term resolution for {name} exceeds {MAX_RESOLUTION_DEPTH} hops"
            )));
        }

        if let Some(iri) = self.definition(name) {
            if iri == name {
                return Ok(Some(iri.to_string()).filter(|i| i.contains(':')));
            }
            return self.resolve_at(iri, depth + 1);
        }

        let Some((prefix, suffix)) = name.split_once(':') else {
            return Ok(None);
        };

        // `scheme://...` is already absolute
        if suffix.starts_with("//") {
            return Ok(Some(name.to_string()));
        }

        if self.definition(prefix).is_some() {
            let base = self.resolve_at(prefix, depth + 1)?;
            return Ok(base.map(|base| format!("{base}{suffix}")));
        }

        Ok(Some(name.to_string()))
    }

    fn expand_node(&self, node: &Map<String, Value>) -> Result<Option<Value>> {
        let mut expanded = Map::new();

        for (key, value) in node {
            match key.as_str() {
                CONTEXT => {}
                TYPE => {
                    let types = self.expand_types(value)?;
                    if !types.is_empty() {
                        expanded.insert(TYPE.to_string(), Value::Array(types));
                    }
                }
                ID | VALUE => {
                    expanded.insert(key.clone(), value.clone());
                }
                _ => {
                    let Some(iri) = self.resolve(key)? else {
                        tracing::trace!(%key, "dropping key without IRI mapping");
                        continue;
                    };
                    let values = self.expand_value(value)?;
                    if !values.is_empty() {
                        expanded.insert(iri, Value::Array(values));
                    }
                }
            }
        }

        Ok((!expanded.is_empty()).then_some(Value::Object(expanded)))
    }

    fn expand_types(&self, value: &Value) -> Result<Vec<Value>> {
        let names: Vec<&str> = match value {
            Value::String(name) => vec![name.as_str()],
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(Error::Expansion(format!("@type must be a string, got {other}")));
            }
        };

        names
            .into_iter()
            .map(|name| {
                let iri = self.resolve(name)?.unwrap_or_else(|| name.to_string());
                Ok(Value::String(iri))
            })
            .collect()
    }

    fn expand_value(&self, value: &Value) -> Result<Vec<Value>> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::Object(map) if map.contains_key(VALUE) => Ok(vec![value.clone()]),
            Value::Object(map) => Ok(self.expand_node(map)?.into_iter().collect()),
            Value::Array(items) => {
                let mut flat = Vec::new();
                for item in items {
                    flat.extend(self.expand_value(item)?);
                }
                Ok(flat)
            }
            scalar => {
                let mut literal = Map::new();
                literal.insert(VALUE.to_string(), scalar.clone());
                Ok(vec![Value::Object(literal)])
            }
        }
    }
}
