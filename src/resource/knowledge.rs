//! The `knowledge` resource kind: read-only KV/RAG lookup (spec section
//! 4.5.2). Backed here by an in-memory `IndexMap` the host populates at
//! construction — a swappable stand-in for an out-of-scope knowledge engine.

use indexmap::IndexMap;

use crate::error::{DanaError, SourceSpan, Traced};
use crate::resource::{ResourceConfig, ResourceKind};
use crate::value::Value;

pub struct KnowledgeResource {
    name: String,
    entries: IndexMap<String, Value>,
}

impl KnowledgeResource {
    pub fn from_config(name: &str, config: &ResourceConfig) -> Self {
        let mut entries = IndexMap::new();
        if let Some(Value::Mapping(m)) = config.get("entries") {
            for (k, v) in m.borrow().iter() {
                entries.insert(k.display(), v.clone());
            }
        }
        Self {
            name: name.to_string(),
            entries,
        }
    }

    pub fn with_entries(name: impl Into<String>, entries: IndexMap<String, Value>) -> Self {
        Self {
            name: name.into(),
            entries,
        }
    }
}

impl ResourceKind for KnowledgeResource {
    fn kind_name(&self) -> &'static str {
        "knowledge"
    }

    fn query(&mut self, operation: &str, args: Vec<Value>) -> Result<Value, Traced> {
        match operation {
            "get" => {
                let key = args.first().map(Value::display).unwrap_or_default();
                self.entries.get(&key).cloned().ok_or_else(|| {
                    Traced::new(DanaError::ArgumentError {
                        message: format!(
                            "knowledge resource '{}' has no entry '{key}'",
                            self.name
                        ),
                        span: SourceSpan::unknown(),
                    })
                })
            }
            other => Err(Traced::new(DanaError::ArgumentError {
                message: format!(
                    "knowledge resource '{}' has no operation '{other}'",
                    self.name
                ),
                span: SourceSpan::unknown(),
            })),
        }
    }
}
