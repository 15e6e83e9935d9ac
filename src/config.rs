//! Interpreter configuration (spec section 6.3).

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::value::{StructInstance, Value};

#[derive(Debug, Clone, Deserialize, Default)]
pub struct LlmConfig {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub temperature: Option<f64>,
    pub mock: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub resources: IndexMap<String, IndexMap<String, serde_json::Value>>,
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,
    #[serde(default)]
    pub env: IndexMap<String, serde_json::Value>,
}

impl Config {
    /// Layers built-in defaults, an optional config file, then
    /// `DANAPATH`/`DANA_MOCK_LLM`/`OPENAI_API_KEY`-style environment
    /// overrides — explicit argument overrides environment overrides
    /// default, the same precedence the module loader applies to its own
    /// search path (spec section 4.6 step 1).
    pub fn from_env_and_file(file: Option<&std::path::Path>) -> Self {
        let mut config = file
            .and_then(|path| std::fs::read_to_string(path).ok())
            .and_then(|contents| serde_json::from_str::<Config>(&contents).ok())
            .unwrap_or_default();

        if let Ok(dana_path) = std::env::var("DANAPATH") {
            config
                .search_paths
                .extend(std::env::split_paths(&dana_path).collect::<Vec<_>>());
        }
        if let Ok(mock) = std::env::var("DANA_MOCK_LLM") {
            config.llm.mock = Some(mock);
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            config.llm.api_key = Some(key);
        }
        config
    }
}

/// Converts a `serde_json::Value` (config file/`reason()` backend output)
/// into a Dana `Value`. Shared by config loading and `reason()`'s JSON
/// coercion of struct/list targets (spec section 4.4.3).
pub(crate) fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Value::str(s.clone()),
        serde_json::Value::Array(items) => Value::list(items.iter().map(json_to_value).collect()),
        serde_json::Value::Object(map) => {
            let fields: IndexMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), json_to_value(v))).collect();
            let ty = std::rc::Rc::new(crate::value::StructType {
                name: "object".to_string(),
                fields: fields.keys().map(|k| (k.clone(), None)).collect(),
            });
            Value::Struct(std::rc::Rc::new(std::cell::RefCell::new(StructInstance { ty, fields })))
        }
    }
}
