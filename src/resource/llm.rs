//! The `llm` resource kind: consulted by `reason()` (spec section 4.4.3).

use crate::error::{DanaError, Traced};
use crate::resource::{ResourceConfig, ResourceKind};
use crate::value::Value;

/// Pluggable LLM backend. Real network-backed providers (openai, anthropic,
/// azure, gemini, bedrock, local) are out of scope (spec section 1); this
/// crate defines only the trait they would implement, plus two backends
/// useful for deterministic testing.
pub trait LlmBackend {
    fn generate(&self, prompt: &str, options: &ResourceConfig) -> Result<String, Traced>;
}

/// Deterministic canned-response backend, driven by `llm.mock` config or
/// `DANA_MOCK_LLM` (spec section 8.4 Scenario E).
pub struct MockBackend {
    pub response: String,
}

impl LlmBackend for MockBackend {
    fn generate(&self, _prompt: &str, _options: &ResourceConfig) -> Result<String, Traced> {
        Ok(self.response.clone())
    }
}

/// Always fails with `LLMUnavailable`, used to exercise that failure path.
pub struct UnreachableBackend;

impl LlmBackend for UnreachableBackend {
    fn generate(&self, _prompt: &str, _options: &ResourceConfig) -> Result<String, Traced> {
        Err(Traced::new(DanaError::LLMUnavailable {
            message: "LLM backend unreachable".to_string(),
        }))
    }
}

pub struct LlmResource {
    name: String,
    backend: Box<dyn LlmBackend>,
}

impl LlmResource {
    pub fn from_config(name: &str, config: &ResourceConfig) -> Self {
        let mock_response = config
            .get("mock")
            .map(Value::display)
            .or_else(|| std::env::var("DANA_MOCK_LLM").ok());

        let backend: Box<dyn LlmBackend> = match mock_response {
            Some(response) => Box::new(MockBackend { response }),
            None if config.get("provider").is_none() => Box::new(UnreachableBackend),
            None => Box::new(UnreachableBackend),
        };
        Self {
            name: name.to_string(),
            backend,
        }
    }

    pub fn with_backend(name: impl Into<String>, backend: Box<dyn LlmBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }
}

impl ResourceKind for LlmResource {
    fn kind_name(&self) -> &'static str {
        "llm"
    }

    fn query(&mut self, operation: &str, args: Vec<Value>) -> Result<Value, Traced> {
        match operation {
            "generate" => {
                let prompt = args.first().map(Value::display).unwrap_or_default();
                let options = args
                    .get(1)
                    .and_then(value_as_config)
                    .unwrap_or_default();
                self.backend
                    .generate(&prompt, &options)
                    .map(Value::str)
            }
            other => Err(Traced::new(DanaError::ArgumentError {
                message: format!("llm resource '{}' has no operation '{other}'", self.name),
                span: crate::error::SourceSpan::unknown(),
            })),
        }
    }
}

fn value_as_config(value: &Value) -> Option<ResourceConfig> {
    match value {
        Value::Mapping(m) => {
            let mut cfg = ResourceConfig::new();
            for (k, v) in m.borrow().iter() {
                cfg.insert(k.display(), v.clone());
            }
            Some(cfg)
        }
        _ => None,
    }
}
