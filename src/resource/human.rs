//! The `human` resource kind: blocking prompt (spec section 4.5.2). Backed
//! by a host-supplied closure rather than real terminal I/O so headless
//! embeddings and tests stay deterministic.

use std::rc::Rc;

use crate::error::{DanaError, SourceSpan, Traced};
use crate::resource::{ResourceConfig, ResourceKind};
use crate::value::Value;

pub type PromptFn = Rc<dyn Fn(&str) -> String>;

pub struct HumanResource {
    name: String,
    prompt_fn: PromptFn,
}

impl HumanResource {
    pub fn from_config(name: &str, _config: &ResourceConfig) -> Self {
        Self {
            name: name.to_string(),
            prompt_fn: Rc::new(|_prompt| String::new()),
        }
    }

    pub fn with_prompt_fn(name: impl Into<String>, prompt_fn: PromptFn) -> Self {
        Self {
            name: name.into(),
            prompt_fn,
        }
    }
}

impl ResourceKind for HumanResource {
    fn kind_name(&self) -> &'static str {
        "human"
    }

    fn query(&mut self, operation: &str, args: Vec<Value>) -> Result<Value, Traced> {
        match operation {
            "prompt" => {
                let prompt = args.first().map(Value::display).unwrap_or_default();
                Ok(Value::str((self.prompt_fn)(&prompt)))
            }
            other => Err(Traced::new(DanaError::ArgumentError {
                message: format!("human resource '{}' has no operation '{other}'", self.name),
                span: SourceSpan::unknown(),
            })),
        }
    }
}
