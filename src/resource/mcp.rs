//! The `mcp` resource kind (client role): talk to external MCP servers
//! (spec section 4.5.2, 6.4). Real wire protocols are out of scope; this
//! ships a test-only in-memory fake implementing the same two operations a
//! real client would (`list_tools`, `call_tool`).

use indexmap::IndexMap;

use crate::error::{DanaError, SourceSpan, Traced};
use crate::resource::{ResourceConfig, ResourceKind};
use crate::value::Value;

pub trait McpClient {
    fn list_tools(&self) -> Vec<String>;
    fn call_tool(&mut self, tool: &str, args: &IndexMap<String, Value>) -> Result<Value, Traced>;
}

/// Deterministic in-memory fake used by lifecycle and cleanup-ordering
/// tests.
pub struct FakeMcpClient {
    pub tools: Vec<String>,
}

impl McpClient for FakeMcpClient {
    fn list_tools(&self) -> Vec<String> {
        self.tools.clone()
    }

    fn call_tool(&mut self, tool: &str, _args: &IndexMap<String, Value>) -> Result<Value, Traced> {
        if self.tools.iter().any(|t| t == tool) {
            Ok(Value::str(format!("{tool}: ok")))
        } else {
            Err(Traced::new(DanaError::ArgumentError {
                message: format!("mcp tool '{tool}' not found"),
                span: SourceSpan::unknown(),
            }))
        }
    }
}

pub struct McpResource {
    name: String,
    client: Box<dyn McpClient>,
}

impl McpResource {
    pub fn from_config(name: &str, _config: &ResourceConfig) -> Self {
        Self {
            name: name.to_string(),
            client: Box::new(FakeMcpClient { tools: Vec::new() }),
        }
    }

    pub fn with_client(name: impl Into<String>, client: Box<dyn McpClient>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }
}

impl ResourceKind for McpResource {
    fn kind_name(&self) -> &'static str {
        "mcp"
    }

    fn query(&mut self, operation: &str, args: Vec<Value>) -> Result<Value, Traced> {
        match operation {
            "list_tools" => Ok(Value::list(
                self.client.list_tools().into_iter().map(Value::str).collect(),
            )),
            "call_tool" => {
                let tool = args.first().map(Value::display).unwrap_or_default();
                let call_args = args
                    .get(1)
                    .map(mapping_to_indexmap)
                    .unwrap_or_default();
                self.client.call_tool(&tool, &call_args)
            }
            other => Err(Traced::new(DanaError::ArgumentError {
                message: format!("mcp resource '{}' has no operation '{other}'", self.name),
                span: SourceSpan::unknown(),
            })),
        }
    }
}

fn mapping_to_indexmap(value: &Value) -> IndexMap<String, Value> {
    match value {
        Value::Mapping(m) => m
            .borrow()
            .iter()
            .map(|(k, v)| (k.display(), v.clone()))
            .collect(),
        _ => IndexMap::new(),
    }
}
