//! The `a2a` resource kind (client role): agent-to-agent task delegation
//! (spec section 4.5.2, 6.4). Real wire protocols are out of scope; this
//! ships a test-only in-memory fake.

use crate::error::{DanaError, SourceSpan, Traced};
use crate::resource::{ResourceConfig, ResourceKind};
use crate::value::Value;

pub trait A2aClient {
    fn get_agent_card(&self) -> Value;
    fn send_task(&mut self, task: &str) -> Result<String, Traced>;
    fn wait(&mut self, task_id: &str) -> Result<Value, Traced>;
}

pub struct FakeA2aClient {
    pub agent_name: String,
    next_id: u64,
}

impl FakeA2aClient {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            next_id: 0,
        }
    }
}

impl A2aClient for FakeA2aClient {
    fn get_agent_card(&self) -> Value {
        Value::str(format!("agent-card:{}", self.agent_name))
    }

    fn send_task(&mut self, task: &str) -> Result<String, Traced> {
        self.next_id += 1;
        let id = format!("task-{}", self.next_id);
        log::debug!("a2a fake dispatched '{task}' as {id}");
        Ok(id)
    }

    fn wait(&mut self, task_id: &str) -> Result<Value, Traced> {
        Ok(Value::str(format!("{task_id}: completed")))
    }
}

pub struct A2aResource {
    name: String,
    client: Box<dyn A2aClient>,
}

impl A2aResource {
    pub fn from_config(name: &str, _config: &ResourceConfig) -> Self {
        Self {
            name: name.to_string(),
            client: Box::new(FakeA2aClient::new(name)),
        }
    }

    pub fn with_client(name: impl Into<String>, client: Box<dyn A2aClient>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }
}

impl ResourceKind for A2aResource {
    fn kind_name(&self) -> &'static str {
        "a2a"
    }

    fn query(&mut self, operation: &str, args: Vec<Value>) -> Result<Value, Traced> {
        match operation {
            "get_agent_card" => Ok(self.client.get_agent_card()),
            "send_task" => {
                let task = args.first().map(Value::display).unwrap_or_default();
                self.client.send_task(&task).map(Value::str)
            }
            "wait" => {
                let task_id = args.first().map(Value::display).unwrap_or_default();
                self.client.wait(&task_id)
            }
            other => Err(Traced::new(DanaError::ArgumentError {
                message: format!("a2a resource '{}' has no operation '{other}'", self.name),
                span: SourceSpan::unknown(),
            })),
        }
    }
}
