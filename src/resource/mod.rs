//! Resource subsystem: lifecycle-managed external handles (spec section 3.5,
//! 4.5).

pub mod a2a;
pub mod human;
pub mod knowledge;
pub mod llm;
pub mod mcp;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use log::{debug, error};

use crate::error::{DanaError, SourceSpan, Traced};
use crate::value::Value;

/// Configuration passed to a resource constructor: `use()`'s `config`
/// argument, merged with discovered configuration (spec section 4.5.3).
pub type ResourceConfig = IndexMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    Created,
    Initializing,
    Running,
    Terminating,
    Terminated,
    Failed,
}

/// Kind-specific behavior a resource implements. `query` is the generic
/// escape hatch every built-in kind (§4.5.2) layers its named operations
/// (`generate`, `call_tool`, `send_task`, `get`, `prompt`, ...) on top of.
pub trait ResourceKind {
    fn kind_name(&self) -> &'static str;
    fn initialize(&mut self) -> Result<(), Traced> {
        Ok(())
    }
    fn start(&mut self) -> Result<(), Traced> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), Traced> {
        Ok(())
    }
    fn query(&mut self, operation: &str, args: Vec<Value>) -> Result<Value, Traced>;
}

pub type ResourceConstructor = Rc<dyn Fn(&str, &ResourceConfig) -> Box<dyn ResourceKind>>;

struct ResourceInner {
    name: String,
    state: ResourceState,
    kind: Box<dyn ResourceKind>,
}

/// A reference-counted handle to one resource instance, shared between the
/// Dana value that names it and the `ExecutionContext`/frame that owns its
/// cleanup (spec section 3.5, 4.5.4).
#[derive(Clone)]
pub struct ResourceHandle(Rc<RefCell<ResourceInner>>);

impl ResourceHandle {
    pub fn new(name: impl Into<String>, kind: Box<dyn ResourceKind>) -> Self {
        Self(Rc::new(RefCell::new(ResourceInner {
            name: name.into(),
            state: ResourceState::Created,
            kind,
        })))
    }

    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    pub fn kind(&self) -> &'static str {
        self.0.borrow().kind.kind_name()
    }

    pub fn state(&self) -> ResourceState {
        self.0.borrow().state
    }

    pub fn identity(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// `_initialize_resource`: CREATED -> INITIALIZING -> RUNNING. Runs
    /// `_emergency_cleanup` (best-effort `stop`) if initialization fails.
    pub fn initialize(&self) -> Result<(), Traced> {
        {
            let mut inner = self.0.borrow_mut();
            inner.state = ResourceState::Initializing;
            debug!("initializing resource '{}' ({})", inner.name, inner.kind.kind_name());
        }
        let init_result = self.0.borrow_mut().kind.initialize();
        if let Err(err) = init_result {
            let mut inner = self.0.borrow_mut();
            inner.state = ResourceState::Failed;
            let _ = inner.kind.stop();
            return Err(err);
        }
        let start_result = self.0.borrow_mut().kind.start();
        match start_result {
            Ok(()) => {
                self.0.borrow_mut().state = ResourceState::Running;
                Ok(())
            }
            Err(err) => {
                let mut inner = self.0.borrow_mut();
                inner.state = ResourceState::Failed;
                let _ = inner.kind.stop();
                Err(err)
            }
        }
    }

    /// `_cleanup_resource`: RUNNING -> TERMINATING -> TERMINATED. Errors are
    /// logged and suppressed per spec section 4.5.4, never overwriting an
    /// in-flight exception — callers decide whether to surface the error.
    pub fn cleanup(&self) -> Result<(), Traced> {
        let mut inner = self.0.borrow_mut();
        if inner.state != ResourceState::Running {
            return Ok(());
        }
        inner.state = ResourceState::Terminating;
        let result = inner.kind.stop();
        match result {
            Ok(()) => {
                inner.state = ResourceState::Terminated;
                Ok(())
            }
            Err(err) => {
                error!("cleanup failed for resource '{}': {err}", inner.name);
                inner.state = ResourceState::Failed;
                Err(err)
            }
        }
    }

    pub fn query(&self, operation: &str, args: Vec<Value>) -> Result<Value, Traced> {
        if self.state() != ResourceState::Running {
            return Err(Traced::new(DanaError::ResourceNotActive {
                name: self.name(),
                state: self.state(),
                span: SourceSpan::unknown(),
            }));
        }
        self.0.borrow_mut().kind.query(operation, args)
    }
}

impl fmt::Debug for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResourceHandle({}, {:?})", self.name(), self.state())
    }
}

/// Maps a resource kind name (`llm`, `mcp`, ...) to its constructor, the
/// counterpart to `FunctionRegistry` for resource kinds (spec section
/// 4.5.x).
#[derive(Default)]
pub struct ResourceRegistry {
    kinds: HashMap<String, ResourceConstructor>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        let mut registry = Self::default();
        registry.register("llm", Rc::new(|name, cfg| {
            Box::new(llm::LlmResource::from_config(name, cfg)) as Box<dyn ResourceKind>
        }));
        registry.register("mcp", Rc::new(|name, cfg| {
            Box::new(mcp::McpResource::from_config(name, cfg)) as Box<dyn ResourceKind>
        }));
        registry.register("a2a", Rc::new(|name, cfg| {
            Box::new(a2a::A2aResource::from_config(name, cfg)) as Box<dyn ResourceKind>
        }));
        registry.register("knowledge", Rc::new(|name, cfg| {
            Box::new(knowledge::KnowledgeResource::from_config(name, cfg)) as Box<dyn ResourceKind>
        }));
        registry.register("human", Rc::new(|name, cfg| {
            Box::new(human::HumanResource::from_config(name, cfg)) as Box<dyn ResourceKind>
        }));
        registry
    }

    pub fn register(&mut self, kind: &str, ctor: ResourceConstructor) {
        self.kinds.insert(kind.to_string(), ctor);
    }

    /// `use("kind.name")`: spec section 4.5.3.
    pub fn instantiate(
        &self,
        identifier: &str,
        config: &ResourceConfig,
    ) -> Result<ResourceHandle, Traced> {
        let (kind, name) = identifier.split_once('.').ok_or_else(|| {
            Traced::new(DanaError::ArgumentError {
                message: format!("resource identifier '{identifier}' must be 'kind.name'"),
                span: SourceSpan::unknown(),
            })
        })?;
        let ctor = self.kinds.get(kind).ok_or_else(|| {
            Traced::new(DanaError::ArgumentError {
                message: format!("unknown resource kind '{kind}'"),
                span: SourceSpan::unknown(),
            })
        })?;
        Ok(ResourceHandle::new(name, ctor(name, config)))
    }
}
