//! Function registry: unified registration and dispatch of Dana-defined and
//! host-defined callables (spec section 4.3).

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::context::ExecutionContext;
use crate::error::{DanaError, SourceSpan, Traced};
use crate::value::{Callable, Value};

/// A host-defined callable, synchronous or asynchronous. Host embedders
/// implement one of these closures and register it via
/// `Interpreter::register_function` (spec section 6.2 item 2).
#[derive(Clone)]
pub enum HostCallable {
    Sync(Rc<dyn Fn(&mut ExecutionContext, Vec<Value>, IndexMap<String, Value>) -> Result<Value, Traced>>),
    Async(
        Rc<
            dyn Fn(
                Vec<Value>,
                IndexMap<String, Value>,
            ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, Traced>>>>,
        >,
    ),
}

impl HostCallable {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&mut ExecutionContext, Vec<Value>, IndexMap<String, Value>) -> Result<Value, Traced>
            + 'static,
    {
        HostCallable::Sync(Rc::new(f))
    }

    pub fn is_async(&self) -> bool {
        matches!(self, HostCallable::Async(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryError {
    AlreadyRegistered { qualified_name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::AlreadyRegistered { qualified_name } => {
                write!(f, "function '{qualified_name}' is already registered")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<RegistryError> for DanaError {
    fn from(e: RegistryError) -> Self {
        DanaError::ArgumentError {
            message: e.to_string(),
            span: SourceSpan::unknown(),
        }
    }
}

#[derive(Clone)]
pub struct FunctionRecord {
    pub qualified_name: String,
    pub namespace: String,
    pub callable: Callable,
    pub is_context_aware: bool,
}

/// Maps `namespace -> name -> record`. The default namespace is `""`.
#[derive(Default)]
pub struct FunctionRegistry {
    table: RefCell<HashMap<String, HashMap<String, FunctionRecord>>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        namespace: Option<&str>,
        callable: Callable,
        is_context_aware: bool,
        overwrite: bool,
    ) -> Result<(), RegistryError> {
        let namespace = namespace.unwrap_or("").to_string();
        let mut table = self.table.borrow_mut();
        let ns_table = table.entry(namespace.clone()).or_default();
        if ns_table.contains_key(name) && !overwrite {
            return Err(RegistryError::AlreadyRegistered {
                qualified_name: qualify(&namespace, name),
            });
        }
        ns_table.insert(
            name.to_string(),
            FunctionRecord {
                qualified_name: qualify(&namespace, name),
                namespace,
                callable,
                is_context_aware,
            },
        );
        Ok(())
    }

    pub fn resolve(&self, qualified_name: &str) -> Option<FunctionRecord> {
        let (namespace, name) = match qualified_name.rsplit_once('.') {
            Some((ns, n)) => (ns, n),
            None => ("", qualified_name),
        };
        self.table
            .borrow()
            .get(namespace)
            .and_then(|ns| ns.get(name))
            .cloned()
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

/// Binds positional and keyword arguments to a Dana function's declared
/// parameters (spec section 4.3 step 2): positional left-to-right, then
/// keyword, defaults fill what's left, unmatched required params error.
pub fn bind_params(
    params: &[crate::ast::Param],
    mut positional: Vec<Value>,
    mut keywords: IndexMap<String, Value>,
) -> Result<HashMap<String, Value>, Traced> {
    let mut bound = HashMap::new();
    positional.reverse();
    for param in params {
        if let Some(value) = positional.pop() {
            bound.insert(param.name.clone(), value);
        } else if let Some(value) = keywords.shift_remove(&param.name) {
            bound.insert(param.name.clone(), value);
        } else if param.default.is_some() {
            // defaults are evaluated by the interpreter, which has the
            // closure scope needed to evaluate the default expression.
            continue;
        } else {
            return Err(Traced::new(DanaError::ArgumentError {
                message: format!("missing required argument '{}'", param.name),
                span: SourceSpan::unknown(),
            }));
        }
    }
    Ok(bound)
}
