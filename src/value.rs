//! The Dana runtime value model (spec section 3.1).

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::FunctionDef;
use crate::context::Scope;
use crate::resource::ResourceHandle;

/// An ordered, immutable sequence distinct from `List` under equality and
/// pattern matching, per spec section 3.1.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple(pub Vec<Value>);

/// An unordered collection of structurally-unique values. Dana's spec calls
/// for "unordered unique"; since a genuine hash-based set cannot hold an
/// unhashable `Float`, this keeps insertion order and deduplicates by
/// structural equality on insert (see DESIGN.md for the tradeoff).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DanaSet(pub Vec<Value>);

impl DanaSet {
    pub fn insert(&mut self, value: Value) {
        if !self.0.iter().any(|existing| existing == &value) {
            self.0.push(value);
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.0.iter().any(|existing| existing == value)
    }
}

/// A first-class function value: either a Dana-defined closure or a
/// host-registered callable, as unified by the function registry.
#[derive(Clone)]
pub enum Callable {
    Dana(Rc<DanaFunction>),
    Host(crate::registry::HostCallable),
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callable::Dana(func) => write!(f, "<dana fn {}>", func.def.name),
            Callable::Host(_) => write!(f, "<host fn>"),
        }
    }
}

impl PartialEq for Callable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Callable::Dana(a), Callable::Dana(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// A Dana-defined function value: captures its declaring scope by reference
/// for proper lexical-closure semantics (spec section 9) rather than
/// snapshotting values at definition time.
#[derive(Debug)]
pub struct DanaFunction {
    pub def: Rc<FunctionDef>,
    pub closure: Scope,
}

/// A struct type's field layout, shared between all instances.
#[derive(Debug, Clone, PartialEq)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, Option<crate::ast::TypeAnnotation>)>,
}

/// An instance of a declared struct type.
#[derive(Debug, Clone, PartialEq)]
pub struct StructInstance {
    pub ty: Rc<StructType>,
    pub fields: IndexMap<String, Value>,
}

/// A deferred value produced by an async host call that has not yet been
/// awaited by the sync adapter (spec section 5). Dana's surface syntax never
/// exposes an explicit `await`; a `Promise` only exists transiently between
/// dispatch and the adapter resolving it.
#[derive(Debug, Clone)]
pub struct Promise {
    pub resolved: Rc<std::cell::RefCell<Option<Value>>>,
}

/// The runtime representation of every Dana value (spec section 3.1).
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    List(Rc<std::cell::RefCell<Vec<Value>>>),
    Tuple(Rc<Tuple>),
    Set(Rc<std::cell::RefCell<DanaSet>>),
    Mapping(Rc<std::cell::RefCell<IndexMap<Value, Value>>>),
    Struct(Rc<std::cell::RefCell<StructInstance>>),
    Function(Callable),
    Resource(ResourceHandle),
    Promise(Promise),
}

impl Value {
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(std::cell::RefCell::new(items)))
    }

    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(Tuple(items)))
    }

    pub fn mapping(entries: IndexMap<Value, Value>) -> Value {
        Value::Mapping(Rc::new(std::cell::RefCell::new(entries)))
    }

    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(Rc::new(s.into()))
    }

    /// Dana's truthiness rule: `null`, `false`, `0`, `0.0`, empty string and
    /// empty containers are falsy; everything else is truthy. Used by `if`,
    /// `while` and short-circuit `and`/`or` (which return the operand value
    /// itself, not a coerced bool — see spec section 4.4.2).
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.borrow().is_empty(),
            Value::Tuple(t) => !t.0.is_empty(),
            Value::Set(s) => !s.borrow().0.is_empty(),
            Value::Mapping(m) => !m.borrow().is_empty(),
            Value::Struct(_) => true,
            Value::Function(_) => true,
            Value::Resource(_) => true,
            Value::Promise(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Mapping(_) => "mapping",
            Value::Struct(_) => "struct",
            Value::Function(_) => "function",
            Value::Resource(_) => "resource",
            Value::Promise(_) => "promise",
        }
    }

    /// Renders a value the way `print`/string-interpolation expects, and the
    /// way `reason()`'s bare-string contract expects its output rendered
    /// back if ever re-stringified.
    pub fn display(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format!("{f}"),
            Value::Str(s) => s.as_str().to_string(),
            Value::List(items) => {
                let parts: Vec<String> = items.borrow().iter().map(Value::repr).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Tuple(t) => {
                let parts: Vec<String> = t.0.iter().map(Value::repr).collect();
                format!("({})", parts.join(", "))
            }
            Value::Set(s) => {
                let parts: Vec<String> = s.borrow().0.iter().map(Value::repr).collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Mapping(m) => {
                let parts: Vec<String> = m
                    .borrow()
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
            Value::Struct(inst) => {
                let inst = inst.borrow();
                let parts: Vec<String> = inst
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{k}={}", v.repr()))
                    .collect();
                format!("{}({})", inst.ty.name, parts.join(", "))
            }
            Value::Function(_) => "<function>".to_string(),
            Value::Resource(r) => format!("<resource {} ({})>", r.name(), r.kind()),
            Value::Promise(_) => "<promise>".to_string(),
        }
    }

    fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{s}\""),
            other => other.display(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Int(a), Int(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Int(a), Float(b)) | (Float(b), Int(a)) => (*a as f64) == *b,
            (Str(a), Str(b)) => a == b,
            (List(a), List(b)) => *a.borrow() == *b.borrow(),
            (Tuple(a), Tuple(b)) => a.0 == b.0,
            (Set(a), Set(b)) => a.borrow().0 == b.borrow().0,
            (Mapping(a), Mapping(b)) => *a.borrow() == *b.borrow(),
            (Struct(a), Struct(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.ty == b.ty && a.fields == b.fields
            }
            (Function(a), Function(b)) => a == b,
            (Resource(a), Resource(b)) => a.identity() == b.identity(),
            _ => false,
        }
    }
}

impl Eq for Value {}

impl std::hash::Hash for Value {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => 0u8.hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Int(n) => n.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Tuple(t) => t.0.hash(state),
            Value::Resource(r) => r.identity().hash(state),
            // Mutable containers and functions are not meaningfully hashable;
            // using them as mapping keys is a caller error we don't attempt
            // to prevent at this layer (mirrors Python's own looseness here
            // for frozen-vs-mutable types, resolved pragmatically).
            _ => 0u8.hash(state),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        use Value::*;
        match (self, other) {
            (Int(a), Int(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)),
            (Str(a), Str(b)) => a.partial_cmp(b),
            (Bool(a), Bool(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}
