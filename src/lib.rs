//! Dana: an agent-native programming language with a strongly-typed
//! imperative surface, a sandboxed tree-walking interpreter, and a pluggable
//! resource system for LLM/MCP/A2A integration.
//!
//! This crate is a library; host applications embed an [`Interpreter`],
//! register host callables and resource kinds, and run Dana source.

pub mod ast;
pub mod asyncio;
pub mod config;
pub mod context;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod registry;
pub mod resource;
pub mod stdlib;
pub mod value;

pub use config::Config;
pub use error::DanaError;
pub use interpreter::{EventSink, Interpreter};
pub use registry::{HostCallable, RegistryError};
pub use resource::{ResourceConstructor, ResourceKind};
pub use value::Value;
