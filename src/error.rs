//! The Dana error taxonomy.
//!
//! Every error the runtime can raise is a variant of [`DanaError`]. This
//! flattens the "common `DanaError` root" hierarchy from the language spec
//! into a single enum, which is the idiomatic Rust rendering of an
//! inheritance taxonomy: callers match exhaustively instead of downcasting.

use std::fmt;

use crate::value::Value;

/// A location in Dana source, attached to errors where available.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub file: String,
    pub line: usize,
    pub col: usize,
}

impl SourceSpan {
    pub fn new(file: impl Into<String>, line: usize, col: usize) -> Self {
        Self {
            file: file.into(),
            line,
            col,
        }
    }

    pub fn unknown() -> Self {
        Self::default()
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() && self.line == 0 {
            write!(f, "<unknown location>")
        } else {
            write!(f, "{}:{}:{}", self.file, self.line, self.col)
        }
    }
}

/// One frame of a Dana call-stack trace, attached to an error as it unwinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function: String,
    pub span: SourceSpan,
}

/// The full error taxonomy of spec section 7.
#[derive(Debug, thiserror::Error)]
pub enum DanaError {
    #[error("parse error at {span}: {message}")]
    ParseError { message: String, span: SourceSpan },

    #[error("name not bound: '{name}' at {span}")]
    NameNotBound { name: String, span: SourceSpan },

    #[error("type error at {span}: {message}")]
    TypeError { message: String, span: SourceSpan },

    #[error("argument error at {span}: {message}")]
    ArgumentError { message: String, span: SourceSpan },

    #[error("resource '{name}' is not active (state: {state:?}) at {span}")]
    ResourceNotActive {
        name: String,
        state: crate::resource::ResourceState,
        span: SourceSpan,
    },

    #[error("LLM backend unavailable: {message}")]
    LLMUnavailable { message: String },

    #[error("could not coerce reason() output to the requested type: {message}")]
    TypeCoercionError { message: String },

    #[error("operation timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("circular import involving '{module}': '{name}' is not yet bound")]
    CircularImport { module: String, name: String },

    #[error("internal interpreter error: {message}")]
    InternalError { message: String },

    #[error("host function '{name}' raised: {source}")]
    HostError {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A Dana-level `raise`/uncaught exception carrying an arbitrary payload
    /// value, so `try`/`except` can re-raise values that are not one of the
    /// built-in kinds above.
    #[error("uncaught error: {kind}: {message}")]
    Raised {
        kind: String,
        message: String,
        payload: Option<Value>,
    },
}

impl DanaError {
    /// The short kind name used for `except <kind>:` matching, per spec
    /// section 7's propagation policy.
    pub fn kind(&self) -> &str {
        match self {
            DanaError::ParseError { .. } => "ParseError",
            DanaError::NameNotBound { .. } => "NameNotBound",
            DanaError::TypeError { .. } => "TypeError",
            DanaError::ArgumentError { .. } => "ArgumentError",
            DanaError::ResourceNotActive { .. } => "ResourceNotActive",
            DanaError::LLMUnavailable { .. } => "LLMUnavailable",
            DanaError::TypeCoercionError { .. } => "TypeCoercionError",
            DanaError::Timeout { .. } => "Timeout",
            DanaError::CircularImport { .. } => "CircularImport",
            DanaError::InternalError { .. } => "InternalError",
            DanaError::HostError { .. } => "HostError",
            DanaError::Raised { kind, .. } => kind.as_str(),
        }
    }

    /// Whether this error kind may be caught by `try/except`. `InternalError`
    /// signals an interpreter invariant violation and is treated as fatal,
    /// matching the "Fatal" row in spec section 7's taxonomy table.
    pub fn is_catchable(&self) -> bool {
        !matches!(self, DanaError::InternalError { .. })
    }
}

/// A `DanaError` enriched with the Dana call stack active when it was
/// raised. Built incrementally as the error unwinds through call frames.
#[derive(Debug)]
pub struct Traced {
    pub error: DanaError,
    pub stack: Vec<StackFrame>,
}

impl Traced {
    pub fn new(error: DanaError) -> Self {
        Self {
            error,
            stack: Vec::new(),
        }
    }

    pub fn push_frame(mut self, frame: StackFrame) -> Self {
        self.stack.push(frame);
        self
    }
}

impl fmt::Display for Traced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.error)?;
        for frame in &self.stack {
            writeln!(f, "  at {} ({})", frame.function, frame.span)?;
        }
        Ok(())
    }
}

impl std::error::Error for Traced {}

pub type DanaResult<T> = Result<T, Traced>;
