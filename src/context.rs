//! Execution context: scoped variable storage and call-frame stacks
//! (spec section 4.2).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::trace;

use crate::ast::ScopeKind;
use crate::error::{DanaError, SourceSpan, Traced};
use crate::resource::ResourceHandle;
use crate::value::Value;

/// A single variable table. `Rc<RefCell<..>>` so closures can capture their
/// declaring frame by reference (spec section 4.2: "closures ... capture a
/// reference to the declaring frame's bindings at function-value creation
/// time") instead of snapshotting values.
pub type Scope = Rc<RefCell<HashMap<String, Value>>>;

fn new_scope() -> Scope {
    Rc::new(RefCell::new(HashMap::new()))
}

thread_local! {
    /// Process-wide `system:` table, shared across every `ExecutionContext`
    /// on this thread, matching spec section 4.2's "process" lifetime.
    ///
    /// `Value` is built on `Rc`, so it is `!Send`/`!Sync` and cannot live
    /// behind a `std::sync::Mutex` in a plain `static`. Dana values never
    /// cross a thread boundary (spec section 5: single-threaded
    /// interpreter), so a `thread_local!` gives the same "lives for the
    /// life of the program" scope the spec asks for without claiming a
    /// `Sync` bound the value model can't support.
    static SYSTEM_SCOPE: RefCell<HashMap<String, Value>> = RefCell::new(HashMap::new());
}

/// One `local` call frame, plus the resources it owns for cleanup-on-pop
/// (spec section 3.6 / 4.5.4 trigger 3).
struct Frame {
    locals: Scope,
    owned_resources: Vec<ResourceHandle>,
}

impl Frame {
    fn new() -> Self {
        Self {
            locals: new_scope(),
            owned_resources: Vec::new(),
        }
    }
}

/// Owns the four named scopes and the `local` frame stack of one running
/// Dana program (spec section 4.2).
pub struct ExecutionContext {
    frames: Vec<Frame>,
    private: Scope,
    public: Scope,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            frames: vec![Frame::new()],
            private: new_scope(),
            public: new_scope(),
        }
    }

    /// Builds a context whose `public` table is shared with other programs
    /// in the same host process (spec section 4.2's multi-agent note).
    pub fn with_shared_public(public: Scope) -> Self {
        Self {
            frames: vec![Frame::new()],
            private: new_scope(),
            public,
        }
    }

    pub fn public_scope(&self) -> Scope {
        Rc::clone(&self.public)
    }

    fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    pub fn local_scope(&self) -> Scope {
        Rc::clone(&self.current_frame().locals)
    }

    pub fn push_frame(&mut self) {
        trace!("pushing local frame (depth {})", self.frames.len() + 1);
        self.frames.push(Frame::new());
    }

    /// Pops the current `local` frame, running cleanup for every resource it
    /// owns in reverse acquisition order (spec section 4.5.4).
    pub fn pop_frame(&mut self) -> Result<(), Traced> {
        let frame = self
            .frames
            .pop()
            .expect("pop_frame called with empty frame stack");
        trace!("popping local frame (depth now {})", self.frames.len());
        let mut first_error = None;
        for resource in frame.owned_resources.into_iter().rev() {
            if let Err(err) = resource.cleanup() {
                log::error!("resource cleanup failed during frame pop: {err}");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) if self.frames.is_empty() => Err(err),
            _ => Ok(()),
        }
    }

    pub fn own_resource(&mut self, resource: ResourceHandle) {
        self.frames
            .last_mut()
            .expect("frame stack is never empty")
            .owned_resources
            .push(resource);
    }

    fn scope_table(&self, scope: ScopeKind) -> Scope {
        match scope {
            ScopeKind::Local => self.local_scope(),
            ScopeKind::Private => Rc::clone(&self.private),
            ScopeKind::Public => Rc::clone(&self.public),
            ScopeKind::System => {
                // system: is thread-global; expose it through the same
                // `Scope` shape by copying in/out of the thread-local table.
                let snapshot = SYSTEM_SCOPE.with(|s| s.borrow().clone());
                Rc::new(RefCell::new(snapshot))
            }
        }
    }

    pub fn get(&self, scope: ScopeKind, name: &str) -> Result<Value, Traced> {
        if scope == ScopeKind::System {
            return SYSTEM_SCOPE
                .with(|s| s.borrow().get(name).cloned())
                .ok_or_else(|| not_bound(name));
        }
        let table = self.scope_table(scope);
        let table = table.borrow();
        table.get(name).cloned().ok_or_else(|| not_bound(name))
    }

    pub fn set(&self, scope: ScopeKind, name: &str, value: Value) -> Option<Value> {
        if scope == ScopeKind::System {
            return SYSTEM_SCOPE.with(|s| s.borrow_mut().insert(name.to_string(), value));
        }
        let table = self.scope_table(scope);
        let mut table = table.borrow_mut();
        table.insert(name.to_string(), value)
    }

    /// Bare-identifier lookup: local -> private -> public -> system
    /// (spec section 4.2, `resolve`).
    pub fn resolve(&self, name: &str) -> Result<(ScopeKind, Value), Traced> {
        if let Some(v) = self.local_scope().borrow().get(name).cloned() {
            return Ok((ScopeKind::Local, v));
        }
        if let Some(v) = self.private.borrow().get(name).cloned() {
            return Ok((ScopeKind::Private, v));
        }
        if let Some(v) = self.public.borrow().get(name).cloned() {
            return Ok((ScopeKind::Public, v));
        }
        if let Some(v) = SYSTEM_SCOPE.with(|s| s.borrow().get(name).cloned()) {
            return Ok((ScopeKind::System, v));
        }
        Err(not_bound(name))
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

fn not_bound(name: &str) -> Traced {
    Traced::new(DanaError::NameNotBound {
        name: name.to_string(),
        span: SourceSpan::unknown(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_prefers_local_over_outer_scopes() {
        let ctx = ExecutionContext::new();
        ctx.set(ScopeKind::Local, "x", Value::Int(1));
        ctx.set(ScopeKind::Public, "x", Value::Int(2));
        let (scope, value) = ctx.resolve("x").unwrap();
        assert_eq!(scope, ScopeKind::Local);
        assert_eq!(value, Value::Int(1));
    }

    #[test]
    fn push_pop_frame_isolates_locals() {
        let mut ctx = ExecutionContext::new();
        ctx.set(ScopeKind::Local, "x", Value::Int(1));
        ctx.push_frame();
        assert!(ctx.get(ScopeKind::Local, "x").is_err());
        ctx.pop_frame().unwrap();
        assert_eq!(ctx.get(ScopeKind::Local, "x").unwrap(), Value::Int(1));
    }
}
