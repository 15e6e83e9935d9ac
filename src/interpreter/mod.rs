//! Tree-walking interpreter: evaluates the AST against the `ExecutionContext`,
//! using the `FunctionRegistry` for calls (spec section 4.4).

pub mod reason;

use std::rc::Rc;

use indexmap::IndexMap;
use log::trace;

use crate::ast::*;
use crate::config::json_to_value;
use crate::context::ExecutionContext;
use crate::lexer::Position;
use crate::error::{DanaError, SourceSpan, StackFrame, Traced};
use crate::registry::{bind_params, FunctionRecord, FunctionRegistry, HostCallable};
use crate::resource::{ResourceConfig, ResourceHandle, ResourceRegistry};
use crate::value::{Callable, DanaFunction, DanaSet, StructInstance, StructType, Value};

/// Non-local control flow unwound by statement execution: `return`,
/// `break`, `continue` (spec section 4.4.1).
enum Flow {
    Normal,
    Return(Value),
    Break,
    Continue,
}

/// A resolved, write-addressable target location. Computing this once and
/// reusing it for both the read and the write is what lets `a[b][c] += 1`
/// evaluate `a`, `b` and `c` exactly once (spec section 8.2 / SPEC_FULL
/// section 4.1), instead of once per `eval_target` call plus once per
/// `assign` call.
enum Location {
    Name(ScopeKind, String),
    Attribute(Rc<std::cell::RefCell<StructInstance>>, String),
    List(Rc<std::cell::RefCell<Vec<Value>>>, usize),
    Mapping(Rc<std::cell::RefCell<IndexMap<Value, Value>>>, Value),
}

/// Optional callback the host installs to observe statement-level execution
/// (`SPEC_FULL.md` section 4.4's concrete tracing mechanism).
pub trait EventSink {
    fn on_statement(&mut self, function: &str, span: &SourceSpan);
}

fn span_at(position: crate::lexer::Position) -> SourceSpan {
    SourceSpan::new("<module>", position.line, position.col)
}

pub struct Interpreter {
    pub context: ExecutionContext,
    pub registry: FunctionRegistry,
    pub resources: ResourceRegistry,
    pub loader: crate::loader::ModuleLoader,
    pub config: crate::config::Config,
    event_sink: Option<Box<dyn EventSink>>,
}

impl Interpreter {
    pub fn new(config: crate::config::Config) -> Self {
        let mut interpreter = Self {
            context: ExecutionContext::new(),
            registry: FunctionRegistry::new(),
            resources: ResourceRegistry::new(),
            loader: crate::loader::ModuleLoader::new(config.search_paths.clone()),
            config,
            event_sink: None,
        };
        crate::stdlib::install(&mut interpreter);
        // spec section 6.3: `env` seeds the initial `system:` bindings.
        let env = interpreter.config.env.clone();
        for (key, value) in env {
            interpreter
                .context
                .set(ScopeKind::System, &key, json_to_value(&value));
        }
        interpreter
    }

    pub fn set_event_sink(&mut self, sink: Box<dyn EventSink>) {
        self.event_sink = Some(sink);
    }

    pub fn register_function(
        &mut self,
        name: &str,
        callable: HostCallable,
        namespace: Option<&str>,
        is_context_aware: bool,
    ) -> Result<(), crate::registry::RegistryError> {
        self.registry
            .register(name, namespace, Callable::Host(callable), is_context_aware, false)
    }

    pub fn run(&mut self, source: &str) -> Result<Value, DanaError> {
        let program = crate::parser::parse(source).map_err(|e| DanaError::ParseError {
            message: e.message,
            span: SourceSpan::new("<module>", e.position.line, e.position.col),
        })?;
        self.exec_block("", &program).map_err(|traced| traced.error)
    }

    pub fn register_resource_kind(&mut self, kind: &str, ctor: crate::resource::ResourceConstructor) {
        self.resources.register(kind, ctor);
    }

    pub fn load_module(&mut self, path: &std::path::Path) -> Result<(), DanaError> {
        let source = std::fs::read_to_string(path).map_err(|e| DanaError::InternalError {
            message: format!("could not read '{}': {e}", path.display()),
        })?;
        let program = crate::parser::parse(&source).map_err(|e| DanaError::ParseError {
            message: e.message,
            span: SourceSpan::new(path.display().to_string(), e.position.line, e.position.col),
        })?;
        let namespace = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        self.exec_block(namespace, &program)
            .map(|_| ())
            .map_err(|traced| traced.error)
    }

    pub fn run_file(&mut self, path: &std::path::Path) -> Result<Value, DanaError> {
        let source = std::fs::read_to_string(path).map_err(|e| DanaError::InternalError {
            message: format!("could not read '{}': {e}", path.display()),
        })?;
        self.run(&source)
    }

    pub fn call_function(
        &mut self,
        qualified_name: &str,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
    ) -> Result<Value, DanaError> {
        let record = self
            .registry
            .resolve(qualified_name)
            .ok_or_else(|| DanaError::NameNotBound {
                name: qualified_name.to_string(),
                span: SourceSpan::unknown(),
            })?;
        self.dispatch(&record, args, kwargs, SourceSpan::unknown())
            .map_err(|traced| traced.error)
    }

    /// Executes a sequence of top-level statements, returning the value of
    /// the last `Expression` statement (used as `run`'s return value, and by
    /// the module loader to execute a freshly-loaded module's body).
    pub fn exec_block(&mut self, namespace: &str, block: &Block) -> Result<Value, Traced> {
        let mut last = Value::Null;
        for statement in block {
            match self.exec_statement(namespace, statement)? {
                Flow::Normal => {
                    if let Statement::Expression(expr) = statement {
                        last = self.eval(expr)?;
                    }
                }
                Flow::Return(v) => return Ok(v),
                Flow::Break | Flow::Continue => {
                    return Err(Traced::new(DanaError::InternalError {
                        message: "break/continue outside of a loop".to_string(),
                    }))
                }
            }
        }
        Ok(last)
    }

    fn exec_statement(&mut self, namespace: &str, statement: &Statement) -> Result<Flow, Traced> {
        if let Some(sink) = self.event_sink.as_mut() {
            sink.on_statement(namespace, &SourceSpan::unknown());
        }
        trace!("executing statement in namespace '{namespace}'");
        match statement {
            Statement::Assignment {
                target,
                annotation,
                value,
                position,
            } => {
                let value = self.eval_with_annotation(value, annotation.as_ref())?;
                self.assign(target, value, *position)?;
                Ok(Flow::Normal)
            }
            Statement::CompoundAssignment {
                target,
                op,
                value,
                position,
            } => {
                let location = self.resolve_target(target)?;
                let current = self.read_location(&location, *position)?;
                let rhs = self.eval(value)?;
                let combined = apply_compound_op(*op, current, rhs, *position)?;
                self.write_location(location, combined)?;
                Ok(Flow::Normal)
            }
            Statement::Expression(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Statement::If {
                branches,
                else_branch,
                ..
            } => {
                for (cond, body) in branches {
                    if self.eval(cond)?.is_truthy() {
                        return self.exec_body(namespace, body);
                    }
                }
                if let Some(body) = else_branch {
                    return self.exec_body(namespace, body);
                }
                Ok(Flow::Normal)
            }
            Statement::While { condition, body, .. } => {
                while self.eval(condition)?.is_truthy() {
                    match self.exec_body(namespace, body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => continue,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::For {
                target,
                iterable,
                body,
                position,
            } => {
                let iterable_value = self.eval(iterable)?;
                let items = self.iterate(iterable_value, *position)?;
                for item in items {
                    self.assign(target, item, *position)?;
                    match self.exec_body(namespace, body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => continue,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                    }
                }
                Ok(Flow::Normal)
            }
            Statement::FunctionDef(def) => {
                let closure = self.context.local_scope();
                let function = Callable::Dana(Rc::new(DanaFunction {
                    def: Rc::clone(def),
                    closure,
                }));
                self.registry
                    .register(&def.name, Some(namespace), function.clone(), false, true)
                    .map_err(|e| Traced::new(e.into()))?;
                self.context
                    .set(ScopeKind::Local, &def.name, Value::Function(function));
                Ok(Flow::Normal)
            }
            Statement::StructDef(def) => {
                let ty = Rc::new(StructType {
                    name: def.name.clone(),
                    fields: def
                        .fields
                        .iter()
                        .map(|f| (f.name.clone(), f.annotation.clone()))
                        .collect(),
                });
                let constructor = self.make_struct_constructor(ty);
                self.registry
                    .register(&def.name, Some(namespace), constructor.clone(), false, true)
                    .map_err(|e| Traced::new(e.into()))?;
                self.context
                    .set(ScopeKind::Local, &def.name, Value::Function(constructor));
                Ok(Flow::Normal)
            }
            Statement::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
            Statement::Import { path, alias, .. } => {
                let mut loader = std::mem::take(&mut self.loader);
                let result = loader.load(self, path, alias.as_deref());
                self.loader = loader;
                result?;
                Ok(Flow::Normal)
            }
            Statement::With { bindings, body, .. } => self.exec_with(namespace, bindings, body),
            Statement::Try {
                body,
                handlers,
                finally,
                ..
            } => self.exec_try(namespace, body, handlers, finally),
            Statement::Pass => Ok(Flow::Normal),
            Statement::Break => Ok(Flow::Break),
            Statement::Continue => Ok(Flow::Continue),
        }
    }

    fn exec_body(&mut self, namespace: &str, body: &Block) -> Result<Flow, Traced> {
        for statement in body {
            match self.exec_statement(namespace, statement)? {
                Flow::Normal => continue,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn make_struct_constructor(&self, ty: Rc<StructType>) -> Callable {
        Callable::Host(HostCallable::sync(move |_ctx, args, kwargs| {
            let mut fields = IndexMap::new();
            let mut positional = args.into_iter();
            for (field_name, _) in &ty.fields {
                if let Some(value) = positional.next() {
                    fields.insert(field_name.clone(), value);
                } else if let Some(value) = kwargs.get(field_name) {
                    fields.insert(field_name.clone(), value.clone());
                } else {
                    fields.insert(field_name.clone(), Value::Null);
                }
            }
            Ok(Value::Struct(Rc::new(std::cell::RefCell::new(StructInstance {
                ty: Rc::clone(&ty),
                fields,
            }))))
        }))
    }

    /// `with` statement: spec section 4.4.1 and 4.5.4. Bindings acquire in
    /// order; cleanup runs in reverse acquisition order on every exit path.
    fn exec_with(
        &mut self,
        namespace: &str,
        bindings: &[WithBinding],
        body: &Block,
    ) -> Result<Flow, Traced> {
        let mut acquired = Vec::new();
        let mut init_error = None;
        for binding in bindings {
            let value = match self.eval(&binding.value) {
                Ok(v) => v,
                Err(e) => {
                    init_error = Some(e);
                    break;
                }
            };
            let Value::Resource(handle) = value else {
                init_error = Some(Traced::new(DanaError::TypeError {
                    message: "with-expression must yield a resource".to_string(),
                    span: SourceSpan::unknown(),
                }));
                break;
            };
            if let Err(e) = handle.initialize() {
                init_error = Some(e);
                break;
            }
            if let Some(name) = &binding.name {
                self.context
                    .set(ScopeKind::Local, name, Value::Resource(handle.clone()));
            }
            acquired.push(handle);
        }

        let body_result = if init_error.is_none() {
            self.exec_body(namespace, body)
        } else {
            Ok(Flow::Normal)
        };

        let mut cleanup_error = None;
        for handle in acquired.into_iter().rev() {
            if let Err(e) = handle.cleanup() {
                cleanup_error.get_or_insert(e);
            }
        }

        if let Some(e) = init_error {
            return Err(e);
        }
        match body_result {
            Err(e) => Err(e),
            Ok(flow) => {
                if let Some(e) = cleanup_error {
                    return Err(e);
                }
                Ok(flow)
            }
        }
    }

    fn exec_try(
        &mut self,
        namespace: &str,
        body: &Block,
        handlers: &[ExceptClause],
        finally: &Option<Block>,
    ) -> Result<Flow, Traced> {
        let result = self.exec_body(namespace, body);
        let result = match result {
            Err(traced) if traced.error.is_catchable() => {
                let mut handled = None;
                for handler in handlers {
                    let matches = handler
                        .kind
                        .as_ref()
                        .map(|k| k.as_str() == traced.error.kind())
                        .unwrap_or(true);
                    if matches {
                        if let Some(name) = &handler.bind_as {
                            self.context.set(
                                ScopeKind::Local,
                                name,
                                Value::str(traced.error.to_string()),
                            );
                        }
                        handled = Some(self.exec_body(namespace, &handler.body));
                        break;
                    }
                }
                handled.unwrap_or(Err(traced))
            }
            other => other,
        };
        if let Some(finally_body) = finally {
            let finally_result = self.exec_body(namespace, finally_body);
            match finally_result {
                Err(e) => return Err(e),
                Ok(Flow::Return(v)) => return Ok(Flow::Return(v)),
                Ok(Flow::Break) => return Ok(Flow::Break),
                Ok(Flow::Continue) => return Ok(Flow::Continue),
                Ok(Flow::Normal) => {}
            }
        }
        result
    }

    fn resolve_target(&mut self, target: &Target) -> Result<Location, Traced> {
        match target {
            Target::Name(scoped) => {
                let scope = scoped.scope.unwrap_or(ScopeKind::Local);
                Ok(Location::Name(scope, scoped.name.clone()))
            }
            Target::Attribute(base, field, position) => {
                let base_value = self.eval_target(base)?;
                match base_value {
                    Value::Struct(inst) => Ok(Location::Attribute(inst, field.clone())),
                    other => Err(type_error(
                        format!("cannot assign attribute '{field}' on a {}", other.type_name()),
                        *position,
                    )),
                }
            }
            Target::Subscript(base, index, position) => {
                let base_value = self.eval_target(base)?;
                let index_value = self.eval(index)?;
                match base_value {
                    Value::List(items) => {
                        let idx = expect_index(&index_value, *position)?;
                        Ok(Location::List(items, idx))
                    }
                    Value::Mapping(map) => Ok(Location::Mapping(map, index_value)),
                    other => Err(type_error(
                        format!("cannot subscript-assign a {}", other.type_name()),
                        *position,
                    )),
                }
            }
        }
    }

    fn read_location(&self, location: &Location, position: Position) -> Result<Value, Traced> {
        match location {
            Location::Name(scope, name) => self.context.get(*scope, name),
            Location::Attribute(inst, field) => inst.borrow().fields.get(field).cloned().ok_or_else(|| {
                type_error(format!("struct has no field '{field}'"), position)
            }),
            Location::List(items, idx) => items
                .borrow()
                .get(*idx)
                .cloned()
                .ok_or_else(|| type_error("list index out of range".to_string(), position)),
            Location::Mapping(map, key) => map
                .borrow()
                .get(key)
                .cloned()
                .ok_or_else(|| type_error("key not found in mapping".to_string(), position)),
        }
    }

    fn write_location(&mut self, location: Location, value: Value) -> Result<(), Traced> {
        match location {
            Location::Name(scope, name) => {
                self.context.set(scope, &name, value);
                Ok(())
            }
            Location::Attribute(inst, field) => {
                inst.borrow_mut().fields.insert(field, value);
                Ok(())
            }
            Location::List(items, idx) => {
                let mut items = items.borrow_mut();
                if idx >= items.len() {
                    items.resize(idx + 1, Value::Null);
                }
                items[idx] = value;
                Ok(())
            }
            Location::Mapping(map, key) => {
                map.borrow_mut().insert(key, value);
                Ok(())
            }
        }
    }

    fn assign(&mut self, target: &Target, value: Value, _position: Position) -> Result<(), Traced> {
        let location = self.resolve_target(target)?;
        self.write_location(location, value)
    }

    fn eval_target(&mut self, target: &Target) -> Result<Value, Traced> {
        match target {
            Target::Name(scoped) => match scoped.scope {
                Some(scope) => self.context.get(scope, &scoped.name),
                None => self.context.resolve(&scoped.name).map(|(_, v)| v),
            },
            Target::Attribute(base, field, position) => {
                let base_value = self.eval_target(base)?;
                self.get_attribute(base_value, field, *position)
            }
            Target::Subscript(base, index, position) => {
                let base_value = self.eval_target(base)?;
                let index_value = self.eval(index)?;
                self.subscript(base_value, index_value, *position)
            }
        }
    }

    // --- expressions -------------------------------------------------------

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, Traced> {
        match expr {
            Expr::Literal(lit, _) => Ok(literal_value(lit)),
            Expr::Name(scoped) => match scoped.scope {
                Some(scope) => self.context.get(scope, &scoped.name),
                None => self.context.resolve(&scoped.name).map(|(_, v)| v),
            },
            Expr::List(items, _) => {
                let values = items.iter().map(|e| self.eval(e)).collect::<Result<_, _>>()?;
                Ok(Value::list(values))
            }
            Expr::Tuple(items, _) => {
                let values = items.iter().map(|e| self.eval(e)).collect::<Result<_, _>>()?;
                Ok(Value::tuple(values))
            }
            Expr::Set(items, _) => {
                let mut set = DanaSet::default();
                for item in items {
                    set.insert(self.eval(item)?);
                }
                Ok(Value::Set(Rc::new(std::cell::RefCell::new(set))))
            }
            Expr::Mapping(entries, _) => {
                let mut map = IndexMap::new();
                for (k, v) in entries {
                    let key = self.eval(k)?;
                    let val = self.eval(v)?;
                    map.insert(key, val);
                }
                Ok(Value::mapping(map))
            }
            Expr::Comprehension {
                element,
                clause,
                position,
            } => self.eval_comprehension(element, clause, *position),
            Expr::Lambda { params, body, .. } => {
                let closure = self.context.local_scope();
                let def = Rc::new(FunctionDef {
                    name: "<lambda>".to_string(),
                    receiver: None,
                    params: params.clone(),
                    return_type: None,
                    body: vec![Statement::Return {
                        value: Some((**body).clone()),
                        position: body.position(),
                    }],
                    position: body.position(),
                });
                Ok(Value::Function(Callable::Dana(Rc::new(DanaFunction {
                    def,
                    closure,
                }))))
            }
            Expr::Unary(op, operand, position) => {
                let value = self.eval(operand)?;
                apply_unary(*op, value, *position)
            }
            Expr::Binary(BinOp::And, left, right, _) => {
                let l = self.eval(left)?;
                if !l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(BinOp::Or, left, right, _) => {
                let l = self.eval(left)?;
                if l.is_truthy() {
                    Ok(l)
                } else {
                    self.eval(right)
                }
            }
            Expr::Binary(BinOp::Pipe, left, right, position) => {
                self.eval_pipeline(left, right, *position)
            }
            Expr::Binary(op, left, right, position) => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                apply_binary(*op, l, r, *position)
            }
            Expr::Call { callee, args, position } => self.eval_call(callee, args, *position),
            Expr::Attribute(base, field, position) => {
                let value = self.eval(base)?;
                self.get_attribute(value, field, *position)
            }
            Expr::Subscript(base, index, position) => {
                let base_value = self.eval(base)?;
                let index_value = self.eval(index)?;
                self.subscript(base_value, index_value, *position)
            }
        }
    }

    /// Evaluates an assignment's right-hand side, threading the target's
    /// static type annotation into a bare `reason(...)` call so its output
    /// type can be inferred from the call site (spec section 4.4.3) rather
    /// than from the runtime value `reason` happens to produce.
    fn eval_with_annotation(
        &mut self,
        expr: &Expr,
        annotation: Option<&TypeAnnotation>,
    ) -> Result<Value, Traced> {
        if let Expr::Call { callee, args, position } = expr {
            if let Expr::Name(scoped) = &**callee {
                if scoped.scope.is_none() && scoped.name == "reason" {
                    let (positional, keywords) = self.eval_args(args)?;
                    return reason::call_reason(self, positional, keywords, annotation, *position);
                }
            }
        }
        self.eval(expr)
    }

    /// Looks up (and lazily instantiates) the default `llm` resource
    /// consulted by `reason()` (spec section 4.4.3): "the default LLM
    /// resource obtained by the interpreter from the Execution Context's
    /// `system` scope".
    fn default_llm_resource(&mut self) -> Result<ResourceHandle, Traced> {
        if let Ok(Value::Resource(handle)) = self.context.get(ScopeKind::System, "__default_llm") {
            return Ok(handle);
        }
        let mut config = IndexMap::new();
        if let Some(mock) = &self.config.llm.mock {
            config.insert("mock".to_string(), Value::str(mock.clone()));
        }
        if let Some(provider) = &self.config.llm.provider {
            config.insert("provider".to_string(), Value::str(provider.clone()));
        }
        if let Some(model) = &self.config.llm.model {
            config.insert("model".to_string(), Value::str(model.clone()));
        }
        let handle = self.resources.instantiate("llm.default", &config)?;
        handle.initialize()?;
        self.context
            .set(ScopeKind::System, "__default_llm", Value::Resource(handle.clone()));
        Ok(handle)
    }

    fn eval_comprehension(
        &mut self,
        element: &Expr,
        clause: &ComprehensionClause,
        position: Position,
    ) -> Result<Value, Traced> {
        let iterable = self.eval(&clause.iterable)?;
        let items = self.iterate(iterable, position)?;
        self.context.push_frame();
        let mut result = Vec::new();
        let mut error = None;
        for item in items {
            if let Err(e) = self.assign(&clause.target, item, position) {
                error = Some(e);
                break;
            }
            let keep = match &clause.condition {
                Some(cond) => match self.eval(cond) {
                    Ok(v) => v.is_truthy(),
                    Err(e) => {
                        error = Some(e);
                        break;
                    }
                },
                None => true,
            };
            if keep {
                match self.eval(element) {
                    Ok(v) => result.push(v),
                    Err(e) => {
                        error = Some(e);
                        break;
                    }
                }
            }
        }
        let pop_result = self.context.pop_frame();
        if let Err(e) = pop_result {
            error.get_or_insert(e);
        }
        match error {
            Some(e) => Err(e),
            None => Ok(Value::list(result)),
        }
    }

    /// `f | g`: composition when the left side is itself callable, else
    /// application of `g` to the value `f` (spec section 4.4.2).
    fn eval_pipeline(&mut self, left: &Expr, right: &Expr, position: Position) -> Result<Value, Traced> {
        let left_value = self.eval(left)?;
        let right_value = self.eval(right)?;
        let Value::Function(g) = right_value else {
            return Err(type_error("right-hand side of '|' must be callable".to_string(), position));
        };
        match left_value {
            Value::Function(f) => Ok(Value::Function(Callable::Host(HostCallable::sync(
                move |ctx, args, kwargs| {
                    let intermediate = call_value(ctx, &f, args, IndexMap::new())?;
                    call_value(ctx, &g, vec![intermediate], kwargs)
                },
            )))),
            value => self.call_value(&g, vec![value], IndexMap::new()),
        }
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Arg], position: Position) -> Result<Value, Traced> {
        // Method-call sugar: `obj.m(args)` dispatches on obj's runtime type
        // rather than through the plain registry (spec section 4.4.2).
        if let Expr::Attribute(base, method, _) = callee {
            let receiver = self.eval(base)?;
            let (positional, keywords) = self.eval_args(args)?;
            return self.call_method(receiver, method, positional, keywords, position);
        }

        if let Expr::Name(scoped) = callee {
            if scoped.scope.is_none() && scoped.name == "reason" {
                let (positional, keywords) = self.eval_args(args)?;
                return reason::call_reason(self, positional, keywords, None, position);
            }
            if scoped.scope.is_none() && scoped.name == "use" {
                let (positional, keywords) = self.eval_args(args)?;
                return self.call_use(positional, keywords, position);
            }
        }

        // A bare name may be a Dana-defined function bound into scope, a
        // local variable holding a function value, or a host-registered
        // function that was never bound into any scope (stdlib functions,
        // functions registered via `Interpreter::register_function`) — fall
        // back to the registry when scope resolution fails.
        let callee_value = if let Expr::Name(scoped) = callee {
            match scoped.scope {
                Some(scope) => self.context.get(scope, &scoped.name)?,
                None => match self.context.resolve(&scoped.name) {
                    Ok((_, v)) => v,
                    Err(_) => {
                        let record = self.registry.resolve(&scoped.name).ok_or_else(|| {
                            Traced::new(DanaError::NameNotBound {
                                name: scoped.name.clone(),
                                span: span_at(position),
                            })
                        })?;
                        Value::Function(record.callable)
                    }
                },
            }
        } else {
            self.eval(callee)?
        };
        let (positional, keywords) = self.eval_args(args)?;

        let Value::Function(callable) = callee_value else {
            return Err(type_error(
                format!("'{}' is not callable", callee_value.type_name()),
                position,
            ));
        };
        self.call_value(&callable, positional, keywords)
    }

    fn eval_args(&mut self, args: &[Arg]) -> Result<(Vec<Value>, IndexMap<String, Value>), Traced> {
        let mut positional = Vec::new();
        let mut keywords = IndexMap::new();
        for arg in args {
            let value = self.eval(&arg.value)?;
            match &arg.name {
                Some(name) => {
                    keywords.insert(name.clone(), value);
                }
                None => positional.push(value),
            }
        }
        Ok((positional, keywords))
    }

    fn call_method(
        &mut self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
        position: Position,
    ) -> Result<Value, Traced> {
        match &receiver {
            Value::Resource(handle) => handle.query(method, args),
            Value::Struct(inst) => {
                let type_name = inst.borrow().ty.name.clone();
                let qualified = format!("{type_name}.{method}");
                let record = self.registry.resolve(&qualified).ok_or_else(|| {
                    Traced::new(DanaError::NameNotBound {
                        name: qualified.clone(),
                        span: span_at(position),
                    })
                })?;
                let mut full_args = vec![receiver];
                full_args.extend(args);
                self.dispatch(&record, full_args, kwargs, span_at(position))
            }
            Value::List(_) | Value::Mapping(_) | Value::Str(_) => {
                crate::stdlib::call_builtin_method(&receiver, method, args, position)
            }
            other => Err(type_error(
                format!("'{}' has no method '{method}'", other.type_name()),
                position,
            )),
        }
    }

    /// Per-resource configuration discovered from `config.resources.<kind>.<name>`
    /// (spec section 6.3), the defaults a `use()` call site's own `config`
    /// argument is layered on top of (spec section 4.5.3 step 2: "merged
    /// with discovered configuration").
    fn discovered_resource_config(&self, kind: &str, name: &str) -> ResourceConfig {
        let mut config = IndexMap::new();
        if let Some(serde_json::Value::Object(fields)) =
            self.config.resources.get(kind).and_then(|by_name| by_name.get(name))
        {
            for (key, value) in fields {
                config.insert(key.clone(), json_to_value(value));
            }
        }
        config
    }

    fn call_use(
        &mut self,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
        position: Position,
    ) -> Result<Value, Traced> {
        let identifier = args.first().map(Value::display).ok_or_else(|| {
            Traced::new(DanaError::ArgumentError {
                message: "use() requires an identifier".to_string(),
                span: span_at(position),
            })
        })?;
        let mut site_config = IndexMap::new();
        if let Some(Value::Mapping(m)) = args.get(1) {
            for (k, v) in m.borrow().iter() {
                site_config.insert(k.display(), v.clone());
            }
        }
        for (k, v) in kwargs {
            site_config.insert(k, v);
        }

        if let Some(kb_path) = identifier.strip_prefix("kb.") {
            let mut config = self.discovered_resource_config("knowledge", "kb");
            config.extend(site_config);
            let handle = self.resources.instantiate("knowledge.kb", &config)?;
            // Bare `use()` enters RUNNING immediately and is owned by the
            // current frame for cleanup on scope exit (spec section 4.5.3
            // item 3, 4.5.4 trigger 3), unlike a `with`-bound resource whose
            // lifetime is the `with`-block rather than the frame.
            handle.initialize()?;
            self.context.own_resource(handle.clone());
            return handle.query("get", vec![Value::str(kb_path)]);
        }

        let (kind, name) = identifier.split_once('.').ok_or_else(|| {
            Traced::new(DanaError::ArgumentError {
                message: format!("resource identifier '{identifier}' must be 'kind.name'"),
                span: span_at(position),
            })
        })?;
        let mut config = self.discovered_resource_config(kind, name);
        config.extend(site_config);
        let handle = self.resources.instantiate(&identifier, &config)?;
        handle.initialize()?;
        self.context.own_resource(handle.clone());
        Ok(Value::Resource(handle))
    }

    pub fn call_value(
        &mut self,
        callable: &Callable,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
    ) -> Result<Value, Traced> {
        match callable {
            Callable::Dana(func) => self.call_dana(func, args, kwargs),
            Callable::Host(host) => call_host(&mut self.context, host, args, kwargs),
        }
    }

    fn call_dana(
        &mut self,
        func: &Rc<DanaFunction>,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
    ) -> Result<Value, Traced> {
        let bound = bind_params(&func.def.params, args, kwargs)?;
        let frame = StackFrame {
            function: func.def.name.clone(),
            span: span_at(func.def.position),
        };
        self.context.push_frame();
        // closures read through the declaring scope by reference; anything
        // not locally bound falls through `resolve`'s private/public/system
        // search, so we seed `local` with the closure bindings too.
        let closure_snapshot: Vec<(String, Value)> = func
            .closure
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, value) in closure_snapshot {
            self.context.set(ScopeKind::Local, &name, value);
        }
        for param in &func.def.params {
            let value = match bound.get(&param.name) {
                Some(v) => v.clone(),
                None => match &param.default {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                },
            };
            self.context.set(ScopeKind::Local, &param.name, value);
        }
        let result = self.exec_body("", &func.def.body);
        let pop_result = self.context.pop_frame();
        // Attach this call's frame to any error crossing the function
        // boundary, building the Dana call-stack trace a `Traced` carries
        // (spec section 7 / SPEC_FULL section 7).
        let flow = result.map_err(|e| e.push_frame(frame.clone()))?;
        pop_result.map_err(|e| e.push_frame(frame))?;
        Ok(match flow {
            Flow::Return(v) => v,
            _ => Value::Null,
        })
    }

    fn dispatch(
        &mut self,
        record: &FunctionRecord,
        args: Vec<Value>,
        kwargs: IndexMap<String, Value>,
        _span: SourceSpan,
    ) -> Result<Value, Traced> {
        self.call_value(&record.callable, args, kwargs)
    }

    fn get_attribute(&mut self, value: Value, field: &str, position: Position) -> Result<Value, Traced> {
        match value {
            Value::Struct(inst) => inst
                .borrow()
                .fields
                .get(field)
                .cloned()
                .ok_or_else(|| type_error(format!("struct has no field '{field}'"), position)),
            Value::Resource(handle) => Ok(Value::str(format!("{}:{}", handle.kind(), field))),
            other => Err(type_error(
                format!("'{}' has no attribute '{field}'", other.type_name()),
                position,
            )),
        }
    }

    fn subscript(&mut self, base: Value, index: Value, position: Position) -> Result<Value, Traced> {
        match base {
            Value::List(items) => {
                let idx = expect_index(&index, position)?;
                items
                    .borrow()
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| type_error("list index out of range".to_string(), position))
            }
            Value::Tuple(tuple) => {
                let idx = expect_index(&index, position)?;
                tuple
                    .0
                    .get(idx)
                    .cloned()
                    .ok_or_else(|| type_error("tuple index out of range".to_string(), position))
            }
            Value::Mapping(map) => map
                .borrow()
                .get(&index)
                .cloned()
                .ok_or_else(|| type_error("mapping key not found".to_string(), position)),
            Value::Str(s) => {
                let idx = expect_index(&index, position)?;
                s.chars()
                    .nth(idx)
                    .map(|c| Value::str(c.to_string()))
                    .ok_or_else(|| type_error("string index out of range".to_string(), position))
            }
            other => Err(type_error(
                format!("'{}' is not subscriptable", other.type_name()),
                position,
            )),
        }
    }

    fn iterate(&mut self, value: Value, position: Position) -> Result<Vec<Value>, Traced> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(tuple) => Ok(tuple.0.clone()),
            Value::Set(set) => Ok(set.borrow().0.clone()),
            Value::Mapping(map) => Ok(map.borrow().keys().cloned().collect()),
            Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
            other => Err(type_error(
                format!("'{}' is not iterable", other.type_name()),
                position,
            )),
        }
    }
}

/// Free function so pipeline-composed closures (which only capture a
/// `Callable`, not the whole `Interpreter`) can still dispatch host calls.
fn call_value(
    ctx: &mut ExecutionContext,
    callable: &Callable,
    args: Vec<Value>,
    kwargs: IndexMap<String, Value>,
) -> Result<Value, Traced> {
    match callable {
        Callable::Host(host) => call_host(ctx, host, args, kwargs),
        Callable::Dana(_) => Err(Traced::new(DanaError::InternalError {
            message: "pipeline composition of a Dana-defined function requires an interpreter; compose host functions instead".to_string(),
        })),
    }
}

fn call_host(
    ctx: &mut ExecutionContext,
    host: &HostCallable,
    args: Vec<Value>,
    kwargs: IndexMap<String, Value>,
) -> Result<Value, Traced> {
    match host {
        HostCallable::Sync(f) => f(ctx, args, kwargs),
        HostCallable::Async(f) => crate::asyncio::block_on_host_call(f(args, kwargs)),
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(n) => Value::Int(*n),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::str(s.clone()),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

fn type_error(message: String, position: Position) -> Traced {
    Traced::new(DanaError::TypeError {
        message,
        span: span_at(position),
    })
}

fn expect_index(value: &Value, position: Position) -> Result<usize, Traced> {
    match value {
        Value::Int(n) if *n >= 0 => Ok(*n as usize),
        other => Err(type_error(
            format!("expected a non-negative int index, found {}", other.type_name()),
            position,
        )),
    }
}

fn apply_unary(op: UnaryOp, value: Value, position: Position) -> Result<Value, Traced> {
    match (op, value) {
        (UnaryOp::Not, v) => Ok(Value::Bool(!v.is_truthy())),
        (UnaryOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Neg, other) => Err(type_error(
            format!("cannot negate a {}", other.type_name()),
            position,
        )),
    }
}

fn apply_binary(op: BinOp, left: Value, right: Value, position: Position) -> Result<Value, Traced> {
    use Value::*;
    match op {
        BinOp::Add => match (left, right) {
            (Int(a), Int(b)) => Ok(Int(a + b)),
            (Float(a), Float(b)) => Ok(Float(a + b)),
            (Int(a), Float(b)) => Ok(Float(a as f64 + b)),
            (Float(a), Int(b)) => Ok(Float(a + b as f64)),
            (Str(a), Str(b)) => Ok(Value::str(format!("{a}{b}"))),
            (List(a), List(b)) => {
                let mut items = a.borrow().clone();
                items.extend(b.borrow().iter().cloned());
                Ok(Value::list(items))
            }
            (a, b) => Err(type_error(
                format!("cannot add {} and {}", a.type_name(), b.type_name()),
                position,
            )),
        },
        BinOp::Sub => numeric(left, right, position, |a, b| a - b, |a, b| a - b),
        BinOp::Mul => numeric(left, right, position, |a, b| a * b, |a, b| a * b),
        BinOp::Div => match (left, right) {
            (Int(_), Int(0)) => Err(division_by_zero(position)),
            (Int(a), Int(b)) => Ok(Float(a as f64 / b as f64)),
            (a, b) => numeric(a, b, position, |_, _| unreachable!(), |a, b| a / b),
        },
        BinOp::Mod => match (left, right) {
            (Int(_), Int(0)) => Err(division_by_zero(position)),
            (Int(a), Int(b)) => Ok(Int(a % b)),
            (a, b) => numeric(a, b, position, |_, _| unreachable!(), |a, b| a % b),
        },
        BinOp::Pow => numeric(
            left,
            right,
            position,
            |a, b| a.pow(b.max(0) as u32),
            |a, b| a.powf(b),
        ),
        BinOp::Lt => comparison(left, right, position, Ordering::is_lt),
        BinOp::LtEq => comparison(left, right, position, Ordering::is_le),
        BinOp::Gt => comparison(left, right, position, Ordering::is_gt),
        BinOp::GtEq => comparison(left, right, position, Ordering::is_ge),
        BinOp::Eq => Ok(Bool(left == right)),
        BinOp::NotEq => Ok(Bool(left != right)),
        BinOp::In => membership(left, right, position),
        BinOp::NotIn => membership(left, right, position).map(|v| Bool(!v.is_truthy())),
        BinOp::And | BinOp::Or | BinOp::Pipe => unreachable!("short-circuit ops handled in eval"),
    }
}

use std::cmp::Ordering;

fn numeric(
    left: Value,
    right: Value,
    position: Position,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, Traced> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(a, b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(a, b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(a as f64, b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(a, b as f64))),
        (a, b) => Err(type_error(
            format!("cannot apply arithmetic to {} and {}", a.type_name(), b.type_name()),
            position,
        )),
    }
}

fn comparison(
    left: Value,
    right: Value,
    position: Position,
    check: impl Fn(Ordering) -> bool,
) -> Result<Value, Traced> {
    left.partial_cmp(&right)
        .map(|ord| Value::Bool(check(ord)))
        .ok_or_else(|| {
            type_error(
                format!("cannot compare {} and {}", left.type_name(), right.type_name()),
                position,
            )
        })
}

fn membership(needle: Value, haystack: Value, position: Position) -> Result<Value, Traced> {
    match haystack {
        Value::List(items) => Ok(Value::Bool(items.borrow().iter().any(|v| *v == needle))),
        Value::Tuple(t) => Ok(Value::Bool(t.0.iter().any(|v| *v == needle))),
        Value::Set(s) => Ok(Value::Bool(s.borrow().contains(&needle))),
        Value::Mapping(m) => Ok(Value::Bool(m.borrow().contains_key(&needle))),
        Value::Str(s) => match needle {
            Value::Str(n) => Ok(Value::Bool(s.contains(n.as_str()))),
            other => Err(type_error(
                format!("cannot test membership of a {} in a string", other.type_name()),
                position,
            )),
        },
        other => Err(type_error(
            format!("cannot test membership in a {}", other.type_name()),
            position,
        )),
    }
}

fn division_by_zero(position: Position) -> Traced {
    type_error("division by zero".to_string(), position)
}

fn apply_compound_op(op: CompoundOp, current: Value, rhs: Value, position: Position) -> Result<Value, Traced> {
    match op {
        CompoundOp::Add => apply_binary(BinOp::Add, current, rhs, position),
        CompoundOp::Sub => apply_binary(BinOp::Sub, current, rhs, position),
        CompoundOp::Mul => apply_binary(BinOp::Mul, current, rhs, position),
        CompoundOp::Div => apply_binary(BinOp::Div, current, rhs, position),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Value {
        let mut interp = Interpreter::new(crate::config::Config::default());
        interp.run(src).unwrap()
    }

    #[test]
    fn arithmetic_and_scopes() {
        let v = run("x = 1\ny = x + 2\ny\n");
        assert_eq!(v, Value::Int(3));
    }

    #[test]
    fn compound_assignment_on_list_element() {
        let v = run("a = [1, 2, 3]\na[1] += 10\na[1]\n");
        assert_eq!(v, Value::Int(12));
    }

    #[test]
    fn not_in_operator() {
        let v = run("a = [1, 2, 3]\n4 not in a\n");
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn short_circuit_or_returns_operand() {
        let v = run("x = 0 or 5\nx\n");
        assert_eq!(v, Value::Int(5));
    }

    #[test]
    fn while_loop_break() {
        let v = run("i = 0\nwhile true:\n    i += 1\n    if i == 3:\n        break\ni\n");
        assert_eq!(v, Value::Int(3));
    }
}
