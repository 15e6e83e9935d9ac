//! The small Python-flavored standard library available in every Dana
//! program without an explicit `import`: free functions plus the built-in
//! methods on lists, mappings and strings (`SPEC_FULL.md` section 3.x).
//!
//! Registered as ordinary host-defined functions at [`Interpreter::new`]
//! time — there is no special-cased builtin dispatch path, matching spec
//! section 4.3's "unifies Dana and host-language callables".

use indexmap::IndexMap;

use crate::error::{DanaError, SourceSpan, Traced};
use crate::interpreter::Interpreter;
use crate::lexer::Position;
use crate::registry::HostCallable;
use crate::value::Value;

pub fn install(interp: &mut Interpreter) {
    register(interp, "len", |_ctx, args, _kwargs| {
        let value = first_arg(&args, "len")?;
        let n = match value {
            Value::Str(s) => s.chars().count(),
            Value::List(items) => items.borrow().len(),
            Value::Tuple(t) => t.0.len(),
            Value::Set(s) => s.borrow().0.len(),
            Value::Mapping(m) => m.borrow().len(),
            other => return Err(argument_error(format!("len() is not defined for {}", other.type_name()))),
        };
        Ok(Value::Int(n as i64))
    });

    register(interp, "print", |_ctx, args, _kwargs| {
        let rendered: Vec<String> = args.iter().map(Value::display).collect();
        println!("{}", rendered.join(" "));
        Ok(Value::Null)
    });

    register(interp, "range", |_ctx, args, _kwargs| {
        let (start, stop) = match args.as_slice() {
            [Value::Int(stop)] => (0, *stop),
            [Value::Int(start), Value::Int(stop)] => (*start, *stop),
            _ => return Err(argument_error("range() expects 1 or 2 int arguments".to_string())),
        };
        Ok(Value::list((start..stop).map(Value::Int).collect()))
    });

    register(interp, "str", |_ctx, args, _kwargs| {
        Ok(Value::str(first_arg(&args, "str")?.display()))
    });

    register(interp, "int", |_ctx, args, _kwargs| match first_arg(&args, "int")? {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => Ok(Value::Int(*f as i64)),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| argument_error(format!("cannot convert '{s}' to int"))),
        other => Err(argument_error(format!("cannot convert {} to int", other.type_name()))),
    });

    register(interp, "float", |_ctx, args, _kwargs| match first_arg(&args, "float")? {
        Value::Int(n) => Ok(Value::Float(*n as f64)),
        Value::Float(f) => Ok(Value::Float(*f)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| argument_error(format!("cannot convert '{s}' to float"))),
        other => Err(argument_error(format!("cannot convert {} to float", other.type_name()))),
    });

    register(interp, "bool", |_ctx, args, _kwargs| {
        Ok(Value::Bool(first_arg(&args, "bool")?.is_truthy()))
    });

    register(interp, "type", |_ctx, args, _kwargs| {
        Ok(Value::str(first_arg(&args, "type")?.type_name()))
    });
}

fn register(interp: &mut Interpreter, name: &str, f: impl Fn(&mut crate::context::ExecutionContext, Vec<Value>, IndexMap<String, Value>) -> Result<Value, Traced> + 'static) {
    interp
        .register_function(name, HostCallable::sync(f), None, false)
        .expect("stdlib names never collide with each other at install time");
}

fn first_arg<'a>(args: &'a [Value], fn_name: &str) -> Result<&'a Value, Traced> {
    args.first().ok_or_else(|| argument_error(format!("{fn_name}() requires an argument")))
}

fn argument_error(message: String) -> Traced {
    Traced::new(DanaError::ArgumentError {
        message,
        span: SourceSpan::unknown(),
    })
}

/// Built-in methods on lists, mappings and strings (`a.append(x)`,
/// `m.keys()`, ...), dispatched from [`crate::interpreter::Interpreter`]'s
/// method-call sugar rather than through the function registry, since they
/// are attached to a value's runtime type rather than a struct's static
/// type.
pub fn call_builtin_method(
    receiver: &Value,
    method: &str,
    mut args: Vec<Value>,
    position: Position,
) -> Result<Value, Traced> {
    let span = SourceSpan::new("<module>", position.line, position.col);
    match (receiver, method) {
        (Value::List(items), "append") => {
            let value = args.pop().ok_or_else(|| {
                Traced::new(DanaError::ArgumentError {
                    message: "append() requires a value".to_string(),
                    span: span.clone(),
                })
            })?;
            items.borrow_mut().push(value);
            Ok(Value::Null)
        }
        (Value::Mapping(map), "keys") => Ok(Value::list(map.borrow().keys().cloned().collect())),
        (Value::Mapping(map), "values") => Ok(Value::list(map.borrow().values().cloned().collect())),
        (Value::Mapping(map), "items") => Ok(Value::list(
            map.borrow()
                .iter()
                .map(|(k, v)| Value::tuple(vec![k.clone(), v.clone()]))
                .collect(),
        )),
        (Value::Mapping(map), "get") => {
            let key = args.first().ok_or_else(|| {
                Traced::new(DanaError::ArgumentError {
                    message: "get() requires a key".to_string(),
                    span: span.clone(),
                })
            })?;
            Ok(map
                .borrow()
                .get(key)
                .cloned()
                .or_else(|| args.get(1).cloned())
                .unwrap_or(Value::Null))
        }
        (other, method) => Err(Traced::new(DanaError::TypeError {
            message: format!("'{}' has no method '{method}'", other.type_name()),
            span,
        })),
    }
}
