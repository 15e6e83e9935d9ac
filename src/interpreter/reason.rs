//! `reason()`: the LLM-backed primitive whose return type is inferred from
//! the static type annotation at the call site (spec section 4.4.3).

use indexmap::IndexMap;

use crate::ast::TypeAnnotation;
use crate::config::json_to_value;
use crate::error::{DanaError, SourceSpan, Traced};
use crate::interpreter::Interpreter;
use crate::lexer::Position;
use crate::resource::ResourceHandle;
use crate::value::{StructInstance, Value};

struct Options {
    temperature: Option<f64>,
    model: Option<String>,
    max_tokens: Option<i64>,
    retries: u32,
    schema: Option<Value>,
    timeout_ms: Option<u64>,
}

fn parse_options(value: Option<&Value>) -> Options {
    let Some(Value::Mapping(map)) = value else {
        return Options {
            temperature: None,
            model: None,
            max_tokens: None,
            retries: 0,
            schema: None,
            timeout_ms: None,
        };
    };
    let map = map.borrow();
    let get = |key: &str| map.iter().find(|(k, _)| k.display() == key).map(|(_, v)| v.clone());
    Options {
        temperature: get("temperature").and_then(|v| match v {
            Value::Float(f) => Some(f),
            Value::Int(n) => Some(n as f64),
            _ => None,
        }),
        model: get("model").map(|v| v.display()),
        max_tokens: get("max_tokens").and_then(|v| match v {
            Value::Int(n) => Some(n),
            _ => None,
        }),
        retries: get("retries")
            .and_then(|v| match v {
                Value::Int(n) if n > 0 => Some(n as u32),
                _ => None,
            })
            .unwrap_or(0),
        schema: get("schema"),
        // not in spec.md's table of recognized `reason()` options, but
        // needed to give the `Timeout` error (spec section 7) and the
        // "Cancellation" paragraph (spec section 5) a concrete deadline
        // source; bounds the LLM resource's `generate` call the same way
        // `with_timeout` bounds an awaited host future.
        timeout_ms: get("timeout_ms").and_then(|v| match v {
            Value::Int(n) if n > 0 => Some(n as u64),
            _ => None,
        }),
    }
}

fn options_to_value(options: &Options) -> Value {
    let mut map = IndexMap::new();
    if let Some(t) = options.temperature {
        map.insert(Value::str("temperature"), Value::Float(t));
    }
    if let Some(m) = &options.model {
        map.insert(Value::str("model"), Value::str(m.clone()));
    }
    if let Some(t) = options.max_tokens {
        map.insert(Value::str("max_tokens"), Value::Int(t));
    }
    Value::mapping(map)
}

/// Issues the `generate` query, bounding it with `options.timeout_ms` when
/// present. A plain synchronous backend that never yields can't actually be
/// preempted mid-call (the same `!Send` constraint that keeps `system:`
/// storage off a real `Mutex`, see context.rs), but a backend built on an
/// async client naturally cooperates with the deadline at its own `.await`
/// points, the same way `with_timeout` bounds an awaited host future.
fn query_generate(handle: &ResourceHandle, prompt: &str, options: &Options) -> Result<Value, Traced> {
    let args = vec![Value::str(prompt.to_string()), options_to_value(options)];
    match options.timeout_ms {
        None => handle.query("generate", args),
        Some(millis) => crate::asyncio::block_on_host_call(async {
            crate::asyncio::with_timeout(millis, async { handle.query("generate", args) })
                .await
                .and_then(|inner| inner)
        }),
    }
}

pub fn call_reason(
    interp: &mut Interpreter,
    positional: Vec<Value>,
    keywords: IndexMap<String, Value>,
    annotation: Option<&TypeAnnotation>,
    position: Position,
) -> Result<Value, Traced> {
    let span = SourceSpan::new("<module>", position.line, position.col);
    let prompt = positional
        .first()
        .cloned()
        .or_else(|| keywords.get("prompt").cloned())
        .map(|v| v.display())
        .ok_or_else(|| {
            Traced::new(DanaError::ArgumentError {
                message: "reason() requires a prompt argument".to_string(),
                span: span.clone(),
            })
        })?;
    let options_value = positional
        .get(2)
        .cloned()
        .or_else(|| keywords.get("options").cloned());
    let options = parse_options(options_value.as_ref());

    let handle = interp.default_llm_resource()?;

    // Both an unavailable backend and a coercion failure are retried up to
    // `options.retries` times (spec section 7's LLMUnavailable /
    // TypeCoercionError entries are both marked "retried per
    // options.retries").
    let mut attempts = 0;
    loop {
        let query_result = query_generate(&handle, &prompt, &options);
        let raw = match query_result {
            Ok(v) => v,
            Err(e) if attempts < options.retries && e.error.kind() == "LLMUnavailable" => {
                attempts += 1;
                continue;
            }
            Err(e) => return Err(e),
        };
        let Value::Str(raw) = raw else {
            return Err(Traced::new(DanaError::TypeCoercionError {
                message: "llm backend returned a non-string value".to_string(),
            }));
        };
        match coerce(&raw, annotation, options.schema.as_ref()) {
            Ok(value) => return Ok(value),
            Err(_) if attempts < options.retries => {
                attempts += 1;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Coerces the backend's raw string output into the type named by the
/// assignment target's static annotation (spec section 4.4.3's table).
/// A `schema` option, when present, overrides the inferred shape for
/// struct/list targets.
fn coerce(raw: &str, annotation: Option<&TypeAnnotation>, schema: Option<&Value>) -> Result<Value, Traced> {
    let trimmed = raw.trim();
    match annotation {
        None => Ok(Value::str(raw.to_string())),
        Some(TypeAnnotation::Named(name)) => match name.as_str() {
            "str" | "string" => Ok(Value::str(raw.to_string())),
            "int" => trimmed.parse::<i64>().map(Value::Int).map_err(|_| coercion_error(raw, "int")),
            "float" => trimmed.parse::<f64>().map(Value::Float).map_err(|_| coercion_error(raw, "float")),
            "bool" => coerce_bool(trimmed).ok_or_else(|| coercion_error(raw, "bool")),
            other => coerce_struct(trimmed, other, schema),
        },
        Some(TypeAnnotation::Generic(name, type_args)) if name == "list" => {
            let element_type = type_args.first();
            let items: Vec<serde_json::Value> =
                serde_json::from_str(trimmed).map_err(|_| coercion_error(raw, "list"))?;
            let values = items
                .into_iter()
                .map(|item| coerce(&item.to_string(), element_type, None))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(values))
        }
        Some(TypeAnnotation::Generic(name, _)) => coerce_struct(trimmed, name, schema),
    }
}

fn coerce_bool(trimmed: &str) -> Option<Value> {
    match trimmed.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(Value::Bool(true)),
        "false" | "no" | "0" => Some(Value::Bool(false)),
        _ => None,
    }
}

fn coerce_struct(trimmed: &str, type_name: &str, _schema: Option<&Value>) -> Result<Value, Traced> {
    let parsed: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(trimmed).map_err(|_| coercion_error(trimmed, type_name))?;
    let mut fields = indexmap::IndexMap::new();
    for (key, value) in parsed {
        fields.insert(key, json_to_value(&value));
    }
    let ty = std::rc::Rc::new(crate::value::StructType {
        name: type_name.to_string(),
        fields: fields.keys().map(|k| (k.clone(), None)).collect(),
    });
    Ok(Value::Struct(std::rc::Rc::new(std::cell::RefCell::new(StructInstance {
        ty,
        fields,
    }))))
}

fn coercion_error(raw: &str, target: &str) -> Traced {
    Traced::new(DanaError::TypeCoercionError {
        message: format!("could not coerce reason() output '{raw}' to {target}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_bare_output_to_string() {
        let v = coerce("hello", None, None).unwrap();
        assert_eq!(v, Value::str("hello"));
    }

    #[test]
    fn coerces_int_annotation() {
        let v = coerce("42", Some(&TypeAnnotation::Named("int".to_string())), None).unwrap();
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn coerces_yes_no_bool() {
        let v = coerce("yes", Some(&TypeAnnotation::Named("bool".to_string())), None).unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn rejects_non_numeric_int_coercion() {
        let err = coerce("not a number", Some(&TypeAnnotation::Named("int".to_string())), None);
        assert!(err.is_err());
    }
}
