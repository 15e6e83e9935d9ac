//! End-to-end scenarios from spec.md section 8.4, run through the public
//! embedding API.

use dana::registry::HostCallable;
use dana::resource::{ResourceConfig, ResourceKind};
use dana::{Config, Interpreter, Value};
use indexmap::IndexMap;

#[test]
fn scenario_a_arithmetic_and_scopes() {
    let mut interp = Interpreter::new(Config::default());
    interp
        .run(
            "x = 10\n\
             public:y = x + 5\n\
             def add(a: int, b: int) -> int:\n\
             \x20   return a + b\n\
             z = add(x, public:y)\n",
        )
        .unwrap();
    assert_eq!(interp.context.get(dana::ast::ScopeKind::Local, "x").unwrap(), Value::Int(10));
    assert_eq!(
        interp.context.get(dana::ast::ScopeKind::Public, "y").unwrap(),
        Value::Int(15)
    );
    assert_eq!(interp.context.get(dana::ast::ScopeKind::Local, "z").unwrap(), Value::Int(25));
    assert!(interp.context.get(dana::ast::ScopeKind::Local, "a").is_err());
}

#[test]
fn scenario_b_compound_assignment_and_lists() {
    let mut interp = Interpreter::new(Config::default());
    let result = interp
        .run("arr = [1, 2, 3]\narr[0] += 10\narr += [4]\narr\n")
        .unwrap();
    assert_eq!(
        result,
        Value::list(vec![Value::Int(11), Value::Int(2), Value::Int(3), Value::Int(4)])
    );
}

#[test]
fn scenario_c_not_in_operator() {
    let mut interp = Interpreter::new(Config::default());
    let result = interp
        .run(
            "allowed = [\"admin\", \"moderator\"]\n\
             role = \"user\"\n\
             banned = role not in allowed\n\
             banned\n",
        )
        .unwrap();
    assert_eq!(result, Value::Bool(true));
}

struct RecordingResource {
    cleaned_up: std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>,
    label: &'static str,
}

impl ResourceKind for RecordingResource {
    fn kind_name(&self) -> &'static str {
        "mcp"
    }

    fn stop(&mut self) -> Result<(), dana::error::Traced> {
        self.cleaned_up.borrow_mut().push(self.label);
        Ok(())
    }

    fn query(&mut self, _operation: &str, _args: Vec<Value>) -> Result<Value, dana::error::Traced> {
        Ok(Value::str("ok"))
    }
}

#[test]
fn scenario_d_resource_cleanup_runs_before_exception_propagates() {
    let cleaned_up = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut interp = Interpreter::new(Config::default());

    let recorded = cleaned_up.clone();
    interp.register_resource_kind(
        "mcp",
        std::rc::Rc::new(move |name, _cfg: &ResourceConfig| {
            let label: &'static str = if name == "database" { "database" } else { "other" };
            Box::new(RecordingResource {
                cleaned_up: recorded.clone(),
                label,
            }) as Box<dyn ResourceKind>
        }),
    );

    interp
        .register_function(
            "raise_something",
            HostCallable::sync(|_ctx, _args, _kwargs| {
                Err(dana::error::Traced::new(dana::DanaError::TypeError {
                    message: "boom".to_string(),
                    span: dana::error::SourceSpan::unknown(),
                }))
            }),
            None,
            false,
        )
        .unwrap();

    let result = interp.run(
        "with db = use(\"mcp.database\"):\n\
         \x20   rows = db.query(\"SELECT 1\")\n\
         \x20   raise_something()\n",
    );
    assert!(result.is_err());
    assert_eq!(*cleaned_up.borrow(), vec!["database"]);
}

#[test]
fn scenario_e_reason_infers_type_from_annotation() {
    let mut config = Config::default();
    config.llm.mock = Some("42".to_string());
    let mut interp = Interpreter::new(config);

    let result = interp
        .run(
            "x: int = reason(\"What is the answer?\")\n\
             y = reason(\"What is the answer?\")\n\
             [x, y]\n",
        )
        .unwrap();
    assert_eq!(result, Value::list(vec![Value::Int(42), Value::str("42")]));
}

#[test]
fn scenario_f_async_host_function_is_awaited_transparently() {
    let mut interp = Interpreter::new(Config::default());
    interp
        .register_function(
            "fetch",
            HostCallable::Async(std::rc::Rc::new(|args, _kwargs| {
                let url = args.first().map(Value::display).unwrap_or_default();
                Box::pin(async move {
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                    Ok(Value::str(format!("body of {url}")))
                })
            })),
            None,
            false,
        )
        .unwrap();

    let result = interp
        .run("body = fetch(\"https://example.com\")\nlength = len(body)\nlength\n")
        .unwrap();
    assert_eq!(result, Value::Int("body of https://example.com".len() as i64));
}

#[test]
fn registry_uniqueness_rejects_duplicate_registration_without_overwrite() {
    let mut interp = Interpreter::new(Config::default());
    let noop = || HostCallable::sync(|_ctx, _args, _kwargs: IndexMap<String, Value>| Ok(Value::Null));
    interp.register_function("greet", noop(), None, false).unwrap();
    let err = interp.register_function("greet", noop(), None, false);
    assert!(err.is_err());
}
