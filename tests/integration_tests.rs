//! End-to-end tests running queries through a miniature execution engine
//! and formatting the resulting errors.
//!
//! The engine understands documents of the form `{ field other_field }`. It
//! reports unknown fields as validation errors, and resolver faults as
//! errors carrying an [`Exception`] whose traceback holds the resolver frame
//! and the executor frame that called it.

use std::{collections::BTreeMap, fmt, thread};

use faultfmt::{
    ExecutionError, ExecutionResult, FormattedError, format_error, format_errors,
    get_error_extension, get_formatted_context,
    exception::Exception,
    repr::{Repr, ReprError, safe_debug, safe_repr},
    traceback::{TraceFrame, Traceback},
};
use serde_json::{Value, json};

#[derive(Debug)]
struct KeyError(&'static str);

impl fmt::Display for KeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl std::error::Error for KeyError {}

/// A value whose rendering always fails.
struct FailingRepr;

impl Repr for FailingRepr {
    fn repr(&self) -> Result<String, ReprError> {
        Err(KeyError("test"))?
    }
}

#[derive(Debug)]
struct UndefinedName(&'static str);

impl fmt::Display for UndefinedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "name '{}' is not defined", self.0)
    }
}

impl std::error::Error for UndefinedName {}

enum Fault {
    /// A fault raised by resolver code.
    Raised(Exception),
    /// An error the resolver reports directly, with no fault behind it.
    Reported(String),
}

type Resolver = fn(&QueryType) -> Result<Value, Fault>;

#[derive(Clone, Debug)]
struct QueryType {
    name: &'static str,
    fields: Vec<(&'static str, Resolver)>,
}

impl QueryType {
    fn new() -> Self {
        Self {
            name: "Query",
            fields: Vec::new(),
        }
    }

    fn field(mut self, name: &'static str, resolver: Resolver) -> Self {
        self.fields.push((name, resolver));
        self
    }
}

fn resolve_hello(query: &QueryType) -> Result<Value, Fault> {
    let test_int = 123;
    let test_str = "test";
    let test_dict = BTreeMap::from([("test", "dict")]);
    let test_obj = query.clone();
    let test_failing_repr = FailingRepr;

    let frame = TraceFrame::new("resolve_hello")
        .at(file!(), line!())
        .local("test_int", test_int)
        .local("test_str", test_str)
        .local("test_dict", test_dict)
        .local("test_obj", test_obj)
        .local_repr("test_failing_repr", test_failing_repr);
    let exception = Exception::from(UndefinedName("test_undefined"))
        .with_traceback(Traceback::from_frames([frame]));
    Err(Fault::Raised(exception))
}

fn resolve_error(_query: &QueryType) -> Result<Value, Fault> {
    Err(Fault::Reported("Resolver error".into()))
}

fn resolve_status(_query: &QueryType) -> Result<Value, Fault> {
    Ok(json!("ok"))
}

fn schema() -> QueryType {
    QueryType::new()
        .field("hello", resolve_hello)
        .field("error", resolve_error)
        .field("status", resolve_status)
}

fn execute(query: &QueryType, document: &str) -> ExecutionResult {
    let mut data = serde_json::Map::new();
    let mut errors = Vec::new();

    for (offset, name) in field_names(document) {
        let column = u32::try_from(offset + 1).expect("test documents are short");
        let Some((_, resolver)) = query.fields.iter().find(|(field, _)| *field == name) else {
            errors.push(
                ExecutionError::new(format!(
                    "Cannot query field '{name}' on type '{}'.",
                    query.name
                ))
                .with_location(1, column),
            );
            continue;
        };

        match resolver(query) {
            Ok(value) => {
                data.insert(name.to_owned(), value);
            }
            Err(Fault::Raised(mut exception)) => {
                exception.traceback_mut().push_outer(
                    TraceFrame::new("execute_field")
                        .at(file!(), line!())
                        .local("field_name", name.to_owned()),
                );
                errors.push(
                    ExecutionError::from_exception(exception)
                        .with_location(1, column)
                        .with_path([name]),
                );
                data.insert(name.to_owned(), Value::Null);
            }
            Err(Fault::Reported(message)) => {
                errors.push(
                    ExecutionError::new(message)
                        .with_location(1, column)
                        .with_path([name]),
                );
                data.insert(name.to_owned(), Value::Null);
            }
        }
    }

    if errors.is_empty() {
        ExecutionResult::ok(Value::Object(data))
    } else {
        ExecutionResult::with_errors(Some(Value::Object(data)), errors)
    }
}

/// Field names in the document with their byte offsets.
fn field_names(document: &str) -> Vec<(usize, &str)> {
    let mut names = Vec::new();
    let mut start = None;
    for (index, c) in document.char_indices() {
        let is_name = c.is_ascii_alphanumeric() || c == '_';
        match (is_name, start) {
            (true, None) => start = Some(index),
            (false, Some(begin)) => {
                names.push((begin, &document[begin..index]));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(begin) = start {
        names.push((begin, &document[begin..]));
    }
    names
}

fn exception_of(error: &FormattedError) -> &faultfmt::ExceptionExtension {
    error
        .extensions
        .as_ref()
        .expect("debug output has extensions")
        .exception
        .as_ref()
        .expect("resolver fault has an exception")
}

#[test]
fn test_default_formatter_extracts_errors_from_result() {
    let result = execute(&schema(), "{ hello }");
    let errors = format_errors(&result, format_error, false);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message, "name 'test_undefined' is not defined");
    assert_eq!(
        serde_json::to_value(&errors[0]).unwrap(),
        json!({
            "message": "name 'test_undefined' is not defined",
            "locations": [{ "line": 1, "column": 3 }],
            "path": ["hello"]
        })
    );
}

#[test]
fn test_default_formatter_is_not_extending_error_by_default() {
    let result = execute(&schema(), "{ hello }");
    let error = &format_errors(&result, format_error, false)[0];
    assert!(error.extensions.is_none());
}

#[test]
fn test_default_formatter_extends_error_with_stacktrace() {
    let result = execute(&schema(), "{ hello }");
    let error = &format_errors(&result, format_error, true)[0];
    let stacktrace = &exception_of(error).stacktrace;

    assert_eq!(stacktrace.len(), 3);
    assert!(stacktrace[0].starts_with("execute_field - "));
    assert!(stacktrace[1].starts_with("resolve_hello - "));
    assert!(stacktrace[2].ends_with("UndefinedName: name 'test_undefined' is not defined"));
}

#[test]
fn test_default_formatter_extends_error_with_context() {
    let result = execute(&schema(), "{ hello }");
    let error = &format_errors(&result, format_error, true)[0];
    let context = exception_of(error).context.as_ref().unwrap();
    assert!(!context.is_empty());
}

#[test]
fn test_default_formatter_fills_context_with_safe_reprs_of_resolver_locals() {
    let query = schema();
    let result = execute(&query, "{ hello }");
    let error = &format_errors(&result, format_error, true)[0];
    let context = exception_of(error).context.as_ref().unwrap();

    let names: Vec<_> = context.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        ["test_int", "test_str", "test_dict", "test_obj", "test_failing_repr"]
    );
    assert_eq!(context["test_int"], safe_debug(&123));
    assert_eq!(context["test_str"], safe_debug("test"));
    assert_eq!(
        context["test_dict"],
        safe_debug(&BTreeMap::from([("test", "dict")]))
    );
    assert_eq!(context["test_obj"], safe_debug(&query));
    assert_eq!(context["test_failing_repr"], safe_repr(&FailingRepr));
    assert!(context["test_failing_repr"].contains("KeyError"));
}

#[test]
fn test_default_formatter_is_not_extending_plain_error() {
    let result = execute(&schema(), "{ error }");
    let error = &format_errors(&result, format_error, true)[0];
    assert_eq!(error.message, "Resolver error");
    assert!(error.extensions.as_ref().unwrap().exception.is_none());
    assert_eq!(
        serde_json::to_value(error).unwrap()["extensions"],
        json!({ "exception": null })
    );
}

#[test]
fn test_validation_errors_have_no_path() {
    let result = execute(&schema(), "{ missing }");
    let error = &format_errors(&result, format_error, true)[0];
    assert_eq!(error.message, "Cannot query field 'missing' on type 'Query'.");
    assert!(error.path.is_none());
    assert!(error.extensions.as_ref().unwrap().exception.is_none());
}

#[test]
fn test_results_without_errors_format_to_nothing() {
    let result = execute(&schema(), "{ status }");
    assert!(result.errors.is_none());
    assert!(format_errors(&result, format_error, false).is_empty());
    assert!(format_errors(&result, format_error, true).is_empty());
}

#[test]
fn test_errors_keep_their_order() {
    let result = execute(&schema(), "{ error status hello missing }");
    let errors = format_errors(&result, format_error, true);
    let messages: Vec<_> = errors.iter().map(|error| error.message.as_str()).collect();
    assert_eq!(
        messages,
        [
            "Resolver error",
            "name 'test_undefined' is not defined",
            "Cannot query field 'missing' on type 'Query'.",
        ]
    );
    assert!(errors[0].extensions.as_ref().unwrap().exception.is_none());
    assert!(errors[1].extensions.as_ref().unwrap().exception.is_some());

    assert!(
        format_errors(&result, format_error, false)
            .iter()
            .all(|error| error.extensions.is_none())
    );
}

#[test]
fn test_error_extension_is_not_available_for_error_without_traceback() {
    let error = ExecutionError::from_exception(Exception::new("RuntimeError", "no frames"));
    assert!(get_error_extension(&error).is_none());
}

#[test]
fn test_incomplete_traceback_is_handled_by_context_extractor() {
    let error = ExecutionError::from_exception(Exception::new("RuntimeError", "no frames"));
    assert!(get_formatted_context(&error).is_none());
}

#[test]
fn test_safe_repr_handles_exception_during_repr() {
    assert!(!safe_repr(&FailingRepr).is_empty());
}

#[test]
fn test_safe_repr_includes_exception_type_in_repr() {
    assert!(safe_repr(&FailingRepr).contains("KeyError"));
}

#[test]
fn test_formatting_is_safe_across_threads() {
    let result = execute(&schema(), "{ hello error }");
    let expected = format_errors(&result, format_error, true);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| format_errors(&result, format_error, true)))
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
    });
}

#[test]
fn test_response_envelope_serialization() {
    let result = execute(&schema(), "{ status error }");
    let envelope = json!({
        "data": result.data,
        "errors": format_errors(&result, format_error, false),
    });
    assert_eq!(
        envelope,
        json!({
            "data": { "status": "ok", "error": null },
            "errors": [{
                "message": "Resolver error",
                "locations": [{ "line": 1, "column": 10 }],
                "path": ["error"]
            }]
        })
    );
}
