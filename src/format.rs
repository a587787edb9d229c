//! Conversion of execution errors into transport-safe mappings.
//!
//! # Overview
//!
//! [`format_errors`] is the entry point a transport calls with an execution
//! result. It applies an [`ErrorFormatter`] to every error, in order, and
//! returns values ready to be serialized under the `"errors"` key of a
//! response:
//!
//! ```json
//! {
//!   "message": "name 'test_undefined' is not defined",
//!   "locations": [{ "line": 1, "column": 3 }],
//!   "path": ["hello"],
//!   "extensions": {
//!     "exception": {
//!       "stacktrace": ["execute - executor.rs:10", "..."],
//!       "context": { "test_int": "123" }
//!     }
//!   }
//! }
//! ```
//!
//! # Debug mode
//!
//! With `debug` off, no `extensions` key is produced, whatever the error
//! carries. With `debug` on, `extensions.exception` is always present: it
//! holds the stack trace and locals of the underlying fault, or `null` when
//! the error was not caused by one (parse and validation errors) or the fault
//! recorded no frames. Whether debug output may be shown to a client is the
//! caller's decision.
//!
//! # Custom formatters
//!
//! Any `Fn(&ExecutionError, bool) -> FormattedError` is an
//! [`ErrorFormatter`]. Wrapping [`format_error`] is the usual way to add
//! fields:
//!
//! ```
//! use faultfmt::{ExecutionError, ExecutionResult, FormattedError, format_error, format_errors};
//!
//! fn shouting(error: &ExecutionError, debug: bool) -> FormattedError {
//!     let mut formatted = format_error(error, debug);
//!     formatted.message = formatted.message.to_uppercase();
//!     formatted
//! }
//!
//! let result: ExecutionResult =
//!     ExecutionResult::with_errors(None, vec![ExecutionError::new("cannot query field")]);
//! let errors = format_errors(&result, shouting, false);
//! assert_eq!(errors[0].message, "CANNOT QUERY FIELD");
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    context::get_formatted_context,
    execution::{ExecutionError, PathSegment, SourceLocation},
    extract::{ErrorSource, extract_errors},
};

/// An execution error as it is sent to clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedError {
    /// Human-readable description of the failure.
    pub message: String,
    /// Where in the document the failure applies. Omitted when unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<SourceLocation>>,
    /// The response path of the failing field. Omitted when unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// Debug extensions. Only present when formatted in debug mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<ErrorExtensions>,
}

/// The `extensions` block of a [`FormattedError`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorExtensions {
    /// Details of the underlying fault; `null` when there is none.
    pub exception: Option<ExceptionExtension>,
}

/// Debug details of the fault behind an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionExtension {
    /// The formatted stack trace, outermost call first.
    pub stacktrace: Vec<String>,
    /// Renderings of the locals where the fault was raised; `null` when
    /// they could not be observed.
    pub context: Option<IndexMap<String, String>>,
}

/// Converts one [`ExecutionError`] into a [`FormattedError`].
pub trait ErrorFormatter {
    /// Formats `error`, attaching debug extensions if `debug` is set.
    fn format(&self, error: &ExecutionError, debug: bool) -> FormattedError;
}

impl<F> ErrorFormatter for F
where
    F: Fn(&ExecutionError, bool) -> FormattedError,
{
    fn format(&self, error: &ExecutionError, debug: bool) -> FormattedError {
        self(error, debug)
    }
}

/// Formats every error of `result` with `formatter`, preserving order.
///
/// Pass [`format_error`] for the default formatting.
pub fn format_errors<S, F>(result: &S, formatter: F, debug: bool) -> Vec<FormattedError>
where
    S: ErrorSource + ?Sized,
    F: ErrorFormatter,
{
    let errors = extract_errors(result);
    let debug_mode = debug;
    tracing::trace!(
        count = errors.len(),
        debug = debug_mode,
        "formatting execution errors"
    );
    errors
        .iter()
        .map(|error| formatter.format(error, debug))
        .collect()
}

/// The default [`ErrorFormatter`].
///
/// Copies `message`, `locations` and `path`. In debug mode also attaches
/// `extensions.exception` from [`get_error_extension`].
pub fn format_error(error: &ExecutionError, debug: bool) -> FormattedError {
    FormattedError {
        message: error.message.clone(),
        locations: error.locations.clone(),
        path: error.path.clone(),
        extensions: debug.then(|| ErrorExtensions {
            exception: get_error_extension(error),
        }),
    }
}

/// Builds the debug details of the fault behind `error`.
///
/// Returns `None` when the error has no underlying fault or the fault
/// recorded no frames.
pub fn get_error_extension(error: &ExecutionError) -> Option<ExceptionExtension> {
    let exception = error.original_error.as_deref()?;
    let Some(traceback) = exception.traceback().filter(|traceback| !traceback.is_empty()) else {
        tracing::trace!(kind = exception.kind(), "fault has no frames to report");
        return None;
    };
    tracing::trace!(
        kind = exception.kind(),
        frames = traceback.len(),
        "building exception extension"
    );

    Some(ExceptionExtension {
        stacktrace: exception.format_stacktrace(),
        context: get_formatted_context(error),
    })
}
