//! What the execution engine hands over: a result and its errors.

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::exception::Exception;

/// A position in the query document, both 1-based.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Line in the document.
    pub line: u32,
    /// Column in the line.
    pub column: u32,
}

impl SourceLocation {
    /// Creates a location.
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// One step of the response path to a failing field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name or alias.
    Key(String),
    /// An index into a list.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => f.write_str(key),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// One failure produced while parsing, validating or executing a query.
///
/// Only resolver failures carry an [`original_error`]; parse and validation
/// errors never do.
///
/// [`original_error`]: ExecutionError::original_error
#[derive(Clone, Debug, thiserror::Error)]
#[error("{message}")]
pub struct ExecutionError {
    /// Human-readable description of the failure.
    pub message: String,
    /// Where in the document the failure applies.
    pub locations: Option<Vec<SourceLocation>>,
    /// The response path of the failing field.
    pub path: Option<Vec<PathSegment>>,
    /// The fault raised by the resolver, if any.
    pub original_error: Option<Arc<Exception>>,
}

impl ExecutionError {
    /// Creates an error with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            original_error: None,
        }
    }

    /// Creates the error reported for a resolver fault. The message is the
    /// fault's message.
    pub fn from_exception(exception: impl Into<Arc<Exception>>) -> Self {
        let exception = exception.into();
        Self {
            original_error: Some(exception.clone()),
            ..Self::new(exception.message())
        }
    }

    /// Adds a location.
    #[must_use]
    pub fn with_location(mut self, line: u32, column: u32) -> Self {
        self.locations
            .get_or_insert_with(Vec::new)
            .push(SourceLocation::new(line, column));
        self
    }

    /// Sets the response path.
    #[must_use]
    pub fn with_path<I>(mut self, path: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PathSegment>,
    {
        self.path = Some(path.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the underlying fault.
    #[must_use]
    pub fn with_original_error(mut self, exception: impl Into<Arc<Exception>>) -> Self {
        self.original_error = Some(exception.into());
        self
    }
}

/// The outcome of executing a query.
#[derive(Clone, Debug)]
pub struct ExecutionResult<D = serde_json::Value> {
    /// The data produced, if execution started.
    pub data: Option<D>,
    /// The errors, in the order they were produced.
    pub errors: Option<Vec<ExecutionError>>,
}

impl<D> ExecutionResult<D> {
    /// A result without errors.
    pub fn ok(data: D) -> Self {
        Self {
            data: Some(data),
            errors: None,
        }
    }

    /// A result carrying errors and possibly partial data.
    pub fn with_errors(data: Option<D>, errors: Vec<ExecutionError>) -> Self {
        Self {
            data,
            errors: Some(errors),
        }
    }
}
