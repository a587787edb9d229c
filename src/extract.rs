//! Extraction of the error list from an execution result.

use crate::execution::{ExecutionError, ExecutionResult};

/// Anything that may carry a list of execution errors.
///
/// Implemented for [`ExecutionResult`] and for plain error collections, so
/// engines with their own result type only need to expose their errors.
pub trait ErrorSource {
    /// The errors, or `None` when the source carries no error list.
    fn errors(&self) -> Option<&[ExecutionError]>;
}

impl<D> ErrorSource for ExecutionResult<D> {
    fn errors(&self) -> Option<&[ExecutionError]> {
        self.errors.as_deref()
    }
}

impl ErrorSource for [ExecutionError] {
    fn errors(&self) -> Option<&[ExecutionError]> {
        Some(self)
    }
}

impl ErrorSource for Vec<ExecutionError> {
    fn errors(&self) -> Option<&[ExecutionError]> {
        Some(self)
    }
}

impl<S: ErrorSource> ErrorSource for Option<S> {
    fn errors(&self) -> Option<&[ExecutionError]> {
        self.as_ref().and_then(ErrorSource::errors)
    }
}

impl<S: ErrorSource + ?Sized> ErrorSource for &S {
    fn errors(&self) -> Option<&[ExecutionError]> {
        (**self).errors()
    }
}

/// Returns the errors of `result` in order, or an empty slice when there are
/// none.
pub fn extract_errors<S: ErrorSource + ?Sized>(result: &S) -> &[ExecutionError] {
    result.errors().unwrap_or_default()
}
