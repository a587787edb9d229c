//! Commonly used items for convenient importing.
//!
//! ```rust
//! use faultfmt::prelude::*;
//!
//! let result: ExecutionResult =
//!     ExecutionResult::with_errors(None, vec![ExecutionError::new("syntax error")]);
//! let errors = format_errors(&result, format_error, true);
//! assert!(errors[0].extensions.as_ref().unwrap().exception.is_none());
//! ```

pub use crate::{
    ErrorFormatter, ExecutionError, ExecutionResult, FormattedError,
    exception::Exception,
    format_error, format_errors,
    repr::{Repr, ReprError, safe_debug, safe_repr},
    traceback::{TraceFrame, Traceback},
};
