#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Transport-safe formatting of query execution errors.
//!
//! ## Overview
//!
//! A query execution engine reports failures as a list of
//! [`ExecutionError`]s. Before they reach a client, they have to become plain
//! data: a message, the document locations, and the response path of the
//! failing field. This crate performs that conversion and, when asked to,
//! adds the debug details of the fault behind each error: its stack trace and
//! a snapshot of the locals of the frame where it was raised.
//!
//! Formatting never fails. Locals whose rendering fails or panics are
//! replaced by a placeholder naming the fault, without affecting anything
//! else in the payload.
//!
//! ## Quick Example
//!
//! ```
//! use faultfmt::{
//!     ExecutionError, ExecutionResult, format_error, format_errors,
//!     exception::Exception,
//!     traceback::{TraceFrame, Traceback},
//! };
//!
//! let exception = Exception::new("KeyError", "'id'").with_traceback(Traceback::from_frames([
//!     TraceFrame::new("execute").at("executor.rs", 40),
//!     TraceFrame::new("resolve_user").at("schema.rs", 12).local("user_id", 7),
//! ]));
//! let result: ExecutionResult = ExecutionResult::with_errors(
//!     None,
//!     vec![
//!         ExecutionError::from_exception(exception)
//!             .with_location(1, 3)
//!             .with_path(["user"]),
//!     ],
//! );
//!
//! let production = format_errors(&result, format_error, false);
//! assert!(production[0].extensions.is_none());
//!
//! let debug = format_errors(&result, format_error, true);
//! let exception = debug[0].extensions.as_ref().unwrap().exception.as_ref().unwrap();
//! assert_eq!(exception.context.as_ref().unwrap()["user_id"], "7");
//! ```
//!
//! ## Pipeline
//!
//! - [`extract_errors`] reads the error list of anything implementing
//!   [`ErrorSource`], treating a missing list as empty.
//! - [`format_errors`] applies an [`ErrorFormatter`] to each error in order.
//!   [`format_error`] is the default one.
//! - [`get_error_extension`] builds the `extensions.exception` block from the
//!   [`Exception`](exception::Exception) behind an error, and
//!   [`get_formatted_context`] renders the locals of its innermost frame
//!   through [`safe_repr`](repr::safe_repr).
//!
//! ## Ecosystem
//!
//! The engine decides how tracebacks are recorded. Two companion crates
//! capture them automatically:
//!
//! - **`faultfmt-backtrace`** - a native stack trace of the fault site.
//! - **`faultfmt-tracing`** - the active `tracing` spans, with their fields
//!   as frame locals.

pub mod compat;
pub mod context;
pub mod exception;
pub mod execution;
pub mod extract;
pub mod format;
pub mod prelude;
pub mod repr;
pub mod traceback;

pub use context::get_formatted_context;
pub use execution::{ExecutionError, ExecutionResult, PathSegment, SourceLocation};
pub use extract::{ErrorSource, extract_errors};
pub use format::{
    ErrorExtensions, ErrorFormatter, ExceptionExtension, FormattedError, format_error,
    format_errors, get_error_extension,
};
pub use repr::{safe_debug, safe_repr};
