//! The underlying fault behind an execution error.
//!
//! An [`Exception`] is what a resolver raised: the type of the original
//! error, its message, the chain of errors that caused it, and optionally the
//! [`Traceback`] recorded while it propagated. Execution errors produced by
//! parsing or validation have no exception.
//!
//! Any [`std::error::Error`] converts into an `Exception`, so resolvers can
//! use `?`:
//!
//! ```
//! use faultfmt::exception::Exception;
//!
//! fn parse_limit(raw: &str) -> Result<u32, Exception> {
//!     Ok(raw.parse::<u32>()?)
//! }
//!
//! let exception = parse_limit("ten").unwrap_err();
//! assert!(exception.kind().ends_with("ParseIntError"));
//! assert_eq!(exception.message(), "invalid digit found in string");
//! ```

use core::fmt;
use std::borrow::Cow;

use crate::traceback::Traceback;

/// A fault raised while resolving a field.
#[derive(Debug)]
pub struct Exception {
    kind: Cow<'static, str>,
    message: String,
    causes: Vec<String>,
    traceback: Option<Traceback>,
}

impl Exception {
    /// Creates an exception of the given kind.
    pub fn new(kind: impl Into<Cow<'static, str>>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            causes: Vec::new(),
            traceback: None,
        }
    }

    /// Captures an error: its type name, its message and the messages of its
    /// [`source`](core::error::Error::source) chain.
    pub fn from_error<E>(error: &E) -> Self
    where
        E: core::error::Error + ?Sized,
    {
        Self::new(core::any::type_name::<E>(), error.to_string()).with_source_chain(error.source())
    }

    /// Appends the messages of `source` and of every error behind it.
    pub(crate) fn with_source_chain(
        mut self,
        mut source: Option<&(dyn core::error::Error + 'static)>,
    ) -> Self {
        while let Some(cause) = source {
            self.causes.push(cause.to_string());
            source = cause.source();
        }
        self
    }

    /// Appends the message of an error that caused this one.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Attaches a traceback, replacing any previous one.
    #[must_use]
    pub fn with_traceback(mut self, traceback: Traceback) -> Self {
        self.traceback = Some(traceback);
        self
    }

    /// Attaches a traceback, replacing any previous one.
    pub fn set_traceback(&mut self, traceback: Traceback) {
        self.traceback = Some(traceback);
    }

    /// Mutable access to the traceback, so an engine can add frames while
    /// the fault propagates.
    pub fn traceback_mut(&mut self) -> &mut Traceback {
        self.traceback.get_or_insert_with(Traceback::new)
    }

    /// The type name of the original error.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The message of the original error.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The messages of the errors that caused this one, nearest first.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// The recorded traceback, if any.
    pub fn traceback(&self) -> Option<&Traceback> {
        self.traceback.as_ref()
    }

    /// Formats the traceback the way it appears in a debug payload.
    ///
    /// One line per frame, outermost first, followed by a `kind: message`
    /// summary and one `caused by:` line per cause. Returns only the summary
    /// lines when there is no traceback.
    pub fn format_stacktrace(&self) -> Vec<String> {
        let frames = self.traceback.iter().flat_map(Traceback::frames);
        let mut lines: Vec<String> = frames.map(ToString::to_string).collect();
        lines.push(self.to_string());
        lines.extend(self.causes.iter().map(|cause| format!("caused by: {cause}")));
        lines
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl<E> From<E> for Exception
where
    E: core::error::Error,
{
    fn from(error: E) -> Self {
        Self::from_error(&error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traceback::TraceFrame;

    #[derive(Debug)]
    struct ConnectionRefused;

    impl fmt::Display for ConnectionRefused {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection refused")
        }
    }

    impl core::error::Error for ConnectionRefused {}

    #[derive(Debug)]
    struct FetchFailed(ConnectionRefused);

    impl fmt::Display for FetchFailed {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "could not fetch user")
        }
    }

    impl core::error::Error for FetchFailed {
        fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_from_error_captures_kind_message_and_causes() {
        let exception = Exception::from(FetchFailed(ConnectionRefused));
        assert!(exception.kind().ends_with("FetchFailed"));
        assert_eq!(exception.message(), "could not fetch user");
        assert_eq!(exception.causes(), ["connection refused"]);
        assert!(exception.traceback().is_none());
    }

    #[test]
    fn test_stacktrace_lists_frames_then_summary() {
        let exception = Exception::new("NameError", "name 'test_undefined' is not defined")
            .with_cause("lookup failed")
            .with_traceback(Traceback::from_frames([
                TraceFrame::new("execute").at("executor.rs", 10),
                TraceFrame::new("resolve_hello").at("schema.rs", 42),
            ]));

        assert_eq!(
            exception.format_stacktrace(),
            [
                "execute - executor.rs:10",
                "resolve_hello - schema.rs:42",
                "NameError: name 'test_undefined' is not defined",
                "caused by: lookup failed",
            ]
        );
    }

    #[test]
    fn test_traceback_mut_grows_outward() {
        let mut exception = Exception::new("TimeoutError", "timed out");
        exception
            .traceback_mut()
            .push_outer(TraceFrame::new("resolve_slow"));
        exception.traceback_mut().push_outer(TraceFrame::new("execute"));

        let traceback = exception.traceback().unwrap();
        assert_eq!(traceback.outermost().unwrap().function(), "execute");
        assert_eq!(traceback.innermost().unwrap().function(), "resolve_slow");
    }

    #[test]
    fn test_stacktrace_without_traceback_is_summary_only() {
        let exception = Exception::new("ValueError", "bad value");
        assert_eq!(exception.format_stacktrace(), ["ValueError: bad value"]);
    }
}
