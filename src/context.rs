//! Snapshot of the locals of the frame where a fault was raised.

use indexmap::IndexMap;

use crate::{execution::ExecutionError, repr::safe_repr};

/// Renders the locals of the innermost frame of the error's traceback.
///
/// The innermost frame is the one where the fault was raised; outer frames
/// mostly hold call bookkeeping. Every value goes through
/// [`safe_repr`](crate::repr::safe_repr), so a local whose rendering fails
/// shows up as a placeholder without affecting its siblings.
///
/// Returns `None` when the error has no underlying fault, the fault has no
/// frames, or the innermost frame's locals could not be observed.
pub fn get_formatted_context(error: &ExecutionError) -> Option<IndexMap<String, String>> {
    let traceback = error.original_error.as_deref()?.traceback()?;
    let locals = traceback.innermost()?.locals()?;
    Some(
        locals
            .iter()
            .map(|(name, value)| (name.to_owned(), safe_repr(value)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exception::Exception,
        traceback::{TraceFrame, Traceback},
    };

    fn error_with(traceback: Option<Traceback>) -> ExecutionError {
        let mut exception = Exception::new("RuntimeError", "failed");
        if let Some(traceback) = traceback {
            exception.set_traceback(traceback);
        }
        ExecutionError::from_exception(exception)
    }

    #[test]
    fn test_no_traceback_has_no_context() {
        assert!(get_formatted_context(&error_with(None)).is_none());
        assert!(get_formatted_context(&error_with(Some(Traceback::new()))).is_none());
        assert!(get_formatted_context(&ExecutionError::new("invalid query")).is_none());
    }

    #[test]
    fn test_only_innermost_frame_is_inspected() {
        let error = error_with(Some(Traceback::from_frames([
            TraceFrame::new("execute").local("query", "{ hello }"),
            TraceFrame::new("resolve_hello").local("count", 3),
        ])));

        let context = get_formatted_context(&error).unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(context["count"], "3");
    }

    #[test]
    fn test_opaque_innermost_frame_has_no_context() {
        let error = error_with(Some(Traceback::from_frames([
            TraceFrame::new("execute").local("query", "{ hello }"),
            TraceFrame::opaque("std::panicking::begin_panic"),
        ])));
        assert!(get_formatted_context(&error).is_none());
    }

    #[test]
    fn test_frame_without_locals_has_empty_context() {
        let error = error_with(Some(Traceback::from_frames([TraceFrame::new("noop")])));
        assert_eq!(get_formatted_context(&error), Some(IndexMap::new()));
    }
}
