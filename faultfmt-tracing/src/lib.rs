#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Tracing span scopes as faultfmt tracebacks.
//!
//! Resolvers that run inside `tracing` spans already describe what they were
//! doing through span fields. This crate turns the active span scope into a
//! [`Traceback`]: the root span becomes the outermost frame, the current span
//! the innermost one, and each span's recorded fields become that frame's
//! locals. The debug payload's `context` then shows the fields of the span
//! the fault was raised in.
//!
//! # How It Works
//!
//! You add [`FaultLayer`] to your tracing subscriber alongside your existing
//! layers. It stores the rendered value of every span field, both at span
//! creation and when a field is recorded later with [`Span::record`].
//!
//! # Quick Start
//!
//! ```
//! use faultfmt::{ExecutionError, exception::Exception, format_error};
//! use faultfmt_tracing::{ExceptionSpanExt, FaultLayer};
//! use tracing_subscriber::{Registry, layer::SubscriberExt};
//!
//! let subscriber = Registry::default().with(FaultLayer);
//!
//! #[tracing::instrument(fields(user_id = 42))]
//! fn resolve_user() -> Result<String, Exception> {
//!     Err(Exception::new("LookupError", "no such user").with_span_traceback())
//! }
//!
//! let exception = tracing::subscriber::with_default(subscriber, resolve_user).unwrap_err();
//! let error = ExecutionError::from_exception(exception);
//! let formatted = format_error(&error, true);
//! let exception = formatted.extensions.unwrap().exception.unwrap();
//! assert_eq!(exception.context.unwrap()["user_id"], "42");
//! ```
//!
//! **Note:** without [`FaultLayer`] the spans are still captured, but their
//! fields are not, so the frames report no locals.
//!
//! # Environment Variables
//!
//! - `FAULTFMT_TRACING` - Comma-separated options:
//!   - `skip_empty` - Leave out spans that recorded no fields

use std::sync::OnceLock;

use faultfmt::{
    exception::Exception,
    repr::{Preformatted, safe_debug},
    traceback::{TraceFrame, Traceback},
};
use tracing::{
    Span,
    field::{Field, Visit},
};
use tracing_subscriber::registry::{LookupSpan, SpanRef};

/// Field values recorded for a span, in recording order.
#[derive(Clone, Debug, Default)]
struct CapturedFields(Vec<(&'static str, String)>);

impl CapturedFields {
    fn set(&mut self, name: &'static str, value: String) {
        match self.0.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((name, value)),
        }
    }
}

impl Visit for CapturedFields {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.set(field.name(), safe_debug(value));
    }
}

/// A tracing layer that records span field values for tracebacks.
///
/// # Examples
///
/// ```
/// use faultfmt_tracing::FaultLayer;
/// use tracing_subscriber::{Registry, layer::SubscriberExt};
///
/// let subscriber = Registry::default()
///     .with(FaultLayer)
///     .with(tracing_subscriber::fmt::layer());
///
/// tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct FaultLayer;

impl<S> tracing_subscriber::Layer<S> for FaultLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = CapturedFields::default();
        attrs.record(&mut fields);
        span.extensions_mut().insert(fields);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        match extensions.get_mut::<CapturedFields>() {
            Some(fields) => values.record(fields),
            None => {
                let mut fields = CapturedFields::default();
                values.record(&mut fields);
                extensions.insert(fields);
            }
        }
    }
}

/// Settings for turning a span scope into a [`Traceback`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpanCapture {
    /// Whether spans that recorded no fields become frames too.
    pub include_spans_without_fields: bool,
}

#[derive(Debug)]
struct FaultfmtTracingEnvOptions {
    skip_empty: bool,
}

impl FaultfmtTracingEnvOptions {
    fn get() -> &'static Self {
        static FAULTFMT_TRACING_FLAGS: OnceLock<FaultfmtTracingEnvOptions> = OnceLock::new();

        FAULTFMT_TRACING_FLAGS.get_or_init(|| {
            let mut skip_empty = false;

            if let Some(var) = std::env::var_os("FAULTFMT_TRACING") {
                for v in var.to_string_lossy().split(',') {
                    if v.trim().eq_ignore_ascii_case("skip_empty") {
                        skip_empty = true;
                    }
                }
            }

            FaultfmtTracingEnvOptions { skip_empty }
        })
    }
}

impl SpanCapture {
    /// Keeps every span in the scope.
    pub const ALL: Self = Self {
        include_spans_without_fields: true,
    };

    /// Creates settings from the `FAULTFMT_TRACING` environment variable.
    pub fn new() -> Self {
        Self {
            include_spans_without_fields: !FaultfmtTracingEnvOptions::get().skip_empty,
        }
    }

    /// Captures the scope of the current span.
    ///
    /// Returns `None` when there is no current span, when the subscriber is
    /// not built on a [`tracing_subscriber::Registry`], or when every span
    /// was left out.
    pub fn capture(&self) -> Option<Traceback> {
        let traceback = Span::current()
            .with_subscriber(|(id, dispatch)| {
                let registry = dispatch.downcast_ref::<tracing_subscriber::Registry>()?;
                let span = registry.span(id)?;
                let frames = span
                    .scope()
                    .from_root()
                    .filter_map(|ancestor| self.frame_for(&ancestor));
                Some(Traceback::from_frames(frames))
            })
            .flatten()?;

        tracing::trace!(frames = traceback.len(), "captured span traceback");
        (!traceback.is_empty()).then_some(traceback)
    }

    fn frame_for<'a, R: LookupSpan<'a>>(&self, span: &SpanRef<'a, R>) -> Option<TraceFrame> {
        let metadata = span.metadata();
        let extensions = span.extensions();
        let fields = extensions.get::<CapturedFields>();
        if !self.include_spans_without_fields && fields.is_none_or(|fields| fields.0.is_empty()) {
            return None;
        }

        let frame = match fields {
            Some(fields) => fields
                .0
                .iter()
                .fold(TraceFrame::new(metadata.name()), |frame, (name, value)| {
                    frame.local_repr(*name, Preformatted(value.clone()))
                }),
            None => TraceFrame::opaque(metadata.name()),
        };
        Some(match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => frame.at(file, line),
            (Some(file), None) => frame.in_file(file),
            _ => frame,
        })
    }
}

impl Default for SpanCapture {
    fn default() -> Self {
        Self::new()
    }
}

/// Captures the current span scope with [`SpanCapture::new`] settings.
pub fn capture_span_traceback() -> Option<Traceback> {
    SpanCapture::new().capture()
}

/// Extension trait for attaching the current span scope to exceptions.
///
/// An exception that already has a traceback keeps it.
///
/// ```
/// use faultfmt::exception::Exception;
/// use faultfmt_tracing::ExceptionSpanExt;
///
/// #[tracing::instrument]
/// fn resolve_orders() -> Result<(), Exception> {
///     Err(Exception::new("TimeoutError", "orders service timed out")).with_span_traceback()
/// }
/// ```
pub trait ExceptionSpanExt: Sized {
    /// Attaches the current span scope as the traceback.
    fn with_span_traceback(self) -> Self;
}

impl ExceptionSpanExt for Exception {
    fn with_span_traceback(mut self) -> Self {
        if self.traceback().is_none()
            && let Some(traceback) = capture_span_traceback()
        {
            self.set_traceback(traceback);
        }
        self
    }
}

impl<T> ExceptionSpanExt for Result<T, Exception> {
    fn with_span_traceback(self) -> Self {
        self.map_err(ExceptionSpanExt::with_span_traceback)
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::{Registry, layer::SubscriberExt};

    use super::*;

    fn frame_names(traceback: &Traceback) -> Vec<&str> {
        traceback.frames().map(TraceFrame::function).collect()
    }

    #[test]
    fn test_no_span_captures_nothing() {
        let subscriber = Registry::default().with(FaultLayer);
        tracing::subscriber::with_default(subscriber, || {
            assert!(SpanCapture::ALL.capture().is_none());
        });
    }

    #[test]
    fn test_scope_runs_from_root_to_current_span() {
        let subscriber = Registry::default().with(FaultLayer);
        tracing::subscriber::with_default(subscriber, || {
            let _request = tracing::info_span!("request", operation = "GetUser").entered();
            let _field = tracing::info_span!("resolve_field", field = "user", depth = 1).entered();

            let traceback = SpanCapture::ALL.capture().unwrap();
            assert_eq!(frame_names(&traceback), ["request", "resolve_field"]);

            let innermost = traceback.innermost().unwrap();
            assert_eq!(innermost.file(), Some(file!()));
            let locals = innermost.locals().unwrap();
            assert_eq!(locals.len(), 2);
            assert_eq!(faultfmt::safe_repr(locals.get("field").unwrap()), "\"user\"");
            assert_eq!(faultfmt::safe_repr(locals.get("depth").unwrap()), "1");
        });
    }

    #[test]
    fn test_late_recorded_fields_are_captured() {
        let subscriber = Registry::default().with(FaultLayer);
        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("load", attempt = tracing::field::Empty, id = 7);
            let _guard = span.enter();
            span.record("attempt", 1);
            span.record("attempt", 2);

            let traceback = SpanCapture::ALL.capture().unwrap();
            let locals = traceback.innermost().unwrap().locals().unwrap();
            let names: Vec<_> = locals.iter().map(|(name, _)| name).collect();
            assert_eq!(names, ["id", "attempt"]);
            assert_eq!(faultfmt::safe_repr(locals.get("attempt").unwrap()), "2");
        });
    }

    #[test]
    fn test_empty_spans_can_be_skipped() {
        let subscriber = Registry::default().with(FaultLayer);
        tracing::subscriber::with_default(subscriber, || {
            let _outer = tracing::info_span!("executor").entered();
            let _inner = tracing::info_span!("resolve", field = "hello").entered();

            let skipping = SpanCapture {
                include_spans_without_fields: false,
            };
            let traceback = skipping.capture().unwrap();
            assert_eq!(frame_names(&traceback), ["resolve"]);

            let traceback = SpanCapture::ALL.capture().unwrap();
            assert_eq!(frame_names(&traceback), ["executor", "resolve"]);
            assert!(traceback.outermost().unwrap().locals().unwrap().is_empty());
        });
    }

    #[test]
    fn test_spans_without_layer_have_unavailable_locals() {
        tracing::subscriber::with_default(Registry::default(), || {
            let _span = tracing::info_span!("resolve", field = "hello").entered();
            let traceback = SpanCapture::ALL.capture().unwrap();
            assert!(traceback.innermost().unwrap().locals().is_none());
        });
    }

    #[test]
    fn test_existing_traceback_is_kept() {
        let subscriber = Registry::default().with(FaultLayer);
        tracing::subscriber::with_default(subscriber, || {
            let _span = tracing::info_span!("resolve").entered();
            let exception = Exception::new("ValueError", "bad input")
                .with_traceback(Traceback::from_frames([TraceFrame::new("parse_input")]))
                .with_span_traceback();
            assert_eq!(frame_names(exception.traceback().unwrap()), ["parse_input"]);
        });
    }
}
