//! Rendering of captured values that cannot fail.
//!
//! # Overview
//!
//! Debug payloads contain renderings of arbitrary runtime values: the locals
//! of the frame where a resolver failed. Those values are not under the
//! control of this crate, and their rendering logic may be broken. A `Debug`
//! implementation can return [`fmt::Error`], panic, or a custom [`Repr`] can
//! report a failure of its own.
//!
//! [`safe_repr`] and [`safe_debug`] are total: they always return a non-empty
//! string. When rendering fails, the value is replaced by a placeholder that
//! names both the value's type and the type of the fault, for example:
//!
//! ```text
//! <my_app::Session instance: repr raised my_app::KeyError>
//! ```
//!
//! so a developer reading the payload can tell that rendering, not the
//! original operation, failed for that entry.
//!
//! # Panics
//!
//! Panics raised while rendering are caught with
//! [`catch_unwind`](std::panic::catch_unwind). The process panic hook still
//! runs, so the panic message is printed as usual. With `panic = "abort"`
//! there is nothing to catch.
//!
//! # Examples
//!
//! ```
//! use faultfmt::repr::{Repr, ReprError, safe_debug, safe_repr};
//!
//! assert_eq!(safe_debug(&123), "123");
//! assert_eq!(safe_debug("test"), "\"test\"");
//!
//! #[derive(Debug)]
//! struct Missing;
//! impl std::fmt::Display for Missing {
//!     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
//!         write!(f, "missing key")
//!     }
//! }
//! impl std::error::Error for Missing {}
//!
//! struct Lookup;
//! impl Repr for Lookup {
//!     fn repr(&self) -> Result<String, ReprError> {
//!         Err(Missing)?
//!     }
//! }
//!
//! assert!(safe_repr(&Lookup).contains("Missing"));
//! ```

use core::{any::Any, fmt};
use std::panic::{self, AssertUnwindSafe};

/// A value that can render itself for a debug payload.
///
/// Most values never implement this directly: anything implementing
/// [`Debug`](fmt::Debug) can be captured through [`DebugRepr`]. Implement it
/// when the rendering needs to do work that can fail, such as a lookup.
pub trait Repr {
    /// Renders the value.
    fn repr(&self) -> Result<String, ReprError>;

    /// The name of the rendered type, used in placeholders when
    /// [`repr`](Repr::repr) fails.
    fn type_name(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}

impl<R: Repr + ?Sized> Repr for Box<R> {
    fn repr(&self) -> Result<String, ReprError> {
        (**self).repr()
    }

    fn type_name(&self) -> &'static str {
        (**self).type_name()
    }
}

/// Adapter rendering a value through its [`Debug`](fmt::Debug)
/// implementation.
#[derive(Copy, Clone, Default)]
pub struct DebugRepr<T>(pub T);

impl<T: fmt::Debug> Repr for DebugRepr<T> {
    fn repr(&self) -> Result<String, ReprError> {
        render_debug(&self.0)
    }

    fn type_name(&self) -> &'static str {
        core::any::type_name::<T>()
    }
}

/// A value that was already rendered when it was captured.
///
/// The text is returned verbatim. This is what span fields recorded by a
/// `tracing` layer look like: the layer only ever sees them as `&dyn Debug`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preformatted(pub String);

impl Repr for Preformatted {
    fn repr(&self) -> Result<String, ReprError> {
        Ok(self.0.clone())
    }
}

/// The failure of a [`Repr`] implementation.
///
/// Any [`std::error::Error`] converts into a `ReprError` and the name of its
/// type is recorded, so `?` can be used inside [`Repr::repr`].
///
/// A `Debug` implementation that has no error channel beyond [`fmt::Error`]
/// can still report a precise fault by panicking with
/// [`std::panic::panic_any`] and a `ReprError` payload.
pub struct ReprError {
    kind: &'static str,
    inner: Box<dyn core::error::Error + Send + Sync>,
}

impl ReprError {
    /// The type name of the error this fault was created from.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// The error this fault was created from.
    pub fn inner(&self) -> &(dyn core::error::Error + Send + Sync + 'static) {
        &*self.inner
    }
}

impl<E> From<E> for ReprError
where
    E: core::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self {
            kind: core::any::type_name::<E>(),
            inner: Box::new(error),
        }
    }
}

impl fmt::Debug for ReprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReprError")
            .field("kind", &self.kind)
            .field("inner", &self.inner)
            .finish()
    }
}

impl fmt::Display for ReprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.inner)
    }
}

/// Renders `value` with `{:?}`, surfacing [`fmt::Error`] instead of
/// panicking the way `format!` does.
fn render_debug<T: fmt::Debug + ?Sized>(value: &T) -> Result<String, ReprError> {
    let mut out = String::new();
    fmt::write(&mut out, format_args!("{value:?}"))?;
    Ok(out)
}

/// Renders a value through its [`Repr`] implementation, falling back to a
/// placeholder if that fails.
///
/// The returned string is never empty. A panic while rendering is caught,
/// but the process panic hook still runs and prints its message.
pub fn safe_repr<R: Repr + ?Sized>(value: &R) -> String {
    guarded(|| value.type_name(), || value.repr())
}

/// Renders a value through its [`Debug`](fmt::Debug) implementation, falling
/// back to a placeholder if that fails.
///
/// Produces the same output as `safe_repr(&DebugRepr(value))`, including
/// the panic hook running for a panicking `Debug` implementation.
pub fn safe_debug<T: fmt::Debug + ?Sized>(value: &T) -> String {
    guarded(core::any::type_name::<T>, || render_debug(value))
}

fn guarded(
    type_name: impl FnOnce() -> &'static str,
    render: impl FnOnce() -> Result<String, ReprError>,
) -> String {
    let fault = match panic::catch_unwind(AssertUnwindSafe(render)) {
        Ok(Ok(rendered)) if !rendered.is_empty() => return rendered,
        Ok(Ok(_)) => None,
        Ok(Err(error)) => {
            let kind = error.kind();
            discard(error);
            Some(kind)
        }
        Err(payload) => {
            let kind = panic_kind(&*payload);
            discard(payload);
            Some(kind)
        }
    };

    let type_name = panic::catch_unwind(AssertUnwindSafe(type_name)).unwrap_or("<unknown>");
    tracing::debug!(
        value_type = type_name,
        fault = fault.unwrap_or("empty rendering"),
        "value rendering failed, substituting placeholder"
    );
    placeholder(type_name, fault)
}

fn panic_kind(payload: &(dyn Any + Send)) -> &'static str {
    match payload.downcast_ref::<ReprError>() {
        Some(error) => error.kind(),
        None => "panic",
    }
}

/// Drops a fault value, ignoring a panic from its destructor.
fn discard<T>(value: T) {
    let _ = panic::catch_unwind(AssertUnwindSafe(move || drop(value)));
}

fn placeholder(type_name: &str, fault: Option<&str>) -> String {
    let mut out = String::with_capacity(type_name.len() + 48);
    out.push('<');
    out.push_str(type_name);
    out.push_str(" instance");
    if let Some(fault) = fault {
        out.push_str(": repr raised ");
        out.push_str(fault);
    }
    out.push('>');
    out
}
