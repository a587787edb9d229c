//! Conversions from error types that do not implement
//! [`std::error::Error`] into an [`Exception`].
//!
//! Anything implementing [`std::error::Error`] already converts through
//! [`From`]. Boxed trait objects and [`anyhow::Error`] do not, so they get the
//! [`IntoException`] extension trait instead:
//!
//! ```
//! use faultfmt::compat::IntoException;
//!
//! fn load() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     Err("config missing".into())
//! }
//!
//! let exception = load().into_exception().unwrap_err();
//! assert_eq!(exception.message(), "config missing");
//! ```
//!
//! # Available Integrations
//!
//! - [`boxed_error`] - `Box<dyn Error>` and `Box<dyn Error + Send + Sync>`
//! - [`anyhow1`] - the `anyhow` 1.x error handling library (requires the
//!   `compat-anyhow1` feature flag)
//!
//! [`Exception`]: crate::exception::Exception

#[cfg(feature = "compat-anyhow1")]
#[cfg_attr(docsrs, doc(cfg(feature = "compat-anyhow1")))]
pub mod anyhow1;
pub mod boxed_error;

/// Converts a foreign error, or the error of a `Result`, into an
/// [`Exception`](crate::exception::Exception).
pub trait IntoException {
    /// The converted type.
    type Output;

    /// Performs the conversion.
    fn into_exception(self) -> Self::Output;
}
