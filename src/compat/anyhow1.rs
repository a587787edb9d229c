//! Integration with the [`anyhow`] 1.x error handling library.
//!
//! Resolvers written against `anyhow::Result` can hand their errors to the
//! engine as an [`Exception`]:
//!
//! ```
//! use anyhow::Context;
//! use faultfmt::compat::IntoException;
//!
//! fn lookup() -> anyhow::Result<u32> {
//!     let raw = "x";
//!     raw.parse::<u32>().context("user id is not numeric")
//! }
//!
//! let exception = lookup().into_exception().unwrap_err();
//! assert_eq!(exception.kind(), "anyhow::Error");
//! assert_eq!(exception.message(), "user id is not numeric");
//! assert_eq!(exception.causes(), ["invalid digit found in string"]);
//! ```
//!
//! The concrete type behind an [`anyhow::Error`] is erased, so every
//! converted exception has the kind [`ANYHOW_KIND`].

use super::IntoException;
use crate::exception::Exception;

/// The kind recorded for converted [`anyhow::Error`]s.
pub const ANYHOW_KIND: &str = "anyhow::Error";

impl IntoException for anyhow::Error {
    type Output = Exception;

    fn into_exception(self) -> Self::Output {
        self.chain()
            .skip(1)
            .fold(Exception::new(ANYHOW_KIND, self.to_string()), |exception, cause| {
                exception.with_cause(cause.to_string())
            })
    }
}

impl<T> IntoException for anyhow::Result<T> {
    type Output = Result<T, Exception>;

    fn into_exception(self) -> Self::Output {
        self.map_err(IntoException::into_exception)
    }
}
