//! Conversions from boxed error trait objects.

use core::error::Error;

use super::IntoException;
use crate::exception::Exception;

/// The kind recorded for boxed errors, whose concrete type is erased.
pub const BOXED_ERROR_KIND: &str = "Box<dyn Error>";

fn from_boxed(error: &(dyn Error + 'static)) -> Exception {
    Exception::new(BOXED_ERROR_KIND, error.to_string()).with_source_chain(error.source())
}

impl IntoException for Box<dyn Error + Send + Sync> {
    type Output = Exception;

    fn into_exception(self) -> Self::Output {
        from_boxed(&*self)
    }
}

impl IntoException for Box<dyn Error> {
    type Output = Exception;

    fn into_exception(self) -> Self::Output {
        from_boxed(&*self)
    }
}

impl<T> IntoException for Result<T, Box<dyn Error + Send + Sync>> {
    type Output = Result<T, Exception>;

    fn into_exception(self) -> Self::Output {
        self.map_err(IntoException::into_exception)
    }
}

impl<T> IntoException for Result<T, Box<dyn Error>> {
    type Output = Result<T, Exception>;

    fn into_exception(self) -> Self::Output {
        self.map_err(IntoException::into_exception)
    }
}
