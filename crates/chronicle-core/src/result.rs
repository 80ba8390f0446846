//! Result alias used by every fallible Chronicle operation.

use crate::error::AppError;

pub type AppResult<T> = Result<T, AppError>;
