//! Utility modules

pub mod error;
pub mod isolate;

pub use error::{AppError, AppResult, ErrorResponse};
pub use isolate::IsolatedContext;
