use std::collections::HashMap;

use thiserror::Error;

/// Field name -> message, rendered next to form inputs. `_form` holds
/// errors that don't belong to a single field.
pub type FieldErrors = HashMap<String, String>;

pub const FORM_KEY: &str = "_form";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Field { field: &'static str, message: String },

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Auth(String),

    #[error("market data unavailable: {0}")]
    Market(String),

    #[error("database error: {0}")]
    Db(#[from] mongodb::error::Error),
}

impl AppError {
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Field { field, message: message.into() }
    }

    pub fn form(message: impl Into<String>) -> Self {
        AppError::Field { field: FORM_KEY, message: message.into() }
    }

    /// Message safe to show to the user. Database details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Db(e) => {
                tracing::error!(error = %e, "database error");
                "Server error. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    pub fn field_errors(&self) -> FieldErrors {
        let key = match self {
            AppError::Field { field, .. } => *field,
            _ => FORM_KEY,
        };
        let mut errs = FieldErrors::new();
        errs.insert(key.to_string(), self.user_message());
        errs
    }

    /// Unique-index violations come back from the server as E11000.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, AppError::Db(e) if e.to_string().contains("E11000"))
    }
}
