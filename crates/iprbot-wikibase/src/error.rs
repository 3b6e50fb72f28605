//! Error types for knowledge-base access

use thiserror::Error;

pub type Result<T> = std::result::Result<T, WikibaseError>;

#[derive(Error, Debug)]
pub enum WikibaseError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The MediaWiki API answered with an `error` object
    #[error("API error {code}: {info}")]
    Api { code: String, info: String },

    #[error("SPARQL query failed: {0}")]
    Sparql(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Not logged in; writes need a CSRF token")]
    NotLoggedIn,

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl WikibaseError {
    pub fn api(code: impl Into<String>, info: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            info: info.into(),
        }
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedResponse(msg.into())
    }

    /// Short variant name, used as the `kind` column of run-log entries
    pub fn kind(&self) -> &'static str {
        match self {
            WikibaseError::Http(_) => "Http",
            WikibaseError::Json(_) => "Json",
            WikibaseError::Api { .. } => "Api",
            WikibaseError::Sparql(_) => "Sparql",
            WikibaseError::Login(_) => "Login",
            WikibaseError::NotLoggedIn => "NotLoggedIn",
            WikibaseError::InvalidId(_) => "InvalidId",
            WikibaseError::EntityNotFound(_) => "EntityNotFound",
            WikibaseError::UnexpectedResponse(_) => "UnexpectedResponse",
        }
    }
}
