use driftwood_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompositionError {
    #[error("Composition not found: {0}")]
    CompositionNotFound(String),

    #[error("Composition '{composition}' targets '{target}', not '{kind}'")]
    KindMismatch {
        composition: String,
        target: String,
        kind: String,
    },

    #[error("No composition selected for {0}: no ref, no matching selector and no default")]
    NoCompositionSelected(String),

    #[error("Resource '{resource}': source field '{path}' is missing")]
    MissingSource { resource: String, path: String },

    #[error("Resource '{resource}': transform failed: {message}")]
    Transform { resource: String, message: String },

    #[error("Pipeline function not found: {0}")]
    UnknownFunction(String),

    #[error("Pipeline step '{function}' failed: {message}")]
    Function { function: String, message: String },

    #[error("Invalid composite resource: {0}")]
    InvalidComposite(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CompositionError {
    pub fn function(function: &str, message: impl Into<String>) -> Self {
        Self::Function {
            function: function.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CompositionError>;
