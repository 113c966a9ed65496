use thiserror::Error;

/// Errors raised while building or combining mass-composition data.
#[derive(Debug, Error)]
pub enum MassCompositionError {
    #[error("shape mismatch: expected {rows}x{cols} values, found {len}")]
    ShapeMismatch { rows: usize, cols: usize, len: usize },

    #[error("column '{0}' not found")]
    MissingColumn(String),

    #[error("variable '{0}' is detected more than once")]
    DuplicateVariable(String),

    #[error("dry mass cannot be resolved for '{0}': supply mass_dry, or mass_wet with moisture")]
    MissingMass(String),

    #[error("indexes do not match: {0}")]
    IndexMismatch(String),

    #[error("variables do not match: {0}")]
    VariableMismatch(String),

    #[error("stream '{0}' does not have the node property set")]
    MissingNodes(String),

    #[error("'{0}' is not found on the network")]
    UnknownStream(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MassCompositionError>;
