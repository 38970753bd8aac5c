use thiserror::Error;

/// Errors reported by tree construction, the operation feed and snapshot export.
///
/// Looking up or deleting an absent key or value is not an error: those
/// operations simply report that nothing matched.
#[derive(Error, Debug)]
pub enum Error {
    #[error("order must be at least {min}, got {order}")]
    InvalidOrder { order: usize, min: usize },

    #[error("empty command")]
    EmptyCommand,

    #[error("unknown command `{0}`")]
    UnknownCommand(String),

    #[error("`{command}` takes {expected} argument(s), got {found}")]
    WrongArity {
        command: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("`{command}`: invalid argument `{argument}`")]
    InvalidArgument { command: &'static str, argument: String },

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
