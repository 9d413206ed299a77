use thiserror::Error;

/// Fatal backend failures. None of these are caused by the user's program; they indicate that an
/// upstream phase handed over malformed input or that the allocator itself is broken.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("malformed IR: {0}")]
    MalformedIr(String),

    #[error("no frame access recorded for variable `{0}`")]
    MissingAccess(String),

    #[error("register allocation for `{function}` did not converge: {reason}")]
    NonConvergence { function: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = BackendError> = std::result::Result<T, E>;
