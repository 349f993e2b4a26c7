use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for all jarscope operations.
#[derive(Debug, Error, Diagnostic)]
pub enum JarscopeError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or malformed configuration (services document, path template).
    #[error("Config error: {message}")]
    #[diagnostic(help("Check the services config document for missing fields or bad placeholders"))]
    Config { message: String },

    /// Remote listing or fetch failed (SSH connect/auth/read, unreadable local path).
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// A text payload could not be decoded with any of the fallback encodings.
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// The external decompiler exited non-zero or timed out.
    #[error("Decompile failed: {message}")]
    Decompile { message: String },

    /// The relational store rejected an operation.
    #[error("Store error: {message}")]
    Store { message: String },

    /// A post-stage integrity check found inconsistent rows.
    #[error("Invariant violated: {message}")]
    #[diagnostic(help("The store is in an inconsistent state; operator intervention is required"))]
    Invariant { message: String },
}

/// Convenience alias for `miette::Result<T>`.
pub type JarscopeResult<T> = miette::Result<T>;
