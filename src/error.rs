//! Centralized error types for imapscrub.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal configuration problems. Raised before any mailbox I/O happens.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Cannot read config '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for our schema.
    #[error("Error parsing '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// No config path was given and none could be derived.
    #[error("No configuration file given and no default location available")]
    NotFound,

    /// Host, user or password missing.
    #[error("Please ensure host, user & password are set")]
    MissingCredentials,

    /// A rule without a mailbox.
    #[error("Rule #{rule}: you must specify a mailbox for every rule")]
    MissingMailbox { rule: usize },

    /// A rule without any action.
    #[error("Rule #{rule}: you must have at least one action per rule")]
    MissingActions { rule: usize },

    /// An action outside the fixed vocabulary.
    #[error("Rule #{rule}: \"{token}\" is not a valid action")]
    UnknownAction { rule: usize, token: String },

    /// `delete` combined with `remove_attachments`.
    #[error("Rule #{rule}: a rule cannot contain both remove_attachments and delete")]
    ConflictingActions { rule: usize },

    /// A `min_size` too large to express in bytes.
    #[error("Rule #{rule}: min_size of {kilobytes} KB is too large")]
    InvalidSize { rule: usize, kilobytes: u64 },
}

/// Failures while writing removed attachments to the local archive.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Nothing usable was left of the filename after sanitization.
    #[error("Filename '{0}' is empty after sanitization, not saving")]
    EmptyFilename(String),

    /// I/O error with the associated path.
    #[error("I/O error writing '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StorageError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Outcomes of the message rewriter that stop processing of one message.
///
/// `NoMessage`, `NoBody` and `NoAttachments` are informational: the message
/// is skipped but nothing went wrong.
#[derive(Error, Debug)]
pub enum TransformError {
    /// The server did not return the message.
    #[error("Server didn't return the message")]
    NoMessage,

    /// The server returned the message without its body.
    #[error("Server didn't return the message body")]
    NoBody,

    /// The message had no inspectable parts.
    #[error("No attachments")]
    NoAttachments,

    /// The message or one of its parts could not be parsed.
    #[error("MIME parse error: {0}")]
    Parse(String),

    /// The output writer rejected a part's character set.
    #[error("Unhandled charset \"{0}\"")]
    UnsupportedCharset(String),

    /// A builder operation was attempted in the wrong phase.
    #[error("Cannot {operation} while message builder is {phase}")]
    OutOfPhase {
        operation: &'static str,
        phase: &'static str,
    },

    /// Saving a removed attachment failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl TransformError {
    /// `true` for outcomes that mean "skip this message" rather than failure.
    pub fn is_informational(&self) -> bool {
        matches!(self, Self::NoMessage | Self::NoBody | Self::NoAttachments)
    }
}

/// A failure reported by the remote mailbox collaborator.
#[derive(Error, Debug)]
#[error("{operation} failed: {reason}")]
pub struct ProtocolError {
    /// The mailbox operation that failed (`search`, `fetch`, `append`, ...).
    pub operation: &'static str,
    /// Server or transport supplied reason.
    pub reason: String,
}

impl ProtocolError {
    pub fn new(operation: &'static str, reason: impl std::fmt::Display) -> Self {
        Self {
            operation,
            reason: reason.to_string(),
        }
    }
}
