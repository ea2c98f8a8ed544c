//! Contains the `Error` and `Result` types that `mongo-filestream` uses.

use std::time::Duration;

use mongodb::bson::oid::ObjectId;
use thiserror::Error;

/// The result type for all methods that can return an error in the
/// `mongo-filestream` crate.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while streaming file data to or from the store.
#[derive(Debug, Error)]
#[error("{kind}")]
#[non_exhaustive]
pub struct Error {
    /// The type of error that occurred.
    pub kind: Box<ErrorKind>,
}

impl Error {
    /// Whether the operation was stopped by its cancellation token or by an
    /// elapsed time budget.
    pub fn is_cancellation(&self) -> bool {
        matches!(
            *self.kind,
            ErrorKind::Cancelled | ErrorKind::TimedOut { .. }
        )
    }

    /// Whether the error was raised by a precondition check, before any I/O
    /// was attempted or state mutated.
    pub fn is_precondition(&self) -> bool {
        matches!(
            *self.kind,
            ErrorKind::UnsavedParent
                | ErrorKind::InvalidChunkSize { .. }
                | ErrorKind::SourceNotReadable
                | ErrorKind::DestinationNotWritable
                | ErrorKind::UploadIncomplete
        )
    }
}

impl<E> From<E> for Error
where
    ErrorKind: From<E>,
{
    fn from(err: E) -> Self {
        Self {
            kind: Box::new(err.into()),
        }
    }
}

/// The types of errors that can occur.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The parent file record has no identity yet. Save the entity through
    /// its own lifecycle before streaming data for it.
    #[error("the parent file record has not been saved yet")]
    UnsavedParent,

    /// The requested chunk size lies outside the supported range.
    #[error("chunk size must be between 128 KB and 4096 KB, got {kb} KB")]
    InvalidChunkSize {
        /// The rejected chunk size, in kilobytes.
        kb: u32,
    },

    /// The supplied source cannot produce bytes.
    #[error("the supplied source is not readable")]
    SourceNotReadable,

    /// The supplied destination cannot accept bytes.
    #[error("the supplied destination is not writable")]
    DestinationNotWritable,

    /// Download was attempted before a successful upload completed for this
    /// file record.
    #[error("data for this file has not been uploaded successfully yet")]
    UploadIncomplete,

    /// The source stream ended before producing a single byte. A zero-length
    /// payload is an error, not a valid empty file.
    #[error("the supplied source had no data to read")]
    EmptySource,

    /// The parent record claims a successful upload but no chunk records
    /// exist for it.
    #[error("no chunk data was found for file record {file_id}")]
    NoDataFound {
        /// Identity of the parent file record.
        file_id: ObjectId,
    },

    /// The operation's cancellation token was triggered mid-transfer.
    #[error("the operation was cancelled")]
    Cancelled,

    /// The operation's time budget elapsed mid-transfer.
    #[error("the operation did not complete within its {}ms time budget", .budget.as_millis())]
    TimedOut {
        /// The time budget that elapsed.
        budget: Duration,
    },

    /// An upload attempt failed and removing the chunks it had already
    /// written failed as well, leaving the chunk set inconsistent with the
    /// reconciled metadata.
    #[error("failed to remove chunks while aborting an upload: {delete_error}")]
    Abort {
        /// The error that aborted the upload, if the abort was not requested
        /// by the caller.
        original_error: Option<Box<Error>>,
        /// The error produced by the cleanup delete itself.
        delete_error: Box<Error>,
    },

    /// A cursor opened inside a transaction was advanced without its session.
    #[error("invalid transaction usage: {message}")]
    Transaction {
        /// A description of the misuse.
        message: String,
    },

    /// An I/O failure reading from the source or writing to the destination.
    #[error("I/O failure during transfer: {0}")]
    Io(#[from] std::io::Error),

    /// An error produced by the underlying store.
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cancellation_predicate_covers_both_stop_kinds() {
        let cancelled = Error::from(ErrorKind::Cancelled);
        let timed_out = Error::from(ErrorKind::TimedOut {
            budget: Duration::from_secs(3),
        });
        let unsaved = Error::from(ErrorKind::UnsavedParent);

        assert!(cancelled.is_cancellation());
        assert!(timed_out.is_cancellation());
        assert!(!unsaved.is_cancellation());
        assert!(unsaved.is_precondition());
    }
}
