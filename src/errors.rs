//! # Error Types Module
//!
//! Error taxonomy for a single conversational turn. None of these are fatal
//! to the process: the handler boundary turns every variant into a chat reply.

use thiserror::Error;

/// Failures while fetching or parsing a remote sheet (roster, region dataset, fiber dataset)
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Network-level failure (DNS, connect, timeout, body read)
    #[error("request to {url} failed: {message}")]
    Fetch { url: String, message: String },
    /// Server answered with a non-success status
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    /// Payload is not a readable CSV table
    #[error("failed to parse table from {url}: {message}")]
    Parse { url: String, message: String },
    /// A column required by the schema is absent
    #[error("column \"{0}\" is missing")]
    MissingColumn(String),
}

/// Outcome classes of a turn, as seen by the user
#[derive(Debug, Error)]
pub enum BotError {
    /// User is not on the roster (or not on the allow-list)
    #[error("user is not authorized")]
    Unauthorized,
    /// Roster or dataset could not be loaded
    #[error("data source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
    /// Lookup ran but no row matched
    #[error("no matching record")]
    NotFound,
    /// Text does not fit what the current mode expects
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
