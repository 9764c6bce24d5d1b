//! Crate-wide error and result types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Operator(#[from] OperatorError),

    /// Broken internal invariant, e.g. the index writer channel closing
    /// while crawls are still running.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error should surface to an API client verbatim.
    pub fn is_operator(&self) -> bool {
        matches!(self, Error::Operator(_))
    }
}

/// Errors caused by operator input rather than by a failing subsystem.
/// The messages are part of the API contract and surface unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperatorError {
    #[error("indexing is already running")]
    IndexingAlreadyRunning,

    #[error("indexing is not running")]
    IndexingNotRunning,

    #[error("page is outside of the configured sites")]
    PageOutsideConfiguredSites,

    #[error("pages of type \"{0}\" are not indexed")]
    UnsupportedContent(String),

    #[error("could not extract any search terms from the query")]
    EmptyQuery,

    #[error("nothing found for this query")]
    NothingFound,

    #[error("no indexed sites to search")]
    NoSitesToSearch,
}
