use thiserror::Error;

use super::route::RouteOrderingError;
use crate::discovery::DiscoveryError;

pub type CurationResult<T> = Result<T, CurationError>;

#[derive(Debug, Clone, Error)]
pub enum CurationError {
    #[error("{message}")]
    Discovery {
        message: String,
        #[source]
        source: DiscoveryError,
    },
    #[error("{message}")]
    NothingFound { message: String },
    #[error("generation {request_id} was superseded or reset")]
    Superseded { request_id: uuid::Uuid },
    #[error("no curated set available (phase: {phase})")]
    NotReady { phase: String },
    #[error(transparent)]
    RouteOrdering(#[from] RouteOrderingError),
}
