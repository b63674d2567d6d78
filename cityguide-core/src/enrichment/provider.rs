use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::NetworkError;
use crate::poi::{EnrichmentStatus, Poi};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentContext {
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentPayload {
    pub summary: Option<String>,
    pub image_url: Option<String>,
    pub link: Option<String>,
}

/// Outcome of a single item; never propagated beyond the pipeline.
#[derive(Debug, Clone, Error)]
pub enum EnrichmentItemError {
    #[error("no supplementary data found")]
    NotFound,
    #[error("enrichment request failed: {0}")]
    Network(#[from] NetworkError),
}

impl EnrichmentItemError {
    pub fn status(&self) -> EnrichmentStatus {
        match self {
            EnrichmentItemError::NotFound => EnrichmentStatus::NotFound,
            EnrichmentItemError::Network(_) => EnrichmentStatus::Failed,
        }
    }
}

#[async_trait]
pub trait EnrichmentProvider: Send + Sync {
    async fn enrich(
        &self,
        poi: &Poi,
        context: &EnrichmentContext,
    ) -> Result<EnrichmentPayload, EnrichmentItemError>;
}
