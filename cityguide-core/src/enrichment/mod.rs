mod pipeline;
mod provider;
mod wikipedia;

pub use pipeline::{
    EnrichmentConfig, EnrichmentItemFailure, EnrichmentPipeline, EnrichmentProgress,
    EnrichmentReport, DEFAULT_BATCH_SIZE,
};
pub use provider::{
    EnrichmentContext, EnrichmentItemError, EnrichmentPayload, EnrichmentProvider,
};
pub use wikipedia::WikipediaEnricher;
