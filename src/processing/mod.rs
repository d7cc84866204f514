//! Symptom and disease pipelines composed on the batch orchestrator.

pub mod batch;
pub mod diseases;
pub mod notes;
mod service;
pub mod symptoms;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;

pub use batch::{AggregateReport, BatchError, BatchPolicy, OnBatchError, Outcome, Pacing};
pub use service::{ProcessingApi, ProcessingService, ServiceInitError};
pub use symptoms::SearchSettings;
pub use types::{
    DiseaseBatchReport, DiseaseError, DiseaseInput, DiseaseMatch, DiseasesMatchReport,
    MultiSearchReport, PipelineError, SearchResult, SymptomError, SymptomInput, VectorizeReport,
};
