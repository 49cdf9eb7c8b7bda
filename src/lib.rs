// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod config;
pub mod domains;
pub mod engine;
pub mod error;
pub mod features;
pub mod feedback;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod retrain;
pub mod rules;
pub mod store;
pub mod telemetry;
pub mod training;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::engine::{ScoreEngine, ScoringRequest, ScoringResult};
pub use crate::error::{CredibilityError, Result};
pub use crate::feedback::{FeedbackRecord, Label};
pub use crate::model::ModelArtifact;
pub use crate::retrain::Retrainer;
pub use crate::store::ModelHandle;
