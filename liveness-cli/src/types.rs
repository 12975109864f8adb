//! Shared types for liveness-cli.

use liveness_core::LivenessReport;
use serde::Serialize;

/// One output entry: the image path plus its verdict or error.
#[derive(Debug, Serialize)]
pub struct ScoreRecord {
    pub image: String,
    #[serde(flatten)]
    pub report: LivenessReport,
}
