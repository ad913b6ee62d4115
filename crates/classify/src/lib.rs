//! Sentinel: the Risk Classifier (spec §4.3).
//!
//! A deterministic, table-driven function from an activity plus an agent
//! snapshot to a `RiskAssessment`. No I/O, no async -- CPU-only, per
//! spec §5's concurrency model.

pub mod classifier;

pub use classifier::{AgentSnapshot, ClassifierConfig, ClassifyInput, RiskClassifier};
