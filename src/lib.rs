pub mod config;
pub mod engine;
pub mod evaluators;
pub mod message;
pub mod narrative;
pub mod report;
pub mod reputation;
pub mod scoring;
pub mod signals;

pub use config::EngineConfig;
pub use engine::ScoringEngine;
pub use evaluators::{SignalId, SignalResult};
pub use message::{Link, MessageRecord, Recipient};
pub use report::{ReportRecord, RiskAssessment, RunSummary};
pub use reputation::{DomainReputation, ReputationChecker};
pub use scoring::RiskTier;
