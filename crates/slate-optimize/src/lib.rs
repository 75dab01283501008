//! Slate Optimize
//!
//! Schedule generation on top of `slate-core`: six strategies behind one
//! [`Strategy`] trait, a selector that picks between them, sport defaults,
//! post-optimization passes, and the [`Orchestrator`] that ties them
//! together with best-effort external collaborators.

pub mod augment;
pub mod constraints;
pub mod error;
pub mod insights;
pub mod orchestrator;
pub mod passes;
pub mod quality;
pub mod selector;
pub mod strategy;

pub use augment::augment_constraints;
pub use constraints::SchedulingConstraints;
pub use error::{OptimizeError, OptimizeResult};
pub use insights::{
    CollaboratorError, FailingInsights, FailingSuggestions, HistoricalInsight, InsightProvider,
    StaticInsights, StaticSuggestions, Suggestion, SuggestionRequest, SuggestionService,
};
pub use orchestrator::{CandidateReport, OptimizationOutcome, OptimizationRequest, Orchestrator};
pub use passes::{apply_patch, standard_passes, PassPatch, PassReport, PostPass};
pub use quality::{QualityModel, QualityReport};
pub use selector::select_algorithm;
pub use strategy::{
    adopt_plan, circle_plan, strategy_for, validate_teams, Algorithm, Plan, Round, Strategy,
    StrategyMetadata, StrategyOutput, StrategyRequest,
};
