pub mod actions;
pub mod catalog;
pub mod classifier;
pub mod config;
pub mod document;
pub mod error;
pub mod matching;
pub mod runner;
pub mod scheduler;
pub mod template;
pub mod trigger;
pub mod workflow;

pub use actions::{ActionExecutor, ActionResult, ActionStatus};
pub use catalog::{Catalog, EntityKind};
pub use classifier::{CandidateResolver, ClassificationOutcome, Suggestions};
pub use config::EngineConfig;
pub use document::{Document, DocumentEvent, EventType, Source};
pub use error::EngineError;
pub use matching::{AutoScorer, MatchAlgorithm, MatchEvaluator, MatchOutcome, MatchRule};
pub use runner::WorkflowRunner;
pub use trigger::TriggerFilter;
pub use workflow::{Workflow, WorkflowDefinitions, WorkflowLog};
