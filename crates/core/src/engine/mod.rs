//! UCI engine integration

pub mod analysis;
pub mod evaluation;
pub mod info;
pub mod link;
pub mod scripted;
pub mod session;

pub use analysis::{analyse, AnalysisRequest, AnalysisTiming, CandidateLine};
pub use evaluation::EvaluationScore;
pub use info::InfoRecord;
pub use link::{EngineEndpoint, EngineLink};
pub use scripted::{CommandJournal, ScriptedEngine};
pub use session::{EngineConnection, EngineManager, EngineSource};
