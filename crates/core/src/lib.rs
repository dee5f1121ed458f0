//! Position Trainer Core Library
//!
//! Loads PGN databases, samples training positions from them, runs a UCI
//! engine over those positions and grades the learner's answers.

pub mod board;
pub mod config;
pub mod engine;
pub mod error;
pub mod parser;
pub mod trainer;
pub mod training;

pub use config::TrainerConfig;
pub use engine::{CandidateLine, EngineManager, EngineSource, EvaluationScore, ScriptedEngine};
pub use error::{Error, Result};
pub use parser::GameRecord;
pub use trainer::Trainer;
pub use training::{Exercise, GradeOutcome, MoveInterval};
