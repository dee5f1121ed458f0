//! Trainer configuration

use shakmaty::Color;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineSource;
use crate::error::{Error, Result};
use crate::training::GradingPolicy;

/// Shortest accepted exercise clock; anything below falls back to the default
const MIN_EXERCISE_SECONDS: u64 = 5;
const FALLBACK_EXERCISE_SECONDS: u64 = 30;

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Engine binary tried first
    pub engine_path: PathBuf,
    /// Local binaries the bootstrap loader looks for
    pub bootstrap_candidates: Vec<PathBuf>,
    /// Download URLs, used by the bootstrap loader and as remote sources
    pub mirrors: Vec<String>,
    /// Colour the learner plays
    pub learner: Color,
    /// Candidate lines requested for an exercise
    pub exercise_lines: usize,
    pub exercise_budget: Duration,
    pub free_budget: Duration,
    pub grading_budget: Duration,
    pub exercise_seconds: u64,
    pub starting_score: i32,
    pub tolerance_cp: i32,
    pub reward: i32,
    pub penalty: i32,
    pub timeout_penalty: i32,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            engine_path: PathBuf::from("stockfish"),
            bootstrap_candidates: vec![
                PathBuf::from("./stockfish"),
                PathBuf::from("./engine/stockfish"),
                PathBuf::from("./engine/stockfish-ubuntu-x86-64"),
            ],
            mirrors: Vec::new(),
            learner: Color::White,
            exercise_lines: 3,
            exercise_budget: Duration::from_millis(10_000),
            free_budget: Duration::from_millis(60_000),
            grading_budget: Duration::from_millis(10_000),
            exercise_seconds: 120,
            starting_score: 1000,
            tolerance_cp: 50,
            reward: 10,
            penalty: 10,
            timeout_penalty: 20,
        }
    }
}

impl TrainerConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`TrainerConfig::from_env`] with a custom variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let engine_path = lookup("STOCKFISH_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.engine_path);

        let bootstrap_candidates = lookup("ENGINE_BOOTSTRAP")
            .map(|v| split_list(&v).into_iter().map(PathBuf::from).collect())
            .unwrap_or(defaults.bootstrap_candidates);

        let mirrors = lookup("ENGINE_MIRRORS")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.mirrors);

        let learner = match lookup("LEARNER_COLOR") {
            Some(v) => parse_color(&v)?,
            None => defaults.learner,
        };

        let exercise_lines = lookup("MULTIPV")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|lines| *lines > 0)
            .unwrap_or(defaults.exercise_lines);

        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let exercise_budget = millis("EXERCISE_ANALYSIS_MS", defaults.exercise_budget);
        let free_budget = millis("FREE_ANALYSIS_MS", defaults.free_budget);
        let grading_budget = millis("GRADING_ANALYSIS_MS", defaults.grading_budget);

        let exercise_seconds = lookup("EXERCISE_SECONDS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| {
                if secs < MIN_EXERCISE_SECONDS {
                    FALLBACK_EXERCISE_SECONDS
                } else {
                    secs
                }
            })
            .unwrap_or(defaults.exercise_seconds);

        let starting_score = lookup("START_SCORE")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.starting_score);

        let tolerance_cp = lookup("EVAL_TOLERANCE_CP")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.tolerance_cp);

        Ok(Self {
            engine_path,
            bootstrap_candidates,
            mirrors,
            learner,
            exercise_lines,
            exercise_budget,
            free_budget,
            grading_budget,
            exercise_seconds,
            starting_score,
            tolerance_cp,
            ..defaults
        })
    }

    /// Engine sources in the order they are tried: local binary, bootstrap
    /// loader, then each mirror directly
    pub fn engine_sources(&self) -> Vec<EngineSource> {
        let mut sources = vec![
            EngineSource::binary(self.engine_path.clone()),
            EngineSource::Bootstrap {
                candidates: self.bootstrap_candidates.clone(),
                mirrors: self.mirrors.clone(),
            },
        ];
        sources.extend(
            self.mirrors
                .iter()
                .map(|url| EngineSource::Remote { url: url.clone() }),
        );
        sources
    }

    pub fn grading_policy(&self) -> GradingPolicy {
        GradingPolicy {
            tolerance_cp: self.tolerance_cp,
            reward: self.reward,
            penalty: self.penalty,
            timeout_penalty: self.timeout_penalty,
            budget: self.grading_budget,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn parse_color(value: &str) -> Result<Color> {
    match value.trim().to_ascii_lowercase().as_str() {
        "white" | "w" => Ok(Color::White),
        "black" | "b" => Ok(Color::Black),
        other => Err(Error::Config(format!("unknown learner colour '{}'", other))),
    }
}
