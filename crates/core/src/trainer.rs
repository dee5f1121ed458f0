//! Facade tying the database, engine and grading together

use shakmaty::Chess;
use std::time::Duration;
use tracing::info;

use crate::config::TrainerConfig;
use crate::engine::{analyse, AnalysisRequest, AnalysisTiming, CandidateLine, EngineManager};
use crate::error::Result;
use crate::parser::{load_database, GameRecord};
use crate::training::{pick_exercise, Analyse, Exercise, GradeOutcome, Grader, MoveInterval, Scoreboard};

pub struct Trainer {
    config: TrainerConfig,
    engine: EngineManager,
    grader: Grader,
    scoreboard: Scoreboard,
    timing: AnalysisTiming,
}

impl Trainer {
    /// Builds a trainer whose engine comes from the configured sources
    pub fn new(config: TrainerConfig) -> Self {
        let engine = EngineManager::new(config.engine_sources());
        Self::with_engine(config, engine)
    }

    pub fn with_engine(config: TrainerConfig, engine: EngineManager) -> Self {
        let grader = Grader::new(config.grading_policy());
        let scoreboard = Scoreboard::new(config.starting_score);
        Self {
            config,
            engine,
            grader,
            scoreboard,
            timing: AnalysisTiming::default(),
        }
    }

    pub fn with_timing(mut self, timing: AnalysisTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn engine(&self) -> &EngineManager {
        &self.engine
    }

    /// Parses a PGN database
    pub fn load_database(&self, text: &str) -> Vec<GameRecord> {
        let games = load_database(text);
        info!(games = games.len(), "database loaded");
        games
    }

    /// Picks an exercise for the configured learner colour
    pub fn pick_exercise(
        &self,
        games: &[GameRecord],
        interval: Option<MoveInterval>,
    ) -> Result<Exercise> {
        pick_exercise(games, interval, self.config.learner, &mut rand::rng())
    }

    /// Runs the exercise analysis with the configured line count and budget
    pub async fn analyse_exercise<F>(
        &self,
        exercise: &Exercise,
        on_snapshot: F,
    ) -> Result<Vec<CandidateLine>>
    where
        F: FnMut(&[CandidateLine]) + Send,
    {
        self.start_analysis(
            exercise.position.clone(),
            self.config.exercise_lines,
            self.config.exercise_budget,
            on_snapshot,
        )
        .await
    }

    /// Analyses `position`, acquiring the engine first if needed
    pub async fn start_analysis<F>(
        &self,
        position: Chess,
        lines: usize,
        budget: Duration,
        on_snapshot: F,
    ) -> Result<Vec<CandidateLine>>
    where
        F: FnMut(&[CandidateLine]) + Send,
    {
        let connection = self.engine.connection().await?;
        let request = AnalysisRequest::new(position, lines, budget);
        analyse(&connection, &request, &self.timing, on_snapshot).await
    }

    /// Advisory stop of the running analysis
    pub async fn stop_analysis(&self) -> bool {
        self.engine.stop().await
    }

    /// Grades a move submitted for `base` against its candidates
    pub async fn grade(
        &self,
        base: &Chess,
        candidates: &[CandidateLine],
        submitted: &str,
    ) -> GradeOutcome {
        self.grader
            .grade(self, &self.scoreboard, base, candidates, submitted)
            .await
    }

    /// Applies the timeout penalty and returns the new score
    pub fn expire(&self) -> i32 {
        self.grader.expire(&self.scoreboard)
    }

    pub fn score(&self) -> i32 {
        self.scoreboard.score()
    }
}

impl Analyse for Trainer {
    async fn analyse(
        &self,
        position: &Chess,
        lines: usize,
        budget: Duration,
    ) -> Result<Vec<CandidateLine>> {
        self.start_analysis(position.clone(), lines, budget, |_| {})
            .await
    }
}
