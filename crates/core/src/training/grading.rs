//! Grading of submitted moves against engine analysis

use serde::Serialize;
use shakmaty::Chess;
use std::future::Future;
use std::sync::atomic::{self, AtomicI32};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::board;
use crate::engine::{CandidateLine, EvaluationScore};
use crate::error::{Error, Result};

/// Something that can run a fresh analysis of a position
pub trait Analyse {
    fn analyse(
        &self,
        position: &Chess,
        lines: usize,
        budget: Duration,
    ) -> impl Future<Output = Result<Vec<CandidateLine>>> + Send;
}

/// Decides whether `submitted` is as good as `top`.
///
/// Centipawn scores match within `tolerance_cp`. Mate scores match when
/// both favour the same side (or both are zero). Mixed kinds and missing
/// scores never match.
pub fn is_correct(
    top: Option<EvaluationScore>,
    submitted: Option<EvaluationScore>,
    tolerance_cp: i32,
) -> bool {
    match (top, submitted) {
        (Some(EvaluationScore::Centipawns(top)), Some(EvaluationScore::Centipawns(submitted))) => {
            (top - submitted).abs() <= tolerance_cp
        }
        (Some(top @ EvaluationScore::Mate(_)), Some(submitted @ EvaluationScore::Mate(_))) => {
            top.sign_class() == submitted.sign_class()
        }
        _ => false,
    }
}

/// Learner score, shared between requests
#[derive(Debug)]
pub struct Scoreboard {
    score: AtomicI32,
}

impl Scoreboard {
    pub fn new(starting: i32) -> Self {
        Self {
            score: AtomicI32::new(starting),
        }
    }

    pub fn score(&self) -> i32 {
        self.score.load(atomic::Ordering::SeqCst)
    }

    /// Adds `delta` and returns the new score
    pub fn apply(&self, delta: i32) -> i32 {
        self.score.fetch_add(delta, atomic::Ordering::SeqCst) + delta
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GradingPolicy {
    pub tolerance_cp: i32,
    pub reward: i32,
    pub penalty: i32,
    pub timeout_penalty: i32,
    /// Budget for evaluating a move that is not among the candidates
    pub budget: Duration,
}

impl Default for GradingPolicy {
    fn default() -> Self {
        Self {
            tolerance_cp: 50,
            reward: 10,
            penalty: 10,
            timeout_penalty: 20,
            budget: Duration::from_secs(10),
        }
    }
}

/// Result of grading one submission
#[derive(Debug, Clone, Serialize)]
pub struct GradeOutcome {
    pub correct: bool,
    pub score_delta: i32,
    pub score: i32,
    /// The move as submitted, in standard notation when it was legal
    pub submitted: String,
    pub top: Option<EvaluationScore>,
    pub evaluation: Option<EvaluationScore>,
    /// Candidate moves in rank order, filled in when the move was wrong
    pub best_moves: Vec<String>,
}

pub struct Grader {
    policy: GradingPolicy,
}

impl Grader {
    pub fn new(policy: GradingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GradingPolicy {
        &self.policy
    }

    /// Grades `submitted` (SAN or UCI) played in `base`, against the
    /// candidates the engine produced for `base`.
    ///
    /// Anything that prevents an evaluation grades the move incorrect.
    pub async fn grade<A: Analyse>(
        &self,
        analyser: &A,
        scoreboard: &Scoreboard,
        base: &Chess,
        candidates: &[CandidateLine],
        submitted: &str,
    ) -> GradeOutcome {
        let mut ranked: Vec<&CandidateLine> = candidates.iter().collect();
        ranked.sort_by_key(|line| line.rank);
        let top = ranked.first().map(|line| line.score);

        let (notation, evaluation) = match self.evaluate(analyser, base, &ranked, submitted).await {
            Ok((notation, score)) => (notation, Some(score)),
            Err(e) => {
                warn!(submitted, "grading indeterminate: {}", e);
                (submitted.to_string(), None)
            }
        };

        let correct = is_correct(top, evaluation, self.policy.tolerance_cp);
        let score_delta = if correct {
            self.policy.reward
        } else {
            -self.policy.penalty
        };
        let score = scoreboard.apply(score_delta);
        info!(
            submitted = notation.as_str(),
            correct,
            score,
            "graded move"
        );

        let best_moves = if correct {
            Vec::new()
        } else {
            ranked.iter().map(|line| line.notation.clone()).collect()
        };

        GradeOutcome {
            correct,
            score_delta,
            score,
            submitted: notation,
            top,
            evaluation,
            best_moves,
        }
    }

    /// Applies the timeout penalty and returns the new score
    pub fn expire(&self, scoreboard: &Scoreboard) -> i32 {
        let score = scoreboard.apply(-self.policy.timeout_penalty);
        info!(score, "exercise timed out");
        score
    }

    /// Finds the evaluation of the submitted move from the side that
    /// played it
    async fn evaluate<A: Analyse>(
        &self,
        analyser: &A,
        base: &Chess,
        ranked: &[&CandidateLine],
        submitted: &str,
    ) -> Result<(String, EvaluationScore)> {
        let Some(top) = ranked.first() else {
            return Err(Error::GradingIndeterminate("no analysis to compare against".into()));
        };

        let (after, notation) = board::apply_move(base, submitted)?;

        if same_move(&notation, top) {
            return Ok((notation, top.score));
        }
        if let Some(line) = ranked.iter().find(|line| same_move(&notation, line)) {
            debug!(rank = line.rank, "submitted move is a listed candidate");
            return Ok((notation, line.score));
        }

        debug!(submitted = notation.as_str(), "evaluating move outside the candidates");
        let reply = analyser.analyse(&after, 1, self.policy.budget).await?;
        let best_reply = reply
            .iter()
            .min_by_key(|line| line.rank)
            .ok_or_else(|| Error::GradingIndeterminate(format!("no evaluation after {}", notation)))?;

        // The reply is scored for the opponent
        Ok((notation, best_reply.score.negate()))
    }
}

fn same_move(notation: &str, line: &CandidateLine) -> bool {
    line.notation == notation
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedAnalyser {
        reply: Option<EvaluationScore>,
        calls: Mutex<Vec<String>>,
    }

    impl FixedAnalyser {
        fn new(reply: Option<EvaluationScore>) -> Self {
            Self {
                reply,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl Analyse for FixedAnalyser {
        fn analyse(
            &self,
            position: &Chess,
            _lines: usize,
            _budget: Duration,
        ) -> impl Future<Output = Result<Vec<CandidateLine>>> + Send {
            self.calls.lock().unwrap().push(board::serialize(position));
            let lines = self
                .reply
                .map(|score| {
                    vec![CandidateLine {
                        rank: 1,
                        notation: "e5".to_string(),
                        score,
                        depth: Some(10),
                        pv: vec!["e7e5".to_string()],
                    }]
                })
                .unwrap_or_default();
            async move { Ok(lines) }
        }
    }

    fn line(rank: u32, notation: &str, score: EvaluationScore) -> CandidateLine {
        CandidateLine {
            rank,
            notation: notation.to_string(),
            score,
            depth: Some(20),
            pv: Vec::new(),
        }
    }

    fn candidates() -> Vec<CandidateLine> {
        vec![
            line(2, "d4", EvaluationScore::Centipawns(20)),
            line(1, "e4", EvaluationScore::Centipawns(35)),
            line(3, "c4", EvaluationScore::Centipawns(-40)),
        ]
    }

    #[test]
    fn test_is_correct() {
        use EvaluationScore::*;
        assert!(is_correct(Some(Centipawns(35)), Some(Centipawns(35)), 50));
        assert!(is_correct(Some(Centipawns(35)), Some(Centipawns(-15)), 50));
        assert!(!is_correct(Some(Centipawns(35)), Some(Centipawns(-16)), 50));
        assert!(is_correct(Some(Mate(3)), Some(Mate(7)), 50));
        assert!(!is_correct(Some(Mate(3)), Some(Mate(-1)), 50));
        assert!(is_correct(Some(Mate(0)), Some(Mate(0)), 50));
        assert!(!is_correct(Some(Mate(2)), Some(Centipawns(900)), 50));
        assert!(!is_correct(Some(Centipawns(900)), Some(Mate(2)), 50));
        assert!(!is_correct(None, Some(Centipawns(0)), 50));
        assert!(!is_correct(Some(Centipawns(0)), None, 50));
    }

    #[test]
    fn test_tolerance_boundary() {
        use EvaluationScore::*;
        assert!(is_correct(Some(Centipawns(100)), Some(Centipawns(150)), 50));
        assert!(!is_correct(Some(Centipawns(100)), Some(Centipawns(151)), 50));
    }

    #[test]
    fn test_mate_sign_class() {
        use EvaluationScore::*;
        assert!(is_correct(Some(Mate(3)), Some(Mate(1)), 50));
        assert!(!is_correct(Some(Mate(3)), Some(Mate(-1)), 50));
    }

    #[test]
    fn test_scoreboard() {
        let scoreboard = Scoreboard::new(1000);
        assert_eq!(scoreboard.apply(10), 1010);
        assert_eq!(scoreboard.apply(-20), 990);
        assert_eq!(scoreboard.score(), 990);
    }

    #[tokio::test]
    async fn test_top_move_is_correct() {
        let grader = Grader::new(GradingPolicy::default());
        let scoreboard = Scoreboard::new(1000);
        let analyser = FixedAnalyser::new(None);

        let outcome = grader
            .grade(&analyser, &scoreboard, &Chess::default(), &candidates(), "e2e4")
            .await;

        assert!(outcome.correct);
        assert_eq!(outcome.submitted, "e4");
        assert_eq!(outcome.score_delta, 10);
        assert_eq!(outcome.score, 1010);
        assert!(outcome.best_moves.is_empty());
        assert!(analyser.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_listed_candidate_within_tolerance() {
        let grader = Grader::new(GradingPolicy::default());
        let scoreboard = Scoreboard::new(1000);
        let analyser = FixedAnalyser::new(None);

        let good = grader
            .grade(&analyser, &scoreboard, &Chess::default(), &candidates(), "d4")
            .await;
        assert!(good.correct);
        assert_eq!(good.evaluation, Some(EvaluationScore::Centipawns(20)));

        let bad = grader
            .grade(&analyser, &scoreboard, &Chess::default(), &candidates(), "c4")
            .await;
        assert!(!bad.correct);
        assert_eq!(bad.score_delta, -10);
        assert_eq!(bad.best_moves, vec!["e4", "d4", "c4"]);
        assert_eq!(scoreboard.score(), 1000);
    }

    #[tokio::test]
    async fn test_unlisted_move_is_analysed_from_the_other_side() {
        let grader = Grader::new(GradingPolicy::default());
        let scoreboard = Scoreboard::new(1000);
        // Black's best reply is worth -10 to Black, so +10 for White
        let analyser = FixedAnalyser::new(Some(EvaluationScore::Centipawns(-10)));

        let outcome = grader
            .grade(&analyser, &scoreboard, &Chess::default(), &candidates(), "Nf3")
            .await;

        assert_eq!(outcome.evaluation, Some(EvaluationScore::Centipawns(10)));
        assert!(outcome.correct);
        let calls = analyser.calls.lock().unwrap();
        assert_eq!(
            calls.as_slice(),
            ["rnbqkbnr/pppppppp/8/8/8/5N2/PPPPPPPP/RNBQKB1R b KQkq - 1 1"]
        );
    }

    #[tokio::test]
    async fn test_unavailable_evaluation_is_incorrect() {
        let grader = Grader::new(GradingPolicy::default());
        let scoreboard = Scoreboard::new(1000);
        let analyser = FixedAnalyser::new(None);

        let outcome = grader
            .grade(&analyser, &scoreboard, &Chess::default(), &candidates(), "a3")
            .await;
        assert!(!outcome.correct);
        assert_eq!(outcome.evaluation, None);
        assert_eq!(outcome.score, 990);
    }

    #[tokio::test]
    async fn test_illegal_move_is_incorrect() {
        let grader = Grader::new(GradingPolicy::default());
        let scoreboard = Scoreboard::new(1000);
        let analyser = FixedAnalyser::new(Some(EvaluationScore::Centipawns(0)));

        let outcome = grader
            .grade(&analyser, &scoreboard, &Chess::default(), &candidates(), "Ke2")
            .await;
        assert!(!outcome.correct);
        assert_eq!(outcome.submitted, "Ke2");
        assert!(analyser.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_candidates_is_incorrect() {
        let grader = Grader::new(GradingPolicy::default());
        let scoreboard = Scoreboard::new(1000);
        let analyser = FixedAnalyser::new(Some(EvaluationScore::Centipawns(0)));

        let outcome = grader
            .grade(&analyser, &scoreboard, &Chess::default(), &[], "e4")
            .await;
        assert!(!outcome.correct);
        assert!(analyser.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_expire() {
        let grader = Grader::new(GradingPolicy::default());
        let scoreboard = Scoreboard::new(1000);
        assert_eq!(grader.expire(&scoreboard), 980);
    }
}
