//! Exercise selection
//!
//! Picks a random game from the database, replays it to a random ply
//! inside the requested move interval, and hands the position over with
//! the learner's colour to move.

use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use shakmaty::{Chess, Color};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::board;
use crate::error::{Error, Result};
use crate::parser::{is_san_like, GameRecord};

/// Games sampled before giving up on an interval
const MAX_ATTEMPTS: usize = 500;

static INTERVAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)\s*-\s*(\d+)\s*$").unwrap());

/// Inclusive range of full-move numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveInterval {
    pub lo: u32,
    pub hi: u32,
}

impl MoveInterval {
    /// Normalizes to `1 <= lo <= hi`
    pub fn new(lo: u32, hi: u32) -> Self {
        let lo = lo.max(1);
        Self { lo, hi: hi.max(lo) }
    }

    /// Parses `"lo-hi"`; anything else means no interval
    pub fn parse(text: &str) -> Option<Self> {
        let caps = INTERVAL.captures(text)?;
        let lo = caps[1].parse().ok()?;
        let hi = caps[2].parse().ok()?;
        Some(Self::new(lo, hi))
    }
}

impl FromStr for MoveInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::Config(format!("invalid move interval '{}'", s)))
    }
}

impl fmt::Display for MoveInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

/// A position handed to the learner
#[derive(Debug, Clone)]
pub struct Exercise {
    /// Index of the source game in the database
    pub game_index: usize,
    /// Zero-based ply the game was replayed through, `None` for the
    /// opening position
    pub target_ply: Option<usize>,
    pub full_move: Option<u32>,
    pub position: Chess,
    pub fen: String,
}

/// Zero-based index of the last ply replayed for an exercise at
/// `full_move`: the opponent's move just before the learner's turn.
pub fn target_ply(full_move: u32, learner: Color) -> usize {
    let full = full_move.max(1) as usize;
    match learner {
        Color::White => 2 * full - 1,
        Color::Black => 2 * full - 2,
    }
}

/// Picks an exercise from `games`.
///
/// Without an interval any game will do and the exercise is the opening
/// position. With one, games whose length does not reach `interval.lo`
/// are resampled, at most `MAX_ATTEMPTS` times.
pub fn pick_exercise<R: Rng + ?Sized>(
    games: &[GameRecord],
    interval: Option<MoveInterval>,
    learner: Color,
    rng: &mut R,
) -> Result<Exercise> {
    if games.is_empty() {
        return Err(Error::NoDatabase);
    }
    if interval.is_some_and(|interval| interval.lo > interval.hi) {
        return Err(Error::NoMatchingGame);
    }

    for _ in 0..MAX_ATTEMPTS {
        let game_index = rng.random_range(0..games.len());
        let record = &games[game_index];
        let tokens = record.tokens();
        if tokens.is_empty() {
            continue;
        }

        let Some(interval) = interval else {
            return Ok(build_exercise(game_index, None, None, Chess::default(), learner));
        };

        let max_full = record.full_moves();
        if interval.lo > max_full {
            continue;
        }

        let full_move = rng.random_range(interval.lo..=interval.hi.min(max_full));
        let ply = target_ply(full_move, learner);
        let replayed = replay_through(tokens, ply);

        debug!(
            game = game_index,
            white = record.header("White").unwrap_or("?"),
            black = record.header("Black").unwrap_or("?"),
            full_move,
            ply,
            "picked exercise"
        );
        return Ok(build_exercise(
            game_index,
            Some(ply),
            Some(full_move),
            replayed,
            learner,
        ));
    }

    Err(Error::NoMatchingGame)
}

/// Replays tokens `0..=ply`, skipping anything that is not a legal move
fn replay_through(tokens: &[String], ply: usize) -> Chess {
    let mut position = Chess::default();
    for token in tokens.iter().take(ply + 1) {
        if !is_san_like(token) {
            continue;
        }
        match board::apply_move(&position, token) {
            Ok((next, _)) => position = next,
            Err(_) => debug!(token = token.as_str(), "skipping illegal token"),
        }
    }
    position
}

fn build_exercise(
    game_index: usize,
    target_ply: Option<usize>,
    full_move: Option<u32>,
    replayed: Chess,
    learner: Color,
) -> Exercise {
    let position = match board::with_turn(&replayed, learner) {
        Some(position) => position,
        None => {
            warn!(
                game = game_index,
                "cannot give the move to {:?} here, keeping the replayed position", learner
            );
            replayed
        }
    };
    let fen = board::serialize(&position);

    Exercise {
        game_index,
        target_ply,
        full_move,
        position,
        fen,
    }
}
