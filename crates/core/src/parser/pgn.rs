//! PGN database loading
//!
//! A database is a sequence of games, each a block of `[Key "Value"]` tag
//! pairs followed by movetext. Games are split on a blank line that comes
//! right before an `[Event ` tag.

use regex::Regex;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::{LazyLock, OnceLock};

use super::tokenizer::tokenize_movetext;
use crate::error::Result;

static TAG_PAIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[(\w+)\s+"([^"]*)"\]"#).unwrap());
static TAG_PAIR_WITH_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[\w+\s+"[^"]*"\]\s*"#).unwrap());

/// One game of a loaded database
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    pub headers: BTreeMap<String, String>,
    pub movetext: String,
    pub raw: String,
    tokens: OnceLock<Vec<String>>,
}

impl GameRecord {
    pub fn new(headers: BTreeMap<String, String>, movetext: String, raw: String) -> Self {
        Self {
            headers,
            movetext,
            raw,
            tokens: OnceLock::new(),
        }
    }

    /// Move tokens, derived from the movetext on first use
    pub fn tokens(&self) -> &[String] {
        self.tokens.get_or_init(|| tokenize_movetext(&self.movetext))
    }

    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Highest full-move number the game reaches
    pub fn full_moves(&self) -> u32 {
        self.tokens().len().div_ceil(2) as u32
    }
}

pub fn load_database_file<P: AsRef<Path>>(path: P) -> Result<Vec<GameRecord>> {
    let contents = fs::read_to_string(path)?;
    Ok(load_database(&contents))
}

/// Splits a PGN database into game records.
///
/// Games without any movetext are dropped. Parsing never fails: a game whose
/// movetext is garbage simply yields no tokens.
pub fn load_database(text: &str) -> Vec<GameRecord> {
    split_games(text)
        .into_iter()
        .filter_map(|raw| {
            let headers: BTreeMap<String, String> = TAG_PAIR
                .captures_iter(&raw)
                .map(|cap| (cap[1].to_string(), cap[2].to_string()))
                .collect();

            let movetext = TAG_PAIR_WITH_SPACE.replace_all(&raw, "").trim().to_string();
            if movetext.is_empty() {
                return None;
            }

            Some(GameRecord::new(headers, movetext, raw))
        })
        .collect()
}

fn split_games(text: &str) -> Vec<String> {
    let mut games = Vec::new();
    let mut current = String::new();
    let mut after_blank = false;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');

        if after_blank && line.trim_start().starts_with("[Event ") && !current.trim().is_empty() {
            games.push(std::mem::take(&mut current));
        }

        after_blank = line.trim().is_empty();
        current.push_str(line);
        current.push('\n');
    }

    if !current.trim().is_empty() {
        games.push(current);
    }

    games
        .into_iter()
        .map(|game| game.trim().to_string())
        .collect()
}
