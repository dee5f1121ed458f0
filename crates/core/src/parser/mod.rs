//! PGN database parsing

pub mod pgn;
pub mod tokenizer;

pub use pgn::{load_database, load_database_file, GameRecord};
pub use tokenizer::{is_san_like, tokenize_movetext};
