//! Move legality capability backed by shakmaty
//!
//! Everything else in the crate goes through these helpers when it needs to
//! play a move, print a move, or turn a position into FEN.

use shakmaty::{
    fen::Fen, san::SanPlus, uci::UciMove, CastlingMode, Chess, Color, EnPassantMode, Move,
    Position,
};

use crate::error::{Error, Result};

/// Serializes a position to FEN
pub fn serialize(position: &Chess) -> String {
    Fen::from_position(position, EnPassantMode::Legal).to_string()
}

/// Parses a FEN string into a playable position
pub fn parse_fen(fen: &str) -> Result<Chess> {
    let parsed: Fen = fen
        .trim()
        .parse()
        .map_err(|e| Error::InvalidPosition(format!("{}: {}", fen, e)))?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| Error::InvalidPosition(format!("{}: {}", fen, e)))
}

/// Plays `input` (SAN or UCI) on a copy of `position`.
///
/// Returns the resulting position together with the move in standard
/// notation, including the check or mate suffix.
pub fn apply_move(position: &Chess, input: &str) -> Result<(Chess, String)> {
    let mv = resolve_move(position, input)?;
    let notation = notation(position, &mv);
    let next = position
        .clone()
        .play(mv)
        .map_err(|_| Error::IllegalMove(input.to_string()))?;
    Ok((next, notation))
}

/// Standard notation of a UCI move, or `None` if it is not legal here
pub fn uci_to_san(position: &Chess, uci: &str) -> Option<String> {
    let uci_move: UciMove = uci.parse().ok()?;
    let mv = uci_move.to_move(position).ok()?;
    Some(notation(position, &mv))
}

/// Replays tokens from the initial position, skipping anything illegal
pub fn replay_from_start<S: AsRef<str>>(tokens: &[S]) -> Chess {
    tokens.iter().fold(Chess::default(), |position, token| {
        match apply_move(&position, token.as_ref()) {
            Ok((next, _)) => next,
            Err(_) => position,
        }
    })
}

/// Returns the same placement with `turn` to move.
///
/// The en passant field is cleared when the side changes. `None` if the
/// result is not a legal position (for example the side not to move is
/// in check).
pub fn with_turn(position: &Chess, turn: Color) -> Option<Chess> {
    if position.turn() == turn {
        return Some(position.clone());
    }

    let fen = serialize(position);
    let mut fields: Vec<&str> = fen.split(' ').collect();
    if fields.len() < 4 {
        return None;
    }
    fields[1] = if turn == Color::White { "w" } else { "b" };
    fields[3] = "-";

    parse_fen(&fields.join(" ")).ok()
}

fn resolve_move(position: &Chess, input: &str) -> Result<Move> {
    let cleaned = normalize(input);

    if let Ok(san) = cleaned.parse::<SanPlus>() {
        if let Ok(mv) = san.san.to_move(position) {
            return Ok(mv);
        }
    }

    if let Ok(uci) = cleaned.parse::<UciMove>() {
        if let Ok(mv) = uci.to_move(position) {
            return Ok(mv);
        }
    }

    Err(Error::IllegalMove(input.to_string()))
}

/// Strips annotation glyphs and accepts zero-based castling
fn normalize(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches(['!', '?']);
    let castle = trimmed.trim_end_matches(['+', '#']);
    match castle.to_ascii_uppercase().as_str() {
        "O-O" | "0-0" => "O-O".to_string(),
        "O-O-O" | "0-0-0" => "O-O-O".to_string(),
        _ => trimmed.to_string(),
    }
}

fn notation(position: &Chess, mv: &Move) -> String {
    let san = shakmaty::san::San::from_move(position, mv.clone()).to_string();
    match position.clone().play(mv.clone()) {
        Ok(after) if after.is_checkmate() => format!("{}#", san),
        Ok(after) if after.is_check() => format!("{}+", san),
        _ => san,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_san_and_uci() {
        let start = Chess::default();
        let (after_e4, san) = apply_move(&start, "e4").unwrap();
        assert_eq!(san, "e4");

        let (_, san) = apply_move(&after_e4, "e7e5").unwrap();
        assert_eq!(san, "e5");
    }

    #[test]
    fn test_apply_rejects_illegal() {
        let start = Chess::default();
        assert!(matches!(apply_move(&start, "e5"), Err(Error::IllegalMove(_))));
        assert!(apply_move(&start, "Zz9").is_err());
    }

    #[test]
    fn test_check_suffix() {
        let pos = replay_from_start(&["e4", "f5"]);
        let (_, san) = apply_move(&pos, "Qh5").unwrap();
        assert_eq!(san, "Qh5+");
    }

    #[test]
    fn test_mate_suffix_and_annotations() {
        let pos = replay_from_start(&["f3", "e5", "g4"]);
        let (after, san) = apply_move(&pos, "Qh4#!!").unwrap();
        assert_eq!(san, "Qh4#");
        assert!(after.is_checkmate());
    }

    #[test]
    fn test_zero_castling() {
        let pos = replay_from_start(&["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"]);
        let (_, san) = apply_move(&pos, "0-0").unwrap();
        assert_eq!(san, "O-O");
    }

    #[test]
    fn test_replay_skips_garbage() {
        let pos = replay_from_start(&["e4", "garbage", "e5", "Ke3"]);
        assert_eq!(pos.turn(), Color::White);
        assert_eq!(
            serialize(&pos),
            "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2"
        );
    }

    #[test]
    fn test_uci_to_san() {
        let start = Chess::default();
        assert_eq!(uci_to_san(&start, "g1f3").as_deref(), Some("Nf3"));
        assert_eq!(uci_to_san(&start, "e2e5"), None);
        assert_eq!(uci_to_san(&start, "nonsense"), None);
    }

    #[test]
    fn test_with_turn() {
        let start = Chess::default();
        let black = with_turn(&start, Color::Black).unwrap();
        assert_eq!(black.turn(), Color::Black);
        assert_eq!(black.board(), start.board());

        let same = with_turn(&start, Color::White).unwrap();
        assert_eq!(serialize(&same), serialize(&start));
    }

    #[test]
    fn test_with_turn_rejects_opposite_check() {
        // Black is in check, so White cannot be the side to move
        let pos = replay_from_start(&["e4", "f5", "Qh5+"]);
        assert!(with_turn(&pos, Color::White).is_none());
    }

    #[test]
    fn test_parse_fen_roundtrip() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let pos = parse_fen(fen).unwrap();
        assert_eq!(serialize(&pos), fen);
        assert!(parse_fen("not a fen").is_err());
    }
}
