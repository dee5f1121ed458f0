use position_trainer_core::board;
use position_trainer_core::engine::EngineSource;
use position_trainer_core::{
    EngineManager, Error, EvaluationScore, MoveInterval, ScriptedEngine, Trainer, TrainerConfig,
};
use shakmaty::{Color, Position};
use std::time::Duration;

const DATABASE: &str = r#"[Event "Casual"]
[White "Anderssen"]
[Black "Kieseritzky"]
[Result "1-0"]

1. e4 e5 2. f4 exf4 3. Bc4 {the Bishop's Gambit} Qh4+ 4. Kf1 b5 1-0

[Event "Casual"]
[White "Morphy"]
[Black "Duke"]
[Result "1-0"]

1. e4 e5 2. Nf3 d6 3. d4 Bg4 (3... exd4) 4. dxe5 $2 Bxf3 1-0
"#;

fn config(learner: Color) -> TrainerConfig {
    TrainerConfig {
        learner,
        exercise_budget: Duration::from_millis(300),
        grading_budget: Duration::from_millis(300),
        ..TrainerConfig::default()
    }
}

fn trainer_with(engine: ScriptedEngine, learner: Color) -> Trainer {
    let manager = EngineManager::new(vec![
        EngineSource::binary("/nonexistent/position-trainer/stockfish"),
        engine.source("scripted"),
    ]);
    Trainer::with_engine(config(learner), manager)
}

#[tokio::test]
async fn test_first_move_exercise_for_black() {
    let after_e4 = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
    let engine = ScriptedEngine::new().enveloped().on_position(
        after_e4,
        [
            "info depth 14 multipv 1 score cp -30 pv e7e5 g1f3",
            "info depth 14 multipv 2 score cp -35 pv c7c5",
            "info depth 14 multipv 3 score cp -48 pv e7e6",
        ],
    );
    let trainer = trainer_with(engine, Color::Black);

    let games = trainer.load_database(DATABASE);
    assert_eq!(games.len(), 2);

    let exercise = trainer
        .pick_exercise(&games, Some(MoveInterval::new(1, 1)))
        .unwrap();
    assert_eq!(exercise.target_ply, Some(0));
    assert_eq!(exercise.position.turn(), Color::Black);
    assert_eq!(exercise.fen, after_e4);

    let mut snapshots = 0;
    let candidates = trainer
        .analyse_exercise(&exercise, |_| snapshots += 1)
        .await
        .unwrap();
    assert!(snapshots >= 1);

    let notations: Vec<&str> = candidates.iter().map(|c| c.notation.as_str()).collect();
    assert_eq!(notations, vec!["e5", "c5", "e6"]);

    let outcome = trainer.grade(&exercise.position, &candidates, "e5").await;
    assert!(outcome.correct);
    assert_eq!(outcome.score_delta, 10);
    assert_eq!(trainer.score(), 1010);
}

#[tokio::test]
async fn test_wrong_answer_reveals_candidates() {
    let start = board::serialize(&shakmaty::Chess::default());
    let after_a4 = "rnbqkbnr/pppppppp/8/8/P7/8/1PPPPPPP/RNBQKBNR b KQkq - 0 1";
    let engine = ScriptedEngine::new()
        .on_position(
            start,
            [
                "info depth 20 multipv 1 score cp 35 pv e2e4",
                "info depth 20 multipv 2 score cp 30 pv d2d4",
            ],
        )
        // Black answers 1. a4 with an advantage of its own
        .on_position(after_a4, ["info depth 20 multipv 1 score cp 40 pv e7e5"]);
    let journal = engine.journal();
    let trainer = trainer_with(engine, Color::White);

    let games = trainer.load_database(DATABASE);
    let exercise = trainer.pick_exercise(&games, None).unwrap();
    assert_eq!(exercise.target_ply, None);
    assert_eq!(exercise.position.turn(), Color::White);

    let candidates = trainer.analyse_exercise(&exercise, |_| {}).await.unwrap();
    let outcome = trainer.grade(&exercise.position, &candidates, "a2a4").await;

    assert!(!outcome.correct);
    assert_eq!(outcome.submitted, "a4");
    assert_eq!(outcome.evaluation, Some(EvaluationScore::Centipawns(-40)));
    assert_eq!(outcome.best_moves, vec!["e4", "d4"]);
    assert_eq!(trainer.score(), 990);
    assert!(journal.contains(&format!("position fen {}", after_a4)));

    assert_eq!(trainer.expire(), 970);
}

#[tokio::test]
async fn test_interval_beyond_every_game() {
    let trainer = trainer_with(ScriptedEngine::new(), Color::White);
    let games = trainer.load_database(DATABASE);

    let err = trainer
        .pick_exercise(&games, Some(MoveInterval::new(40, 50)))
        .unwrap_err();
    assert!(matches!(err, Error::NoMatchingGame));

    let err = trainer.pick_exercise(&[], None).unwrap_err();
    assert!(matches!(err, Error::NoDatabase));
}

#[tokio::test]
async fn test_no_engine_available() {
    let manager = EngineManager::new(vec![
        EngineSource::binary("/nonexistent/position-trainer/stockfish"),
        ScriptedEngine::new().failing_bootstrap().source("loader"),
    ]);
    let trainer = Trainer::with_engine(config(Color::White), manager);

    let err = trainer
        .start_analysis(shakmaty::Chess::default(), 3, Duration::from_millis(100), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionUnavailable));
    assert!(!trainer.stop_analysis().await);
}
