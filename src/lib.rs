//! Dodgem: a two-player race across a square board, plus an alpha-beta
//! engine that plays the second side.

pub mod board;
pub mod engine;
pub mod eval;
pub mod game;
pub mod validator;

pub use board::{
    checked_game_size, MAX_GAME_SIZE, MIN_GAME_SIZE,
    Color, GameId, GameState, IdSource, Piece, PieceId, Player, PlayerId, Position, Seat,
    SetupError,
};
pub use engine::MinimaxSolver;
pub use game::{Game, Move, MoveOutcome, DEFAULT_DEPTH};
pub use validator::{is_legal, validate, MoveError};
