use thiserror::Error;

use crate::board::{GameState, PieceId, Position, Seat};

/// Why a move was turned down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveError {
    #[error("{0} is not an active piece of the player to move")]
    InvalidPieceId(PieceId),
    #[error("{0} is outside the board")]
    OutOfBounds(Position),
    #[error("{0} is already occupied")]
    OccupiedTarget(Position),
    #[error("{from} to {to} is not a single orthogonal step")]
    IllegalStep { from: Position, to: Position },
    #[error("{0} is the opponent's destination")]
    ForbiddenDestination(Position),
    #[error("{from} to {to} moves backwards")]
    ForbiddenDirection { from: Position, to: Position },
    #[error("the game is already over")]
    GameAlreadyOver,
}

/// Checks a move for the player to move without touching the state.
pub fn validate(state: &GameState, piece: PieceId, target: Position) -> Result<(), MoveError> {
    let seat = state.current_player();
    let from = state.player(seat).piece(piece)
        .map(|p| p.position())
        .ok_or(MoveError::InvalidPieceId(piece))?;

    if !state.board().contains(target) {
        return Err(MoveError::OutOfBounds(target));
    }
    if state.board().get(target).is_some() {
        return Err(MoveError::OccupiedTarget(target));
    }

    let (dx, dy) = (target.x - from.x, target.y - from.y);
    if dx.abs() > 1 || dy.abs() > 1 || dx * dy != 0 {
        return Err(MoveError::IllegalStep { from, to: target });
    }

    if state.destination(seat.other()).contains(target) {
        return Err(MoveError::ForbiddenDestination(target));
    }

    let backwards = match seat {
        Seat::First => dx > 0,
        Seat::Second => dy < 0,
    };
    if backwards {
        return Err(MoveError::ForbiddenDirection { from, to: target });
    }

    Ok(())
}

pub fn is_legal(state: &GameState, piece: PieceId, target: Position) -> bool {
    validate(state, piece, target).is_ok()
}
