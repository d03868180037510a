use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::board::{checked_game_size, GameState, IdSource, PieceId, Player, Position, Seat, SetupError};
use crate::engine::MinimaxSolver;
use crate::validator::{validate, MoveError};

/// Search depth given to the engine when the second player is AI.
pub const DEFAULT_DEPTH: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub piece: PieceId,
    pub to: Position,
}

impl Move {
    pub fn new(piece: PieceId, to: Position) -> Self {
        Self { piece, to }
    }
}

/// What a successful move did besides moving the piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveOutcome {
    pub scored: bool,
    pub winner: Option<Seat>,
}

impl GameState {
    /// Applies a move for the player to move. On error the state is untouched.
    pub fn apply_move(&mut self, mv: Move) -> Result<MoveOutcome, MoveError> {
        if self.is_over {
            return Err(MoveError::GameAlreadyOver);
        }
        validate(self, mv.piece, mv.to)?;

        let seat = self.current;
        let player = &mut self.players[seat.index()];
        let piece = player.piece_mut(mv.piece).ok_or(MoveError::InvalidPieceId(mv.piece))?;
        let from = piece.position();
        piece.set_position(mv.to);
        self.board.clear(from);
        self.board.place(mv.to, mv.piece);

        let mut outcome = MoveOutcome::default();
        if self.destinations[seat.index()].contains(mv.to) {
            player.remove_piece(mv.piece);
            self.board.clear(mv.to);
            outcome.scored = true;
        }
        if player.pieces().is_empty() {
            self.is_over = true;
            self.winner = Some(seat);
            outcome.winner = Some(seat);
        }

        self.current = seat.other();
        Ok(outcome)
    }

    /// Every legal move for the player to move, piece by piece in creation
    /// order and, per piece, in the side's step order.
    pub fn legal_moves(&self) -> Vec<Move> {
        if self.is_over {
            return Vec::new();
        }
        let seat = self.current;
        self.player(seat).pieces().iter()
            .flat_map(|piece| {
                let from = piece.position();
                seat.step_deltas().into_iter()
                    .map(move |(dx, dy)| Move::new(piece.id(), from.offset(dx, dy)))
            })
            .filter(|mv| validate(self, mv.piece, mv.to).is_ok())
            .collect()
    }
}

/// A game between two players, with an engine attached when the second
/// player is AI.
#[derive(Debug, Clone)]
pub struct Game {
    size: usize,
    depth: u32,
    ids: IdSource,
    state: Option<GameState>,
    solver: Option<MinimaxSolver>,
}

impl Game {
    pub fn new(size: usize) -> Result<Self, SetupError> {
        Self::with_ids(size, IdSource::new())
    }

    pub fn with_ids(size: usize, ids: IdSource) -> Result<Self, SetupError> {
        checked_game_size(size)?;
        Ok(Self { size, depth: DEFAULT_DEPTH, ids, state: None, solver: None })
    }

    /// Overrides the engine's search depth for the next `start`.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn ids(&self) -> &IdSource {
        &self.ids
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_started(&self) -> bool {
        self.state.is_some()
    }

    /// The current state, once `start` has been called.
    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn start(&mut self, first: Player, second: Player) -> Result<(), SetupError> {
        let with_engine = second.is_ai();
        let state = GameState::new(&self.ids, self.size, first, second)?;
        info!("Starting {} with size {}", state.id(), self.size);
        self.solver = with_engine.then(|| MinimaxSolver::new(state.board_size(), self.depth));
        self.state = Some(state);
        Ok(())
    }

    fn started(&self) -> &GameState {
        match &self.state {
            Some(state) => state,
            None => panic!("Game::start must be called before the game is played"),
        }
    }

    fn started_mut(&mut self) -> &mut GameState {
        match &mut self.state {
            Some(state) => state,
            None => panic!("Game::start must be called before the game is played"),
        }
    }

    pub fn try_play_turn(&mut self, mv: Move) -> Result<MoveOutcome, MoveError> {
        let state = self.started_mut();
        let seat = state.current_player();
        match state.apply_move(mv) {
            Ok(outcome) => {
                if let Some(winner) = outcome.winner {
                    info!("{} is over, {} won", state.id(), state.player(winner).name());
                }
                Ok(outcome)
            }
            Err(e) => {
                debug!("Rejected move {:?} for seat {:?}: {}", mv, seat, e);
                Err(e)
            }
        }
    }

    /// Returns false for an illegal move or a finished game, leaving the
    /// state unchanged.
    pub fn play_turn(&mut self, piece: PieceId, target: Position) -> bool {
        self.try_play_turn(Move::new(piece, target)).is_ok()
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        self.started().legal_moves()
    }

    /// Asks the engine for a move on the current state. Applying it is up
    /// to the caller.
    pub fn request_ai_move(&mut self) -> Option<Move> {
        let state = match &self.state {
            Some(state) => state,
            None => panic!("Game::start must be called before the game is played"),
        };
        self.solver.as_mut()?.best_move(state)
    }

    /// Independent copy under new game, player and piece ids.
    pub fn clone_fresh(&self) -> Game {
        Game {
            size: self.size,
            depth: self.depth,
            ids: self.ids.clone(),
            state: self.state.as_ref().map(|s| s.clone_fresh(&self.ids)),
            solver: self.solver.clone(),
        }
    }

    /// Independent copy keeping every id.
    pub fn snapshot(&self) -> Game {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: i32, y: i32) -> Position {
        Position::new(x, y)
    }

    fn layout(first: &[Position], second: &[Position], to_move: Seat) -> GameState {
        let ids = IdSource::new();
        let a = Player::new(&ids, "human", false);
        let b = Player::new(&ids, "engine", true);
        GameState::from_layout(&ids, 3, a, b, first, second, to_move).unwrap()
    }

    fn piece_on(state: &GameState, pos: Position) -> PieceId {
        state.piece_at(pos).map(|(_, piece)| piece.id()).unwrap()
    }

    fn started(size: usize) -> Game {
        let mut game = Game::new(size).unwrap().with_depth(2);
        let human = Player::new(game.ids(), "human", false);
        let engine = Player::new(game.ids(), "engine", true);
        game.start(human, engine).unwrap();
        game
    }

    #[test]
    fn move_into_own_zone_scores_the_piece() {
        let mut state = layout(&[p(1, 1), p(3, 2)], &[p(2, 0)], Seat::First);
        let piece = piece_on(&state, p(1, 1));
        let outcome = state.apply_move(Move::new(piece, p(0, 1))).unwrap();
        assert_eq!(outcome, MoveOutcome { scored: true, winner: None });
        assert_eq!(state.player(Seat::First).pieces().len(), 1);
        assert!(state.player(Seat::First).piece(piece).is_none());
        assert_eq!(state.board().get(p(1, 1)), None);
        assert_eq!(state.board().get(p(0, 1)), None);
        assert_eq!(state.current_player(), Seat::Second);
        assert!(!state.is_over());
    }

    #[test]
    fn last_piece_home_wins() {
        let mut state = layout(&[p(1, 1)], &[p(2, 0)], Seat::First);
        let piece = piece_on(&state, p(1, 1));
        let outcome = state.apply_move(Move::new(piece, p(0, 1))).unwrap();
        assert_eq!(outcome.winner, Some(Seat::First));
        assert!(state.is_over());
        assert_eq!(state.winner(), Some(Seat::First));
        assert_eq!(state.current_player(), Seat::Second);

        let theirs = piece_on(&state, p(2, 0));
        let before = state.clone();
        assert_eq!(state.apply_move(Move::new(theirs, p(2, 1))), Err(MoveError::GameAlreadyOver));
        assert_eq!(state, before);
        assert!(state.legal_moves().is_empty());
    }

    #[test]
    fn second_player_can_win_too() {
        let mut state = layout(&[p(3, 1)], &[p(2, 2)], Seat::Second);
        let piece = piece_on(&state, p(2, 2));
        state.apply_move(Move::new(piece, p(2, 3))).unwrap();
        assert_eq!(state.winner(), Some(Seat::Second));
    }

    #[test]
    fn rejected_move_leaves_state_alone() {
        let mut state = layout(&[p(3, 1)], &[p(1, 0)], Seat::First);
        let before = state.clone();
        let piece = piece_on(&state, p(3, 1));
        assert!(state.apply_move(Move::new(piece, p(2, 2))).is_err());
        assert_eq!(state, before);
    }

    #[test]
    fn legal_moves_at_start() {
        let ids = IdSource::new();
        let a = Player::new(&ids, "human", false);
        let b = Player::new(&ids, "engine", true);
        let mut state = GameState::new(&ids, 3, a, b).unwrap();
        let first = state.player(Seat::First).pieces()[0].id();
        let second = state.player(Seat::First).pieces()[1].id();
        assert_eq!(
            state.legal_moves(),
            vec![
                Move::new(first, p(2, 1)),
                Move::new(first, p(3, 0)),
                Move::new(second, p(2, 2)),
            ]
        );

        state.apply_move(Move::new(first, p(2, 1))).unwrap();
        let a0 = state.player(Seat::Second).pieces()[0].id();
        let a1 = state.player(Seat::Second).pieces()[1].id();
        assert_eq!(
            state.legal_moves(),
            vec![
                Move::new(a0, p(1, 1)),
                Move::new(a1, p(3, 0)),
            ]
        );
    }

    #[test]
    fn legal_moves_all_validate() {
        let game = started(5);
        let state = game.state().unwrap();
        let moves = state.legal_moves();
        assert!(!moves.is_empty());
        for mv in moves {
            assert!(crate::validator::is_legal(state, mv.piece, mv.to));
        }
    }

    #[test]
    fn turns_alternate_only_on_success() {
        let mut game = started(3);
        let piece = game.state().unwrap().player(Seat::First).pieces()[0].id();
        assert!(!game.play_turn(piece, p(1, 1)));
        assert_eq!(game.state().unwrap().current_player(), Seat::First);
        assert!(game.play_turn(piece, p(2, 1)));
        assert_eq!(game.state().unwrap().current_player(), Seat::Second);
        assert!(!game.play_turn(piece, p(1, 1)));
        assert_eq!(game.state().unwrap().current_player(), Seat::Second);
    }

    #[test]
    fn engine_only_for_ai_opponent() {
        let mut game = Game::new(3).unwrap();
        let a = Player::new(game.ids(), "a", false);
        let b = Player::new(game.ids(), "b", false);
        game.start(a, b).unwrap();
        assert_eq!(game.request_ai_move(), None);
    }

    #[test]
    fn ai_move_is_legal() {
        let mut game = started(3);
        let piece = game.state().unwrap().player(Seat::First).pieces()[0].id();
        assert!(game.play_turn(piece, p(2, 1)));
        let mv = game.request_ai_move().unwrap();
        assert!(game.legal_moves().contains(&mv));
        assert!(game.play_turn(mv.piece, mv.to));
    }

    #[test]
    fn snapshot_and_clone_fresh_are_independent() {
        let mut game = started(3);
        let snap = game.snapshot();
        let fresh = game.clone_fresh();
        assert_eq!(snap.state(), game.state());
        assert_ne!(fresh.state().unwrap().id(), game.state().unwrap().id());

        let piece = game.state().unwrap().player(Seat::First).pieces()[0].id();
        assert!(game.play_turn(piece, p(2, 1)));
        assert_eq!(snap.state().unwrap().current_player(), Seat::First);
        assert_eq!(fresh.state().unwrap().current_player(), Seat::First);
        assert_eq!(snap.state().unwrap().board().get(p(3, 1)), Some(piece));

        let mut fresh = fresh;
        let fresh_piece = fresh.state().unwrap().player(Seat::First).pieces()[0].id();
        assert!(!fresh.play_turn(piece, p(2, 1)));
        assert!(fresh.play_turn(fresh_piece, p(2, 1)));
        assert_eq!(game.state().unwrap().current_player(), Seat::Second);
    }

    #[test]
    fn rejects_tiny_games() {
        assert_eq!(Game::new(1).err(), Some(SetupError::SizeTooSmall(1)));
        assert_eq!(Game::new(10_000).err(), Some(SetupError::SizeTooLarge(10_000)));
    }

    #[test]
    #[should_panic(expected = "Game::start")]
    fn playing_before_start_panics() {
        let mut game = Game::new(3).unwrap();
        game.play_turn(PieceId(1), p(2, 1));
    }
}
