use log::{debug, warn};

use crate::board::{GameState, Position, Seat};
use crate::eval::{self, Matrix};
use crate::game::Move;

/// Depth-limited alpha-beta search. Scores are always read from the second
/// player's side: `+inf` means the second player has won.
#[derive(Debug, Clone)]
pub struct MinimaxSolver {
    board_size: usize,
    depth: u32,
    ai_matrix: Matrix,
    human_matrix: Matrix,
    block_bonus: i64,
    indirect_block_bonus: i64,
    nodes: u64,
}

impl MinimaxSolver {
    /// `board_size` is the side of the board, which sizes both value tables.
    pub fn new(board_size: usize, depth: u32) -> Self {
        Self {
            board_size,
            depth,
            ai_matrix: eval::ai_matrix(board_size),
            human_matrix: eval::human_matrix(board_size),
            block_bonus: eval::block_bonus(board_size),
            indirect_block_bonus: eval::indirect_block_bonus(board_size),
            nodes: 0,
        }
    }

    pub fn board_size(&self) -> usize {
        self.board_size
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Nodes visited by the last search.
    pub fn nodes_searched(&self) -> u64 {
        self.nodes
    }

    pub fn best_move(&mut self, state: &GameState) -> Option<Move> {
        self.search(state).map(|(mv, _)| mv)
    }

    /// Best move for the player to move together with its backed-up value.
    /// `None` when the game is over or the player to move is stuck.
    pub fn search(&mut self, state: &GameState) -> Option<(Move, f64)> {
        if state.board_size() != self.board_size {
            warn!(
                "Solver built for board size {} asked to search {} of board size {}, rebuilding tables",
                self.board_size, state.id(), state.board_size()
            );
            *self = Self::new(state.board_size(), self.depth);
        }
        self.nodes = 1;
        if state.is_over() {
            return None;
        }

        let children = self.ordered_children(state);
        let mut best: Option<(Move, f64)> = None;
        let mut best_val = f64::NEG_INFINITY;
        let mut alpha = f64::NEG_INFINITY;
        let beta = f64::INFINITY;
        for (mv, child) in &children {
            let val = self.min_value(child, self.depth.saturating_sub(1), alpha, beta);
            if val > best_val {
                best_val = val;
                best = Some((*mv, val));
            }
            alpha = alpha.max(best_val);
        }

        // every line loses: still play something
        let best = best.or_else(|| children.first().map(|(mv, _)| (*mv, f64::NEG_INFINITY)));
        if let Some((mv, val)) = best {
            debug!(
                "{}: best move {} -> {} scores {} after {} nodes",
                state.id(), mv.piece, mv.to, val, self.nodes
            );
        }
        best
    }

    // children sorted by their own static score, highest first; ties keep
    // enumeration order
    fn ordered_children(&self, state: &GameState) -> Vec<(Move, GameState)> {
        let mut scored: Vec<(f64, Move, GameState)> = state.legal_moves().into_iter()
            .filter_map(|mv| {
                let mut child = state.snapshot();
                child.apply_move(mv).ok()?;
                Some((self.evaluate(&child), mv, child))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.into_iter().map(|(_, mv, child)| (mv, child)).collect()
    }

    fn max_value(&mut self, state: &GameState, depth: u32, mut alpha: f64, beta: f64) -> f64 {
        self.nodes += 1;
        if depth == 0 || state.is_over() {
            return self.evaluate(state);
        }

        let mut val = f64::NEG_INFINITY;
        for (_, child) in self.ordered_children(state) {
            val = val.max(self.min_value(&child, depth - 1, alpha, beta));
            alpha = alpha.max(val);
            if alpha >= beta {
                break;
            }
        }
        val
    }

    fn min_value(&mut self, state: &GameState, depth: u32, alpha: f64, mut beta: f64) -> f64 {
        self.nodes += 1;
        if depth == 0 || state.is_over() {
            return self.evaluate(state);
        }

        let mut val = f64::INFINITY;
        for (_, child) in self.ordered_children(state) {
            val = val.min(self.max_value(&child, depth - 1, alpha, beta));
            beta = beta.min(val);
            if alpha >= beta {
                break;
            }
        }
        val
    }

    /// Static score of a position from the second player's side. The state
    /// must have the board size the solver was built for.
    pub fn evaluate(&self, state: &GameState) -> f64 {
        debug_assert_eq!(state.board_size(), self.board_size, "board size does not match the solver");
        match state.winner() {
            Some(Seat::Second) => return f64::INFINITY,
            Some(Seat::First) => return f64::NEG_INFINITY,
            None => {}
        }

        let ai = state.player(Seat::Second).pieces();
        let human = state.player(Seat::First).pieces();
        let mut score: i64 = 0;
        score += ai.iter().map(|p| lookup(&self.ai_matrix, p.position())).sum::<i64>();
        score += human.iter().map(|p| lookup(&self.human_matrix, p.position())).sum::<i64>();

        let seat_at = |pos: Position| state.piece_at(pos).map(|(seat, _)| seat);
        for piece in human {
            let pos = piece.position();
            if seat_at(pos.offset(0, -1)) == Some(Seat::Second) {
                score -= self.block_bonus;
            }
            if seat_at(pos.offset(0, -2)) == Some(Seat::Second) {
                score -= self.indirect_block_bonus;
            }
            if seat_at(pos.offset(-1, 0)) == Some(Seat::First) {
                score += self.block_bonus;
            }
            if seat_at(pos.offset(-2, 0)) == Some(Seat::First) {
                score += self.indirect_block_bonus;
            }
        }
        score as f64
    }
}

fn lookup(matrix: &Matrix, pos: Position) -> i64 {
    let (Ok(x), Ok(y)) = (usize::try_from(pos.x), usize::try_from(pos.y)) else {
        return 0;
    };
    let value = matrix.get(x).and_then(|row| row.get(y)).copied();
    debug_assert!(value.is_some(), "{} lies outside the value table", pos);
    value.unwrap_or(0)
}
