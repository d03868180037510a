//! Positional value tables used by the engine's static evaluation.
//!
//! Both tables are indexed `[x][y]` by board coordinate and sized by the
//! board side. The second player's table rewards progress along `y` steeply
//! and along `x` gently; the first player's table is the mirror image with
//! the sign flipped, so the sum of both reads from the second player's side.

pub type Matrix = Vec<Vec<i64>>;

const STEP: i64 = 5;

/// Table for the second (engine) player's pieces.
pub fn ai_matrix(size: usize) -> Matrix {
    let n = size as i64;
    let mut matrix = vec![vec![STEP * (n - 1) * n; size]; size];
    let buffer = STEP * (n - 1);
    for i in 1..size {
        let base = STEP * (n - i as i64 - 1);
        for j in 0..size.saturating_sub(1) {
            matrix[i][j] = base + j as i64 * buffer;
        }
    }
    matrix
}

/// Table for the first (human) player's pieces.
pub fn human_matrix(size: usize) -> Matrix {
    let n = size as i64;
    let mut matrix = vec![vec![-STEP * (n - 1) * n; size]; size];
    let buffer = STEP * (n - 1);
    for i in 1..size {
        let base = buffer * (n - i as i64 - 1);
        for j in 0..size.saturating_sub(1) {
            matrix[i][j] = -base - j as i64 * STEP;
        }
    }
    matrix
}

/// Penalty or reward for a piece directly in another's path.
pub fn block_bonus(size: usize) -> i64 {
    let n = size as i64;
    STEP * n * (n - 2)
}

/// Same, for a piece two cells away.
pub fn indirect_block_bonus(size: usize) -> i64 {
    let n = size as i64;
    STEP * (n - 1) * (n - 2)
}
