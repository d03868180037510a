use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bitvec::prelude::*;
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeStruct, Serializer};
use thiserror::Error;

/// Smallest game size that leaves room for a piece on each side.
pub const MIN_GAME_SIZE: usize = 2;

/// Largest game size a board is built for.
pub const MAX_GAME_SIZE: usize = 256;

/// Checks a requested game size and returns it as a coordinate.
pub fn checked_game_size(game_size: usize) -> Result<i32, SetupError> {
    if game_size < MIN_GAME_SIZE {
        return Err(SetupError::SizeTooSmall(game_size));
    }
    if game_size > MAX_GAME_SIZE {
        return Err(SetupError::SizeTooLarge(game_size));
    }
    i32::try_from(game_size).map_err(|_| SetupError::SizeTooLarge(game_size))
}

// cells are stored row-major: index = x * side + y
pub type CellMask = BitVec<u8, Lsb0>;

fn cell_index(side: usize, pos: Position) -> Option<usize> {
    let side_i = side as i32;
    if pos.x < 0 || pos.y < 0 || pos.x >= side_i || pos.y >= side_i {
        return None;
    }
    Some(pos.x as usize * side + pos.y as usize)
}

fn cell_position(side: usize, idx: usize) -> Position {
    Position::new((idx / side) as i32, (idx % side) as i32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// on the wire a position is a plain [x, y] pair
impl Serialize for Position {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        [self.x, self.y].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Position {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error> where D: Deserializer<'de> {
        let [x, y] = <[i32; 2]>::deserialize(deserializer)?;
        Ok(Position::new(x, y))
    }
}

macro_rules! id_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!($prefix, "-{}"), self.0)
            }
        }
    };
}

id_type!(GameId, "game");
id_type!(PlayerId, "player");
id_type!(PieceId, "piece");

/// Sequential id generator. Clones of a source share one counter, so a game
/// and everything cloned from it never hand out the same id twice.
#[derive(Debug, Clone)]
pub struct IdSource {
    next: Arc<AtomicU64>,
}

impl IdSource {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self { next: Arc::new(AtomicU64::new(first)) }
    }

    fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    pub fn game_id(&self) -> GameId {
        GameId(self.next())
    }

    pub fn player_id(&self) -> PlayerId {
        PlayerId(self.next())
    }

    pub fn piece_id(&self) -> PieceId {
        PieceId(self.next())
    }
}

impl Default for IdSource {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Red,
    Blue,
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Color::Red => "red",
            Color::Blue => "blue",
        })
    }
}

/// Which of the two players. `First` starts on the bottom edge and races
/// toward row 0; `Second` starts on the left edge and races toward the
/// rightmost column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Seat {
    First,
    Second,
}

impl Seat {
    pub const BOTH: [Seat; 2] = [Seat::First, Seat::Second];

    pub fn index(self) -> usize {
        match self {
            Seat::First => 0,
            Seat::Second => 1,
        }
    }

    pub fn from_index(idx: usize) -> Option<Seat> {
        match idx {
            0 => Some(Seat::First),
            1 => Some(Seat::Second),
            _ => None,
        }
    }

    pub fn other(self) -> Seat {
        match self {
            Seat::First => Seat::Second,
            Seat::Second => Seat::First,
        }
    }

    pub fn color(self) -> Color {
        match self {
            Seat::First => Color::Red,
            Seat::Second => Color::Blue,
        }
    }

    /// The three single steps a side may ever take, in enumeration order.
    pub fn step_deltas(self) -> [(i32, i32); 3] {
        match self {
            Seat::First => [(-1, 0), (0, 1), (0, -1)],
            Seat::Second => [(-1, 0), (1, 0), (0, 1)],
        }
    }
}

impl Serialize for Seat {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        serializer.serialize_u8(self.index() as u8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Piece {
    id: PieceId,
    owner: PlayerId,
    color: Color,
    position: Position,
}

impl Piece {
    pub fn id(&self) -> PieceId {
        self.id
    }

    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    pub fn color(&self) -> Color {
        self.color
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Player {
    id: PlayerId,
    name: String,
    is_ai: bool,
    pieces: Vec<Piece>,
}

impl Player {
    pub fn new(ids: &IdSource, name: impl Into<String>, is_ai: bool) -> Self {
        Self {
            id: ids.player_id(),
            name: name.into(),
            is_ai,
            pieces: Vec::new(),
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_ai(&self) -> bool {
        self.is_ai
    }

    /// Active pieces in creation order.
    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.id == id)
    }

    pub(crate) fn piece_mut(&mut self, id: PieceId) -> Option<&mut Piece> {
        self.pieces.iter_mut().find(|p| p.id == id)
    }

    pub(crate) fn remove_piece(&mut self, id: PieceId) -> Option<Piece> {
        let idx = self.pieces.iter().position(|p| p.id == id)?;
        Some(self.pieces.remove(idx))
    }

    pub fn snapshot(&self) -> Player {
        self.clone()
    }

    /// Deep copy under a new player id with new piece ids.
    pub fn clone_fresh(&self, ids: &IdSource) -> Player {
        let id = ids.player_id();
        let pieces = self.pieces.iter()
            .map(|p| Piece { id: ids.piece_id(), owner: id, ..p.clone() })
            .collect();
        Player { id, name: self.name.clone(), is_ai: self.is_ai, pieces }
    }
}

/// Square grid of cells, each holding the id of the piece standing on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    side: usize,
    cells: Vec<Option<PieceId>>,
}

impl Board {
    fn new(side: usize) -> Self {
        Self { side, cells: vec![None; side * side] }
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn contains(&self, pos: Position) -> bool {
        cell_index(self.side, pos).is_some()
    }

    pub fn get(&self, pos: Position) -> Option<PieceId> {
        cell_index(self.side, pos).and_then(|idx| self.cells[idx])
    }

    pub(crate) fn place(&mut self, pos: Position, id: PieceId) {
        if let Some(idx) = cell_index(self.side, pos) {
            self.cells[idx] = Some(id);
        }
    }

    pub(crate) fn clear(&mut self, pos: Position) {
        if let Some(idx) = cell_index(self.side, pos) {
            self.cells[idx] = None;
        }
    }

    pub fn occupied(&self) -> impl Iterator<Item = (Position, PieceId)> + '_ {
        self.cells.iter().enumerate()
            .filter_map(move |(idx, cell)| cell.map(|id| (cell_position(self.side, idx), id)))
    }
}

/// A fixed set of cells that scores a player's piece on arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    side: usize,
    cells: CellMask,
}

impl Zone {
    fn new(side: usize, points: impl IntoIterator<Item = Position>) -> Self {
        let mut cells = bitvec![u8, Lsb0; 0; side * side];
        for pos in points {
            if let Some(idx) = cell_index(side, pos) {
                cells.set(idx, true);
            }
        }
        Self { side, cells }
    }

    pub fn contains(&self, pos: Position) -> bool {
        cell_index(self.side, pos).is_some_and(|idx| self.cells[idx])
    }

    pub fn len(&self) -> usize {
        self.cells.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.not_any()
    }

    pub fn iter(&self) -> impl Iterator<Item = Position> + '_ {
        self.cells.iter_ones().map(move |idx| cell_position(self.side, idx))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    #[error("game size must be at least 2, got {0}")]
    SizeTooSmall(usize),
    #[error("game size must be at most 256, got {0}")]
    SizeTooLarge(usize),
    #[error("{0} is outside the board")]
    OutOfBounds(Position),
    #[error("more than one piece placed on {0}")]
    Overlap(Position),
    #[error("{0} lies in a destination zone")]
    InDestination(Position),
}

/// Everything that changes during a game. Mutated only through
/// `GameState::apply_move`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub(crate) id: GameId,
    pub(crate) game_size: usize,
    pub(crate) board: Board,
    pub(crate) players: [Player; 2],
    pub(crate) current: Seat,
    pub(crate) winner: Option<Seat>,
    pub(crate) is_over: bool,
    pub(crate) destinations: [Zone; 2],
}

impl GameState {
    /// Lays out a fresh game of size `n` on an `(n+1)`-square board: the
    /// first player along row `n`, the second along column 0.
    pub fn new(ids: &IdSource, game_size: usize, first: Player, second: Player) -> Result<Self, SetupError> {
        let n = checked_game_size(game_size)?;
        let first_cells: Vec<Position> = (1..n).map(|i| Position::new(n, i)).collect();
        let second_cells: Vec<Position> = (1..n).map(|i| Position::new(i, 0)).collect();
        Self::from_layout(ids, game_size, first, second, &first_cells, &second_cells, Seat::First)
    }

    /// Builds a state from explicit piece positions. Any pieces the players
    /// already hold are discarded. A side placed with no pieces has already won.
    pub fn from_layout(
        ids: &IdSource,
        game_size: usize,
        first: Player,
        second: Player,
        first_cells: &[Position],
        second_cells: &[Position],
        to_move: Seat,
    ) -> Result<Self, SetupError> {
        let n = checked_game_size(game_size)?;
        let id = ids.game_id();
        let side = game_size + 1;
        let destinations = [
            Zone::new(side, (0..n).map(|i| Position::new(0, i))),
            Zone::new(side, (0..n).map(|i| Position::new(i + 1, n))),
        ];

        let mut board = Board::new(side);
        let mut players = [first, second];
        for (seat, cells) in [(Seat::First, first_cells), (Seat::Second, second_cells)] {
            let player = &mut players[seat.index()];
            player.pieces.clear();
            for &pos in cells {
                if !board.contains(pos) {
                    return Err(SetupError::OutOfBounds(pos));
                }
                if board.get(pos).is_some() {
                    return Err(SetupError::Overlap(pos));
                }
                if destinations.iter().any(|zone| zone.contains(pos)) {
                    return Err(SetupError::InDestination(pos));
                }
                let piece = Piece { id: ids.piece_id(), owner: player.id, color: seat.color(), position: pos };
                board.place(pos, piece.id);
                player.pieces.push(piece);
            }
        }

        let winner = Seat::BOTH.into_iter().find(|seat| players[seat.index()].pieces.is_empty());
        Ok(Self {
            id,
            game_size,
            board,
            players,
            current: to_move,
            winner,
            is_over: winner.is_some(),
            destinations,
        })
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn game_size(&self) -> usize {
        self.game_size
    }

    /// Side length of the board, one more than the game size.
    pub fn board_size(&self) -> usize {
        self.board.side
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn player(&self, seat: Seat) -> &Player {
        &self.players[seat.index()]
    }

    pub fn players(&self) -> &[Player; 2] {
        &self.players
    }

    pub fn current_player(&self) -> Seat {
        self.current
    }

    pub fn winner(&self) -> Option<Seat> {
        self.winner
    }

    pub fn is_over(&self) -> bool {
        self.is_over
    }

    pub fn destination(&self, seat: Seat) -> &Zone {
        &self.destinations[seat.index()]
    }

    /// The piece standing on `pos`, with the seat that owns it.
    pub fn piece_at(&self, pos: Position) -> Option<(Seat, &Piece)> {
        let id = self.board.get(pos)?;
        Seat::BOTH.into_iter()
            .find_map(|seat| self.player(seat).piece(id).map(|piece| (seat, piece)))
    }

    /// Identity-preserving deep copy.
    pub fn snapshot(&self) -> GameState {
        self.clone()
    }

    /// Deep copy with a new game id and new player and piece ids.
    pub fn clone_fresh(&self, ids: &IdSource) -> GameState {
        let players = [self.players[0].clone_fresh(ids), self.players[1].clone_fresh(ids)];
        let mut board = Board::new(self.board.side);
        for piece in players.iter().flat_map(|p| p.pieces.iter()) {
            board.place(piece.position, piece.id);
        }
        GameState {
            id: ids.game_id(),
            game_size: self.game_size,
            board,
            players,
            current: self.current,
            winner: self.winner,
            is_over: self.is_over,
            destinations: self.destinations.clone(),
        }
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let side = self.board.side as i32;
        for x in 0..side {
            let row: Vec<String> = (0..side)
                .map(|y| match self.piece_at(Position::new(x, y)) {
                    Some((_, piece)) => piece.color.to_string(),
                    None => "_".to_string(),
                })
                .collect();
            if x > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", row.join(" | "))?;
        }
        Ok(())
    }
}

impl Serialize for GameState {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error> where S: Serializer {
        let mut s = serializer.serialize_struct("GameState", 6)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("size", &self.game_size)?;
        s.serialize_field("current_player", &self.current)?;
        s.serialize_field("winner", &self.winner)?;
        s.serialize_field("is_over", &self.is_over)?;
        s.serialize_field("players", &self.players)?;
        s.end()
    }
}
