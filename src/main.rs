use std::io::{Error, ErrorKind};
use std::sync::{Arc, Mutex, MutexGuard};
use clap::Parser;
use log::{info, error};
use tokio::net::{TcpListener, TcpStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::protocol::Message;
use dodgem_engine::{Game, Move, Player, Seat, DEFAULT_DEPTH, MAX_GAME_SIZE};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(long, default_value = "localhost")]
    host: String,
    #[arg(long, default_value_t = 999)]
    port: u16,
    /// Game size used when the client does not pick one
    #[arg(long, default_value_t = 3)]
    size: usize,
    /// Largest game size a client may ask for
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u16).range(2..=MAX_GAME_SIZE as i64))]
    max_size: u16,
    /// Engine search depth in plies
    #[arg(long, default_value_t = DEFAULT_DEPTH)]
    depth: u32,
    #[arg(long, default_value_t = log::Level::Info)]
    log_level: log::Level,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    simple_logger::init_with_level(args.log_level)
        .map_err(|e| Error::new(ErrorKind::Other, e))?;

    let address = format!("{}:{}", args.host, args.port);

    // Bind the server to a local port
    let listener = TcpListener::bind(address.clone()).await?;
    info!("Listening on: {}", address);

    while let Ok((stream, _)) = listener.accept().await {
        tokio::spawn(accept_connection(stream, args.clone()));
    }

    Ok(())
}

/// One browser front-end: a human playing the first seat against the engine.
struct Session {
    default_size: usize,
    max_size: usize,
    depth: u32,
    game: Option<Game>,
}

impl Session {
    fn new(args: &Args) -> Self {
        Self {
            default_size: args.size,
            max_size: usize::from(args.max_size),
            depth: args.depth,
            game: None,
        }
    }
}

async fn accept_connection(stream: TcpStream, args: Args) -> Result<(), Error> {
    let addr = stream.peer_addr()?;
    info!("Peer address: {}", addr);

    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| Error::new(ErrorKind::ConnectionAborted, e))?;
    info!("New WebSocket connection: {}", addr);

    let (mut write, mut read) = ws_stream.split();

    let session = Arc::new(Mutex::new(Session::new(&args)));

    while let Some(raw_message) = read.next().await {
        match raw_message {
            Ok(text_message) => {
                if !text_message.is_text() && !text_message.is_binary() { continue; }
                match serde_json::from_slice::<Value>(&text_message.into_data()) {
                    Ok(data) => {
                        info!("Received: {}", data);
                        let result: Result<Value, Error> = handle_message(&session, data).await;
                        let response = match result {
                            Ok(resp) => resp,
                            Err(e) => {
                                error!("Error handling message: {:?}", e);
                                json!({"error": e.to_string()})
                            }
                        };
                        let response_str = response.to_string();
                        if let Err(e) = write.send(Message::text(response_str.clone())).await {
                            error!("Failed to send message {}: {:?}", response_str, e);
                            break;
                        }
                        info!("Sent: {}", response_str);
                    },
                    Err(e) => { error!("Error parsing JSON: {:?}", e); }
                }
            }
            Err(e) => { error!("Error reading websocket message: {:?}", e); }
        }
    }

    info!("Connection closed: {}", addr);
    Ok(())
}

fn invalid_input<E>(e: E) -> Error where E: Into<Box<dyn std::error::Error + Send + Sync>> {
    Error::new(ErrorKind::InvalidInput, e)
}

fn lock_session(session: &Arc<Mutex<Session>>) -> Result<MutexGuard<'_, Session>, Error> {
    session.lock().map_err(|_| Error::new(ErrorKind::Other, "Session lock poisoned"))
}

/// What is left to do once the client's message has been applied.
enum Step {
    Reply(Value),
    // the engine searches a copy of the game without holding the session
    EngineTurn(Game),
}

async fn handle_message(session: &Arc<Mutex<Session>>, data: Value) -> Result<Value, Error> {
    let step = {
        let mut session = lock_session(session)?;

        let map = data.as_object()
            .ok_or_else(|| invalid_input("Expected a dict"))?;

        // client message protocol: "start", "move"
        // server message protocol: "state", "move", "legal_moves", "error", "end"
        if map.contains_key("start") {
            let size = requested_size(&data["start"]["size"], &session)?;
            Step::Reply(handle_start(&mut session, size)?)
        } else if map.contains_key("move") {
            let game = session.game.as_mut()
                .ok_or_else(|| invalid_input("Game has not started yet"))?;
            let mv: Move = serde_json::from_value(data["move"].clone())?;
            handle_move(game, mv)?
        } else {
            return Err(invalid_input(format!("Invalid message: {}", data)));
        }
    };

    match step {
        Step::Reply(response) => Ok(response),
        Step::EngineTurn(mut search_game) => {
            let selected_move = tokio::task::spawn_blocking(move || search_game.request_ai_move())
                .await
                .map_err(|e| Error::new(ErrorKind::Other, e))?;
            let mut session = lock_session(session)?;
            let game = session.game.as_mut()
                .ok_or_else(|| invalid_input("Game has not started yet"))?;
            make_engine_move(game, selected_move)
        }
    }
}

fn requested_size(value: &Value, session: &Session) -> Result<usize, Error> {
    if value.is_null() {
        return Ok(session.default_size);
    }
    let size = value.as_u64()
        .and_then(|size| usize::try_from(size).ok())
        .ok_or_else(|| invalid_input(format!("Invalid game size: {}", value)))?;
    if size > session.max_size {
        return Err(invalid_input(format!("Game size {} exceeds the limit of {}", size, session.max_size)));
    }
    Ok(size)
}

fn handle_start(session: &mut Session, size: usize) -> Result<Value, Error> {
    let mut game = Game::new(size).map_err(invalid_input)?.with_depth(session.depth);
    let human = Player::new(game.ids(), "human", false);
    let engine = Player::new(game.ids(), "engine", true);
    game.start(human, engine).map_err(invalid_input)?;
    let response = json!({ "state": game.state(), "legal_moves": game.legal_moves() });
    session.game = Some(game);
    Ok(response)
}

fn handle_move(game: &mut Game, mv: Move) -> Result<Step, Error> {
    game.try_play_turn(mv).map_err(invalid_input)?;
    match check_game_over(game) {
        Some(game_over) => Ok(Step::Reply(game_over)),
        None => Ok(Step::EngineTurn(game.snapshot())),
    }
}

fn make_engine_move(game: &mut Game, selected_move: Option<Move>) -> Result<Value, Error> {
    if let Some(mv) = selected_move {
        game.try_play_turn(mv).map_err(invalid_input)?;
    }
    match check_game_over(game) {
        Some(game_over) => Ok(game_over),
        None => Ok(json!({ "move": selected_move, "state": game.state(), "legal_moves": game.legal_moves() }))
    }
}

fn check_game_over(game: &Game) -> Option<Value> {
    let state = game.state()?;
    if !state.is_over() {
        return None;
    }
    let winner = state.winner().map(Seat::index);
    Some(json!({ "end": winner, "state": state }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Arc<Mutex<Session>> {
        let args = Args::parse_from(["dodgem-engine", "--depth", "2"]);
        Arc::new(Mutex::new(Session::new(&args)))
    }

    #[tokio::test]
    async fn start_lists_human_moves() {
        let session = session();
        let resp = handle_message(&session, json!({ "start": { "size": 3 } })).await.unwrap();
        assert_eq!(resp["state"]["size"], 3);
        assert_eq!(resp["state"]["current_player"], 0);
        assert_eq!(resp["legal_moves"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn move_before_start_is_rejected() {
        let session = session();
        let err = handle_message(&session, json!({ "move": { "piece": 1, "to": [2, 1] } })).await;
        assert_eq!(err.unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn engine_answers_a_human_move() {
        let session = session();
        let resp = handle_message(&session, json!({ "start": {} })).await.unwrap();
        let first = resp["legal_moves"][0].clone();
        let resp = handle_message(&session, json!({ "move": first })).await.unwrap();
        assert!(resp["move"].is_object());
        assert_eq!(resp["state"]["current_player"], 0);
    }

    #[tokio::test]
    async fn illegal_move_is_reported() {
        let session = session();
        let resp = handle_message(&session, json!({ "start": { "size": 3 } })).await.unwrap();
        let piece = resp["legal_moves"][0]["piece"].clone();
        let err = handle_message(&session, json!({ "move": { "piece": piece, "to": [1, 1] } })).await;
        assert!(err.unwrap_err().to_string().contains("single orthogonal step"));
    }

    #[tokio::test]
    async fn oversized_start_is_refused() {
        let session = session();
        for size in [json!(9), json!(10_000), json!(4_294_967_299u64), json!(-3), json!("big")] {
            let err = handle_message(&session, json!({ "start": { "size": size } })).await;
            assert_eq!(err.unwrap_err().kind(), ErrorKind::InvalidInput);
        }
        assert!(lock_session(&session).unwrap().game.is_none());

        let resp = handle_message(&session, json!({ "start": { "size": 8 } })).await.unwrap();
        assert_eq!(resp["state"]["size"], 8);
    }

    #[tokio::test]
    async fn engine_reply_is_applied_to_the_session_game() {
        let session = session();
        let resp = handle_message(&session, json!({ "start": { "size": 3 } })).await.unwrap();
        let first = resp["legal_moves"][0].clone();
        let resp = handle_message(&session, json!({ "move": first })).await.unwrap();
        let session = lock_session(&session).unwrap();
        let state = session.game.as_ref().and_then(Game::state).unwrap();
        assert_eq!(serde_json::to_value(state).unwrap(), resp["state"]);
        assert_eq!(state.current_player(), Seat::First);
    }

    #[tokio::test]
    async fn unknown_message_is_rejected() {
        let session = session();
        assert!(handle_message(&session, json!({ "hello": true })).await.is_err());
        assert!(handle_message(&session, json!([1, 2])).await.is_err());
    }
}
