//! Manages the WebSocket connection lifecycle of a debate session.
//!
//! The channel drives the session until it either suspends for the human or
//! concludes. On suspension the next text frame from the client becomes the
//! human's turn and the debate resumes. Text sent before the `input_request`
//! is discarded. Failures are reported with an `error` frame and a close frame.

use super::protocol::ServerMessage;
use crate::state::AppState;
use anyhow::Result;
use axum::{
    extract::{
        Path, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code},
    },
    response::Response,
};
use debate_core::{DebateError, DebateEvent, SessionRegistry};
use futures_util::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

const INVALID_SESSION: &str = "Invalid or expired session. Create a debate session first.";

/// Axum handler to upgrade an HTTP connection to a debate WebSocket.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

#[instrument(name = "ws_session", skip_all, fields(session_id = %session_id))]
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    info!("New debate WebSocket connection.");
    let (mut socket_tx, mut socket_rx) = socket.split();

    if let Err(e) =
        run_debate_channel(&state.sessions, &session_id, &mut socket_tx, &mut socket_rx).await
    {
        error!(error = ?e, "Debate channel terminated with error.");
    }
    info!("Debate WebSocket connection finished.");
}

/// Relays debate events to the client until the debate ends or the client leaves.
pub(crate) async fn run_debate_channel<S, R>(
    sessions: &SessionRegistry,
    session_id: &str,
    socket_tx: &mut S,
    socket_rx: &mut R,
) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    if !sessions.is_valid(session_id).await? {
        warn!("Rejecting connection for an unknown session.");
        return close_with_error(socket_tx, INVALID_SESSION, close_code::POLICY, "invalid session")
            .await;
    }

    loop {
        let mut events = match sessions.resume(session_id).await {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "Could not resume debate.");
                let code = match &e {
                    DebateError::SessionBusy(_) => close_code::AGAIN,
                    _ => close_code::ERROR,
                };
                return close_with_error(socket_tx, e.to_string(), code, "debate unavailable")
                    .await;
            }
        };

        let mut awaiting_input = false;
        while let Some(event) = events.next().await {
            match event {
                Ok(DebateEvent::Concluded { winner }) => {
                    send_msg(socket_tx, ServerMessage::concluded(winner)).await?;
                    socket_tx.send(Message::Close(None)).await?;
                    return Ok(());
                }
                Ok(DebateEvent::InputRequested) => {
                    if !discard_unrequested(socket_rx)? {
                        info!("Client disconnected before being asked for input.");
                        return Ok(());
                    }
                    awaiting_input = true;
                    send_msg(socket_tx, DebateEvent::InputRequested.into()).await?;
                }
                Ok(event) => send_msg(socket_tx, event.into()).await?,
                Err(e) => {
                    warn!(error = %e, "Debate turn failed.");
                    return close_with_error(
                        socket_tx,
                        e.to_string(),
                        close_code::ERROR,
                        "debate turn failed",
                    )
                    .await;
                }
            }
        }

        if !awaiting_input {
            return Ok(());
        }

        let Some(text) = next_text(socket_rx).await? else {
            info!("Client disconnected while the debate awaited input.");
            return Ok(());
        };
        if let Err(e) = sessions.submit_human_input(session_id, &text).await {
            warn!(error = %e, "Human input rejected.");
            return close_with_error(socket_tx, e.to_string(), close_code::ERROR, "input rejected")
                .await;
        }
    }
}

/// Drops frames the client sent before it was asked for input, so text typed
/// during an AI turn never becomes the human's turn. Returns `false` once the
/// client has gone.
fn discard_unrequested<R>(socket_rx: &mut R) -> Result<bool>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(next) = socket_rx.next().now_or_never() {
        match next {
            None | Some(Ok(Message::Close(_))) => return Ok(false),
            Some(Ok(Message::Text(text))) => {
                debug!(bytes = text.len(), "Discarding text sent before the input request.");
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }
    Ok(true)
}

/// Waits for the client's next text frame; `None` once the client is gone.
async fn next_text<R>(socket_rx: &mut R) -> Result<Option<String>>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(msg) = socket_rx.next().await {
        match msg? {
            Message::Text(text) => return Ok(Some(text.to_string())),
            Message::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

/// Reports `content` to the client, then closes the channel with `code`.
async fn close_with_error<S>(
    socket_tx: &mut S,
    content: impl Into<String>,
    code: u16,
    reason: &'static str,
) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    send_msg(socket_tx, ServerMessage::error(content)).await?;
    socket_tx
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await?;
    Ok(())
}

/// Sends a `ServerMessage` to the client as a JSON text frame.
pub(crate) async fn send_msg<S>(socket_tx: &mut S, msg: ServerMessage) -> Result<()>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let serialized = serde_json::to_string(&msg)?;
    socket_tx.send(Message::Text(serialized.into())).await?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::tests::app_state;
    use debate_core::state::{Role, Side};
    use futures_util::{sink, stream};
    use serde_json::{Value, json};
    use std::{
        collections::VecDeque,
        convert::Infallible,
        pin::Pin,
        sync::{Arc, Mutex},
    };
    use tokio::sync::mpsc;

    type PeerSink = Pin<Box<dyn Sink<Message, Error = Infallible> + Send>>;
    type PeerStream = Pin<Box<dyn Stream<Item = Result<Message, axum::Error>> + Send>>;

    /// A browser stand-in. It records every frame it receives and answers
    /// each `input_request` with the next reply, or hangs up when none is
    /// left. `early` frames are queued before the debate starts.
    fn peer(early: &[&str], replies: &[&str]) -> (PeerSink, PeerStream, Arc<Mutex<Vec<Message>>>) {
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        for text in early {
            tx.send(Message::Text((*text).into())).unwrap();
        }
        let replies: VecDeque<String> = replies.iter().map(|r| r.to_string()).collect();
        let received = Arc::new(Mutex::new(Vec::new()));

        let log = received.clone();
        let socket_tx = sink::unfold((tx, replies), move |(tx, mut replies), msg: Message| {
            let log = log.clone();
            async move {
                if let Message::Text(text) = &msg {
                    if text.as_str().contains(r#""type":"input_request""#) {
                        let answer = match replies.pop_front() {
                            Some(reply) => Message::Text(reply.into()),
                            None => Message::Close(None),
                        };
                        let _ = tx.send(answer);
                    }
                }
                log.lock().unwrap().push(msg);
                Ok::<_, Infallible>((tx, replies))
            }
        });
        let socket_rx = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (Ok(msg), rx))
        });
        (Box::pin(socket_tx), Box::pin(socket_rx), received)
    }

    fn frames(received: &Mutex<Vec<Message>>) -> Vec<Value> {
        received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|msg| match msg {
                Message::Text(text) => Some(serde_json::from_str(text.as_str()).unwrap()),
                _ => None,
            })
            .collect()
    }

    fn close_code_of(received: &Mutex<Vec<Message>>) -> Option<u16> {
        match received.lock().unwrap().last() {
            Some(Message::Close(Some(frame))) => Some(frame.code),
            Some(Message::Close(None)) => Some(close_code::NORMAL),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_invalid_session_is_closed_with_policy_violation() {
        let state = app_state(vec![]);
        let (mut socket_tx, mut socket_rx, received) = peer(&[], &[]);

        run_debate_channel(&state.sessions, "ghost", &mut socket_tx, &mut socket_rx)
            .await
            .unwrap();

        assert_eq!(
            frames(&received),
            vec![json!({"type": "error", "content": INVALID_SESSION})]
        );
        assert_eq!(close_code_of(&received), Some(close_code::POLICY));
    }

    #[tokio::test]
    async fn test_debate_with_human_turn_until_verdict() {
        let state = app_state(vec![
            json!({"script": "Negative side, your opening.", "next_speaker": "negative"}),
            json!({"script": "Judge, your verdict.", "next_speaker": "judge"}),
            json!({"script": "Negative argued better.", "winner": "negative"}),
        ]);
        let session_id = state
            .sessions
            .create("Homework should be banned", Side::Negative, None)
            .await
            .unwrap();

        let (mut socket_tx, mut socket_rx, received) = peer(&[], &["my rebuttal"]);
        run_debate_channel(&state.sessions, &session_id, &mut socket_tx, &mut socket_rx)
            .await
            .unwrap();

        let frames = frames(&received);
        assert_eq!(frames[0], json!({"type": "node", "node": "moderator"}));
        let request = frames
            .iter()
            .position(|f| f["type"] == "input_request")
            .unwrap();
        assert_eq!(frames[request - 1], json!({"type": "node", "node": "human"}));
        assert!(frames.contains(&json!({
            "type": "message",
            "node": "judge",
            "content": "Negative argued better.",
            "is_final": true
        })));
        assert_eq!(
            frames.last(),
            Some(&json!({"type": "status", "content": "The debate has ended. Winner: negative"}))
        );
        assert_eq!(close_code_of(&received), Some(close_code::NORMAL));

        let snapshot = state.sessions.snapshot(&session_id).await.unwrap();
        let roles: Vec<Role> = snapshot.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::Moderator, Role::Negative, Role::Moderator, Role::Judge]
        );
        assert_eq!(snapshot.messages[1].content, "my rebuttal");
    }

    #[tokio::test]
    async fn test_text_sent_before_input_request_is_discarded() {
        let state = app_state(vec![
            json!({"script": "Positive side, begin.", "next_speaker": "positive"}),
            json!({"script": "Verdict time.", "next_speaker": "judge"}),
            json!({"script": "Positive wins.", "winner": "positive"}),
        ]);
        let session_id = state
            .sessions
            .create("X", Side::Positive, None)
            .await
            .unwrap();

        let (mut socket_tx, mut socket_rx, _received) =
            peer(&["typed too soon"], &["my opening"]);
        run_debate_channel(&state.sessions, &session_id, &mut socket_tx, &mut socket_rx)
            .await
            .unwrap();

        let snapshot = state.sessions.snapshot(&session_id).await.unwrap();
        let human: Vec<&str> = snapshot
            .messages
            .iter()
            .filter(|m| m.role == Role::Positive)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(human, vec!["my opening"]);
        assert!(snapshot.is_concluded());
    }

    #[tokio::test]
    async fn test_client_leaving_at_input_request_keeps_state() {
        let state = app_state(vec![json!({
            "script": "Positive side, begin.",
            "next_speaker": "positive"
        })]);
        let session_id = state
            .sessions
            .create("X", Side::Positive, None)
            .await
            .unwrap();

        let (mut socket_tx, mut socket_rx, received) = peer(&[], &[]);
        run_debate_channel(&state.sessions, &session_id, &mut socket_tx, &mut socket_rx)
            .await
            .unwrap();

        assert_eq!(
            frames(&received).last(),
            Some(&json!({"type": "input_request", "node": "human"}))
        );
        let snapshot = state.sessions.snapshot(&session_id).await.unwrap();
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.next_speaker, Some(Role::Positive));
    }

    #[tokio::test]
    async fn test_failed_turn_is_reported_and_closed() {
        let state = app_state(vec![json!({"script": "Me again.", "next_speaker": "moderator"})]);
        let session_id = state
            .sessions
            .create("X", Side::Positive, None)
            .await
            .unwrap();

        let (mut socket_tx, mut socket_rx, received) = peer(&[], &[]);
        run_debate_channel(&state.sessions, &session_id, &mut socket_tx, &mut socket_rx)
            .await
            .unwrap();

        let frames = frames(&received);
        let last = frames.last().unwrap();
        assert_eq!(last["type"], "error");
        assert!(last["content"].as_str().unwrap().contains("contract violation"));
        assert_eq!(close_code_of(&received), Some(close_code::ERROR));
    }
}
