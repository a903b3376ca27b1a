//! Direct WebSocket endpoint.
//!
//! Each socket gets a fresh v4 uuid as its connection id and an outbound
//! queue in the registry. A writer task drains the queue onto the socket;
//! the reader spawns one task per inbound text frame so a long stream never
//! blocks the next request on the same socket.
//!
//! Payloads arrive as text (or binary for non-UTF-8 pushes). A failed
//! request closes the socket with code 1007 or 1011 and the error detail as
//! the reason.

use axum::{
    extract::{
        State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::subsystems::comms::state::{CommsEvent, Outbound};

use super::AxumState;

/// GET /ws
pub(super) async fn upgrade(State(state): State<AxumState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, socket))
}

async fn serve_socket(state: AxumState, socket: WebSocket) {
    let connection_id = Uuid::new_v4().to_string();
    let comms = state.comms.clone();

    let mut outbound = comms.registry().register(&connection_id);
    comms.report_event(CommsEvent::ConnectionOpened { connection_id: connection_id.clone() });
    info!(channel_id = %state.channel_id, %connection_id, "socket connected");

    let (mut sender, mut receiver) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let closing = matches!(frame, Outbound::Close { .. });
            if sender.send(to_message(frame)).await.is_err() || closing {
                break;
            }
        }
        let _ = sender.close().await;
    });

    loop {
        let frame = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            frame = receiver.next() => frame,
        };

        let text = match frame {
            Some(Ok(Message::Text(text))) => text.as_str().to_owned(),
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                debug!(%connection_id, "socket read failed: {e}");
                break;
            }
            // Binary, ping and pong frames carry no requests.
            Some(Ok(_)) => continue,
        };

        let comms = comms.clone();
        let connection_id = connection_id.clone();
        tokio::spawn(async move {
            let reply = comms.handle_socket_message(&connection_id, text).await;
            if reply.is_ok() {
                return;
            }
            debug!(%connection_id, status = reply.status_code, "closing socket after failed request");
            if let Err(e) = comms.registry().send(&connection_id, Outbound::failure(&reply)).await {
                debug!(%connection_id, "close frame not delivered: {e}");
            }
        });
    }

    comms.registry().unregister(&connection_id);
    comms.report_event(CommsEvent::ConnectionClosed { connection_id: connection_id.clone() });
    info!(channel_id = %state.channel_id, %connection_id, "socket disconnected");

    // Pushes already in flight still hold queue senders; the writer stops
    // once they finish or the socket refuses a write.
    drop(writer);
}

fn to_message(frame: Outbound) -> Message {
    match frame {
        Outbound::Text(text) => Message::Text(text.into()),
        Outbound::Binary(data) => Message::Binary(data.into()),
        Outbound::Close { code, reason } => Message::Close(Some(CloseFrame { code, reason: reason.into() })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_map_to_close_frames() {
        let msg = to_message(Outbound::Close { code: 1011, reason: "upstream down".into() });
        let Message::Close(Some(frame)) = msg else {
            panic!("expected a close frame, got {msg:?}");
        };
        assert_eq!(frame.code, 1011);
        assert_eq!(frame.reason.as_str(), "upstream down");
    }

    #[test]
    fn payloads_keep_their_frame_type() {
        assert!(matches!(to_message(Outbound::Text("He".into())), Message::Text(t) if t.as_str() == "He"));
        assert!(matches!(to_message(Outbound::Binary(vec![0xff])), Message::Binary(b) if b.as_ref() == [0xff]));
    }
}
