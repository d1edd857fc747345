//! WebSocket-Adapter fuer [`VoiceTransport`]
//!
//! Pro Verbindung ein [`QueueTransport`], ein Writer-Task (Send-Queue und
//! Schliess-Signal -> Socket) und eine Lese-Schleife (Socket -> Gateway).
//! Text-Frames tragen die Registrierung, Binaer-Frames das Audio.

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parley_voice::{QueueTransport, SchliessGrund, TransportHandle, VoiceTransport};
use std::sync::Arc;

use crate::engine::SessionEngine;

/// `GET /api/speech/ws`
///
/// Frames ueber `max_frame_bytes` werden bereits von axum abgewiesen.
pub async fn ws_handler(
    State(engine): State<Arc<SessionEngine>>,
    ws: WebSocketUpgrade,
) -> Response {
    let max = engine.config().max_frame_bytes;
    ws.max_message_size(max)
        .max_frame_size(max)
        .on_upgrade(move |socket| verbindung_bearbeiten(socket, engine))
}

async fn verbindung_bearbeiten(socket: WebSocket, engine: Arc<SessionEngine>) {
    let (transport, mut send_rx) = QueueTransport::neu(engine.config().send_queue_groesse);
    let handle: TransportHandle = transport.clone();
    let gateway = engine.gateway().clone();
    let (mut ws_sender, mut ws_receiver) = socket.split();

    gateway.verbunden(&handle);

    // Writer-Task: Queue -> Socket, bei Schliess-Signal Close-Frame senden
    let mut schliess_rx = transport.schliess_signal();
    let transport_id = transport.id();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = send_rx.recv() => {
                    let Some(frame) = frame else { break };
                    if let Err(e) = ws_sender.send(Message::Binary(frame.to_vec())).await {
                        tracing::debug!(transport = %transport_id, fehler = %e, "WebSocket-Senden fehlgeschlagen");
                        break;
                    }
                }
                geaendert = schliess_rx.changed() => {
                    if geaendert.is_err() {
                        break;
                    }
                    let grund = *schliess_rx.borrow();
                    if let Some(grund) = grund {
                        let close = Message::Close(Some(CloseFrame {
                            code: grund.code(),
                            reason: grund.beschreibung().into(),
                        }));
                        if let Err(e) = ws_sender.send(close).await {
                            tracing::debug!(transport = %transport_id, fehler = %e, "Close-Frame nicht gesendet");
                        }
                        break;
                    }
                }
            }
        }
    });

    // Lese-Schleife: Socket -> Gateway
    let mut schliess_rx = transport.schliess_signal();
    loop {
        tokio::select! {
            nachricht = ws_receiver.next() => {
                match nachricht {
                    Some(Ok(Message::Text(text))) => {
                        // Fehler sind im Gateway geloggt, die Verbindung bleibt offen
                        let _ = gateway.text_empfangen(&handle, &text);
                    }
                    Some(Ok(Message::Binary(daten))) => {
                        gateway.binaer_empfangen(&handle, Bytes::from(daten)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        gateway.transport_fehler(&handle, &e);
                        break;
                    }
                }
            }
            _ = schliess_rx.changed() => {
                if transport.schliess_grund().is_some() {
                    break;
                }
            }
        }
    }

    gateway.geschlossen(&handle);
    transport.schliessen(SchliessGrund::Normal);
    if let Err(e) = writer.await {
        tracing::debug!(transport = %transport_id, fehler = %e, "Writer-Task abgebrochen");
    }
}
