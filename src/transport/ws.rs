//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each `open` spawns one I/O task that connects, then multiplexes inbound
//! frames and queued outbound frames until either side closes. The task only
//! talks to the session through the event queue, so it never touches session
//! state.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::{ConnectTarget, Transport, TransportEvent, ABNORMAL_CLOSURE};
use crate::error::TransportError;
use crate::event::{ConnectionId, EventSink, SessionEvent};

/// Frames queued for the I/O task.
#[derive(Debug)]
enum Outbound {
    Text(String),
    Close(u16, String),
}

/// [`Transport`] backed by a real WebSocket.
pub struct WsTransport {
    events: EventSink,
    connect_timeout: Duration,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    task: Option<JoinHandle<()>>,
}

impl WsTransport {
    pub fn new(events: EventSink, connect_timeout: Duration) -> Self {
        Self {
            events,
            connect_timeout,
            outbound: None,
            task: None,
        }
    }

    fn abandon(&mut self) {
        self.outbound = None;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Transport for WsTransport {
    fn open(&mut self, conn: ConnectionId, target: &ConnectTarget) -> Result<(), TransportError> {
        self.abandon();

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        self.outbound = Some(out_tx);
        self.task = Some(tokio::spawn(ws_io_loop(
            conn,
            target.url().to_string(),
            target.masked().to_string(),
            self.connect_timeout,
            out_rx,
            self.events.clone(),
        )));
        Ok(())
    }

    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let tx = self.outbound.as_ref().ok_or(TransportError::NotConnected)?;
        tx.send(Outbound::Text(text))
            .map_err(|_| TransportError::Send("connection task has exited".to_string()))
    }

    fn close(&mut self, code: u16, reason: &str) {
        // The task is left running so it can flush the close frame.
        if let Some(tx) = self.outbound.take() {
            let _ = tx.send(Outbound::Close(code, reason.to_string()));
        }
        self.task = None;
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.abandon();
    }
}

fn emit(events: &EventSink, conn: ConnectionId, event: TransportEvent) {
    // Receiver gone means the session was dropped; nothing left to notify.
    let _ = events.send(SessionEvent::Transport { conn, event });
}

fn emit_failure(events: &EventSink, conn: ConnectionId, error: String) {
    emit(events, conn, TransportEvent::Error(error.clone()));
    emit(
        events,
        conn,
        TransportEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: error,
        },
    );
}

/// Connect, then pump frames both ways until the connection ends.
async fn ws_io_loop(
    conn: ConnectionId,
    url: String,
    masked: String,
    connect_timeout: Duration,
    mut out_rx: mpsc::UnboundedReceiver<Outbound>,
    events: EventSink,
) {
    debug!(%conn, target = %masked, "WebSocket connecting");

    let ws_stream = match tokio::time::timeout(
        connect_timeout,
        tokio_tungstenite::connect_async(url.as_str()),
    )
    .await
    {
        Ok(Ok((ws_stream, _response))) => ws_stream,
        Ok(Err(e)) => {
            warn!(%conn, error = %e, "WebSocket connect failed");
            emit_failure(&events, conn, format!("WebSocket connect failed: {e}"));
            return;
        }
        Err(_) => {
            warn!(%conn, timeout_ms = connect_timeout.as_millis(), "WebSocket connect timed out");
            emit_failure(
                &events,
                conn,
                format!(
                    "WebSocket connect timed out after {}ms",
                    connect_timeout.as_millis()
                ),
            );
            return;
        }
    };

    info!(%conn, "WebSocket connected");
    emit(&events, conn, TransportEvent::Opened);

    let (mut ws_sink, mut ws_reader) = ws_stream.split();

    loop {
        tokio::select! {
            msg = ws_reader.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        emit(&events, conn, TransportEvent::Message(text.to_string()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        // 1005: closed without a status code
                        let (code, reason) = frame.map_or((1005, String::new()), |f| {
                            (u16::from(f.code), f.reason.to_string())
                        });
                        info!(%conn, code, "WebSocket closed by gateway");
                        emit(&events, conn, TransportEvent::Closed { code, reason });
                        return;
                    }
                    Some(Ok(_)) => {} // tungstenite answers pings itself
                    Some(Err(e)) => {
                        warn!(%conn, error = %e, "WebSocket error");
                        emit_failure(&events, conn, e.to_string());
                        return;
                    }
                    None => {
                        warn!(%conn, "WebSocket stream ended without close frame");
                        emit(&events, conn, TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: "connection lost".to_string(),
                        });
                        return;
                    }
                }
            }
            out = out_rx.recv() => {
                match out {
                    Some(Outbound::Text(text)) => {
                        if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                            warn!(%conn, error = %e, "WebSocket send failed");
                            emit(&events, conn, TransportEvent::Error(format!("Send failed: {e}")));
                        }
                    }
                    Some(Outbound::Close(code, reason)) => {
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.clone().into(),
                        };
                        if let Err(e) = ws_sink.send(Message::Close(Some(frame))).await {
                            debug!(%conn, error = %e, "close frame not delivered");
                        }
                        let _ = ws_sink.close().await;
                        emit(&events, conn, TransportEvent::Closed { code, reason });
                        return;
                    }
                    None => {
                        // Transport abandoned this connection.
                        let _ = ws_sink.close().await;
                        return;
                    }
                }
            }
        }
    }
}
