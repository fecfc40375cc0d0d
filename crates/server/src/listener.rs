// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for handling socket I/O.
//!
//! Accepts connections and spawns a task per connection. A `Subscribe`
//! command upgrades the connection into a push stream: hub events are
//! enqueued non-blockingly by the hub closure and drained to the socket
//! by this connection's task; when the client goes away the subscriber
//! is removed and nobody else notices.

use crate::handlers::{self, ServerCtx};
use crate::protocol::{self, ProtocolError, IO_TIMEOUT};
use jv_wire::Command;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub struct Listener {
    unix: UnixListener,
    ctx: Arc<ServerCtx>,
}

impl Listener {
    pub fn new(unix: UnixListener, ctx: Arc<ServerCtx>) -> Self {
        Self { unix, ctx }
    }

    /// Accept loop; runs until the task is dropped.
    pub async fn run(self) {
        loop {
            match self.unix.accept().await {
                Ok((stream, _)) => {
                    let ctx = Arc::clone(&self.ctx);
                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        if let Err(e) = handle_connection(reader, writer, &ctx).await {
                            log_connection_error(e);
                        }
                    });
                }
                Err(e) => error!("accept error: {}", e),
            }
        }
    }
}

fn log_connection_error(e: ProtocolError) {
    match e {
        ProtocolError::ConnectionClosed => debug!("client disconnected"),
        ProtocolError::Timeout => warn!("connection timeout"),
        other => error!("connection error: {}", other),
    }
}

/// One request/response exchange — or a subscribe upgrade.
async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &Arc<ServerCtx>,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let command = protocol::read_command(&mut reader, IO_TIMEOUT).await?;

    if matches!(command, Command::Subscribe) {
        return serve_subscriber(reader, writer, ctx).await;
    }

    debug!(?command, "received command");
    let reply = handlers::handle_command(ctx, command).await;
    protocol::write_reply(&mut writer, &reply, IO_TIMEOUT).await
}

/// Turn the connection into a push stream of hub event envelopes.
async fn serve_subscriber<R, W>(
    mut reader: R,
    mut writer: W,
    ctx: &Arc<ServerCtx>,
) -> Result<(), ProtocolError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    // The hub closure must never block: serialize and enqueue; a full or
    // closed queue drops the event for this subscriber only.
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let subscriber_id = ctx.lifecycle.hub().add_subscriber(Box::new(move |event| {
        let payload = serde_json::to_vec(event).map_err(|_| ())?;
        tx.send(payload).map_err(|_| ())
    }));
    info!(subscriber = subscriber_id, "push-stream subscriber attached");

    // Acknowledge the upgrade so clients know events will follow.
    let ack = jv_wire::ok(serde_json::json!({"subscribed": subscriber_id}));
    protocol::write_reply(&mut writer, &ack, IO_TIMEOUT).await?;

    // A run may already be in flight: replay its viewer log so the new
    // observer starts from a coherent picture, flagged as a reset.
    if let Ok(Some(issue)) = ctx.lifecycle.active() {
        if let Some(mut tailer) = ctx.lifecycle.viewer_log_tailer(&issue) {
            if let Ok(read) = tailer.read_new() {
                if !read.lines.is_empty() {
                    let replay = jv_core::HubEvent::ViewerLogs(jv_core::LogLines {
                        lines: read.lines,
                        reset: true,
                    });
                    if let Ok(payload) = serde_json::to_vec(&replay) {
                        protocol::write_event_frame(&mut writer, &payload, IO_TIMEOUT).await?;
                    }
                }
            }
        }
    }

    let result = loop {
        tokio::select! {
            queued = rx.recv() => {
                match queued {
                    Some(payload) => {
                        if let Err(e) =
                            protocol::write_event_frame(&mut writer, &payload, IO_TIMEOUT).await
                        {
                            break Err(e);
                        }
                    }
                    None => break Ok(()),
                }
            }
            // The client sends nothing after subscribing; any read
            // completion means EOF or error, and either way it is gone.
            _ = detect_disconnect(&mut reader) => {
                break Ok(());
            }
        }
    };

    ctx.lifecycle.hub().remove_subscriber(subscriber_id);
    info!(subscriber = subscriber_id, "push-stream subscriber detached");
    result
}

async fn detect_disconnect<R: AsyncRead + Unpin>(reader: &mut R) {
    use tokio::io::AsyncReadExt;
    let mut buf = [0u8; 1];
    let _ = reader.read(&mut buf).await;
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
