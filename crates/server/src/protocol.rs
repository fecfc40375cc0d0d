// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire framing for daemon communication.
//!
//! Format: 4-byte length prefix (big-endian) + JSON payload.

use jv_wire::{Command, Reply};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted frame. Oversized frames are a protocol error, not an
/// allocation.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Default per-operation I/O timeout.
pub const IO_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(u32),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("io: {0}")]
    Io(String),
}

impl From<std::io::Error> for ProtocolError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtocolError::ConnectionClosed
        } else {
            ProtocolError::Io(e.to_string())
        }
    }
}

async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Vec<u8>, ProtocolError> {
    let frame = tokio::time::timeout(timeout, async {
        let len = reader.read_u32().await?;
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::FrameTooLarge(len));
        }
        let mut buf = vec![0u8; len as usize];
        reader.read_exact(&mut buf).await?;
        Ok(buf)
    })
    .await
    .map_err(|_| ProtocolError::Timeout)??;
    Ok(frame)
}

async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    if payload.len() as u64 > MAX_FRAME_LEN as u64 {
        return Err(ProtocolError::FrameTooLarge(payload.len() as u32));
    }
    tokio::time::timeout(timeout, async {
        writer.write_u32(payload.len() as u32).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;
        Ok::<(), std::io::Error>(())
    })
    .await
    .map_err(|_| ProtocolError::Timeout)??;
    Ok(())
}

pub async fn read_command<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Command, ProtocolError> {
    let frame = read_frame(reader, timeout).await?;
    serde_json::from_slice(&frame).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

pub async fn write_reply<W: AsyncWrite + Unpin>(
    writer: &mut W,
    reply: &Reply,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let payload =
        serde_json::to_vec(reply).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    write_frame(writer, &payload, timeout).await
}

/// Write one hub-event envelope on a subscribed connection.
pub async fn write_event_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    write_frame(writer, payload, timeout).await
}

/// Client-side helpers, used by tests and future tooling.
pub async fn write_command<W: AsyncWrite + Unpin>(
    writer: &mut W,
    command: &Command,
    timeout: std::time::Duration,
) -> Result<(), ProtocolError> {
    let payload =
        serde_json::to_vec(command).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    write_frame(writer, &payload, timeout).await
}

pub async fn read_reply<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Reply, ProtocolError> {
    let frame = read_frame(reader, timeout).await?;
    serde_json::from_slice(&frame).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// Read one raw frame (event envelopes on subscribed connections).
pub async fn read_raw_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Vec<u8>, ProtocolError> {
    read_frame(reader, timeout).await
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
