//! IPC transport between the host and its UI processes.
//!
//! # Sub-modules
//!
//! - **`server`** – Accepts UI connections on loopback TCP, runs the `Hello`
//!   handshake, and drives one reader task per connection that delivers
//!   inbound events to the host's [`libria_core::InboundListeners`].
//!
//! - **`window`** – [`window::WindowHandle`], the host-side [`libria_core::UiSurface`]
//!   for one connection.  Sends are queued on an unbounded channel drained by
//!   a writer task, so they never block the caller.

pub mod server;
pub mod window;

use std::net::SocketAddr;

use libria_core::protocol::{
    decode_message, payload_len_from_header, ChannelMessage, ProtocolError, HEADER_SIZE,
};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

pub use server::{IpcServer, IpcServerConfig, ServerHandle, SurfaceEvent};
pub use window::WindowHandle;

/// Errors raised by the IPC layer.
#[derive(Debug, Error)]
pub enum IpcError {
    #[error("bind failed on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("no Hello received within {0:?}")]
    HelloTimeout(std::time::Duration),
    #[error("expected Hello, got {0:?}")]
    UnexpectedFirstFrame(libria_core::protocol::MessageType),
}

/// Reads one frame: the 24-byte header, then exactly the declared payload.
///
/// Returns `Ok(None)` on a clean end of stream before a new header.
pub(crate) async fn read_frame<R>(reader: &mut R) -> Result<Option<ChannelMessage>, IpcError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    if let Err(e) = reader.read_exact(&mut header).await {
        return if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Ok(None)
        } else {
            Err(e.into())
        };
    }
    let payload_len = payload_len_from_header(&header)?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload_len);
    frame.extend_from_slice(&header);
    frame.resize(HEADER_SIZE + payload_len, 0);
    reader.read_exact(&mut frame[HEADER_SIZE..]).await?;

    let (msg, _) = decode_message(&frame)?;
    Ok(Some(msg))
}
