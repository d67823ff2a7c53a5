//! The server's RPC surface: two methods over a framed TCP exchange.
//!
//! One request per connection:
//!
//! ```text
//! request : method(1) ∥ length(4, BE) ∥ body
//! response: status(1) ∥ length(4, BE) ∥ body
//! ```
//!
//! `GetKeys` returns the marshalled keylist unchanged; `Decrypt` returns
//! the marshalled response message. Failures are reported as a bare error
//! status with an empty body, so the peer learns nothing about which layer
//! refused the request.

use std::{io, sync::Arc};

use cypherlock_core::Clock;
use rand::rngs::OsRng;
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpListener,
};

use crate::{Persistence, RatchetServer};

/// Request the marshalled keylist.
pub const METHOD_GET_KEYS: u8 = 0x01;
/// Request decryption of an oracle message.
pub const METHOD_DECRYPT: u8 = 0x02;

/// Success status.
pub const STATUS_OK: u8 = 0x00;
/// Generic failure status.
pub const STATUS_ERROR: u8 = 0x01;

/// Upper bound on request and response bodies.
pub const MAX_BODY_SIZE: u32 = 1024 * 1024;

/// Accept connections forever, one request per connection.
pub async fn serve<P: Persistence, C: Clock>(
    listener: TcpListener,
    server: Arc<RatchetServer<P, C>>,
) -> io::Result<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(%peer, "connection accepted");
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &server).await {
                tracing::debug!(%peer, error = %e, "connection failed");
            }
        });
    }
}

/// Serve a single request on an established stream.
pub async fn handle_connection<S, P, C>(
    mut stream: S,
    server: &RatchetServer<P, C>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    P: Persistence,
    C: Clock,
{
    let method = stream.read_u8().await?;
    let len = stream.read_u32().await?;
    if len > MAX_BODY_SIZE {
        write_frame(&mut stream, STATUS_ERROR, &[]).await?;
        return Ok(());
    }
    let mut body = vec![0u8; len as usize];
    stream.read_exact(&mut body).await?;

    match method {
        METHOD_GET_KEYS => {
            let keys = server.get_keys();
            write_frame(&mut stream, STATUS_OK, &keys).await?;
        }
        METHOD_DECRYPT => match server.decrypt(&body, &mut OsRng).await {
            Ok(response) => write_frame(&mut stream, STATUS_OK, &response).await?,
            Err(e) => {
                // Collapse to a generic failure; the error detail stays in
                // the server log.
                tracing::debug!(error = %e, "decrypt refused");
                write_frame(&mut stream, STATUS_ERROR, &[]).await?;
            }
        },
        _ => {
            write_frame(&mut stream, STATUS_ERROR, &[]).await?;
        }
    }
    stream.flush().await?;
    Ok(())
}

async fn write_frame<S: AsyncWrite + Unpin>(
    stream: &mut S,
    status: u8,
    body: &[u8],
) -> io::Result<()> {
    stream.write_u8(status).await?;
    stream.write_u32(body.len() as u32).await?;
    stream.write_all(body).await?;
    Ok(())
}
