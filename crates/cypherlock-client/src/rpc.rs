//! Blocking RPC client for the server's two-method surface.
//!
//! Same frame as the server side: `method(1) ∥ len(4, BE) ∥ body` out,
//! `status(1) ∥ len(4, BE) ∥ body` back, one request per connection.

use std::{
    io::{Read, Write},
    net::TcpStream,
    time::Duration,
};

use cypherlock_proto::{ProtoError, RatchetList};

use crate::{ClientError, RpcError};

const METHOD_GET_KEYS: u8 = 0x01;
const METHOD_DECRYPT: u8 = 0x02;
const STATUS_OK: u8 = 0x00;
const MAX_BODY_SIZE: u32 = 1024 * 1024;

/// Connect/read/write timeout for RPC calls.
const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC interface to a Cypherlock server.
pub trait ClientRpc {
    /// Fetch and parse the server's keylist. Signature verification is the
    /// caller's job.
    fn get_keylist(&self, server_url: &str) -> Result<RatchetList, ClientError>;

    /// Ask the server to decrypt an oracle message.
    fn decrypt(&self, server_url: &str, oracle_message: &[u8]) -> Result<Vec<u8>, ClientError>;
}

/// Plain-TCP RPC client.
#[derive(Debug, Clone, Default)]
pub struct TcpRpc;

impl TcpRpc {
    fn call(&self, server_url: &str, method: u8, body: &[u8]) -> Result<Vec<u8>, RpcError> {
        let mut stream = TcpStream::connect(server_url)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut request = Vec::with_capacity(5 + body.len());
        request.push(method);
        request.extend_from_slice(&(body.len() as u32).to_be_bytes());
        request.extend_from_slice(body);
        stream.write_all(&request)?;

        let mut header = [0u8; 5];
        stream.read_exact(&mut header)?;
        let status = header[0];
        let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]);
        if len > MAX_BODY_SIZE {
            return Err(RpcError::OversizedFrame);
        }
        let mut response = vec![0u8; len as usize];
        stream.read_exact(&mut response)?;

        if status != STATUS_OK {
            return Err(RpcError::ServerFailure);
        }
        Ok(response)
    }
}

impl ClientRpc for TcpRpc {
    fn get_keylist(&self, server_url: &str) -> Result<RatchetList, ClientError> {
        let body = self.call(server_url, METHOD_GET_KEYS, &[])?;
        RatchetList::parse(&body).map_err(|_| ClientError::Proto(ProtoError::Parse))
    }

    fn decrypt(&self, server_url: &str, oracle_message: &[u8]) -> Result<Vec<u8>, ClientError> {
        Ok(self.call(server_url, METHOD_DECRYPT, oracle_message)?)
    }
}
