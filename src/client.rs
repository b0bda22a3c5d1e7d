//! The client side of a transfer: three entry points (`get`, `put`,
//! `delete`) built on top of the same session engine the server uses, plus
//! the handshake logic that differs between opcodes on the client's end.

use std::io;
use std::net::SocketAddr;
use std::path::Path;

use log::{debug, info, warn};
use tokio::fs::OpenOptions;
use tokio::net::UdpSocket;

use crate::term::TerminationFlag;
use crate::tftp::codec::{self, ErrorCode, Mode, Packet, RequestKind};
use crate::tftp::consts;
use crate::tftp::session;
use crate::tftp::socket::{self, Role};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
	#[error("i/o error: {0}")]
	Io(#[from] io::Error),
	#[error("server reported error {code}: {message}")]
	ServerError { code: ErrorCode, message: String },
	#[error("no response from server after {0} attempts")]
	NoResponse(u8),
	#[error("server sent an unexpected reply")]
	UnexpectedReply,
	#[error("transfer failed: {0}")]
	Session(#[from] session::SessionError),
	#[error("wire codec error: {0}")]
	Codec(#[from] codec::CodecError),
}

/// Downloads `remote_name` from `server` into `local_path`. On any failure
/// the partially-written local file is removed.
pub async fn get(server: SocketAddr, remote_name: &str, local_path: &Path, blocksize: u16, term: &TerminationFlag) -> Result<(), ClientError> {
	let socket = socket::bind_ephemeral(Role::Client).await?;

	let request = codec::encode_request(RequestKind::Read, remote_name, Mode::Octet, Some(blocksize));
	let (first, peer) = send_request_and_await_first(&socket, server, &request, term).await?;
	let first_data = match first {
		FirstResponse::Data { block, payload } => (block, payload),
		FirstResponse::Ack(_) => return Err(ClientError::UnexpectedReply),
	};

	/* Only now do we know the session's real TID: the server answers from a
	 * fresh ephemeral port, never from the well-known request port. */
	socket.connect(peer).await?;

	let file = OpenOptions::new().create(true).write(true).truncate(true).open(local_path).await?;

	match session::receive_file(&socket, file, blocksize, term, Some(first_data)).await {
		Ok(state) => {
			info!("downloaded {} bytes in {} blocks in {:.2}s", state.bytes_transferred, state.blocks_transferred, state.elapsed().as_secs_f64());
			Ok(())
		}
		Err(e) => {
			let _ = tokio::fs::remove_file(local_path).await;
			Err(e.into())
		}
	}
}

/// Uploads `local_path` to `server` under `remote_name`.
pub async fn put(server: SocketAddr, local_path: &Path, remote_name: &str, blocksize: u16, term: &TerminationFlag) -> Result<(), ClientError> {
	let file = OpenOptions::new().read(true).open(local_path).await?;

	let socket = socket::bind_ephemeral(Role::Client).await?;

	let request = codec::encode_request(RequestKind::Write, remote_name, Mode::Octet, Some(blocksize));
	/* A WRQ handshake is a plain ACK(0); unlike RRQ there's no leading DATA to lose. */
	let (first, peer) = send_request_and_await_first(&socket, server, &request, term).await?;
	match first {
		FirstResponse::Ack(0) => {}
		FirstResponse::Ack(other) => {
			warn!("server acked unexpected block {other} for the write handshake");
			return Err(ClientError::UnexpectedReply);
		}
		FirstResponse::Data { .. } => return Err(ClientError::UnexpectedReply),
	}

	socket.connect(peer).await?;

	let state = session::send_file(&socket, file, blocksize, term).await?;
	info!("uploaded {} bytes in {} blocks in {:.2}s", state.bytes_transferred, state.blocks_transferred, state.elapsed().as_secs_f64());
	Ok(())
}

/// Deletes `remote_name` on `server`. The server acknowledges twice: once
/// to accept the request, once to confirm the file is actually gone.
pub async fn delete(server: SocketAddr, remote_name: &str, term: &TerminationFlag) -> Result<(), ClientError> {
	let socket = socket::bind_ephemeral(Role::Client).await?;

	let request = codec::encode_request(RequestKind::Delete, remote_name, Mode::Octet, None);
	let (first, peer) = send_request_and_await_first(&socket, server, &request, term).await?;
	match first {
		FirstResponse::Ack(0) => {}
		_ => return Err(ClientError::UnexpectedReply),
	}

	socket.connect(peer).await?;

	await_ack(&socket, 1, term).await?;
	info!("deleted {remote_name} on server");
	Ok(())
}

enum FirstResponse {
	Data { block: u16, payload: Vec<u8> },
	Ack(u16),
}

/// Sends the request packet to `server` (the well-known request port) on an
/// as-yet-unconnected `socket` and waits for the first reply, retrying on
/// timeout up to the shared retry limit. The server answers from a freshly
/// bound session port, never from `server` itself, so this cannot `connect()`
/// up front; it validates the reply's source address instead and hands the
/// discovered peer back to the caller, which connects only once the real TID
/// is known. A server ERROR or a malformed reply both end the attempt
/// immediately.
async fn send_request_and_await_first(socket: &UdpSocket, server: SocketAddr, request: &[u8], term: &TerminationFlag) -> Result<(FirstResponse, SocketAddr), ClientError> {
	let mut attempts: u8 = 0;
	let mut buf = vec![0u8; consts::MAX_BLOCK_SIZE as usize + 4];

	loop {
		if term.is_set() {
			return Err(ClientError::Session(session::SessionError::Terminated));
		}

		socket.send_to(request, server).await?;

		match socket::recv_with_timeout(socket, &mut buf).await? {
			None => {
				attempts += 1;
				if attempts >= consts::MAX_RETRIES {
					return Err(ClientError::NoResponse(attempts));
				}
			}
			Some((_len, from)) if from.ip() != server.ip() => {
				debug!("ignoring reply from unexpected address {from}, expected {}", server.ip());
				continue;
			}
			Some((len, from)) => match Packet::decode(&buf[..len])? {
				Packet::Data { block, payload } => return Ok((FirstResponse::Data { block, payload }, from)),
				Packet::Ack { block } => return Ok((FirstResponse::Ack(block), from)),
				Packet::Error { code, message } => return Err(ClientError::ServerError { code, message }),
				Packet::Request { .. } => {
					debug!("ignoring unexpected request echoed back by server");
					continue;
				}
			},
		}
	}
}

/// Waits for an ACK for a specific block, used by `delete` for the second,
/// commit-confirming acknowledgement.
async fn await_ack(socket: &UdpSocket, expect_block: u16, term: &TerminationFlag) -> Result<(), ClientError> {
	let mut attempts: u8 = 0;
	let mut buf = [0u8; 4 + consts::ERROR_MESSAGE_MAX];

	loop {
		if term.is_set() {
			return Err(ClientError::Session(session::SessionError::Terminated));
		}

		match socket::recv_with_timeout(socket, &mut buf).await? {
			None => {
				attempts += 1;
				if attempts >= consts::MAX_RETRIES {
					return Err(ClientError::NoResponse(attempts));
				}
			}
			Some((len, _peer)) => match Packet::decode(&buf[..len])? {
				Packet::Ack { block } if block == expect_block => return Ok(()),
				Packet::Error { code, message } => return Err(ClientError::ServerError { code, message }),
				_ => continue,
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn unexpected_reply_is_distinct_from_server_error() {
		let err = ClientError::UnexpectedReply;
		assert_eq!(err.to_string(), "server sent an unexpected reply");
	}
}
