//! Turns a raw request datagram into a validated [`OperationDescriptor`],
//! binding the session's ephemeral socket along the way.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::net::UdpSocket;

use super::codec::{self, CodecError, ErrorCode, Mode, Packet, RequestKind};
use super::consts;
use super::socket::{self, Role};
use crate::storage::{StorageError, StorageRoot};

/// Everything that can go wrong turning a request datagram into a validated
/// [`OperationDescriptor`]. Each variant maps to exactly one wire
/// [`ErrorCode`] via [`ParseError::wire_code`]; the message reported to the
/// peer is this type's own `Display`.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
	#[error("wire codec error: {0}")]
	Codec(#[from] CodecError),
	#[error("only request packets are accepted here")]
	NotARequest,
	#[error("unsupported transfer mode: {0}")]
	UnsupportedMode(String),
	#[error("unknown transfer mode: {0}")]
	UnknownMode(String),
	#[error("block size {0} out of supported range [{1}, {2}]")]
	BlocksizeOutOfRange(u16, u16, u16),
	#[error("{0}")]
	Storage(#[from] StorageError),
}

impl ParseError {
	pub fn wire_code(&self) -> Option<ErrorCode> {
		match self {
			ParseError::Codec(e) => e.wire_code(),
			ParseError::Storage(e) => e.wire_code(),
			ParseError::NotARequest | ParseError::UnsupportedMode(_) | ParseError::UnknownMode(_) | ParseError::BlocksizeOutOfRange(..) => {
				Some(ErrorCode::IllegalOperation)
			}
		}
	}
}

pub struct OperationDescriptor {
	pub kind: RequestKind,
	pub blocksize: u16,
	pub path: PathBuf,
	pub filename: String,
	pub peer: SocketAddr,
	pub socket: UdpSocket,
}

/// Parses `buf` as a request from `peer`, binding a fresh session socket
/// connected to that peer along the way. On any validation failure this
/// sends the appropriate ERROR packet itself (from the freshly bound
/// socket, which is then this failed session's TID) and returns `Err`; the
/// caller only needs to log.
pub async fn parse_request(buf: &[u8], peer: SocketAddr, storage: &StorageRoot) -> Result<OperationDescriptor, String> {
	let session_socket = socket::bind_ephemeral(Role::Server).await.map_err(|e| e.to_string())?;
	session_socket.connect(peer).await.map_err(|e| e.to_string())?;

	match parse_fields(buf, storage) {
		Ok((kind, blocksize, path, filename)) => Ok(OperationDescriptor { kind, blocksize, path, filename, peer, socket: session_socket }),
		Err(e) => {
			send_error(&session_socket, peer, &e).await;
			Err(e.to_string())
		}
	}
}

fn parse_fields(buf: &[u8], storage: &StorageRoot) -> Result<(RequestKind, u16, PathBuf, String), ParseError> {
	let packet = Packet::decode(buf)?;
	let Packet::Request { kind, filename, mode, blocksize } = packet else {
		return Err(ParseError::NotARequest);
	};

	if kind != RequestKind::Delete {
		match mode.as_deref() {
			None | Some("") => {}
			Some(raw) => match Mode::parse(raw) {
				Some(Mode::Octet) => {}
				Some(_) => return Err(ParseError::UnsupportedMode(raw.to_string())),
				None => return Err(ParseError::UnknownMode(raw.to_string())),
			},
		}
	}

	let blocksize = match blocksize {
		None | Some(0) => consts::DEFAULT_BLOCK_SIZE,
		Some(bs) if (consts::MIN_BLOCK_SIZE..=consts::MAX_BLOCK_SIZE).contains(&bs) => bs,
		Some(bs) => return Err(ParseError::BlocksizeOutOfRange(bs, consts::MIN_BLOCK_SIZE, consts::MAX_BLOCK_SIZE)),
	};

	let path = storage.resolve(&filename)?;

	Ok((kind, blocksize, path, filename))
}

async fn send_error(socket: &UdpSocket, peer: SocketAddr, err: &ParseError) {
	if peer.port() == consts::TFTP_LISTEN_PORT {
		/* No established peer TID to reply to. */
		return;
	}
	let code = err.wire_code().unwrap_or(ErrorCode::Undefined);
	let _ = socket.send(&codec::encode_error(code, &err.to_string())).await;
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn rejects_non_request_opcode() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = StorageRoot::new(tmp.path()).unwrap();
		let ack = codec::encode_ack(0);
		let err = parse_fields(&ack, &storage).unwrap_err();
		assert_eq!(err.wire_code(), Some(ErrorCode::IllegalOperation));
	}

	#[test]
	fn unspecified_blocksize_defaults_to_512() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = StorageRoot::new(tmp.path()).unwrap();
		let req = codec::encode_request(RequestKind::Read, "file.bin", Mode::Octet, None);
		let (_, blocksize, _, _) = parse_fields(&req, &storage).unwrap();
		assert_eq!(blocksize, consts::DEFAULT_BLOCK_SIZE);
	}

	#[test]
	fn out_of_range_blocksize_is_illegal_operation() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = StorageRoot::new(tmp.path()).unwrap();
		let req = codec::encode_request(RequestKind::Write, "file.bin", Mode::Octet, Some(4));
		let err = parse_fields(&req, &storage).unwrap_err();
		assert_eq!(err.wire_code(), Some(ErrorCode::IllegalOperation));
	}

	#[test]
	fn netascii_is_rejected() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = StorageRoot::new(tmp.path()).unwrap();
		let req = codec::encode_request(RequestKind::Read, "file.bin", Mode::NetAscii, None);
		let err = parse_fields(&req, &storage).unwrap_err();
		assert_eq!(err.wire_code(), Some(ErrorCode::IllegalOperation));
	}

	#[test]
	fn delete_request_ignores_mode_field_entirely() {
		let tmp = tempfile::tempdir().unwrap();
		let storage = StorageRoot::new(tmp.path()).unwrap();
		let req = codec::encode_request(RequestKind::Delete, "doomed", Mode::Octet, None);
		let (kind, _, _, filename) = parse_fields(&req, &storage).unwrap();
		assert_eq!(kind, RequestKind::Delete);
		assert_eq!(filename, "doomed");
	}
}
