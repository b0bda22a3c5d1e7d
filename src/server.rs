//! The thin listener that owns port 69, accepts requests, and spawns a
//! worker per session. Each worker runs the session engine to completion
//! and releases its slot under the table's mutex before exiting.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::fs::OpenOptions;
use tokio::net::UdpSocket;

use crate::storage::StorageRoot;
use crate::term::TerminationFlag;
use crate::tftp::codec::{self, ErrorCode, RequestKind};
use crate::tftp::consts;
use crate::tftp::request::{self, OperationDescriptor};
use crate::tftp::session;
use crate::tftp::slots::SessionSlotTable;

pub struct Server {
	socket: UdpSocket,
	root: StorageRoot,
	slots: Arc<SessionSlotTable>,
	term: TerminationFlag,
}

impl Server {
	pub async fn bind(addr: SocketAddr, root: StorageRoot, max_sessions: usize, term: TerminationFlag) -> io::Result<Self> {
		let socket = UdpSocket::bind(addr).await?;
		Ok(Self { socket, root, slots: Arc::new(SessionSlotTable::new(max_sessions)), term })
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.socket.local_addr()
	}

	pub async fn run(&self) {
		info!("tftp server listening (max {} concurrent sessions)", self.slots.capacity());
		let mut buf = vec![0u8; consts::MAX_BLOCK_SIZE as usize + 4];

		loop {
			if self.term.is_set() {
				warn!("server listener stopping; termination flag set");
				break;
			}

			let (n, peer) = match tokio::time::timeout(consts::RECV_TIMEOUT, self.socket.recv_from(&mut buf)).await {
				Ok(Ok(v)) => v,
				Ok(Err(e)) => {
					error!("failed to receive on requests socket: {e}");
					continue;
				}
				Err(_elapsed) => continue,
			};

			if n == 0 {
				debug!("received zero-byte datagram from {peer}, ignoring");
				continue;
			}
			debug!("received {n} bytes from {peer}");

			self.dispatch(buf[..n].to_vec(), peer).await;
		}

		self.slots.join_all().await;
	}

	async fn dispatch(&self, data: Vec<u8>, peer: SocketAddr) {
		let opcode = if data.len() >= 2 { u16::from_be_bytes([data[0], data[1]]) } else { 0 };
		if !matches!(opcode, consts::OPCODE_RRQ | consts::OPCODE_WRQ | consts::OPCODE_DRQ) {
			warn!("non-request opcode {opcode} received on requests socket from {peer}");
			self.reply_from_requests_socket(peer, ErrorCode::IllegalOperation, "only request opcodes are accepted here").await;
			return;
		}

		let Some(index) = self.slots.acquire() else {
			warn!("slot table exhausted, rejecting request from {peer}");
			self.reply_from_requests_socket(peer, ErrorCode::OutOfSpace, "server exceeded max connections").await;
			return;
		};

		let root = self.root.clone();
		let term = self.term.clone();
		let slots = self.slots.clone();
		let handle = tokio::spawn(async move {
			match request::parse_request(&data, peer, &root).await {
				Ok(descriptor) => {
					info!("{} from {peer}", descriptor.kind);
					if let Err(e) = handle_descriptor(descriptor, &term).await {
						warn!("session with {peer} ended: {e}");
					}
				}
				Err(reason) => debug!("rejected request from {peer}: {reason}"),
			}
			slots.release(index);
		});
		self.slots.set_handle(index, handle);
	}

	/// Sends an ERROR reply directly on the requests socket for cases that
	/// never make it to a session (bad opcode, no free slot); there is no
	/// session TID to speak from yet.
	async fn reply_from_requests_socket(&self, peer: SocketAddr, code: ErrorCode, message: &str) {
		if peer.port() == consts::TFTP_LISTEN_PORT {
			return;
		}
		let _ = self.socket.send_to(&codec::encode_error(code, message), peer).await;
	}
}

async fn handle_descriptor(descriptor: OperationDescriptor, term: &TerminationFlag) -> Result<(), String> {
	match descriptor.kind {
		RequestKind::Read => handle_read(descriptor, term).await,
		RequestKind::Write => handle_write(descriptor, term).await,
		RequestKind::Delete => handle_delete(descriptor).await,
	}
}

async fn handle_read(descriptor: OperationDescriptor, term: &TerminationFlag) -> Result<(), String> {
	let OperationDescriptor { blocksize, path, socket, .. } = descriptor;

	let file = match OpenOptions::new().read(true).open(&path).await {
		Ok(f) => f,
		Err(e) if e.kind() == io::ErrorKind::NotFound => {
			let _ = socket.send(&codec::encode_error(ErrorCode::FileNotFound, &format!("file not found: {}", path.display()))).await;
			return Err("file not found".to_string());
		}
		Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
			let _ = socket.send(&codec::encode_error(ErrorCode::AccessViolation, "permission denied")).await;
			return Err(e.to_string());
		}
		Err(e) => {
			let _ = socket.send(&codec::encode_error(ErrorCode::Undefined, &e.to_string())).await;
			return Err(e.to_string());
		}
	};

	/* No separate ACK(0) for a READ: the first DATA packet is itself the
	 * implicit acknowledgement. */
	match session::send_file(&socket, file, blocksize, term).await {
		Ok(state) => {
			info!("sent {} bytes in {} blocks to {} in {:.2}s", state.bytes_transferred, state.blocks_transferred, path.display(), state.elapsed().as_secs_f64());
			Ok(())
		}
		Err(e) => {
			if let Some(code) = e.wire_code() {
				let _ = socket.send(&codec::encode_error(code, &e.to_string())).await;
			}
			Err(e.to_string())
		}
	}
}

async fn handle_write(descriptor: OperationDescriptor, term: &TerminationFlag) -> Result<(), String> {
	let OperationDescriptor { blocksize, path, socket, .. } = descriptor;

	/* Refuse a WRITE to an existing file, pointing the peer at the file's
	 * creation time and suggesting a delete first, instead of silently
	 * overwriting. */
	if let Ok(metadata) = tokio::fs::metadata(&path).await {
		let created = metadata
			.created()
			.ok()
			.and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
			.map(|d| d.as_secs().to_string())
			.unwrap_or_else(|| "unknown time".to_string());
		let message = format!("file already exists (created at {created}); delete it first");
		let _ = socket.send(&codec::encode_error(ErrorCode::FileExists, &message)).await;
		return Err("file already exists".to_string());
	}

	let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path).await {
		Ok(f) => f,
		Err(e) => {
			let _ = socket.send(&codec::encode_error(ErrorCode::Undefined, &e.to_string())).await;
			return Err(e.to_string());
		}
	};

	let _ = socket.send(&codec::encode_ack(0)).await;

	match session::receive_file(&socket, file, blocksize, term, None).await {
		Ok(state) => {
			info!("received {} bytes in {} blocks into {} in {:.2}s", state.bytes_transferred, state.blocks_transferred, path.display(), state.elapsed().as_secs_f64());
			Ok(())
		}
		Err(e) => {
			if let Some(code) = e.wire_code() {
				let _ = socket.send(&codec::encode_error(code, &e.to_string())).await;
			}
			/* A WRITE that fails leaves no stub. */
			let _ = tokio::fs::remove_file(&path).await;
			Err(e.to_string())
		}
	}
}

async fn handle_delete(descriptor: OperationDescriptor) -> Result<(), String> {
	let OperationDescriptor { path, socket, .. } = descriptor;

	let _ = socket.send(&codec::encode_ack(0)).await;

	if !path_exists(&path).await {
		let _ = socket.send(&codec::encode_error(ErrorCode::FileNotFound, &format!("file not found: {}", path.display()))).await;
		return Err("file not found".to_string());
	}

	if let Err(e) = tokio::fs::remove_file(&path).await {
		let _ = socket.send(&codec::encode_error(ErrorCode::Undefined, &e.to_string())).await;
		return Err(e.to_string());
	}

	let _ = socket.send(&codec::encode_ack(1)).await;
	Ok(())
}

async fn path_exists(path: &Path) -> bool {
	tokio::fs::metadata(path).await.is_ok()
}
