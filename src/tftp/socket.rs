//! The only transport primitives the Session Engine is allowed to touch:
//! bind an ephemeral port in a role-specific range, send to a fixed peer,
//! and receive with the universal 1-second retry timeout.

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use rand::Rng;
use tokio::net::UdpSocket;

use super::consts;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
	Server,
	Client,
}
impl Role {
	fn port_range(self) -> std::ops::RangeInclusive<u16> {
		match self {
			Self::Server => consts::SERVER_PORT_RANGE,
			Self::Client => consts::CLIENT_PORT_RANGE,
		}
	}
}

/// Binds a fresh UDP socket to a random port drawn from the role's range,
/// retrying on collision. This is the session's local TID.
pub async fn bind_ephemeral(role: Role) -> io::Result<UdpSocket> {
	let range = role.port_range();
	loop {
		let port = rand::thread_rng().gen_range(range.clone());
		match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port)).await {
			Ok(socket) => return Ok(socket),
			Err(e) if e.kind() == io::ErrorKind::AddrInUse => continue,
			Err(e) => return Err(e),
		}
	}
}

/// Receives once, subject to the universal 1-second suspension timeout.
/// `Ok(None)` means the timeout elapsed with nothing received, the sole
/// trigger for the engine's retry logic.
pub async fn recv_with_timeout(socket: &UdpSocket, buf: &mut [u8]) -> io::Result<Option<(usize, SocketAddr)>> {
	match tokio::time::timeout(consts::RECV_TIMEOUT, socket.recv_from(buf)).await {
		Ok(result) => result.map(Some),
		Err(_elapsed) => Ok(None),
	}
}
