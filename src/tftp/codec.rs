//! Pure encode/decode of the five TFTP packet shapes. No I/O happens here;
//! this module only ever turns bytes into a [`Packet`] and back.

use std::fmt;

use super::consts;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
	#[error("packet shorter than its opcode demands")]
	Truncated,
	#[error("unknown opcode {0}")]
	UnknownOpcode(u16),
	#[error("field missing its NUL terminator")]
	MissingNul,
	#[error("field is not valid UTF-8")]
	InvalidUtf8,
	#[error("malformed request (missing filename or option value)")]
	MalformedRequest,
	#[error("blksize value is not a valid decimal number")]
	InvalidBlocksizeFormat,
}

impl CodecError {
	/// Every decode failure means the peer sent something the wire format
	/// doesn't allow; there's only one wire code for that.
	pub fn wire_code(&self) -> Option<ErrorCode> {
		Some(ErrorCode::IllegalOperation)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
	Read,
	Write,
	Delete,
}
impl RequestKind {
	fn opcode(self) -> u16 {
		match self {
			Self::Read => consts::OPCODE_RRQ,
			Self::Write => consts::OPCODE_WRQ,
			Self::Delete => consts::OPCODE_DRQ,
		}
	}
}
impl fmt::Display for RequestKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Read => "RRQ",
			Self::Write => "WRQ",
			Self::Delete => "DRQ",
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	Octet,
	NetAscii,
	Mail,
}
impl Mode {
	pub fn parse(s: &str) -> Option<Self> {
		match s.to_ascii_lowercase().as_str() {
			"octet" => Some(Self::Octet),
			"netascii" => Some(Self::NetAscii),
			"mail" => Some(Self::Mail),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Octet => "octet",
			Self::NetAscii => "netascii",
			Self::Mail => "mail",
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
	Undefined = 0,
	FileNotFound = 1,
	AccessViolation = 2,
	OutOfSpace = 3,
	IllegalOperation = 4,
	UnknownTransfer = 5,
	FileExists = 6,
	UnknownUser = 7,
}
impl From<u16> for ErrorCode {
	/// Any value the wire doesn't define collapses to `Undefined`; a
	/// received ERROR packet is never itself a reason to reject the packet.
	fn from(value: u16) -> Self {
		match value {
			0 => Self::Undefined,
			1 => Self::FileNotFound,
			2 => Self::AccessViolation,
			3 => Self::OutOfSpace,
			4 => Self::IllegalOperation,
			5 => Self::UnknownTransfer,
			6 => Self::FileExists,
			7 => Self::UnknownUser,
			_ => Self::Undefined,
		}
	}
}
impl fmt::Display for ErrorCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", *self as u16)
	}
}

/// The tagged union of everything that can arrive on a TFTP socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
	Request {
		kind: RequestKind,
		filename: String,
		/// Raw mode token as received; `None` for DRQ (no mode field on the
		/// wire) or when the field was present but empty. Normalization to
		/// a concrete [`Mode`] is the Request Parser's job, not the codec's.
		mode: Option<String>,
		/// Raw decimal value of a `blksize` option, if one was present.
		blocksize: Option<u16>,
	},
	Data {
		block: u16,
		payload: Vec<u8>,
	},
	Ack {
		block: u16,
	},
	Error {
		code: ErrorCode,
		message: String,
	},
}

impl Packet {
	pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
		if buf.len() < 2 {
			return Err(CodecError::Truncated);
		}
		let opcode = u16::from_be_bytes([buf[0], buf[1]]);
		let rest = &buf[2..];
		match opcode {
			consts::OPCODE_RRQ => decode_request(RequestKind::Read, rest),
			consts::OPCODE_WRQ => decode_request(RequestKind::Write, rest),
			consts::OPCODE_DRQ => decode_request(RequestKind::Delete, rest),
			consts::OPCODE_DATA => decode_data(rest),
			consts::OPCODE_ACK => decode_ack(rest),
			consts::OPCODE_ERROR => decode_error(rest),
			other => Err(CodecError::UnknownOpcode(other)),
		}
	}
}

/// Splits off the next NUL-terminated field, returning it and the remainder.
fn next_field(buf: &[u8]) -> Result<(&str, &[u8]), CodecError> {
	let pos = buf.iter().position(|&b| b == 0).ok_or(CodecError::MissingNul)?;
	let field = std::str::from_utf8(&buf[..pos]).map_err(|_| CodecError::InvalidUtf8)?;
	Ok((field, &buf[pos + 1..]))
}

fn decode_request(kind: RequestKind, rest: &[u8]) -> Result<Packet, CodecError> {
	let (filename, rest) = next_field(rest)?;
	if filename.is_empty() {
		return Err(CodecError::MalformedRequest);
	}

	let (mode, rest) = if kind == RequestKind::Delete {
		(None, rest)
	} else {
		let (m, rest) = next_field(rest)?;
		(if m.is_empty() { None } else { Some(m.to_string()) }, rest)
	};

	let mut blocksize = None;
	if !rest.is_empty() {
		let (opt_name, rest) = next_field(rest)?;
		if opt_name.eq_ignore_ascii_case(consts::OPT_BLOCKSIZE_IDENT) {
			let (value, _rest) = next_field(rest)?;
			let parsed: u16 = value.parse().map_err(|_| CodecError::InvalidBlocksizeFormat)?;
			blocksize = Some(parsed);
		}
		/* Unrecognized trailing fields are ignored; only blksize is defined on this wire. */
	}

	Ok(Packet::Request { kind, filename: filename.to_string(), mode, blocksize })
}

fn decode_data(rest: &[u8]) -> Result<Packet, CodecError> {
	if rest.len() < 2 {
		return Err(CodecError::Truncated);
	}
	let block = u16::from_be_bytes([rest[0], rest[1]]);
	Ok(Packet::Data { block, payload: rest[2..].to_vec() })
}

fn decode_ack(rest: &[u8]) -> Result<Packet, CodecError> {
	if rest.len() < 2 {
		return Err(CodecError::Truncated);
	}
	let block = u16::from_be_bytes([rest[0], rest[1]]);
	Ok(Packet::Ack { block })
}

fn decode_error(rest: &[u8]) -> Result<Packet, CodecError> {
	if rest.len() < 2 {
		return Err(CodecError::Truncated);
	}
	let code = ErrorCode::from(u16::from_be_bytes([rest[0], rest[1]]));
	let (message, _) = next_field(&rest[2..])?;
	Ok(Packet::Error { code, message: message.to_string() })
}

pub fn encode_request(kind: RequestKind, filename: &str, mode: Mode, blocksize: Option<u16>) -> Vec<u8> {
	let mut buf = Vec::with_capacity(2 + filename.len() + 1 + 8 + 1 + 16);
	buf.extend_from_slice(&kind.opcode().to_be_bytes());
	buf.extend_from_slice(filename.as_bytes());
	buf.push(0);
	if kind != RequestKind::Delete {
		buf.extend_from_slice(mode.as_str().as_bytes());
		buf.push(0);
	}
	if let Some(bs) = blocksize {
		buf.extend_from_slice(consts::OPT_BLOCKSIZE_IDENT.as_bytes());
		buf.push(0);
		buf.extend_from_slice(format!("{bs:05}").as_bytes());
		buf.push(0);
	}
	buf
}

pub fn encode_data(block: u16, payload: &[u8]) -> Vec<u8> {
	let mut buf = Vec::with_capacity(4 + payload.len());
	buf.extend_from_slice(&consts::OPCODE_DATA.to_be_bytes());
	buf.extend_from_slice(&block.to_be_bytes());
	buf.extend_from_slice(payload);
	buf
}

pub fn encode_ack(block: u16) -> Vec<u8> {
	let mut buf = Vec::with_capacity(4);
	buf.extend_from_slice(&consts::OPCODE_ACK.to_be_bytes());
	buf.extend_from_slice(&block.to_be_bytes());
	buf
}

pub fn encode_error(code: ErrorCode, message: &str) -> Vec<u8> {
	let mut buf = Vec::with_capacity(4 + message.len() + 1);
	buf.extend_from_slice(&consts::OPCODE_ERROR.to_be_bytes());
	buf.extend_from_slice(&(code as u16).to_be_bytes());
	buf.extend_from_slice(message.as_bytes());
	buf.push(0);
	buf
}

/// True if `a` precedes `b` in the circular 16-bit block sequence, i.e. `b`
/// is the "next" number or later, treating the space as wrapping at 2^16.
pub fn block_is_before(a: u16, b: u16) -> bool {
	let diff = b.wrapping_sub(a);
	diff != 0 && diff < 0x8000
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trip_request_with_blocksize() {
		let bytes = encode_request(RequestKind::Read, "file.bin", Mode::Octet, Some(1024));
		match Packet::decode(&bytes).unwrap() {
			Packet::Request { kind, filename, mode, blocksize } => {
				assert_eq!(kind, RequestKind::Read);
				assert_eq!(filename, "file.bin");
				assert_eq!(mode.as_deref(), Some("octet"));
				assert_eq!(blocksize, Some(1024));
			}
			other => panic!("unexpected packet: {other:?}"),
		}
	}

	#[test]
	fn delete_request_has_no_mode_field() {
		let bytes = encode_request(RequestKind::Delete, "doomed", Mode::Octet, None);
		match Packet::decode(&bytes).unwrap() {
			Packet::Request { kind, filename, mode, blocksize } => {
				assert_eq!(kind, RequestKind::Delete);
				assert_eq!(filename, "doomed");
				assert_eq!(mode, None);
				assert_eq!(blocksize, None);
			}
			other => panic!("unexpected packet: {other:?}"),
		}
	}

	#[test]
	fn round_trip_data_ack_error() {
		let data = encode_data(42, b"hello");
		match Packet::decode(&data).unwrap() {
			Packet::Data { block, payload } => {
				assert_eq!(block, 42);
				assert_eq!(payload, b"hello");
			}
			other => panic!("unexpected packet: {other:?}"),
		}

		let ack = encode_ack(7);
		assert_eq!(Packet::decode(&ack).unwrap(), Packet::Ack { block: 7 });

		let err = encode_error(ErrorCode::FileNotFound, "nope");
		match Packet::decode(&err).unwrap() {
			Packet::Error { code, message } => {
				assert_eq!(code, ErrorCode::FileNotFound);
				assert_eq!(message, "nope");
			}
			other => panic!("unexpected packet: {other:?}"),
		}
	}

	#[test]
	fn rejects_truncated_packets() {
		assert!(matches!(Packet::decode(&[0]), Err(CodecError::Truncated)));
		assert!(matches!(Packet::decode(&[0, 4, 0]), Err(CodecError::Truncated)));
	}

	#[test]
	fn rejects_unknown_opcode() {
		assert!(matches!(Packet::decode(&[0, 9, 0, 0]), Err(CodecError::UnknownOpcode(9))));
	}

	#[test]
	fn data_shorter_than_blocksize_is_detectable_by_caller() {
		let payload = vec![0u8; 10];
		let encoded = encode_data(1, &payload);
		/* 4-byte header + 10 bytes payload; final-block detection belongs to
		 * the session engine, not the codec, but the shape must survive. */
		assert_eq!(encoded.len(), 14);
	}

	#[test]
	fn block_rollover_ordering() {
		assert!(block_is_before(65535, 0));
		assert!(block_is_before(1, 2));
		assert!(!block_is_before(2, 1));
		assert!(!block_is_before(5, 5));
	}

	#[test]
	fn blocksize_option_is_case_insensitive() {
		let mut bytes = Vec::new();
		bytes.extend_from_slice(&consts::OPCODE_RRQ.to_be_bytes());
		bytes.extend_from_slice(b"f\0octet\0BLKSIZE\01024\0");
		match Packet::decode(&bytes).unwrap() {
			Packet::Request { blocksize, .. } => assert_eq!(blocksize, Some(1024)),
			other => panic!("unexpected packet: {other:?}"),
		}
	}
}
