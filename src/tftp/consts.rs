use std::ops::RangeInclusive;
use std::time::Duration;

pub const TFTP_LISTEN_PORT: u16 = 69;

pub const OPCODE_RRQ: u16 = 1;
pub const OPCODE_WRQ: u16 = 2;
pub const OPCODE_DATA: u16 = 3;
pub const OPCODE_ACK: u16 = 4;
pub const OPCODE_ERROR: u16 = 5;
pub const OPCODE_DRQ: u16 = 6;

pub const OPT_BLOCKSIZE_IDENT: &str = "blksize";

pub const DEFAULT_BLOCK_SIZE: u16 = 512;
pub const MIN_BLOCK_SIZE: u16 = 8;
pub const MAX_BLOCK_SIZE: u16 = 65464;

pub const MAX_RETRIES: u8 = 5;
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Server-side session sockets and the well-known requests socket draw
/// ephemeral ports from this range; the client range below is disjoint so a
/// packet's source port alone tells you which side sent it.
pub const SERVER_PORT_RANGE: RangeInclusive<u16> = 49152..=49999;
pub const CLIENT_PORT_RANGE: RangeInclusive<u16> = 50000..=59999;

pub const DEFAULT_MAX_SESSIONS: usize = 5;

/// Mirrors the reference implementation's `TFTP_FILENAME_MAX`.
pub const FILENAME_MAX: usize = 255;
/// Mirrors the reference implementation's `TFTP_ERROR_MESSAGE_MAX_LENGTH`.
pub const ERROR_MESSAGE_MAX: usize = 128;
