//! Command-line surface: one binary, four sub-commands, modeled on the
//! teacher's flattened shared-option-group pattern (`ClientOpts` /
//! `ClientActionOpts`) rather than repeating the same flags per variant.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use simple_logger::SimpleLogger;

use crate::tftp::consts;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Options {
	#[arg(value_enum, short, long, default_value_t = DebugLevel::Warn, help = "Debug level to determine which messages are printed", global = true)]
	pub debug: DebugLevel,

	#[command(subcommand)]
	pub run_mode: RunMode,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum DebugLevel {
	Off = 0,
	Error,
	#[default]
	Warn,
	Info,
	Debug,
	Trace,
}
impl From<DebugLevel> for log::LevelFilter {
	fn from(value: DebugLevel) -> Self {
		match value {
			DebugLevel::Off => Self::Off,
			DebugLevel::Error => Self::Error,
			DebugLevel::Warn => Self::Warn,
			DebugLevel::Info => Self::Info,
			DebugLevel::Debug => Self::Debug,
			DebugLevel::Trace => Self::Trace,
		}
	}
}

/// Shared by `read`/`write`: the block-size negotiation and transfer mode.
/// These are also accepted positionally on `ClientActionOpts` (`<server_ip>
/// <filename> [mode] [blocksize]`, matching the protocol's historical
/// argument shape); a positional value, when given, takes precedence over
/// these flags.
#[derive(Debug, Args)]
pub struct ClientOpts {
	#[arg(short, long, default_value_t = consts::DEFAULT_BLOCK_SIZE, help = "Block size to negotiate with the peer")]
	pub blocksize: u16,

	#[arg(short, long, default_value = "octet", help = "Transfer mode; only octet is implemented")]
	pub mode: String,
}

/// Shared by every client sub-command: the remote endpoint and the local
/// file the transfer reads from or writes to.
#[derive(Debug, Args)]
pub struct ClientActionOpts {
	#[arg(help = "The remote server to connect to.")]
	pub server: IpAddr,

	#[arg(help = "The name of the file on the server.")]
	pub filename: String,

	#[arg(help = "(optional) Transfer mode, positional form of --mode.")]
	pub mode: Option<String>,

	#[arg(help = "(optional) Block size to negotiate, positional form of --blocksize.")]
	pub blocksize: Option<u16>,

	#[arg(short, long, default_value_t = consts::TFTP_LISTEN_PORT, help = "(optional) The remote port to connect to.")]
	pub port: u16,

	#[arg(short, long, help = "Local file path; defaults to the remote filename in the current directory.")]
	pub local: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum RunMode {
	/// Run as a server, answering requests on the given address and port.
	Serve {
		#[arg(short, long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
		bind: IpAddr,
		#[arg(short, long, default_value_t = consts::TFTP_LISTEN_PORT)]
		port: u16,
		#[arg(short, long, default_value = "./storage", help = "Directory files are served from and written into")]
		root: String,
		#[arg(long, default_value_t = consts::DEFAULT_MAX_SESSIONS)]
		max_sessions: usize,
	},
	/// Download a file from a server.
	Read {
		#[command(flatten)]
		opts: ClientActionOpts,
		#[command(flatten)]
		client_opts: ClientOpts,
	},
	/// Upload a file to a server.
	Write {
		#[command(flatten)]
		opts: ClientActionOpts,
		#[command(flatten)]
		client_opts: ClientOpts,
	},
	/// Delete a file on a server.
	Delete {
		#[command(flatten)]
		opts: ClientActionOpts,
	},
}

pub fn init_logger(debug_level: DebugLevel) {
	SimpleLogger::new().with_level(debug_level.into()).env().init().unwrap();
}
