use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info};

use tftpd::cli::{self, ClientActionOpts, ClientOpts, Options, RunMode};
use tftpd::storage::StorageRoot;
use tftpd::term::TerminationFlag;
use tftpd::tftp::codec::Mode;
use tftpd::tftp::consts;
use tftpd::{client, server};

const EXIT_SUCCESS: u8 = 0;
const EXIT_INVALID_ARGUMENT: u8 = 22;
const EXIT_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> ExitCode {
	let options = Options::parse();
	cli::init_logger(options.debug);

	let term = TerminationFlag::new();
	let handler_flag = term.clone();
	if let Err(e) = ctrlc::set_handler(move || {
		info!("received shutdown signal");
		handler_flag.set();
	}) {
		error!("failed to install signal handler: {e}");
		return ExitCode::from(EXIT_FAILURE);
	}

	match run(options.run_mode, term).await {
		Ok(()) => ExitCode::from(EXIT_SUCCESS),
		Err(code) => ExitCode::from(code),
	}
}

async fn run(mode: RunMode, term: TerminationFlag) -> Result<(), u8> {
	match mode {
		RunMode::Serve { bind, port, root, max_sessions } => run_serve(bind, port, root, max_sessions, term).await,
		RunMode::Read { opts, client_opts } => run_read(opts, client_opts, term).await,
		RunMode::Write { opts, client_opts } => run_write(opts, client_opts, term).await,
		RunMode::Delete { opts } => run_delete(opts, term).await,
	}
}

async fn run_serve(bind: std::net::IpAddr, port: u16, root: String, max_sessions: usize, term: TerminationFlag) -> Result<(), u8> {
	let expanded = shellexpand::tilde(&root).into_owned();
	let storage = StorageRoot::new(PathBuf::from(expanded)).map_err(|e| {
		error!("failed to prepare storage root {root}: {e}");
		EXIT_FAILURE
	})?;

	let addr = SocketAddr::new(bind, port);
	let srv = server::Server::bind(addr, storage, max_sessions, term).await.map_err(|e| {
		error!("failed to bind {addr}: {e}");
		EXIT_FAILURE
	})?;

	srv.run().await;
	Ok(())
}

fn require_octet_mode(mode: &str) -> Result<(), u8> {
	match Mode::parse(mode) {
		Some(Mode::Octet) => Ok(()),
		_ => {
			error!("unsupported transfer mode: {mode} (only octet is implemented)");
			Err(EXIT_INVALID_ARGUMENT)
		}
	}
}

fn validate_blocksize(blocksize: u16) -> Result<u16, u8> {
	if (consts::MIN_BLOCK_SIZE..=consts::MAX_BLOCK_SIZE).contains(&blocksize) {
		Ok(blocksize)
	} else {
		error!("block size {blocksize} out of supported range [{}, {}]", consts::MIN_BLOCK_SIZE, consts::MAX_BLOCK_SIZE);
		Err(EXIT_INVALID_ARGUMENT)
	}
}

/// Positional `mode`/`blocksize` on `ClientActionOpts`, when given, take
/// precedence over the `--mode`/`--blocksize` flags in `ClientOpts`.
fn resolve_client_opts(opts: &ClientActionOpts, client_opts: &ClientOpts) -> (String, u16) {
	let mode = opts.mode.clone().unwrap_or_else(|| client_opts.mode.clone());
	let blocksize = opts.blocksize.unwrap_or(client_opts.blocksize);
	(mode, blocksize)
}

async fn run_read(opts: ClientActionOpts, client_opts: ClientOpts, term: TerminationFlag) -> Result<(), u8> {
	let (mode, blocksize) = resolve_client_opts(&opts, &client_opts);
	require_octet_mode(&mode)?;
	let blocksize = validate_blocksize(blocksize)?;
	let destination = opts.local.clone().unwrap_or_else(|| PathBuf::from(&opts.filename));

	client::get(SocketAddr::new(opts.server, opts.port), &opts.filename, &destination, blocksize, &term).await.map_err(|e| {
		error!("read failed: {e}");
		EXIT_FAILURE
	})
}

async fn run_write(opts: ClientActionOpts, client_opts: ClientOpts, term: TerminationFlag) -> Result<(), u8> {
	let (mode, blocksize) = resolve_client_opts(&opts, &client_opts);
	require_octet_mode(&mode)?;
	let blocksize = validate_blocksize(blocksize)?;
	let source = opts.local.clone().unwrap_or_else(|| PathBuf::from(&opts.filename));

	client::put(SocketAddr::new(opts.server, opts.port), &source, &opts.filename, blocksize, &term).await.map_err(|e| {
		error!("write failed: {e}");
		EXIT_FAILURE
	})
}

async fn run_delete(opts: ClientActionOpts, term: TerminationFlag) -> Result<(), u8> {
	client::delete(SocketAddr::new(opts.server, opts.port), &opts.filename, &term).await.map_err(|e| {
		error!("delete failed: {e}");
		EXIT_FAILURE
	})
}
