//! Loopback integration tests: a real server bound to an OS-assigned port,
//! driven by the real client driver, both talking actual UDP to each other
//! on localhost.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use tftpd::client;
use tftpd::server::Server;
use tftpd::storage::StorageRoot;
use tftpd::term::TerminationFlag;

async fn spawn_server(root: PathBuf) -> (SocketAddr, TerminationFlag) {
	let storage = StorageRoot::new(root).unwrap();
	let term = TerminationFlag::new();
	let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
	let server = Server::bind(bind_addr, storage, 5, term.clone()).await.unwrap();
	let addr = server.local_addr().unwrap();

	tokio::spawn(async move {
		server.run().await;
	});

	(addr, term)
}

#[tokio::test]
async fn write_then_read_round_trip_multi_block() {
	let tmp = tempfile::tempdir().unwrap();
	let (addr, term) = spawn_server(tmp.path().to_path_buf()).await;

	let upload_dir = tempfile::tempdir().unwrap();
	let local_upload = upload_dir.path().join("upload.bin");
	let payload: Vec<u8> = (0..2000u32).map(|n| (n % 251) as u8).collect();
	tokio::fs::write(&local_upload, &payload).await.unwrap();

	client::put(addr, &local_upload, "remote.bin", 512, &term).await.unwrap();
	assert_eq!(tokio::fs::read(tmp.path().join("remote.bin")).await.unwrap(), payload);

	let local_download = upload_dir.path().join("download.bin");
	client::get(addr, "remote.bin", &local_download, 512, &term).await.unwrap();
	assert_eq!(tokio::fs::read(&local_download).await.unwrap(), payload);
}

#[tokio::test]
async fn write_empty_file() {
	let tmp = tempfile::tempdir().unwrap();
	let (addr, term) = spawn_server(tmp.path().to_path_buf()).await;

	let upload_dir = tempfile::tempdir().unwrap();
	let local_upload = upload_dir.path().join("empty.bin");
	tokio::fs::write(&local_upload, b"").await.unwrap();

	client::put(addr, &local_upload, "empty.bin", 512, &term).await.unwrap();
	assert_eq!(tokio::fs::read(tmp.path().join("empty.bin")).await.unwrap(), b"");
}

#[tokio::test]
async fn read_of_missing_file_fails() {
	let tmp = tempfile::tempdir().unwrap();
	let (addr, term) = spawn_server(tmp.path().to_path_buf()).await;

	let download_dir = tempfile::tempdir().unwrap();
	let local_download = download_dir.path().join("ghost.bin");

	let result = client::get(addr, "ghost.bin", &local_download, 512, &term).await;
	assert!(result.is_err());
	assert!(!local_download.exists());
}

#[tokio::test]
async fn write_to_existing_file_is_rejected() {
	let tmp = tempfile::tempdir().unwrap();
	let (addr, term) = spawn_server(tmp.path().to_path_buf()).await;

	tokio::fs::write(tmp.path().join("taken.bin"), b"already here").await.unwrap();

	let upload_dir = tempfile::tempdir().unwrap();
	let local_upload = upload_dir.path().join("new.bin");
	tokio::fs::write(&local_upload, b"new content").await.unwrap();

	let result = client::put(addr, &local_upload, "taken.bin", 512, &term).await;
	assert!(result.is_err());
	assert_eq!(tokio::fs::read(tmp.path().join("taken.bin")).await.unwrap(), b"already here");
}

#[tokio::test]
async fn delete_then_second_delete_reports_not_found() {
	let tmp = tempfile::tempdir().unwrap();
	let (addr, term) = spawn_server(tmp.path().to_path_buf()).await;

	tokio::fs::write(tmp.path().join("doomed.bin"), b"bye").await.unwrap();

	client::delete(addr, "doomed.bin", &term).await.unwrap();
	assert!(!tmp.path().join("doomed.bin").exists());

	let second = client::delete(addr, "doomed.bin", &term).await;
	assert!(second.is_err());
}
