fn main() {
    println!("Run `cargo test -p relaydrop-e2e` to execute the end-to-end transfer tests.");
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use relaydrop_protocol::wire::{write_metadata, write_token};
    use relaydrop_protocol::{CHUNK_SIZE, FileMetadata, READY_SIGNAL, Token, generate_token};
    use relaydrop_relay::{RelayConfig, RelayServer};
    use relaydrop_transfer::{ReceiveReport, Receiver, SendReport, Sender, TransferError};

    async fn start_relay(pairing_timeout: Duration) -> (Arc<RelayServer>, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = RelayServer::new(RelayConfig {
            listen_addr: addr,
            pairing_timeout,
            sweep_interval: Duration::from_millis(20),
        });
        let server_run = Arc::clone(&server);
        tokio::spawn(async move { server_run.serve(listener).await.unwrap() });
        (server, addr)
    }

    /// Waits until the relay holds `n` pending registrations.
    async fn wait_pending(server: &RelayServer, n: usize) {
        for _ in 0..200 {
            if server.table().len().await == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("relay never reached {n} pending registrations");
    }

    async fn receive(
        addr: SocketAddr,
        token: Token,
        dest: &Path,
    ) -> Result<ReceiveReport, TransferError> {
        let (tx, _rx) = mpsc::channel(64);
        Receiver::new(addr.to_string(), token)
            .receive_file(dest, CancellationToken::new(), tx)
            .await
    }

    /// Sends `path` through the relay and receives it into `dest`.
    async fn transfer(
        server: &RelayServer,
        addr: SocketAddr,
        path: &Path,
        dest: &Path,
    ) -> (SendReport, ReceiveReport) {
        let token = generate_token();
        let source = path.to_path_buf();
        let send = tokio::spawn(async move {
            let (tx, _rx) = mpsc::channel(64);
            Sender::new(addr.to_string(), token)
                .send_file(&source, CancellationToken::new(), tx)
                .await
        });
        wait_pending(server, 1).await;

        let received = receive(addr, token, dest).await.unwrap();
        let sent = send.await.unwrap().unwrap();
        (sent, received)
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 251) as u8).collect()
    }

    #[tokio::test]
    async fn files_arrive_byte_exact() {
        let (server, addr) = start_relay(Duration::from_secs(30)).await;
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        for (name, len) in [
            ("empty.txt", 0),
            ("small.txt", 10),
            ("multi.bin", CHUNK_SIZE * 3 + 17),
        ] {
            let path = src.path().join(name);
            let data = pattern(len);
            std::fs::write(&path, &data).unwrap();

            let (sent, received) = transfer(&server, addr, &path, dest.path()).await;
            assert_eq!(received.path, dest.path().join(name));
            assert_eq!(received.metadata.file_name, name);
            assert_eq!(received.metadata.file_size, len as u64);
            assert_eq!(std::fs::read(&received.path).unwrap(), data);
            assert_eq!(sent.bytes, len as u64);
            assert_eq!(sent.sha256, received.sha256);
        }

        assert!(server.table().is_empty().await);
        server.shutdown();
    }

    #[tokio::test]
    async fn existing_file_is_kept_and_copy_renamed() {
        let (server, addr) = start_relay(Duration::from_secs(30)).await;
        let src = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();

        let path = src.path().join("report.pdf");
        std::fs::write(&path, b"new contents").unwrap();
        let existing = dest.path().join("report.pdf");
        std::fs::write(&existing, b"old contents").unwrap();

        let (_, received) = transfer(&server, addr, &path, dest.path()).await;
        assert_ne!(received.path, existing);
        assert_eq!(std::fs::read(&existing).unwrap(), b"old contents");
        assert_eq!(std::fs::read(&received.path).unwrap(), b"new contents");

        let name = received.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("report") && name.ends_with(".pdf"));

        server.shutdown();
    }

    #[tokio::test]
    async fn receiver_alone_is_dropped_after_deadline() {
        let (server, addr) = start_relay(Duration::from_millis(200)).await;
        let dest = tempfile::tempdir().unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            receive(addr, generate_token(), dest.path()),
        )
        .await
        .expect("relay should close the unpaired receiver");
        assert!(matches!(result, Err(TransferError::RelayClosed)));
        assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn second_receiver_gets_nothing() {
        let (server, addr) = start_relay(Duration::from_millis(300)).await;
        let first_dest = tempfile::tempdir().unwrap();
        let second_dest = tempfile::tempdir().unwrap();
        let token = generate_token();
        let body = pattern(CHUNK_SIZE * 2);

        // Drive the sender by hand so the transfer stays in flight.
        let mut sender = TcpStream::connect(addr).await.unwrap();
        write_token(&mut sender, &token).await.unwrap();
        wait_pending(&server, 1).await;

        let dest = first_dest.path().to_path_buf();
        let first = tokio::spawn(async move { receive(addr, token, &dest).await });

        let mut ready = [0u8; 4];
        sender.read_exact(&mut ready).await.unwrap();
        assert_eq!(&ready, READY_SIGNAL);
        let metadata = FileMetadata {
            file_name: "shared.bin".into(),
            file_size: body.len() as u64,
        };
        write_metadata(&mut sender, &metadata).await.unwrap();
        sender.write_all(&body[..CHUNK_SIZE]).await.unwrap();

        let intruder = receive(addr, token, second_dest.path()).await;
        assert!(matches!(intruder, Err(TransferError::RelayClosed)));

        sender.write_all(&body[CHUNK_SIZE..]).await.unwrap();
        drop(sender);

        let report = first.await.unwrap().unwrap();
        assert_eq!(std::fs::read(&report.path).unwrap(), body);

        // Once finished, the token only starts a new, unmatched registration.
        let late = receive(addr, token, second_dest.path()).await;
        assert!(matches!(late, Err(TransferError::RelayClosed)));
        assert_eq!(std::fs::read_dir(second_dest.path()).unwrap().count(), 0);

        server.shutdown();
    }

    #[tokio::test]
    async fn transfers_with_distinct_tokens_are_independent() {
        let (server, addr) = start_relay(Duration::from_secs(30)).await;
        let src = tempfile::tempdir().unwrap();
        let dest_a = tempfile::tempdir().unwrap();
        let dest_b = tempfile::tempdir().unwrap();

        let a = src.path().join("a.dat");
        let b = src.path().join("b.dat");
        std::fs::write(&a, pattern(CHUNK_SIZE + 1)).unwrap();
        std::fs::write(&b, b"bbbb").unwrap();

        let (token_a, token_b) = (generate_token(), generate_token());
        let mut senders = Vec::new();
        for (path, token) in [(a.clone(), token_a), (b.clone(), token_b)] {
            senders.push(tokio::spawn(async move {
                let (tx, _rx) = mpsc::channel(64);
                Sender::new(addr.to_string(), token)
                    .send_file(&path, CancellationToken::new(), tx)
                    .await
            }));
        }
        wait_pending(&server, 2).await;

        // Claim in reverse order of registration.
        let got_b = receive(addr, token_b, dest_b.path()).await.unwrap();
        let got_a = receive(addr, token_a, dest_a.path()).await.unwrap();
        for sender in senders {
            sender.await.unwrap().unwrap();
        }

        assert_eq!(std::fs::read(&got_a.path).unwrap(), pattern(CHUNK_SIZE + 1));
        assert_eq!(std::fs::read(&got_b.path).unwrap(), b"bbbb");

        server.shutdown();
    }
}
