//! Helpers for driving an in-process server over real TCP.

use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use cinder_protocol::{parse_reply, write_request, Reply};
use cinder_server::{Server, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

/// A server running on an ephemeral port inside the test runtime.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    pub fn start() -> Self {
        let config = ServerConfig {
            port: 0,
            threads: 2,
        };
        let server = Server::bind(&config).expect("bind test server");
        let addr = server.local_addr().expect("local addr");

        let (tx, rx) = oneshot::channel();
        tokio::spawn(server.run(async {
            let _ = rx.await;
        }));

        TestServer {
            addr,
            shutdown: Some(tx),
        }
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// A minimal protocol client.
pub struct TestClient {
    stream: TcpStream,
    rbuf: BytesMut,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        TestClient {
            stream,
            rbuf: BytesMut::with_capacity(4096),
        }
    }

    /// Sends one command and waits for its reply.
    pub async fn cmd(&mut self, args: &[&str]) -> Reply {
        let args: Vec<Bytes> = args
            .iter()
            .map(|a| Bytes::copy_from_slice(a.as_bytes()))
            .collect();
        let mut out = BytesMut::new();
        write_request(&mut out, &args);
        self.stream.write_all(&out).await.expect("write request");
        self.read_reply().await
    }

    /// Writes raw bytes without framing (protocol-violation tests).
    pub async fn send_raw(&mut self, raw: &[u8]) {
        self.stream.write_all(raw).await.expect("write raw");
    }

    /// Reads until one full reply is buffered.
    pub async fn read_reply(&mut self) -> Reply {
        loop {
            if let Some((reply, consumed)) = parse_reply(&self.rbuf).expect("well-formed reply") {
                let _ = self.rbuf.split_to(consumed);
                return reply;
            }
            let n = self
                .stream
                .read_buf(&mut self.rbuf)
                .await
                .expect("read reply");
            assert!(n > 0, "server closed while awaiting a reply");
        }
    }

    /// True once the server has closed its end.
    pub async fn server_closed(&mut self) -> bool {
        match self.stream.read_buf(&mut self.rbuf).await {
            Ok(0) => true,
            Ok(_) => false,
            Err(_) => true,
        }
    }
}
