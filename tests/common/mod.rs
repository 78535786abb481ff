//! Loopback helpers shared by the integration tests

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use airplay_lite::{ServerConfig, SessionServer};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Upper bound on any single test conversation
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Loopback configuration: ephemeral port, no advertisement
pub fn test_config() -> ServerConfig {
    ServerConfig::with_name("Integration Test")
        .port(0)
        .advertise(false)
}

/// Start a server and return it with its loopback address
pub async fn start_server(config: ServerConfig) -> (SessionServer, SocketAddr) {
    let mut server = SessionServer::new(config);
    server.start().await.unwrap();
    let port = server.local_addr().unwrap().port();
    (server, SocketAddr::from(([127, 0, 0, 1], port)))
}

/// Run the server loop until `client` completes, returning its output
pub async fn drive<T>(server: &mut SessionServer, client: impl Future<Output = T>) -> T {
    let run = async {
        tokio::pin!(client);
        loop {
            tokio::select! {
                out = &mut client => return out,
                result = server.process() => result.unwrap(),
            }
        }
    };
    tokio::time::timeout(TEST_TIMEOUT, run)
        .await
        .expect("test conversation timed out")
}

/// A parsed response head
#[derive(Debug)]
pub struct Reply {
    pub status_line: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl Reply {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn cseq(&self) -> Option<&str> {
        self.header("CSeq")
    }
}

/// Raw control connection
pub struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read, writer) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    /// Write raw bytes, ignoring errors from a peer that already closed
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let _ = self.writer.write_all(bytes).await;
    }

    /// Send one streaming request with a `CSeq` and extra headers
    pub async fn send(&mut self, method: &str, cseq: u32, headers: &[(&str, &str)]) {
        let mut request = format!("{method} rtsp://127.0.0.1/1 RTSP/1.0\r\nCSeq: {cseq}\r\n");
        for (name, value) in headers {
            request.push_str(&format!("{name}: {value}\r\n"));
        }
        request.push_str("\r\n");
        self.send_raw(request.as_bytes()).await;
    }

    /// Read one response head; `None` on EOF
    pub async fn read_reply(&mut self) -> Option<Reply> {
        let mut status_line = String::new();
        match self.reader.read_line(&mut status_line).await {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let status_line = status_line.trim_end().to_string();
        let status = status_line.split(' ').nth(1)?.parse().ok()?;

        let mut headers = Vec::new();
        loop {
            let mut line = String::new();
            if self.reader.read_line(&mut line).await.ok()? == 0 {
                return None;
            }
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':')?;
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Some(Reply {
            status_line,
            status,
            headers,
        })
    }

    /// Send a request and read its reply
    pub async fn request(&mut self, method: &str, cseq: u32, headers: &[(&str, &str)]) -> Reply {
        self.send(method, cseq, headers).await;
        self.read_reply().await.expect("connection closed")
    }

    /// Has the server closed the connection?
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 64];
        matches!(self.reader.read(&mut buf).await, Ok(0) | Err(_))
    }
}
