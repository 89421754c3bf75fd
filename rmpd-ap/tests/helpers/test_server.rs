//! Test server wrapper for integration tests
//!
//! Runs a `ProtocolServer` on an ephemeral port against a manually driven
//! audio device, so tests decide exactly when audio time passes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rmpd_ap::audio::AudioDevice;
use rmpd_ap::playback::TrackResolver;
use rmpd_ap::protocol::{ManagerSource, ProtocolServer, WELCOME};
use rmpd_common::config::QueueScope;
use rmpd_common::events::PlaybackEvent;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::audio_generator::TEST_SAMPLE_RATE;

/// How long a test waits for a reply or event before failing
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// Protocol server on 127.0.0.1 with an ephemeral port
pub struct TestServer {
    addr: SocketAddr,
    device: Arc<AudioDevice>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub async fn start(scope: QueueScope) -> Self {
        let device = AudioDevice::manual(TEST_SAMPLE_RATE);
        let managers = ManagerSource::new(scope, Arc::clone(&device), TrackResolver::default());
        let server = ProtocolServer::bind("127.0.0.1:0", managers)
            .await
            .expect("bind test server");
        let addr = server.local_addr().expect("local addr");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            device,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub async fn connect(&self) -> TestClient {
        TestClient::connect(self.addr).await
    }

    /// Render `duration` of audio on the shared device
    pub fn advance(&self, duration: Duration) {
        self.device.advance(duration);
    }

    pub fn device(&self) -> &Arc<AudioDevice> {
        &self.device
    }

    /// Stop accepting connections and wait for the accept loop to exit
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            timeout(REPLY_TIMEOUT, handle)
                .await
                .expect("server did not stop")
                .expect("server task panicked");
        }
    }
}

/// Line-protocol client
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    /// Connect and consume the welcome line
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (read_half, writer) = stream.into_split();
        let mut client = Self {
            reader: BufReader::new(read_half),
            writer,
        };
        assert_eq!(client.read_line().await, WELCOME);
        client
    }

    /// Send one request line and return the first reply line
    pub async fn send(&mut self, request: &str) -> String {
        self.write_raw(format!("{}\n", request).as_bytes()).await;
        self.read_line().await
    }

    pub async fn write_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write request");
    }

    /// Next reply line without its terminator
    pub async fn read_line(&mut self) -> String {
        let mut line = String::new();
        let read = timeout(REPLY_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for reply")
            .expect("read reply");
        assert!(read > 0, "server closed the connection");
        line.trim_end_matches(['\r', '\n']).to_string()
    }
}

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<PlaybackEvent>,
    predicate: F,
) -> PlaybackEvent
where
    F: Fn(&PlaybackEvent) -> bool,
{
    timeout(REPLY_TIMEOUT, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

/// Drain every event already delivered to `events`
pub fn drain_events(events: &mut broadcast::Receiver<PlaybackEvent>) -> Vec<PlaybackEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
