//! TCP control server
//!
//! One tokio task per connection. Each connection reads a request line,
//! awaits the reply from its playback manager and writes it back before
//! reading the next line, so requests from one client are handled in order.

use crate::audio::AudioDevice;
use crate::error::{Error, Result};
use crate::playback::{PlaybackManager, TrackResolver};
use crate::protocol::dispatcher::CommandDispatcher;
use crate::protocol::framing::{decode_line, MAX_LINE_LEN};
use rmpd_common::config::QueueScope;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// First line sent to every client
pub const WELCOME: &str = "Welcome to Go-MPD!";

/// Where connections get their playback manager from
#[derive(Clone)]
pub enum ManagerSource {
    /// Every connection controls the same queue
    Shared(PlaybackManager),
    /// Each connection gets a private queue, dropped on disconnect
    PerConnection {
        device: Arc<AudioDevice>,
        resolver: TrackResolver,
    },
}

impl ManagerSource {
    /// Build the source for `scope`. Must be called inside a tokio runtime.
    pub fn new(scope: QueueScope, device: Arc<AudioDevice>, resolver: TrackResolver) -> Self {
        match scope {
            QueueScope::Shared => Self::Shared(PlaybackManager::new(device, resolver)),
            QueueScope::PerConnection => Self::PerConnection { device, resolver },
        }
    }

    fn manager_for_connection(&self) -> PlaybackManager {
        match self {
            Self::Shared(manager) => manager.clone(),
            Self::PerConnection { device, resolver } => {
                PlaybackManager::new(Arc::clone(device), resolver.clone())
            }
        }
    }
}

/// Line-protocol listener
pub struct ProtocolServer {
    listener: TcpListener,
    managers: ManagerSource,
}

impl ProtocolServer {
    /// Bind the control socket.
    ///
    /// # Errors
    /// `ListenerBindFailure` if the address cannot be bound.
    pub async fn bind(address: &str, managers: ManagerSource) -> Result<Self> {
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| Error::ListenerBindFailure {
                address: address.to_string(),
                source,
            })?;

        info!("Listening on {}", address);
        Ok(Self { listener, managers })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Protocol server stopping");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Client connected: {}", peer);
                        let manager = self.managers.manager_for_connection();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, peer, manager).await {
                                debug!("Connection {} ended with I/O error: {}", peer, e);
                            }
                            info!("Client disconnected: {}", peer);
                        });
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }
    }
}

enum Line {
    Complete,
    Oversized,
    Eof,
}

/// Read one line into `buf`, reading at most a little past `MAX_LINE_LEN`.
/// The rest of an oversized line is discarded.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    // Room for the longest accepted line plus "\r\n"
    let limit = (MAX_LINE_LEN + 2) as u64;

    buf.clear();
    let read = (&mut *reader).take(limit).read_until(b'\n', buf).await?;
    if read == 0 {
        return Ok(Line::Eof);
    }
    if buf.ends_with(b"\n") || (read as u64) < limit {
        return Ok(Line::Complete);
    }

    let mut rest = Vec::new();
    loop {
        rest.clear();
        let read = (&mut *reader).take(limit).read_until(b'\n', &mut rest).await?;
        if read == 0 || rest.ends_with(b"\n") {
            return Ok(Line::Oversized);
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    manager: PlaybackManager,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let dispatcher = CommandDispatcher::new(manager);

    write_half.write_all(format!("{}\n", WELCOME).as_bytes()).await?;

    let mut buf = Vec::new();
    loop {
        let result = match read_line(&mut reader, &mut buf).await? {
            Line::Eof => break,
            Line::Oversized => Err(Error::ProtocolParseError(format!(
                "request exceeds {} bytes",
                MAX_LINE_LEN
            ))),
            Line::Complete => match decode_line(&buf) {
                Ok(tokens) if tokens.is_empty() => continue,
                Ok(tokens) => {
                    debug!("{} -> {:?}", peer, tokens);
                    dispatcher.dispatch(&tokens).await
                }
                Err(e) => Err(e),
            },
        };

        let mut reply = match result {
            Ok(text) => text,
            Err(e) => {
                warn!("Request from {} failed ({}): {}", peer, e.kind(), e);
                format!("error: {}", e)
            }
        };
        debug!("{} <- {}", peer, reply);

        reply.push('\n');
        write_half.write_all(reply.as_bytes()).await?;
    }

    Ok(())
}
