//! Playback manager
//!
//! A `PlaybackManager` is a cheap, cloneable handle to a transition loop task.
//! The loop owns the queue, the cursor and the active player. Handles send it
//! requests over an mpsc channel and await the reply on a oneshot channel, so
//! player creation and teardown are serialised with every cursor move.
//!
//! The active player's finish callback runs on the render thread with the
//! device lock held. It only posts the player's generation number to the loop,
//! which then advances the queue. A finish message for a player that has since
//! been replaced carries an old generation and is ignored, as is one for the
//! current player if a request handled in between paused or repositioned it.

use crate::audio::{AudioDevice, AudioPlayer};
use crate::error::{Error, Result};
use crate::playback::queue::{PlaybackQueue, TrackReference, TrackResolver};
use chrono::Utc;
use rmpd_common::events::{PlaybackEvent, PlaybackState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

/// Pending requests per manager before callers wait
const REQUEST_CHANNEL_CAPACITY: usize = 32;

/// Buffered events per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Snapshot returned by [`PlaybackManager::status`]
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackStatus {
    pub state: PlaybackState,
    /// Name of the track under the cursor
    pub track: Option<String>,
    pub position: Duration,
    pub duration: Duration,
    pub cursor: usize,
    pub queue_length: usize,
    /// Names of every queued track, in order
    pub tracks: Vec<String>,
}

enum Request {
    AddTracks {
        paths: Vec<String>,
        reply: oneshot::Sender<Result<Vec<String>>>,
    },
    Play {
        reply: oneshot::Sender<Result<String>>,
    },
    Pause {
        reply: oneshot::Sender<Result<String>>,
    },
    Seek {
        offset: Duration,
        reply: oneshot::Sender<Result<String>>,
    },
    Stop {
        reply: oneshot::Sender<Result<()>>,
    },
    Next {
        reply: oneshot::Sender<Result<Option<String>>>,
    },
    Previous {
        reply: oneshot::Sender<Result<String>>,
    },
    Status {
        reply: oneshot::Sender<PlaybackStatus>,
    },
}

/// Handle to a playback queue and its transition loop
///
/// The loop stops, closing its player, once every handle is dropped.
#[derive(Clone)]
pub struct PlaybackManager {
    requests: mpsc::Sender<Request>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackManager {
    /// Spawn a transition loop on the current tokio runtime.
    ///
    /// `resolver` validates the paths given to [`add_tracks`](Self::add_tracks).
    pub fn new(device: Arc<AudioDevice>, resolver: TrackResolver) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let transition_loop = TransitionLoop {
            device,
            resolver,
            queue: PlaybackQueue::new(),
            player: None,
            generation: 0,
            finished_tx,
            events: events.clone(),
        };
        tokio::spawn(transition_loop.run(requests_rx, finished_rx));

        Self {
            requests: requests_tx,
            events,
        }
    }

    /// Subscribe to playback events
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Validate and append tracks. Returns the names of the queued tracks.
    ///
    /// If some paths are rejected the others stay queued and the error lists
    /// every rejected path.
    pub async fn add_tracks(&self, paths: Vec<String>) -> Result<Vec<String>> {
        self.request(|reply| Request::AddTracks { paths, reply })
            .await?
    }

    /// Start or resume the current track. Returns its name.
    pub async fn play(&self) -> Result<String> {
        self.request(|reply| Request::Play { reply }).await?
    }

    pub async fn pause(&self) -> Result<String> {
        self.request(|reply| Request::Pause { reply }).await?
    }

    /// Seek within the current track, keeping the play/pause state.
    pub async fn seek(&self, offset: Duration) -> Result<String> {
        self.request(|reply| Request::Seek { offset, reply })
            .await?
    }

    /// Pause and rewind the current track.
    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| Request::Stop { reply }).await?
    }

    /// Move to the next track. `Ok(None)` means the queue is now exhausted.
    pub async fn next(&self) -> Result<Option<String>> {
        self.request(|reply| Request::Next { reply }).await?
    }

    /// Move to the previous track, or restart the first one.
    pub async fn previous(&self) -> Result<String> {
        self.request(|reply| Request::Previous { reply }).await?
    }

    pub async fn status(&self) -> Result<PlaybackStatus> {
        self.request(|reply| Request::Status { reply }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Request) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.requests
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::ManagerClosed)?;
        reply_rx.await.map_err(|_| Error::ManagerClosed)
    }
}

struct ActivePlayer {
    player: AudioPlayer,
    generation: u64,
    /// Whether TrackStarted has been emitted for this player
    started: bool,
}

struct TransitionLoop {
    device: Arc<AudioDevice>,
    resolver: TrackResolver,
    queue: PlaybackQueue,
    /// Present only while the cursor points at a track
    player: Option<ActivePlayer>,
    generation: u64,
    finished_tx: mpsc::UnboundedSender<u64>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl TransitionLoop {
    async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut finished: mpsc::UnboundedReceiver<u64>,
    ) {
        debug!("Playback transition loop started");

        loop {
            tokio::select! {
                // Requests already queued are applied before a finish notice
                biased;
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                Some(generation) = finished.recv() => self.on_track_finished(generation).await,
            }
        }

        self.teardown_player();
        debug!("Playback transition loop stopped");
    }

    async fn handle(&mut self, request: Request) {
        // A dropped reply receiver means the caller went away; nothing to do
        match request {
            Request::AddTracks { paths, reply } => {
                let _ = reply.send(self.add_tracks(paths).await);
            }
            Request::Play { reply } => {
                let _ = reply.send(self.play().await);
            }
            Request::Pause { reply } => {
                let _ = reply.send(self.pause());
            }
            Request::Seek { offset, reply } => {
                let _ = reply.send(self.seek(offset));
            }
            Request::Stop { reply } => {
                let _ = reply.send(self.stop());
            }
            Request::Next { reply } => {
                let _ = reply.send(self.next().await);
            }
            Request::Previous { reply } => {
                let _ = reply.send(self.previous().await);
            }
            Request::Status { reply } => {
                let _ = reply.send(self.status());
            }
        }
    }

    async fn add_tracks(&mut self, paths: Vec<String>) -> Result<Vec<String>> {
        let was_exhausted = self.queue.is_exhausted();
        let mut added = Vec::new();
        let mut rejected = Vec::new();

        for raw in paths {
            match self.resolver.resolve(&raw) {
                Ok(track) => {
                    info!("Queued {}", track.path().display());
                    added.push(track.name());
                    self.queue.push(track);
                }
                Err(e) => {
                    warn!("Rejected {}: {}", raw, e);
                    rejected.push((raw, e));
                }
            }
        }

        if !added.is_empty() {
            self.emit(PlaybackEvent::QueueChanged {
                length: self.queue.len(),
                timestamp: Utc::now(),
            });

            // The first new track is now current; have it ready for Play
            if was_exhausted && self.player.is_none() {
                if let Err(e) = self.create_player().await {
                    warn!("Could not prepare {}: {}", added[0], e);
                }
            }
        }

        if rejected.is_empty() {
            Ok(added)
        } else {
            Err(Error::AddTracksFailed(rejected))
        }
    }

    async fn play(&mut self) -> Result<String> {
        if self.queue.is_exhausted() {
            return Err(Error::NoActiveTrack);
        }
        if self.player.is_none() {
            self.create_player().await?;
        }
        if self.is_playing() {
            return Err(Error::AlreadyPlaying);
        }
        self.start_playback()
    }

    fn pause(&mut self) -> Result<String> {
        let active = self.player.as_ref().ok_or(Error::NoActiveTrack)?;
        if active.player.is_paused() {
            return Err(Error::AlreadyPaused);
        }
        active.player.pause();
        let name = active.player.name().to_string();

        info!("Paused {}", name);
        self.emit_state();
        Ok(name)
    }

    fn seek(&mut self, offset: Duration) -> Result<String> {
        let active = self.player.as_ref().ok_or(Error::NoActiveTrack)?;
        active.player.seek(offset)?;
        Ok(active.player.name().to_string())
    }

    fn stop(&mut self) -> Result<()> {
        let was_playing = self.is_playing();
        let active = self.player.as_ref().ok_or(Error::NoActiveTrack)?;
        if was_playing {
            active.player.pause();
        }
        active.player.seek(Duration::ZERO)?;

        info!("Stopped {}", active.player.name());
        if was_playing {
            self.emit_state();
        }
        Ok(())
    }

    async fn next(&mut self) -> Result<Option<String>> {
        if self.queue.is_exhausted() {
            return Err(Error::InvalidCursorMove(
                "there is no next track".to_string(),
            ));
        }

        let was_playing = self.is_playing();
        self.teardown_player();
        self.queue.advance()?;

        if self.queue.is_exhausted() {
            self.finish_queue();
            return Ok(None);
        }

        self.create_player().await?;
        if was_playing {
            self.start_playback().map(Some)
        } else {
            Ok(self.current_name())
        }
    }

    async fn previous(&mut self) -> Result<String> {
        if self.queue.is_empty() {
            return Err(Error::InvalidCursorMove("the queue is empty".to_string()));
        }

        if self.queue.cursor() == 0 {
            if self.player.is_none() {
                self.create_player().await?;
            }
            let active = self.player.as_ref().ok_or(Error::NoActiveTrack)?;
            active.player.seek(Duration::ZERO)?;
            info!("Restarted {}", active.player.name());
            return Ok(active.player.name().to_string());
        }

        let was_playing = self.is_playing();
        self.teardown_player();
        self.queue.retreat()?;
        self.create_player().await?;

        if was_playing {
            self.start_playback()
        } else {
            self.current_name().ok_or(Error::NoActiveTrack)
        }
    }

    fn status(&self) -> PlaybackStatus {
        let (position, duration) = self
            .player
            .as_ref()
            .map(|a| (a.player.position(), a.player.duration()))
            .unwrap_or_default();

        PlaybackStatus {
            state: self.state(),
            track: self.current_name(),
            position,
            duration,
            cursor: self.queue.cursor(),
            queue_length: self.queue.len(),
            tracks: self.queue.tracks().iter().map(|t| t.name()).collect(),
        }
    }

    async fn on_track_finished(&mut self, generation: u64) {
        match &self.player {
            Some(active) if active.generation == generation => {
                if !active.player.is_finished() {
                    debug!(
                        "Ignoring finish notification for {}: paused or repositioned since",
                        active.player.name()
                    );
                    return;
                }
            }
            _ => {
                debug!("Ignoring stale finish notification (generation {})", generation);
                return;
            }
        }

        if let Some(track) = self.teardown_player() {
            info!("Finished {}", track);
            self.emit(PlaybackEvent::TrackFinished {
                track,
                timestamp: Utc::now(),
            });
        }

        loop {
            if self.queue.advance().is_err() || self.queue.is_exhausted() {
                self.finish_queue();
                return;
            }

            match self.create_player().await {
                Ok(()) => {
                    if let Err(e) = self.start_playback() {
                        warn!("Could not start next track: {}", e);
                    }
                    return;
                }
                Err(e) => {
                    warn!("Skipping unplayable track: {}", e);
                }
            }
        }
    }

    /// Decode the track under the cursor on the blocking pool and make it
    /// the active player (paused).
    async fn create_player(&mut self) -> Result<()> {
        let track = self.queue.current().cloned().ok_or(Error::NoActiveTrack)?;
        self.teardown_player();

        self.generation += 1;
        let generation = self.generation;
        let finished_tx = self.finished_tx.clone();
        let device = Arc::clone(&self.device);
        let path = track.path().to_path_buf();

        let player = tokio::task::spawn_blocking(move || {
            AudioPlayer::create(&path, device, move || {
                // Render thread, device lock held: post and return
                let _ = finished_tx.send(generation);
            })
        })
        .await
        .map_err(|e| Error::DecodeError {
            path: track.path().to_path_buf(),
            reason: format!("decoder task failed: {}", e),
        })??;

        debug!("Prepared {} (generation {})", player.name(), generation);
        self.player = Some(ActivePlayer {
            player,
            generation,
            started: false,
        });
        Ok(())
    }

    fn start_playback(&mut self) -> Result<String> {
        let active = self.player.as_mut().ok_or(Error::NoActiveTrack)?;
        active.player.play();
        let name = active.player.name().to_string();

        if !active.started {
            active.started = true;
            info!("Now playing: {}", name);
            self.emit(PlaybackEvent::TrackStarted {
                track: name.clone(),
                timestamp: Utc::now(),
            });
        }
        self.emit_state();
        Ok(name)
    }

    /// Close the active player, suppressing its finish callback.
    fn teardown_player(&mut self) -> Option<String> {
        self.player.take().map(|mut active| {
            active.player.close();
            active.player.name().to_string()
        })
    }

    fn finish_queue(&mut self) {
        info!("Reached end of playback queue");
        self.emit(PlaybackEvent::QueueFinished {
            timestamp: Utc::now(),
        });
        self.emit_state();
    }

    fn is_playing(&self) -> bool {
        self.player
            .as_ref()
            .is_some_and(|active| !active.player.is_paused())
    }

    fn state(&self) -> PlaybackState {
        match &self.player {
            None => PlaybackState::Idle,
            Some(active) if active.player.is_paused() => PlaybackState::Paused,
            Some(_) => PlaybackState::Playing,
        }
    }

    fn current_name(&self) -> Option<String> {
        self.queue.current().map(TrackReference::name)
    }

    fn emit_state(&self) {
        self.emit(PlaybackEvent::StateChanged {
            state: self.state(),
            timestamp: Utc::now(),
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        debug!("Event: {}", event.event_type());
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
