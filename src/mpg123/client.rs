//! High-level mpg123 client with command methods.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process::Child;

use super::process::{spawn_mpg123, ProcessError};
use super::protocol::Mpg123Command;
use super::remote::{Mpg123Remote, RemoteError, Shared};
use super::state::{
  DeadReason, HandleStatus, PlaybackPosition, PlaybackState, PlayerEvent, PlayerSnapshot, TrackMetadata,
};
use crate::config::PlayerConfig;

#[derive(Error, Debug)]
pub enum Mpg123Error {
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("Remote error: {0}")]
  Remote(#[from] RemoteError),
  #[error("mpg123 is not running")]
  NotRunning,
  #[error("mpg123 was already started by this client")]
  AlreadyStarted,
}

/// High-level mpg123 client.
///
/// One client drives at most one player process. Once that process is
/// gone the client stays dead; create a new client to play again.
pub struct Mpg123Client {
  config: PlayerConfig,
  shared: Arc<Shared>,
  process: Mutex<Option<Child>>,
  remote: Mutex<Option<Arc<Mpg123Remote>>>,
}

impl Mpg123Client {
  /// Create an idle client. Nothing is spawned until [`start`](Self::start).
  pub fn new(config: PlayerConfig) -> Self {
    let shared = Arc::new(Shared::new(config.event_capacity));
    Self {
      config,
      shared,
      process: Mutex::new(None),
      remote: Mutex::new(None),
    }
  }

  /// Create a client and launch mpg123 right away.
  pub async fn launch(config: PlayerConfig) -> Result<Self, Mpg123Error> {
    let client = Self::new(config);
    client.start().await?;
    Ok(client)
  }

  /// Attach a client to an already connected remote-control stream pair.
  ///
  /// `reader` carries status lines from the player, `writer` takes
  /// commands. Must be called from within a tokio runtime.
  pub fn from_streams<R, W>(config: PlayerConfig, reader: R, writer: W) -> Self
  where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
  {
    let client = Self::new(config);
    let remote = Mpg123Remote::setup(reader, writer, client.shared.clone());
    *client.remote.lock() = Some(Arc::new(remote));
    client
  }

  /// Spawn mpg123 and start reading its status stream.
  ///
  /// On failure the client stays inert and may be started again.
  pub async fn start(&self) -> Result<(), Mpg123Error> {
    if self.remote.lock().is_some() {
      return Err(Mpg123Error::AlreadyStarted);
    }

    let mpg123_path = self.config.mpg123_path.as_ref().map(PathBuf::from);
    let spawned = match spawn_mpg123(mpg123_path.as_ref(), &self.config.extra_args) {
      Ok(spawned) => spawned,
      Err(e) => {
        log::error!("Unable to open mpg123: {}", e);
        return Err(e.into());
      }
    };

    let remote = Mpg123Remote::setup(spawned.stdout, spawned.stdin, self.shared.clone());
    *self.process.lock() = Some(spawned.child);
    *self.remote.lock() = Some(Arc::new(remote));

    log::info!("mpg123 client started");
    Ok(())
  }

  fn get_remote(&self) -> Result<Arc<Mpg123Remote>, Mpg123Error> {
    let guard = self.remote.lock();
    guard.clone().ok_or(Mpg123Error::NotRunning)
  }

  async fn send(&self, cmd: Mpg123Command) -> Result<(), Mpg123Error> {
    self.send_raw(&cmd.to_line()).await
  }

  /// Send a raw protocol line. Empty input is ignored.
  pub async fn send_raw(&self, line: &str) -> Result<(), Mpg123Error> {
    if line.is_empty() {
      return Ok(());
    }
    let remote = self.get_remote()?;
    remote.write_line(line).await?;
    Ok(())
  }

  /// Load a file and start playing it.
  ///
  /// Track metadata is reset only when the command can be sent; a dead
  /// client keeps its last snapshot.
  pub async fn playfile(&self, path: &str) -> Result<(), Mpg123Error> {
    log::info!("Loading file: {}", path);
    let remote = self.get_remote()?;
    let line = Mpg123Command::Load(path.to_string()).to_line();
    remote
      .write_line_with(&line, |snapshot| snapshot.begin_load(path))
      .await?;
    Ok(())
  }

  /// Pause playback. Does nothing unless the player is playing.
  ///
  /// mpg123 only knows a pause toggle, so this relies on the last state
  /// the reader saw. A state change still in flight can make the toggle
  /// resume instead.
  pub async fn pause(&self) -> Result<(), Mpg123Error> {
    if self.state() != PlaybackState::Playing {
      log::debug!("pause() skipped, player is {:?}", self.state());
      return Ok(());
    }
    self.send(Mpg123Command::Pause).await
  }

  /// Resume playback. Does nothing unless the player is paused.
  pub async fn unpause(&self) -> Result<(), Mpg123Error> {
    if self.state() != PlaybackState::Paused {
      log::debug!("unpause() skipped, player is {:?}", self.state());
      return Ok(());
    }
    self.send(Mpg123Command::Pause).await
  }

  /// Stop any playing media.
  pub async fn stop(&self) -> Result<(), Mpg123Error> {
    self.send(Mpg123Command::Stop).await
  }

  /// Set volume in percent. Values outside 0-100 are ignored.
  pub async fn set_volume(&self, percent: f64) -> Result<(), Mpg123Error> {
    if !(0.0..=100.0).contains(&percent) {
      log::warn!("Ignoring out of range volume: {}", percent);
      return Ok(());
    }
    self.send(Mpg123Command::Volume(percent)).await
  }

  /// Seek to absolute position in seconds.
  pub async fn seek(&self, seconds: f64) -> Result<(), Mpg123Error> {
    self.send(Mpg123Command::Jump(seconds)).await
  }

  /// Seek relative to the current position.
  pub async fn seek_by(&self, delta_seconds: f64) -> Result<(), Mpg123Error> {
    self.send(Mpg123Command::JumpBy(delta_seconds)).await
  }

  /// Ask mpg123 to quit and wait for it to go away.
  ///
  /// Waits up to the configured shutdown timeout for the player to exit
  /// on its own, then kills it.
  pub async fn quit(&self) -> Result<(), Mpg123Error> {
    let remote = self.get_remote()?;
    let timeout = self.config.shutdown_timeout();

    let quit_line = Mpg123Command::Quit.to_line();
    let sent = match tokio::time::timeout(timeout, remote.write_line(&quit_line)).await {
      Ok(sent) => sent,
      Err(_) => Err(RemoteError::Timeout),
    };
    match &sent {
      Ok(()) => self.shared.request_quit(),
      Err(e) => log::warn!("QUIT was not delivered: {}", e),
    }

    remote.join_reader(timeout).await;
    self.reap_process(timeout).await;
    if sent.is_ok() {
      self.shared.settle_quit();
    } else {
      self.shared.mark_dead(DeadReason::Quit);
    }

    log::info!("mpg123 client stopped");
    sent.map_err(Into::into)
  }

  /// Kill mpg123 without asking it to quit.
  pub async fn kill(&self) {
    self.shared.request_quit();
    let remote = self.remote.lock().clone();
    if let Some(remote) = remote {
      remote.abort().await;
    }
    self.reap_process(Duration::ZERO).await;
    self.shared.mark_dead(DeadReason::Quit);
  }

  async fn reap_process(&self, timeout: Duration) {
    let child = self.process.lock().take();
    let Some(mut child) = child else {
      return;
    };
    let pid = child.id();

    match tokio::time::timeout(timeout, child.wait()).await {
      Ok(Ok(status)) => {
        log::info!("mpg123 (pid: {:?}) exited with: {}", pid, status);
        return;
      }
      Ok(Err(e)) => log::error!("wait() failed: {}", e),
      Err(_) => log::warn!("mpg123 (pid: {:?}) did not exit in {:?}", pid, timeout),
    }

    log::info!("Killing mpg123 process (pid: {:?})", pid);
    match child.kill().await {
      Ok(()) => log::info!("kill() succeeded"),
      Err(e) => log::error!("kill() failed: {}", e),
    }
  }

  /// Liveness of the process handle.
  pub fn status(&self) -> HandleStatus {
    self.shared.read(|s| s.status.clone())
  }

  pub fn is_alive(&self) -> bool {
    self.shared.read(|s| s.status.is_alive())
  }

  /// Consistent copy of everything the reader has seen.
  pub fn snapshot(&self) -> PlayerSnapshot {
    self.shared.snapshot()
  }

  pub fn state(&self) -> PlaybackState {
    self.shared.read(|s| s.state)
  }

  pub fn metadata(&self) -> TrackMetadata {
    self.shared.read(|s| s.metadata.clone())
  }

  pub fn title(&self) -> String {
    self.shared.read(|s| s.metadata.title.clone())
  }

  pub fn artist(&self) -> String {
    self.shared.read(|s| s.metadata.artist.clone())
  }

  pub fn album(&self) -> String {
    self.shared.read(|s| s.metadata.album.clone())
  }

  pub fn year(&self) -> String {
    self.shared.read(|s| s.metadata.year.clone())
  }

  pub fn playback_position(&self) -> PlaybackPosition {
    self.shared.read(|s| s.position)
  }

  /// Duration of the current track in seconds.
  pub fn duration(&self) -> f64 {
    self.shared.read(|s| s.position.duration_seconds)
  }

  /// Current offset into the track in seconds.
  pub fn position(&self) -> f64 {
    self.shared.read(|s| s.position.offset_seconds)
  }

  /// Volume in percent, as last reported by the player.
  pub fn volume(&self) -> f64 {
    self.shared.read(|s| s.volume)
  }

  /// mpg123 version banner, once received.
  pub fn version(&self) -> Option<String> {
    self.shared.read(|s| s.version.clone())
  }

  pub fn current_song(&self) -> Option<String> {
    self.shared.read(|s| s.current_song.clone())
  }

  /// Subscribe to player events.
  ///
  /// Every call returns its own bounded queue that receives all events
  /// published from then on. A subscriber that falls behind loses its
  /// oldest events.
  pub fn events(&self) -> Receiver<PlayerEvent> {
    self.shared.events()
  }
}
