//! Line-based remote-control connection to a running mpg123.
//!
//! Commands are written straight to the player's stdin; a single reader
//! task consumes stdout and applies every status line to the shared
//! snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::protocol::StatusLine;
use super::state::{DeadReason, HandleStatus, PlayerEvent, PlayerSnapshot};

#[derive(Error, Debug)]
pub enum RemoteError {
  #[error("Write failed: {0}")]
  WriteFailed(#[from] std::io::Error),
  #[error("Player handle is dead: {0}")]
  Dead(DeadReason),
  #[error("Write timed out")]
  Timeout,
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// State shared between the client, the command path and the reader task.
pub struct Shared {
  snapshot: Mutex<PlayerSnapshot>,
  quit_requested: AtomicBool,
  event_capacity: usize,
  subscribers: Mutex<Vec<Sender<PlayerEvent>>>,
}

impl Shared {
  pub fn new(event_capacity: usize) -> Self {
    Self {
      snapshot: Mutex::new(PlayerSnapshot::default()),
      quit_requested: AtomicBool::new(false),
      event_capacity: event_capacity.max(1),
      subscribers: Mutex::new(Vec::new()),
    }
  }

  /// Copy of the current snapshot.
  pub fn snapshot(&self) -> PlayerSnapshot {
    self.snapshot.lock().clone()
  }

  /// Run `f` with the snapshot locked.
  pub fn read<T>(&self, f: impl FnOnce(&PlayerSnapshot) -> T) -> T {
    f(&self.snapshot.lock())
  }

  /// New subscriber queue. Each subscriber sees every event published
  /// after it subscribed.
  pub fn events(&self) -> Receiver<PlayerEvent> {
    let (tx, rx) = async_channel::bounded(self.event_capacity);
    self.subscribers.lock().push(tx);
    rx
  }

  pub fn request_quit(&self) {
    self.quit_requested.store(true, Ordering::SeqCst);
  }

  fn quit_requested(&self) -> bool {
    self.quit_requested.load(Ordering::SeqCst)
  }

  /// Settle the handle as quit once an accepted `QUIT` has run its course.
  pub fn settle_quit(&self) {
    if self.snapshot.lock().settle_quit() {
      log::info!("mpg123 handle closed after quit");
      self.publish(PlayerEvent::Died(DeadReason::Quit));
    }
  }

  /// Mark the handle dead and tell subscribers, once.
  pub fn mark_dead(&self, reason: DeadReason) {
    let newly_dead = self.snapshot.lock().mark_dead(reason.clone());
    if newly_dead {
      log::warn!("mpg123 handle is now dead: {}", reason);
      self.publish(PlayerEvent::Died(reason));
    }
  }

  fn publish(&self, event: PlayerEvent) {
    let mut subscribers = self.subscribers.lock();
    // A full queue drops its oldest event; a closed one is forgotten.
    subscribers.retain(|tx| match tx.force_send(event.clone()) {
      Ok(_) => true,
      Err(e) => {
        log::trace!("Dropping closed event subscriber: {:?}", e.into_inner());
        false
      }
    });
  }
}

/// Remote-control connection to one mpg123 process.
pub struct Mpg123Remote {
  shared: Arc<Shared>,
  writer: tokio::sync::Mutex<Option<BoxedWriter>>,
  cancel: CancellationToken,
  reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Mpg123Remote {
  /// Attach to the player's streams and start the reader task.
  ///
  /// Must be called from within a tokio runtime.
  pub fn setup<R, W>(reader: R, writer: W, shared: Arc<Shared>) -> Self
  where
    R: AsyncRead + Send + Unpin + 'static,
    W: AsyncWrite + Send + Unpin + 'static,
  {
    shared.snapshot.lock().status = HandleStatus::Alive;

    let cancel = CancellationToken::new();
    let reader_shared = shared.clone();
    let reader_cancel = cancel.clone();
    let reader_handle = tokio::spawn(async move {
      Self::reader_loop(reader, reader_shared, reader_cancel).await;
    });

    Self {
      shared,
      writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
      cancel,
      reader_handle: Mutex::new(Some(reader_handle)),
    }
  }

  async fn reader_loop<R: AsyncRead + Unpin>(
    reader: R,
    shared: Arc<Shared>,
    cancel: CancellationToken,
  ) {
    log::info!("mpg123 reader loop started");
    let mut buf_reader = BufReader::new(reader);
    let mut buf = Vec::new();

    let reason = loop {
      buf.clear();
      let read = tokio::select! {
        _ = cancel.cancelled() => {
          log::info!("mpg123 reader cancelled");
          break DeadReason::Quit;
        }
        read = buf_reader.read_until(b'\n', &mut buf) => read,
      };

      match read {
        Ok(0) => {
          log::info!("mpg123 output closed");
          break if shared.quit_requested() {
            DeadReason::Quit
          } else {
            DeadReason::StreamClosed
          };
        }
        Ok(_) => {
          let line = String::from_utf8_lossy(&buf);
          log::trace!("mpg123: {}", line.trim_end());
          match StatusLine::parse(&line) {
            Some(status) => {
              let event = shared.snapshot.lock().apply(status);
              shared.publish(event);
            }
            None => log::debug!("Ignoring mpg123 line: {}", line.trim_end()),
          }
        }
        Err(e) => {
          log::error!("mpg123 read error: {}", e);
          break DeadReason::ReadFailed(e.to_string());
        }
      }
    };

    shared.mark_dead(reason);
    log::info!("mpg123 reader loop finished");
  }

  /// Write one command line and flush it.
  ///
  /// A dead handle is reported without touching the pipe. The first failed
  /// write kills the handle.
  pub async fn write_line(&self, line: &str) -> Result<(), RemoteError> {
    self.write_line_with(line, |_| {}).await
  }

  /// Like [`write_line`](Self::write_line), running `on_accepted` against
  /// the snapshot once the handle is known to be alive and before the
  /// line is written.
  pub async fn write_line_with(
    &self,
    line: &str,
    on_accepted: impl FnOnce(&mut PlayerSnapshot),
  ) -> Result<(), RemoteError> {
    let mut guard = self.writer.lock().await;

    let dead = {
      let mut snapshot = self.shared.snapshot.lock();
      if let HandleStatus::Dead(reason) = &snapshot.status {
        Some(reason.clone())
      } else if guard.is_none() {
        // Writer already dropped by abort().
        Some(DeadReason::Quit)
      } else {
        on_accepted(&mut snapshot);
        None
      }
    };
    if let Some(reason) = dead {
      guard.take();
      return Err(RemoteError::Dead(reason));
    }
    let Some(writer) = guard.as_mut() else {
      return Err(RemoteError::Dead(DeadReason::Quit));
    };

    log::debug!("CMD: {}", line);
    let mut data = Vec::with_capacity(line.len() + 1);
    data.extend_from_slice(line.as_bytes());
    data.push(b'\n');

    let result = match writer.write_all(&data).await {
      Ok(()) => writer.flush().await,
      Err(e) => Err(e),
    };

    if let Err(e) = result {
      log::error!("mpg123 write error: {}", e);
      guard.take();
      self.shared.mark_dead(DeadReason::WriteFailed(e.to_string()));
      return Err(RemoteError::WriteFailed(e));
    }
    Ok(())
  }

  /// Wait for the reader task to finish, cancelling it after `timeout`.
  pub async fn join_reader(&self, timeout: Duration) {
    let handle = self.reader_handle.lock().take();
    let Some(mut handle) = handle else {
      return;
    };

    match tokio::time::timeout(timeout, &mut handle).await {
      Ok(Ok(())) => log::debug!("mpg123 reader joined"),
      Ok(Err(e)) => log::error!("mpg123 reader task failed: {}", e),
      Err(_) => {
        log::warn!("mpg123 reader still running after {:?}, cancelling", timeout);
        self.cancel.cancel();
        if let Err(e) = handle.await {
          log::error!("mpg123 reader task failed: {}", e);
        }
      }
    }
  }

  /// Stop the reader and drop the writer without waiting for the player.
  pub async fn abort(&self) {
    self.cancel.cancel();
    self.writer.lock().await.take();
    self.join_reader(Duration::ZERO).await;
  }
}

impl Drop for Mpg123Remote {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mpg123::state::PlaybackState;
  use tokio::io::{duplex, AsyncReadExt};

  async fn wait_until(shared: &Shared, f: impl Fn(&PlayerSnapshot) -> bool) {
    for _ in 0..200 {
      if shared.read(&f) {
        return;
      }
      tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached: {:?}", shared.snapshot());
  }

  #[tokio::test]
  async fn test_reader_applies_lines() {
    let (mut player_out, client_in) = duplex(1024);
    let (client_out, _player_in) = duplex(1024);
    let shared = Arc::new(Shared::new(16));
    let _remote = Mpg123Remote::setup(client_in, client_out, shared.clone());

    player_out
      .write_all(b"@R MPG123 (ThOr) v10\n@P 2\r\n@F 10 100 0.26 2.61\n")
      .await
      .unwrap();

    wait_until(&shared, |s| s.position.duration_seconds == 2.61).await;
    let snap = shared.snapshot();
    assert_eq!(snap.state, PlaybackState::Playing);
    assert_eq!(snap.version.as_deref(), Some("MPG123 (ThOr) v10"));
    assert_eq!(snap.status, HandleStatus::Alive);
  }

  #[tokio::test]
  async fn test_reader_survives_garbage() {
    let (mut player_out, client_in) = duplex(1024);
    let (client_out, _player_in) = duplex(1024);
    let shared = Arc::new(Shared::new(16));
    let _remote = Mpg123Remote::setup(client_in, client_out, shared.clone());

    player_out
      .write_all(b"@F 1\n\xff\xfe not utf8\n@V\n@P 1\n")
      .await
      .unwrap();

    wait_until(&shared, |s| s.state == PlaybackState::Paused).await;
    assert!(shared.read(|s| s.status.is_alive()));
  }

  #[tokio::test]
  async fn test_eof_marks_dead_and_publishes() {
    let (player_out, client_in) = duplex(1024);
    let (client_out, _player_in) = duplex(1024);
    let shared = Arc::new(Shared::new(16));
    let events = shared.events();
    let remote = Mpg123Remote::setup(client_in, client_out, shared.clone());

    drop(player_out);
    remote.join_reader(Duration::from_secs(1)).await;

    assert_eq!(
      shared.snapshot().status,
      HandleStatus::Dead(DeadReason::StreamClosed)
    );
    assert_eq!(
      events.recv().await.unwrap(),
      PlayerEvent::Died(DeadReason::StreamClosed)
    );
    assert!(matches!(
      remote.write_line("STOP").await,
      Err(RemoteError::Dead(DeadReason::StreamClosed))
    ));
  }

  #[tokio::test]
  async fn test_every_subscriber_gets_every_event() {
    let (mut player_out, client_in) = duplex(1024);
    let (client_out, _player_in) = duplex(1024);
    let shared = Arc::new(Shared::new(16));
    let first = shared.events();
    let second = shared.events();
    let dropped = shared.events();
    drop(dropped);
    let _remote = Mpg123Remote::setup(client_in, client_out, shared.clone());

    player_out.write_all(b"@P 2\n@V 55%\n").await.unwrap();

    for events in [&first, &second] {
      assert_eq!(
        events.recv().await.unwrap(),
        PlayerEvent::StateChanged(PlaybackState::Playing)
      );
      assert_eq!(events.recv().await.unwrap(), PlayerEvent::Volume(55.0));
    }
    assert_eq!(shared.subscribers.lock().len(), 2);
  }

  #[tokio::test]
  async fn test_full_subscriber_keeps_newest_events() {
    let (mut player_out, client_in) = duplex(1024);
    let (client_out, _player_in) = duplex(1024);
    let shared = Arc::new(Shared::new(2));
    let events = shared.events();
    let _remote = Mpg123Remote::setup(client_in, client_out, shared.clone());

    player_out
      .write_all(b"@V 10%\n@V 20%\n@V 30%\n")
      .await
      .unwrap();
    wait_until(&shared, |s| s.volume == 30.0).await;

    assert_eq!(events.recv().await.unwrap(), PlayerEvent::Volume(20.0));
    assert_eq!(events.recv().await.unwrap(), PlayerEvent::Volume(30.0));
  }

  #[tokio::test]
  async fn test_write_line_appends_newline() {
    let (_player_out, client_in) = duplex(1024);
    let (client_out, mut player_in) = duplex(1024);
    let shared = Arc::new(Shared::new(16));
    let remote = Mpg123Remote::setup(client_in, client_out, shared);

    remote.write_line("LOAD /tmp/a.mp3").await.unwrap();
    remote.write_line("PAUSE").await.unwrap();

    let mut buf = vec![0u8; 22];
    player_in.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, b"LOAD /tmp/a.mp3\nPAUSE\n");
  }

  #[tokio::test]
  async fn test_cancelled_reader_is_joined() {
    let (_player_out, client_in) = duplex(1024);
    let (client_out, _player_in) = duplex(1024);
    let shared = Arc::new(Shared::new(16));
    let remote = Mpg123Remote::setup(client_in, client_out, shared.clone());

    remote.join_reader(Duration::from_millis(20)).await;
    assert_eq!(shared.snapshot().status, HandleStatus::Dead(DeadReason::Quit));
  }
}
