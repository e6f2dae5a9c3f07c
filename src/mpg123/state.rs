//! Playback state snapshot maintained from mpg123 status lines.

use std::fmt;

use serde::Serialize;

use super::protocol::{StatusLine, TagField};

/// Player state as reported by `@P`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackState {
  #[default]
  Idle,
  Paused,
  Playing,
}

/// Tag fields of the current track.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackMetadata {
  pub title: String,
  pub artist: String,
  pub album: String,
  pub year: String,
}

impl TrackMetadata {
  pub fn clear(&mut self) {
    *self = Self::default();
  }

  pub fn is_empty(&self) -> bool {
    self.title.is_empty() && self.artist.is_empty() && self.album.is_empty() && self.year.is_empty()
  }
}

/// Offset and duration, always updated together from one `@F` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackPosition {
  pub offset_seconds: f64,
  pub duration_seconds: f64,
}

/// Why a process handle stopped accepting commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeadReason {
  /// Writing a command to stdin failed.
  WriteFailed(String),
  /// stdout reached EOF without a quit request.
  StreamClosed,
  /// Reading stdout failed.
  ReadFailed(String),
  /// The client asked the player to quit.
  Quit,
}

impl fmt::Display for DeadReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DeadReason::WriteFailed(e) => write!(f, "write to mpg123 failed: {}", e),
      DeadReason::StreamClosed => write!(f, "mpg123 closed its output"),
      DeadReason::ReadFailed(e) => write!(f, "read from mpg123 failed: {}", e),
      DeadReason::Quit => write!(f, "mpg123 was asked to quit"),
    }
  }
}

/// Liveness of the client's process handle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HandleStatus {
  /// No process has been attached yet.
  #[default]
  NotStarted,
  Alive,
  Dead(DeadReason),
}

impl HandleStatus {
  pub fn is_alive(&self) -> bool {
    matches!(self, HandleStatus::Alive)
  }
}

/// Change published to event subscribers after a status line is applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum PlayerEvent {
  StateChanged(PlaybackState),
  Position(PlaybackPosition),
  Metadata(TrackMetadata),
  Volume(f64),
  Version(String),
  Died(DeadReason),
}

/// Everything known about the player at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
  pub state: PlaybackState,
  pub metadata: TrackMetadata,
  pub position: PlaybackPosition,
  pub volume: f64,
  pub version: Option<String>,
  pub current_song: Option<String>,
  pub status: HandleStatus,
}

impl PlayerSnapshot {
  /// Apply one status line and return the resulting event.
  pub fn apply(&mut self, line: StatusLine) -> PlayerEvent {
    match line {
      StatusLine::Frame { offset, duration } => {
        self.position = PlaybackPosition {
          offset_seconds: offset,
          duration_seconds: duration,
        };
        PlayerEvent::Position(self.position)
      }
      StatusLine::State(state) => {
        self.state = state;
        if state == PlaybackState::Idle {
          self.metadata.clear();
          self.current_song = None;
        }
        PlayerEvent::StateChanged(state)
      }
      StatusLine::Tag { field, value } => {
        let slot = match field {
          TagField::Title => &mut self.metadata.title,
          TagField::Album => &mut self.metadata.album,
          TagField::Artist => &mut self.metadata.artist,
          TagField::Year => &mut self.metadata.year,
        };
        *slot = value;
        PlayerEvent::Metadata(self.metadata.clone())
      }
      StatusLine::Id3v1 {
        artist,
        album,
        year,
      } => {
        self.metadata = TrackMetadata {
          title: String::new(),
          artist,
          album,
          year,
        };
        PlayerEvent::Metadata(self.metadata.clone())
      }
      StatusLine::Volume(percent) => {
        self.volume = percent;
        PlayerEvent::Volume(percent)
      }
      StatusLine::Version(version) => {
        self.version = Some(version.clone());
        PlayerEvent::Version(version)
      }
    }
  }

  /// Reset track information ahead of loading a new file.
  pub fn begin_load(&mut self, path: &str) {
    self.metadata.clear();
    self.current_song = Some(path.to_string());
  }

  /// Mark the handle dead. Returns false if it already was.
  pub fn mark_dead(&mut self, reason: DeadReason) -> bool {
    if matches!(self.status, HandleStatus::Dead(_)) {
      return false;
    }
    self.status = HandleStatus::Dead(reason);
    true
  }

  /// Record a completed quit. An unexplained EOF seen while the accepted
  /// `QUIT` was in flight becomes `Quit`; any other death is kept.
  /// Returns true if the handle was still alive.
  pub fn settle_quit(&mut self) -> bool {
    match self.status {
      HandleStatus::Dead(DeadReason::StreamClosed) => {
        self.status = HandleStatus::Dead(DeadReason::Quit);
        false
      }
      HandleStatus::Dead(_) => false,
      _ => {
        self.status = HandleStatus::Dead(DeadReason::Quit);
        true
      }
    }
  }
}
