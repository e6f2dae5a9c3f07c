//! mpg123 remote module - spawns and controls an external mpg123 via its `-R` interface.
//!
//! Architecture:
//! - `process.rs` - mpg123 binary detection and process spawning
//! - `remote.rs` - Line-based stdin/stdout connection and the status reader task
//! - `protocol.rs` - Command rendering and status line classification
//! - `state.rs` - Playback snapshot updated from status lines
//! - `client.rs` - High-level client with command methods

mod client;
mod process;
mod protocol;
mod remote;
mod state;

pub use client::{Mpg123Client, Mpg123Error};
pub use process::{find_mpg123, ProcessError};
pub use protocol::{Mpg123Command, StatusLine, TagField};
pub use remote::RemoteError;
pub use state::{
  DeadReason, HandleStatus, PlaybackPosition, PlaybackState, PlayerEvent, PlayerSnapshot,
  TrackMetadata,
};
