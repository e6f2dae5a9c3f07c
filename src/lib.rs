//! Control client for the mpg123 command-line player.
//!
//! mpg123 is started in remote-control mode; commands go to its stdin and a
//! background task turns its status lines into a [`PlayerSnapshot`].
//!
//! ```no_run
//! # async fn demo() -> Result<(), mpg123_remote::Mpg123Error> {
//! use mpg123_remote::{Mpg123Client, PlayerConfig};
//!
//! let player = Mpg123Client::launch(PlayerConfig::default()).await?;
//! player.playfile("/music/song.mp3").await?;
//! println!("{} - {}", player.artist(), player.title());
//! player.quit().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod mpg123;

pub use config::{ConfigError, PlayerConfig};
pub use mpg123::*;
