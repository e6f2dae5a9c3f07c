//! mpg123 remote-control protocol types.
//!
//! Reference: `doc/README.remote` in the mpg123 distribution.

use super::state::PlaybackState;

const ID3V2_TITLE: &str = "@I ID3v2.title:";
const ID3V2_ALBUM: &str = "@I ID3v2.album:";
const ID3V2_ARTIST: &str = "@I ID3v2.artist:";
const ID3V2_YEAR: &str = "@I ID3v2.year:";
const ID3V1: &str = "@I ID3:";

/// Shortest line that carries the whole fixed-width ID3v1 block we read.
const ID3V1_MIN_CHARS: usize = 70;

/// Command sent to mpg123 on stdin.
#[derive(Debug, Clone, PartialEq)]
pub enum Mpg123Command {
  Load(String),
  /// Toggles between paused and playing.
  Pause,
  Stop,
  Quit,
  /// Volume in percent.
  Volume(f64),
  /// Absolute position in seconds.
  Jump(f64),
  /// Relative jump in seconds, negative goes back.
  JumpBy(f64),
}

impl Mpg123Command {
  /// Render the command as a protocol line, without the terminator.
  pub fn to_line(&self) -> String {
    match self {
      Mpg123Command::Load(path) => format!("LOAD {}", path),
      Mpg123Command::Pause => "PAUSE".to_string(),
      Mpg123Command::Stop => "STOP".to_string(),
      Mpg123Command::Quit => "QUIT".to_string(),
      Mpg123Command::Volume(percent) => format!("VOLUME {}", format_float(*percent)),
      Mpg123Command::Jump(seconds) => format!("JUMP {}s", format_float(*seconds)),
      Mpg123Command::JumpBy(delta) => {
        let sign = if delta.is_sign_negative() { '-' } else { '+' };
        format!("JUMP {}{}s", sign, format_float(delta.abs()))
      }
    }
  }
}

/// Shortest decimal form, always keeping a fractional part (`50.0`, `12.5`).
fn format_float(value: f64) -> String {
  if value.is_finite() && value.fract() == 0.0 {
    format!("{:.1}", value)
  } else {
    format!("{}", value)
  }
}

/// ID3v2 text frame reported on its own `@I` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagField {
  Title,
  Album,
  Artist,
  Year,
}

/// One classified status line from mpg123's stdout.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusLine {
  /// `@F` frame report.
  Frame { offset: f64, duration: f64 },
  /// `@P` playback state.
  State(PlaybackState),
  /// `@I ID3v2.<field>:<text>`.
  Tag { field: TagField, value: String },
  /// `@I ID3:` legacy fixed-width block. Carries no title.
  Id3v1 {
    artist: String,
    album: String,
    year: String,
  },
  /// `@V` volume in percent.
  Volume(f64),
  /// `@R` startup banner.
  Version(String),
}

impl StatusLine {
  /// Classify a raw line.
  ///
  /// Returns `None` for unknown lines and for known prefixes whose payload
  /// does not parse; both are ignored by the reader.
  pub fn parse(raw: &str) -> Option<Self> {
    let line = raw.trim_matches(|c| c == '\r' || c == '\n');

    if line.starts_with("@F") {
      return parse_frame(line);
    }
    match line {
      "@P 0" => return Some(StatusLine::State(PlaybackState::Idle)),
      "@P 1" => return Some(StatusLine::State(PlaybackState::Paused)),
      "@P 2" => return Some(StatusLine::State(PlaybackState::Playing)),
      _ => {}
    }

    let tags = [
      (ID3V2_TITLE, TagField::Title),
      (ID3V2_ALBUM, TagField::Album),
      (ID3V2_ARTIST, TagField::Artist),
      (ID3V2_YEAR, TagField::Year),
    ];
    for (marker, field) in tags {
      if let Some(value) = line.strip_prefix(marker) {
        return Some(StatusLine::Tag {
          field,
          value: value.to_string(),
        });
      }
    }

    if line.starts_with(ID3V1) {
      return parse_id3v1(line);
    }
    if line.starts_with("@V") {
      return parse_volume(line);
    }
    if let Some(rest) = line.strip_prefix("@R") {
      let version = rest.strip_prefix(' ').unwrap_or(rest);
      return Some(StatusLine::Version(version.to_string()));
    }

    None
  }
}

/// `@F <frame> <frames-left> <seconds> <seconds-left>`
fn parse_frame(line: &str) -> Option<StatusLine> {
  let fields: Vec<&str> = line.split_whitespace().collect();
  let offset = fields.get(3)?.parse::<f64>().ok()?;
  let duration = fields.get(4)?.parse::<f64>().ok()?;
  Some(StatusLine::Frame { offset, duration })
}

fn parse_id3v1(line: &str) -> Option<StatusLine> {
  let chars: Vec<char> = line.chars().collect();
  if chars.len() < ID3V1_MIN_CHARS {
    return None;
  }
  let field = |start: usize, end: usize| chars[start..end].iter().collect::<String>();
  Some(StatusLine::Id3v1 {
    artist: field(7, 36),
    album: field(37, 66),
    year: field(67, 70),
  })
}

/// `@V <percent>%`
fn parse_volume(line: &str) -> Option<StatusLine> {
  let token = line.split_whitespace().nth(1)?;
  let percent = token.trim_end_matches('%').parse::<f64>().ok()?;
  Some(StatusLine::Volume(percent))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_command_lines() {
    assert_eq!(
      Mpg123Command::Load("/music/a b.mp3".into()).to_line(),
      "LOAD /music/a b.mp3"
    );
    assert_eq!(Mpg123Command::Pause.to_line(), "PAUSE");
    assert_eq!(Mpg123Command::Stop.to_line(), "STOP");
    assert_eq!(Mpg123Command::Quit.to_line(), "QUIT");
    assert_eq!(Mpg123Command::Volume(50.0).to_line(), "VOLUME 50.0");
    assert_eq!(Mpg123Command::Volume(33.5).to_line(), "VOLUME 33.5");
    assert_eq!(Mpg123Command::Jump(12.0).to_line(), "JUMP 12.0s");
    assert_eq!(Mpg123Command::Jump(7.25).to_line(), "JUMP 7.25s");
    assert_eq!(Mpg123Command::JumpBy(5.0).to_line(), "JUMP +5.0s");
    assert_eq!(Mpg123Command::JumpBy(-2.5).to_line(), "JUMP -2.5s");
  }

  #[test]
  fn test_frame_parsing() {
    assert_eq!(
      StatusLine::parse("@F 0 279 0.00 6.70"),
      Some(StatusLine::Frame {
        offset: 0.0,
        duration: 6.7
      })
    );
    assert_eq!(
      StatusLine::parse("@F 112 167 2.93 4.36\r\n"),
      Some(StatusLine::Frame {
        offset: 2.93,
        duration: 4.36
      })
    );
  }

  #[test]
  fn test_malformed_frame_is_dropped() {
    assert_eq!(StatusLine::parse("@F 0 279 0.00"), None);
    assert_eq!(StatusLine::parse("@F"), None);
    assert_eq!(StatusLine::parse("@F 0 279 abc 6.70"), None);
  }

  #[test]
  fn test_state_lines_are_exact() {
    assert_eq!(
      StatusLine::parse("@P 0"),
      Some(StatusLine::State(PlaybackState::Idle))
    );
    assert_eq!(
      StatusLine::parse("@P 1\n"),
      Some(StatusLine::State(PlaybackState::Paused))
    );
    assert_eq!(
      StatusLine::parse("@P 2"),
      Some(StatusLine::State(PlaybackState::Playing))
    );
    assert_eq!(StatusLine::parse("@P 3"), None);
    assert_eq!(StatusLine::parse("@P 2 extra"), None);
  }

  #[test]
  fn test_id3v2_tags() {
    assert_eq!(
      StatusLine::parse("@I ID3v2.title:Foo"),
      Some(StatusLine::Tag {
        field: TagField::Title,
        value: "Foo".into()
      })
    );
    assert_eq!(
      StatusLine::parse("@I ID3v2.artist:Twenty One Pilots"),
      Some(StatusLine::Tag {
        field: TagField::Artist,
        value: "Twenty One Pilots".into()
      })
    );
    assert_eq!(
      StatusLine::parse("@I ID3v2.year:"),
      Some(StatusLine::Tag {
        field: TagField::Year,
        value: String::new()
      })
    );
    // Other ID3v2 frames are not tracked.
    assert_eq!(StatusLine::parse("@I ID3v2.comment:hi"), None);
  }

  #[test]
  fn test_id3v1_fixed_width() {
    let line = format!(
      "@I ID3:{:<30}{:<30}{:<4}{}",
      "Some Artist", "Some Album", "2013", "trailing comment text"
    );
    match StatusLine::parse(&line) {
      Some(StatusLine::Id3v1 {
        artist,
        album,
        year,
      }) => {
        assert_eq!(artist, line[7..36]);
        assert_eq!(album, line[37..66]);
        assert_eq!(year, line[67..70]);
        assert!(artist.starts_with("Some Artist"));
        assert_eq!(artist.chars().count(), 29);
      }
      other => panic!("Expected ID3v1 block, got {:?}", other),
    }
  }

  #[test]
  fn test_id3v1_offsets_count_characters() {
    let line = format!(
      "@I ID3:{:<30}{:<30}{:<4}",
      "Café Tacvba", "Ünïcödé Ålbum", "1994"
    );
    assert!(line.len() > line.chars().count());

    match StatusLine::parse(&line) {
      Some(StatusLine::Id3v1 {
        artist,
        album,
        year,
      }) => {
        assert_eq!(artist.chars().count(), 29);
        assert_eq!(artist.trim_end(), "Café Tacvba");
        assert_eq!(album.chars().count(), 29);
        assert_eq!(album.trim_end(), "Ünïcödé Ålbum");
        assert_eq!(year, "199");
      }
      other => panic!("Expected ID3v1 block, got {:?}", other),
    }
  }

  #[test]
  fn test_short_id3v1_is_dropped() {
    assert_eq!(StatusLine::parse("@I ID3:too short"), None);
  }

  #[test]
  fn test_volume() {
    assert_eq!(
      StatusLine::parse("@V 30.000000%"),
      Some(StatusLine::Volume(30.0))
    );
    assert_eq!(StatusLine::parse("@V"), None);
    assert_eq!(StatusLine::parse("@V loud%"), None);
  }

  #[test]
  fn test_version_banner() {
    assert_eq!(
      StatusLine::parse("@R MPG123 (ThOr) v10"),
      Some(StatusLine::Version("MPG123 (ThOr) v10".into()))
    );
  }

  #[test]
  fn test_unknown_lines() {
    assert_eq!(StatusLine::parse(""), None);
    assert_eq!(StatusLine::parse("@S 1.0 3 44100 Joint-Stereo"), None);
    assert_eq!(StatusLine::parse("@E No stream opened"), None);
    assert_eq!(StatusLine::parse("hello"), None);
  }
}
