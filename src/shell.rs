use std::io::BufRead;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::debug;

use crate::audio::Route;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show the clip list
    List,
    /// Filter the list (empty clears)
    Search(String),
    /// Select a clip by its list index
    Select(usize),
    /// Play a named clip, or toggle the selection
    Play(Option<String>),
    /// Pause both outputs
    Pause,
    /// Stop both outputs
    Stop,
    /// Jump both outputs to a position
    Seek(Duration),
    /// Show what is playing and where
    Status,
    /// Set a route's volume (percent)
    Volume(Route, u8),
    /// List output devices
    Devices,
    /// Bind a route to a device
    Device(Route, String),
    /// Change the clip folder
    Dir(PathBuf),
    /// Rescan the clip folder
    Reload,
    /// Start capturing a key combination for a clip
    Bind(String),
    /// Remove a clip's binding
    Unbind(String),
    /// Show usage
    Help,
    /// Exit
    Quit,
}

/// Input that is not a command
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Blank line
    #[error("empty input")]
    Empty,

    /// Unknown verb
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),

    /// Known verb, bad arguments
    #[error("usage: {0}")]
    Usage(&'static str),
}

/// Usage text for `help`
pub const HELP: &str = "\
commands:
  list                          show clips
  search <text>                 filter clips (no text clears)
  select <n>                    select clip n
  play [name]                   play a clip, or play/pause the selection
  pause | stop                  control both outputs
  seek <mm:ss|secs>             seek both outputs
  status                        now playing and position
  volume monitor|mic <0-100>    set a volume
  devices                       list output devices
  device monitor|mic <name>     choose an output device
  dir <path>                    choose the clip folder
  reload                        rescan the clip folder
  bind <clip>                   capture a key combination (max 2 keys);
                                Enter saves it, Esc cancels
  unbind <clip>                 remove a clip's key combination
  help | quit

backspace stops playback from anywhere";

/// Parse one input line
///
/// # Errors
/// Returns error for blank, unknown or malformed input
pub fn parse(line: &str) -> Result<Command, ParseError> {
    // an Esc pressed to cancel a capture can leave ^[ in the line buffer
    let line = line.trim_matches(|c: char| c.is_whitespace() || c.is_control());
    let (verb, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(v, r)| (v, r.trim()));

    match verb.to_lowercase().as_str() {
        "" => Err(ParseError::Empty),
        "list" | "ls" => Ok(Command::List),
        "search" | "find" => Ok(Command::Search(rest.to_owned())),
        "select" | "sel" => rest
            .parse()
            .map(Command::Select)
            .map_err(|_| ParseError::Usage("select <n>")),
        "play" | "p" => Ok(Command::Play(non_empty(rest))),
        "pause" => Ok(Command::Pause),
        "stop" => Ok(Command::Stop),
        "seek" => parse_time(rest)
            .map(Command::Seek)
            .ok_or(ParseError::Usage("seek <mm:ss|secs>")),
        "status" => Ok(Command::Status),
        "volume" | "vol" => {
            const USAGE: &str = "volume monitor|mic <0-100>";
            let (route, value) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::Usage(USAGE))?;
            let route = parse_route(route).ok_or(ParseError::Usage(USAGE))?;
            let value: u8 = value
                .trim()
                .parse()
                .ok()
                .filter(|v| *v <= 100)
                .ok_or(ParseError::Usage(USAGE))?;
            Ok(Command::Volume(route, value))
        }
        "devices" => Ok(Command::Devices),
        "device" => {
            const USAGE: &str = "device monitor|mic <name>";
            let (route, name) = rest
                .split_once(char::is_whitespace)
                .ok_or(ParseError::Usage(USAGE))?;
            let route = parse_route(route).ok_or(ParseError::Usage(USAGE))?;
            Ok(Command::Device(route, name.trim().to_owned()))
        }
        "dir" | "folder" => non_empty(rest)
            .map(|p| Command::Dir(PathBuf::from(p)))
            .ok_or(ParseError::Usage("dir <path>")),
        "reload" => Ok(Command::Reload),
        "bind" => non_empty(rest)
            .map(Command::Bind)
            .ok_or(ParseError::Usage("bind <clip>")),
        "unbind" => non_empty(rest)
            .map(Command::Unbind)
            .ok_or(ParseError::Usage("unbind <clip>")),
        "help" | "?" => Ok(Command::Help),
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_owned())),
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_owned())
}

fn parse_route(s: &str) -> Option<Route> {
    match s.to_lowercase().as_str() {
        "monitor" | "output" | "out" => Some(Route::Monitor),
        "mic" | "input" | "in" => Some(Route::Mic),
        _ => None,
    }
}

/// Parse `mm:ss` or plain seconds
#[must_use]
pub fn parse_time(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some((minutes, seconds)) = s.split_once(':') {
        let minutes: u64 = minutes.parse().ok()?;
        let seconds: u64 = seconds.parse().ok()?;
        if seconds >= 60 {
            return None;
        }
        return Some(Duration::from_secs(minutes * 60 + seconds));
    }
    s.parse::<u64>().ok().map(Duration::from_secs)
}

/// `mm:ss`; hours wrap into minutes modulo 60
#[must_use]
pub fn format_time(d: Duration) -> String {
    let secs = d.as_secs();
    format!("{:02}:{:02}", (secs / 60) % 60, secs % 60)
}

/// Read stdin lines on a background thread
#[must_use]
pub fn spawn_stdin_reader() -> UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("stdin closed: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_verbs() {
        assert_eq!(parse("list"), Ok(Command::List));
        assert_eq!(parse("  STOP  "), Ok(Command::Stop));
        assert_eq!(parse("q"), Ok(Command::Quit));
    }

    #[test]
    fn test_control_characters_stripped() {
        assert_eq!(parse("\u{1b}list"), Ok(Command::List));
        assert_eq!(parse("\u{1b}\u{1b}"), Err(ParseError::Empty));
    }

    #[test]
    fn test_empty_and_unknown() {
        assert_eq!(parse("   "), Err(ParseError::Empty));
        assert_eq!(parse("dance now"), Err(ParseError::Unknown("dance".to_owned())));
    }

    #[test]
    fn test_play_with_and_without_name() {
        assert_eq!(parse("play"), Ok(Command::Play(None)));
        assert_eq!(
            parse("play air horn"),
            Ok(Command::Play(Some("air horn".to_owned())))
        );
    }

    #[test]
    fn test_search_keeps_text() {
        assert_eq!(parse("search Horn"), Ok(Command::Search("Horn".to_owned())));
        assert_eq!(parse("search"), Ok(Command::Search(String::new())));
    }

    #[test]
    fn test_select_requires_index() {
        assert_eq!(parse("select 3"), Ok(Command::Select(3)));
        assert_eq!(parse("select x"), Err(ParseError::Usage("select <n>")));
    }

    #[test]
    fn test_volume() {
        assert_eq!(parse("volume mic 75"), Ok(Command::Volume(Route::Mic, 75)));
        assert_eq!(parse("vol output 0"), Ok(Command::Volume(Route::Monitor, 0)));
        assert!(parse("volume mic 101").is_err());
        assert!(parse("volume speakers 10").is_err());
        assert!(parse("volume").is_err());
    }

    #[test]
    fn test_device_name_may_contain_spaces() {
        assert_eq!(
            parse("device mic CABLE Input (VB-Audio Virtual Cable)"),
            Ok(Command::Device(
                Route::Mic,
                "CABLE Input (VB-Audio Virtual Cable)".to_owned()
            ))
        );
    }

    #[test]
    fn test_seek_formats() {
        assert_eq!(parse("seek 1:30"), Ok(Command::Seek(Duration::from_secs(90))));
        assert_eq!(parse("seek 45"), Ok(Command::Seek(Duration::from_secs(45))));
        assert!(parse("seek 1:75").is_err());
        assert!(parse("seek").is_err());
    }

    #[test]
    fn test_bind_and_dir_require_argument() {
        assert_eq!(parse("bind clap"), Ok(Command::Bind("clap".to_owned())));
        assert_eq!(parse("bind"), Err(ParseError::Usage("bind <clip>")));
        assert_eq!(parse("unbind air horn"), Ok(Command::Unbind("air horn".to_owned())));
        assert_eq!(parse("unbind"), Err(ParseError::Usage("unbind <clip>")));
        assert_eq!(parse("dir /music"), Ok(Command::Dir(PathBuf::from("/music"))));
        assert!(parse("dir").is_err());
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(Duration::from_millis(0)), "00:00");
        assert_eq!(format_time(Duration::from_millis(61_500)), "01:01");
        // hours are not shown
        assert_eq!(format_time(Duration::from_secs(3_600 + 125)), "02:05");
    }
}
