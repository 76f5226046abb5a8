/// Output device enumeration
pub mod device;
/// Monitor + mic dual playback
pub mod player;
/// Per-device playback sessions
pub mod session;

pub use player::{DualPlayer, PlayError, Route};
pub use session::{AudioError, PlaybackSession, PlaybackState, RodioFactory, SessionFactory};
