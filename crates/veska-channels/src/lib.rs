pub mod ambient;
pub mod cycle;
pub mod hotkey;
pub mod voice;

pub use ambient::AmbientMonitor;
pub use cycle::DailyCycleManager;
pub use hotkey::{default_hotkeys, HotkeyManager};
pub use voice::{StdinClarifier, VoiceClarifier, VoiceFrontend};
