//! Audio capture seam and level monitoring.

pub mod monitor;
pub mod source;

pub use monitor::{AudioLevelMonitor, calculate_rms};
pub use source::{AudioSource, FramePhase, MockAudioSource};
