//! Transcoder module
//!
//! This module runs the external ffmpeg process that produces the live
//! DASH output:
//! - Argument construction for a job (source, offset, audio tracks)
//! - Process launch with stderr forwarded to the log
//! - Graceful termination with forced kill after a grace period

pub mod command;
pub mod supervisor;

pub use command::TranscodeJob;
pub use supervisor::{ExitOutcome, ExitSignal, Supervisor, TranscoderHandle};
