//! Playback session lifecycle
//!
//! One session exists at a time. [`SessionController`] owns it: Start
//! replaces it, Seek restarts its transcoder at a new offset and Status
//! reports on it.

pub mod controller;

pub use controller::{SessionController, SessionStatus, StartedSession};
