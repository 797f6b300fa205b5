//! Integration tests
//!
//! Drive the session controller and the router end to end, with shell
//! scripts standing in for ffmpeg.

pub mod fixtures;

#[cfg(unix)]
mod scenarios;
