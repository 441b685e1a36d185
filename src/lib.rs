//! ball-stream - synthetic bouncing-ball video over WebRTC
//!
//! This crate renders a white ball bouncing on a black background, encodes the frames
//! as H.264 and streams them to browsers over WebRTC, while exposing the
//! ball's ground-truth position over HTTP.

pub mod config;
pub mod error;
pub mod state;
pub mod video;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
