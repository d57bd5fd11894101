//! Encoding collaborators and the session that owns them.
//!
//! [`session::EncodeSession`] drives one [`codec::Encoder`] and one [`codec::Muxer`] in-thread;
//! [`worker::EncodeWorker`] runs the same session on its own thread behind a message protocol.

/// Encoder/muxer traits, configs, and chunk types.
pub mod codec;
/// `ffmpeg`-based encoder and MP4 muxer.
pub mod ffmpeg;
/// Deterministic in-memory encoder and muxer.
pub mod memory;
/// Single-threaded encode session.
pub mod session;
/// Threaded encode session.
pub mod worker;
