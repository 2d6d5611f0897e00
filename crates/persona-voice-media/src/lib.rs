//! Media pipeline — speech-to-text and audio transcoding.

pub mod stt;
pub mod transcode;

pub use stt::{TranscriptionError, Transcriber};
pub use transcode::{TranscodeError, Transcoder};
