//! Incremental media encoding
//!
//! Container/codec negotiation and the encoder that turns the composited
//! video and mixed audio into container bytes, one chunk per timeslice.

pub mod ffmpeg;
pub mod types;

pub use ffmpeg::{probe_ffmpeg_encoders, FfmpegEncoder};
pub use types::{
    negotiate_format, negotiated_format, resolve_format, CombinedStream, ContainerFormat, EncoderEvent, MediaEncoder,
    FALLBACK_FORMATS, PREFERRED_FORMATS,
};
