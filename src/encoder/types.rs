//! Encoder types and format negotiation

use crate::capture::AudioChunk;
use crate::compositor::CompositeFrame;
use crate::recorder::{RecordingError, RecordingResult};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::mpsc;

/// A container plus the codecs used inside it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerFormat {
    pub mime_type: &'static str,
    pub extension: &'static str,
    /// ffmpeg muxer name
    pub muxer: &'static str,
    /// ffmpeg video encoder name
    pub video_encoder: &'static str,
    /// ffmpeg audio encoder name
    pub audio_encoder: &'static str,
}

/// Preferred combined audio+video formats, best first
pub const PREFERRED_FORMATS: [ContainerFormat; 3] = [
    ContainerFormat {
        mime_type: "video/webm;codecs=vp9,opus",
        extension: "webm",
        muxer: "webm",
        video_encoder: "libvpx-vp9",
        audio_encoder: "libopus",
    },
    ContainerFormat {
        mime_type: "video/webm;codecs=vp8,opus",
        extension: "webm",
        muxer: "webm",
        video_encoder: "libvpx",
        audio_encoder: "libopus",
    },
    ContainerFormat {
        mime_type: "video/webm",
        extension: "webm",
        muxer: "webm",
        video_encoder: "libvpx",
        audio_encoder: "libvorbis",
    },
];

/// Tried only when none of [`PREFERRED_FORMATS`] is available
pub const FALLBACK_FORMATS: [ContainerFormat; 2] = [
    ContainerFormat {
        mime_type: "video/mp4;codecs=avc1,mp4a",
        extension: "mp4",
        muxer: "mp4",
        video_encoder: "libx264",
        audio_encoder: "aac",
    },
    ContainerFormat {
        mime_type: "video/mp4",
        extension: "mp4",
        muxer: "mp4",
        video_encoder: "mpeg4",
        audio_encoder: "aac",
    },
];

/// Pick the first supported format, preferred list before the fallback list
pub fn negotiate_format(is_supported: impl Fn(&ContainerFormat) -> bool) -> Option<ContainerFormat> {
    PREFERRED_FORMATS
        .iter()
        .chain(FALLBACK_FORMATS.iter())
        .find(|format| is_supported(format))
        .copied()
}

static NEGOTIATED: OnceLock<Option<ContainerFormat>> = OnceLock::new();

/// Process-wide format, negotiated against the local ffmpeg on first use
pub fn negotiated_format() -> Option<ContainerFormat> {
    *NEGOTIATED.get_or_init(|| {
        let encoders = match super::ffmpeg::probe_ffmpeg_encoders() {
            Ok(encoders) => encoders,
            Err(e) => {
                tracing::error!("Failed to probe ffmpeg encoders: {}", e);
                return None;
            }
        };
        let format = negotiate_format(|f| {
            encoders.contains(f.video_encoder) && encoders.contains(f.audio_encoder)
        });
        match &format {
            Some(f) => tracing::info!("Negotiated recording format: {}", f.mime_type),
            None => tracing::error!("No supported recording format found"),
        }
        format
    })
}

/// `preset` if given, otherwise the negotiated format. The first negotiation
/// runs ffmpeg, so it happens on the blocking pool.
pub async fn resolve_format(preset: Option<ContainerFormat>) -> RecordingResult<ContainerFormat> {
    if let Some(format) = preset {
        return Ok(format);
    }
    tokio::task::spawn_blocking(negotiated_format)
        .await
        .map_err(|e| RecordingError::Encoding(format!("format negotiation failed: {e}")))?
        .ok_or(RecordingError::UnsupportedFormat)
}

/// Output of a running encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// Encoded bytes for one timeslice, in emission order
    Chunk(Vec<u8>),
    /// Encoding failed; the session may still stop cleanly
    Error(String),
    /// Encoder finished; no further events follow
    Stopped,
}

/// Video and audio inputs of one encoding session
#[derive(Debug)]
pub struct CombinedStream {
    pub video: mpsc::Receiver<CompositeFrame>,
    pub audio: mpsc::Receiver<AudioChunk>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Incremental encoder.
///
/// After `start`, the returned channel yields a chunk every `timeslice`.
/// `stop` asks the encoder to flush; the remaining chunks are delivered and
/// the channel ends with [`EncoderEvent::Stopped`].
#[async_trait]
pub trait MediaEncoder: Send + Sync {
    async fn start(
        &mut self,
        stream: CombinedStream,
        format: ContainerFormat,
        timeslice: Duration,
    ) -> RecordingResult<mpsc::Receiver<EncoderEvent>>;

    async fn stop(&mut self) -> RecordingResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_first_supported() {
        let format = negotiate_format(|_| true).unwrap();
        assert_eq!(format, PREFERRED_FORMATS[0]);

        let format = negotiate_format(|f| f.video_encoder == "libvpx").unwrap();
        assert_eq!(format.mime_type, "video/webm;codecs=vp8,opus");
    }

    #[test]
    fn test_falls_back_to_second_list() {
        let format = negotiate_format(|f| f.extension == "mp4").unwrap();
        assert_eq!(format, FALLBACK_FORMATS[0]);
    }

    #[test]
    fn test_nothing_supported() {
        assert_eq!(negotiate_format(|_| false), None);
    }

    #[tokio::test]
    async fn test_preset_skips_negotiation() {
        let format = resolve_format(Some(FALLBACK_FORMATS[1])).await.unwrap();
        assert_eq!(format, FALLBACK_FORMATS[1]);
    }

    #[tokio::test]
    async fn test_negotiation_from_async_context() {
        let resolved = resolve_format(None).await;
        match negotiated_format() {
            Some(format) => assert_eq!(resolved.unwrap(), format),
            None => assert!(matches!(resolved, Err(RecordingError::UnsupportedFormat))),
        }
    }
}
