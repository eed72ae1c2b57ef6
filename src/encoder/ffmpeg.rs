//! FFmpeg-backed incremental encoder
//!
//! Raw RGBA frames go to ffmpeg's stdin, f32le audio goes over a loopback
//! TCP connection that ffmpeg opens as its second input, and the container
//! bytes ffmpeg writes to stdout are cut into one chunk per timeslice.

use super::types::{CombinedStream, ContainerFormat, EncoderEvent, MediaEncoder};
use crate::recorder::{RecordingError, RecordingResult};
use async_trait::async_trait;
use std::collections::HashSet;
use std::io;
use std::process::{Command as StdCommand, Stdio};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};

const AUDIO_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_BUFFER: usize = 64 * 1024;

/// Parse the listing printed by `ffmpeg -encoders`
fn parse_encoders(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .skip_while(|line| !line.trim_start().starts_with("------"))
        .skip(1)
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            (flags.len() == 6).then(|| name.to_string())
        })
        .collect()
}

/// Names of the encoders the local ffmpeg supports
pub fn probe_ffmpeg_encoders() -> io::Result<HashSet<String>> {
    let output = StdCommand::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .stdin(Stdio::null())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(io::Error::new(
            io::ErrorKind::Other,
            format!("ffmpeg -encoders failed: {}", stderr.trim()),
        ));
    }

    Ok(parse_encoders(&String::from_utf8_lossy(&output.stdout)))
}

fn video_codec_args(encoder: &str) -> Vec<String> {
    let args: &[&str] = match encoder {
        "libvpx-vp9" => &["-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1", "-b:v", "2M"],
        "libvpx" => &["-deadline", "realtime", "-cpu-used", "8", "-b:v", "2M"],
        "libx264" => &["-preset", "veryfast", "-tune", "zerolatency", "-crf", "23"],
        _ => &["-q:v", "5"],
    };
    args.iter().map(|s| s.to_string()).collect()
}

/// Command line for one encoding session
fn build_args(stream: &StreamShape, format: &ContainerFormat, audio_port: u16) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgba",
        "-s",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(format!("{}x{}", stream.width, stream.height));
    args.extend(["-r".to_string(), stream.fps.to_string()]);
    args.extend(["-i".to_string(), "pipe:0".to_string()]);

    args.extend(["-f", "f32le", "-ar"].iter().map(|s| s.to_string()));
    args.push(stream.sample_rate.to_string());
    args.extend(["-ac".to_string(), stream.channels.to_string()]);
    args.extend(["-i".to_string(), format!("tcp://127.0.0.1:{}", audio_port)]);

    args.extend(["-c:v".to_string(), format.video_encoder.to_string()]);
    args.extend(video_codec_args(format.video_encoder));
    args.extend(["-pix_fmt", "yuv420p"].iter().map(|s| s.to_string()));
    args.extend(["-c:a".to_string(), format.audio_encoder.to_string()]);

    if format.muxer == "mp4" {
        // stdout is not seekable
        args.extend(["-movflags", "frag_keyframe+empty_moov+default_base_moof"].iter().map(|s| s.to_string()));
    }
    args.extend(["-f".to_string(), format.muxer.to_string(), "pipe:1".to_string()]);
    args
}

#[derive(Debug, Clone, Copy)]
struct StreamShape {
    width: u32,
    height: u32,
    fps: u32,
    sample_rate: u32,
    channels: u16,
}

/// Encoder that drives an `ffmpeg` child process
pub struct FfmpegEncoder {
    binary: String,
    stop_tx: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
}

impl FfmpegEncoder {
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            stop_tx: None,
            tasks: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.stop_tx.is_some()
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Copy composited frames to ffmpeg until stop is requested
async fn feed_video(
    mut frames: mpsc::Receiver<crate::compositor::CompositeFrame>,
    mut stdin: tokio::process::ChildStdin,
    mut stop: watch::Receiver<bool>,
) {
    let mut written: u64 = 0;
    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = stdin.write_all(&frame.data).await {
                    tracing::warn!("FFmpeg video input closed after {} frames: {}", written, e);
                    break;
                }
                written += 1;
            }
            _ = stop.changed() => break,
        }
    }
    let _ = stdin.shutdown().await;
    tracing::debug!("Video feed finished ({} frames)", written);
}

/// Accept ffmpeg's audio connection and stream mixed PCM into it
async fn feed_audio(
    listener: TcpListener,
    mut chunks: mpsc::Receiver<crate::capture::AudioChunk>,
    mut stop: watch::Receiver<bool>,
) {
    let accepted = tokio::select! {
        accepted = timeout(AUDIO_CONNECT_TIMEOUT, listener.accept()) => accepted,
        _ = stop.changed() => return,
    };
    let mut socket = match accepted {
        Ok(Ok((socket, _))) => socket,
        Ok(Err(e)) => {
            tracing::error!("Failed to accept ffmpeg audio connection: {}", e);
            return;
        }
        Err(_) => {
            tracing::error!("FFmpeg did not open the audio input in time");
            return;
        }
    };

    loop {
        tokio::select! {
            chunk = chunks.recv() => {
                let Some(chunk) = chunk else { break };
                let bytes: Vec<u8> = chunk.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                if let Err(e) = socket.write_all(&bytes).await {
                    tracing::warn!("FFmpeg audio input closed: {}", e);
                    break;
                }
            }
            _ = stop.changed() => break,
        }
    }
    let _ = socket.shutdown().await;
}

/// Cut stdout into timeslice chunks, then report how ffmpeg exited
async fn collect_output(
    mut child: Child,
    mut stdout: tokio::process::ChildStdout,
    timeslice: Duration,
    events: mpsc::Sender<EncoderEvent>,
) {
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = vec![0u8; READ_BUFFER];
    let mut slicer = interval(timeslice);
    slicer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    slicer.tick().await;

    loop {
        tokio::select! {
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => pending.extend_from_slice(&buf[..n]),
                Err(e) => {
                    let _ = events.send(EncoderEvent::Error(format!("Failed to read encoder output: {}", e))).await;
                    break;
                }
            },
            _ = slicer.tick() => {
                if !pending.is_empty() {
                    let _ = events.send(EncoderEvent::Chunk(std::mem::take(&mut pending))).await;
                }
            }
        }
    }

    if !pending.is_empty() {
        let _ = events.send(EncoderEvent::Chunk(pending)).await;
    }

    match child.wait().await {
        Ok(status) if status.success() => tracing::info!("FFmpeg encoder exited cleanly"),
        Ok(status) => {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr).await;
            }
            tracing::error!("FFmpeg encoder exited with {}: {}", status, stderr.trim());
            let _ = events
                .send(EncoderEvent::Error(format!("ffmpeg exited with {}", status)))
                .await;
        }
        Err(e) => tracing::error!("Failed to wait for ffmpeg: {}", e),
    }

    let _ = events.send(EncoderEvent::Stopped).await;
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn start(
        &mut self,
        stream: CombinedStream,
        format: ContainerFormat,
        timeslice: Duration,
    ) -> RecordingResult<mpsc::Receiver<EncoderEvent>> {
        if self.stop_tx.is_some() {
            return Err(RecordingError::AlreadyRecording);
        }

        let shape = StreamShape {
            width: stream.width,
            height: stream.height,
            fps: stream.fps,
            sample_rate: stream.sample_rate,
            channels: stream.channels,
        };

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let audio_port = listener.local_addr()?.port();
        let args = build_args(&shape, &format, audio_port);

        tracing::info!(
            "Starting ffmpeg encoder: {}x{} @ {}fps, {} ({})",
            shape.width,
            shape.height,
            shape.fps,
            format.mime_type,
            format.muxer
        );

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RecordingError::Encoding(format!("Failed to start FFmpeg: {}", e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecordingError::Encoding("Failed to capture FFmpeg stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecordingError::Encoding("Failed to capture FFmpeg stdout".to_string()))?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(64);

        self.tasks = vec![
            tokio::spawn(feed_video(stream.video, stdin, stop_rx.clone())),
            tokio::spawn(feed_audio(listener, stream.audio, stop_rx)),
            tokio::spawn(collect_output(child, stdout, timeslice, events_tx)),
        ];
        self.stop_tx = Some(stop_tx);

        Ok(events_rx)
    }

    async fn stop(&mut self) -> RecordingResult<()> {
        let Some(stop_tx) = self.stop_tx.take() else {
            return Err(RecordingError::NotRecording);
        };
        tracing::info!("Stopping ffmpeg encoder");
        let _ = stop_tx.send(true);
        // Inputs close; the output task reports Stopped once ffmpeg exits
        self.tasks.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::types::{FALLBACK_FORMATS, PREFERRED_FORMATS};

    const LISTING: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC (codec h264)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D aac                  AAC (Advanced Audio Coding)
 A....D libopus              libopus Opus (codec opus)
";

    fn shape() -> StreamShape {
        StreamShape {
            width: 1280,
            height: 720,
            fps: 30,
            sample_rate: 48000,
            channels: 2,
        }
    }

    #[test]
    fn test_parse_encoders() {
        let encoders = parse_encoders(LISTING);
        assert_eq!(encoders.len(), 4);
        assert!(encoders.contains("libvpx-vp9"));
        assert!(encoders.contains("libopus"));
        assert!(!encoders.contains("Video"));
    }

    #[test]
    fn test_args_for_webm() {
        let args = build_args(&shape(), &PREFERRED_FORMATS[0], 5555);
        let joined = args.join(" ");
        assert!(joined.contains("-s 1280x720 -r 30 -i pipe:0"));
        assert!(joined.contains("-f f32le -ar 48000 -ac 2 -i tcp://127.0.0.1:5555"));
        assert!(joined.contains("-c:v libvpx-vp9"));
        assert!(joined.ends_with("-f webm pipe:1"));
        assert!(!joined.contains("movflags"));
    }

    #[test]
    fn test_args_for_fragmented_mp4() {
        let args = build_args(&shape(), &FALLBACK_FORMATS[0], 5555);
        let joined = args.join(" ");
        assert!(joined.contains("-movflags frag_keyframe+empty_moov"));
        assert!(joined.ends_with("-f mp4 pipe:1"));
    }

    #[tokio::test]
    async fn test_stop_before_start() {
        let mut encoder = FfmpegEncoder::new();
        assert!(matches!(encoder.stop().await, Err(RecordingError::NotRecording)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_encoding_error() {
        let (_vtx, video) = mpsc::channel(1);
        let (_atx, audio) = mpsc::channel(1);
        let stream = CombinedStream {
            video,
            audio,
            width: 16,
            height: 16,
            fps: 10,
            sample_rate: 8000,
            channels: 1,
        };
        let mut encoder = FfmpegEncoder::with_binary("/nonexistent/ffmpeg-binary");
        let result = encoder
            .start(stream, PREFERRED_FORMATS[0], Duration::from_millis(100))
            .await;
        assert!(matches!(result, Err(RecordingError::Encoding(_))));
        assert!(!encoder.is_running());
    }
}
