//! Audio mixing
//!
//! Sums every live audio track into one PCM stream for the encoder.

pub mod mixer;

pub use mixer::{mix_frames, AudioMixer};
