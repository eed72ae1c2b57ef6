//! Latest decoded frame per slot key

use crate::capture::VideoFrame;
use std::collections::HashMap;

/// Owns at most one frame per key. Replacing a frame closes the old one
/// before the new one is stored.
#[derive(Debug, Default)]
pub struct FrameCache {
    frames: HashMap<String, VideoFrame>,
}

impl FrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, key: &str, frame: VideoFrame) {
        if let Some(previous) = self.frames.remove(key) {
            previous.close();
        }
        self.frames.insert(key.to_string(), frame);
    }

    pub fn get(&self, key: &str) -> Option<&VideoFrame> {
        self.frames.get(key)
    }

    /// Close and drop the frame for `key`
    pub fn release(&mut self, key: &str) -> bool {
        match self.frames.remove(key) {
            Some(frame) => {
                frame.close();
                true
            }
            None => false,
        }
    }

    /// Close frames whose key is not in `keep`
    pub fn retain_keys<'a>(&mut self, keep: impl IntoIterator<Item = &'a str>) {
        let keep: std::collections::HashSet<&str> = keep.into_iter().collect();
        let stale: Vec<String> = self
            .frames
            .keys()
            .filter(|k| !keep.contains(k.as_str()))
            .cloned()
            .collect();
        for key in stale {
            self.release(&key);
        }
    }

    pub fn release_all(&mut self) {
        for (_, frame) in self.frames.drain() {
            frame.close();
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Drop for FrameCache {
    fn drop(&mut self) {
        self.release_all();
    }
}
