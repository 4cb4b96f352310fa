//! Local-stream recording: an append-only chunk buffer with an explicit
//! state machine and a timestamped file save.
//!
//! The capture pipeline feeds encoded chunks through [`Recorder::push_chunk`];
//! chunks arriving outside an active recording are dropped. The buffer is
//! independent of the peer connection and survives `stop` so the user can
//! save after the call ends.

use crate::error::CallError;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderState {
    Idle,
    Recording,
    Stopped,
}

pub struct Recorder {
    state: Mutex<RecorderState>,
    chunks: Mutex<Vec<Bytes>>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RecorderState::Idle),
            chunks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock().unwrap()
    }

    pub fn is_recording(&self) -> bool {
        self.state() == RecorderState::Recording
    }

    /// Begin capturing. A restart after `stop` clears the previous buffer.
    /// Starting while already recording is a no-op.
    pub fn start(&self) {
        let mut state = self.state.lock().unwrap();
        match *state {
            RecorderState::Recording => {}
            RecorderState::Idle | RecorderState::Stopped => {
                self.chunks.lock().unwrap().clear();
                *state = RecorderState::Recording;
            }
        }
    }

    /// Append one encoded chunk. Ignored unless a recording is active.
    pub fn push_chunk(&self, chunk: Bytes) {
        if chunk.is_empty() {
            return;
        }
        // state read and append under separate locks is fine: a chunk racing
        // a stop() is either kept or dropped, both acceptable for advisory
        // recording
        if self.is_recording() {
            self.chunks.lock().unwrap().push(chunk);
        }
    }

    /// Finalize the active recording. No-op when not recording.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if *state == RecorderState::Recording {
            *state = RecorderState::Stopped;
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.lock().unwrap().len()
    }

    /// Concatenate everything recorded into `dir/recording_<millis>.webm`.
    /// Returns `None` without touching the filesystem when nothing was
    /// recorded.
    pub fn save_to(&self, dir: &Path) -> Result<Option<PathBuf>, CallError> {
        let chunks = self.chunks.lock().unwrap();
        if chunks.is_empty() {
            return Ok(None);
        }
        let filename = format!("recording_{}.webm", chrono::Utc::now().timestamp_millis());
        let path = dir.join(filename);

        let mut blob = Vec::with_capacity(chunks.iter().map(|c| c.len()).sum());
        for chunk in chunks.iter() {
            blob.extend_from_slice(chunk);
        }
        std::fs::write(&path, &blob)?;
        tracing::info!(target: "call", path = %path.display(), bytes = blob.len(), "recording saved");
        Ok(Some(path))
    }
}
