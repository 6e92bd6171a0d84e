//! Best-effort raw μ-law capture to a temp file, converted to WAV and
//! the raw file deleted on success at call teardown. Never
//! aborts the call: every failure is logged and swallowed.

use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::warn;
use uuid::Uuid;

pub struct Recorder {
    raw_path: PathBuf,
    writer: Option<BufWriter<File>>,
    opened: bool,
}

impl Recorder {
    pub fn new(session_id: Uuid) -> Self {
        Self::new_in(std::env::temp_dir(), session_id)
    }

    /// As `new`, but rooted at an arbitrary directory - lets tests use an
    /// isolated `tempfile::TempDir` instead of the real system temp dir.
    pub fn new_in(dir: PathBuf, session_id: Uuid) -> Self {
        Self {
            raw_path: dir.join(format!("voicebridge-{session_id}.raw")),
            writer: None,
            opened: false,
        }
    }

    /// Append raw μ-law bytes, opening the backing file lazily on first
    /// use so a call that never sends `media` never touches disk.
    pub async fn push(&mut self, mulaw: &[u8]) {
        if !self.opened {
            self.opened = true;
            match File::create(&self.raw_path).await {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(e) => warn!("failed to open recording file: {e}"),
            }
        }
        let Some(writer) = &mut self.writer else {
            return;
        };
        if let Err(e) = writer.write_all(mulaw).await {
            warn!("failed to write recording chunk: {e}");
            self.writer = None;
        }
    }

    /// Flush the raw capture, convert it to a WAV file, and delete the
    /// raw file on success.
    pub async fn finish(mut self) {
        let Some(mut writer) = self.writer.take() else {
            return;
        };
        if let Err(e) = writer.flush().await {
            warn!("failed to flush recording: {e}");
            return;
        }
        drop(writer);

        let raw = match tokio::fs::read(&self.raw_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("failed to read back raw recording: {e}");
                return;
            }
        };

        let pcm16le = crate::audio::mulaw_decode(&raw);
        let wav = crate::audio::wrap_wav(&pcm16le, 8_000, 1, 16);
        let wav_path = self.raw_path.with_extension("wav");
        if let Err(e) = tokio::fs::write(&wav_path, &wav).await {
            warn!("failed to write recording wav: {e}");
            return;
        }
        if let Err(e) = tokio::fs::remove_file(&self.raw_path).await {
            warn!("failed to delete raw recording: {e}");
        }
    }
}
