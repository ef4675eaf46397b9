//! On-disk session persistence.
//!
//! Layout under `sessions_dir`:
//!
//! ```text
//! session-index.json
//! <session_id>/
//!   session.json
//!   recording.wav            (optional)
//!   transcript.bilingual.txt
//!   transcript.source.txt
//!   transcript.target.txt
//!   subtitles.bilingual.srt
//!   subtitles.source.srt
//!   subtitles.target.srt
//! ```

use super::export::{render_srt, render_text, ExportLanguage};
use super::Session;
use crate::defaults;
use crate::error::{Result, TransliveError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for persisted sessions. Empty means the platform
    /// data dir (`<data_dir>/translive/sessions`).
    pub sessions_dir: String,
    /// Cap on `session-index.json` entries, most recent kept.
    pub index_max: usize,
    /// Whether to write `recording.wav` alongside the transcript.
    pub write_recording: bool,
    pub sample_rate: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sessions_dir: String::new(),
            index_max: defaults::SESSION_INDEX_MAX,
            write_recording: false,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }
}

impl StoreConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        if self.sessions_dir.is_empty() {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("translive")
                .join("sessions")
        } else {
            PathBuf::from(&self.sessions_dir)
        }
    }
}

/// One line of `session-index.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub source_language: String,
    pub target_language: String,
    pub segment_count: u64,
    pub error_count: u64,
}

impl SessionSummary {
    fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.session_id,
            start_time: session.start_time,
            end_time: session.end_time,
            source_language: session.source_language.clone(),
            target_language: session.target_language.clone(),
            segment_count: session.stats.segment_count,
            error_count: session.stats.error_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionSort {
    #[default]
    NewestFirst,
    OldestFirst,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub sort: SessionSort,
    pub offset: usize,
    pub limit: Option<usize>,
}

pub struct SessionStore {
    root: PathBuf,
    index_max: usize,
    write_recording: bool,
    sample_rate: u32,
}

impl SessionStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            root: config.resolved_dir(),
            index_max: config.index_max,
            write_recording: config.write_recording,
            sample_rate: config.sample_rate,
        }
    }

    /// Store rooted at an explicit directory, used by tests.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index_max: defaults::SESSION_INDEX_MAX,
            write_recording: false,
            sample_rate: defaults::SAMPLE_RATE,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, id: Uuid) -> PathBuf {
        self.root.join(id.to_string())
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("session-index.json")
    }

    /// Persists a finalized session: `session.json`, the optional recording,
    /// all six exports and the index entry.
    ///
    /// `session.json` and the index must succeed; each export write is
    /// independent and a failure only logs a warning.
    pub fn save_session(&self, session: &Session, recording: Option<&[i16]>) -> Result<PathBuf> {
        let dir = self.session_dir(session.session_id);
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(session)?;
        fs::write(dir.join("session.json"), json)?;

        if self.write_recording
            && let Some(samples) = recording
            && let Err(err) = self.write_wav(&dir.join("recording.wav"), samples)
        {
            tracing::warn!(session_id = %session.session_id, error = %err, "failed to write recording.wav");
        }

        for language in [
            ExportLanguage::Bilingual,
            ExportLanguage::Source,
            ExportLanguage::Target,
        ] {
            let stem = language.file_stem();
            let text_path = dir.join(format!("transcript.{stem}.txt"));
            if let Err(err) = fs::write(&text_path, render_text(session, language)) {
                tracing::warn!(path = %text_path.display(), error = %err, "export write failed");
            }
            let srt_path = dir.join(format!("subtitles.{stem}.srt"));
            if let Err(err) = fs::write(&srt_path, render_srt(session, language)) {
                tracing::warn!(path = %srt_path.display(), error = %err, "export write failed");
            }
        }

        self.update_index(SessionSummary::from_session(session))?;
        tracing::info!(session_id = %session.session_id, path = %dir.display(), "session persisted");
        Ok(dir)
    }

    fn write_wav(&self, path: &Path, samples: &[i16]) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)
            .map_err(|e| TransliveError::SessionPersist { message: e.to_string() })?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| TransliveError::SessionPersist { message: e.to_string() })?;
        }
        writer
            .finalize()
            .map_err(|e| TransliveError::SessionPersist { message: e.to_string() })?;
        Ok(())
    }

    pub fn load_session(&self, id: Uuid) -> Result<Session> {
        let path = self.session_dir(id).join("session.json");
        if !path.exists() {
            return Err(TransliveError::SessionNotFound { id: id.to_string() });
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn list_sessions(&self, options: &ListOptions) -> Result<Vec<SessionSummary>> {
        let mut entries = self.read_index()?;
        match options.sort {
            SessionSort::NewestFirst => entries.sort_by(|a, b| b.start_time.cmp(&a.start_time)),
            SessionSort::OldestFirst => entries.sort_by(|a, b| a.start_time.cmp(&b.start_time)),
        }
        let iter = entries.into_iter().skip(options.offset);
        Ok(match options.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        })
    }

    /// Removes the session directory and its index entry.
    pub fn delete_session(&self, id: Uuid) -> Result<()> {
        let dir = self.session_dir(id);
        if !dir.exists() {
            return Err(TransliveError::SessionNotFound { id: id.to_string() });
        }
        fs::remove_dir_all(&dir)?;
        let mut entries = self.read_index()?;
        entries.retain(|e| e.session_id != id);
        self.write_index(&entries)?;
        Ok(())
    }

    /// Deletes sessions older than `max_age` and, of the remainder, everything
    /// beyond the `max_count` most recent. Returns how many were removed.
    pub fn cleanup_old_sessions(
        &self,
        max_age: Option<chrono::Duration>,
        max_count: Option<usize>,
    ) -> Result<usize> {
        let mut entries = self.read_index()?;
        entries.sort_by(|a, b| b.start_time.cmp(&a.start_time));

        let now = Utc::now();
        let mut doomed: Vec<Uuid> = Vec::new();
        if let Some(age) = max_age {
            let cutoff = now - age;
            doomed.extend(
                entries
                    .iter()
                    .filter(|e| e.start_time < cutoff)
                    .map(|e| e.session_id),
            );
        }
        if let Some(count) = max_count {
            doomed.extend(entries.iter().skip(count).map(|e| e.session_id));
        }
        doomed.sort();
        doomed.dedup();

        for id in &doomed {
            let dir = self.session_dir(*id);
            if dir.exists()
                && let Err(err) = fs::remove_dir_all(&dir)
            {
                tracing::warn!(session_id = %id, error = %err, "cleanup failed to remove session dir");
            }
        }
        entries.retain(|e| !doomed.contains(&e.session_id));
        self.write_index(&entries)?;
        Ok(doomed.len())
    }

    fn update_index(&self, summary: SessionSummary) -> Result<()> {
        let mut entries = self.read_index()?;
        entries.retain(|e| e.session_id != summary.session_id);
        entries.push(summary);
        entries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        entries.truncate(self.index_max);
        self.write_index(&entries)
    }

    fn read_index(&self) -> Result<Vec<SessionSummary>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let json = fs::read_to_string(&path)?;
        match serde_json::from_str(&json) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                // A corrupt index is rebuilt from scratch rather than
                // blocking every save.
                tracing::warn!(error = %err, "session index unreadable, starting fresh");
                Ok(Vec::new())
            }
        }
    }

    fn write_index(&self, entries: &[SessionSummary]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let json = serde_json::to_string_pretty(entries)?;
        fs::write(self.index_path(), json)?;
        Ok(())
    }
}
