//! Plain-text and SRT rendering of a finished session.
//!
//! Rendering is pure (session in, string out); file placement lives in
//! [`super::store`].

use super::{Segment, SegmentStatus, Session};

/// Which language column(s) an export carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportLanguage {
    Bilingual,
    Source,
    Target,
}

impl ExportLanguage {
    pub fn file_stem(self) -> &'static str {
        match self {
            ExportLanguage::Bilingual => "bilingual",
            ExportLanguage::Source => "source",
            ExportLanguage::Target => "target",
        }
    }
}

/// Renders a transcript as plain text, one segment per stanza.
pub fn render_text(session: &Session, language: ExportLanguage) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Session {}\n", session.session_id));
    out.push_str(&format!(
        "# {} -> {}, started {}\n",
        session.source_language,
        session.target_language,
        session.start_time.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push('\n');

    for segment in &session.segments {
        let stamp = format_clock(segment.start_ms);
        match language {
            ExportLanguage::Source => {
                out.push_str(&format!("[{stamp}] {}\n", segment.text));
            }
            ExportLanguage::Target => {
                out.push_str(&format!("[{stamp}] {}\n", target_line(segment)));
            }
            ExportLanguage::Bilingual => {
                out.push_str(&format!("[{stamp}] {}\n", segment.text));
                out.push_str(&format!("         {}\n", target_line(segment)));
                out.push('\n');
            }
        }
    }
    out
}

/// Renders the session as an SRT subtitle file.
pub fn render_srt(session: &Session, language: ExportLanguage) -> String {
    let mut out = String::new();
    for (index, segment) in session.segments.iter().enumerate() {
        out.push_str(&format!("{}\n", index + 1));
        out.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(segment.start_ms),
            format_srt_timestamp(segment.end_ms)
        ));
        match language {
            ExportLanguage::Source => {
                out.push_str(&segment.text);
                out.push('\n');
            }
            ExportLanguage::Target => {
                out.push_str(target_line(segment));
                out.push('\n');
            }
            ExportLanguage::Bilingual => {
                out.push_str(&segment.text);
                out.push('\n');
                out.push_str(target_line(segment));
                out.push('\n');
            }
        }
        out.push('\n');
    }
    out
}

/// Target-column text for a segment, honoring terminal status.
fn target_line(segment: &Segment) -> &str {
    match segment.status {
        SegmentStatus::Error => segment
            .translated_text
            .as_deref()
            .unwrap_or(crate::defaults::TRANSLATION_UNAVAILABLE),
        _ => segment.display_translation(),
    }
}

/// `HH:MM:SS` offset from session start.
fn format_clock(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60
    )
}

/// `HH:MM:SS,mmm` as required by SRT.
fn format_srt_timestamp(ms: u64) -> String {
    let total_secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        ms % 1000
    )
}
