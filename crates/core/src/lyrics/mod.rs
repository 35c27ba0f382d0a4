//! LRC lyrics parsing and bar mapping.
//!
//! Every input line becomes a [`LineOutcome`]: either a parsed
//! [`LyricLine`] or a skip with its reason. Only parsed lines reach the
//! [`BarMapping`].

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{BarMapping, BarTiming, MixerError, Result};

/// One timed lyric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyricLine {
    pub timestamp_seconds: f64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Blank,
    MissingTimestamp,
    EmptyText,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::Blank => "blank line",
            SkipReason::MissingTimestamp => "no leading [mm:ss] tag",
            SkipReason::EmptyText => "no text after timestamp",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    Parsed(LyricLine),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedLine {
    /// 1-based line number in the source file.
    pub line_number: usize,
    pub reason: SkipReason,
}

/// Result of mapping a lyrics document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LyricsReport {
    pub mapping: BarMapping,
    pub skipped: Vec<SkippedLine>,
}

impl LyricsReport {
    pub fn count(&self) -> usize {
        self.mapping.len()
    }
}

/// Classifies a single raw line. Only the leading `[minutes:seconds]` tag is
/// consumed; anything after it, further tags included, is lyric text.
pub fn parse_line(raw: &str) -> LineOutcome {
    let line = raw.trim();
    if line.is_empty() {
        return LineOutcome::Skipped(SkipReason::Blank);
    }

    let Some((timestamp_seconds, rest)) = split_timestamp(line) else {
        return LineOutcome::Skipped(SkipReason::MissingTimestamp);
    };

    let text = rest.trim();
    if text.is_empty() {
        return LineOutcome::Skipped(SkipReason::EmptyText);
    }

    LineOutcome::Parsed(LyricLine {
        timestamp_seconds,
        text: text.to_string(),
    })
}

/// Matches `[<digits>:<digits>[.<digits>]]` at the start of `line`.
fn split_timestamp(line: &str) -> Option<(f64, &str)> {
    let (tag, rest) = line.strip_prefix('[')?.split_once(']')?;
    let (minutes, seconds) = tag.split_once(':')?;

    let seconds_ok = match seconds.split_once('.') {
        Some((whole, fraction)) => is_digits(whole) && is_digits(fraction),
        None => is_digits(seconds),
    };
    if !is_digits(minutes) || !seconds_ok {
        return None;
    }

    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some((minutes * 60.0 + seconds, rest))
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|byte| byte.is_ascii_digit())
}

/// Maps already-decoded lyrics text onto the bar grid.
pub fn map_text(text: &str, timing: &BarTiming) -> LyricsReport {
    let mut report = LyricsReport::default();

    for (index, raw) in text.lines().enumerate() {
        match parse_line(raw) {
            LineOutcome::Parsed(line) => {
                let key = timing.key(line.timestamp_seconds);
                if let Some(previous) = report.mapping.insert(key.clone(), line.text) {
                    debug!(%key, %previous, "later lyric replaced an identical key");
                }
            }
            LineOutcome::Skipped(reason) => {
                debug!(line = index + 1, %reason, "skipping lyrics line");
                report.skipped.push(SkippedLine {
                    line_number: index + 1,
                    reason,
                });
            }
        }
    }

    report
}

/// Reads a lyrics file as UTF-8, falling back to Latin-1 (which accepts any
/// byte sequence) when the file is not valid UTF-8.
pub fn read_lyrics(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(MixerError::NotFound(path.to_path_buf()));
    }

    let bytes = std::fs::read(path)?;
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            debug!(path = %path.display(), "lyrics are not UTF-8; decoding as Latin-1");
            err.into_bytes().into_iter().map(char::from).collect()
        }
    };

    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Writes the mapping as pretty JSON with keys sorted, creating parent
/// directories as needed.
pub fn write_mapping(path: &Path, mapping: &BarMapping) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut document = serde_json::to_string_pretty(&mapping.sorted())
        .map_err(|err| MixerError::Io(err.into()))?;
    document.push('\n');
    std::fs::write(path, document)?;
    Ok(())
}

/// Maps the LRC file at `lyrics_path` to bars and optionally persists the
/// result to `output`.
///
/// Parameters are validated before any file is touched.
pub fn map_lyrics(
    lyrics_path: &Path,
    bpm: f64,
    beats_per_bar: u32,
    offset_seconds: f64,
    output: Option<&Path>,
) -> Result<LyricsReport> {
    let timing = BarTiming::new(bpm, beats_per_bar, offset_seconds)?;
    let text = read_lyrics(lyrics_path)?;
    let report = map_text(&text, &timing);

    if let Some(output) = output {
        write_mapping(output, &report.mapping)?;
    }

    info!(
        lyrics = %lyrics_path.display(),
        bpm,
        beats_per_bar,
        offset_seconds,
        mapped = report.count(),
        skipped = report.skipped.len(),
        "mapped lyrics to bars"
    );
    Ok(report)
}
