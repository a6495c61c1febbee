//! SRT subtitle encoding.
//!
//! Pure transform from timed transcript segments to SubRip text. The
//! encoder is deterministic: the same segment sequence always yields
//! byte-identical output.

use subgen_models::TranscriptSegment;

use crate::error::{MediaError, MediaResult};

/// Encode an ordered segment sequence as SRT text.
///
/// Each entry is a 1-based index, a `HH:MM:SS,mmm --> HH:MM:SS,mmm`
/// range and the trimmed segment text, followed by a blank line.
/// Unordered or overlapping input is rejected rather than reordered.
pub fn encode_srt(segments: &[TranscriptSegment]) -> MediaResult<String> {
    validate_segments(segments)?;

    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_srt_timestamp(segment.start),
            format_srt_timestamp(segment.end),
            segment.text.trim(),
        ));
    }
    Ok(out)
}

/// Reject sequences that violate the segment ordering contract.
fn validate_segments(segments: &[TranscriptSegment]) -> MediaResult<()> {
    for (i, segment) in segments.iter().enumerate() {
        if !segment.is_well_formed() {
            return Err(MediaError::malformed(format!(
                "segment {} has invalid range {}..{}",
                i, segment.start, segment.end
            )));
        }
        if i > 0 {
            let prev = &segments[i - 1];
            if segment.start < prev.start {
                return Err(MediaError::malformed(format!(
                    "segment {} starts before segment {}",
                    i,
                    i - 1
                )));
            }
            if segment.start < prev.end {
                return Err(MediaError::malformed(format!(
                    "segment {} overlaps segment {}",
                    i,
                    i - 1
                )));
            }
        }
    }
    Ok(())
}

/// Format seconds as an SRT timestamp, flooring fractional seconds to
/// millisecond precision.
pub fn format_srt_timestamp(seconds: f64) -> String {
    let total_millis = (seconds * 1000.0).floor() as u64;
    let hours = total_millis / 3_600_000;
    let minutes = (total_millis % 3_600_000) / 60_000;
    let secs = (total_millis % 60_000) / 1000;
    let millis = total_millis % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
}
