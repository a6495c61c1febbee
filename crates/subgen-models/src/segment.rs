//! Timed transcript segments.

use serde::{Deserialize, Serialize};

/// One timed unit of transcript text.
///
/// Produced by the transcription model in non-decreasing `start` order
/// with `start < end`. Segments are ephemeral: they exist only between
/// the model invocation and subtitle encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Segment start, in seconds from the beginning of the media.
    pub start: f64,
    /// Segment end, in seconds.
    pub end: f64,
    /// Spoken text for this segment.
    pub text: String,
}

impl TranscriptSegment {
    /// Create a new segment.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Whether the segment's own time range is well-formed.
    pub fn is_well_formed(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.start >= 0.0 && self.start < self.end
    }
}
