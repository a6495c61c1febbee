//! The transcription model boundary.

use std::path::Path;

use async_trait::async_trait;

use subgen_models::{LanguageCode, TranscriptSegment};

use crate::error::MediaResult;

/// Speech-to-text model boundary.
///
/// One invocation produces the ordered segment sequence for one target
/// language; multi-language jobs call this once per language. The
/// underlying model is CPU/GPU-bound and slow, which is the whole
/// reason the worker runs it off the request path.
///
/// Failures surface as [`crate::MediaError::Model`]; the `transient`
/// flag decides whether the worker's bounded retry applies.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        audio: &Path,
        language: &LanguageCode,
    ) -> MediaResult<Vec<TranscriptSegment>>;
}
