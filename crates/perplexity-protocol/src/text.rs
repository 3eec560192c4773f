//! Incremental answer-text extraction.
//!
//! The progress channel re-sends the whole answer so far on every update;
//! [`DeltaExtractor`] turns that into the newly appended suffix, the shape
//! most callers want for token-by-token display.

use serde_json::Value;

use crate::payload::QueryUpdate;

/// Tracks how much answer text has already been emitted.
#[derive(Debug, Default)]
pub struct DeltaExtractor {
    emitted: usize,
}

impl DeltaExtractor {
    /// Create an extractor with nothing emitted yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one update; returns the not-yet-seen suffix of the answer, or
    /// `None` when the update carries no answer text or nothing new.
    ///
    /// Looks for `answer` then `output` inside the decoded `text` body,
    /// matching the two shapes the vendor uses.
    pub fn push(&mut self, update: &QueryUpdate) -> Option<String> {
        let body = update.text.as_ref()?;
        let full = answer_field(body)?;
        if full.len() <= self.emitted {
            return None;
        }
        // The answer grows append-only; a non-boundary index means the
        // server rewrote earlier text, in which case we re-emit from zero.
        let delta = match full.get(self.emitted..) {
            Some(suffix) => suffix.to_owned(),
            None => {
                self.emitted = 0;
                full.to_owned()
            }
        };
        self.emitted = full.len();
        Some(delta)
    }
}

fn answer_field(body: &Value) -> Option<&str> {
    body.get("answer")
        .or_else(|| body.get("output"))
        .and_then(Value::as_str)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
