// ── Multi-part reassembly ──
//
// Display and key-module content is too large for one message, so the
// device sends it in numbered fragments. Each stream keeps its own
// accumulator plus the last completed buffer for change suppression.

use tracing::{trace, warn};

use crate::decode::Fragment;
use crate::error::Error;

/// Largest partial buffer kept, in hex characters. A stream that grows past
/// this without completing is dropped.
pub const MAX_PENDING_HEX: usize = 256 * 1024;

/// Result of feeding one fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More fragments expected.
    Pending,
    /// The stream completed with the same content as last time.
    Unchanged,
    /// The stream completed with new content, decoded to text.
    Complete(String),
}

#[derive(Debug, Clone)]
pub struct Reassembler {
    stream: &'static str,
    accumulator: String,
    completed: Option<String>,
}

impl Reassembler {
    pub fn new(stream: &'static str) -> Self {
        Self {
            stream,
            accumulator: String::new(),
            completed: None,
        }
    }

    /// Feed one fragment.
    ///
    /// `current == 1` starts a fresh buffer, discarding any partial content.
    /// Fragments with `current > total` are ignored. A partial buffer that
    /// would exceed [`MAX_PENDING_HEX`] is discarded.
    pub fn push(&mut self, fragment: &Fragment) -> Result<Progress, Error> {
        if fragment.current == 1 {
            self.accumulator.clear();
        }
        if fragment.current > fragment.total {
            trace!(
                stream = self.stream,
                current = fragment.current,
                total = fragment.total,
                "fragment past end of stream ignored"
            );
            return Ok(Progress::Pending);
        }

        if self.accumulator.len() + fragment.content.len() > MAX_PENDING_HEX {
            warn!(
                stream = self.stream,
                pending = self.accumulator.len(),
                current = fragment.current,
                total = fragment.total,
                "partial buffer too large, discarded"
            );
            self.accumulator.clear();
            return Ok(Progress::Pending);
        }

        self.accumulator.push_str(&fragment.content);
        if fragment.current != fragment.total {
            return Ok(Progress::Pending);
        }

        let buffer = std::mem::take(&mut self.accumulator);
        if self.completed.as_deref() == Some(buffer.as_str()) {
            trace!(stream = self.stream, "completed content unchanged");
            return Ok(Progress::Unchanged);
        }

        let bytes = hex::decode(&buffer)
            .map_err(|e| Error::decode(self.stream, format!("invalid reassembled hex: {e}")))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        self.completed = Some(buffer);
        Ok(Progress::Complete(text))
    }

    /// Length of the partial buffer, in hex characters.
    pub fn pending_len(&self) -> usize {
        self.accumulator.len()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn frag(current: u32, total: u32, text: &str) -> Fragment {
        Fragment {
            current,
            total,
            content: hex::encode(text),
        }
    }

    #[test]
    fn assembles_in_order() {
        let mut r = Reassembler::new("display");
        assert_eq!(r.push(&frag(1, 3, "ab")).unwrap(), Progress::Pending);
        assert_eq!(r.push(&frag(2, 3, "cd")).unwrap(), Progress::Pending);
        assert_eq!(
            r.push(&frag(3, 3, "ef")).unwrap(),
            Progress::Complete("abcdef".into())
        );
        assert_eq!(r.pending_len(), 0);
    }

    #[test]
    fn restart_discards_partial_buffer() {
        let mut r = Reassembler::new("display");
        r.push(&frag(1, 2, "stale")).unwrap();
        r.push(&frag(1, 2, "fr")).unwrap();
        assert_eq!(
            r.push(&frag(2, 2, "esh")).unwrap(),
            Progress::Complete("fresh".into())
        );
    }

    #[test]
    fn identical_content_is_suppressed() {
        let mut r = Reassembler::new("key-module");
        assert_eq!(
            r.push(&frag(1, 1, "same")).unwrap(),
            Progress::Complete("same".into())
        );
        assert_eq!(r.push(&frag(1, 1, "same")).unwrap(), Progress::Unchanged);
        assert_eq!(
            r.push(&frag(1, 1, "other")).unwrap(),
            Progress::Complete("other".into())
        );
    }

    #[test]
    fn oversized_partial_buffer_is_discarded() {
        let mut r = Reassembler::new("display");
        let chunk = "x".repeat(MAX_PENDING_HEX / 2 / 2);
        r.push(&frag(1, 9, &chunk)).unwrap();
        r.push(&frag(2, 9, &chunk)).unwrap();
        assert_eq!(r.pending_len(), MAX_PENDING_HEX);

        // Fragments that never complete the stream cannot grow it further.
        assert_eq!(r.push(&frag(3, 9, "y")).unwrap(), Progress::Pending);
        assert_eq!(r.pending_len(), 0);

        // A fresh stream still assembles.
        r.push(&frag(1, 2, "o")).unwrap();
        assert_eq!(
            r.push(&frag(2, 2, "k")).unwrap(),
            Progress::Complete("ok".into())
        );
    }

    #[test]
    fn overrun_fragment_is_ignored() {
        let mut r = Reassembler::new("display");
        r.push(&frag(1, 2, "a")).unwrap();
        assert_eq!(r.push(&frag(3, 2, "zz")).unwrap(), Progress::Pending);
        assert_eq!(
            r.push(&frag(2, 2, "b")).unwrap(),
            Progress::Complete("ab".into())
        );
    }
}
