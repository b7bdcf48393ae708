// ── Frame splitter ──
//
// A single transport read may carry several application messages. Every
// message starts with the same marker string, so a read is split on that
// marker and the marker is restored on each piece.
//
// Splitting is per read. A message cut in half by the transport is not
// stitched back together; the observed device never does that.

/// Splits raw transport reads into whole protocol messages.
#[derive(Debug, Clone)]
pub struct FrameSplitter {
    marker: String,
}

impl FrameSplitter {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Split one read into messages, in receive order.
    ///
    /// Empty and whitespace-only fragments are dropped. Text before the
    /// first marker is treated as a message of its own (marker restored),
    /// matching how the device stream has always been consumed.
    pub fn split(&self, chunk: &[u8]) -> Vec<String> {
        let text = String::from_utf8_lossy(chunk);
        text.split(self.marker.as_str())
            .filter(|fragment| !fragment.trim().is_empty())
            .map(|fragment| format!("{}{fragment}", self.marker).trim().to_owned())
            .collect()
    }
}
