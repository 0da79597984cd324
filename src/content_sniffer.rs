//! Content-type detection for discovered files (spec's content-detection
//! ambient feature).
//!
//! Detection is best-effort and advisory: it annotates outbound message-bus
//! publishes with a content type, but a sniffer failure never blocks a
//! transfer. `MagicNumberSniffer` recognizes binary formats by magic bytes
//! via `infer`; XML/EDIFACT recognition is a cheap textual heuristic layered
//! on top, gated by `ContentDetectionConfig`.

use crate::config::ContentDetectionConfig;

/// Detects a MIME-ish content type label for a byte buffer.
pub trait ContentSniffer: Send + Sync {
    fn sniff(&self, content: &[u8]) -> Option<String>;
}

/// Detects nothing. Used when content detection is not configured.
#[derive(Default)]
pub struct NoopSniffer;

impl ContentSniffer for NoopSniffer {
    fn sniff(&self, _content: &[u8]) -> Option<String> {
        None
    }
}

/// Magic-number detection via `infer`, with optional XML/EDIFACT text
/// heuristics layered on top for formats `infer` doesn't recognize.
pub struct MagicNumberSniffer {
    enable_xml: bool,
    enable_edifact: bool,
}

impl MagicNumberSniffer {
    pub fn new(config: &ContentDetectionConfig) -> Self {
        Self {
            enable_xml: config.enable_xml,
            enable_edifact: config.enable_edifact,
        }
    }
}

impl ContentSniffer for MagicNumberSniffer {
    fn sniff(&self, content: &[u8]) -> Option<String> {
        let trimmed = leading_text(content).trim_start();

        // These two formats are plain text and `infer` would otherwise
        // classify them unconditionally; gate them on config before
        // falling through to magic-byte detection.
        if trimmed.starts_with("<?xml") {
            return self.enable_xml.then(|| "application/xml".to_string());
        }
        if trimmed.starts_with("UNA") || trimmed.starts_with("UNB") {
            return self.enable_edifact.then(|| "application/edifact".to_string());
        }

        infer::get(content).map(|kind| kind.mime_type().to_string())
    }
}

fn leading_text(content: &[u8]) -> &str {
    let cut = content.len().min(256);
    std::str::from_utf8(&content[..cut]).unwrap_or("")
}
