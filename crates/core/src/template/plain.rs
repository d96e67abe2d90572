//! Plain text for desktop notifications.

use super::{break_mentions, Renderer};

pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn escape_text(&self, text: &str) -> String {
        break_mentions(text)
    }

    fn link(&self, _url: &str, text: &str) -> String {
        self.escape_text(text)
    }

    fn strong(&self, text: &str) -> String {
        text.to_string()
    }

    fn emphasis(&self, text: &str) -> String {
        text.to_string()
    }

    fn code_block(&self, text: &str) -> String {
        self.escape_text(text)
    }

    fn suppress_preview(&self, text: &str) -> String {
        text.to_string()
    }

    fn external_link(&self, url: &str) -> String {
        url.to_string()
    }
}
