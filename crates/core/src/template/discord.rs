//! Discord markdown.

use super::{break_mentions, Renderer};

const MARKDOWN_SPECIALS: [char; 10] = ['\\', '*', '_', '~', '`', '|', '[', ']', '>', '#'];

pub struct DiscordRenderer;

impl Renderer for DiscordRenderer {
    fn escape_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            if MARKDOWN_SPECIALS.contains(&c) {
                out.push('\\');
            }
            out.push(c);
        }
        break_mentions(&out)
    }

    fn link(&self, url: &str, text: &str) -> String {
        format!(
            "[{}](<{}>)",
            self.escape_text(text),
            url.replace(')', "%29").replace('>', "%3E")
        )
    }

    fn strong(&self, text: &str) -> String {
        format!("**{}**", text)
    }

    fn emphasis(&self, text: &str) -> String {
        format!("*{}*", text)
    }

    fn code_block(&self, text: &str) -> String {
        format!("```\n{}\n```", break_mentions(&text.replace("```", "`\u{200B}``")))
    }

    fn suppress_preview(&self, text: &str) -> String {
        text.replace("://", "://\u{200B}")
    }

    fn external_link(&self, url: &str) -> String {
        format!("<{}>", url)
    }
}
