//! Slack mrkdwn.

use super::{break_mentions, Renderer};

pub struct SlackRenderer;

impl Renderer for SlackRenderer {
    fn escape_text(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        for c in text.chars() {
            match c {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '*' | '_' | '~' => {
                    out.push('\u{200D}');
                    out.push(c);
                }
                _ => out.push(c),
            }
        }
        break_mentions(&out)
    }

    fn link(&self, url: &str, text: &str) -> String {
        let url = url.replace('|', "%7C").replace('>', "%3E");
        format!("<{}|{}>", url, self.escape_text(text).replace('|', "\u{2223}"))
    }

    fn strong(&self, text: &str) -> String {
        format!("*{}*", text)
    }

    fn emphasis(&self, text: &str) -> String {
        format!("_{}_", text)
    }

    fn code_block(&self, text: &str) -> String {
        format!("```\n{}\n```", self.escape_text(&text.replace("```", "`\u{200B}``")))
    }

    /// Slack previews are switched off in the webhook payload.
    fn suppress_preview(&self, text: &str) -> String {
        text.to_string()
    }

    fn external_link(&self, url: &str) -> String {
        format!("<{}>", url)
    }
}
