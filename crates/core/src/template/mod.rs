//! Message templating.
//!
//! Localized strings mix literal text, positional placeholders (`$1`, `$2`,
//! ...) and invocations (`{{name|arg|arg}}`). A string is parsed into segments
//! first and only then are arguments substituted, so argument text can never
//! open, close or split an invocation. Placeholders in literal text receive
//! the dialect-escaped argument; placeholders inside an invocation receive
//! the raw argument and the invocation escapes what it emits.
//!
//! `\{`, `\}`, `\|` and `\\` stand for the literal characters. An `{{` with no
//! closing `}}` is literal text.

mod discord;
mod plain;
mod slack;

pub use discord::DiscordRenderer;
pub use plain::PlainRenderer;
pub use slack::SlackRenderer;

use crate::errors::Result;
use crate::i18n::MessageTable;
use crate::models::{EventMessage, SiteInfo};

/// Mentions that notify a whole channel.
const MASS_MENTIONS: [&str; 3] = ["@everyone", "@here", "@channel"];

/// Break mass mentions with a zero-width space after the `@`.
pub fn break_mentions(text: &str) -> String {
    let mut out = text.to_string();
    for mention in MASS_MENTIONS {
        if out.contains(mention) {
            out = out.replace(mention, &format!("@\u{200B}{}", &mention[1..]));
        }
    }
    out
}

/// Everything a renderer needs besides the arguments.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    pub info: &'a SiteInfo,
    pub strings: &'a MessageTable,
    pub diff_threshold: i64,
}

/// Markup primitives of one destination dialect.
///
/// Text passed to [`link`](Renderer::link) is raw; the other wrappers take text
/// that is already escaped.
pub trait Renderer: Send + Sync {
    /// Escape a value so it renders literally.
    fn escape_text(&self, text: &str) -> String;

    /// A link with raw label `text`.
    fn link(&self, url: &str, text: &str) -> String;

    fn strong(&self, text: &str) -> String;

    fn emphasis(&self, text: &str) -> String;

    fn code_block(&self, text: &str) -> String;

    /// Keep URLs inside `text` from producing link previews.
    fn suppress_preview(&self, text: &str) -> String;

    /// A bare link to an external site.
    fn external_link(&self, url: &str) -> String;

    /// Render an invocation. `None` for unknown names.
    fn template(&self, name: &str, args: &[String], ctx: &RenderContext<'_>) -> Option<String> {
        standard_template(self, name, args, ctx)
    }
}

/// The invocations every dialect understands, built from its primitives.
pub fn standard_template<R: Renderer + ?Sized>(
    renderer: &R,
    name: &str,
    args: &[String],
    ctx: &RenderContext<'_>,
) -> Option<String> {
    let arg = |i: usize| args.get(i).map(String::as_str).unwrap_or_default();
    let page = |title: &str| ctx.info.article_url(title);

    let rendered = match name {
        "diff" => format!(
            "({})",
            renderer.link(&ctx.info.diff_url(arg(0)), ctx.strings.label("diff"))
        ),
        "diffSize" => match arg(0).trim().parse::<i64>() {
            Ok(delta) => {
                let shown = if delta > 0 {
                    format!("(+{})", delta)
                } else {
                    format!("({})", delta)
                };
                if delta.abs() > ctx.diff_threshold {
                    renderer.strong(&shown)
                } else {
                    renderer.emphasis(&shown)
                }
            }
            Err(_) => format!("({})", renderer.escape_text(arg(0))),
        },
        "user" => {
            let user = arg(0);
            format!(
                "{} ({}|{})",
                renderer.link(&page(&format!("User:{}", user)), user),
                renderer.link(
                    &page(&format!("User talk:{}", user)),
                    ctx.strings.label("talk")
                ),
                renderer.link(
                    &page(&format!("Special:Contributions/{}", user)),
                    ctx.strings.label("contribs")
                ),
            )
        }
        "link" => {
            let label = args.get(1).filter(|l| !l.is_empty()).map_or(arg(0), String::as_str);
            renderer.link(&page(arg(0)), label)
        }
        "userlink" => {
            let label = arg(0).split_once(':').map_or(arg(0), |(_, name)| name);
            renderer.link(&page(arg(0)), label)
        }
        "summary" => {
            let text = arg(0)
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if text.is_empty() {
                String::new()
            } else {
                format!(
                    "({})",
                    renderer.emphasis(&renderer.suppress_preview(&renderer.escape_text(&text)))
                )
            }
        }
        "debug" => renderer.code_block(arg(0)),
        "wiki" => renderer.external_link(&format!("https://{}", arg(0))),
        "board" => {
            let ns = arg(0).parse::<i64>().unwrap_or_default();
            let namespace = ctx.info.namespace_name(ns - 1).unwrap_or_default();
            let label = substitute(
                ctx.strings.label(&format!("board-{}", ns)),
                &args[1.min(args.len())..],
            );
            renderer.link(&page(&format!("{}:{}", namespace, arg(1))), &label)
        }
        _ => return None,
    };
    Some(rendered)
}

/// Plain `$n` substitution for labels that carry no markup.
pub fn substitute(template: &str, args: &[String]) -> String {
    let mut out = String::new();
    for piece in parse_pieces(template) {
        match piece {
            Piece::Text(text) => out.push_str(&text),
            Piece::Arg(n) => out.push_str(&arg_or_placeholder(args, n)),
        }
    }
    out
}

/// Render a localized string for one destination.
pub fn render(
    template: &str,
    args: &[String],
    renderer: &dyn Renderer,
    ctx: &RenderContext<'_>,
) -> String {
    let mut out = String::new();
    for segment in parse(template) {
        match segment {
            Segment::Literal(pieces) => {
                for piece in pieces {
                    match piece {
                        Piece::Text(text) => out.push_str(&text),
                        Piece::Arg(n) => match n.checked_sub(1).and_then(|i| args.get(i)) {
                            Some(value) => out.push_str(&renderer.escape_text(value)),
                            None => out.push_str(&format!("${}", n)),
                        },
                    }
                }
            }
            Segment::Invocation { name, args: params } => {
                let params: Vec<String> = params
                    .iter()
                    .map(|pieces| {
                        pieces
                            .iter()
                            .map(|piece| match piece {
                                Piece::Text(text) => text.clone(),
                                Piece::Arg(n) => arg_or_placeholder(args, *n),
                            })
                            .collect()
                    })
                    .collect();

                match renderer.template(&name, &params, ctx) {
                    Some(rendered) => out.push_str(&rendered),
                    None => {
                        let source = std::iter::once(name.clone())
                            .chain(params)
                            .collect::<Vec<_>>()
                            .join("|");
                        out.push_str(&renderer.escape_text(&format!("{{{{{}}}}}", source)));
                    }
                }
            }
        }
    }
    out
}

/// Render an event message with the site's string table.
pub fn render_message(
    message: &EventMessage,
    renderer: &dyn Renderer,
    ctx: &RenderContext<'_>,
) -> Result<String> {
    let template = ctx.strings.message(message.key)?;
    Ok(render(template, &message.args, renderer, ctx))
}

fn arg_or_placeholder(args: &[String], n: usize) -> String {
    n.checked_sub(1)
        .and_then(|i| args.get(i))
        .cloned()
        .unwrap_or_else(|| format!("${}", n))
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Piece {
    Text(String),
    /// 1-based argument index.
    Arg(usize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(Vec<Piece>),
    Invocation { name: String, args: Vec<Vec<Piece>> },
}

/// One source character after escape processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Char(char),
    /// An escaped character, never markup.
    Escaped(char),
}

impl Token {
    fn char(self) -> char {
        match self {
            Token::Char(c) | Token::Escaped(c) => c,
        }
    }
}

fn tokenize(source: &str) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some(&next @ ('{' | '}' | '|' | '\\'))) => {
                chars.next();
                tokens.push(Token::Escaped(next));
            }
            _ => tokens.push(Token::Char(c)),
        }
    }
    tokens
}

fn parse(source: &str) -> Vec<Segment> {
    let tokens = tokenize(source);
    let mut segments = Vec::new();
    let mut literal: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if is_pair(&tokens, i, '{') {
            if let Some(end) = find_close(&tokens, i + 2) {
                if !literal.is_empty() {
                    segments.push(Segment::Literal(pieces(&literal)));
                    literal.clear();
                }
                segments.push(invocation(&tokens[i + 2..end]));
                i = end + 2;
                continue;
            }
        }
        literal.push(tokens[i]);
        i += 1;
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(pieces(&literal)));
    }
    segments
}

fn parse_pieces(source: &str) -> Vec<Piece> {
    pieces(&tokenize(source))
}

fn is_pair(tokens: &[Token], at: usize, c: char) -> bool {
    matches!(
        (tokens.get(at), tokens.get(at + 1)),
        (Some(Token::Char(a)), Some(Token::Char(b))) if *a == c && *b == c
    )
}

fn find_close(tokens: &[Token], from: usize) -> Option<usize> {
    (from..tokens.len()).find(|&j| is_pair(tokens, j, '}'))
}

fn invocation(body: &[Token]) -> Segment {
    let mut parts = body.split(|t| *t == Token::Char('|'));
    let name: String = parts
        .next()
        .unwrap_or_default()
        .iter()
        .map(|t| t.char())
        .collect();
    Segment::Invocation {
        name: name.trim().to_string(),
        args: parts.map(pieces).collect(),
    }
}

/// Split text into literal runs and `$n` placeholders.
fn pieces(tokens: &[Token]) -> Vec<Piece> {
    let mut out = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < tokens.len() {
        if tokens[i] == Token::Char('$') {
            let digits: String = tokens[i + 1..]
                .iter()
                .take_while(|t| matches!(t, Token::Char(c) if c.is_ascii_digit()))
                .map(|t| t.char())
                .collect();
            if let Ok(n) = digits.parse::<usize>() {
                if n > 0 {
                    if !text.is_empty() {
                        out.push(Piece::Text(std::mem::take(&mut text)));
                    }
                    out.push(Piece::Arg(n));
                    i += 1 + digits.len();
                    continue;
                }
            }
        }
        text.push(tokens[i].char());
        i += 1;
    }

    if !text.is_empty() {
        out.push(Piece::Text(text));
    }
    out
}
