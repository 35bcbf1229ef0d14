//! Minimal HTML to terminal text conversion for AI answers.
//!
//! Only the handful of tags the prompts ask for are understood: headings,
//! paragraphs, lists, line breaks and bold/italic. Everything else is dropped
//! and its text kept.

use std::sync::OnceLock;

use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use regex::Regex;

fn tag_pattern() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"<\s*(/)?\s*([A-Za-z][A-Za-z0-9]*)([^>]*)>").expect("valid tag pattern"))
}

fn color_pattern() -> &'static Regex {
    static COLOR: OnceLock<Regex> = OnceLock::new();
    COLOR.get_or_init(|| Regex::new(r"color\s*:\s*#([0-9A-Fa-f]{6})").expect("valid color pattern"))
}

pub fn to_lines(html: &str) -> Vec<Line<'static>> {
    let mut renderer = Renderer::default();
    let mut last = 0;

    for caps in tag_pattern().captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        renderer.text(&html[last..whole.start()]);
        let closing = caps.get(1).is_some();
        let name = caps.get(2).map(|m| m.as_str().to_ascii_lowercase()).unwrap_or_default();
        let attrs = caps.get(3).map(|m| m.as_str()).unwrap_or("");
        renderer.tag(&name, closing, attrs);
        last = whole.end();
    }
    renderer.text(&html[last..]);
    renderer.finish()
}

#[derive(Default)]
struct Renderer {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    bold: usize,
    italic: usize,
    heading: Option<Style>,
}

impl Renderer {
    fn text(&mut self, raw: &str) {
        let decoded = decode_entities(raw);
        let mut collapsed = decoded.split_whitespace().collect::<Vec<_>>().join(" ");
        if decoded.starts_with(char::is_whitespace) && !self.spans.is_empty() {
            collapsed.insert(0, ' ');
        }
        if decoded.ends_with(char::is_whitespace) && !collapsed.is_empty() {
            collapsed.push(' ');
        }
        if collapsed.trim().is_empty() {
            return;
        }
        if self.spans.is_empty() {
            collapsed = collapsed.trim_start().to_string();
        }

        let mut style = self.heading.unwrap_or_default();
        if self.bold > 0 {
            style = style.add_modifier(Modifier::BOLD);
        }
        if self.italic > 0 {
            style = style.add_modifier(Modifier::ITALIC);
        }
        self.spans.push(Span::styled(collapsed, style));
    }

    fn tag(&mut self, name: &str, closing: bool, attrs: &str) {
        match name {
            "br" | "p" | "div" | "ul" | "ol" | "table" | "tr" => self.break_line(),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                self.break_line();
                self.heading = if closing {
                    None
                } else {
                    Some(heading_style(attrs))
                };
            }
            "li" => {
                self.break_line();
                if !closing {
                    self.spans.push(Span::raw("  • "));
                }
            }
            "strong" | "b" => {
                if closing {
                    self.bold = self.bold.saturating_sub(1);
                } else {
                    self.bold += 1;
                }
            }
            "em" | "i" => {
                if closing {
                    self.italic = self.italic.saturating_sub(1);
                } else {
                    self.italic += 1;
                }
            }
            _ => {}
        }
    }

    fn break_line(&mut self) {
        if self.spans.is_empty() {
            return;
        }
        let mut spans = std::mem::take(&mut self.spans);
        if let Some(last) = spans.last_mut() {
            let trimmed = last.content.trim_end().to_string();
            last.content = trimmed.into();
        }
        self.lines.push(Line::from(spans));
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.break_line();
        self.lines
    }
}

fn heading_style(attrs: &str) -> Style {
    let color = color_pattern()
        .captures(attrs)
        .and_then(|c| c.get(1))
        .and_then(|hex| u32::from_str_radix(hex.as_str(), 16).ok())
        .map(|rgb| Color::Rgb((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8))
        .unwrap_or(Color::Cyan);
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
