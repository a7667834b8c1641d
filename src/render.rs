//! HTML to lightweight Markdown text.

use scraper::{ElementRef, Html, Node};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("failed to render content: {0}")]
pub struct RenderError(pub String);

pub trait Renderer: Send + Sync {
    fn render(&self, html: &str) -> Result<String, RenderError>;
}

/// Keeps paragraph structure, list items and links; drops all other markup.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlRenderer;

impl Renderer for HtmlRenderer {
    fn render(&self, html: &str) -> Result<String, RenderError> {
        let fragment = Html::parse_fragment(html);
        let mut out = String::new();
        walk(fragment.root_element(), &mut out);
        Ok(out.trim().to_string())
    }
}

fn walk(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => push_text(out, text),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    render_element(child_el, out);
                }
            }
            _ => {}
        }
    }
}

fn render_element(el: ElementRef, out: &mut String) {
    let name = el.value().name();
    match name {
        "script" | "style" | "head" | "noscript" => {}
        "br" => {
            trim_trailing_spaces(out);
            out.push('\n');
        }
        "p" | "div" | "section" | "article" | "blockquote" | "pre" | "table" | "tr" | "ul"
        | "ol" | "figure" | "header" | "footer" | "hr" => {
            block_break(out);
            walk(el, out);
            block_break(out);
        }
        "li" => {
            line_break(out);
            out.push_str("- ");
            walk(el, out);
            line_break(out);
        }
        "a" => {
            let mut label = String::new();
            walk(el, &mut label);
            let label = label.trim();
            match el.value().attr("href").map(str::trim).filter(|h| !h.is_empty()) {
                Some(href) if label.is_empty() => out.push_str(href),
                Some(href) if label != href => {
                    out.push('[');
                    out.push_str(label);
                    out.push_str("](");
                    out.push_str(href);
                    out.push(')');
                }
                _ => out.push_str(label),
            }
        }
        "img" => {
            if let Some(alt) = el.value().attr("alt").map(str::trim).filter(|a| !a.is_empty()) {
                push_text(out, alt);
            }
        }
        _ => {
            if let Some(level) = heading_level(name) {
                block_break(out);
                out.push_str(&"#".repeat(level));
                out.push(' ');
                walk(el, out);
                block_break(out);
            } else {
                walk(el, out);
            }
        }
    }
}

fn heading_level(name: &str) -> Option<usize> {
    let level = name.strip_prefix('h')?.parse::<usize>().ok()?;
    (1..=6).contains(&level).then_some(level)
}

/// Append text with runs of whitespace collapsed to one space.
fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        if c.is_whitespace() {
            if !out.is_empty() && !out.ends_with(char::is_whitespace) {
                out.push(' ');
            }
        } else {
            out.push(c);
        }
    }
}

fn trim_trailing_spaces(out: &mut String) {
    while out.ends_with(' ') {
        out.pop();
    }
}

fn line_break(out: &mut String) {
    trim_trailing_spaces(out);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

fn block_break(out: &mut String) {
    trim_trailing_spaces(out);
    if out.is_empty() || out.ends_with("\n\n") {
        return;
    }
    if out.ends_with('\n') {
        out.push('\n');
    } else {
        out.push_str("\n\n");
    }
}
