// =============================================================================
// text_extractor.rs — THE MARKUP SHREDDER
// =============================================================================
//
// SEC filings arrive as HTML that was generated by a word processor,
// converted by another tool, and then decorated with inline XBRL by a
// third. Somewhere inside that are sentences. This module digs them out.
//
// Pipeline:
//   1. Parse with scraper and walk the DOM, dropping script/style/noscript
//      and anything hidden (inline XBRL headers love display:none).
//   2. Block elements become blank-line boundaries, <br> becomes a line
//      break, table cells become spaces.
//   3. Normalize whitespace.
//   4. Split on blank lines, then split again wherever a sentence ends and
//      two or more spaces follow.
//
// No attempt is made to understand headers or tables. If it looks like a
// paragraph, it is a paragraph.
// =============================================================================

use std::sync::LazyLock;

use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Node};

/// Elements whose text never reaches the reader.
const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "head", "title", "template", "ix:header",
];

/// Elements that start and end a paragraph-ish block.
const BLOCK_ELEMENTS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "div", "dl", "dt",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "tbody", "tfoot", "thead", "tr", "ul",
];

/// Table cells: separated, but not paragraph boundaries.
const CELL_ELEMENTS: &[&str] = &["td", "th"];

/// Any whitespace run that does not contain a newline.
static HORIZONTAL_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("horizontal whitespace pattern is valid"));

/// Spaces hugging a newline on either side.
static SPACE_AROUND_NEWLINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" *\n *").expect("newline padding pattern is valid"));

/// Two or more blank lines in a row.
static BLANK_LINE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line run pattern is valid"));

/// A blank-line paragraph boundary.
static BLANK_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("blank line pattern is valid"));

/// Sentence-ending punctuation followed by two or more whitespace chars.
static SENTENCE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?]\s{2,}").expect("sentence run pattern is valid"));

/// Extract visible text from an HTML document and normalize its whitespace.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 4);
    walk(document.root_element(), &mut out);
    normalize_whitespace(&out)
}

/// Convenience: markup in, paragraph candidates out.
pub fn extract_paragraphs(html: &str) -> Vec<String> {
    split_into_paragraphs(&extract_text(html))
}

fn walk(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => push_collapsible(out, text),
            Node::Element(el) => {
                let name = el.name().to_ascii_lowercase();
                if SKIPPED_ELEMENTS.contains(&name.as_str()) || is_hidden(el) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };

                let block = BLOCK_ELEMENTS.contains(&name.as_str());
                let cell = CELL_ELEMENTS.contains(&name.as_str());
                if block {
                    out.push_str("\n\n");
                } else if cell {
                    out.push(' ');
                }
                walk(child_ref, out);
                if block {
                    out.push_str("\n\n");
                } else if cell {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

/// Whitespace inside a text node is layout noise from the source file, so
/// every whitespace char (newlines and &nbsp; included) becomes a space.
fn push_collapsible(out: &mut String, text: &str) {
    out.extend(text.chars().map(|ch| if ch.is_whitespace() { ' ' } else { ch }));
}

fn is_hidden(el: &Element) -> bool {
    if el.attr("hidden").is_some() {
        return true;
    }
    el.attr("style").is_some_and(|style| {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.contains("display:none")
    })
}

/// Collapse horizontal whitespace to single spaces, strip spaces around line
/// breaks, squeeze runs of blank lines down to one, and trim.
pub fn normalize_whitespace(text: &str) -> String {
    let text = HORIZONTAL_WS.replace_all(text, " ");
    let text = SPACE_AROUND_NEWLINE.replace_all(&text, "\n");
    let text = BLANK_LINE_RUN.replace_all(&text, "\n\n");
    text.trim().to_string()
}

/// Split text into paragraph candidates: first on blank lines, then on
/// runs of concatenated sentences. Units are trimmed and empties dropped.
pub fn split_into_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();

    for block in BLANK_LINE.split(text) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let mut last = 0;
        for m in SENTENCE_RUN.find_iter(block) {
            // Keep the punctuation with the sentence it ends.
            push_unit(&mut paragraphs, &block[last..m.start() + 1]);
            last = m.end();
        }
        push_unit(&mut paragraphs, &block[last..]);
    }

    paragraphs
}

fn push_unit(paragraphs: &mut Vec<String>, unit: &str) {
    let unit = unit.trim();
    if !unit.is_empty() {
        paragraphs.push(unit.to_string());
    }
}
