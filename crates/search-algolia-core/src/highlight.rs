//! Highlight markers and their conversion to presentation markup.
//!
//! The index wraps matched words in two sentinel tokens. Everything inside
//! the engine carries those tokens untouched; they become HTML only when a
//! document is rendered for display.

use regex::Regex;

/// Opening tag emitted for each highlighted run.
pub const HIGHLIGHT_OPEN: &str = "<span class=\"highlight\">";

/// Closing tag emitted for each highlighted run.
pub const HIGHLIGHT_CLOSE: &str = "</span>";

/// The sentinel pair the index uses to mark highlighted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightMarkers {
    pub start: String,
    pub end: String,
}

impl Default for HighlightMarkers {
    fn default() -> Self {
        Self {
            start: "@@HI_S@@".to_string(),
            end: "@@HI_E@@".to_string(),
        }
    }
}

impl HighlightMarkers {
    pub fn new(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Wrap `word` in the markers.
    pub fn mark(&self, word: &str) -> String {
        format!("{}{}{}", self.start, word, self.end)
    }

    /// Remove the markers, leaving plain text.
    pub fn strip(&self, text: &str) -> String {
        text.replace(&self.start, "").replace(&self.end, "")
    }

    /// Convert marked text to escaped HTML with highlight spans.
    ///
    /// Adjacent runs separated only by up to three of ` .,-` are merged so
    /// phrases highlight as a unit. Unbalanced markers (truncated excerpts)
    /// are closed or opened so the output is always well formed.
    pub fn to_html(&self, text: &str) -> String {
        let start = escape_html(&self.start);
        let end = escape_html(&self.end);
        let mut out = escape_html(text);

        let pattern = format!("{}([ .,-]{{0,3}}){}", regex::escape(&end), regex::escape(&start));
        if let Ok(re) = Regex::new(&pattern) {
            out = re.replace_all(&out, "$1").into_owned();
        }

        let mut opened = out.matches(start.as_str()).count();
        let mut closed = out.matches(end.as_str()).count();
        out = out.replace(&start, HIGHLIGHT_OPEN).replace(&end, HIGHLIGHT_CLOSE);

        while opened > closed {
            out.push_str(HIGHLIGHT_CLOSE);
            closed += 1;
        }
        while opened < closed {
            out.insert_str(0, HIGHLIGHT_OPEN);
            opened += 1;
        }
        out
    }
}

/// Escape the five HTML-significant characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
