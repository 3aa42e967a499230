use std::io::Cursor;
use termlens_core::HtmlToText;

/// Convert HTML to readable plain text.
///
/// This is "good enough" and deterministic, not a readability engine. On converter failure
/// the input is returned unchanged.
pub fn html_to_text(html: &str, width: usize) -> String {
    // html2text expects bytes; Cursor avoids allocating a second large buffer.
    html2text::from_read(Cursor::new(html.as_bytes()), width).unwrap_or_else(|_| html.to_string())
}

/// [`HtmlToText`] backed by `html2text`.
#[derive(Debug, Clone, Copy)]
pub struct Html2TextConverter {
    width: usize,
}

impl Html2TextConverter {
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(20),
        }
    }
}

impl Default for Html2TextConverter {
    fn default() -> Self {
        Self::new(120)
    }
}

impl HtmlToText for Html2TextConverter {
    fn to_plain_text(&self, html: &str) -> String {
        html_to_text(html, self.width)
    }
}
