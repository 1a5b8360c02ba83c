use chrono::{DateTime, Utc};
use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Ellipsis appended when text is cut short
const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Maximum description length shown in listings (in characters).
pub const SUMMARY_CHARS: usize = 200;

/// Display width of a string in terminal columns.
///
/// ```
/// use gator::util::display_width;
///
/// assert_eq!(display_width("Hello"), 5);
/// assert_eq!(display_width("你好"), 4);
/// ```
pub fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Truncate a string to fit within `max_width` terminal columns, appending
/// "..." when anything was cut.
///
/// Widths of 3 or less have no room for the ellipsis, so as many characters as
/// fit are returned without one.
///
/// ```
/// use gator::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Short", 10), "Short");
/// assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
/// assert_eq!(truncate_to_width("Test", 2), "Te");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if display_width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = if max_width <= ELLIPSIS_WIDTH {
        max_width
    } else {
        max_width - ELLIPSIS_WIDTH
    };

    let mut used = 0;
    let mut end = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        end = idx + c.len_utf8();
    }

    if max_width <= ELLIPSIS_WIDTH {
        Cow::Owned(s[..end].to_string())
    } else {
        Cow::Owned(format!("{}{}", &s[..end], ELLIPSIS))
    }
}

/// Remove terminal control characters so server-supplied text cannot drive
/// the terminal.
///
/// Strips whole CSI (`\x1b[` ... final byte) and OSC (`\x1b]` ... BEL or
/// `\x1b\\`) sequences, bare ESC, DEL and C0 controls. Tab, newline and
/// carriage return are kept.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let is_control = |b: u8| b == 0x7f || (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'));
    let bytes = s.as_bytes();
    if !bytes.iter().any(|&b| is_control(b)) {
        return Cow::Borrowed(s);
    }

    let len = bytes.len();
    let mut out = String::with_capacity(len);
    let mut i = 0;
    while i < len {
        match bytes[i] {
            0x1b if bytes.get(i + 1) == Some(&b'[') => {
                i += 2;
                while i < len {
                    let c = bytes[i];
                    i += 1;
                    if (0x40..=0x7e).contains(&c) {
                        break;
                    }
                }
            }
            0x1b if bytes.get(i + 1) == Some(&b']') => {
                i += 2;
                while i < len {
                    if bytes[i] == 0x07 {
                        i += 1;
                        break;
                    }
                    if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'\\') {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            b if is_control(b) => i += 1,
            _ => {
                let start = i;
                while i < len && !is_control(bytes[i]) {
                    i += 1;
                }
                // Only ASCII bytes end a run, so the slice stays on char boundaries
                out.push_str(&s[start..i]);
            }
        }
    }
    Cow::Owned(out)
}

/// Convert an HTML fragment (as found in feed descriptions) to plain text.
///
/// Tags are dropped, named and numeric character references are decoded,
/// and runs of whitespace collapse to one space.
///
/// ```
/// use gator::util::strip_html;
///
/// assert_eq!(strip_html("<p>Fish &amp; <b>chips</b></p>"), "Fish & chips");
/// ```
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }

    let decoded = html_escape::decode_html_entities(&text);
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain-text preview of a description, cut to [`SUMMARY_CHARS`] characters.
pub fn summarize(description: &str) -> String {
    let text = strip_html(&strip_control_chars(description));
    if text.chars().count() <= SUMMARY_CHARS {
        return text;
    }
    let cut: String = text.chars().take(SUMMARY_CHARS).collect();
    format!("{}{}", cut, ELLIPSIS)
}

/// Human-readable timestamp, e.g. `Mar 01, 2024, 12:30 PM`.
pub fn format_timestamp(at: Option<&DateTime<Utc>>) -> String {
    match at {
        Some(at) => at.format("%b %d, %Y, %I:%M %p").to_string(),
        None => "No date".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_truncate_ascii() {
        assert_eq!(truncate_to_width("Hello World", 11), "Hello World");
        assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
    }

    #[test]
    fn test_truncate_cjk() {
        // 2 columns per character: "你好" (4) + "..." (3) = 7
        assert_eq!(truncate_to_width("你好世界", 7), "你好...");
    }

    #[test]
    fn test_truncate_narrow_widths() {
        assert_eq!(truncate_to_width("Test", 0), "");
        assert_eq!(truncate_to_width("Test", 1), "T");
        assert_eq!(truncate_to_width("Test", 3), "Tes");
    }

    #[test]
    fn test_truncate_utf8_boundaries() {
        let s = "héllo wörld";
        for w in 0..15 {
            let _ = truncate_to_width(s, w);
        }
    }

    #[test]
    fn test_strip_control_chars() {
        assert!(matches!(strip_control_chars("clean\ttext\n"), Cow::Borrowed(_)));
        assert_eq!(strip_control_chars("a\x1b[31mb\x07c"), "abc");
        assert_eq!(strip_control_chars("del\x7f"), "del");
    }

    #[test]
    fn test_strip_control_chars_removes_escape_sequences() {
        assert_eq!(strip_control_chars("\x1b[1;31mred\x1b[0m text"), "red text");
        assert_eq!(strip_control_chars("\x1b]0;pwned\x07title"), "title");
        assert_eq!(strip_control_chars("\x1b]8;;http://x\x1b\\link"), "link");
        assert_eq!(strip_control_chars("bare\x1bESC"), "bareESC");
        assert_eq!(strip_control_chars("caf\u{e9}\x1b[0m ok"), "caf\u{e9} ok");
        // Unterminated sequence swallows the rest
        assert_eq!(strip_control_chars("cut\x1b[12"), "cut");
    }

    #[test]
    fn test_strip_html_tags_and_entities() {
        assert_eq!(
            strip_html("<div><p>Rust&nbsp;1.80 &lt;released&gt;</p>\n\n<p>It&#39;s &quot;here&quot;</p></div>"),
            "Rust 1.80 <released> It's \"here\""
        );
    }

    #[test]
    fn test_strip_html_decodes_typographic_entities() {
        assert_eq!(
            summarize("<p>It&rsquo;s here &mdash; read more&hellip; &copy; 2024</p>"),
            "It\u{2019}s here \u{2014} read more\u{2026} \u{a9} 2024"
        );
    }

    #[test]
    fn test_strip_html_keeps_stray_ampersand() {
        assert_eq!(strip_html("Q&A session"), "Q&A session");
        assert_eq!(strip_html("AT&T; &#x41;"), "AT&T; A");
    }

    #[test]
    fn test_summarize_cuts_long_text() {
        let long = "word ".repeat(100);
        let summary = summarize(&long);
        assert!(summary.ends_with("..."));
        assert_eq!(summary.chars().count(), SUMMARY_CHARS + 3);

        assert_eq!(summarize("<b>short</b>"), "short");
    }

    #[test]
    fn test_format_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        assert_eq!(format_timestamp(Some(&at)), "Mar 01, 2024, 12:30 PM");
        assert_eq!(format_timestamp(None), "No date");
    }
}
