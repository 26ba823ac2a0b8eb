use regex::Regex;
use std::sync::OnceLock;
use unicode_normalization::UnicodeNormalization;

const LIGATURES: [(char, &str); 7] = [
    ('\u{fb00}', "ff"),
    ('\u{fb01}', "fi"),
    ('\u{fb02}', "fl"),
    ('\u{fb03}', "ffi"),
    ('\u{fb04}', "ffl"),
    ('\u{fb05}', "st"),
    ('\u{fb06}', "st"),
];

fn hyphen_break_regex() -> &'static Regex {
    static HYPHEN: OnceLock<Regex> = OnceLock::new();
    HYPHEN.get_or_init(|| {
        Regex::new(r"(\p{L})-[ \t]*\n[ \t]*(\p{Ll})").expect("hyphen pattern is valid")
    })
}

fn compound_break_regex() -> &'static Regex {
    static COMPOUND: OnceLock<Regex> = OnceLock::new();
    COMPOUND.get_or_init(|| {
        Regex::new(r"([\p{L}\d])-[ \t]*\n[ \t]*([\p{Lu}\d])").expect("compound pattern is valid")
    })
}

fn blank_line_regex() -> &'static Regex {
    static BLANK: OnceLock<Regex> = OnceLock::new();
    BLANK.get_or_init(|| Regex::new(r"\n[ \t]*\n\s*").expect("blank line pattern is valid"))
}

pub fn expand_ligatures(text: &str) -> String {
    let mut expanded = String::with_capacity(text.len());
    for ch in text.chars() {
        match LIGATURES.iter().find(|(ligature, _)| *ligature == ch) {
            Some((_, replacement)) => expanded.push_str(replacement),
            None => expanded.push(ch),
        }
    }
    expanded
}

/// Clean extracted page text.
///
/// Paragraph boundaries (blank lines) survive as `\n\n`; every other run of
/// whitespace becomes a single space.
pub fn normalize_page_text(raw: &str) -> String {
    let text = expand_ligatures(raw)
        .nfkc()
        .collect::<String>()
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{ad}', "")
        .replace('\u{a0}', " ")
        .replace('\u{c}', "\n\n");

    // "com-\nmunication" loses the hyphen, "CAN-\nFD" keeps it
    let joined = hyphen_break_regex().replace_all(&text, "$1$2");
    let joined = compound_break_regex().replace_all(&joined, "$1-$2");

    blank_line_regex()
        .split(&joined)
        .map(|paragraph| paragraph.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|paragraph| !paragraph.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn split_paragraphs(normalized: &str) -> Vec<String> {
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(str::to_string)
        .collect()
}
