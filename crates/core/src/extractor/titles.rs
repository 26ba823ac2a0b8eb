use crate::extractor::PageText;
use crate::models::{TitleEntry, TitleKind};
use regex::Regex;
use std::sync::OnceLock;

const MAX_TITLE_CHARS: usize = 120;

fn caption_regex() -> &'static Regex {
    static CAPTION: OnceLock<Regex> = OnceLock::new();
    CAPTION.get_or_init(|| {
        Regex::new(r"(?i)^(table|tabelle|figure|fig\.|abbildung|abb\.)\s+[A-Z]?\d+(?:[.\-]\d+)*\b")
            .expect("caption pattern is valid")
    })
}

fn section_regex() -> &'static Regex {
    static SECTION: OnceLock<Regex> = OnceLock::new();
    SECTION.get_or_init(|| {
        Regex::new(r"^(?:\d+(?:\.\d+)*|[A-H](?:\.\d+)+)\s+\p{Lu}[^.]{2,80}$")
            .expect("section pattern is valid")
    })
}

fn classify(line: &str) -> Option<TitleKind> {
    if let Some(found) = caption_regex().captures(line) {
        let word = found.get(1).map(|m| m.as_str().to_lowercase()).unwrap_or_default();
        return Some(if word.starts_with("tab") {
            TitleKind::Table
        } else {
            TitleKind::Figure
        });
    }
    section_regex().is_match(line).then_some(TitleKind::Section)
}

/// Headings and captions per page, read from the raw line structure.
pub fn extract_titles(pages: &[PageText]) -> Vec<TitleEntry> {
    let mut titles = Vec::new();

    for page in pages {
        for line in page.raw.lines() {
            let line = line.split_whitespace().collect::<Vec<_>>().join(" ");
            if line.is_empty() || line.chars().count() > MAX_TITLE_CHARS {
                continue;
            }
            if let Some(kind) = classify(&line) {
                let duplicate = titles
                    .iter()
                    .any(|seen: &TitleEntry| seen.page == page.number && seen.title == line);
                if !duplicate {
                    titles.push(TitleEntry {
                        page: page.number,
                        title: line,
                        kind,
                    });
                }
            }
        }
    }

    titles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(number: u32, raw: &str) -> PageText {
        PageText {
            number,
            raw: raw.to_string(),
            text: String::new(),
            strategy: "structural".to_string(),
        }
    }

    #[test]
    fn captions_and_sections_are_classified() {
        let pages = vec![
            page(3, "5.4 Item definition\nSome body text that goes on.\nTable 2 Work products of clause 5"),
            page(7, "Figure 1 — Overall cybersecurity risk management\nFigure 1 — Overall cybersecurity risk management"),
        ];

        let titles = extract_titles(&pages);
        assert_eq!(titles.len(), 3);
        assert_eq!(titles[0].kind, TitleKind::Section);
        assert_eq!(titles[0].page, 3);
        assert_eq!(titles[1].kind, TitleKind::Table);
        assert_eq!(titles[2].kind, TitleKind::Figure);
        assert_eq!(titles[2].page, 7);
    }

    #[test]
    fn body_sentences_are_not_titles() {
        let pages = vec![page(1, "The tables below list all items.\n12 the")];
        assert!(extract_titles(&pages).is_empty());
    }
}
