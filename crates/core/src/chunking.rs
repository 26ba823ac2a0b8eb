use crate::config::ChunkingOptions;
use regex::Regex;
use std::sync::OnceLock;

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Overlapping word windows of `chunk_size` words, advancing by
/// `chunk_size - chunk_overlap` words (at least one).
pub fn window_words(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let words = text.split_whitespace().collect::<Vec<_>>();
    if words.is_empty() {
        return Vec::new();
    }

    let size = chunk_size.max(1);
    if words.len() <= size {
        return vec![words.join(" ")];
    }

    let stride = size.saturating_sub(chunk_overlap).max(1);
    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(words.len());
        windows.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += stride;
    }

    windows
}

fn definition_line_regex() -> &'static Regex {
    static DEFINITION: OnceLock<Regex> = OnceLock::new();
    DEFINITION.get_or_init(|| {
        Regex::new(r"\b[A-ZÄÖÜ]{2,10}\s*[-–—:(]\s*\p{L}").expect("definition pattern is valid")
    })
}

/// Whether a chunk looks like a table row (two or more column separators).
pub fn looks_like_table(chunk: &str) -> bool {
    chunk.matches('|').count() >= 2
}

/// Whether a chunk contains a glossary-style `TERM - explanation` line.
pub fn looks_like_definition(chunk: &str) -> bool {
    definition_line_regex().is_match(chunk)
}

pub fn alpha_ratio(text: &str) -> f32 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alphabetic = text.chars().filter(|ch| ch.is_alphabetic()).count();
    alphabetic as f32 / total as f32
}

#[derive(Debug, Clone, Copy)]
pub struct QualityFilter {
    pub min_chars: usize,
    pub min_alpha_ratio: f32,
    pub enabled: bool,
}

impl From<&ChunkingOptions> for QualityFilter {
    fn from(value: &ChunkingOptions) -> Self {
        Self {
            min_chars: value.min_chunk_chars,
            min_alpha_ratio: value.min_alpha_ratio,
            enabled: value.quality_filter,
        }
    }
}

impl QualityFilter {
    pub fn accept(&self, chunk: &str) -> bool {
        let collapsed = normalize_whitespace(chunk);
        if collapsed.is_empty() {
            return false;
        }
        if !self.enabled {
            return true;
        }
        if looks_like_table(&collapsed) || looks_like_definition(&collapsed) {
            return true;
        }

        collapsed.chars().count() >= self.min_chars
            && alpha_ratio(&collapsed) >= self.min_alpha_ratio
    }
}

/// Window every paragraph and keep the windows that pass the quality filter.
pub fn chunk_paragraphs(paragraphs: &[String], options: &ChunkingOptions) -> Vec<String> {
    let filter = QualityFilter::from(options);

    paragraphs
        .iter()
        .flat_map(|paragraph| {
            window_words(paragraph, options.chunk_size, options.chunk_overlap)
        })
        .filter(|chunk| filter.accept(chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|index| format!("w{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn filter() -> QualityFilter {
        QualityFilter {
            min_chars: 80,
            min_alpha_ratio: 0.25,
            enabled: true,
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn window_count_matches_stride_formula() {
        for (words, size, overlap) in [(10, 4, 1), (11, 4, 1), (100, 20, 5), (57, 10, 3)] {
            let windows = window_words(&numbered_words(words), size, overlap);
            let expected = (words - overlap).div_ceil(size - overlap);
            assert_eq!(windows.len(), expected, "N={words} S={size} O={overlap}");
        }
    }

    #[test]
    fn short_text_is_a_single_window() {
        assert_eq!(window_words(&numbered_words(4), 4, 1).len(), 1);
        assert_eq!(window_words(&numbered_words(3), 10, 2).len(), 1);
        assert!(window_words("   ", 10, 2).is_empty());
    }

    #[test]
    fn adjacent_windows_share_overlap_words() {
        let windows = window_words(&numbered_words(23), 6, 2);
        for pair in windows.windows(2) {
            let left = pair[0].split_whitespace().collect::<Vec<_>>();
            let right = pair[1].split_whitespace().collect::<Vec<_>>();
            assert_eq!(&left[left.len() - 2..], &right[..2]);
        }
        assert!(windows.last().is_some_and(|last| last.ends_with("w22")));
    }

    #[test]
    fn overlap_not_smaller_than_size_still_advances() {
        let windows = window_words(&numbered_words(5), 2, 5);
        assert_eq!(windows.len(), 4);
        assert_eq!(windows[0], "w0 w1");
        assert_eq!(windows[3], "w3 w4");
    }

    #[test]
    fn ninety_chars_half_alphabetic_passes() {
        let chunk = format!("{}{}", "a".repeat(45), "1".repeat(45));
        assert_eq!(chunk.len(), 90);
        assert!(filter().accept(&chunk));
    }

    #[test]
    fn all_digit_chunk_fails() {
        let chunk = "1".repeat(80);
        assert!(!filter().accept(&chunk));
    }

    #[test]
    fn short_definition_line_is_exempt() {
        assert!(filter().accept("CAN – Controller Area Network"));
        assert!(filter().accept("OEM: Original Equipment Manufacturer"));
        assert!(!filter().accept("Controller Area Network"));
    }

    #[test]
    fn table_rows_are_exempt() {
        assert!(filter().accept("a | b | c"));
        assert!(!filter().accept("a | b"));
    }

    #[test]
    fn disabled_filter_only_rejects_empty_chunks() {
        let open = QualityFilter {
            enabled: false,
            ..filter()
        };
        assert!(open.accept("x"));
        assert!(!open.accept("  \n "));
    }

    #[test]
    fn chunk_paragraphs_drops_noise_windows() {
        let options = ChunkingOptions {
            chunk_size: 50,
            chunk_overlap: 10,
            ..ChunkingOptions::default()
        };
        let paragraphs = vec![
            "Threat analysis and risk assessment identifies damage scenarios and attack paths for each asset of the item.".to_string(),
            "12 13 ## 44".to_string(),
            "TARA – Threat Analysis and Risk Assessment".to_string(),
        ];

        let chunks = chunk_paragraphs(&paragraphs, &options);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].starts_with("TARA"));
    }
}
