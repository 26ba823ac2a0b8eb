//! Printed page labels (`/PageLabels`) mapped to physical page numbers.

use lopdf::{Dictionary, Document, Object};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    Decimal,
    UpperRoman,
    LowerRoman,
    UpperAlpha,
    LowerAlpha,
}

impl LabelStyle {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"D" => Some(Self::Decimal),
            b"R" => Some(Self::UpperRoman),
            b"r" => Some(Self::LowerRoman),
            b"A" => Some(Self::UpperAlpha),
            b"a" => Some(Self::LowerAlpha),
            _ => None,
        }
    }

    fn format(self, value: u32) -> String {
        match self {
            Self::Decimal => value.to_string(),
            Self::UpperRoman => to_roman(value),
            Self::LowerRoman => to_roman(value).to_lowercase(),
            Self::UpperAlpha => to_alpha(value),
            Self::LowerAlpha => to_alpha(value).to_lowercase(),
        }
    }
}

/// A labelling range starting at a 0-based physical page index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRange {
    pub start_index: u32,
    pub style: Option<LabelStyle>,
    pub prefix: String,
    pub first: u32,
}

pub fn to_roman(mut value: u32) -> String {
    const NUMERALS: [(u32, &str); 13] = [
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut roman = String::new();
    for (amount, numeral) in NUMERALS {
        while value >= amount {
            roman.push_str(numeral);
            value -= amount;
        }
    }
    roman
}

pub fn from_roman(label: &str) -> Option<u32> {
    if label.is_empty() {
        return None;
    }

    let mut total = 0u32;
    let mut previous = 0u32;
    for ch in label.to_uppercase().chars().rev() {
        let value = match ch {
            'I' => 1,
            'V' => 5,
            'X' => 10,
            'L' => 50,
            'C' => 100,
            'D' => 500,
            'M' => 1000,
            _ => return None,
        };
        if value < previous {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            previous = value;
        }
    }
    (total > 0).then_some(total)
}

/// A, B, ..., Z, AA, BB, ... as used by the PDF alpha styles.
fn to_alpha(value: u32) -> String {
    if value == 0 {
        return String::new();
    }
    let letter = char::from(b'A' + ((value - 1) % 26) as u8);
    std::iter::repeat(letter)
        .take(((value - 1) / 26 + 1) as usize)
        .collect()
}

/// Expand label ranges over `page_count` physical pages.
pub fn labels_for_ranges(ranges: &[LabelRange], page_count: u32) -> HashMap<String, u32> {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(|range| range.start_index);

    let mut labels = HashMap::new();
    for (position, range) in sorted.iter().enumerate() {
        let end = sorted
            .get(position + 1)
            .map(|next| next.start_index)
            .unwrap_or(page_count)
            .min(page_count);

        for index in range.start_index..end {
            // a malformed /St can push the numbering past u32
            let Some(number) = range.first.checked_add(index - range.start_index) else {
                break;
            };
            let body = range.style.map(|style| style.format(number)).unwrap_or_default();
            let label = format!("{}{}", range.prefix, body);
            if !label.is_empty() {
                labels.entry(label).or_insert(index + 1);
            }
        }
    }
    labels
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn dictionary<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    resolve(document, object)?.as_dict().ok()
}

fn pdf_text(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => {
            if bytes.starts_with(&[0xFE, 0xFF]) {
                let units = bytes[2..]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect::<Vec<_>>();
                String::from_utf16(&units).ok()
            } else {
                Some(bytes.iter().map(|&byte| char::from(byte)).collect())
            }
        }
        _ => None,
    }
}

/// Walk a number tree, collecting `(key, value)` leaf pairs.
fn collect_number_tree<'a>(
    document: &'a Document,
    node: &'a Dictionary,
    pairs: &mut Vec<(i64, &'a Object)>,
    depth: usize,
) {
    if depth > 32 {
        return;
    }
    if let Some(nums) = node
        .get(b"Nums")
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_array().ok())
    {
        for pair in nums.chunks_exact(2) {
            if let Ok(key) = pair[0].as_i64() {
                pairs.push((key, &pair[1]));
            }
        }
    }
    if let Some(kids) = node
        .get(b"Kids")
        .ok()
        .and_then(|object| resolve(document, object))
        .and_then(|object| object.as_array().ok())
    {
        for kid in kids {
            if let Some(child) = dictionary(document, kid) {
                collect_number_tree(document, child, pairs, depth + 1);
            }
        }
    }
}

pub fn label_ranges(document: &Document) -> Vec<LabelRange> {
    let catalog = document
        .trailer
        .get(b"Root")
        .ok()
        .and_then(|root| dictionary(document, root));
    let Some(tree) = catalog
        .and_then(|catalog| catalog.get(b"PageLabels").ok())
        .and_then(|labels| dictionary(document, labels))
    else {
        return Vec::new();
    };

    let mut pairs = Vec::new();
    collect_number_tree(document, tree, &mut pairs, 0);

    pairs
        .into_iter()
        .filter_map(|(start, value)| {
            let entry = dictionary(document, value)?;
            let style = entry
                .get(b"S")
                .ok()
                .and_then(|style| style.as_name().ok())
                .and_then(LabelStyle::from_name);
            let prefix = entry.get(b"P").ok().and_then(pdf_text).unwrap_or_default();
            let first = entry
                .get(b"St")
                .ok()
                .and_then(|first| first.as_i64().ok())
                .unwrap_or(1)
                .max(1);
            Some(LabelRange {
                start_index: u32::try_from(start).ok()?,
                style,
                prefix,
                first: u32::try_from(first).ok()?,
            })
        })
        .collect()
}

/// Printed label to 1-based physical page. Documents without `/PageLabels`
/// get the identity mapping; unreadable documents an empty map.
pub fn page_label_map(path: &Path) -> HashMap<String, u32> {
    let document = match Document::load(path) {
        Ok(document) => document,
        Err(error) => {
            debug!(path = %path.display(), %error, "page labels unavailable");
            return HashMap::new();
        }
    };

    let page_count = document.get_pages().len() as u32;
    let ranges = label_ranges(&document);
    if ranges.is_empty() {
        return (1..=page_count).map(|page| (page.to_string(), page)).collect();
    }
    labels_for_ranges(&ranges, page_count)
}

/// Look a printed label up: exact, case-insensitive, as an integer, and
/// finally as a plain number or roman numeral taken for the physical page.
pub fn resolve_page_label(map: &HashMap<String, u32>, label: &str) -> Option<u32> {
    let label = label.trim();
    if let Some(page) = map
        .get(label)
        .or_else(|| map.get(&label.to_lowercase()))
        .or_else(|| map.get(&label.to_uppercase()))
    {
        return Some(*page);
    }

    if let Ok(number) = label.parse::<u32>() {
        return map.get(&number.to_string()).copied().or((number > 0).then_some(number));
    }

    from_roman(label)
}
