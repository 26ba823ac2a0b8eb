//! PDF to paragraphs.
//!
//! Each page runs through an ordered list of [`PageStrategy`]s and the first
//! result that passes the [`SufficiencyCheck`] wins. If none does, the longest
//! attempt is kept. Unreadable documents produce no pages, never an error.

pub mod normalize;
pub mod ocr;
pub mod page_labels;
pub mod strategies;
pub mod titles;

use crate::config::ExtractionOptions;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

pub use normalize::{normalize_page_text, split_paragraphs};
pub use ocr::{OcrEngine, OcrProfile, TesseractOcr};
pub use page_labels::{page_label_map, resolve_page_label};
pub use strategies::{LayoutText, OcrPass, PageStrategy, PdfSource, StructuralText};
pub use titles::extract_titles;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    /// Text as the winning strategy produced it.
    pub raw: String,
    pub text: String,
    pub strategy: String,
}

#[derive(Debug, Clone, Copy)]
pub struct SufficiencyCheck {
    pub min_chars: usize,
    pub min_alnum_ratio: f32,
    pub min_words: usize,
}

impl From<&ExtractionOptions> for SufficiencyCheck {
    fn from(value: &ExtractionOptions) -> Self {
        Self {
            min_chars: value.min_page_chars,
            min_alnum_ratio: value.min_alnum_ratio,
            min_words: value.min_page_words,
        }
    }
}

impl SufficiencyCheck {
    pub fn is_sufficient(&self, text: &str) -> bool {
        let words = text.split_whitespace().collect::<Vec<_>>();
        if words.len() < self.min_words {
            return false;
        }

        let collapsed_len = words.iter().map(|word| word.chars().count()).sum::<usize>()
            + words.len().saturating_sub(1);
        if collapsed_len < self.min_chars {
            return false;
        }

        let visible = words.iter().flat_map(|word| word.chars()).count();
        let alphanumeric = words
            .iter()
            .flat_map(|word| word.chars())
            .filter(|ch| ch.is_alphanumeric())
            .count();
        visible > 0 && alphanumeric as f32 / visible as f32 >= self.min_alnum_ratio
    }
}

pub struct PdfExtractor {
    strategies: Vec<Arc<dyn PageStrategy>>,
    sufficiency: SufficiencyCheck,
    page_batch_size: usize,
}

impl PdfExtractor {
    pub fn new(
        strategies: Vec<Arc<dyn PageStrategy>>,
        sufficiency: SufficiencyCheck,
        page_batch_size: usize,
    ) -> Self {
        Self {
            strategies,
            sufficiency,
            page_batch_size: page_batch_size.max(1),
        }
    }

    /// structural text, layout text, light OCR, heavy OCR.
    pub fn from_options(options: &ExtractionOptions, ocr_gate: Arc<Semaphore>) -> Self {
        let engine: Arc<dyn OcrEngine> = Arc::new(TesseractOcr::from_options(options));
        let strategies: Vec<Arc<dyn PageStrategy>> = vec![
            Arc::new(StructuralText),
            Arc::new(LayoutText {
                tool: options.layout_tool.clone(),
            }),
            Arc::new(OcrPass {
                engine: Arc::clone(&engine),
                profile: OcrProfile::light(options),
                gate: Arc::clone(&ocr_gate),
            }),
            Arc::new(OcrPass {
                engine,
                profile: OcrProfile::heavy(options),
                gate: ocr_gate,
            }),
        ];
        Self::new(strategies, SufficiencyCheck::from(options), options.page_batch_size)
    }

    pub async fn extract_pages(&self, path: &Path) -> Vec<PageText> {
        let source = match PdfSource::open(path).await {
            Ok(source) => source,
            Err(error) => {
                warn!(path = %path.display(), %error, "unreadable pdf, skipping");
                return Vec::new();
            }
        };

        let numbers = source.page_numbers();
        let mut pages = Vec::with_capacity(numbers.len());
        for batch in numbers.chunks(self.page_batch_size) {
            let extracted = join_all(batch.iter().map(|&page| self.extract_page(&source, page))).await;
            pages.extend(extracted.into_iter().filter(|page| !page.text.is_empty()));
        }

        info!(path = %path.display(), pages = pages.len(), total = numbers.len(), "extracted pdf");
        pages
    }

    pub async fn extract_paragraphs(&self, path: &Path) -> Vec<String> {
        paragraphs_of(&self.extract_pages(path).await)
    }

    async fn extract_page(&self, source: &PdfSource, page: u32) -> PageText {
        let mut best: Option<PageText> = None;

        for strategy in &self.strategies {
            let raw = match strategy.extract(source, page).await {
                Ok(raw) => raw,
                Err(error) => {
                    warn!(path = %source.path.display(), page, strategy = strategy.name(), %error, "page strategy failed");
                    continue;
                }
            };

            let text = normalize_page_text(&raw);
            let sufficient = self.sufficiency.is_sufficient(&text);
            let attempt = PageText {
                number: page,
                raw,
                text,
                strategy: strategy.name().to_string(),
            };

            if sufficient {
                debug!(page, strategy = strategy.name(), "page text sufficient");
                return attempt;
            }
            if best
                .as_ref()
                .map_or(true, |kept| attempt.text.len() > kept.text.len())
            {
                best = Some(attempt);
            }
        }

        best.unwrap_or(PageText {
            number: page,
            raw: String::new(),
            text: String::new(),
            strategy: "none".to_string(),
        })
    }
}

/// Pages in order, split on paragraph boundaries.
pub fn paragraphs_of(pages: &[PageText]) -> Vec<String> {
    pages
        .iter()
        .flat_map(|page| split_paragraphs(&page.text))
        .collect()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::error::IngestError;
    use async_trait::async_trait;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};
    use std::collections::HashMap;

    /// A PDF with one page per entry; `None` pages carry no text operators.
    pub fn write_pdf(path: &Path, pages: &[Option<&str>]) -> Result<(), Box<dyn std::error::Error>> {
        let mut document = Document::with_version("1.5");
        let pages_id = document.new_object_id();
        let font_id = document.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = document.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
        for text in pages {
            let operations = match text {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => Vec::new(),
            };
            let content = Content { operations };
            let content_id = document.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = document.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(Object::from(page_id));
        }

        let count = kids.len() as i64;
        document.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        document.trailer.set("Root", catalog_id);
        document.save(path)?;
        Ok(())
    }

    /// Recognition results keyed by page number.
    pub struct ScriptedOcr {
        pub pages: HashMap<u32, String>,
    }

    #[async_trait]
    impl OcrEngine for ScriptedOcr {
        async fn recognize(
            &self,
            _path: &Path,
            page: u32,
            _profile: &OcrProfile,
        ) -> Result<String, IngestError> {
            self.pages.get(&page).cloned().ok_or(IngestError::OcrFailed {
                page,
                details: "blank render".to_string(),
            })
        }
    }

    pub fn structural_then_ocr(ocr_pages: HashMap<u32, String>, sufficiency: SufficiencyCheck) -> PdfExtractor {
        let options = ExtractionOptions::default();
        let gate = Arc::new(Semaphore::new(1));
        let engine: Arc<dyn OcrEngine> = Arc::new(ScriptedOcr { pages: ocr_pages });
        PdfExtractor::new(
            vec![
                Arc::new(StructuralText),
                Arc::new(OcrPass {
                    engine: Arc::clone(&engine),
                    profile: OcrProfile::light(&options),
                    gate: Arc::clone(&gate),
                }),
                Arc::new(OcrPass {
                    engine,
                    profile: OcrProfile::heavy(&options),
                    gate,
                }),
            ],
            sufficiency,
            2,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{structural_then_ocr, write_pdf};
    use super::*;
    use crate::error::IngestError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn lenient() -> SufficiencyCheck {
        SufficiencyCheck {
            min_chars: 20,
            min_alnum_ratio: 0.5,
            min_words: 3,
        }
    }

    #[test]
    fn sufficiency_requires_length_words_and_density() {
        let check = SufficiencyCheck {
            min_chars: 40,
            min_alnum_ratio: 0.5,
            min_words: 5,
        };
        assert!(check.is_sufficient("Risk assessment requires a documented threat analysis."));
        assert!(!check.is_sufficient("Too short to count."));
        assert!(!check.is_sufficient(". , ; : - . , ; : - . , ; : - . , ; : - . , ; : -"));
        assert!(!check.is_sufficient("Supercalifragilisticexpialidocious-Antidisestablishment"));
    }

    #[tokio::test]
    async fn structural_text_is_used_when_present() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("text.pdf");
        write_pdf(&path, &[Some("CAN - Controller Area Network is a vehicle bus standard.")])?;

        let extractor = structural_then_ocr(HashMap::new(), lenient());
        let pages = extractor.extract_pages(&path).await;

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].strategy, "structural");
        assert!(pages[0].text.contains("Controller Area Network"));
        Ok(())
    }

    #[tokio::test]
    async fn image_only_pages_fall_back_to_ocr() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("scan.pdf");
        write_pdf(&path, &[Some("Cybersecurity management system overview and scope."), None])?;

        let ocr = HashMap::from([(2, "Risk assessment requires a TARA.".to_string())]);
        let extractor = structural_then_ocr(ocr, lenient());
        let pages = extractor.extract_pages(&path).await;

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[1].number, 2);
        assert_eq!(pages[1].strategy, "ocr-light");
        assert_eq!(pages[1].text, "Risk assessment requires a TARA.");
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_pdf_yields_no_paragraphs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"%PDF-1.4\n%broken")?;

        let extractor = structural_then_ocr(HashMap::new(), lenient());
        assert!(extractor.extract_paragraphs(&path).await.is_empty());
        Ok(())
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
        reply: &'static str,
    }

    #[async_trait]
    impl PageStrategy for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn extract(&self, _source: &PdfSource, _page: u32) -> Result<String, IngestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.to_string())
        }
    }

    #[tokio::test]
    async fn chain_stops_at_first_sufficient_strategy() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.pdf");
        write_pdf(&path, &[None])?;

        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let third = Arc::new(AtomicUsize::new(0));
        let extractor = PdfExtractor::new(
            vec![
                Arc::new(Counting { calls: Arc::clone(&first), reply: "tiny" }),
                Arc::new(Counting {
                    calls: Arc::clone(&second),
                    reply: "enough words on this page to be useful",
                }),
                Arc::new(Counting { calls: Arc::clone(&third), reply: "never asked" }),
            ],
            lenient(),
            1,
        );

        let pages = extractor.extract_pages(&path).await;
        assert_eq!(pages[0].text, "enough words on this page to be useful");
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert_eq!(third.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn longest_attempt_is_kept_when_nothing_suffices() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.pdf");
        write_pdf(&path, &[None])?;

        let calls = Arc::new(AtomicUsize::new(0));
        let extractor = PdfExtractor::new(
            vec![
                Arc::new(Counting { calls: Arc::clone(&calls), reply: "ab" }),
                Arc::new(Counting { calls: Arc::clone(&calls), reply: "a b c" }),
            ],
            lenient(),
            1,
        );

        let pages = extractor.extract_pages(&path).await;
        assert_eq!(pages[0].text, "a b c");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        Ok(())
    }

    /// Slow recognizer that records how many pages it handles at once.
    struct SlowOcr {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for SlowOcr {
        async fn recognize(
            &self,
            _path: &Path,
            page: u32,
            _profile: &OcrProfile,
        ) -> Result<String, IngestError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("Recognized text of scanned page number {page}."))
        }
    }

    #[tokio::test]
    async fn ocr_gate_bounds_recognition_across_documents() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("first.pdf");
        let second = dir.path().join("second.pdf");
        write_pdf(&first, &[None, None, None, None])?;
        write_pdf(&second, &[None, None, None, None])?;

        let engine = Arc::new(SlowOcr {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let options = ExtractionOptions::default();
        let extractor = PdfExtractor::new(
            vec![Arc::new(OcrPass {
                engine: engine.clone(),
                profile: OcrProfile::light(&options),
                gate: Arc::new(Semaphore::new(2)),
            })],
            lenient(),
            4,
        );

        let (left, right) = tokio::join!(extractor.extract_pages(&first), extractor.extract_pages(&second));
        assert_eq!((left.len(), right.len()), (4, 4));
        assert_eq!(engine.peak.load(Ordering::SeqCst), 2);
        Ok(())
    }
}
