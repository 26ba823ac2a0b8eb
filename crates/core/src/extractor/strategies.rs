use crate::error::IngestError;
use crate::extractor::ocr::{OcrEngine, OcrProfile};
use async_trait::async_trait;
use lopdf::Document;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::process::Command;
use tokio::sync::Semaphore;

/// A parsed PDF shared by all strategies working on its pages.
#[derive(Clone)]
pub struct PdfSource {
    pub path: PathBuf,
    pub document: Arc<Document>,
}

impl PdfSource {
    pub async fn open(path: &Path) -> Result<Self, IngestError> {
        let owned = path.to_path_buf();
        let document = tokio::task::spawn_blocking(move || Document::load(&owned))
            .await?
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        if document.is_encrypted() {
            return Err(IngestError::PdfParse(format!(
                "encrypted pdf: {}",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            document: Arc::new(document),
        })
    }

    /// Physical page numbers, 1-based, in order.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.document.get_pages().keys().copied().collect()
    }
}

/// One way of turning a page into text.
#[async_trait]
pub trait PageStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, source: &PdfSource, page: u32) -> Result<String, IngestError>;
}

/// Text operators of the content stream, decoded through the page fonts.
#[derive(Debug, Default)]
pub struct StructuralText;

#[async_trait]
impl PageStrategy for StructuralText {
    fn name(&self) -> &'static str {
        "structural"
    }

    async fn extract(&self, source: &PdfSource, page: u32) -> Result<String, IngestError> {
        let document = Arc::clone(&source.document);
        tokio::task::spawn_blocking(move || document.extract_text(&[page]))
            .await?
            .map_err(|error| IngestError::PdfParse(error.to_string()))
    }
}

/// `pdftotext -layout`, which keeps columns apart. Rows that look tabular are
/// re-emitted as pipe-delimited lines after the page text.
#[derive(Debug)]
pub struct LayoutText {
    pub tool: String,
}

impl Default for LayoutText {
    fn default() -> Self {
        Self {
            tool: "pdftotext".to_string(),
        }
    }
}

#[async_trait]
impl PageStrategy for LayoutText {
    fn name(&self) -> &'static str {
        "layout"
    }

    async fn extract(&self, source: &PdfSource, page: u32) -> Result<String, IngestError> {
        let page_arg = page.to_string();
        let output = Command::new(&self.tool)
            .arg("-layout")
            .args(["-enc", "UTF-8"])
            .args(["-f", &page_arg, "-l", &page_arg])
            .arg(&source.path)
            .arg("-")
            .output()
            .await
            .map_err(|error| IngestError::Tool {
                tool: self.tool.clone(),
                details: error.to_string(),
            })?;

        if !output.status.success() {
            return Err(IngestError::Tool {
                tool: self.tool.clone(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(layout_to_text(&String::from_utf8_lossy(&output.stdout)))
    }
}

fn column_split_regex() -> &'static Regex {
    static SPLIT: OnceLock<Regex> = OnceLock::new();
    SPLIT.get_or_init(|| Regex::new(r"\s{2,}").expect("split pattern is valid"))
}

/// Table row if at least three columns are separated by wide gaps.
fn table_cells(line: &str) -> Option<Vec<String>> {
    let trimmed = line.trim();
    if column_split_regex().find_iter(trimmed).count() < 2 {
        return None;
    }
    let cells = column_split_regex()
        .split(trimmed)
        .map(|cell| cell.trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect::<Vec<_>>();
    (cells.len() >= 3).then_some(cells)
}

pub fn layout_to_text(layout: &str) -> String {
    let mut prose = Vec::new();
    let mut rows = Vec::new();

    for line in layout.lines() {
        match table_cells(line) {
            Some(cells) => rows.push(cells.join(" | ")),
            None => prose.push(line.trim_end()),
        }
    }

    let mut text = prose.join("\n");
    if !rows.is_empty() {
        text.push_str("\n\n");
        text.push_str(&rows.join("\n"));
    }
    text
}

/// Render + recognize behind the shared OCR gate.
pub struct OcrPass {
    pub engine: Arc<dyn OcrEngine>,
    pub profile: OcrProfile,
    pub gate: Arc<Semaphore>,
}

#[async_trait]
impl PageStrategy for OcrPass {
    fn name(&self) -> &'static str {
        self.profile.name
    }

    async fn extract(&self, source: &PdfSource, page: u32) -> Result<String, IngestError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|error| IngestError::OcrFailed {
                page,
                details: error.to_string(),
            })?;
        self.engine.recognize(&source.path, page, &self.profile).await
    }
}
