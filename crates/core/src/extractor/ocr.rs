//! Optical recognition of rendered pages.
//!
//! Pages are rasterized with `pdftoppm`, optionally downscaled, converted to
//! grayscale and contrast-stretched, then recognized with `tesseract`.

use crate::config::ExtractionOptions;
use crate::error::IngestError;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Resolution and segmentation for one recognition pass.
#[derive(Debug, Clone)]
pub struct OcrProfile {
    pub name: &'static str,
    pub dpi: u32,
    /// Tesseract page segmentation mode (6 = single uniform block, 3 = automatic).
    pub psm: u8,
    pub preprocess: bool,
    pub max_width: Option<u32>,
}

impl OcrProfile {
    pub fn light(options: &ExtractionOptions) -> Self {
        Self {
            name: "ocr-light",
            dpi: options.light_ocr_dpi,
            psm: options.light_ocr_psm,
            preprocess: options.enhance_contrast,
            max_width: Some(options.max_ocr_width),
        }
    }

    pub fn heavy(options: &ExtractionOptions) -> Self {
        Self {
            name: "ocr-heavy",
            dpi: options.heavy_ocr_dpi,
            psm: options.heavy_ocr_psm,
            preprocess: options.enhance_contrast,
            max_width: None,
        }
    }
}

#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn recognize(
        &self,
        path: &Path,
        page: u32,
        profile: &OcrProfile,
    ) -> Result<String, IngestError>;
}

#[derive(Debug, Clone)]
pub struct TesseractOcr {
    pub render_tool: String,
    pub ocr_tool: String,
    pub language: String,
    pub work_dir: PathBuf,
}

impl TesseractOcr {
    pub fn from_options(options: &ExtractionOptions) -> Self {
        Self {
            render_tool: options.render_tool.clone(),
            ocr_tool: options.ocr_tool.clone(),
            language: options.ocr_language.clone(),
            work_dir: std::env::temp_dir(),
        }
    }

    async fn render(&self, path: &Path, page: u32, dpi: u32, prefix: &Path) -> Result<PathBuf, IngestError> {
        let page_arg = page.to_string();
        let output = Command::new(&self.render_tool)
            .args(["-f", &page_arg, "-l", &page_arg])
            .args(["-r", &dpi.to_string()])
            .args(["-png", "-singlefile"])
            .arg(path)
            .arg(prefix)
            .output()
            .await
            .map_err(|error| IngestError::Tool {
                tool: self.render_tool.clone(),
                details: error.to_string(),
            })?;

        if !output.status.success() {
            return Err(IngestError::Tool {
                tool: self.render_tool.clone(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(prefix.with_extension("png"))
    }

    async fn run_tesseract(&self, image: &Path, psm: u8) -> Result<String, IngestError> {
        let output = Command::new(&self.ocr_tool)
            .arg(image)
            .arg("stdout")
            .args(["-l", &self.language])
            .args(["--psm", &psm.to_string()])
            .output()
            .await
            .map_err(|error| IngestError::Tool {
                tool: self.ocr_tool.clone(),
                details: error.to_string(),
            })?;

        if !output.status.success() {
            return Err(IngestError::Tool {
                tool: self.ocr_tool.clone(),
                details: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn recognize_in(
        &self,
        path: &Path,
        page: u32,
        profile: &OcrProfile,
        prefix: &Path,
    ) -> Result<String, IngestError> {
        let rendered = self.render(path, page, profile.dpi, prefix).await?;

        let target = if profile.preprocess || profile.max_width.is_some() {
            let prepared = prefix.with_extension("prep.png");
            let (source, destination) = (rendered.clone(), prepared.clone());
            let max_width = profile.max_width;
            let enhance = profile.preprocess;
            tokio::task::spawn_blocking(move || {
                let image = image::open(&source)?;
                prepare_for_ocr(image, max_width, enhance).save(&destination)
            })
            .await??;
            prepared
        } else {
            rendered
        };

        self.run_tesseract(&target, profile.psm).await
    }
}

#[async_trait]
impl OcrEngine for TesseractOcr {
    async fn recognize(
        &self,
        path: &Path,
        page: u32,
        profile: &OcrProfile,
    ) -> Result<String, IngestError> {
        let prefix = self.work_dir.join(format!("pdf-rag-{}", Uuid::new_v4()));
        let result = self.recognize_in(path, page, profile, &prefix).await;

        for leftover in [prefix.with_extension("png"), prefix.with_extension("prep.png")] {
            if let Err(error) = tokio::fs::remove_file(&leftover).await {
                if error.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %leftover.display(), %error, "could not remove OCR scratch file");
                }
            }
        }

        result.map_err(|error| match error {
            IngestError::Tool { .. } | IngestError::Image(_) | IngestError::Io(_) => {
                IngestError::OcrFailed {
                    page,
                    details: error.to_string(),
                }
            }
            other => other,
        })
    }
}

/// Downscale wide renders and convert to a contrast-stretched grayscale image.
pub fn prepare_for_ocr(image: DynamicImage, max_width: Option<u32>, enhance: bool) -> DynamicImage {
    let image = match max_width {
        Some(limit) if limit > 0 && image.width() > limit => {
            let height = (u64::from(image.height()) * u64::from(limit) / u64::from(image.width()))
                .max(1) as u32;
            image.resize_exact(limit, height, FilterType::Lanczos3)
        }
        _ => image,
    };

    if !enhance {
        return image;
    }

    let gray = image.to_luma8();
    DynamicImage::ImageLuma8(image::imageops::contrast(&gray, 30.0))
}
