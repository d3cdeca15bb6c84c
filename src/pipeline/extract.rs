//! Page element extraction via pdfium: embedded images and positioned text.
//!
//! pdfium wraps a C++ library with thread-local state, so the whole walk runs
//! inside `tokio::task::spawn_blocking`. Each embedded image object is decoded
//! with `get_raw_image()` and re-encoded as PNG; each text segment becomes a
//! [`TextBlockElement`]. pdfium reports bounds with a bottom-left origin; they
//! are flipped here so the rest of the crate works top-left.
//!
//! Only a document that cannot be opened is fatal. An image that cannot be
//! decoded is listed in [`PageLayout::unreadable_images`]; a text layer that
//! cannot be read sets [`PageLayout::text_layer_unreadable`].

use crate::document::{
    BoundingBox, DocumentInfo, ExtractionResult, ImageElement, ImageRef, PageElement, PageLayout,
    TextBlockElement,
};
use crate::error::InsightsError;
use crate::pipeline::encode::encode_png;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info, warn};

/// Bind to the pdfium dynamic library.
///
/// Discovery order:
/// 1. `PDFIUM_LIB_PATH` env var (explicit path to the library file)
/// 2. Alongside the running executable
/// 3. System library search paths
pub fn bind_pdfium() -> Result<Pdfium, InsightsError> {
    if let Ok(path) = std::env::var("PDFIUM_LIB_PATH") {
        debug!(path = %path, "Loading pdfium from env var");
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| InsightsError::PdfiumBindingFailed(format!("{path}: {e}")))?;
        return Ok(Pdfium::new(bindings));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(exe_dir) = exe.parent() {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %exe_dir.display(), "Loaded pdfium next to executable");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| InsightsError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

/// Extract every page's images and text blocks.
pub async fn extract_document(
    pdf_path: &Path,
    password: Option<&str>,
    file_name: &str,
    source: &str,
) -> Result<ExtractionResult, InsightsError> {
    let path = pdf_path.to_path_buf();
    let pwd = password.map(|s| s.to_string());
    let info = DocumentInfo {
        file_name: file_name.to_string(),
        source: source.to_string(),
        ..Default::default()
    };

    tokio::task::spawn_blocking(move || extract_blocking(&path, pwd.as_deref(), info))
        .await
        .map_err(|e| InsightsError::Internal(format!("Extraction task panicked: {}", e)))?
}

fn map_load_error(pdf_path: &Path, password: Option<&str>, e: PdfiumError) -> InsightsError {
    let err_str = format!("{:?}", e);
    if err_str.to_lowercase().contains("password") {
        if password.is_some() {
            InsightsError::WrongPassword {
                path: pdf_path.to_path_buf(),
            }
        } else {
            InsightsError::PasswordRequired {
                path: pdf_path.to_path_buf(),
            }
        }
    } else {
        InsightsError::CorruptPdf {
            path: pdf_path.to_path_buf(),
            detail: err_str,
        }
    }
}

fn extract_blocking(
    pdf_path: &Path,
    password: Option<&str>,
    mut info: DocumentInfo,
) -> Result<ExtractionResult, InsightsError> {
    let pdfium = bind_pdfium()?;
    let document = pdfium
        .load_pdf_from_file(pdf_path, password)
        .map_err(|e| map_load_error(pdf_path, password, e))?;

    let metadata = document.metadata();
    let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
        metadata.get(tag).and_then(|t| {
            let v = t.value().trim().to_string();
            if v.is_empty() {
                None
            } else {
                Some(v)
            }
        })
    };
    info.title = get_meta(PdfDocumentMetadataTagType::Title);
    info.author = get_meta(PdfDocumentMetadataTagType::Author);
    info.creation_date = get_meta(PdfDocumentMetadataTagType::CreationDate);

    let pages = document.pages();
    info.page_count = pages.len() as usize;
    info!("PDF loaded: {} pages", info.page_count);

    let mut layouts = Vec::with_capacity(info.page_count);
    for (idx, page) in pages.iter().enumerate() {
        let page_number = idx + 1;
        let height = page.height().value;
        let mut layout = PageLayout::new(page_number, page.width().value, height);

        let to_top_left = |left: f32, top: f32, right: f32, bottom: f32| {
            BoundingBox::new(left, height - top, right, height - bottom)
        };

        let mut image_index = 0;
        for object in page.objects().iter() {
            let Some(image_obj) = object.as_image_object() else {
                continue;
            };
            let image_ref = ImageRef {
                page_number,
                index: image_index,
            };
            image_index += 1;

            let raster = match image_obj.get_raw_image() {
                Ok(raster) => raster,
                Err(e) => {
                    warn!("{}: could not decode image: {:?}", image_ref, e);
                    layout.unreadable_images.push(image_ref);
                    continue;
                }
            };
            let data = match encode_png(&raster) {
                Ok(data) => data,
                Err(e) => {
                    warn!("{}: could not encode image: {}", image_ref, e);
                    layout.unreadable_images.push(image_ref);
                    continue;
                }
            };
            let bounding_box = match object.bounds() {
                Ok(b) => to_top_left(b.left().value, b.top().value, b.right().value, b.bottom().value),
                Err(e) => {
                    warn!("{}: no bounds: {:?}", image_ref, e);
                    BoundingBox {
                        x0: f32::NAN,
                        y0: f32::NAN,
                        x1: f32::NAN,
                        y1: f32::NAN,
                    }
                }
            };

            layout.elements.push(PageElement::Image(ImageElement {
                image_ref,
                page_number,
                bounding_box,
                width_px: raster.width(),
                height_px: raster.height(),
                data,
            }));
        }

        match page.text() {
            Ok(text) => {
                for segment in text.segments().iter() {
                    let content = segment.text();
                    if content.trim().is_empty() {
                        continue;
                    }
                    let b = segment.bounds();
                    layout.elements.push(PageElement::Text(TextBlockElement {
                        page_number,
                        bounding_box: to_top_left(
                            b.left().value,
                            b.top().value,
                            b.right().value,
                            b.bottom().value,
                        ),
                        text: content,
                    }));
                }
            }
            Err(e) => {
                // Same as a scan: the detector reports a missing text layer.
                warn!("Page {}: text layer unreadable: {:?}", page_number, e);
                layout.text_layer_unreadable = true;
            }
        }

        debug!(
            "Page {}: {} images ({} unreadable), {} text blocks",
            page_number,
            layout.images().count(),
            layout.unreadable_images.len(),
            layout.text_blocks().count()
        );
        layouts.push(layout);
    }

    Ok(ExtractionResult {
        document: info,
        pages: layouts,
    })
}
