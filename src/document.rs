//! Extraction-side data model: what the core receives about each page.
//!
//! Everything here is produced by [`crate::pipeline::extract`] (or built by
//! hand in tests) and consumed read-only by the filter, the detector and the
//! dispatcher. Coordinates are page points with the origin at the top-left
//! corner, so `y0 <= y1` reads top to bottom.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned rectangle in page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl BoundingBox {
    /// Build a box, swapping corners so that `x0 <= x1` and `y0 <= y1`.
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }

    /// A box is usable when every coordinate is finite and it encloses area.
    pub fn is_valid(&self) -> bool {
        [self.x0, self.y0, self.x1, self.y1]
            .iter()
            .all(|v| v.is_finite())
            && self.x1 > self.x0
            && self.y1 > self.y0
    }

    /// Grow the box by `margin` on all four sides.
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            x0: self.x0 - margin,
            y0: self.y0 - margin,
            x1: self.x1 + margin,
            y1: self.y1 + margin,
        }
    }

    /// Standard separating-axis test. Boxes that merely touch intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(self.x1 < other.x0 || other.x1 < self.x0 || self.y1 < other.y0 || other.y1 < self.y0)
    }
}

/// Stable identifier of an image inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageRef {
    /// 1-indexed page number.
    pub page_number: usize,
    /// 0-indexed position of the image among the page's images.
    pub index: usize,
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}-img{}", self.page_number, self.index)
    }
}

/// An embedded raster image placed on a page.
#[derive(Clone, Serialize, Deserialize)]
pub struct ImageElement {
    pub image_ref: ImageRef,
    pub page_number: usize,
    pub bounding_box: BoundingBox,
    /// Width of the raster in pixels (not the placed size on the page).
    pub width_px: u32,
    pub height_px: u32,
    /// PNG-encoded image bytes.
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl fmt::Debug for ImageElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageElement")
            .field("image_ref", &self.image_ref)
            .field("bounding_box", &self.bounding_box)
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("data", &format_args!("<{} bytes>", self.data.len()))
            .finish()
    }
}

/// A run of selectable text placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlockElement {
    pub page_number: usize,
    pub bounding_box: BoundingBox,
    pub text: String,
}

/// One positioned element of a page.
#[derive(Debug, Clone)]
pub enum PageElement {
    Image(ImageElement),
    Text(TextBlockElement),
}

impl PageElement {
    pub fn page_number(&self) -> usize {
        match self {
            PageElement::Image(i) => i.page_number,
            PageElement::Text(t) => t.page_number,
        }
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        match self {
            PageElement::Image(i) => &i.bounding_box,
            PageElement::Text(t) => &t.bounding_box,
        }
    }
}

/// All elements of one page together with the page size in points.
#[derive(Debug, Clone)]
pub struct PageLayout {
    pub page_number: usize,
    pub width: f32,
    pub height: f32,
    pub elements: Vec<PageElement>,
    /// Embedded images that could not be decoded; they have no element.
    pub unreadable_images: Vec<ImageRef>,
    /// The text layer exists but could not be read; the page has no text
    /// elements and is treated like a scan.
    pub text_layer_unreadable: bool,
}

impl PageLayout {
    pub fn new(page_number: usize, width: f32, height: f32) -> Self {
        Self {
            page_number,
            width,
            height,
            elements: Vec::new(),
            unreadable_images: Vec::new(),
            text_layer_unreadable: false,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageElement> {
        self.elements.iter().filter_map(|e| match e {
            PageElement::Image(i) => Some(i),
            PageElement::Text(_) => None,
        })
    }

    pub fn text_blocks(&self) -> impl Iterator<Item = &TextBlockElement> {
        self.elements.iter().filter_map(|e| match e {
            PageElement::Text(t) => Some(t),
            PageElement::Image(_) => None,
        })
    }

    /// Concatenated page text in reading order, one block per line.
    pub fn full_text(&self) -> String {
        self.text_blocks()
            .map(|t| t.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Document-level facts reported in the log's `meta` record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// File name of the analysed document (e.g. `study_2024.pdf`).
    pub file_name: String,
    /// Path or URL the user supplied.
    pub source: String,
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub creation_date: Option<String>,
}

/// Ordered per-page elements of one document.
#[derive(Debug, Clone, Default)]
pub struct ExtractionResult {
    pub document: DocumentInfo,
    pub pages: Vec<PageLayout>,
}

impl ExtractionResult {
    /// Every embedded image found, readable or not.
    pub fn image_count(&self) -> usize {
        self.pages
            .iter()
            .map(|p| p.images().count() + p.unreadable_images.len())
            .sum()
    }
}
