use image::{ImageBuffer, Rgba};
use lopdf::Document;
use std::fs;
use std::path::Path;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width_pt: f32,
    pub height_pt: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbSize {
    pub width_px: u32,
    pub height_px: u32,
}

impl Default for ThumbSize {
    fn default() -> Self {
        Self { width_px: 160, height_px: 200 }
    }
}

/// Result of a successful validation pass over a document file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenedDocument {
    pub page_count: u32,
    pub first_page: PageSize,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parse error: {0}")]
    Parse(#[from] lopdf::Error),
    #[error("document has no pages")]
    EmptyDocument,
    #[error("encrypted PDFs are not supported")]
    EncryptedUnsupported,
}

/// Validates documents and rasterizes their cover page.
///
/// The resolution pipeline uses `open` as its well-formedness check before a
/// file may enter the path cache; enrichment uses `render_cover` to produce
/// list thumbnails.
pub trait DocumentRenderer: Send + Sync {
    fn open(&self, path: &Path) -> Result<OpenedDocument, RenderError>;
    fn render_cover(&self, path: &Path, target: ThumbSize) -> Result<RgbaImage, RenderError>;
}

/// Pure-Rust renderer backed by lopdf.
///
/// Page content is not laid out; the cover raster is a paper-colored sheet
/// with the page's aspect ratio. Good enough for list thumbnails and keeps
/// the backend free of native libraries.
#[derive(Debug, Default)]
pub struct LopdfRenderer;

impl LopdfRenderer {
    pub fn new() -> Self {
        Self
    }

    fn parse_sizes(bytes: &[u8]) -> Result<Vec<PageSize>, RenderError> {
        let doc = Document::load_mem(bytes)?;
        // Only the trailer's Encrypt entry marks encryption; page content is
        // free to mention the name.
        if doc.is_encrypted() {
            return Err(RenderError::EncryptedUnsupported);
        }
        let pages = doc.get_pages();
        let mut sizes = Vec::with_capacity(pages.len());

        for (_, object_id) in pages {
            let dict = doc.get_dictionary(object_id)?;
            let size = dict
                .get(b"MediaBox")
                .ok()
                .and_then(|obj| obj.as_array().ok())
                .and_then(|array| {
                    if array.len() != 4 {
                        return None;
                    }
                    let x0 = array[0].as_float().ok()?;
                    let y0 = array[1].as_float().ok()?;
                    let x1 = array[2].as_float().ok()?;
                    let y1 = array[3].as_float().ok()?;
                    Some(PageSize { width_pt: (x1 - x0).abs(), height_pt: (y1 - y0).abs() })
                })
                // US Letter when the page carries no MediaBox.
                .unwrap_or(PageSize { width_pt: 612.0, height_pt: 792.0 });

            sizes.push(size);
        }

        if sizes.is_empty() {
            return Err(RenderError::EmptyDocument);
        }

        Ok(sizes)
    }

    fn raster_page(size: PageSize, target: ThumbSize) -> RgbaImage {
        let scale = (target.width_px.max(1) as f32 / size.width_pt.max(1.0))
            .min(target.height_px.max(1) as f32 / size.height_pt.max(1.0));

        let width = (size.width_pt * scale).round().max(1.0) as u32;
        let height = (size.height_pt * scale).round().max(1.0) as u32;

        let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));

        if width >= 4 && height >= 4 {
            for x in 0..width {
                image.put_pixel(x, 0, Rgba([220, 220, 220, 255]));
                image.put_pixel(x, height - 1, Rgba([220, 220, 220, 255]));
            }
            for y in 0..height {
                image.put_pixel(0, y, Rgba([220, 220, 220, 255]));
                image.put_pixel(width - 1, y, Rgba([220, 220, 220, 255]));
            }
        }

        image
    }
}

impl DocumentRenderer for LopdfRenderer {
    fn open(&self, path: &Path) -> Result<OpenedDocument, RenderError> {
        let bytes = fs::read(path)?;
        let sizes = Self::parse_sizes(&bytes)?;

        Ok(OpenedDocument { page_count: sizes.len() as u32, first_page: sizes[0] })
    }

    fn render_cover(&self, path: &Path, target: ThumbSize) -> Result<RgbaImage, RenderError> {
        let bytes = fs::read(path)?;
        let sizes = Self::parse_sizes(&bytes)?;

        Ok(Self::raster_page(sizes[0], target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, Object, Stream};

    fn build_pdf(page_count: usize, content: &[u8], encrypted: bool) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let kids: Vec<Object> = (0..page_count)
            .map(|_| {
                let content_id = doc.add_object(Stream::new(dictionary! {}, content.to_vec()));
                let page_id = doc.add_object(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                    "Contents" => content_id,
                });
                page_id.into()
            })
            .collect();

        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => page_count as i64,
            "Kids" => kids,
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        if encrypted {
            let encrypt_id = doc.add_object(dictionary! {
                "Filter" => "Standard",
                "V" => 1,
                "R" => 2,
            });
            doc.trailer.set("Encrypt", encrypt_id);
        }

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("in-memory save should succeed");
        bytes
    }

    fn sample_pdf_bytes(page_count: usize) -> Vec<u8> {
        build_pdf(page_count, b"", false)
    }

    fn write_sample(dir: &std::path::Path, name: &str, page_count: usize) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, sample_pdf_bytes(page_count)).unwrap();
        path
    }

    #[test]
    fn open_reports_page_count() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_sample(temp.path(), "three.pdf", 3);

        let opened = LopdfRenderer::new().open(&path).expect("open should succeed");
        assert_eq!(opened.page_count, 3);
        assert_eq!(opened.first_page.width_pt, 612.0);
    }

    #[test]
    fn open_rejects_garbage_bytes() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("junk.pdf");
        fs::write(&path, b"not a pdf at all").unwrap();

        let err = LopdfRenderer::new().open(&path).expect_err("junk should fail");
        assert!(matches!(err, RenderError::Parse(_)));
    }

    #[test]
    fn open_rejects_encrypted_trailer() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("locked.pdf");
        fs::write(&path, build_pdf(1, b"", true)).unwrap();

        let err = LopdfRenderer::new().open(&path).expect_err("encrypted should fail");
        assert!(matches!(err, RenderError::EncryptedUnsupported));
    }

    #[test]
    fn encrypt_in_page_content_is_not_encryption() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("mentions.pdf");
        fs::write(&path, build_pdf(2, b"BT (/Encrypt) Tj ET", false)).unwrap();

        let opened = LopdfRenderer::new().open(&path).expect("plain document should open");
        assert_eq!(opened.page_count, 2);
    }

    #[test]
    fn open_missing_file_is_io_error() {
        let err = LopdfRenderer::new()
            .open(Path::new("/definitely/not/here.pdf"))
            .expect_err("missing file should fail");
        assert!(matches!(err, RenderError::Io(_)));
    }

    #[test]
    fn cover_fits_target_box_and_keeps_aspect() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_sample(temp.path(), "one.pdf", 1);

        let target = ThumbSize { width_px: 160, height_px: 200 };
        let image = LopdfRenderer::new()
            .render_cover(&path, target)
            .expect("cover should render");

        assert!(image.width() <= target.width_px);
        assert!(image.height() <= target.height_px);
        // 612x792 is taller than wide; height should be the binding side.
        assert_eq!(image.height(), 200);
        assert!(image.width() < image.height());
    }
}
