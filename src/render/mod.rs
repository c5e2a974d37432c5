use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::path::Path;

use crate::models::item::ItemSpec;

pub mod assets;
pub mod fit;
pub mod format;
pub mod layout;
pub mod templates;
pub mod text;

use assets::{AssetCatalog, FontBook};

pub const JPEG_QUALITY: u8 = 95;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("font error: {0}")]
    Font(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns one item into a raster image. CPU-bound; call from a blocking context.
pub trait Renderer: Send + Sync {
    fn render(&self, spec: &ItemSpec) -> Result<RgbImage, RenderError>;
}

/// Renders items onto the template backgrounds with the layouts in [`templates`].
pub struct TemplateEngine {
    catalog: AssetCatalog,
    fonts: FontBook,
}

impl TemplateEngine {
    pub fn new(catalog: AssetCatalog, fonts: FontBook) -> Self {
        Self { catalog, fonts }
    }

    /// Load fonts from `<dir>/fonts` and serve templates from `<dir>/templates`.
    pub fn load(assets_dir: &Path) -> Result<Self, RenderError> {
        let templates_dir = assets_dir.join("templates");
        if !templates_dir.is_dir() {
            return Err(RenderError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("template directory {} is missing", templates_dir.display()),
            )));
        }
        let fonts = FontBook::load(&assets_dir.join("fonts"))?;
        Ok(Self::new(AssetCatalog::new(templates_dir), fonts))
    }
}

impl Renderer for TemplateEngine {
    fn render(&self, spec: &ItemSpec) -> Result<RgbImage, RenderError> {
        let resolved = self.catalog.resolve(&spec.template)?;
        tracing::debug!(
            item_id = %spec.id,
            template = ?resolved.kind,
            variant = resolved.variant,
            "Rendering"
        );

        let mut canvas = image::open(&resolved.path)?.to_rgb8();
        resolved.kind.layout().draw(&mut canvas, &self.fonts, spec);
        if resolved.variant {
            templates::draw_secondary_dates(&mut canvas, &self.fonts, spec);
        }
        Ok(canvas)
    }
}

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode_image(image)?;
    Ok(bytes)
}
