use ab_glyph::FontArc;
use std::path::{Path, PathBuf};

use super::templates::TemplateKind;
use super::RenderError;
use crate::models::item::TemplateRef;

/// Typefaces used by the template layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontFace {
    NotoSansBlack,
    NotoSansBold,
    PublicSansBold,
    RedditSansExtraBold,
    ShipporiMinchoBold,
}

impl FontFace {
    pub const ALL: [FontFace; 5] = [
        FontFace::NotoSansBlack,
        FontFace::NotoSansBold,
        FontFace::PublicSansBold,
        FontFace::RedditSansExtraBold,
        FontFace::ShipporiMinchoBold,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            FontFace::NotoSansBlack => "NotoSansJP-Black.ttf",
            FontFace::NotoSansBold => "NotoSansJP-Bold.ttf",
            FontFace::PublicSansBold => "PublicSans-Bold.ttf",
            FontFace::RedditSansExtraBold => "RedditSans-ExtraBold.ttf",
            FontFace::ShipporiMinchoBold => "ShipporiMinchoB1-Bold.ttf",
        }
    }
}

/// Every [`FontFace`], parsed once.
pub struct FontBook {
    faces: Vec<FontArc>,
}

impl FontBook {
    pub fn load(fonts_dir: &Path) -> Result<Self, RenderError> {
        let faces = FontFace::ALL
            .into_iter()
            .map(|face| {
                let path = fonts_dir.join(face.file_name());
                let bytes = std::fs::read(&path)
                    .map_err(|e| RenderError::Font(format!("{}: {e}", path.display())))?;
                FontArc::try_from_vec(bytes)
                    .map_err(|e| RenderError::Font(format!("{}: {e}", path.display())))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::info!(dir = %fonts_dir.display(), count = faces.len(), "Fonts loaded");
        Ok(Self { faces })
    }

    pub fn get(&self, face: FontFace) -> &FontArc {
        &self.faces[face as usize]
    }
}

/// Template image picked for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub kind: TemplateKind,
    pub path: PathBuf,
    /// The variant asset was picked and the secondary dates must be drawn.
    pub variant: bool,
}

/// Background images under `<assets>/templates`.
#[derive(Debug, Clone)]
pub struct AssetCatalog {
    templates_dir: PathBuf,
}

impl AssetCatalog {
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
        }
    }

    fn base_path(&self, base: &str) -> PathBuf {
        self.templates_dir.join(format!("template_{base}.jpg"))
    }

    fn variant_path(&self, base: &str) -> PathBuf {
        self.templates_dir.join(format!("template_{base}-2.jpg"))
    }

    /// Prefer the variant asset when asked for and present, else the base asset.
    pub fn resolve(&self, template: &TemplateRef) -> Result<ResolvedTemplate, RenderError> {
        let kind = TemplateKind::from_base(&template.base)
            .ok_or_else(|| RenderError::TemplateNotFound(template.base.clone()))?;

        if template.variant {
            let path = self.variant_path(&template.base);
            if path.is_file() {
                return Ok(ResolvedTemplate {
                    kind,
                    path,
                    variant: true,
                });
            }
        }

        let path = self.base_path(&template.base);
        if !path.is_file() {
            return Err(RenderError::TemplateNotFound(format!(
                "{} ({})",
                template.base,
                path.display()
            )));
        }
        Ok(ResolvedTemplate {
            kind,
            path,
            variant: false,
        })
    }
}
