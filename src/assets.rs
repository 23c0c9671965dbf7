use crate::font::FontVariant;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// TrueType face; `name` is the family it registers under.
    Font(FontVariant),
    /// Fillable PDF used for the per-child form block.
    FormTemplate,
    /// Content template JSON; the language comes from its own `language` key.
    Content,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Font(_) => "font",
            AssetKind::FormTemplate => "form_template",
            AssetKind::Content => "content",
        }
    }

    pub fn from_str(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "font" => Some(AssetKind::Font(FontVariant::Regular)),
            "form_template" | "form" => Some(AssetKind::FormTemplate),
            "content" => Some(AssetKind::Content),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Asset {
    pub name: String,
    pub kind: AssetKind,
    pub data: Vec<u8>,
    pub source: Option<String>,
}

impl Asset {
    pub fn new(name: impl Into<String>, kind: AssetKind, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            kind,
            data,
            source: None,
        }
    }

    /// Reads the asset from disk, remembering the path as its source.
    pub fn from_path(
        name: impl Into<String>,
        kind: AssetKind,
        path: impl AsRef<Path>,
    ) -> std::io::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        Ok(Self {
            name: name.into(),
            kind,
            data,
            source: Some(path.display().to_string()),
        })
    }

    pub fn bytes_len(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct AssetBundle {
    pub assets: Vec<Asset>,
}

impl AssetBundle {
    pub fn add(&mut self, asset: Asset) {
        self.assets.push(asset);
    }

    pub fn font_assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets
            .iter()
            .filter(|asset| matches!(asset.kind, AssetKind::Font(_)))
    }

    pub fn content_assets(&self) -> impl Iterator<Item = &Asset> {
        self.assets
            .iter()
            .filter(|asset| asset.kind == AssetKind::Content)
    }

    /// The last form template added wins.
    pub fn form_template(&self) -> Option<&Asset> {
        self.assets
            .iter()
            .rev()
            .find(|asset| asset.kind == AssetKind::FormTemplate)
    }
}

pub fn is_supported_font_path(path: &Path) -> bool {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return false;
    };
    matches!(ext.to_ascii_lowercase().as_str(), "ttf" | "otf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_round_trip_through_names() {
        assert_eq!(AssetKind::from_str(" Content "), Some(AssetKind::Content));
        assert_eq!(AssetKind::from_str("form"), Some(AssetKind::FormTemplate));
        assert_eq!(AssetKind::FormTemplate.as_str(), "form_template");
        assert_eq!(AssetKind::from_str("css"), None);
    }

    #[test]
    fn bundle_filters_by_kind_and_last_form_wins() {
        let mut bundle = AssetBundle::default();
        bundle.add(Asset::new("first", AssetKind::FormTemplate, vec![1]));
        bundle.add(Asset::new("Body", AssetKind::Font(FontVariant::Bold), vec![2]));
        bundle.add(Asset::new("second", AssetKind::FormTemplate, vec![3]));
        bundle.add(Asset::new("es", AssetKind::Content, b"{}".to_vec()));
        assert_eq!(bundle.font_assets().count(), 1);
        assert_eq!(bundle.content_assets().count(), 1);
        assert_eq!(bundle.form_template().map(|a| a.name.as_str()), Some("second"));
    }

    #[test]
    fn font_paths_need_a_truetype_extension() {
        assert!(is_supported_font_path(Path::new("fonts/Body.TTF")));
        assert!(!is_supported_font_path(Path::new("fonts/readme")));
    }

    #[test]
    fn missing_asset_file_is_an_io_error() {
        let path = std::env::temp_dir().join("contract_press_no_such_asset.pdf");
        assert!(Asset::from_path("form", AssetKind::FormTemplate, path).is_err());
    }
}
