mod assembler;
mod assets;
mod canvas;
mod content;
mod debug;
mod error;
mod expand;
mod font;
mod form;
mod form_asset;
mod glyph_report;
mod inline;
mod layout;
mod merge;
mod metrics;
mod model;
mod pdf;
mod pdfinspect;
mod types;

use assembler::Assembler;
pub use assembler::DocumentPlan;
pub use assets::{Asset, AssetBundle, AssetKind, is_supported_font_path};
pub use canvas::{Canvas, Command, Page};
use content::ContentLibrary;
pub use content::{
    ChildIteration, ContentNode, ContentTemplate, HeaderLevel, HeaderNode, SignatureNode,
    TemplateNode, TemplatePage,
};
pub use contract_content::ContentMetadata;
use debug::DebugLogger;
pub use error::ContractPressError;
pub use expand::expand_page;
use font::FontRegistry;
pub use font::FontVariant;
pub use form::{FieldValue, FormAsset, FormInstance};
pub use glyph_report::{GlyphCoverageReport, MissingGlyph};
pub use inline::{InlineStyleState, preprocess_markup};
pub use layout::{PageGeometry, RenderCursor, SECTION_META_KEY, TypographyConfig};
pub use merge::FormMergePlan;
pub use metrics::{DocumentStats, FieldFillReport, PageOrigin, PageStats};
pub use model::{
    Child, ChildPermissions, Contact, ContractPermissions, ContractRecord, DaySchedule,
    FormulaInfo, Guardian, GuardianRole, Language, MedicalInfo, PaymentFrequency, PaymentMethod,
    PaymentTerms, PermittedProducts, WeeklySchedule, WorkInfo, format_money,
};
pub use pdf::{DATA_URI_PREFIX, data_uri};
pub use pdfinspect::{
    FormInspectError, FormInspectErrorCode, FormInspectReport, FormInspectWarning,
    inspect_pdf_bytes, merge_compatibility_issues, require_pdf_composition_compatibility,
};
use std::path::PathBuf;
use std::sync::Arc;
pub use types::{Color, Margins, Pt, Rect, Size};

/// A configured engine. Fonts, templates and the form asset are loaded once;
/// every `render` call produces an independent document.
pub struct ContractPress {
    geometry: PageGeometry,
    typography: TypographyConfig,
    fonts: Arc<FontRegistry>,
    content: ContentLibrary,
    form: FormAsset,
    merge_plan: FormMergePlan,
    document_plan: DocumentPlan,
    today: Option<chrono::NaiveDate>,
    debug: Option<DebugLogger>,
}

/// The finished contract PDF.
#[derive(Debug, Clone)]
pub struct ContractDocument {
    pub bytes: Vec<u8>,
    pub data_uri: String,
    pub page_count: usize,
    pub stats: DocumentStats,
}

impl ContractDocument {
    pub fn sha256_hex(&self) -> String {
        contract_content::hex_sha256(&self.bytes)
    }

    pub fn write_to(&self, path: impl AsRef<std::path::Path>) -> Result<(), ContractPressError> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum FormSource {
    Bundled,
    Bytes(Vec<u8>),
    Path(PathBuf),
}

#[derive(Debug, Clone)]
struct FontSource {
    family: String,
    variant: FontVariant,
    data: Option<Vec<u8>>,
    path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ContractPressBuilder {
    page_size: Size,
    margins: Margins,
    typography: TypographyConfig,
    fonts: Vec<FontSource>,
    font_family: Option<String>,
    content_json: Vec<(Language, String)>,
    form: FormSource,
    merge_plan: Option<FormMergePlan>,
    document_plan: DocumentPlan,
    today: Option<chrono::NaiveDate>,
    debug_path: Option<PathBuf>,
    asset_bundle: AssetBundle,
}

impl ContractPress {
    pub fn builder() -> ContractPressBuilder {
        ContractPressBuilder::new()
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    pub fn form_asset(&self) -> &FormAsset {
        &self.form
    }

    pub fn merge_plan(&self) -> &FormMergePlan {
        &self.merge_plan
    }

    pub fn document_plan(&self) -> &DocumentPlan {
        &self.document_plan
    }

    /// Identifies the embedded page copy the engine was compiled with.
    pub fn content_metadata(&self) -> ContentMetadata {
        contract_content::metadata()
    }

    /// Builds the full contract for `contract` in its own language.
    pub fn render(&self, contract: &ContractRecord) -> Result<ContractDocument, ContractPressError> {
        let template = self.content.get(contract.language)?;
        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let assembler = Assembler {
            fonts: &self.fonts,
            template,
            form: &self.form,
            merge_plan: &self.merge_plan,
            document_plan: &self.document_plan,
            geometry: self.geometry,
            typography: self.typography,
            today,
            debug: self.debug.as_ref(),
        };
        let assembled = assembler.assemble(contract)?;
        let page_count = assembled.stats.pages.len();
        Ok(ContractDocument {
            data_uri: data_uri(&assembled.bytes),
            bytes: assembled.bytes,
            page_count,
            stats: assembled.stats,
        })
    }

    /// Parses a camelCase contract record and renders it.
    pub fn render_json(&self, json: &str) -> Result<ContractDocument, ContractPressError> {
        let contract = ContractRecord::from_json(json).map_err(|err| {
            ContractPressError::InvalidConfiguration(format!("contract record: {err}"))
        })?;
        self.render(&contract)
    }
}

impl ContractPressBuilder {
    pub fn new() -> Self {
        Self {
            page_size: Size::letter(),
            margins: Margins::all(54.0),
            typography: TypographyConfig::default(),
            fonts: Vec::new(),
            font_family: None,
            content_json: Vec::new(),
            form: FormSource::Bundled,
            merge_plan: None,
            document_plan: DocumentPlan::default(),
            today: None,
            debug_path: None,
            asset_bundle: AssetBundle::default(),
        }
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn margin_all(mut self, value: f32) -> Self {
        self.margins = Margins::all(value);
        self
    }

    pub fn typography(mut self, typography: TypographyConfig) -> Self {
        self.typography = typography;
        self
    }

    pub fn body_font_size(mut self, size: f32) -> Self {
        self.typography.body_size = Pt::from_f32(size);
        self
    }

    pub fn line_height(mut self, height: f32) -> Self {
        self.typography.line_height = Pt::from_f32(height);
        self
    }

    pub fn register_font_bytes(
        mut self,
        data: Vec<u8>,
        family: impl Into<String>,
        variant: FontVariant,
    ) -> Self {
        self.fonts.push(FontSource {
            family: family.into(),
            variant,
            data: Some(data),
            path: None,
        });
        self
    }

    pub fn register_font_file(
        mut self,
        path: impl Into<PathBuf>,
        family: impl Into<String>,
        variant: FontVariant,
    ) -> Self {
        self.fonts.push(FontSource {
            family: family.into(),
            variant,
            data: None,
            path: Some(path.into()),
        });
        self
    }

    /// Body text family. Must have a Regular face registered; Helvetica is the default.
    pub fn font_family(mut self, family: impl Into<String>) -> Self {
        self.font_family = Some(family.into());
        self
    }

    /// Replaces the embedded page copy for `language`.
    pub fn content_json(mut self, language: Language, json: impl Into<String>) -> Self {
        self.content_json.push((language, json.into()));
        self
    }

    pub fn form_template_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.form = FormSource::Bytes(bytes);
        self
    }

    pub fn form_template_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.form = FormSource::Path(path.into());
        self
    }

    pub fn merge_plan(mut self, plan: FormMergePlan) -> Self {
        self.merge_plan = Some(plan);
        self
    }

    pub fn document_plan(mut self, plan: DocumentPlan) -> Self {
        self.document_plan = plan;
        self
    }

    /// Fixes the date used for `{{today}}` and the form signature dates.
    pub fn today(mut self, date: chrono::NaiveDate) -> Self {
        self.today = Some(date);
        self
    }

    /// Writes JSON-lines debug events for every build to `path`.
    pub fn debug_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.debug_path = Some(path.into());
        self
    }

    pub fn assets(mut self, bundle: AssetBundle) -> Self {
        for asset in bundle.assets {
            self.asset_bundle.add(asset);
        }
        self
    }

    pub fn build(self) -> Result<ContractPress, ContractPressError> {
        let geometry = PageGeometry::new(self.page_size, self.margins);
        let printable = self.margins.printable_rect(self.page_size);
        if printable.width <= Pt::ZERO || printable.height <= Pt::ZERO {
            return Err(ContractPressError::InvalidConfiguration(
                "margins leave no printable area".to_string(),
            ));
        }
        if self.typography.body_size <= Pt::ZERO || self.typography.line_height <= Pt::ZERO {
            return Err(ContractPressError::InvalidConfiguration(
                "body font size and line height must be positive".to_string(),
            ));
        }

        let mut registry = FontRegistry::new();
        for source in self.fonts {
            let data = match (source.data, source.path) {
                (Some(data), _) => data,
                (None, Some(path)) => {
                    if !is_supported_font_path(&path) {
                        return Err(ContractPressError::Asset(format!(
                            "unsupported font file {}",
                            path.display()
                        )));
                    }
                    std::fs::read(&path).map_err(|err| {
                        ContractPressError::Asset(format!("font file {}: {err}", path.display()))
                    })?
                }
                (None, None) => continue,
            };
            registry.register_bytes(data, &source.family, source.variant)?;
        }
        for asset in self.asset_bundle.font_assets() {
            if let AssetKind::Font(variant) = asset.kind {
                registry.register_bytes(asset.data.clone(), &asset.name, variant)?;
            }
        }
        if let Some(family) = &self.font_family {
            registry.set_family(family)?;
        }

        let mut content = ContentLibrary::embedded()?;
        for asset in self.asset_bundle.content_assets() {
            let json = std::str::from_utf8(&asset.data).map_err(|err| {
                ContractPressError::Template(format!("content asset {}: {err}", asset.name))
            })?;
            let template = ContentTemplate::from_json(json)?;
            content.insert_json(template.language, json)?;
        }
        for (language, json) in &self.content_json {
            content.insert_json(*language, json)?;
        }

        let form_bytes: Arc<[u8]> = match (self.asset_bundle.form_template(), self.form) {
            (_, FormSource::Bytes(bytes)) => bytes.into(),
            (_, FormSource::Path(path)) => std::fs::read(&path)
                .map_err(|err| {
                    ContractPressError::Asset(format!("form template {}: {err}", path.display()))
                })?
                .into(),
            (Some(asset), FormSource::Bundled) => asset.data.clone().into(),
            (None, FormSource::Bundled) => form_asset::bundled_form_bytes()?,
        };
        let form = FormAsset::from_bytes(form_bytes)?;
        let merge_plan = self.merge_plan.unwrap_or_default();
        validate_merge_plan(&merge_plan, &form)?;

        let debug = match &self.debug_path {
            Some(path) => Some(DebugLogger::new(path)?),
            None => None,
        };

        Ok(ContractPress {
            geometry,
            typography: self.typography,
            fonts: Arc::new(registry),
            content,
            form,
            merge_plan,
            document_plan: self.document_plan,
            today: self.today,
            debug,
        })
    }
}

impl Default for ContractPressBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_merge_plan(plan: &FormMergePlan, form: &FormAsset) -> Result<(), ContractPressError> {
    let pages = form.page_count();
    if let Some(page) = plan.kept_pages.iter().find(|page| **page >= pages) {
        return Err(ContractPressError::InvalidConfiguration(format!(
            "merge plan keeps form page {page} but the form has {pages} pages"
        )));
    }
    if plan.overlay_page >= pages {
        return Err(ContractPressError::InvalidConfiguration(format!(
            "merge plan overlays form page {} but the form has {pages} pages",
            plan.overlay_page
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    fn engine() -> ContractPress {
        ContractPress::builder().today(today()).build().expect("engine")
    }

    fn temp_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "contract_press_{label}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock")
                .as_nanos()
        ))
    }

    #[test]
    fn renders_a_loadable_pdf_with_data_uri() {
        let doc = engine().render(&fixtures::contract(2)).expect("render");
        assert!(doc.bytes.starts_with(b"%PDF-"));
        assert!(doc.data_uri.starts_with(DATA_URI_PREFIX));
        let report = inspect_pdf_bytes(&doc.bytes).expect("inspect");
        assert_eq!(report.page_count, doc.page_count);
        assert_eq!(report.top_level_fields, 0);
        let loaded = lopdf::Document::load_mem(&doc.bytes).expect("load");
        assert!(loaded.catalog().expect("catalog").get(b"AcroForm").is_err());
    }

    #[test]
    fn output_is_deterministic_for_a_fixed_date() {
        let engine = engine();
        let contract = fixtures::contract(1);
        let first = engine.render(&contract).expect("first");
        let second = engine.render(&contract).expect("second");
        assert_eq!(first.sha256_hex(), second.sha256_hex());
        assert_eq!(first.sha256_hex().len(), 64);
    }

    #[test]
    fn zero_children_still_renders_closing_last() {
        let doc = engine().render(&fixtures::contract(0)).expect("render");
        assert_eq!(doc.stats.generated_page_count(), doc.page_count);
        match &doc.stats.pages.last().expect("page").origin {
            PageOrigin::Generated { section } => assert_eq!(section.as_deref(), Some("closing")),
            other => panic!("unexpected last page {other:?}"),
        }
    }

    #[test]
    fn render_json_uses_the_record_language() {
        let json = serde_json::json!({
            "titularName": "Maria Lopez",
            "language": "es",
            "guardians": [{ "name": "Rosa", "lastName": "Diaz", "role": "other" }],
            "children": [{ "name": "Ana", "lastName": "Diaz" }]
        })
        .to_string();
        let doc = engine().render_json(&json).expect("render");
        assert_eq!(doc.stats.form_pages_for_child(0), 3);
        assert!(engine().render_json("{ not json").is_err());
    }

    #[test]
    fn content_override_replaces_pages() {
        let json = serde_json::json!({
            "schema": "contract_content.v1",
            "language": "en",
            "pages": [
                { "name": "cover", "nodes": [{ "type": "paragraph", "text": "Only {{titularName}}" }] },
                { "name": "closing", "nodes": [{ "type": "paragraph", "text": "Bye" }] }
            ]
        })
        .to_string();
        let engine = ContractPress::builder()
            .today(today())
            .content_json(Language::En, json)
            .build()
            .expect("engine");
        let doc = engine.render(&fixtures::contract(1)).expect("render");
        // cover + 3 form pages + closing; the other plan pages are missing and skipped
        assert_eq!(doc.page_count, 5);
    }

    #[test]
    fn mislabeled_content_is_a_template_error() {
        let json = serde_json::json!({ "language": "es", "pages": [] }).to_string();
        let err = ContractPress::builder()
            .content_json(Language::En, json)
            .build()
            .err()
            .expect("error");
        assert!(matches!(err, ContractPressError::Template(_)));
    }

    #[test]
    fn bad_assets_are_fatal() {
        let err = ContractPress::builder()
            .register_font_bytes(vec![0, 1, 2], "Body", FontVariant::Regular)
            .build()
            .err()
            .expect("font error");
        assert!(matches!(err, ContractPressError::Asset(_)));

        let err = ContractPress::builder()
            .form_template_bytes(b"%PDF-1.7 broken".to_vec())
            .build()
            .err()
            .expect("form error");
        assert!(matches!(err, ContractPressError::Asset(_)));

        let err = ContractPress::builder()
            .form_template_file(temp_path("missing_form"))
            .build()
            .err()
            .expect("missing form");
        assert!(matches!(err, ContractPressError::Asset(_)));
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let err = ContractPress::builder()
            .margin_all(400.0)
            .build()
            .err()
            .expect("margins");
        assert!(matches!(err, ContractPressError::InvalidConfiguration(_)));

        let plan = FormMergePlan {
            kept_pages: vec![0, 7],
            ..FormMergePlan::bundled()
        };
        let err = ContractPress::builder()
            .merge_plan(plan)
            .build()
            .err()
            .expect("plan");
        assert!(matches!(err, ContractPressError::InvalidConfiguration(_)));

        let err = ContractPress::builder()
            .font_family("Missing")
            .build()
            .err()
            .expect("family");
        assert!(matches!(err, ContractPressError::InvalidConfiguration(_)));
    }

    #[test]
    fn form_template_asset_is_used_when_no_explicit_form() {
        let mut bundle = AssetBundle::default();
        bundle.add(Asset::new(
            "small",
            AssetKind::FormTemplate,
            crate::form::fixtures::small_form_bytes(),
        ));
        let plan = FormMergePlan {
            kept_pages: vec![0, 1],
            overlay_page: 0,
            ..FormMergePlan::bundled()
        };
        let engine = ContractPress::builder()
            .today(today())
            .assets(bundle)
            .merge_plan(plan)
            .build()
            .expect("engine");
        assert_eq!(engine.form_asset().page_count(), 2);
        let doc = engine.render(&fixtures::contract(1)).expect("render");
        assert_eq!(doc.stats.form_pages_for_child(0), 2);
        assert_eq!(doc.stats.field_reports[0].succeeded, 0);
    }

    #[test]
    fn debug_log_records_build_events() {
        let path = temp_path("debug.jsonl");
        let engine = ContractPress::builder()
            .today(today())
            .debug_log(&path)
            .build()
            .expect("engine");
        engine.render(&fixtures::contract(1)).expect("render");
        let log = std::fs::read_to_string(&path).expect("log");
        let kinds: Vec<String> = log
            .lines()
            .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
            .filter_map(|value| value["type"].as_str().map(str::to_string))
            .collect();
        assert!(kinds.iter().any(|k| k == "merge.child"));
        assert!(kinds.iter().any(|k| k == "document.finished"));
        assert_eq!(kinds.last().map(String::as_str), Some("debug.summary"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn content_metadata_is_stable() {
        let engine = engine();
        let first = engine.content_metadata();
        let second = engine.content_metadata();
        assert_eq!(first.fingerprint_sha256, second.fingerprint_sha256);
        assert_eq!(first.fingerprint_sha256.len(), 64);
    }
}
