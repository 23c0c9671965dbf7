use crate::content::ContentTemplate;
use crate::debug::DebugLogger;
use crate::error::ContractPressError;
use crate::expand::expand_page;
use crate::font::FontRegistry;
use crate::form::FormAsset;
use crate::layout::{LayoutEngine, PageGeometry, SECTION_META_KEY, TypographyConfig};
use crate::merge::{FormMergePlan, MergeContext, merge_child};
use crate::metrics::DocumentStats;
use crate::model::ContractRecord;
use crate::pdf::MasterDocument;
use chrono::NaiveDate;

/// Order of the generated pages around the per-child form block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPlan {
    /// Template pages rendered before the forms, in order.
    pub leading_pages: Vec<String>,
    /// Template page rendered after the forms. Always the last page.
    pub closing_page: String,
}

impl Default for DocumentPlan {
    fn default() -> Self {
        Self {
            leading_pages: [
                "cover",
                "terms",
                "schedule",
                "payment",
                "medical",
                "policies",
                "procedures",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
            closing_page: "closing".to_string(),
        }
    }
}

/// Everything one build needs besides the contract itself.
pub(crate) struct Assembler<'a> {
    pub fonts: &'a FontRegistry,
    pub template: &'a ContentTemplate,
    pub form: &'a FormAsset,
    pub merge_plan: &'a FormMergePlan,
    pub document_plan: &'a DocumentPlan,
    pub geometry: PageGeometry,
    pub typography: TypographyConfig,
    pub today: NaiveDate,
    pub debug: Option<&'a DebugLogger>,
}

pub(crate) struct AssembledDocument {
    pub bytes: Vec<u8>,
    pub stats: DocumentStats,
}

impl Assembler<'_> {
    /// Generated pages, then every child's form pages in child order, then
    /// the closing page. The master document is serialized once at the end.
    pub(crate) fn assemble(
        &self,
        contract: &ContractRecord,
    ) -> Result<AssembledDocument, ContractPressError> {
        let language = self.template.language;
        let mut layout = LayoutEngine::new(
            self.fonts,
            self.geometry,
            self.typography,
            self.debug.cloned(),
        );
        let page_size = layout.geometry().page_size;
        let mut master = MasterDocument::new(self.fonts);

        for name in &self.document_plan.leading_pages {
            self.render_page(&mut layout, name, contract);
        }
        master.append_canvas_pages(&layout.take_pages(), page_size, SECTION_META_KEY)?;

        let ctx = MergeContext {
            fonts: self.fonts,
            contract,
            plan: self.merge_plan,
            language,
            today: self.today,
            debug: self.debug,
        };
        let mut field_reports = Vec::with_capacity(contract.children.len());
        for (index, child) in contract.children.iter().enumerate() {
            let output = merge_child(self.form, &ctx, child, index)?;
            master.append_imported_pages(output.document, &output.pages, index)?;
            field_reports.push(output.report);
        }

        self.render_page(&mut layout, &self.document_plan.closing_page, contract);
        master.append_canvas_pages(&layout.take_pages(), page_size, SECTION_META_KEY)?;

        log::debug!(
            "assembled {} pages for {} children",
            master.page_count(),
            contract.children.len()
        );
        let finished = master.finish()?;
        if let Some(debug) = self.debug {
            debug.event(
                "document.finished",
                serde_json::json!({
                    "pages": finished.pages.len(),
                    "bytes": finished.bytes.len(),
                    "children": contract.children.len(),
                }),
            );
            debug.emit_summary("contract-press");
            debug.flush();
        }
        Ok(AssembledDocument {
            stats: DocumentStats {
                total_bytes: finished.bytes.len(),
                pages: finished.pages,
                field_reports,
                missing_glyphs: finished.glyphs.missing(),
            },
            bytes: finished.bytes,
        })
    }

    fn render_page(&self, layout: &mut LayoutEngine<'_>, name: &str, contract: &ContractRecord) {
        let language = self.template.language;
        match expand_page(self.template, name, contract, language, self.today) {
            Some(nodes) => {
                layout.begin_section(name);
                layout.render_nodes(&nodes);
                layout.end_section();
                let cursor = layout.cursor();
                log::trace!(
                    "section {name} ended on page {} at y={:.1}",
                    cursor.page_index,
                    cursor.y.to_f32()
                );
            }
            None => {
                log::warn!(
                    "template page {name} missing for language {}; skipped",
                    language.code()
                );
                if let Some(debug) = self.debug {
                    debug.event(
                        "template.page_missing",
                        serde_json::json!({ "page": name, "language": language.code() }),
                    );
                }
            }
        }
    }
}
