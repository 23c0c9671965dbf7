use crate::glyph_report::MissingGlyph;
use serde::Serialize;

/// Where an output page came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageOrigin {
    Generated { section: Option<String> },
    Form { child_index: usize, form_page: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageStats {
    /// One-based position in the output document.
    pub page_number: usize,
    pub origin: PageOrigin,
    pub command_count: usize,
    pub content_bytes: usize,
}

/// Outcome of writing form fields for one child. Fields the form does not
/// have are skipped and listed in `missing`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldFillReport {
    pub child_index: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub missing: Vec<String>,
}

impl FieldFillReport {
    pub fn new(child_index: usize) -> Self {
        Self {
            child_index,
            ..Self::default()
        }
    }

    pub fn record(&mut self, field: &str, written: bool) {
        self.attempted += 1;
        if written {
            self.succeeded += 1;
        } else {
            self.missing.push(field.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentStats {
    pub pages: Vec<PageStats>,
    pub total_bytes: usize,
    pub field_reports: Vec<FieldFillReport>,
    /// Characters the output encoding could not represent; drawn as `?`.
    pub missing_glyphs: Vec<MissingGlyph>,
}

impl DocumentStats {
    pub fn generated_page_count(&self) -> usize {
        self.pages
            .iter()
            .filter(|page| matches!(page.origin, PageOrigin::Generated { .. }))
            .count()
    }

    pub fn form_pages_for_child(&self, child_index: usize) -> usize {
        self.pages
            .iter()
            .filter(|page| matches!(page.origin, PageOrigin::Form { child_index: c, .. } if c == child_index))
            .count()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_report_counts_attempts() {
        let mut report = FieldFillReport::new(1);
        report.record("child_name", true);
        report.record("no_such_field", false);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.missing, vec!["no_such_field".to_string()]);
    }

    #[test]
    fn stats_serialize_with_origin_kind() {
        let stats = DocumentStats {
            pages: vec![
                PageStats {
                    page_number: 1,
                    origin: PageOrigin::Generated {
                        section: Some("cover".to_string()),
                    },
                    command_count: 10,
                    content_bytes: 200,
                },
                PageStats {
                    page_number: 2,
                    origin: PageOrigin::Form {
                        child_index: 0,
                        form_page: 1,
                    },
                    command_count: 0,
                    content_bytes: 900,
                },
            ],
            ..DocumentStats::default()
        };
        let json = stats.to_json();
        assert_eq!(json["pages"][0]["origin"]["kind"], "generated");
        assert_eq!(json["pages"][1]["origin"]["form_page"], 1);
        assert_eq!(stats.generated_page_count(), 1);
        assert_eq!(stats.form_pages_for_child(0), 1);
        assert_eq!(stats.form_pages_for_child(1), 0);
    }
}
