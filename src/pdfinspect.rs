use crate::error::ContractPressError;
use lopdf::{Document as LoDocument, Object};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormInspectErrorCode {
    ParseFailed,
    EncryptedUnsupported,
    EmptyOrNoPages,
}

impl FormInspectErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormInspectErrorCode::ParseFailed => "FORM_PARSE_FAILED",
            FormInspectErrorCode::EncryptedUnsupported => "FORM_ENCRYPTED_UNSUPPORTED",
            FormInspectErrorCode::EmptyOrNoPages => "FORM_EMPTY_OR_NO_PAGES",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInspectError {
    pub code: FormInspectErrorCode,
    pub message: String,
}

impl std::fmt::Display for FormInspectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for FormInspectError {}

impl From<FormInspectError> for ContractPressError {
    fn from(value: FormInspectError) -> Self {
        ContractPressError::Asset(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInspectWarning {
    pub code: &'static str,
    pub message: String,
}

/// What a candidate form template looks like before it is used for merging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    /// Top-level entries in the AcroForm `Fields` array.
    pub top_level_fields: usize,
    pub warnings: Vec<FormInspectWarning>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<FormInspectReport, FormInspectError> {
    let pdf = LoDocument::load_mem(bytes).map_err(|err| FormInspectError {
        code: FormInspectErrorCode::ParseFailed,
        message: err.to_string(),
    })?;

    let top_level_fields = acroform_field_count(&pdf);
    let mut warnings = Vec::new();
    if top_level_fields == 0 {
        warnings.push(FormInspectWarning {
            code: "FORM_NO_FIELDS",
            message: "pdf has no interactive form fields; every field write will be reported missing"
                .to_string(),
        });
    }

    Ok(FormInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pdf.get_pages().len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        top_level_fields,
        warnings,
    })
}

fn acroform_field_count(pdf: &LoDocument) -> usize {
    let resolve = |object: &Object| -> Option<Object> {
        match object {
            Object::Reference(id) => pdf.get_object(*id).ok().cloned(),
            other => Some(other.clone()),
        }
    };
    pdf.catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"AcroForm").ok())
        .and_then(resolve)
        .and_then(|acroform| acroform.as_dict().ok().and_then(|d| d.get(b"Fields").ok().cloned()))
        .and_then(|fields| resolve(&fields))
        .and_then(|fields| fields.as_array().ok().map(Vec::len))
        .unwrap_or(0)
}

pub fn merge_compatibility_issues(report: &FormInspectReport) -> Vec<FormInspectErrorCode> {
    let mut issues = Vec::new();
    if report.encrypted {
        issues.push(FormInspectErrorCode::EncryptedUnsupported);
    }
    if report.page_count == 0 {
        issues.push(FormInspectErrorCode::EmptyOrNoPages);
    }
    issues
}

pub fn require_pdf_composition_compatibility(
    report: &FormInspectReport,
) -> Result<(), FormInspectError> {
    match merge_compatibility_issues(report).first() {
        Some(FormInspectErrorCode::EncryptedUnsupported) => Err(FormInspectError {
            code: FormInspectErrorCode::EncryptedUnsupported,
            message: "encrypted form templates are not supported".to_string(),
        }),
        Some(FormInspectErrorCode::EmptyOrNoPages) => Err(FormInspectError {
            code: FormInspectErrorCode::EmptyOrNoPages,
            message: "form template has no pages".to_string(),
        }),
        _ => Ok(()),
    }
}
