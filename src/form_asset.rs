//! The fillable enrollment form bundled with the engine.
//!
//! Four letter-size pages: enrollment (child and guardians), medical
//! authorization, release authorization and an office-use sheet. The first
//! page carries an office band whose guide text is masked and replaced during
//! the per-child merge.

use crate::error::ContractPressError;
use crate::pdf::{fmt_pt, push_literal_string};
use crate::types::{Pt, Rect, Size};
use lopdf::{Document as LoDocument, Object, ObjectId, Stream, dictionary};
use std::sync::{Arc, OnceLock};

pub(crate) const GUARDIAN_SLOTS: [&str; 3] = ["father", "mother", "guardian"];
pub(crate) const RELEASE_SLOTS: usize = 3;
pub(crate) const EMERGENCY_SLOTS: usize = 2;

pub(crate) const OFFICE_BAND_PAGE: usize = 0;
const OFFICE_BAND_BASELINE: f32 = 712.0;
/// (label, label x, value x, value right edge)
const OFFICE_BAND: [(&str, f32, f32, f32); 3] = [
    ("Classroom:", 54.0, 110.0, 196.0),
    ("Child:", 202.0, 232.0, 376.0),
    ("Guardians:", 382.0, 430.0, 558.0),
];

const FIELD_WIDTH: f32 = 240.0;
const FIELD_HEIGHT: f32 = 14.0;
const COLUMN_X: [f32; 2] = [54.0, 318.0];
const FIRST_ROW_Y: f32 = 660.0;
const ROW_STEP: f32 = 30.0;
const CHECK_SIZE: f32 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Check,
}

struct FieldSpec {
    name: String,
    label: String,
    kind: FieldKind,
}

impl FieldSpec {
    fn text(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: FieldKind::Text,
        }
    }

    fn check(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            kind: FieldKind::Check,
        }
    }
}

struct PageSpec {
    title: &'static str,
    fields: Vec<FieldSpec>,
    office_band: bool,
}

/// Rectangles that hide the office band guide text, in PDF user space.
pub(crate) fn office_band_overlays() -> Vec<Rect> {
    OFFICE_BAND
        .iter()
        .map(|(_, _, x, right)| Rect::from_f32(x - 2.0, OFFICE_BAND_BASELINE - 6.0, right - x + 4.0, 18.0))
        .collect()
}

/// Baseline origins for classroom, child name and guardian names.
pub(crate) fn office_band_anchors() -> [(Pt, Pt); 3] {
    OFFICE_BAND.map(|(_, _, x, _)| (Pt::from_f32(x), Pt::from_f32(OFFICE_BAND_BASELINE)))
}

fn guardian_fields(slot: &str, title: &str) -> Vec<FieldSpec> {
    vec![
        FieldSpec::text(format!("{slot}_name"), format!("{title}: first name")),
        FieldSpec::text(format!("{slot}_last_name"), format!("{title}: last name")),
        FieldSpec::text(format!("{slot}_address"), format!("{title}: home address")),
        FieldSpec::text(format!("{slot}_city"), format!("{title}: city")),
        FieldSpec::text(format!("{slot}_phone"), format!("{title}: phone")),
        FieldSpec::text(format!("{slot}_email"), format!("{title}: email")),
        FieldSpec::text(format!("{slot}_employer"), format!("{title}: employer")),
        FieldSpec::text(format!("{slot}_work_address"), format!("{title}: work address")),
        FieldSpec::text(format!("{slot}_work_city"), format!("{title}: work city")),
        FieldSpec::text(format!("{slot}_work_phone"), format!("{title}: work phone")),
    ]
}

fn page_specs() -> Vec<PageSpec> {
    let mut enrollment = vec![
        FieldSpec::text("child_name", "Child: first name"),
        FieldSpec::text("child_last_name", "Child: last name"),
        FieldSpec::text("child_born_date", "Child: date of birth"),
    ];
    for (slot, title) in GUARDIAN_SLOTS.iter().zip(["Father", "Mother", "Guardian"]) {
        enrollment.extend(guardian_fields(slot, title));
    }

    let medical = vec![
        FieldSpec::text("doctor_name", "Physician name"),
        FieldSpec::text("doctor_phone", "Physician phone"),
        FieldSpec::text("doctor_address", "Physician address"),
        FieldSpec::text("health_status", "General health"),
        FieldSpec::text("allergies", "Allergies"),
        FieldSpec::text("treatment", "Current treatment"),
        FieldSpec::text("feeding_schedule", "Feeding schedule"),
        FieldSpec::text("formula_brand", "Formula brand"),
        FieldSpec::text("formula_amount", "Formula amount"),
        FieldSpec::text("formula_frequency", "Formula frequency"),
        FieldSpec::check("product_sunscreen", "Sunscreen"),
        FieldSpec::check("product_insect_repellent", "Insect repellent"),
        FieldSpec::check("product_diaper_cream", "Diaper cream"),
        FieldSpec::check("product_hand_sanitizer", "Hand sanitizer"),
    ];

    let mut release = Vec::new();
    for slot in 1..=RELEASE_SLOTS {
        release.push(FieldSpec::text(format!("release_{slot}_name"), format!("Release to #{slot}: name")));
        release.push(FieldSpec::text(format!("release_{slot}_phone"), format!("Release to #{slot}: phone")));
        release.push(FieldSpec::text(
            format!("release_{slot}_relationship"),
            format!("Release to #{slot}: relationship"),
        ));
    }
    for slot in 1..=EMERGENCY_SLOTS {
        release.push(FieldSpec::text(format!("emergency_{slot}_name"), format!("Emergency contact #{slot}")));
        release.push(FieldSpec::text(format!("emergency_{slot}_phone"), format!("Emergency phone #{slot}")));
    }
    release.extend([
        FieldSpec::check("permission_photos", "Photos allowed"),
        FieldSpec::check("permission_field_trips", "Field trips allowed"),
        FieldSpec::check("permission_water_play", "Water play allowed"),
        FieldSpec::text("parent_signature_date", "Parent signature / date"),
        FieldSpec::text("director_signature_date", "Director signature / date"),
    ]);

    let office = vec![
        FieldSpec::text("office_received_by", "Received by"),
        FieldSpec::text("office_received_date", "Received on"),
        FieldSpec::text("office_notes", "Notes"),
    ];

    vec![
        PageSpec { title: "Enrollment Information", fields: enrollment, office_band: true },
        PageSpec { title: "Medical Authorization", fields: medical, office_band: false },
        PageSpec { title: "Release Authorization", fields: release, office_band: false },
        PageSpec { title: "Office Use Only", fields: office, office_band: false },
    ]
}

fn cell_origin(index: usize) -> (f32, f32) {
    let row = index / COLUMN_X.len();
    let column = index % COLUMN_X.len();
    (COLUMN_X[column], FIRST_ROW_Y - ROW_STEP * row as f32)
}

fn rect_object(x1: f32, y1: f32, x2: f32, y2: f32) -> Vec<Object> {
    [x1, y1, x2, y2]
        .into_iter()
        .map(|v| Object::Real(v.into()))
        .collect()
}

fn push_text(out: &mut Vec<u8>, font: &str, size: f32, x: f32, y: f32, text: &str) {
    out.extend_from_slice(
        format!(
            "BT\n/{font} {} Tf\n{} {} Td\n",
            fmt_pt(Pt::from_f32(size)),
            fmt_pt(Pt::from_f32(x)),
            fmt_pt(Pt::from_f32(y))
        )
        .as_bytes(),
    );
    push_literal_string(out, text.as_bytes());
    out.extend_from_slice(b" Tj\nET\n");
}

fn push_box(out: &mut Vec<u8>, x: f32, y: f32, w: f32, h: f32) {
    out.extend_from_slice(
        format!(
            "{} {} {} {} re\nS\n",
            fmt_pt(Pt::from_f32(x)),
            fmt_pt(Pt::from_f32(y)),
            fmt_pt(Pt::from_f32(w)),
            fmt_pt(Pt::from_f32(h))
        )
        .as_bytes(),
    );
}

fn page_content(page_number: usize, spec: &PageSpec) -> Vec<u8> {
    let mut out = b"0 g\n".to_vec();
    push_text(&mut out, "F2", 16.0, 54.0, 750.0, spec.title);
    push_text(
        &mut out,
        "F1",
        8.0,
        500.0,
        36.0,
        &format!("Enrollment form, page {page_number}"),
    );
    if spec.office_band {
        for (label, label_x, value_x, right) in OFFICE_BAND {
            push_text(&mut out, "F2", 9.0, label_x, OFFICE_BAND_BASELINE, label);
            out.extend_from_slice(b"q\n0.6 g\n");
            push_text(&mut out, "F1", 7.0, value_x, OFFICE_BAND_BASELINE, "office use");
            out.extend_from_slice(
                format!(
                    "0.6 G\n[1 2] 0 d\n{} {} m\n{} {} l\nS\nQ\n",
                    fmt_pt(Pt::from_f32(value_x)),
                    fmt_pt(Pt::from_f32(OFFICE_BAND_BASELINE - 3.0)),
                    fmt_pt(Pt::from_f32(right)),
                    fmt_pt(Pt::from_f32(OFFICE_BAND_BASELINE - 3.0))
                )
                .as_bytes(),
            );
        }
    }
    out.extend_from_slice(b"0.5 G\n0.5 w\n");
    for (index, field) in spec.fields.iter().enumerate() {
        let (x, y) = cell_origin(index);
        match field.kind {
            FieldKind::Text => {
                push_text(&mut out, "F1", 7.0, x, y + FIELD_HEIGHT + 3.0, &field.label);
                push_box(&mut out, x, y, FIELD_WIDTH, FIELD_HEIGHT);
            }
            FieldKind::Check => {
                push_box(&mut out, x, y + 1.0, CHECK_SIZE, CHECK_SIZE);
                push_text(&mut out, "F1", 9.0, x + CHECK_SIZE + 6.0, y + 4.0, &field.label);
            }
        }
    }
    out
}

fn build_form() -> Result<Vec<u8>, ContractPressError> {
    let size = Size::letter();
    let mut doc = LoDocument::with_version("1.7");
    let pages_id = doc.new_object_id();

    let helvetica = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let helvetica_bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });
    let dingbats = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "ZapfDingbats",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => helvetica, "F2" => helvetica_bold },
    });
    let check_on = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => rect_object(0.0, 0.0, CHECK_SIZE, CHECK_SIZE),
            "Resources" => dictionary! { "Font" => dictionary! { "ZaDb" => dingbats } },
        },
        b"q\n0 g\nBT\n/ZaDb 9 Tf\n2 2.5 Td\n(4) Tj\nET\nQ\n".to_vec(),
    ));
    let check_off = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => rect_object(0.0, 0.0, CHECK_SIZE, CHECK_SIZE),
        },
        Vec::new(),
    ));

    let mut kids: Vec<Object> = Vec::new();
    let mut fields: Vec<Object> = Vec::new();
    for (index, spec) in page_specs().iter().enumerate() {
        let page_id = doc.new_object_id();
        let mut annots: Vec<Object> = Vec::new();
        for (cell, field) in spec.fields.iter().enumerate() {
            let (x, y) = cell_origin(cell);
            let widget = match field.kind {
                FieldKind::Text => dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Widget",
                    "FT" => "Tx",
                    "T" => Object::string_literal(field.name.as_str()),
                    "TU" => Object::string_literal(field.label.as_str()),
                    "Rect" => rect_object(x, y, x + FIELD_WIDTH, y + FIELD_HEIGHT),
                    "F" => 4,
                    "P" => page_id,
                    "DA" => Object::string_literal("/Helv 9 Tf 0 g"),
                },
                FieldKind::Check => dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "Widget",
                    "FT" => "Btn",
                    "T" => Object::string_literal(field.name.as_str()),
                    "TU" => Object::string_literal(field.label.as_str()),
                    "Rect" => rect_object(x, y + 1.0, x + CHECK_SIZE, y + 1.0 + CHECK_SIZE),
                    "F" => 4,
                    "P" => page_id,
                    "V" => "Off",
                    "AS" => "Off",
                    "AP" => dictionary! {
                        "N" => dictionary! { "Yes" => check_on, "Off" => check_off },
                    },
                },
            };
            let widget_id = doc.add_object(widget);
            annots.push(Object::Reference(widget_id));
            fields.push(Object::Reference(widget_id));
        }
        let content_id = doc.add_object(Stream::new(dictionary! {}, page_content(index + 1, spec)));
        let page = page_dictionary(pages_id, content_id, resources, annots);
        doc.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "MediaBox" => rect_object(0.0, 0.0, size.width.to_f32(), size.height.to_f32()),
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "AcroForm" => dictionary! {
            "Fields" => fields,
            "NeedAppearances" => true,
            "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
            "DR" => dictionary! {
                "Font" => dictionary! { "Helv" => helvetica, "ZaDb" => dingbats },
            },
        },
    });
    doc.trailer.set("Root", catalog);
    doc.compress();

    let mut out = Vec::new();
    doc.save_to(&mut out)?;
    Ok(out)
}

fn page_dictionary(
    pages_id: ObjectId,
    content_id: ObjectId,
    resources: ObjectId,
    annots: Vec<Object>,
) -> lopdf::Dictionary {
    dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources,
        "Annots" => annots,
    }
}

static BUNDLED_FORM: OnceLock<Result<Arc<[u8]>, String>> = OnceLock::new();

/// Bytes of the bundled form, generated once per process.
pub(crate) fn bundled_form_bytes() -> Result<Arc<[u8]>, ContractPressError> {
    BUNDLED_FORM
        .get_or_init(|| build_form().map(Arc::from).map_err(|err| err.to_string()))
        .clone()
        .map_err(ContractPressError::Asset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormAsset;
    use crate::pdfinspect::inspect_pdf_bytes;

    #[test]
    fn bundled_form_has_four_pages_and_named_fields() {
        let bytes = bundled_form_bytes().expect("bundled");
        let report = inspect_pdf_bytes(&bytes).expect("inspect");
        assert_eq!(report.page_count, 4);
        assert!(report.warnings.is_empty());

        let asset = FormAsset::from_bytes(bytes).expect("asset");
        let names = asset.field_names();
        for expected in [
            "child_name",
            "father_work_phone",
            "mother_email",
            "guardian_employer",
            "product_sunscreen",
            "release_3_relationship",
            "parent_signature_date",
            "director_signature_date",
            "office_notes",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }

    #[test]
    fn bundled_bytes_are_shared() {
        let first = bundled_form_bytes().expect("first");
        let second = bundled_form_bytes().expect("second");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn every_field_fits_on_its_page() {
        for spec in page_specs() {
            for index in 0..spec.fields.len() {
                let (_, y) = cell_origin(index);
                assert!(y > 60.0, "{} overflows at field {index}", spec.title);
            }
        }
    }

    #[test]
    fn office_overlays_cover_the_band_values() {
        let overlays = office_band_overlays();
        let anchors = office_band_anchors();
        for (rect, (x, y)) in overlays.iter().zip(anchors) {
            assert!(rect.x < x && x < rect.right());
            assert!(rect.y < y && y < rect.y + rect.height);
        }
    }
}
