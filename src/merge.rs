use crate::debug::DebugLogger;
use crate::error::ContractPressError;
use crate::font::FontRegistry;
use crate::form::{FieldValue, FormAsset, FormInstance};
use crate::form_asset::{
    EMERGENCY_SLOTS, OFFICE_BAND_PAGE, RELEASE_SLOTS, office_band_anchors, office_band_overlays,
};
use crate::metrics::FieldFillReport;
use crate::model::{Child, ContractRecord, Guardian, Language};
use crate::types::{Pt, Rect};
use chrono::NaiveDate;
use lopdf::Document as LoDocument;

const NOT_APPLICABLE: &str = "N/A";

/// Fixed geometry for turning one form instance into output pages.
#[derive(Debug, Clone, PartialEq)]
pub struct FormMergePlan {
    /// Zero-based form pages copied into the output, in order.
    pub kept_pages: Vec<usize>,
    /// Page that receives the white overlays and the manual text.
    pub overlay_page: usize,
    /// Overlay rectangles in PDF user space (origin bottom-left).
    pub overlay_rects: Vec<Rect>,
    pub classroom_at: (Pt, Pt),
    pub child_name_at: (Pt, Pt),
    pub guardian_names_at: (Pt, Pt),
    pub manual_font_size: Pt,
    pub parent_date_padding: usize,
    pub director_date_padding: usize,
}

impl FormMergePlan {
    /// Plan matching the bundled enrollment form.
    pub fn bundled() -> Self {
        let [classroom_at, child_name_at, guardian_names_at] = office_band_anchors();
        Self {
            kept_pages: vec![0, 1, 2],
            overlay_page: OFFICE_BAND_PAGE,
            overlay_rects: office_band_overlays(),
            classroom_at,
            child_name_at,
            guardian_names_at,
            manual_font_size: Pt::from_f32(9.0),
            parent_date_padding: 12,
            director_date_padding: 6,
        }
    }
}

impl Default for FormMergePlan {
    fn default() -> Self {
        Self::bundled()
    }
}

/// Shared, read-only inputs for merging every child of one contract.
pub(crate) struct MergeContext<'a> {
    pub fonts: &'a FontRegistry,
    pub contract: &'a ContractRecord,
    pub plan: &'a FormMergePlan,
    pub language: Language,
    pub today: NaiveDate,
    pub debug: Option<&'a DebugLogger>,
}

/// One child's flattened form, ready for page extraction.
pub(crate) struct ChildMergeOutput {
    pub document: LoDocument,
    pub pages: Vec<usize>,
    pub report: FieldFillReport,
}

/// Which guardians land in the father and mother slots.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GuardianSlots<'a> {
    pub father: Option<&'a Guardian>,
    pub mother: Option<&'a Guardian>,
    pub guardian: Option<&'a Guardian>,
}

/// A generic guardian first fills a missing father slot; only after that, when
/// the father slot is filled and no mother exists, it fills the mother slot too.
pub(crate) fn resolve_guardian_slots(contract: &ContractRecord) -> GuardianSlots<'_> {
    let generic = contract.generic_guardian();
    let mut father = contract.father();
    let mut mother = contract.mother();
    if father.is_none() && generic.is_some() {
        father = generic;
    }
    if father.is_some() && mother.is_none() {
        mother = generic;
    }
    GuardianSlots {
        father,
        mother,
        guardian: generic,
    }
}

struct FieldWriter<'f> {
    form: &'f mut FormInstance,
    report: FieldFillReport,
}

impl FieldWriter<'_> {
    fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        let written = self.form.try_set_field(name, value);
        if !written {
            log::debug!(
                "form field {name} not written for child {}",
                self.report.child_index
            );
        }
        self.report.record(name, written);
    }

    fn text(&mut self, name: &str, value: &str) {
        self.set(name, value.trim());
    }
}

/// Loads a private form instance, fills it for `child`, flattens it and
/// applies the fixed overlays and manual text.
pub(crate) fn merge_child(
    asset: &FormAsset,
    ctx: &MergeContext<'_>,
    child: &Child,
    child_index: usize,
) -> Result<ChildMergeOutput, ContractPressError> {
    let mut form = asset.instantiate()?;
    let (report, slots) = fill_form(&mut form, ctx, child, child_index);

    form.flatten(ctx.fonts)?;
    let plan = ctx.plan;
    form.overlay_rects(plan.overlay_page, &plan.overlay_rects)?;
    let guardian_names = guardian_slot_names(&slots);
    for ((x, y), text) in [
        (plan.classroom_at, child.classroom.trim().to_string()),
        (plan.child_name_at, child.full_name()),
        (plan.guardian_names_at, guardian_names),
    ] {
        if !text.is_empty() {
            form.draw_text(plan.overlay_page, x, y, plan.manual_font_size, &text)?;
        }
    }

    if let Some(debug) = ctx.debug {
        for field in &report.missing {
            debug.event(
                "form.field_missing",
                serde_json::json!({ "child_index": child_index, "field": field }),
            );
        }
        debug.event(
            "merge.child",
            serde_json::json!({
                "child_index": child_index,
                "attempted": report.attempted,
                "succeeded": report.succeeded,
                "pages": plan.kept_pages,
            }),
        );
        debug.increment("form.fields_written", report.succeeded as u64);
    }
    log::debug!(
        "merged form for child {} ({}/{} fields)",
        child_index,
        report.succeeded,
        report.attempted
    );

    Ok(ChildMergeOutput {
        document: form.into_document(),
        pages: plan.kept_pages.clone(),
        report,
    })
}

/// Writes every field of one child's form; nothing is flattened yet.
fn fill_form<'a>(
    form: &mut FormInstance,
    ctx: &MergeContext<'a>,
    child: &Child,
    child_index: usize,
) -> (FieldFillReport, GuardianSlots<'a>) {
    let mut writer = FieldWriter {
        form,
        report: FieldFillReport::new(child_index),
    };
    fill_child(&mut writer, ctx, child);
    let slots = resolve_guardian_slots(ctx.contract);
    fill_guardian(&mut writer, "father", slots.father);
    fill_guardian(&mut writer, "mother", slots.mother);
    fill_guardian(&mut writer, "guardian", slots.guardian);
    fill_medical(&mut writer, child);
    fill_release(&mut writer, child);
    fill_signature_dates(&mut writer, ctx);
    (writer.report, slots)
}

fn fill_child(writer: &mut FieldWriter<'_>, ctx: &MergeContext<'_>, child: &Child) {
    writer.text("child_name", &child.name);
    writer.text("child_last_name", &child.last_name);
    let born = child
        .born_date
        .map(|date| ctx.language.format_date(date))
        .unwrap_or_default();
    writer.text("child_born_date", &born);
}

fn fill_guardian(writer: &mut FieldWriter<'_>, slot: &str, guardian: Option<&Guardian>) {
    let Some(guardian) = guardian else {
        return;
    };
    let work = &guardian.work;
    for (suffix, value) in [
        ("name", &guardian.name),
        ("last_name", &guardian.last_name),
        ("address", &guardian.address),
        ("city", &guardian.city),
        ("phone", &guardian.phone),
        ("email", &guardian.email),
        ("employer", &work.employer),
        ("work_address", &work.address),
        ("work_city", &work.city),
        ("work_phone", &work.phone),
    ] {
        writer.text(&format!("{slot}_{suffix}"), value);
    }
}

fn fill_medical(writer: &mut FieldWriter<'_>, child: &Child) {
    let medical = &child.medical;
    writer.text("doctor_name", &medical.doctor_name);
    writer.text("doctor_phone", &medical.doctor_phone);
    writer.text("doctor_address", &medical.doctor_address);
    writer.text("health_status", &medical.health_status);
    writer.text("allergies", &medical.allergies);
    writer.text("treatment", &medical.treatment);
    writer.text("feeding_schedule", &medical.feeding_schedule);
    if let Some(formula) = &child.formula {
        writer.text("formula_brand", &formula.brand);
        writer.text("formula_amount", &formula.amount);
        writer.text("formula_frequency", &formula.frequency);
    }
    let products = &medical.products;
    writer.set("product_sunscreen", products.sunscreen);
    writer.set("product_insect_repellent", products.insect_repellent);
    writer.set("product_diaper_cream", products.diaper_cream);
    writer.set("product_hand_sanitizer", products.hand_sanitizer);
    writer.set("permission_photos", child.permissions.photos);
    writer.set("permission_field_trips", child.permissions.field_trips);
    writer.set("permission_water_play", child.permissions.water_play);
}

fn fill_release(writer: &mut FieldWriter<'_>, child: &Child) {
    for slot in 0..RELEASE_SLOTS {
        let prefix = format!("release_{}", slot + 1);
        match child.released_to.get(slot) {
            Some(contact) => {
                writer.text(&format!("{prefix}_name"), &contact.name);
                writer.text(&format!("{prefix}_phone"), &contact.phone);
                writer.text(&format!("{prefix}_relationship"), &contact.relationship);
            }
            None => {
                for suffix in ["name", "phone", "relationship"] {
                    writer.text(&format!("{prefix}_{suffix}"), NOT_APPLICABLE);
                }
            }
        }
    }
    for (slot, contact) in child.emergency_contacts.iter().take(EMERGENCY_SLOTS).enumerate() {
        writer.text(&format!("emergency_{}_name", slot + 1), &contact.name);
        writer.text(&format!("emergency_{}_phone", slot + 1), &contact.phone);
    }
}

fn fill_signature_dates(writer: &mut FieldWriter<'_>, ctx: &MergeContext<'_>) {
    let date = ctx.language.format_date(ctx.today);
    let parent = format!("{}{date}", " ".repeat(ctx.plan.parent_date_padding));
    let director = format!("{}{date}", " ".repeat(ctx.plan.director_date_padding));
    // padding is part of the value; no trim
    writer.set("parent_signature_date", parent);
    writer.set("director_signature_date", director);
}

fn guardian_slot_names(slots: &GuardianSlots<'_>) -> String {
    let mut names: Vec<String> = Vec::new();
    for guardian in [slots.father, slots.mother].into_iter().flatten() {
        let name = guardian.full_name();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names.join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form_asset::bundled_form_bytes;
    use crate::model::{GuardianRole, fixtures};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    fn bundled_asset() -> FormAsset {
        FormAsset::from_bytes(bundled_form_bytes().expect("bytes")).expect("asset")
    }

    fn page_text(doc: &LoDocument, index: usize) -> String {
        let page_id = *doc.get_pages().values().nth(index).expect("page");
        String::from_utf8_lossy(&doc.get_page_content(page_id).expect("content")).into_owned()
    }

    fn merge(contract: &ContractRecord, index: usize) -> ChildMergeOutput {
        let fonts = FontRegistry::new();
        let plan = FormMergePlan::bundled();
        let ctx = MergeContext {
            fonts: &fonts,
            contract,
            plan: &plan,
            language: Language::En,
            today: today(),
            debug: None,
        };
        merge_child(&bundled_asset(), &ctx, &contract.children[index], index).expect("merge")
    }

    #[test]
    fn only_generic_guardian_fills_father_then_mother() {
        let mut contract = fixtures::contract(1);
        contract.guardians = vec![fixtures::guardian("Rosa", "Diaz", GuardianRole::Other)];
        let slots = resolve_guardian_slots(&contract);
        assert_eq!(slots.father.map(|g| g.name.as_str()), Some("Rosa"));
        assert_eq!(slots.mother.map(|g| g.name.as_str()), Some("Rosa"));
        assert_eq!(slots.guardian.map(|g| g.name.as_str()), Some("Rosa"));
    }

    #[test]
    fn father_and_generic_guardian_fill_mother_slot() {
        let mut contract = fixtures::contract(1);
        contract.guardians = vec![
            fixtures::guardian("Jose", "Lopez", GuardianRole::Father),
            fixtures::guardian("Rosa", "Diaz", GuardianRole::Other),
        ];
        let slots = resolve_guardian_slots(&contract);
        assert_eq!(slots.father.map(|g| g.name.as_str()), Some("Jose"));
        assert_eq!(slots.mother.map(|g| g.name.as_str()), Some("Rosa"));
    }

    #[test]
    fn mother_only_leaves_father_empty() {
        let mut contract = fixtures::contract(1);
        contract.guardians = vec![fixtures::guardian("Maria", "Lopez", GuardianRole::Mother)];
        let slots = resolve_guardian_slots(&contract);
        assert!(slots.father.is_none());
        assert_eq!(slots.mother.map(|g| g.name.as_str()), Some("Maria"));
        assert!(slots.guardian.is_none());
    }

    #[test]
    fn each_child_gets_its_own_values() {
        let contract = fixtures::contract(2);
        let first = merge(&contract, 0);
        let second = merge(&contract, 1);

        let first_text = page_text(&first.document, 0);
        let second_text = page_text(&second.document, 0);
        assert!(first_text.contains("(Ana) Tj"));
        assert!(!first_text.contains("(Luis) Tj"));
        assert!(second_text.contains("(Luis) Tj"));
        assert!(!second_text.contains("(Ana) Tj"));
        assert!(page_text(&second.document, 1).contains("(Luis pollen) Tj"));
        assert_eq!(first.report.child_index, 0);
        assert_eq!(second.report.child_index, 1);
    }

    #[test]
    fn fills_known_fields_and_pads_dates() {
        let contract = fixtures::contract(1);
        let output = merge(&contract, 0);
        assert!(output.report.missing.is_empty(), "{:?}", output.report.missing);
        assert_eq!(output.report.attempted, output.report.succeeded);
        assert_eq!(output.pages, vec![0, 1, 2]);

        let release = page_text(&output.document, 2);
        assert!(release.contains("(Ana Grandma) Tj"));
        assert!(release.contains("(N/A) Tj"));
        assert!(release.contains(&format!("({}10/18/2026) Tj", " ".repeat(12))));
        assert!(release.contains(&format!("({}10/18/2026) Tj", " ".repeat(6))));
    }

    #[test]
    fn manual_text_is_drawn_after_overlays() {
        let contract = fixtures::contract(1);
        let output = merge(&contract, 0);
        let text = page_text(&output.document, OFFICE_BAND_PAGE);
        let overlay = text.find("1 1 1 rg").expect("overlay");
        let classroom = text.find("(Ana Room) Tj").expect("classroom");
        let names = text.find("(Jose Lopez / Maria Lopez) Tj").expect("guardian names");
        assert!(overlay < classroom && classroom < names);
        assert!(text.contains("(Ana Lopez) Tj"));
    }

    #[test]
    fn missing_fields_are_counted_not_fatal() {
        let fonts = FontRegistry::new();
        let plan = FormMergePlan {
            kept_pages: vec![0],
            overlay_page: 0,
            overlay_rects: Vec::new(),
            ..FormMergePlan::bundled()
        };
        let contract = fixtures::contract(1);
        let ctx = MergeContext {
            fonts: &fonts,
            contract: &contract,
            plan: &plan,
            language: Language::Es,
            today: today(),
            debug: None,
        };
        let asset = FormAsset::from_bytes(crate::form::fixtures::small_form_bytes()).expect("asset");
        let output = merge_child(&asset, &ctx, &contract.children[0], 0).expect("merge");
        assert_eq!(output.report.succeeded, 0);
        assert!(output.report.missing.contains(&"child_name".to_string()));
        assert_eq!(output.report.missing.len(), output.report.attempted);
    }

    #[test]
    fn generic_guardian_values_land_in_mother_fields() {
        let contract = fixtures::weekday_contract(2);
        let fonts = FontRegistry::new();
        let plan = FormMergePlan::bundled();
        let ctx = MergeContext {
            fonts: &fonts,
            contract: &contract,
            plan: &plan,
            language: Language::En,
            today: today(),
            debug: None,
        };
        let asset = bundled_asset();
        for (index, child) in contract.children.iter().enumerate() {
            let mut form = asset.instantiate().expect("instance");
            let (report, _) = fill_form(&mut form, &ctx, child, index);
            assert!(report.missing.is_empty(), "{:?}", report.missing);
            let text = |name: &str| form.value(name).cloned();
            assert_eq!(text("father_name"), Some(FieldValue::Text("Jose".to_string())));
            assert_eq!(text("mother_name"), Some(FieldValue::Text("Rosa".to_string())));
            assert_eq!(text("mother_last_name"), Some(FieldValue::Text("Diaz".to_string())));
            assert_eq!(
                text("mother_employer"),
                Some(FieldValue::Text("Rosa Works".to_string()))
            );
            assert_eq!(text("guardian_name"), Some(FieldValue::Text("Rosa".to_string())));
        }

        let output = merge(&contract, 1);
        let office = page_text(&output.document, OFFICE_BAND_PAGE);
        assert!(office.contains("(Jose Lopez / Rosa Diaz) Tj"), "{office}");
    }

    #[test]
    fn checkbox_values_reach_the_form() {
        let asset = bundled_asset();
        let mut form = asset.instantiate().expect("instance");
        let mut writer = FieldWriter {
            form: &mut form,
            report: FieldFillReport::new(0),
        };
        fill_medical(&mut writer, &fixtures::child("Ana", "Lopez"));
        assert_eq!(form.value("product_sunscreen"), Some(&FieldValue::Check(true)));
        assert_eq!(
            form.value("product_insect_repellent"),
            Some(&FieldValue::Check(false))
        );
    }
}
