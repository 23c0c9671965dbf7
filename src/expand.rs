use crate::content::{ContentNode, ContentTemplate, TemplateNode};
use crate::inline::checkbox_token;
use crate::model::{Child, ContractRecord, Language, format_money};
use chrono::NaiveDate;
use std::collections::HashMap;

pub(crate) type Substitutions = HashMap<&'static str, String>;

/// Expands the named page into renderable nodes. Returns `None` when the
/// template has no page of that name.
///
/// Contract-level placeholders resolve everywhere; inside a child iteration
/// the child's own keys take precedence. Unknown keys become empty strings.
pub fn expand_page(
    template: &ContentTemplate,
    page: &str,
    contract: &ContractRecord,
    language: Language,
    today: NaiveDate,
) -> Option<Vec<ContentNode>> {
    let page = template.page(page)?;
    let contract_scope = contract_substitutions(contract, language, today);
    let mut out = Vec::new();
    for node in &page.nodes {
        match node {
            TemplateNode::Content(node) => {
                out.push(node.map_text(&|text: &str| substitute(text, &[&contract_scope])));
            }
            TemplateNode::ChildIteration { child_iteration } => {
                for node in &child_iteration.start {
                    out.push(node.map_text(&|text: &str| substitute(text, &[&contract_scope])));
                }
                for (index, child) in contract.children.iter().enumerate() {
                    let child_scope = child_substitutions(child, index, language);
                    for node in &child_iteration.body {
                        out.push(
                            node.map_text(&|text: &str| substitute(text, &[&child_scope, &contract_scope])),
                        );
                    }
                }
                for node in &child_iteration.end {
                    out.push(node.map_text(&|text: &str| substitute(text, &[&contract_scope])));
                }
            }
        }
    }
    Some(out)
}

/// Replaces every `{{key}}` in `text`, looking keys up in `scopes` in order.
/// An opening brace pair without a closing pair is kept verbatim.
pub(crate) fn substitute(text: &str, scopes: &[&Substitutions]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = after[..close].trim();
        if let Some(value) = scopes.iter().find_map(|scope| scope.get(key)) {
            out.push_str(value);
        }
        rest = &after[close + 2..];
    }
    out.push_str(rest);
    out
}

fn format_optional_date(date: Option<NaiveDate>, language: Language) -> String {
    date.map(|d| language.format_date(d)).unwrap_or_default()
}

pub(crate) fn contract_substitutions(
    contract: &ContractRecord,
    language: Language,
    today: NaiveDate,
) -> Substitutions {
    let mut map = Substitutions::new();
    map.insert("titularName", contract.titular_name.trim().to_string());
    map.insert("guardianNames", contract.guardian_names());
    map.insert("childrenNames", contract.children_names());
    map.insert("childCount", contract.children.len().to_string());
    map.insert("startDate", format_optional_date(contract.start_date, language));
    map.insert("endDate", format_optional_date(contract.end_date, language));
    map.insert("today", language.format_date(today));
    map.insert("paymentAmount", format_money(contract.payment.amount));
    map.insert(
        "registrationFee",
        format_money(contract.payment.registration_fee),
    );
    map.insert(
        "paymentMethod",
        contract
            .payment
            .method
            .map(|m| m.label(language).to_string())
            .unwrap_or_default(),
    );
    map.insert(
        "paymentFrequency",
        contract.payment.frequency.label(language).to_string(),
    );
    for (day, schedule) in contract.schedule.days() {
        map.insert(schedule_key(day, true), schedule.check_in.trim().to_string());
        map.insert(schedule_key(day, false), schedule.check_out.trim().to_string());
    }
    map.insert("scheduleSummary", contract.schedule.summary(language));
    map.insert("photoPermission", checkbox_token(contract.permissions.photos));
    map.insert(
        "fieldTripPermission",
        checkbox_token(contract.permissions.field_trips),
    );
    map.insert(
        "termsAccepted",
        checkbox_token(contract.permissions.terms_accepted),
    );
    map
}

fn schedule_key(day: &str, check_in: bool) -> &'static str {
    match (day, check_in) {
        ("Monday", true) => "scheduleMondayIn",
        ("Monday", false) => "scheduleMondayOut",
        ("Tuesday", true) => "scheduleTuesdayIn",
        ("Tuesday", false) => "scheduleTuesdayOut",
        ("Wednesday", true) => "scheduleWednesdayIn",
        ("Wednesday", false) => "scheduleWednesdayOut",
        ("Thursday", true) => "scheduleThursdayIn",
        ("Thursday", false) => "scheduleThursdayOut",
        ("Friday", true) => "scheduleFridayIn",
        _ => "scheduleFridayOut",
    }
}

pub(crate) fn child_substitutions(child: &Child, index: usize, language: Language) -> Substitutions {
    let medical = &child.medical;
    let products = &medical.products;
    let formula = child.formula.clone().unwrap_or_default();
    let mut map = Substitutions::new();
    map.insert("childIndex", (index + 1).to_string());
    map.insert("childName", child.name.trim().to_string());
    map.insert("childLastName", child.last_name.trim().to_string());
    map.insert("childFullName", child.full_name());
    map.insert("childBornDate", format_optional_date(child.born_date, language));
    map.insert("classroom", child.classroom.trim().to_string());
    map.insert("healthStatus", medical.health_status.clone());
    map.insert("allergies", medical.allergies.clone());
    map.insert("treatment", medical.treatment.clone());
    map.insert("feedingSchedule", medical.feeding_schedule.clone());
    map.insert("doctorName", medical.doctor_name.clone());
    map.insert("doctorPhone", medical.doctor_phone.clone());
    map.insert("doctorAddress", medical.doctor_address.clone());
    map.insert("formulaBrand", formula.brand);
    map.insert("formulaAmount", formula.amount);
    map.insert("formulaFrequency", formula.frequency);
    map.insert("sunscreen", checkbox_token(products.sunscreen));
    map.insert("insectRepellent", checkbox_token(products.insect_repellent));
    map.insert("diaperCream", checkbox_token(products.diaper_cream));
    map.insert("handSanitizer", checkbox_token(products.hand_sanitizer));
    map.insert("childPhotos", checkbox_token(child.permissions.photos));
    map.insert("childFieldTrips", checkbox_token(child.permissions.field_trips));
    map.insert("childWaterPlay", checkbox_token(child.permissions.water_play));
    map.insert(
        "releasedTo",
        child
            .released_to
            .iter()
            .map(|c| c.name.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
    );
    map.insert(
        "emergencyContacts",
        child
            .emergency_contacts
            .iter()
            .map(|c| c.name.trim())
            .filter(|n| !n.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
    );
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentTemplate;
    use crate::inline::{CHECKED, UNCHECKED};
    use crate::model::fixtures;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).expect("date")
    }

    fn all_text(nodes: &[ContentNode]) -> String {
        nodes
            .iter()
            .flat_map(|node| node.texts())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn populated_contract_leaves_no_placeholders() {
        let contract = fixtures::contract(2);
        for language in Language::ALL {
            let template = ContentTemplate::embedded(language).expect("template");
            for page in template.page_names() {
                let nodes =
                    expand_page(&template, page, &contract, language, today()).expect("page");
                let text = all_text(&nodes);
                assert!(!text.contains("{{"), "{page} ({language:?}) still has placeholders: {text}");
                assert!(!text.contains("}}"), "{page} ({language:?}) has stray braces");
            }
        }
    }

    #[test]
    fn child_iteration_repeats_body_in_child_order() {
        let contract = fixtures::contract(2);
        let template = ContentTemplate::embedded(Language::En).expect("template");
        let nodes = expand_page(&template, "medical", &contract, Language::En, today())
            .expect("medical");
        let text = all_text(&nodes);
        let ana = text.find("Ana Lopez").expect("first child");
        let luis = text.find("Luis Lopez").expect("second child");
        assert!(ana < luis);
        assert!(text.contains("Allergies: Ana pollen"));
        assert!(text.contains(&format!("{CHECKED} Sunscreen")));
        assert!(text.contains(&format!("{UNCHECKED} Insect repellent")));
        assert!(!text.contains("true") && !text.contains("false"));
    }

    #[test]
    fn zero_children_keeps_start_and_end_blocks() {
        let contract = fixtures::contract(0);
        let template = ContentTemplate::embedded(Language::En).expect("template");
        let with_none = expand_page(&template, "medical", &contract, Language::En, today())
            .expect("medical");
        let with_one = expand_page(
            &template,
            "medical",
            &fixtures::contract(1),
            Language::En,
            today(),
        )
        .expect("medical");
        let iteration = template
            .page("medical")
            .and_then(|page| {
                page.nodes.iter().find_map(|node| match node {
                    TemplateNode::ChildIteration { child_iteration } => Some(child_iteration),
                    _ => None,
                })
            })
            .expect("iteration");
        assert_eq!(with_one.len() - with_none.len(), iteration.body.len());
        assert!(with_none.iter().any(|node| matches!(node, ContentNode::Signature(_))));
    }

    #[test]
    fn expansion_is_idempotent() {
        let contract = fixtures::contract(2);
        let template = ContentTemplate::embedded(Language::Es).expect("template");
        let first = expand_page(&template, "medical", &contract, Language::Es, today());
        let second = expand_page(&template, "medical", &contract, Language::Es, today());
        assert_eq!(first, second);
        let scope = contract_substitutions(&contract, Language::Es, today());
        for node in first.expect("page") {
            assert_eq!(node.map_text(&|t: &str| substitute(t, &[&scope])), node);
        }
    }

    #[test]
    fn unresolved_and_unterminated_placeholders() {
        let scope: Substitutions = [("name", "Ana".to_string())].into_iter().collect();
        assert_eq!(substitute("Hi {{name}}{{missing}}!", &[&scope]), "Hi Ana!");
        assert_eq!(substitute("Hi {{ name }}", &[&scope]), "Hi Ana");
        assert_eq!(substitute("open {{name", &[&scope]), "open {{name");
    }

    #[test]
    fn child_keys_shadow_contract_keys() {
        let contract_scope: Substitutions =
            [("classroom", "contract".to_string())].into_iter().collect();
        let child_scope: Substitutions = [("classroom", "Robins".to_string())].into_iter().collect();
        assert_eq!(
            substitute("{{classroom}}", &[&child_scope, &contract_scope]),
            "Robins"
        );
    }

    #[test]
    fn missing_page_is_none() {
        let template = ContentTemplate::embedded(Language::En).expect("template");
        assert!(
            expand_page(&template, "nope", &fixtures::contract(1), Language::En, today()).is_none()
        );
    }
}
