use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Output language. Each content template carries one full variant per language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::En, Language::Es];

    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Es => "es",
        }
    }

    pub fn format_date(self, date: NaiveDate) -> String {
        match self {
            Language::En => date.format("%m/%d/%Y").to_string(),
            Language::Es => date.format("%d/%m/%Y").to_string(),
        }
    }
}

/// The contract as collected by the caller. The engine reads it and never
/// modifies it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContractRecord {
    pub titular_name: String,
    pub guardians: Vec<Guardian>,
    pub children: Vec<Child>,
    pub schedule: WeeklySchedule,
    pub payment: PaymentTerms,
    pub permissions: ContractPermissions,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub language: Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardianRole {
    Father,
    Mother,
    #[default]
    Other,
}

impl GuardianRole {
    pub fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (GuardianRole::Father, Language::En) => "Father",
            (GuardianRole::Mother, Language::En) => "Mother",
            (GuardianRole::Other, Language::En) => "Guardian",
            (GuardianRole::Father, Language::Es) => "Padre",
            (GuardianRole::Mother, Language::Es) => "Madre",
            (GuardianRole::Other, Language::Es) => "Tutor",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkInfo {
    pub employer: String,
    pub address: String,
    pub city: String,
    pub phone: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Guardian {
    pub name: String,
    pub last_name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
    pub email: String,
    pub role: GuardianRole,
    pub work: WorkInfo,
}

impl Guardian {
    pub fn full_name(&self) -> String {
        join_name(&self.name, &self.last_name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DaySchedule {
    pub check_in: String,
    pub check_out: String,
}

impl DaySchedule {
    pub fn is_attending(&self) -> bool {
        !self.check_in.trim().is_empty() || !self.check_out.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeeklySchedule {
    pub monday: DaySchedule,
    pub tuesday: DaySchedule,
    pub wednesday: DaySchedule,
    pub thursday: DaySchedule,
    pub friday: DaySchedule,
}

impl WeeklySchedule {
    /// Days in week order, keyed by the English day name used in placeholders.
    pub fn days(&self) -> [(&'static str, &DaySchedule); 5] {
        [
            ("Monday", &self.monday),
            ("Tuesday", &self.tuesday),
            ("Wednesday", &self.wednesday),
            ("Thursday", &self.thursday),
            ("Friday", &self.friday),
        ]
    }

    /// One-line summary of attended days, e.g. `Mon 8:00-17:00; Wed 8:00-12:00`.
    pub fn summary(&self, language: Language) -> String {
        let parts: Vec<String> = self
            .days()
            .iter()
            .filter(|(_, day)| day.is_attending())
            .map(|(name, day)| {
                format!(
                    "{} {}-{}",
                    short_day_name(name, language),
                    day.check_in.trim(),
                    day.check_out.trim()
                )
            })
            .collect();
        parts.join("; ")
    }
}

fn short_day_name(day: &str, language: Language) -> &'static str {
    match (day, language) {
        ("Monday", Language::En) => "Mon",
        ("Tuesday", Language::En) => "Tue",
        ("Wednesday", Language::En) => "Wed",
        ("Thursday", Language::En) => "Thu",
        ("Friday", Language::En) => "Fri",
        ("Monday", Language::Es) => "Lun",
        ("Tuesday", Language::Es) => "Mar",
        ("Wednesday", Language::Es) => "Mié",
        ("Thursday", Language::Es) => "Jue",
        ("Friday", Language::Es) => "Vie",
        _ => "",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentMethod {
    Cash,
    Check,
    Card,
    BankTransfer,
}

impl PaymentMethod {
    pub fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (PaymentMethod::Cash, Language::En) => "Cash",
            (PaymentMethod::Check, Language::En) => "Check",
            (PaymentMethod::Card, Language::En) => "Credit or debit card",
            (PaymentMethod::BankTransfer, Language::En) => "Bank transfer",
            (PaymentMethod::Cash, Language::Es) => "Efectivo",
            (PaymentMethod::Check, Language::Es) => "Cheque",
            (PaymentMethod::Card, Language::Es) => "Tarjeta de crédito o débito",
            (PaymentMethod::BankTransfer, Language::Es) => "Transferencia bancaria",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PaymentFrequency {
    Weekly,
    Biweekly,
    #[default]
    Monthly,
}

impl PaymentFrequency {
    pub fn label(self, language: Language) -> &'static str {
        match (self, language) {
            (PaymentFrequency::Weekly, Language::En) => "weekly",
            (PaymentFrequency::Biweekly, Language::En) => "every two weeks",
            (PaymentFrequency::Monthly, Language::En) => "monthly",
            (PaymentFrequency::Weekly, Language::Es) => "semanalmente",
            (PaymentFrequency::Biweekly, Language::Es) => "cada dos semanas",
            (PaymentFrequency::Monthly, Language::Es) => "mensualmente",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PaymentTerms {
    pub amount: f64,
    pub registration_fee: f64,
    pub method: Option<PaymentMethod>,
    pub frequency: PaymentFrequency,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContractPermissions {
    pub photos: bool,
    pub field_trips: bool,
    pub terms_accepted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermittedProducts {
    pub sunscreen: bool,
    pub insect_repellent: bool,
    pub diaper_cream: bool,
    pub hand_sanitizer: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MedicalInfo {
    pub doctor_name: String,
    pub doctor_phone: String,
    pub doctor_address: String,
    pub health_status: String,
    pub allergies: String,
    pub treatment: String,
    pub feeding_schedule: String,
    pub products: PermittedProducts,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormulaInfo {
    pub brand: String,
    pub amount: String,
    pub frequency: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChildPermissions {
    pub photos: bool,
    pub field_trips: bool,
    pub water_play: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contact {
    pub name: String,
    pub phone: String,
    pub relationship: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Child {
    pub name: String,
    pub last_name: String,
    pub born_date: Option<NaiveDate>,
    pub classroom: String,
    pub medical: MedicalInfo,
    pub formula: Option<FormulaInfo>,
    pub permissions: ChildPermissions,
    pub released_to: Vec<Contact>,
    pub emergency_contacts: Vec<Contact>,
}

impl Child {
    pub fn full_name(&self) -> String {
        join_name(&self.name, &self.last_name)
    }
}

impl ContractRecord {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn father(&self) -> Option<&Guardian> {
        self.guardians
            .iter()
            .find(|g| g.role == GuardianRole::Father)
    }

    pub fn mother(&self) -> Option<&Guardian> {
        self.guardians
            .iter()
            .find(|g| g.role == GuardianRole::Mother)
    }

    /// First guardian that is neither father nor mother.
    pub fn generic_guardian(&self) -> Option<&Guardian> {
        self.guardians.iter().find(|g| g.role == GuardianRole::Other)
    }

    pub fn guardian_names(&self) -> String {
        join_non_empty(self.guardians.iter().map(Guardian::full_name), ", ")
    }

    pub fn children_names(&self) -> String {
        join_non_empty(self.children.iter().map(Child::full_name), ", ")
    }

    /// Names of required fields that are missing or inconsistent. Intended for
    /// an intake layer; document builds never reject a record.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.titular_name.trim().is_empty() {
            missing.push("titularName");
        }
        if self.guardians.is_empty() {
            missing.push("guardians");
        }
        if self.children.is_empty() {
            missing.push("children");
        }
        if self.payment.amount <= 0.0 {
            missing.push("payment.amount");
        }
        if self.payment.method.is_none() {
            missing.push("payment.method");
        }
        match (self.start_date, self.end_date) {
            (None, _) => missing.push("startDate"),
            (Some(start), Some(end)) if end <= start => missing.push("endDate"),
            _ => {}
        }
        missing
    }
}

/// `1250.5` -> `$1,250.50`.
pub fn format_money(amount: f64) -> String {
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if amount < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${grouped}.{:02}", cents % 100)
}

fn join_name(first: &str, last: &str) -> String {
    match (first.trim(), last.trim()) {
        ("", last) => last.to_string(),
        (first, "") => first.to_string(),
        (first, last) => format!("{first} {last}"),
    }
}

fn join_non_empty(parts: impl Iterator<Item = String>, sep: &str) -> String {
    parts
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub(crate) fn guardian(name: &str, last: &str, role: GuardianRole) -> Guardian {
        Guardian {
            name: name.to_string(),
            last_name: last.to_string(),
            address: "12 Oak Street".to_string(),
            city: "Springfield".to_string(),
            phone: "555-0100".to_string(),
            email: format!("{}@example.com", name.to_ascii_lowercase()),
            role,
            work: WorkInfo {
                employer: format!("{name} Works"),
                address: "1 Main Street".to_string(),
                city: "Springfield".to_string(),
                phone: "555-0199".to_string(),
            },
        }
    }

    pub(crate) fn child(name: &str, last: &str) -> Child {
        Child {
            name: name.to_string(),
            last_name: last.to_string(),
            born_date: NaiveDate::from_ymd_opt(2022, 3, 14),
            classroom: format!("{name} Room"),
            medical: MedicalInfo {
                doctor_name: format!("Dr. {last}"),
                doctor_phone: "555-0142".to_string(),
                doctor_address: "9 Clinic Way".to_string(),
                health_status: "Good".to_string(),
                allergies: format!("{name} pollen"),
                treatment: "None".to_string(),
                feeding_schedule: "Lunch at noon".to_string(),
                products: PermittedProducts {
                    sunscreen: true,
                    insect_repellent: false,
                    diaper_cream: true,
                    hand_sanitizer: false,
                },
            },
            formula: Some(FormulaInfo {
                brand: "Similac".to_string(),
                amount: "4 oz".to_string(),
                frequency: "every 3 hours".to_string(),
            }),
            permissions: ChildPermissions {
                photos: true,
                field_trips: false,
                water_play: true,
            },
            released_to: vec![Contact {
                name: format!("{name} Grandma"),
                phone: "555-0111".to_string(),
                relationship: "Grandmother".to_string(),
            }],
            emergency_contacts: Vec::new(),
        }
    }

    pub(crate) fn contract(children: usize) -> ContractRecord {
        let names = ["Ana", "Luis", "Marta", "Pablo"];
        ContractRecord {
            titular_name: "Maria Lopez".to_string(),
            guardians: vec![
                guardian("Jose", "Lopez", GuardianRole::Father),
                guardian("Maria", "Lopez", GuardianRole::Mother),
            ],
            children: (0..children)
                .map(|i| child(names[i % names.len()], "Lopez"))
                .collect(),
            schedule: WeeklySchedule {
                monday: DaySchedule {
                    check_in: "8:00".to_string(),
                    check_out: "17:00".to_string(),
                },
                wednesday: DaySchedule {
                    check_in: "8:00".to_string(),
                    check_out: "12:00".to_string(),
                },
                ..WeeklySchedule::default()
            },
            payment: PaymentTerms {
                amount: 1250.0,
                registration_fee: 150.0,
                method: Some(PaymentMethod::BankTransfer),
                frequency: PaymentFrequency::Monthly,
            },
            permissions: ContractPermissions {
                photos: true,
                field_trips: false,
                terms_accepted: true,
            },
            start_date: NaiveDate::from_ymd_opt(2026, 9, 1),
            end_date: NaiveDate::from_ymd_opt(2027, 6, 30),
            language: Language::En,
        }
    }

    /// English record with a father, a generic guardian (no mother) and a
    /// full Monday to Friday schedule.
    pub(crate) fn weekday_contract(children: usize) -> ContractRecord {
        let day = || DaySchedule {
            check_in: "7:30".to_string(),
            check_out: "17:30".to_string(),
        };
        ContractRecord {
            guardians: vec![
                guardian("Jose", "Lopez", GuardianRole::Father),
                guardian("Rosa", "Diaz", GuardianRole::Other),
            ],
            schedule: WeeklySchedule {
                monday: day(),
                tuesday: day(),
                wednesday: day(),
                thursday: day(),
                friday: day(),
            },
            ..contract(children)
        }
    }
}
