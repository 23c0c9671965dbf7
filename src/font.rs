use crate::error::ContractPressError;
use crate::glyph_report::GlyphCoverageReport;
use crate::types::Pt;
use std::collections::HashMap;

pub const BASE_FAMILY: &str = "Helvetica";
pub const DINGBATS_FONT: &str = "ZapfDingbats";

const CHECKED_GLYPH: char = '4';
const UNCHECKED_GLYPH: char = 'o';

// Adobe core font metrics for the printable ASCII range (0x20..=0x7E), in
// 1/1000 em. Oblique faces share the upright widths.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, 1015, 667, 667, 722, 722, 667,
    611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 278, 278, 278, 469, 556, 333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500,
    222, 833, 556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, 556, 556, 556,
    556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, 975, 722, 722, 722, 722, 667,
    611, 778, 722, 278, 556, 722, 611, 833, 722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667,
    667, 611, 333, 278, 333, 584, 556, 333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556,
    278, 889, 611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FontVariant {
    Regular,
    Bold,
    Italic,
    BoldItalic,
}

impl FontVariant {
    pub fn from_flags(bold: bool, italic: bool) -> Self {
        match (bold, italic) {
            (false, false) => FontVariant::Regular,
            (true, false) => FontVariant::Bold,
            (false, true) => FontVariant::Italic,
            (true, true) => FontVariant::BoldItalic,
        }
    }

    fn helvetica_name(self) -> &'static str {
        match self {
            FontVariant::Regular => "Helvetica",
            FontVariant::Bold => "Helvetica-Bold",
            FontVariant::Italic => "Helvetica-Oblique",
            FontVariant::BoldItalic => "Helvetica-BoldOblique",
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            FontVariant::Regular => "Regular",
            FontVariant::Bold => "Bold",
            FontVariant::Italic => "Italic",
            FontVariant::BoldItalic => "BoldItalic",
        }
    }
}

/// Metrics of a TrueType program registered for embedding, normalized to
/// 1/1000 em and indexed by WinAnsi code (0x20..=0xFF).
#[derive(Debug)]
pub(crate) struct FontMetrics {
    pub(crate) widths: Vec<u16>,
    pub(crate) ascent: i16,
    pub(crate) descent: i16,
    pub(crate) cap_height: i16,
    pub(crate) italic_angle: i16,
    pub(crate) stem_v: i16,
    pub(crate) bbox: (i16, i16, i16, i16),
    pub(crate) is_fixed_pitch: bool,
    missing_width: u16,
}

impl FontMetrics {
    pub(crate) const FIRST_CHAR: u8 = 0x20;
    pub(crate) const LAST_CHAR: u8 = 0xFF;

    fn from_face(face: &ttf_parser::Face<'_>) -> Self {
        let units = face.units_per_em().max(1) as i32;
        let scale = |v: i32| -> i32 { (v * 1000 + units / 2) / units };
        let missing_width = face
            .glyph_hor_advance(ttf_parser::GlyphId(0))
            .map(|adv| scale(adv as i32).clamp(0, u16::MAX as i32) as u16)
            .unwrap_or(500);
        let mut widths = Vec::with_capacity((Self::LAST_CHAR - Self::FIRST_CHAR) as usize + 1);
        for code in Self::FIRST_CHAR..=Self::LAST_CHAR {
            let width = winansi_char(code)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|gid| face.glyph_hor_advance(gid))
                .map(|adv| scale(adv as i32).clamp(0, u16::MAX as i32) as u16)
                .unwrap_or(missing_width);
            widths.push(width);
        }
        let bbox = face.global_bounding_box();
        let ascent = scale(face.ascender() as i32) as i16;
        let descent = scale(face.descender() as i32) as i16;
        Self {
            widths,
            ascent,
            descent,
            cap_height: face
                .capital_height()
                .map(|v| scale(v as i32) as i16)
                .unwrap_or(ascent),
            italic_angle: if face.is_italic() { -12 } else { 0 },
            stem_v: if face.is_bold() { 120 } else { 80 },
            bbox: (
                scale(bbox.x_min as i32) as i16,
                scale(bbox.y_min as i32) as i16,
                scale(bbox.x_max as i32) as i16,
                scale(bbox.y_max as i32) as i16,
            ),
            is_fixed_pitch: face.is_monospaced(),
            missing_width,
        }
    }

    fn advance_for_code(&self, code: u8) -> u16 {
        if code < Self::FIRST_CHAR {
            return 0;
        }
        self.widths
            .get((code - Self::FIRST_CHAR) as usize)
            .copied()
            .unwrap_or(self.missing_width)
    }
}

#[derive(Debug)]
pub(crate) struct RegisteredFont {
    pub(crate) name: String,
    pub(crate) data: Vec<u8>,
    pub(crate) metrics: FontMetrics,
}

/// Fonts available to one engine. The Helvetica family and ZapfDingbats are
/// always present as PDF core fonts; TrueType families registered here are
/// embedded into every document that uses them.
#[derive(Debug)]
pub(crate) struct FontRegistry {
    fonts: Vec<RegisteredFont>,
    lookup: HashMap<String, usize>,
    family: String,
}

impl FontRegistry {
    pub(crate) fn new() -> Self {
        Self {
            fonts: Vec::new(),
            lookup: HashMap::new(),
            family: BASE_FAMILY.to_string(),
        }
    }

    /// Registers one face of a TrueType family. Invalid font data is fatal: a
    /// build cannot lay out text without trustworthy metrics.
    pub(crate) fn register_bytes(
        &mut self,
        data: Vec<u8>,
        family: &str,
        variant: FontVariant,
    ) -> Result<String, ContractPressError> {
        let family = sanitize_font_name(family);
        if family.is_empty() {
            return Err(ContractPressError::Asset(
                "font family name cannot be empty".to_string(),
            ));
        }
        let metrics = {
            let face = ttf_parser::Face::parse(&data, 0).map_err(|err| {
                ContractPressError::Asset(format!("invalid font data for {family}: {err}"))
            })?;
            FontMetrics::from_face(&face)
        };
        let name = format!("{family}-{}", variant.suffix());
        let index = self.fonts.len();
        self.fonts.push(RegisteredFont {
            name: name.clone(),
            data,
            metrics,
        });
        self.lookup.insert(normalize_name(&name), index);
        Ok(name)
    }

    /// Makes a registered family the body family. Unknown families are rejected.
    pub(crate) fn set_family(&mut self, family: &str) -> Result<(), ContractPressError> {
        let family = sanitize_font_name(family);
        if family != BASE_FAMILY && self.resolve(&format!("{family}-Regular")).is_none() {
            return Err(ContractPressError::InvalidConfiguration(format!(
                "font family {family} has no Regular face registered"
            )));
        }
        self.family = family;
        Ok(())
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<&RegisteredFont> {
        self.lookup
            .get(&normalize_name(name))
            .and_then(|index| self.fonts.get(*index))
    }

    /// Concrete font name for a face of the body family. Missing faces of a
    /// custom family fall back to its Regular face.
    pub(crate) fn face_name(&self, variant: FontVariant) -> String {
        if self.family == BASE_FAMILY {
            return variant.helvetica_name().to_string();
        }
        let name = format!("{}-{}", self.family, variant.suffix());
        if self.resolve(&name).is_some() {
            return name;
        }
        format!("{}-Regular", self.family)
    }

    pub(crate) fn measure_text_width(&self, name: &str, font_size: Pt, text: &str) -> Pt {
        let units: u32 = if let Some(font) = self.resolve(name) {
            text.chars()
                .map(|ch| font.metrics.advance_for_code(winansi_byte(ch).unwrap_or(b'?')) as u32)
                .sum()
        } else if let Some(table) = core_width_table(name) {
            text.chars().map(|ch| core_char_width(table, ch) as u32).sum()
        } else if name == DINGBATS_FONT {
            text.chars().map(dingbat_width).map(u32::from).sum()
        } else {
            let char_width = (font_size * 0.6).max(Pt::from_f32(1.0));
            return char_width * (text.chars().count() as i32);
        };
        font_size.mul_ratio(units.min(i32::MAX as u32) as i32, 1000)
    }
}

/// ZapfDingbats glyph drawn for a checkbox token.
pub(crate) fn checkbox_glyph(checked: bool) -> char {
    if checked { CHECKED_GLYPH } else { UNCHECKED_GLYPH }
}

fn dingbat_width(ch: char) -> u16 {
    match ch {
        CHECKED_GLYPH => 760,
        UNCHECKED_GLYPH => 761,
        ' ' => 278,
        _ => 788,
    }
}

fn core_width_table(name: &str) -> Option<&'static [u16; 95]> {
    match name {
        "Helvetica" | "Helvetica-Oblique" => Some(&HELVETICA_WIDTHS),
        "Helvetica-Bold" | "Helvetica-BoldOblique" => Some(&HELVETICA_BOLD_WIDTHS),
        _ => None,
    }
}

fn core_char_width(table: &[u16; 95], ch: char) -> u16 {
    let ch = fold_latin1(ch);
    let code = ch as u32;
    if (0x20..=0x7E).contains(&code) {
        return table[(code - 0x20) as usize];
    }
    match ch {
        '\u{a0}' => table[0],
        '¡' | '¿' => table[('!' as u32 - 0x20) as usize].max(table[('?' as u32 - 0x20) as usize]),
        '–' => 556,
        '—' => 1000,
        '‘' | '’' | '‚' => 222,
        '“' | '”' | '„' => 333,
        '•' => 350,
        '€' => 556,
        _ => 556,
    }
}

/// Maps accented Latin-1 letters to their base letter for width lookup; the
/// core-font accented glyphs share the base advance.
fn fold_latin1(ch: char) -> char {
    match ch {
        'À'..='Å' => 'A',
        'Ç' => 'C',
        'È'..='Ë' => 'E',
        'Ì'..='Ï' => 'I',
        'Ñ' => 'N',
        'Ò'..='Ö' | 'Ø' => 'O',
        'Ù'..='Ü' => 'U',
        'Ý' => 'Y',
        'à'..='å' => 'a',
        'ç' => 'c',
        'è'..='ë' => 'e',
        'ì'..='ï' => 'i',
        'ñ' => 'n',
        'ò'..='ö' | 'ø' => 'o',
        'ù'..='ü' => 'u',
        'ý' | 'ÿ' => 'y',
        _ => ch,
    }
}

const WINANSI_HIGH: [(u8, char); 27] = [
    (0x80, '€'),
    (0x82, '‚'),
    (0x83, 'ƒ'),
    (0x84, '„'),
    (0x85, '…'),
    (0x86, '†'),
    (0x87, '‡'),
    (0x88, 'ˆ'),
    (0x89, '‰'),
    (0x8A, 'Š'),
    (0x8B, '‹'),
    (0x8C, 'Œ'),
    (0x8E, 'Ž'),
    (0x91, '‘'),
    (0x92, '’'),
    (0x93, '“'),
    (0x94, '”'),
    (0x95, '•'),
    (0x96, '–'),
    (0x97, '—'),
    (0x98, '˜'),
    (0x99, '™'),
    (0x9A, 'š'),
    (0x9B, '›'),
    (0x9C, 'œ'),
    (0x9E, 'ž'),
    (0x9F, 'Ÿ'),
];

pub(crate) fn winansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    if (0x20..=0x7E).contains(&code) || (0xA0..=0xFF).contains(&code) {
        return Some(code as u8);
    }
    WINANSI_HIGH
        .iter()
        .find(|(_, mapped)| *mapped == ch)
        .map(|(byte, _)| *byte)
}

pub(crate) fn winansi_char(code: u8) -> Option<char> {
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as char),
        _ => WINANSI_HIGH
            .iter()
            .find(|(byte, _)| *byte == code)
            .map(|(_, ch)| *ch),
    }
}

/// WinAnsi bytes for `text`. Characters outside the encoding become `?` and are
/// recorded in `report` when one is supplied.
pub(crate) fn encode_winansi(
    text: &str,
    font_name: &str,
    mut report: Option<&mut GlyphCoverageReport>,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for ch in text.chars() {
        match winansi_byte(ch) {
            Some(byte) => out.push(byte),
            None => {
                out.push(b'?');
                if let Some(report) = report.as_deref_mut() {
                    report.record_missing(ch, vec![font_name.to_string()]);
                }
            }
        }
    }
    out
}

pub(crate) fn sanitize_font_name(name: &str) -> String {
    name.chars()
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '-' || *ch == '_')
        .collect()
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}
