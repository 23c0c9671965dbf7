use crate::error::ContractPressError;
use crate::font::{DINGBATS_FONT, FontRegistry, checkbox_glyph, encode_winansi};
use crate::pdf::{fmt_pt, push_literal_string};
use crate::pdfinspect::{inspect_pdf_bytes, require_pdf_composition_compatibility};
use crate::types::{Pt, Rect};
use lopdf::{Dictionary, Document as LoDocument, Object, ObjectId, StringFormat, dictionary};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const FLAT_TEXT_FONT: &str = "CPFlatHelv";
const FLAT_CHECK_FONT: &str = "CPFlatZapf";
const DEFAULT_FIELD_FONT_SIZE: f32 = 10.0;
const MIN_FIELD_FONT_SIZE: f32 = 6.0;

/// A value written into an AcroForm field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Check(bool),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Check(value)
    }
}

/// Immutable bytes of a fillable PDF. Cloning shares the bytes; every
/// `instantiate` call parses a fresh, independent instance.
#[derive(Debug, Clone)]
pub struct FormAsset {
    bytes: Arc<[u8]>,
    page_count: usize,
    field_names: Vec<String>,
}

impl FormAsset {
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self, ContractPressError> {
        let bytes: Arc<[u8]> = bytes.into();
        let report = inspect_pdf_bytes(&bytes)?;
        require_pdf_composition_compatibility(&report)?;
        for warning in &report.warnings {
            log::warn!("form template: {} {}", warning.code, warning.message);
        }
        let doc = LoDocument::load_mem(&bytes)?;
        let field_names = collect_fields(&doc)
            .into_iter()
            .map(|field| field.name)
            .collect();
        Ok(Self {
            bytes,
            page_count: report.page_count,
            field_names,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    pub fn instantiate(&self) -> Result<FormInstance, ContractPressError> {
        let doc = LoDocument::load_mem(&self.bytes)?;
        Ok(FormInstance::new(doc))
    }
}

#[derive(Debug, Clone)]
struct FieldEntry {
    name: String,
    id: ObjectId,
    widgets: Vec<ObjectId>,
}

/// One parsed copy of a form, owned by a single child's merge.
pub struct FormInstance {
    doc: LoDocument,
    fields: BTreeMap<String, FieldEntry>,
    values: BTreeMap<String, FieldValue>,
}

impl FormInstance {
    fn new(doc: LoDocument) -> Self {
        let fields = collect_fields(&doc)
            .into_iter()
            .map(|field| (field.name.clone(), field))
            .collect();
        Self {
            doc,
            fields,
            values: BTreeMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.doc.get_pages().len()
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    /// Writes `value` into the named field. Returns `false` when the form has
    /// no such field or the field kind does not take that value.
    pub fn try_set_field(&mut self, name: &str, value: impl Into<FieldValue>) -> bool {
        let value = value.into();
        let Some(field) = self.fields.get(name).cloned() else {
            return false;
        };
        let kind = inherited_name(&self.doc, field.id, b"FT");
        let written = match (kind.as_deref(), &value) {
            (Some("Tx"), FieldValue::Text(text)) => self.set_text(&field, text),
            (Some("Btn"), FieldValue::Check(checked)) => self.set_check(&field, *checked),
            _ => false,
        };
        if written {
            self.values.insert(name.to_string(), value);
        }
        written
    }

    fn set_text(&mut self, field: &FieldEntry, text: &str) -> bool {
        match self
            .doc
            .get_object_mut(field.id)
            .and_then(Object::as_dict_mut)
        {
            Ok(dict) => {
                dict.set("V", pdf_text_string(text));
                true
            }
            Err(_) => false,
        }
    }

    fn set_check(&mut self, field: &FieldEntry, checked: bool) -> bool {
        let on_state = field
            .widgets
            .first()
            .and_then(|widget| checkbox_on_state(&self.doc, *widget))
            .unwrap_or_else(|| "Yes".to_string());
        let state = if checked { on_state.as_str() } else { "Off" };
        let Ok(dict) = self
            .doc
            .get_object_mut(field.id)
            .and_then(Object::as_dict_mut)
        else {
            return false;
        };
        dict.set("V", Object::Name(state.as_bytes().to_vec()));
        for widget in &field.widgets {
            if let Ok(dict) = self.doc.get_object_mut(*widget).and_then(Object::as_dict_mut) {
                dict.set("AS", Object::Name(state.as_bytes().to_vec()));
            }
        }
        true
    }

    /// Burns the written values into page content, removes every widget
    /// annotation and drops the interactive form.
    pub(crate) fn flatten(&mut self, fonts: &FontRegistry) -> Result<(), ContractPressError> {
        let widget_pages = self.widget_page_map();
        let mut per_page: BTreeMap<ObjectId, Vec<u8>> = BTreeMap::new();
        let mut widgets_to_remove: BTreeSet<ObjectId> = BTreeSet::new();

        for field in self.fields.values() {
            widgets_to_remove.extend(field.widgets.iter().copied());
            let Some(value) = self.values.get(&field.name) else {
                continue;
            };
            for widget in &field.widgets {
                let Some(page_id) = widget_pages.get(widget) else {
                    continue;
                };
                let Some(rect) = widget_rect(&self.doc, *widget) else {
                    continue;
                };
                let font_size = field_font_size(&self.doc, field.id, *widget);
                let content = flattened_value(fonts, value, rect, font_size);
                if !content.is_empty() {
                    per_page.entry(*page_id).or_default().extend(content);
                }
            }
        }

        for (page_id, content) in per_page {
            self.ensure_flat_fonts(page_id)?;
            self.doc.add_page_contents(page_id, content)?;
        }
        self.remove_annotations(&widgets_to_remove)?;
        if let Ok(catalog) = self.doc.catalog_mut() {
            catalog.remove(b"AcroForm");
        }
        self.fields.clear();
        Ok(())
    }

    /// Paints solid white boxes over `rects` (PDF user space) on one page.
    pub fn overlay_rects(&mut self, page_index: usize, rects: &[Rect]) -> Result<(), ContractPressError> {
        let page_id = self.page_id(page_index)?;
        let mut content = b"q\n1 1 1 rg\n".to_vec();
        for rect in rects {
            content.extend_from_slice(
                format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(rect.x),
                    fmt_pt(rect.y),
                    fmt_pt(rect.width),
                    fmt_pt(rect.height)
                )
                .as_bytes(),
            );
        }
        content.extend_from_slice(b"Q\n");
        self.doc.add_page_contents(page_id, content)?;
        Ok(())
    }

    /// Draws `text` with its baseline at (`x`, `y`) in PDF user space.
    pub fn draw_text(
        &mut self,
        page_index: usize,
        x: Pt,
        y: Pt,
        font_size: Pt,
        text: &str,
    ) -> Result<(), ContractPressError> {
        let page_id = self.page_id(page_index)?;
        self.ensure_flat_fonts(page_id)?;
        let mut content = format!(
            "q\n0 g\nBT\n/{} {} Tf\n{} {} Td\n",
            FLAT_TEXT_FONT,
            fmt_pt(font_size),
            fmt_pt(x),
            fmt_pt(y)
        )
        .into_bytes();
        push_literal_string(&mut content, &encode_winansi(text, "Helvetica", None));
        content.extend_from_slice(b" Tj\nET\nQ\n");
        self.doc.add_page_contents(page_id, content)?;
        Ok(())
    }

    /// Hands the instance over for page extraction.
    pub fn into_document(self) -> LoDocument {
        self.doc
    }

    fn page_id(&self, page_index: usize) -> Result<ObjectId, ContractPressError> {
        self.doc
            .get_pages()
            .values()
            .nth(page_index)
            .copied()
            .ok_or_else(|| {
                ContractPressError::InvalidConfiguration(format!(
                    "form page {page_index} out of range"
                ))
            })
    }

    fn widget_page_map(&self) -> BTreeMap<ObjectId, ObjectId> {
        let mut map = BTreeMap::new();
        for page_id in self.doc.get_pages().values() {
            for annot in page_annotation_ids(&self.doc, *page_id) {
                map.insert(annot, *page_id);
            }
        }
        for field in self.fields.values() {
            for widget in &field.widgets {
                if map.contains_key(widget) {
                    continue;
                }
                if let Some(page) = self
                    .doc
                    .get_dictionary(*widget)
                    .ok()
                    .and_then(|dict| dict.get(b"P").and_then(Object::as_reference).ok())
                {
                    map.insert(*widget, page);
                }
            }
        }
        map
    }

    fn remove_annotations(&mut self, widgets: &BTreeSet<ObjectId>) -> Result<(), ContractPressError> {
        let page_ids: Vec<ObjectId> = self.doc.get_pages().values().copied().collect();
        for page_id in page_ids {
            let remaining: Vec<Object> = page_annotation_ids(&self.doc, page_id)
                .into_iter()
                .filter(|id| !widgets.contains(id))
                .map(Object::Reference)
                .collect();
            let page = self
                .doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)?;
            if remaining.is_empty() {
                page.remove(b"Annots");
            } else {
                page.set("Annots", remaining);
            }
        }
        Ok(())
    }

    /// Gives the page a direct resource dictionary that maps the fonts used by
    /// flattened values, keeping whatever the page already had.
    fn ensure_flat_fonts(&mut self, page_id: ObjectId) -> Result<(), ContractPressError> {
        let mut resources = resolved_dict(&self.doc, inherited_object(&self.doc, page_id, b"Resources"));
        let mut font_dict = resolved_dict(&self.doc, resources.get(b"Font").ok().cloned());
        if font_dict.has(FLAT_TEXT_FONT.as_bytes()) && font_dict.has(FLAT_CHECK_FONT.as_bytes()) {
            return Ok(());
        }
        let text_font = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let check_font = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => DINGBATS_FONT,
        });
        font_dict.set(FLAT_TEXT_FONT, Object::Reference(text_font));
        font_dict.set(FLAT_CHECK_FONT, Object::Reference(check_font));
        resources.set("Font", Object::Dictionary(font_dict));
        let page = self
            .doc
            .get_object_mut(page_id)
            .and_then(Object::as_dict_mut)?;
        page.set("Resources", Object::Dictionary(resources));
        Ok(())
    }
}

fn flattened_value(fonts: &FontRegistry, value: &FieldValue, rect: Rect, font_size: Pt) -> Vec<u8> {
    match value {
        FieldValue::Text(text) if !text.is_empty() => {
            let padding = Pt::from_f32(2.0);
            let available = (rect.width - padding * 2).max(Pt::from_f32(1.0));
            let mut size = font_size;
            let min = Pt::from_f32(MIN_FIELD_FONT_SIZE);
            while size > min && fonts.measure_text_width("Helvetica", size, text) > available {
                size = (size - Pt::from_f32(0.5)).max(min);
            }
            let baseline = rect.y + ((rect.height - size * 0.7) / 2).max(Pt::ZERO);
            let mut out = format!(
                "q\n0 g\nBT\n/{} {} Tf\n{} {} Td\n",
                FLAT_TEXT_FONT,
                fmt_pt(size),
                fmt_pt(rect.x + padding),
                fmt_pt(baseline)
            )
            .into_bytes();
            push_literal_string(&mut out, &encode_winansi(text, "Helvetica", None));
            out.extend_from_slice(b" Tj\nET\nQ\n");
            out
        }
        FieldValue::Check(true) => {
            let size = (rect.width.min(rect.height)) * 0.8;
            let glyph = checkbox_glyph(true).to_string();
            let glyph_width = fonts.measure_text_width(DINGBATS_FONT, size, &glyph);
            let x = rect.x + ((rect.width - glyph_width) / 2).max(Pt::ZERO);
            let y = rect.y + ((rect.height - size * 0.7) / 2).max(Pt::ZERO);
            let mut out = format!(
                "q\n0 g\nBT\n/{} {} Tf\n{} {} Td\n",
                FLAT_CHECK_FONT,
                fmt_pt(size),
                fmt_pt(x),
                fmt_pt(y)
            )
            .into_bytes();
            push_literal_string(&mut out, glyph.as_bytes());
            out.extend_from_slice(b" Tj\nET\nQ\n");
            out
        }
        _ => Vec::new(),
    }
}

fn pdf_text_string(text: &str) -> Object {
    if text.is_ascii() {
        return Object::string_literal(text);
    }
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    Object::String(bytes, StringFormat::Literal)
}

fn resolve<'d>(doc: &'d LoDocument, object: &'d Object) -> &'d Object {
    match object {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(object),
        other => other,
    }
}

fn resolved_dict(doc: &LoDocument, object: Option<Object>) -> Dictionary {
    match object {
        Some(object) => resolve(doc, &object).as_dict().cloned().unwrap_or_default(),
        None => Dictionary::new(),
    }
}

fn inherited_object(doc: &LoDocument, id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = id;
    for _ in 0..32 {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn inherited_name(doc: &LoDocument, id: ObjectId, key: &[u8]) -> Option<String> {
    let object = inherited_object(doc, id, key)?;
    resolve(doc, &object)
        .as_name()
        .ok()
        .map(|name| String::from_utf8_lossy(name).into_owned())
}

fn text_of(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => {
            if bytes.starts_with(&[0xFE, 0xFF]) {
                let units: Vec<u16> = bytes[2..]
                    .chunks_exact(2)
                    .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                    .collect();
                Some(String::from_utf16_lossy(&units))
            } else {
                Some(bytes.iter().map(|b| *b as char).collect())
            }
        }
        _ => None,
    }
}

fn page_annotation_ids(doc: &LoDocument, page_id: ObjectId) -> Vec<ObjectId> {
    let Ok(page) = doc.get_dictionary(page_id) else {
        return Vec::new();
    };
    let Ok(annots) = page.get(b"Annots") else {
        return Vec::new();
    };
    resolve(doc, annots)
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_reference().ok())
                .collect()
        })
        .unwrap_or_default()
}

fn widget_rect(doc: &LoDocument, widget: ObjectId) -> Option<Rect> {
    let dict = doc.get_dictionary(widget).ok()?;
    let values: Vec<f32> = resolve(doc, dict.get(b"Rect").ok()?)
        .as_array()
        .ok()?
        .iter()
        .filter_map(|v| match v {
            Object::Integer(i) => Some(*i as f32),
            Object::Real(r) => Some(*r as f32),
            _ => None,
        })
        .collect();
    if values.len() != 4 {
        return None;
    }
    let (x1, x2) = (values[0].min(values[2]), values[0].max(values[2]));
    let (y1, y2) = (values[1].min(values[3]), values[1].max(values[3]));
    Some(Rect::from_f32(x1, y1, x2 - x1, y2 - y1))
}

/// Font size from the field's default appearance (`/Helv 9 Tf`). Zero means
/// auto size and falls back to the default.
fn field_font_size(doc: &LoDocument, field: ObjectId, widget: ObjectId) -> Pt {
    let da = doc
        .get_dictionary(widget)
        .ok()
        .and_then(|dict| dict.get(b"DA").ok().and_then(text_of))
        .or_else(|| inherited_object(doc, field, b"DA").and_then(|obj| text_of(&obj)))
        .or_else(|| {
            doc.catalog()
                .ok()
                .and_then(|catalog| catalog.get(b"AcroForm").ok())
                .and_then(|acroform| resolve(doc, acroform).as_dict().ok())
                .and_then(|acroform| acroform.get(b"DA").ok())
                .and_then(text_of)
        });
    let size = da.and_then(|da| {
        let tokens: Vec<&str> = da.split_whitespace().collect();
        tokens
            .iter()
            .position(|token| *token == "Tf")
            .filter(|pos| *pos > 0)
            .and_then(|pos| tokens[pos - 1].parse::<f32>().ok())
    });
    match size {
        Some(size) if size > 0.0 => Pt::from_f32(size),
        _ => Pt::from_f32(DEFAULT_FIELD_FONT_SIZE),
    }
}

fn checkbox_on_state(doc: &LoDocument, widget: ObjectId) -> Option<String> {
    let dict = doc.get_dictionary(widget).ok()?;
    let ap = resolve(doc, dict.get(b"AP").ok()?).as_dict().ok()?;
    let normal = resolve(doc, ap.get(b"N").ok()?).as_dict().ok()?;
    normal
        .iter()
        .map(|(key, _)| String::from_utf8_lossy(key).into_owned())
        .find(|key| key != "Off")
}

/// Terminal fields of the form's AcroForm tree with fully qualified names.
fn collect_fields(doc: &LoDocument) -> Vec<FieldEntry> {
    let mut out = Vec::new();
    let Some(fields) = doc
        .catalog()
        .ok()
        .and_then(|catalog| catalog.get(b"AcroForm").ok())
        .and_then(|acroform| resolve(doc, acroform).as_dict().ok())
        .and_then(|acroform| acroform.get(b"Fields").ok())
        .and_then(|fields| resolve(doc, fields).as_array().ok())
    else {
        return out;
    };
    for field in fields {
        if let Ok(id) = field.as_reference() {
            collect_field_node(doc, id, None, &mut out, 0);
        }
    }
    out
}

fn collect_field_node(
    doc: &LoDocument,
    id: ObjectId,
    parent_name: Option<&str>,
    out: &mut Vec<FieldEntry>,
    depth: usize,
) {
    if depth > 16 {
        return;
    }
    let Ok(dict) = doc.get_dictionary(id) else {
        return;
    };
    let partial = dict.get(b"T").ok().and_then(text_of);
    let name = match (parent_name, partial.as_deref()) {
        (Some(parent), Some(partial)) => format!("{parent}.{partial}"),
        (None, Some(partial)) => partial.to_string(),
        (Some(parent), None) => parent.to_string(),
        (None, None) => return,
    };
    let kids: Vec<ObjectId> = dict
        .get(b"Kids")
        .ok()
        .and_then(|kids| resolve(doc, kids).as_array().ok())
        .map(|kids| kids.iter().filter_map(|k| k.as_reference().ok()).collect())
        .unwrap_or_default();
    let field_kids: Vec<ObjectId> = kids
        .iter()
        .copied()
        .filter(|kid| {
            doc.get_dictionary(*kid)
                .map(|d| d.has(b"T"))
                .unwrap_or(false)
        })
        .collect();
    if !field_kids.is_empty() {
        for kid in field_kids {
            collect_field_node(doc, kid, Some(&name), out, depth + 1);
        }
        return;
    }
    let widgets = if kids.is_empty() { vec![id] } else { kids };
    out.push(FieldEntry { name, id, widgets });
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use lopdf::Stream;

    fn rect(values: [i64; 4]) -> Vec<Object> {
        values.into_iter().map(Object::Integer).collect()
    }

    /// Two-page form with text fields `name` and `group.city` and checkbox
    /// `agree` on page 0. Page 1 has the text field `notes`.
    pub(crate) fn small_form_bytes() -> Vec<u8> {
        let mut doc = LoDocument::with_version("1.7");
        let pages_id = doc.new_object_id();
        let page0 = doc.new_object_id();
        let page1 = doc.new_object_id();

        let name = doc.add_object(dictionary! {
            "Type" => "Annot", "Subtype" => "Widget", "FT" => "Tx",
            "T" => Object::string_literal("name"),
            "Rect" => rect([100, 700, 300, 716]),
            "DA" => Object::string_literal("/Helv 9 Tf 0 g"),
            "P" => page0,
        });
        let city_widget = doc.new_object_id();
        let group = doc.add_object(dictionary! {
            "T" => Object::string_literal("group"),
            "Kids" => vec![Object::Reference(city_widget)],
        });
        doc.objects.insert(
            city_widget,
            Object::Dictionary(dictionary! {
                "Type" => "Annot", "Subtype" => "Widget", "FT" => "Tx",
                "T" => Object::string_literal("city"),
                "Parent" => group,
                "Rect" => rect([100, 650, 300, 666]),
            }),
        );
        let agree = doc.add_object(dictionary! {
            "Type" => "Annot", "Subtype" => "Widget", "FT" => "Btn",
            "T" => Object::string_literal("agree"),
            "Rect" => rect([100, 600, 112, 612]),
            "AS" => "Off",
            "AP" => dictionary! {
                "N" => dictionary! { "On" => dictionary! {}, "Off" => dictionary! {} },
            },
        });
        let notes = doc.add_object(dictionary! {
            "Type" => "Annot", "Subtype" => "Widget", "FT" => "Tx",
            "T" => Object::string_literal("notes"),
            "Rect" => rect([100, 500, 500, 520]),
        });

        for (page_id, label, annots) in [
            (page0, "page zero", vec![name, city_widget, agree]),
            (page1, "page one", vec![notes]),
        ] {
            let content = format!("BT /F1 12 Tf 72 740 Td ({label}) Tj ET").into_bytes();
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            doc.objects.insert(
                page_id,
                Object::Dictionary(dictionary! {
                    "Type" => "Page",
                    "Parent" => pages_id,
                    "Contents" => content_id,
                    "Annots" => annots.into_iter().map(Object::Reference).collect::<Vec<_>>(),
                }),
            );
        }
        let font = doc.add_object(dictionary! {
            "Type" => "Font", "Subtype" => "Type1", "BaseFont" => "Helvetica",
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page0), Object::Reference(page1)],
                "Count" => 2,
                "MediaBox" => rect([0, 0, 612, 792]),
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => font } },
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
            "AcroForm" => dictionary! {
                "Fields" => vec![
                    Object::Reference(name),
                    Object::Reference(group),
                    Object::Reference(agree),
                    Object::Reference(notes),
                ],
                "DA" => Object::string_literal("/Helv 0 Tf 0 g"),
            },
        });
        doc.trailer.set("Root", catalog);
        let mut out = Vec::new();
        doc.save_to(&mut out).expect("save form");
        out
    }
}
