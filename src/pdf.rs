use crate::canvas::{Command, Page};
use crate::error::ContractPressError;
use crate::font::{DINGBATS_FONT, FontRegistry, RegisteredFont, encode_winansi, sanitize_font_name};
use crate::glyph_report::GlyphCoverageReport;
use crate::metrics::{PageOrigin, PageStats};
use crate::types::{Color, Pt, Size};
use base64::Engine as _;
use lopdf::{Dictionary, Document as LoDocument, Object, ObjectId, Stream, dictionary};
use std::collections::{BTreeMap, BTreeSet};

pub const DATA_URI_PREFIX: &str = "data:application/pdf;base64,";

const BASE14_FONTS: [&str; 14] = [
    "Helvetica",
    "Helvetica-Bold",
    "Helvetica-Oblique",
    "Helvetica-BoldOblique",
    "Times-Roman",
    "Times-Bold",
    "Times-Italic",
    "Times-BoldItalic",
    "Courier",
    "Courier-Bold",
    "Courier-Oblique",
    "Courier-BoldOblique",
    "Symbol",
    "ZapfDingbats",
];

fn is_base14_font(name: &str) -> bool {
    BASE14_FONTS.contains(&name)
}

struct FontResource {
    resource: String,
    id: ObjectId,
}

/// The single output document of a build. Generated canvas pages and pages
/// imported from other PDFs are appended in call order; `finish` serializes
/// the whole thing exactly once.
pub(crate) struct MasterDocument<'a> {
    doc: LoDocument,
    pages_id: ObjectId,
    kids: Vec<Object>,
    fonts: &'a FontRegistry,
    font_resources: BTreeMap<String, FontResource>,
    glyphs: GlyphCoverageReport,
    page_stats: Vec<PageStats>,
}

/// Serialized output plus per-page accounting.
pub(crate) struct FinishedDocument {
    pub(crate) bytes: Vec<u8>,
    pub(crate) pages: Vec<PageStats>,
    pub(crate) glyphs: GlyphCoverageReport,
}

impl<'a> MasterDocument<'a> {
    pub(crate) fn new(fonts: &'a FontRegistry) -> Self {
        let mut doc = LoDocument::with_version("1.7");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            fonts,
            font_resources: BTreeMap::new(),
            glyphs: GlyphCoverageReport::default(),
            page_stats: Vec::new(),
        }
    }

    pub(crate) fn page_count(&self) -> usize {
        self.kids.len()
    }

    pub(crate) fn append_canvas_pages(
        &mut self,
        pages: &[Page],
        page_size: Size,
        section_key: &str,
    ) -> Result<(), ContractPressError> {
        for page in pages {
            let used = collect_used_font_names(page);
            let mut page_fonts = Dictionary::new();
            for name in &used {
                let (resource, id) = self.font_resource(name);
                page_fonts.set(resource.as_bytes().to_vec(), Object::Reference(id));
            }
            let content = render_page(page, page_size.height, &self.font_resources, &mut self.glyphs);
            let content_bytes = content.len();
            let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => self.pages_id,
                "MediaBox" => media_box(page_size),
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => page_fonts,
                },
            });
            self.kids.push(Object::Reference(page_id));
            self.page_stats.push(PageStats {
                page_number: self.kids.len(),
                origin: PageOrigin::Generated {
                    section: page.meta(section_key).map(str::to_string),
                },
                command_count: page.commands.len(),
                content_bytes,
            });
        }
        Ok(())
    }

    /// Copies the pages at `indices` (zero-based, in the given order) out of
    /// `src`. Inherited `MediaBox` and `Resources` are materialized on each
    /// copied page because the source page tree does not come along.
    pub(crate) fn append_imported_pages(
        &mut self,
        mut src: LoDocument,
        indices: &[usize],
        child_index: usize,
    ) -> Result<usize, ContractPressError> {
        if src.is_encrypted() {
            return Err(ContractPressError::Asset(
                "imported PDF is encrypted".to_string(),
            ));
        }
        src.renumber_objects_with(self.doc.max_id + 1);
        let page_ids: Vec<ObjectId> = src.get_pages().values().copied().collect();
        let mut selected = Vec::with_capacity(indices.len());
        for &index in indices {
            let Some(&page_id) = page_ids.get(index) else {
                return Err(ContractPressError::InvalidConfiguration(format!(
                    "form page {index} out of range (form has {} pages)",
                    page_ids.len()
                )));
            };
            let media_box = inherited_attribute(&src, page_id, b"MediaBox");
            let resources = inherited_attribute(&src, page_id, b"Resources");
            let content_bytes = src.get_page_content(page_id).map(|c| c.len()).unwrap_or(0);
            let page = src
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)?;
            page.set("Parent", Object::Reference(self.pages_id));
            if let Some(media_box) = media_box {
                page.set("MediaBox", media_box);
            }
            page.set(
                "Resources",
                resources.unwrap_or_else(|| Object::Dictionary(Dictionary::new())),
            );
            selected.push((index, page_id, content_bytes));
        }

        if src.max_id > self.doc.max_id {
            self.doc.max_id = src.max_id;
        }
        self.doc.objects.extend(src.objects);

        for (form_page, page_id, content_bytes) in &selected {
            self.kids.push(Object::Reference(*page_id));
            self.page_stats.push(PageStats {
                page_number: self.kids.len(),
                origin: PageOrigin::Form {
                    child_index,
                    form_page: *form_page,
                },
                command_count: 0,
                content_bytes: *content_bytes,
            });
        }
        Ok(selected.len())
    }

    fn font_resource(&mut self, name: &str) -> (String, ObjectId) {
        if let Some(existing) = self.font_resources.get(name) {
            return (existing.resource.clone(), existing.id);
        }
        let fonts = self.fonts;
        let id = if let Some(font) = fonts.resolve(name) {
            self.add_truetype_font(font)
        } else if name == DINGBATS_FONT {
            self.doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => DINGBATS_FONT,
            })
        } else {
            let base = if is_base14_font(name) { name } else { "Helvetica" };
            self.doc.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => base,
                "Encoding" => "WinAnsiEncoding",
            })
        };
        let resource = format!("F{}", self.font_resources.len() + 1);
        self.font_resources.insert(
            name.to_string(),
            FontResource {
                resource: resource.clone(),
                id,
            },
        );
        (resource, id)
    }

    fn add_truetype_font(&mut self, font: &RegisteredFont) -> ObjectId {
        let base = sanitize_font_name(&font.name);
        let metrics = &font.metrics;
        let mut file = Stream::new(
            dictionary! { "Length1" => font.data.len() as i64 },
            font.data.clone(),
        );
        let _ = file.compress();
        let file_id = self.doc.add_object(file);
        let mut flags: i64 = 32;
        if metrics.is_fixed_pitch {
            flags |= 1;
        }
        let descriptor_id = self.doc.add_object(dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => base.as_str(),
            "Flags" => flags,
            "FontBBox" => vec![
                Object::from(metrics.bbox.0 as i64),
                Object::from(metrics.bbox.1 as i64),
                Object::from(metrics.bbox.2 as i64),
                Object::from(metrics.bbox.3 as i64),
            ],
            "ItalicAngle" => metrics.italic_angle as i64,
            "Ascent" => metrics.ascent as i64,
            "Descent" => metrics.descent as i64,
            "CapHeight" => metrics.cap_height as i64,
            "StemV" => metrics.stem_v as i64,
            "FontFile2" => file_id,
        });
        let widths: Vec<Object> = metrics
            .widths
            .iter()
            .map(|w| Object::from(*w as i64))
            .collect();
        self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "TrueType",
            "BaseFont" => base.as_str(),
            "FirstChar" => crate::font::FontMetrics::FIRST_CHAR as i64,
            "LastChar" => crate::font::FontMetrics::LAST_CHAR as i64,
            "Widths" => widths,
            "FontDescriptor" => descriptor_id,
            "Encoding" => "WinAnsiEncoding",
        })
    }

    /// Builds the page tree and catalog, drops unreachable objects and
    /// serializes the document.
    pub(crate) fn finish(mut self) -> Result<FinishedDocument, ContractPressError> {
        let count = self.kids.len() as i64;
        self.doc.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => self.kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        let info_id = self.doc.add_object(dictionary! {
            "Producer" => Object::string_literal("contract-press"),
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.trailer.set("Info", info_id);
        self.doc.prune_objects();
        self.doc.renumber_objects();
        self.doc.compress();
        let mut bytes = Vec::new();
        self.doc.save_to(&mut bytes)?;
        Ok(FinishedDocument {
            bytes,
            pages: self.page_stats,
            glyphs: self.glyphs,
        })
    }
}

pub fn data_uri(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(DATA_URI_PREFIX.len() + bytes.len() * 4 / 3 + 4);
    out.push_str(DATA_URI_PREFIX);
    base64::engine::general_purpose::STANDARD.encode_string(bytes, &mut out);
    out
}

fn media_box(size: Size) -> Vec<Object> {
    vec![
        0.into(),
        0.into(),
        Object::from(size.width.to_f32()),
        Object::from(size.height.to_f32()),
    ]
}

fn inherited_attribute(doc: &LoDocument, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut current = page_id;
    for _ in 0..32 {
        let dict = doc.get_dictionary(current).ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        current = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn collect_used_font_names(page: &Page) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    let mut current = "Helvetica".to_string();
    for cmd in &page.commands {
        match cmd {
            Command::SetFontName(name) => current = name.clone(),
            Command::DrawString { .. } => {
                names.insert(current.clone());
            }
            _ => {}
        }
    }
    names
}

/// Content stream for one canvas page. Canvas coordinates are top-down; PDF
/// user space is bottom-up, so every `y` is flipped against `page_height`.
fn render_page(
    page: &Page,
    page_height: Pt,
    fonts: &BTreeMap<String, FontResource>,
    glyphs: &mut GlyphCoverageReport,
) -> Vec<u8> {
    let mut out: Vec<u8> = Vec::new();
    let mut font_stack: Vec<(String, Pt)> = Vec::new();
    let mut current_font_name = "Helvetica".to_string();
    let mut current_font_size = Pt::from_f32(12.0);
    for cmd in &page.commands {
        match cmd {
            Command::SaveState => {
                font_stack.push((current_font_name.clone(), current_font_size));
                out.extend_from_slice(b"q\n");
            }
            Command::RestoreState => {
                if let Some((name, size)) = font_stack.pop() {
                    current_font_name = name;
                    current_font_size = size;
                }
                out.extend_from_slice(b"Q\n");
            }
            Command::Meta { .. } => {}
            Command::SetFillColor(color) => {
                out.extend_from_slice(color_op(*color, "rg").as_bytes());
            }
            Command::SetStrokeColor(color) => {
                out.extend_from_slice(color_op(*color, "RG").as_bytes());
            }
            Command::SetLineWidth(width) => {
                out.extend_from_slice(format!("{} w\n", fmt_pt(*width)).as_bytes());
            }
            Command::SetFontName(name) => current_font_name = name.clone(),
            Command::SetFontSize(size) => current_font_size = *size,
            Command::MoveTo { x, y } => {
                out.extend_from_slice(
                    format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)).as_bytes(),
                );
            }
            Command::LineTo { x, y } => {
                out.extend_from_slice(
                    format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)).as_bytes(),
                );
            }
            Command::Stroke => out.extend_from_slice(b"S\n"),
            Command::Fill => out.extend_from_slice(b"f\n"),
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                out.extend_from_slice(
                    format!(
                        "{} {} {} {} re\nf\n",
                        fmt_pt(*x),
                        fmt_pt(page_height - *y - *height),
                        fmt_pt(*width),
                        fmt_pt(*height)
                    )
                    .as_bytes(),
                );
            }
            Command::DrawString { x, y, text } => {
                let resource = fonts
                    .get(&current_font_name)
                    .map(|f| f.resource.as_str())
                    .unwrap_or("F1");
                let encoded = if current_font_name == DINGBATS_FONT {
                    text.bytes().collect()
                } else {
                    encode_winansi(text, &current_font_name, Some(&mut *glyphs))
                };
                out.extend_from_slice(
                    format!(
                        "BT\n/{} {} Tf\n{} {} Td\n",
                        resource,
                        fmt_pt(current_font_size),
                        fmt_pt(*x),
                        fmt_pt(page_height - *y)
                    )
                    .as_bytes(),
                );
                push_literal_string(&mut out, &encoded);
                out.extend_from_slice(b" Tj\nET\n");
            }
        }
    }
    out
}

pub(crate) fn push_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(b'(');
    for &byte in bytes {
        match byte {
            b'\\' | b'(' | b')' => {
                out.push(b'\\');
                out.push(byte);
            }
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            _ => out.push(byte),
        }
    }
    out.push(b')');
}

fn color_op(color: Color, op: &str) -> String {
    format!(
        "{} {} {} {}\n",
        fmt_unit(color.r),
        fmt_unit(color.g),
        fmt_unit(color.b),
        op
    )
}

fn fmt_unit(value: f32) -> String {
    let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
    format_milli((value * 1000.0).round() as i64)
}

pub(crate) fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

pub(crate) fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}
