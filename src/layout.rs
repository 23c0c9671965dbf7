use crate::canvas::{Canvas, Page};
use crate::content::{ContentNode, HeaderLevel, HeaderNode, SignatureNode};
use crate::debug::DebugLogger;
use crate::font::{FontRegistry, FontVariant};
use crate::inline::{
    self, BOLD_TOKEN, CENTER_TOKEN, ITALIC_TOKEN, InlineStyleState, LineStyle, Segment,
};
use crate::types::{Color, Margins, Pt, Size};

/// Page metadata key naming the content section a generated page belongs to.
pub const SECTION_META_KEY: &str = "contract.section";

/// Sizes and vertical rhythm used by the layout engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TypographyConfig {
    pub body_size: Pt,
    pub line_height: Pt,
    pub title_size: Pt,
    pub header_size: Pt,
    pub subheader_size: Pt,
    /// Extra space after a header, on top of its line height.
    pub header_spacing: Pt,
    pub paragraph_spacing: Pt,
    pub separator_gap: Pt,
    /// Writing space above a signature rule.
    pub signature_rule_gap: Pt,
    pub label_size: Pt,
    pub signature_spacing: Pt,
}

impl Default for TypographyConfig {
    fn default() -> Self {
        Self {
            body_size: Pt::from_f32(10.0),
            line_height: Pt::from_f32(14.0),
            title_size: Pt::from_f32(18.0),
            header_size: Pt::from_f32(14.0),
            subheader_size: Pt::from_f32(12.0),
            header_spacing: Pt::from_f32(6.0),
            paragraph_spacing: Pt::from_f32(4.0),
            separator_gap: Pt::from_f32(12.0),
            signature_rule_gap: Pt::from_f32(30.0),
            label_size: Pt::from_f32(8.0),
            signature_spacing: Pt::from_f32(18.0),
        }
    }
}

impl TypographyConfig {
    fn header_font_size(&self, level: HeaderLevel) -> Pt {
        match level {
            HeaderLevel::Title => self.title_size,
            HeaderLevel::Header => self.header_size,
            HeaderLevel::Subheader => self.subheader_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_size: Size,
    pub margins: Margins,
}

impl PageGeometry {
    pub fn new(page_size: Size, margins: Margins) -> Self {
        Self { page_size, margins }
    }

    pub fn top(&self) -> Pt {
        self.margins.top
    }

    /// Lowest offset content may reach, measured from the top edge.
    pub fn bottom(&self) -> Pt {
        self.page_size.height - self.margins.bottom
    }

    pub fn left(&self) -> Pt {
        self.margins.left
    }

    pub fn width(&self) -> Pt {
        self.margins.printable_rect(self.page_size).width
    }

    pub fn right(&self) -> Pt {
        self.left() + self.width()
    }
}

/// Write position of the layout engine. `y` is the top of the next line box,
/// measured down from the top edge, and never passes `PageGeometry::bottom`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderCursor {
    pub page_index: usize,
    pub y: Pt,
}

/// Sole owner of the canvas and cursor for one build. Content nodes go in,
/// paginated canvas pages come out.
pub struct LayoutEngine<'a> {
    canvas: Canvas,
    cursor: RenderCursor,
    geometry: PageGeometry,
    typography: TypographyConfig,
    fonts: &'a FontRegistry,
    debug: Option<DebugLogger>,
    section: Option<String>,
}

impl<'a> LayoutEngine<'a> {
    pub fn new(
        fonts: &'a FontRegistry,
        geometry: PageGeometry,
        typography: TypographyConfig,
        debug: Option<DebugLogger>,
    ) -> Self {
        Self {
            canvas: Canvas::new(geometry.page_size),
            cursor: RenderCursor {
                page_index: 0,
                y: geometry.top(),
            },
            geometry,
            typography,
            fonts,
            debug,
            section: None,
        }
    }

    pub fn cursor(&self) -> RenderCursor {
        self.cursor
    }

    pub fn geometry(&self) -> PageGeometry {
        self.geometry
    }

    /// Tags the current page, and every page this section spills onto, with
    /// the section name.
    pub fn begin_section(&mut self, name: &str) {
        self.section = Some(name.to_string());
        self.canvas.set_meta(SECTION_META_KEY, name);
    }

    /// Closes a logical page: the cursor returns to the top margin and, when
    /// the physical page already has content, a fresh page is started.
    pub fn end_section(&mut self) {
        if self.canvas.is_current_blank() {
            self.cursor.y = self.geometry.top();
        } else {
            self.canvas.show_page();
            self.cursor.page_index += 1;
            self.cursor.y = self.geometry.top();
        }
        self.section = None;
    }

    /// Hands out the finished pages. A trailing page with no marks is dropped.
    pub fn take_pages(&mut self) -> Vec<Page> {
        self.canvas.take_pages()
    }

    pub fn render_nodes(&mut self, nodes: &[ContentNode]) {
        for node in nodes {
            self.render_node(node);
        }
    }

    pub fn render_node(&mut self, node: &ContentNode) {
        match node {
            ContentNode::Paragraph { text } => self.render_paragraph(text),
            ContentNode::Header(header) => self.render_header(header),
            ContentNode::Separator => self.render_separator(),
            ContentNode::Signature(signature) => self.render_signature(signature),
        }
    }

    fn body_style(&self) -> LineStyle {
        LineStyle {
            font_size: self.typography.body_size,
            width: self.geometry.width(),
            base: InlineStyleState::default(),
        }
    }

    pub fn render_paragraph(&mut self, text: &str) {
        let text = inline::preprocess_markup(text);
        let style = self.body_style();
        for part in text.split('\n') {
            let lines = wrap_line(
                self.fonts,
                part,
                style.width,
                style.font_size,
                style.base,
            );
            if lines.is_empty() {
                self.ensure_space(self.typography.line_height);
                self.advance(self.typography.line_height);
                continue;
            }
            for line in lines {
                self.draw_line(&line, self.typography.line_height, &style);
            }
        }
        self.advance(self.typography.paragraph_spacing);
    }

    fn render_header(&mut self, header: &HeaderNode) {
        let size = self.typography.header_font_size(header.level);
        let line_height = (size * 1.3).max(self.typography.line_height);
        let style = LineStyle {
            font_size: size,
            width: self.geometry.width(),
            base: InlineStyleState {
                bold: true,
                italic: false,
            },
        };
        let text = inline::preprocess_markup(&header.text);
        for part in text.split('\n') {
            let part = if header.centered && !inline::is_centered(part) {
                format!("{CENTER_TOKEN}{part}")
            } else {
                part.to_string()
            };
            for line in wrap_line(self.fonts, &part, style.width, size, style.base) {
                self.draw_line(&line, line_height, &style);
            }
        }
        self.advance(self.typography.header_spacing);
        self.restore_body_font();
    }

    fn render_separator(&mut self) {
        let gap = self.typography.separator_gap;
        self.ensure_space(gap);
        let rule_y = self.cursor.y + gap / 2;
        self.canvas.save_state();
        self.canvas.set_stroke_color(Color::rgb(0.6, 0.6, 0.6));
        self.canvas.set_line_width(Pt::from_f32(0.5));
        self.canvas
            .hline(self.geometry.left(), self.geometry.right(), rule_y);
        self.canvas.restore_state();
        self.advance(gap);
    }

    /// Height the signature block occupies, measured before anything is drawn.
    pub fn signature_height(&self, signature: &SignatureNode) -> Pt {
        self.signature_rule_offset(signature) + self.label_block_height()
    }

    fn label_block_height(&self) -> Pt {
        self.typography.label_size + Pt::from_f32(4.0) + self.typography.signature_spacing
    }

    fn signature_rule_offset(&self, signature: &SignatureNode) -> Pt {
        match signature {
            SignatureNode::Parent { name, date, .. } => {
                let columns = self.signature_columns();
                let name_lines = self.value_lines(name, columns[0].1).len();
                let date_lines = self.value_lines(date, columns[2].1).len();
                let text_height = self.typography.line_height * (name_lines.max(date_lines) as i32);
                self.typography.signature_rule_gap.max(text_height)
            }
            SignatureNode::Institution { .. } => self.typography.signature_rule_gap,
        }
    }

    /// `(x, width)` of the name, signature and date columns: 30% / 40% / 20%
    /// of the printable width separated by two 5% gutters.
    fn signature_columns(&self) -> [(Pt, Pt); 3] {
        let width = self.geometry.width();
        let gutter = width.percent(5);
        let name_w = width.percent(30);
        let sign_w = width.percent(40);
        let date_w = width.percent(20);
        let x0 = self.geometry.left();
        let x1 = x0 + name_w + gutter;
        let x2 = x1 + sign_w + gutter;
        [(x0, name_w), (x1, sign_w), (x2, date_w)]
    }

    fn value_lines(&self, text: &str, width: Pt) -> Vec<String> {
        let text = inline::preprocess_markup(text).replace('\n', " ");
        wrap_line(
            self.fonts,
            &text,
            width,
            self.typography.body_size,
            InlineStyleState::default(),
        )
    }

    fn render_signature(&mut self, signature: &SignatureNode) {
        let height = self.signature_height(signature);
        self.ensure_space(height);
        let top = self.cursor.y;
        let rule_y = top + self.signature_rule_offset(signature);
        let label_y = rule_y + self.typography.label_size + Pt::from_f32(2.0);
        match signature {
            SignatureNode::Parent {
                name,
                date,
                name_label,
                signature_label,
                date_label,
            } => {
                let columns = self.signature_columns();
                for (text, (x, width)) in [(name, columns[0]), (date, columns[2])] {
                    let lines = self.value_lines(text, width);
                    let count = lines.len() as i32;
                    let style = LineStyle {
                        font_size: self.typography.body_size,
                        width,
                        base: InlineStyleState::default(),
                    };
                    for (i, line) in lines.iter().enumerate() {
                        let baseline = rule_y - Pt::from_f32(3.0)
                            - self.typography.line_height * (count - 1 - i as i32);
                        inline::render_line(&mut self.canvas, self.fonts, line, x, baseline, &style);
                    }
                }
                self.draw_rules(&columns, rule_y);
                for (label, (x, width)) in [
                    (name_label, columns[0]),
                    (signature_label, columns[1]),
                    (date_label, columns[2]),
                ] {
                    self.draw_label(label, x, width, label_y);
                }
            }
            SignatureNode::Institution { signature_label } => {
                let full = [(self.geometry.left(), self.geometry.width())];
                self.draw_rules(&full, rule_y);
                self.draw_label(signature_label, self.geometry.left(), self.geometry.width(), label_y);
            }
        }
        self.cursor.y = top;
        self.advance(height);
        self.restore_body_font();
    }

    fn draw_rules(&mut self, columns: &[(Pt, Pt)], y: Pt) {
        self.canvas.save_state();
        self.canvas.set_stroke_color(Color::BLACK);
        self.canvas.set_line_width(Pt::from_f32(0.75));
        for (x, width) in columns {
            self.canvas.hline(*x, *x + *width, y);
        }
        self.canvas.restore_state();
    }

    fn draw_label(&mut self, label: &str, x: Pt, width: Pt, y: Pt) {
        let label = inline::preprocess_markup(label).replace('\n', " ");
        let style = LineStyle {
            font_size: self.typography.label_size,
            width,
            base: InlineStyleState::default(),
        };
        inline::render_line(&mut self.canvas, self.fonts, &label, x, y, &style);
    }

    fn restore_body_font(&mut self) {
        let body = self.fonts.face_name(FontVariant::Regular);
        self.canvas.set_font_name(&body);
        self.canvas.set_font_size(self.typography.body_size);
    }

    fn draw_line(&mut self, line: &str, line_height: Pt, style: &LineStyle) {
        self.ensure_space(line_height);
        let baseline = self.cursor.y + style.font_size;
        inline::render_line(
            &mut self.canvas,
            self.fonts,
            line,
            self.geometry.left(),
            baseline,
            style,
        );
        self.advance(line_height);
    }

    /// Breaks the page first when a box of `height` would pass the bottom
    /// margin. A box taller than a whole page is placed at the top anyway.
    fn ensure_space(&mut self, height: Pt) {
        if self.cursor.y + height > self.geometry.bottom() && self.cursor.y > self.geometry.top() {
            self.new_page();
        }
    }

    fn advance(&mut self, dy: Pt) {
        self.cursor.y = (self.cursor.y + dy).min(self.geometry.bottom());
    }

    fn new_page(&mut self) {
        let from_page = self.cursor.page_index;
        self.canvas.show_page();
        self.cursor.page_index += 1;
        self.cursor.y = self.geometry.top();
        if let Some(section) = self.section.clone() {
            self.canvas.meta(SECTION_META_KEY, section);
        }
        self.restore_body_font();
        log::trace!(
            "page break {} -> {} in section {:?}",
            from_page,
            self.cursor.page_index,
            self.section
        );
        if let Some(debug) = &self.debug {
            debug.event(
                "layout.page_break",
                serde_json::json!({
                    "from_page": from_page,
                    "to_page": self.cursor.page_index,
                    "section": self.section,
                }),
            );
        }
    }
}

/// Greedy word wrap of one logical line. Styles that are open at a wrap point
/// are reopened on the next line, and a centered line stays centered on every
/// wrapped line. Words wider than `max_width` are split by character.
///
/// Each drawn line still starts from a fresh style state; wrapped continuation
/// lines inherit the open styles on purpose through the reopening tokens
/// prepended here.
pub(crate) fn wrap_line(
    fonts: &FontRegistry,
    text: &str,
    max_width: Pt,
    font_size: Pt,
    base: InlineStyleState,
) -> Vec<String> {
    let max_width = max_width.max(Pt::from_f32(1.0));
    let centered = inline::is_centered(text);
    let fits = |candidate: &str| inline::measure_line(fonts, candidate, font_size, base) <= max_width;

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prefix = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() {
            let trial = format!("{current} {word}");
            if fits(&trial) {
                current = trial;
                continue;
            }
            prefix = reopen_tokens(inline::state_after(&current, base), base);
            lines.push(std::mem::take(&mut current));
        }
        let trial = format!("{prefix}{word}");
        if fits(&trial) {
            current = trial;
            continue;
        }
        let mut pieces = split_long_word(fonts, &trial, max_width, font_size, base);
        current = pieces.pop().unwrap_or_default();
        lines.extend(pieces);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if centered {
        for line in &mut lines {
            if !inline::is_centered(line) {
                line.insert_str(0, CENTER_TOKEN);
            }
        }
    }
    lines
}

fn reopen_tokens(state: InlineStyleState, base: InlineStyleState) -> String {
    let mut out = String::new();
    if state.bold != base.bold {
        out.push_str(BOLD_TOKEN);
    }
    if state.italic != base.italic {
        out.push_str(ITALIC_TOKEN);
    }
    out
}

fn split_long_word(
    fonts: &FontRegistry,
    word: &str,
    max_width: Pt,
    font_size: Pt,
    base: InlineStyleState,
) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for segment in inline::tokenize(word) {
        let chunk: Vec<String> = match segment {
            Segment::Text(text) => text.chars().map(|ch| ch.to_string()).collect(),
            Segment::Bold => vec![BOLD_TOKEN.to_string()],
            Segment::Italic => vec![ITALIC_TOKEN.to_string()],
            Segment::Center => vec![CENTER_TOKEN.to_string()],
            Segment::Checkbox(checked) => vec![inline::checkbox_token(checked)],
        };
        for piece in chunk {
            let trial = format!("{current}{piece}");
            let has_content = inline::measure_line(fonts, &current, font_size, base) > Pt::ZERO;
            if has_content && inline::measure_line(fonts, &trial, font_size, base) > max_width {
                let reopen = reopen_tokens(inline::state_after(&current, base), base);
                pieces.push(std::mem::take(&mut current));
                current = format!("{reopen}{piece}");
            } else {
                current = trial;
            }
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
