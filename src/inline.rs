use crate::canvas::Canvas;
use crate::font::{DINGBATS_FONT, FontRegistry, FontVariant, checkbox_glyph};
use crate::types::Pt;

pub const BOLD_TOKEN: &str = "**";
pub const ITALIC_TOKEN: &str = "__";
pub const CENTER_TOKEN: &str = "^^";
pub const CHECKED: char = '☑';
pub const UNCHECKED: char = '☐';

pub(crate) fn checkbox_token(checked: bool) -> String {
    if checked { CHECKED } else { UNCHECKED }.to_string()
}

/// Style toggles in effect while walking one line. Every line starts from the
/// base style; nothing carries over from the previous line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InlineStyleState {
    pub bold: bool,
    pub italic: bool,
}

impl InlineStyleState {
    fn variant(self) -> FontVariant {
        FontVariant::from_flags(self.bold, self.italic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    Bold,
    Italic,
    Center,
    Checkbox(bool),
}

/// Splits a line into text runs and flat tokens. Tokens never nest.
pub(crate) fn tokenize(line: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    while i < line.len() {
        let rest = &line[i..];
        let token = if rest.starts_with(BOLD_TOKEN) {
            Some((Segment::Bold, BOLD_TOKEN.len()))
        } else if rest.starts_with(ITALIC_TOKEN) {
            Some((Segment::Italic, ITALIC_TOKEN.len()))
        } else if rest.starts_with(CENTER_TOKEN) {
            Some((Segment::Center, CENTER_TOKEN.len()))
        } else if rest.starts_with(CHECKED) {
            Some((Segment::Checkbox(true), CHECKED.len_utf8()))
        } else if rest.starts_with(UNCHECKED) {
            Some((Segment::Checkbox(false), UNCHECKED.len_utf8()))
        } else {
            None
        };
        match token {
            Some((segment, len)) => {
                if text_start < i {
                    out.push(Segment::Text(&line[text_start..i]));
                }
                out.push(segment);
                i += len;
                text_start = i;
            }
            None => {
                i += rest.chars().next().map(char::len_utf8).unwrap_or(1);
            }
        }
    }
    if text_start < line.len() {
        out.push(Segment::Text(&line[text_start..]));
    }
    out
}

pub(crate) fn is_centered(line: &str) -> bool {
    line.contains(CENTER_TOKEN)
}

/// Style in effect after walking `line` from `start`.
pub(crate) fn state_after(line: &str, start: InlineStyleState) -> InlineStyleState {
    tokenize(line)
        .into_iter()
        .fold(start, |mut state, segment| {
            match segment {
                Segment::Bold => state.bold = !state.bold,
                Segment::Italic => state.italic = !state.italic,
                _ => {}
            }
            state
        })
}

/// Rendered width of `line`: tokens take no space, each run is measured in the
/// font its style selects and checkboxes use the dingbat advance.
pub(crate) fn measure_line(
    fonts: &FontRegistry,
    line: &str,
    font_size: Pt,
    base: InlineStyleState,
) -> Pt {
    let mut state = base;
    let mut width = Pt::ZERO;
    for segment in tokenize(line) {
        match segment {
            Segment::Text(text) => {
                width += fonts.measure_text_width(&fonts.face_name(state.variant()), font_size, text);
            }
            Segment::Checkbox(checked) => {
                width += checkbox_width(fonts, font_size, checked);
            }
            Segment::Bold => state.bold = !state.bold,
            Segment::Italic => state.italic = !state.italic,
            Segment::Center => {}
        }
    }
    width
}

fn checkbox_width(fonts: &FontRegistry, font_size: Pt, checked: bool) -> Pt {
    let glyph = checkbox_glyph(checked).to_string();
    fonts.measure_text_width(DINGBATS_FONT, font_size, &glyph)
}

/// Where and how a line is drawn.
#[derive(Debug, Clone, Copy)]
pub struct LineStyle {
    pub font_size: Pt,
    /// Width of the box used to center lines that carry a center token.
    pub width: Pt,
    pub base: InlineStyleState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineOutcome {
    pub end_x: Pt,
    pub state: InlineStyleState,
}

/// Draws one line with its baseline at `y`, starting at `x` or centered in
/// `x..x + style.width` when the line contains a center token.
pub fn render_line(
    canvas: &mut Canvas,
    fonts: &FontRegistry,
    line: &str,
    x: Pt,
    y: Pt,
    style: &LineStyle,
) -> LineOutcome {
    let segments = tokenize(line);
    let mut cursor_x = x;
    if segments.iter().any(|s| matches!(s, Segment::Center)) {
        let measured = measure_line(fonts, line, style.font_size, style.base);
        cursor_x = x + ((style.width - measured) / 2).max(Pt::ZERO);
    }

    let mut state = style.base;
    canvas.set_font_size(style.font_size);
    for segment in segments {
        match segment {
            Segment::Text(text) => {
                let font = fonts.face_name(state.variant());
                let width = fonts.measure_text_width(&font, style.font_size, text);
                canvas.set_font_name(&font);
                canvas.draw_string(cursor_x, y, text);
                cursor_x += width;
            }
            Segment::Checkbox(checked) => {
                canvas.set_font_name(DINGBATS_FONT);
                canvas.draw_string(cursor_x, y, checkbox_glyph(checked).to_string());
                cursor_x += checkbox_width(fonts, style.font_size, checked);
            }
            Segment::Bold => state.bold = !state.bold,
            Segment::Italic => state.italic = !state.italic,
            Segment::Center => {}
        }
    }
    LineOutcome {
        end_x: cursor_x,
        state,
    }
}

/// Converts the small HTML subset found in content templates to inline tokens.
/// Unknown tags are dropped; a `<` that does not open a tag is kept.
pub fn preprocess_markup(text: &str) -> String {
    let text = text.replace("\\n", "\n");
    let mut out = String::with_capacity(text.len());
    let mut rest = text.as_str();
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            out.push_str(&rest[open..]);
            return out;
        };
        let inner = after[..close].trim();
        let closing = inner.starts_with('/');
        let name: String = inner
            .trim_start_matches('/')
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if name.is_empty() || !name.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
            out.push('<');
            rest = after;
            continue;
        }
        match name.as_str() {
            "b" | "strong" => out.push_str(BOLD_TOKEN),
            "i" | "em" => out.push_str(ITALIC_TOKEN),
            "center" if !closing => out.push_str(CENTER_TOKEN),
            "br" => out.push('\n'),
            _ => {}
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::types::Size;

    fn style(width: f32) -> LineStyle {
        LineStyle {
            font_size: Pt::from_f32(10.0),
            width: Pt::from_f32(width),
            base: InlineStyleState::default(),
        }
    }

    fn draws(canvas: &mut Canvas) -> Vec<(Pt, String)> {
        canvas.show_page();
        canvas.take_pages()[0]
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawString { x, text, .. } => Some((*x, text.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn bold_parity_decides_end_state() {
        let fonts = FontRegistry::new();
        let mut canvas = Canvas::new(Size::letter());
        let even = render_line(
            &mut canvas,
            &fonts,
            "a **b** c **d**",
            Pt::ZERO,
            Pt::from_f32(20.0),
            &style(500.0),
        );
        assert!(!even.state.bold);
        let odd = render_line(
            &mut canvas,
            &fonts,
            "a **b** c **d",
            Pt::ZERO,
            Pt::from_f32(40.0),
            &style(500.0),
        );
        assert!(odd.state.bold);
        assert!(!odd.state.italic);
    }

    #[test]
    fn styled_runs_switch_fonts_mid_line() {
        let fonts = FontRegistry::new();
        let mut canvas = Canvas::new(Size::letter());
        render_line(
            &mut canvas,
            &fonts,
            "plain **bold __both** italic",
            Pt::ZERO,
            Pt::from_f32(20.0),
            &style(500.0),
        );
        canvas.show_page();
        let page = canvas.take_pages().remove(0);
        let fonts_used: Vec<&str> = page
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::SetFontName(name) => Some(name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            fonts_used,
            vec!["Helvetica-Bold", "Helvetica-BoldOblique", "Helvetica-Oblique"]
        );
    }

    #[test]
    fn center_token_centers_whole_line() {
        let fonts = FontRegistry::new();
        let mut canvas = Canvas::new(Size::letter());
        let left = Pt::from_f32(54.0);
        let outcome = render_line(
            &mut canvas,
            &fonts,
            "Hello ^^world",
            left,
            Pt::from_f32(20.0),
            &style(504.0),
        );
        let width = measure_line(&fonts, "Hello world", Pt::from_f32(10.0), InlineStyleState::default());
        let runs = draws(&mut canvas);
        let expected_x = left + (Pt::from_f32(504.0) - width) / 2;
        assert_eq!(runs[0], (expected_x, "Hello ".to_string()));
        assert_eq!(outcome.end_x, expected_x + width);
    }

    #[test]
    fn checkboxes_draw_in_dingbats_and_advance() {
        let fonts = FontRegistry::new();
        let mut canvas = Canvas::new(Size::letter());
        let outcome = render_line(
            &mut canvas,
            &fonts,
            "☑☐",
            Pt::ZERO,
            Pt::from_f32(20.0),
            &style(500.0),
        );
        // 760 + 761 units at 10pt
        assert_eq!(outcome.end_x, Pt::from_f32(15.21));
        let runs = draws(&mut canvas);
        assert_eq!(runs[0], (Pt::ZERO, "4".to_string()));
        assert_eq!(runs[1], (Pt::from_f32(7.6), "o".to_string()));
    }

    #[test]
    fn tokens_take_no_width() {
        let fonts = FontRegistry::new();
        let size = Pt::from_f32(10.0);
        let base = InlineStyleState::default();
        assert_eq!(
            measure_line(&fonts, "__ab__^^", size, base),
            fonts.measure_text_width("Helvetica-Oblique", size, "ab")
        );
        assert!(state_after("**a __b", base).bold);
        assert!(is_centered("x^^"));
    }

    #[test]
    fn markup_maps_to_tokens() {
        assert_eq!(
            preprocess_markup("<b>Bold</b> and <strong>x</strong>"),
            "**Bold** and **x**"
        );
        assert_eq!(preprocess_markup("<i>a</i><EM>b</EM>"), "__a____b__");
        assert_eq!(preprocess_markup("<center>Title</center>"), "^^Title");
        assert_eq!(preprocess_markup("one<br/>two\\nthree"), "one\ntwo\nthree");
        assert_eq!(preprocess_markup("<span class=\"x\">keep</span>"), "keep");
        assert_eq!(preprocess_markup("1 < 2 and 3 > 2"), "1 < 2 and 3 > 2");
        assert_eq!(preprocess_markup("open <b"), "open <b");
    }
}
