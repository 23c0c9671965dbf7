use serde::Serialize;
use std::collections::BTreeMap;

/// Characters that could not be encoded for output, keyed by codepoint.
#[derive(Debug, Clone, Default)]
pub struct GlyphCoverageReport {
    missing: BTreeMap<u32, MissingGlyph>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingGlyph {
    pub codepoint: u32,
    pub ch: char,
    pub fonts: Vec<String>,
    pub count: usize,
}

impl GlyphCoverageReport {
    pub fn record_missing(&mut self, ch: char, fonts: Vec<String>) {
        let codepoint = ch as u32;
        let entry = self.missing.entry(codepoint).or_insert(MissingGlyph {
            codepoint,
            ch,
            fonts: Vec::new(),
            count: 0,
        });
        for font in fonts {
            if !entry.fonts.contains(&font) {
                entry.fonts.push(font);
            }
        }
        entry.count = entry.count.saturating_add(1);
    }

    pub fn missing(&self) -> Vec<MissingGlyph> {
        self.missing.values().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_characters_accumulate_fonts_and_counts() {
        let mut report = GlyphCoverageReport::default();
        report.record_missing('☃', vec!["Helvetica".to_string()]);
        report.record_missing('☃', vec!["Helvetica-Bold".to_string()]);
        report.record_missing('☃', vec!["Helvetica".to_string()]);
        let missing = report.missing();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].count, 3);
        assert_eq!(missing[0].fonts, vec!["Helvetica", "Helvetica-Bold"]);
    }
}
