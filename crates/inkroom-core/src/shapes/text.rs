//! Text attributes and the glyph-metrics seam.

use kurbo::Size;
use serde::{Deserialize, Serialize};

/// Font family options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FontFamily {
    /// Hand-drawn style font.
    #[default]
    Hand,
    /// Clean sans-serif font.
    Sans,
    /// Monospaced font.
    Mono,
}

impl FontFamily {
    /// Average advance width as a fraction of the font size.
    fn advance_factor(&self) -> f64 {
        match self {
            FontFamily::Hand => 0.55,
            FontFamily::Sans => 0.52,
            FontFamily::Mono => 0.6,
        }
    }
}

/// Measures laid-out text.
///
/// The renderer owns real glyph metrics; the scene engine only needs the
/// resulting box so text elements can be re-measured after a resize or edit.
pub trait TextMeasure {
    fn measure(&self, text: &str, font_size: f64, family: FontFamily, line_height: f64) -> Size;
}

/// Glyph-free estimate using an average advance width per character.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTextMeasure;

impl TextMeasure for ApproxTextMeasure {
    fn measure(&self, text: &str, font_size: f64, family: FontFamily, line_height: f64) -> Size {
        let lines: Vec<&str> = text.split('\n').collect();
        let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0);
        Size::new(
            widest as f64 * font_size * family.advance_factor(),
            lines.len() as f64 * font_size * line_height,
        )
    }
}
