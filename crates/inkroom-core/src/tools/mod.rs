//! Tools and the style defaults stamped onto new elements.

use serde::{Deserialize, Serialize};

use crate::shapes::{
    Arrowhead, ElementStyle, ElementType, FillPattern, FontFamily, SerializableColor, Sloppiness,
    StrokeStyle, random_u32,
};

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    #[default]
    Select,
    Pan,
    Rectangle,
    Ellipse,
    Diamond,
    Line,
    Arrow,
    Freedraw,
    Text,
    Eraser,
}

impl ToolKind {
    /// Element type created by a drawing tool.
    pub fn element_type(&self) -> Option<ElementType> {
        match self {
            ToolKind::Rectangle => Some(ElementType::Rectangle),
            ToolKind::Ellipse => Some(ElementType::Ellipse),
            ToolKind::Diamond => Some(ElementType::Diamond),
            ToolKind::Line => Some(ElementType::Line),
            ToolKind::Arrow => Some(ElementType::Arrow),
            ToolKind::Freedraw => Some(ElementType::Freedraw),
            ToolKind::Text => Some(ElementType::Text),
            ToolKind::Select | ToolKind::Pan | ToolKind::Eraser => None,
        }
    }
}

/// Current default style values for newly created elements.
///
/// Passed explicitly into creation calls; changing the defaults never
/// affects existing elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleDefaults {
    pub stroke_color: SerializableColor,
    pub background_color: Option<SerializableColor>,
    pub fill_pattern: FillPattern,
    pub stroke_width: f64,
    pub stroke_style: StrokeStyle,
    pub sloppiness: Sloppiness,
    pub roundness: f64,
    pub opacity: f64,
    pub font_size: f64,
    pub font_family: FontFamily,
    pub start_arrowhead: Option<Arrowhead>,
    pub end_arrowhead: Option<Arrowhead>,
}

impl Default for StyleDefaults {
    fn default() -> Self {
        Self {
            stroke_color: SerializableColor::black(),
            background_color: None,
            fill_pattern: FillPattern::Solid,
            stroke_width: 2.0,
            stroke_style: StrokeStyle::Solid,
            sloppiness: Sloppiness::Artist,
            roundness: 0.0,
            opacity: 1.0,
            font_size: 20.0,
            font_family: FontFamily::default(),
            start_arrowhead: None,
            end_arrowhead: Some(Arrowhead::Arrow),
        }
    }
}

impl StyleDefaults {
    /// Element style with a fresh render seed.
    pub fn element_style(&self) -> ElementStyle {
        ElementStyle {
            stroke_color: self.stroke_color,
            background_color: self.background_color,
            fill_pattern: self.fill_pattern,
            stroke_width: self.stroke_width,
            stroke_style: self.stroke_style,
            sloppiness: self.sloppiness,
            roundness: self.roundness,
            opacity: self.opacity,
            seed: random_u32(),
        }
    }
}
