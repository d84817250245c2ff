//! Element data model.
//!
//! An [`Element`] is the unit of identity, versioning and merge. Geometry is
//! stored as an unrotated box `(x, y, width, height)` rotated by `angle`
//! around its centre. Point-based elements (line, arrow, freedraw) also store
//! `points` relative to `(x, y)`, normalised so the box is their envelope.

mod style;
mod text;

pub use style::{
    Arrowhead, ElementStyle, FillPattern, SerializableColor, Sloppiness, StrokeStyle,
};
pub use text::{ApproxTextMeasure, FontFamily, TextMeasure};

use kurbo::{Affine, BezPath, Point, Rect, Shape as _, Vec2};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::binding::Binding;
use crate::geometry::{self, BoundaryShape};
use crate::tools::StyleDefaults;

/// Unique identifier for elements.
pub type ElementId = Uuid;

/// Identifier shared by all members of a group.
pub type GroupId = String;

/// Random 32-bit value used for version nonces and render seeds.
pub fn random_u32() -> u32 {
    (Uuid::new_v4().as_u128() >> 64) as u32
}

/// Element type tag without the type-specific payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Rectangle,
    Ellipse,
    Diamond,
    Line,
    Arrow,
    Freedraw,
    Text,
    Image,
}

impl ElementType {
    /// Line, arrow and freedraw elements carry a point list.
    pub fn is_point_based(&self) -> bool {
        matches!(self, ElementType::Line | ElementType::Arrow | ElementType::Freedraw)
    }

    /// Line and arrow elements are connectors with editable endpoints.
    pub fn is_linear(&self) -> bool {
        matches!(self, ElementType::Line | ElementType::Arrow)
    }

    /// Types an arrow endpoint may attach to.
    pub fn is_bindable(&self) -> bool {
        matches!(
            self,
            ElementType::Rectangle
                | ElementType::Ellipse
                | ElementType::Diamond
                | ElementType::Text
                | ElementType::Image
        )
    }
}

/// Arrow-specific attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrowData {
    #[serde(default)]
    pub start_binding: Option<Binding>,
    #[serde(default)]
    pub end_binding: Option<Binding>,
    #[serde(default)]
    pub start_arrowhead: Option<Arrowhead>,
    #[serde(default)]
    pub end_arrowhead: Option<Arrowhead>,
}

/// Text-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextData {
    pub text: String,
    pub font_size: f64,
    #[serde(default)]
    pub font_family: FontFamily,
    #[serde(default = "default_line_height")]
    pub line_height: f64,
}

fn default_line_height() -> f64 {
    1.25
}

impl Default for TextData {
    fn default() -> Self {
        Self {
            text: String::new(),
            font_size: 20.0,
            font_family: FontFamily::default(),
            line_height: default_line_height(),
        }
    }
}

/// Image-specific attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageData {
    /// Reference into the external file store.
    pub file_id: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for ImageData {
    fn default() -> Self {
        Self {
            file_id: String::new(),
            scale: default_scale(),
        }
    }
}

/// Type tag plus the attribute group that type enables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementKind {
    Rectangle,
    Ellipse,
    Diamond,
    Line,
    Arrow(ArrowData),
    Freedraw,
    Text(TextData),
    Image(ImageData),
}

impl ElementKind {
    /// Default attributes for a freshly created element of `ty`.
    pub fn for_type(ty: ElementType) -> Self {
        match ty {
            ElementType::Rectangle => ElementKind::Rectangle,
            ElementType::Ellipse => ElementKind::Ellipse,
            ElementType::Diamond => ElementKind::Diamond,
            ElementType::Line => ElementKind::Line,
            ElementType::Arrow => ElementKind::Arrow(ArrowData {
                end_arrowhead: Some(Arrowhead::Arrow),
                ..Default::default()
            }),
            ElementType::Freedraw => ElementKind::Freedraw,
            ElementType::Text => ElementKind::Text(TextData::default()),
            ElementType::Image => ElementKind::Image(ImageData::default()),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            ElementKind::Rectangle => ElementType::Rectangle,
            ElementKind::Ellipse => ElementType::Ellipse,
            ElementKind::Diamond => ElementType::Diamond,
            ElementKind::Line => ElementType::Line,
            ElementKind::Arrow(_) => ElementType::Arrow,
            ElementKind::Freedraw => ElementType::Freedraw,
            ElementKind::Text(_) => ElementType::Text,
            ElementKind::Image(_) => ElementType::Image,
        }
    }
}

/// Back-reference from a bindable element to a connector attached to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundElement {
    pub id: ElementId,
    #[serde(rename = "type")]
    pub kind: ElementType,
}

/// The atomic drawable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Element {
    pub id: ElementId,
    #[serde(flatten)]
    pub kind: ElementKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Rotation in radians around the box centre.
    #[serde(default)]
    pub angle: f64,
    /// Points relative to `(x, y)` for point-based elements.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
    pub style: ElementStyle,
    pub version: u32,
    pub version_nonce: u32,
    #[serde(default)]
    pub is_deleted: bool,
    /// Group memberships, innermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_ids: Vec<GroupId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bound_elements: Vec<BoundElement>,
}

impl Element {
    /// Create an uncommitted element (`version == 0`) at `(x, y)`.
    pub fn new(ty: ElementType, x: f64, y: f64, style: ElementStyle) -> Self {
        let points = if ty.is_point_based() {
            vec![Point::ZERO]
        } else {
            Vec::new()
        };
        Self {
            id: Uuid::new_v4(),
            kind: ElementKind::for_type(ty),
            x,
            y,
            width: 0.0,
            height: 0.0,
            angle: 0.0,
            points,
            style,
            version: 0,
            version_nonce: random_u32(),
            is_deleted: false,
            group_ids: Vec::new(),
            bound_elements: Vec::new(),
        }
    }

    /// Create an uncommitted element styled from `defaults`.
    pub fn create(ty: ElementType, x: f64, y: f64, defaults: &StyleDefaults) -> Self {
        let mut element = Self::new(ty, x, y, defaults.element_style());
        match &mut element.kind {
            ElementKind::Text(text) => {
                text.font_size = defaults.font_size;
                text.font_family = defaults.font_family;
            }
            ElementKind::Arrow(arrow) => {
                arrow.start_arrowhead = defaults.start_arrowhead;
                arrow.end_arrowhead = defaults.end_arrowhead;
            }
            _ => {}
        }
        element
    }

    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    /// Record a mutation: strictly increase `version` and re-roll the nonce.
    pub fn bump_version(&mut self) {
        self.version = self.version.saturating_add(1);
        self.version_nonce = random_u32();
    }

    /// True when two copies differ only in version metadata.
    pub fn same_content(&self, other: &Element) -> bool {
        let mut a = self.clone();
        a.version = other.version;
        a.version_nonce = other.version_nonce;
        &a == other
    }

    pub fn arrow(&self) -> Option<&ArrowData> {
        match &self.kind {
            ElementKind::Arrow(data) => Some(data),
            _ => None,
        }
    }

    pub fn arrow_mut(&mut self) -> Option<&mut ArrowData> {
        match &mut self.kind {
            ElementKind::Arrow(data) => Some(data),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&TextData> {
        match &self.kind {
            ElementKind::Text(data) => Some(data),
            _ => None,
        }
    }

    /// Unrotated box in canvas coordinates.
    pub fn local_rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.x + self.width, self.y + self.height)
    }

    pub fn center(&self) -> Point {
        self.local_rect().center()
    }

    /// Analytic boundary used for hit testing and bindings.
    pub fn boundary_shape(&self) -> Option<BoundaryShape> {
        match self.element_type() {
            ElementType::Ellipse => Some(BoundaryShape::Ellipse),
            ElementType::Diamond => Some(BoundaryShape::Diamond),
            ElementType::Rectangle | ElementType::Text | ElementType::Image => {
                Some(BoundaryShape::Rectangle)
            }
            _ => None,
        }
    }

    /// Axis-aligned bounds, accounting for rotation.
    pub fn bounds(&self) -> Rect {
        if self.element_type().is_point_based() {
            if let Some(rect) = geometry::points_bounds(&self.absolute_points()) {
                return rect;
            }
        }
        geometry::rotated_rect_bounds(self.local_rect(), self.angle)
    }

    /// Points in canvas coordinates.
    pub fn absolute_points(&self) -> Vec<Point> {
        let origin = Vec2::new(self.x, self.y);
        self.points.iter().map(|p| *p + origin).collect()
    }

    /// Replace the point list from canvas coordinates, re-deriving the box
    /// so that it is the envelope of the points.
    pub fn set_absolute_points(&mut self, points: &[Point]) {
        let Some(envelope) = geometry::points_bounds(points) else {
            self.points.clear();
            return;
        };
        self.x = envelope.x0;
        self.y = envelope.y0;
        self.width = envelope.width();
        self.height = envelope.height();
        let origin = Vec2::new(envelope.x0, envelope.y0);
        self.points = points.iter().map(|p| *p - origin).collect();
    }

    /// Flip the origin so width and height are non-negative.
    pub fn normalize(&mut self) {
        if self.width < 0.0 {
            self.x += self.width;
            self.width = -self.width;
        }
        if self.height < 0.0 {
            self.y += self.height;
            self.height = -self.height;
        }
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.x += delta.x;
        self.y += delta.y;
    }

    /// Outermost group this element belongs to.
    pub fn outermost_group(&self) -> Option<&GroupId> {
        self.group_ids.last()
    }

    /// Outline for the rendering backend, in canvas coordinates.
    pub fn to_path(&self) -> BezPath {
        let rect = self.local_rect();
        let path = match &self.kind {
            ElementKind::Rectangle | ElementKind::Text(_) | ElementKind::Image(_) => {
                if self.style.roundness > 0.0 {
                    rect.to_rounded_rect(self.style.roundness).to_path(0.1)
                } else {
                    rect.to_path(0.1)
                }
            }
            ElementKind::Ellipse => kurbo::Ellipse::from_rect(rect).to_path(0.1),
            ElementKind::Diamond => {
                let v = geometry::diamond_vertices(rect);
                let mut path = BezPath::new();
                path.move_to(v[0]);
                for p in &v[1..] {
                    path.line_to(*p);
                }
                path.close_path();
                path
            }
            ElementKind::Line | ElementKind::Arrow(_) => {
                let pts = self.absolute_points();
                let mut path = BezPath::new();
                if let Some((first, rest)) = pts.split_first() {
                    path.move_to(*first);
                    for p in rest {
                        path.line_to(*p);
                    }
                }
                path
            }
            ElementKind::Freedraw => geometry::catmull_rom_to_bezier(&self.absolute_points()),
        };
        if self.angle == 0.0 {
            path
        } else {
            Affine::rotate_about(self.angle, rect.center()) * path
        }
    }
}
