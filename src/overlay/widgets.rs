//! Indicator shapes and how they are painted

use egui::epaint::{Mesh, Vertex, WHITE_UV};
use egui::{Color32, Painter, Pos2, Rect, Rounding, Stroke, Vec2};
use serde::{Deserialize, Serialize};
use std::f32::consts::{FRAC_PI_2, PI};

/// Inner radius of the star relative to its outer radius
pub const STAR_INNER_RATIO: f32 = 0.382;
const STAR_POINTS: usize = 5;

/// Shape of the live indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorShape {
    #[default]
    Star,
    Circle,
    Square,
}

impl IndicatorShape {
    /// Resolve into the immutable geometry a surface paints
    pub fn descriptor(self) -> ShapeDescriptor {
        match self {
            IndicatorShape::Star => ShapeDescriptor::Polygon(star_vertices(STAR_POINTS, STAR_INNER_RATIO)),
            IndicatorShape::Circle => ShapeDescriptor::Circle,
            IndicatorShape::Square => ShapeDescriptor::Square,
        }
    }
}

/// Resolved geometry. Polygon vertices are in unit space around the origin,
/// first vertex pointing up.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeDescriptor {
    Circle,
    Square,
    Polygon(Vec<Vec2>),
}

impl Default for ShapeDescriptor {
    fn default() -> Self {
        IndicatorShape::default().descriptor()
    }
}

fn star_vertices(points: usize, inner_ratio: f32) -> Vec<Vec2> {
    let step = PI / points as f32;
    (0..points * 2)
        .map(|i| {
            let radius = if i % 2 == 0 { 1.0 } else { inner_ratio };
            let angle = -FRAC_PI_2 + step * i as f32;
            Vec2::new(angle.cos(), angle.sin()) * radius
        })
        .collect()
}

/// Colours for the indicator
#[derive(Debug, Clone)]
pub struct IndicatorStyle {
    /// Fill colour (RGBA)
    pub fill: [f32; 4],
    /// Outline colour (RGBA)
    pub outline: [f32; 4],
    pub outline_width: f32,
}

impl Default for IndicatorStyle {
    fn default() -> Self {
        Self {
            fill: [0.90, 0.11, 0.14, 1.0],
            outline: [1.0, 1.0, 1.0, 0.9],
            outline_width: 2.0,
        }
    }
}

impl IndicatorStyle {
    pub fn fill_color(&self, opacity: f32) -> Color32 {
        rgba(self.fill, opacity)
    }

    pub fn outline_stroke(&self, opacity: f32) -> Stroke {
        Stroke::new(self.outline_width, rgba(self.outline, opacity))
    }
}

fn rgba(c: [f32; 4], opacity: f32) -> Color32 {
    Color32::from_rgba_unmultiplied(
        (c[0] * 255.0) as u8,
        (c[1] * 255.0) as u8,
        (c[2] * 255.0) as u8,
        (c[3] * opacity.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

/// Paint `shape` centred in `rect`, scaled by `scale` (1.0 fills the rect)
pub fn paint_indicator(
    painter: &Painter,
    rect: Rect,
    shape: &ShapeDescriptor,
    style: &IndicatorStyle,
    opacity: f32,
    scale: f32,
) {
    let center = rect.center();
    // Leave room for the pulse to grow without clipping
    let radius = rect.width().min(rect.height()) * 0.5 * scale / 1.1 - style.outline_width;
    let fill = style.fill_color(opacity);
    let stroke = style.outline_stroke(opacity);

    match shape {
        ShapeDescriptor::Circle => {
            painter.circle(center, radius, fill, stroke);
        }
        ShapeDescriptor::Square => {
            let square = Rect::from_center_size(center, Vec2::splat(radius * 2.0));
            painter.rect(square, Rounding::same(radius * 0.15), fill, stroke);
        }
        ShapeDescriptor::Polygon(unit) => {
            let points: Vec<Pos2> = unit.iter().map(|v| center + *v * radius).collect();
            painter.add(fan_mesh(center, &points, fill));
            let mut outline = points;
            if let Some(first) = outline.first().copied() {
                outline.push(first);
            }
            painter.add(egui::Shape::line(outline, stroke));
        }
    }
}

/// Triangle fan around `center`. Valid for any polygon that is star-shaped
/// with respect to its centre, which a concave star is.
fn fan_mesh(center: Pos2, points: &[Pos2], color: Color32) -> Mesh {
    let mut mesh = Mesh::default();
    mesh.vertices.push(Vertex { pos: center, uv: WHITE_UV, color });
    for p in points {
        mesh.vertices.push(Vertex { pos: *p, uv: WHITE_UV, color });
    }
    let n = points.len() as u32;
    for i in 0..n {
        mesh.add_triangle(0, 1 + i, 1 + (i + 1) % n);
    }
    mesh
}
