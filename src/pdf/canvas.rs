use lopdf::content::{Content, Operation};
use lopdf::{Object, StringFormat};

use super::fonts::{encode_win_ansi, Face};
use crate::error::RenderError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

pub const BLACK: Rgb = Rgb(0.0, 0.0, 0.0);
pub const GRAY: Rgb = Rgb(0.4, 0.4, 0.4);
pub const GOLD: Rgb = Rgb(0.83, 0.68, 0.21);

/// Accumulates drawing operations for one page of known size.
pub struct Canvas {
    pub width: f32,
    pub height: f32,
    ops: Vec<Operation>,
}

impl Canvas {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn stroke_rect(&mut self, x: f32, y: f32, w: f32, h: f32, line_width: f32, color: Rgb) {
        self.ops.extend([
            Operation::new("q", vec![]),
            Operation::new("RG", vec![color.0.into(), color.1.into(), color.2.into()]),
            Operation::new("w", vec![line_width.into()]),
            Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]),
            Operation::new("S", vec![]),
            Operation::new("Q", vec![]),
        ]);
    }

    pub fn text(&mut self, text: &str, x: f32, y: f32, face: Face, size: f32, color: Rgb) {
        self.ops.extend([
            Operation::new("BT", vec![]),
            Operation::new("rg", vec![color.0.into(), color.1.into(), color.2.into()]),
            Operation::new("Tf", vec![face.resource_name().into(), size.into()]),
            Operation::new("Td", vec![x.into(), y.into()]),
            Operation::new(
                "Tj",
                vec![Object::String(encode_win_ansi(text), StringFormat::Literal)],
            ),
            Operation::new("ET", vec![]),
        ]);
    }

    /// Draw `text` horizontally centered on the page, shrinking it if it
    /// would not fit between the side margins.
    pub fn centered_text(&mut self, text: &str, y: f32, face: Face, size: f32, color: Rgb) {
        let size = fit_size(text, face, size, self.width - 2.0 * SIDE_MARGIN);
        let x = (self.width - face.text_width(text, size)) / 2.0;
        self.text(text, x, y, face, size, color);
    }

    /// Draw `text` so that it ends at `right`.
    pub fn right_aligned_text(&mut self, text: &str, right: f32, y: f32, face: Face, size: f32, color: Rgb) {
        let x = right - face.text_width(text, size);
        self.text(text, x, y, face, size, color);
    }

    pub fn into_content(self) -> Result<Vec<u8>, RenderError> {
        Content {
            operations: self.ops,
        }
        .encode()
        .map_err(RenderError::Assemble)
    }
}

pub const SIDE_MARGIN: f32 = 60.0;

/// Largest size not above `size` at which `text` fits in `max_width`.
pub fn fit_size(text: &str, face: Face, size: f32, max_width: f32) -> f32 {
    let width = face.text_width(text, size);
    if width <= max_width || width == 0.0 || max_width <= 0.0 {
        size
    } else {
        size * max_width / width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fit_size_leaves_short_text_alone() {
        assert_eq!(fit_size("Ada", Face::Bold, 48.0, 700.0), 48.0);
    }

    #[test]
    fn fit_size_shrinks_long_text() {
        let name = "Maximiliana Evangelina Bartholomew-Featherstonehaugh III";
        let size = fit_size(name, Face::Bold, 48.0, 700.0);
        assert!(size < 48.0);
        assert!(Face::Bold.text_width(name, size) <= 700.0 + 1e-3);
    }

    #[test]
    fn centered_text_uses_measured_width() {
        let mut canvas = Canvas::new(800.0, 600.0);
        canvas.centered_text("Hi", 100.0, Face::Regular, 10.0, BLACK);
        let td = canvas
            .ops
            .iter()
            .find(|op| op.operator == "Td")
            .unwrap();
        let x = match td.operands[0] {
            Object::Real(x) => x as f32,
            _ => panic!("expected real operand"),
        };
        // (800 - 9.44) / 2
        assert!((x - 395.28).abs() < 1e-3);
    }
}
