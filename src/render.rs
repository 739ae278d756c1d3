use eframe::egui;

use crate::layout::{Diagram, Primitive};

/// Paint a laid-out diagram with its top-left corner at `origin`.
pub fn paint(painter: &egui::Painter, origin: egui::Pos2, diagram: &Diagram) {
    let offset = origin.to_vec2();
    for primitive in &diagram.primitives {
        match primitive {
            Primitive::Rect { rect, rounding, fill } => {
                painter.rect_filled(rect.translate(offset), *rounding, *fill);
            }
            Primitive::Text {
                pos,
                anchor,
                text,
                size,
                color,
            } => {
                painter.text(
                    *pos + offset,
                    *anchor,
                    text,
                    egui::FontId::proportional(*size),
                    *color,
                );
            }
            Primitive::Path { points, width, color } => {
                let stroke = egui::Stroke::new(*width, *color);
                for pair in points.windows(2) {
                    painter.line_segment([pair[0] + offset, pair[1] + offset], stroke);
                }
            }
            Primitive::Arrowhead {
                tip,
                dir,
                size,
                color,
            } => {
                let tip = *tip + offset;
                let back = tip - *dir * *size;
                let side = dir.rot90() * (*size * 0.5);
                painter.add(egui::Shape::convex_polygon(
                    vec![tip, back + side, back - side],
                    *color,
                    egui::Stroke::NONE,
                ));
            }
        }
    }
}
