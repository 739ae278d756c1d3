//! Diagram layout: turns a patch result into a flat list of shapes.
//!
//! Nothing here touches a painter, so the geometry can be checked in tests
//! without a window.

use egui::{Align2, Color32, Pos2, Rect, Vec2, pos2, vec2};

use crate::model::{Parameters, PatchResult, Token};
use crate::tokenize::resolve_index;

pub const CANVAS_HEIGHT: f32 = 600.0;
pub const MARGIN: f32 = 20.0;

pub const BAND_TOP: f32 = 220.0;
pub const BAND_HEIGHT: f32 = 90.0;
pub const BAND_GAP: f32 = 110.0;
pub const BAND_ROUNDING: f32 = 8.0;

pub const TOKEN_WIDTH: f32 = 64.0;
pub const TOKEN_HEIGHT: f32 = 32.0;
pub const TOKEN_GAP: f32 = 10.0;
pub const TOKEN_PITCH: f32 = TOKEN_WIDTH + TOKEN_GAP;
/// Offset of the first token box from the band's left edge / top edge.
const TOKEN_INSET: Vec2 = Vec2 { x: 12.0, y: 42.0 };

const LABEL_X: f32 = 0.0;
const VALUE_X: f32 = 120.0;
const WIDE_VALUE_X: f32 = 180.0;
const ARROW_WIDTH: f32 = 3.0;
const ARROWHEAD_SIZE: f32 = 10.0;

pub const SOURCE_COLOR: Color32 = Color32::from_rgb(76, 175, 80);
pub const TARGET_COLOR: Color32 = Color32::from_rgb(33, 150, 243);
pub const PATCHED_COLOR: Color32 = Color32::from_rgb(255, 152, 0);
pub const ARROW_COLOR: Color32 = Color32::from_rgb(244, 67, 54);
pub const TEXT_COLOR: Color32 = Color32::from_rgb(40, 40, 40);
pub const TOKEN_TEXT_COLOR: Color32 = Color32::WHITE;

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Rect {
        rect: Rect,
        rounding: f32,
        fill: Color32,
    },
    Text {
        pos: Pos2,
        anchor: Align2,
        text: String,
        size: f32,
        color: Color32,
    },
    /// Open polyline; two points for a straight segment.
    Path {
        points: Vec<Pos2>,
        width: f32,
        color: Color32,
    },
    /// Filled triangle whose tip sits at `tip`, pointing along `dir`.
    Arrowhead {
        tip: Pos2,
        dir: Vec2,
        size: f32,
        color: Color32,
    },
}

/// Shapes in canvas-local coordinates, origin at the top-left corner.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagram {
    pub size: Vec2,
    pub primitives: Vec<Primitive>,
}

/// Which band a token row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Band {
    Source,
    Target,
}

impl Band {
    fn color(self) -> Color32 {
        match self {
            Band::Source => SOURCE_COLOR,
            Band::Target => TARGET_COLOR,
        }
    }

    fn top(self) -> f32 {
        match self {
            Band::Source => MARGIN + BAND_TOP,
            Band::Target => MARGIN + BAND_TOP + BAND_HEIGHT + BAND_GAP,
        }
    }
}

/// Horizontal placement of one band's token boxes.
///
/// The pitch shrinks below [`TOKEN_PITCH`] when that is what it takes for
/// every token to fit inside the band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenRow {
    left: f32,
    top: f32,
    pitch: f32,
}

impl TokenRow {
    fn fit(band: Band, band_width: f32, count: usize) -> Self {
        let usable = (band_width - 2.0 * TOKEN_INSET.x).max(0.0);
        let pitch = if count == 0 {
            TOKEN_PITCH
        } else {
            TOKEN_PITCH.min(usable / count as f32)
        };
        Self {
            left: MARGIN + TOKEN_INSET.x,
            top: band.top() + TOKEN_INSET.y,
            pitch,
        }
    }

    fn scale(self) -> f32 {
        self.pitch / TOKEN_PITCH
    }

    /// Box for token `index`. Works for any index, in range or not.
    pub fn rect(self, index: i64) -> Rect {
        let min = pos2(self.left + index as f32 * self.pitch, self.top);
        Rect::from_min_size(min, vec2(TOKEN_WIDTH * self.scale(), TOKEN_HEIGHT))
    }

    fn font_size(self) -> f32 {
        (13.0 * self.scale()).max(8.0)
    }
}

/// Band tint for a token whose activation norm is `norm` out of `max`.
fn shade(color: Color32, norm: f32, max: f32) -> Color32 {
    let level = if max > 0.0 { (norm / max).clamp(0.0, 1.0) } else { 1.0 };
    color.gamma_multiply(0.35 + 0.65 * level)
}

struct Builder {
    primitives: Vec<Primitive>,
}

impl Builder {
    fn text(&mut self, pos: Pos2, anchor: Align2, text: impl Into<String>, size: f32, color: Color32) {
        self.primitives.push(Primitive::Text {
            pos,
            anchor,
            text: text.into(),
            size,
            color,
        });
    }

    fn callout(&mut self, y: f32, label: &str, value_x: f32, value: &str, color: Color32) {
        self.text(pos2(MARGIN + LABEL_X, MARGIN + y), Align2::LEFT_CENTER, label, 14.0, TEXT_COLOR);
        self.text(pos2(MARGIN + value_x, MARGIN + y), Align2::LEFT_CENTER, value, 14.0, color);
    }

    fn band(
        &mut self,
        band: Band,
        width: f32,
        label: String,
        tokens: &[Token],
        active: i64,
        norms: Option<&[f32]>,
    ) -> Pos2 {
        let left = MARGIN;
        let top = band.top();
        let color = band.color();
        self.primitives.push(Primitive::Rect {
            rect: Rect::from_min_size(pos2(left, top), vec2(width, BAND_HEIGHT)),
            rounding: BAND_ROUNDING,
            fill: color.gamma_multiply(0.2),
        });
        self.text(pos2(left + 12.0, top + 18.0), Align2::LEFT_CENTER, label, 15.0, color);

        let row = TokenRow::fit(band, width, tokens.len());
        let max_norm = norms
            .map(|n| n.iter().copied().fold(0.0_f32, f32::max))
            .unwrap_or(0.0);
        for token in tokens {
            let rect = row.rect(token.index as i64);
            let fill = if token.index as i64 == active {
                PATCHED_COLOR
            } else {
                match norms.and_then(|n| n.get(token.index)) {
                    Some(&norm) => shade(color, norm, max_norm),
                    None => color,
                }
            };
            self.primitives.push(Primitive::Rect {
                rect,
                rounding: 4.0,
                fill,
            });
            self.text(
                rect.center(),
                Align2::CENTER_CENTER,
                token.text.clone(),
                row.font_size(),
                TOKEN_TEXT_COLOR,
            );
        }

        row.rect(active).center()
    }
}

/// Lay out the whole patching diagram for a container `width` pixels wide.
pub fn layout(result: &PatchResult, params: &Parameters, width: f32) -> Diagram {
    let inner_width = (width - 2.0 * MARGIN).max(0.0);
    let mut b = Builder {
        primitives: Vec::new(),
    };

    b.text(
        pos2(MARGIN + inner_width / 2.0, MARGIN),
        Align2::CENTER_CENTER,
        "Patching Visualization",
        18.0,
        TEXT_COLOR,
    );

    b.callout(30.0, "Source Prompt:", VALUE_X, &params.source_prompt, TEXT_COLOR);
    b.callout(60.0, "Source Output:", VALUE_X, &result.source_output, SOURCE_COLOR);
    b.callout(100.0, "Target Prompt:", VALUE_X, &params.target_prompt, TEXT_COLOR);
    b.callout(130.0, "Original Target Output:", WIDE_VALUE_X, &result.target_output, TARGET_COLOR);
    b.callout(160.0, "Patched Target Output:", WIDE_VALUE_X, &result.patched_output, PATCHED_COLOR);

    let source_active = resolve_index(params.source_token_index, result.source_tokens.len());
    let target_active = resolve_index(params.target_token_index, result.target_tokens.len());

    let source_center = b.band(
        Band::Source,
        inner_width,
        format!("Source Layer {}", params.source_layer_index),
        &result.source_tokens,
        source_active,
        result.source_activations.as_deref(),
    );
    let target_center = b.band(
        Band::Target,
        inner_width,
        format!("Target Layer {}", params.target_layer_index),
        &result.target_tokens,
        target_active,
        result.target_activations.as_deref(),
    );

    let start = source_center + vec2(0.0, TOKEN_HEIGHT / 2.0);
    let end = target_center - vec2(0.0, TOKEN_HEIGHT / 2.0);
    let points = connector(start, end, params.source_layer_index == params.target_layer_index);
    let dir = arrow_direction(&points);
    b.primitives.push(Primitive::Path {
        points,
        width: ARROW_WIDTH,
        color: ARROW_COLOR,
    });
    b.primitives.push(Primitive::Arrowhead {
        tip: end,
        dir,
        size: ARROWHEAD_SIZE,
        color: ARROW_COLOR,
    });

    let gap_mid = Band::Source.top() + BAND_HEIGHT + BAND_GAP / 2.0;
    b.text(
        pos2(MARGIN + inner_width / 2.0, gap_mid - 14.0),
        Align2::CENTER_CENTER,
        format!(
            "Patching token {} from Source to token {} in Target",
            params.source_token_index, params.target_token_index
        ),
        13.0,
        ARROW_COLOR,
    );

    Diagram {
        size: vec2(width, CANVAS_HEIGHT),
        primitives: b.primitives,
    }
}

/// Same layer: drop down, run across at mid-height, drop again.
/// Different layers: straight diagonal.
fn connector(start: Pos2, end: Pos2, same_layer: bool) -> Vec<Pos2> {
    if same_layer {
        let mid_y = (start.y + end.y) / 2.0;
        vec![start, pos2(start.x, mid_y), pos2(end.x, mid_y), end]
    } else {
        vec![start, end]
    }
}

fn arrow_direction(points: &[Pos2]) -> Vec2 {
    let [.., from, to] = points else {
        return Vec2::DOWN;
    };
    let d = *to - *from;
    if d.length_sq() > 0.0 { d.normalized() } else { Vec2::DOWN }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PatchBackend, TokenizingBackend};
    use pretty_assertions::assert_eq;

    fn row(band: Band, count: usize) -> TokenRow {
        TokenRow::fit(band, 900.0 - 2.0 * MARGIN, count)
    }

    fn token_boxes(d: &Diagram) -> Vec<Rect> {
        d.primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Rect { rect, rounding, .. } if *rounding < BAND_ROUNDING => Some(*rect),
                _ => None,
            })
            .collect()
    }

    fn diagram(params: &Parameters) -> Diagram {
        let result = TokenizingBackend.patch(params).unwrap();
        layout(&result, params, 900.0)
    }

    fn highlighted(d: &Diagram) -> Vec<Rect> {
        d.primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Rect { rect, fill, .. } if *fill == PATCHED_COLOR => Some(*rect),
                _ => None,
            })
            .collect()
    }

    fn texts(d: &Diagram) -> Vec<&str> {
        d.primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn connector_points(d: &Diagram) -> Vec<Pos2> {
        d.primitives
            .iter()
            .find_map(|p| match p {
                Primitive::Path { points, .. } => Some(points.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn canvas_uses_container_width_and_fixed_height() {
        let d = diagram(&Parameters::default());
        assert_eq!(d.size, vec2(900.0, CANVAS_HEIGHT));
    }

    #[test]
    fn one_highlight_per_band() {
        let d = diagram(&Parameters::default());
        let hl = highlighted(&d);
        assert_eq!(hl.len(), 2);
        assert_eq!(hl[0], row(Band::Source, 1).rect(0));
        assert_eq!(hl[1], row(Band::Target, 18).rect(15));
    }

    #[test]
    fn every_token_gets_a_labelled_box() {
        let d = diagram(&Parameters::default());
        let labels = texts(&d);
        assert!(labels.contains(&"Harry"));
        assert!(labels.contains(&"completion"));
        assert!(labels.contains(&"->"));
        assert_eq!(token_boxes(&d).len(), 1 + 18);
    }

    #[test]
    fn callouts_and_caption_present() {
        let d = diagram(&Parameters::default());
        let labels = texts(&d);
        for expected in [
            "Patching Visualization",
            "Source Prompt:",
            "Source Output:",
            "Target Prompt:",
            "Original Target Output:",
            "Patched Target Output:",
            "Source Layer 2",
            "Target Layer 2",
            "Patching token -1 from Source to token -3 in Target",
            "The model now thinks 'Harry' after patching",
        ] {
            assert!(labels.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn same_layer_connector_bends() {
        let d = diagram(&Parameters::default());
        let points = connector_points(&d);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].x, points[1].x);
        assert_eq!(points[1].y, points[2].y);
        assert_eq!(points[2].x, points[3].x);
    }

    #[test]
    fn different_layer_connector_is_straight() {
        let params = Parameters {
            target_layer_index: 5,
            ..Parameters::default()
        };
        let d = diagram(&params);
        let points = connector_points(&d);
        assert_eq!(points.len(), 2);
        let source = row(Band::Source, 1).rect(0);
        let target = row(Band::Target, 18).rect(15);
        assert_eq!(points[0], source.center_bottom());
        assert_eq!(points[1], target.center_top());
        assert!(texts(&d).contains(&"Target Layer 5"));
    }

    #[test]
    fn arrowhead_sits_on_target_token() {
        let d = diagram(&Parameters::default());
        let target = row(Band::Target, 18).rect(15);
        let head = d
            .primitives
            .iter()
            .find_map(|p| match p {
                Primitive::Arrowhead { tip, dir, .. } => Some((*tip, *dir)),
                _ => None,
            })
            .unwrap();
        assert_eq!(head.0, target.center_top());
        assert_eq!(head.1, Vec2::DOWN);
    }

    #[test]
    fn out_of_range_indices_draw_without_highlight() {
        let params = Parameters {
            source_token_index: 7,
            target_token_index: -40,
            ..Parameters::default()
        };
        let d = diagram(&params);
        assert!(highlighted(&d).is_empty());
        let points = connector_points(&d);
        assert_eq!(points[0], row(Band::Source, 1).rect(7).center_bottom());
        assert_eq!(*points.last().unwrap(), row(Band::Target, 18).rect(-22).center_top());
    }

    #[test]
    fn layout_is_repeatable() {
        let params = Parameters::default();
        let result = TokenizingBackend.patch(&params).unwrap();
        assert_eq!(layout(&result, &params, 640.0), layout(&result, &params, 640.0));
    }

    #[test]
    fn narrow_container_does_not_go_negative() {
        let params = Parameters::default();
        let result = TokenizingBackend.patch(&params).unwrap();
        let d = layout(&result, &params, 10.0);
        let band = d
            .primitives
            .iter()
            .find_map(|p| match p {
                Primitive::Rect { rect, rounding, .. } if *rounding == BAND_ROUNDING => Some(*rect),
                _ => None,
            })
            .unwrap();
        assert_eq!(band.width(), 0.0);
    }

    #[test]
    fn default_diagram_fits_inside_the_canvas() {
        let params = Parameters::default();
        let result = TokenizingBackend.patch(&params).unwrap();
        for width in [320.0, 640.0, 1000.0, 1600.0] {
            let d = layout(&result, &params, width);
            for rect in token_boxes(&d) {
                assert!(rect.min.x >= MARGIN, "box {rect:?} starts left of the band at {width}");
                assert!(rect.max.x <= width - MARGIN, "box {rect:?} ends past the band at {width}");
            }
            let points = connector_points(&d);
            for p in &points {
                assert!(p.x >= 0.0 && p.x <= width, "connector point {p:?} off canvas at {width}");
            }
            assert_eq!(highlighted(&d).len(), 2);
        }
    }

    #[test]
    fn short_prompts_keep_full_size_boxes() {
        let r = row(Band::Source, 3);
        assert_eq!(r.rect(1).width(), TOKEN_WIDTH);
        assert_eq!(r.rect(1).min.x - r.rect(0).min.x, TOKEN_PITCH);
    }

    #[test]
    fn activation_norms_shade_unpatched_boxes() {
        let params = Parameters {
            source_prompt: "a b c".to_string(),
            ..Parameters::default()
        };
        let mut result = TokenizingBackend.patch(&params).unwrap();
        result.source_activations = Some(vec![1.0, 4.0, 2.0]);
        let d = layout(&result, &params, 900.0);
        let fills: Vec<Color32> = d
            .primitives
            .iter()
            .filter_map(|p| match p {
                Primitive::Rect { rounding, fill, .. } if *rounding < BAND_ROUNDING => Some(*fill),
                _ => None,
            })
            .take(3)
            .collect();
        assert_eq!(fills[0], shade(SOURCE_COLOR, 1.0, 4.0));
        assert_eq!(fills[1], shade(SOURCE_COLOR, 4.0, 4.0));
        // The last source token is the patched one and keeps the highlight.
        assert_eq!(fills[2], PATCHED_COLOR);
        assert_ne!(fills[0], fills[1]);
    }
}
