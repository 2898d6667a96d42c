//! Metric-curve rendering: read precision-recall / F1-confidence curves from
//! CSV files and plot them as polylines on a fixed-size PNG canvas.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::path::Path;

const CANVAS_SIZE: u32 = 800;
const MARGIN: u32 = 60;

/// Fixed series palette, cycled in order.
const PALETTE: [Rgb<u8>; 7] = [
    Rgb([214, 69, 65]),
    Rgb([31, 119, 180]),
    Rgb([44, 160, 44]),
    Rgb([255, 127, 14]),
    Rgb([148, 103, 189]),
    Rgb([140, 86, 75]),
    Rgb([23, 190, 207]),
];

/// One named curve over the unit square.
#[derive(Debug, Clone)]
pub struct CurveSeries {
    pub name: String,
    pub points: Vec<(f32, f32)>,
}

impl CurveSeries {
    /// Read a curve from a metrics CSV: the header row is skipped, x comes
    /// from column 1 and y from column 2. Malformed rows warn and are
    /// skipped.
    pub fn from_csv(name: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read curve file {}", path.display()))?;
        Ok(Self {
            name: name.to_string(),
            points: parse_curve_csv(&content, path),
        })
    }
}

fn parse_curve_csv(content: &str, path: &Path) -> Vec<(f32, f32)> {
    let mut points = Vec::new();
    for line in content.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let cells: Vec<&str> = line.split(',').collect();
        if cells.len() < 3 {
            log::warn!("short row in {}: {}", path.display(), line);
            continue;
        }
        match (cells[1].trim().parse::<f32>(), cells[2].trim().parse::<f32>()) {
            (Ok(x), Ok(y)) => points.push((x, y)),
            _ => log::warn!("non-numeric row in {}: {}", path.display(), line),
        }
    }
    points
}

/// Map a unit-square point onto canvas pixels (y axis flipped).
fn to_canvas(x: f32, y: f32) -> (f32, f32) {
    let span = (CANVAS_SIZE - 2 * MARGIN) as f32;
    (
        MARGIN as f32 + x.clamp(0.0, 1.0) * span,
        MARGIN as f32 + (1.0 - y.clamp(0.0, 1.0)) * span,
    )
}

/// Render the series as polylines over a [0,1] x [0,1] axes box and write a
/// PNG. Series with fewer than two points warn and are skipped.
pub fn render_curves(series: &[CurveSeries], output: &Path) -> Result<()> {
    let mut canvas = RgbImage::from_pixel(CANVAS_SIZE, CANVAS_SIZE, Rgb([255, 255, 255]));

    let span = CANVAS_SIZE - 2 * MARGIN;
    draw_hollow_rect_mut(
        &mut canvas,
        Rect::at(MARGIN as i32, MARGIN as i32).of_size(span, span),
        Rgb([0, 0, 0]),
    );

    // Light quarter gridlines inside the axes box.
    for i in 1..4 {
        let offset = MARGIN as f32 + span as f32 * i as f32 / 4.0;
        draw_line_segment_mut(
            &mut canvas,
            (MARGIN as f32, offset),
            ((CANVAS_SIZE - MARGIN) as f32, offset),
            Rgb([225, 225, 225]),
        );
        draw_line_segment_mut(
            &mut canvas,
            (offset, MARGIN as f32),
            (offset, (CANVAS_SIZE - MARGIN) as f32),
            Rgb([225, 225, 225]),
        );
    }

    for (i, curve) in series.iter().enumerate() {
        if curve.points.len() < 2 {
            log::warn!("series {} has {} points, skipping", curve.name, curve.points.len());
            continue;
        }
        let color = PALETTE[i % PALETTE.len()];
        for pair in curve.points.windows(2) {
            let from = to_canvas(pair[0].0, pair[0].1);
            let to = to_canvas(pair[1].0, pair[1].1);
            draw_line_segment_mut(&mut canvas, from, to, color);
        }
    }

    canvas
        .save(output)
        .with_context(|| format!("failed to write plot {}", output.display()))?;
    log::info!("wrote {} series to {}", series.len(), output.display());
    Ok(())
}
