//! SVG rendering of example chart windows.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::domain::error::SigtraderError;
use crate::domain::example_extractor::{ChartWindow, OverlayLine};
use crate::ports::chart_port::ChartPort;

const WIDTH: f64 = 800.0;
const PRICE_HEIGHT: f64 = 320.0;
const SECONDARY_HEIGHT: f64 = 120.0;
const PADDING: f64 = 40.0;

const OVERLAY_COLORS: &[&str] = &["#7f7f7f", "#9467bd", "#ff7f0e", "#17becf"];

/// Writes one SVG file per example into `output_dir`.
pub struct SvgChartAdapter {
    output_dir: PathBuf,
}

impl SvgChartAdapter {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub fn file_name(window: &ChartWindow) -> String {
        let symbol: String = window
            .symbol
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        format!("{symbol}_{}.svg", window.signal_time.format("%Y%m%d%H%M"))
    }
}

impl ChartPort for SvgChartAdapter {
    fn render(&self, window: &ChartWindow) -> Result<String, SigtraderError> {
        fs::create_dir_all(&self.output_dir)?;
        let path = self.output_dir.join(Self::file_name(window));
        fs::write(&path, render_svg(window))?;
        debug!(path = %path.display(), "chart written");
        Ok(path.display().to_string())
    }
}

/// Vertical scale over a panel: value -> y pixel.
struct Scale {
    min: f64,
    per_unit: f64,
    bottom: f64,
}

impl Scale {
    fn new<I: IntoIterator<Item = f64>>(values: I, top: f64, height: f64) -> Self {
        let (min, max) = values
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
        let (min, max) = if min.is_finite() { (min, max) } else { (0.0, 1.0) };
        let range = max - min;
        Self {
            min,
            per_unit: if range > 0.0 { height / range } else { 1.0 },
            bottom: top + height,
        }
    }

    fn y(&self, value: f64) -> f64 {
        self.bottom - (value - self.min) * self.per_unit
    }
}

fn x_at(i: usize, n: usize) -> f64 {
    let plot_width = WIDTH - 2.0 * PADDING;
    if n > 1 {
        PADDING + i as f64 * plot_width / (n - 1) as f64
    } else {
        PADDING + plot_width / 2.0
    }
}

/// Polylines broken wherever a value is undefined.
fn polylines(values: &[Option<f64>], n: usize, scale: &Scale, color: &str) -> String {
    let mut out = String::new();
    let mut segment: Vec<String> = Vec::new();
    let flush = |segment: &mut Vec<String>, out: &mut String| {
        if segment.len() > 1 {
            out.push_str(&format!(
                "<polyline fill=\"none\" stroke=\"{color}\" stroke-width=\"1\" points=\"{}\"/>\n",
                segment.join(" ")
            ));
        }
        segment.clear();
    };
    for (i, value) in values.iter().enumerate() {
        match value {
            Some(v) if v.is_finite() => {
                segment.push(format!("{:.1},{:.1}", x_at(i, n), scale.y(*v)));
            }
            _ => flush(&mut segment, &mut out),
        }
    }
    flush(&mut segment, &mut out);
    out
}

fn legend(lines: &[OverlayLine], top: f64) -> String {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            format!(
                "<text x=\"{:.0}\" y=\"{:.0}\" font-size=\"10\" fill=\"{}\">{}</text>\n",
                PADDING + 90.0 * i as f64,
                top - 6.0,
                OVERLAY_COLORS[i % OVERLAY_COLORS.len()],
                line.label
            )
        })
        .collect()
}

pub fn render_svg(window: &ChartWindow) -> String {
    let bars = &window.bars;
    let n = bars.len();
    let has_secondary = !window.secondary_overlays.is_empty();
    let height = PADDING * 2.0 + PRICE_HEIGHT + if has_secondary { SECONDARY_HEIGHT + PADDING } else { 0.0 };

    let price_values = bars
        .iter()
        .flat_map(|b| [b.low, b.high])
        .chain(
            window
                .price_overlays
                .iter()
                .flat_map(|l| l.values.iter().flatten().copied()),
        );
    let price = Scale::new(price_values, PADDING, PRICE_HEIGHT);

    let mut body = String::new();
    body.push_str(&format!(
        "<rect x=\"0\" y=\"0\" width=\"{WIDTH:.0}\" height=\"{height:.0}\" fill=\"white\"/>\n"
    ));
    body.push_str(&format!(
        "<text x=\"{PADDING:.0}\" y=\"20\" font-size=\"14\">{} {} signal at {}</text>\n",
        window.symbol,
        if window.signal_value > 0 { "bullish" } else { "bearish" },
        window.signal_time.format("%Y-%m-%d %H:%M UTC")
    ));

    // Candles: wick then body.
    let candle_width = ((WIDTH - 2.0 * PADDING) / n.max(1) as f64 * 0.6).clamp(1.0, 12.0);
    for (i, bar) in bars.iter().enumerate() {
        let x = x_at(i, n);
        let color = if bar.close >= bar.open { "#2ca02c" } else { "#d62728" };
        let (top, bottom) = (price.y(bar.open.max(bar.close)), price.y(bar.open.min(bar.close)));
        body.push_str(&format!(
            "<line x1=\"{x:.1}\" y1=\"{:.1}\" x2=\"{x:.1}\" y2=\"{:.1}\" stroke=\"{color}\"/>\n",
            price.y(bar.high),
            price.y(bar.low)
        ));
        body.push_str(&format!(
            "<rect x=\"{:.1}\" y=\"{top:.1}\" width=\"{candle_width:.1}\" height=\"{:.1}\" fill=\"{color}\"/>\n",
            x - candle_width / 2.0,
            (bottom - top).max(0.5)
        ));
    }

    for (i, line) in window.price_overlays.iter().enumerate() {
        body.push_str(&polylines(&line.values, n, &price, OVERLAY_COLORS[i % OVERLAY_COLORS.len()]));
    }
    body.push_str(&legend(&window.price_overlays, PADDING));

    if has_secondary {
        let top = PADDING * 2.0 + PRICE_HEIGHT;
        let secondary = Scale::new(
            window
                .secondary_overlays
                .iter()
                .flat_map(|l| l.values.iter().flatten().copied()),
            top,
            SECONDARY_HEIGHT,
        );
        for (i, line) in window.secondary_overlays.iter().enumerate() {
            body.push_str(&polylines(&line.values, n, &secondary, OVERLAY_COLORS[i % OVERLAY_COLORS.len()]));
        }
        body.push_str(&legend(&window.secondary_overlays, top));
    }

    if let Some(bar) = bars.get(window.marker_index) {
        let x = x_at(window.marker_index, n);
        let (color, y, tip) = if window.signal_value > 0 {
            ("#2ca02c", price.y(bar.low) + 14.0, -8.0)
        } else {
            ("#d62728", price.y(bar.high) - 14.0, 8.0)
        };
        body.push_str(&format!(
            "<line x1=\"{x:.1}\" y1=\"{PADDING:.0}\" x2=\"{x:.1}\" y2=\"{:.0}\" stroke=\"{color}\" stroke-dasharray=\"4 3\"/>\n",
            height - PADDING
        ));
        body.push_str(&format!(
            "<polygon class=\"marker\" points=\"{:.1},{:.1} {:.1},{:.1} {x:.1},{:.1}\" fill=\"{color}\"/>\n",
            x - 6.0,
            y,
            x + 6.0,
            y,
            y + tip
        ));
    }

    format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{WIDTH:.0}\" height=\"{height:.0}\" viewBox=\"0 0 {WIDTH:.0} {height:.0}\">\n{body}</svg>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::Bar;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 13, 45, 0).unwrap()
    }

    fn window(n: usize, secondary: bool) -> ChartWindow {
        let bars: Vec<Bar> = (0..n)
            .map(|i| {
                let close = 100.0 + (i % 4) as f64;
                Bar {
                    timestamp: t0() + Duration::hours(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1.0,
                }
            })
            .collect();
        let mut upper = vec![None; n];
        for v in upper.iter_mut().skip(2) {
            *v = Some(106.0);
        }
        ChartWindow {
            symbol: "bitcoin".into(),
            signal_time: bars[n / 2].timestamp,
            signal_value: -1,
            marker_index: n / 2,
            bars,
            price_overlays: vec![OverlayLine {
                label: "BB Upper",
                values: upper,
            }],
            secondary_overlays: if secondary {
                vec![OverlayLine {
                    label: "MACD",
                    values: vec![Some(0.1); n],
                }]
            } else {
                Vec::new()
            },
        }
    }

    #[test]
    fn svg_has_candles_overlay_and_marker() {
        let svg = render_svg(&window(10, false));
        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert_eq!(svg.matches("class=\"marker\"").count(), 1);
        assert_eq!(svg.matches("<polyline").count(), 1);
        assert!(svg.contains("BB Upper"));
        assert!(svg.contains("bearish"));
        assert!(svg.contains("height=\"400\""));
    }

    #[test]
    fn secondary_panel_extends_height() {
        let svg = render_svg(&window(10, true));
        assert!(svg.contains("MACD"));
        assert!(svg.contains("height=\"560\""));
    }

    #[test]
    fn gaps_split_polylines() {
        let scale = Scale::new([0.0, 10.0], 0.0, 100.0);
        let values = [Some(1.0), Some(2.0), None, Some(3.0), Some(4.0), None, Some(5.0)];
        let svg = polylines(&values, values.len(), &scale, "#000");
        assert_eq!(svg.matches("<polyline").count(), 2);
    }

    #[test]
    fn flat_scale_does_not_divide_by_zero() {
        let scale = Scale::new([5.0, 5.0], 0.0, 100.0);
        assert!(scale.y(5.0).is_finite());
    }

    #[test]
    fn render_writes_named_file() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("charts");
        let adapter = SvgChartAdapter::new(out.clone());
        let w = window(6, true);
        let path = adapter.render(&w).unwrap();
        assert!(path.ends_with("bitcoin_202405061645.svg"));
        let content = fs::read_to_string(out.join("bitcoin_202405061645.svg")).unwrap();
        assert!(content.contains("<svg"));
    }
}
