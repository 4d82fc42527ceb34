//! Minimal SVG document builder used by the chart renderers.

use std::fmt::Write as _;

/// Font stack that covers CJK glyphs on Windows, macOS, and Linux.
pub(crate) const FONT_FAMILY: &str =
    "SimHei, 'Microsoft YaHei', 'PingFang SC', 'Heiti SC', 'Noto Sans CJK SC', 'WenQuanYi Micro Hei', sans-serif";

pub(crate) const BAR_FILL: &str = "#4c72b0";
pub(crate) const POINT_FILL: &str = "#55a868";
const AXIS_STROKE: &str = "#333333";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Middle => "middle",
            Self::End => "end",
        }
    }
}

/// An SVG document being built up element by element.
pub(crate) struct Canvas {
    width: f64,
    height: f64,
    body: String,
}

impl Canvas {
    pub(crate) fn new(width: f64, height: f64) -> Self {
        let mut canvas = Self {
            width,
            height,
            body: String::new(),
        };
        canvas.rect(0.0, 0.0, width, height, "#ffffff");
        canvas
    }

    pub(crate) fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        let _ = writeln!(
            self.body,
            r#"<rect x="{x:.2}" y="{y:.2}" width="{:.2}" height="{:.2}" fill="{fill}"/>"#,
            w.max(0.0),
            h.max(0.0)
        );
    }

    /// Rectangle with a thin white outline, as used by bars and heatmap cells.
    pub(crate) fn outlined_rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) {
        let _ = writeln!(
            self.body,
            r##"<rect x="{x:.2}" y="{y:.2}" width="{:.2}" height="{:.2}" fill="{fill}" stroke="#ffffff" stroke-width="0.5"/>"##,
            w.max(0.0),
            h.max(0.0)
        );
    }

    pub(crate) fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) {
        let _ = writeln!(
            self.body,
            r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}" stroke="{AXIS_STROKE}" stroke-width="1"/>"#
        );
    }

    pub(crate) fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: &str) {
        let _ = writeln!(
            self.body,
            r#"<circle cx="{cx:.2}" cy="{cy:.2}" r="{r:.2}" fill="{fill}" fill-opacity="0.6"/>"#
        );
    }

    pub(crate) fn text(&mut self, x: f64, y: f64, size: f64, anchor: Anchor, content: &str) {
        let _ = writeln!(
            self.body,
            r#"<text x="{x:.2}" y="{y:.2}" font-size="{size}" text-anchor="{}">{}</text>"#,
            anchor.as_str(),
            escape(content)
        );
    }

    /// Text rotated about its anchor point, e.g. `-90` for a y-axis label.
    pub(crate) fn rotated_text(
        &mut self,
        x: f64,
        y: f64,
        size: f64,
        angle: f64,
        anchor: Anchor,
        content: &str,
    ) {
        let _ = writeln!(
            self.body,
            r#"<text x="{x:.2}" y="{y:.2}" font-size="{size}" text-anchor="{}" transform="rotate({angle} {x:.2} {y:.2})">{}</text>"#,
            anchor.as_str(),
            escape(content)
        );
    }

    pub(crate) fn title(&mut self, content: &str) {
        self.text(self.width / 2.0, 28.0, 18.0, Anchor::Middle, content);
    }

    pub(crate) fn finish(self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" font-family="{FONT_FAMILY}">
{body}</svg>
"#,
            w = self.width,
            h = self.height,
            body = self.body
        )
    }
}

/// Escape text for use inside SVG elements and attributes.
pub(crate) fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Blue-white-red color for a value in `[-1, 1]`.
pub(crate) fn diverging_color(value: f64) -> String {
    const COLD: (f64, f64, f64) = (59.0, 76.0, 192.0);
    const MID: (f64, f64, f64) = (221.0, 221.0, 221.0);
    const HOT: (f64, f64, f64) = (180.0, 4.0, 38.0);

    let v = if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    };
    let (from, to, t) = if v < 0.0 {
        (MID, COLD, -v)
    } else {
        (MID, HOT, v)
    };
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    format!(
        "#{:02x}{:02x}{:02x}",
        lerp(from.0, to.0),
        lerp(from.1, to.1),
        lerp(from.2, to.2)
    )
}

/// Compact tick label: integers without decimals, small magnitudes with more.
pub(crate) fn tick_label(v: f64) -> String {
    if v == 0.0 {
        return "0".into();
    }
    let abs = v.abs();
    if abs >= 1e6 || abs < 1e-3 {
        format!("{v:.2e}")
    } else if v.fract() == 0.0 {
        format!("{v:.0}")
    } else if abs >= 100.0 {
        format!("{v:.1}")
    } else {
        format!("{v:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape("a<b & \"c\""), "a&lt;b &amp; &quot;c&quot;");
        assert_eq!(escape("人口(万)"), "人口(万)");
    }

    #[test]
    fn document_has_font_stack_and_escaped_text() {
        let mut canvas = Canvas::new(100.0, 50.0);
        canvas.title("分布图: x<y");
        let svg = canvas.finish();
        assert!(svg.starts_with("<?xml"));
        assert!(svg.contains("SimHei"));
        assert!(svg.contains("分布图: x&lt;y"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn diverging_palette_endpoints() {
        assert_eq!(diverging_color(0.0), "#dddddd");
        assert_eq!(diverging_color(1.0), "#b40426");
        assert_eq!(diverging_color(-1.0), "#3b4cc0");
        assert_eq!(diverging_color(f64::NAN), "#dddddd");
    }

    #[test]
    fn tick_labels() {
        assert_eq!(tick_label(5.0), "5");
        assert_eq!(tick_label(0.25), "0.25");
        assert_eq!(tick_label(1234.56), "1234.6");
    }
}
