//! SVG to PNG rasterisation for charts and document embedding.

use std::path::Path;
use std::sync::{Arc, LazyLock};

use resvg::tiny_skia::{Pixmap, Transform};
use resvg::usvg::{self, fontdb};
use tracing::debug;

use paperflow_shared::{PaperflowError, Result};

/// Pixels per SVG user unit in rendered PNGs.
pub const PNG_SCALE: f32 = 2.0;

/// System fonts, loaded once. Text renders only when a CJK-capable face is installed.
static FONTS: LazyLock<Arc<fontdb::Database>> = LazyLock::new(|| {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    debug!(faces = db.len(), "loaded system fonts");
    Arc::new(db)
});

/// Render an SVG document to PNG bytes at [`PNG_SCALE`].
pub fn rasterize_svg(svg: &str) -> Result<Vec<u8>> {
    let options = usvg::Options {
        fontdb: FONTS.clone(),
        ..usvg::Options::default()
    };
    let tree = usvg::Tree::from_str(svg, &options)
        .map_err(|e| PaperflowError::parse(format!("invalid SVG: {e}")))?;

    let size = tree.size();
    let width = (size.width() * PNG_SCALE).ceil() as u32;
    let height = (size.height() * PNG_SCALE).ceil() as u32;
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        PaperflowError::validation(format!("cannot allocate a {width}x{height} image"))
    })?;
    pixmap.fill(resvg::tiny_skia::Color::WHITE);

    resvg::render(
        &tree,
        Transform::from_scale(PNG_SCALE, PNG_SCALE),
        &mut pixmap.as_mut(),
    );

    pixmap
        .encode_png()
        .map_err(|e| PaperflowError::parse(format!("PNG encoding failed: {e}")))
}

/// Rasterize `svg` and write it to `path`.
pub fn write_png(path: &Path, svg: &str) -> Result<()> {
    let png = rasterize_svg(svg)?;
    std::fs::write(path, png).map_err(|e| PaperflowError::io(path, e))?;
    debug!(path = %path.display(), "wrote PNG");
    Ok(())
}

/// `(width, height)` from a PNG header, or `None` for anything that is not a PNG.
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if bytes.len() < 24 || !bytes.starts_with(SIGNATURE) || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(bytes[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(bytes[20..24].try_into().ok()?);
    Some((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="30"><rect x="5" y="5" width="20" height="10" fill="#4c72b0"/></svg>"##;

    #[test]
    fn rasterizes_at_scale() {
        let png = rasterize_svg(SQUARE).unwrap();
        assert_eq!(png_dimensions(&png), Some((80, 60)));
    }

    #[test]
    fn invalid_svg_is_a_parse_error() {
        assert!(matches!(
            rasterize_svg("<not svg"),
            Err(PaperflowError::Parse { .. })
        ));
    }

    #[test]
    fn png_dimensions_rejects_other_formats() {
        assert_eq!(png_dimensions(b"GIF89a........................"), None);
        assert_eq!(png_dimensions(b""), None);
    }

    #[test]
    fn write_png_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("chart.png");
        write_png(&path, SQUARE).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert!(png_dimensions(&bytes).is_some());
    }
}
