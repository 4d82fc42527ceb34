//! Word export of `final_paper.md`.
//!
//! The built-in converter writes a plain `.docx` with `docx-rs`: headings,
//! paragraphs, and centered 6-inch pictures. SVG figures are embedded through
//! their PNG rendering. Formulas stay LaTeX source.
//! Pandoc is used when asked for, or when the built-in converter fails.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::sync::LazyLock;

use docx_rs::{AlignmentType, Docx, Paragraph, Pic, Run, Style, StyleType};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use paperflow_dataprep::{png_dimensions, rasterize_svg};
use paperflow_shared::{ExportConfig, PaperflowError, ProjectLayout, Result};

const DOC_TITLE: &str = "数学建模论文 (自动生成)";
const LATEX_NOTE: &str =
    "注意：本 Word 文档由脚本直接生成（未使用 Pandoc），数学公式将显示为 LaTeX 源码。";
const NOTE_COLOR: &str = "FF0000";
const MAX_HEADING_LEVEL: usize = 9;
/// Embedded picture width: 6 inches in EMU.
const PICTURE_WIDTH_EMU: u32 = 6 * 914_400;

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*!\[[^\]]*\]\(\s*([^)\s]+)(?:\s+"[^"]*")?\s*\)\s*$"#).expect("valid regex")
});

/// Which converter produces the Word document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Converter {
    /// Built-in first, Pandoc if that fails.
    #[default]
    Auto,
    Builtin,
    Pandoc,
}

impl FromStr for Converter {
    type Err = PaperflowError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "builtin" => Ok(Self::Builtin),
            "pandoc" => Ok(Self::Pandoc),
            other => Err(PaperflowError::config(format!(
                "unknown converter '{other}' (expected auto, builtin, or pandoc)"
            ))),
        }
    }
}

impl fmt::Display for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Builtin => "builtin",
            Self::Pandoc => "pandoc",
        })
    }
}

/// Output of a successful export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub path: PathBuf,
    /// The converter that actually wrote the file (never `Auto`).
    pub converter: Converter,
}

/// Export using the converter and reference document named in `config`.
pub fn export_docx(layout: &ProjectLayout, config: &ExportConfig) -> Result<ExportResult> {
    let converter: Converter = config.converter.parse()?;
    let reference_doc = layout.root().join(&config.reference_doc);
    export_with(layout, converter, &reference_doc)
}

/// Convert `final_paper.md` to `final_paper.docx`.
#[instrument(skip_all, fields(converter = %converter))]
pub fn export_with(
    layout: &ProjectLayout,
    converter: Converter,
    reference_doc: &Path,
) -> Result<ExportResult> {
    let md_path = layout.final_paper();
    if !md_path.exists() {
        return Err(PaperflowError::Export(format!(
            "{} not found (run the merge stage first)",
            md_path.display()
        )));
    }
    let out = layout.final_docx();

    let used = match converter {
        Converter::Builtin => {
            export_builtin(layout, &md_path, &out)?;
            Converter::Builtin
        }
        Converter::Pandoc => {
            export_pandoc(&md_path, &out, reference_doc)?;
            Converter::Pandoc
        }
        Converter::Auto => match export_builtin(layout, &md_path, &out) {
            Ok(()) => Converter::Builtin,
            Err(e) => {
                warn!(error = %e, "built-in export failed, trying pandoc");
                export_pandoc(&md_path, &out, reference_doc)?;
                Converter::Pandoc
            }
        },
    };

    info!(path = %out.display(), converter = %used, "exported Word document");
    Ok(ExportResult {
        path: out,
        converter: used,
    })
}

// ---------------------------------------------------------------------------
// Built-in converter
// ---------------------------------------------------------------------------

/// One output paragraph of the built-in converter.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Block {
    Heading { level: usize, text: String },
    Image(ImageRef),
    Text(String),
}

/// An image line after path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ImageRef {
    Found(PathBuf),
    Missing(String),
}

impl ImageRef {
    fn placeholder(&self) -> String {
        match self {
            Self::Found(path) => format!("[图片: {}]", path.display()),
            Self::Missing(target) => format!("[图片未找到: {target}]"),
        }
    }
}

fn export_builtin(layout: &ProjectLayout, md_path: &Path, out: &Path) -> Result<()> {
    let md = std::fs::read_to_string(md_path).map_err(|e| PaperflowError::io(md_path, e))?;
    let blocks = to_blocks(&md, layout);
    debug!(blocks = blocks.len(), "parsed markdown for docx");

    let mut docx = add_styles(Docx::new())
        .add_paragraph(
            Paragraph::new()
                .style("Title")
                .align(AlignmentType::Center)
                .add_run(Run::new().add_text(DOC_TITLE)),
        )
        .add_paragraph(
            Paragraph::new().add_run(Run::new().add_text(LATEX_NOTE).bold().color(NOTE_COLOR)),
        );

    for block in blocks {
        let paragraph = match block {
            Block::Heading { level, text } => Paragraph::new()
                .style(&format!("Heading{level}"))
                .add_run(Run::new().add_text(text)),
            Block::Image(image) => {
                let run = match picture(&image) {
                    Some(pic) => Run::new().add_image(pic),
                    None => Run::new().add_text(image.placeholder()).italic(),
                };
                Paragraph::new().align(AlignmentType::Center).add_run(run)
            }
            Block::Text(text) => Paragraph::new().add_run(Run::new().add_text(text)),
        };
        docx = docx.add_paragraph(paragraph);
    }

    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).map_err(|e| PaperflowError::io(parent, e))?;
    }
    let file = File::create(out).map_err(|e| PaperflowError::io(out, e))?;
    docx.build()
        .pack(file)
        .map_err(|e| PaperflowError::Export(format!("failed to write {}: {e}", out.display())))?;
    Ok(())
}

fn add_styles(docx: Docx) -> Docx {
    let mut docx = docx.add_style(
        Style::new("Title", StyleType::Paragraph)
            .name("Title")
            .size(44)
            .bold(),
    );
    for level in 1..=MAX_HEADING_LEVEL {
        let size = match level {
            1 => 32,
            2 => 28,
            3 => 26,
            _ => 24,
        };
        docx = docx.add_style(
            Style::new(&format!("Heading{level}"), StyleType::Paragraph)
                .name(&format!("Heading {level}"))
                .size(size)
                .bold(),
        );
    }
    docx
}

/// Classify every non-empty line.
fn to_blocks(md: &str, layout: &ProjectLayout) -> Vec<Block> {
    md.lines()
        .map(strip_control_chars)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            if let Some(caps) = IMAGE_RE.captures(&line) {
                return Block::Image(resolve_image(&caps[1], layout));
            }
            match heading_level(&line) {
                Some((level, text)) if level <= MAX_HEADING_LEVEL => Block::Heading {
                    level,
                    text: text.to_string(),
                },
                _ => Block::Text(line.trim().to_string()),
            }
        })
        .collect()
}

/// `#`-count and text of an ATX heading line.
fn heading_level(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|&c| c == '#').count();
    if level == 0 {
        return None;
    }
    let rest = &line[level..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some((level, rest.trim()))
}

/// Resolve an image path as written, then against the output dir, then
/// against the project root.
fn resolve_image(target: &str, layout: &ProjectLayout) -> ImageRef {
    let raw = Path::new(target);
    let found = [
        raw.to_path_buf(),
        layout.output_dir().join(raw),
        layout.root().join(raw),
    ]
    .into_iter()
    .find(|p| p.is_file());

    match found {
        Some(path) => ImageRef::Found(path),
        None => {
            debug!(target, "image not found");
            ImageRef::Missing(target.to_string())
        }
    }
}

/// PNG bytes for an image: PNG files as-is; SVG through the sibling `.png`
/// rendering when present, else rasterized here. Other formats are not
/// embedded.
fn png_bytes(path: &Path) -> Option<Vec<u8>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let bytes = match ext.as_deref() {
        Some("png") => std::fs::read(path).ok()?,
        Some("svg") => {
            let sibling = path.with_extension("png");
            match std::fs::read(&sibling) {
                Ok(bytes) => bytes,
                Err(_) => {
                    let svg = std::fs::read_to_string(path).ok()?;
                    rasterize_svg(&svg)
                        .inspect_err(|e| warn!(path = %path.display(), error = %e, "cannot render SVG"))
                        .ok()?
                }
            }
        }
        _ => {
            debug!(path = %path.display(), "unsupported image format, keeping placeholder");
            return None;
        }
    };
    png_dimensions(&bytes).is_some().then_some(bytes)
}

/// The image as a picture 6 inches wide, keeping its aspect ratio.
fn picture(image: &ImageRef) -> Option<Pic> {
    let ImageRef::Found(path) = image else {
        return None;
    };
    let bytes = png_bytes(path)?;
    let (width, height) = png_dimensions(&bytes)?;
    if width == 0 {
        return None;
    }
    let height_emu = (u64::from(PICTURE_WIDTH_EMU) * u64::from(height) / u64::from(width)) as u32;
    Some(Pic::new(&bytes).size(PICTURE_WIDTH_EMU, height_emu))
}

/// Drop characters XML 1.0 cannot carry.
fn strip_control_chars(line: &str) -> String {
    line.chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}'))
        .collect()
}

// ---------------------------------------------------------------------------
// Pandoc
// ---------------------------------------------------------------------------

fn export_pandoc(md_path: &Path, out: &Path, reference_doc: &Path) -> Result<()> {
    let mut cmd = Command::new("pandoc");
    cmd.arg(md_path).arg("-o").arg(out);
    if reference_doc.is_file() {
        cmd.arg(format!("--reference-doc={}", reference_doc.display()));
    } else {
        debug!(path = %reference_doc.display(), "reference document not found, using pandoc defaults");
    }

    let output = cmd.output().map_err(|e| {
        PaperflowError::Subprocess(format!("failed to run pandoc: {e}. Is pandoc installed?"))
    })?;

    if !output.status.success() {
        return Err(PaperflowError::Subprocess(format!(
            "pandoc exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperflow_shared::AppConfig;

    const SQUARE_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="400" height="300"><rect x="10" y="10" width="200" height="100" fill="#4c72b0"/></svg>"##;

    fn contains(haystack: &[u8], needle: &[u8]) -> bool {
        haystack.windows(needle.len()).any(|w| w == needle)
    }

    fn setup() -> (tempfile::TempDir, ProjectLayout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ProjectLayout::new(tmp.path(), &AppConfig::default());
        std::fs::create_dir_all(layout.output_dir()).unwrap();
        (tmp, layout)
    }

    #[test]
    fn converter_parsing() {
        assert_eq!("Builtin".parse::<Converter>().unwrap(), Converter::Builtin);
        assert_eq!("pandoc".parse::<Converter>().unwrap(), Converter::Pandoc);
        assert!(matches!(
            "latex".parse::<Converter>(),
            Err(PaperflowError::Config { .. })
        ));
    }

    #[test]
    fn headings_levels() {
        assert_eq!(heading_level("## 问题一"), Some((2, "问题一")));
        assert_eq!(heading_level("#标签"), None);
        assert_eq!(heading_level("正文"), None);
    }

    #[test]
    fn blocks_from_markdown() {
        let (_tmp, layout) = setup();
        let fig_dir = layout.output_dir().join("figures");
        std::fs::create_dir_all(&fig_dir).unwrap();
        std::fs::write(fig_dir.join("a.svg"), SQUARE_SVG).unwrap();

        let md = "# 目录\n\n########## 太深\n![图1](figures/a.svg)\n![x](missing.png)\n正文\u{0007}内容\n";
        let blocks = to_blocks(md, &layout);

        assert_eq!(
            blocks[0],
            Block::Heading {
                level: 1,
                text: "目录".into()
            }
        );
        assert_eq!(blocks[1], Block::Text("########## 太深".into()));
        match &blocks[2] {
            Block::Image(image @ ImageRef::Found(path)) => {
                assert!(path.ends_with("figures/a.svg"));
                assert!(image.placeholder().starts_with("[图片: "));
            }
            other => panic!("expected image, got {other:?}"),
        }
        assert_eq!(blocks[3], Block::Image(ImageRef::Missing("missing.png".into())));
        assert_eq!(
            ImageRef::Missing("missing.png".into()).placeholder(),
            "[图片未找到: missing.png]"
        );
        assert_eq!(blocks[4], Block::Text("正文内容".into()));
        assert_eq!(blocks.len(), 5);
    }

    #[test]
    fn builtin_writes_a_docx_package() {
        let (_tmp, layout) = setup();
        std::fs::write(layout.final_paper(), "# 目录\n\n## 摘要\n\n本文$E=mc^2$。\n").unwrap();

        let result = export_with(&layout, Converter::Builtin, Path::new("reference.docx")).unwrap();
        assert_eq!(result.converter, Converter::Builtin);
        let bytes = std::fs::read(&result.path).unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn builtin_embeds_existing_figures() {
        let (_tmp, layout) = setup();
        let fig_dir = layout.output_dir().join("figures").join("sales");
        std::fs::create_dir_all(&fig_dir).unwrap();
        std::fs::write(fig_dir.join("dist_0_x.png"), rasterize_svg(SQUARE_SVG).unwrap()).unwrap();
        std::fs::write(
            layout.final_paper(),
            "## 数据分析\n\n![图1 分布](figures/sales/dist_0_x.png)\n\n图1 分布\n",
        )
        .unwrap();

        let result = export_with(&layout, Converter::Builtin, Path::new("reference.docx")).unwrap();
        let bytes = std::fs::read(&result.path).unwrap();
        assert!(contains(&bytes, b"word/media/"));
    }

    #[test]
    fn missing_figures_leave_no_media_part() {
        let (_tmp, layout) = setup();
        std::fs::write(layout.final_paper(), "![图1](figures/absent.png)\n").unwrap();

        let result = export_with(&layout, Converter::Builtin, Path::new("reference.docx")).unwrap();
        let bytes = std::fs::read(&result.path).unwrap();
        assert!(!contains(&bytes, b"word/media/"));
    }

    #[test]
    fn pictures_are_six_inches_wide() {
        let (_tmp, layout) = setup();
        let path = layout.output_dir().join("chart.svg");
        std::fs::write(&path, SQUARE_SVG).unwrap();

        let png = png_bytes(&path).unwrap();
        assert_eq!(png_dimensions(&png), Some((800, 600)));
        assert!(picture(&ImageRef::Found(path)).is_some());
        assert!(picture(&ImageRef::Missing("x.png".into())).is_none());

        let gif = layout.output_dir().join("anim.gif");
        std::fs::write(&gif, b"GIF89a").unwrap();
        assert!(png_bytes(&gif).is_none());
    }

    #[test]
    fn missing_paper_is_an_export_error() {
        let (_tmp, layout) = setup();
        let err = export_docx(&layout, &ExportConfig::default()).unwrap_err();
        assert!(matches!(err, PaperflowError::Export(_)));
    }
}
