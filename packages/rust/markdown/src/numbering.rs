//! Sequential numbering of figures, tables, equations, and citations.
//!
//! A marker at the start of a line *defines* an item; every other marker
//! *references* one. The start may be preceded by indentation, a heading or
//! list-item prefix, and an emphasis opener (`**图1**`). Definitions are
//! renumbered 1, 2, 3, ... per kind in document order. References follow the
//! definition they point at, or are reported as unresolved. So are markers
//! whose number does not fit a `u32`.

use std::collections::HashMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use tracing::{debug, instrument, warn};

/// Figure, table, and equation markers. Equation parentheses may be ASCII or full-width.
static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"图\s*(\d+)|表\s*(\d+)|式\s*[(（]\s*(\d+)\s*[)）]").expect("valid regex")
});

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\s*(\d+)\s*\]").expect("valid regex"));

/// Prefix a definition marker may follow: heading hashes, a list bullet or
/// ordinal, and an emphasis opener.
static DEFINITION_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:#{1,6}\s+|[-*+]\s+|\d+[.)]\s+)?(?:\*\*|__|\*|_)?").expect("valid regex")
});

/// Spans left untouched: images, links, and inline code.
static PROTECTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!?\[[^\]\n]*\]\([^)\n]*\)|`[^`\n]*`").expect("valid regex")
});

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// The kinds of numbered items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Figure,
    Table,
    Equation,
    Citation,
}

impl MarkerKind {
    /// Canonical spelling of the marker for number `n`.
    pub fn render(self, n: u32) -> String {
        match self {
            Self::Figure => format!("图{n}"),
            Self::Table => format!("表{n}"),
            Self::Equation => format!("式({n})"),
            Self::Citation => format!("[{n}]"),
        }
    }
}

/// A reference with no matching definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedRef {
    pub kind: MarkerKind,
    /// Canonical marker as written, e.g. `图7`.
    pub marker: String,
    /// 1-based line number in the numbered text.
    pub line: usize,
}

/// How many definitions of each kind were numbered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarkerCounts {
    pub figures: u32,
    pub tables: u32,
    pub equations: u32,
    pub citations: u32,
}

/// Output of [`renumber`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numbered {
    pub text: String,
    pub unresolved: Vec<UnresolvedRef>,
    pub counts: MarkerCounts,
}

// ---------------------------------------------------------------------------
// Renumbering
// ---------------------------------------------------------------------------

/// One marker occurrence on a line.
struct Hit {
    range: Range<usize>,
    kind: MarkerKind,
    /// `None` when the written number overflows.
    original: Option<u32>,
}

/// Per-kind numbering state for figures, tables, and equations.
#[derive(Default)]
struct Sequence {
    next: u32,
    /// Original number -> assigned number of the latest definition.
    latest: HashMap<u32, u32>,
}

impl Sequence {
    fn define(&mut self, original: u32) -> u32 {
        self.next += 1;
        self.latest.insert(original, self.next);
        self.next
    }
}

/// Renumber every marker in `text`. Fenced code blocks are copied verbatim.
#[instrument(skip_all, fields(len = text.len()))]
pub fn renumber(text: &str) -> Numbered {
    let citations = citation_numbers(text);

    let mut figures = Sequence::default();
    let mut tables = Sequence::default();
    let mut equations = Sequence::default();
    let mut citation_count = 0u32;

    let mut unresolved = Vec::new();
    let mut out_lines: Vec<String> = Vec::new();
    let mut in_fence = false;

    for (idx, line) in text.split('\n').enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            out_lines.push(line.to_string());
            continue;
        }
        if in_fence {
            out_lines.push(line.to_string());
            continue;
        }

        let hits = find_hits(line);
        if hits.is_empty() {
            out_lines.push(line.to_string());
            continue;
        }

        let line_start = definition_start(line);
        let mut rewritten = String::with_capacity(line.len());
        let mut cursor = 0;

        for (pos, hit) in hits.iter().enumerate() {
            let is_definition = pos == 0 && hit.range.start == line_start;

            let replacement = hit.original.and_then(|original| match (hit.kind, is_definition) {
                (MarkerKind::Citation, true) => {
                    citation_count += 1;
                    Some(citation_count)
                }
                (MarkerKind::Citation, false) => citations.get(&original).copied(),
                (kind, true) => Some(sequence_for(kind, &mut figures, &mut tables, &mut equations).define(original)),
                (kind, false) => sequence_for(kind, &mut figures, &mut tables, &mut equations)
                    .latest
                    .get(&original)
                    .copied(),
            });

            rewritten.push_str(&line[cursor..hit.range.start]);
            match replacement {
                Some(n) => rewritten.push_str(&hit.kind.render(n)),
                None => {
                    let marker = match hit.original {
                        Some(original) => hit.kind.render(original),
                        None => {
                            let written = &line[hit.range.clone()];
                            warn!(marker = written, line = idx + 1, "marker number out of range, left as written");
                            written.to_string()
                        }
                    };
                    debug!(%marker, line = idx + 1, "unresolved reference");
                    unresolved.push(UnresolvedRef {
                        kind: hit.kind,
                        marker,
                        line: idx + 1,
                    });
                    rewritten.push_str(&line[hit.range.clone()]);
                }
            }
            cursor = hit.range.end;
        }
        rewritten.push_str(&line[cursor..]);
        out_lines.push(rewritten);
    }

    let counts = MarkerCounts {
        figures: figures.next,
        tables: tables.next,
        equations: equations.next,
        citations: citation_count,
    };
    debug!(?counts, unresolved = unresolved.len(), "renumbered markers");

    Numbered {
        text: out_lines.join("\n"),
        unresolved,
        counts,
    }
}

fn sequence_for<'a>(
    kind: MarkerKind,
    figures: &'a mut Sequence,
    tables: &'a mut Sequence,
    equations: &'a mut Sequence,
) -> &'a mut Sequence {
    match kind {
        MarkerKind::Figure => figures,
        MarkerKind::Table => tables,
        _ => equations,
    }
}

/// First pass: map each cited original number to its new number.
///
/// Citation definitions are numbered in document order; a repeated original
/// number keeps its first assignment.
fn citation_numbers(text: &str) -> HashMap<u32, u32> {
    let mut map = HashMap::new();
    let mut next = 0u32;
    let mut in_fence = false;

    for line in text.split('\n') {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let Some(first) = find_hits(line).into_iter().next() else {
            continue;
        };
        if first.kind != MarkerKind::Citation || first.range.start != definition_start(line) {
            continue;
        }
        if let Some(original) = first.original {
            next += 1;
            map.entry(original).or_insert(next);
        }
    }
    map
}

/// Byte offset where a definition marker must begin on `line`.
fn definition_start(line: &str) -> usize {
    DEFINITION_PREFIX_RE.find(line).map_or(0, |m| m.end())
}

/// All markers on a line outside protected spans, ordered by position.
fn find_hits(line: &str) -> Vec<Hit> {
    let protected: Vec<Range<usize>> = PROTECTED_RE.find_iter(line).map(|m| m.range()).collect();
    let is_protected = |r: &Range<usize>| {
        protected
            .iter()
            .any(|p| r.start < p.end && p.start < r.end)
    };

    let mut hits: Vec<Hit> = MARKER_RE
        .captures_iter(line)
        .filter_map(|caps| marker_hit(&caps))
        .chain(CITATION_RE.captures_iter(line).filter_map(|caps| {
            let m = caps.get(0)?;
            Some(Hit {
                range: m.range(),
                kind: MarkerKind::Citation,
                original: caps.get(1)?.as_str().parse().ok(),
            })
        }))
        .filter(|hit| !is_protected(&hit.range))
        .collect();

    hits.sort_by_key(|h| h.range.start);
    hits
}

fn marker_hit(caps: &Captures) -> Option<Hit> {
    let m = caps.get(0)?;
    let (kind, number) = if let Some(n) = caps.get(1) {
        (MarkerKind::Figure, n)
    } else if let Some(n) = caps.get(2) {
        (MarkerKind::Table, n)
    } else {
        (MarkerKind::Equation, caps.get(3)?)
    };
    Some(Hit {
        range: m.range(),
        kind,
        original: number.as_str().parse().ok(),
    })
}

fn is_fence(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with("```") || t.starts_with("~~~")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_are_numbered_sequentially_per_kind() {
        let text = "图5 销量趋势\n表9 参数\n图2 残差\n式(7)\n表 4 结果\n图 8 对比";
        let out = renumber(text);
        assert_eq!(out.text, "图1 销量趋势\n表1 参数\n图2 残差\n式(1)\n表2 结果\n图3 对比");
        assert_eq!(
            out.counts,
            MarkerCounts {
                figures: 3,
                tables: 2,
                equations: 1,
                citations: 0,
            }
        );
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn references_follow_their_definitions() {
        let text = "图3 原始数据\n如图3所示，增长明显。\n图1 预测\n对比图3与图1，见式（2）。\n式(2)";
        let out = renumber(text);
        let lines: Vec<&str> = out.text.lines().collect();
        assert_eq!(lines[0], "图1 原始数据");
        assert_eq!(lines[1], "如图1所示，增长明显。");
        assert_eq!(lines[2], "图2 预测");
        assert_eq!(lines[3], "对比图1与图2，见式（2）。");
        assert_eq!(lines[4], "式(1)");

        assert_eq!(
            out.unresolved,
            vec![UnresolvedRef {
                kind: MarkerKind::Equation,
                marker: "式(2)".into(),
                line: 4,
            }]
        );
    }

    #[test]
    fn each_unresolved_occurrence_is_reported_once() {
        let text = "见图9和表2。\n\n再次见图9。";
        let out = renumber(text);
        assert_eq!(out.text, text);
        let found: Vec<(&str, usize)> = out
            .unresolved
            .iter()
            .map(|u| (u.marker.as_str(), u.line))
            .collect();
        assert_eq!(found, vec![("图9", 1), ("表2", 1), ("图9", 3)]);
    }

    #[test]
    fn reference_before_definition_is_unresolved() {
        let out = renumber("如图1所示\n图1 示意图");
        assert_eq!(out.text, "如图1所示\n图1 示意图");
        assert_eq!(out.unresolved.len(), 1);
        assert_eq!(out.unresolved[0].line, 1);
    }

    #[test]
    fn citations_resolve_anywhere_in_document() {
        let text = "前人工作[12]与[3]。\n\n[12] 张三. 论文A.\n[3] 李四. 论文B.\n引用[5]。";
        let out = renumber(text);
        assert_eq!(
            out.text,
            "前人工作[1]与[2]。\n\n[1] 张三. 论文A.\n[2] 李四. 论文B.\n引用[5]。"
        );
        assert_eq!(out.counts.citations, 2);
        assert_eq!(out.unresolved.len(), 1);
        assert_eq!(out.unresolved[0].marker, "[5]");
        assert_eq!(out.unresolved[0].kind, MarkerKind::Citation);
    }

    #[test]
    fn code_blocks_links_and_images_are_untouched() {
        let text = "```\n图5 in code\n```\n![图5 趋势](figures/图5.svg)\n[1](https://example.com)\n`表3`\n图5 真正的图";
        let out = renumber(text);
        let lines: Vec<&str> = out.text.lines().collect();
        assert_eq!(lines[1], "图5 in code");
        assert_eq!(lines[3], "![图5 趋势](figures/图5.svg)");
        assert_eq!(lines[4], "[1](https://example.com)");
        assert_eq!(lines[5], "`表3`");
        assert_eq!(lines[6], "图1 真正的图");
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn only_the_leading_marker_defines() {
        let out = renumber("  表6 与表6 的说明");
        assert_eq!(out.text, "  表1 与表1 的说明");
        assert_eq!(out.counts.tables, 1);
    }

    #[test]
    fn bold_list_and_heading_captions_define() {
        let text = "**图4** 流程\n- 表7 参数\n### 图9 结果\n1. [8] 王五. 著作.\n见图4、图9与表7，参考[8]。";
        let out = renumber(text);
        let lines: Vec<&str> = out.text.lines().collect();
        assert_eq!(lines[0], "**图1** 流程");
        assert_eq!(lines[1], "- 表1 参数");
        assert_eq!(lines[2], "### 图2 结果");
        assert_eq!(lines[3], "1. [1] 王五. 著作.");
        assert_eq!(lines[4], "见图1、图2与表1，参考[1]。");
        assert_eq!(out.counts.figures, 2);
        assert_eq!(out.counts.citations, 1);
        assert!(out.unresolved.is_empty());
    }

    #[test]
    fn text_before_a_marker_still_makes_it_a_reference() {
        let out = renumber("- 如图2所示");
        assert_eq!(out.counts.figures, 0);
        assert_eq!(out.unresolved.len(), 1);
    }

    #[test]
    fn overflowing_numbers_are_reported_unresolved() {
        let text = "图99999999999 巨大\n见[123456789012]。";
        let out = renumber(text);
        assert_eq!(out.text, text);
        assert_eq!(out.counts.figures, 0);
        let markers: Vec<(&str, MarkerKind)> = out
            .unresolved
            .iter()
            .map(|u| (u.marker.as_str(), u.kind))
            .collect();
        assert_eq!(
            markers,
            vec![
                ("图99999999999", MarkerKind::Figure),
                ("[123456789012]", MarkerKind::Citation),
            ]
        );
    }

    #[test]
    fn numbering_is_strictly_increasing_in_document_order() {
        let mut text = String::new();
        for original in [40, 3, 17, 3, 99, 1] {
            text.push_str(&format!("图{original} caption\n正文\n"));
        }
        let out = renumber(&text);
        let assigned: Vec<u32> = out
            .text
            .lines()
            .filter_map(|l| l.strip_prefix('图'))
            .filter_map(|rest| rest.split(' ').next()?.parse().ok())
            .collect();
        assert_eq!(assigned, vec![1, 2, 3, 4, 5, 6]);
    }
}
