//! Broken-reference report (`ref_check.md`).

use crate::numbering::UnresolvedRef;

const REPORT_HEADING: &str = "# 引用断链检查报告";

/// Render one line per unresolved reference, or a single all-clear line.
pub fn ref_check_report(unresolved: &[UnresolvedRef]) -> String {
    let mut out = format!("{REPORT_HEADING}\n\n");
    if unresolved.is_empty() {
        out.push_str("- 未检测到断链\n");
        return out;
    }
    for r in unresolved {
        out.push_str(&format!(
            "- 断链：{} 被引用但未定义（第 {} 行）\n",
            r.marker, r.line
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::numbering::MarkerKind;

    #[test]
    fn clean_report() {
        assert_eq!(
            ref_check_report(&[]),
            "# 引用断链检查报告\n\n- 未检测到断链\n"
        );
    }

    #[test]
    fn lists_every_occurrence() {
        let refs = vec![
            UnresolvedRef {
                kind: MarkerKind::Figure,
                marker: "图4".into(),
                line: 12,
            },
            UnresolvedRef {
                kind: MarkerKind::Figure,
                marker: "图4".into(),
                line: 30,
            },
        ];
        let report = ref_check_report(&refs);
        assert!(report.contains("- 断链：图4 被引用但未定义（第 12 行）\n"));
        assert!(report.contains("- 断链：图4 被引用但未定义（第 30 行）\n"));
        assert!(!report.contains("未检测到断链"));
    }
}
