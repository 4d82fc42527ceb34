//! Table of contents from second-level headings.

use std::sync::LazyLock;

use regex::Regex;

pub const TOC_HEADING: &str = "# 目录";

static H2_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+(.+?)\s*$").expect("valid regex"));

/// Build a numbered list of every `## ` heading outside fenced code.
///
/// Returns an empty string when there are no such headings, otherwise the
/// block ends with a blank line so it can be prepended to the body.
pub fn generate_toc(text: &str) -> String {
    let mut in_fence = false;
    let mut names = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if let Some(caps) = H2_RE.captures(line) {
            names.push(caps[1].to_string());
        }
    }

    if names.is_empty() {
        return String::new();
    }

    let mut toc = format!("{TOC_HEADING}\n\n");
    for (i, name) in names.iter().enumerate() {
        toc.push_str(&format!("{}. {name}\n", i + 1));
    }
    toc.push('\n');
    toc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_h2_headings_in_order() {
        let text = "## 摘要\n内容\n### 细节\n##  问题重述  \n```\n## 代码里的标题\n```\n## 结论";
        assert_eq!(
            generate_toc(text),
            "# 目录\n\n1. 摘要\n2. 问题重述\n3. 结论\n\n"
        );
    }

    #[test]
    fn empty_without_headings() {
        assert_eq!(generate_toc("# 标题\n正文"), "");
    }
}
