//! Whitespace cleanup for assembled Markdown.
//!
//! Each pass is a function `&str -> String` applied in sequence. Fenced code
//! blocks are copied verbatim by every pass that edits line content.

/// Run the full cleanup pipeline on assembled Markdown.
pub fn tidy(md: &str) -> String {
    let mut result = normalize_line_endings(md);

    result = trim_trailing_whitespace(&result);
    result = collapse_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Line endings
// ---------------------------------------------------------------------------

/// Convert CRLF and lone CR to LF and drop a leading BOM.
fn normalize_line_endings(md: &str) -> String {
    md.trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
}

// ---------------------------------------------------------------------------
// Pass 2: Trailing whitespace
// ---------------------------------------------------------------------------

/// Strip trailing spaces and tabs outside code blocks.
fn trim_trailing_whitespace(md: &str) -> String {
    let mut in_code_block = false;
    md.split('\n')
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
                in_code_block = !in_code_block;
                return line.trim_end();
            }
            if in_code_block { line } else { line.trim_end() }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 3: Blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines outside code blocks into a single blank line.
fn collapse_blank_lines(md: &str) -> String {
    let mut in_code_block = false;
    let mut previous_blank = false;
    let mut kept = Vec::new();

    for line in md.split('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_code_block = !in_code_block;
            previous_blank = false;
            kept.push(line);
            continue;
        }
        if in_code_block {
            kept.push(line);
            continue;
        }

        let blank = line.trim().is_empty();
        if !(blank && previous_blank) {
            kept.push(line);
        }
        previous_blank = blank;
    }

    kept.join("\n")
}

// ---------------------------------------------------------------------------
// Pass 4: Trailing newline
// ---------------------------------------------------------------------------

/// Ensure the file ends with exactly one newline.
fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_end_matches('\n');
    format!("{trimmed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_endings_normalized() {
        assert_eq!(normalize_line_endings("\u{feff}a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn trailing_whitespace_kept_in_code() {
        let input = "text   \n```\ncode  \n```\nmore\t";
        assert_eq!(trim_trailing_whitespace(input), "text\n```\ncode  \n```\nmore");
    }

    #[test]
    fn collapse_blank_lines_keeps_one() {
        assert_eq!(collapse_blank_lines("A\n\n\n\n\nB"), "A\n\nB");
        assert_eq!(collapse_blank_lines("A\n\nB"), "A\n\nB");
    }

    #[test]
    fn blank_runs_inside_code_blocks_survive() {
        let input = "```python\nx = 1\n\n\n\ny = 2\n```\n\n\n\nafter";
        assert_eq!(
            collapse_blank_lines(input),
            "```python\nx = 1\n\n\n\ny = 2\n```\n\nafter"
        );
    }

    #[test]
    fn full_pipeline_preserves_fenced_spacing() {
        let input = "intro\n\n\n~~~\na\n\n\nb\n~~~\n";
        assert_eq!(tidy(input), "intro\n\n~~~\na\n\n\nb\n~~~\n");
    }

    #[test]
    fn full_pipeline() {
        let input = "## 摘要  \r\n\r\n\r\n\r\n正文\n\n\n";
        assert_eq!(tidy(input), "## 摘要\n\n正文\n");
    }
}
