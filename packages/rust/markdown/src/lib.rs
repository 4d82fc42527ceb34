//! Markdown post-processing for the merged paper.
//!
//! Numbers figures, tables, equations, and citations, reports references
//! that point nowhere, and builds the table of contents.

mod cleanup;
mod numbering;
mod report;
mod toc;

pub use cleanup::tidy;
pub use numbering::{MarkerCounts, MarkerKind, Numbered, UnresolvedRef, renumber};
pub use report::ref_check_report;
pub use toc::{TOC_HEADING, generate_toc};
