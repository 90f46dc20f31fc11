//! Output assembly: ordered pages → one markdown document.
//!
//! Every page is emitted as
//!
//! ```text
//! ## Page <n>
//!
//! <page markdown>
//!
//! ```
//!
//! where `n` is the provider's 0-based page index plus one. Pages are
//! emitted in the order given; sorting is the adapter's job.

use crate::model::PageText;

/// Heading prefix for every page block.
pub const PAGE_HEADING_PREFIX: &str = "## Page ";

/// Concatenate pages under `## Page N` headings, blank line between pages.
pub fn assemble_markdown(pages: &[PageText]) -> String {
    let capacity = pages.iter().map(|p| p.markdown.len() + 16).sum();
    let mut out = String::with_capacity(capacity);
    for page in pages {
        out.push_str(PAGE_HEADING_PREFIX);
        out.push_str(&page.page_number().to_string());
        out.push_str("\n\n");
        out.push_str(&page.markdown);
        out.push_str("\n\n");
    }
    out
}

/// Number of page blocks in an assembled document.
pub fn count_pages(markdown: &str) -> usize {
    markdown
        .lines()
        .filter(|line| {
            line.strip_prefix(PAGE_HEADING_PREFIX)
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
        })
        .count()
}

/// Export file name: the stored filename without its extension, then the job id.
///
/// `3f2a….pdf` + job 12 → `3f2a…_12.md`
pub fn output_filename(stored_filename: &str, job_id: i64) -> String {
    let stem = match stored_filename.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => stored_filename,
    };
    format!("{stem}_{job_id}.md")
}
