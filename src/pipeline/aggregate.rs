//! Result aggregation: per-page outcomes → [`PipelineResult`].

use crate::output::{PageInfo, PageResult, PipelineResult};
use std::fmt::Write as _;

/// `--- Page {n} (conf {pct}%) ---`, confidence rounded to a whole percent.
pub fn page_header(page_index: usize, mean_confidence: f32) -> String {
    format!(
        "--- Page {} (conf {:.0}%) ---",
        page_index,
        mean_confidence * 100.0
    )
}

/// Concatenate pages in order: header line, raw text, a line break, then one
/// blank line.
pub fn combined_text(pages: &[PageResult]) -> String {
    let mut out = String::with_capacity(pages.iter().map(|p| p.text.len() + 40).sum());
    for page in pages {
        // Writing into a String cannot fail.
        let _ = writeln!(out, "{}", page_header(page.page_index, page.mean_confidence));
        out.push_str(&page.text);
        out.push('\n');
        out.push('\n');
    }
    out
}

/// Assemble the final result from page outcomes in source order.
pub fn aggregate(outcomes: Vec<(PageResult, PageInfo)>) -> PipelineResult {
    let (pages, page_infos): (Vec<_>, Vec<_>) = outcomes.into_iter().unzip();
    let combined_text = combined_text(&pages);
    PipelineResult {
        pages,
        combined_text,
        page_infos,
    }
}
