//! Managed block removal, rendering and candidate sanity checks
//!
//! The engine never edits the hosts file in place. It computes the complete
//! new content here, as `remove_managed_block(current) + render_block(candidate)`,
//! and hands the result to the atomic writer.

pub mod scanner;

pub use scanner::{BlockScanner, LineDecision, ScanState};

use crate::error::Error;
use crate::extract::{count_entries, is_comment, is_entry};
use crate::fetch::is_placeholder;
use crate::registry::ManagedBlock;

/// Drop every managed region and legacy entry of `block` from `content`
pub fn remove_managed_block(content: &str, block: &ManagedBlock) -> String {
    let mut scanner = BlockScanner::new(block);
    content
        .split('\n')
        .filter(|line| scanner.step(line) == LineDecision::Keep)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a candidate as the block the engine writes
///
/// Layout: begin marker, the candidate's leading comment header, its entry
/// lines, end marker. Blank lines are never emitted, and comment lines after
/// the first entry are dropped, so the rendered block is one contiguous
/// region the scanner can remove again.
pub fn render_block(block: &ManagedBlock, candidate: &str) -> String {
    let mut out = String::new();
    out.push_str(&block.begin_marker);
    out.push('\n');

    let mut seen_entry = false;
    for line in candidate.lines() {
        let line = line.trim();
        if line.is_empty() || line == block.begin_marker || line == block.end_marker {
            continue;
        }
        if is_comment(line) {
            if seen_entry {
                continue;
            }
        } else {
            seen_entry = true;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.push_str(&block.end_marker);
    out.push('\n');
    out
}

/// Compute the complete new hosts content
///
/// The existing managed region is removed, the remaining content keeps its
/// own lines (trailing whitespace trimmed), and the rendered block follows
/// after one blank line. CRLF files stay CRLF.
pub fn compose(current: &str, block: &ManagedBlock, candidate: &str) -> String {
    let cleaned = remove_managed_block(current, block);
    let cleaned = cleaned.trim_end();
    let rendered = render_block(block, candidate);

    let body = if cleaned.is_empty() {
        rendered
    } else {
        format!("{cleaned}\n\n{rendered}")
    };

    if current.contains("\r\n") {
        // Normalise first so already-CRLF lines are not doubled
        body.replace("\r\n", "\n").replace('\n', "\r\n")
    } else {
        body
    }
}

/// Number of entry lines the rendered block will contain
pub fn block_entry_count(block: &ManagedBlock, candidate: &str) -> usize {
    count_entries(&render_block(block, candidate))
}

/// Structural sanity check of a candidate
///
/// Returns non-fatal [`Error::Validation`] warnings; the caller decides
/// whether to proceed.
pub fn validate_candidate(block: &ManagedBlock, candidate: &str) -> Vec<Error> {
    let mut warnings = Vec::new();

    if is_placeholder(candidate) {
        warnings.push(Error::validation(format!(
            "candidate for '{}' is sample placeholder data, not fetched entries",
            block.service
        )));
    }

    for domain in &block.required_domains {
        if !candidate.contains(domain.as_str()) {
            warnings.push(Error::validation(format!(
                "candidate for '{}' is missing required domain {}",
                block.service, domain
            )));
        }
    }

    if !candidate.lines().any(is_entry) {
        warnings.push(Error::validation(format!(
            "candidate for '{}' contains no host entries",
            block.service
        )));
    }

    warnings
}
