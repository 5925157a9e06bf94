//! Candidate extraction
//!
//! Turns fetched text into the candidate block for one service:
//!
//! - **Full** mode passes the text through verbatim.
//! - **Scoped** mode narrows to the sentinel interior when a matched pair is
//!   present, keeps only entry lines mentioning an allow-listed domain (in
//!   input order) and prefixes a deterministic header. When nothing matches,
//!   an explicit "no entries extracted" notice replaces the empty body so a
//!   format change upstream is visible.

use crate::fetch::FetchResult;
use crate::registry::{ExtractMode, ManagedBlock, ServiceTag};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// Notice emitted instead of an empty scoped body
pub const NO_ENTRIES_NOTICE: &str = "# no entries extracted: the source format may have changed";

/// Extracted content ready to be confirmed and applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Service the candidate belongs to
    pub service: ServiceTag,
    /// Source that supplied the text
    pub source_name: String,
    /// Candidate block text
    pub body: String,
    /// When the candidate was produced
    pub generated_at: DateTime<Utc>,
    /// Whether the body is the sample/unavailable placeholder
    pub placeholder: bool,
    /// Whether an alternate source supplied the text
    pub used_fallback: bool,
}

impl Candidate {
    /// Number of entry lines in the candidate
    pub fn entry_count(&self) -> usize {
        count_entries(&self.body)
    }
}

/// Whether a line is a comment (after leading whitespace)
pub fn is_comment(line: &str) -> bool {
    line.trim_start().starts_with('#')
}

/// Whether a line is a host entry: non-blank and not a comment
pub fn is_entry(line: &str) -> bool {
    !line.trim().is_empty() && !is_comment(line)
}

/// Count host entry lines in a text
pub fn count_entries(text: &str) -> usize {
    text.lines().filter(|line| is_entry(line)).count()
}

/// Full mode: the raw text is the candidate
pub fn extract_full(raw: &str) -> String {
    raw.to_string()
}

/// The part of `raw` scoped extraction should scan
///
/// The interior of the first begin sentinel and the first end sentinel after
/// it, or the whole text when no matched pair exists.
pub fn scoped_region<'a>(raw: &'a str, block: &ManagedBlock) -> &'a str {
    let Some(sentinels) = &block.sentinels else {
        return raw;
    };
    let Some(begin) = raw.find(&sentinels.begin) else {
        return raw;
    };
    let interior_start = begin + sentinels.begin.len();
    match raw[interior_start..].find(&sentinels.end) {
        Some(end) => &raw[interior_start..interior_start + end],
        None => raw,
    }
}

/// Scoped mode: filter allow-listed entries under a generated header
pub fn extract_scoped(
    raw: &str,
    block: &ManagedBlock,
    source_name: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let kept: Vec<&str> = scoped_region(raw, block)
        .lines()
        .map(str::trim)
        .filter(|line| is_entry(line))
        .filter(|line| block.domain_allow_list.iter().any(|d| line.contains(d.as_str())))
        .collect();

    let mut out = format!(
        "# {}\n# source: {}\n# generated: {}\n",
        block.title,
        source_name,
        generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    if kept.is_empty() {
        warn!(
            "No {} entries extracted from {}; the source format may have changed",
            block.service, source_name
        );
        out.push_str(NO_ENTRIES_NOTICE);
        out.push('\n');
        out.push_str("# refresh later or copy the entries from the source manually\n");
        return out;
    }

    debug!("Extracted {} {} entries from {}", kept.len(), block.service, source_name);
    for line in kept {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// Turn a fetch result into a candidate for `block`
///
/// Placeholder payloads pass through untouched so their label survives.
pub fn extract(block: &ManagedBlock, fetched: &FetchResult) -> Candidate {
    let body = if fetched.placeholder {
        fetched.body.clone()
    } else {
        match block.mode {
            ExtractMode::Full => extract_full(&fetched.body),
            ExtractMode::Scoped => {
                extract_scoped(&fetched.body, block, &fetched.source_name, fetched.timestamp)
            }
        }
    };

    Candidate {
        service: block.service.clone(),
        source_name: fetched.source_name.clone(),
        body,
        generated_at: fetched.timestamp,
        placeholder: fetched.placeholder,
        used_fallback: fetched.used_fallback,
    }
}
