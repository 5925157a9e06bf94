//! Two-state scanner that locates managed regions in a hosts file
//!
//! ```text
//!            begin marker / legacy keyword
//!   Outside ───────────────────────────────▶ InsideManagedBlock
//!      ▲                                            │
//!      └──────── blank line / end marker ───────────┘
//! ```
//!
//! Outside a region every line passes through, except stray end markers and
//! single legacy entries of the service. Inside a region every line is
//! dropped, including the line that closes it.

use crate::extract::is_comment;
use crate::registry::ManagedBlock;

/// Scanner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Passing lines through
    Outside,
    /// Dropping lines of a managed region
    InsideManagedBlock,
}

/// What to do with one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineDecision {
    Keep,
    Drop,
}

/// Line-by-line managed region scanner for one service
#[derive(Debug)]
pub struct BlockScanner<'a> {
    block: &'a ManagedBlock,
    state: ScanState,
}

impl<'a> BlockScanner<'a> {
    /// Start a scan in the `Outside` state
    pub fn new(block: &'a ManagedBlock) -> Self {
        Self {
            block,
            state: ScanState::Outside,
        }
    }

    /// Current state
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Consume one line and decide whether it survives
    pub fn step(&mut self, line: &str) -> LineDecision {
        let trimmed = line.trim();
        match self.state {
            ScanState::Outside => {
                if self.opens_region(line) {
                    self.state = ScanState::InsideManagedBlock;
                    LineDecision::Drop
                } else if trimmed == self.block.end_marker || self.is_legacy_entry(line) {
                    LineDecision::Drop
                } else {
                    LineDecision::Keep
                }
            }
            ScanState::InsideManagedBlock => {
                if trimmed.is_empty() || trimmed == self.block.end_marker {
                    self.state = ScanState::Outside;
                }
                LineDecision::Drop
            }
        }
    }

    fn opens_region(&self, line: &str) -> bool {
        line.trim() == self.block.begin_marker
            || self
                .block
                .legacy_keywords
                .iter()
                .any(|keyword| line.contains(keyword.as_str()))
    }

    /// An entry whose host names include one of the legacy entries exactly
    fn is_legacy_entry(&self, line: &str) -> bool {
        if self.block.legacy_entries.is_empty() || line.trim().is_empty() || is_comment(line) {
            return false;
        }
        line.split_whitespace()
            .skip(1)
            .take_while(|token| !token.starts_with('#'))
            .any(|host| self.block.legacy_entries.iter().any(|legacy| legacy == host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ServiceTag, SourceRegistry};

    fn steam() -> ManagedBlock {
        SourceRegistry::with_defaults()
            .service(&ServiceTag::new("steam"))
            .unwrap()
            .clone()
    }

    #[test]
    fn outside_passes_ordinary_lines() {
        let block = steam();
        let mut scanner = BlockScanner::new(&block);
        assert_eq!(scanner.step("127.0.0.1 localhost"), LineDecision::Keep);
        assert_eq!(scanner.step(""), LineDecision::Keep);
        assert_eq!(scanner.step("# a comment"), LineDecision::Keep);
        assert_eq!(scanner.state(), ScanState::Outside);
    }

    #[test]
    fn begin_marker_enters_region() {
        let block = steam();
        let mut scanner = BlockScanner::new(&block);
        assert_eq!(scanner.step("# hostsync:steam begin"), LineDecision::Drop);
        assert_eq!(scanner.state(), ScanState::InsideManagedBlock);
    }

    #[test]
    fn legacy_keyword_enters_region() {
        let block = steam();
        let mut scanner = BlockScanner::new(&block);
        assert_eq!(scanner.step("# Steam Hosts 配置"), LineDecision::Drop);
        assert_eq!(scanner.state(), ScanState::InsideManagedBlock);
    }

    #[test]
    fn inside_drops_until_blank_line() {
        let block = steam();
        let mut scanner = BlockScanner::new(&block);
        scanner.step("# SteamHostSync");
        assert_eq!(scanner.step("1.1.1.1 cm.steampowered.com"), LineDecision::Drop);
        assert_eq!(scanner.state(), ScanState::InsideManagedBlock);
        assert_eq!(scanner.step("   "), LineDecision::Drop);
        assert_eq!(scanner.state(), ScanState::Outside);
        assert_eq!(scanner.step("127.0.0.1 localhost"), LineDecision::Keep);
    }

    #[test]
    fn end_marker_leaves_region() {
        let block = steam();
        let mut scanner = BlockScanner::new(&block);
        scanner.step("# hostsync:steam begin");
        assert_eq!(scanner.step("# hostsync:steam end\r"), LineDecision::Drop);
        assert_eq!(scanner.state(), ScanState::Outside);
    }

    #[test]
    fn legacy_entries_match_host_exactly() {
        let block = steam();
        let mut scanner = BlockScanner::new(&block);
        assert_eq!(scanner.step("23.1.1.1 steamcommunity.com"), LineDecision::Drop);
        assert_eq!(
            scanner.step("23.1.1.1 store.steampowered.com # pinned"),
            LineDecision::Drop
        );
        assert_eq!(scanner.step("23.1.1.1 steamcommunity.com.cdn.example"), LineDecision::Keep);
        assert_eq!(scanner.step("# 23.1.1.1 steamcommunity.com"), LineDecision::Keep);
        assert_eq!(scanner.state(), ScanState::Outside);
    }
}
