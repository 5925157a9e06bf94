//! Terminal confirmation prompt

use hostsync_core::traits::{ConfirmApply, ConfirmRequest};
use std::io::{self, BufRead, Write};

/// Asks on stderr and reads the answer from stdin
///
/// With `assume_yes` the warnings are still shown but no question is asked.
#[derive(Debug, Clone, Copy)]
pub struct StdinConfirm {
    pub assume_yes: bool,
}

impl ConfirmApply for StdinConfirm {
    fn confirm(&self, request: &ConfirmRequest) -> bool {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "About to {}.", request.action);
        for warning in &request.warnings {
            let _ = writeln!(stderr, "  warning: {}", warning);
        }

        if self.assume_yes {
            return true;
        }

        let _ = write!(stderr, "Proceed? [y/N] ");
        let _ = stderr.flush();
        drop(stderr);

        let mut answer = String::new();
        if io::stdin().lock().read_line(&mut answer).is_err() {
            return false;
        }
        is_yes(&answer)
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
