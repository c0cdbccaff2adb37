//! Human confirmation gate.

use std::io::{self, BufRead};

/// Answer that must be typed, exactly, to proceed.
pub const CONFIRMATION_WORD: &str = "yes";

/// Asks the operator whether to proceed.
pub trait Confirmation {
    /// Returns `true` only when the operator explicitly agreed.
    ///
    /// # Errors
    ///
    /// Returns any error raised while reading the answer.
    fn confirm(&mut self) -> io::Result<bool>;
}

/// Reads one line from standard input; only `yes` proceeds.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdinConfirmation;

impl Confirmation for StdinConfirmation {
    fn confirm(&mut self) -> io::Result<bool> {
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(is_confirmed(&line))
    }
}

/// Returns `true` when `answer`, minus its line ending, is exactly `yes`.
#[must_use]
pub fn is_confirmed(answer: &str) -> bool {
    answer.trim_end_matches(['\r', '\n']) == CONFIRMATION_WORD
}
