//! Confirmation gate for destructive runs.
//!
//! `clean` asks before deleting unless `--force` or `--dry-run` is given.
//! Prompts are skipped when stdin/stdout is not a TTY or JSON logging is on.

use std::io::{BufRead, IsTerminal, Write};

use anyhow::{Context, Result, anyhow};

use crate::types::error::S3tkError;

/// Printed when the user declines.
pub const DECLINED_MESSAGE: &str = "Understood. Doing nothing.";

/// Reads the answer to a confirmation question.
///
/// [`StdioPromptHandler`] talks to the terminal; tests supply canned answers.
pub trait PromptHandler: Send + Sync {
    /// Show `question` and return the trimmed answer.
    fn read_confirmation(&self, question: &str) -> Result<String>;

    fn is_interactive(&self) -> bool;
}

pub struct StdioPromptHandler;

impl PromptHandler for StdioPromptHandler {
    fn read_confirmation(&self, question: &str) -> Result<String> {
        print!("{question} [yes/no]: ");
        std::io::stdout()
            .flush()
            .context("failed to flush stdout.")?;

        let mut input = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut input)
            .context("failed to read confirmation from stdin.")?;
        Ok(input.trim().to_string())
    }

    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
    }
}

pub struct SafetyChecker {
    dry_run: bool,
    force: bool,
    json_logging: bool,
    prompt_handler: Box<dyn PromptHandler>,
}

impl SafetyChecker {
    pub fn new(dry_run: bool, force: bool, json_logging: bool) -> Self {
        Self::with_prompt_handler(dry_run, force, json_logging, Box::new(StdioPromptHandler))
    }

    pub fn with_prompt_handler(
        dry_run: bool,
        force: bool,
        json_logging: bool,
        prompt_handler: Box<dyn PromptHandler>,
    ) -> Self {
        Self {
            dry_run,
            force,
            json_logging,
            prompt_handler,
        }
    }

    /// `Err(Cancelled)` when the user answers anything but yes.
    pub fn check_before_deletion(&self, question: &str) -> Result<()> {
        if self.dry_run || self.force || self.should_skip_prompt() {
            return Ok(());
        }

        let input = self.prompt_handler.read_confirmation(question)?;
        if !is_affirmative(&input) {
            return Err(anyhow!(S3tkError::Cancelled));
        }
        Ok(())
    }

    fn should_skip_prompt(&self) -> bool {
        self.json_logging || !self.prompt_handler.is_interactive()
    }
}

fn is_affirmative(input: &str) -> bool {
    matches!(input.to_ascii_lowercase().as_str(), "y" | "yes")
}

/// The question asked before `clean` deletes anything.
pub fn clean_question(uri: &str, pattern: Option<&str>) -> String {
    match pattern {
        Some(pattern) => format!("Delete all keys at {uri} matching regex {pattern} ?"),
        None => format!("Delete all keys at {uri} ?"),
    }
}
