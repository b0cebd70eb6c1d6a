//! Terminal input seam.
//!
//! The collector only talks to a [`Prompter`]. The terminal implementation
//! wraps `dialoguer`; [`ScriptedPrompter`] replays canned answers and records
//! what was asked, which is how the collection rules are tested.

use std::collections::VecDeque;

use dialoguer::{Input, Password};

use crate::console;
use crate::error::{InstallerError, Result};

/// Source of operator answers
pub trait Prompter {
    /// Ask for one line of text. An empty string means "no answer".
    fn ask(&mut self, prompt: &str) -> Result<String>;

    /// Ask for a secret without echoing it.
    fn ask_secret(&mut self, prompt: &str) -> Result<String>;

    /// Tell the operator something (validation feedback, notes).
    fn say(&mut self, msg: &str);
}

/// Interactive prompts on the controlling terminal
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    pub fn new() -> Self {
        Self
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        let answer: String = Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?;
        Ok(answer)
    }

    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        let answer = Password::new()
            .with_prompt(prompt)
            .allow_empty_password(true)
            .interact()?;
        Ok(answer)
    }

    fn say(&mut self, msg: &str) {
        console::warn(msg);
    }
}

/// Replays a fixed list of answers in order.
///
/// Every prompt (plain or secret) consumes the next answer. Running out of
/// answers is a prompt error, so a test fails loudly if the collector asks
/// more than expected.
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    asked: Vec<String>,
    messages: Vec<String>,
}

impl ScriptedPrompter {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            asked: Vec::new(),
            messages: Vec::new(),
        }
    }

    /// Every prompt shown so far, in order
    pub fn asked(&self) -> &[String] {
        &self.asked
    }

    /// Whether any prompt shown so far contains `needle`
    pub fn was_asked(&self, needle: &str) -> bool {
        self.asked.iter().any(|p| p.contains(needle))
    }

    /// Feedback messages shown so far
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Answers not consumed yet
    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next(&mut self, prompt: &str) -> Result<String> {
        self.asked.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| InstallerError::prompt(format!("no scripted answer for '{}'", prompt)))
    }
}

impl Prompter for ScriptedPrompter {
    fn ask(&mut self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn ask_secret(&mut self, prompt: &str) -> Result<String> {
        self.next(prompt)
    }

    fn say(&mut self, msg: &str) {
        self.messages.push(msg.to_string());
    }
}
