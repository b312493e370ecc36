use crate::resolver::AnswerResolver;
use crate::session::{ConversationSession, TurnRole};
use crate::suggestions::SuggestionCatalog;
use crate::utils::parse_selection;
use anyhow::Result;
use std::io::{BufRead, Write};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Quit,
    Reset,
    History,
    Topics,
    Topic(String),
    Suggestion(String),
    Ask(String),
    Empty,
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    if let Some(digits) = line.strip_prefix('#') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Command::Suggestion(line.to_string());
        }
    }

    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match head {
        "/quit" | "/exit" => Command::Quit,
        "/reset" => Command::Reset,
        "/history" => Command::History,
        "/topics" => Command::Topics,
        "/topic" if !rest.trim().is_empty() => Command::Topic(rest.trim().to_string()),
        "/topic" => Command::Topics,
        _ => Command::Ask(line.to_string()),
    }
}

/// Line-oriented chat front-end: one question in, one answer out.
pub struct Shell {
    resolver: AnswerResolver,
    session: ConversationSession,
    catalog: SuggestionCatalog,
    selected: Option<String>,
}

impl Shell {
    pub fn new(resolver: AnswerResolver, catalog: SuggestionCatalog) -> Self {
        let selected = catalog.categories().first().map(|c| c.name.clone());
        Self {
            resolver,
            session: ConversationSession::new(),
            catalog,
            selected,
        }
    }

    #[cfg(test)]
    pub(crate) fn session(&self) -> &ConversationSession {
        &self.session
    }

    pub async fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> Result<()> {
        write!(out, "> ")?;
        out.flush()?;

        for line in input.lines() {
            if !self.handle(parse_command(&line?), out).await? {
                break;
            }
            write!(out, "> ")?;
            out.flush()?;
        }

        Ok(())
    }

    /// Returns `false` once the user asks to leave.
    pub async fn handle<W: Write>(&mut self, command: Command, out: &mut W) -> Result<bool> {
        match command {
            Command::Quit => return Ok(false),
            Command::Empty => {}
            Command::Reset => {
                self.session.clear();
                writeln!(out, "Conversation cleared.")?;
            }
            Command::History => {
                if self.session.is_empty() {
                    writeln!(out, "No conversation yet.")?;
                }
                for turn in self.session.history() {
                    let who = match turn.role {
                        TurnRole::User => "you",
                        TurnRole::Assistant => "ravi",
                    };
                    writeln!(out, "[{who}] {}", turn.content)?;
                }
            }
            Command::Topics => {
                for category in self.catalog.categories() {
                    writeln!(out, "{}", category.name)?;
                }
            }
            Command::Topic(name) => match self.catalog.find(&name) {
                Some(category) => {
                    for (i, question) in category.questions.iter().enumerate() {
                        writeln!(out, "#{} {}", i + 1, question)?;
                    }
                    self.selected = Some(category.name.clone());
                }
                None => writeln!(out, "Unknown topic '{name}'. Try /topics.")?,
            },
            Command::Suggestion(raw) => {
                let questions = self
                    .selected
                    .as_deref()
                    .and_then(|name| self.catalog.find(name))
                    .map(|c| c.questions.clone())
                    .unwrap_or_default();
                match parse_selection(&raw, questions.len()) {
                    Ok(i) => {
                        writeln!(out, "{}", questions[i])?;
                        self.ask(&questions[i], out).await?;
                    }
                    Err(e) => writeln!(out, "Invalid suggestion: {e}")?,
                }
            }
            Command::Ask(question) => self.ask(&question, out).await?,
        }
        Ok(true)
    }

    async fn ask<W: Write>(&mut self, question: &str, out: &mut W) -> Result<()> {
        debug!(turns = self.session.len(), "Asking");
        write!(out, "\nThinking...")?;
        out.flush()?;
        match self.resolver.resolve(&mut self.session, question).await {
            Ok(answer) => writeln!(out, "\r{}\n", answer.text)?,
            Err(e) => {
                warn!(error = %e, "Failed to answer");
                writeln!(out, "\rError: {}\n", e)?;
            }
        }
        Ok(())
    }
}
