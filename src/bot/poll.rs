/// Channel polls.
///
/// One poll at a time, `Closed → Open → Closed`. Creating a poll while
/// another is open replaces it. Each voter holds one vote (1-based choice
/// index); voting again overwrites it. Ending a poll tallies every choice,
/// including zero-vote ones, and picks the winner uniformly among all
/// choices tied for the most votes.
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// What a poll asks. Accepted as JSON, inline or from the auto-poll file:
/// `{"title": "Next game?", "choices": ["Celeste", "Hades"], "random": true}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollDefinition {
    pub title: String,
    pub choices: Vec<String>,
    /// Whether `vote random` is accepted.
    #[serde(default, rename = "random", alias = "allow_random", alias = "allowRandom")]
    pub allow_random: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    #[error("there is no poll in progress")]
    NotOpen,

    #[error("invalid poll definition: {0}")]
    Definition(String),

    #[error("random voting is not allowed for this poll")]
    RandomNotAllowed,

    #[error("{input:?} is not a valid choice, pick a number from 1 to {max}")]
    InvalidChoice { input: String, max: usize },
}

impl PollDefinition {
    /// Parse and validate a JSON definition.
    pub fn from_json(raw: &str) -> Result<Self, PollError> {
        let definition: Self =
            serde_json::from_str(raw).map_err(|e| PollError::Definition(e.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    /// Read a definition from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PollError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| PollError::Definition(format!("{}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    fn validate(&self) -> Result<(), PollError> {
        if self.title.trim().is_empty() {
            return Err(PollError::Definition("title is empty".into()));
        }
        if self.choices.is_empty() {
            return Err(PollError::Definition("no choices given".into()));
        }
        if let Some(pos) = self.choices.iter().position(|c| c.trim().is_empty()) {
            return Err(PollError::Definition(format!("choice {} is empty", pos + 1)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Closed,
    Open,
}

/// Final tally of an ended poll, in choice order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome {
    pub winner: String,
    pub tally: Vec<(String, usize)>,
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Winner: {} --- ", self.winner)?;
        for (i, (choice, count)) in self.tally.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{choice}: {count}")?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct Poll {
    definition: PollDefinition,
    /// Voter login → 1-based choice.
    votes: HashMap<String, usize>,
}

#[derive(Debug)]
pub struct PollEngine {
    state: PollState,
    poll: Option<Poll>,
}

impl Default for PollEngine {
    fn default() -> Self {
        Self {
            state: PollState::Closed,
            poll: None,
        }
    }
}

impl PollEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == PollState::Open
    }

    /// Open a new poll, discarding any current one and its votes.
    pub fn create(&mut self, definition: PollDefinition) -> Result<(), PollError> {
        definition.validate()?;
        if self.is_open() {
            if let Some(old) = &self.poll {
                warn!(title = %old.definition.title, "replacing open poll");
            }
        }
        info!(title = %definition.title, choices = definition.choices.len(), "poll opened");
        self.poll = Some(Poll {
            definition,
            votes: HashMap::new(),
        });
        self.state = PollState::Open;
        Ok(())
    }

    /// Record `voter`'s pick: a 1-based index, or `random` when allowed.
    ///
    /// Returns the recorded index and choice text.
    pub fn vote(
        &mut self,
        voter: &str,
        pick: &str,
        rng: &mut impl Rng,
    ) -> Result<(usize, &str), PollError> {
        let poll = self.open_poll_mut()?;
        let max = poll.definition.choices.len();
        let pick = pick.trim();

        let index = if pick.eq_ignore_ascii_case("random") {
            if !poll.definition.allow_random {
                return Err(PollError::RandomNotAllowed);
            }
            rng.gen_range(1..=max)
        } else {
            pick.parse::<usize>()
                .ok()
                .filter(|n| (1..=max).contains(n))
                .ok_or_else(|| PollError::InvalidChoice {
                    input: pick.to_owned(),
                    max,
                })?
        };

        poll.votes.insert(voter.to_owned(), index);
        Ok((index, poll.definition.choices[index - 1].as_str()))
    }

    /// Close the poll and tally it.
    pub fn end(&mut self, rng: &mut impl Rng) -> Result<PollOutcome, PollError> {
        let poll = self.open_poll_mut()?;

        let mut counts = vec![0usize; poll.definition.choices.len()];
        for &index in poll.votes.values() {
            if let Some(count) = counts.get_mut(index - 1) {
                *count += 1;
            }
        }

        let top = counts.iter().copied().max().unwrap_or(0);
        let tied: Vec<usize> = counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count == top)
            .map(|(i, _)| i)
            .collect();
        let winner = tied.choose(rng).copied().unwrap_or(0);

        let outcome = PollOutcome {
            winner: poll.definition.choices[winner].clone(),
            tally: poll
                .definition
                .choices
                .iter()
                .cloned()
                .zip(counts)
                .collect(),
        };
        info!(
            title = %poll.definition.title,
            votes = poll.votes.len(),
            winner = %outcome.winner,
            "poll closed"
        );
        self.state = PollState::Closed;
        Ok(outcome)
    }

    /// Announcement text for the open poll.
    pub fn display(&self, command_prefix: &str) -> Result<String, PollError> {
        let def = match (&self.poll, self.state) {
            (Some(poll), PollState::Open) => &poll.definition,
            _ => return Err(PollError::NotOpen),
        };

        let choices = def
            .choices
            .iter()
            .enumerate()
            .map(|(i, choice)| format!("{}. {choice}", i + 1))
            .collect::<Vec<_>>()
            .join(" | ");
        let mut out = format!("{} ({command_prefix}vote) - Choices: {choices}", def.title);
        if def.allow_random {
            out.push_str(&format!(
                " -- You can also throw your vote away using {command_prefix}vote random"
            ));
        }
        Ok(out)
    }

    /// Number of voters in the current poll.
    pub fn vote_count(&self) -> usize {
        self.poll.as_ref().map_or(0, |p| p.votes.len())
    }

    /// `voter`'s current pick, if any.
    pub fn vote_of(&self, voter: &str) -> Option<usize> {
        self.poll.as_ref()?.votes.get(voter).copied()
    }

    fn open_poll_mut(&mut self) -> Result<&mut Poll, PollError> {
        if self.state != PollState::Open {
            return Err(PollError::NotOpen);
        }
        self.poll.as_mut().ok_or(PollError::NotOpen)
    }
}
