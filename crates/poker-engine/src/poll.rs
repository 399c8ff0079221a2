use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A ballot as submitted by a voter.
///
/// This is the engine's API surface for voting; the not-voted sentinel of
/// the wire protocol never leaks past the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "score", rename_all = "snake_case")]
pub enum VoteAction {
    /// Submit a score for the current round.
    Cast(i64),
    /// Withdraw a previously submitted score.
    Retract,
    /// Sit this round out; removes the voter from the active roster.
    Skip,
}

/// Outcome of applying a ballot to the active poll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// The vote was applied and changed state.
    Changed,
    /// The vote was applied but the value was identical.
    Unchanged,
    /// The voter is not in the active roster.
    UnknownVoter,
}

/// Aggregate of a finished round: average over submitted scores, 2dp.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PollResult {
    pub average: f64,
    pub scores: Vec<i64>,
}

/// One round's in-progress vote collection over a mutable roster.
///
/// `None` means a member has not voted yet. Skipping removes the member
/// from this poll entirely; the chain's full roster is unaffected.
#[derive(Clone, Debug)]
pub struct Poll {
    name: String,
    votes: HashMap<String, Option<i64>>,
}

impl Poll {
    pub fn new(name: impl Into<String>, roster: &[String]) -> Self {
        let votes = roster.iter().map(|v| (v.clone(), None)).collect();
        Self {
            name: name.into(),
            votes,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_voter(&self, voter: &str) -> bool {
        self.votes.contains_key(voter)
    }

    pub fn is_voted(&self, voter: &str) -> bool {
        matches!(self.votes.get(voter), Some(Some(_)))
    }

    pub fn score(&self, voter: &str) -> Option<Option<i64>> {
        self.votes.get(voter).copied()
    }

    /// Apply a score (`None` = retract) for a roster member.
    pub fn accept(&mut self, voter: &str, score: Option<i64>) -> Applied {
        match self.votes.get_mut(voter) {
            None => Applied::UnknownVoter,
            Some(current) if *current == score => Applied::Unchanged,
            Some(current) => {
                *current = score;
                Applied::Changed
            }
        }
    }

    pub fn retract(&mut self, voter: &str) -> Applied {
        self.accept(voter, None)
    }

    /// Add a member to this round's roster, unvoted. Returns whether state changed.
    pub fn add_voter(&mut self, voter: &str) -> bool {
        if self.has_voter(voter) {
            return false;
        }
        self.votes.insert(voter.to_owned(), None);
        true
    }

    /// Remove a member from this round's roster. Returns whether state changed.
    pub fn remove_voter(&mut self, voter: &str) -> bool {
        self.votes.remove(voter).is_some()
    }

    /// Ready iff the roster is non-empty and every member has voted.
    pub fn is_ready(&self) -> bool {
        !self.votes.is_empty() && self.votes.values().all(Option::is_some)
    }

    /// Compute the round result. A non-ready poll yields the zero result so
    /// callers never branch on readiness before rendering.
    pub fn compute(&self) -> PollResult {
        if !self.is_ready() {
            return PollResult::default();
        }
        let mut scores: Vec<i64> = self.votes.values().filter_map(|v| *v).collect();
        scores.sort_unstable();
        let sum: i64 = scores.iter().sum();
        let average = (sum as f64 / scores.len() as f64 * 100.0).round() / 100.0;
        PollResult { average, scores }
    }
}
