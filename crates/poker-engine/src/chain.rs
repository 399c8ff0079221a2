use uuid::Uuid;

use crate::label;
use crate::leader::Leader;
use crate::poll::Poll;

/// Ordered sequence of rounds run by one leader over a fixed roster.
///
/// Exactly one poll is current at any time. The full roster never shrinks;
/// only the active poll's roster does (via skip).
#[derive(Clone, Debug)]
pub struct PollChain {
    id: Uuid,
    leader: Leader,
    roster: Vec<String>,
    poll: Poll,
    counter: u32,
}

impl PollChain {
    pub fn new(mut leader: Leader, roster: Vec<String>) -> Self {
        leader.alive();
        let counter = 1;
        let poll = Poll::new(label::round_label(counter), &roster);
        Self {
            id: Uuid::now_v7(),
            leader,
            roster,
            poll,
            counter,
        }
    }

    /// Chain identity, used to detect the set-same-chain no-op.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn leader(&self) -> &Leader {
        &self.leader
    }

    pub fn leader_mut(&mut self) -> &mut Leader {
        &mut self.leader
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    /// Membership in the full roster, not the active poll's.
    pub fn has_voter(&self, voter: &str) -> bool {
        self.roster.iter().any(|v| v == voter)
    }

    pub fn current(&self) -> &Poll {
        &self.poll
    }

    pub fn current_mut(&mut self) -> &mut Poll {
        &mut self.poll
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    /// Start a fresh round over the full roster, all members unvoted.
    pub fn next(&mut self) {
        self.counter += 1;
        self.poll = Poll::new(label::round_label(self.counter), &self.roster);
    }
}
