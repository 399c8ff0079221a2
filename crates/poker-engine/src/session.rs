use poker_core::clock::Clock;

use crate::chain::PollChain;

/// The one live versioned voting context for a team.
///
/// The version is seeded from wall-clock seconds so restarts never reuse a
/// fingerprint, and bumps on every state-changing operation. It doubles as
/// the client-side optimistic-concurrency fingerprint and the broadcaster's
/// dirty signal. Ownership is strictly Session → PollChain → Poll.
#[derive(Clone, Debug)]
pub struct Session {
    version: i64,
    chain: Option<PollChain>,
}

impl Session {
    pub fn new(clock: &Clock) -> Self {
        Self {
            version: clock.now().timestamp(),
            chain: None,
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn chain(&self) -> Option<&PollChain> {
        self.chain.as_ref()
    }

    pub fn chain_mut(&mut self) -> Option<&mut PollChain> {
        self.chain.as_mut()
    }

    /// Replace the chain (`None` = closed). Bumps the version unless the
    /// replacement is identical: same chain id, or both absent.
    pub fn set_chain(&mut self, chain: Option<PollChain>) {
        let same = match (&self.chain, &chain) {
            (Some(current), Some(next)) => current.id() == next.id(),
            (None, None) => true,
            _ => false,
        };
        if !same {
            self.chain = chain;
            self.touch();
        }
    }

    /// Mark the session dirty.
    pub fn touch(&mut self) {
        self.version += 1;
    }
}
