use std::collections::BTreeMap;

use poker_core::auth::Principal;
use serde::{Deserialize, Serialize};

use crate::poll::PollResult;
use crate::session::Session;
use crate::topic::ViewMessage;

/// A member's true status inside an unmasked snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "score", rename_all = "snake_case")]
pub enum VoterState {
    NotVoted,
    Voted(i64),
    Skipped,
}

/// A member's status as one particular viewer sees it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "score", rename_all = "snake_case")]
pub enum VoterView {
    NotVoted,
    Voted(i64),
    Skipped,
    /// Another member's unrevealed vote.
    Hidden,
}

/// Immutable unmasked copy of session state at one version.
///
/// Captured once per transaction under the lock; arbitrarily many
/// differently-privileged views are derived from it afterwards without
/// re-reading the session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: i64,
    /// One-shot unmask flag: set by the unmask write, never persisted on
    /// the session, so it decorates exactly the snapshots (response and
    /// broadcast) produced by that write.
    pub revealed: bool,
    pub chain: Option<ChainSnapshot>,
}

/// Unmasked chain state inside a [`SessionSnapshot`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub name: String,
    pub leader: String,
    pub voters: BTreeMap<String, VoterState>,
    pub result: Option<PollResult>,
    pub skipped: u32,
}

/// Masked per-viewer projection, the only shape that leaves the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub version: i64,
    pub chain: Option<ChainView>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainView {
    pub name: String,
    pub leader: String,
    pub unmasked: bool,
    pub skipped: u32,
    pub voters: BTreeMap<String, VoterView>,
    pub result: Option<PollResult>,
}

impl SessionSnapshot {
    /// Capture the full truth of `session` at its current version.
    pub fn capture(session: &Session, revealed: bool) -> Self {
        let chain = session.chain().map(|chain| {
            let poll = chain.current();
            let mut skipped = 0;
            let mut voters = BTreeMap::new();
            for voter in chain.roster() {
                let state = match poll.score(voter) {
                    Some(Some(score)) => VoterState::Voted(score),
                    Some(None) => VoterState::NotVoted,
                    None => {
                        skipped += 1;
                        VoterState::Skipped
                    }
                };
                voters.insert(voter.clone(), state);
            }
            ChainSnapshot {
                name: poll.name().to_owned(),
                leader: chain.leader().name().to_owned(),
                voters,
                result: poll.is_ready().then(|| poll.compute()),
                skipped,
            }
        });
        Self {
            version: session.version(),
            revealed,
            chain,
        }
    }

    /// Project the snapshot for one viewer.
    ///
    /// A voter always sees its own score. Everything is visible once the
    /// round is revealed or when the viewer holds `session/view_all_others`.
    /// Skipped and not-voted members are never secret. The computed result
    /// is shared as-is: once every member has voted the round is public.
    pub fn view_for(&self, principal: &Principal) -> SessionView {
        let chain = self.chain.as_ref().map(|chain| {
            let view_all =
                self.revealed || principal.has_permission("session", "view_all_others");
            let voters = chain
                .voters
                .iter()
                .map(|(voter, state)| {
                    let view = match state {
                        VoterState::NotVoted => VoterView::NotVoted,
                        VoterState::Skipped => VoterView::Skipped,
                        VoterState::Voted(score) => {
                            if view_all || principal.name() == voter {
                                VoterView::Voted(*score)
                            } else {
                                VoterView::Hidden
                            }
                        }
                    };
                    (voter.clone(), view)
                })
                .collect();
            ChainView {
                name: chain.name.clone(),
                leader: chain.leader.clone(),
                unmasked: self.revealed,
                skipped: chain.skipped,
                voters,
                result: chain.result.clone(),
            }
        });
        SessionView {
            version: self.version,
            chain,
        }
    }
}

impl ViewMessage for SessionSnapshot {
    fn render(&self, principal: &Principal) -> serde_json::Value {
        serde_json::to_value(self.view_for(principal)).unwrap_or_default()
    }
}
