use std::time::Duration;

use poker_core::auth::Principal;
use poker_core::clock::Clock;
use poker_core::errors::SessionError;
use tracing::info;

use crate::chain::PollChain;
use crate::leader::Leader;
use crate::poll::{Applied, VoteAction};
use crate::presence::{PresenceTracker, PresenceUpdate};
use crate::session::Session;
use crate::snapshot::SessionView;
use crate::topic::{SessionTopic, Subscription};

/// Tuning for the engine's channels and timers.
#[derive(Clone, Debug)]
pub struct ServiceSettings {
    /// Intake buffer between writers and the broadcast loop.
    pub notify_buffer: usize,
    /// Per-subscriber send queue; overflow drops the oldest pending update.
    pub send_queue: usize,
    /// Presence debounce interval.
    pub presence_tick: Duration,
    /// How long a leader stays authoritative without a heartbeat.
    pub leader_max_life: chrono::Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            notify_buffer: 10,
            send_queue: 10,
            presence_tick: Duration::from_millis(200),
            leader_max_life: chrono::Duration::hours(4),
        }
    }
}

/// The application service: every session operation enters here with an
/// authenticated [`Principal`] and leaves as a masked [`SessionView`].
///
/// This is the only writer of the session; domain types report whether a
/// mutation changed anything and the service translates that into version
/// bumps, which in turn drive broadcasts.
pub struct SessionService {
    topic: SessionTopic,
    presence: PresenceTracker,
    clock: Clock,
    leader_max_life: chrono::Duration,
}

impl SessionService {
    pub fn new(clock: Clock, settings: ServiceSettings) -> Self {
        let session = Session::new(&clock);
        let topic = SessionTopic::new(session, settings.notify_buffer, settings.send_queue);
        let presence = PresenceTracker::new(
            settings.notify_buffer,
            settings.send_queue,
            settings.presence_tick,
        );
        Self {
            topic,
            presence,
            clock,
            leader_max_life: settings.leader_max_life,
        }
    }

    /// Open a session over `roster`, making the caller its leader.
    pub async fn open(
        &self,
        principal: &Principal,
        roster: Vec<String>,
    ) -> Result<SessionView, SessionError> {
        if !principal.has_permission("session", "open") {
            return Err(SessionError::Forbidden);
        }
        let roster: Vec<String> = roster
            .into_iter()
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .collect();
        if roster.is_empty() {
            return Err(SessionError::Validation(
                "at least one voter is required".into(),
            ));
        }
        let includes_caller = roster.iter().any(|v| v == principal.name());
        if !includes_caller && !principal.has_permission("session", "open@absent") {
            return Err(SessionError::Validation(
                "a session can not be started without you".into(),
            ));
        }
        let clock = self.clock.clone();
        let max_life = self.leader_max_life;
        let name = principal.name().to_owned();
        let snapshot = self
            .topic
            .write(move |session, _| {
                if session.chain().is_some() {
                    return Err(SessionError::AlreadyOpen);
                }
                let leader = Leader::new(name.clone(), clock, max_life);
                session.set_chain(Some(PollChain::new(leader, roster)));
                Ok(())
            })
            .await?;
        info!(leader = principal.name(), "session opened");
        Ok(snapshot.view_for(principal))
    }

    /// Close the session. Allowed for the leader, for anyone once the
    /// leader is dead, and for holders of `close@other`.
    pub async fn close(&self, principal: &Principal) -> Result<SessionView, SessionError> {
        let may_close_other = principal.has_permission("session", "close@other");
        let name = principal.name().to_owned();
        let snapshot = self
            .topic
            .write(move |session, _| {
                let chain = session.chain().ok_or(SessionError::Closed)?;
                let leader = chain.leader();
                if !(leader.is(&name) || leader.is_dead() || may_close_other) {
                    return Err(SessionError::NotLeader);
                }
                session.set_chain(None);
                Ok(())
            })
            .await?;
        info!(by = principal.name(), "session closed");
        Ok(snapshot.view_for(principal))
    }

    /// Apply a ballot for the caller in the current round.
    pub async fn vote(
        &self,
        principal: &Principal,
        action: VoteAction,
    ) -> Result<SessionView, SessionError> {
        if !principal.has_permission("session", "vote") {
            return Err(SessionError::Forbidden);
        }
        if let VoteAction::Cast(score) = action {
            if score < 0 {
                return Err(SessionError::Validation(
                    "a score can not be negative".into(),
                ));
            }
        }
        let name = principal.name().to_owned();
        let snapshot = self
            .topic
            .write(move |session, _| {
                let chain = session.chain_mut().ok_or(SessionError::Closed)?;
                if !chain.has_voter(&name) {
                    return Err(SessionError::VoteRejected);
                }
                let changed = match action {
                    VoteAction::Skip => chain.current_mut().remove_voter(&name),
                    VoteAction::Cast(score) => apply_score(chain, &name, Some(score))?,
                    VoteAction::Retract => apply_score(chain, &name, None)?,
                };
                if chain.leader().is(&name) {
                    chain.leader_mut().alive();
                }
                if changed {
                    session.touch();
                }
                Ok(())
            })
            .await?;
        Ok(snapshot.view_for(principal))
    }

    /// Discard the current round and start a fresh one. Leader only.
    pub async fn reset(&self, principal: &Principal) -> Result<SessionView, SessionError> {
        if !principal.has_permission("session", "reset") {
            return Err(SessionError::Forbidden);
        }
        let name = principal.name().to_owned();
        let snapshot = self
            .topic
            .write(move |session, _| {
                let chain = session.chain_mut().ok_or(SessionError::Closed)?;
                if !chain.leader().is(&name) {
                    return Err(SessionError::NotLeader);
                }
                chain.leader_mut().alive();
                chain.next();
                session.touch();
                Ok(())
            })
            .await?;
        info!(leader = principal.name(), "round reset");
        Ok(snapshot.view_for(principal))
    }

    /// Reveal every vote of the current round, once. Leader only.
    ///
    /// The reveal decorates only the snapshot this write produces; the
    /// next change broadcasts masked state again.
    pub async fn unmask(&self, principal: &Principal) -> Result<SessionView, SessionError> {
        let name = principal.name().to_owned();
        let snapshot = self
            .topic
            .write(move |session, options| {
                let chain = session.chain_mut().ok_or(SessionError::Closed)?;
                if !chain.leader().is(&name) {
                    return Err(SessionError::NotLeader);
                }
                chain.leader_mut().alive();
                options.revealed = true;
                session.touch();
                Ok(())
            })
            .await?;
        info!(leader = principal.name(), "round unmasked");
        Ok(snapshot.view_for(principal))
    }

    /// The caller's current view of the session.
    pub async fn fetch(&self, principal: &Principal) -> SessionView {
        self.topic
            .read(|session| crate::snapshot::SessionSnapshot::capture(session, false))
            .await
            .view_for(principal)
    }

    /// Subscribe to session change broadcasts.
    pub async fn subscribe(&self, principal: &Principal) -> Result<Subscription, SessionError> {
        self.topic.subscribe(principal).await
    }

    /// Rebroadcast the current state to all session subscribers.
    pub async fn sync(&self) {
        self.topic.sync().await;
    }

    /// Subscribe to presence broadcasts; counts the caller as online.
    pub async fn presence_subscribe(
        &self,
        principal: &Principal,
    ) -> Result<Subscription, SessionError> {
        self.presence.subscribe(principal).await
    }

    /// The presence roster as of now.
    pub fn presence_current(&self) -> PresenceUpdate {
        self.presence.current()
    }
}

/// Cast or retract, re-admitting a previously skipped voter first.
fn apply_score(
    chain: &mut PollChain,
    voter: &str,
    score: Option<i64>,
) -> Result<bool, SessionError> {
    let rejoined = !chain.current().has_voter(voter) && chain.current_mut().add_voter(voter);
    match chain.current_mut().accept(voter, score) {
        Applied::Changed => Ok(true),
        Applied::Unchanged => Ok(rejoined),
        Applied::UnknownVoter => Err(SessionError::VoteRejected),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use poker_core::auth::{Policy, Role};
    use tokio::time::timeout;

    use super::*;
    use crate::snapshot::VoterView;

    /// Test double for the deployment policy: voters run their own
    /// sessions, the scrum master additionally closes foreign ones and
    /// sees all votes.
    struct TablePolicy;

    impl Policy for TablePolicy {
        fn allows(&self, role: Role, resource: &str, action: &str) -> bool {
            if resource != "session" {
                return false;
            }
            match action {
                "open" | "vote" | "reset" => true,
                "open@absent" | "close@other" | "view_all_others" => {
                    role == Role::ScrumMaster
                }
                _ => false,
            }
        }
    }

    fn voter(name: &str) -> Principal {
        Principal::new(name, Role::Voter, Arc::new(TablePolicy))
    }

    fn master(name: &str) -> Principal {
        Principal::new(name, Role::ScrumMaster, Arc::new(TablePolicy))
    }

    fn service() -> SessionService {
        SessionService::new(Clock::new(), ServiceSettings::default())
    }

    fn service_with_clock(clock: Clock) -> SessionService {
        SessionService::new(clock, ServiceSettings::default())
    }

    fn names(all: &[&str]) -> Vec<String> {
        all.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn full_round_flow() {
        let svc = service();
        let ann = voter("ann");
        let bob = voter("bob");

        let view = svc.open(&ann, names(&["ann", "bob"])).await.unwrap();
        let chain = view.chain.unwrap();
        assert_eq!(chain.leader, "ann");
        assert_eq!(chain.voters["ann"], VoterView::NotVoted);

        let view = svc.vote(&ann, VoteAction::Cast(3)).await.unwrap();
        let chain = view.chain.unwrap();
        assert_eq!(chain.voters["ann"], VoterView::Voted(3));
        assert_eq!(chain.voters["bob"], VoterView::NotVoted);
        assert!(chain.result.is_none());

        let view = svc.vote(&bob, VoteAction::Cast(5)).await.unwrap();
        let chain = view.chain.unwrap();
        // votes stay masked even when the result is out
        assert_eq!(chain.voters["ann"], VoterView::Hidden);
        let result = chain.result.unwrap();
        assert_eq!(result.average, 4.0);
        assert_eq!(result.scores, vec![3, 5]);

        // ann sees the same through fetch
        let view = svc.fetch(&ann).await;
        let chain = view.chain.unwrap();
        assert_eq!(chain.voters["ann"], VoterView::Voted(3));
        assert_eq!(chain.voters["bob"], VoterView::Hidden);
    }

    #[tokio::test]
    async fn open_requires_caller_in_roster_unless_privileged() {
        let svc = service();
        let err = svc.open(&voter("ann"), names(&["bob"])).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));

        // the scrum master may run a session it is not voting in
        let view = svc.open(&master("sm"), names(&["ann", "bob"])).await.unwrap();
        assert_eq!(view.chain.unwrap().leader, "sm");
    }

    #[tokio::test]
    async fn open_rejects_empty_roster_and_double_open() {
        let svc = service();
        let ann = voter("ann");
        let err = svc.open(&ann, names(&["  ", ""])).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));

        svc.open(&ann, names(&["ann"])).await.unwrap();
        let err = svc.open(&ann, names(&["ann"])).await.unwrap_err();
        assert_eq!(err, SessionError::AlreadyOpen);
    }

    #[tokio::test]
    async fn close_is_gated_on_leadership() {
        let svc = service();
        let ann = voter("ann");
        let bob = voter("bob");

        assert_eq!(svc.close(&ann).await.unwrap_err(), SessionError::Closed);

        svc.open(&ann, names(&["ann", "bob"])).await.unwrap();
        assert_eq!(svc.close(&bob).await.unwrap_err(), SessionError::NotLeader);

        let view = svc.close(&ann).await.unwrap();
        assert!(view.chain.is_none());
        assert_eq!(
            svc.vote(&ann, VoteAction::Cast(1)).await.unwrap_err(),
            SessionError::Closed
        );
    }

    #[tokio::test]
    async fn anyone_may_close_after_the_leader_dies() {
        let clock = Clock::new();
        let svc = service_with_clock(clock.clone());
        svc.open(&voter("ann"), names(&["ann", "bob"])).await.unwrap();

        clock.set_offset(chrono::Duration::hours(5));
        let view = svc.close(&voter("bob")).await.unwrap();
        assert!(view.chain.is_none());
    }

    #[tokio::test]
    async fn master_may_close_a_live_foreign_session() {
        let svc = service();
        svc.open(&voter("ann"), names(&["ann"])).await.unwrap();
        let view = svc.close(&master("sm")).await.unwrap();
        assert!(view.chain.is_none());
    }

    #[tokio::test]
    async fn voting_edge_cases() {
        let svc = service();
        let ann = voter("ann");
        svc.open(&ann, names(&["ann", "bob"])).await.unwrap();

        let err = svc.vote(&ann, VoteAction::Cast(-1)).await.unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));

        let err = svc.vote(&voter("zz"), VoteAction::Cast(1)).await.unwrap_err();
        assert_eq!(err, SessionError::VoteRejected);
    }

    #[tokio::test]
    async fn skip_and_rejoin() {
        let svc = service();
        let ann = voter("ann");
        let bob = voter("bob");
        svc.open(&ann, names(&["ann", "bob"])).await.unwrap();

        let view = svc.vote(&bob, VoteAction::Skip).await.unwrap();
        assert_eq!(view.chain.as_ref().unwrap().voters["bob"], VoterView::Skipped);

        // the round completes without the skipped voter
        let view = svc.vote(&ann, VoteAction::Cast(3)).await.unwrap();
        let chain = view.chain.unwrap();
        assert_eq!(chain.result.unwrap().scores, vec![3]);

        // voting again re-admits bob and reopens the round
        let view = svc.vote(&bob, VoteAction::Cast(5)).await.unwrap();
        let chain = view.chain.unwrap();
        assert_eq!(chain.voters["bob"], VoterView::Voted(5));
        assert_eq!(chain.result.unwrap().scores, vec![3, 5]);

        // a reset restores the full roster
        let view = svc.reset(&ann).await.unwrap();
        let chain = view.chain.unwrap();
        assert_eq!(chain.voters["bob"], VoterView::NotVoted);
        assert!(chain.result.is_none());
    }

    #[tokio::test]
    async fn reset_is_leader_only() {
        let svc = service();
        let ann = voter("ann");
        svc.open(&ann, names(&["ann", "bob"])).await.unwrap();
        assert_eq!(
            svc.reset(&voter("bob")).await.unwrap_err(),
            SessionError::NotLeader
        );
    }

    #[tokio::test]
    async fn unmask_is_one_shot() {
        let svc = service();
        let ann = voter("ann");
        let bob = voter("bob");
        svc.open(&ann, names(&["ann", "bob"])).await.unwrap();
        svc.vote(&bob, VoteAction::Cast(5)).await.unwrap();

        assert_eq!(
            svc.unmask(&bob).await.unwrap_err(),
            SessionError::NotLeader
        );

        let view = svc.unmask(&ann).await.unwrap();
        let chain = view.chain.unwrap();
        assert!(chain.unmasked);
        assert_eq!(chain.voters["bob"], VoterView::Voted(5));

        // masking is back for every later read
        let view = svc.fetch(&ann).await;
        let chain = view.chain.unwrap();
        assert!(!chain.unmasked);
        assert_eq!(chain.voters["bob"], VoterView::Hidden);
    }

    #[tokio::test]
    async fn subscribers_receive_masked_updates() {
        let svc = service();
        let ann = voter("ann");
        let bob = voter("bob");
        svc.open(&ann, names(&["ann", "bob"])).await.unwrap();

        let mut sub = svc.subscribe(&bob).await.unwrap();
        svc.vote(&ann, VoteAction::Cast(3)).await.unwrap();

        let message = timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("update")
            .expect("topic alive");
        let view = message.render(&bob);
        assert_eq!(view["chain"]["voters"]["ann"]["state"], "hidden");
        sub.leave().await;
    }

    #[tokio::test]
    async fn forbidden_without_vote_permission() {
        struct DenyAll;
        impl Policy for DenyAll {
            fn allows(&self, _: Role, _: &str, _: &str) -> bool {
                false
            }
        }
        let svc = service();
        let outsider = Principal::new("ann", Role::Voter, Arc::new(DenyAll));
        assert_eq!(
            svc.vote(&outsider, VoteAction::Cast(1)).await.unwrap_err(),
            SessionError::Forbidden
        );
        assert_eq!(
            svc.open(&outsider, names(&["ann"])).await.unwrap_err(),
            SessionError::Forbidden
        );
    }
}
