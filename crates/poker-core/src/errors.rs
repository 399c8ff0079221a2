/// Typed error taxonomy for session operations.
///
/// Conflict errors abort a write transaction before any version bump, so a
/// failed operation never produces a broadcast. System errors are surfaced
/// opaquely and logged at the boundary.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    // Validation — malformed input, no mutation
    #[error("invalid request: {0}")]
    Validation(String),

    // Authorization
    #[error("authorization required")]
    Unauthenticated,
    #[error("wrong credentials, try again")]
    InvalidCredentials,
    #[error("operation is not authorized")]
    Forbidden,
    #[error("you are not the leader")]
    NotLeader,

    // Conflict — state disagreement, transaction aborts untouched
    #[error("session is already open")]
    AlreadyOpen,
    #[error("session closed")]
    Closed,
    #[error("vote rejected")]
    VoteRejected,

    // System — collaborator failure
    #[error("internal error: {0}")]
    System(String),
}

impl SessionError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyOpen | Self::Closed | Self::VoteRejected)
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Forbidden => "forbidden",
            Self::NotLeader => "not_leader",
            Self::AlreadyOpen => "already_open",
            Self::Closed => "closed",
            Self::VoteRejected => "vote_rejected",
            Self::System(_) => "system",
        }
    }
}
