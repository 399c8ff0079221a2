pub mod chain;
pub mod label;
pub mod leader;
pub mod poll;
pub mod presence;
pub mod service;
pub mod session;
pub mod snapshot;
pub mod topic;

pub use poll::VoteAction;
pub use service::{ServiceSettings, SessionService};
pub use snapshot::SessionView;
