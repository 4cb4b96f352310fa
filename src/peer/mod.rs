pub mod connection;
pub mod ice;
pub mod state;
pub mod types;

pub use connection::PeerSession;
pub use ice::PendingCandidates;
pub use state::{CallStatus, NegotiationState};
pub use types::{CandidatePayload, Role};
