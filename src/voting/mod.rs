//! The election workflow: when ballots open and close, and which votes count.

pub mod lifecycle;
pub mod scheduler;
pub mod state;
pub mod submission;
pub mod validator;

pub use lifecycle::{LifecycleManager, ScanIssue, ScanReport};
pub use scheduler::LifecycleFairing;
pub use state::ElectionState;
pub use submission::{SubmissionEvent, SubmissionHandler, SubmissionReceipt};
pub use validator::Verdict;
