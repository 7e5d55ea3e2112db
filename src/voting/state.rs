use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an election is in its voting window.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElectionState {
    /// The window has not begun, or cannot be evaluated.
    Unopened,
    /// Voting is open.
    Active,
    /// The window has passed.
    Closed,
}

impl ElectionState {
    /// Evaluate the state of a window `[start, end]` at `now`. Both bounds are
    /// inclusive. A window missing either bound, or ending before it starts,
    /// is never opened.
    pub fn evaluate(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match (start, end) {
            (Some(start), Some(end)) if start <= end => {
                if now > end {
                    Self::Closed
                } else if now >= start {
                    Self::Active
                } else {
                    Self::Unopened
                }
            }
            _ => Self::Unopened,
        }
    }
}
