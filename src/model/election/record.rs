use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    model::mongodb::{optional_datetime, Id},
    voting::state::ElectionState,
};

/// One row of the election registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Election {
    #[serde(rename = "_id")]
    pub id: Id,
    /// Display name.
    pub title: String,
    /// Start of the voting window.
    #[serde(default, with = "optional_datetime")]
    pub start: Option<DateTime<Utc>>,
    /// End of the voting window.
    #[serde(default, with = "optional_datetime")]
    pub end: Option<DateTime<Utc>>,
    /// Opaque reference to the ballot form.
    #[serde(default)]
    pub form_edit_url: String,
    /// Who is told when the election opens and closes.
    #[serde(default, with = "officer_list")]
    pub election_officers: Vec<String>,
    /// The currently attached submission trigger, if any.
    #[serde(default, with = "trigger_id")]
    pub trigger_id: Option<String>,
}

impl Election {
    /// The ballot reference, unless it is blank.
    pub fn ballot_ref(&self) -> Option<&str> {
        let reference = self.form_edit_url.trim();
        (!reference.is_empty()).then_some(reference)
    }

    /// Both window bounds, if present.
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        Some((self.start?, self.end?))
    }

    /// Evaluate the election's state at the given instant.
    pub fn state_at(&self, now: DateTime<Utc>) -> ElectionState {
        ElectionState::evaluate(self.start, self.end, now)
    }
}

/// Officers are stored as a single comma-separated column and normalised
/// into a list once, here.
mod officer_list {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(officers: &[String], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&officers.join(","))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let column = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        let mut officers: Vec<String> = Vec::new();
        for email in column.split(',') {
            let email = email.trim().to_lowercase();
            if !email.is_empty() && !officers.contains(&email) {
                officers.push(email);
            }
        }
        Ok(officers)
    }
}

/// An empty trigger column means no trigger is attached.
mod trigger_id {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(trigger_id: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(trigger_id.as_deref().unwrap_or_default())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<String>::deserialize(deserializer)?
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()))
    }
}
