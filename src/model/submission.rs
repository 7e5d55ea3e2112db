use std::collections::BTreeMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The answer given to a single ballot question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Answer {
    Text(String),
    Many(Vec<String>),
}

impl Answer {
    /// The scalar value of this answer, if it has exactly one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Many(values) if values.len() == 1 => Some(&values[0]),
            Self::Many(_) => None,
        }
    }

    /// Form dispatch wraps every answer in a list, even for single-answer
    /// questions. Collapse single-element lists to their value.
    pub fn normalized(self) -> Self {
        match self {
            Self::Many(mut values) if values.len() == 1 => Self::Text(values.remove(0)),
            other => other,
        }
    }
}

impl From<&str> for Answer {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Answer {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl Display for Answer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Many(values) => write!(f, "{}", values.join(", ")),
        }
    }
}

/// One ballot submission: question title to answer. Also the shape of every
/// row in a results or quarantine store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Submission(BTreeMap<String, Answer>);

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalise every answer, see [`Answer::normalized`].
    pub fn normalized(self) -> Self {
        self.0
            .into_iter()
            .map(|(question, answer)| (question, answer.normalized()))
            .collect()
    }

    pub fn get(&self, field: &str) -> Option<&Answer> {
        self.0.get(field)
    }

    /// The scalar value of the given field, if present.
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Answer::as_text)
    }

    pub fn insert(&mut self, field: impl Into<String>, answer: impl Into<Answer>) {
        self.0.insert(field.into(), answer.into());
    }

    pub fn remove(&mut self, field: &str) -> Option<Answer> {
        self.0.remove(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Answer)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<Answer>> FromIterator<(K, V)> for Submission {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(field, answer)| (field.into(), answer.into()))
                .collect(),
        )
    }
}

impl Display for Submission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (question, answer) in &self.0 {
            writeln!(f, "{question}: {answer}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rocket::serde::json::serde_json::{self, json};

    use super::*;

    #[test]
    fn single_element_lists_collapse() {
        let raw: Submission = serde_json::from_value(json!({
            "TOKEN": ["abc123"],
            "Answer1": ["yes"],
            "Committee": ["Alice", "Bob"],
            "Comment": "already scalar",
            "Skipped": [],
        }))
        .unwrap();

        let submission = raw.normalized();
        assert_eq!(submission.get("TOKEN"), Some(&Answer::from("abc123")));
        assert_eq!(submission.get("Answer1"), Some(&Answer::from("yes")));
        assert_eq!(
            submission.get("Committee"),
            Some(&Answer::Many(vec!["Alice".into(), "Bob".into()]))
        );
        assert_eq!(submission.get("Comment"), Some(&Answer::from("already scalar")));
        assert_eq!(submission.get("Skipped"), Some(&Answer::Many(vec![])));
    }

    #[test]
    fn text_only_for_scalar_answers() {
        let submission: Submission = [
            ("one", Answer::Many(vec!["a".into()])),
            ("two", Answer::Many(vec!["a".into(), "b".into()])),
        ]
        .into_iter()
        .collect();
        assert_eq!(submission.text("one"), Some("a"));
        assert_eq!(submission.text("two"), None);
        assert_eq!(submission.text("three"), None);
    }

    #[test]
    fn display_lists_every_answer() {
        let submission: Submission = [("Answer1", "yes"), ("TOKEN", "abc123")]
            .into_iter()
            .collect();
        assert_eq!(submission.to_string(), "Answer1: yes\nTOKEN: abc123\n");
    }
}
