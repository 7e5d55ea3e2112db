//! An in-memory platform for tests, with switches to make individual
//! collaborators fail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use rocket::http::Status;

use crate::{
    error::{Error, NotifyError, ResolutionError, Result, TriggerError},
    model::{
        ballot::{Ballot, BallotAccessor},
        election::{Election, ElectionRegistry},
        notify::{Notification, Notifier},
        platform::Platform,
        results::{ResultsStore, StoreHandle},
        submission::Submission,
        token::{TokenKind, TokenStore},
        trigger::{Trigger, TriggerRegistry},
    },
};

pub const HANDLER: &str = "on_ballot_submission";

struct MemoryToken {
    email: String,
    destination_id: String,
    kind: TokenKind,
}

#[derive(Default)]
struct MemoryDestination {
    title: String,
    collaborators: Vec<String>,
    needs_attention: bool,
    stores: BTreeMap<String, Vec<Submission>>,
}

#[derive(Default)]
struct MemoryState {
    elections: Vec<Election>,
    ballots: Vec<Ballot>,
    triggers: Vec<Trigger>,
    tokens: HashMap<String, MemoryToken>,
    destinations: HashMap<String, MemoryDestination>,
    sent: Vec<Notification>,
    registry_writes: usize,
    triggers_created: usize,
    issued: usize,
    fail_notifications: bool,
    /// Destinations whose trigger creation fails.
    fail_trigger_creation: HashSet<String>,
    fail_registry_writes: bool,
    fail_appends: bool,
}

/// Every collaborator backed by one shared in-memory state. Clones share it.
#[derive(Clone, Default)]
pub struct MemoryPlatform(Arc<Mutex<MemoryState>>);

fn injected(what: &str) -> Error {
    Error::Status(Status::ServiceUnavailable, format!("{what} unavailable"))
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.0.lock().unwrap()
    }

    /// A `Platform` whose collaborators all share this state.
    pub fn platform(&self) -> Platform {
        Platform {
            registry: Arc::new(self.clone()),
            ballots: Arc::new(self.clone()),
            triggers: Arc::new(self.clone()),
            tokens: Arc::new(self.clone()),
            results: Arc::new(self.clone()),
            notifier: Arc::new(self.clone()),
        }
    }

    pub fn add_election(&self, election: Election) {
        self.state().elections.push(election);
    }

    pub fn add_ballot(&self, ballot: Ballot) {
        self.state().ballots.push(ballot);
    }

    pub fn remove_ballot(&self, reference: &str) {
        self.state()
            .ballots
            .retain(|ballot| ballot.edit_url != reference);
    }

    pub fn add_destination(&self, id: &str, title: &str, collaborators: &[&str]) {
        let mut state = self.state();
        let destination = state.destinations.entry(id.to_string()).or_default();
        destination.title = title.to_string();
        destination.collaborators = collaborators.iter().map(|c| c.to_string()).collect();
    }

    pub fn add_store(&self, destination_id: &str, name: &str, rows: Vec<Submission>) {
        self.state()
            .destinations
            .entry(destination_id.to_string())
            .or_default()
            .stores
            .insert(name.to_string(), rows);
    }

    pub fn add_token(&self, token: &str, email: &str, destination_id: &str) {
        self.insert_token(token, email, destination_id, TokenKind::OneTime);
    }

    pub fn add_multi_use_token(&self, token: &str, email: &str, destination_id: &str) {
        self.insert_token(token, email, destination_id, TokenKind::MultiUse);
    }

    fn insert_token(&self, token: &str, email: &str, destination_id: &str, kind: TokenKind) {
        self.state().tokens.insert(
            token.to_string(),
            MemoryToken {
                email: email.to_string(),
                destination_id: destination_id.to_string(),
                kind,
            },
        );
    }

    pub fn has_token(&self, token: &str) -> bool {
        self.state().tokens.contains_key(token)
    }

    pub fn token_count(&self) -> usize {
        self.state().tokens.len()
    }

    pub fn add_trigger(&self, id: &str, source_id: &str) {
        self.add_handler_trigger(id, HANDLER, source_id);
    }

    pub fn add_handler_trigger(&self, id: &str, handler: &str, source_id: &str) {
        self.state().triggers.push(Trigger {
            id: id.to_string(),
            handler: handler.to_string(),
            source_id: source_id.to_string(),
        });
    }

    pub fn has_trigger(&self, id: &str) -> bool {
        self.state().triggers.iter().any(|trigger| trigger.id == id)
    }

    /// Every trigger, whatever its handler.
    pub fn triggers(&self) -> Vec<Trigger> {
        self.state().triggers.clone()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.state().sent.clone()
    }

    /// Rows of a store, or `None` if it doesn't exist.
    pub fn rows(&self, destination_id: &str, store: &str) -> Option<Vec<Submission>> {
        self.state()
            .destinations
            .get(destination_id)
            .and_then(|destination| destination.stores.get(store))
            .cloned()
    }

    pub fn needs_attention(&self, destination_id: &str) -> bool {
        self.state()
            .destinations
            .get(destination_id)
            .map_or(false, |destination| destination.needs_attention)
    }

    /// The stored election with the given title.
    pub fn election(&self, title: &str) -> Election {
        self.state()
            .elections
            .iter()
            .find(|election| election.title == title)
            .cloned()
            .unwrap()
    }

    /// The stored ballot with the given reference.
    pub fn ballot(&self, reference: &str) -> Ballot {
        self.state()
            .ballots
            .iter()
            .find(|ballot| ballot.edit_url == reference)
            .cloned()
            .unwrap()
    }

    pub fn registry_writes(&self) -> usize {
        self.state().registry_writes
    }

    pub fn triggers_created(&self) -> usize {
        self.state().triggers_created
    }

    pub fn fail_notifications(&self, fail: bool) {
        self.state().fail_notifications = fail;
    }

    pub fn fail_trigger_creation(&self, destination_id: &str, fail: bool) {
        let mut state = self.state();
        if fail {
            state.fail_trigger_creation.insert(destination_id.to_string());
        } else {
            state.fail_trigger_creation.remove(destination_id);
        }
    }

    pub fn fail_registry_writes(&self, fail: bool) {
        self.state().fail_registry_writes = fail;
    }

    pub fn fail_appends(&self, fail: bool) {
        self.state().fail_appends = fail;
    }
}

#[rocket::async_trait]
impl ElectionRegistry for MemoryPlatform {
    async fn read_all(&self) -> Result<Vec<Election>> {
        Ok(self.state().elections.clone())
    }

    async fn write_all(&self, elections: &[Election]) -> Result<()> {
        let mut state = self.state();
        if state.fail_registry_writes {
            return Err(injected("registry"));
        }
        for election in elections {
            match state.elections.iter_mut().find(|e| e.id == election.id) {
                Some(stored) => *stored = election.clone(),
                None => state.elections.push(election.clone()),
            }
        }
        state.registry_writes += 1;
        Ok(())
    }
}

#[rocket::async_trait]
impl BallotAccessor for MemoryPlatform {
    async fn resolve(&self, reference: &str) -> std::result::Result<Ballot, ResolutionError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ResolutionError::Malformed(reference.to_string()));
        }
        self.state()
            .ballots
            .iter()
            .find(|ballot| ballot.edit_url == reference)
            .cloned()
            .ok_or_else(|| ResolutionError::NotFound(reference.to_string()))
    }

    async fn set_published(&self, ballot: &mut Ballot, published: bool) -> Result<()> {
        let mut state = self.state();
        let stored = state
            .ballots
            .iter_mut()
            .find(|stored| stored.id == ballot.id)
            .ok_or_else(|| ResolutionError::NotFound(ballot.edit_url.clone()))?;
        stored.published = published;
        stored.accepting_responses = published;
        ballot.published = published;
        ballot.accepting_responses = published;
        Ok(())
    }
}

#[rocket::async_trait]
impl TriggerRegistry for MemoryPlatform {
    async fn list_triggers(&self) -> Result<Vec<Trigger>> {
        Ok(self
            .state()
            .triggers
            .iter()
            .filter(|trigger| trigger.handler == HANDLER)
            .cloned()
            .collect())
    }

    async fn create_submission_trigger(&self, destination_id: &str) -> Result<String> {
        let mut state = self.state();
        if state.fail_trigger_creation.contains(destination_id) {
            return Err(injected("trigger service"));
        }
        if destination_id.trim().is_empty() {
            return Err(TriggerError::MissingDestination(destination_id.to_string()).into());
        }
        state.triggers_created += 1;
        let id = format!("trigger-{}", state.triggers_created);
        state.triggers.push(Trigger {
            id: id.clone(),
            handler: HANDLER.to_string(),
            source_id: destination_id.to_string(),
        });
        Ok(id)
    }

    async fn delete_trigger(&self, trigger_id: &str) -> Result<bool> {
        let mut state = self.state();
        let before = state.triggers.len();
        state.triggers.retain(|trigger| trigger.id != trigger_id);
        Ok(state.triggers.len() < before)
    }
}

#[rocket::async_trait]
impl TokenStore for MemoryPlatform {
    async fn consume_one_time_token(
        &self,
        token: &str,
        destination_id: &str,
    ) -> Result<Option<String>> {
        let mut state = self.state();
        let token = token.trim();
        match state.tokens.get(token) {
            Some(record)
                if record.kind == TokenKind::OneTime
                    && record.destination_id == destination_id => {}
            _ => return Ok(None),
        }
        Ok(state.tokens.remove(token).map(|record| record.email))
    }

    async fn delete_all_tokens_for_destination(&self, destination_id: &str) -> Result<u64> {
        let mut state = self.state();
        let before = state.tokens.len();
        state
            .tokens
            .retain(|_, record| record.destination_id != destination_id);
        Ok((before - state.tokens.len()) as u64)
    }

    async fn issue_one_time_token(&self, email: &str, destination_id: &str) -> Result<String> {
        let token = {
            let mut state = self.state();
            state.issued += 1;
            format!("issued-{}", state.issued)
        };
        self.add_token(&token, &email.trim().to_lowercase(), destination_id);
        Ok(token)
    }
}

#[rocket::async_trait]
impl ResultsStore for MemoryPlatform {
    async fn open(
        &self,
        destination_id: &str,
        name: &str,
        create_if_missing: bool,
    ) -> Result<Option<StoreHandle>> {
        let mut state = self.state();
        let exists = state
            .destinations
            .get(destination_id)
            .map_or(false, |destination| destination.stores.contains_key(name));
        if !exists && !create_if_missing {
            return Ok(None);
        }
        let destination = state
            .destinations
            .entry(destination_id.to_string())
            .or_default();
        destination.stores.entry(name.to_string()).or_default();
        let title = if destination.title.is_empty() {
            destination_id.to_string()
        } else {
            destination.title.clone()
        };
        Ok(Some(StoreHandle {
            destination_id: destination_id.to_string(),
            name: name.to_string(),
            title,
        }))
    }

    async fn read(&self, store: &StoreHandle) -> Result<Vec<Submission>> {
        Ok(self
            .rows(&store.destination_id, &store.name)
            .unwrap_or_default())
    }

    async fn append(&self, store: &StoreHandle, row: &Submission) -> Result<()> {
        let mut state = self.state();
        if state.fail_appends {
            return Err(injected("results store"));
        }
        state
            .destinations
            .entry(store.destination_id.clone())
            .or_default()
            .stores
            .entry(store.name.clone())
            .or_default()
            .push(row.clone());
        Ok(())
    }

    async fn flag_needs_attention(&self, destination_id: &str) -> Result<()> {
        self.state()
            .destinations
            .entry(destination_id.to_string())
            .or_default()
            .needs_attention = true;
        Ok(())
    }

    async fn collaborators(&self, destination_id: &str) -> Result<Vec<String>> {
        Ok(self
            .state()
            .destinations
            .get(destination_id)
            .map(|destination| destination.collaborators.clone())
            .unwrap_or_default())
    }
}

#[rocket::async_trait]
impl Notifier for MemoryPlatform {
    async fn send(&self, notification: &Notification) -> std::result::Result<(), NotifyError> {
        let mut state = self.state();
        if state.fail_notifications {
            return Err(NotifyError::Send("mail relay unavailable".to_string()));
        }
        if notification.to.is_empty() {
            return Err(NotifyError::NoRecipients(notification.subject.clone()));
        }
        state.sent.push(notification.clone());
        Ok(())
    }
}
