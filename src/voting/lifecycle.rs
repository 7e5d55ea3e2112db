use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::VotingConfig,
    error::{Error, Result, TriggerError},
    logging::ScanId,
    model::{
        ballot::Ballot,
        election::Election,
        notify::{send_logged, Notification},
        platform::Platform,
        trigger::Trigger,
    },
};

use super::state::ElectionState;

/// Something that happened to one election during a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanIssue {
    pub election: String,
    pub reason: String,
}

impl ScanIssue {
    fn new(election: &Election, reason: impl ToString) -> Self {
        Self {
            election: election.title.clone(),
            reason: reason.to_string(),
        }
    }
}

/// What a lifecycle scan did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub scan: ScanId,
    /// Elections whose ballots were published.
    pub opened: Vec<String>,
    /// Elections whose ballots were closed and tokens revoked.
    pub closed: Vec<String>,
    /// Published elections whose missing trigger was restored or whose
    /// paused ballot was set accepting again.
    pub healed: Vec<String>,
    /// Elections that could not be evaluated.
    pub skipped: Vec<ScanIssue>,
    /// Elections whose transition failed part way.
    pub failures: Vec<ScanIssue>,
    /// Ids of triggers removed by reconciliation.
    pub removed_triggers: Vec<String>,
    /// Whether the registry was written back.
    pub persisted: bool,
}

impl ScanReport {
    fn new(scan: ScanId) -> Self {
        Self {
            scan,
            opened: Vec::new(),
            closed: Vec::new(),
            healed: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
            removed_triggers: Vec::new(),
            persisted: false,
        }
    }
}

/// The outcome of processing one election.
enum Step {
    Unchanged,
    Skipped(String),
    Opened,
    Healed,
    Closed,
}

/// Bookkeeping shared across one scan.
#[derive(Default)]
struct ScanState {
    /// Destinations of active elections, with the trigger each should keep.
    active: HashMap<String, Option<String>>,
    /// Triggers reconciliation must leave alone because their election could
    /// not be fully evaluated this time round.
    protected: HashSet<String>,
}

impl ScanState {
    /// Keep the recorded trigger of an election that could not be evaluated,
    /// as long as it should be accepting votes. Triggers of unopened or closed
    /// elections get no protection and are reconciled away.
    fn protect(&mut self, election: &Election, now: DateTime<Utc>) {
        if election.state_at(now) != ElectionState::Active {
            return;
        }
        if let Some(trigger_id) = &election.trigger_id {
            self.protected.insert(trigger_id.clone());
        }
    }
}

/// Drives elections through their lifecycle: publishes ballots when voting
/// opens, closes them when it ends, and keeps submission triggers in step.
///
/// Every scan recomputes the target state from the registry and the clock,
/// so a scan that fails part way is completed by the next one.
pub struct LifecycleManager {
    platform: Platform,
    config: VotingConfig,
}

impl LifecycleManager {
    pub fn new(platform: Platform, config: VotingConfig) -> Self {
        Self { platform, config }
    }

    /// Scan every election against the current time.
    pub async fn manage_election_lifecycles(&self) -> Result<ScanReport> {
        self.scan_at(Utc::now()).await
    }

    /// Scan every election as of `now`.
    ///
    /// Failures are contained per election and reported. Only failing to read
    /// or write the registry aborts the scan.
    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<ScanReport> {
        let scan = ScanId::next();
        let mut report = ScanReport::new(scan);
        let mut elections = self.platform.registry.read_all().await?;
        debug!("scan{scan}: evaluating {} elections at {now}", elections.len());

        let live = match self.platform.triggers.list_triggers().await {
            Ok(triggers) => Some(triggers),
            Err(e) => {
                warn!("scan{scan}: could not list triggers, skipping trigger repair: {e}");
                None
            }
        };

        let mut state = ScanState::default();
        let mut dirty = false;
        for election in elections.iter_mut() {
            let result = self
                .process_election(election, now, live.as_deref(), &mut state)
                .await;
            match result {
                Ok(Step::Unchanged) => {}
                Ok(Step::Skipped(reason)) => {
                    warn!("scan{scan}: skipping '{}': {reason}", election.title);
                    report.skipped.push(ScanIssue::new(election, reason));
                }
                Ok(Step::Opened) => {
                    info!("scan{scan}: opened '{}'", election.title);
                    report.opened.push(election.title.clone());
                    dirty = true;
                }
                Ok(Step::Healed) => {
                    info!("scan{scan}: healed '{}'", election.title);
                    report.healed.push(election.title.clone());
                    dirty = true;
                }
                Ok(Step::Closed) => {
                    info!("scan{scan}: closed '{}'", election.title);
                    report.closed.push(election.title.clone());
                    dirty = true;
                }
                Err(e) => {
                    error!("scan{scan}: failed to process '{}': {e}", election.title);
                    state.protect(election, now);
                    report.failures.push(ScanIssue::new(election, e));
                }
            }
        }

        self.reconcile_triggers(&state, &mut report).await;

        if dirty {
            self.platform.registry.write_all(&elections).await?;
            report.persisted = true;
            debug!("scan{scan}: registry persisted");
        }
        Ok(report)
    }

    /// Bring one election's ballot and trigger in line with its state.
    /// The record is only modified once the step it records has succeeded.
    async fn process_election(
        &self,
        election: &mut Election,
        now: DateTime<Utc>,
        live: Option<&[Trigger]>,
        state: &mut ScanState,
    ) -> Result<Step> {
        let reference = match election.ballot_ref() {
            Some(reference) => reference.to_string(),
            None => return Ok(Step::Skipped("no ballot reference".to_string())),
        };
        let (start, end) = match election.window() {
            Some(window) => window,
            None => return Ok(Step::Skipped("no start/end window".to_string())),
        };
        if start > end {
            return Ok(Step::Skipped("window ends before it starts".to_string()));
        }

        let mut ballot = match self.platform.ballots.resolve(&reference).await {
            Ok(ballot) => ballot,
            Err(e) => {
                state.protect(election, now);
                return Ok(Step::Skipped(e.to_string()));
            }
        };

        match election.state_at(now) {
            ElectionState::Unopened => Ok(Step::Unchanged),
            ElectionState::Active => self.open(election, &mut ballot, live, state).await,
            ElectionState::Closed => self.close(election, &mut ballot).await,
        }
    }

    async fn open(
        &self,
        election: &mut Election,
        ballot: &mut Ballot,
        live: Option<&[Trigger]>,
        state: &mut ScanState,
    ) -> Result<Step> {
        if let Some(destination) = &ballot.destination_id {
            state
                .active
                .insert(destination.clone(), election.trigger_id.clone());
        }

        if !ballot.published {
            let destination = self.destination_of(ballot)?;
            self.notify_officers(election, opened_notice(election, ballot))
                .await;
            self.platform.ballots.set_published(ballot, true).await?;
            let trigger_id = self
                .platform
                .triggers
                .create_submission_trigger(&destination)
                .await?;
            state
                .active
                .insert(destination, Some(trigger_id.clone()));
            election.trigger_id = Some(trigger_id);
            return Ok(Step::Opened);
        }

        // Published but paused: resume taking responses. The officers were told
        // when it first opened, so nobody is notified again.
        let mut resumed = false;
        if !ballot.accepting_responses {
            self.platform.ballots.set_published(ballot, true).await?;
            resumed = true;
        }

        // Already published: make sure the recorded trigger still exists.
        let recorded_is_live = match (&election.trigger_id, live) {
            (Some(id), Some(live)) => live.iter().any(|trigger| &trigger.id == id),
            (Some(_), None) => true,
            (None, _) => false,
        };
        if recorded_is_live {
            return Ok(if resumed { Step::Healed } else { Step::Unchanged });
        }

        let destination = self.destination_of(ballot)?;
        let adopted = live
            .unwrap_or_default()
            .iter()
            .find(|trigger| trigger.source_id == destination)
            .map(|trigger| trigger.id.clone());
        let trigger_id = match adopted {
            Some(trigger_id) => trigger_id,
            None => {
                self.platform
                    .triggers
                    .create_submission_trigger(&destination)
                    .await?
            }
        };
        state
            .active
            .insert(destination, Some(trigger_id.clone()));
        election.trigger_id = Some(trigger_id);
        Ok(Step::Healed)
    }

    async fn close(&self, election: &mut Election, ballot: &mut Ballot) -> Result<Step> {
        let ballot_open = ballot.published || ballot.accepting_responses;
        if !ballot_open && election.trigger_id.is_none() {
            return Ok(Step::Unchanged);
        }

        if ballot_open {
            self.platform.ballots.set_published(ballot, false).await?;
        }
        if let Some(trigger_id) = &election.trigger_id {
            if !self.platform.triggers.delete_trigger(trigger_id).await? {
                warn!(
                    "Trigger {trigger_id} for '{}' was already gone",
                    election.title
                );
            }
        }

        let manual_count = match &ballot.destination_id {
            Some(destination) => {
                let revoked = self
                    .platform
                    .tokens
                    .delete_all_tokens_for_destination(destination)
                    .await?;
                debug!("Revoked {revoked} unused tokens for '{}'", election.title);
                self.platform
                    .results
                    .open(destination, &self.config.quarantine_store, false)
                    .await?
                    .is_some()
            }
            None => {
                warn!(
                    "'{}' has no results destination; no tokens to revoke",
                    election.title
                );
                false
            }
        };
        if manual_count {
            warn!("'{}' needs a manual count", election.title);
        }

        self.notify_officers(election, closed_notice(election, manual_count, &self.config))
            .await;
        election.trigger_id = None;
        Ok(Step::Closed)
    }

    /// Remove triggers that no active election should have: those bound to a
    /// destination with no active election (orphans), and extra triggers on
    /// an active destination beside the one its election records.
    async fn reconcile_triggers(&self, state: &ScanState, report: &mut ScanReport) {
        let triggers = match self.platform.triggers.list_triggers().await {
            Ok(triggers) => triggers,
            Err(e) => {
                error!("scan{}: trigger reconciliation failed: {e}", report.scan);
                report.failures.push(ScanIssue {
                    election: "(trigger reconciliation)".to_string(),
                    reason: e.to_string(),
                });
                return;
            }
        };

        for trigger in triggers {
            if trigger.handler != self.config.submission_handler
                || state.protected.contains(&trigger.id)
            {
                continue;
            }
            let keep = match state.active.get(&trigger.source_id) {
                None => false,
                Some(Some(recorded)) => recorded == &trigger.id,
                Some(None) => true,
            };
            if keep {
                continue;
            }
            match self.platform.triggers.delete_trigger(&trigger.id).await {
                Ok(true) => {
                    info!(
                        "scan{}: removed stray trigger {} on {}",
                        report.scan, trigger.id, trigger.source_id
                    );
                    report.removed_triggers.push(trigger.id);
                }
                Ok(false) => debug!("Stray trigger {} vanished before removal", trigger.id),
                Err(e) => {
                    error!("scan{}: could not remove trigger {}: {e}", report.scan, trigger.id);
                    report.failures.push(ScanIssue {
                        election: format!("(trigger {})", trigger.id),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn destination_of(&self, ballot: &Ballot) -> Result<String> {
        ballot
            .destination_id
            .clone()
            .filter(|destination| !destination.trim().is_empty())
            .ok_or_else(|| Error::from(TriggerError::MissingDestination(ballot.title.clone())))
    }

    async fn notify_officers(&self, election: &Election, notification: Notification) {
        if election.election_officers.is_empty() {
            warn!(
                "'{}' has no election officers to notify of '{}'",
                election.title, notification.subject
            );
            return;
        }
        send_logged(self.platform.notifier.as_ref(), &notification).await;
    }
}

fn opened_notice(election: &Election, ballot: &Ballot) -> Notification {
    Notification::new(
        election.election_officers.clone(),
        format!("Election '{}' is now open", election.title),
        format!(
            "The ballot for '{}' has been published and is accepting votes.\n\nBallot: {}\n",
            election.title, ballot.edit_url
        ),
    )
}

fn closed_notice(election: &Election, manual_count: bool, config: &VotingConfig) -> Notification {
    let body = if manual_count {
        format!(
            "Voting in '{}' has closed.\n\nSome submissions were rejected and held in \
             '{}'. A manual count is required before results are announced.\n",
            election.title, config.quarantine_store
        )
    } else {
        format!(
            "Voting in '{}' has closed.\n\nEvery submission was validated; results can be \
             counted from '{}'.\n",
            election.title, config.results_store
        )
    };
    let subject = if manual_count {
        format!("Election '{}' has closed: manual count required", election.title)
    } else {
        format!("Election '{}' has closed", election.title)
    };
    Notification::new(election.election_officers.clone(), subject, body)
}
