//! Flow controller: owns the wizard state and sequences step transitions.
//!
//! A transition merges the step's answers, plays the exit animation, and only
//! then swaps the current step. The animation ends when the presentation layer
//! calls [`FlowController::finish_exit`] or when the step's configured delay
//! runs out, whichever comes first. Calls to the user service are either
//! gating (`createUser`) or best-effort (everything else).
//!
//! Nothing mutates state after [`FlowController::shutdown`]: every wait
//! races the liveness signal and every resumed task re-checks it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::answers::{AnswerPatch, AnswerRecord, PhotoRef, merge};
use super::archetype::share_link;
use super::session::SessionId;
use super::step::{FlowDefinition, StepEffect, StepId};
use super::validate::{FieldErrors, PhotoUpload, validate_patch, validate_step};
use crate::error::MediaError;
use crate::service::{EnrichmentOptions, UserService};

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;

/// Default broadcast channel capacity.
const EVENT_CAPACITY: usize = 64;

/// Where the wizard is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub current_step: StepId,
    /// Step we came from; back-navigation resets it to the first step.
    pub previous_step: Option<StepId>,
    /// Exit animation in progress; forward and back are both ignored.
    pub is_transitioning: bool,
    /// A step's service call is in flight; forward controls are disabled.
    pub is_loading: bool,
}

/// Why a request did not change anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    ShutDown,
    Transitioning,
    Loading,
    NoNextStep,
    FirstStep,
    NotCurrentStep,
    NotOnFirstStep,
    NoInfoBranch,
    Superseded,
}

/// Result of a navigation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Transition {
    /// Forward move after the exit animation.
    Advanced { from: StepId, to: StepId },
    /// Immediate move from `back()` or `branch_to_info()`.
    Moved { from: StepId, to: StepId },
    Ignored { reason: IgnoreReason },
    /// A gating call failed; the user stays on the step.
    Blocked { message: String },
    /// The answers failed local validation; nothing was merged.
    Invalid { errors: FieldErrors },
    /// The session shut down while the transition was pending.
    Abandoned,
}

impl Transition {
    fn ignored(reason: IgnoreReason) -> Self {
        Self::Ignored { reason }
    }
}

/// User-visible alert raised by a failed gating call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub message: String,
    /// Field the alert belongs to when it should render inline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Outcome of a photo upload that passed local checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoOutcome {
    Stored { image_id: String },
    /// A newer upload started before this one finished.
    Superseded,
}

/// Events for whoever renders the wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowEvent {
    ExitStarted { step: StepId, delay_ms: u64 },
    StepChanged { from: StepId, to: StepId },
    LoadingChanged { loading: bool },
    Alert { alert: Alert },
    PhotoChanged { photo: Option<PhotoRef> },
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub session_id: SessionId,
    pub flow: String,
    pub started_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: WizardState,
    pub answers: AnswerRecord,
    pub user_id: Option<String>,
    pub alert: Option<Alert>,
    pub photo_error: Option<String>,
    pub share_link: Option<String>,
}

/// Which in-flight request a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestSlot {
    Step(StepId),
    Photo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestTicket {
    slot: RequestSlot,
    seq: u64,
}

/// Monotonic counter per slot; only the newest ticket's response applies.
#[derive(Debug, Default)]
struct RequestTracker {
    counters: HashMap<RequestSlot, u64>,
}

impl RequestTracker {
    fn issue(&mut self, slot: RequestSlot) -> RequestTicket {
        let seq = self.counters.entry(slot).or_insert(0);
        *seq += 1;
        RequestTicket { slot, seq: *seq }
    }

    fn invalidate(&mut self, slot: RequestSlot) {
        *self.counters.entry(slot).or_insert(0) += 1;
    }

    fn is_current(&self, ticket: RequestTicket) -> bool {
        self.counters.get(&ticket.slot) == Some(&ticket.seq)
    }
}

/// Who asked for a forward move.
#[derive(Debug, Clone, Copy)]
enum Source {
    User,
    /// A step's service call finished.
    Effect { step: StepId, ticket: RequestTicket },
    /// An interstitial's hold ran out.
    Auto { visit: u64 },
}

struct Inner {
    state: WizardState,
    answers: AnswerRecord,
    user_id: Option<String>,
    alert: Option<Alert>,
    photo_error: Option<String>,
    /// Bumped on every exit animation.
    exit_epoch: u64,
    /// Bumped on every step change.
    visit: u64,
    requests: RequestTracker,
}

/// One wizard session: state, answers, and the service calls made on its behalf.
pub struct FlowController {
    definition: Arc<FlowDefinition>,
    session: SessionId,
    service: Arc<dyn UserService>,
    share_base: Option<String>,
    started_at: DateTime<Utc>,
    inner: Mutex<Inner>,
    alive: watch::Sender<bool>,
    exit_done: watch::Sender<u64>,
    events: broadcast::Sender<FlowEvent>,
    tasks: std::sync::Mutex<Vec<JoinHandle<()>>>,
    /// A `createUser` call is in flight, possibly for a step the user left.
    creating: AtomicBool,
}

/// Clears the in-flight `createUser` marker however the call ends.
struct CreateGuard<'a>(&'a AtomicBool);

impl Drop for CreateGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl FlowController {
    /// Mount a new session at the flow's first step.
    pub fn new(definition: Arc<FlowDefinition>, service: Arc<dyn UserService>) -> Arc<Self> {
        Self::with_share_base(definition, service, None)
    }

    pub fn with_share_base(
        definition: Arc<FlowDefinition>,
        service: Arc<dyn UserService>,
        share_base: Option<String>,
    ) -> Arc<Self> {
        let session = SessionId::new();
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        let state = WizardState {
            current_step: definition.first(),
            previous_step: None,
            is_transitioning: false,
            is_loading: false,
        };
        info!(session = %session, flow = definition.name(), "Onboarding session started");
        Arc::new(Self {
            definition,
            session,
            service,
            share_base,
            started_at: Utc::now(),
            inner: Mutex::new(Inner {
                state,
                answers: AnswerRecord::default(),
                user_id: None,
                alert: None,
                photo_error: None,
                exit_epoch: 0,
                visit: 0,
                requests: RequestTracker::default(),
            }),
            alive: watch::Sender::new(true),
            exit_done: watch::Sender::new(0),
            events,
            tasks: std::sync::Mutex::new(Vec::new()),
            creating: AtomicBool::new(false),
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.session
    }

    pub fn definition(&self) -> &FlowDefinition {
        &self.definition
    }

    pub fn is_alive(&self) -> bool {
        *self.alive.borrow()
    }

    /// Subscribe to flow events.
    pub fn subscribe(&self) -> broadcast::Receiver<FlowEvent> {
        self.events.subscribe()
    }

    pub async fn state(&self) -> WizardState {
        self.inner.lock().await.state
    }

    pub async fn answers(&self) -> AnswerRecord {
        self.inner.lock().await.answers.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        let inner = self.inner.lock().await;
        let share_link = match (&self.share_base, &inner.user_id) {
            (Some(base), Some(user_id)) if inner.state.current_step == self.definition.terminal() => {
                match share_link(base, user_id, inner.answers.personality) {
                    Ok(url) => Some(url.to_string()),
                    Err(e) => {
                        warn!(session = %self.session, error = %e, "Could not build share link");
                        None
                    }
                }
            }
            _ => None,
        };
        Snapshot {
            session_id: self.session,
            flow: self.definition.name().to_string(),
            started_at: self.started_at,
            state: inner.state,
            answers: inner.answers.clone(),
            user_id: inner.user_id.clone(),
            alert: inner.alert.clone(),
            photo_error: inner.photo_error.clone(),
            share_link,
        }
    }

    fn emit(&self, event: FlowEvent) {
        // ok if nobody is listening
        let _ = self.events.send(event);
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    // ── Forward ─────────────────────────────────────────────────────────

    /// Merge `patch`, play the exit animation, then move to the next step.
    ///
    /// Ignored while another transition is running or a service call is in
    /// flight, and rejected when a key fails validation; the patch is not
    /// merged in either case.
    pub async fn advance(self: &Arc<Self>, patch: AnswerPatch) -> Transition {
        match validate_patch(&patch) {
            Ok(patch) => self.advance_from(patch, Source::User).await,
            Err(errors) => self.reject(errors),
        }
    }

    fn reject(&self, errors: FieldErrors) -> Transition {
        debug!(session = %self.session, fields = ?errors.fields(), "Answers failed validation");
        Transition::Invalid { errors }
    }

    /// Fire-and-forget [`advance`](Self::advance). The task is aborted on shutdown.
    pub fn spawn_advance(self: &Arc<Self>, patch: AnswerPatch) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = this.advance(patch).await;
            debug!(session = %this.session, ?outcome, "Spawned advance finished");
        });
        self.track(handle);
    }

    /// Signal from the presentation layer that the exit animation finished.
    /// Returns false when no transition is pending.
    pub async fn finish_exit(&self) -> bool {
        let inner = self.inner.lock().await;
        if !inner.state.is_transitioning {
            return false;
        }
        self.exit_done.send_replace(inner.exit_epoch);
        true
    }

    async fn advance_from(self: &Arc<Self>, patch: AnswerPatch, source: Source) -> Transition {
        let (from, to, epoch, delay) = {
            let mut inner = self.inner.lock().await;
            if !self.is_alive() {
                return Transition::ignored(IgnoreReason::ShutDown);
            }
            match source {
                Source::User if inner.state.is_loading => {
                    return Transition::ignored(IgnoreReason::Loading);
                }
                Source::Effect { step, ticket } => {
                    if !inner.requests.is_current(ticket) || inner.state.current_step != step {
                        return Transition::ignored(IgnoreReason::Superseded);
                    }
                    inner.state.is_loading = false;
                    self.emit(FlowEvent::LoadingChanged { loading: false });
                }
                Source::Auto { visit } => {
                    if inner.visit != visit {
                        return Transition::ignored(IgnoreReason::Superseded);
                    }
                    if inner.state.is_loading {
                        return Transition::ignored(IgnoreReason::Loading);
                    }
                }
                Source::User => {}
            }
            if inner.state.is_transitioning {
                return Transition::ignored(IgnoreReason::Transitioning);
            }
            let from = inner.state.current_step;
            let Some(to) = self.definition.next_after(from) else {
                return Transition::ignored(IgnoreReason::NoNextStep);
            };

            let answers = std::mem::take(&mut inner.answers);
            inner.answers = merge(answers, patch);
            inner.state.is_transitioning = true;
            inner.exit_epoch += 1;
            (from, to, inner.exit_epoch, self.definition.exit_delay(from))
        };

        debug!(session = %self.session, step = %from, delay_ms = delay.as_millis(), "Exit animation started");
        self.emit(FlowEvent::ExitStarted {
            step: from,
            delay_ms: delay.as_millis() as u64,
        });
        self.wait_for_exit(epoch, delay).await;

        let visit = {
            let mut inner = self.inner.lock().await;
            if !self.is_alive() {
                debug!(session = %self.session, step = %from, "Transition abandoned after shutdown");
                return Transition::Abandoned;
            }
            inner.state.previous_step = Some(from);
            inner.state.current_step = to;
            inner.state.is_transitioning = false;
            inner.visit += 1;
            inner.visit
        };

        info!(session = %self.session, from = %from, to = %to, "Step advanced");
        self.emit(FlowEvent::StepChanged { from, to });
        self.schedule_auto_advance(to, visit);
        Transition::Advanced { from, to }
    }

    /// Wait for the exit signal, the fallback delay, or shutdown.
    async fn wait_for_exit(&self, epoch: u64, delay: Duration) {
        let mut exit_rx = self.exit_done.subscribe();
        let mut alive_rx = self.alive.subscribe();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = exit_rx.wait_for(|done| *done >= epoch) => {}
            _ = alive_rx.wait_for(|alive| !*alive) => {}
        }
    }

    /// Interstitials move on by themselves after their hold time, unless the
    /// user has already left.
    fn schedule_auto_advance(self: &Arc<Self>, step: StepId, visit: u64) {
        let Some(hold) = self.definition.auto_advance(step) else {
            return;
        };
        let weak: Weak<Self> = Arc::downgrade(self);
        let mut alive_rx = self.alive.subscribe();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(hold) => {}
                _ = alive_rx.wait_for(|alive| !*alive) => return,
            }
            let Some(this) = weak.upgrade() else {
                return;
            };
            let outcome = this
                .advance_from(AnswerPatch::default(), Source::Auto { visit })
                .await;
            debug!(session = %this.session, step = %step, ?outcome, "Auto-advance fired");
        });
        self.track(handle);
    }

    // ── Back / info ─────────────────────────────────────────────────────

    /// Go back. Available while loading (the in-flight call is then ignored),
    /// but not mid-animation.
    pub async fn back(&self) -> Transition {
        let (from, to) = {
            let mut inner = self.inner.lock().await;
            if !self.is_alive() {
                return Transition::ignored(IgnoreReason::ShutDown);
            }
            if inner.state.is_transitioning {
                return Transition::ignored(IgnoreReason::Transitioning);
            }
            let from = inner.state.current_step;
            let Some(to) = self
                .definition
                .back_target(from, inner.state.previous_step)
            else {
                return Transition::ignored(IgnoreReason::FirstStep);
            };

            inner.requests.invalidate(RequestSlot::Step(from));
            let was_loading = inner.state.is_loading;
            inner.state.is_loading = false;
            inner.state.current_step = to;
            inner.state.previous_step = Some(self.definition.first());
            inner.alert = None;
            inner.visit += 1;
            if was_loading {
                self.emit(FlowEvent::LoadingChanged { loading: false });
            }
            (from, to)
        };

        info!(session = %self.session, from = %from, to = %to, "Stepped back");
        self.emit(FlowEvent::StepChanged { from, to });
        Transition::Moved { from, to }
    }

    /// Jump from the first step to the info branch.
    pub async fn branch_to_info(&self) -> Transition {
        let (from, to) = {
            let mut inner = self.inner.lock().await;
            if !self.is_alive() {
                return Transition::ignored(IgnoreReason::ShutDown);
            }
            if inner.state.is_transitioning {
                return Transition::ignored(IgnoreReason::Transitioning);
            }
            let Some(info) = self.definition.info_branch() else {
                return Transition::ignored(IgnoreReason::NoInfoBranch);
            };
            let from = inner.state.current_step;
            if from != self.definition.first() {
                return Transition::ignored(IgnoreReason::NotOnFirstStep);
            }
            inner.state.previous_step = Some(from);
            inner.state.current_step = info;
            inner.visit += 1;
            (from, info)
        };

        info!(session = %self.session, to = %to, "Branched to info");
        self.emit(FlowEvent::StepChanged { from, to });
        Transition::Moved { from, to }
    }

    // ── Step completion ─────────────────────────────────────────────────

    /// Complete `step` with the answers its form produced.
    ///
    /// The patch is validated for `step` first. Steps without a side effect
    /// then advance directly. Otherwise the patch is merged, the step's
    /// service call runs, and the flow advances when it returns. Only a
    /// failed `createUser` (or a taken bio) keeps the user on the step, and
    /// only one `createUser` is ever in flight.
    pub async fn complete_step(self: &Arc<Self>, step: StepId, patch: AnswerPatch) -> Transition {
        let effect = self.definition.effect(step);
        let (ticket, user_id, create_guard) = {
            let mut inner = self.inner.lock().await;
            if !self.is_alive() {
                return Transition::ignored(IgnoreReason::ShutDown);
            }
            if inner.state.current_step != step {
                return Transition::ignored(IgnoreReason::NotCurrentStep);
            }
            if inner.state.is_transitioning {
                return Transition::ignored(IgnoreReason::Transitioning);
            }
            if inner.state.is_loading {
                return Transition::ignored(IgnoreReason::Loading);
            }
            let patch = match validate_step(step, &patch) {
                Ok(patch) => patch,
                Err(errors) => return self.reject(errors),
            };
            if effect == StepEffect::None {
                drop(inner);
                return self.advance_from(patch, Source::User).await;
            }

            // A create abandoned by `back()` may still land; wait for it
            // rather than creating a second user.
            let create_guard = if effect == StepEffect::CreateUser && inner.user_id.is_none() {
                if self.creating.swap(true, Ordering::SeqCst) {
                    debug!(session = %self.session, "createUser already in flight");
                    return Transition::ignored(IgnoreReason::Loading);
                }
                Some(CreateGuard(&self.creating))
            } else {
                None
            };

            let answers = std::mem::take(&mut inner.answers);
            inner.answers = merge(answers, patch.clone());
            inner.state.is_loading = true;
            inner.alert = None;
            let ticket = inner.requests.issue(RequestSlot::Step(step));
            (ticket, inner.user_id.clone(), create_guard)
        };
        self.emit(FlowEvent::LoadingChanged { loading: true });

        match (effect, user_id) {
            // Profile edits after the user already exists are plain updates.
            (StepEffect::UpdateUser, user_id) | (StepEffect::CreateUser, user_id @ Some(_)) => {
                self.update_best_effort(step, user_id.as_deref(), &patch).await;
            }
            (StepEffect::CreateUser, None) => {
                if let Err(alert) = self.create_user(ticket).await {
                    return self.block(ticket, alert).await;
                }
            }
            (StepEffect::None, _) => {}
        }
        drop(create_guard);

        if !self.is_alive() {
            return Transition::Abandoned;
        }
        self.advance_from(AnswerPatch::default(), Source::Effect { step, ticket })
            .await
    }

    async fn update_best_effort(&self, step: StepId, user_id: Option<&str>, patch: &AnswerPatch) {
        let fields = AnswerRecord::slice_for(patch);
        if let Err(e) = self
            .service
            .update_user(self.session, user_id, &fields)
            .await
        {
            warn!(session = %self.session, step = %step, error = %e, "Best-effort user update failed");
        }
    }

    /// Bio check (advisory) then `createUser` (gating). Success stores the
    /// user id and fires enrichment without waiting for it.
    async fn create_user(&self, ticket: RequestTicket) -> Result<(), Alert> {
        let fields = self.inner.lock().await.answers.profile_fields();
        let Some(fields) = fields else {
            return Err(Alert {
                message: "Please complete your profile before continuing.".to_string(),
                field: None,
            });
        };

        match self
            .service
            .check_bio_uniqueness(self.session, &fields.bio)
            .await
        {
            Ok(true) => {
                return Err(Alert {
                    message: "That bio is already taken. Please write something unique.".to_string(),
                    field: Some("bio".to_string()),
                });
            }
            Ok(false) => {}
            Err(e) => {
                warn!(session = %self.session, error = %e, "Bio check failed; assuming unique");
            }
        }

        let created = match self.service.create_user(self.session, &fields).await {
            Ok(created) => created,
            Err(e) => {
                warn!(session = %self.session, error = %e, "User creation failed");
                let field = e.is_bio_conflict().then(|| "bio".to_string());
                return Err(Alert {
                    message: e.user_message(),
                    field,
                });
            }
        };

        {
            let mut inner = self.inner.lock().await;
            if !self.is_alive() {
                return Ok(());
            }
            // The user exists remotely even if this response is stale.
            if inner.user_id.is_none() {
                inner.user_id = Some(created.user_id.clone());
            }
            if !inner.requests.is_current(ticket) {
                debug!(session = %self.session, "createUser response arrived after the step was left");
            }
        }
        info!(session = %self.session, user_id = %created.user_id, "User created");

        let service = Arc::clone(&self.service);
        let session = self.session;
        let user_id = created.user_id;
        tokio::spawn(async move {
            if let Err(e) = service
                .trigger_enrichment(session, &user_id, &EnrichmentOptions::default())
                .await
            {
                warn!(session = %session, error = %e, "Enrichment trigger failed");
            }
        });
        Ok(())
    }

    async fn block(&self, ticket: RequestTicket, alert: Alert) -> Transition {
        let mut inner = self.inner.lock().await;
        if !self.is_alive() {
            return Transition::Abandoned;
        }
        if !inner.requests.is_current(ticket) {
            return Transition::ignored(IgnoreReason::Superseded);
        }
        inner.state.is_loading = false;
        inner.alert = Some(alert.clone());
        drop(inner);

        self.emit(FlowEvent::LoadingChanged { loading: false });
        self.emit(FlowEvent::Alert {
            alert: alert.clone(),
        });
        Transition::Blocked {
            message: alert.message,
        }
    }

    pub async fn dismiss_alert(&self) {
        self.inner.lock().await.alert = None;
    }

    // ── Photo ───────────────────────────────────────────────────────────

    /// Show the photo locally right away, then upload it. A failed upload
    /// reverts to the placeholder with an inline error; the rest of the form
    /// is unaffected.
    pub async fn upload_photo(&self, upload: PhotoUpload) -> Result<PhotoOutcome, MediaError> {
        if let Err(e) = upload.check() {
            self.inner.lock().await.photo_error = Some(e.to_string());
            return Err(e);
        }

        let (ticket, local) = {
            let mut inner = self.inner.lock().await;
            if !self.is_alive() {
                return Ok(PhotoOutcome::Superseded);
            }
            let local = PhotoRef::Local {
                object_url: format!("blob:{}/{}", self.session, upload.file_name),
            };
            inner.answers.photo = Some(local.clone());
            inner.photo_error = None;
            (inner.requests.issue(RequestSlot::Photo), local)
        };
        self.emit(FlowEvent::PhotoChanged { photo: Some(local) });

        let result = self.service.upload_photo(self.session, &upload).await;

        let mut inner = self.inner.lock().await;
        if !self.is_alive() || !inner.requests.is_current(ticket) {
            return Ok(PhotoOutcome::Superseded);
        }
        match result {
            Ok(image) => {
                let remote = PhotoRef::Remote {
                    image_id: image.image_id.clone(),
                };
                inner.answers.photo = Some(remote.clone());
                drop(inner);
                self.emit(FlowEvent::PhotoChanged {
                    photo: Some(remote),
                });
                Ok(PhotoOutcome::Stored {
                    image_id: image.image_id,
                })
            }
            Err(e) => {
                warn!(session = %self.session, error = %e, "Photo upload failed");
                let reason = match &e {
                    crate::error::ServiceError::Api { message, .. } if !message.is_empty() => {
                        message.clone()
                    }
                    _ => "We couldn't upload that photo. Please try another.".to_string(),
                };
                inner.answers.photo = None;
                inner.photo_error = Some(reason.clone());
                drop(inner);
                self.emit(FlowEvent::PhotoChanged { photo: None });
                Err(MediaError::Rejected { reason })
            }
        }
    }

    // ── Teardown ────────────────────────────────────────────────────────

    /// Unmount: pending transitions are abandoned and timers cancelled.
    pub fn shutdown(&self) {
        if !self.alive.send_replace(false) {
            return;
        }
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        for handle in tasks.drain(..) {
            handle.abort();
        }
        info!(session = %self.session, "Onboarding session shut down");
    }
}

impl Drop for FlowController {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(|e| e.into_inner());
        for handle in tasks.drain(..) {
            handle.abort();
        }
    }
}
