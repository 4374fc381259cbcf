//! Unit tests for the flow controller.
//!
//! Time is paused in every test, so exit delays and holds elapse instantly
//! once all tasks are idle.

use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::time::Instant;

use super::*;
use crate::error::ServiceError;
use crate::onboarding::answers::{FullName, ProfileFields};
use crate::onboarding::archetype::Personality;
use crate::onboarding::step::{DEFAULT_EXIT_DELAY, SCORING_EXIT_DELAY, SCORING_HOLD};
use crate::service::{CreatedUser, UploadedImage};

#[derive(Clone, Copy, Default)]
enum BioMode {
    #[default]
    Unique,
    Taken,
    Unreachable,
}

#[derive(Default)]
struct StubService {
    fail_updates: bool,
    update_delay: Duration,
    create_delay: Duration,
    bio: BioMode,
    create_error: Option<(u16, &'static str)>,
    fail_uploads: bool,
    updates: StdMutex<Vec<(Option<String>, AnswerRecord)>>,
    bio_checks: AtomicUsize,
    creates: AtomicUsize,
    uploads: AtomicUsize,
    enrichments: AtomicUsize,
}

#[async_trait]
impl UserService for StubService {
    async fn create_user(
        &self,
        _session: SessionId,
        _fields: &ProfileFields,
    ) -> Result<CreatedUser, ServiceError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        match self.create_error {
            Some((status, message)) => Err(ServiceError::Api {
                status,
                message: message.to_string(),
            }),
            None => Ok(CreatedUser {
                user_id: "u_1".to_string(),
            }),
        }
    }

    async fn update_user(
        &self,
        _session: SessionId,
        user_id: Option<&str>,
        fields: &AnswerRecord,
    ) -> Result<(), ServiceError> {
        if !self.update_delay.is_zero() {
            tokio::time::sleep(self.update_delay).await;
        }
        self.updates
            .lock()
            .unwrap()
            .push((user_id.map(str::to_string), fields.clone()));
        if self.fail_updates {
            return Err(ServiceError::Api {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn check_bio_uniqueness(
        &self,
        _session: SessionId,
        _bio: &str,
    ) -> Result<bool, ServiceError> {
        self.bio_checks.fetch_add(1, Ordering::SeqCst);
        match self.bio {
            BioMode::Unique => Ok(false),
            BioMode::Taken => Ok(true),
            BioMode::Unreachable => Err(ServiceError::Timeout {
                timeout: Duration::from_secs(10),
            }),
        }
    }

    async fn upload_photo(
        &self,
        _session: SessionId,
        _photo: &PhotoUpload,
    ) -> Result<UploadedImage, ServiceError> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        if self.fail_uploads {
            return Err(ServiceError::Api {
                status: 415,
                message: "Unsupported codec".to_string(),
            });
        }
        Ok(UploadedImage {
            image_id: "img_1".to_string(),
        })
    }

    async fn trigger_enrichment(
        &self,
        _session: SessionId,
        _user_id: &str,
        _options: &EnrichmentOptions,
    ) -> Result<(), ServiceError> {
        self.enrichments.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn controller(flow: FlowDefinition, stub: Arc<StubService>) -> Arc<FlowController> {
    FlowController::new(Arc::new(flow), stub)
}

fn survey_patch() -> AnswerPatch {
    AnswerPatch {
        dream: Some("build something".to_string()),
        struggle: Some("myself".to_string()),
        personality: Some(Personality::Analytical),
        ..Default::default()
    }
}

fn profile_patch() -> AnswerPatch {
    AnswerPatch {
        name: Some(FullName {
            first: "Ada".to_string(),
            last: "Lovelace".to_string(),
        }),
        bio: Some("Engines and poetry".to_string()),
        age: Some(28),
        location: Some("London".to_string()),
        ..Default::default()
    }
}

async fn wait_until(controller: &FlowController, pred: impl Fn(&WizardState) -> bool) {
    for _ in 0..1000 {
        if pred(&controller.state().await) {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

/// Walk the signup flow up to the profile step.
async fn signup_at_profile(stub: Arc<StubService>) -> Arc<FlowController> {
    let c = controller(FlowDefinition::signup(), stub);
    assert!(matches!(c.advance(AnswerPatch::default()).await, Transition::Advanced { .. }));
    assert_eq!(
        c.complete_step(StepId::Survey, survey_patch()).await,
        Transition::Advanced {
            from: StepId::Survey,
            to: StepId::Profile
        }
    );
    c
}

// ── Forward ─────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn advance_follows_forward_order() {
    let flow = FlowDefinition::survey();
    let expected: Vec<StepId> = flow.steps().to_vec();
    let c = controller(flow, Arc::new(StubService::default()));

    let mut visited = vec![c.state().await.current_step];
    loop {
        match c.advance(AnswerPatch::default()).await {
            Transition::Advanced { from, to } => {
                assert_eq!(Some(from), visited.last().copied());
                visited.push(to);
            }
            Transition::Ignored { reason } => {
                assert_eq!(reason, IgnoreReason::NoNextStep);
                break;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(visited, expected);
    let state = c.state().await;
    assert_eq!(state.current_step, StepId::Completion);
    assert_eq!(state.previous_step, Some(StepId::Scoring));
}

#[tokio::test(start_paused = true)]
async fn advance_waits_for_exit_delay() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    let start = Instant::now();
    c.advance(AnswerPatch::default()).await;
    assert!(start.elapsed() >= DEFAULT_EXIT_DELAY);
}

#[tokio::test(start_paused = true)]
async fn advance_while_transitioning_is_noop() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    let first = {
        let c = Arc::clone(&c);
        tokio::spawn(async move { c.advance(AnswerPatch::default()).await })
    };
    wait_until(&c, |s| s.is_transitioning).await;

    let second = c
        .advance(AnswerPatch {
            age: Some(30),
            ..Default::default()
        })
        .await;
    assert_eq!(second, Transition::ignored(IgnoreReason::Transitioning));
    assert_eq!(c.answers().await.age, None);
    assert_eq!(c.back().await, Transition::ignored(IgnoreReason::Transitioning));

    assert_eq!(
        first.await.unwrap(),
        Transition::Advanced {
            from: StepId::Welcome,
            to: StepId::Survey
        }
    );
    assert_eq!(c.answers().await.age, None);
}

#[tokio::test(start_paused = true)]
async fn finish_exit_short_circuits_delay() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    assert!(!c.finish_exit().await);

    let start = Instant::now();
    let pending = {
        let c = Arc::clone(&c);
        tokio::spawn(async move { c.advance(AnswerPatch::default()).await })
    };
    wait_until(&c, |s| s.is_transitioning).await;
    assert!(c.finish_exit().await);

    assert!(matches!(pending.await.unwrap(), Transition::Advanced { .. }));
    assert!(start.elapsed() < DEFAULT_EXIT_DELAY);
}

#[tokio::test(start_paused = true)]
async fn empty_patch_only_advances() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    c.advance(AnswerPatch {
        age: Some(22),
        bio: Some("a bio that is fine".to_string()),
        ..Default::default()
    })
    .await;
    let before = c.answers().await;
    let outcome = c.advance(AnswerPatch::default()).await;
    assert!(matches!(outcome, Transition::Advanced { .. }));
    assert_eq!(c.answers().await, before);
}

#[tokio::test(start_paused = true)]
async fn events_follow_merge_animate_advance_order() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    let mut rx = c.subscribe();
    c.advance(AnswerPatch::default()).await;

    assert_eq!(
        rx.recv().await.unwrap(),
        FlowEvent::ExitStarted {
            step: StepId::Welcome,
            delay_ms: DEFAULT_EXIT_DELAY.as_millis() as u64
        }
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        FlowEvent::StepChanged {
            from: StepId::Welcome,
            to: StepId::Survey
        }
    );
}

// ── Back / info ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn back_from_first_step_is_noop() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    assert_eq!(c.back().await, Transition::ignored(IgnoreReason::FirstStep));
    assert_eq!(c.state().await.current_step, StepId::Welcome);
}

#[tokio::test(start_paused = true)]
async fn back_from_completion_returns_home() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    while c.state().await.current_step != StepId::Completion {
        c.advance(AnswerPatch::default()).await;
    }
    assert_eq!(
        c.back().await,
        Transition::Moved {
            from: StepId::Completion,
            to: StepId::Welcome
        }
    );
    assert_eq!(c.state().await.previous_step, Some(StepId::Welcome));
}

#[tokio::test(start_paused = true)]
async fn back_mid_flow_resets_previous_to_first() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    c.advance(AnswerPatch::default()).await;
    c.advance(AnswerPatch::default()).await;
    assert_eq!(c.state().await.current_step, StepId::EduCheck);

    assert_eq!(
        c.back().await,
        Transition::Moved {
            from: StepId::EduCheck,
            to: StepId::Survey
        }
    );
    let state = c.state().await;
    assert_eq!(state.previous_step, Some(StepId::Welcome));
    assert_eq!(
        c.back().await,
        Transition::Moved {
            from: StepId::Survey,
            to: StepId::Welcome
        }
    );
}

#[tokio::test(start_paused = true)]
async fn info_branch_round_trip() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    assert_eq!(
        c.branch_to_info().await,
        Transition::Moved {
            from: StepId::Welcome,
            to: StepId::AboutInfo
        }
    );
    assert_eq!(c.state().await.previous_step, Some(StepId::Welcome));
    assert_eq!(
        c.advance(AnswerPatch::default()).await,
        Transition::ignored(IgnoreReason::NoNextStep)
    );
    assert_eq!(
        c.back().await,
        Transition::Moved {
            from: StepId::AboutInfo,
            to: StepId::Welcome
        }
    );

    c.advance(AnswerPatch::default()).await;
    assert_eq!(
        c.branch_to_info().await,
        Transition::ignored(IgnoreReason::NotOnFirstStep)
    );
}

#[tokio::test(start_paused = true)]
async fn info_branch_missing() {
    let flow = FlowDefinition::builder("plain")
        .steps([StepId::Welcome, StepId::Completion])
        .build()
        .unwrap();
    let c = controller(flow, Arc::new(StubService::default()));
    assert_eq!(
        c.branch_to_info().await,
        Transition::ignored(IgnoreReason::NoInfoBranch)
    );
}

// ── Step completion ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn survey_completion_derives_color_and_advances() {
    let stub = Arc::new(StubService::default());
    let c = controller(FlowDefinition::survey(), Arc::clone(&stub));
    c.advance(AnswerPatch::default()).await;

    let outcome = c.complete_step(StepId::Survey, survey_patch()).await;
    assert_eq!(
        outcome,
        Transition::Advanced {
            from: StepId::Survey,
            to: StepId::EduCheck
        }
    );

    let answers = c.answers().await;
    assert_eq!(answers.personality, Some(Personality::Analytical));
    assert_eq!(answers.color_code.as_deref(), Some("#95A5A6"));
    assert_eq!(answers.color_name.as_deref(), Some("Gray"));

    let updates = stub.updates.lock().unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].0, None);
    assert_eq!(updates[0].1.dream.as_deref(), Some("build something"));
    assert_eq!(updates[0].1.color_name.as_deref(), Some("Gray"));
    assert!(updates[0].1.age.is_none());
}

#[tokio::test(start_paused = true)]
async fn best_effort_failure_still_advances() {
    let stub = Arc::new(StubService {
        fail_updates: true,
        ..Default::default()
    });
    let c = controller(FlowDefinition::survey(), stub);
    c.advance(AnswerPatch::default()).await;

    let outcome = c.complete_step(StepId::Survey, survey_patch()).await;
    assert!(matches!(outcome, Transition::Advanced { .. }));
    let snapshot = c.snapshot().await;
    assert!(snapshot.alert.is_none());
    assert!(!snapshot.state.is_loading);
    assert_eq!(snapshot.answers.dream.as_deref(), Some("build something"));
}

#[tokio::test(start_paused = true)]
async fn complete_for_other_step_is_ignored() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    assert_eq!(
        c.complete_step(StepId::Survey, survey_patch()).await,
        Transition::ignored(IgnoreReason::NotCurrentStep)
    );
    assert_eq!(c.answers().await, AnswerRecord::default());
}

#[tokio::test(start_paused = true)]
async fn step_without_effect_advances_directly() {
    let stub = Arc::new(StubService::default());
    let c = controller(FlowDefinition::survey(), Arc::clone(&stub));
    let outcome = c.complete_step(StepId::Welcome, AnswerPatch::default()).await;
    assert!(matches!(outcome, Transition::Advanced { .. }));
    assert!(stub.updates.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn create_user_bio_conflict_keeps_user_on_step() {
    let stub = Arc::new(StubService {
        create_error: Some((400, "bio already exists")),
        ..Default::default()
    });
    let c = signup_at_profile(Arc::clone(&stub)).await;

    let outcome = c.complete_step(StepId::Profile, profile_patch()).await;
    assert!(matches!(outcome, Transition::Blocked { .. }));

    let snapshot = c.snapshot().await;
    assert_eq!(snapshot.state.current_step, StepId::Profile);
    assert!(!snapshot.state.is_loading);
    assert_eq!(snapshot.answers.bio.as_deref(), Some("Engines and poetry"));
    let alert = snapshot.alert.unwrap();
    assert_eq!(alert.field.as_deref(), Some("bio"));
    assert!(snapshot.user_id.is_none());
    assert_eq!(stub.enrichments.load(Ordering::SeqCst), 0);

    c.dismiss_alert().await;
    assert!(c.snapshot().await.alert.is_none());
}

#[tokio::test(start_paused = true)]
async fn create_user_server_error_blocks_with_retry_prompt() {
    let stub = Arc::new(StubService {
        create_error: Some((500, "boom")),
        ..Default::default()
    });
    let c = signup_at_profile(stub).await;
    let outcome = c.complete_step(StepId::Profile, profile_patch()).await;
    match outcome {
        Transition::Blocked { message } => assert!(message.contains("try again")),
        other => panic!("expected Blocked, got {other:?}"),
    }
    assert!(c.snapshot().await.alert.unwrap().field.is_none());
}

#[tokio::test(start_paused = true)]
async fn taken_bio_blocks_before_create() {
    let stub = Arc::new(StubService {
        bio: BioMode::Taken,
        ..Default::default()
    });
    let c = signup_at_profile(Arc::clone(&stub)).await;
    let outcome = c.complete_step(StepId::Profile, profile_patch()).await;
    assert!(matches!(outcome, Transition::Blocked { .. }));
    assert_eq!(stub.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn unreachable_bio_check_is_advisory() {
    let stub = Arc::new(StubService {
        bio: BioMode::Unreachable,
        ..Default::default()
    });
    let c = signup_at_profile(Arc::clone(&stub)).await;
    let outcome = c.complete_step(StepId::Profile, profile_patch()).await;
    assert_eq!(
        outcome,
        Transition::Advanced {
            from: StepId::Profile,
            to: StepId::PhoneVerification
        }
    );
    assert_eq!(stub.creates.load(Ordering::SeqCst), 1);
    assert_eq!(c.snapshot().await.user_id.as_deref(), Some("u_1"));

    for _ in 0..100 {
        if stub.enrichments.load(Ordering::SeqCst) == 1 {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert_eq!(stub.enrichments.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn incomplete_profile_blocks_without_calls() {
    let stub = Arc::new(StubService::default());
    let c = signup_at_profile(Arc::clone(&stub)).await;
    let outcome = c
        .complete_step(
            StepId::Profile,
            AnswerPatch {
                bio: Some("Engines and poetry".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(outcome, Transition::Blocked { .. }));
    assert_eq!(stub.bio_checks.load(Ordering::SeqCst), 0);
    assert_eq!(stub.creates.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn profile_after_user_exists_is_an_update() {
    let stub = Arc::new(StubService::default());
    let c = signup_at_profile(Arc::clone(&stub)).await;
    c.complete_step(StepId::Profile, profile_patch()).await;
    assert_eq!(
        c.back().await,
        Transition::Moved {
            from: StepId::PhoneVerification,
            to: StepId::Profile
        }
    );

    let outcome = c
        .complete_step(
            StepId::Profile,
            AnswerPatch {
                location: Some("Paris".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(outcome, Transition::Advanced { .. }));
    assert_eq!(stub.creates.load(Ordering::SeqCst), 1);
    let updates = stub.updates.lock().unwrap();
    let last = updates.last().unwrap();
    assert_eq!(last.0.as_deref(), Some("u_1"));
    assert_eq!(last.1.location.as_deref(), Some("Paris"));
}

#[tokio::test(start_paused = true)]
async fn loading_blocks_forward_but_not_back() {
    let stub = Arc::new(StubService {
        update_delay: Duration::from_secs(5),
        ..Default::default()
    });
    let c = controller(FlowDefinition::survey(), Arc::clone(&stub));
    c.advance(AnswerPatch::default()).await;

    let pending = {
        let c = Arc::clone(&c);
        tokio::spawn(async move { c.complete_step(StepId::Survey, survey_patch()).await })
    };
    wait_until(&c, |s| s.is_loading).await;

    assert_eq!(
        c.advance(AnswerPatch::default()).await,
        Transition::ignored(IgnoreReason::Loading)
    );
    assert_eq!(
        c.back().await,
        Transition::Moved {
            from: StepId::Survey,
            to: StepId::Welcome
        }
    );
    assert!(!c.state().await.is_loading);

    // the stale call still lands but no longer moves the wizard
    assert_eq!(
        pending.await.unwrap(),
        Transition::ignored(IgnoreReason::Superseded)
    );
    assert_eq!(c.state().await.current_step, StepId::Welcome);
    assert_eq!(stub.updates.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn resubmitting_profile_waits_for_pending_create() {
    let stub = Arc::new(StubService {
        create_delay: Duration::from_secs(5),
        ..Default::default()
    });
    let c = signup_at_profile(Arc::clone(&stub)).await;

    let first = {
        let c = Arc::clone(&c);
        tokio::spawn(async move { c.complete_step(StepId::Profile, profile_patch()).await })
    };
    wait_until(&c, |s| s.is_loading).await;
    assert!(matches!(c.back().await, Transition::Moved { .. }));
    assert_eq!(
        c.advance(AnswerPatch::default()).await,
        Transition::Advanced {
            from: StepId::Survey,
            to: StepId::Profile
        }
    );

    assert_eq!(
        c.complete_step(StepId::Profile, profile_patch()).await,
        Transition::ignored(IgnoreReason::Loading)
    );
    assert_eq!(
        first.await.unwrap(),
        Transition::ignored(IgnoreReason::Superseded)
    );
    assert_eq!(c.snapshot().await.user_id.as_deref(), Some("u_1"));

    // the user now exists, so completing again is an update
    let outcome = c.complete_step(StepId::Profile, profile_patch()).await;
    assert!(matches!(outcome, Transition::Advanced { .. }));
    assert_eq!(stub.creates.load(Ordering::SeqCst), 1);
}

// ── Validation ──────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn invalid_connections_do_not_merge_or_advance() {
    let stub = Arc::new(StubService::default());
    let c = signup_at_profile(Arc::clone(&stub)).await;
    c.complete_step(StepId::Profile, profile_patch()).await;
    c.complete_step(
        StepId::PhoneVerification,
        AnswerPatch {
            phone: Some("(415) 555-0100".to_string()),
            ..Default::default()
        },
    )
    .await;
    assert_eq!(c.state().await.current_step, StepId::Connections);
    assert_eq!(c.answers().await.phone.as_deref(), Some("+14155550100"));
    let updates_before = stub.updates.lock().unwrap().len();

    let two = (0..2)
        .map(|i| crate::onboarding::answers::Connection {
            role: format!("role {i}"),
            location: "Berlin".to_string(),
        })
        .collect();
    let outcome = c
        .complete_step(
            StepId::Connections,
            AnswerPatch {
                connections: Some(two),
                ..Default::default()
            },
        )
        .await;
    match outcome {
        Transition::Invalid { errors } => assert!(errors.get("connections").is_some()),
        other => panic!("expected Invalid, got {other:?}"),
    }

    let outcome = c
        .complete_step(
            StepId::Connections,
            AnswerPatch {
                connections: Some(vec![crate::onboarding::answers::Connection {
                    role: String::new(),
                    location: String::new(),
                }]),
                age: Some(200),
                ..Default::default()
            },
        )
        .await;
    match outcome {
        Transition::Invalid { errors } => {
            assert!(errors.get("age").is_some());
            assert!(errors.get("connections[0].role").is_some());
        }
        other => panic!("expected Invalid, got {other:?}"),
    }

    let snapshot = c.snapshot().await;
    assert_eq!(snapshot.state.current_step, StepId::Connections);
    assert!(!snapshot.state.is_loading);
    assert_eq!(snapshot.answers.age, Some(28));
    assert!(snapshot.answers.connections.is_none());
    assert_eq!(stub.updates.lock().unwrap().len(), updates_before);
}

#[tokio::test(start_paused = true)]
async fn advance_rejects_out_of_range_age() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    let outcome = c
        .advance(AnswerPatch {
            age: Some(200),
            ..Default::default()
        })
        .await;
    assert!(matches!(outcome, Transition::Invalid { .. }));
    let state = c.state().await;
    assert_eq!(state.current_step, StepId::Welcome);
    assert!(!state.is_transitioning);
    assert_eq!(c.answers().await.age, None);
}

// ── Interstitial ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn scoring_advances_by_itself() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    while c.state().await.current_step != StepId::Scoring {
        c.advance(AnswerPatch::default()).await;
    }
    tokio::time::sleep(SCORING_HOLD + SCORING_EXIT_DELAY + Duration::from_millis(10)).await;
    assert_eq!(c.state().await.current_step, StepId::Completion);
}

#[tokio::test(start_paused = true)]
async fn auto_advance_skipped_after_leaving() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    while c.state().await.current_step != StepId::Scoring {
        c.advance(AnswerPatch::default()).await;
    }
    c.back().await;
    let here = c.state().await.current_step;
    assert_eq!(here, StepId::EduSurvey);
    tokio::time::sleep(SCORING_HOLD * 2).await;
    assert_eq!(c.state().await.current_step, here);
}

// ── Photo ───────────────────────────────────────────────────────────────

fn png(len: usize) -> PhotoUpload {
    PhotoUpload {
        file_name: "me.png".to_string(),
        content_type: "image/png".to_string(),
        bytes: vec![1; len],
    }
}

#[tokio::test(start_paused = true)]
async fn photo_upload_success_stores_remote_ref() {
    let c = controller(FlowDefinition::signup(), Arc::new(StubService::default()));
    let outcome = c.upload_photo(png(16)).await.unwrap();
    assert_eq!(
        outcome,
        PhotoOutcome::Stored {
            image_id: "img_1".to_string()
        }
    );
    assert_eq!(
        c.answers().await.photo,
        Some(PhotoRef::Remote {
            image_id: "img_1".to_string()
        })
    );
}

#[tokio::test(start_paused = true)]
async fn photo_server_rejection_reverts_to_placeholder() {
    let c = controller(
        FlowDefinition::signup(),
        Arc::new(StubService {
            fail_uploads: true,
            ..Default::default()
        }),
    );
    let err = c.upload_photo(png(16)).await.unwrap_err();
    assert!(matches!(err, MediaError::Rejected { .. }));
    let snapshot = c.snapshot().await;
    assert_eq!(snapshot.answers.photo, None);
    assert_eq!(snapshot.photo_error.as_deref(), Some("Unsupported codec"));
    assert_eq!(snapshot.state.current_step, StepId::Welcome);
}

#[tokio::test(start_paused = true)]
async fn photo_rejected_locally_never_uploads() {
    let stub = Arc::new(StubService::default());
    let c = controller(FlowDefinition::signup(), Arc::clone(&stub));
    let upload = PhotoUpload {
        content_type: "application/pdf".to_string(),
        ..png(16)
    };
    assert!(matches!(
        c.upload_photo(upload).await,
        Err(MediaError::UnsupportedType { .. })
    ));
    assert_eq!(stub.uploads.load(Ordering::SeqCst), 0);
    assert!(c.snapshot().await.photo_error.is_some());
}

// ── Teardown ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_pending_transition() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    let pending = {
        let c = Arc::clone(&c);
        tokio::spawn(async move { c.advance(AnswerPatch::default()).await })
    };
    wait_until(&c, |s| s.is_transitioning).await;

    c.shutdown();
    assert!(!c.is_alive());
    assert_eq!(pending.await.unwrap(), Transition::Abandoned);
    assert_eq!(c.state().await.current_step, StepId::Welcome);
    assert_eq!(
        c.advance(AnswerPatch::default()).await,
        Transition::ignored(IgnoreReason::ShutDown)
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_spawned_advance() {
    let c = controller(FlowDefinition::survey(), Arc::new(StubService::default()));
    c.spawn_advance(AnswerPatch::default());
    wait_until(&c, |s| s.is_transitioning).await;
    c.shutdown();
    tokio::time::sleep(DEFAULT_EXIT_DELAY * 4).await;
    assert_eq!(c.state().await.current_step, StepId::Welcome);
}

// ── Full signup ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn signup_happy_path_builds_share_link() {
    let stub = Arc::new(StubService::default());
    let c = FlowController::with_share_base(
        Arc::new(FlowDefinition::signup()),
        Arc::clone(&stub) as Arc<dyn UserService>,
        Some("https://example.com".to_string()),
    );
    c.advance(AnswerPatch::default()).await;
    c.complete_step(
        StepId::Survey,
        AnswerPatch {
            personality: Some(Personality::Passionate),
            ..survey_patch()
        },
    )
    .await;
    c.complete_step(StepId::Profile, profile_patch()).await;
    c.complete_step(
        StepId::PhoneVerification,
        AnswerPatch {
            phone: Some("+14155550100".to_string()),
            ..Default::default()
        },
    )
    .await;
    let connections = (0..3)
        .map(|i| crate::onboarding::answers::Connection {
            role: format!("role {i}"),
            location: "Berlin".to_string(),
        })
        .collect();
    let outcome = c
        .complete_step(
            StepId::Connections,
            AnswerPatch {
                connections: Some(connections),
                ..Default::default()
            },
        )
        .await;
    assert_eq!(
        outcome,
        Transition::Advanced {
            from: StepId::Connections,
            to: StepId::Scoring
        }
    );
    assert!(c.snapshot().await.share_link.is_none());

    c.advance(AnswerPatch::default()).await;
    let snapshot = c.snapshot().await;
    assert_eq!(snapshot.state.current_step, StepId::Completion);
    assert_eq!(
        snapshot.share_link.as_deref(),
        Some("https://example.com/invite/u_1?color=FF6B6B")
    );
    assert_eq!(snapshot.answers.connections.map(|list| list.len()), Some(3));

    // phone and connections updates are keyed by the created user
    let updates = stub.updates.lock().unwrap();
    assert!(updates.iter().skip(1).all(|(user, _)| user.as_deref() == Some("u_1")));
}
