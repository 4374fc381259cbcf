//! REST endpoints that drive onboarding sessions from a browser front-end.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tower_http::cors::CorsLayer;
use tracing::{debug, info};

use super::answers::AnswerPatch;
use super::controller::{FlowController, PhotoOutcome, Snapshot, Transition};
use super::session::SessionId;
use super::step::{FlowDefinition, StepId};
use super::validate::PhotoUpload;
use crate::service::UserService;

/// Header carrying the original file name on photo uploads.
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Sessions untouched this long are unmounted.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);
/// Finished sessions stay this long after their last request, so the
/// completion screen (and its share link) can still be fetched.
pub const DEFAULT_COMPLETED_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry {
    controller: Arc<FlowController>,
    last_seen: std::sync::Mutex<Instant>,
}

impl Entry {
    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_seen.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Live sessions plus what is needed to mount new ones.
pub struct SessionRegistry {
    flows: HashMap<String, Arc<FlowDefinition>>,
    default_flow: String,
    service: Arc<dyn UserService>,
    share_base: Option<String>,
    idle_ttl: Duration,
    completed_ttl: Duration,
    sessions: RwLock<HashMap<SessionId, Entry>>,
}

impl SessionRegistry {
    /// `flows` must not be empty; the first one is the default.
    pub fn new(
        flows: Vec<FlowDefinition>,
        service: Arc<dyn UserService>,
        share_base: Option<String>,
    ) -> Self {
        let default_flow = flows
            .first()
            .map(|f| f.name().to_string())
            .unwrap_or_default();
        let flows = flows
            .into_iter()
            .map(|f| (f.name().to_string(), Arc::new(f)))
            .collect();
        Self {
            flows,
            default_flow,
            service,
            share_base,
            idle_ttl: DEFAULT_IDLE_TTL,
            completed_ttl: DEFAULT_COMPLETED_TTL,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_ttls(mut self, idle: Duration, completed: Duration) -> Self {
        self.idle_ttl = idle;
        self.completed_ttl = completed;
        self
    }

    /// Mount a session on the named flow (or the default one).
    pub async fn create(&self, flow: Option<&str>) -> Option<Arc<FlowController>> {
        let name = flow.unwrap_or(&self.default_flow);
        let definition = Arc::clone(self.flows.get(name)?);
        let controller = FlowController::with_share_base(
            definition,
            Arc::clone(&self.service),
            self.share_base.clone(),
        );
        let entry = Entry {
            controller: Arc::clone(&controller),
            last_seen: std::sync::Mutex::new(Instant::now()),
        };
        self.sessions
            .write()
            .await
            .insert(controller.session_id(), entry);
        Some(controller)
    }

    /// Look a session up and mark it as recently used.
    pub async fn get(&self, id: SessionId) -> Option<Arc<FlowController>> {
        let sessions = self.sessions.read().await;
        let entry = sessions.get(&id)?;
        entry.touch();
        Some(Arc::clone(&entry.controller))
    }

    /// Unmount a session. Returns false if it did not exist.
    pub async fn remove(&self, id: SessionId) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(entry) => {
                entry.controller.shutdown();
                true
            }
            None => false,
        }
    }

    /// Unmount sessions that finished or went idle. Returns how many went.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, entry) in sessions.iter() {
                let state = entry.controller.state().await;
                let ttl = if state.current_step == entry.controller.definition().terminal() {
                    self.completed_ttl
                } else {
                    self.idle_ttl
                };
                if entry.idle_for(now) >= ttl {
                    expired.push((*id, ttl));
                }
            }
        }

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        for (id, ttl) in expired {
            // touched again since the scan
            let still_expired = sessions
                .get(&id)
                .is_some_and(|entry| entry.idle_for(Instant::now()) >= ttl);
            if !still_expired {
                continue;
            }
            if let Some(entry) = sessions.remove(&id) {
                entry.controller.shutdown();
                debug!(session = %id, "Session evicted");
                removed += 1;
            }
        }
        if removed > 0 {
            info!(removed, remaining = sessions.len(), "Swept onboarding sessions");
        }
        removed
    }

    /// Sweep every `every` until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await; // first tick is immediate
            loop {
                tick.tick().await;
                let Some(registry) = weak.upgrade() else {
                    return;
                };
                registry.sweep().await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

/// Shared state for onboarding routes.
#[derive(Clone)]
pub struct OnboardingRouteState {
    pub registry: Arc<SessionRegistry>,
}

#[derive(Debug, Serialize)]
struct NavResponse {
    transition: Transition,
    session: Snapshot,
}

#[derive(Debug, Default, Deserialize)]
struct CreateParams {
    flow: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AdvanceParams {
    #[serde(default = "default_wait")]
    wait: bool,
}

fn default_wait() -> bool {
    true
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

async fn lookup(state: &OnboardingRouteState, id: &str) -> Result<Arc<FlowController>, Response> {
    let id: SessionId = id
        .parse()
        .map_err(|_| error(StatusCode::NOT_FOUND, "No such session"))?;
    state
        .registry
        .get(id)
        .await
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "No such session"))
}

/// Navigation result plus the session. Answers that failed validation are a 422.
async fn nav(controller: &FlowController, transition: Transition) -> Response {
    let status = match transition {
        Transition::Invalid { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::OK,
    };
    let session = controller.snapshot().await;
    (
        status,
        Json(NavResponse {
            transition,
            session,
        }),
    )
        .into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "onboarding-flow"
    }))
}

// ── Sessions ────────────────────────────────────────────────────────────

/// POST /api/onboarding/sessions?flow=<name>
async fn create_session(
    State(state): State<OnboardingRouteState>,
    Query(params): Query<CreateParams>,
) -> Response {
    match state.registry.create(params.flow.as_deref()).await {
        Some(controller) => {
            info!(session = %controller.session_id(), "Session mounted via API");
            (StatusCode::CREATED, Json(controller.snapshot().await)).into_response()
        }
        None => error(StatusCode::BAD_REQUEST, "Unknown flow"),
    }
}

/// GET /api/onboarding/sessions/{id}
async fn get_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    match lookup(&state, &id).await {
        Ok(controller) => Json(controller.snapshot().await).into_response(),
        Err(resp) => resp,
    }
}

/// DELETE /api/onboarding/sessions/{id}
async fn delete_session(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    let Ok(id) = id.parse::<SessionId>() else {
        return error(StatusCode::NOT_FOUND, "No such session");
    };
    if state.registry.remove(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        error(StatusCode::NOT_FOUND, "No such session")
    }
}

// ── Navigation ──────────────────────────────────────────────────────────

/// POST /api/onboarding/sessions/{id}/advance?wait=<bool>
///
/// With `wait=false` the transition runs in the background and the response
/// is a 202 with whatever the session looks like at that moment.
async fn advance(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    Query(params): Query<AdvanceParams>,
    Json(patch): Json<AnswerPatch>,
) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if params.wait {
        let transition = controller.advance(patch).await;
        nav(&controller, transition).await
    } else {
        controller.spawn_advance(patch);
        (StatusCode::ACCEPTED, Json(controller.snapshot().await)).into_response()
    }
}

/// POST /api/onboarding/sessions/{id}/exit-complete
async fn exit_complete(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    match lookup(&state, &id).await {
        Ok(controller) => {
            let finished = controller.finish_exit().await;
            Json(serde_json::json!({ "finished": finished })).into_response()
        }
        Err(resp) => resp,
    }
}

/// POST /api/onboarding/sessions/{id}/back
async fn back(State(state): State<OnboardingRouteState>, Path(id): Path<String>) -> Response {
    match lookup(&state, &id).await {
        Ok(controller) => {
            let transition = controller.back().await;
            nav(&controller, transition).await
        }
        Err(resp) => resp,
    }
}

/// POST /api/onboarding/sessions/{id}/info
async fn info_branch(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    match lookup(&state, &id).await {
        Ok(controller) => {
            let transition = controller.branch_to_info().await;
            nav(&controller, transition).await
        }
        Err(resp) => resp,
    }
}

/// POST /api/onboarding/sessions/{id}/steps/{step}/complete
async fn complete_step(
    State(state): State<OnboardingRouteState>,
    Path((id, step)): Path<(String, String)>,
    Json(patch): Json<AnswerPatch>,
) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let step: StepId = match step.parse() {
        Ok(step) => step,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let transition = controller.complete_step(step, patch).await;
    nav(&controller, transition).await
}

/// POST /api/onboarding/sessions/{id}/alert/dismiss
async fn dismiss_alert(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
) -> Response {
    match lookup(&state, &id).await {
        Ok(controller) => {
            controller.dismiss_alert().await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(resp) => resp,
    }
}

// ── Photo ───────────────────────────────────────────────────────────────

/// POST /api/onboarding/sessions/{id}/photo
///
/// Raw image bytes; `Content-Type` is the image type and `X-File-Name` the
/// original name.
async fn upload_photo(
    State(state): State<OnboardingRouteState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let controller = match lookup(&state, &id).await {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let upload = PhotoUpload {
        file_name: header_str(FILE_NAME_HEADER).unwrap_or_else(|| "photo".to_string()),
        content_type: header_str(header::CONTENT_TYPE.as_str()).unwrap_or_default(),
        bytes: body.to_vec(),
    };
    match controller.upload_photo(upload).await {
        Ok(PhotoOutcome::Stored { image_id }) => {
            Json(serde_json::json!({ "imageId": image_id })).into_response()
        }
        Ok(PhotoOutcome::Superseded) => StatusCode::CONFLICT.into_response(),
        Err(e) => error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
    }
}

/// Build the onboarding REST routes.
pub fn onboarding_routes(state: OnboardingRouteState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/onboarding/sessions", post(create_session))
        .route(
            "/api/onboarding/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route("/api/onboarding/sessions/{id}/advance", post(advance))
        .route("/api/onboarding/sessions/{id}/exit-complete", post(exit_complete))
        .route("/api/onboarding/sessions/{id}/back", post(back))
        .route("/api/onboarding/sessions/{id}/info", post(info_branch))
        .route(
            "/api/onboarding/sessions/{id}/steps/{step}/complete",
            post(complete_step),
        )
        .route("/api/onboarding/sessions/{id}/alert/dismiss", post(dismiss_alert))
        .route("/api/onboarding/sessions/{id}/photo", post(upload_photo))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
