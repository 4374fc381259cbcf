//! Step identifiers and flow definitions.
//!
//! A flow is an ordered list of steps plus a back-target table. Variants of
//! the wizard are different `FlowDefinition`s, not different controllers.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;

/// Exit animation length for most steps.
pub const DEFAULT_EXIT_DELAY: Duration = Duration::from_millis(500);
/// Exit animation after the education steps.
pub const EDU_EXIT_DELAY: Duration = Duration::from_millis(1000);
/// Exit animation out of the scoring interstitial.
pub const SCORING_EXIT_DELAY: Duration = Duration::from_millis(2000);
/// How long the scoring interstitial stays on screen before moving on by itself.
pub const SCORING_HOLD: Duration = Duration::from_millis(8000);

/// One screen of the onboarding wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StepId {
    Welcome,
    Survey,
    EduCheck,
    EduSurvey,
    Profile,
    PhoneVerification,
    Connections,
    Scoring,
    Completion,
    AboutInfo,
}

impl StepId {
    pub const ALL: [StepId; 10] = [
        Self::Welcome,
        Self::Survey,
        Self::EduCheck,
        Self::EduSurvey,
        Self::Profile,
        Self::PhoneVerification,
        Self::Connections,
        Self::Scoring,
        Self::Completion,
        Self::AboutInfo,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::Survey => "survey",
            Self::EduCheck => "eduCheck",
            Self::EduSurvey => "eduSurvey",
            Self::Profile => "profile",
            Self::PhoneVerification => "phoneVerification",
            Self::Connections => "connections",
            Self::Scoring => "scoring",
            Self::Completion => "completion",
            Self::AboutInfo => "aboutInfo",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StepId {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| FlowError::UnknownStepName(s.to_string()))
    }
}

/// External side effect a step triggers when it is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEffect {
    /// Advance immediately.
    #[default]
    None,
    /// Best-effort `updateUser`; failure is logged and the flow continues.
    UpdateUser,
    /// Gating `createUser` (after an advisory bio check); failure keeps the
    /// user on the step.
    CreateUser,
}

/// Ordered step list plus per-step navigation and timing rules.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    name: String,
    order: Vec<StepId>,
    back_targets: HashMap<StepId, StepId>,
    interstitials: HashSet<StepId>,
    info_branch: Option<StepId>,
    default_exit_delay: Duration,
    exit_delays: HashMap<StepId, Duration>,
    auto_advance: HashMap<StepId, Duration>,
    effects: HashMap<StepId, StepEffect>,
}

impl FlowDefinition {
    pub fn builder(name: impl Into<String>) -> FlowDefinitionBuilder {
        FlowDefinitionBuilder::new(name)
    }

    /// Survey variant: welcome → survey → eduCheck → eduSurvey → scoring → completion.
    pub fn survey() -> Self {
        Self::builder("survey")
            .steps([
                StepId::Welcome,
                StepId::Survey,
                StepId::EduCheck,
                StepId::EduSurvey,
                StepId::Scoring,
                StepId::Completion,
            ])
            .info_branch(StepId::AboutInfo)
            .interstitial(StepId::Scoring)
            .effect(StepId::Survey, StepEffect::UpdateUser)
            .effect(StepId::EduSurvey, StepEffect::UpdateUser)
            .exit_delay(StepId::EduCheck, EDU_EXIT_DELAY)
            .exit_delay(StepId::EduSurvey, EDU_EXIT_DELAY)
            .exit_delay(StepId::Scoring, SCORING_EXIT_DELAY)
            .auto_advance(StepId::Scoring, SCORING_HOLD)
            .build()
            .expect("built-in survey flow is valid")
    }

    /// Signup variant: welcome → survey → profile → phoneVerification →
    /// connections → scoring → completion.
    pub fn signup() -> Self {
        Self::builder("signup")
            .steps([
                StepId::Welcome,
                StepId::Survey,
                StepId::Profile,
                StepId::PhoneVerification,
                StepId::Connections,
                StepId::Scoring,
                StepId::Completion,
            ])
            .info_branch(StepId::AboutInfo)
            .interstitial(StepId::Scoring)
            .effect(StepId::Survey, StepEffect::UpdateUser)
            .effect(StepId::Profile, StepEffect::CreateUser)
            .effect(StepId::PhoneVerification, StepEffect::UpdateUser)
            .effect(StepId::Connections, StepEffect::UpdateUser)
            .exit_delay(StepId::Scoring, SCORING_EXIT_DELAY)
            .auto_advance(StepId::Scoring, SCORING_HOLD)
            .build()
            .expect("built-in signup flow is valid")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[StepId] {
        &self.order
    }

    pub fn first(&self) -> StepId {
        self.order[0]
    }

    /// The last step in the forward order; it has no outgoing transitions.
    pub fn terminal(&self) -> StepId {
        self.order[self.order.len() - 1]
    }

    pub fn info_branch(&self) -> Option<StepId> {
        self.info_branch
    }

    pub fn position(&self, step: StepId) -> Option<usize> {
        self.order.iter().position(|s| *s == step)
    }

    pub fn contains(&self, step: StepId) -> bool {
        self.position(step).is_some() || self.info_branch == Some(step)
    }

    pub fn is_interstitial(&self, step: StepId) -> bool {
        self.interstitials.contains(&step)
    }

    /// The step after `step` in forward order. The info branch and the
    /// terminal step have no successor.
    pub fn next_after(&self, step: StepId) -> Option<StepId> {
        let idx = self.position(step)?;
        self.order.get(idx + 1).copied()
    }

    /// Where `back()` goes from `current`, or `None` when back is a no-op.
    ///
    /// The info branch and the terminal step always return to the first step.
    /// Otherwise the explicit table wins, then `previous` if it sits earlier
    /// in the order and is not an interstitial, then the nearest earlier
    /// non-interstitial step.
    pub fn back_target(&self, current: StepId, previous: Option<StepId>) -> Option<StepId> {
        if Some(current) == self.info_branch {
            return Some(self.first());
        }
        let idx = self.position(current)?;
        if idx == 0 {
            return None;
        }
        if current == self.terminal() {
            return Some(self.first());
        }
        if let Some(target) = self.back_targets.get(&current) {
            return Some(*target);
        }
        if let Some(prev) = previous {
            let earlier = self.position(prev).is_some_and(|p| p < idx);
            if earlier && !self.is_interstitial(prev) {
                return Some(prev);
            }
        }
        self.order[..idx]
            .iter()
            .rev()
            .find(|s| !self.is_interstitial(**s))
            .copied()
            .or(Some(self.first()))
    }

    pub fn exit_delay(&self, step: StepId) -> Duration {
        self.exit_delays
            .get(&step)
            .copied()
            .unwrap_or(self.default_exit_delay)
    }

    /// Hold time after which an interstitial advances on its own.
    pub fn auto_advance(&self, step: StepId) -> Option<Duration> {
        self.auto_advance.get(&step).copied()
    }

    pub fn effect(&self, step: StepId) -> StepEffect {
        self.effects.get(&step).copied().unwrap_or_default()
    }

    /// Override the default exit delay (steps with their own delay keep it).
    pub fn with_default_exit_delay(mut self, delay: Duration) -> Self {
        self.default_exit_delay = delay;
        self
    }
}

/// Builder for custom flow variants.
#[derive(Debug, Clone)]
pub struct FlowDefinitionBuilder {
    name: String,
    order: Vec<StepId>,
    back_targets: HashMap<StepId, StepId>,
    interstitials: HashSet<StepId>,
    info_branch: Option<StepId>,
    default_exit_delay: Duration,
    exit_delays: HashMap<StepId, Duration>,
    auto_advance: HashMap<StepId, Duration>,
    effects: HashMap<StepId, StepEffect>,
}

impl FlowDefinitionBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: Vec::new(),
            back_targets: HashMap::new(),
            interstitials: HashSet::new(),
            info_branch: None,
            default_exit_delay: DEFAULT_EXIT_DELAY,
            exit_delays: HashMap::new(),
            auto_advance: HashMap::new(),
            effects: HashMap::new(),
        }
    }

    pub fn steps(mut self, steps: impl IntoIterator<Item = StepId>) -> Self {
        self.order.extend(steps);
        self
    }

    pub fn back_target(mut self, step: StepId, target: StepId) -> Self {
        self.back_targets.insert(step, target);
        self
    }

    pub fn interstitial(mut self, step: StepId) -> Self {
        self.interstitials.insert(step);
        self
    }

    pub fn info_branch(mut self, step: StepId) -> Self {
        self.info_branch = Some(step);
        self
    }

    pub fn default_exit_delay(mut self, delay: Duration) -> Self {
        self.default_exit_delay = delay;
        self
    }

    pub fn exit_delay(mut self, step: StepId, delay: Duration) -> Self {
        self.exit_delays.insert(step, delay);
        self
    }

    pub fn auto_advance(mut self, step: StepId, hold: Duration) -> Self {
        self.auto_advance.insert(step, hold);
        self
    }

    pub fn effect(mut self, step: StepId, effect: StepEffect) -> Self {
        self.effects.insert(step, effect);
        self
    }

    pub fn build(self) -> Result<FlowDefinition, FlowError> {
        if self.order.is_empty() {
            return Err(FlowError::EmptyFlow);
        }
        let mut seen = HashSet::new();
        for step in &self.order {
            if !seen.insert(*step) {
                return Err(FlowError::DuplicateStep(*step));
            }
        }
        if let Some(info) = self.info_branch {
            if seen.contains(&info) {
                return Err(FlowError::InfoBranchInOrder(info));
            }
        }

        let known = |s: &StepId| seen.contains(s) || self.info_branch == Some(*s);
        for (step, target) in &self.back_targets {
            if !known(step) {
                return Err(FlowError::UnknownStep {
                    step: *step,
                    target: *step,
                });
            }
            if !known(target) {
                return Err(FlowError::UnknownStep {
                    step: *step,
                    target: *target,
                });
            }
        }
        let keyed = self
            .interstitials
            .iter()
            .chain(self.exit_delays.keys())
            .chain(self.auto_advance.keys())
            .chain(self.effects.keys());
        for step in keyed {
            if !known(step) {
                return Err(FlowError::UnknownStep {
                    step: *step,
                    target: *step,
                });
            }
        }

        Ok(FlowDefinition {
            name: self.name,
            order: self.order,
            back_targets: self.back_targets,
            interstitials: self.interstitials,
            info_branch: self.info_branch,
            default_exit_delay: self.default_exit_delay,
            exit_delays: self.exit_delays,
            auto_advance: self.auto_advance,
            effects: self.effects,
        })
    }
}
