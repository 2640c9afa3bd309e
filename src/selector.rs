//! The thread-safe arbitration facade.
//!
//! [`RefreshRateSelector`] owns one display's mode catalog and policy and
//! answers, per frame, which mode to drive next given the current layer
//! votes and global signals. All mutable state sits behind a single lock
//! held for the duration of each public call; the selection itself is
//! pure computation, so calls are short and deadlock-free.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::ArbiterError;
use crate::fps::{self, Fps};
use crate::layer::{GlobalSignals, LayerRequirement, LayerVoteType, Seamlessness};
use crate::mode::{DisplayMode, ModeCatalog, ModeId};
use crate::policy::Policy;
use crate::scoring::{self, ExactMatching, ScoreContext};

/// Scores within this relative distance of the maximum count as tied and
/// go through the tie-break chain.
const TIE_EPSILON: f32 = 0.0001;

/// Construction-time feature flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Allow per-app frame-rate overrides below the panel rate.
    pub enable_frame_rate_override: bool,
    /// Cap, in Hz, on the panel rates that `ExplicitExactOrMultiple`
    /// votes may reach through a multiple; 0 disables the cap.
    pub frame_rate_multiple_threshold: u32,
}

/// Advice on whether the host's kernel idle timer is worth running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdleTimerAction {
    TurnOn,
    TurnOff,
}

/// Result of one arbitration: the winning mode and which global signals
/// actually changed the outcome (as opposed to merely being present).
#[derive(Clone, Debug, PartialEq)]
pub struct Selection {
    pub mode: DisplayMode,
    pub considered: GlobalSignals,
}

/// Per-app frame-rate overrides keyed by owner uid. Every value divides
/// the panel rate it was computed against.
pub type FrameRateOverrides = HashMap<u32, Fps>;

#[derive(Clone, Debug)]
struct CachedSelection {
    layers: Vec<LayerRequirement>,
    signals: GlobalSignals,
    mode: ModeId,
    considered: GlobalSignals,
}

#[derive(Debug)]
struct State {
    policy: Policy,
    current_mode: ModeId,
    /// Modes inside the primary range, compatible with the default mode,
    /// ascending by rate.
    primary_ids: Vec<ModeId>,
    /// Same filter over the app-request range.
    app_ids: Vec<ModeId>,
    last_selection: Option<CachedSelection>,
}

/// Refresh-rate arbitration core for one display.
///
/// The catalog is fixed at construction; the policy and the current mode
/// id are replaceable through setters that validate first and reject
/// atomically. Selection entry points may be called from any thread.
pub struct RefreshRateSelector {
    catalog: ModeCatalog,
    config: SelectorConfig,
    known_rates: Vec<Fps>,
    state: Mutex<State>,
}

impl RefreshRateSelector {
    pub fn new(modes: Vec<DisplayMode>, current: ModeId) -> Result<Self, ArbiterError> {
        Self::with_config(modes, current, SelectorConfig::default())
    }

    pub fn with_config(
        modes: Vec<DisplayMode>,
        current: ModeId,
        config: SelectorConfig,
    ) -> Result<Self, ArbiterError> {
        let catalog = ModeCatalog::new(modes)?;
        if !catalog.contains(current) {
            return Err(ArbiterError::NotFound(format!(
                "initial mode {} is not in the catalog",
                current.0
            )));
        }

        let known_rates = scoring::build_known_rates(&catalog);
        let policy = Policy::unrestricted(current);
        let (primary_ids, app_ids) = build_ladders(&catalog, &policy);

        Ok(Self {
            catalog,
            config,
            known_rates,
            state: Mutex::new(State {
                policy,
                current_mode: current,
                primary_ids,
                app_ids,
                last_selection: None,
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether arbitration can change anything at all on this panel.
    pub fn can_switch(&self) -> bool {
        self.catalog.len() > 1
    }

    /// Replaces the stored policy. Validation failures leave the previous
    /// policy (and the cached selection's invalidation aside, all state)
    /// untouched.
    pub fn set_policy(&self, policy: Policy) -> Result<(), ArbiterError> {
        policy.validate(&self.catalog)?;

        let mut state = self.state();
        state.last_selection = None;
        if state.policy == policy {
            return Ok(());
        }

        info!(
            default_mode = policy.default_mode.0,
            primary = %policy.primary_range,
            app_request = %policy.app_request_range,
            group_switching = policy.allow_group_switching,
            "display policy replaced"
        );
        state.policy = policy;
        let (primary_ids, app_ids) = build_ladders(&self.catalog, &state.policy);
        state.primary_ids = primary_ids;
        state.app_ids = app_ids;
        Ok(())
    }

    /// Snapshot of the active policy.
    pub fn policy(&self) -> Policy {
        self.state().policy
    }

    /// Records the mode the display is actually running in.
    pub fn set_current_mode(&self, id: ModeId) -> Result<(), ArbiterError> {
        if !self.catalog.contains(id) {
            return Err(ArbiterError::NotFound(format!("mode {} is not in the catalog", id.0)));
        }
        let mut state = self.state();
        state.last_selection = None;
        state.current_mode = id;
        debug!(mode = id.0, "current mode changed");
        Ok(())
    }

    pub fn current_mode(&self) -> DisplayMode {
        let state = self.state();
        self.mode(state.current_mode).clone()
    }

    pub fn current_refresh_rate(&self) -> Fps {
        self.current_mode().fps()
    }

    /// Slowest mode the panel supports at all.
    pub fn min_supported(&self) -> DisplayMode {
        self.catalog.min_supported().clone()
    }

    /// Fastest mode the panel supports at all.
    pub fn max_supported(&self) -> DisplayMode {
        self.catalog.max_supported().clone()
    }

    /// Slowest policy-compatible mode, preferring the current mode group.
    pub fn min_refresh_rate_by_policy(&self) -> DisplayMode {
        let state = self.state();
        self.min_by_policy(&state).clone()
    }

    /// Fastest policy-compatible mode, preferring the current mode group.
    pub fn max_refresh_rate_by_policy(&self) -> DisplayMode {
        let state = self.state();
        let group = self.mode(state.current_mode).group();
        self.max_by_policy(&state, group).clone()
    }

    /// Picks the mode to drive next. Convenience for callers that do not
    /// care which signals were consulted.
    pub fn best_refresh_rate(
        &self,
        layers: &[LayerRequirement],
        signals: GlobalSignals,
    ) -> DisplayMode {
        self.select_refresh_rate(layers, signals).mode
    }

    /// Picks the mode to drive next and reports which of the global
    /// signals changed the outcome.
    ///
    /// Identical consecutive inputs are answered from a single-entry
    /// cache; any policy or current-mode change invalidates it.
    pub fn select_refresh_rate(
        &self,
        layers: &[LayerRequirement],
        signals: GlobalSignals,
    ) -> Selection {
        let mut state = self.state();

        if let Some(cached) = &state.last_selection {
            if cached.signals == signals && cached.layers == layers {
                trace!("selection served from cache");
                return Selection {
                    mode: self.mode(cached.mode).clone(),
                    considered: cached.considered,
                };
            }
        }

        let (mode_id, considered) = self.select(&state, layers, signals);
        state.last_selection = Some(CachedSelection {
            layers: layers.to_vec(),
            signals,
            mode: mode_id,
            considered,
        });

        let mode = self.mode(mode_id).clone();
        debug!(
            mode = mode_id.0,
            rate = %mode.fps(),
            touch = considered.touch,
            idle = considered.idle,
            layers = layers.len(),
            "selected refresh rate"
        );
        Selection { mode, considered }
    }

    /// Integer `k >= 1` such that `rate ~= display / k`, 0 if none.
    /// Fractional cinema pairs do not count as dividers.
    pub fn frame_rate_divider(display: Fps, rate: Fps) -> u32 {
        fps::frame_rate_divider(display, rate)
    }

    /// Whether two rates are linked by the NTSC 1000/1001 pull-down, up
    /// to an integer multiple.
    pub fn is_fractional_pair_or_multiple(a: Fps, b: Fps) -> bool {
        fps::is_fractional_pair_or_multiple(a, b)
    }

    fn mode(&self, id: ModeId) -> &DisplayMode {
        self.catalog.get(id).expect("ids in state always come from the catalog")
    }

    fn min_by_policy<'a>(&'a self, state: &State) -> &'a DisplayMode {
        let current_group = self.mode(state.current_mode).group();
        state
            .primary_ids
            .iter()
            .map(|id| self.mode(*id))
            .find(|m| m.group() == current_group)
            .unwrap_or_else(|| self.first_primary_or_default(state))
    }

    fn max_by_policy<'a>(&'a self, state: &State, anchor_group: u32) -> &'a DisplayMode {
        state
            .primary_ids
            .iter()
            .rev()
            .map(|id| self.mode(*id))
            .find(|m| m.group() == anchor_group)
            .unwrap_or_else(|| self.last_primary_or_default(state))
    }

    fn first_primary_or_default<'a>(&'a self, state: &State) -> &'a DisplayMode {
        state
            .primary_ids
            .first()
            .map(|id| self.mode(*id))
            .unwrap_or_else(|| self.mode(state.policy.default_mode))
    }

    fn last_primary_or_default<'a>(&'a self, state: &State) -> &'a DisplayMode {
        state
            .primary_ids
            .last()
            .map(|id| self.mode(*id))
            .unwrap_or_else(|| self.mode(state.policy.default_mode))
    }

    /// The kernel. Filters, scores and aggregates layer votes over the
    /// app-request ladder, then applies the touch/idle overlay with
    /// precedence touch > idle > votes.
    fn select(
        &self,
        state: &State,
        layers: &[LayerRequirement],
        signals: GlobalSignals,
    ) -> (ModeId, GlobalSignals) {
        let mut considered = GlobalSignals::default();

        let mut no_vote_layers = 0usize;
        let mut min_vote_layers = 0usize;
        let mut explicit_default_layers = 0usize;
        let mut explicit_exact_layers = 0usize;
        let mut explicit_exact_or_multiple_layers = 0usize;
        let mut seamed_focused_layers = 0usize;
        for layer in layers {
            match layer.vote {
                LayerVoteType::NoVote => no_vote_layers += 1,
                LayerVoteType::Min => min_vote_layers += 1,
                LayerVoteType::ExplicitDefault => explicit_default_layers += 1,
                LayerVoteType::ExplicitExact => explicit_exact_layers += 1,
                LayerVoteType::ExplicitExactOrMultiple => {
                    explicit_exact_or_multiple_layers += 1
                }
                LayerVoteType::Max | LayerVoteType::Heuristic => {}
            }
            if layer.seamlessness == Seamlessness::SeamedAndSeamless && layer.focused {
                seamed_focused_layers += 1;
            }
        }
        let has_explicit_layers = explicit_default_layers
            + explicit_exact_layers
            + explicit_exact_or_multiple_layers
            > 0;

        let current = self.mode(state.current_mode);
        let default_mode = self.mode(state.policy.default_mode);

        // With a focused seamed voter on screen, candidates anchor around
        // the current group to avoid ping-ponging across groups; once the
        // seamed voter is gone, anchor back on the default group.
        let anchor_group = if seamed_focused_layers > 0 {
            current.group()
        } else {
            default_mode.group()
        };

        // Touch with no explicit votes needs no scoring at all.
        if signals.touch && !has_explicit_layers {
            considered.touch = true;
            return (self.max_by_policy(state, anchor_group).id(), considered);
        }

        let primary_is_single_rate = state.policy.primary_range.is_single_rate();

        // Idle yields to touch, and to explicit votes when the policy has
        // pinned the primary range to one rate anyway.
        if !signals.touch
            && signals.idle
            && !(primary_is_single_rate && has_explicit_layers)
        {
            considered.idle = true;
            return (self.min_by_policy(state).id(), considered);
        }

        // No opinions means run as fast as policy allows.
        if layers.is_empty() || no_vote_layers == layers.len() {
            return (self.max_by_policy(state, anchor_group).id(), considered);
        }

        // Unanimous Min (ignoring abstentions) short-circuits likewise.
        if no_vote_layers + min_vote_layers == layers.len() {
            return (self.min_by_policy(state).id(), considered);
        }

        let max_app_fps = state
            .app_ids
            .last()
            .map(|id| self.mode(*id).fps())
            .unwrap_or_else(|| current.fps());

        let eligible = |layer: &LayerRequirement, mode: &DisplayMode| -> bool {
            let is_seamless = mode.is_seamless_with(current);
            match layer.seamlessness {
                Seamlessness::OnlySeamless if !is_seamless => return false,
                Seamlessness::SeamedAndSeamless if !is_seamless && !layer.focused => {
                    return false
                }
                Seamlessness::Default if mode.group() != anchor_group => return false,
                _ => {}
            }

            // Only focused ExplicitDefault/ExplicitExact votes may score
            // rates outside the primary range.
            let in_primary = state.policy.primary_range.includes(mode.fps());
            if (primary_is_single_rate || !in_primary)
                && !(layer.focused
                    && matches!(
                        layer.vote,
                        LayerVoteType::ExplicitDefault | LayerVoteType::ExplicitExact
                    ))
            {
                return false;
            }
            true
        };

        let mut scores: Vec<(ModeId, f32)> =
            state.app_ids.iter().map(|id| (*id, 0.0f32)).collect();

        for layer in layers {
            if matches!(layer.vote, LayerVoteType::NoVote | LayerVoteType::Min) {
                continue;
            }

            let target = if layer.vote == LayerVoteType::Heuristic {
                scoring::snap_to_known(&self.known_rates, layer.desired_refresh_rate)
            } else {
                layer.desired_refresh_rate
            };

            let exact_matching = if layer.vote == LayerVoteType::ExplicitExact {
                self.exact_matching_for(state, layer, target, &eligible)
            } else {
                ExactMatching::ExactPresent
            };

            for (id, score) in &mut scores {
                let mode = self.mode(*id);
                if !eligible(layer, mode) {
                    continue;
                }

                let ctx = ScoreContext {
                    mode_fps: mode.fps(),
                    is_seamless: mode.is_seamless_with(current),
                    max_app_fps,
                    multiple_threshold: self.config.frame_rate_multiple_threshold,
                    exact_matching,
                };
                let layer_score = scoring::layer_score(layer.vote, target, &ctx);
                if layer_score > 0.0 {
                    trace!(
                        layer = %layer.name,
                        mode = id.0,
                        score = layer_score,
                        "layer scored mode"
                    );
                }
                *score += layer.weight * layer_score;
            }
        }

        let best_id = self.pick_best(state, &scores);

        // A single-rate primary range that nothing scored means every
        // candidate came from the app range; stay on the policy rate.
        if primary_is_single_rate {
            if scores.iter().all(|(_, score)| *score == 0.0) {
                return (self.max_by_policy(state, anchor_group).id(), considered);
            }
            return (best_id, considered);
        }

        // Touch boost. ExplicitDefault votes are interactive already and
        // pin their choice; ExplicitExact suppresses the boost only when
        // nothing else is on screen that could use it (always, without
        // the override feature to throttle the exact layer later).
        let exact_suppresses_boost = if self.config.enable_frame_rate_override {
            explicit_exact_layers + no_vote_layers == layers.len()
        } else {
            explicit_exact_layers > 0
        };
        let touch_rate = self.max_by_policy(state, anchor_group);
        let best_fps = self.mode(best_id).fps();
        if signals.touch
            && explicit_default_layers == 0
            && !exact_suppresses_boost
            && best_fps.total_cmp(touch_rate.fps()).is_lt()
        {
            considered.touch = true;
            debug!(from = %best_fps, to = %touch_rate.fps(), "touch boost applied");
            return (touch_rate.id(), considered);
        }

        (best_id, considered)
    }

    /// Highest aggregate score wins; scores within [`TIE_EPSILON`] of the
    /// maximum tie-break by distance to the current rate, then higher
    /// rate, then lower mode id.
    fn pick_best(&self, state: &State, scores: &[(ModeId, f32)]) -> ModeId {
        let best_score = scores.iter().map(|(_, s)| *s).fold(0.0f32, f32::max);
        let current_hz = self.mode(state.current_mode).fps().hz();

        scores
            .iter()
            .filter(|(_, score)| score * (1.0 + TIE_EPSILON) >= best_score)
            .min_by(|(a, _), (b, _)| {
                let fps_a = self.mode(*a).fps().hz();
                let fps_b = self.mode(*b).fps().hz();
                let dist_a = (fps_a - current_hz).abs();
                let dist_b = (fps_b - current_hz).abs();
                dist_a
                    .total_cmp(&dist_b)
                    .then(fps_b.total_cmp(&fps_a))
                    .then(a.0.cmp(&b.0))
            })
            .map(|(id, _)| *id)
            .expect("app ladder is never empty under a valid policy")
    }

    fn exact_matching_for(
        &self,
        state: &State,
        layer: &LayerRequirement,
        target: Fps,
        eligible: &dyn Fn(&LayerRequirement, &DisplayMode) -> bool,
    ) -> ExactMatching {
        let mut pair_present = false;
        for id in &state.app_ids {
            let mode = self.mode(*id);
            if !eligible(layer, mode) {
                continue;
            }
            if mode.fps().approx_eq(target) {
                return ExactMatching::ExactPresent;
            }
            if fps::is_fractional_pair_or_multiple(mode.fps(), target) {
                pair_present = true;
            }
        }
        if pair_present {
            ExactMatching::PairPresent
        } else {
            ExactMatching::NoneAvailable
        }
    }

    /// Plans per-app rates below the chosen panel rate. Each override is
    /// `panel / k` for the integer `k >= 2` landing nearest the app's
    /// desired rate; owners whose layers disagree get none.
    pub fn frame_rate_overrides(
        &self,
        layers: &[LayerRequirement],
        panel: Fps,
        signals: GlobalSignals,
    ) -> Result<FrameRateOverrides, ArbiterError> {
        if !self.config.enable_frame_rate_override {
            return Err(ArbiterError::Unsupported(
                "frame rate overrides are disabled for this display".into(),
            ));
        }
        if !panel.is_valid() {
            return Ok(FrameRateOverrides::new());
        }

        let mut per_owner: HashMap<u32, Option<Fps>> = HashMap::new();
        for layer in layers {
            if !layer.vote.is_explicit() {
                continue;
            }
            // A touching user is about to need the full panel rate from
            // multiple-tolerant video layers; interactive Explicit
            // Default/Exact choices stand.
            if signals.touch && layer.vote == LayerVoteType::ExplicitExactOrMultiple {
                continue;
            }
            if !layer.desired_refresh_rate.is_valid()
                || !layer.desired_refresh_rate.approx_lt(panel)
            {
                continue;
            }

            let override_fps = nearest_divided_rate(panel, layer.desired_refresh_rate);
            per_owner
                .entry(layer.owner_uid)
                .and_modify(|slot| {
                    if slot.is_some_and(|existing| !existing.approx_eq(override_fps)) {
                        trace!(uid = layer.owner_uid, "conflicting override votes, dropping");
                        *slot = None;
                    }
                })
                .or_insert(Some(override_fps));
        }

        Ok(per_owner
            .into_iter()
            .filter_map(|(uid, slot)| slot.map(|fps| (uid, fps)))
            .collect())
    }

    /// Whether the host's kernel idle timer can do anything useful under
    /// the active policy.
    pub fn idle_timer_action(&self) -> IdleTimerAction {
        let state = self.state();
        let device_min = self.catalog.min_supported();
        let min_by_policy = self.min_by_policy(&state);
        let current_group = self.mode(state.current_mode).group();
        let max_by_policy = self.max_by_policy(&state, current_group);

        // The timer drops to the device minimum; pointless or harmful
        // when policy already floors us above it.
        if device_min.fps().total_cmp(min_by_policy.fps()).is_lt() {
            return IdleTimerAction::TurnOff;
        }
        if min_by_policy.id() == max_by_policy.id() {
            if state.policy.primary_range.min.total_cmp(device_min.fps()).is_lt() {
                return IdleTimerAction::TurnOn;
            }
            return IdleTimerAction::TurnOff;
        }
        IdleTimerAction::TurnOn
    }
}

/// Candidate ladders under a policy: catalog ids with the default mode's
/// resolution (and group, unless switching is allowed) within the primary
/// and app-request ranges respectively, ascending by rate.
fn build_ladders(catalog: &ModeCatalog, policy: &Policy) -> (Vec<ModeId>, Vec<ModeId>) {
    let default_mode = catalog
        .get(policy.default_mode)
        .expect("policy was validated against this catalog");

    let ladder = |range: fps::FpsRange| {
        catalog.sorted_ids_by_fps(|m| {
            m.resolution() == default_mode.resolution()
                && (policy.allow_group_switching || m.group() == default_mode.group())
                && range.includes(m.fps())
        })
    };

    (ladder(policy.primary_range), ladder(policy.app_request_range))
}

/// `panel / k` for the integer `k >= 2` minimizing the distance to
/// `desired`. The distance is unimodal in k, so only the two integers
/// around `panel / desired` matter.
fn nearest_divided_rate(panel: Fps, desired: Fps) -> Fps {
    let ratio = panel.hz() / desired.hz();
    let lower_k = (ratio.floor() as u32).clamp(2, u32::MAX - 1);
    let distance = |k: u32| (panel.hz() / k as f32 - desired.hz()).abs();
    let best_k = if distance(lower_k + 1) < distance(lower_k) { lower_k + 1 } else { lower_k };
    Fps::from_hz(panel.hz() / best_k as f32)
}
