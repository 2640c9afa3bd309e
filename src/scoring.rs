//! Per-layer, per-mode score rules for the arbitration kernel.
//!
//! Everything here is pure math over periods and rates; the selector owns
//! eligibility filtering and aggregation. Scores live in [0, 1] and peak
//! when a mode's cadence fits the layer's desired rate exactly.

use crate::fps::{frame_rate_divider, is_fractional_pair_or_multiple, Fps, FPS_EPSILON};
use crate::layer::LayerVoteType;
use crate::mode::ModeCatalog;

/// Slack applied to period arithmetic so near-multiples (e.g. 53 Hz
/// content on a 55 Hz panel) register as a fit.
pub(crate) const PERIOD_MARGIN_NS: i64 = 800_000;

/// Score multiplier for a mode reachable only through a seamed switch.
const SEAMED_SWITCH_PENALTY: f32 = 0.95;

/// Score multiplier when the rates are not linked by an integer divider.
const NON_EXACT_PENALTY: f32 = 0.95;

/// Score for a fractional cinema pair (23.976 content on a 24 Hz panel).
const FRACTIONAL_PAIR_SCORE: f32 = 0.8;

/// Cadence-fit iteration cap; past this the score would drop below 0.1.
const MAX_FRAMES_TO_FIT: i64 = 10;

/// Base ladder of commonly rendered frame rates, in Hz.
const KNOWN_FRAME_RATES: [f32; 6] = [24.0, 30.0, 45.0, 60.0, 72.0, 90.0];

/// The known-rate ladder for a catalog: the base ladder united with the
/// catalog's own rates, sorted and deduplicated. Heuristic votes snap
/// onto this before scoring.
pub(crate) fn build_known_rates(catalog: &ModeCatalog) -> Vec<Fps> {
    let mut rates: Vec<Fps> = KNOWN_FRAME_RATES.iter().map(|&hz| Fps::from_hz(hz)).collect();
    rates.extend(catalog.iter().map(|m| m.fps()));
    rates.sort_by(|a, b| a.total_cmp(*b));
    rates.dedup_by(|a, b| a.approx_eq(*b));
    rates
}

/// Ladder entry closest to `fps`; ties break to the lower entry.
pub(crate) fn snap_to_known(rates: &[Fps], fps: Fps) -> Fps {
    let mut best = rates[0];
    let mut best_distance = (rates[0].hz() - fps.hz()).abs();
    for &rate in &rates[1..] {
        let distance = (rate.hz() - fps.hz()).abs();
        if distance < best_distance {
            best = rate;
            best_distance = distance;
        }
    }
    best
}

/// What an `ExplicitExact` layer can hope for among its eligible modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExactMatching {
    /// The requested rate itself is available; nothing else scores.
    ExactPresent,
    /// Only a fractional cinema pair of the request is available.
    PairPresent,
    /// Neither; the vote degrades to exact-or-multiple.
    NoneAvailable,
}

/// Everything about the candidate mode a single score needs.
pub(crate) struct ScoreContext {
    pub mode_fps: Fps,
    /// Switching to this mode from the current one is seamless.
    pub is_seamless: bool,
    /// Highest rate in the app-request ladder (for `Max` scoring).
    pub max_app_fps: Fps,
    /// `frame_rate_multiple_threshold` from the construction config.
    pub multiple_threshold: u32,
    /// Availability of the target among this layer's eligible modes
    /// (only consulted for `ExplicitExact`).
    pub exact_matching: ExactMatching,
}

/// Score of one layer's vote against one candidate mode. `target` is the
/// layer's desired rate, already snapped for Heuristic votes.
pub(crate) fn layer_score(vote: LayerVoteType, target: Fps, ctx: &ScoreContext) -> f32 {
    if !multiple_vote_allowed(vote, target, ctx.mode_fps, ctx.multiple_threshold) {
        return 0.0;
    }

    let seamless_factor = if ctx.is_seamless { 1.0 } else { SEAMED_SWITCH_PENALTY };

    match vote {
        LayerVoteType::NoVote | LayerVoteType::Min => 0.0,

        // Quadratic falloff from the ladder peak.
        LayerVoteType::Max => {
            let ratio = ctx.mode_fps.hz() / ctx.max_app_fps.hz();
            ratio * ratio
        }

        LayerVoteType::ExplicitExact => match ctx.exact_matching {
            ExactMatching::ExactPresent => {
                if ctx.mode_fps.approx_eq(target) {
                    1.0
                } else {
                    0.0
                }
            }
            ExactMatching::PairPresent => {
                if is_fractional_pair_or_multiple(ctx.mode_fps, target) {
                    1.0
                } else {
                    0.0
                }
            }
            // The rate is absent in any form; fall back to treating the
            // vote as exact-or-multiple.
            ExactMatching::NoneAvailable => {
                exact_or_multiple_score(target, ctx, seamless_factor)
            }
        },

        LayerVoteType::ExplicitDefault => {
            if frame_rate_divider(ctx.mode_fps, target) > 0 {
                return seamless_factor;
            }
            period_fit_score(target, ctx.mode_fps) * seamless_factor * NON_EXACT_PENALTY
        }

        LayerVoteType::Heuristic | LayerVoteType::ExplicitExactOrMultiple => {
            exact_or_multiple_score(target, ctx, seamless_factor)
        }
    }
}

fn exact_or_multiple_score(target: Fps, ctx: &ScoreContext, seamless_factor: f32) -> f32 {
    if frame_rate_divider(ctx.mode_fps, target) > 0 {
        return seamless_factor;
    }
    if is_fractional_pair_or_multiple(ctx.mode_fps, target) {
        return FRACTIONAL_PAIR_SCORE * seamless_factor * NON_EXACT_PENALTY;
    }
    cadence_score(target.period_ns(), ctx.mode_fps.period_ns())
        * seamless_factor
        * NON_EXACT_PENALTY
}

/// Gate for the multiple-seeking votes: with a nonzero threshold, modes at
/// or above it are off-limits to layers rendering below half of it, so a
/// 24 fps video cannot pull the panel to 120 Hz just because 120 = 5 * 24.
fn multiple_vote_allowed(vote: LayerVoteType, desired: Fps, mode_fps: Fps, threshold: u32) -> bool {
    if threshold == 0 {
        return true;
    }
    if !matches!(vote, LayerVoteType::Heuristic | LayerVoteType::ExplicitExactOrMultiple) {
        return true;
    }
    let threshold_hz = threshold as f32;
    let mode_at_or_past_threshold = mode_fps.hz() + FPS_EPSILON >= threshold_hz;
    let desired_below_half = desired.approx_lt(Fps::from_hz(threshold_hz / 2.0));
    !(mode_at_or_past_threshold && desired_below_half)
}

/// How many display vsyncs one layer frame spans, rounding a remainder
/// within the period margin (either side) away.
fn display_frames(layer_period: i64, display_period: i64) -> (i64, i64) {
    let mut quotient = layer_period / display_period;
    let mut remainder = layer_period % display_period;
    if remainder <= PERIOD_MARGIN_NS || (remainder - display_period).abs() <= PERIOD_MARGIN_NS {
        quotient += 1;
        remainder = 0;
    }
    (quotient, remainder)
}

/// Fit of a repeating cadence: 1.0 for a whole number of vsyncs per
/// frame, decaying with how quickly the presentation drifts otherwise.
fn cadence_score(layer_period: i64, display_period: i64) -> f32 {
    let (quotient, remainder) = display_frames(layer_period, display_period);
    if remainder == 0 {
        return 1.0;
    }
    if quotient == 0 {
        // Layer wants to render faster than the display scans out.
        return (layer_period as f32 / display_period as f32)
            * (1.0 / (MAX_FRAMES_TO_FIT as f32 + 1.0));
    }

    let mut diff = (remainder - (display_period - remainder)).abs();
    let mut iterations = 2;
    while diff > PERIOD_MARGIN_NS && iterations < MAX_FRAMES_TO_FIT {
        diff -= display_period - diff;
        iterations += 1;
    }
    1.0 / iterations as f32
}

/// ExplicitDefault fallback: the rate the layer would actually render at
/// on this mode, assuming its period is the minimum it needs per frame.
/// A 20 ms layer on a 16 ms panel lands on every second vsync.
fn period_fit_score(target: Fps, mode_fps: Fps) -> f32 {
    let layer_period = target.period_ns();
    let display_period = mode_fps.period_ns();
    let mut fitted_period = display_period;
    let mut multiplier = 1;
    while layer_period > fitted_period + PERIOD_MARGIN_NS {
        multiplier += 1;
        fitted_period = display_period * multiplier;
    }
    (layer_period as f32 / fitted_period as f32).min(1.0)
}
