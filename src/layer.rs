//! Per-frame layer requirements and global signals.
//!
//! A [`LayerRequirement`] is one surface's opinion about the refresh
//! cadence that suits it for the next composition cycle. Requirements are
//! transient inputs; the selector never retains them beyond its
//! single-entry result cache.

use serde::{Deserialize, Serialize};

use crate::fps::Fps;

/// The kind of vote a layer casts.
///
/// A closed set on purpose: the scoring comparator has to see every
/// variant to stay totally ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerVoteType {
    /// The layer abstains entirely.
    #[default]
    NoVote,
    /// Vote for the lowest eligible refresh rate.
    Min,
    /// Vote for the highest eligible refresh rate.
    Max,
    /// A measured (noisy) rate; snapped to the known-rate ladder before
    /// scoring.
    Heuristic,
    /// An app-specified default frame rate; prefers the nearest rate
    /// meeting or exceeding the request.
    ExplicitDefault,
    /// An app-specified rate that is also satisfied by integer multiples
    /// (video content on a faster panel).
    ExplicitExactOrMultiple,
    /// An app-specified rate that only the exact rate (or its fractional
    /// cinema pair) satisfies.
    ExplicitExact,
}

impl LayerVoteType {
    /// Whether this vote carries an app-specified rate.
    pub fn is_explicit(self) -> bool {
        matches!(
            self,
            Self::ExplicitDefault | Self::ExplicitExactOrMultiple | Self::ExplicitExact
        )
    }
}

/// How a layer feels about visible mode-switch glitches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Seamlessness {
    /// Follow the seamed/seamless behavior of the rest of the scene.
    #[default]
    Default,
    /// Never accept a seamed switch on this layer's behalf.
    OnlySeamless,
    /// Seamed switches are acceptable; when focused this can pull the
    /// panel into another mode group.
    SeamedAndSeamless,
}

/// One surface's requirement for the next frame.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LayerRequirement {
    /// Diagnostic name, not part of the vote.
    pub name: String,
    /// Identifies the owning app for frame-rate overrides.
    pub owner_uid: u32,
    pub vote: LayerVoteType,
    /// Meaningful for `Heuristic` and the `Explicit*` votes.
    pub desired_refresh_rate: Fps,
    pub seamlessness: Seamlessness,
    /// Relative importance in (0, 1].
    pub weight: f32,
    /// Whether the layer belongs to the focused window.
    pub focused: bool,
}

impl PartialEq for LayerRequirement {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.owner_uid == other.owner_uid
            && self.vote == other.vote
            && self.desired_refresh_rate.approx_eq(other.desired_refresh_rate)
            && self.seamlessness == other.seamlessness
            && self.weight == other.weight
            && self.focused == other.focused
    }
}

/// Display-wide signals arbitrated alongside the layer votes.
///
/// Also used as the "considered" mask reported back from a selection:
/// a flag is set there only if the signal actually changed the outcome.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalSignals {
    /// The user is interacting with the display.
    pub touch: bool,
    /// Nothing has changed on screen for a while.
    pub idle: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requirement_equality_tolerates_fps_noise() {
        let a = LayerRequirement {
            name: "video".into(),
            vote: LayerVoteType::ExplicitExactOrMultiple,
            desired_refresh_rate: Fps::from_hz(60.0),
            weight: 1.0,
            ..Default::default()
        };
        let mut b = a.clone();
        b.desired_refresh_rate = Fps::from_hz(60.0004);
        assert_eq!(a, b);

        b.desired_refresh_rate = Fps::from_hz(59.94);
        assert_ne!(a, b);

        let mut c = a.clone();
        c.focused = true;
        assert_ne!(a, c);
    }

    #[test]
    fn test_explicit_classification() {
        assert!(LayerVoteType::ExplicitDefault.is_explicit());
        assert!(LayerVoteType::ExplicitExactOrMultiple.is_explicit());
        assert!(LayerVoteType::ExplicitExact.is_explicit());
        assert!(!LayerVoteType::Heuristic.is_explicit());
        assert!(!LayerVoteType::Max.is_explicit());
        assert!(!LayerVoteType::NoVote.is_explicit());
    }
}
