//! Refresh-rate arbitration core for display compositors.
//!
//! Given the hardware modes a panel exposes, a platform policy, and
//! per-frame layer votes plus global touch/idle signals, the
//! [`RefreshRateSelector`] picks the single best refresh rate for the next
//! composition cycle and, optionally, per-app frame-rate overrides below
//! the chosen panel rate.
//!
//! The crate is a pure library: no I/O, no background tasks, no global
//! state. One selector instance serves one logical display; its entry
//! points are safe to call from any thread.
//!
//! ```
//! use refresh_arbiter::{
//!     DisplayMode, Fps, GlobalSignals, LayerRequirement, LayerVoteType, ModeId,
//!     RefreshRateSelector,
//! };
//!
//! let selector = RefreshRateSelector::new(
//!     vec![
//!         DisplayMode::new(ModeId(0), Fps::from_hz(60.0)),
//!         DisplayMode::new(ModeId(1), Fps::from_hz(90.0)),
//!     ],
//!     ModeId(0),
//! )
//! .unwrap();
//!
//! let video = LayerRequirement {
//!     name: "video".into(),
//!     vote: LayerVoteType::ExplicitExactOrMultiple,
//!     desired_refresh_rate: Fps::from_hz(30.0),
//!     weight: 1.0,
//!     ..Default::default()
//! };
//! let mode = selector.best_refresh_rate(&[video], GlobalSignals::default());
//! assert_eq!(mode.fps().int_hz(), 60);
//! ```

mod error;
mod fps;
mod layer;
mod mode;
mod policy;
mod scoring;
mod selector;

pub use error::ArbiterError;
pub use fps::{frame_rate_divider, is_fractional_pair_or_multiple, Fps, FpsRange, FPS_EPSILON};
pub use layer::{GlobalSignals, LayerRequirement, LayerVoteType, Seamlessness};
pub use mode::{DisplayMode, ModeCatalog, ModeId, Resolution};
pub use policy::Policy;
pub use selector::{
    FrameRateOverrides, IdleTimerAction, RefreshRateSelector, Selection, SelectorConfig,
};
