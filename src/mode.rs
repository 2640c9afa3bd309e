//! Hardware display modes and the immutable per-display catalog.

use serde::{Deserialize, Serialize};

use crate::error::ArbiterError;
use crate::fps::Fps;

/// Identifier of a mode within one display's catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModeId(pub u32);

/// Panel resolution in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// One panel-supported configuration: refresh rate, mode group and
/// resolution. Modes in the same group with the same resolution can be
/// switched between without a visible glitch; anything else is a seamed
/// switch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DisplayMode {
    id: ModeId,
    hw_config_id: u32,
    fps: Fps,
    group: u32,
    resolution: Resolution,
}

impl DisplayMode {
    /// Mode in group 0 with an unspecified resolution; the hardware
    /// config id defaults to the mode id.
    pub fn new(id: ModeId, fps: Fps) -> Self {
        Self { id, hw_config_id: id.0, fps, group: 0, resolution: Resolution::default() }
    }

    pub fn with_group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution { width, height };
        self
    }

    pub fn with_hw_config_id(mut self, hw_config_id: u32) -> Self {
        self.hw_config_id = hw_config_id;
        self
    }

    pub fn id(&self) -> ModeId {
        self.id
    }

    pub fn hw_config_id(&self) -> u32 {
        self.hw_config_id
    }

    pub fn fps(&self) -> Fps {
        self.fps
    }

    pub fn group(&self) -> u32 {
        self.group
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Switching between two modes is seamless iff they share both group
    /// and resolution.
    pub fn is_seamless_with(&self, other: &DisplayMode) -> bool {
        self.group == other.group && self.resolution == other.resolution
    }
}

/// The fixed set of modes one display exposes. Non-empty, ids unique,
/// min/max supported rates computed once at construction.
#[derive(Clone, Debug)]
pub struct ModeCatalog {
    modes: Vec<DisplayMode>,
    min_supported: ModeId,
    max_supported: ModeId,
}

impl ModeCatalog {
    pub fn new(modes: Vec<DisplayMode>) -> Result<Self, ArbiterError> {
        if modes.is_empty() {
            return Err(ArbiterError::NotFound("catalog contains no modes".into()));
        }
        for (i, mode) in modes.iter().enumerate() {
            if modes[..i].iter().any(|m| m.id() == mode.id()) {
                return Err(ArbiterError::NotFound(format!(
                    "duplicate mode id {} in catalog",
                    mode.id().0
                )));
            }
        }

        let min_supported = modes
            .iter()
            .min_by(|a, b| a.fps().total_cmp(b.fps()))
            .map(DisplayMode::id)
            .expect("catalog is non-empty");
        let max_supported = modes
            .iter()
            .max_by(|a, b| a.fps().total_cmp(b.fps()))
            .map(DisplayMode::id)
            .expect("catalog is non-empty");

        Ok(Self { modes, min_supported, max_supported })
    }

    pub fn get(&self, id: ModeId) -> Option<&DisplayMode> {
        self.modes.iter().find(|m| m.id() == id)
    }

    pub fn contains(&self, id: ModeId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayMode> {
        self.modes.iter()
    }

    /// Lowest-rate mode the panel supports at all.
    pub fn min_supported(&self) -> &DisplayMode {
        self.get(self.min_supported).expect("min id computed from catalog")
    }

    /// Highest-rate mode the panel supports at all.
    pub fn max_supported(&self) -> &DisplayMode {
        self.get(self.max_supported).expect("max id computed from catalog")
    }

    /// Ids of all modes sorted ascending by refresh rate, filtered by
    /// `keep`. Ties keep catalog order.
    pub fn sorted_ids_by_fps(&self, keep: impl Fn(&DisplayMode) -> bool) -> Vec<ModeId> {
        let mut ids: Vec<ModeId> =
            self.modes.iter().filter(|m| keep(m)).map(DisplayMode::id).collect();
        ids.sort_by(|a, b| {
            let fa = self.get(*a).expect("filtered from catalog").fps();
            let fb = self.get(*b).expect("filtered from catalog").fps();
            fa.total_cmp(fb)
        });
        ids
    }
}
