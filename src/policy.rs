//! Validated arbitration policy.
//!
//! The policy is what the platform's display manager hands down: the
//! default mode, the preferred ("primary") rate band, the wider band
//! explicit app votes may reach into, and whether seamed group switches
//! are on the table. Ingress parsing lives outside the core; only the
//! validated in-memory form is modeled here.

use serde::{Deserialize, Serialize};

use crate::error::ArbiterError;
use crate::fps::FpsRange;
use crate::mode::{ModeCatalog, ModeId};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Mode the display falls back to; must exist in the catalog and lie
    /// inside `primary_range`.
    pub default_mode: ModeId,
    /// Whether arbitration may switch mode groups (a visible glitch).
    pub allow_group_switching: bool,
    /// The preferred rate envelope; arbitration stays inside it unless a
    /// focused layer explicitly opts out.
    pub primary_range: FpsRange,
    /// Superset of `primary_range` that explicit app votes may reach.
    pub app_request_range: FpsRange,
}

impl Policy {
    pub fn new(
        default_mode: ModeId,
        primary_range: FpsRange,
        app_request_range: FpsRange,
    ) -> Self {
        Self { default_mode, allow_group_switching: false, primary_range, app_request_range }
    }

    /// Policy with a single band serving as both primary and app range.
    pub fn with_range(default_mode: ModeId, range: FpsRange) -> Self {
        Self::new(default_mode, range, range)
    }

    /// The construction-time policy: anchored on the initial mode, both
    /// bands unbounded, group switching off.
    pub fn unrestricted(default_mode: ModeId) -> Self {
        Self::with_range(default_mode, FpsRange::unbounded())
    }

    pub fn allowing_group_switching(mut self) -> Self {
        self.allow_group_switching = true;
        self
    }

    /// Checks this policy against a catalog. The default mode must exist
    /// and fall inside the primary range (which also guarantees at least
    /// one primary-range mode), and the app range must contain the
    /// primary range.
    pub fn validate(&self, catalog: &ModeCatalog) -> Result<(), ArbiterError> {
        let default_mode = catalog.get(self.default_mode).ok_or_else(|| {
            ArbiterError::InvalidPolicy(format!(
                "default mode {} is not in the catalog",
                self.default_mode.0
            ))
        })?;

        if !self.primary_range.includes(default_mode.fps()) {
            return Err(ArbiterError::InvalidPolicy(format!(
                "default mode {} at {} is outside the primary range {}",
                self.default_mode.0,
                default_mode.fps(),
                self.primary_range
            )));
        }

        if !self.app_request_range.contains_range(&self.primary_range) {
            return Err(ArbiterError::InvalidPolicy(format!(
                "app request range {} does not contain the primary range {}",
                self.app_request_range, self.primary_range
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fps::Fps;
    use crate::mode::DisplayMode;

    fn hz(v: f32) -> Fps {
        Fps::from_hz(v)
    }

    fn catalog_60_90() -> ModeCatalog {
        ModeCatalog::new(vec![
            DisplayMode::new(ModeId(0), hz(60.0)),
            DisplayMode::new(ModeId(1), hz(90.0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_unknown_default_mode_rejected() {
        let policy = Policy::with_range(ModeId(10), FpsRange::new(hz(60.0), hz(60.0)));
        assert!(matches!(
            policy.validate(&catalog_60_90()),
            Err(ArbiterError::InvalidPolicy(_))
        ));
    }

    #[test]
    fn test_default_mode_outside_primary_range_rejected() {
        let policy = Policy::with_range(ModeId(0), FpsRange::new(hz(20.0), hz(40.0)));
        assert!(policy.validate(&catalog_60_90()).is_err());
    }

    #[test]
    fn test_app_range_must_contain_primary_range() {
        let policy = Policy::new(
            ModeId(0),
            FpsRange::new(hz(60.0), hz(90.0)),
            FpsRange::new(hz(60.0), hz(72.0)),
        );
        assert!(policy.validate(&catalog_60_90()).is_err());
    }

    #[test]
    fn test_valid_policies_accepted() {
        let catalog = catalog_60_90();
        assert!(Policy::unrestricted(ModeId(0)).validate(&catalog).is_ok());
        assert!(Policy::with_range(ModeId(0), FpsRange::new(hz(60.0), hz(60.0)))
            .validate(&catalog)
            .is_ok());
        assert!(Policy::new(
            ModeId(1),
            FpsRange::new(hz(90.0), hz(90.0)),
            FpsRange::new(hz(60.0), hz(90.0)),
        )
        .validate(&catalog)
        .is_ok());
    }

    #[test]
    fn test_policy_serde_round_trip() {
        let policy = Policy::new(
            ModeId(1),
            FpsRange::new(hz(60.0), hz(90.0)),
            FpsRange::new(hz(30.0), hz(120.0)),
        )
        .allowing_group_switching();

        let json = serde_json::to_string(&policy).unwrap();
        let back: Policy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, policy);
    }
}
