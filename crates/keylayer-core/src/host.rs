//! The host collaborator contract.
//!
//! The controller never owns the keymap, the surfaces, the settings or the
//! timers. It reaches them through the traits in this module, which an
//! embedding editor implements. [`testing::TestHost`](crate::testing::TestHost)
//! is an in-memory implementation.

use crate::binding::{BindingOptions, Mapping};
use crate::error::HostError;
use crate::trigger::Trigger;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// A host-managed content container (a buffer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(pub u64);

/// A host-managed viewport (a window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u64);

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Association namespace in the host binding registry.
///
/// A surface-local association always wins over a global one when the host
/// resolves a trigger. `Global` orders first so restores replay it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// Applies everywhere unless overridden.
    Global,
    /// Applies to one surface only.
    Surface(SurfaceId),
}

/// Handle of a repeating timer created through [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(pub u64);

/// Handle of a focus-change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

/// A setting value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// String.
    Str(String),
}

impl From<bool> for SettingValue {
    fn from(v: bool) -> Self {
        SettingValue::Bool(v)
    }
}

impl From<i64> for SettingValue {
    fn from(v: i64) -> Self {
        SettingValue::Int(v)
    }
}

impl From<&str> for SettingValue {
    fn from(v: &str) -> Self {
        SettingValue::Str(v.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(v: String) -> Self {
        SettingValue::Str(v)
    }
}

/// Where a setting lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingTarget {
    /// Local to one surface.
    Surface(SurfaceId),
    /// Local to one view.
    View(ViewId),
    /// The general global value (may also affect the current local value,
    /// at the host's discretion).
    Global,
    /// The global value only.
    GlobalOnly,
}

/// A warning for the user, emitted for recoverable anomalies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Human-readable text.
    pub message: String,
}

impl Notice {
    /// Create a notice.
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The host's keymap.
pub trait BindingRegistry {
    /// The association for `trigger` in `scope`, if any.
    fn get(&self, scope: Scope, trigger: &Trigger) -> Result<Option<Mapping>, HostError>;
    /// Install or overwrite an association.
    fn set(&mut self, scope: Scope, trigger: &Trigger, mapping: Mapping) -> Result<(), HostError>;
    /// Remove an association; removing a missing one is not an error.
    fn remove(&mut self, scope: Scope, trigger: &Trigger) -> Result<(), HostError>;
    /// Every association in `scope`.
    fn list(&self, scope: Scope) -> Result<Vec<(Trigger, Mapping)>, HostError>;
}

/// The host's surfaces and views.
pub trait SurfaceRegistry {
    /// The surface that currently has focus.
    fn current_surface(&self) -> SurfaceId;
    /// The view that currently has focus.
    fn current_view(&self) -> ViewId;
    /// Surfaces that are still open.
    fn live_surfaces(&self) -> BTreeSet<SurfaceId>;
    /// Views that are still open.
    fn live_views(&self) -> BTreeSet<ViewId>;
    /// Ask the host to report focus changes as
    /// [`HostEvent::Focus`](crate::controller::HostEvent::Focus).
    fn subscribe_focus(&mut self) -> SubscriptionHandle;
    /// Stop reporting focus changes for `handle`.
    fn unsubscribe(&mut self, handle: SubscriptionHandle);
}

/// The host's per-surface, per-view and global settings.
pub trait SettingsStore {
    /// Current value, `None` when unset.
    fn get_setting(&self, target: SettingTarget, name: &str)
        -> Result<Option<SettingValue>, HostError>;
    /// Set a value.
    fn set_setting(
        &mut self,
        target: SettingTarget,
        name: &str,
        value: SettingValue,
    ) -> Result<(), HostError>;
    /// Return a setting to its unset state.
    fn clear_setting(&mut self, target: SettingTarget, name: &str) -> Result<(), HostError>;
}

/// A repeatable, resettable timer source.
///
/// Expiry is reported back as
/// [`HostEvent::TimerFired`](crate::controller::HostEvent::TimerFired) on the
/// thread that drives the controller.
pub trait Scheduler {
    /// Start a timer that fires every `interval`.
    fn start_repeating(&mut self, interval: Duration) -> TimerHandle;
    /// Restart the countdown of `handle` without firing.
    ///
    /// Returns the handle the restarted timer fires under. Ticks already
    /// delivered for the old handle must not match the new one.
    fn reset(&mut self, handle: TimerHandle) -> TimerHandle;
    /// Stop and release `handle`.
    fn cancel(&mut self, handle: TimerHandle);
}

/// Everything the controller needs from its embedding editor.
pub trait Host: BindingRegistry + SurfaceRegistry + SettingsStore + Scheduler {
    /// Run a host command.
    fn execute(&mut self, command: &str, options: &BindingOptions) -> Result<(), HostError>;

    /// Feed a trigger to the host as if nothing were mapped to it.
    fn feed(&mut self, trigger: &Trigger) -> Result<(), HostError>;

    /// Surface a warning to the user.
    fn notify(&mut self, notice: Notice) {
        let _ = notice;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_scope_orders_first() {
        let mut scopes = vec![
            Scope::Surface(SurfaceId(2)),
            Scope::Global,
            Scope::Surface(SurfaceId(1)),
        ];
        scopes.sort();
        assert_eq!(
            scopes,
            vec![
                Scope::Global,
                Scope::Surface(SurfaceId(1)),
                Scope::Surface(SurfaceId(2))
            ]
        );
    }

    #[test]
    fn setting_values_deserialize_untagged() {
        let v: Vec<SettingValue> = serde_json::from_str(r#"[true, 4, "x"]"#).unwrap();
        assert_eq!(
            v,
            vec![SettingValue::Bool(true), SettingValue::Int(4), "x".into()]
        );
    }
}
