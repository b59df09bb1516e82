//! The overlay aggregate: identity, canonical bindings, configuration and
//! the per-activation session.

use crate::context::HookCx;
use crate::decl::OverlayDecl;
use crate::error::ValidationError;
use crate::host::{SubscriptionHandle, SurfaceId};
use crate::normalize::{normalize, BindingTable};
use crate::shadow::ShadowStore;
use crate::snapshot::SnapshotStore;
use crate::timeout::TimeoutController;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_OVERLAY_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque, monotonic overlay identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OverlayId(pub u64);

impl OverlayId {
    fn next() -> Self {
        Self(NEXT_OVERLAY_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lifecycle hook.
pub type Hook = Rc<dyn Fn(&mut HookCx<'_>)>;

/// Where overlay bindings are written in the host registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallScope {
    /// Surface-local on every surface visited while active.
    #[default]
    Surface,
    /// Once in the global scope; surface-local overrides of overlay triggers
    /// are shadowed as they are encountered.
    Global,
}

/// Overlay configuration.
///
/// Fields have usable defaults; override what you need with struct update
/// syntax or the builder methods:
///
/// ```
/// use keylayer_core::overlay::{InstallScope, OverlayConfig};
/// use std::time::Duration;
///
/// let config = OverlayConfig {
///     timeout: Some(Duration::from_secs(2)),
///     ..OverlayConfig::default()
/// }
/// .with_install_scope(InstallScope::Global);
/// assert_eq!(config.install_scope, InstallScope::Global);
/// ```
#[derive(Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayConfig {
    /// Run in order on activation, with option shadowing enabled.
    #[serde(skip)]
    pub on_enter: Vec<Hook>,
    /// Run in order on deactivation, with option shadowing disabled.
    #[serde(skip)]
    pub on_exit: Vec<Hook>,
    /// Idle time after which the overlay deactivates itself.
    #[serde(default, rename = "timeout_ms", deserialize_with = "timeout_from_millis")]
    pub timeout: Option<Duration>,
    /// Where overlay bindings are installed.
    ///
    /// The default writes surface-local associations and leaves the global
    /// registry untouched. Choose [`InstallScope::Global`] when the global
    /// entry for an overlay trigger must itself point at the overlay while
    /// it is active, e.g. `n l` resolving to the overlay from any lookup.
    #[serde(default)]
    pub install_scope: InstallScope,
}

impl OverlayConfig {
    /// Append an enter hook.
    pub fn on_enter(mut self, hook: impl Fn(&mut HookCx<'_>) + 'static) -> Self {
        self.on_enter.push(Rc::new(hook));
        self
    }

    /// Append an exit hook.
    pub fn on_exit(mut self, hook: impl Fn(&mut HookCx<'_>) + 'static) -> Self {
        self.on_exit.push(Rc::new(hook));
        self
    }

    /// Set the idle timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the install scope.
    pub fn with_install_scope(mut self, scope: InstallScope) -> Self {
        self.install_scope = scope;
        self
    }
}

impl fmt::Debug for OverlayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayConfig")
            .field("on_enter", &self.on_enter.len())
            .field("on_exit", &self.on_exit.len())
            .field("timeout", &self.timeout)
            .field("install_scope", &self.install_scope)
            .finish()
    }
}

fn timeout_from_millis<'de, D>(de: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(de)?.map(Duration::from_millis))
}

/// Public view of an overlay's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayState {
    /// Not shadowing anything.
    Inactive,
    /// Bindings installed, hooks run.
    Active,
}

/// Everything that exists only while an overlay is active.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) snapshot: SnapshotStore,
    pub(crate) shadows: ShadowStore,
    pub(crate) timeout: TimeoutController,
    pub(crate) focus: Option<SubscriptionHandle>,
    pub(crate) visited: BTreeSet<SurfaceId>,
}

#[derive(Debug)]
pub(crate) enum State {
    Inactive,
    Active(Box<Session>),
}

/// A temporary binding overlay.
///
/// Built once from an [`OverlayDecl`]; normalization happens here, so an
/// `Overlay` value always carries a valid [`BindingTable`]. Register it with
/// a [`Controller`](crate::controller::Controller) to toggle it.
#[derive(Debug)]
pub struct Overlay {
    id: OverlayId,
    name: Option<String>,
    table: BindingTable,
    config: OverlayConfig,
    pub(crate) state: State,
    pub(crate) entrance: Option<SnapshotStore>,
}

impl Overlay {
    /// Validate `decl` and build an inactive overlay.
    pub fn new(decl: OverlayDecl) -> Result<Self, ValidationError> {
        let table = normalize(&decl)?;
        Ok(Self {
            id: OverlayId::next(),
            name: decl.name,
            table,
            config: decl.config,
            state: State::Inactive,
            entrance: None,
        })
    }

    /// Identity.
    pub fn id(&self) -> OverlayId {
        self.id
    }

    /// Display name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The normalized bindings.
    pub fn bindings(&self) -> &BindingTable {
        &self.table
    }

    /// The configuration.
    pub fn config(&self) -> &OverlayConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> OverlayState {
        match self.state {
            State::Inactive => OverlayState::Inactive,
            State::Active(_) => OverlayState::Active,
        }
    }

    /// Whether the overlay is active.
    pub fn is_active(&self) -> bool {
        self.state() == OverlayState::Active
    }

    /// Whether the entrance bindings are installed.
    pub fn is_attached(&self) -> bool {
        self.entrance.is_some()
    }

    /// Associations captured during the current activation.
    pub fn snapshot(&self) -> Option<&SnapshotStore> {
        self.session().map(|s| &s.snapshot)
    }

    /// Settings shadowed during the current activation.
    pub fn shadows(&self) -> Option<&ShadowStore> {
        self.session().map(|s| &s.shadows)
    }

    pub(crate) fn session(&self) -> Option<&Session> {
        match &self.state {
            State::Active(session) => Some(session),
            State::Inactive => None,
        }
    }

    pub(crate) fn session_mut(&mut self) -> Option<&mut Session> {
        match &mut self.state {
            State::Active(session) => Some(session),
            State::Inactive => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::SetKind;
    use crate::decl::BindingDecl;

    #[test]
    fn ids_are_monotonic() {
        let a = Overlay::new(OverlayDecl::new()).unwrap();
        let b = Overlay::new(OverlayDecl::new()).unwrap();
        assert!(b.id() > a.id());
    }

    #[test]
    fn new_overlay_is_inactive_and_detached() {
        let o = Overlay::new(OverlayDecl::new().with_name("scroll")).unwrap();
        assert_eq!(o.state(), OverlayState::Inactive);
        assert!(!o.is_attached());
        assert!(o.snapshot().is_none());
        assert_eq!(o.name(), Some("scroll"));
    }

    #[test]
    fn invalid_declaration_prevents_construction() {
        let decl = OverlayDecl::new().with_overlay(BindingDecl::new("n", "x").after_exit());
        assert!(Overlay::new(decl).is_err());
    }

    #[test]
    fn construction_normalizes() {
        let o = Overlay::new(OverlayDecl::new().with_overlay(BindingDecl::new("n", "l"))).unwrap();
        assert_eq!(o.bindings().set(SetKind::Overlay).len(), 1);
        assert_eq!(o.bindings().set(SetKind::Departure).len(), 1);
    }

    #[test]
    fn config_builder_and_debug() {
        let config = OverlayConfig::default()
            .on_enter(|_| {})
            .on_exit(|_| {})
            .on_exit(|_| {})
            .with_timeout(Duration::from_millis(10));
        let dbg = format!("{config:?}");
        assert!(dbg.contains("on_enter: 1"));
        assert!(dbg.contains("on_exit: 2"));
        assert_eq!(config.timeout, Some(Duration::from_millis(10)));
        assert_eq!(config.install_scope, InstallScope::Surface);
    }
}
