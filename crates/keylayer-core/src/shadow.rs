//! Reversible setting changes made by enter hooks.
//!
//! Hooks never touch [`SettingsStore`] for overlay-scoped changes directly;
//! they go through an [`OptionShadow`] accessor which records the original
//! value of every setting the first time it is written. Deactivation replays
//! the originals. Surface and view scoped writes are also remembered as
//! *sticky* so they follow focus onto surfaces and views visited later.

use crate::error::HostError;
use crate::host::{Host, Notice, SettingTarget, SettingValue, SettingsStore, SurfaceId, ViewId};
use crate::overlay::OverlayId;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{trace, warn};

/// The scope of a shadowed setting, relative to the focused surface/view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingScope {
    /// The focused surface.
    Surface,
    /// The focused view.
    View,
    /// The general global value.
    Global,
    /// The global value only.
    GlobalOnly,
}

impl SettingScope {
    /// Resolve against the focused surface and view.
    pub fn target(self, surface: SurfaceId, view: ViewId) -> SettingTarget {
        match self {
            SettingScope::Surface => SettingTarget::Surface(surface),
            SettingScope::View => SettingTarget::View(view),
            SettingScope::Global => SettingTarget::Global,
            SettingScope::GlobalOnly => SettingTarget::GlobalOnly,
        }
    }

    fn is_sticky(self) -> bool {
        matches!(self, SettingScope::Surface | SettingScope::View)
    }
}

/// Outcome of [`ShadowStore::restore_all`].
#[derive(Debug, Default)]
pub struct ShadowReport {
    /// Settings written back.
    pub restored: usize,
    /// Settings dropped because their surface or view is gone.
    pub discarded: usize,
    /// Settings the host refused to restore.
    pub failures: Vec<(SettingTarget, String, HostError)>,
}

/// Original values of shadowed settings plus the sticky writes to replay on
/// focus changes.
#[derive(Debug, Default)]
pub struct ShadowStore {
    originals: BTreeMap<(SettingTarget, String), Option<SettingValue>>,
    sticky: BTreeMap<(SettingScope, String), SettingValue>,
}

impl ShadowStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no setting has been shadowed.
    pub fn is_empty(&self) -> bool {
        self.originals.is_empty()
    }

    /// Number of shadowed settings.
    pub fn len(&self) -> usize {
        self.originals.len()
    }

    /// The recorded original of a setting; `Some(None)` means it was unset.
    pub fn original(&self, target: SettingTarget, name: &str) -> Option<&Option<SettingValue>> {
        self.originals.get(&(target, name.to_string()))
    }

    /// Record the original (once) and write `value`.
    pub fn shadow<S>(
        &mut self,
        store: &mut S,
        target: SettingTarget,
        name: &str,
        value: SettingValue,
    ) -> Result<(), HostError>
    where
        S: SettingsStore + ?Sized,
    {
        let key = (target, name.to_string());
        if !self.originals.contains_key(&key) {
            let original = store.get_setting(target, name)?;
            trace!(?target, name, "captured setting");
            self.originals.insert(key, original);
        }
        store.set_setting(target, name, value)
    }

    /// Remember a surface or view scoped write for replay on focus changes.
    pub fn remember(&mut self, scope: SettingScope, name: &str, value: SettingValue) {
        if scope.is_sticky() {
            self.sticky.insert((scope, name.to_string()), value);
        }
    }

    /// Replay sticky writes onto a newly focused surface and view.
    pub fn reapply<S>(&mut self, store: &mut S, surface: SurfaceId, view: ViewId) -> Vec<HostError>
    where
        S: SettingsStore + ?Sized,
    {
        let sticky: Vec<_> = self
            .sticky
            .iter()
            .map(|((scope, name), value)| (scope.target(surface, view), name.clone(), value.clone()))
            .collect();
        sticky
            .into_iter()
            .filter_map(|(target, name, value)| self.shadow(store, target, &name, value).err())
            .collect()
    }

    /// Write every original back and empty the store.
    pub fn restore_all<S>(
        &mut self,
        store: &mut S,
        live_surfaces: &BTreeSet<SurfaceId>,
        live_views: &BTreeSet<ViewId>,
    ) -> ShadowReport
    where
        S: SettingsStore + ?Sized,
    {
        let mut report = ShadowReport::default();
        self.sticky.clear();
        // Globals first: a general-global write may also reach local values.
        let (globals, locals): (Vec<_>, Vec<_>) = std::mem::take(&mut self.originals)
            .into_iter()
            .partition(|((target, _), _)| {
                matches!(target, SettingTarget::Global | SettingTarget::GlobalOnly)
            });
        for ((target, name), original) in globals.into_iter().chain(locals) {
            let live = match target {
                SettingTarget::Surface(s) => live_surfaces.contains(&s),
                SettingTarget::View(v) => live_views.contains(&v),
                SettingTarget::Global | SettingTarget::GlobalOnly => true,
            };
            if !live {
                report.discarded += 1;
                continue;
            }
            let result = match original {
                Some(value) => store.set_setting(target, &name, value),
                None => store.clear_setting(target, &name),
            };
            match result {
                Ok(()) => report.restored += 1,
                Err(err) => report.failures.push((target, name, err)),
            }
        }
        report
    }
}

/// Setting accessor handed to hooks.
///
/// During enter hooks every write is recorded and undone on deactivation.
/// During exit hooks the accessor is disabled: writes are refused with a
/// warning, reads still work.
pub struct OptionShadow<'a> {
    overlay: OverlayId,
    host: &'a mut dyn Host,
    store: Option<&'a mut ShadowStore>,
    surface: SurfaceId,
    view: ViewId,
}

impl<'a> OptionShadow<'a> {
    pub(crate) fn new(
        overlay: OverlayId,
        host: &'a mut dyn Host,
        store: Option<&'a mut ShadowStore>,
        surface: SurfaceId,
        view: ViewId,
    ) -> Self {
        Self {
            overlay,
            host,
            store,
            surface,
            view,
        }
    }

    /// Whether writes are being recorded.
    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Current value of a setting.
    pub fn get(&self, scope: SettingScope, name: &str) -> Result<Option<SettingValue>, HostError> {
        self.host
            .get_setting(scope.target(self.surface, self.view), name)
    }

    /// Set a setting for the lifetime of the activation.
    pub fn set(
        &mut self,
        scope: SettingScope,
        name: &str,
        value: impl Into<SettingValue>,
    ) -> Result<(), HostError> {
        let value = value.into();
        let Some(store) = self.store.as_deref_mut() else {
            let message = format!(
                "overlay {}: setting `{name}` cannot be shadowed while exiting",
                self.overlay
            );
            warn!(overlay = %self.overlay, name, "option shadow write while disabled");
            self.host.notify(Notice::warn(message));
            return Ok(());
        };
        let target = scope.target(self.surface, self.view);
        store.shadow(&mut *self.host, target, name, value.clone())?;
        store.remember(scope, name, value);
        Ok(())
    }

    /// [`set`](Self::set) on the focused surface.
    pub fn surface(&mut self, name: &str, value: impl Into<SettingValue>) -> Result<(), HostError> {
        self.set(SettingScope::Surface, name, value)
    }

    /// [`set`](Self::set) on the focused view.
    pub fn view(&mut self, name: &str, value: impl Into<SettingValue>) -> Result<(), HostError> {
        self.set(SettingScope::View, name, value)
    }

    /// [`set`](Self::set) on the general global value.
    pub fn global(&mut self, name: &str, value: impl Into<SettingValue>) -> Result<(), HostError> {
        self.set(SettingScope::Global, name, value)
    }

    /// [`set`](Self::set) on the global value only.
    pub fn global_only(&mut self, name: &str, value: impl Into<SettingValue>) -> Result<(), HostError> {
        self.set(SettingScope::GlobalOnly, name, value)
    }
}
