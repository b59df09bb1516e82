//! Capture and replay of the host associations an overlay shadows.

use crate::binding::Mapping;
use crate::error::HostError;
use crate::host::{BindingRegistry, Scope, SurfaceId};
use crate::trigger::Trigger;
use std::collections::{BTreeMap, BTreeSet};
use tracing::trace;

/// The pre-overlay state of one scope × trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// Nothing was bound; restoring removes whatever is there.
    Absent,
    /// This mapping was bound; restoring reinstalls it verbatim.
    Present(Mapping),
}

impl From<Option<Mapping>> for Snapshot {
    fn from(mapping: Option<Mapping>) -> Self {
        match mapping {
            Some(m) => Snapshot::Present(m),
            None => Snapshot::Absent,
        }
    }
}

/// Outcome of [`SnapshotStore::restore_all`].
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Entries written back to the host.
    pub restored: usize,
    /// Entries dropped because their surface is gone.
    pub discarded: usize,
    /// Entries the host refused; the rest were still restored.
    pub failures: Vec<(Scope, Trigger, HostError)>,
}

/// Captured associations, `scope → trigger → snapshot`.
///
/// Each scope × trigger is captured at most once; later captures are no-ops
/// so the first (true) original survives repeated installs.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: BTreeMap<Scope, BTreeMap<Trigger, Snapshot>>,
}

impl SnapshotStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether nothing has been captured.
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(BTreeMap::is_empty)
    }

    /// Number of captured entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    /// The captured entry, if any.
    pub fn lookup(&self, scope: Scope, trigger: &Trigger) -> Option<&Snapshot> {
        self.entries.get(&scope)?.get(trigger)
    }

    /// Scopes with at least one captured entry, global first.
    pub fn scopes(&self) -> impl Iterator<Item = Scope> + '_ {
        self.entries
            .iter()
            .filter(|(_, triggers)| !triggers.is_empty())
            .map(|(scope, _)| *scope)
    }

    /// Record the current association of `trigger` in `scope` unless it was
    /// already captured.
    pub fn capture_if_absent<R>(
        &mut self,
        registry: &R,
        scope: Scope,
        trigger: &Trigger,
    ) -> Result<&Snapshot, HostError>
    where
        R: BindingRegistry + ?Sized,
    {
        let triggers = self.entries.entry(scope).or_default();
        if !triggers.contains_key(trigger) {
            let current = registry.get(scope, trigger)?;
            trace!(?scope, %trigger, present = current.is_some(), "captured association");
            triggers.insert(trigger.clone(), current.into());
        }
        Ok(&triggers[trigger])
    }

    /// Capture, then overwrite the host association with `mapping`.
    pub fn install<R>(
        &mut self,
        registry: &mut R,
        scope: Scope,
        trigger: &Trigger,
        mapping: Mapping,
    ) -> Result<(), HostError>
    where
        R: BindingRegistry + ?Sized,
    {
        self.capture_if_absent(&*registry, scope, trigger)?;
        registry.set(scope, trigger, mapping)
    }

    /// What `trigger` resolved to on `surface` before the overlay, following
    /// the host's precedence (surface-local, then global). Scopes that were
    /// never captured are read from the host, since they are untouched.
    pub fn original<R>(
        &self,
        registry: &R,
        surface: SurfaceId,
        trigger: &Trigger,
    ) -> Result<Option<Mapping>, HostError>
    where
        R: BindingRegistry + ?Sized,
    {
        let local = Scope::Surface(surface);
        match self.lookup(local, trigger) {
            Some(Snapshot::Present(m)) => return Ok(Some(m.clone())),
            Some(Snapshot::Absent) => {}
            None => {
                if let Some(m) = registry.get(local, trigger)? {
                    return Ok(Some(m));
                }
            }
        }
        match self.lookup(Scope::Global, trigger) {
            Some(Snapshot::Present(m)) => Ok(Some(m.clone())),
            Some(Snapshot::Absent) => Ok(None),
            None => registry.get(Scope::Global, trigger),
        }
    }

    /// Replay every captured entry and empty the store.
    ///
    /// Global entries go first, then surface-local ones, mirroring the
    /// host's lookup order. Entries of surfaces not in `live` are discarded;
    /// host failures are collected per entry and do not stop the replay.
    pub fn restore_all<R>(&mut self, registry: &mut R, live: &BTreeSet<SurfaceId>) -> RestoreReport
    where
        R: BindingRegistry + ?Sized,
    {
        let mut report = RestoreReport::default();
        for (scope, triggers) in std::mem::take(&mut self.entries) {
            if let Scope::Surface(surface) = scope {
                if !live.contains(&surface) {
                    report.discarded += triggers.len();
                    continue;
                }
            }
            for (trigger, snapshot) in triggers {
                let result = match snapshot {
                    Snapshot::Present(mapping) => registry.set(scope, &trigger, mapping),
                    Snapshot::Absent => registry.remove(scope, &trigger),
                };
                match result {
                    Ok(()) => report.restored += 1,
                    Err(err) => report.failures.push((scope, trigger, err)),
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindingOptions, Route, SetKind};
    use crate::overlay::OverlayId;
    use crate::testing::MemoryBindings;

    fn t(keys: &str) -> Trigger {
        Trigger::new("n", keys).unwrap()
    }

    fn overlay_mapping(trigger: &Trigger) -> Mapping {
        Mapping::route(
            Route {
                overlay: OverlayId(1),
                set: SetKind::Overlay,
                trigger: trigger.clone(),
            },
            &BindingOptions::default(),
        )
    }

    #[test]
    fn round_trip_present() {
        let mut reg = MemoryBindings::default();
        let l = t("l");
        reg.set(Scope::Global, &l, Mapping::command("move-right")).unwrap();

        let mut store = SnapshotStore::new();
        store.install(&mut reg, Scope::Global, &l, overlay_mapping(&l)).unwrap();
        assert_eq!(reg.get(Scope::Global, &l).unwrap(), Some(overlay_mapping(&l)));

        let report = store.restore_all(&mut reg, &BTreeSet::new());
        assert_eq!(report.restored, 1);
        assert_eq!(reg.get(Scope::Global, &l).unwrap(), Some(Mapping::command("move-right")));
        assert!(store.is_empty());
    }

    #[test]
    fn round_trip_absent() {
        let mut reg = MemoryBindings::default();
        let s1 = SurfaceId(1);
        let l = t("l");

        let mut store = SnapshotStore::new();
        store
            .install(&mut reg, Scope::Surface(s1), &l, overlay_mapping(&l))
            .unwrap();
        assert!(reg.get(Scope::Surface(s1), &l).unwrap().is_some());

        store.restore_all(&mut reg, &BTreeSet::from([s1]));
        assert_eq!(reg.get(Scope::Surface(s1), &l).unwrap(), None);
    }

    #[test]
    fn capture_keeps_first_original() {
        let mut reg = MemoryBindings::default();
        let l = t("l");
        reg.set(Scope::Global, &l, Mapping::command("orig")).unwrap();

        let mut store = SnapshotStore::new();
        store.install(&mut reg, Scope::Global, &l, overlay_mapping(&l)).unwrap();
        store.install(&mut reg, Scope::Global, &l, overlay_mapping(&l)).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.lookup(Scope::Global, &l),
            Some(&Snapshot::Present(Mapping::command("orig")))
        );
    }

    #[test]
    fn dead_surfaces_are_discarded() {
        let mut reg = MemoryBindings::default();
        let l = t("l");
        let mut store = SnapshotStore::new();
        store
            .install(&mut reg, Scope::Surface(SurfaceId(1)), &l, overlay_mapping(&l))
            .unwrap();
        store
            .install(&mut reg, Scope::Surface(SurfaceId(2)), &l, overlay_mapping(&l))
            .unwrap();

        let report = store.restore_all(&mut reg, &BTreeSet::from([SurfaceId(2)]));
        assert_eq!(report.restored, 1);
        assert_eq!(report.discarded, 1);
        assert!(report.failures.is_empty());
        assert_eq!(reg.get(Scope::Surface(SurfaceId(2)), &l).unwrap(), None);
    }

    #[test]
    fn restore_replays_global_before_local() {
        let mut reg = MemoryBindings::default();
        let l = t("l");
        let s = SurfaceId(7);
        reg.set(Scope::Global, &l, Mapping::command("global")).unwrap();
        reg.set(Scope::Surface(s), &l, Mapping::command("local")).unwrap();

        let mut store = SnapshotStore::new();
        store.install(&mut reg, Scope::Surface(s), &l, overlay_mapping(&l)).unwrap();
        store.install(&mut reg, Scope::Global, &l, overlay_mapping(&l)).unwrap();
        assert_eq!(
            store.scopes().collect::<Vec<_>>(),
            vec![Scope::Global, Scope::Surface(s)]
        );

        reg.clear_log();
        store.restore_all(&mut reg, &BTreeSet::from([s]));
        assert_eq!(reg.log(), &[(Scope::Global, l.clone()), (Scope::Surface(s), l.clone())]);
        assert_eq!(reg.resolve(s, &l), Some(Mapping::command("local")));
        assert_eq!(reg.resolve(SurfaceId(8), &l), Some(Mapping::command("global")));
    }

    #[test]
    fn failures_do_not_abort_restore() {
        let mut reg = MemoryBindings::default();
        let a = t("a");
        let b = t("b");
        let mut store = SnapshotStore::new();
        store.install(&mut reg, Scope::Global, &a, overlay_mapping(&a)).unwrap();
        store.install(&mut reg, Scope::Global, &b, overlay_mapping(&b)).unwrap();

        reg.reject(a.clone());
        let report = store.restore_all(&mut reg, &BTreeSet::new());
        assert_eq!(report.restored, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].1, a);
        assert_eq!(reg.get(Scope::Global, &b).unwrap(), None);
    }

    #[test]
    fn original_follows_precedence() {
        let mut reg = MemoryBindings::default();
        let l = t("l");
        let s = SurfaceId(1);
        reg.set(Scope::Global, &l, Mapping::command("global")).unwrap();

        let mut store = SnapshotStore::new();
        store.install(&mut reg, Scope::Surface(s), &l, overlay_mapping(&l)).unwrap();
        assert_eq!(
            store.original(&reg, s, &l).unwrap(),
            Some(Mapping::command("global"))
        );

        reg.set(Scope::Surface(SurfaceId(2)), &l, Mapping::command("local")).unwrap();
        assert_eq!(
            store.original(&reg, SurfaceId(2), &l).unwrap(),
            Some(Mapping::command("local"))
        );
    }
}
