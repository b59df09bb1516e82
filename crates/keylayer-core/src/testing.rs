//! In-memory host for driving a [`Controller`] without an editor.
//!
//! [`TestHost`] implements every host trait over plain collections and
//! records what the controller asked it to do. [`TestSession`] wraps a
//! controller over a `TestHost` and plays the part of the editor's input
//! loop: [`press`](TestSession::press) resolves a trigger the way a host
//! would (surface-local first, then global) and routes overlay-owned
//! mappings back into the controller, [`focus`](TestSession::focus) moves
//! focus and [`advance`](TestSession::advance) moves the virtual clock.
//!
//! No tokio runtime is needed; timers run on [`ManualScheduler`].
//!
//! # Example
//!
//! ```
//! use keylayer_core::binding::Action;
//! use keylayer_core::decl::{BindingDecl, OverlayDecl};
//! use keylayer_core::overlay::OverlayConfig;
//! use keylayer_core::testing::TestSession;
//! use std::time::Duration;
//!
//! let mut session = TestSession::new();
//! let id = session
//!     .controller_mut()
//!     .create(
//!         OverlayDecl::new()
//!             .with_overlay(BindingDecl::new("n", "j").action(Action::command("next")))
//!             .with_config(OverlayConfig::default().with_timeout(Duration::from_secs(1))),
//!     )
//!     .unwrap();
//! session.controller_mut().activate(id).unwrap();
//! session.press("n", "j");
//! session.advance(Duration::from_secs(1));
//! assert!(!session.controller().is_active(id));
//! assert_eq!(session.host().executed(), ["next"]);
//! ```

use crate::binding::{BindingOptions, Mapping, Target};
use crate::controller::{Controller, HostEvent};
use crate::error::HostError;
use crate::host::{
    BindingRegistry, Host, Notice, Scheduler, Scope, SettingTarget, SettingValue, SettingsStore,
    SubscriptionHandle, SurfaceId, SurfaceRegistry, TimerHandle, ViewId,
};
use crate::trigger::Trigger;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// A binding registry over nested maps.
///
/// Every successful `set`/`remove` is logged so tests can assert on write
/// order; triggers passed to [`reject`](Self::reject) make writes fail.
#[derive(Debug, Default)]
pub struct MemoryBindings {
    entries: BTreeMap<Scope, BTreeMap<Trigger, Mapping>>,
    rejected: BTreeSet<Trigger>,
    log: Vec<(Scope, Trigger)>,
}

impl MemoryBindings {
    /// What `trigger` resolves to on `surface`: surface-local first, then global.
    pub fn resolve(&self, surface: SurfaceId, trigger: &Trigger) -> Option<Mapping> {
        [Scope::Surface(surface), Scope::Global]
            .iter()
            .find_map(|scope| self.entries.get(scope)?.get(trigger).cloned())
    }

    /// Make every write to `trigger` fail.
    pub fn reject(&mut self, trigger: Trigger) {
        self.rejected.insert(trigger);
    }

    /// Undo [`reject`](Self::reject).
    pub fn accept(&mut self, trigger: &Trigger) {
        self.rejected.remove(trigger);
    }

    /// Successful writes, in order.
    pub fn log(&self) -> &[(Scope, Trigger)] {
        &self.log
    }

    /// Forget logged writes.
    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Drop every association local to `surface`.
    pub fn drop_surface(&mut self, surface: SurfaceId) {
        self.entries.remove(&Scope::Surface(surface));
    }

    fn check(&self, trigger: &Trigger) -> Result<(), HostError> {
        if self.rejected.contains(trigger) {
            return Err(HostError::Rejected(format!("write to {trigger} refused")));
        }
        Ok(())
    }
}

impl BindingRegistry for MemoryBindings {
    fn get(&self, scope: Scope, trigger: &Trigger) -> Result<Option<Mapping>, HostError> {
        Ok(self.entries.get(&scope).and_then(|t| t.get(trigger)).cloned())
    }

    fn set(&mut self, scope: Scope, trigger: &Trigger, mapping: Mapping) -> Result<(), HostError> {
        self.check(trigger)?;
        self.entries
            .entry(scope)
            .or_default()
            .insert(trigger.clone(), mapping);
        self.log.push((scope, trigger.clone()));
        Ok(())
    }

    fn remove(&mut self, scope: Scope, trigger: &Trigger) -> Result<(), HostError> {
        self.check(trigger)?;
        if let Some(triggers) = self.entries.get_mut(&scope) {
            triggers.remove(trigger);
        }
        self.log.push((scope, trigger.clone()));
        Ok(())
    }

    fn list(&self, scope: Scope) -> Result<Vec<(Trigger, Mapping)>, HostError> {
        Ok(self
            .entries
            .get(&scope)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }
}

/// A settings store over a flat map.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: BTreeMap<(SettingTarget, String), SettingValue>,
}

impl MemorySettings {
    fn retain(&mut self, keep: impl Fn(&SettingTarget) -> bool) {
        self.values.retain(|(target, _), _| keep(target));
    }
}

impl SettingsStore for MemorySettings {
    fn get_setting(&self, target: SettingTarget, name: &str) -> Result<Option<SettingValue>, HostError> {
        Ok(self.values.get(&(target, name.to_string())).cloned())
    }

    fn set_setting(&mut self, target: SettingTarget, name: &str, value: SettingValue) -> Result<(), HostError> {
        self.values.insert((target, name.to_string()), value);
        Ok(())
    }

    fn clear_setting(&mut self, target: SettingTarget, name: &str) -> Result<(), HostError> {
        self.values.remove(&(target, name.to_string()));
        Ok(())
    }
}

#[derive(Debug)]
struct ManualTimer {
    interval: Duration,
    deadline: Duration,
}

/// A scheduler on a virtual clock.
///
/// Nothing fires by itself: call [`fire_next`](Self::fire_next) to pop the
/// earliest due timer, or let [`TestSession::advance`] do it.
#[derive(Debug, Default)]
pub struct ManualScheduler {
    now: Duration,
    next: u64,
    timers: BTreeMap<u64, ManualTimer>,
}

impl ManualScheduler {
    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Move the clock without firing anything.
    pub fn set_now(&mut self, now: Duration) {
        self.now = now;
    }

    /// Number of live timers.
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Fire the earliest timer due at or before `limit`, moving the clock to
    /// its deadline and scheduling its next tick. Timers due at the same
    /// instant fire in the order they were started or last reset.
    pub fn fire_next(&mut self, limit: Duration) -> Option<TimerHandle> {
        let (&id, timer) = self
            .timers
            .iter_mut()
            .filter(|(_, t)| t.deadline <= limit)
            .min_by_key(|(id, t)| (t.deadline, **id))?;
        self.now = timer.deadline;
        timer.deadline += timer.interval;
        Some(TimerHandle(id))
    }
}

impl Scheduler for ManualScheduler {
    fn start_repeating(&mut self, interval: Duration) -> TimerHandle {
        self.next += 1;
        let interval = interval.max(Duration::from_nanos(1));
        self.timers.insert(
            self.next,
            ManualTimer {
                interval,
                deadline: self.now + interval,
            },
        );
        TimerHandle(self.next)
    }

    fn reset(&mut self, handle: TimerHandle) -> TimerHandle {
        let Some(timer) = self.timers.remove(&handle.0) else {
            return handle;
        };
        self.start_repeating(timer.interval)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle.0);
    }
}

/// An in-memory editor.
///
/// Starts with one live surface and one live view, both focused. Commands
/// passed to [`Host::execute`], triggers passed to [`Host::feed`] and notices
/// are recorded for assertions.
#[derive(Debug)]
pub struct TestHost<S = ManualScheduler> {
    bindings: MemoryBindings,
    settings: MemorySettings,
    scheduler: S,
    surfaces: BTreeSet<SurfaceId>,
    views: BTreeSet<ViewId>,
    current_surface: SurfaceId,
    current_view: ViewId,
    next_id: u64,
    subscriptions: BTreeSet<SubscriptionHandle>,
    next_subscription: u64,
    executed: Vec<String>,
    fed: Vec<Trigger>,
    notices: Vec<Notice>,
}

impl TestHost<ManualScheduler> {
    /// A host on a virtual clock.
    pub fn new() -> Self {
        Self::with_scheduler(ManualScheduler::default())
    }
}

impl Default for TestHost<ManualScheduler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> TestHost<S> {
    /// A host over a custom scheduler.
    pub fn with_scheduler(scheduler: S) -> Self {
        Self {
            bindings: MemoryBindings::default(),
            settings: MemorySettings::default(),
            scheduler,
            surfaces: BTreeSet::from([SurfaceId(1)]),
            views: BTreeSet::from([ViewId(1)]),
            current_surface: SurfaceId(1),
            current_view: ViewId(1),
            next_id: 1,
            subscriptions: BTreeSet::new(),
            next_subscription: 0,
            executed: Vec::new(),
            fed: Vec::new(),
            notices: Vec::new(),
        }
    }

    /// Open a new surface without focusing it.
    pub fn open_surface(&mut self) -> SurfaceId {
        self.next_id += 1;
        let surface = SurfaceId(self.next_id);
        self.surfaces.insert(surface);
        surface
    }

    /// Close a surface, dropping its local bindings and settings.
    pub fn close_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface);
        self.bindings.drop_surface(surface);
        self.settings
            .retain(|t| *t != SettingTarget::Surface(surface));
        if self.current_surface == surface {
            if let Some(&next) = self.surfaces.iter().next() {
                self.current_surface = next;
            }
        }
    }

    /// Open a new view without focusing it.
    pub fn open_view(&mut self) -> ViewId {
        self.next_id += 1;
        let view = ViewId(self.next_id);
        self.views.insert(view);
        view
    }

    /// Close a view, dropping its local settings.
    pub fn close_view(&mut self, view: ViewId) {
        self.views.remove(&view);
        self.settings.retain(|t| *t != SettingTarget::View(view));
        if self.current_view == view {
            if let Some(&next) = self.views.iter().next() {
                self.current_view = next;
            }
        }
    }

    /// Move focus. Does not notify anyone; see [`TestSession::focus`].
    pub fn set_focus(&mut self, surface: SurfaceId, view: ViewId) {
        self.surfaces.insert(surface);
        self.views.insert(view);
        self.current_surface = surface;
        self.current_view = view;
    }

    /// Number of live focus subscriptions.
    pub fn subscriptions(&self) -> usize {
        self.subscriptions.len()
    }

    /// What `trigger` resolves to on `surface`.
    pub fn resolve(&self, surface: SurfaceId, trigger: &Trigger) -> Option<Mapping> {
        self.bindings.resolve(surface, trigger)
    }

    /// Commands executed so far.
    pub fn executed(&self) -> &[String] {
        &self.executed
    }

    /// Triggers fed back so far.
    pub fn fed(&self) -> &[Trigger] {
        &self.fed
    }

    /// Warnings received so far.
    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// The binding registry.
    pub fn bindings(&self) -> &MemoryBindings {
        &self.bindings
    }

    /// Mutable binding registry, for fault injection.
    pub fn bindings_mut(&mut self) -> &mut MemoryBindings {
        &mut self.bindings
    }

    /// The scheduler.
    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Mutable scheduler.
    pub fn scheduler_mut(&mut self) -> &mut S {
        &mut self.scheduler
    }

    fn check_scope(&self, scope: Scope) -> Result<(), HostError> {
        match scope {
            Scope::Surface(s) if !self.surfaces.contains(&s) => Err(HostError::SurfaceGone(s)),
            _ => Ok(()),
        }
    }

    fn check_target(&self, target: SettingTarget) -> Result<(), HostError> {
        match target {
            SettingTarget::Surface(s) if !self.surfaces.contains(&s) => Err(HostError::SurfaceGone(s)),
            SettingTarget::View(v) if !self.views.contains(&v) => Err(HostError::ViewGone(v)),
            _ => Ok(()),
        }
    }
}

impl<S> BindingRegistry for TestHost<S> {
    fn get(&self, scope: Scope, trigger: &Trigger) -> Result<Option<Mapping>, HostError> {
        self.check_scope(scope)?;
        self.bindings.get(scope, trigger)
    }

    fn set(&mut self, scope: Scope, trigger: &Trigger, mapping: Mapping) -> Result<(), HostError> {
        self.check_scope(scope)?;
        self.bindings.set(scope, trigger, mapping)
    }

    fn remove(&mut self, scope: Scope, trigger: &Trigger) -> Result<(), HostError> {
        self.check_scope(scope)?;
        self.bindings.remove(scope, trigger)
    }

    fn list(&self, scope: Scope) -> Result<Vec<(Trigger, Mapping)>, HostError> {
        self.check_scope(scope)?;
        self.bindings.list(scope)
    }
}

impl<S> SurfaceRegistry for TestHost<S> {
    fn current_surface(&self) -> SurfaceId {
        self.current_surface
    }

    fn current_view(&self) -> ViewId {
        self.current_view
    }

    fn live_surfaces(&self) -> BTreeSet<SurfaceId> {
        self.surfaces.clone()
    }

    fn live_views(&self) -> BTreeSet<ViewId> {
        self.views.clone()
    }

    fn subscribe_focus(&mut self) -> SubscriptionHandle {
        self.next_subscription += 1;
        let handle = SubscriptionHandle(self.next_subscription);
        self.subscriptions.insert(handle);
        handle
    }

    fn unsubscribe(&mut self, handle: SubscriptionHandle) {
        self.subscriptions.remove(&handle);
    }
}

impl<S> SettingsStore for TestHost<S> {
    fn get_setting(&self, target: SettingTarget, name: &str) -> Result<Option<SettingValue>, HostError> {
        self.check_target(target)?;
        self.settings.get_setting(target, name)
    }

    fn set_setting(&mut self, target: SettingTarget, name: &str, value: SettingValue) -> Result<(), HostError> {
        self.check_target(target)?;
        self.settings.set_setting(target, name, value)
    }

    fn clear_setting(&mut self, target: SettingTarget, name: &str) -> Result<(), HostError> {
        self.check_target(target)?;
        self.settings.clear_setting(target, name)
    }
}

impl<S: Scheduler> Scheduler for TestHost<S> {
    fn start_repeating(&mut self, interval: Duration) -> TimerHandle {
        self.scheduler.start_repeating(interval)
    }

    fn reset(&mut self, handle: TimerHandle) -> TimerHandle {
        self.scheduler.reset(handle)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.scheduler.cancel(handle);
    }
}

impl<S: Scheduler> Host for TestHost<S> {
    fn execute(&mut self, command: &str, _options: &BindingOptions) -> Result<(), HostError> {
        self.executed.push(command.to_string());
        Ok(())
    }

    fn feed(&mut self, trigger: &Trigger) -> Result<(), HostError> {
        self.fed.push(trigger.clone());
        Ok(())
    }

    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
}

/// A controller over a [`TestHost`], driven like an editor would drive it.
pub struct TestSession<S: Scheduler = ManualScheduler> {
    controller: Controller<TestHost<S>>,
}

impl TestSession<ManualScheduler> {
    /// A session on a virtual clock.
    pub fn new() -> Self {
        Self::with_host(TestHost::new())
    }

    /// Advance the virtual clock by `by`, delivering every timer tick due in
    /// between to the controller in deadline order.
    pub fn advance(&mut self, by: Duration) {
        let until = self.host().scheduler().now() + by;
        while let Some(handle) = self.host_mut().scheduler_mut().fire_next(until) {
            self.deliver(HostEvent::TimerFired(handle));
        }
        self.host_mut().scheduler_mut().set_now(until);
    }
}

impl Default for TestSession<ManualScheduler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheduler> TestSession<S> {
    /// A session over an existing host.
    pub fn with_host(host: TestHost<S>) -> Self {
        Self {
            controller: Controller::new(host),
        }
    }

    /// The controller.
    pub fn controller(&self) -> &Controller<TestHost<S>> {
        &self.controller
    }

    /// Mutable controller.
    pub fn controller_mut(&mut self) -> &mut Controller<TestHost<S>> {
        &mut self.controller
    }

    /// The host.
    pub fn host(&self) -> &TestHost<S> {
        self.controller.host()
    }

    /// Mutable host. Changes made here bypass the controller.
    pub fn host_mut(&mut self) -> &mut TestHost<S> {
        self.controller.host_mut()
    }

    /// Type `keys` in `mode` on the focused surface.
    ///
    /// # Panics
    ///
    /// If `keys` is not valid key notation, or the controller reports an
    /// error while handling the resulting route.
    pub fn press(&mut self, mode: &str, keys: &str) {
        let trigger = match Trigger::new(mode, keys) {
            Ok(trigger) => trigger,
            Err(err) => panic!("invalid trigger `{mode} {keys}`: {err}"),
        };
        self.press_trigger(&trigger);
    }

    /// Resolve `trigger` on the focused surface and act on the result.
    pub fn press_trigger(&mut self, trigger: &Trigger) {
        let host = self.controller.host_mut();
        let surface = host.current_surface();
        let outcome = match host.resolve(surface, trigger) {
            Some(Mapping {
                target: Target::Overlay(route),
                ..
            }) => {
                self.deliver(HostEvent::Triggered(route));
                return;
            }
            Some(Mapping {
                target: Target::Command(command),
                options,
            }) => host.execute(&command, &options),
            None => host.feed(trigger),
        };
        if let Err(err) = outcome {
            panic!("test host failed: {err}");
        }
    }

    /// Move focus and report it if the controller is listening.
    pub fn focus(&mut self, surface: SurfaceId, view: ViewId) {
        self.host_mut().set_focus(surface, view);
        if self.host().subscriptions() > 0 {
            self.deliver(HostEvent::Focus { surface, view });
        }
    }

    fn deliver(&mut self, event: HostEvent) {
        if let Err(err) = self.controller.handle(event) {
            panic!("controller failed: {err}");
        }
    }
}
