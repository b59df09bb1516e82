//! The overlay controller: lifecycle, dispatch and host event handling.
//!
//! A [`Controller`] owns every registered [`Overlay`] and the single active
//! slot. It is driven from one thread by the embedding host: public calls
//! ([`activate`](Controller::activate), [`dispatch`](Controller::dispatch),
//! [`handle`](Controller::handle), ...) run to completion, then drain the
//! requests queued by hooks and callbacks during the call.
//!
//! ```
//! use keylayer_core::binding::Action;
//! use keylayer_core::decl::{BindingDecl, OverlayDecl};
//! use keylayer_core::testing::TestSession;
//!
//! let mut session = TestSession::new();
//! let id = session
//!     .controller_mut()
//!     .create(
//!         OverlayDecl::new()
//!             .with_entrance(BindingDecl::new("n", "<leader>s"))
//!             .with_overlay(BindingDecl::new("n", "l").action(Action::command("scroll-right"))),
//!     )
//!     .unwrap();
//! session.controller_mut().attach(id).unwrap();
//!
//! session.press("n", "<leader>s");
//! session.press("n", "l");
//! session.press("n", "<Esc>");
//! assert_eq!(session.host().executed(), ["scroll-right"]);
//! assert!(!session.controller().is_active(id));
//! ```

use crate::binding::{Action, Binding, Mapping, Route, SetKind, Target};
use crate::context::{ActionCx, HookCx, Phase, Request};
use crate::decl::OverlayDecl;
use crate::error::{Error, HostError, Result};
use crate::host::{Host, Notice, Scope, SurfaceId, TimerHandle, ViewId};
use crate::normalize::BindingTable;
use crate::overlay::{InstallScope, Overlay, OverlayId, Session, State};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::trigger::Trigger;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

/// Upper bound on queued requests processed after one public call.
const MAX_CHAINED_REQUESTS: usize = 64;

/// Events the host reports back to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Focus moved to another surface or view.
    Focus {
        /// Newly focused surface.
        surface: SurfaceId,
        /// Newly focused view.
        view: ViewId,
    },
    /// A scheduler timer fired.
    TimerFired(TimerHandle),
    /// The host resolved a trigger to an overlay-owned mapping.
    Triggered(Route),
}

/// Result of a lifecycle call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The overlay became active.
    Entered,
    /// The overlay became inactive.
    Exited,
    /// Nothing changed.
    Unchanged,
}

/// The overlay currently holding the active slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveOverlay {
    /// Its id.
    pub id: OverlayId,
    /// Its display name.
    pub name: Option<String>,
}

/// Owns overlays and toggles them against a [`Host`].
///
/// At most one overlay is active at a time; activating another fully
/// deactivates the current one first.
pub struct Controller<H: Host> {
    host: H,
    overlays: BTreeMap<OverlayId, Overlay>,
    active: Option<OverlayId>,
    requests: Vec<Request>,
    active_tx: watch::Sender<Option<ActiveOverlay>>,
}

impl<H: Host> Controller<H> {
    /// Create a controller over `host`.
    pub fn new(host: H) -> Self {
        let (active_tx, _) = watch::channel(None);
        Self {
            host,
            overlays: BTreeMap::new(),
            active: None,
            requests: Vec::new(),
            active_tx,
        }
    }

    /// The host.
    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable host access. Changes made here bypass snapshotting.
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    /// Consume the controller, returning the host.
    ///
    /// Active overlays are not deactivated; call [`shutdown`](Self::shutdown)
    /// first to leave the host as it was.
    pub fn into_host(self) -> H {
        self.host
    }

    /// Register an overlay.
    pub fn insert(&mut self, overlay: Overlay) -> OverlayId {
        let id = overlay.id();
        debug!(overlay = %id, name = ?overlay.name(), "registered overlay");
        self.overlays.insert(id, overlay);
        id
    }

    /// Build an overlay from `decl` and register it.
    pub fn create(&mut self, decl: OverlayDecl) -> Result<OverlayId> {
        Ok(self.insert(Overlay::new(decl)?))
    }

    /// Deactivate, detach and unregister an overlay.
    pub fn remove(&mut self, id: OverlayId) -> Result<Overlay> {
        self.exit(id)?;
        self.detach_entrance(id)?;
        let overlay = self.overlays.remove(&id).ok_or(Error::UnknownOverlay(id))?;
        debug!(overlay = %id, "removed overlay");
        self.drain();
        Ok(overlay)
    }

    /// A registered overlay.
    pub fn overlay(&self, id: OverlayId) -> Option<&Overlay> {
        self.overlays.get(&id)
    }

    /// Ids of every registered overlay.
    pub fn ids(&self) -> impl Iterator<Item = OverlayId> + '_ {
        self.overlays.keys().copied()
    }

    /// The normalized bindings of an overlay.
    pub fn bindings(&self, id: OverlayId) -> Option<&BindingTable> {
        self.overlays.get(&id).map(Overlay::bindings)
    }

    /// Whether `id` is active.
    pub fn is_active(&self, id: OverlayId) -> bool {
        self.overlays.get(&id).is_some_and(Overlay::is_active)
    }

    /// The overlay holding the active slot.
    pub fn active(&self) -> Option<ActiveOverlay> {
        let id = self.active?;
        let name = self.overlays.get(&id)?.name().map(str::to_string);
        Some(ActiveOverlay { id, name })
    }

    /// Subscribe to changes of the active slot.
    pub fn watch_active(&self) -> watch::Receiver<Option<ActiveOverlay>> {
        self.active_tx.subscribe()
    }

    /// Install the entrance bindings globally. Idempotent.
    pub fn attach(&mut self, id: OverlayId) -> Result<()> {
        let overlay = self.overlays.get_mut(&id).ok_or(Error::UnknownOverlay(id))?;
        if overlay.entrance.is_some() {
            return Ok(());
        }
        let mut store = SnapshotStore::new();
        let mut failures = Vec::new();
        for (trigger, binding) in overlay.bindings().set(SetKind::Entrance) {
            let route = Route {
                overlay: id,
                set: SetKind::Entrance,
                trigger: trigger.clone(),
            };
            let mapping = Mapping::route(route, &binding.options);
            if let Err(err) = store.install(&mut self.host, Scope::Global, trigger, mapping) {
                failures.push(format!("overlay {id}: cannot install entrance {trigger}: {err}"));
            }
        }
        debug!(overlay = %id, entries = store.len(), "attached entrance bindings");
        overlay.entrance = Some(store);
        for message in failures {
            self.warn(message);
        }
        Ok(())
    }

    /// Remove the entrance bindings, restoring what they shadowed. Idempotent.
    pub fn detach(&mut self, id: OverlayId) -> Result<()> {
        self.detach_entrance(id)?;
        self.drain();
        Ok(())
    }

    /// Activate `id`, deactivating any other active overlay first.
    pub fn activate(&mut self, id: OverlayId) -> Result<Transition> {
        let transition = self.enter(id)?;
        self.drain();
        Ok(transition)
    }

    /// Deactivate `id` and restore everything it shadowed.
    pub fn deactivate(&mut self, id: OverlayId) -> Result<Transition> {
        let transition = self.exit(id)?;
        self.drain();
        Ok(transition)
    }

    /// Activate when inactive, deactivate when active.
    pub fn toggle(&mut self, id: OverlayId) -> Result<Transition> {
        let transition = self.flip(id)?;
        self.drain();
        Ok(transition)
    }

    /// Deactivate whichever overlay is active and detach every overlay.
    pub fn shutdown(&mut self) {
        if let Some(id) = self.active {
            if let Err(err) = self.exit(id) {
                warn!(overlay = %id, %err, "failed to deactivate on shutdown");
            }
        }
        let ids: Vec<_> = self.overlays.keys().copied().collect();
        for id in ids {
            if let Err(err) = self.detach_entrance(id) {
                warn!(overlay = %id, %err, "failed to detach on shutdown");
            }
        }
        self.requests.clear();
    }

    /// Run the binding a host-resolved trigger belongs to.
    pub fn dispatch(&mut self, route: Route) -> Result<()> {
        self.route(route)?;
        self.drain();
        Ok(())
    }

    /// Process a host event.
    pub fn handle(&mut self, event: HostEvent) -> Result<()> {
        match event {
            HostEvent::Focus { surface, view } => self.focus(surface, view),
            HostEvent::TimerFired(handle) => self.timer_fired(handle)?,
            HostEvent::Triggered(route) => self.route(route)?,
        }
        self.drain();
        Ok(())
    }

    fn flip(&mut self, id: OverlayId) -> Result<Transition> {
        let overlay = self.overlays.get(&id).ok_or(Error::UnknownOverlay(id))?;
        if overlay.is_active() {
            self.exit(id)
        } else {
            self.enter(id)
        }
    }

    fn enter(&mut self, id: OverlayId) -> Result<Transition> {
        let overlay = self.overlays.get(&id).ok_or(Error::UnknownOverlay(id))?;
        if overlay.is_active() {
            trace!(overlay = %id, "already active");
            return Ok(Transition::Unchanged);
        }
        let hooks = overlay.config().on_enter.clone();
        let timeout = overlay.config().timeout;

        if let Some(current) = self.active {
            debug!(from = %current, to = %id, "switching overlays");
            self.exit(current)?;
        }

        debug!(overlay = %id, "activating");
        let mut session = Box::new(Session::default());
        for hook in &hooks {
            let mut cx = HookCx::new(
                id,
                Phase::Enter,
                &mut self.host,
                Some(&mut session.shadows),
                &mut self.requests,
            );
            hook(&mut cx);
        }

        if let Some(overlay) = self.overlays.get_mut(&id) {
            overlay.state = State::Active(session);
        }
        self.active = Some(id);

        let surface = self.host.current_surface();
        self.install(id, surface);

        if let Some(session) = self.overlays.get_mut(&id).and_then(Overlay::session_mut) {
            if let Some(duration) = timeout {
                session.timeout.arm(&mut self.host, duration);
            }
            session.focus = Some(self.host.subscribe_focus());
        }
        self.publish();
        Ok(Transition::Entered)
    }

    fn exit(&mut self, id: OverlayId) -> Result<Transition> {
        let overlay = self.overlays.get_mut(&id).ok_or(Error::UnknownOverlay(id))?;
        let hooks = overlay.config().on_exit.clone();
        let mut session = match std::mem::replace(&mut overlay.state, State::Inactive) {
            State::Active(session) => session,
            State::Inactive => {
                trace!(overlay = %id, "already inactive");
                return Ok(Transition::Unchanged);
            }
        };
        debug!(overlay = %id, "deactivating");

        session.timeout.cancel(&mut self.host);

        for hook in &hooks {
            let mut cx = HookCx::new(id, Phase::Exit, &mut self.host, None, &mut self.requests);
            hook(&mut cx);
        }

        let live_surfaces = self.host.live_surfaces();
        let live_views = self.host.live_views();
        let bindings = session.snapshot.restore_all(&mut self.host, &live_surfaces);
        let settings = session
            .shadows
            .restore_all(&mut self.host, &live_surfaces, &live_views);
        trace!(
            overlay = %id,
            restored = bindings.restored,
            discarded = bindings.discarded,
            settings = settings.restored,
            "restored shadowed state"
        );
        for (scope, trigger, err) in bindings.failures {
            self.warn(format!("overlay {id}: cannot restore {trigger} in {scope:?}: {err}"));
        }
        for (target, name, err) in settings.failures {
            self.warn(format!("overlay {id}: cannot restore setting `{name}` in {target:?}: {err}"));
        }

        if let Some(handle) = session.focus.take() {
            self.host.unsubscribe(handle);
        }
        if self.active == Some(id) {
            self.active = None;
        }
        self.publish();
        Ok(Transition::Exited)
    }

    fn detach_entrance(&mut self, id: OverlayId) -> Result<()> {
        let overlay = self.overlays.get_mut(&id).ok_or(Error::UnknownOverlay(id))?;
        let Some(mut store) = overlay.entrance.take() else {
            return Ok(());
        };
        let live = self.host.live_surfaces();
        let report = store.restore_all(&mut self.host, &live);
        debug!(overlay = %id, restored = report.restored, "detached entrance bindings");
        for (_, trigger, err) in report.failures {
            self.warn(format!("overlay {id}: cannot restore entrance {trigger}: {err}"));
        }
        Ok(())
    }

    /// Install the overlay and departure bindings on `surface`, once per
    /// surface per activation.
    fn install(&mut self, id: OverlayId, surface: SurfaceId) {
        let Some(overlay) = self.overlays.get_mut(&id) else {
            return;
        };
        let scope = overlay.config().install_scope;
        let entries: Vec<(Trigger, Mapping)> = overlay
            .bindings()
            .active_bindings()
            .map(|(set, binding)| {
                let route = Route {
                    overlay: id,
                    set,
                    trigger: binding.trigger.clone(),
                };
                (binding.trigger.clone(), Mapping::route(route, &binding.options))
            })
            .collect();
        let Some(session) = overlay.session_mut() else {
            return;
        };
        if !session.visited.insert(surface) {
            return;
        }

        let local = Scope::Surface(surface);
        let mut failures = Vec::new();
        for (trigger, mapping) in entries {
            let result = match scope {
                InstallScope::Surface => {
                    session
                        .snapshot
                        .install(&mut self.host, local, &trigger, mapping)
                }
                InstallScope::Global => {
                    shadow_local_override(&mut session.snapshot, &mut self.host, local, &trigger, &mapping)
                        .and_then(|()| {
                            session
                                .snapshot
                                .install(&mut self.host, Scope::Global, &trigger, mapping)
                        })
                }
            };
            if let Err(err) = result {
                failures.push(format!("overlay {id}: cannot install {trigger} on surface {surface}: {err}"));
            }
        }
        trace!(overlay = %id, %surface, ?scope, "installed overlay bindings");
        for message in failures {
            self.warn(message);
        }
    }

    fn focus(&mut self, surface: SurfaceId, view: ViewId) {
        let Some(id) = self.active else {
            return;
        };
        let subscribed = self
            .overlays
            .get(&id)
            .and_then(Overlay::session)
            .is_some_and(|s| s.focus.is_some());
        if !subscribed {
            return;
        }
        trace!(overlay = %id, %surface, %view, "focus changed");
        self.install(id, surface);
        let errors = match self.overlays.get_mut(&id).and_then(Overlay::session_mut) {
            Some(session) => session.shadows.reapply(&mut self.host, surface, view),
            None => Vec::new(),
        };
        for err in errors {
            self.warn(format!("overlay {id}: cannot shadow setting on focus change: {err}"));
        }
    }

    fn timer_fired(&mut self, handle: TimerHandle) -> Result<()> {
        let owner = self.active.filter(|id| {
            self.overlays
                .get(id)
                .and_then(Overlay::session)
                .is_some_and(|s| s.timeout.owns(handle))
        });
        match owner {
            Some(id) => {
                debug!(overlay = %id, "idle timeout");
                self.exit(id)?;
            }
            None => trace!(?handle, "ignoring stale timer"),
        }
        Ok(())
    }

    fn route(&mut self, route: Route) -> Result<()> {
        let id = route.overlay;
        let overlay = self.overlays.get(&id).ok_or(Error::UnknownOverlay(id))?;
        let Some(binding) = overlay.bindings().get(route.set, &route.trigger).cloned() else {
            warn!(overlay = %id, trigger = %route.trigger, set = %route.set, "no binding for route");
            return Ok(());
        };
        let active = overlay.is_active();
        trace!(overlay = %id, trigger = %route.trigger, set = %route.set, "dispatch");

        match route.set {
            SetKind::Entrance => {
                self.enter(id)?;
                self.run(id, SetKind::Entrance, &binding);
            }
            SetKind::Overlay if active => {
                if let Some(session) = self.overlays.get_mut(&id).and_then(Overlay::session_mut) {
                    session.timeout.refresh(&mut self.host);
                }
                self.run(id, SetKind::Overlay, &binding);
            }
            SetKind::Departure if active => {
                if binding.options.after_exit {
                    self.exit(id)?;
                    self.run(id, SetKind::Departure, &binding);
                } else {
                    self.run(id, SetKind::Departure, &binding);
                    self.exit(id)?;
                }
            }
            SetKind::Overlay | SetKind::Departure => {
                warn!(overlay = %id, trigger = %route.trigger, "route for inactive overlay ignored");
            }
        }
        Ok(())
    }

    fn run(&mut self, id: OverlayId, set: SetKind, binding: &Binding) {
        let result = match &binding.action {
            Action::Noop => Ok(()),
            Action::Command(command) => self.host.execute(command, &binding.options.for_host()),
            Action::PassThrough => self.pass_through(id, set, &binding.trigger),
            Action::Callback(callback) => {
                let callback = callback.clone();
                let mut cx = ActionCx::new(id, &binding.trigger, &mut self.host, &mut self.requests);
                callback(&mut cx);
                Ok(())
            }
        };
        if let Err(err) = result {
            self.warn(format!("overlay {id}: action for {} failed: {err}", binding.trigger));
        }
    }

    /// Forward `trigger` to whatever it resolved to before the overlay.
    fn pass_through(
        &mut self,
        id: OverlayId,
        set: SetKind,
        trigger: &Trigger,
    ) -> std::result::Result<(), HostError> {
        let original = self.original(id, set, trigger)?;
        match original {
            Some(Mapping {
                target: Target::Command(command),
                options,
            }) => self.host.execute(&command, &options),
            Some(Mapping {
                target: Target::Overlay(route),
                ..
            }) if route.overlay != id => {
                self.requests.push(Request::Dispatch(route));
                Ok(())
            }
            _ => self.host.feed(trigger),
        }
    }

    fn original(
        &self,
        id: OverlayId,
        set: SetKind,
        trigger: &Trigger,
    ) -> std::result::Result<Option<Mapping>, HostError> {
        let Some(overlay) = self.overlays.get(&id) else {
            return Ok(None);
        };
        if set == SetKind::Entrance {
            return Ok(match overlay.entrance.as_ref().and_then(|s| s.lookup(Scope::Global, trigger)) {
                Some(Snapshot::Present(mapping)) => Some(mapping.clone()),
                _ => None,
            });
        }
        let surface = self.host.current_surface();
        match overlay.snapshot() {
            Some(store) => store.original(&self.host, surface, trigger),
            None => SnapshotStore::new().original(&self.host, surface, trigger),
        }
    }

    fn drain(&mut self) {
        let mut processed = 0;
        while !self.requests.is_empty() {
            for request in std::mem::take(&mut self.requests) {
                if processed == MAX_CHAINED_REQUESTS {
                    self.requests.clear();
                    self.warn(format!(
                        "dropping queued requests after {MAX_CHAINED_REQUESTS} chained operations"
                    ));
                    return;
                }
                processed += 1;
                trace!(?request, "processing queued request");
                let result = match request {
                    Request::Activate(id) => self.enter(id).map(drop),
                    Request::Deactivate(id) => self.exit(id).map(drop),
                    Request::Toggle(id) => self.flip(id).map(drop),
                    Request::Exit => match self.active {
                        Some(id) => self.exit(id).map(drop),
                        None => Ok(()),
                    },
                    Request::Dispatch(route) => self.route(route),
                };
                if let Err(err) = result {
                    self.warn(format!("queued request failed: {err}"));
                }
            }
        }
    }

    fn publish(&self) {
        self.active_tx.send_replace(self.active());
    }

    fn warn(&mut self, message: String) {
        warn!("{message}");
        self.host.notify(Notice::warn(message));
    }
}

impl<H: Host> std::fmt::Debug for Controller<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("overlays", &self.overlays.len())
            .field("active", &self.active)
            .field("pending", &self.requests.len())
            .finish()
    }
}

/// In global install mode, a surface-local association of an overlay trigger
/// would win over the global overlay binding. Capture and overwrite it.
fn shadow_local_override<H: Host>(
    store: &mut SnapshotStore,
    host: &mut H,
    local: Scope,
    trigger: &Trigger,
    mapping: &Mapping,
) -> std::result::Result<(), HostError> {
    if store.lookup(local, trigger).is_some() || host.get(local, trigger)?.is_some() {
        store.install(host, local, trigger, mapping.clone())?;
    }
    Ok(())
}
