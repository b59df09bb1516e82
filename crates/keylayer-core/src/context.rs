//! Contexts handed to hooks and callback actions.
//!
//! Neither context can reach the controller directly. Lifecycle changes
//! requested from inside a hook or callback are queued and carried out once
//! the operation that invoked them has finished, so a hook can never observe
//! (or corrupt) a half-applied transition.

use crate::binding::Route;
use crate::host::{Host, SurfaceId, ViewId};
use crate::overlay::OverlayId;
use crate::shadow::{OptionShadow, ShadowStore};
use crate::trigger::Trigger;

/// A deferred controller operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Activate an overlay.
    Activate(OverlayId),
    /// Deactivate an overlay.
    Deactivate(OverlayId),
    /// Toggle an overlay.
    Toggle(OverlayId),
    /// Deactivate whichever overlay is active.
    Exit,
    /// Dispatch a route as if the host had delivered it.
    Dispatch(Route),
}

/// Which lifecycle edge a hook runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Activation; option shadowing is enabled.
    Enter,
    /// Deactivation; option shadowing is disabled.
    Exit,
}

/// Context passed to enter and exit hooks.
pub struct HookCx<'a> {
    overlay: OverlayId,
    phase: Phase,
    host: &'a mut dyn Host,
    shadows: Option<&'a mut ShadowStore>,
    surface: SurfaceId,
    view: ViewId,
    requests: &'a mut Vec<Request>,
}

impl<'a> HookCx<'a> {
    pub(crate) fn new(
        overlay: OverlayId,
        phase: Phase,
        host: &'a mut dyn Host,
        shadows: Option<&'a mut ShadowStore>,
        requests: &'a mut Vec<Request>,
    ) -> Self {
        let surface = host.current_surface();
        let view = host.current_view();
        Self {
            overlay,
            phase,
            host,
            shadows,
            surface,
            view,
            requests,
        }
    }

    /// The overlay whose hook is running.
    pub fn overlay(&self) -> OverlayId {
        self.overlay
    }

    /// Enter or exit.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The surface focused when the hook started.
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    /// The view focused when the hook started.
    pub fn view(&self) -> ViewId {
        self.view
    }

    /// Direct host access. Changes made here are not undone.
    pub fn host(&mut self) -> &mut dyn Host {
        &mut *self.host
    }

    /// The option-shadowing accessor.
    pub fn options(&mut self) -> OptionShadow<'_> {
        OptionShadow::new(
            self.overlay,
            &mut *self.host,
            self.shadows.as_deref_mut(),
            self.surface,
            self.view,
        )
    }

    /// Queue a controller operation.
    pub fn request(&mut self, request: Request) {
        self.requests.push(request);
    }
}

/// Context passed to callback actions.
pub struct ActionCx<'a> {
    overlay: OverlayId,
    trigger: &'a Trigger,
    host: &'a mut dyn Host,
    requests: &'a mut Vec<Request>,
}

impl<'a> ActionCx<'a> {
    pub(crate) fn new(
        overlay: OverlayId,
        trigger: &'a Trigger,
        host: &'a mut dyn Host,
        requests: &'a mut Vec<Request>,
    ) -> Self {
        Self {
            overlay,
            trigger,
            host,
            requests,
        }
    }

    /// The overlay that owns the fired binding.
    pub fn overlay(&self) -> OverlayId {
        self.overlay
    }

    /// The trigger that fired.
    pub fn trigger(&self) -> &Trigger {
        self.trigger
    }

    /// Direct host access.
    pub fn host(&mut self) -> &mut dyn Host {
        &mut *self.host
    }

    /// Queue a controller operation.
    pub fn request(&mut self, request: Request) {
        self.requests.push(request);
    }

    /// Queue deactivation of the owning overlay.
    pub fn exit(&mut self) {
        self.request(Request::Deactivate(self.overlay));
    }
}
