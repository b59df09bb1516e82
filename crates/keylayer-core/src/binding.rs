//! Bindings, actions and the descriptors stored in the host registry.

use crate::context::ActionCx;
use crate::overlay::OverlayId;
use crate::trigger::Trigger;
use std::fmt;
use std::rc::Rc;

/// An in-process action run when a binding fires.
pub type Callback = Rc<dyn Fn(&mut ActionCx<'_>)>;

/// What a binding does when its trigger fires.
#[derive(Clone, Default)]
pub enum Action {
    /// Suppress the trigger.
    #[default]
    Noop,
    /// Forward to whatever the trigger resolved to before it was shadowed.
    PassThrough,
    /// A host action reference, forwarded to [`Host::execute`](crate::host::Host::execute).
    Command(String),
    /// Run a callback with access to the host and the controller.
    Callback(Callback),
}

impl Action {
    /// Wrap a closure as a callback action.
    pub fn callback(f: impl Fn(&mut ActionCx<'_>) + 'static) -> Self {
        Action::Callback(Rc::new(f))
    }

    /// Build a host command action.
    pub fn command(cmd: impl Into<String>) -> Self {
        Action::Command(cmd.into())
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Noop => f.write_str("Noop"),
            Action::PassThrough => f.write_str("PassThrough"),
            Action::Command(cmd) => f.debug_tuple("Command").field(cmd).finish(),
            Action::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Action::Noop, Action::Noop) | (Action::PassThrough, Action::PassThrough) => true,
            (Action::Command(a), Action::Command(b)) => a == b,
            (Action::Callback(a), Action::Callback(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Recognized binding flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingOptions {
    /// Evaluate the action's result as a host command.
    pub expr: bool,
    /// Suppress command echo.
    pub silent: bool,
    /// Do not wait for the ambiguous-prefix timeout.
    pub nowait: bool,
    /// Human-readable description, shown in help panels.
    pub desc: Option<String>,
    /// Departure bindings only: run the action after deactivation completes.
    pub after_exit: bool,
}

impl BindingOptions {
    /// The flags that are meaningful to the host registry.
    pub fn for_host(&self) -> Self {
        Self {
            after_exit: false,
            ..self.clone()
        }
    }
}

/// The three disjoint binding collections of an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SetKind {
    /// Installed while the overlay is inactive; fires activation.
    Entrance,
    /// The shadowing layer, installed while the overlay is active.
    Overlay,
    /// Installed while active; fires deactivation.
    Departure,
}

impl SetKind {
    /// Field name used in declarations and error paths.
    pub fn as_str(self) -> &'static str {
        match self {
            SetKind::Entrance => "entrance",
            SetKind::Overlay => "overlay",
            SetKind::Departure => "departure",
        }
    }
}

impl fmt::Display for SetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized binding.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// The canonical trigger.
    pub trigger: Trigger,
    /// What firing it does.
    pub action: Action,
    /// Flags.
    pub options: BindingOptions,
}

/// Where a trigger that belongs to an overlay should be dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Route {
    /// Owning overlay.
    pub overlay: OverlayId,
    /// Which of its binding sets the trigger belongs to.
    pub set: SetKind,
    /// The trigger itself.
    pub trigger: Trigger,
}

/// The target half of a host descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// A host-side command.
    Command(String),
    /// An overlay-owned binding; the host hands it back through
    /// [`Controller::dispatch`](crate::controller::Controller::dispatch).
    Overlay(Route),
}

/// An association stored in the host registry.
///
/// The controller treats mappings it did not create as opaque: they are
/// captured and reinstalled verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    /// What the trigger resolves to.
    pub target: Target,
    /// Flags the host applies to the association.
    pub options: BindingOptions,
}

impl Mapping {
    /// A host command mapping with default flags.
    pub fn command(cmd: impl Into<String>) -> Self {
        Self {
            target: Target::Command(cmd.into()),
            options: BindingOptions::default(),
        }
    }

    /// The mapping an overlay installs for one of its bindings.
    pub fn route(route: Route, options: &BindingOptions) -> Self {
        Self {
            target: Target::Overlay(route),
            options: options.for_host(),
        }
    }

    /// The route, if this mapping belongs to an overlay.
    pub fn as_route(&self) -> Option<&Route> {
        match &self.target {
            Target::Overlay(route) => Some(route),
            Target::Command(_) => None,
        }
    }
}
