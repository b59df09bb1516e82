//! Core of **keylayer**: temporary key-binding overlays for modal editors.
//!
//! An overlay is a named set of bindings that, while active, shadows the
//! editor's normal bindings. Activating it records everything it overwrites
//! (key associations and settings touched by its hooks); deactivating it puts
//! every one of those back exactly as it was, including "nothing was bound".
//!
//! # Key types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`OverlayDecl`] | Declarative input: entrance, overlay and departure bindings plus config |
//! | [`Overlay`] | A validated overlay with its normalized [`BindingTable`] |
//! | [`Controller`] | Owns overlays, the single active slot, and drives transitions |
//! | [`Host`] | What the embedding editor provides: keymap, surfaces, settings, timers |
//! | [`SnapshotStore`] | Captured associations and their replay |
//! | [`OptionShadow`] | Reversible setting writes from enter hooks |
//! | [`TestSession`](testing::TestSession) | In-memory host and input loop for tests |
//!
//! # Lifecycle
//!
//! 1. **attach** -- entrance bindings are installed globally.
//! 2. **activate** -- the previously active overlay is fully deactivated,
//!    enter hooks run, overlay and departure bindings are installed on the
//!    focused surface (and on every surface focused later), the idle timer
//!    starts.
//! 3. **dispatch** -- the host hands overlay-owned triggers back through
//!    [`HostEvent::Triggered`] and the controller runs the bound [`Action`].
//! 4. **deactivate** -- on a departure trigger, idle timeout or explicit call:
//!    exit hooks run, then everything captured is restored.
//!
//! Host callbacks ([`HostEvent`]) and lifecycle requests made from hooks are
//! processed on the thread that owns the controller; nothing here is `Send`.

pub mod binding;
pub mod context;
pub mod controller;
pub mod decl;
pub mod error;
pub mod host;
pub mod normalize;
pub mod overlay;
pub mod scheduler;
pub mod shadow;
pub mod snapshot;
pub mod testing;
pub mod timeout;
pub mod trigger;

pub use binding::{Action, Binding, BindingOptions, Mapping, Route, SetKind, Target};
pub use context::{ActionCx, HookCx, Phase, Request};
pub use controller::{ActiveOverlay, Controller, HostEvent, Transition};
pub use decl::{BindingDecl, Modes, OverlayDecl};
pub use error::{Error, HostError, Result, ValidationError};
pub use host::{
    BindingRegistry, Host, Notice, Scheduler, Scope, SettingTarget, SettingValue, SettingsStore,
    SubscriptionHandle, SurfaceId, SurfaceRegistry, TimerHandle, ViewId,
};
pub use normalize::{normalize, BindingTable};
pub use overlay::{Hook, InstallScope, Overlay, OverlayConfig, OverlayId, OverlayState};
pub use scheduler::TokioScheduler;
pub use shadow::{OptionShadow, SettingScope, ShadowStore};
pub use snapshot::{RestoreReport, Snapshot, SnapshotStore};
pub use timeout::TimeoutController;
pub use trigger::{Mode, Trigger};
