//! **keylayer** -- temporary key-binding overlays for modal editors.
//!
//! This is the umbrella crate that re-exports everything from a single
//! dependency:
//!
//! ```toml
//! [dependencies]
//! keylayer = "0.1"
//! ```
//!
//! # Re-exports
//!
//! * All public items from [`keylayer_core`] are available at the crate root
//!   ([`Controller`], [`OverlayDecl`], [`Host`], [`TokioScheduler`], the
//!   [`testing`] harness, etc.).
//! * The [`widgets`] module re-exports [`keylayer_widgets`] (the active
//!   overlay indicator and the binding help panel).
//! * [`ratatui`], [`crossterm`], and [`tokio`] are re-exported so embedders
//!   do not need to depend on them directly.
//!
//! # Quick start
//!
//! ```
//! use keylayer::testing::TestSession;
//! use keylayer::{Action, BindingDecl, OverlayDecl};
//!
//! let mut session = TestSession::new();
//! let id = session
//!     .controller_mut()
//!     .create(
//!         OverlayDecl::new()
//!             .with_name("scroll")
//!             .with_overlay(BindingDecl::new("n", "l").action(Action::command("scroll-right"))),
//!     )
//!     .unwrap();
//!
//! session.controller_mut().activate(id).unwrap();
//! session.press("n", "l");
//! session.press("n", "<Esc>");
//! assert_eq!(session.host().executed(), ["scroll-right"]);
//! ```
//!
//! A real editor implements [`Host`] over its own keymap and settings and
//! feeds [`HostEvent`]s back into the [`Controller`]; see
//! `demos/scroll_overlay.rs` for an event loop driven by [`TokioScheduler`].

pub use keylayer_core::*;
pub mod widgets {
    pub use keylayer_widgets::*;
}

// Re-export dependencies for use in demos and downstream crates
pub use crossterm;
pub use ratatui;
pub use tokio;
