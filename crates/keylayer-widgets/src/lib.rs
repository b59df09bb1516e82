//! ratatui widgets for **keylayer**.
//!
//! Both widgets are stateless: build them each frame from the controller's
//! current state and render them with `frame.render_widget`.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`indicator`] | One-row badge naming the active overlay |
//! | [`help`] | Grouped binding panel and one-line binding summary |

pub mod help;
pub mod indicator;

pub use help::{BindingHelp, HelpEntry, HelpStyle};
pub use indicator::Indicator;
