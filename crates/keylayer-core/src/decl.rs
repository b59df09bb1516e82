//! Declarative overlay input, as written by users or loaded from JSON.
//!
//! Declarations are deliberately loose (an entry may name several modes,
//! options are untyped) so they can come from configuration files. They are
//! turned into an immutable [`BindingTable`](crate::normalize::BindingTable)
//! by [`normalize`](crate::normalize::normalize), which rejects anything
//! malformed.
//!
//! ```
//! use keylayer_core::decl::{BindingDecl, OverlayDecl};
//!
//! let decl = OverlayDecl::from_json(r#"{
//!     "name": "scroll",
//!     "overlay": [
//!         { "mode": "n", "trigger": "l", "action": "scroll-right" },
//!         { "mode": ["n", "v"], "trigger": "h", "action": "scroll-left",
//!           "options": { "desc": "scroll left" } }
//!     ],
//!     "config": { "timeout_ms": 1000 }
//! }"#).unwrap();
//! assert_eq!(decl.overlay.len(), 2);
//! ```

use crate::binding::Action;
use crate::error::Result;
use crate::overlay::OverlayConfig;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// One mode or a list of modes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Modes {
    /// A single mode tag.
    One(String),
    /// Several mode tags; the entry fans out to each.
    Many(Vec<String>),
}

impl Modes {
    /// The mode tags in declaration order.
    pub fn as_slice(&self) -> &[String] {
        match self {
            Modes::One(m) => std::slice::from_ref(m),
            Modes::Many(ms) => ms,
        }
    }
}

impl From<&str> for Modes {
    fn from(m: &str) -> Self {
        Modes::One(m.to_string())
    }
}

impl<const N: usize> From<[&str; N]> for Modes {
    fn from(ms: [&str; N]) -> Self {
        Modes::Many(ms.iter().map(|m| m.to_string()).collect())
    }
}

/// A single declared binding.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BindingDecl {
    /// Mode or modes the binding applies to.
    #[serde(rename = "mode")]
    pub modes: Modes,
    /// Trigger in key notation.
    pub trigger: String,
    /// Action; [`Action::Noop`] when omitted.
    #[serde(default, deserialize_with = "action_from_str")]
    pub action: Option<Action>,
    /// Raw options, type-checked during normalization.
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
}

impl BindingDecl {
    /// Declare a binding for `modes` on `trigger`.
    pub fn new(modes: impl Into<Modes>, trigger: impl Into<String>) -> Self {
        Self {
            modes: modes.into(),
            trigger: trigger.into(),
            action: None,
            options: BTreeMap::new(),
        }
    }

    /// Set the action.
    pub fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    /// Set a raw option.
    pub fn option(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(name.into(), value.into());
        self
    }

    /// Shorthand for the `desc` option.
    pub fn desc(self, desc: impl Into<String>) -> Self {
        self.option("desc", desc.into())
    }

    /// Shorthand for `after_exit = true`.
    pub fn after_exit(self) -> Self {
        self.option("after_exit", true)
    }
}

/// Complete declarative input for one overlay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OverlayDecl {
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Bindings that activate the overlay.
    #[serde(default)]
    pub entrance: Vec<BindingDecl>,
    /// Bindings shadowed while the overlay is active.
    #[serde(default)]
    pub overlay: Vec<BindingDecl>,
    /// Bindings that deactivate the overlay.
    #[serde(default)]
    pub departure: Vec<BindingDecl>,
    /// Hooks, timeout and install scope.
    #[serde(default)]
    pub config: OverlayConfig,
}

impl OverlayDecl {
    /// An empty declaration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a declaration from JSON. Hooks must be attached afterwards.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add an entrance binding.
    pub fn with_entrance(mut self, decl: BindingDecl) -> Self {
        self.entrance.push(decl);
        self
    }

    /// Add an overlay binding.
    pub fn with_overlay(mut self, decl: BindingDecl) -> Self {
        self.overlay.push(decl);
        self
    }

    /// Add a departure binding.
    pub fn with_departure(mut self, decl: BindingDecl) -> Self {
        self.departure.push(decl);
        self
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: OverlayConfig) -> Self {
        self.config = config;
        self
    }
}

/// `"<Nop>"` is a no-op, `"<Pass>"` passes through, anything else is a host
/// command.
fn action_from_str<'de, D>(de: D) -> std::result::Result<Option<Action>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(de)?;
    Ok(raw.map(|s| {
        if s.eq_ignore_ascii_case("<nop>") {
            Action::Noop
        } else if s.eq_ignore_ascii_case("<pass>") {
            Action::PassThrough
        } else {
            Action::Command(s)
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::InstallScope;
    use std::time::Duration;

    #[test]
    fn builder_collects_bindings() {
        let decl = OverlayDecl::new()
            .with_name("scroll")
            .with_overlay(BindingDecl::new("n", "l").action(Action::command("scroll-right")))
            .with_departure(BindingDecl::new(["n", "v"], "q").after_exit());
        assert_eq!(decl.name.as_deref(), Some("scroll"));
        assert_eq!(decl.overlay.len(), 1);
        assert_eq!(decl.departure[0].modes.as_slice(), ["n", "v"]);
        assert_eq!(decl.departure[0].options["after_exit"], Value::Bool(true));
    }

    #[test]
    fn json_actions_map_to_variants() {
        let decl = OverlayDecl::from_json(
            r#"{
                "overlay": [
                    { "mode": "n", "trigger": "x", "action": "<Nop>" },
                    { "mode": "n", "trigger": "y", "action": "<pass>" },
                    { "mode": "n", "trigger": "z", "action": "write" },
                    { "mode": "n", "trigger": "w" }
                ]
            }"#,
        )
        .unwrap();
        let actions: Vec<_> = decl.overlay.iter().map(|b| b.action.clone()).collect();
        assert_eq!(
            actions,
            vec![
                Some(Action::Noop),
                Some(Action::PassThrough),
                Some(Action::command("write")),
                None
            ]
        );
    }

    #[test]
    fn json_config_reads_timeout_and_scope() {
        let decl = OverlayDecl::from_json(
            r#"{ "config": { "timeout_ms": 250, "install_scope": "global" } }"#,
        )
        .unwrap();
        assert_eq!(decl.config.timeout, Some(Duration::from_millis(250)));
        assert_eq!(decl.config.install_scope, InstallScope::Global);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = OverlayDecl::from_json(r#"{ "overlays": [] }"#).unwrap_err();
        assert!(err.to_string().contains("overlays"));
    }
}
