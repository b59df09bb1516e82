//! Turns an [`OverlayDecl`] into a canonical, validated [`BindingTable`].

use crate::binding::{Action, Binding, BindingOptions, SetKind};
use crate::decl::{BindingDecl, OverlayDecl};
use crate::error::ValidationError;
use crate::trigger::{canonicalize, Mode, Trigger};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Standard "cancel" input used when no departure is declared.
pub const DEFAULT_DEPARTURE: &str = "<Esc>";

/// Immutable canonical bindings of one overlay, keyed by trigger per set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingTable {
    entrance: BTreeMap<Trigger, Binding>,
    overlay: BTreeMap<Trigger, Binding>,
    departure: BTreeMap<Trigger, Binding>,
}

impl BindingTable {
    /// Bindings of one set.
    pub fn set(&self, kind: SetKind) -> &BTreeMap<Trigger, Binding> {
        match kind {
            SetKind::Entrance => &self.entrance,
            SetKind::Overlay => &self.overlay,
            SetKind::Departure => &self.departure,
        }
    }

    /// Look up a binding.
    pub fn get(&self, kind: SetKind, trigger: &Trigger) -> Option<&Binding> {
        self.set(kind).get(trigger)
    }

    /// Bindings installed while the overlay is active: overlay then departure.
    pub fn active_bindings(&self) -> impl Iterator<Item = (SetKind, &Binding)> {
        self.overlay
            .values()
            .map(|b| (SetKind::Overlay, b))
            .chain(self.departure.values().map(|b| (SetKind::Departure, b)))
    }

    /// Every mode any binding uses.
    pub fn modes(&self) -> BTreeSet<Mode> {
        self.entrance
            .keys()
            .chain(self.overlay.keys())
            .chain(self.departure.keys())
            .map(|t| t.mode().clone())
            .collect()
    }
}

/// Validate and canonicalize a declaration.
///
/// Multi-mode entries fan out to one binding per mode. Duplicates within a
/// set, collisions between sets, misplaced `after_exit` flags and mistyped
/// options are hard errors naming the offending field.
pub fn normalize(decl: &OverlayDecl) -> Result<BindingTable, ValidationError> {
    if decl.config.timeout == Some(Duration::ZERO) {
        return Err(ValidationError::new(
            "config.timeout_ms",
            "timeout must be greater than zero",
        ));
    }

    let mut table = BindingTable::default();
    table.entrance = build_set(SetKind::Entrance, &decl.entrance, &[])?;
    table.overlay = build_set(SetKind::Overlay, &decl.overlay, &[&table.entrance])?;
    table.departure = build_set(
        SetKind::Departure,
        &decl.departure,
        &[&table.entrance, &table.overlay],
    )?;

    if table.departure.is_empty() {
        table.departure = default_departure(&table)?;
    }
    Ok(table)
}

fn build_set(
    kind: SetKind,
    decls: &[BindingDecl],
    disjoint_from: &[&BTreeMap<Trigger, Binding>],
) -> Result<BTreeMap<Trigger, Binding>, ValidationError> {
    let mut set = BTreeMap::new();
    for (i, decl) in decls.iter().enumerate() {
        let path = format!("{kind}[{i}]");
        let keys = canonicalize(&decl.trigger)
            .map_err(|msg| ValidationError::new(format!("{path}.trigger"), msg))?;
        let options = parse_options(&path, kind, &decl.options)?;

        let modes = decl.modes.as_slice();
        if modes.is_empty() {
            return Err(ValidationError::new(
                format!("{path}.mode"),
                "at least one mode is required",
            ));
        }
        for (j, tag) in modes.iter().enumerate() {
            let mode = Mode::new(tag.as_str())
                .map_err(|e| ValidationError::new(format!("{path}.mode[{j}]"), e.message))?;
            let trigger = Trigger::from_parts(mode, keys.clone());

            if set.contains_key(&trigger) {
                return Err(ValidationError::new(
                    format!("{path}.trigger"),
                    format!("`{trigger}` is declared more than once in {kind}"),
                ));
            }
            if disjoint_from.iter().any(|other| other.contains_key(&trigger)) {
                return Err(ValidationError::new(
                    format!("{path}.trigger"),
                    format!("`{trigger}` is already bound by another binding set"),
                ));
            }

            set.insert(
                trigger.clone(),
                Binding {
                    trigger,
                    action: decl.action.clone().unwrap_or_default(),
                    options: options.clone(),
                },
            );
        }
    }
    Ok(set)
}

fn parse_options(
    path: &str,
    kind: SetKind,
    raw: &BTreeMap<String, Value>,
) -> Result<BindingOptions, ValidationError> {
    let mut options = BindingOptions::default();
    for (name, value) in raw {
        let field = format!("{path}.options.{name}");
        let flag = || {
            value
                .as_bool()
                .ok_or_else(|| ValidationError::new(&field, "expected a boolean"))
        };
        match name.as_str() {
            "expr" => options.expr = flag()?,
            "silent" => options.silent = flag()?,
            "nowait" => options.nowait = flag()?,
            "after_exit" => {
                if kind != SetKind::Departure {
                    return Err(ValidationError::new(
                        &field,
                        "after_exit is only allowed on departure bindings",
                    ));
                }
                options.after_exit = flag()?;
            }
            "desc" => {
                let desc = value
                    .as_str()
                    .ok_or_else(|| ValidationError::new(&field, "expected a string"))?;
                options.desc = Some(desc.to_string());
            }
            _ => return Err(ValidationError::new(&field, "unknown option")),
        }
    }
    Ok(options)
}

/// One `<Esc>` per overlay mode, skipping modes where the overlay set already
/// binds it.
fn default_departure(table: &BindingTable) -> Result<BTreeMap<Trigger, Binding>, ValidationError> {
    let keys = canonicalize(DEFAULT_DEPARTURE)
        .map_err(|msg| ValidationError::new("departure", msg))?;
    let mut modes: BTreeSet<Mode> = table.overlay.keys().map(|t| t.mode().clone()).collect();
    if modes.is_empty() {
        modes.insert(Mode::normal());
    }

    let mut set = BTreeMap::new();
    for mode in modes {
        let trigger = Trigger::from_parts(mode, keys.clone());
        if table.overlay.contains_key(&trigger) || table.entrance.contains_key(&trigger) {
            continue;
        }
        set.insert(
            trigger.clone(),
            Binding {
                trigger,
                action: Action::Noop,
                options: BindingOptions {
                    desc: Some("leave overlay".to_string()),
                    ..Default::default()
                },
            },
        );
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(mode: &str, keys: &str) -> Trigger {
        Trigger::new(mode, keys).unwrap()
    }

    #[test]
    fn fans_out_modes() {
        let decl = OverlayDecl::new().with_overlay(
            BindingDecl::new(["n", "v"], "l").action(Action::command("scroll-right")),
        );
        let table = normalize(&decl).unwrap();
        let overlay = table.set(SetKind::Overlay);
        assert_eq!(overlay.len(), 2);
        assert!(overlay.contains_key(&t("n", "l")));
        assert!(overlay.contains_key(&t("v", "l")));
        assert_eq!(
            overlay[&t("v", "l")].action,
            Action::command("scroll-right")
        );
    }

    #[test]
    fn canonicalizes_triggers() {
        let decl = OverlayDecl::new().with_overlay(BindingDecl::new("n", "<c-A>"));
        let table = normalize(&decl).unwrap();
        assert!(table.get(SetKind::Overlay, &t("n", "<C-a>")).is_some());
    }

    #[test]
    fn missing_action_is_noop() {
        let decl = OverlayDecl::new().with_overlay(BindingDecl::new("n", "x"));
        let table = normalize(&decl).unwrap();
        assert_eq!(table.get(SetKind::Overlay, &t("n", "x")).unwrap().action, Action::Noop);
    }

    #[test]
    fn synthesizes_default_departure_per_mode() {
        let decl = OverlayDecl::new()
            .with_overlay(BindingDecl::new("n", "l"))
            .with_overlay(BindingDecl::new("v", "l"));
        let table = normalize(&decl).unwrap();
        let departure = table.set(SetKind::Departure);
        assert_eq!(departure.len(), 2);
        assert!(departure.contains_key(&t("n", "<Esc>")));
        assert!(departure.contains_key(&t("v", "<Esc>")));
    }

    #[test]
    fn default_departure_falls_back_to_normal_mode() {
        let table = normalize(&OverlayDecl::new()).unwrap();
        assert_eq!(
            table.set(SetKind::Departure).keys().collect::<Vec<_>>(),
            vec![&t("n", "<Esc>")]
        );
    }

    #[test]
    fn default_departure_skips_modes_binding_escape() {
        let decl = OverlayDecl::new()
            .with_overlay(BindingDecl::new("n", "<esc>"))
            .with_overlay(BindingDecl::new("i", "j"));
        let table = normalize(&decl).unwrap();
        let departure = table.set(SetKind::Departure);
        assert_eq!(departure.keys().collect::<Vec<_>>(), vec![&t("i", "<Esc>")]);
    }

    #[test]
    fn declared_departure_suppresses_default() {
        let decl = OverlayDecl::new()
            .with_overlay(BindingDecl::new("n", "l"))
            .with_departure(BindingDecl::new("n", "q"));
        let table = normalize(&decl).unwrap();
        assert_eq!(
            table.set(SetKind::Departure).keys().collect::<Vec<_>>(),
            vec![&t("n", "q")]
        );
    }

    #[test]
    fn duplicate_trigger_is_an_error() {
        let decl = OverlayDecl::new()
            .with_overlay(BindingDecl::new("n", "l"))
            .with_overlay(BindingDecl::new(["v", "n"], "l"));
        let err = normalize(&decl).unwrap_err();
        assert_eq!(err.field, "overlay[1].trigger");
    }

    #[test]
    fn spellings_collide_after_canonicalization() {
        let decl = OverlayDecl::new()
            .with_overlay(BindingDecl::new("n", "<esc>"))
            .with_overlay(BindingDecl::new("n", "<Esc>"));
        assert!(normalize(&decl).is_err());
    }

    #[test]
    fn entrance_must_not_overlap_overlay() {
        let decl = OverlayDecl::new()
            .with_entrance(BindingDecl::new("n", "<leader>s"))
            .with_overlay(BindingDecl::new("n", "<Leader>s"));
        let err = normalize(&decl).unwrap_err();
        assert_eq!(err.field, "overlay[0].trigger");
    }

    #[test]
    fn same_trigger_in_other_mode_is_fine() {
        let decl = OverlayDecl::new()
            .with_entrance(BindingDecl::new("n", "s"))
            .with_overlay(BindingDecl::new("v", "s"));
        assert!(normalize(&decl).is_ok());
    }

    #[test]
    fn overlay_and_departure_are_disjoint() {
        let decl = OverlayDecl::new()
            .with_overlay(BindingDecl::new("n", "q"))
            .with_departure(BindingDecl::new("n", "q"));
        let err = normalize(&decl).unwrap_err();
        assert_eq!(err.field, "departure[0].trigger");
    }

    #[test]
    fn mistyped_option_is_an_error() {
        let decl = OverlayDecl::new()
            .with_overlay(BindingDecl::new("n", "l"))
            .with_overlay(BindingDecl::new("n", "h").option("silent", "yes"));
        let err = normalize(&decl).unwrap_err();
        assert_eq!(err.field, "overlay[1].options.silent");
        assert_eq!(err.message, "expected a boolean");

        let decl = OverlayDecl::new().with_overlay(BindingDecl::new("n", "h").option("desc", 3));
        assert_eq!(normalize(&decl).unwrap_err().field, "overlay[0].options.desc");
    }

    #[test]
    fn unknown_option_is_an_error() {
        let decl = OverlayDecl::new().with_overlay(BindingDecl::new("n", "h").option("buffer", 1));
        assert_eq!(normalize(&decl).unwrap_err().message, "unknown option");
    }

    #[test]
    fn after_exit_only_on_departure() {
        let decl = OverlayDecl::new().with_overlay(BindingDecl::new("n", "h").after_exit());
        let err = normalize(&decl).unwrap_err();
        assert_eq!(err.field, "overlay[0].options.after_exit");

        let decl = OverlayDecl::new().with_departure(BindingDecl::new("n", "q").after_exit());
        let table = normalize(&decl).unwrap();
        assert!(table.get(SetKind::Departure, &t("n", "q")).unwrap().options.after_exit);
    }

    #[test]
    fn options_are_parsed() {
        let decl = OverlayDecl::new().with_overlay(
            BindingDecl::new("n", "h")
                .option("silent", true)
                .option("nowait", true)
                .option("expr", false)
                .desc("left"),
        );
        let table = normalize(&decl).unwrap();
        let opts = &table.get(SetKind::Overlay, &t("n", "h")).unwrap().options;
        assert!(opts.silent && opts.nowait && !opts.expr);
        assert_eq!(opts.desc.as_deref(), Some("left"));
    }

    #[test]
    fn empty_and_blank_modes_are_errors() {
        let decl = OverlayDecl::new().with_overlay(BindingDecl {
            modes: crate::decl::Modes::Many(vec![]),
            ..BindingDecl::new("n", "h")
        });
        assert_eq!(normalize(&decl).unwrap_err().field, "overlay[0].mode");

        let decl = OverlayDecl::new().with_overlay(BindingDecl::new(["n", " "], "h"));
        assert_eq!(normalize(&decl).unwrap_err().field, "overlay[0].mode[1]");
    }

    #[test]
    fn bad_trigger_is_an_error() {
        let decl = OverlayDecl::new().with_entrance(BindingDecl::new("n", "<Nope>"));
        assert_eq!(normalize(&decl).unwrap_err().field, "entrance[0].trigger");
    }

    #[test]
    fn zero_timeout_is_an_error() {
        let mut decl = OverlayDecl::new();
        decl.config.timeout = Some(Duration::ZERO);
        assert_eq!(normalize(&decl).unwrap_err().field, "config.timeout_ms");
    }

    #[test]
    fn modes_lists_every_set() {
        let decl = OverlayDecl::new()
            .with_entrance(BindingDecl::new("i", "<C-s>"))
            .with_overlay(BindingDecl::new("v", "l"));
        let modes: Vec<_> = normalize(&decl)
            .unwrap()
            .modes()
            .into_iter()
            .map(|m| m.to_string())
            .collect();
        assert_eq!(modes, vec!["i", "v"]);
    }
}
