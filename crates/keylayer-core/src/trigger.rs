//! Canonical triggers: a key sequence in a given mode.
//!
//! Key sequences use the familiar angle-bracket notation (`<Esc>`, `<C-a>`,
//! `gg`). Every trigger is stored in canonical form so that `<esc>`,
//! `<ESC>` and `<Esc>` name the same binding, and so triggers coming from a
//! terminal front end (crossterm [`KeyEvent`]s) line up with declared ones.

use crate::error::ValidationError;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::fmt;

/// Named keys and their accepted spellings. The first entry is canonical.
const NAMED_KEYS: &[&[&str]] = &[
    &["Esc", "Escape"],
    &["CR", "Enter", "Return"],
    &["Tab"],
    &["BS", "Backspace"],
    &["Space"],
    &["lt"],
    &["Bar"],
    &["Bslash"],
    &["Del", "Delete"],
    &["Insert", "Ins"],
    &["Up"],
    &["Down"],
    &["Left"],
    &["Right"],
    &["Home"],
    &["End"],
    &["PageUp"],
    &["PageDown"],
    &["Nul"],
    &["Leader"],
    &["LocalLeader"],
];

const MAX_FUNCTION_KEY: u8 = 24;

/// An editing-mode tag such as `n`, `i` or `v`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mode(String);

impl Mode {
    /// Create a mode tag. Blank tags are rejected.
    pub fn new(tag: impl Into<String>) -> Result<Self, ValidationError> {
        let tag = tag.into();
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::new("mode", "mode must not be blank"));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Normal mode (`n`), the default mode for synthesized departures.
    pub fn normal() -> Self {
        Self("n".to_string())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A canonical key sequence within a mode; unique key within a binding scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Trigger {
    mode: Mode,
    keys: String,
}

impl Trigger {
    /// Build a trigger, canonicalizing `keys`.
    pub fn new(mode: &str, keys: &str) -> Result<Self, ValidationError> {
        let mode = Mode::new(mode)?;
        let keys = canonicalize(keys).map_err(|message| ValidationError::new("trigger", message))?;
        Ok(Self { mode, keys })
    }

    /// Build a trigger from an already validated mode and canonical keys.
    pub(crate) fn from_parts(mode: Mode, keys: String) -> Self {
        Self { mode, keys }
    }

    /// Build a trigger from a terminal key event.
    ///
    /// Returns `None` for keys that have no notation (media keys, bare
    /// modifier presses and the like).
    pub fn from_key_event(mode: Mode, event: &KeyEvent) -> Option<Self> {
        key_event_notation(event).map(|keys| Self { mode, keys })
    }

    /// The mode this trigger belongs to.
    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    /// The canonical key sequence.
    pub fn keys(&self) -> &str {
        &self.keys
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.mode, self.keys)
    }
}

/// Canonicalize a key sequence.
///
/// Plain characters are kept verbatim. `<...>` tokens are parsed
/// case-insensitively as `[C-][A-|M-][S-][D-]key` and rendered with the
/// canonical spelling. A `<` that does not open a token is a literal `<`,
/// written `<lt>`.
pub fn canonicalize(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        return Err("trigger must not be empty".to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(c) = rest.chars().next() {
        if c == '<' {
            if let Some(end) = rest[1..].find('>') {
                let inner = &rest[1..1 + end];
                if !inner.is_empty() {
                    out.push_str(&canonical_token(inner)?);
                    rest = &rest[end + 2..];
                    continue;
                }
            }
        }
        if c == '<' {
            out.push_str("<lt>");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }
    Ok(out)
}

#[derive(Default)]
struct Mods {
    ctrl: bool,
    alt: bool,
    shift: bool,
    meta: bool,
}

impl Mods {
    fn any(&self) -> bool {
        self.ctrl || self.alt || self.shift || self.meta
    }

    fn prefix(&self) -> String {
        let mut p = String::new();
        if self.ctrl {
            p.push_str("C-");
        }
        if self.alt {
            p.push_str("A-");
        }
        if self.shift {
            p.push_str("S-");
        }
        if self.meta {
            p.push_str("D-");
        }
        p
    }
}

fn canonical_token(inner: &str) -> Result<String, String> {
    let mut mods = Mods::default();
    let mut rest = inner;
    loop {
        let bytes = rest.as_bytes();
        if bytes.len() > 2 && bytes[1] == b'-' {
            match bytes[0].to_ascii_uppercase() {
                b'C' => mods.ctrl = true,
                b'A' | b'M' => mods.alt = true,
                b'S' => mods.shift = true,
                b'D' => mods.meta = true,
                _ => break,
            }
            rest = &rest[2..];
        } else {
            break;
        }
    }

    let mut chars = rest.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(single_char(c, mods));
    }

    let name = named_key(rest).ok_or_else(|| format!("unknown key `<{inner}>`"))?;
    Ok(format!("<{}{}>", mods.prefix(), name))
}

fn single_char(c: char, mut mods: Mods) -> String {
    let c = if mods.shift && c.is_alphabetic() && !mods.ctrl {
        mods.shift = false;
        c.to_uppercase().next().unwrap_or(c)
    } else if mods.ctrl && c.is_ascii_alphabetic() {
        c.to_ascii_lowercase()
    } else {
        c
    };
    if !mods.any() {
        return c.to_string();
    }
    format!("<{}{}>", mods.prefix(), c)
}

fn named_key(name: &str) -> Option<String> {
    for spellings in NAMED_KEYS {
        if spellings.iter().any(|s| s.eq_ignore_ascii_case(name)) {
            return Some(spellings[0].to_string());
        }
    }
    let digits = name.strip_prefix(['F', 'f'])?;
    let n: u8 = digits.parse().ok()?;
    (1..=MAX_FUNCTION_KEY).contains(&n).then(|| format!("F{n}"))
}

/// Render a crossterm key event in canonical notation.
pub fn key_event_notation(event: &KeyEvent) -> Option<String> {
    let mods = Mods {
        ctrl: event.modifiers.contains(KeyModifiers::CONTROL),
        alt: event.modifiers.contains(KeyModifiers::ALT),
        shift: event.modifiers.contains(KeyModifiers::SHIFT),
        meta: event.modifiers.contains(KeyModifiers::SUPER),
    };
    let name = match event.code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char('<') => "lt".to_string(),
        KeyCode::Char(c) => return Some(single_char(c, mods)),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::Enter => "CR".to_string(),
        KeyCode::Tab => "Tab".to_string(),
        KeyCode::BackTab => {
            return Some(format!("<{}Tab>", Mods { shift: true, ..mods }.prefix()));
        }
        KeyCode::Backspace => "BS".to_string(),
        KeyCode::Delete => "Del".to_string(),
        KeyCode::Insert => "Insert".to_string(),
        KeyCode::Up => "Up".to_string(),
        KeyCode::Down => "Down".to_string(),
        KeyCode::Left => "Left".to_string(),
        KeyCode::Right => "Right".to_string(),
        KeyCode::Home => "Home".to_string(),
        KeyCode::End => "End".to_string(),
        KeyCode::PageUp => "PageUp".to_string(),
        KeyCode::PageDown => "PageDown".to_string(),
        KeyCode::F(n) if (1..=MAX_FUNCTION_KEY).contains(&n) => format!("F{n}"),
        KeyCode::Null => "Nul".to_string(),
        _ => return None,
    };
    Some(format!("<{}{}>", mods.prefix(), name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_keys_are_kept() {
        assert_eq!(canonicalize("gg").unwrap(), "gg");
        assert_eq!(canonicalize("l").unwrap(), "l");
    }

    #[test]
    fn named_keys_are_case_insensitive() {
        assert_eq!(canonicalize("<esc>").unwrap(), "<Esc>");
        assert_eq!(canonicalize("<ESCAPE>").unwrap(), "<Esc>");
        assert_eq!(canonicalize("<return>").unwrap(), "<CR>");
        assert_eq!(canonicalize("<f12>").unwrap(), "<F12>");
    }

    #[test]
    fn modifiers_are_ordered_and_letters_lowered() {
        assert_eq!(canonicalize("<c-A>").unwrap(), "<C-a>");
        assert_eq!(canonicalize("<s-c-tab>").unwrap(), "<C-S-Tab>");
        assert_eq!(canonicalize("<M-x>").unwrap(), "<A-x>");
        assert_eq!(canonicalize("<S-a>").unwrap(), "A");
    }

    #[test]
    fn ctrl_minus_parses() {
        assert_eq!(canonicalize("<C-->").unwrap(), "<C-->");
    }

    #[test]
    fn mixed_sequences() {
        assert_eq!(canonicalize("<leader>ff").unwrap(), "<Leader>ff");
        assert_eq!(canonicalize("a<cr>b").unwrap(), "a<CR>b");
    }

    #[test]
    fn unclosed_bracket_is_literal() {
        assert_eq!(canonicalize("<").unwrap(), "<lt>");
        assert_eq!(canonicalize("a<b").unwrap(), "a<lt>b");
        assert_eq!(canonicalize("<>").unwrap(), "<lt>>");
        assert_eq!(canonicalize("<lt>").unwrap(), "<lt>");
    }

    #[test]
    fn unknown_named_key_is_rejected() {
        let err = canonicalize("<Banana>").unwrap_err();
        assert!(err.contains("<Banana>"));
        assert!(canonicalize("<F99>").is_err());
    }

    #[test]
    fn empty_trigger_is_rejected() {
        assert!(canonicalize("").is_err());
        assert!(Trigger::new("n", "").is_err());
    }

    #[test]
    fn blank_mode_is_rejected() {
        let err = Trigger::new("  ", "l").unwrap_err();
        assert_eq!(err.field, "mode");
    }

    #[test]
    fn equivalent_spellings_are_equal_triggers() {
        assert_eq!(
            Trigger::new("n", "<esc>").unwrap(),
            Trigger::new("n", "<Esc>").unwrap()
        );
        assert_ne!(
            Trigger::new("n", "<Esc>").unwrap(),
            Trigger::new("i", "<Esc>").unwrap()
        );
    }

    #[test]
    fn key_events_match_declared_notation() {
        let esc = KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE);
        assert_eq!(key_event_notation(&esc).as_deref(), Some("<Esc>"));

        let ctrl_a = KeyEvent::new(KeyCode::Char('A'), KeyModifiers::CONTROL);
        assert_eq!(key_event_notation(&ctrl_a), Some(canonicalize("<C-a>").unwrap()));

        let shift_j = KeyEvent::new(KeyCode::Char('J'), KeyModifiers::SHIFT);
        assert_eq!(key_event_notation(&shift_j).as_deref(), Some("J"));

        let backtab = KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT);
        assert_eq!(key_event_notation(&backtab).as_deref(), Some("<S-Tab>"));

        let upper_j = KeyEvent::new(KeyCode::Char('J'), KeyModifiers::NONE);
        assert_eq!(key_event_notation(&upper_j), Some(canonicalize("J").unwrap()));

        let less = KeyEvent::new(KeyCode::Char('<'), KeyModifiers::NONE);
        assert_eq!(key_event_notation(&less), Some(canonicalize("<").unwrap()));

        let alt_x = KeyEvent::new(KeyCode::Char('X'), KeyModifiers::ALT);
        assert_eq!(key_event_notation(&alt_x).as_deref(), Some("<A-X>"));

        let caps = KeyEvent::new(KeyCode::CapsLock, KeyModifiers::NONE);
        assert!(key_event_notation(&caps).is_none());
    }

    #[test]
    fn trigger_from_key_event() {
        let ev = KeyEvent::new(KeyCode::Char('l'), KeyModifiers::NONE);
        let t = Trigger::from_key_event(Mode::normal(), &ev).unwrap();
        assert_eq!(t, Trigger::new("n", "l").unwrap());
        assert_eq!(t.to_string(), "n l");
    }
}
