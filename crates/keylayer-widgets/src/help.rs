//! Binding help panel for an overlay, with a full grouped view and a short
//! one-line summary for status bars.

use keylayer_core::{Action, Binding, BindingTable, SetKind};
use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap};
use unicode_width::UnicodeWidthStr;

/// Visual style configuration for [`BindingHelp`].
#[derive(Debug, Clone)]
pub struct HelpStyle {
    /// Style applied to trigger labels.
    pub key: Style,
    /// Style applied to binding descriptions.
    pub description: Style,
    /// Style applied to group headings.
    pub group: Style,
    /// Style applied to the panel border.
    pub border: Style,
    /// Style applied to the panel title.
    pub title: Style,
}

impl Default for HelpStyle {
    fn default() -> Self {
        Self {
            key: Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            description: Style::default().fg(Color::White),
            group: Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
            border: Style::default().fg(Color::DarkGray),
            title: Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        }
    }
}

/// One row of the help panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpEntry {
    /// Trigger label, prefixed with its mode when the overlay spans several.
    pub keys: String,
    /// The binding's `desc`, or a summary of its action.
    pub description: String,
}

/// Lists an overlay's bindings grouped by set: overlay, departure, then
/// entrance.
pub struct BindingHelp<'a> {
    table: &'a BindingTable,
    title: String,
    style: HelpStyle,
    separator: String,
    ellipsis: String,
    show_entrance: bool,
}

impl<'a> BindingHelp<'a> {
    /// Create a help panel for `table`.
    pub fn new(table: &'a BindingTable) -> Self {
        Self {
            table,
            title: " Overlay ".to_string(),
            style: HelpStyle::default(),
            separator: " \u{2022} ".to_string(),
            ellipsis: "\u{2026}".to_string(),
            show_entrance: true,
        }
    }

    /// Set the panel title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = format!(" {} ", title.into());
        self
    }

    /// Set the visual style.
    pub fn with_style(mut self, style: HelpStyle) -> Self {
        self.style = style;
        self
    }

    /// Set the separator used by [`short_line`](Self::short_line).
    pub fn with_separator(mut self, s: impl Into<String>) -> Self {
        self.separator = s.into();
        self
    }

    /// Leave entrance bindings out, e.g. while the overlay is active.
    pub fn hide_entrance(mut self) -> Self {
        self.show_entrance = false;
        self
    }

    /// Entries per non-empty set, in display order.
    pub fn groups(&self) -> Vec<(SetKind, Vec<HelpEntry>)> {
        let multi_mode = self.table.modes().len() > 1;
        let mut kinds = vec![SetKind::Overlay, SetKind::Departure];
        if self.show_entrance {
            kinds.push(SetKind::Entrance);
        }
        kinds
            .into_iter()
            .filter_map(|kind| {
                let entries: Vec<_> = self
                    .table
                    .set(kind)
                    .values()
                    .map(|b| entry(kind, b, multi_mode))
                    .collect();
                (!entries.is_empty()).then_some((kind, entries))
            })
            .collect()
    }

    /// The full grouped view, with the key column aligned by display width.
    pub fn lines(&self) -> Vec<Line<'static>> {
        let groups = self.groups();
        let key_width = groups
            .iter()
            .flat_map(|(_, entries)| entries.iter())
            .map(|e| e.keys.width())
            .max()
            .unwrap_or(0);

        let mut lines = Vec::new();
        for (idx, (kind, entries)) in groups.into_iter().enumerate() {
            if idx > 0 {
                lines.push(Line::raw(""));
            }
            lines.push(Line::from(Span::styled(kind.as_str(), self.style.group)));
            for e in entries {
                let pad = key_width - e.keys.width() + 2;
                lines.push(Line::from(vec![
                    Span::styled(format!("{}{}", e.keys, " ".repeat(pad)), self.style.key),
                    Span::styled(e.description, self.style.description),
                ]));
            }
        }
        lines
    }

    /// Overlay and departure bindings on one line, truncated with an
    /// ellipsis to fit `max_width` columns.
    pub fn short_line(&self, max_width: u16) -> Line<'static> {
        let max = max_width as usize;
        let mut spans = Vec::new();
        let mut used = 0;
        let entries = self
            .groups()
            .into_iter()
            .filter(|(kind, _)| *kind != SetKind::Entrance)
            .flat_map(|(_, entries)| entries);

        for (idx, e) in entries.enumerate() {
            let sep = if idx > 0 { self.separator.width() } else { 0 };
            let width = e.keys.width() + 1 + e.description.width();
            if used + sep + width > max {
                if used + sep + self.ellipsis.width() <= max {
                    if idx > 0 {
                        spans.push(Span::raw(self.separator.clone()));
                    }
                    spans.push(Span::raw(self.ellipsis.clone()));
                }
                break;
            }
            if idx > 0 {
                spans.push(Span::raw(self.separator.clone()));
            }
            spans.push(Span::styled(e.keys, self.style.key));
            spans.push(Span::raw(" "));
            spans.push(Span::styled(e.description, self.style.description));
            used += sep + width;
        }
        Line::from(spans)
    }
}

fn entry(kind: SetKind, binding: &Binding, multi_mode: bool) -> HelpEntry {
    let keys = if multi_mode {
        binding.trigger.to_string()
    } else {
        binding.trigger.keys().to_string()
    };
    let description = match (&binding.options.desc, &binding.action) {
        (Some(desc), _) => desc.clone(),
        (None, Action::Command(cmd)) => cmd.clone(),
        (None, Action::PassThrough) => "pass through".to_string(),
        (None, Action::Callback(_)) => "custom action".to_string(),
        (None, Action::Noop) => match kind {
            SetKind::Departure => "leave".to_string(),
            SetKind::Entrance => "enter".to_string(),
            SetKind::Overlay => "ignore".to_string(),
        },
    };
    HelpEntry { keys, description }
}

impl Widget for &BindingHelp<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let lines = self.lines();
        let width = area.width.min(60);
        let rows = u16::try_from(lines.len()).unwrap_or(u16::MAX);
        let height = area.height.min(rows.saturating_add(2));
        let x = area.x + (area.width.saturating_sub(width)) / 2;
        let y = area.y + (area.height.saturating_sub(height)) / 2;
        let panel = Rect::new(x, y, width, height);

        Clear.render(panel, buf);
        let block = Block::default()
            .title(self.title.clone())
            .title_style(self.style.title)
            .borders(Borders::ALL)
            .border_style(self.style.border);
        Paragraph::new(lines)
            .block(block)
            .wrap(Wrap { trim: false })
            .render(panel, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylayer_core::{normalize, BindingDecl, OverlayDecl};

    fn table(decl: OverlayDecl) -> BindingTable {
        normalize(&decl).unwrap()
    }

    fn scroll() -> BindingTable {
        table(
            OverlayDecl::new()
                .with_entrance(BindingDecl::new("n", "<leader>s").desc("scroll mode"))
                .with_overlay(BindingDecl::new("n", "l").action(Action::command("scroll-right")))
                .with_overlay(BindingDecl::new("n", "h").desc("left")),
        )
    }

    fn flatten(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn groups_in_display_order() {
        let t = scroll();
        let help = BindingHelp::new(&t);
        let kinds: Vec<_> = help.groups().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds, [SetKind::Overlay, SetKind::Departure, SetKind::Entrance]);

        let hidden = BindingHelp::new(&t).hide_entrance();
        assert_eq!(hidden.groups().len(), 2);
    }

    #[test]
    fn descriptions_fall_back_to_action() {
        let t = scroll();
        let groups = BindingHelp::new(&t).groups();
        let overlay = &groups[0].1;
        assert!(overlay.contains(&HelpEntry {
            keys: "h".into(),
            description: "left".into()
        }));
        assert!(overlay.contains(&HelpEntry {
            keys: "l".into(),
            description: "scroll-right".into()
        }));
        assert_eq!(groups[1].1[0].description, "leave overlay");
    }

    #[test]
    fn keys_are_aligned() {
        let t = scroll();
        let lines: Vec<String> = BindingHelp::new(&t).lines().iter().map(flatten).collect();
        let entrance = lines.iter().find(|l| l.contains("scroll mode")).unwrap();
        let overlay = lines.iter().find(|l| l.contains("scroll-right")).unwrap();
        assert_eq!(entrance.find("scroll mode"), overlay.find("scroll-right"));
    }

    #[test]
    fn multi_mode_tables_show_modes() {
        let t = table(OverlayDecl::new().with_overlay(BindingDecl::new(["n", "v"], "j")));
        let groups = BindingHelp::new(&t).groups();
        let keys: Vec<_> = groups[0].1.iter().map(|e| e.keys.as_str()).collect();
        assert_eq!(keys, ["n j", "v j"]);
    }

    #[test]
    fn short_line_truncates_with_ellipsis() {
        let t = scroll();
        let help = BindingHelp::new(&t);
        let full = flatten(&help.short_line(200));
        assert!(full.contains("h left"));
        assert!(full.contains("<Esc> leave overlay"));
        assert!(!full.contains("scroll mode"));

        let short = flatten(&help.short_line(12));
        assert!(short.ends_with('\u{2026}'));
        assert!(short.width() <= 12);
    }

    #[test]
    fn very_long_tables_are_clipped_to_the_area() {
        // Enough rows that the border rows no longer fit in a u16.
        let mut decl = OverlayDecl::new();
        for i in 0..65_530 {
            decl = decl.with_overlay(BindingDecl::new("n", format!("x{i}")));
        }
        let t = table(decl);
        assert_eq!(BindingHelp::new(&t).lines().len(), 65_534);

        let area = Rect::new(0, 0, 40, 10);
        let mut buf = Buffer::empty(area);
        (&BindingHelp::new(&t)).render(area, &mut buf);
        assert_eq!(buf[(0, 0)].symbol(), "\u{250c}");
        assert_eq!(buf[(0, 9)].symbol(), "\u{2514}");
    }

    #[test]
    fn renders_inside_a_bordered_panel() {
        let t = scroll();
        let help = BindingHelp::new(&t).with_title("scroll");
        let area = Rect::new(0, 0, 40, 12);
        let mut buf = Buffer::empty(area);
        (&help).render(area, &mut buf);
        let text: String = (0..12)
            .map(|y| (0..40).map(|x| buf[(x, y)].symbol()).collect::<String>() + "\n")
            .collect();
        assert!(text.contains(" scroll "));
        assert!(text.contains("scroll-right"));
        assert!(text.contains("departure"));
    }
}
