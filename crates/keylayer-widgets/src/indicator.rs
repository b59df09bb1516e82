//! A one-row badge naming the active overlay. Stateless: build it from the
//! current value of [`Controller::watch_active`] each frame.
//!
//! [`Controller::watch_active`]: keylayer_core::Controller::watch_active

use keylayer_core::ActiveOverlay;
use ratatui::buffer::Buffer;
use ratatui::layout::{Alignment, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Paragraph, Widget};

/// Shows `-- NAME --` while an overlay is active and nothing otherwise.
///
/// Unnamed overlays are shown by id.
///
/// # Example
///
/// ```ignore
/// use keylayer_widgets::indicator::Indicator;
///
/// let active = controller.watch_active().borrow().clone();
/// frame.render_widget(Indicator::new(active.as_ref()), status_area);
/// ```
pub struct Indicator<'a> {
    active: Option<&'a ActiveOverlay>,
    style: Style,
    alignment: Alignment,
}

impl<'a> Indicator<'a> {
    /// Create an indicator for the given active slot.
    pub fn new(active: Option<&'a ActiveOverlay>) -> Self {
        Self {
            active,
            style: Style::default()
                .fg(Color::Black)
                .bg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
            alignment: Alignment::Left,
        }
    }

    /// Set the badge style.
    pub fn style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Set where the badge sits within its area.
    pub fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = alignment;
        self
    }

    /// The badge text, or `None` when nothing is active.
    pub fn label(&self) -> Option<String> {
        let active = self.active?;
        let name = match &active.name {
            Some(name) => name.to_uppercase(),
            None => format!("OVERLAY {}", active.id),
        };
        Some(format!("-- {name} --"))
    }
}

impl Widget for Indicator<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(label) = self.label() else {
            return;
        };
        Paragraph::new(Line::from(Span::styled(label, self.style)))
            .alignment(self.alignment)
            .render(area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylayer_core::OverlayId;

    fn render_string(widget: Indicator<'_>, width: u16) -> String {
        let area = Rect::new(0, 0, width, 1);
        let mut buf = Buffer::empty(area);
        widget.render(area, &mut buf);
        (0..width).map(|x| buf[(x, 0)].symbol()).collect()
    }

    #[test]
    fn empty_when_inactive() {
        let indicator = Indicator::new(None);
        assert_eq!(indicator.label(), None);
        assert_eq!(render_string(indicator, 10).trim(), "");
    }

    #[test]
    fn shows_name_or_id() {
        let named = ActiveOverlay {
            id: OverlayId(4),
            name: Some("scroll".into()),
        };
        assert_eq!(render_string(Indicator::new(Some(&named)), 20).trim_end(), "-- SCROLL --");

        let anonymous = ActiveOverlay {
            id: OverlayId(4),
            name: None,
        };
        assert_eq!(
            Indicator::new(Some(&anonymous)).label().as_deref(),
            Some("-- OVERLAY 4 --")
        );
    }

    #[test]
    fn right_alignment() {
        let active = ActiveOverlay {
            id: OverlayId(1),
            name: Some("x".into()),
        };
        let out = render_string(Indicator::new(Some(&active)).alignment(Alignment::Right), 10);
        assert_eq!(out, "   -- X --");
    }
}
