//! Chat screen: thread sidebar, transcript and message input.

use crate::app::{App, Focus};
use crate::screens::Screen;
use crate::ui::theme::{Styles, SPINNER};
use crate::ui::widgets::{KeyHint, StatusBar};
use crate::ui::{chat_layout, main_layout};
use parley_engine::Role;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Heading shown when no thread is active.
pub const APP_HEADING: &str = "parley";

/// First sidebar row.
pub const NEW_CHAT_LABEL: &str = "+ New chat";

/// The chat screen.
pub struct ChatScreen;

impl Screen for ChatScreen {
    fn render(&self, app: &App, area: Rect, buf: &mut Buffer) {
        let (main_area, status_area) = main_layout(area);
        let (sidebar_area, transcript_area, input_area) = chat_layout(main_area);

        render_sidebar(app, sidebar_area, buf);
        render_transcript(app, transcript_area, buf);
        render_input(app, input_area, buf);

        let (mode, hints) = match app.focus {
            Focus::Input => (
                "Chat",
                vec![
                    KeyHint::new("Enter", "Send"),
                    KeyHint::new("Tab", "History"),
                    KeyHint::new("Ctrl+N", "New chat"),
                    KeyHint::new("F1", "Help"),
                ],
            ),
            Focus::Sidebar => (
                "History",
                vec![
                    KeyHint::new("Enter", "Open"),
                    KeyHint::new("j/k", "Move"),
                    KeyHint::new("Tab", "Chat"),
                    KeyHint::new("q", "Quit"),
                ],
            ),
        };

        let mut status_bar = StatusBar::new(mode).hints(hints);
        status_bar = match &app.notification {
            Some(n) if n.is_error => status_bar.right(&n.text).error(),
            Some(n) => status_bar.right(&n.text),
            None => status_bar.right(&app.proxy_url),
        };
        status_bar.render(status_area, buf);
    }
}

fn render_sidebar(app: &App, area: Rect, buf: &mut Buffer) {
    let focused = app.focus == Focus::Sidebar;
    let block = Block::default()
        .title(" History ")
        .title_style(Styles::title())
        .borders(Borders::ALL)
        .border_style(Styles::border_for(focused))
        .style(Styles::default());

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 {
        return;
    }

    let width = usize::from(inner.width);
    let active = app.store.active_title();
    let threads = app.store.thread_index();

    let rows = std::iter::once((NEW_CHAT_LABEL, false))
        .chain(threads.iter().map(|t| (*t, Some(*t) == active)));

    // Keep the selected row on screen.
    let height = usize::from(inner.height);
    let offset = app.sidebar_index.saturating_sub(height - 1);

    let lines: Vec<Line<'_>> = rows
        .enumerate()
        .skip(offset)
        .take(height)
        .map(|(i, (label, is_active))| {
            let style = if focused && i == app.sidebar_index {
                Styles::selected()
            } else if is_active {
                Styles::active()
            } else if i == 0 {
                Styles::dim()
            } else {
                Styles::default()
            };
            let marker = if is_active { "> " } else { "  " };
            let text = format!("{marker}{}", truncate(label, width.saturating_sub(2)));
            Line::from(Span::styled(text, style))
        })
        .collect();

    Paragraph::new(lines)
        .style(Styles::default())
        .render(inner, buf);
}

fn render_transcript(app: &App, area: Rect, buf: &mut Buffer) {
    let view = app.store.view();
    let title_width = usize::from(area.width).saturating_sub(4);
    let title = format!(
        " {} ",
        truncate(view.active_title.unwrap_or(APP_HEADING), title_width)
    );

    let block = Block::default()
        .title(title)
        .title_style(Styles::title())
        .borders(Borders::ALL)
        .border_style(Styles::border())
        .style(Styles::default());

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let waiting = app.store.is_pending_in_view();

    if view.messages.is_empty() && !waiting {
        Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled("  Start a conversation.", Styles::highlight())),
            Line::from(""),
            Line::from(Span::styled(
                "  Your first message names the thread.",
                Styles::dim(),
            )),
        ])
        .style(Styles::default())
        .render(inner, buf);
        return;
    }

    let wrap_width = usize::from(inner.width).saturating_sub(2).max(1);
    let mut lines = Vec::new();
    for msg in &view.messages {
        let (label, style) = match msg.role {
            Role::User => ("You", Styles::highlight()),
            Role::Assistant => ("Assistant", Styles::assistant()),
        };
        lines.push(Line::from(Span::styled(label, style)));
        for row in textwrap::wrap(&msg.content, wrap_width) {
            lines.push(Line::from(Span::styled(
                format!("  {row}"),
                Styles::default(),
            )));
        }
        lines.push(Line::from(""));
    }

    if waiting {
        let spinner = SPINNER[app.tick % SPINNER.len()];
        lines.push(Line::from(Span::styled(
            format!("{spinner} Waiting for response..."),
            Styles::dim(),
        )));
    }

    // Anchor to the bottom; the scroll offset counts lines up from there.
    let height = usize::from(inner.height);
    let max_scroll = lines.len().saturating_sub(height);
    let start = max_scroll - app.transcript_scroll.min(max_scroll);

    let visible: Vec<Line<'_>> = lines.into_iter().skip(start).take(height).collect();
    Paragraph::new(visible)
        .style(Styles::default())
        .render(inner, buf);
}

fn render_input(app: &App, area: Rect, buf: &mut Buffer) {
    let focused = app.focus == Focus::Input && !app.show_help;
    let block = Block::default()
        .title(" Message ")
        .title_style(Styles::title())
        .borders(Borders::ALL)
        .border_style(Styles::border_for(focused))
        .style(Styles::default());

    app.input_state
        .widget()
        .block(block)
        .focused(focused)
        .placeholder("Send a message")
        .render(area, buf);
}

/// Cut `s` to `width` display columns, marking the cut with "...".
fn truncate(s: &str, width: usize) -> String {
    if s.width() <= width {
        return s.to_string();
    }
    let budget = width.saturating_sub(3);
    let mut used = 0;
    let mut out = String::new();
    for ch in s.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(ch);
    }
    if width >= 3 {
        out.push_str("...");
    }
    out
}
