//! parley-tui: terminal chat client for the parley relay
//!
//! This crate provides the interactive client, including:
//! - A sidebar listing conversation threads
//! - The transcript of the active thread
//! - A message input with history

mod app;
mod event;
mod screens;
#[cfg(test)]
pub mod test_utils;
mod ui;

use screens::Screen as ScreenTrait;

pub use app::{App, Focus, Notification};
pub use event::{Action, Event, EventHandler};
pub use parley_engine;

use crossterm::{
    cursor::Show as ShowCursor,
    event::{KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use parley_engine::{ClientConfig, ClientError, PendingTurn, ProxyClient, Reply};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io::{self, stdout};
use tokio::task::JoinHandle;

type TurnHandle = JoinHandle<(PendingTurn, Result<Reply, ClientError>)>;

/// RAII guard for terminal state restoration.
struct TerminalGuard;

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(stdout(), LeaveAlternateScreen, ShowCursor);
    }
}

/// Run the TUI application.
///
/// Sets up the terminal, runs the event loop against the proxy named in
/// `config`, and restores the terminal on exit.
pub async fn run_tui(config: &ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    enable_raw_mode()?;
    let _guard = TerminalGuard;

    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let client = ProxyClient::new(config);
    let mut app = App::new(client.endpoint());
    tracing::info!(endpoint = %client.endpoint(), "chat client started");

    // 4 Hz tick rate
    let mut events = EventHandler::new(250);

    let result = run_loop(&mut terminal, &mut app, &mut events, &client).await;

    terminal.show_cursor()?;

    result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    events: &mut EventHandler,
    client: &ProxyClient,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut turn_handles: Vec<TurnHandle> = Vec::new();

    loop {
        terminal.draw(|frame| {
            let area = frame.area();
            let buf = frame.buffer_mut();

            screens::chat::ChatScreen.render(app, area, buf);

            if app.show_help {
                screens::render_help_overlay(area, buf);
            }
        })?;

        if let Some(event) = events.next().await {
            match event {
                Event::Key(key) => match handle_input_key(app, key) {
                    KeyOutcome::Send(turn) => {
                        let client = client.clone();
                        turn_handles.push(tokio::spawn(async move {
                            let result = client.send(&turn.draft).await;
                            (turn, result)
                        }));
                    }
                    KeyOutcome::Consumed => {}
                    KeyOutcome::Ignored => app.handle_action(event::key_to_action(key)),
                },
                Event::Tick => app.tick(),
                Event::Resize(_, _) => {}
            }
        }

        let mut completed = Vec::new();
        for (i, handle) in turn_handles.iter().enumerate() {
            if handle.is_finished() {
                completed.push(i);
            }
        }
        for i in completed.into_iter().rev() {
            match turn_handles.remove(i).await {
                Ok((turn, result)) => app.finish_turn(&turn, result),
                Err(e) => tracing::error!(error = %e, "reply task failed"),
            }
        }

        if app.should_quit {
            for handle in turn_handles {
                handle.abort();
            }
            break;
        }
    }

    Ok(())
}

/// What the input box made of a key press.
#[derive(Debug)]
enum KeyOutcome {
    /// Not an editing key; map it to an action.
    Ignored,
    /// Edited the input.
    Consumed,
    /// Enter started a turn that still needs its request.
    Send(PendingTurn),
}

/// Handle key input for the message box.
fn handle_input_key(app: &mut App, key: KeyEvent) -> KeyOutcome {
    if app.focus != Focus::Input || app.show_help {
        return KeyOutcome::Ignored;
    }

    // Ctrl+C, Ctrl+N and friends go to the action handler.
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return KeyOutcome::Ignored;
    }

    if key.code == KeyCode::Enter {
        return match app.begin_send() {
            Some(turn) => KeyOutcome::Send(turn),
            None => KeyOutcome::Consumed,
        };
    }

    let input = &mut app.input_state;
    match key.code {
        KeyCode::Char(c) => {
            input.insert(c);
            KeyOutcome::Consumed
        }
        KeyCode::Backspace => {
            input.backspace();
            KeyOutcome::Consumed
        }
        KeyCode::Delete => {
            input.delete();
            KeyOutcome::Consumed
        }
        KeyCode::Left => {
            input.move_left();
            KeyOutcome::Consumed
        }
        KeyCode::Right => {
            input.move_right();
            KeyOutcome::Consumed
        }
        KeyCode::Home => {
            input.move_home();
            KeyOutcome::Consumed
        }
        KeyCode::End => {
            input.move_end();
            KeyOutcome::Consumed
        }
        KeyCode::Up if input.is_empty() || input.is_browsing_history() => {
            input.history_prev();
            KeyOutcome::Consumed
        }
        KeyCode::Down if input.is_browsing_history() => {
            input.history_next();
            KeyOutcome::Consumed
        }
        // Esc, Tab, paging and the rest scroll or switch focus.
        _ => KeyOutcome::Ignored,
    }
}

/// Get the TUI version.
pub fn tui_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
