//! Application state and update logic for the parley TUI.

use crate::event::Action;
use crate::ui::widgets::TextInputState;
use parley_engine::{ClientError, ConversationStore, PendingTurn, Reply};

/// Ticks a notification stays visible (4 Hz tick rate).
const NOTIFICATION_TICKS: usize = 16;

/// Lines moved per transcript scroll step.
const SCROLL_STEP: usize = 5;

/// Which pane receives keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Focus {
    #[default]
    Input,
    Sidebar,
}

/// A short message shown in the status bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    pub is_error: bool,
}

/// Application state.
#[derive(Debug)]
pub struct App {
    /// Whether the app should quit.
    pub should_quit: bool,

    /// Whether the help overlay is visible.
    pub show_help: bool,

    /// Pane receiving keys.
    pub focus: Focus,

    /// Conversation state: draft, active thread, log.
    pub store: ConversationStore,

    /// Text input state for the chat input.
    pub input_state: TextInputState,

    /// Selected sidebar row; row 0 is "New chat", threads follow.
    pub sidebar_index: usize,

    /// Transcript scroll offset in lines from the bottom.
    pub transcript_scroll: usize,

    /// Tick counter for animations.
    pub tick: usize,

    /// Proxy endpoint shown in the status bar.
    pub proxy_url: String,

    /// Notification message (cleared after some ticks).
    pub notification: Option<Notification>,

    notification_ttl: usize,
}

impl App {
    /// Create a new app talking to the proxy at `proxy_url`.
    pub fn new(proxy_url: impl Into<String>) -> Self {
        Self {
            should_quit: false,
            show_help: false,
            focus: Focus::Input,
            store: ConversationStore::new(),
            input_state: TextInputState::new(),
            sidebar_index: 0,
            transcript_scroll: 0,
            tick: 0,
            proxy_url: proxy_url.into(),
            notification: None,
            notification_ttl: 0,
        }
    }

    /// Handle an action.
    pub fn handle_action(&mut self, action: Action) {
        // Any key closes the help overlay.
        if self.show_help {
            self.show_help = false;
            return;
        }

        match action {
            Action::Quit => self.should_quit = true,
            Action::Help => self.show_help = true,
            Action::NewChat => self.new_chat(),
            Action::ToggleFocus => self.toggle_focus(),
            Action::Back => {
                if self.focus == Focus::Sidebar {
                    self.focus = Focus::Input;
                } else {
                    self.notification = None;
                }
            }
            Action::Select => {
                if self.focus == Focus::Sidebar {
                    self.activate_sidebar_entry();
                }
            }
            Action::Up => match self.focus {
                Focus::Sidebar => self.sidebar_index = self.sidebar_index.saturating_sub(1),
                Focus::Input => self.transcript_scroll += 1,
            },
            Action::Down => match self.focus {
                Focus::Sidebar => {
                    let last = self.store.thread_index().len();
                    self.sidebar_index = (self.sidebar_index + 1).min(last);
                }
                Focus::Input => self.transcript_scroll = self.transcript_scroll.saturating_sub(1),
            },
            Action::ScrollUp => self.transcript_scroll += SCROLL_STEP,
            Action::ScrollDown => {
                self.transcript_scroll = self.transcript_scroll.saturating_sub(SCROLL_STEP);
            }
            Action::None => {}
        }
    }

    /// Take the input as the draft and start a turn.
    ///
    /// Returns `None` while an earlier turn is still waiting; the input is
    /// left untouched in that case.
    pub fn begin_send(&mut self) -> Option<PendingTurn> {
        if self.store.is_pending() {
            self.notify("Still waiting for the last reply", false);
            return None;
        }

        self.store.set_draft(self.input_state.submit());
        let turn = self.store.begin_submit().ok()?;
        self.transcript_scroll = 0;
        Some(turn)
    }

    /// Record the outcome of a turn started with [`App::begin_send`].
    pub fn finish_turn(&mut self, turn: &PendingTurn, result: Result<Reply, ClientError>) {
        match result {
            Ok(reply) => {
                if self.store.complete_submit(turn, reply) > 0
                    && self.store.active_title() == Some(turn.title.as_str())
                {
                    self.transcript_scroll = 0;
                }
            }
            Err(e) => {
                if self.store.fail_submit(turn, &e) {
                    self.notify("Request failed", true);
                }
            }
        }
    }

    /// Start a fresh thread.
    pub fn new_chat(&mut self) {
        self.store.new_chat();
        self.input_state.clear();
        self.sidebar_index = 0;
        self.transcript_scroll = 0;
        self.focus = Focus::Input;
    }

    /// Switch to the thread titled `title`.
    pub fn select_thread(&mut self, title: &str) {
        self.store.select_thread(title);
        self.input_state.clear();
        self.transcript_scroll = 0;
        self.focus = Focus::Input;
    }

    /// Advance animations and expire notifications.
    pub fn tick(&mut self) {
        self.tick = self.tick.wrapping_add(1);
        if self.notification_ttl > 0 {
            self.notification_ttl -= 1;
            if self.notification_ttl == 0 {
                self.notification = None;
            }
        }
    }

    fn notify(&mut self, text: &str, is_error: bool) {
        self.notification = Some(Notification {
            text: text.to_string(),
            is_error,
        });
        self.notification_ttl = NOTIFICATION_TICKS;
    }

    fn toggle_focus(&mut self) {
        self.focus = match self.focus {
            Focus::Input => {
                self.sidebar_index = self.active_sidebar_index();
                Focus::Sidebar
            }
            Focus::Sidebar => Focus::Input,
        };
    }

    /// Sidebar row of the active thread, or 0 when none is active.
    fn active_sidebar_index(&self) -> usize {
        let Some(active) = self.store.active_title() else {
            return 0;
        };
        self.store
            .thread_index()
            .iter()
            .position(|t| *t == active)
            .map_or(0, |i| i + 1)
    }

    fn activate_sidebar_entry(&mut self) {
        if self.sidebar_index == 0 {
            self.new_chat();
            return;
        }

        let title = self
            .store
            .thread_index()
            .get(self.sidebar_index - 1)
            .map(|t| (*t).to_string());
        if let Some(title) = title {
            self.select_thread(&title);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn send(app: &mut App, text: &str, reply: &str) {
        app.input_state.insert_str(text);
        let turn = app.begin_send().unwrap();
        app.finish_turn(&turn, Ok(Reply::new(reply)));
    }

    #[test]
    fn test_send_files_pair_under_first_message() {
        let mut app = App::new("http://proxy");
        send(&mut app, "Hello", "Hi there");

        assert!(app.input_state.is_empty());
        assert_eq!(app.store.active_title(), Some("Hello"));
        assert_eq!(app.store.log().len(), 2);
    }

    #[test]
    fn test_send_while_pending_keeps_input() {
        let mut app = App::new("http://proxy");
        app.input_state.insert_str("first");
        let turn = app.begin_send().unwrap();

        app.input_state.insert_str("second");
        assert!(app.begin_send().is_none());
        assert_eq!(app.input_state.content(), "second");
        assert!(app.notification.is_some());

        app.finish_turn(&turn, Ok(Reply::new("ok")));
        assert!(app.begin_send().is_some());
    }

    #[test]
    fn test_failed_turn_shows_error_notice() {
        let mut app = App::new("http://proxy");
        app.input_state.insert_str("Hello");
        let turn = app.begin_send().unwrap();

        app.finish_turn(&turn, Err(ClientError::Status(500)));

        assert!(app.store.log().is_empty());
        let notice = app.notification.clone().unwrap();
        assert!(notice.is_error);
        assert_eq!(notice.text, "Request failed");
    }

    #[test]
    fn test_stale_failure_shows_no_notice() {
        let mut app = App::new("http://proxy");
        app.input_state.insert_str("Hello");
        let turn = app.begin_send().unwrap();
        app.finish_turn(&turn, Ok(Reply::new("Hi there")));

        app.finish_turn(&turn, Err(ClientError::Status(500)));

        assert!(app.notification.is_none());
        assert_eq!(app.store.log().len(), 2);
    }

    #[test]
    fn test_notification_expires() {
        let mut app = App::new("http://proxy");
        app.notify("hello", false);
        for _ in 0..NOTIFICATION_TICKS {
            assert!(app.notification.is_some());
            app.tick();
        }
        assert!(app.notification.is_none());
    }

    #[test]
    fn test_new_chat_action_clears_thread() {
        let mut app = App::new("http://proxy");
        send(&mut app, "Hello", "Hi there");
        app.input_state.insert_str("unsent");

        app.handle_action(Action::NewChat);

        assert_eq!(app.store.active_title(), None);
        assert!(app.input_state.is_empty());
        assert_eq!(app.store.thread_index(), vec!["Hello"]);
    }

    #[test]
    fn test_sidebar_selects_thread() {
        let mut app = App::new("http://proxy");
        send(&mut app, "A", "a1");
        app.new_chat();
        send(&mut app, "B", "b1");

        app.handle_action(Action::ToggleFocus);
        assert_eq!(app.focus, Focus::Sidebar);
        assert_eq!(app.sidebar_index, 2);

        app.handle_action(Action::Up);
        app.handle_action(Action::Select);

        assert_eq!(app.store.active_title(), Some("A"));
        assert_eq!(app.focus, Focus::Input);
    }

    #[test]
    fn test_sidebar_new_chat_row() {
        let mut app = App::new("http://proxy");
        send(&mut app, "A", "a1");

        app.handle_action(Action::ToggleFocus);
        app.handle_action(Action::Up);
        assert_eq!(app.sidebar_index, 0);
        app.handle_action(Action::Select);

        assert_eq!(app.store.active_title(), None);
    }

    #[test]
    fn test_sidebar_index_is_bounded() {
        let mut app = App::new("http://proxy");
        send(&mut app, "A", "a1");

        app.handle_action(Action::ToggleFocus);
        for _ in 0..5 {
            app.handle_action(Action::Down);
        }
        assert_eq!(app.sidebar_index, 1);
    }

    #[test]
    fn test_help_closes_before_quit() {
        let mut app = App::new("http://proxy");
        app.handle_action(Action::Help);
        assert!(app.show_help);

        app.handle_action(Action::Quit);
        assert!(!app.show_help);
        assert!(!app.should_quit);

        app.handle_action(Action::Quit);
        assert!(app.should_quit);
    }

    #[test]
    fn test_scroll_saturates_at_bottom() {
        let mut app = App::new("http://proxy");
        app.handle_action(Action::ScrollUp);
        assert_eq!(app.transcript_scroll, SCROLL_STEP);
        app.handle_action(Action::ScrollDown);
        app.handle_action(Action::ScrollDown);
        assert_eq!(app.transcript_scroll, 0);
    }
}
