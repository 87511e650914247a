//! Conversation state for the chat client.
//!
//! [`ConversationStore`] owns everything the client keeps between sends: the
//! draft, the latest reply, the active thread title, the pending turn, and
//! the append-only message log. Threads are not stored separately; they are
//! derived from the log by grouping on the message title.

use crate::client::ClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Identifier of a thread: the literal text of its first user message.
///
/// Two threads opened with identical text share one title and therefore
/// one bucket in the log.
pub type ThreadTitle = String;

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message typed by the user.
    User,
    /// Reply produced by the model.
    Assistant,
}

/// A single entry in the conversation log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Thread this message belongs to.
    pub title: ThreadTitle,
    /// Role of the message author.
    pub role: Role,
    /// Message content.
    pub content: String,
}

impl Message {
    /// Create a user message filed under `title`.
    pub fn user(title: impl Into<ThreadTitle>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message filed under `title`.
    pub fn assistant(title: impl Into<ThreadTitle>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The assistant reply returned for one submitted draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Reply text.
    pub content: String,
}

impl Reply {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A submitted draft waiting for its reply.
///
/// The title is resolved when the turn starts, so the reply is filed under
/// the thread that was active at send time even if the user navigates away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTurn {
    /// Ticket identifying this turn.
    pub id: Uuid,
    /// Title the turn will be filed under.
    pub title: ThreadTitle,
    /// Draft text sent to the proxy.
    pub draft: String,
    /// Set when the user started a new chat or switched threads mid-flight.
    detached: bool,
}

/// Errors returned when a submit cannot start.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// Another turn is still waiting for its reply.
    #[error("a request is already in flight")]
    InFlight,
}

/// Something that can turn a draft into an assistant reply.
#[async_trait]
pub trait ReplySource: Send + Sync {
    /// Send one message and wait for the reply.
    async fn request_reply(&self, message: &str) -> Result<Reply, ClientError>;
}

/// Read-only view of the active thread and the sidebar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationView<'a> {
    /// Active thread title, if any.
    pub active_title: Option<&'a str>,
    /// Messages of the active thread in append order.
    pub messages: Vec<&'a Message>,
    /// Distinct thread titles in first-seen order.
    pub threads: Vec<&'a str>,
}

/// Transient state for one client session.
#[derive(Debug, Default)]
pub struct ConversationStore {
    draft: String,
    latest_input: Option<String>,
    latest_reply: Option<Reply>,
    active_title: Option<ThreadTitle>,
    pending: Option<PendingTurn>,
    log: Vec<Message>,
}

impl ConversationStore {
    /// Create an empty store with no active thread.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current draft text.
    pub fn draft(&self) -> &str {
        &self.draft
    }

    /// Replace the draft text.
    pub fn set_draft(&mut self, draft: impl Into<String>) {
        self.draft = draft.into();
    }

    /// Title of the active thread.
    pub fn active_title(&self) -> Option<&str> {
        self.active_title.as_deref()
    }

    /// The whole log in append order.
    pub fn log(&self) -> &[Message] {
        &self.log
    }

    /// Whether a turn is waiting for its reply.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Title the pending turn will be filed under.
    pub fn pending_title(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.title.as_str())
    }

    /// Whether the pending turn will land in the thread currently on screen.
    pub fn is_pending_in_view(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| match self.active_title.as_deref() {
                Some(active) => active == p.title,
                None => !p.detached,
            })
    }

    /// Start a submit for the current draft.
    ///
    /// An empty draft is accepted. Only one turn may be pending at a time.
    pub fn begin_submit(&mut self) -> Result<PendingTurn, SubmitError> {
        if self.pending.is_some() {
            return Err(SubmitError::InFlight);
        }

        let draft = self.draft.clone();
        let title = self
            .active_title
            .clone()
            .unwrap_or_else(|| draft.clone());

        let turn = PendingTurn {
            id: Uuid::new_v4(),
            title,
            draft,
            detached: false,
        };
        tracing::debug!(turn = %turn.id, title = %turn.title, "submit started");
        self.pending = Some(turn.clone());
        Ok(turn)
    }

    /// Finish a turn with the reply from the proxy.
    ///
    /// Returns the number of messages appended: 2 for the pending turn, 0 for
    /// a turn this store is not waiting on.
    pub fn complete_submit(&mut self, turn: &PendingTurn, reply: Reply) -> usize {
        let Some(pending) = self.take_pending(turn) else {
            tracing::debug!(turn = %turn.id, "ignoring reply for unknown turn");
            return 0;
        };

        self.latest_input = Some(pending.draft);
        self.latest_reply = Some(reply);

        if self.active_title.is_none() && !pending.detached {
            self.active_title = Some(pending.title.clone());
        }

        self.append_latest(&pending.title)
    }

    /// Abandon a turn whose request failed.
    ///
    /// The log, draft and active thread are left as they were. Returns
    /// `false` when `turn` is not the one in flight.
    pub fn fail_submit(&mut self, turn: &PendingTurn, error: &ClientError) -> bool {
        if self.take_pending(turn).is_none() {
            return false;
        }
        tracing::warn!(turn = %turn.id, error = %error, "request to proxy failed");
        true
    }

    /// Send the current draft through `source` and record the outcome.
    ///
    /// Returns the number of messages appended, which is 0 when the request
    /// failed.
    pub async fn submit<S: ReplySource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<usize, SubmitError> {
        let turn = self.begin_submit()?;
        match source.request_reply(&turn.draft).await {
            Ok(reply) => Ok(self.complete_submit(&turn, reply)),
            Err(e) => {
                self.fail_submit(&turn, &e);
                Ok(0)
            }
        }
    }

    /// Leave the active thread so the next submit opens a new one.
    pub fn new_chat(&mut self) {
        self.draft.clear();
        self.latest_reply = None;
        self.active_title = None;
        self.detach_pending();
    }

    /// Make `title` the active thread.
    pub fn select_thread(&mut self, title: impl Into<ThreadTitle>) {
        self.active_title = Some(title.into());
        self.draft.clear();
        self.latest_reply = None;
        self.detach_pending();
    }

    /// Distinct thread titles in first-seen order.
    pub fn thread_index(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.log
            .iter()
            .map(|m| m.title.as_str())
            .filter(|title| seen.insert(*title))
            .collect()
    }

    /// Messages of the active thread plus the thread index.
    pub fn view(&self) -> ConversationView<'_> {
        let active_title = self.active_title.as_deref();
        let messages = match active_title {
            Some(title) => self.log.iter().filter(|m| m.title == title).collect(),
            None => Vec::new(),
        };

        ConversationView {
            active_title,
            messages,
            threads: self.thread_index(),
        }
    }

    /// Append the latest input/reply pair once, consuming both markers.
    fn append_latest(&mut self, title: &str) -> usize {
        let (Some(input), Some(reply)) = (self.latest_input.take(), self.latest_reply.take())
        else {
            return 0;
        };

        self.log.push(Message::user(title, input));
        self.log.push(Message::assistant(title, reply.content));
        2
    }

    fn take_pending(&mut self, turn: &PendingTurn) -> Option<PendingTurn> {
        if self.pending.as_ref().is_some_and(|p| p.id == turn.id) {
            self.pending.take()
        } else {
            None
        }
    }

    fn detach_pending(&mut self) {
        if let Some(pending) = self.pending.as_mut() {
            pending.detached = true;
        }
    }
}
