use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::store::{PromptDraft, PromptStore, SaveOutcome};

pub const MSG_LOAD_FAILED: &str = "Could not load the system prompt. Try again later.";
pub const MSG_LOAD_NO_RECORD: &str = "Could not load the system prompt. No record found.";
pub const MSG_EMPTY_PROMPT: &str = "Enter the prompt text before saving.";
pub const MSG_SAVE_FAILED: &str = "Could not save the system prompt. Try again later.";
pub const MSG_UPDATED: &str = "System prompt updated.";
pub const MSG_ADDED: &str = "System prompt added.";
pub const CONFIRM_SAVE: &str = "Save these changes to the system prompt?";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub kind: StatusKind,
    pub text: String,
}

impl Status {
    fn success(text: &str) -> Self {
        Self {
            kind: StatusKind::Success,
            text: text.to_string(),
        }
    }

    fn error(text: &str) -> Self {
        Self {
            kind: StatusKind::Error,
            text: text.to_string(),
        }
    }
}

/// Asks the operator a yes/no question before a save goes through.
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
}

/// Edit-in-progress state for the single prompt record. The buffer is a
/// scratch copy of backend state; nothing is persisted until `submit`.
pub struct FormController {
    store: Arc<dyn PromptStore>,
    user_id: String,
    prompt_text: String,
    current_id: Option<String>,
    loading: bool,
    status: Option<Status>,
}

impl FormController {
    pub fn new(store: Arc<dyn PromptStore>, user_id: String) -> Self {
        Self {
            store,
            user_id,
            prompt_text: String::new(),
            current_id: None,
            loading: false,
            status: None,
        }
    }

    pub fn prompt_text(&self) -> &str {
        &self.prompt_text
    }

    pub fn set_prompt_text(&mut self, text: String) {
        self.prompt_text = text;
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Fetch the current record and mirror it into the edit buffer. Zero
    /// rows is a valid steady state: the buffer stays empty and no status
    /// is shown. A successful fetch never clears an existing status, so
    /// the post-insert re-fetch keeps its success banner.
    pub async fn load(&mut self) {
        self.loading = true;
        match self.store.fetch_one().await {
            Ok(Some(record)) => {
                self.prompt_text = record.prompt_text;
                self.current_id = Some(record.id);
            }
            Ok(None) => {
                self.prompt_text.clear();
                self.current_id = None;
            }
            Err(e) => {
                error!("Failed to fetch the system prompt: {}", e);
                let text = if e.is_not_found() {
                    MSG_LOAD_NO_RECORD
                } else {
                    MSG_LOAD_FAILED
                };
                self.status = Some(Status::error(text));
            }
        }
        self.loading = false;
    }

    /// Persist the buffer: update when the record's id is known, insert
    /// otherwise. An insert is followed by exactly one re-fetch so the
    /// backend-assigned id is picked up and later saves become updates.
    pub async fn submit(&mut self, confirm: &dyn Confirm) {
        if self.loading {
            return;
        }

        if self.prompt_text.trim().is_empty() {
            self.status = Some(Status::error(MSG_EMPTY_PROMPT));
            return;
        }

        if !confirm.confirm(CONFIRM_SAVE).await {
            return;
        }

        self.loading = true;
        let draft = PromptDraft {
            id: self.current_id.clone(),
            prompt_text: self.prompt_text.clone(),
            created_by: self.user_id.clone(),
        };
        let result = self.store.save(&draft).await;
        self.loading = false;

        match result {
            Ok(SaveOutcome::Updated) => {
                self.status = Some(Status::success(MSG_UPDATED));
            }
            Ok(SaveOutcome::Inserted) => {
                self.status = Some(Status::success(MSG_ADDED));
                self.load().await;
            }
            Err(e) => {
                error!("Failed to save the system prompt: {}", e);
                self.status = Some(Status::error(MSG_SAVE_FAILED));
            }
        }
    }
}
