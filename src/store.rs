use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;

use crate::auth::Session;
use crate::config::Config;

/// Code PostgREST uses to report that a query matched no rows.
const PGRST_NO_ROWS: &str = "PGRST116";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend rejected the request: {message}")]
    Backend {
        code: Option<String>,
        message: String,
    },
    #[error("unexpected response shape: {0}")]
    Malformed(String),
    #[error("no active session")]
    Unauthorized,
}

impl StoreError {
    /// True when the backend reported the zero-rows signal rather than a
    /// real failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Backend { code: Some(code), .. } if code == PGRST_NO_ROWS)
    }
}

/// The one row this tool reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PromptRecord {
    pub id: String,
    pub prompt_text: String,
}

/// An edit about to be persisted. `id` absent means no record exists yet
/// and the save becomes an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptDraft {
    pub id: Option<String>,
    pub prompt_text: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Updated,
    Inserted,
}

#[async_trait]
pub trait PromptStore: Send + Sync {
    /// Fetch the current record, if any. `Ok(None)` is the normal empty
    /// state, not an error.
    async fn fetch_one(&self) -> Result<Option<PromptRecord>, StoreError>;

    /// Update the record named by `draft.id`, or insert a new one when no
    /// id is known.
    async fn save(&self, draft: &PromptDraft) -> Result<SaveOutcome, StoreError>;
}

/// PostgREST-backed store. Every request carries the project api key plus
/// the operator's access token, read from the session channel at call time.
pub struct PostgrestStore {
    table_url: String,
    anon_key: String,
    client: reqwest::Client,
    sessions: watch::Receiver<Option<Session>>,
}

impl PostgrestStore {
    pub fn new(
        config: &Config,
        client: reqwest::Client,
        sessions: watch::Receiver<Option<Session>>,
    ) -> Self {
        Self {
            table_url: format!("{}/rest/v1/{}", config.backend_url, config.table),
            anon_key: config.anon_key.clone(),
            client,
            sessions,
        }
    }

    fn bearer(&self) -> Result<String, StoreError> {
        self.sessions
            .borrow()
            .as_ref()
            .map(|session| format!("Bearer {}", session.access_token))
            .ok_or(StoreError::Unauthorized)
    }
}

#[async_trait]
impl PromptStore for PostgrestStore {
    async fn fetch_one(&self) -> Result<Option<PromptRecord>, StoreError> {
        let bearer = self.bearer()?;
        let response = self
            .client
            .get(&self.table_url)
            .query(&[("select", "id,prompt_text"), ("limit", "1")])
            .header("apikey", &self.anon_key)
            .header(reqwest::header::AUTHORIZATION, bearer)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(decode_error(status.as_u16(), &body));
        }

        decode_rows(&body)
    }

    async fn save(&self, draft: &PromptDraft) -> Result<SaveOutcome, StoreError> {
        let bearer = self.bearer()?;

        match &draft.id {
            Some(id) => {
                let response = self
                    .client
                    .patch(&self.table_url)
                    .query(&[("id", format!("eq.{}", id))])
                    .header("apikey", &self.anon_key)
                    .header(reqwest::header::AUTHORIZATION, bearer)
                    .header("Prefer", "return=minimal")
                    .json(&serde_json::json!({ "prompt_text": draft.prompt_text }))
                    .send()
                    .await?;
                ensure_success(response).await?;
                Ok(SaveOutcome::Updated)
            }
            None => {
                let response = self
                    .client
                    .post(&self.table_url)
                    .header("apikey", &self.anon_key)
                    .header(reqwest::header::AUTHORIZATION, bearer)
                    .header("Prefer", "return=minimal")
                    .json(&serde_json::json!({
                        // legacy column, NOT NULL in the schema but never
                        // read by this tool
                        "prompt": "",
                        "prompt_text": draft.prompt_text,
                        "created_by": draft.created_by,
                    }))
                    .send()
                    .await?;
                ensure_success(response).await?;
                Ok(SaveOutcome::Inserted)
            }
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(decode_error(status.as_u16(), &body))
}

fn decode_rows(body: &str) -> Result<Option<PromptRecord>, StoreError> {
    let rows: Vec<PromptRecord> =
        serde_json::from_str(body).map_err(|e| StoreError::Malformed(e.to_string()))?;
    Ok(rows.into_iter().next())
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

fn decode_error(status: u16, body: &str) -> StoreError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => StoreError::Backend {
            message: parsed
                .message
                .unwrap_or_else(|| format!("HTTP {}", status)),
            code: parsed.code,
        },
        Err(_) => StoreError::Backend {
            code: None,
            message: format!("HTTP {}: {}", status, body.trim()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_single_row() {
        let record = decode_rows(r#"[{"id": "abc-123", "prompt_text": "Old"}]"#)
            .unwrap()
            .unwrap();
        assert_eq!(record.id, "abc-123");
        assert_eq!(record.prompt_text, "Old");
    }

    #[test]
    fn empty_result_set_is_none() {
        assert_eq!(decode_rows("[]").unwrap(), None);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let record = decode_rows(
            r#"[{"id": "abc-123", "prompt_text": "Old", "created_at": "2024-01-01T00:00:00Z"}]"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.id, "abc-123");
    }

    #[test]
    fn missing_columns_are_rejected() {
        let result = decode_rows(r#"[{"id": "abc-123"}]"#);
        assert!(matches!(result, Err(StoreError::Malformed(_))));
    }

    #[test]
    fn non_array_body_is_rejected() {
        let result = decode_rows(r#"{"id": "abc-123", "prompt_text": "Old"}"#);
        assert!(matches!(result, Err(StoreError::Malformed(_))));
    }

    #[test]
    fn decodes_postgrest_error_body() {
        let error = decode_error(
            406,
            r#"{"code": "PGRST116", "message": "JSON object requested, multiple (or no) rows returned"}"#,
        );
        assert!(error.is_not_found());
        let StoreError::Backend { code, message } = error else {
            panic!("expected backend error");
        };
        assert_eq!(code.as_deref(), Some(PGRST_NO_ROWS));
        assert!(message.contains("rows returned"));
    }

    #[test]
    fn plain_text_error_body_falls_back_to_status() {
        let error = decode_error(502, "bad gateway");
        assert!(!error.is_not_found());
        let StoreError::Backend { code, message } = error else {
            panic!("expected backend error");
        };
        assert!(code.is_none());
        assert!(message.contains("502"));
    }

    #[test]
    fn transport_and_unauthorized_are_not_the_not_found_signal() {
        assert!(!StoreError::Unauthorized.is_not_found());
        assert!(!StoreError::Malformed("x".into()).is_not_found());
    }
}
