use std::io::Write as _;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::auth::{AuthProvider, Session};
use crate::form::{Confirm, FormController, Status, StatusKind};
use crate::store::PromptStore;

const TITLE: &str = "promptdesk / SDR system prompt";
const HINT: &str = "This prompt defines the SDR agent's behavior.";
const HELP: &str = "Commands: show, edit, save, reload, quit";
const SIGN_IN_HINT: &str =
    "You are not signed in. Sign in through the admin portal and put the refresh token in config.toml.";
const AUTH_FAILED: &str = "Authentication failed. Try again.";
const SESSION_ENDED: &str = "Your session has ended. Returning to sign-in.";

type SharedLines = Arc<Mutex<Lines<BufReader<Stdin>>>>;

/// Outcome of the sign-in check that guards the editor.
pub enum Gate {
    Proceed(Session),
    RedirectToLogin,
    Failed(String),
}

pub async fn session_gate(auth: &dyn AuthProvider) -> Gate {
    match auth.current_session().await {
        Ok(Some(session)) => Gate::Proceed(session),
        Ok(None) => Gate::RedirectToLogin,
        Err(e) => {
            error!("Failed to resolve the session: {}", e);
            Gate::Failed(AUTH_FAILED.to_string())
        }
    }
}

/// Run the editor view. Returns once the operator quits, the input stream
/// closes, or the session is lost.
pub async fn run(auth: Arc<dyn AuthProvider>, store: Arc<dyn PromptStore>) -> Result<()> {
    let session = match session_gate(auth.as_ref()).await {
        Gate::Proceed(session) => session,
        Gate::RedirectToLogin => {
            println!("{}", SIGN_IN_HINT);
            return Ok(());
        }
        Gate::Failed(message) => {
            println!("{}", message);
            return Ok(());
        }
    };

    info!(
        "Signed in as {}",
        session.email.as_deref().unwrap_or(&session.user_id)
    );

    let mut session_changes = auth.subscribe();
    let lines: SharedLines = Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines()));
    let confirm = ConsoleConfirm {
        lines: lines.clone(),
    };

    let mut form = FormController::new(store, session.user_id.clone());

    println!("{}", TITLE);
    println!("Loading...");
    form.load().await;
    render(&form);

    loop {
        print!("> ");
        let _ = std::io::stdout().flush();

        tokio::select! {
            changed = session_changes.changed() => {
                if changed.is_err() || session_changes.borrow_and_update().is_none() {
                    println!();
                    println!("{}", SESSION_ENDED);
                    break;
                }
            }
            line = read_line(&lines) => {
                let Some(line) = line else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "show" => println!("{}", buffer_view(form.prompt_text())),
                    "edit" => {
                        let text = capture_text(&lines).await;
                        form.set_prompt_text(text);
                        println!("{}", buffer_view(form.prompt_text()));
                    }
                    "save" => {
                        form.submit(&confirm).await;
                        print_status(&form);
                    }
                    "reload" => {
                        println!("Loading...");
                        form.load().await;
                        render(&form);
                    }
                    "quit" | "q" | "exit" => break,
                    _ => println!("{}", HELP),
                }
            }
        }
    }

    Ok(())
}

/// y/N prompt on the console's own input stream.
struct ConsoleConfirm {
    lines: SharedLines,
}

#[async_trait]
impl Confirm for ConsoleConfirm {
    async fn confirm(&self, question: &str) -> bool {
        print!("{} [y/N] ", question);
        let _ = std::io::stdout().flush();
        let answer = read_line(&self.lines).await.unwrap_or_default();
        is_affirmative(&answer)
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

async fn read_line(lines: &SharedLines) -> Option<String> {
    lines.lock().await.next_line().await.ok().flatten()
}

/// Multi-line input, terminated by a lone `.` line.
async fn capture_text(lines: &SharedLines) -> String {
    println!("Enter the prompt text. Finish with a single '.' on its own line.");
    let mut buffer = String::new();
    while let Some(line) = read_line(lines).await {
        if line.trim() == "." {
            break;
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);
    }
    buffer
}

fn render(form: &FormController) {
    print_status(form);
    println!("{}", buffer_view(form.prompt_text()));
    println!("{}", HINT);
    println!("{}", HELP);
}

fn print_status(form: &FormController) {
    if let Some(status) = form.status() {
        println!("{}", status_banner(status));
    }
}

fn status_banner(status: &Status) -> String {
    match status.kind {
        StatusKind::Success => format!("[ok] {}", status.text),
        StatusKind::Error => format!("[error] {}", status.text),
    }
}

fn buffer_view(text: &str) -> String {
    if text.is_empty() {
        "(no prompt text yet)".to_string()
    } else {
        text.to_string()
    }
}
