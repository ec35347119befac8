use dialoguer::Password;
use tracing::warn;
use walpeek_core::{Credential, CredentialPrompt};

/// Masked terminal password prompt.
pub struct TerminalPrompt {
    user: String,
}

impl TerminalPrompt {
    pub fn new(user: impl Into<String>) -> Self {
        Self { user: user.into() }
    }
}

impl CredentialPrompt for TerminalPrompt {
    async fn prompt(&mut self) -> Option<Credential> {
        let prompt = format!("Password for user {}", self.user);
        let answer = tokio::task::spawn_blocking(move || {
            Password::new()
                .with_prompt(prompt)
                .allow_empty_password(true)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(password)) => Credential::new(password),
            Ok(Err(e)) => {
                warn!(error = %e, "Password prompt failed");
                None
            }
            Err(e) => {
                warn!(error = %e, "Password prompt task failed");
                None
            }
        }
    }
}
