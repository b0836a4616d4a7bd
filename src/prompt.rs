//! Interactive terminal prompts

use inquire::error::InquireError;
use inquire::{Password, PasswordDisplayMode, Text};
use std::path::PathBuf;

use crate::credentials::{Credential, CredentialPrompter};
use crate::dll::FileSelector;
use crate::error::{Result, SyncError};
use crate::sync::{AppId, AppIdPrompter};

/// Prompts on the controlling terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl AppIdPrompter for TerminalPrompter {
    fn prompt_app_id(&self) -> Result<AppId> {
        let answer = Text::new("Application id (appid):")
            .with_help_message("Numeric id of the game, e.g. 480")
            .prompt()
            .map_err(prompt_error)?;
        answer.parse()
    }
}

impl CredentialPrompter for TerminalPrompter {
    fn prompt_credentials(&self) -> Result<Credential> {
        println!("\n--- Login ---");
        let username = Text::new("Username:").prompt().map_err(prompt_error)?;
        let secret = Password::new("Password:")
            .with_display_mode(PasswordDisplayMode::Hidden)
            .without_confirmation()
            .prompt()
            .map_err(prompt_error)?;

        if username.trim().is_empty() {
            return Err(SyncError::invalid_input("username must not be empty"));
        }

        Ok(Credential::new(username.trim(), secret))
    }
}

impl FileSelector for TerminalPrompter {
    fn select_dll(&self) -> Result<Option<PathBuf>> {
        let answer = Text::new("Path to steam_api.dll or steam_api64.dll:")
            .with_help_message("Leave empty or press Esc to skip")
            .prompt_skippable();
        dll_answer(answer)
    }
}

/// Esc, Ctrl-C and an empty answer all skip the DLL step
fn dll_answer(answer: std::result::Result<Option<String>, InquireError>) -> Result<Option<PathBuf>> {
    let answer = match answer {
        Ok(answer) => answer,
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => None,
        Err(other) => return Err(prompt_error(other)),
    };

    Ok(answer
        .map(|a| a.trim().trim_matches('"').to_string())
        .filter(|a| !a.is_empty())
        .map(PathBuf::from))
}

fn prompt_error(error: InquireError) -> SyncError {
    match error {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => {
            SyncError::invalid_input("prompt cancelled")
        }
        other => SyncError::invalid_input(format!("prompt failed: {}", other)),
    }
}
