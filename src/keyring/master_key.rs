//! Master key acquisition.
//!
//! The key either comes from a key file (non-interactive deployments) or
//! from the operator at a prompt. A new interactive key requires a matching
//! confirmation; an empty entry cancels the whole bootstrap, which is a
//! distinct outcome rather than an error.

use crate::core::types::generate_password;
use crate::core::{BootstrapError, Result};
use crate::keyring::store::make_file_private;
use std::fs;
use std::io::Write;
use std::path::Path;

const GENERATED_KEY_LENGTH: usize = 32;

/// Console secret entry. The real terminal implementation disables echo;
/// tests script the replies.
pub trait SecretPrompt {
    fn prompt_secret(&mut self, message: &str) -> Result<String>;
}

/// Reads a secret from the controlling terminal with echo disabled.
pub struct TerminalPrompt;

impl SecretPrompt for TerminalPrompt {
    fn prompt_secret(&mut self, message: &str) -> Result<String> {
        use crossterm::event::{Event, KeyCode, KeyEventKind, read};
        use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

        print!("{}: ", message);
        std::io::stdout()
            .flush()
            .map_err(|e| BootstrapError::io("Could not flush stdout", e))?;

        enable_raw_mode().map_err(|e| BootstrapError::io("Could not open terminal", e))?;
        let mut secret = String::new();
        let result = loop {
            match read() {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Enter => break Ok(()),
                    KeyCode::Backspace => {
                        secret.pop();
                    }
                    KeyCode::Char(c) => secret.push(c),
                    _ => {}
                },
                Ok(_) => {}
                Err(e) => break Err(BootstrapError::io("Could not read from terminal", e)),
            }
        };
        let _ = disable_raw_mode();
        println!();
        result.map(|_| secret)
    }
}

/// Obtain the keyring master key.
///
/// With a key file: read it, or generate a fresh random key into it
/// (owner-only) when it does not exist yet. Interactively: a pre-existing
/// keyring gets a single prompt for its current key; a new keyring gets a
/// double-entry prompt where a mismatch re-prompts and an empty entry
/// cancels. `Ok(None)` is the cancelled outcome.
pub fn obtain_master_key(
    keyring_path: &Path,
    master_key_file: Option<&Path>,
    prompt: &mut dyn SecretPrompt,
) -> Result<Option<String>> {
    if let Some(key_file) = master_key_file {
        if key_file.exists() {
            let contents = fs::read_to_string(key_file).map_err(|e| {
                BootstrapError::io(
                    &format!("Could not read master key file {}", key_file.display()),
                    e,
                )
            })?;
            let key = contents.lines().next().unwrap_or("").to_string();
            if key.is_empty() {
                return Err(BootstrapError::KeyringError(format!(
                    "Master key file {} is empty",
                    key_file.display()
                )));
            }
            return Ok(Some(key));
        }
        let key = generate_password(GENERATED_KEY_LENGTH);
        fs::write(key_file, format!("{}\n", key)).map_err(|e| {
            BootstrapError::io(
                &format!("Could not write master key file {}", key_file.display()),
                e,
            )
        })?;
        make_file_private(key_file)?;
        return Ok(Some(key));
    }

    if keyring_path.exists() {
        let key = prompt.prompt_secret(&format!(
            "Please provide the encryption key for key file at {}",
            keyring_path.display()
        ))?;
        return Ok(Some(key));
    }

    loop {
        let key = prompt.prompt_secret("Please provide an encryption key")?;
        if key.is_empty() {
            return Ok(None);
        }
        let confirm = prompt.prompt_secret("Please confirm encryption key")?;
        if confirm == key {
            return Ok(Some(key));
        }
        println!("Entered keys do not match. Please try again.");
    }
}
