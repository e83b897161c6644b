use anyhow::{Context, Result};
use keyring::Entry;

use crate::config::APP_NAME;

/// Backend access tokens kept in the OS keychain, one entry per user.
pub struct CredentialStore;

impl CredentialStore {
    /// Store the backend access token for a user
    pub fn store_token(user_id: &str, token: &str) -> Result<()> {
        let entry = Entry::new(APP_NAME, user_id).context("Failed to create keyring entry")?;
        entry
            .set_password(token)
            .context("Failed to store token in keychain")?;
        Ok(())
    }

    /// Retrieve the stored token, `None` when there is none
    pub fn get_token(user_id: &str) -> Result<Option<String>> {
        let entry = Entry::new(APP_NAME, user_id).context("Failed to create keyring entry")?;
        match entry.get_password() {
            Ok(token) => Ok(Some(token)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    pub fn delete_token(user_id: &str) -> Result<()> {
        let entry = Entry::new(APP_NAME, user_id).context("Failed to create keyring entry")?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
