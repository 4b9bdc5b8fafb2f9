// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::{debug, warn};

use crate::config::Config;
use crate::error::CredentialError;

const SERVICE: &str = "castsync";

/// Password storage backed by the platform keyring, with the config
/// file as fallback for setups without one.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(username: &str, server: &str) -> Result<keyring::Entry, CredentialError> {
        let account = format!("{username}@{server}");
        Ok(keyring::Entry::new(SERVICE, &account)?)
    }

    pub fn get(username: &str, server: &str) -> Result<String, CredentialError> {
        match Self::entry(username, server)?.get_password() {
            Ok(password) => Ok(password),
            Err(keyring::Error::NoEntry) => Err(CredentialError::NotFound {
                username: username.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(username: &str, server: &str, password: &str) -> Result<(), CredentialError> {
        Self::entry(username, server)?.set_password(password)?;
        Ok(())
    }

    pub fn delete(username: &str, server: &str) -> Result<(), CredentialError> {
        match Self::entry(username, server)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Resolve the account password: keyring first, then the plaintext
/// config fallback. A fallback password found in the config is moved
/// into the keyring and scrubbed from the file.
pub fn resolve_password(config: &mut Config) -> Result<String, CredentialError> {
    let sync = &config.sync;
    match CredentialStore::get(&sync.username, &sync.server) {
        Ok(password) => Ok(password),
        Err(CredentialError::NotFound { .. }) => match config.sync.password.take() {
            Some(password) => {
                debug!("migrating config-file password into the keyring");
                CredentialStore::set(&config.sync.username, &config.sync.server, &password)?;
                if let Err(e) = config.save() {
                    warn!(error = %e, "could not scrub password from config file");
                    return Err(e.into());
                }
                Ok(password)
            }
            None => Err(CredentialError::NotFound {
                username: config.sync.username.clone(),
            }),
        },
        Err(e) => Err(e),
    }
}
