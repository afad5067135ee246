use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssociateId(pub i64);

impl fmt::Display for AssociateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A sales associate. The stored credential never leaves the repository layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Associate {
    pub id: AssociateId,
    pub name: String,
    pub login: String,
    pub address: Option<String>,
    pub accumulated_commission: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewAssociate {
    pub name: String,
    pub login: String,
    pub credential: SecretString,
    pub address: Option<String>,
}

/// Partial profile update. `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct AssociateProfile {
    pub name: Option<String>,
    pub address: Option<String>,
    pub credential: Option<SecretString>,
}

impl NewAssociate {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("associate name must not be empty".to_string());
        }
        if self.login.trim().is_empty() {
            return Err("associate login must not be empty".to_string());
        }
        if self.credential.expose_secret().is_empty() {
            return Err("associate credential must not be empty".to_string());
        }
        Ok(())
    }
}

/// Salted SHA-256 digest of an associate credential, stored as `<salt-hex>$<digest-hex>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialDigest(String);

impl CredentialDigest {
    pub fn derive(credential: &SecretString) -> Self {
        let salt: [u8; 16] = rand::thread_rng().gen();
        Self::with_salt(&hex(&salt), credential)
    }

    pub fn from_stored(stored: impl Into<String>) -> Self {
        Self(stored.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn verify(&self, credential: &SecretString) -> bool {
        match self.0.split_once('$') {
            Some((salt, _)) => Self::with_salt(salt, credential).0 == self.0,
            None => false,
        }
    }

    fn with_salt(salt: &str, credential: &SecretString) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(b"$");
        hasher.update(credential.expose_secret().as_bytes());
        Self(format!("{salt}${:x}", hasher.finalize()))
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{CredentialDigest, NewAssociate};

    #[test]
    fn digest_verifies_only_the_original_credential() {
        let digest = CredentialDigest::derive(&SecretString::from("hunter2".to_string()));

        assert!(digest.verify(&SecretString::from("hunter2".to_string())));
        assert!(!digest.verify(&SecretString::from("hunter3".to_string())));
        assert!(!digest.as_str().contains("hunter2"));
    }

    #[test]
    fn digests_are_salted() {
        let first = CredentialDigest::derive(&SecretString::from("same".to_string()));
        let second = CredentialDigest::derive(&SecretString::from("same".to_string()));
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_stored_digest_never_verifies() {
        let stored = CredentialDigest::from_stored("plaintext");
        assert!(!stored.verify(&SecretString::from("plaintext".to_string())));
    }

    #[test]
    fn new_associate_requires_name_and_login() {
        let associate = NewAssociate {
            name: " ".to_string(),
            login: "jdoe".to_string(),
            credential: SecretString::from("pw".to_string()),
            address: None,
        };
        assert!(associate.validate().is_err());
    }
}
