// # Process Identity
//
// The set identifier that distinguishes this instance's record inside a
// weighted record set.
//
// One identity is created per process, before the loop starts, and is never
// persisted. A restart yields a new identity unless the operator pins one.

use rand::Rng;
use rand::distributions::Alphanumeric;
use std::fmt;

/// Length of a generated identity
pub const IDENTITY_LEN: usize = 10;

/// Set identifier for this process's weighted record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Generate a random identity from the thread-local CSPRNG
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    /// Generate a random identity from the given RNG
    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let token: String = rng
            .sample_iter(&Alphanumeric)
            .take(IDENTITY_LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Use an operator-supplied identifier
    pub fn pinned(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        crate::config::validate_set_identifier(&id)?;
        Ok(Self(id))
    }

    /// Pinned identifier if configured, otherwise a fresh random one
    pub fn from_config(set_identifier: Option<&str>) -> crate::Result<Self> {
        match set_identifier {
            Some(id) => Self::pinned(id),
            None => Ok(Self::generate()),
        }
    }

    /// The identifier as sent to the provider
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
