//! Session configuration and the connection parameters derived from it.

use std::collections::BTreeSet;
use std::fmt;

use uuid::Uuid;

use crate::error::ConfigError;

/// When the credential prompt may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialMode {
    /// Never prompt; a missing password is a terminal failure.
    NeverPrompt,
    /// Prompt before the first connection attempt.
    ForcePrompt,
    /// Prompt only after the server rejects the credentials.
    #[default]
    Auto,
}

/// TLS mode for both the control and the replication connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    #[default]
    Disable,
    Require,
    VerifyCa,
    VerifyFull,
}

/// A password. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Returns `None` for empty input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Everything needed to open and drive one replication session.
///
/// Immutable once the session starts.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    /// Password known up front (e.g. from `PGPASSWORD`).
    pub password: Option<Credential>,
    pub credential_mode: CredentialMode,
    pub ssl_mode: SslMode,
    /// `None` generates a fresh slot for this session.
    pub slot_name: Option<String>,
    pub publications: BTreeSet<String>,
    /// `None` picks a default from the server version once connected.
    pub protocol_version: Option<u32>,
    pub binary: bool,
    pub streaming: bool,
    pub keep_empty_transactions: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            password: None,
            credential_mode: CredentialMode::Auto,
            ssl_mode: SslMode::Disable,
            slot_name: None,
            publications: BTreeSet::new(),
            protocol_version: None,
            binary: false,
            streaming: false,
            keep_empty_transactions: false,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.publications.is_empty() {
            return Err(ConfigError::NoPublications);
        }
        if let Some(name) = &self.slot_name {
            if !is_valid_slot_name(name) {
                return Err(ConfigError::InvalidSlotName(name.clone()));
            }
        }
        if let Some(version) = self.protocol_version {
            if !(1..=4).contains(&version) {
                return Err(ConfigError::UnsupportedProtocolVersion(version));
            }
        }
        Ok(())
    }

    pub fn slot_identity(&self) -> SlotIdentity {
        match &self.slot_name {
            Some(name) => SlotIdentity::user_supplied(name.clone()),
            None => SlotIdentity::generate(),
        }
    }
}

/// Slot names follow the server's rules for replication slot identifiers.
fn is_valid_slot_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotOrigin {
    /// Created by this session, always fresh.
    Generated,
    /// Named by the user; assumed to exist, created on demand.
    UserSupplied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotIdentity {
    name: String,
    origin: SlotOrigin,
}

impl SlotIdentity {
    pub fn generate() -> Self {
        Self {
            name: format!("walpeek_{}", Uuid::new_v4().simple()),
            origin: SlotOrigin::Generated,
        }
    }

    pub fn user_supplied(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: SlotOrigin::UserSupplied,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> SlotOrigin {
        self.origin
    }
}

/// Snapshot handling requested at slot creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotMode {
    NoExport,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotOptions {
    pub temporary: bool,
    pub snapshot: SnapshotMode,
}

/// Options for `START_REPLICATION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOptions {
    pub publications: BTreeSet<String>,
    pub protocol_version: u32,
    pub binary: bool,
    pub streaming: bool,
}

/// Parameters for one connection attempt. Mutated between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<Credential>,
    /// Resolve the password from the password file.
    pub use_passfile: bool,
    pub ssl_mode: SslMode,
    pub application_name: String,
}

impl ConnectParams {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            database: config.database.clone(),
            user: config.user.clone(),
            password: config.password.clone(),
            use_passfile: false,
            ssl_mode: config.ssl_mode,
            application_name: "walpeek".to_string(),
        }
    }
}
