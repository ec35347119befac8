use std::collections::BTreeSet;

use clap::{Parser, ValueEnum};
use walpeek_core::{Credential, CredentialMode, SessionConfig, SslMode};

#[derive(Parser, Debug)]
#[command(name = "walpeek")]
#[command(about = "Print the messages of a PostgreSQL logical replication stream")]
#[command(version)]
pub struct Cli {
    /// Database server host
    #[arg(long, env = "PGHOST", default_value = "localhost")]
    pub host: String,

    /// Database server port
    #[arg(short, long, env = "PGPORT", default_value = "5432")]
    pub port: u16,

    /// Database to connect to (defaults to the user name)
    #[arg(short, long, env = "PGDATABASE")]
    pub dbname: Option<String>,

    /// Database user (defaults to the operating system user)
    #[arg(short = 'U', long, env = "PGUSER")]
    pub username: Option<String>,

    /// Never prompt for a password
    #[arg(short = 'w', long, conflicts_with = "password")]
    pub no_password: bool,

    /// Prompt for a password before connecting
    #[arg(short = 'W', long)]
    pub password: bool,

    /// Replication slot to stream from (a fresh slot is created when omitted)
    #[arg(long)]
    pub slot: Option<String>,

    /// Publication to subscribe to (repeatable)
    #[arg(long = "publication", required = true)]
    pub publications: Vec<String>,

    /// pgoutput protocol version (defaults from the server version)
    #[arg(long)]
    pub protocol_version: Option<u32>,

    /// Request binary transfer of column values
    #[arg(long)]
    pub binary: bool,

    /// Request streaming of in-progress transactions
    #[arg(long)]
    pub streaming: bool,

    /// Print Begin/Commit pairs that carry no changes
    #[arg(long)]
    pub keep_empty_transactions: bool,

    /// TLS mode
    #[arg(long, value_enum, default_value = "disable")]
    pub sslmode: SslModeArg,

    /// Print each message's position after its name
    #[arg(long)]
    pub show_lsn: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SslModeArg {
    Disable,
    Require,
    VerifyCa,
    VerifyFull,
}

impl From<SslModeArg> for SslMode {
    fn from(mode: SslModeArg) -> Self {
        match mode {
            SslModeArg::Disable => SslMode::Disable,
            SslModeArg::Require => SslMode::Require,
            SslModeArg::VerifyCa => SslMode::VerifyCa,
            SslModeArg::VerifyFull => SslMode::VerifyFull,
        }
    }
}

impl Cli {
    pub fn credential_mode(&self) -> CredentialMode {
        if self.no_password {
            CredentialMode::NeverPrompt
        } else if self.password {
            CredentialMode::ForcePrompt
        } else {
            CredentialMode::Auto
        }
    }

    /// Build the session configuration. `PGPASSWORD` supplies the initial
    /// password, if set.
    pub fn session_config(&self) -> SessionConfig {
        let user = self
            .username
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "postgres".to_string());
        let database = self.dbname.clone().unwrap_or_else(|| user.clone());

        SessionConfig {
            host: self.host.clone(),
            port: self.port,
            database,
            user,
            password: std::env::var("PGPASSWORD").ok().and_then(Credential::new),
            credential_mode: self.credential_mode(),
            ssl_mode: self.sslmode.into(),
            slot_name: self.slot.clone(),
            publications: self.publications.iter().cloned().collect::<BTreeSet<_>>(),
            protocol_version: self.protocol_version,
            binary: self.binary,
            streaming: self.streaming,
            keep_empty_transactions: self.keep_empty_transactions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_prompt_flags() {
        let cli = Cli::try_parse_from(["walpeek", "--publication", "p", "-w"]).unwrap();
        assert_eq!(cli.credential_mode(), CredentialMode::NeverPrompt);

        let cli = Cli::try_parse_from(["walpeek", "--publication", "p", "-W"]).unwrap();
        assert_eq!(cli.credential_mode(), CredentialMode::ForcePrompt);

        let cli = Cli::try_parse_from(["walpeek", "--publication", "p"]).unwrap();
        assert_eq!(cli.credential_mode(), CredentialMode::Auto);

        assert!(Cli::try_parse_from(["walpeek", "--publication", "p", "-w", "-W"]).is_err());
    }

    #[test]
    fn test_publication_is_required() {
        assert!(Cli::try_parse_from(["walpeek", "--slot", "s"]).is_err());
    }

    #[test]
    fn test_session_config_from_args() {
        let cli = Cli::try_parse_from([
            "walpeek",
            "-U",
            "replicator",
            "-d",
            "shop",
            "--slot",
            "audit",
            "--publication",
            "orders",
            "--publication",
            "users",
            "--publication",
            "orders",
            "--protocol-version",
            "2",
            "--keep-empty-transactions",
            "--sslmode",
            "verify-full",
        ])
        .unwrap();

        let config = cli.session_config();
        assert_eq!(config.user, "replicator");
        assert_eq!(config.database, "shop");
        assert_eq!(config.slot_name.as_deref(), Some("audit"));
        assert_eq!(config.publications.len(), 2);
        assert_eq!(config.protocol_version, Some(2));
        assert!(config.keep_empty_transactions);
        assert!(!config.binary);
        assert_eq!(config.ssl_mode, SslMode::VerifyFull);
    }
}
