//! libpq-compatible password file lookup.
//!
//! Lines have the form `hostname:port:database:username:password`. Any of the
//! first four fields may be `*`. `\:` and `\\` escape a colon and a backslash.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Where the password file lives: `PGPASSFILE`, else the platform default.
pub fn location() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("PGPASSFILE") {
        return Some(PathBuf::from(path));
    }

    #[cfg(windows)]
    {
        std::env::var_os("APPDATA")
            .map(|dir| PathBuf::from(dir).join("postgresql").join("pgpass.conf"))
    }
    #[cfg(not(windows))]
    {
        std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".pgpass"))
    }
}

/// Whether a password file exists to fall back on.
pub fn is_available() -> bool {
    location().is_some_and(|path| path.is_file())
}

/// Look up the password for a connection target in the file at `path`.
pub fn lookup(
    path: &Path,
    host: &str,
    port: u16,
    database: &str,
    user: &str,
) -> io::Result<Option<String>> {
    let content = fs::read_to_string(path)?;
    let password = find_password(&content, host, port, database, user);
    debug!(path = %path.display(), found = password.is_some(), "Password file lookup");
    Ok(password)
}

fn find_password(content: &str, host: &str, port: u16, database: &str, user: &str) -> Option<String> {
    let port = port.to_string();
    let target = [host, port.as_str(), database, user];

    content
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(split_fields)
        .filter(|fields| fields.len() == 5)
        .find(|fields| {
            fields[..4]
                .iter()
                .zip(target)
                .all(|(pattern, value)| pattern == "*" || pattern == value)
        })
        .map(|mut fields| fields.remove(4))
}

fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::with_capacity(5);
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            // The password is the rest of the line.
            ':' if fields.len() < 4 => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}
