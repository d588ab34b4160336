//! MariaDB connection settings and the mysqldump invocation built from them.

use std::fmt;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use storj_dump::object::upload::CHUNK_SIZE;
use storj_dump::source::ByteSource;

/// The program that exports the database.
pub const DUMP_PROGRAM: &str = "mysqldump";

/// Connection settings of the database to dump, usually read from a `db_property.json` file.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    pub hostname: String,
    pub port: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl DatabaseConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read database configuration {}", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse database configuration {}", path.display()))
    }

    /// Returns the command that writes the SQL dump of the database to its standard output.
    pub fn dump_command(&self) -> Command {
        let mut command = Command::new(DUMP_PROGRAM);
        command
            .arg("-P")
            .arg(&self.port)
            .arg("-h")
            .arg(&self.hostname)
            .arg("-u")
            .arg(&self.username)
            .arg(format!("-p{}", self.password))
            .arg(&self.database);
        command
    }
}

/// Reads `source` until it's exhausted, discarding the data, and returns the number of bytes read.
pub fn drain_dump<B: ByteSource>(mut source: B) -> Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut bytes = 0u64;
    loop {
        let chunk = source
            .read_chunk(&mut buf)
            .context("Failed to read the database dump")?;
        bytes += chunk.bytes_read as u64;
        debug!("Read {} bytes of the dump", chunk.bytes_read);

        if !chunk.more_data_pending {
            return Ok(bytes);
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}
