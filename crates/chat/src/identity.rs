use std::path::{Path, PathBuf};

use rill_protocol::ClientId;
use snafu::{ResultExt, Snafu};

pub const IDENTITY_DIRECTORY_NAME: &str = "rill";
pub const IDENTITY_FILE_NAME: &str = "client-id";

#[derive(Debug, Snafu)]
pub enum IdentityError {
    #[snafu(display("failed to create identity directory {path:?}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to read identity file {path:?}"))]
    ReadFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to write identity file {path:?}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to move identity file into place at {path:?}"))]
    CommitFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// The opaque persisted token correlating this client's sessions across
/// reconnects. Created once on first run, reused forever after; the core
/// never mutates or deletes it.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    id: ClientId,
}

impl ClientIdentity {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(IDENTITY_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(format!(".{IDENTITY_DIRECTORY_NAME}")))
            .join(IDENTITY_FILE_NAME)
    }

    /// Loads the identity from `path`, minting and persisting a fresh one on
    /// first run. A corrupt or empty file is treated as first run.
    pub fn load_or_create(path: &Path) -> Result<Self, IdentityError> {
        if path.exists() {
            let raw = std::fs::read_to_string(path).context(ReadFileSnafu {
                stage: "read-identity",
                path: path.to_path_buf(),
            })?;
            if let Ok(id) = ClientId::parse(&raw) {
                return Ok(Self { id });
            }
            tracing::warn!(?path, "identity file unparseable; minting a new identity");
        }

        let id = ClientId::generate();
        Self::persist(path, &id)?;
        tracing::info!(?path, "minted new client identity");
        Ok(Self { id })
    }

    pub fn id(&self) -> &ClientId {
        &self.id
    }

    fn persist(path: &Path, id: &ClientId) -> Result<(), IdentityError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-identity-directory",
                path: parent.to_path_buf(),
            })?;
        }

        // Write-then-rename keeps the identity file whole even if the write
        // is interrupted.
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, id.as_str()).context(WriteFileSnafu {
            stage: "write-temporary-identity-file",
            path: temp_path.clone(),
        })?;
        std::fs::rename(&temp_path, path).context(CommitFileSnafu {
            stage: "commit-identity-file",
            path: path.to_path_buf(),
        })
    }
}
