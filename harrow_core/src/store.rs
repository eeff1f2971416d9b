use crate::outcome::Outcome;
use crate::session::Session;
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

/// Indentation used for result files.
const RESULT_INDENT: &[u8] = b"    ";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Result store I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize results for {path:?}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse result file {path:?}: {source}")]
    Deserialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to move finished results into place at {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Persists sessions as an indented JSON array of outcome records.
///
/// Writes go to a temporary file in the destination directory that is
/// renamed over the destination only once fully written, so a failed save
/// never leaves a truncated file behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultStore;

impl ResultStore {
    pub fn save(session: &Session, destination: impl AsRef<Path>) -> Result<(), StoreError> {
        Self::save_outcomes(session.outcomes(), destination)
    }

    pub fn save_outcomes(
        outcomes: &[Outcome],
        destination: impl AsRef<Path>,
    ) -> Result<(), StoreError> {
        let destination = destination.as_ref();
        let io_err = |source| StoreError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let parent = match destination.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        let mut temp_file = NamedTempFile::new_in(parent).map_err(io_err)?;

        {
            let mut writer = BufWriter::new(temp_file.as_file_mut());
            let formatter = PrettyFormatter::with_indent(RESULT_INDENT);
            let mut serializer = Serializer::with_formatter(&mut writer, formatter);
            outcomes
                .serialize(&mut serializer)
                .map_err(|source| StoreError::Serialization {
                    path: destination.to_path_buf(),
                    source,
                })?;
            writer.write_all(b"\n").map_err(io_err)?;
            writer.flush().map_err(io_err)?;
        }
        temp_file.as_file().sync_all().map_err(io_err)?;

        temp_file
            .persist(destination)
            .map_err(|e| StoreError::Persist {
                path: destination.to_path_buf(),
                source: e.error,
            })?;
        info!(path = ?destination, outcomes = outcomes.len(), "saved fuzz results");
        Ok(())
    }

    pub fn load(source: impl AsRef<Path>) -> Result<Vec<Outcome>, StoreError> {
        let source = source.as_ref();
        let file = File::open(source).map_err(|e| StoreError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| StoreError::Deserialization {
            path: source.to_path_buf(),
            source: e,
        })
    }
}
