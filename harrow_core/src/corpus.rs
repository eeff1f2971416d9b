use crate::generator::Generator;
use crate::input::Input;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can arise while loading a corpus file.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// The corpus file does not exist or is not a regular file.
    #[error("Corpus file {0:?} not found")]
    NotFound(PathBuf),

    /// Reading the corpus file failed.
    #[error("Failed to read corpus file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file-driven input source: one candidate per line, consumed in file order.
///
/// The file is read once at construction. Lines are whitespace-trimmed and
/// blank lines are skipped, so the number of inputs equals the number of
/// non-empty lines.
#[derive(Debug, Clone, Default)]
pub struct LineCorpus {
    source: Option<PathBuf>,
    lines: VecDeque<String>,
}

impl LineCorpus {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CorpusError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CorpusError::NotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|source| CorpusError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut corpus = Self::from_text(&content);
        corpus.source = Some(path.to_path_buf());
        debug!(path = ?path, lines = corpus.len(), "loaded line corpus");
        Ok(corpus)
    }

    pub fn from_text(text: &str) -> Self {
        let lines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            source: None,
            lines,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Lines not yet consumed.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Generator for LineCorpus {
    fn name(&self) -> &'static str {
        "corpus"
    }

    fn next_input(&mut self) -> Option<Input> {
        self.lines.pop_front().map(Input::Text)
    }

    fn remaining(&self) -> Option<usize> {
        Some(self.lines.len())
    }
}
