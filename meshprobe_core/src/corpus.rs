use crate::input::Input;
use rand_core::RngCore;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus is full ({0} entries)")]
    Full(usize),

    #[error("Corpus I/O error: {0}")]
    Io(String),

    #[error("Corpus serialization error: {0}")]
    Serialization(String),

    #[error("Corpus deserialization error: {0}")]
    Deserialization(String),
}

impl From<std::io::Error> for CorpusError {
    fn from(err: std::io::Error) -> Self {
        CorpusError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CorpusError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            CorpusError::Io(err.to_string())
        } else if err.is_syntax() || err.is_data() || err.is_eof() {
            CorpusError::Deserialization(format!("JSON error: {}", err))
        } else {
            CorpusError::Serialization(format!("JSON error: {}", err))
        }
    }
}

/// Where a corpus entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOrigin {
    Builtin(&'static str),
    SeedFile(PathBuf),
    Mutation { parent: usize },
}

#[derive(Debug, Clone)]
pub struct CorpusEntry<I: Input> {
    pub input: I,
    pub origin: EntryOrigin,
    pub digest: [u8; 16],
}

pub trait Corpus<I: Input> {
    fn add(&mut self, input: I, origin: EntryOrigin) -> Result<usize, CorpusError>;

    /// Adds `input` unless an entry with the same artifact digest exists or
    /// the corpus is full. Returns the new id when it was added.
    fn add_if_novel(&mut self, input: I, origin: EntryOrigin)
    -> Result<Option<usize>, CorpusError>;

    fn get(&self, id: usize) -> Option<&CorpusEntry<I>>;

    fn random_select(&self, rng: &mut dyn RngCore) -> Option<(usize, &CorpusEntry<I>)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads every file at the given paths; directories are read one level deep.
    fn load_initial_seeds(&mut self, seed_paths: &[PathBuf]) -> Result<usize, CorpusError>;
}

#[derive(Debug)]
pub struct InMemoryCorpus<I: Input> {
    entries: Vec<CorpusEntry<I>>,
    seen: HashSet<[u8; 16]>,
    max_entries: usize,
}

impl<I: Input> InMemoryCorpus<I> {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            seen: HashSet::new(),
            max_entries,
        }
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn entries(&self) -> &[CorpusEntry<I>] {
        &self.entries
    }

    /// Adds the built-in seeds of the input type.
    pub fn add_builtin_seeds(&mut self) -> Result<usize, CorpusError> {
        let mut added = 0;
        for (name, input) in I::builtin_seeds() {
            if self.add_if_novel(input, EntryOrigin::Builtin(name))?.is_some() {
                added += 1;
            }
        }
        Ok(added)
    }

    fn load_seed_file(&mut self, path: &Path) -> Result<bool, CorpusError> {
        let data = fs::read(path)
            .map_err(|e| CorpusError::Io(format!("Failed to read seed file {:?}: {}", path, e)))?;
        match I::from_artifact_bytes(&data) {
            Ok(input) => Ok(self
                .add_if_novel(input, EntryOrigin::SeedFile(path.to_path_buf()))?
                .is_some()),
            Err(e) => {
                tracing::warn!("Skipping seed {:?}: {}", path, e);
                Ok(false)
            }
        }
    }
}

impl<I: Input> Default for InMemoryCorpus<I> {
    fn default() -> Self {
        Self::new(crate::config::default_max_entries())
    }
}

fn digest_of<I: Input>(input: &I) -> Result<[u8; 16], CorpusError> {
    Ok(md5::compute(input.artifact_bytes()?).0)
}

impl<I: Input> Corpus<I> for InMemoryCorpus<I> {
    fn add(&mut self, input: I, origin: EntryOrigin) -> Result<usize, CorpusError> {
        if self.entries.len() >= self.max_entries {
            return Err(CorpusError::Full(self.max_entries));
        }
        let digest = digest_of(&input)?;
        self.seen.insert(digest);
        let id = self.entries.len();
        self.entries.push(CorpusEntry {
            input,
            origin,
            digest,
        });
        Ok(id)
    }

    fn add_if_novel(
        &mut self,
        input: I,
        origin: EntryOrigin,
    ) -> Result<Option<usize>, CorpusError> {
        if self.entries.len() >= self.max_entries {
            return Ok(None);
        }
        if self.seen.contains(&digest_of(&input)?) {
            return Ok(None);
        }
        self.add(input, origin).map(Some)
    }

    fn get(&self, id: usize) -> Option<&CorpusEntry<I>> {
        self.entries.get(id)
    }

    fn random_select(&self, rng: &mut dyn RngCore) -> Option<(usize, &CorpusEntry<I>)> {
        if self.is_empty() {
            return None;
        }
        let index = rng.next_u64() as usize % self.entries.len();
        self.entries.get(index).map(|entry| (index, entry))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn load_initial_seeds(&mut self, seed_paths: &[PathBuf]) -> Result<usize, CorpusError> {
        let mut loaded_count = 0;
        for path in seed_paths {
            if path.is_file() {
                if self.load_seed_file(path)? {
                    loaded_count += 1;
                }
            } else if path.is_dir() {
                let mut files = Vec::new();
                for entry in fs::read_dir(path).map_err(|e| {
                    CorpusError::Io(format!("Failed to read seed directory {:?}: {}", path, e))
                })? {
                    let entry = entry.map_err(|e| {
                        CorpusError::Io(format!("Error reading entry in {:?}: {}", path, e))
                    })?;
                    if entry.path().is_file() {
                        files.push(entry.path());
                    }
                }
                // read_dir order is platform dependent; keep ids reproducible.
                files.sort();
                for file in files {
                    if self.load_seed_file(&file)? {
                        loaded_count += 1;
                    }
                }
            } else {
                tracing::warn!("Seed path {:?} does not exist", path);
            }
        }
        Ok(loaded_count)
    }
}
