//! Armazenamento local persistente do orquestrador.
//!
//! O [`LocalStore`] guarda em um único arquivo JSON o último job acompanhado,
//! o conjunto de glifos ausentes por job e a marca de compra premium por job.
//! A porta [`MissingGlyphCache`] expõe apenas a parte de glifos ausentes,
//! que pertence ao reconciliador de inventário.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Erros de leitura ou escrita do armazenamento local.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Cache de glifos ausentes por job.
pub trait MissingGlyphCache {
    fn get(&self, job_id: &str) -> Result<Option<BTreeSet<char>>, StoreError>;
    fn put(&self, job_id: &str, missing: &BTreeSet<char>) -> Result<(), StoreError>;
    fn evict(&self, job_id: &str) -> Result<(), StoreError>;
}

impl<T: MissingGlyphCache + ?Sized> MissingGlyphCache for Arc<T> {
    fn get(&self, job_id: &str) -> Result<Option<BTreeSet<char>>, StoreError> {
        (**self).get(job_id)
    }

    fn put(&self, job_id: &str, missing: &BTreeSet<char>) -> Result<(), StoreError> {
        (**self).put(job_id, missing)
    }

    fn evict(&self, job_id: &str) -> Result<(), StoreError> {
        (**self).evict(job_id)
    }
}

/// Conteúdo serializado do arquivo de estado.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalState {
    #[serde(default)]
    pub last_job_id: Option<String>,
    #[serde(default)]
    pub missing_glyphs: BTreeMap<String, BTreeSet<char>>,
    #[serde(default)]
    pub entitlements: BTreeMap<String, bool>,
}

/// Armazenamento em arquivo JSON (ou apenas em memória, sem `path`).
#[derive(Debug)]
pub struct LocalStore {
    path: Option<PathBuf>,
    state: Mutex<LocalState>,
}

impl LocalStore {
    /// Abre o arquivo de estado. Arquivo ausente ou corrompido resulta em
    /// estado vazio; o arquivo é reescrito na próxima alteração.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                tracing::warn!(path = %path.display(), error = %err, "corrupt state file, starting empty");
                LocalState::default()
            }),
            Err(_) => LocalState::default(),
        };
        Self {
            path: Some(path),
            state: Mutex::new(state),
        }
    }

    /// Armazenamento volátil, usado em testes e quando não há diretório gravável.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(LocalState::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Cópia do estado atual.
    pub fn snapshot(&self) -> LocalState {
        self.lock().clone()
    }

    pub fn last_job_id(&self) -> Option<String> {
        self.lock().last_job_id.clone()
    }

    pub fn set_last_job_id(&self, job_id: Option<&str>) -> Result<(), StoreError> {
        self.update(|state| state.last_job_id = job_id.map(str::to_string))
    }

    /// Marca de compra premium para o job.
    pub fn is_entitled(&self, job_id: &str) -> bool {
        self.lock().entitlements.get(job_id).copied().unwrap_or(false)
    }

    pub fn set_entitled(&self, job_id: &str, entitled: bool) -> Result<(), StoreError> {
        self.update(|state| {
            if entitled {
                state.entitlements.insert(job_id.to_string(), true);
            } else {
                state.entitlements.remove(job_id);
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut LocalState)) -> Result<(), StoreError> {
        let mut state = self.lock();
        f(&mut state);
        self.persist(&state)
    }

    fn persist(&self, state: &LocalState) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(path, json).map_err(io_err)?;
        Ok(())
    }
}

impl MissingGlyphCache for LocalStore {
    fn get(&self, job_id: &str) -> Result<Option<BTreeSet<char>>, StoreError> {
        Ok(self.lock().missing_glyphs.get(job_id).cloned())
    }

    fn put(&self, job_id: &str, missing: &BTreeSet<char>) -> Result<(), StoreError> {
        self.update(|state| {
            state
                .missing_glyphs
                .insert(job_id.to_string(), missing.clone());
        })
    }

    fn evict(&self, job_id: &str) -> Result<(), StoreError> {
        self.update(|state| {
            state.missing_glyphs.remove(job_id);
        })
    }
}
