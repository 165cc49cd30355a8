//! Per-call read cache.
//!
//! A [`LookupCache`] lives for exactly one lookup call and is never shared
//! across calls. Each distinct path is read from the backend at most once.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::error::Result;
use super::session::Session;

/// Logical read of one backend path.
#[async_trait]
pub trait SecretReader: Send + Sync {
    async fn read(&self, path: &str) -> Result<HashMap<String, String>>;
}

#[async_trait]
impl SecretReader for Session {
    async fn read(&self, path: &str) -> Result<HashMap<String, String>> {
        Session::read(self, path).await
    }
}

/// Path to key/value map, filled on first access per path.
#[derive(Debug, Default)]
pub struct LookupCache {
    paths: HashMap<String, Arc<HashMap<String, String>>>,
    reads: usize,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the data at `path`, reading it through `reader` on first use.
    ///
    /// A failed read is not cached; the error is returned as is.
    pub async fn get_or_read(
        &mut self,
        reader: &dyn SecretReader,
        path: &str,
    ) -> Result<Arc<HashMap<String, String>>> {
        if let Some(data) = self.paths.get(path) {
            debug!(path = %path, "Lookup cache hit");
            return Ok(data.clone());
        }

        let data = Arc::new(reader.read(path).await?);
        self.reads += 1;
        self.paths.insert(path.to_string(), data.clone());
        Ok(data)
    }

    /// Value of `key` at `path`, `None` when the path is readable but lacks the key.
    pub async fn get(
        &mut self,
        reader: &dyn SecretReader,
        path: &str,
        key: &str,
    ) -> Result<Option<String>> {
        let data = self.get_or_read(reader, path).await?;
        Ok(data.get(key).cloned())
    }

    /// Number of backend reads issued so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
