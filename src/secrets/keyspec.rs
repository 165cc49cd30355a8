//! Key specification resolution.
//!
//! A key specification is the raw string a pipeline uses to name one secret.
//! `subpath:key` addresses `key` under `{base}/{subpath}`; anything else is a
//! literal key read directly at the base path.

use std::fmt;

/// Backend read address and field name derived from a key specification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPathKey {
    pub path: String,
    pub key: String,
}

impl ResolvedPathKey {
    pub fn new(path: impl Into<String>, key: impl Into<String>) -> Self {
        Self { path: path.into(), key: key.into() }
    }
}

impl fmt::Display for ResolvedPathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.path, self.key)
    }
}

/// Resolves `spec` against `base_path`.
///
/// Pure and order independent. Trailing slashes on `base_path` are ignored.
/// A specification only splits when it has exactly one `:` and a non-empty
/// key after it; every other shape, including a leading `/` with no colon,
/// is kept verbatim as the key.
pub fn resolve(spec: &str, base_path: &str) -> ResolvedPathKey {
    let base = base_path.trim_end_matches('/');
    let parts: Vec<&str> = spec.split(':').collect();

    match parts.as_slice() {
        [subpath, key] if !key.is_empty() => {
            let subpath = subpath.trim_start_matches('/');
            let path = if subpath.is_empty() {
                base.to_string()
            } else {
                format!("{}/{}", base, subpath)
            };
            ResolvedPathKey::new(path, *key)
        }
        _ => ResolvedPathKey::new(base, spec),
    }
}
