//! Persistent host cache.
//!
//! One JSON document per cache, holding a string-keyed map. The file is
//! rewritten whole on every write; there is no locking, so concurrent writers
//! race and the last one wins.

use crate::paths::{Paths, PathsError};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

mod finite;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_FILENAME_SEED: &str = "host_cache";

pub type CacheMap = Map<String, Value>;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache contents must be a mapping, got {0}")]
    NotAMapping(&'static str),
    #[error("cache value cannot be serialized: {0}")]
    Serialization(#[source] serde_json::Error),
    #[error("cache file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{0} exists but is not a directory")]
    DirectoryIsFile(PathBuf),
    #[error("{path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Paths(#[from] PathsError),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "a mapping",
    }
}

/// File name used when none is given. Derived from a fixed seed, so every
/// cache over the same directory lands on the same file.
pub fn default_filename() -> String {
    format!("{:x}", Sha256::digest(DEFAULT_FILENAME_SEED.as_bytes()))
}

// ---------------------------------------------------------------------------
// HostCache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    pub filename: Option<String>,
    /// Delete an existing backing file while constructing.
    pub clear: bool,
}

#[derive(Debug, Clone)]
pub struct HostCache {
    path: PathBuf,
}

impl HostCache {
    pub fn new(directory: impl AsRef<Path>, options: CacheOptions) -> Result<Self, CacheError> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory).map_err(|e| CacheError::io(directory, e))?;

        let filename = options.filename.unwrap_or_else(default_filename);
        let cache = Self {
            path: directory.join(filename),
        };
        if options.clear {
            cache.clear()?;
        }
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An absent or empty file reads as an empty map. Anything else that does
    /// not decode to a map is [`CacheError::Corrupt`].
    pub fn read(&self) -> Result<CacheMap, CacheError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheMap::new()),
            Err(e) => return Err(CacheError::io(&self.path, e)),
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(CacheMap::new());
        }
        serde_json::from_slice(&bytes).map_err(|source| CacheError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the whole cache with `mapping`. The file is untouched when
    /// `mapping` is not a map or cannot be serialized, including when it
    /// holds a NaN or infinite float.
    pub fn write<T: Serialize + ?Sized>(&self, mapping: &T) -> Result<bool, CacheError> {
        finite::check(mapping).map_err(CacheError::Serialization)?;
        let value = serde_json::to_value(mapping).map_err(CacheError::Serialization)?;
        let map = match value {
            Value::Object(map) => map,
            other => return Err(CacheError::NotAMapping(kind_name(&other))),
        };
        let bytes = serde_json::to_vec(&map).map_err(CacheError::Serialization)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;
        }
        fs::write(&self.path, bytes).map_err(|e| CacheError::io(&self.path, e))?;
        tracing::debug!(path = %self.path.display(), entries = map.len(), "wrote host cache");
        Ok(true)
    }

    /// Removes the backing file. Succeeds whether or not it existed.
    pub fn clear(&self) -> Result<bool, CacheError> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "cleared host cache");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(CacheError::io(&self.path, e)),
        }
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    pub fn fetch_or_insert_with<F>(&self, key: &str, compute: F) -> Result<Value, CacheError>
    where
        F: FnOnce() -> Value,
    {
        let mut map = self.read()?;
        if let Some(value) = map.get(key) {
            return Ok(value.clone());
        }
        let value = compute();
        map.insert(key.to_string(), value.clone());
        self.write(&map)?;
        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// Default location and instance
// ---------------------------------------------------------------------------

/// Creates `path` as a directory if needed; an existing non-directory entry
/// is an error.
pub fn ensure_directory(path: &Path) -> Result<PathBuf, CacheError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(path.to_path_buf()),
        Ok(_) => Err(CacheError::DirectoryIsFile(path.to_path_buf())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path).map_err(|e| CacheError::io(path, e))?;
            Ok(path.to_path_buf())
        }
        Err(e) => Err(CacheError::io(path, e)),
    }
}

/// `<data dir>/host-cache`, created on demand.
pub fn default_directory() -> Result<PathBuf, CacheError> {
    let paths = Paths::new()?;
    ensure_directory(&paths.host_cache_dir())
}

static DEFAULT_CACHE: OnceLock<HostCache> = OnceLock::new();

/// Process-wide cache over [`default_directory`], built on first call and
/// kept for the life of the process. Callers that need isolation construct
/// their own [`HostCache`].
pub fn default_cache() -> Result<&'static HostCache, CacheError> {
    if let Some(cache) = DEFAULT_CACHE.get() {
        return Ok(cache);
    }
    let cache = HostCache::new(default_directory()?, CacheOptions::default())?;
    Ok(DEFAULT_CACHE.get_or_init(|| cache))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    struct OpenFileHandle;

    impl Serialize for OpenFileHandle {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(serde::ser::Error::custom("cannot serialize an open file handle"))
        }
    }

    #[test]
    fn test_default_filename_is_fixed() {
        assert_eq!(
            default_filename(),
            "778160fe1321251433403cd2b60a0678c9f6e8441f33511a028c86e10bb2d059"
        );
    }

    #[test]
    fn test_new_resolves_default_path() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        assert_eq!(cache.path(), dir.path().join(default_filename()));
    }

    #[test]
    fn test_new_with_filename() {
        let dir = tempfile::tempdir().unwrap();
        let options = CacheOptions {
            filename: Some("custom".to_string()),
            clear: false,
        };
        let cache = HostCache::new(dir.path(), options).unwrap();
        assert_eq!(cache.path(), dir.path().join("custom"));
    }

    #[test]
    fn test_new_creates_directory_recursively() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        HostCache::new(&nested, CacheOptions::default()).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_two_instances_share_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        let second = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        first.write(&json!({"shared": true})).unwrap();
        assert_eq!(second.read().unwrap()["shared"], json!(true));
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        let input = json!({"number": 1, "word": "word"});
        assert!(cache.write(&input).unwrap());
        assert_eq!(Value::Object(cache.read().unwrap()), input);
    }

    #[test]
    fn test_write_typed_map() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        let mut input = HashMap::new();
        input.insert("nested".to_string(), vec![1, 2, 3]);
        cache.write(&input).unwrap();
        assert_eq!(cache.read().unwrap()["nested"], json!([1, 2, 3]));
    }

    #[test]
    fn test_write_overwrites_instead_of_merging() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        cache.write(&json!({"a": 1, "b": 2})).unwrap();
        cache.write(&json!({"c": 3})).unwrap();
        let map = cache.read().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["c"], json!(3));
    }

    #[test]
    fn test_read_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        assert!(cache.read().unwrap().is_empty());
    }

    #[test]
    fn test_read_empty_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        fs::write(cache.path(), "").unwrap();
        assert!(cache.read().unwrap().is_empty());
    }

    #[test]
    fn test_read_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        fs::write(cache.path(), b"\x04\x08{\x06:\x0bnumberi\x06").unwrap();
        assert!(matches!(cache.read(), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_read_non_map_document_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        fs::write(cache.path(), "[1, 2]").unwrap();
        assert!(matches!(cache.read(), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn test_write_rejects_non_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        assert!(matches!(
            cache.write(&vec![1, 2]),
            Err(CacheError::NotAMapping("an array"))
        ));
        assert!(matches!(
            cache.write("string"),
            Err(CacheError::NotAMapping("a string"))
        ));
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_write_unserializable_value_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        cache.write(&json!({"kept": 1})).unwrap();

        let mut input = HashMap::new();
        input.insert("handle", OpenFileHandle);
        assert!(matches!(
            cache.write(&input),
            Err(CacheError::Serialization(_))
        ));
        assert_eq!(cache.read().unwrap()["kept"], json!(1));
    }

    #[test]
    fn test_write_non_finite_float_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        cache.write(&json!({"kept": 1})).unwrap();
        let before = fs::read(cache.path()).unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut input = HashMap::new();
            input.insert("ratio", vec![1.0, bad]);
            assert!(matches!(
                cache.write(&input),
                Err(CacheError::Serialization(_))
            ));
        }
        assert_eq!(fs::read(cache.path()).unwrap(), before);
        assert_eq!(cache.read().unwrap(), *json!({"kept": 1}).as_object().unwrap());
    }

    #[test]
    fn test_write_non_string_keys_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        let mut input = HashMap::new();
        input.insert((1, 2), "pair");
        assert!(matches!(
            cache.write(&input),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        cache.write(&json!({"a": 1})).unwrap();
        assert!(cache.clear().unwrap());
        assert!(cache.clear().unwrap());
        assert!(!cache.path().exists());
    }

    #[test]
    fn test_new_with_clear_removes_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        cache.write(&json!({"a": 1})).unwrap();
        assert!(cache.path().exists());

        let options = CacheOptions {
            filename: None,
            clear: true,
        };
        let cleared = HostCache::new(dir.path(), options).unwrap();
        assert!(!cleared.path().exists());
    }

    #[test]
    fn test_fetch_or_insert_with_memoizes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        let first = cache
            .fetch_or_insert_with("ip", || json!("10.0.0.1"))
            .unwrap();
        let second = cache
            .fetch_or_insert_with("ip", || panic!("should be cached"))
            .unwrap();
        assert_eq!(first, second);

        let reopened = HostCache::new(dir.path(), CacheOptions::default()).unwrap();
        assert_eq!(reopened.read().unwrap()["ip"], json!("10.0.0.1"));
    }

    #[test]
    fn test_ensure_directory_creates() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("x/y");
        assert_eq!(ensure_directory(&target).unwrap(), target);
        assert!(target.is_dir());
    }

    #[test]
    fn test_ensure_directory_rejects_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("host-cache");
        fs::write(&target, "not a dir").unwrap();
        assert!(matches!(
            ensure_directory(&target),
            Err(CacheError::DirectoryIsFile(_))
        ));
    }
}
