use std::path::PathBuf;

use rand::{distr::Alphanumeric, Rng};

/// Flat key/value store: one file per key.
pub trait StorageManager: Send + Sync {
    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()>;
    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>>;
    fn exists(&self, ident: &str) -> bool;
    /// Keys starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Vec<String>;
}

#[derive(Clone, Debug)]
pub struct BackendLocal {
    pub base_dir: PathBuf,
}

impl BackendLocal {
    pub fn new(storage_dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = storage_dir.into();
        std::fs::create_dir_all(&path)?;
        Ok(BackendLocal { base_dir: path })
    }
}

fn temp_suffix() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}

impl StorageManager for BackendLocal {
    fn exists(&self, ident: &str) -> bool {
        self.base_dir.join(ident).is_file()
    }

    fn read(&self, ident: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.base_dir.join(ident))
    }

    fn write(&self, ident: &str, data: &[u8]) -> std::io::Result<()> {
        let path = self.base_dir.join(ident);
        // dot-prefixed so a half-written file never shows up in `list`
        let temp_path = self.base_dir.join(format!(".{}-{ident}", temp_suffix()));

        std::fs::write(&temp_path, data)?;

        std::fs::rename(&temp_path, &path)
    }

    fn list(&self, prefix: &str) -> Vec<String> {
        let mut keys: Vec<String> = std::fs::read_dir(&self.base_dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .filter_map(|entry| {
                        let path = entry.path();
                        if path.is_file() {
                            path.file_name()
                                .and_then(|name| name.to_str())
                                .map(|s| s.to_string())
                        } else {
                            None
                        }
                    })
                    .filter(|name| name.starts_with(prefix) && !name.starts_with('.'))
                    .collect()
            })
            .unwrap_or_default();

        keys.sort();
        keys
    }
}
