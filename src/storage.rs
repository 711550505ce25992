//! File storage for product images.
//!
//! Names handed to a [`Storage`] are relative, `/`-separated paths such as
//! `product_images/thinkpad-x1-genx_3.png`. A backend may store a file under
//! a different name than requested; callers must keep the returned name.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use crate::models::DELETED_PRODUCT_IMAGE;

pub trait Storage: Send + Sync {
    /// Persists `content` and returns the name it was stored under.
    fn save(&self, name: &str, content: &[u8]) -> io::Result<String>;

    /// Removes a stored file. Removing a missing file is not an error.
    fn delete(&self, name: &str) -> io::Result<()>;

    fn exists(&self, name: &str) -> bool;

    fn url(&self, name: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    root: PathBuf,
    base_url: String,
}

impl FileSystemStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        FileSystemStorage {
            root: root.into(),
            base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> io::Result<PathBuf> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if name.is_empty() || escapes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to use storage name `{}`", name),
            ));
        }
        Ok(self.root.join(relative))
    }

    /// Candidate names for `name`: `name`, then `stem_1.ext`, `stem_2.ext`, ...
    fn variant(name: &str, n: u32) -> String {
        if n == 0 {
            return name.to_string();
        }
        let (stem, ext) = split_extension(name);
        format!("{}_{}{}", stem, n, ext)
    }
}

impl Storage for FileSystemStorage {
    /// Claims the first free variant of `name` with an exclusive create, so
    /// concurrent saves of the same name never share a file.
    fn save(&self, name: &str, content: &[u8]) -> io::Result<String> {
        if let Some(parent) = self.path(name)?.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut n = 0u32;
        loop {
            let candidate = Self::variant(name, n);
            let path = self.path(&candidate)?;
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(err) = file.write_all(content) {
                        let _ = fs::remove_file(&path);
                        return Err(err);
                    }
                    return Ok(candidate);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => n += 1,
                Err(err) => return Err(err),
            }
        }
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        match fs::remove_file(self.path(name)?) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).map(|path| path.is_file()).unwrap_or(false)
    }

    fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name.trim_start_matches('/'))
    }
}

/// Splits `dir/file.tar.png` into (`dir/file.tar`, `.png`). The extension
/// keeps its leading dot and is empty when there is none.
pub fn split_extension(name: &str) -> (&str, &str) {
    let file_start = name.rfind('/').map(|i| i + 1).unwrap_or(0);
    match name[file_start..].rfind('.') {
        Some(0) | None => (name, ""),
        Some(dot) => name.split_at(file_start + dot),
    }
}

/// Deletes a file and logs, instead of returning, any failure. Returns
/// whether the file is gone afterwards.
pub fn purge_quietly(storage: &dyn Storage, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    match storage.delete(name) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(file = name, error = %err, "could not purge stored file");
            false
        }
    }
}

const DELETED_PRODUCT_SVG: &str = r##"<svg width="100" height="100" viewBox="0 0 100 100" xmlns="http://www.w3.org/2000/svg">
  <rect x="0" y="0" width="100" height="100" rx="8" ry="8" fill="#dc3545" />
  <text x="50" y="50" font-size="12" font-weight="600" fill="white" text-anchor="middle" dominant-baseline="middle">
    &#x1F5D1;&#xFE0F; Deleted Product
  </text>
</svg>
"##;

/// Makes sure the graphic shown for deleted products is present.
pub fn ensure_deleted_product_image(storage: &dyn Storage) -> io::Result<()> {
    if storage.exists(DELETED_PRODUCT_IMAGE) {
        return Ok(());
    }
    let stored = storage.save(DELETED_PRODUCT_IMAGE, DELETED_PRODUCT_SVG.as_bytes())?;
    tracing::info!(file = %stored, "created deleted-product image");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage() -> (TempDir, FileSystemStorage) {
        let dir = TempDir::new().unwrap();
        let storage = FileSystemStorage::new(dir.path(), "/media");
        (dir, storage)
    }

    #[test]
    fn save_creates_directories_and_returns_name() {
        let (_dir, storage) = storage();
        let stored = storage.save("product_images/a_1.png", b"png").unwrap();
        assert_eq!(stored, "product_images/a_1.png");
        assert!(storage.exists(&stored));
        assert_eq!(fs::read(storage.root().join(&stored)).unwrap(), b"png");
    }

    #[test]
    fn colliding_names_are_renamed() {
        let (_dir, storage) = storage();
        storage.save("product_images/a_1.png", b"one").unwrap();
        let second = storage.save("product_images/a_1.png", b"two").unwrap();
        let third = storage.save("product_images/a_1.png", b"three").unwrap();
        assert_eq!(second, "product_images/a_1_1.png");
        assert_eq!(third, "product_images/a_1_2.png");
    }

    #[test]
    fn concurrent_saves_of_one_name_get_distinct_files() {
        let (_dir, storage) = storage();
        let threads = 8;
        let stored: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|i| {
                    let storage = &storage;
                    scope.spawn(move || {
                        storage
                            .save("product_images/cover.png", format!("cover {}", i).as_bytes())
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        let mut names = stored.clone();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), threads);
        let mut contents: Vec<Vec<u8>> = stored
            .iter()
            .map(|name| fs::read(storage.root().join(name)).unwrap())
            .collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), threads);
    }

    #[test]
    fn deleting_missing_file_is_ok() {
        let (_dir, storage) = storage();
        storage.delete("product_images/nothing.png").unwrap();
        let stored = storage.save("x.bin", b"1").unwrap();
        storage.delete(&stored).unwrap();
        assert!(!storage.exists(&stored));
    }

    #[test]
    fn names_may_not_escape_the_root() {
        let (_dir, storage) = storage();
        assert!(storage.save("../evil.png", b"x").is_err());
        assert!(storage.save("/etc/passwd", b"x").is_err());
        assert!(!storage.exists("../evil.png"));
    }

    #[test]
    fn quiet_purge_reports_failures() {
        let (_dir, storage) = storage();
        let stored = storage.save("product_images/a.png", b"a").unwrap();
        assert!(purge_quietly(&storage, &stored));
        assert!(!storage.exists(&stored));
        assert!(!purge_quietly(&storage, "../outside.png"));
        assert!(!purge_quietly(&storage, ""));
    }

    #[test]
    fn url_joins_base() {
        let (_dir, storage) = storage();
        assert_eq!(storage.url("product_images/a.png"), "/media/product_images/a.png");
    }

    #[test]
    fn extension_split() {
        assert_eq!(split_extension("dir/a.png"), ("dir/a", ".png"));
        assert_eq!(split_extension("dir.v2/readme"), ("dir.v2/readme", ""));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", ".gz"));
    }

    #[test]
    fn deleted_product_image_is_created_once() {
        let (_dir, storage) = storage();
        ensure_deleted_product_image(&storage).unwrap();
        ensure_deleted_product_image(&storage).unwrap();
        assert!(storage.exists(DELETED_PRODUCT_IMAGE));
        assert!(!storage.exists("product_images/deleted_product_1.svg"));
    }
}
