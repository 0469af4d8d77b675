//! Binary asset storage (screenshots) on the local filesystem.
//!
//! Assets live at `files/<date>/<app>/<filename>` and are referenced from
//! content blocks as `<date>/<app>/<filename>`. Writes go to a temporary
//! file in the target directory, are synced, then renamed into place, so a
//! reader never observes a partially written asset.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::models::canonical_date;

const RESERVED: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Validate a caller-supplied filename, replacing characters that are
/// unsafe on common filesystems.
///
/// Rejects anything that could escape the asset directory: path
/// separators, `.`/`..`, hidden names, and control characters.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(Error::validation(format!("invalid filename '{}'", name)));
    }
    if trimmed.starts_with('.') {
        return Err(Error::validation(format!(
            "filename '{}' must not start with '.'",
            name
        )));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(Error::validation(format!(
            "filename '{}' must not contain path separators",
            name
        )));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(Error::validation(format!(
            "filename '{}' contains control characters",
            name.escape_debug()
        )));
    }
    Ok(trimmed
        .chars()
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect())
}

/// Directory-safe form of an app name.
pub fn app_dir_name(app: &str) -> Result<String> {
    let escaped: String = app
        .trim()
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c.is_control() || RESERVED.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect();
    if escaped.is_empty() || escaped == "." || escaped == ".." {
        return Err(Error::validation(format!("invalid app name '{}'", app)));
    }
    Ok(escaped)
}

/// Total bytes and file count under a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Footprint {
    pub bytes: u64,
    pub files: u64,
}

pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve(&self, date: &str, app: &str, filename: &str) -> Result<(PathBuf, String)> {
        let date = canonical_date(date)?;
        let app = app_dir_name(app)?;
        let filename = sanitize_filename(filename)?;
        let path = self.root.join(&date).join(&app).join(&filename);
        Ok((path, format!("{}/{}/{}", date, app, filename)))
    }

    /// Write `data` and return its reference.
    pub async fn save(&self, date: &str, app: &str, filename: &str, data: &[u8]) -> Result<String> {
        let (path, reference) = self.resolve(date, app, filename)?;
        let dir = path
            .parent()
            .ok_or_else(|| Error::Io(format!("no parent directory for {}", path.display())))?
            .to_path_buf();
        let tmp = dir.join(format!(
            ".{}.{}.tmp",
            path.file_name().and_then(|n| n.to_str()).unwrap_or("asset"),
            uuid::Uuid::new_v4()
        ));
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || -> Result<()> {
            use std::io::Write;

            std::fs::create_dir_all(&dir)?;
            let written = (|| -> std::io::Result<()> {
                let mut file = std::fs::File::create(&tmp)?;
                file.write_all(&data)?;
                file.sync_all()?;
                std::fs::rename(&tmp, &path)
            })();
            if let Err(e) = written {
                let _ = std::fs::remove_file(&tmp);
                return Err(e.into());
            }
            Ok(())
        })
        .await
        .map_err(|e| Error::Io(format!("asset write task failed: {}", e)))??;

        Ok(reference)
    }

    /// Read an asset's bytes.
    pub async fn read(&self, date: &str, app: &str, filename: &str) -> Result<Vec<u8>> {
        let (path, reference) = self.resolve(date, app, filename)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found(format!("asset {}", reference)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Read an asset by the reference returned from [`BlobStore::save`].
    pub async fn read_ref(&self, reference: &str) -> Result<Vec<u8>> {
        let mut parts = reference.splitn(3, '/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(date), Some(app), Some(filename)) => self.read(date, app, filename).await,
            _ => Err(Error::validation(format!(
                "asset reference '{}' is not <date>/<app>/<filename>",
                reference
            ))),
        }
    }

    /// Remove every asset stored under `date`. Missing directories are fine.
    pub async fn delete_assets_for(&self, date: &str) -> Result<()> {
        let date = canonical_date(date)?;
        match tokio::fs::remove_dir_all(self.root.join(&date)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// References of all assets stored under `date`, sorted.
    pub async fn list_assets(&self, date: &str) -> Result<Vec<String>> {
        let date = canonical_date(date)?;
        let dir = self.root.join(&date);
        let root = self.root.clone();
        blocking(move || {
            let mut refs = Vec::new();
            if !dir.is_dir() {
                return Ok(refs);
            }
            for entry in WalkDir::new(&dir).min_depth(2).max_depth(2) {
                let entry = entry.map_err(walk_err)?;
                if !entry.file_type().is_file() || is_temp(entry.path()) {
                    continue;
                }
                if let Ok(rel) = entry.path().strip_prefix(&root) {
                    refs.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
            refs.sort();
            Ok(refs)
        })
        .await
    }

    /// Dates that have an asset directory.
    pub async fn dates(&self) -> Result<Vec<String>> {
        let root = self.root.clone();
        blocking(move || {
            let mut dates = Vec::new();
            if !root.is_dir() {
                return Ok(dates);
            }
            for entry in std::fs::read_dir(&root)? {
                let entry = entry?;
                if !entry.file_type()?.is_dir() {
                    continue;
                }
                if let Some(name) = entry.file_name().to_str() {
                    if canonical_date(name).is_ok() {
                        dates.push(name.to_string());
                    }
                }
            }
            dates.sort();
            Ok(dates)
        })
        .await
    }

    pub async fn footprint(&self) -> Result<Footprint> {
        let root = self.root.clone();
        blocking(move || {
            let mut fp = Footprint::default();
            if !root.is_dir() {
                return Ok(fp);
            }
            for entry in WalkDir::new(&root) {
                let entry = entry.map_err(walk_err)?;
                if entry.file_type().is_file() {
                    fp.bytes += entry.metadata().map_err(walk_err)?.len();
                    fp.files += 1;
                }
            }
            Ok(fp)
        })
        .await
    }
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.') && n.ends_with(".tmp"))
        .unwrap_or(false)
}

fn walk_err(e: walkdir::Error) -> Error {
    Error::Io(e.to_string())
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(format!("blocking task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, BlobStore) {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::new(tmp.path().join("files"));
        (tmp, store)
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("shot 1.png").unwrap(), "shot 1.png");
        assert_eq!(sanitize_filename("a:b?.png").unwrap(), "a_b_.png");
        for bad in ["", "  ", ".", "..", "../x.png", "a/b.png", "a\\b", ".hidden", "a\0b"] {
            assert!(
                matches!(sanitize_filename(bad), Err(Error::Validation(_))),
                "{:?} accepted",
                bad
            );
        }
    }

    #[test]
    fn test_app_dir_name_escapes_separators() {
        assert_eq!(app_dir_name("Foo/Bar").unwrap(), "Foo_Bar");
        assert!(app_dir_name("..").is_err());
        assert!(app_dir_name("  ").is_err());
    }

    #[tokio::test]
    async fn test_save_read_roundtrip_and_listing() {
        let (_tmp, store) = store();
        let bytes: Vec<u8> = (0..=255).collect();
        let r = store
            .save("2025-03-04", "Browser", "s1.png", &bytes)
            .await
            .unwrap();
        assert_eq!(r, "2025-03-04/Browser/s1.png");
        assert_eq!(store.read("2025-03-04", "Browser", "s1.png").await.unwrap(), bytes);
        assert_eq!(store.read_ref(&r).await.unwrap(), bytes);

        store.save("2025-03-04", "Editor", "s2.png", b"x").await.unwrap();
        assert_eq!(
            store.list_assets("2025-03-04").await.unwrap(),
            vec!["2025-03-04/Browser/s1.png", "2025-03-04/Editor/s2.png"]
        );
        assert_eq!(store.dates().await.unwrap(), vec!["2025-03-04"]);
        let fp = store.footprint().await.unwrap();
        assert_eq!(fp.files, 2);
        assert_eq!(fp.bytes, 257);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_contents() {
        let (_tmp, store) = store();
        store.save("2025-03-04", "A", "f.bin", b"old").await.unwrap();
        store.save("2025-03-04", "A", "f.bin", b"new!").await.unwrap();
        assert_eq!(store.read("2025-03-04", "A", "f.bin").await.unwrap(), b"new!");
        assert_eq!(store.footprint().await.unwrap().files, 1);
    }

    #[tokio::test]
    async fn test_missing_and_delete() {
        let (_tmp, store) = store();
        assert!(store
            .read("2025-03-04", "A", "nope.png")
            .await
            .unwrap_err()
            .is_not_found());
        store.delete_assets_for("2025-03-04").await.unwrap();

        store.save("2025-03-04", "A", "f.png", b"1").await.unwrap();
        store.delete_assets_for("2025-03-04").await.unwrap();
        assert!(store.list_assets("2025-03-04").await.unwrap().is_empty());
        assert!(store.dates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_bad_date() {
        let (_tmp, store) = store();
        assert!(matches!(
            store.save("../../etc", "A", "f", b"").await,
            Err(Error::Validation(_))
        ));
    }
}
