use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use super::error::TransferError;

/// The directory the transfer server is allowed to serve from.
///
/// Workers only read through [`FileStore::resolve`], which canonicalizes the
/// requested name and refuses anything that lands outside the root. Reads
/// take no locks; any number of workers may stream the same file at once.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

/// One regular file at the top level of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
}

impl FileStore {
    /// Open the store at `root`, creating the directory if it is missing.
    pub fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref();
        if !root.exists() {
            fs::create_dir_all(root)?;
            info!("Created directory: {}", root.display());
        }

        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a client-supplied name to a regular file inside the root.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, TransferError> {
        let not_found = || TransferError::NotFound(name.to_string());

        // An absolute name replaces the root on join; the prefix check below
        // catches it along with `..` and symlinks leading out.
        let canonical = self.root.join(name).canonicalize().map_err(|_| not_found())?;
        if !canonical.starts_with(&self.root) {
            warn!("Rejected path outside store root: {:?}", name);
            return Err(not_found());
        }

        if !canonical.is_file() {
            return Err(not_found());
        }

        Ok(canonical)
    }

    /// Regular files directly under the root, sorted by name.
    pub fn list(&self) -> io::Result<Vec<StoredFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            files.push(StoredFile {
                name,
                size: metadata.len(),
            });
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Write `data` to `name`, replacing any existing file.
    ///
    /// The content lands in a temporary file first and is renamed into place,
    /// so a worker never streams a half-written upload.
    pub fn save(&self, name: &str, mut data: impl Read) -> Result<u64, TransferError> {
        let path = self.entry_path(name)?;

        let mut staged = tempfile::NamedTempFile::new_in(&self.root)?;
        let written = io::copy(&mut data, staged.as_file_mut())?;
        staged.persist(&path).map_err(|e| e.error)?;

        info!("Stored {} ({} bytes)", path.display(), written);
        Ok(written)
    }

    pub fn remove(&self, name: &str) -> Result<(), TransferError> {
        let path = self.entry_path(name)?;
        if !path.is_file() {
            return Err(TransferError::NotFound(name.to_string()));
        }

        fs::remove_file(&path)?;
        info!("Removed {}", path.display());
        Ok(())
    }

    fn entry_path(&self, name: &str) -> Result<PathBuf, TransferError> {
        if !is_plain_name(name) {
            return Err(TransferError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

/// Whether `name` is exactly one normal path component.
pub fn is_plain_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(files: &[(&str, &[u8])]) -> (TempDir, FileStore) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("store");
        let store = FileStore::open(&root).unwrap();
        for (name, content) in files {
            fs::write(root.join(name), content).unwrap();
        }
        (temp, store)
    }

    #[test]
    fn test_open_creates_missing_root() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("a").join("b");
        let store = FileStore::open(&root).unwrap();
        assert!(root.is_dir());
        assert!(store.root().is_absolute());
    }

    #[test]
    fn test_resolve_existing_file() {
        let (_temp, store) = store_with(&[("hello.txt", &b"hello world"[..])]);
        let path = store.resolve("hello.txt").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"hello world");
    }

    #[test]
    fn test_resolve_missing_file() {
        let (_temp, store) = store_with(&[]);
        let err = store.resolve("missing.bin").unwrap_err();
        assert_eq!(err.to_string(), "File 'missing.bin' not found on server");
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let (temp, store) = store_with(&[]);
        fs::write(temp.path().join("secret.txt"), b"top secret").unwrap();

        for name in ["../secret.txt", "./../secret.txt"] {
            let err = store.resolve(name).unwrap_err();
            assert!(matches!(err, TransferError::NotFound(_)), "{}", name);
        }

        let absolute = temp.path().join("secret.txt");
        let err = store.resolve(absolute.to_str().unwrap()).unwrap_err();
        assert!(matches!(err, TransferError::NotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_rejects_symlink_out_of_root() {
        let (temp, store) = store_with(&[]);
        let outside = temp.path().join("outside.txt");
        fs::write(&outside, b"nope").unwrap();
        std::os::unix::fs::symlink(&outside, store.root().join("link.txt")).unwrap();

        assert!(store.resolve("link.txt").is_err());
    }

    #[test]
    fn test_resolve_rejects_directory() {
        let (_temp, store) = store_with(&[]);
        fs::create_dir(store.root().join("nested")).unwrap();
        assert!(store.resolve("nested").is_err());
        assert!(store.resolve(".").is_err());
    }

    #[test]
    fn test_resolve_nested_file_inside_root() {
        let (_temp, store) = store_with(&[]);
        fs::create_dir(store.root().join("nested")).unwrap();
        fs::write(store.root().join("nested").join("inner.bin"), [1u8, 2, 3]).unwrap();
        assert!(store.resolve("nested/inner.bin").is_ok());
        assert!(store.resolve("nested/../nested/inner.bin").is_ok());
    }

    #[test]
    fn test_list_sorted_regular_files() {
        let (_temp, store) = store_with(&[
            ("b.txt", &b"bb"[..]),
            ("a.txt", &b"a"[..]),
            ("c.bin", &b""[..]),
        ]);
        fs::create_dir(store.root().join("dir")).unwrap();

        let files = store.list().unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a.txt", "b.txt", "c.bin"]);
        assert_eq!(files[1].size, 2);
    }

    #[test]
    fn test_save_and_remove() {
        let (_temp, store) = store_with(&[]);
        let written = store.save("up.txt", &b"uploaded"[..]).unwrap();
        assert_eq!(written, 8);
        assert_eq!(fs::read(store.root().join("up.txt")).unwrap(), b"uploaded");

        store.save("up.txt", &b"again"[..]).unwrap();
        assert_eq!(fs::read(store.root().join("up.txt")).unwrap(), b"again");
        assert_eq!(store.list().unwrap().len(), 1);

        store.remove("up.txt").unwrap();
        assert!(matches!(
            store.remove("up.txt").unwrap_err(),
            TransferError::NotFound(_)
        ));
    }

    #[test]
    fn test_edits_require_plain_names() {
        let (_temp, store) = store_with(&[]);
        for name in ["", ".", "..", "../x", "a/b", "/etc/passwd"] {
            assert!(
                matches!(
                    store.save(name, &b"x"[..]).unwrap_err(),
                    TransferError::InvalidName(_)
                ),
                "{:?}",
                name
            );
        }
        assert!(matches!(
            store.remove("../x").unwrap_err(),
            TransferError::InvalidName(_)
        ));
    }

    #[test]
    fn test_plain_name() {
        assert!(is_plain_name("report.pdf"));
        assert!(is_plain_name("with space.txt"));
        assert!(!is_plain_name("dir/report.pdf"));
        assert!(!is_plain_name(".."));
    }
}
