//! Static file passthrough.
//!
//! Maps a URL path onto a file beneath a fixed root directory. Matching is
//! the router's job (a catch-all route registered by
//! [`Dispatcher::static_dir`](crate::Dispatcher::static_dir)); this module
//! only guards the path and reads the file.

use std::io;
use std::path::{Component, Path, PathBuf};

/// A filesystem root serving files below it.
pub struct StaticDir {
    base_dir: PathBuf,
}

impl StaticDir {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base_dir: base.into() }
    }

    /// Maps a URL path onto the filesystem. Rejects any component that is
    /// not a plain name, so `..` and rooted segments can never escape the
    /// base directory.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    fn content_type(path: &Path) -> &'static str {
        match path.extension().and_then(|s| s.to_str()).unwrap_or("").to_lowercase().as_str() {
            "html" => "text/html",
            "css" => "text/css",
            "js" => "application/javascript",
            "json" => "application/json",
            "txt" => "text/plain",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "ico" => "image/x-icon",
            "wasm" => "application/wasm",
            _ => "application/octet-stream",
        }
    }

    /// Reads the file `url_path` maps to, returning its bytes and content
    /// type. Traversal attempts and missing files surface as `NotFound`.
    pub async fn load(&self, url_path: &str) -> io::Result<(Vec<u8>, &'static str)> {
        let path = self
            .map_path(url_path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "invalid path"))?;
        let bytes = tokio::fs::read(&path).await?;
        Ok((bytes, Self::content_type(&path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn map_path_prevents_traversal() {
        let dir = StaticDir::new("assets");
        assert!(dir.map_path("../Cargo.toml").is_none());
        assert!(dir.map_path("a/../../etc/passwd").is_none());
        assert!(dir.map_path("/rooted/../..").is_none());
        assert_eq!(dir.map_path("css/app.css"), Some(PathBuf::from("assets/css/app.css")));
    }

    #[tokio::test]
    async fn loads_file_with_content_type() {
        let tmp = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(tmp.path().join("hello.txt")).unwrap();
        f.write_all(b"Hello").unwrap();

        let dir = StaticDir::new(tmp.path());
        let (bytes, ct) = dir.load("hello.txt").await.unwrap();
        assert_eq!(ct, "text/plain");
        assert_eq!(bytes, b"Hello");
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = StaticDir::new(tmp.path());
        let err = dir.load("nope.css").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
