use crate::Error;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use url::Url;

/// Canonical reference to a file, carried across the wire as its URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileRef(Url);

impl FileRef {
    pub fn for_uri(uri: &str) -> Result<Self, Error> {
        Url::parse(uri)
            .map(FileRef)
            .map_err(|_| Error::InvalidFile(uri.to_string()))
    }

    /// Relative paths are resolved against the current directory
    pub fn for_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| Error::InvalidFile(format!("{}: {}", path.display(), e)))?
                .join(path)
        };

        Url::from_file_path(&absolute)
            .map(FileRef)
            .map_err(|_| Error::InvalidFile(absolute.display().to_string()))
    }

    pub fn uri(&self) -> &str {
        self.0.as_str()
    }

    /// Local path, for `file://` references only
    pub fn path(&self) -> Option<PathBuf> {
        if self.0.scheme() != "file" {
            return None;
        }
        self.0.to_file_path().ok()
    }

    pub fn basename(&self) -> Option<String> {
        if let Some(path) = self.path() {
            return path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned());
        }
        self.0
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
    }
}

impl fmt::Display for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_uri_resolves_to_path() {
        let file = FileRef::for_uri("file:///a.txt").unwrap();
        assert_eq!(file.basename().as_deref(), Some("a.txt"));
        assert_eq!(file.uri(), "file:///a.txt");
        #[cfg(unix)]
        assert_eq!(file.path(), Some(PathBuf::from("/a.txt")));
    }

    #[cfg(unix)]
    #[test]
    fn path_round_trips_through_uri() {
        let file = FileRef::for_path("/tmp/some dir/notes.md").unwrap();
        assert_eq!(file.uri(), "file:///tmp/some%20dir/notes.md");

        let again = FileRef::for_uri(file.uri()).unwrap();
        assert_eq!(again.path(), Some(PathBuf::from("/tmp/some dir/notes.md")));
        assert_eq!(again.basename().as_deref(), Some("notes.md"));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let file = FileRef::for_path("relative.txt").unwrap();
        assert!(file.uri().starts_with("file:///"));
        assert!(file.uri().ends_with("/relative.txt"));
    }

    #[test]
    fn non_file_uris_have_no_path() {
        let file = FileRef::for_uri("https://example.com/docs/index.html").unwrap();
        assert_eq!(file.path(), None);
        assert_eq!(file.basename().as_deref(), Some("index.html"));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            FileRef::for_uri("not a uri"),
            Err(Error::InvalidFile(_))
        ));
    }
}
