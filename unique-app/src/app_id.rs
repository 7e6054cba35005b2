use crate::Error;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

const MAX_NAME_LEN: usize = 255;

/// Suffix appended to the application id to name a command-line sink
pub const COMMAND_LINE_SUFFIX: &str = "CommandLine";

/// Application identity, also the well-known name the primary registers
///
/// Follows the D-Bus well-known name rules: at least two `.`-separated
/// elements of `[A-Za-z0-9_-]`, no element starting with a digit, at most 255
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppId(String);

impl AppId {
    pub fn new(id: impl Into<String>) -> Result<Self, Error> {
        let id = id.into();
        if is_valid_name(&id) {
            Ok(Self(id))
        } else {
            Err(Error::InvalidAppId(id))
        }
    }

    /// Make a valid id from an arbitrary string (e.g. a database path)
    pub fn from_unique_key(key: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let hash = hasher.finish();

        Self(format!("io.github.UniqueApp.Instance{:x}", hash))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Object path the primary exports its dispatcher at
    pub fn object_path(&self) -> String {
        object_path_for(&self.0)
    }

    /// Per-invocation sink name: the id, the fixed suffix and a correlation
    /// token unique within the namespace.
    ///
    /// Ids too long to carry the suffix are replaced by their hash, the token
    /// keeps the name unique.
    pub fn command_line_name(&self, token: &str) -> String {
        let name = format!("{}.{}.{}", self.0, COMMAND_LINE_SUFFIX, token);
        if name.len() <= MAX_NAME_LEN {
            return name;
        }
        let hashed = Self::from_unique_key(&self.0);
        format!("{}.{}.{}", hashed.0, COMMAND_LINE_SUFFIX, token)
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Path-safe form of a registered name: `.` becomes `/`, `-` becomes `_`.
pub fn object_path_for(name: &str) -> String {
    let mut path = String::with_capacity(name.len() + 1);
    path.push('/');
    for c in name.chars() {
        path.push(match c {
            '.' => '/',
            '-' => '_',
            c => c,
        });
    }
    path
}

pub(crate) fn is_valid_name(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return false;
    }

    let mut elements = 0;
    for element in name.split('.') {
        let mut chars = element.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-' => {}
            _ => return false,
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return false;
        }
        elements += 1;
    }

    elements >= 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_reverse_dns_ids() {
        assert!(AppId::new("org.example.App").is_ok());
        assert!(AppId::new("org.example.my-app_2").is_ok());
    }

    #[test]
    fn rejects_invalid_ids() {
        for id in [
            "",
            "single",
            "org..App",
            ".org.App",
            "org.App.",
            "org.2App",
            "org.ex ample",
            "org.exämple",
        ] {
            assert!(
                matches!(AppId::new(id), Err(Error::InvalidAppId(_))),
                "{id} should be rejected"
            );
        }
        assert!(AppId::new(format!("org.{}", "a".repeat(MAX_NAME_LEN))).is_err());
    }

    #[test]
    fn object_path_replaces_separators() {
        let id = AppId::new("org.example.my-app").unwrap();
        assert_eq!(id.object_path(), "/org/example/my_app");
    }

    #[test]
    fn unique_key_is_stable_and_valid() {
        let a = AppId::from_unique_key("/home/user/.config/timings.db");
        let b = AppId::from_unique_key("/home/user/.config/timings.db");
        let c = AppId::from_unique_key("/tmp/other.db");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(is_valid_name(a.as_str()));
    }

    #[test]
    fn command_line_name_is_a_valid_name() {
        let id = AppId::new("org.example.App").unwrap();
        let name = id.command_line_name("p42x0");
        assert_eq!(name, "org.example.App.CommandLine.p42x0");
        assert!(is_valid_name(&name));
        assert_eq!(object_path_for(&name), "/org/example/App/CommandLine/p42x0");
    }

    #[test]
    fn command_line_name_of_longest_id_is_valid() {
        let id = AppId::new(format!("org.{}", "a".repeat(MAX_NAME_LEN - 4))).unwrap();
        assert_eq!(id.as_str().len(), MAX_NAME_LEN);

        let token = format!("p{}x{}", u32::MAX, u64::MAX);
        let first = id.command_line_name(&token);
        let second = id.command_line_name("p1x0");
        assert!(is_valid_name(&first), "{first} should be a valid name");
        assert!(is_valid_name(&second));
        assert_ne!(first, second);
        assert!(first.ends_with(&format!(".{}.{}", COMMAND_LINE_SUFFIX, token)));
        assert_eq!(first, id.command_line_name(&token));
    }
}
