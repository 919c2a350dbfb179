//! Rewriting absolute URLs against named base directories.
//!
//! Cached project models must survive moving the project or the user's home
//! directory, so URLs are stored with well-known prefixes replaced by macros such
//! as `$PROJECT_DIR$`. A URL is split into an optional scheme prefix (`file://`,
//! `jar://`, `jrt://`) and a path. Only the path is rewritten, and only on whole
//! segment boundaries: `/home/u` matches `/home/u/src` and `/home/u!/lib`, never
//! `/home/user`.
//!
//! Bases are absolute POSIX paths (`/home/u`) or drive paths (`C:/Users/u`).

use tracing::trace;
use wsmodel_foundation::{Error, ErrorKind, Result};

/// Macro for the project directory.
pub const PROJECT_DIR: &str = "$PROJECT_DIR$";
/// Macro for the user's home directory.
pub const USER_HOME: &str = "$USER_HOME$";
/// Macro for the application's home directory.
pub const APPLICATION_HOME_DIR: &str = "$APPLICATION_HOME_DIR$";

const SCHEMES: [&str; 3] = ["file://", "jar://", "jrt://"];

#[derive(Clone, Debug, PartialEq, Eq)]
struct BasePath {
    name: String,
    path: String,
}

/// A set of named base paths.
#[derive(Clone, Debug, Default)]
pub struct UrlRelativizer {
    bases: Vec<BasePath>,
}

impl UrlRelativizer {
    /// Creates a relativizer with no bases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a relativizer with the project, user home, and application home
    /// bases.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBasePath` if any path is unusable.
    pub fn standard(project_dir: &str, user_home: &str, app_home: &str) -> Result<Self> {
        let mut relativizer = Self::new();
        relativizer.register(PROJECT_DIR, project_dir)?;
        relativizer.register(USER_HOME, user_home)?;
        relativizer.register(APPLICATION_HOME_DIR, app_home)?;
        Ok(relativizer)
    }

    /// Registers `path` under `name`, replacing an earlier registration of the
    /// same name. A trailing `/` is ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBasePath` if `name` is not of the form `$NAME$`, or if
    /// `path` is not absolute or is a file system or drive root.
    pub fn register(&mut self, name: &str, path: &str) -> Result<()> {
        if !is_macro_name(name) {
            return Err(invalid_base(path, format!("'{name}' is not a $NAME$ macro")));
        }
        let trimmed = path.trim_end_matches('/');
        if path.is_empty() {
            return Err(invalid_base(path, "empty path"));
        }
        if !path.starts_with('/') && drive_prefix(path).is_none() {
            return Err(invalid_base(path, "not absolute"));
        }
        if trimmed.is_empty() || drive_prefix(path) == Some(trimmed) {
            return Err(invalid_base(path, "file system root"));
        }

        let base = BasePath {
            name: name.to_string(),
            path: trimmed.to_string(),
        };
        match self.bases.iter_mut().find(|b| b.name == name) {
            Some(existing) => *existing = base,
            None => self.bases.push(base),
        }
        Ok(())
    }

    /// Returns the path registered under `name`.
    #[must_use]
    pub fn base(&self, name: &str) -> Option<&str> {
        self.bases
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.path.as_str())
    }

    /// Returns true if no bases are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    /// Replaces the longest registered base prefixing `url` with its macro.
    ///
    /// URLs with no matching base, or whose longest match is registered under
    /// more than one macro, are returned unchanged.
    #[must_use]
    pub fn to_relative_url(&self, url: &str) -> String {
        let (scheme, path) = split_scheme(url);
        let mut best: Option<&BasePath> = None;
        let mut ambiguous = false;
        for base in self.bases.iter().filter(|b| is_segment_prefix(&b.path, path)) {
            match best {
                Some(current) if current.path.len() > base.path.len() => {}
                Some(current) if current.path.len() == base.path.len() => ambiguous = true,
                _ => {
                    best = Some(base);
                    ambiguous = false;
                }
            }
        }

        match best {
            Some(base) if !ambiguous => {
                let relative = format!("{scheme}{}{}", base.name, &path[base.path.len()..]);
                trace!(target: "wsmodel::cache", url, %relative, "relativized url");
                relative
            }
            _ => url.to_string(),
        }
    }

    /// Expands a leading macro in `url` to its registered base.
    ///
    /// URLs without a leading macro, or with an unknown one, are returned
    /// unchanged.
    #[must_use]
    pub fn to_absolute_url(&self, url: &str) -> String {
        let (scheme, path) = split_scheme(url);
        let expanded = self.bases.iter().find_map(|base| {
            let rest = path.strip_prefix(base.name.as_str())?;
            is_boundary(rest).then(|| format!("{scheme}{}{rest}", base.path))
        });
        expanded.unwrap_or_else(|| url.to_string())
    }
}

fn invalid_base(path: &str, reason: impl Into<String>) -> Error {
    Error::new(ErrorKind::InvalidBasePath {
        path: path.to_string(),
        reason: reason.into(),
    })
}

fn is_macro_name(name: &str) -> bool {
    name.len() > 2
        && name.starts_with('$')
        && name.ends_with('$')
        && name[1..name.len() - 1]
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Returns the `X:` prefix of a drive path such as `C:/Users`.
fn drive_prefix(path: &str) -> Option<&str> {
    let bytes = path.as_bytes();
    (bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/')
        .then(|| &path[..2])
}

fn split_scheme(url: &str) -> (&str, &str) {
    SCHEMES
        .iter()
        .find_map(|scheme| url.strip_prefix(scheme).map(|path| (*scheme, path)))
        .unwrap_or(("", url))
}

fn is_boundary(rest: &str) -> bool {
    rest.is_empty() || rest.starts_with('/') || rest.starts_with('!')
}

fn is_segment_prefix(base: &str, path: &str) -> bool {
    path.strip_prefix(base).is_some_and(is_boundary)
}
