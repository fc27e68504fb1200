//! Theme sources

use std::path::PathBuf;

use super::{ThemeData, ThemeError, BUILTIN_THEMES};

/// URL scheme for themes compiled into the binary (`builtin:play-dark`)
pub const BUILTIN_SCHEME: &str = "builtin:";

/// Fetches raw theme data by name and location
pub trait ThemeLoader: Send + Sync {
    fn load(&self, name: &str, url: &str) -> Result<ThemeData, ThemeError>;
}

impl<F> ThemeLoader for F
where
    F: Fn(&str, &str) -> Result<ThemeData, ThemeError> + Send + Sync,
{
    fn load(&self, name: &str, url: &str) -> Result<ThemeData, ThemeError> {
        self(name, url)
    }
}

/// Reads theme JSON from disk (`file://` URLs and plain paths) or from the
/// built-in table (`builtin:<id>`)
///
/// Relative paths resolve against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FileThemeLoader {
    root: Option<PathBuf>,
}

impl FileThemeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = PathBuf::from(url.strip_prefix("file://").unwrap_or(url));
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

impl ThemeLoader for FileThemeLoader {
    fn load(&self, name: &str, url: &str) -> Result<ThemeData, ThemeError> {
        if let Some(id) = url.strip_prefix(BUILTIN_SCHEME) {
            let builtin = BUILTIN_THEMES
                .iter()
                .find(|t| t.id == id)
                .ok_or_else(|| ThemeError::Unknown(id.to_string()))?;
            return ThemeData::from_json(name, builtin.json);
        }

        let path = self.resolve(url);
        tracing::debug!("Loading theme {} from {}", name, path.display());
        let content = std::fs::read_to_string(&path).map_err(|e| ThemeError::Fetch {
            name: name.to_string(),
            message: format!("{}: {}", path.display(), e),
        })?;
        ThemeData::from_json(name, &content)
    }
}
