use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{AtlasError, Result};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Light => write!(f, "light"),
            Self::Dark => write!(f, "dark"),
            Self::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Theme {
    type Err = AtlasError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "system" => Ok(Self::System),
            other => Err(AtlasError::Validation(format!(
                "Unknown theme '{other}' (expected light, dark or system)"
            ))),
        }
    }
}

/// Persistence capability for the theme preference.
pub trait ThemeStore: Send + Sync {
    fn load(&self) -> Result<Option<Theme>>;
    fn save(&self, theme: Theme) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryThemeStore {
    saved: Mutex<Option<Theme>>,
}

impl MemoryThemeStore {
    pub fn new(initial: Option<Theme>) -> Self {
        Self {
            saved: Mutex::new(initial),
        }
    }
}

impl ThemeStore for MemoryThemeStore {
    fn load(&self) -> Result<Option<Theme>> {
        Ok(*self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    fn save(&self, theme: Theme) -> Result<()> {
        *self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(theme);
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ThemeFile {
    theme: Theme,
}

/// Stores `{"theme": "dark"}` in a small JSON file.
#[derive(Debug, Clone)]
pub struct FileThemeStore {
    path: PathBuf,
}

impl FileThemeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ThemeStore for FileThemeStore {
    fn load(&self) -> Result<Option<Theme>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let file: ThemeFile = serde_json::from_str(&contents)?;
        Ok(Some(file.theme))
    }

    fn save(&self, theme: Theme) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(&ThemeFile { theme })?)?;
        Ok(())
    }
}

/// The theme preference plus where it is persisted, passed explicitly to
/// whatever renders.
pub struct ThemeSettings {
    preference: Theme,
    store: Box<dyn ThemeStore>,
}

impl std::fmt::Debug for ThemeSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThemeSettings")
            .field("preference", &self.preference)
            .finish()
    }
}

impl ThemeSettings {
    /// An unreadable or corrupt store falls back to `System`.
    pub fn load(store: Box<dyn ThemeStore>) -> Self {
        let preference = match store.load() {
            Ok(saved) => saved.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("Failed to load theme preference: {}. Using system.", e);
                Theme::System
            }
        };

        Self { preference, store }
    }

    pub fn preference(&self) -> Theme {
        self.preference
    }

    pub fn set(&mut self, theme: Theme) -> Result<()> {
        self.store.save(theme)?;
        self.preference = theme;
        Ok(())
    }

    /// The concrete theme to draw with; `System` follows the environment.
    pub fn resolve(&self, system_prefers_dark: bool) -> Theme {
        match self.preference {
            Theme::System if system_prefers_dark => Theme::Dark,
            Theme::System => Theme::Light,
            concrete => concrete,
        }
    }
}

/// Best-effort guess at the terminal background from `COLORFGBG`
/// (`"15;0"` means light text on a dark background).
pub fn system_prefers_dark() -> bool {
    std::env::var("COLORFGBG")
        .ok()
        .and_then(|value| value.rsplit(';').next()?.parse::<u8>().ok())
        .map(|background| background < 7 || background == 8)
        .unwrap_or(true)
}
