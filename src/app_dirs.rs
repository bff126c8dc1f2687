use crate::config::Backend;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join("cubik"))
        } else {
            ProjectDirs::from("", "", "cubik").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    pub fn file_name(backend: Backend) -> &'static str {
        match backend {
            Backend::Json => "sessions.json",
            Backend::Sqlite => "sessions.db",
        }
    }

    /// Where `backend` keeps its data, under `dir` when given
    pub fn store_path(backend: Backend, dir: Option<&Path>) -> Option<PathBuf> {
        let dir = match dir {
            Some(d) => d.to_path_buf(),
            None => Self::state_dir()?,
        };
        Some(dir.join(Self::file_name(backend)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let p = AppDirs::store_path(Backend::Sqlite, Some(Path::new("/data"))).unwrap();
        assert_eq!(p, PathBuf::from("/data/sessions.db"));
        let p = AppDirs::store_path(Backend::Json, Some(Path::new("/data"))).unwrap();
        assert_eq!(p, PathBuf::from("/data/sessions.json"));
    }

    #[test]
    fn default_dir_ends_with_app_name() {
        if let Some(dir) = AppDirs::state_dir() {
            assert!(dir.ends_with("cubik"));
        }
    }
}
