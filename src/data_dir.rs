use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::error::{Error, Result};

pub const DATA_DIR_ENV_VAR: &str = "LEXBERT_DATA_DIR";

/// Where the data directory setting came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataDirOrigin {
    Flag,
    Env,
    Xdg,
}

impl fmt::Display for DataDirOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataDirOrigin::Flag => "--data-dir",
            DataDirOrigin::Env => DATA_DIR_ENV_VAR,
            DataDirOrigin::Xdg => "xdg",
        })
    }
}

/// Holds `config.redb` (settings) and `chunks.redb` (the chunk store).
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
    origin: DataDirOrigin,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The LEXBERT_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/lexbert/)
    ///
    /// The directory is created when missing.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let env = std::env::var_os(DATA_DIR_ENV_VAR).filter(|v| !v.is_empty());
        let (root, origin) = match (explicit, env) {
            (Some(path), _) => (path.to_path_buf(), DataDirOrigin::Flag),
            (None, Some(val)) => (PathBuf::from(val), DataDirOrigin::Env),
            (None, None) => (xdg_data_home()?, DataDirOrigin::Xdg),
        };

        if root.exists() && !root.is_dir() {
            return Err(Error::DataDir(root));
        }
        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        debug!(root = %root.display(), %origin, "resolved data directory");
        Ok(Self { root, origin })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn origin(&self) -> DataDirOrigin {
        self.origin
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    pub fn chunks_db(&self) -> PathBuf {
        self.root.join("chunks.redb")
    }
}

fn xdg_data_home() -> Result<PathBuf> {
    xdg::BaseDirectories::with_prefix("lexbert")
        .get_data_home()
        .ok_or_else(|| {
            Error::Config("could not determine XDG data home directory".into())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
        assert_eq!(dir.origin(), DataDirOrigin::Flag);
        assert_eq!(dir.config_db(), tmp.path().join("config.redb"));
        assert_eq!(dir.chunks_db(), tmp.path().join("chunks.redb"));
    }

    #[test]
    fn missing_directory_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let dir = DataDir::resolve(Some(&nested)).unwrap();
        assert!(dir.root().is_dir());
    }

    #[test]
    fn file_in_the_way_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let err = DataDir::resolve(Some(&file)).unwrap_err();
        assert!(matches!(err, Error::DataDir(path) if path == file));
    }

    #[test]
    fn origin_names_the_source() {
        assert_eq!(DataDirOrigin::Flag.to_string(), "--data-dir");
        assert_eq!(DataDirOrigin::Env.to_string(), "LEXBERT_DATA_DIR");
    }
}
