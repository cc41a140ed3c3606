use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

/// Durable-store layout for one story under a workspace root.
#[derive(Debug, Clone)]
pub struct StoryPaths {
    pub raw_dir: PathBuf,
    pub manifest: PathBuf,
    pub segmented: PathBuf,
    pub archive: PathBuf,
    pub site_dir: PathBuf,
    pub images_dir: PathBuf,
}

impl StoryPaths {
    pub fn new(root: &Path, story: &str) -> Self {
        let raw_dir = root.join("raw").join(story);
        let manifest = raw_dir.join("manifest.json");
        let segmented = root.join("segmented").join(format!("{story}.json"));
        let archive = root.join("archive").join(format!("{story}.json"));
        let site_dir = root.join("site").join(story);
        let images_dir = site_dir.join("images");

        Self {
            raw_dir,
            manifest,
            segmented,
            archive,
            site_dir,
            images_dir,
        }
    }

    pub fn raw_blob(&self, raw_key: &str) -> PathBuf {
        self.raw_dir.join(format!("{raw_key}.json"))
    }

    pub fn chapter(&self, bookmark_id: &str) -> PathBuf {
        self.raw_blob(&format!("chapter_{bookmark_id}"))
    }

    pub fn image(&self, filename: &str) -> PathBuf {
        self.images_dir.join(filename)
    }
}

pub fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|err| Error::storage(dir, err))
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path).map_err(|err| Error::storage(path, err))?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    write_text(path, &contents)
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        ensure_dir(parent)?;
    }
    std::fs::write(path, contents).map_err(|err| Error::storage(path, err))
}

pub fn delete_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(Error::storage(path, err)),
    }
}
