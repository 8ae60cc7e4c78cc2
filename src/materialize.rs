//! Template materialization
//!
//! Copies a server template into a running instance directory and exposes
//! the instance property file for the provisioning step to populate. The
//! coordinator's responsibility ends at handing over the populated
//! property set.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Materialization errors
#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("template not found: {0}")]
    MissingTemplate(PathBuf),
}

pub type MaterializeResult<T> = Result<T, MaterializeError>;

/// A `key=value` property file belonging to one instance. Line order is
/// preserved across load and save.
#[derive(Debug, Clone)]
pub struct PropertyFile {
    path: PathBuf,
    entries: Vec<(String, String)>,
}

impl PropertyFile {
    pub fn load(path: impl Into<PathBuf>) -> MaterializeResult<Self> {
        let path = path.into();
        let contents = std::fs::read_to_string(&path)?;
        let entries = contents
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                line.split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            })
            .collect();
        Ok(Self { path, entries })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn save(&self) -> MaterializeResult<()> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        std::fs::write(&self.path, out)?;
        Ok(())
    }
}

/// Materializes a template into a runnable instance directory.
pub trait TemplateMaterializer: Send + Sync {
    /// Copy `template` (and the named world) into a fresh instance
    /// directory keyed by `target_id`, returning its property file.
    fn materialize(
        &self,
        template: &str,
        world: &str,
        target_id: &str,
    ) -> MaterializeResult<PropertyFile>;
}

/// Filesystem materializer over a templates directory and a running
/// directory. Layout: `templates/<name>/server/` holds the server files,
/// `templates/<name>/server.properties` the base property file, and
/// `templates/_worlds/<world>/` the world templates.
#[derive(Debug, Clone)]
pub struct DirMaterializer {
    templates_dir: PathBuf,
    running_dir: PathBuf,
}

impl DirMaterializer {
    pub fn new(templates_dir: impl Into<PathBuf>, running_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
            running_dir: running_dir.into(),
        }
    }
}

impl TemplateMaterializer for DirMaterializer {
    fn materialize(
        &self,
        template: &str,
        world: &str,
        target_id: &str,
    ) -> MaterializeResult<PropertyFile> {
        let template_dir = self.templates_dir.join(template);
        if !template_dir.exists() {
            return Err(MaterializeError::MissingTemplate(template_dir));
        }

        let instance = self.running_dir.join(target_id);
        copy_dir(&template_dir.join("server"), &instance)?;
        std::fs::copy(
            template_dir.join("server.properties"),
            instance.join("server.properties"),
        )?;
        copy_dir(
            &self.templates_dir.join("_worlds").join(world),
            &instance.join("world"),
        )?;

        PropertyFile::load(instance.join("server.properties"))
    }
}

fn copy_dir(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}
