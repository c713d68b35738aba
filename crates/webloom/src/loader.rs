use crate::config::Config;
use crate::error::{IoContext, ResourceFailure, Result, WebloomError};
use crate::meta_file::{MetaFile, MetaMap};
use crate::metadata::Metadata;
use crate::registry::Registry;
use crate::resource::{OutputSettings, Resource, ResourceKind};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

pub struct Loader {
    root: PathBuf,
    content_dir: PathBuf,
    layout_dir: PathBuf,
    page_defaults: MetaMap,
    exclude: Option<Regex>,
    output: Arc<OutputSettings>,
}

impl Loader {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            root: config.root.clone(),
            content_dir: config.content_dir.clone(),
            layout_dir: config.layout_dir.clone(),
            page_defaults: config.page_defaults.clone(),
            exclude: config.exclude_pattern()?,
            output: Arc::new(OutputSettings::from_config(config)),
        })
    }

    /// Fills `registry` from disk, layouts first. Files that fail to load are
    /// logged and returned instead of aborting the scan.
    pub fn load_site(&self, registry: &mut Registry) -> Result<Vec<ResourceFailure>> {
        let mut skipped = Vec::new();

        for directory in [&self.layout_dir, &self.content_dir] {
            for path in self.files(directory)? {
                match self.load_file(&path) {
                    Ok(resources) => resources.into_iter().for_each(|resource| registry.add(resource)),
                    Err(error) => {
                        tracing::error!("skipping {}: {}", path.display(), error);
                        skipped.push(ResourceFailure { path, error });
                    }
                }
            }
        }

        tracing::debug!(
            "loaded {} pages, {} layouts, {} partials",
            registry.pages.len(),
            registry.layouts.len(),
            registry.partials.len()
        );
        Ok(skipped)
    }

    pub fn files(&self, directory: &Path) -> Result<Vec<PathBuf>> {
        if !directory.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(directory)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_excluded(entry.path()))
        {
            let entry = entry.map_err(|error| WebloomError::WalkDir {
                path: directory.to_path_buf(),
                message: error.to_string(),
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        Ok(files)
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        let Some(pattern) = &self.exclude else {
            return false;
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let excluded = pattern.is_match(&slash_path(relative));
        if excluded {
            tracing::debug!("excluding {}", path.display());
        }
        excluded
    }

    pub fn load_file(&self, path: &Path) -> Result<Vec<Resource>> {
        if path.starts_with(&self.layout_dir) {
            let directory = self.directory_of(path, &self.layout_dir);
            let metadata = self.first_block(path)?;
            let layout = Resource::new(ResourceKind::Layout, path, directory, metadata, self.output.clone())?;
            return Ok(vec![layout]);
        }

        let directory = self.directory_of(path, &self.content_dir);
        let is_partial = path
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('_'));
        if is_partial {
            let metadata = self.first_block(path)?;
            let partial = Resource::new(ResourceKind::Partial, path, directory, metadata, self.output.clone())?;
            return Ok(vec![partial]);
        }

        let bytes = fs::read(path).io_context("reading", path)?;
        let text = match std::str::from_utf8(&bytes) {
            Ok(text) if bytes.starts_with(b"---") => text,
            _ => return self.static_file(path, directory).map(|resource| vec![resource]),
        };

        let file = MetaFile::new(path, text);
        if !file.has_meta_data() {
            return self.static_file(path, directory).map(|resource| vec![resource]);
        }

        file.each_meta_block()?
            .into_iter()
            .enumerate()
            .map(|(block, map)| {
                let mut merged = self.page_defaults.clone();
                merged.extend(map);
                let metadata = Metadata::from_map(path, merged)?;
                Ok(Resource::new(ResourceKind::Page, path, directory.clone(), metadata, self.output.clone())?
                    .with_block(block))
            })
            .collect()
    }

    fn static_file(&self, path: &Path, directory: String) -> Result<Resource> {
        Resource::new(ResourceKind::Static, path, directory, Metadata::default(), self.output.clone())
    }

    fn first_block(&self, path: &Path) -> Result<Metadata> {
        let text = fs::read_to_string(path).io_context("reading", path)?;
        let map = MetaFile::new(path, &text).meta_data()?.unwrap_or_default();
        Metadata::from_map(path, map)
    }

    fn directory_of(&self, path: &Path, base: &Path) -> String {
        path.parent()
            .and_then(|parent| parent.strip_prefix(base).ok())
            .map(slash_path)
            .unwrap_or_default()
    }
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
