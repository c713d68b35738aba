use crate::config::{Config, Freshness};
use crate::error::{IoContext, Result};
use crate::metadata::Metadata;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

pub const INDEX_NAME: &str = "index";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Page,
    Layout,
    Partial,
    Static,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Page => "page",
            ResourceKind::Layout => "layout",
            ResourceKind::Partial => "partial",
            ResourceKind::Static => "static",
        };
        formatter.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSettings {
    pub output_dir: PathBuf,
    pub cairn: PathBuf,
    pub freshness: Freshness,
}

impl OutputSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            cairn: config.cairn(),
            freshness: config.freshness,
        }
    }
}

pub trait LayoutLookup {
    fn find_layout(&self, name: &str) -> Option<&Resource>;
}

#[derive(Debug, Clone)]
pub struct Resource {
    kind: ResourceKind,
    path: PathBuf,
    directory: String,
    base_name: String,
    file_extension: String,
    modified: SystemTime,
    metadata: Metadata,
    block: usize,
    number: Option<usize>,
    output: Arc<OutputSettings>,
    destination: OnceLock<PathBuf>,
}

impl Resource {
    pub fn new(
        kind: ResourceKind,
        path: impl Into<PathBuf>,
        directory: impl Into<String>,
        metadata: Metadata,
        output: Arc<OutputSettings>,
    ) -> Result<Self> {
        let path = path.into();
        let modified = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .io_context("reading modification time of", &path)?;

        let base_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_extension = path
            .extension()
            .map(|extension| extension.to_string_lossy().to_string())
            .unwrap_or_default();

        Ok(Self {
            kind,
            path,
            directory: directory.into(),
            base_name,
            file_extension,
            modified,
            metadata,
            block: 0,
            number: None,
            output,
            destination: OnceLock::new(),
        })
    }

    pub fn with_block(mut self, block: usize) -> Self {
        self.block = block;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &str {
        &self.directory
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn file_extension(&self) -> &str {
        &self.file_extension
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn block(&self) -> usize {
        self.block
    }

    pub fn number(&self) -> Option<usize> {
        self.number
    }

    pub fn is_static(&self) -> bool {
        self.kind == ResourceKind::Static
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.title.as_deref()
    }

    pub fn layout_name(&self) -> Option<&str> {
        self.metadata.layout.as_deref()
    }

    pub fn set_number(&mut self, number: Option<usize>) {
        self.number = number;
        self.destination = OnceLock::new();
    }

    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
        self.destination = OnceLock::new();
    }

    pub fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "path" => Some(Value::from(self.path.to_string_lossy().to_string())),
            "directory" | "dir" => Some(Value::from(self.directory.clone())),
            "base_name" | "filename" => Some(Value::from(self.base_name.clone())),
            "file_extension" | "ext" => Some(Value::from(self.file_extension.clone())),
            "kind" => Some(Value::from(self.kind.to_string())),
            "number" => self.number.map(Value::from),
            _ => self.metadata.attribute(name),
        }
    }

    /// The extension given to the output file.
    ///
    /// Pages and layouts take their own `extension` key first, then the
    /// resolved extension of their layout chain. A page without a `layout`
    /// key falls back to its own file extension; a layout chain that never
    /// names an extension resolves to `None`.
    pub fn extension(&self, layouts: &dyn LayoutLookup) -> Option<String> {
        match self.kind {
            ResourceKind::Partial | ResourceKind::Static => non_empty(&self.file_extension),
            ResourceKind::Page | ResourceKind::Layout => {
                if let Some(extension) = &self.metadata.extension {
                    return Some(extension.clone());
                }
                match self.layout_name() {
                    Some(name) => layout_chain_extension(name, layouts, &self.path),
                    None if self.kind == ResourceKind::Page => non_empty(&self.file_extension),
                    None => None,
                }
            }
        }
    }

    pub fn destination(&self, layouts: &dyn LayoutLookup) -> &Path {
        self.destination
            .get_or_init(|| self.compute_destination(layouts))
    }

    fn compute_destination(&self, layouts: &dyn LayoutLookup) -> PathBuf {
        match self.kind {
            ResourceKind::Layout | ResourceKind::Partial => self.output.cairn.clone(),
            ResourceKind::Static => {
                let mut name = self.base_name.clone();
                if !self.file_extension.is_empty() {
                    name.push('.');
                    name.push_str(&self.file_extension);
                }
                join_relative(&self.output.output_dir, &self.directory).join(name)
            }
            ResourceKind::Page => {
                let mut relative = match &self.metadata.destination {
                    Some(destination) => destination.trim_start_matches('/').to_string(),
                    None if self.directory.is_empty() => self.base_name.clone(),
                    None => format!("{}/{}", self.directory, self.base_name),
                };
                if let Some(number) = self.number {
                    relative.push_str(&number.to_string());
                }
                if let Some(extension) = self.extension(layouts) {
                    relative.push('.');
                    relative.push_str(&extension);
                }
                join_relative(&self.output.output_dir, &relative)
            }
        }
    }

    pub fn url(&self, layouts: &dyn LayoutLookup) -> Option<String> {
        if matches!(self.kind, ResourceKind::Layout | ResourceKind::Partial) {
            return None;
        }

        let destination = self.destination(layouts);
        let relative = destination
            .strip_prefix(&self.output.output_dir)
            .unwrap_or(destination);
        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().to_string())
            .collect();
        let url = format!("/{}", parts.join("/"));

        if self.kind == ResourceKind::Page && self.base_name == INDEX_NAME && self.number.is_none()
        {
            return Some(match url.rfind('/') {
                Some(0) | None => "/".to_string(),
                Some(position) => url[..position].to_string(),
            });
        }

        Some(url)
    }

    /// Whether the output of this resource must be regenerated.
    ///
    /// An explicit `dirty` key wins. Otherwise a missing destination, or a
    /// source newer than its destination, makes the resource dirty. Anything
    /// that is not a static file is also dirty when its layout is.
    pub fn is_dirty(&self, layouts: &dyn LayoutLookup) -> bool {
        let mut visited = Vec::new();
        self.dirty_through(layouts, &mut visited)
    }

    fn dirty_through<'a>(&'a self, layouts: &'a dyn LayoutLookup, visited: &mut Vec<&'a Path>) -> bool {
        if let Some(dirty) = self.metadata.dirty {
            return dirty;
        }

        let destination = self.destination(layouts);
        let destination_time = match fs::metadata(destination).and_then(|meta| meta.modified()) {
            Ok(time) => time,
            Err(_) => return true,
        };

        let stale = match self.output.freshness {
            Freshness::Strict => self.modified > destination_time,
            Freshness::Inclusive => self.modified >= destination_time,
        };
        if stale || self.is_static() {
            return stale;
        }

        visited.push(&self.path);
        match self.layout_name().and_then(|name| layouts.find_layout(name)) {
            Some(layout) if !visited.contains(&layout.path()) => {
                layout.dirty_through(layouts, visited)
            }
            _ => false,
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.block == other.block && self.number == other.number
    }
}

impl Eq for Resource {}

fn non_empty(extension: &str) -> Option<String> {
    if extension.is_empty() {
        None
    } else {
        Some(extension.to_string())
    }
}

fn layout_chain_extension(
    name: &str,
    layouts: &dyn LayoutLookup,
    origin: &Path,
) -> Option<String> {
    let mut seen: Vec<&Path> = vec![origin];
    let mut next = Some(name.to_string());

    while let Some(name) = next {
        let layout = layouts.find_layout(&name)?;
        if seen.contains(&layout.path()) {
            return None;
        }
        seen.push(layout.path());

        if let Some(extension) = &layout.metadata().extension {
            return Some(extension.clone());
        }
        next = layout.layout_name().map(str::to_string);
    }

    None
}

fn join_relative(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|segment| !segment.is_empty())
        .fold(root.to_path_buf(), |path, segment| path.join(segment))
}
