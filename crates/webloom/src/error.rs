use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WebloomError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {context} {path}: {source}")]
    IoAt {
        context: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error in {path}: {message}")]
    TomlParse { path: PathBuf, message: String },

    #[error("metadata parse error in {path}: {message}\n--- offending block ---\n{block}")]
    MetadataParse {
        path: PathBuf,
        block: String,
        message: String,
    },

    #[error("unknown filter '{name}' used by {path}")]
    UnknownFilter { name: String, path: PathBuf },

    #[error("filter '{name}' failed on {path}: {message}")]
    Filter {
        name: String,
        path: PathBuf,
        message: String,
    },

    #[error("rendering loop detected for '{}'\n    current rendering stack\n\t{}", last_entry(.stack), format_stack(.stack))]
    RenderLoop { stack: Vec<PathBuf> },

    #[error("loop detected in layout references: {}", .chain.join(" > "))]
    LayoutLoop { chain: Vec<String> },

    #[error("rendering stack corrupted while rendering {path}")]
    StackCorrupted { path: PathBuf },

    #[error("unknown directory '{directory}'")]
    UnknownDirectory { directory: String },

    #[error("could not find partial '{name}' requested by {path}")]
    PartialNotFound { name: String, path: PathBuf },

    #[error("only page resources can be rendered '{path}'")]
    NotRenderable { path: PathBuf },

    #[error("destination {destination} of {path} collides with {existing}")]
    DestinationCollision {
        destination: PathBuf,
        path: PathBuf,
        existing: PathBuf,
    },

    #[error("{path} already exists")]
    PageExists { path: PathBuf },

    #[error("template not given for {path}")]
    TemplateNotGiven { path: PathBuf },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("invalid exclude pattern: {0}")]
    InvalidExcludePattern(#[from] regex::Error),

    #[error("Directory walk error in {path}: {message}")]
    WalkDir { path: PathBuf, message: String },

    #[error("build cancelled")]
    Cancelled,
}

fn last_entry(stack: &[PathBuf]) -> String {
    stack
        .last()
        .map(|path| path.display().to_string())
        .unwrap_or_default()
}

fn format_stack(stack: &[PathBuf]) -> String {
    stack
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join("\n\t")
}

pub type Result<T> = std::result::Result<T, WebloomError>;

#[derive(Debug)]
pub struct ResourceFailure {
    pub path: PathBuf,
    pub error: WebloomError,
}

pub trait IoContext<T> {
    fn io_context(self, context: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, context: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| WebloomError::IoAt {
            context,
            path: path.to_path_buf(),
            source,
        })
    }
}
