use crate::error::{IoContext, Result, WebloomError};
use crate::meta_file::MetaMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "webloom.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    #[default]
    Strict,
    Inclusive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip)]
    pub root: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    #[serde(default = "default_layout_dir")]
    pub layout_dir: PathBuf,
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,
    #[serde(default = "default_exclude")]
    pub exclude: Vec<String>,
    #[serde(default = "default_page_defaults")]
    pub page_defaults: MetaMap,
    #[serde(default)]
    pub freshness: Freshness,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            output_dir: default_output_dir(),
            content_dir: default_content_dir(),
            layout_dir: default_layout_dir(),
            template_dir: default_template_dir(),
            exclude: default_exclude(),
            page_defaults: default_page_defaults(),
            freshness: Freshness::default(),
            base: None,
            parallel: default_parallel(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

fn default_layout_dir() -> PathBuf {
    PathBuf::from("layouts")
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_exclude() -> Vec<String> {
    ["tmp$", "bak$", "~$", "CVS", r"\.svn"]
        .iter()
        .map(|pattern| pattern.to_string())
        .collect()
}

fn default_page_defaults() -> MetaMap {
    let mut defaults = MetaMap::new();
    defaults.insert("extension".to_string(), Value::from("html"));
    defaults.insert("layout".to_string(), Value::from("default"));
    defaults
}

fn default_parallel() -> bool {
    true
}

impl Config {
    /// Loads `webloom.toml` from `root`, falling back to the defaults when
    /// the file is absent. Relative directories are resolved against `root`.
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE_NAME);

        let config = if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).io_context("reading config", &config_path)?;
            toml::from_str(&content).map_err(|error| WebloomError::TomlParse {
                path: config_path.clone(),
                message: error.to_string(),
            })?
        } else {
            tracing::debug!("no {} in {}, using defaults", CONFIG_FILE_NAME, root.display());
            Config::default()
        };

        Ok(config.rooted_at(root))
    }

    pub fn rooted_at(mut self, root: &Path) -> Self {
        self.root = root.to_path_buf();
        self.output_dir = root.join(&self.output_dir);
        self.content_dir = root.join(&self.content_dir);
        self.layout_dir = root.join(&self.layout_dir);
        self.template_dir = root.join(&self.template_dir);
        self
    }

    pub fn cairn(&self) -> PathBuf {
        self.output_dir.join(".cairn")
    }

    pub fn exclude_pattern(&self) -> Result<Option<Regex>> {
        if self.exclude.is_empty() {
            return Ok(None);
        }
        Ok(Some(Regex::new(&self.exclude.join("|"))?))
    }
}
