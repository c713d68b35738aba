use crate::config::{Config, Freshness};
use crate::loader::Loader;
use crate::meta_file::MetaMap;
use crate::registry::Registry;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

pub struct SiteFixture {
    dir: TempDir,
}

impl SiteFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.dir.path().to_path_buf(), |path, segment| path.join(segment))
    }

    pub fn write(&self, relative: &str, content: &str) {
        self.write_bytes(relative, content.as_bytes());
    }

    pub fn write_bytes(&self, relative: &str, content: &[u8]) {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        fs::read_to_string(self.path(relative)).unwrap()
    }

    pub fn exists(&self, relative: &str) -> bool {
        self.path(relative).exists()
    }

    pub fn set_age(&self, relative: &str, age: Duration) {
        self.set_modified(relative, SystemTime::now() - age);
    }

    pub fn pin_time(&self, relative: &str, since_epoch: Duration) {
        self.set_modified(relative, UNIX_EPOCH + since_epoch);
    }

    fn set_modified(&self, relative: &str, time: SystemTime) {
        File::options()
            .write(true)
            .open(self.path(relative))
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    pub fn config(&self) -> Config {
        Config::default().rooted_at(self.root())
    }

    pub fn registry(&self) -> Registry {
        self.registry_with(self.config())
    }

    pub fn registry_with_defaults(&self, defaults: MetaMap) -> Registry {
        let mut config = self.config();
        config.page_defaults = defaults;
        self.registry_with(config)
    }

    pub fn registry_with_freshness(&self, freshness: Freshness) -> Registry {
        let mut config = self.config();
        config.freshness = freshness;
        self.registry_with(config)
    }

    pub fn registry_with(&self, config: Config) -> Registry {
        let mut registry = Registry::new();
        let skipped = Loader::new(&config).unwrap().load_site(&mut registry).unwrap();
        assert!(skipped.is_empty(), "fixture files failed to load: {skipped:?}");
        registry
    }
}
