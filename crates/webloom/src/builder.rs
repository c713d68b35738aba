use crate::config::Config;
use crate::error::{IoContext, ResourceFailure, Result, WebloomError};
use crate::filter::{Cursor, FilterRegistry};
use crate::loader::Loader;
use crate::output::{DestinationLedger, Owner, copy_static, remove_output, touch, write_atomic};
use crate::registry::Registry;
use crate::renderer::Renderer;
use crate::resource::Resource;
use crate::template::expand_scaffold;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct BuildReport {
    pub rendered: Vec<PathBuf>,
    pub copied: Vec<PathBuf>,
    pub skipped: usize,
    pub failures: Vec<ResourceFailure>,
    pub collisions: Vec<WebloomError>,
    pub cancelled: bool,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.collisions.is_empty() && !self.cancelled
    }
}

enum PageOutcome {
    Written(Vec<PathBuf>, Vec<WebloomError>),
    Failed(ResourceFailure),
    Cancelled,
}

fn journal_action(destination: &Path, forced: bool) -> &'static str {
    if !destination.exists() {
        "create"
    } else if forced {
        "force"
    } else {
        "update"
    }
}

pub struct Builder {
    config: Config,
    filters: FilterRegistry,
    registry: Mutex<Registry>,
    cancelled: Arc<AtomicBool>,
}

impl Builder {
    pub fn new(config: Config) -> Self {
        let filters = FilterRegistry::with_builtins(&config);
        Self::with_filters(config, filters)
    }

    pub fn with_filters(config: Config, filters: FilterRegistry) -> Self {
        Self {
            config,
            filters,
            registry: Mutex::new(Registry::new()),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn open(root: &Path) -> Result<Self> {
        Ok(Self::new(Config::load(root)?))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn register_filter<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&str, &mut Cursor<'_, '_>) -> Result<String> + Send + Sync + 'static,
    {
        self.filters.register(name, filter);
    }

    /// A flag that stops the running build between resources when set.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Scans the site and regenerates every dirty page and static file, or
    /// all of them when `rebuild` is set.
    ///
    /// A cycle among layouts fails the whole build. A resource that fails to
    /// load or render is logged and reported while the rest of the site is
    /// still built.
    pub fn run(&self, rebuild: bool) -> Result<BuildReport> {
        let mut registry = self.registry.lock();
        self.cancelled.store(false, Ordering::Relaxed);

        let output_dir = &self.config.output_dir;
        fs::create_dir_all(output_dir).io_context("creating output directory", output_dir)?;

        registry.clear();
        let loader = Loader::new(&self.config)?;
        let mut report = BuildReport {
            failures: loader.load_site(&mut registry)?,
            ..BuildReport::default()
        };
        registry.check_layout_cycles()?;

        let registry: &Registry = &registry;
        let ledger = DestinationLedger::new();
        let mut pages = Vec::new();
        let mut statics = Vec::new();

        for resource in registry.pages.iter() {
            let destination = resource.destination(registry);
            if let Err(collision) = ledger.claim(destination, owner(resource)) {
                tracing::error!("{}", collision);
                report.collisions.push(collision);
                continue;
            }

            let dirty = resource.is_dirty(registry);
            if !dirty && !rebuild {
                tracing::debug!("{:>6}  {}", "skip", resource.path().display());
                report.skipped += 1;
            } else if resource.is_static() {
                statics.push(resource);
            } else {
                pages.push((resource, !dirty));
            }
        }

        let render = |(page, forced): &(&Resource, bool)| self.render_page(registry, &ledger, page, *forced);
        let outcomes: Vec<PageOutcome> = if self.config.parallel {
            pages.par_iter().map(render).collect()
        } else {
            pages.iter().map(render).collect()
        };

        for outcome in outcomes {
            match outcome {
                PageOutcome::Written(written, collisions) => {
                    report.rendered.extend(written);
                    report.collisions.extend(collisions);
                }
                PageOutcome::Failed(failure) => report.failures.push(failure),
                PageOutcome::Cancelled => report.cancelled = true,
            }
        }

        for resource in statics {
            if self.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let destination = resource.destination(registry);
            tracing::info!("{:>6}  {}", "copy", destination.display());
            match copy_static(resource.path(), destination) {
                Ok(()) => report.copied.push(destination.to_path_buf()),
                Err(error) => {
                    tracing::error!("copying {} failed: {}", resource.path().display(), error);
                    report.failures.push(ResourceFailure {
                        path: resource.path().to_path_buf(),
                        error,
                    });
                }
            }
        }

        if report.cancelled {
            tracing::warn!("build cancelled; leaving {} untouched", self.config.cairn().display());
            return Ok(report);
        }

        touch(&self.config.cairn())?;
        tracing::info!(
            "built {} pages and copied {} files ({} unchanged, {} failed)",
            report.rendered.len(),
            report.copied.len(),
            report.skipped,
            report.failures.len() + report.collisions.len()
        );
        Ok(report)
    }

    fn render_page(
        &self,
        registry: &Registry,
        ledger: &DestinationLedger,
        page: &Resource,
        forced: bool,
    ) -> PageOutcome {
        if self.is_cancelled() {
            return PageOutcome::Cancelled;
        }

        let rendered = Renderer::new(registry, &self.filters, &self.config, page)
            .and_then(|mut renderer| renderer.render_all());
        let outputs = match rendered {
            Ok(outputs) => outputs,
            Err(error) => {
                tracing::error!("rendering {} failed: {}", page.path().display(), error);
                return self.failed(registry, page, error);
            }
        };

        let mut written = Vec::new();
        let mut collisions = Vec::new();
        for output in outputs {
            if let Err(collision) = ledger.claim(&output.destination, owner(page)) {
                tracing::error!("{}", collision);
                collisions.push(collision);
                continue;
            }

            tracing::info!("{:>6}  {}", journal_action(&output.destination, forced), output.destination.display());
            if let Err(error) = write_atomic(&output.destination, output.content.as_bytes()) {
                tracing::error!("writing {} failed: {}", output.destination.display(), error);
                return self.failed(registry, page, error);
            }
            written.push(output.destination);
        }

        PageOutcome::Written(written, collisions)
    }

    // A failed page loses its old output so it stays dirty until it renders
    // again, even though the cairn moves on.
    fn failed(&self, registry: &Registry, page: &Resource, error: WebloomError) -> PageOutcome {
        let destination = page.destination(registry);
        if let Err(remove_error) = remove_output(destination) {
            tracing::warn!("{}", remove_error);
        }
        PageOutcome::Failed(ResourceFailure {
            path: page.path().to_path_buf(),
            error,
        })
    }

    pub fn find_template(&self, name: &str) -> Option<PathBuf> {
        let direct = self.config.template_dir.join(name);
        if direct.is_file() {
            return Some(direct);
        }

        let mut candidates: Vec<PathBuf> = fs::read_dir(&self.config.template_dir)
            .ok()?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && path.file_stem().is_some_and(|stem| stem == name))
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    /// Creates a new page at `page` (relative to the content directory) from
    /// `template`. A page path without an extension takes the template's.
    pub fn create(&self, page: &Path, template: Option<&Path>) -> Result<PathBuf> {
        let template = template.ok_or_else(|| WebloomError::TemplateNotGiven {
            path: page.to_path_buf(),
        })?;

        let mut page_path = self.config.content_dir.join(page);
        if page_path.extension().is_none()
            && let Some(extension) = template.extension()
        {
            page_path.set_extension(extension);
        }
        if page_path.exists() {
            return Err(WebloomError::PageExists { path: page_path });
        }

        let name = page_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = page_path
            .parent()
            .and_then(|parent| parent.strip_prefix(&self.config.content_dir).ok())
            .map(|parent| parent.to_string_lossy().replace('\\', "/"))
            .unwrap_or_default();

        let source = fs::read_to_string(template).io_context("reading template", template)?;
        let expanded = expand_scaffold(
            &source,
            &json!({
                "title": title_from_name(&name),
                "name": name,
                "directory": directory,
                "created_at": chrono::Utc::now().to_rfc3339(),
            }),
        )?;

        write_atomic(&page_path, expanded.as_bytes())?;
        tracing::info!("{:>6}  {}", "create", page_path.display());
        Ok(page_path)
    }
}

fn owner(resource: &Resource) -> Owner {
    (resource.path().to_path_buf(), resource.block())
}

fn title_from_name(name: &str) -> String {
    name.split(['-', '_', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut characters = word.chars();
            match characters.next() {
                Some(first) => first.to_uppercase().chain(characters).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SiteFixture;
    use std::time::Duration;

    const LAYOUT: &str = "---\nfilter: tera\nextension: html\n---\n<body>{{ content }}</body>";

    fn builder(site: &SiteFixture) -> Builder {
        Builder::new(site.config())
    }

    fn basic_site() -> SiteFixture {
        let site = SiteFixture::new();
        site.write("layouts/default.txt", LAYOUT);
        site.write("content/index.txt", "---\ntitle: Home\nfilter: markdown\n---\n# Welcome");
        site.write("content/about/index.txt", "---\ntitle: About\n---\nabout us");
        site.write("content/css/site.css", "body { margin: 0 }");
        site
    }

    #[test]
    fn test_full_build() {
        let site = basic_site();
        let report = builder(&site).run(false).unwrap();

        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.rendered.len(), 2);
        assert_eq!(report.copied, vec![site.path("output/css/site.css")]);
        assert!(site.read("output/index.html").contains("<body><h1>Welcome</h1>"));
        assert_eq!(site.read("output/about/index.html"), "<body>about us</body>");
        assert_eq!(site.read("output/css/site.css"), "body { margin: 0 }");
        assert!(site.exists("output/.cairn"));
    }

    #[test]
    fn test_second_build_skips_clean_resources() {
        let site = basic_site();
        let builder = builder(&site);
        builder.run(false).unwrap();

        for path in [
            "layouts/default.txt",
            "content/index.txt",
            "content/about/index.txt",
            "content/css/site.css",
        ] {
            site.set_age(path, Duration::from_secs(600));
        }

        let report = builder.run(false).unwrap();
        assert!(report.rendered.is_empty());
        assert!(report.copied.is_empty());
        assert_eq!(report.skipped, 3);
    }

    #[test]
    fn test_changed_layout_rerenders_its_pages() {
        let site = basic_site();
        let builder = builder(&site);
        builder.run(false).unwrap();

        for path in ["content/index.txt", "content/about/index.txt", "content/css/site.css"] {
            site.set_age(path, Duration::from_secs(600));
        }
        site.set_age("output/.cairn", Duration::from_secs(300));
        site.write("layouts/default.txt", "---\nfilter: tera\nextension: html\n---\n<main>{{ content }}</main>");

        let report = builder.run(false).unwrap();
        assert_eq!(report.rendered.len(), 2);
        assert!(report.copied.is_empty());
        assert_eq!(site.read("output/about/index.html"), "<main>about us</main>");
    }

    #[test]
    fn test_rebuild_forces_everything() {
        let site = basic_site();
        let builder = builder(&site);
        builder.run(false).unwrap();
        for path in ["layouts/default.txt", "content/index.txt", "content/about/index.txt", "content/css/site.css"] {
            site.set_age(path, Duration::from_secs(600));
        }

        let report = builder.run(true).unwrap();
        assert_eq!(report.rendered.len(), 2);
        assert_eq!(report.copied.len(), 1);
        assert_eq!(report.skipped, 0);
    }

    #[test]
    fn test_failed_page_picks_up_layout_change_later() {
        let site = SiteFixture::new();
        site.write("layouts/default.txt", "---\nfilter: [partials, tera]\n---\nOLD[{{ content }}{{> nav }}]");
        site.write("content/_nav.txt", "nav");
        site.write("content/page.txt", "---\ntitle: Page\n---\nbody");
        let builder = builder(&site);

        builder.run(false).unwrap();
        assert_eq!(site.read("output/page.html"), "OLD[bodynav]");

        for path in ["layouts/default.txt", "content/_nav.txt", "content/page.txt"] {
            site.set_age(path, Duration::from_secs(600));
        }
        site.set_age("output/.cairn", Duration::from_secs(300));
        site.write("layouts/default.txt", "---\nfilter: [partials, tera]\n---\nNEW[{{ content }}{{> nav }}]");
        fs::remove_file(site.path("content/_nav.txt")).unwrap();

        let report = builder.run(false).unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0].error, WebloomError::PartialNotFound { .. }));
        assert!(!site.exists("output/page.html"));

        site.write("content/_nav.txt", "nav");
        let report = builder.run(false).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(report.rendered, vec![site.path("output/page.html")]);
        assert_eq!(site.read("output/page.html"), "NEW[bodynav]");
    }

    #[test]
    fn test_layout_cycle_fails_build() {
        let site = SiteFixture::new();
        site.write("layouts/a.txt", "---\nlayout: b\n---\n{{ content }}");
        site.write("layouts/b.txt", "---\nlayout: a\n---\n{{ content }}");
        site.write("content/index.txt", "---\nlayout: ~\n---\nhome");

        let error = builder(&site).run(false).unwrap_err();
        assert!(matches!(error, WebloomError::LayoutLoop { .. }));
        assert!(!site.exists("output/index.html"));
        assert!(!site.exists("output/.cairn"));
    }

    #[test]
    fn test_bad_page_does_not_stop_the_build() {
        let site = basic_site();
        site.write("content/broken.txt", "---\nfilter: textile\n---\nbody");
        site.write("content/malformed.txt", "---\ntitle: [oops\n---\nbody");

        let report = builder(&site).run(false).unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 2);
        assert!(report.failures.iter().any(|failure| matches!(failure.error, WebloomError::UnknownFilter { .. })));
        assert!(report.failures.iter().any(|failure| matches!(failure.error, WebloomError::MetadataParse { .. })));
        assert!(site.exists("output/index.html"));
        assert!(site.exists("output/.cairn"));
    }

    #[test]
    fn test_destination_collision_is_reported() {
        let site = SiteFixture::new();
        site.write("content/page.txt", "---\nlayout: ~\n---\nfrom txt");
        site.write("content/page.md", "---\nlayout: ~\n---\nfrom md");

        let report = builder(&site).run(false).unwrap();
        assert_eq!(report.collisions.len(), 1);
        assert_eq!(report.rendered.len(), 1);
        assert_eq!(site.read("output/page.html"), "from md");
    }

    #[test]
    fn test_stacked_pages_write_separate_outputs() {
        let site = SiteFixture::new();
        site.write(
            "content/people.txt",
            "---\nlayout: ~\nfilter: tera\ndestination: people/one\n---\n---\ndestination: people/two\ntitle: Two\n---\n{{ page.title | default(value=\"One\") }}",
        );

        let report = builder(&site).run(false).unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(site.read("output/people/one.html"), "One");
        assert_eq!(site.read("output/people/two.html"), "Two");
    }

    #[test]
    fn test_sequential_build_matches_parallel() {
        let site = basic_site();
        let mut config = site.config();
        config.parallel = false;

        let report = Builder::new(config).run(false).unwrap();
        assert_eq!(report.rendered.len(), 2);
        assert!(site.exists("output/about/index.html"));
    }

    #[test]
    fn test_custom_filter_registration() {
        let site = SiteFixture::new();
        site.write("content/shout.txt", "---\nlayout: ~\nfilter: shout\n---\nhey");

        let mut builder = builder(&site);
        builder.register_filter("shout", |text: &str, _: &mut Cursor<'_, '_>| Ok(text.to_uppercase()));
        builder.run(false).unwrap();
        assert_eq!(site.read("output/shout.html"), "HEY");
    }

    #[test]
    fn test_cancelled_build_leaves_cairn_alone() {
        let site = basic_site();
        let mut config = site.config();
        config.parallel = false;
        let mut builder = Builder::new(config);
        let handle = builder.cancel_handle();
        builder.register_filter("markdown", move |text: &str, _: &mut Cursor<'_, '_>| {
            handle.store(true, Ordering::Relaxed);
            Ok(text.to_string())
        });

        let report = builder.run(false).unwrap();
        assert!(report.cancelled);
        assert!(!report.is_success());
        assert_eq!(report.rendered, vec![site.path("output/index.html")]);
        assert!(report.copied.is_empty());
        assert!(!site.exists("output/.cairn"));
    }

    #[test]
    fn test_create_from_template() {
        let site = SiteFixture::new();
        site.write(
            "templates/post.txt",
            "---\ntitle: {{ title }}\ncreated_at: {{ created_at }}\n---\nIn {{ directory }}: {{ name }}",
        );
        let builder = builder(&site);

        let template = builder.find_template("post").unwrap();
        let created = builder.create(Path::new("blog/my-first_post"), Some(&template)).unwrap();

        assert_eq!(created, site.path("content/blog/my-first_post.txt"));
        let text = site.read("content/blog/my-first_post.txt");
        assert!(text.starts_with("---\ntitle: My First Post\n"));
        assert!(text.ends_with("In blog: my-first_post"));

        assert!(matches!(
            builder.create(Path::new("blog/my-first_post.txt"), Some(&template)),
            Err(WebloomError::PageExists { .. })
        ));
        assert!(matches!(
            builder.create(Path::new("blog/other"), None),
            Err(WebloomError::TemplateNotGiven { .. })
        ));
    }
}
