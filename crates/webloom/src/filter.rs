use crate::config::Config;
use crate::error::{Result, WebloomError};
use crate::meta_file::MetaMap;
use crate::registry::Registry;
use crate::renderer::Renderer;
use crate::resource::Resource;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

pub type FilterFn = Arc<dyn Fn(&str, &mut Cursor<'_, '_>) -> Result<String> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        formatter.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in filters: `tera`, `markdown`,
    /// `highlight`, `sass`, `minify`, `basepath` and `partials`.
    pub fn with_builtins(config: &Config) -> Self {
        let mut registry = Self::new();
        crate::markup::register(&mut registry, config);
        crate::template::register(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, filter: F)
    where
        F: Fn(&str, &mut Cursor<'_, '_>) -> Result<String> + Send + Sync + 'static,
    {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    pub fn get(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.keys().map(String::as_str).collect()
    }
}

pub struct Cursor<'c, 'r> {
    renderer: &'c mut Renderer<'r>,
    resource: &'c Resource,
    filters: &'c [String],
    position: usize,
}

impl<'c, 'r> Cursor<'c, 'r> {
    pub fn current_filter(&self) -> &str {
        &self.filters[self.position]
    }

    pub fn remaining_filters(&self) -> &[String] {
        &self.filters[self.position + 1..]
    }

    pub fn runs_later(&self, name: &str) -> bool {
        self.remaining_filters().iter().any(|filter| filter == name)
    }

    pub fn resource(&self) -> &Resource {
        self.resource
    }

    pub fn page(&self) -> &Resource {
        self.renderer.page()
    }

    pub fn content(&self) -> Option<&str> {
        self.renderer.content()
    }

    pub fn locals(&self) -> Option<&MetaMap> {
        self.renderer.locals()
    }

    pub fn registry(&self) -> &'r Registry {
        self.renderer.registry()
    }

    pub fn config(&self) -> &'r Config {
        self.renderer.config()
    }

    pub fn renderer(&mut self) -> &mut Renderer<'r> {
        self.renderer
    }

    pub fn render_partial(&mut self, name: &str, locals: MetaMap) -> Result<String> {
        self.renderer.render_partial(name, locals)
    }

    pub fn error(&self, message: impl fmt::Display) -> WebloomError {
        WebloomError::Filter {
            name: self.current_filter().to_string(),
            path: self.resource.path().to_path_buf(),
            message: message.to_string(),
        }
    }
}

/// Runs `input` through every filter named by `resource`, in order. Each
/// call gets its own cursor, so a filter may render partials (and through
/// them, nested filter chains) without disturbing the chain it is part of.
pub fn process(renderer: &mut Renderer<'_>, resource: &Resource, input: &str) -> Result<String> {
    let filters = &resource.metadata().filter;
    let table = renderer.filters();
    let mut text = input.to_string();

    for (position, name) in filters.iter().enumerate() {
        let filter = table.get(name).ok_or_else(|| WebloomError::UnknownFilter {
            name: name.clone(),
            path: resource.path().to_path_buf(),
        })?;

        tracing::trace!("{} < {}", name, resource.path().display());
        let mut cursor = Cursor {
            renderer: &mut *renderer,
            resource,
            filters,
            position,
        };
        text = filter(&text, &mut cursor)?;
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SiteFixture;
    use parking_lot::Mutex;

    fn render(site: &SiteFixture, filters: &FilterRegistry) -> Result<String> {
        let config = site.config();
        let registry = site.registry();
        let page = registry.pages.iter().next().unwrap();
        let mut renderer = Renderer::new(&registry, filters, &config, page)?;
        renderer.layout_page()
    }

    #[test]
    fn test_filters_run_in_order() {
        let site = SiteFixture::new();
        site.write("content/page.txt", "---\nlayout: ~\nfilter: [upper, wrap]\n---\nhi");

        let mut filters = FilterRegistry::new();
        filters.register("upper", |text: &str, _: &mut Cursor<'_, '_>| Ok(text.to_uppercase()));
        filters.register("wrap", |text: &str, _: &mut Cursor<'_, '_>| Ok(format!("[{text}]")));

        assert_eq!(render(&site, &filters).unwrap(), "[HI]");
    }

    #[test]
    fn test_no_filters_leaves_body_untouched() {
        let site = SiteFixture::new();
        site.write("content/page.txt", "---\nlayout: ~\n---\n*raw*");
        assert_eq!(render(&site, &FilterRegistry::new()).unwrap(), "*raw*");
    }

    #[test]
    fn test_unknown_filter() {
        let site = SiteFixture::new();
        site.write("content/page.txt", "---\nlayout: ~\nfilter: textile\n---\nbody");

        match render(&site, &FilterRegistry::new()) {
            Err(WebloomError::UnknownFilter { name, path }) => {
                assert_eq!(name, "textile");
                assert_eq!(path, site.path("content/page.txt"));
            }
            other => panic!("expected an unknown filter error, got {other:?}"),
        }
    }

    #[test]
    fn test_cursor_reports_position() {
        let site = SiteFixture::new();
        site.write("content/page.txt", "---\nlayout: ~\nfilter: [spy, noop, last]\n---\nbody");

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut filters = FilterRegistry::new();
        let spy = seen.clone();
        filters.register("spy", move |text: &str, cursor: &mut Cursor<'_, '_>| {
            spy.lock().push((
                cursor.current_filter().to_string(),
                cursor.remaining_filters().to_vec(),
                cursor.runs_later("last"),
            ));
            Ok(text.to_string())
        });
        filters.register("noop", |text: &str, _: &mut Cursor<'_, '_>| Ok(text.to_string()));
        filters.register("last", |text: &str, cursor: &mut Cursor<'_, '_>| {
            assert!(cursor.remaining_filters().is_empty());
            Ok(text.to_string())
        });

        render(&site, &filters).unwrap();
        let seen = seen.lock();
        assert_eq!(
            seen[0],
            ("spy".to_string(), vec!["noop".to_string(), "last".to_string()], true)
        );
    }

    #[test]
    fn test_filter_error_carries_context() {
        let site = SiteFixture::new();
        site.write("content/page.txt", "---\nlayout: ~\nfilter: broken\n---\nbody");

        let mut filters = FilterRegistry::new();
        filters.register("broken", |_: &str, cursor: &mut Cursor<'_, '_>| {
            Err(cursor.error("backend exploded"))
        });

        match render(&site, &filters) {
            Err(WebloomError::Filter { name, message, .. }) => {
                assert_eq!(name, "broken");
                assert_eq!(message, "backend exploded");
            }
            other => panic!("expected a filter error, got {other:?}"),
        }
    }
}
