use crate::config::Config;
use crate::error::{Result, WebloomError};
use crate::filter::{self, FilterRegistry};
use crate::meta_file::{MetaMap, read_body};
use crate::pager::Pager;
use crate::registry::Registry;
use crate::resource::{LayoutLookup, Resource, ResourceKind};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedOutput {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub url: Option<String>,
    pub number: Option<usize>,
    pub content: String,
}

pub struct Renderer<'r> {
    registry: &'r Registry,
    filters: &'r FilterRegistry,
    config: &'r Config,
    page: Arc<Resource>,
    stack: Vec<PathBuf>,
    pager: Option<Pager>,
    content: Option<String>,
    locals: Vec<MetaMap>,
}

impl<'r> Renderer<'r> {
    pub fn new(
        registry: &'r Registry,
        filters: &'r FilterRegistry,
        config: &'r Config,
        page: &Resource,
    ) -> Result<Self> {
        if page.kind() != ResourceKind::Page {
            return Err(WebloomError::NotRenderable {
                path: page.path().to_path_buf(),
            });
        }

        Ok(Self {
            registry,
            filters,
            config,
            page: Arc::new(page.clone()),
            stack: Vec::new(),
            pager: None,
            content: None,
            locals: Vec::new(),
        })
    }

    pub fn page(&self) -> &Resource {
        &self.page
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn filters(&self) -> &'r FilterRegistry {
        self.filters
    }

    pub fn config(&self) -> &'r Config {
        self.config
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn locals(&self) -> Option<&MetaMap> {
        self.locals.last()
    }

    pub fn pager(&self) -> Option<&Pager> {
        self.pager.as_ref()
    }

    pub fn stack(&self) -> &[PathBuf] {
        &self.stack
    }

    /// Renders the page body and wraps it in each layout of its chain.
    ///
    /// The render stack is empty again when this returns, whether the render
    /// succeeded or not.
    pub fn layout_page(&mut self) -> Result<String> {
        let result = self.nest_layouts();
        self.content = None;
        if result.is_err() {
            self.stack.clear();
        }
        result
    }

    fn nest_layouts(&mut self) -> Result<String> {
        let registry = self.registry;
        let page = self.page.clone();
        let body = read_body(page.path())?;
        let mut content = filter::process(self, &page, &body)?;

        self.stack.push(page.path().to_path_buf());
        let mut depth = 1;
        let mut layout_name = page.layout_name().map(str::to_string);

        while let Some(name) = layout_name {
            let Some(layout) = registry.find_layout(&name) else {
                tracing::debug!("no layout named '{}' for {}", name, page.path().display());
                break;
            };
            self.enter(layout.path())?;
            depth += 1;

            self.content = Some(content);
            let body = read_body(layout.path())?;
            content = filter::process(self, layout, &body)?;
            layout_name = layout.layout_name().map(str::to_string);
        }

        for _ in 0..depth {
            self.stack.pop();
        }
        if !self.stack.is_empty() {
            return Err(WebloomError::StackCorrupted {
                path: page.path().to_path_buf(),
            });
        }

        Ok(content)
    }

    /// Renders the partial `name` through its own filters with `locals`
    /// visible to them. The page's directory is searched first.
    pub fn render_partial(&mut self, name: &str, locals: MetaMap) -> Result<String> {
        let registry = self.registry;
        let partial = registry
            .find_partial(name, self.page.directory())
            .ok_or_else(|| WebloomError::PartialNotFound {
                name: name.to_string(),
                path: self.page.path().to_path_buf(),
            })?;

        self.enter(partial.path())?;
        self.locals.push(locals);
        let result = read_body(partial.path()).and_then(|body| filter::process(self, partial, &body));
        self.locals.pop();
        self.stack.pop();
        result
    }

    fn enter(&mut self, path: &Path) -> Result<()> {
        if self.stack.iter().any(|entry| entry == path) {
            let mut stack = self.stack.clone();
            stack.push(path.to_path_buf());
            return Err(WebloomError::RenderLoop { stack });
        }
        self.stack.push(path.to_path_buf());
        Ok(())
    }

    /// The slice of `items` belonging to the current page. The first call of
    /// a render sets up the pager; later calls see the page it has advanced
    /// to.
    pub fn paginate<'a, T>(&mut self, items: &'a [T], per_page: usize) -> &'a [T] {
        let pager = self
            .pager
            .get_or_insert_with(|| Pager::new(items.len(), per_page));
        let range = pager.range();
        let end = range.end.min(items.len());
        &items[range.start.min(end)..end]
    }

    /// Moves to the next page of a paginated render. Returns `false`, clears
    /// the pager and restores the unnumbered destination once the last page
    /// has been rendered, or straight away when nothing was paginated.
    pub fn next_page(&mut self) -> bool {
        if self.pager.as_mut().is_some_and(Pager::advance) {
            let number = self.pager.as_ref().map(Pager::number);
            Arc::make_mut(&mut self.page).set_number(number);
            return true;
        }

        self.pager = None;
        if self.page.number().is_some() {
            Arc::make_mut(&mut self.page).set_number(None);
        }
        false
    }

    pub fn render_all(&mut self) -> Result<Vec<RenderedOutput>> {
        let mut outputs = Vec::new();

        loop {
            let content = self.layout_page()?;
            outputs.push(RenderedOutput {
                source: self.page.path().to_path_buf(),
                destination: self.page.destination(self.registry).to_path_buf(),
                url: self.page.url(self.registry),
                number: self.page.number(),
                content,
            });
            if !self.next_page() {
                break;
            }
        }

        Ok(outputs)
    }

    pub fn pager_context(&self) -> Value {
        let Some(pager) = &self.pager else {
            return Value::Null;
        };

        let url_of = |number: usize| {
            let mut page = (*self.page).clone();
            page.set_number((number > 1).then_some(number));
            page.url(self.registry)
        };

        json!({
            "number": pager.number(),
            "number_of_pages": pager.number_of_pages(),
            "per_page": pager.per_page(),
            "total": pager.total(),
            "prev": pager.prev_number(),
            "next": pager.next_number(),
            "prev_url": pager.prev_number().and_then(url_of),
            "next_url": pager.next_number().and_then(url_of),
        })
    }
}
