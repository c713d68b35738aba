use crate::db::{Limit, Query};
use crate::error::{Result, WebloomError};
use crate::filter::{Cursor, FilterRegistry};
use crate::registry::Registry;
use crate::resource::{Resource, ResourceKind};
use serde::Deserialize;
use serde_json::{Value, json};
use std::error::Error as _;
use tera::{Context, Tera};

pub(crate) fn register(registry: &mut FilterRegistry) {
    registry.register("tera", render_template);
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub reverse: bool,
}

fn default_per_page() -> usize {
    10
}

pub fn page_context(resource: &Resource, registry: &Registry) -> Value {
    let mut context = match resource.metadata().to_value() {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    };

    context.insert("path".into(), json!(resource.path().to_string_lossy()));
    context.insert("directory".into(), json!(resource.directory()));
    context.insert("base_name".into(), json!(resource.base_name()));
    context.insert("file_extension".into(), json!(resource.file_extension()));
    context.insert("kind".into(), json!(resource.kind()));
    context.insert("number".into(), json!(resource.number()));
    context.insert("url".into(), json!(resource.url(registry)));
    context.insert(
        "destination".into(),
        json!(resource.destination(registry).to_string_lossy()),
    );

    Value::Object(context)
}

fn render_template(text: &str, cursor: &mut Cursor<'_, '_>) -> Result<String> {
    let registry = cursor.registry();
    let page = cursor.page().clone();

    let mut context = Context::new();
    context.insert("page", &page_context(&page, registry));
    context.insert("content", cursor.content().unwrap_or_default());
    context.insert("locals", &cursor.locals().cloned().unwrap_or_default());
    context.insert("site", &json!({ "base": cursor.config().base }));

    if let Some(pagination) = page.metadata().get::<Pagination>("paginate") {
        let listed = listed_pages(&pagination, &page, registry)?;
        let items: Vec<Value> = cursor
            .renderer()
            .paginate(&listed, pagination.per_page)
            .iter()
            .map(|item| page_context(item, registry))
            .collect();
        context.insert("items", &items);
    }
    context.insert("pager", &cursor.renderer().pager_context());

    Tera::one_off(text, &context, false).map_err(|error| cursor.error(describe(&error)))
}

fn listed_pages<'r>(
    pagination: &Pagination,
    page: &Resource,
    registry: &'r Registry,
) -> Result<Vec<&'r Resource>> {
    let directory = pagination
        .directory
        .clone()
        .unwrap_or_else(|| page.directory().to_string());

    let mut query = Query::new()
        .in_directory(directory)
        .recursive(pagination.recursive)
        .matching(|candidate| {
            candidate.kind() == ResourceKind::Page && candidate.path() != page.path()
        });
    if let Some(key) = &pagination.sort_by {
        query = query.sort_by(key.clone()).reverse(pagination.reverse);
    }

    registry.pages.find(Limit::All, &query)
}

fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub fn expand_scaffold(template: &str, variables: &Value) -> Result<String> {
    let context = Context::from_value(variables.clone())?;
    Tera::one_off(template, &context, false).map_err(WebloomError::from)
}
