pub mod builder;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod loader;
pub mod markup;
pub mod meta_file;
pub mod metadata;
pub mod output;
pub mod pager;
pub mod registry;
pub mod renderer;
pub mod resource;
pub mod template;

#[cfg(test)]
mod test_support;

pub use builder::{BuildReport, Builder};
pub use config::{CONFIG_FILE_NAME, Config, Freshness};
pub use db::{Limit, Query, ResourceDb};
pub use error::*;
pub use filter::{Cursor, FilterFn, FilterRegistry};
pub use meta_file::{MetaFile, MetaMap};
pub use metadata::Metadata;
pub use pager::Pager;
pub use registry::Registry;
pub use renderer::{RenderedOutput, Renderer};
pub use resource::{LayoutLookup, Resource, ResourceKind};
