use crate::error::{Result, WebloomError};
use crate::resource::{LayoutLookup, Resource, ResourceKind};
use crate::db::ResourceDb;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub pages: ResourceDb,
    pub layouts: ResourceDb,
    pub partials: ResourceDb,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: Resource) {
        match resource.kind() {
            ResourceKind::Page | ResourceKind::Static => self.pages.add(resource),
            ResourceKind::Layout => self.layouts.add(resource),
            ResourceKind::Partial => self.partials.add(resource),
        }
    }

    pub fn clear(&mut self) {
        self.pages.clear();
        self.layouts.clear();
        self.partials.clear();
    }

    pub fn len(&self) -> usize {
        self.pages.len() + self.layouts.len() + self.partials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walks every layout's `layout` references and fails on the first
    /// chain that comes back to a layout already visited.
    pub fn check_layout_cycles(&self) -> Result<()> {
        for layout in self.layouts.iter() {
            let mut chain: Vec<&Path> = vec![layout.path()];
            let mut names = vec![layout_label(layout)];
            let mut current = layout;

            while let Some(next) = current.layout_name().and_then(|name| self.find_layout(name)) {
                names.push(layout_label(next));
                if chain.contains(&next.path()) {
                    return Err(WebloomError::LayoutLoop { chain: names });
                }
                chain.push(next.path());
                current = next;
            }
        }
        Ok(())
    }

    pub fn find_partial(&self, name: &str, directory: &str) -> Option<&Resource> {
        let (directory, base) = match name.rsplit_once('/') {
            Some((scope, base)) => (scope.trim_start_matches('/'), base),
            None => (directory, name),
        };
        let file_name = format!("_{base}");

        let in_directory = self
            .partials
            .iter()
            .find(|partial| partial.directory() == directory && partial.base_name() == file_name);
        if in_directory.is_some() || name.contains('/') {
            return in_directory;
        }
        self.partials
            .iter()
            .find(|partial| partial.base_name() == file_name)
    }
}

impl LayoutLookup for Registry {
    fn find_layout(&self, name: &str) -> Option<&Resource> {
        match name.trim_start_matches('/').rsplit_once('/') {
            Some((directory, base)) => self
                .layouts
                .iter()
                .find(|layout| layout.directory() == directory && layout.base_name() == base),
            None => {
                let name = name.trim_start_matches('/');
                self.layouts.iter().find(|layout| layout.base_name() == name)
            }
        }
    }
}

fn layout_label(layout: &Resource) -> String {
    if layout.directory().is_empty() {
        layout.base_name().to_string()
    } else {
        format!("{}/{}", layout.directory(), layout.base_name())
    }
}
