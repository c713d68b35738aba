use crate::error::{Result, WebloomError};
use crate::metadata::compare_values;
use crate::resource::{INDEX_NAME, Resource, ResourceKind};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Limit {
    #[default]
    First,
    Count(usize),
    All,
}

#[derive(Default)]
pub struct Query<'q> {
    criteria: Vec<(String, Value)>,
    predicate: Option<Box<dyn Fn(&Resource) -> bool + 'q>>,
    in_directory: Option<String>,
    recursive: bool,
    sort_by: Option<String>,
    reverse: bool,
}

impl<'q> Query<'q> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.criteria.push((name.into(), value.into()));
        self
    }

    pub fn matching(mut self, predicate: impl Fn(&Resource) -> bool + 'q) -> Self {
        self.predicate = Some(Box::new(predicate));
        self
    }

    pub fn in_directory(mut self, directory: impl Into<String>) -> Self {
        self.in_directory = Some(normalize_directory(&directory.into()));
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn sort_by(mut self, name: impl Into<String>) -> Self {
        self.sort_by = Some(name.into());
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    fn accepts(&self, resource: &Resource) -> bool {
        let criteria = self
            .criteria
            .iter()
            .all(|(name, value)| resource.attribute(name).as_ref() == Some(value));
        criteria && self.predicate.as_ref().is_none_or(|predicate| predicate(resource))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourceDb {
    buckets: BTreeMap<String, Vec<Resource>>,
}

impl ResourceDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, resource: Resource) {
        let bucket = self
            .buckets
            .entry(resource.directory().to_string())
            .or_default();

        let key = (resource.path().to_path_buf(), resource.block());
        match bucket.binary_search_by(|existing| {
            (existing.path(), existing.block()).cmp(&(key.0.as_path(), key.1))
        }) {
            Ok(index) => bucket[index] = resource,
            Err(index) => bucket.insert(index, resource),
        }
    }

    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Vec::is_empty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.buckets.values().flatten()
    }

    /// Runs `query`, returning at most as many matches as `limit` allows.
    ///
    /// Scoping to a directory that never held a resource is an error rather
    /// than an empty result.
    pub fn find(&self, limit: Limit, query: &Query<'_>) -> Result<Vec<&Resource>> {
        let candidates: Box<dyn Iterator<Item = &Resource> + '_> = match &query.in_directory {
            None => Box::new(self.iter()),
            Some(directory) => {
                if !self.knows_directory(directory, query.recursive) {
                    return Err(WebloomError::UnknownDirectory {
                        directory: directory.clone(),
                    });
                }
                if query.recursive {
                    let directory = directory.clone();
                    Box::new(
                        self.buckets
                            .iter()
                            .filter(move |(key, _)| is_within(key, &directory))
                            .flat_map(|(_, bucket)| bucket.iter()),
                    )
                } else {
                    Box::new(self.buckets[directory.as_str()].iter())
                }
            }
        };

        let mut matches: Vec<&Resource> = candidates
            .filter(|resource| query.accepts(resource))
            .collect();

        if let Some(key) = &query.sort_by {
            matches.retain(|resource| resource.attribute(key).is_some());
            sort_by_attribute(&mut matches, key);
            if query.reverse {
                matches.reverse();
            }
        }

        match limit {
            Limit::First => matches.truncate(1),
            Limit::Count(count) => matches.truncate(count),
            Limit::All => {}
        }

        Ok(matches)
    }

    pub fn find_one(&self, query: &Query<'_>) -> Result<Option<&Resource>> {
        Ok(self.find(Limit::First, query)?.into_iter().next())
    }

    pub fn siblings(&self, resource: &Resource, sort_by: Option<&str>, reverse: bool) -> Vec<&Resource> {
        let mut siblings: Vec<&Resource> = self
            .buckets
            .get(resource.directory())
            .into_iter()
            .flatten()
            .filter(|other| other.path() != resource.path())
            .collect();
        order(&mut siblings, sort_by, reverse);
        siblings
    }

    pub fn children(&self, resource: &Resource, sort_by: Option<&str>, reverse: bool) -> Vec<&Resource> {
        let directory = resource.directory();
        let mut children: Vec<&Resource> = self
            .buckets
            .iter()
            .filter(|(key, _)| key.as_str() != directory && is_within(key, directory))
            .flat_map(|(_, bucket)| bucket.iter())
            .collect();
        order(&mut children, sort_by, reverse);
        children
    }

    pub fn parent_of(&self, resource: &Resource) -> Option<&Resource> {
        let mut directory = resource.directory().to_string();

        loop {
            let index = self.buckets.get(&directory).and_then(|bucket| {
                bucket.iter().find(|candidate| {
                    candidate.kind() == ResourceKind::Page
                        && candidate.base_name() == INDEX_NAME
                        && candidate.path() != resource.path()
                })
            });
            if index.is_some() {
                return index;
            }

            if directory.is_empty() {
                return None;
            }
            directory = match directory.rfind('/') {
                Some(position) => directory[..position].to_string(),
                None => String::new(),
            };
        }
    }

    fn knows_directory(&self, directory: &str, recursive: bool) -> bool {
        if recursive {
            self.buckets.keys().any(|key| is_within(key, directory))
        } else {
            self.buckets.contains_key(directory)
        }
    }
}

fn normalize_directory(directory: &str) -> String {
    directory.trim_matches('/').to_string()
}

fn is_within(key: &str, directory: &str) -> bool {
    directory.is_empty()
        || key == directory
        || key
            .strip_prefix(directory)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn sort_by_attribute(resources: &mut [&Resource], key: &str) {
    resources.sort_by(|left, right| match (left.attribute(key), right.attribute(key)) {
        (Some(left), Some(right)) => compare_values(&left, &right),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

fn order(resources: &mut Vec<&Resource>, sort_by: Option<&str>, reverse: bool) {
    if let Some(key) = sort_by {
        sort_by_attribute(resources, key);
        if reverse {
            resources.reverse();
        }
    }
}
