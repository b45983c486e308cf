//! Lockable resources requested by a transaction.

use std::collections::BTreeMap;

/// One lockable resource: a table, or a table column for an index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resource {
    id: String,
    write: bool,
}

impl Resource {
    pub fn read(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            write: false,
        }
    }

    pub fn write(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            write: true,
        }
    }

    /// Resource id of an index on `column` of `table`.
    pub fn index_id(table: &str, column: &str) -> String {
        format!("{}.{}", table, column)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    /// Combines two requests for the same resource; write dominates read.
    pub fn merge(&self, other: &Resource) -> Resource {
        Resource {
            id: self.id.clone(),
            write: self.write || other.write,
        }
    }
}

/// A de-duplicated set of resource requests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resources {
    items: BTreeMap<String, bool>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a request, upgrading an existing read to write if needed.
    pub fn add(&mut self, resource: Resource) {
        *self.items.entry(resource.id).or_insert(false) |= resource.write;
    }

    pub fn with(mut self, resource: Resource) -> Self {
        self.add(resource);
        self
    }

    pub fn merge(&mut self, other: &Resources) {
        for resource in other.iter() {
            self.add(resource);
        }
    }

    /// Requests in id order.
    pub fn iter(&self) -> impl Iterator<Item = Resource> + '_ {
        self.items.iter().map(|(id, write)| Resource {
            id: id.clone(),
            write: *write,
        })
    }

    pub fn is_write(&self, id: &str) -> Option<bool> {
        self.items.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<Resource> for Resources {
    fn from_iter<I: IntoIterator<Item = Resource>>(iter: I) -> Self {
        let mut resources = Resources::new();
        for resource in iter {
            resources.add(resource);
        }
        resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_dominates() {
        let resources: Resources = vec![
            Resource::read("users"),
            Resource::write("users"),
            Resource::read("users"),
            Resource::read("orders"),
        ]
        .into_iter()
        .collect();

        assert_eq!(resources.len(), 2);
        assert_eq!(resources.is_write("users"), Some(true));
        assert_eq!(resources.is_write("orders"), Some(false));
        assert_eq!(resources.is_write("items"), None);
    }

    #[test]
    fn test_merge() {
        let mut a = Resources::new().with(Resource::read("t"));
        let b = Resources::new()
            .with(Resource::write("t"))
            .with(Resource::read(Resource::index_id("t", "c")));
        a.merge(&b);
        let ids: Vec<_> = a.iter().map(|r| (r.id().to_string(), r.is_write())).collect();
        assert_eq!(
            ids,
            vec![("t".to_string(), true), ("t.c".to_string(), false)]
        );

        let merged = Resource::read("x").merge(&Resource::write("x"));
        assert!(merged.is_write());
    }
}
