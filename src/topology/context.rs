use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;

/// Role knowledge needed to validate a topology change.
///
/// Implemented by the role registry; kept as a seam so that topology
/// validation stays a pure function.
pub trait RoleCatalog: Send + Sync {
    fn is_known(
        &self,
        role: &str,
    ) -> bool;

    /// Explicit roles plus transitive dependencies, dependencies first.
    /// Unknown names are dropped.
    fn closure(
        &self,
        roles: &BTreeSet<String>,
    ) -> Vec<String>;
}

/// Everything outside the document that a patch is checked against
pub struct TopologyContext<'a> {
    pub roles: &'a dyn RoleCatalog,
    /// Uris the membership layer has seen, alive or not
    pub known_uris: HashSet<String>,
    /// Buckets still stored per replicaset uuid
    pub bucket_counts: HashMap<String, u64>,
}

impl<'a> TopologyContext<'a> {
    pub fn new(roles: &'a dyn RoleCatalog) -> Self {
        Self {
            roles,
            known_uris: HashSet::new(),
            bucket_counts: HashMap::new(),
        }
    }

    pub fn with_known_uris<I, S>(
        mut self,
        uris: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_uris.extend(uris.into_iter().map(Into::into));
        self
    }

    pub fn with_bucket_counts(
        mut self,
        counts: HashMap<String, u64>,
    ) -> Self {
        self.bucket_counts = counts;
        self
    }

    pub(crate) fn is_member(
        &self,
        uri: &str,
    ) -> bool {
        self.known_uris.contains(uri)
    }

    pub(crate) fn buckets(
        &self,
        replicaset_uuid: &str,
    ) -> u64 {
        self.bucket_counts.get(replicaset_uuid).copied().unwrap_or(0)
    }

    pub(crate) fn has_role(
        &self,
        roles: &BTreeSet<String>,
        role: &str,
    ) -> bool {
        self.roles.closure(roles).iter().any(|r| r == role)
    }
}
