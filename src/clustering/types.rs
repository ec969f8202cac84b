use anyhow::{anyhow, Result};
use serde::ser::{SerializeSeq, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

use crate::article::Article;

use super::prefilter::Reference;

/// Identity of an article within one run: its position in the input stream.
///
/// Two records may share a document name and article id, so the label is not
/// usable as a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArticleKey(pub usize);

/// Index of a cluster in its `ClusterSet`. Only the set hands these out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterId(usize);

impl ClusterId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// An article's membership in a cluster.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterMember<'a> {
    pub article: &'a Article,
    #[serde(rename = "reference_article")]
    pub is_reference: bool,
    #[serde(skip)]
    pub key: ArticleKey,
}

/// A group of articles anchored by one reference article.
///
/// The founding member is the reference and stays first for the cluster's
/// lifetime.
#[derive(Debug, Clone)]
pub struct Cluster<'a> {
    id: ClusterId,
    members: Vec<ClusterMember<'a>>,
}

impl<'a> Cluster<'a> {
    pub fn id(&self) -> ClusterId {
        self.id
    }

    pub fn reference(&self) -> &'a Article {
        self.members[0].article
    }

    pub fn reference_key(&self) -> ArticleKey {
        self.members[0].key
    }

    /// `"<document name> <article id>"` of the reference article.
    pub fn reference_label(&self) -> String {
        self.reference().label()
    }

    pub fn members(&self) -> &[ClusterMember<'a>] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl Serialize for Cluster<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Cluster", 2)?;
        state.serialize_field("reference_label", &self.reference_label())?;
        state.serialize_field("articles", &self.members)?;
        state.end()
    }
}

/// Working state of a clustering run.
///
/// Clusters and the reference-to-cluster map are private and only change
/// together, through `found` and `attach`.
#[derive(Debug, Default)]
pub struct ClusterSet<'a> {
    clusters: Vec<Cluster<'a>>,
    by_reference: HashMap<ArticleKey, ClusterId>,
}

impl<'a> ClusterSet<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cluster with `article` as its only member and reference.
    pub fn found(&mut self, key: ArticleKey, article: &'a Article) -> ClusterId {
        let id = ClusterId(self.clusters.len());
        self.clusters.push(Cluster {
            id,
            members: vec![ClusterMember {
                article,
                is_reference: true,
                key,
            }],
        });
        self.by_reference.insert(key, id);
        id
    }

    /// Appends `article` to an existing cluster as a non-reference member.
    ///
    /// Fails if `id` does not name a cluster of this set.
    pub fn attach(&mut self, id: ClusterId, key: ArticleKey, article: &'a Article) -> Result<()> {
        let cluster = self
            .clusters
            .get_mut(id.0)
            .ok_or_else(|| anyhow!("Cluster {} does not exist", id.0))?;
        cluster.members.push(ClusterMember {
            article,
            is_reference: false,
            key,
        });
        Ok(())
    }

    /// Current references, one per cluster, in cluster creation order.
    pub fn references(&self) -> Vec<Reference<'a>> {
        self.clusters
            .iter()
            .map(|cluster| Reference {
                key: cluster.reference_key(),
                article: cluster.reference(),
            })
            .collect()
    }

    pub fn cluster_for_reference(&self, key: ArticleKey) -> Option<ClusterId> {
        self.by_reference.get(&key).copied()
    }

    pub fn get(&self, id: ClusterId) -> Option<&Cluster<'a>> {
        self.clusters.get(id.0)
    }

    pub fn clusters(&self) -> &[Cluster<'a>] {
        &self.clusters
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    /// Total number of member records across all clusters.
    pub fn article_count(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }
}

impl Serialize for ClusterSet<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.clusters.len()))?;
        for cluster in &self.clusters {
            seq.serialize_element(cluster)?;
        }
        seq.end()
    }
}
