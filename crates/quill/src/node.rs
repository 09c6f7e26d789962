//! Service trees and path normalization.

use crate::service::Service;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Strips every leading and trailing `/`, so `"/todos/"` and `"todos"` name the same service
pub fn normalize_path(location: &str) -> String {
    location.trim_matches('/').to_owned()
}

/// What can be registered at a location: a service, or a branch of nested routes.
///
/// A branch is only a path prefix container, it is never bound itself. Every leaf of a tree
/// is a concrete service.
pub enum ServiceNode {
    Leaf(Arc<dyn Service>),
    Branch(IndexMap<String, ServiceNode>),
}

impl ServiceNode {
    pub fn leaf<S: Service + 'static>(service: S) -> Self {
        Self::Leaf(Arc::new(service))
    }

    /// Builds a branch, keeping the routes in the order given
    pub fn router<I, K>(routes: I) -> Self
    where
        I: IntoIterator<Item = (K, ServiceNode)>,
        K: Into<String>,
    {
        Self::Branch(routes.into_iter().map(|(segment, node)| (segment.into(), node)).collect())
    }

    /// Whether this node has at least one leaf offering a service method
    pub fn is_service(&self) -> bool {
        match self {
            Self::Leaf(service) => !service.methods().is_empty(),
            Self::Branch(routes) => routes.values().any(ServiceNode::is_service),
        }
    }

    /// Walks the tree and yields every leaf with its full location.
    ///
    /// A leaf's location is `location` followed by the segments of every branch traversed to
    /// reach it, concatenated as written. Leaves come out in declaration order.
    pub fn flatten(self, location: &str) -> Vec<(String, Arc<dyn Service>)> {
        let mut leaves = Vec::new();
        self.flatten_into(location.to_owned(), &mut leaves);
        leaves
    }

    fn flatten_into(self, location: String, leaves: &mut Vec<(String, Arc<dyn Service>)>) {
        match self {
            Self::Leaf(service) => leaves.push((location, service)),
            Self::Branch(routes) => {
                for (segment, node) in routes {
                    node.flatten_into(format!("{location}{segment}"), leaves);
                }
            }
        }
    }
}

impl From<Arc<dyn Service>> for ServiceNode {
    fn from(service: Arc<dyn Service>) -> Self {
        Self::Leaf(service)
    }
}

impl fmt::Debug for ServiceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(service) => f.debug_tuple("Leaf").field(&service.methods()).finish(),
            Self::Branch(routes) => f.debug_map().entries(routes.iter()).finish(),
        }
    }
}
