//! Resolver types

use crate::error::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::future::Future;
use tokio::task::JoinHandle;

// ============================================================================
// Fetch Handles
// ============================================================================

/// An in-flight sub-resource fetch
///
/// Dropping a handle that was never joined aborts its task.
#[derive(Debug)]
pub struct FetchHandle {
    task: Option<JoinHandle<Result<Value>>>,
}

impl FetchHandle {
    /// Run `fut` on the runtime as a fetch task
    pub fn spawn<F>(fut: F) -> Self
    where
        F: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(fut)),
        }
    }

    /// A fetch that has already completed
    pub fn ready(result: Result<Value>) -> Self {
        Self::spawn(async move { result })
    }

    /// Wait for the fetch to finish
    pub async fn join(mut self) -> Result<Value> {
        let Some(task) = self.task.take() else {
            return Err(Error::Other("fetch handle already joined".to_string()));
        };
        match task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Other(format!("sub-resource task failed: {e}"))),
        }
    }
}

impl Drop for FetchHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Something that can start a GET for a sub-resource URL
pub trait ResourceFetcher: Send + Sync {
    fn dispatch(&self, url: &str) -> FetchHandle;
}

impl<F> ResourceFetcher for F
where
    F: Fn(&str) -> FetchHandle + Send + Sync,
{
    fn dispatch(&self, url: &str) -> FetchHandle {
        self(url)
    }
}

// ============================================================================
// Resource Tree
// ============================================================================

/// A sub-resource link whose fetch has been dispatched
#[derive(Debug)]
pub struct PendingResource {
    /// Value of the link's `resource` field
    pub resource: String,
    pub url: String,
    pub handle: FetchHandle,
}

impl PendingResource {
    /// Wait for the fetched value
    pub async fn resolve(self) -> Result<Value> {
        let Self { url, handle, .. } = self;
        handle.join().await.map_err(|e| match e {
            Error::Other(message) => Error::sub_resource(url, message),
            other => other,
        })
    }
}

/// A row after dispatch: plain values with pending fetches in place of links
#[derive(Debug)]
pub enum ResourceNode {
    Value(Value),
    /// Mapping entries in document order
    Object(Vec<(String, ResourceNode)>),
    Array(Vec<ResourceNode>),
    Pending(PendingResource),
}

impl ResourceNode {
    /// Pending fetches anywhere in the tree
    pub fn pending_count(&self) -> usize {
        match self {
            ResourceNode::Value(_) => 0,
            ResourceNode::Object(entries) => entries.iter().map(|(_, n)| n.pending_count()).sum(),
            ResourceNode::Array(items) => items.iter().map(ResourceNode::pending_count).sum(),
            ResourceNode::Pending(_) => 1,
        }
    }

    /// Replace every pending fetch by its result, in document order
    ///
    /// The first failure is returned; fetches not yet awaited are aborted
    /// when the rest of the tree is dropped.
    pub fn resolve(self) -> BoxFuture<'static, Result<Value>> {
        async move {
            match self {
                ResourceNode::Value(value) => Ok(value),
                ResourceNode::Object(entries) => {
                    let mut map = serde_json::Map::with_capacity(entries.len());
                    for (key, node) in entries {
                        map.insert(key, node.resolve().await?);
                    }
                    Ok(Value::Object(map))
                }
                ResourceNode::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for node in items {
                        out.push(node.resolve().await?);
                    }
                    Ok(Value::Array(out))
                }
                ResourceNode::Pending(pending) => pending.resolve().await,
            }
        }
        .boxed()
    }
}
