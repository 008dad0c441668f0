//! Bounded pool for sub-resource fetches

use super::client::HttpSession;
use crate::error::Error;
use crate::resolve::{FetchHandle, ResourceFetcher};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Runs sub-resource GETs on the session, at most `size` at a time
#[derive(Debug, Clone)]
pub struct SubResourcePool {
    session: Arc<HttpSession>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl SubResourcePool {
    pub fn new(session: Arc<HttpSession>, size: usize) -> Self {
        let size = size.max(1);
        Self {
            session,
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Workers currently idle
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl ResourceFetcher for SubResourcePool {
    fn dispatch(&self, url: &str) -> FetchHandle {
        let session = Arc::clone(&self.session);
        let permits = Arc::clone(&self.permits);
        let url = url.to_string();

        FetchHandle::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| Error::sub_resource(url.as_str(), "worker pool closed"))?;
            session.get_json(&url, &[]).await
        })
    }
}
