use std::collections::VecDeque;

use tokio::sync::RwLock;

use crate::types::{PortProbeResult, PortStatus, ResultStats};

/// Bounded, newest-first buffer of probe results shared by all scans.
///
/// Insertion order is completion order, not port order.
#[derive(Debug)]
pub struct ResultStore {
    capacity: usize,
    entries: RwLock<VecDeque<PortProbeResult>>,
}

impl Default for ResultStore {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a result at the front, evicting the oldest when full.
    pub async fn push(&self, result: PortProbeResult) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_back();
        }
        entries.push_front(result);
    }

    /// Copy of the current contents, newest first.
    pub async fn snapshot(&self) -> Vec<PortProbeResult> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn stats(&self) -> ResultStats {
        aggregate(&self.snapshot().await)
    }
}

/// Status counts plus a histogram of service labels on open ports.
pub fn aggregate(results: &[PortProbeResult]) -> ResultStats {
    results.iter().fold(ResultStats::default(), |mut acc, r| {
        match r.status {
            PortStatus::Open => acc.open_ports += 1,
            PortStatus::Closed => acc.closed_ports += 1,
            PortStatus::Filtered => acc.filtered_ports += 1,
        }
        if let Some(service) = &r.service {
            *acc.common_services.entry(service.clone()).or_insert(0) += 1;
        }
        acc
    })
}
