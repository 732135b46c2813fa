use dashmap::DashSet;
use std::sync::Arc;

use crate::database::schema::image::ImageId;

// ────────────────────────────────────────────────────────────────
// ActiveTasks - ids with a filter operation in flight
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct ActiveTasks {
    in_progress: DashSet<ImageId>,
}

impl ActiveTasks {
    /// A fresh set behind the `Arc` that guards and the gate share.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn contains(&self, id: &ImageId) -> bool {
        self.in_progress.contains(id)
    }

    pub fn len(&self) -> usize {
        self.in_progress.len()
    }

    pub fn is_empty(&self) -> bool {
        self.in_progress.is_empty()
    }
}

/// Membership token for one id. The id leaves `ActiveTasks` when this is dropped.
#[derive(Debug)]
pub struct ProcessingGuard {
    id: ImageId,
    tasks: Arc<ActiveTasks>,
}

impl ProcessingGuard {
    pub fn id(&self) -> &ImageId {
        &self.id
    }
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.tasks.in_progress.remove(&self.id);
    }
}

/// Atomic check-and-insert: `None` means the id is already being processed.
pub fn try_acquire(tasks: &Arc<ActiveTasks>, id: ImageId) -> Option<ProcessingGuard> {
    if tasks.in_progress.insert(id) {
        Some(ProcessingGuard {
            id,
            tasks: Arc::clone(tasks),
        })
    } else {
        None
    }
}
