//! Fire-and-forget "this view is stale" notifications.
//!
//! Whatever renders `/exam/{id}` or `/user` subscribes to the channel and
//! decides what to do with it. Nobody listening is not an error.

use tokio::sync::broadcast;

use crate::model::ExamId;

pub const PROFILE_PATH: &str = "/user";

const DEFAULT_CAPACITY: usize = 256;

pub fn exam_path(exam_id: &ExamId) -> String {
    format!("/exam/{}", exam_id)
}

#[derive(Clone)]
pub struct Revalidator {
    tx: broadcast::Sender<String>,
}

impl Default for Revalidator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Revalidator {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Revalidator { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    pub fn revalidate(&self, path: impl Into<String>) {
        let path = path.into();
        tracing::debug!(path = %path, "revalidating view");
        let _ = self.tx.send(path);
    }

    /// Marks the exam's detail page and the profile page as stale.
    pub fn exam_changed(&self, exam_id: &ExamId) {
        self.revalidate(exam_path(exam_id));
        self.revalidate(PROFILE_PATH);
    }
}
