//! Store seams the shelf depends on.
//!
//! The reconciler only ever talks to these traits; `crate::db::Database` is the
//! libsql implementation. Every membership write is idempotent: adding a
//! present id or removing an absent one is a no-op. Set writes report whether
//! they changed anything, and are meant to run inside
//! `Atomic::atomically`.

use anyhow::Result;
use futures_util::future::BoxFuture;
use std::future::Future;

use crate::model::{Exam, ExamId, FolderId, User, UserId};

pub trait UserStore: Send + Sync {
    /// Loads a user with saved, flashed and folder memberships filled in.
    fn find_user(&self, user_id: &UserId) -> impl Future<Output = Result<Option<User>>> + Send;

    fn add_saved(&self, user_id: &UserId, exam_id: &ExamId) -> impl Future<Output = Result<bool>> + Send;

    fn remove_saved(&self, user_id: &UserId, exam_id: &ExamId) -> impl Future<Output = Result<bool>> + Send;

    fn add_flashed(&self, user_id: &UserId, exam_id: &ExamId) -> impl Future<Output = Result<bool>> + Send;

    fn remove_flashed(&self, user_id: &UserId, exam_id: &ExamId) -> impl Future<Output = Result<bool>> + Send;

    /// Removes `exam_id` from every folder owned by `user_id`.
    fn pull_from_all_folders(
        &self,
        user_id: &UserId,
        exam_id: &ExamId,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Adds `exam_id` to those of the user's folders whose id is in
    /// `folder_ids` and returns the ids that matched. Ids of folders the user
    /// does not own are ignored.
    fn add_to_folders(
        &self,
        user_id: &UserId,
        exam_id: &ExamId,
        folder_ids: &[FolderId],
    ) -> impl Future<Output = Result<Vec<FolderId>>> + Send;
}

pub trait ItemStore: Send + Sync {
    fn find_exam(&self, exam_id: &ExamId) -> impl Future<Output = Result<Option<Exam>>> + Send;

    /// Atomically adds `delta` to the exam's flash count, never going below
    /// zero. Returns the new count, or `None` when the exam does not exist.
    fn adjust_lightning(
        &self,
        exam_id: &ExamId,
        delta: i64,
    ) -> impl Future<Output = Result<Option<i64>>> + Send;
}

pub trait SessionStore: Send + Sync {
    /// Resolves an unexpired session token to its user.
    fn find_session_user(&self, token: &str) -> impl Future<Output = Result<Option<UserId>>> + Send;
}

pub trait Atomic: Send + Sync {
    /// Runs `work` as a single transaction: all of its writes land, or none do.
    /// Writers are serialized, and a caller dropped mid-transaction is rolled
    /// back before the next writer starts. Calls must not nest.
    fn atomically<T, E, F>(&self, work: F) -> impl Future<Output = Result<T, E>> + Send
    where
        T: Send,
        E: From<anyhow::Error> + Send,
        F: for<'c> FnOnce(&'c Self) -> BoxFuture<'c, Result<T, E>> + Send;
}
