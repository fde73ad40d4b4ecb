use crate::error::{ShelfError, ShelfResult};
use crate::model::{Exam, ExamId, ExamView, FlashState, FolderId, FolderState, SaveState, User, UserId};
use crate::revalidate::Revalidator;
use crate::store::{Atomic, ItemStore, UserStore};

pub struct Shelf<'a, S> {
    store: &'a S,
    views: &'a Revalidator,
}

impl<'a, S> Shelf<'a, S>
where
    S: UserStore + ItemStore + Atomic,
{
    pub fn new(store: &'a S, views: &'a Revalidator) -> Self {
        Self { store, views }
    }

    /// Flips the user's flash on an exam and moves the exam's lightning count
    /// with it. Both changes commit together.
    pub async fn toggle_flash(&self, user_id: &UserId, exam_id: &ExamId) -> ShelfResult<FlashState> {
        const OP: &str = "toggle_flash";
        self.require_user(OP, user_id).await?;
        self.require_exam(OP, exam_id).await?;

        let (user, exam) = (user_id.clone(), exam_id.clone());
        let result = self
            .store
            .atomically(move |store| {
                Box::pin(async move {
                    let is_flashed = if store.remove_flashed(&user, &exam).await? {
                        false
                    } else {
                        store.add_flashed(&user, &exam).await?;
                        true
                    };

                    let delta = if is_flashed { 1 } else { -1 };
                    let lightning = store
                        .adjust_lightning(&exam, delta)
                        .await?
                        .ok_or(ShelfError::NotFound("exam"))?;

                    Ok::<_, ShelfError>((is_flashed, lightning))
                })
            })
            .await;

        let (is_flashed, lightning) = self.logged(OP, user_id, exam_id, result)?;
        tracing::info!(op = OP, user_id = %user_id, exam_id = %exam_id, is_flashed, lightning, "flash toggled");
        self.views.exam_changed(exam_id);

        Ok(FlashState {
            exam_id: exam_id.clone(),
            is_flashed,
            lightning,
        })
    }

    /// Saves an unsaved exam, or unsaves a saved one. Unsaving also takes the
    /// exam out of every folder the user owns.
    pub async fn toggle_save(&self, user_id: &UserId, exam_id: &ExamId) -> ShelfResult<SaveState> {
        const OP: &str = "toggle_save";
        self.require_user(OP, user_id).await?;
        self.require_exam(OP, exam_id).await?;

        let (user, exam) = (user_id.clone(), exam_id.clone());
        let result = self
            .store
            .atomically(move |store| {
                Box::pin(async move {
                    if store.remove_saved(&user, &exam).await? {
                        store.pull_from_all_folders(&user, &exam).await?;
                        return Ok(false);
                    }
                    store.add_saved(&user, &exam).await?;
                    Ok::<_, ShelfError>(true)
                })
            })
            .await;

        let is_saved = self.logged(OP, user_id, exam_id, result)?;
        tracing::info!(op = OP, user_id = %user_id, exam_id = %exam_id, is_saved, "save toggled");
        self.views.exam_changed(exam_id);

        Ok(SaveState {
            exam_id: exam_id.clone(),
            is_saved,
        })
    }

    /// Puts the exam in exactly the user's folders listed in `folder_ids` and
    /// marks it saved. Ids that are not the user's folders are ignored; an
    /// empty list empties every folder of this exam but still saves it.
    pub async fn update_exam_folders(
        &self,
        user_id: &UserId,
        exam_id: &ExamId,
        folder_ids: &[FolderId],
    ) -> ShelfResult<FolderState> {
        const OP: &str = "update_exam_folders";
        self.require_user(OP, user_id).await?;
        self.require_exam(OP, exam_id).await?;

        let mut wanted = folder_ids.to_vec();
        wanted.sort();
        wanted.dedup();
        let requested = wanted.len();

        let (user, exam) = (user_id.clone(), exam_id.clone());
        let result = self
            .store
            .atomically(move |store| {
                Box::pin(async move {
                    // Pull first so a single call can both drop and add memberships.
                    store.pull_from_all_folders(&user, &exam).await?;
                    let placed = store.add_to_folders(&user, &exam, &wanted).await?;
                    store.add_saved(&user, &exam).await?;
                    Ok::<_, ShelfError>(placed)
                })
            })
            .await;

        let saved_in_folders = self.logged(OP, user_id, exam_id, result)?;
        if saved_in_folders.len() < requested {
            tracing::debug!(
                op = OP,
                user_id = %user_id,
                exam_id = %exam_id,
                ignored = requested - saved_in_folders.len(),
                "ignored folder ids the user does not own"
            );
        }
        self.views.exam_changed(exam_id);

        Ok(FolderState {
            exam_id: exam_id.clone(),
            is_saved: true,
            saved_in_folders,
        })
    }

    /// Read-only exam projection. `Ok(None)` when the exam does not exist. A
    /// viewer that cannot be resolved gets the anonymous view instead of an
    /// error.
    pub async fn get_exam(&self, exam_id: &ExamId, viewer: Option<&UserId>) -> ShelfResult<Option<ExamView>> {
        let exam = match self.store.find_exam(exam_id).await {
            Ok(Some(exam)) => exam,
            Ok(None) => return Ok(None),
            Err(e) => {
                let err = ShelfError::StoreFailure(e);
                tracing::error!(op = "get_exam", exam_id = %exam_id, error = %crate::unpack_error(&err), "store failure");
                return Err(err);
            }
        };

        let Some(viewer_id) = viewer else {
            return Ok(Some(ExamView::anonymous(exam)));
        };

        match self.store.find_user(viewer_id).await {
            Ok(Some(user)) => Ok(Some(ExamView::for_viewer(exam, &user))),
            Ok(None) => Ok(Some(ExamView::anonymous(exam))),
            Err(e) => {
                tracing::warn!(
                    op = "get_exam",
                    exam_id = %exam_id,
                    user_id = %viewer_id,
                    error = %e,
                    "viewer lookup failed, serving anonymous view"
                );
                Ok(Some(ExamView::anonymous(exam)))
            }
        }
    }

    async fn require_user(&self, op: &'static str, user_id: &UserId) -> ShelfResult<User> {
        match self.store.find_user(user_id).await {
            Ok(Some(user)) => Ok(user),
            Ok(None) => {
                tracing::warn!(op, user_id = %user_id, "user not found");
                Err(ShelfError::NotFound("user"))
            }
            Err(e) => {
                let err = ShelfError::StoreFailure(e);
                tracing::error!(op, user_id = %user_id, error = %crate::unpack_error(&err), "store failure");
                Err(err)
            }
        }
    }

    async fn require_exam(&self, op: &'static str, exam_id: &ExamId) -> ShelfResult<Exam> {
        match self.store.find_exam(exam_id).await {
            Ok(Some(exam)) => Ok(exam),
            Ok(None) => {
                tracing::warn!(op, exam_id = %exam_id, "exam not found");
                Err(ShelfError::NotFound("exam"))
            }
            Err(e) => {
                let err = ShelfError::StoreFailure(e);
                tracing::error!(op, exam_id = %exam_id, error = %crate::unpack_error(&err), "store failure");
                Err(err)
            }
        }
    }

    fn logged<T>(
        &self,
        op: &'static str,
        user_id: &UserId,
        exam_id: &ExamId,
        result: ShelfResult<T>,
    ) -> ShelfResult<T> {
        if let Err(err) = &result {
            match err {
                ShelfError::StoreFailure(_) => tracing::error!(
                    op,
                    user_id = %user_id,
                    exam_id = %exam_id,
                    error = %crate::unpack_error(err),
                    "store failure, rolled back"
                ),
                other => tracing::warn!(op, user_id = %user_id, exam_id = %exam_id, error = %other, "rolled back"),
            }
        }
        result
    }
}
