use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }
    };
}

id_type!(UserId);
id_type!(ExamId);
id_type!(FolderId);

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub saved_exams: BTreeSet<ExamId>,
    pub flashed_exams: BTreeSet<ExamId>,
    pub folders: Vec<Folder>,
}

impl User {
    pub fn has_saved(&self, exam_id: &ExamId) -> bool {
        self.saved_exams.contains(exam_id)
    }

    pub fn has_flashed(&self, exam_id: &ExamId) -> bool {
        self.flashed_exams.contains(exam_id)
    }

    /// Ids of this user's folders holding `exam_id`, in folder order.
    pub fn folders_containing(&self, exam_id: &ExamId) -> Vec<FolderId> {
        self.folders
            .iter()
            .filter(|folder| folder.exams.contains(exam_id))
            .map(|folder| folder.id.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Folder {
    pub id: FolderId,
    pub name: String,
    pub position: i64,
    pub exams: BTreeSet<ExamId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamFile {
    pub id: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub url: String,
    pub name: String,
    pub file_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: ExamId,
    pub title: String,
    pub course_name: String,
    pub instructor: String,
    pub semester: String,
    pub exam_type: String,
    pub has_answers: bool,
    pub description: Option<String>,
    pub lightning: i64,
    pub created_at: Option<String>,
    pub files: Vec<ExamFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewExam {
    pub title: String,
    pub course_name: String,
    pub instructor: String,
    pub semester: String,
    pub exam_type: String,
    pub has_answers: bool,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewExamFile {
    pub file_type: String,
    pub url: String,
    pub name: String,
    pub file_id: Option<String>,
}

/// An exam as a given viewer sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamView {
    #[serde(flatten)]
    pub exam: Exam,
    pub is_saved: bool,
    pub is_flashed: bool,
    pub saved_in_folders: Vec<FolderId>,
}

impl ExamView {
    pub fn anonymous(exam: Exam) -> Self {
        ExamView {
            exam,
            is_saved: false,
            is_flashed: false,
            saved_in_folders: Vec::new(),
        }
    }

    pub fn for_viewer(exam: Exam, viewer: &User) -> Self {
        let is_saved = viewer.has_saved(&exam.id);
        let is_flashed = viewer.has_flashed(&exam.id);
        let saved_in_folders = viewer.folders_containing(&exam.id);
        ExamView {
            exam,
            is_saved,
            is_flashed,
            saved_in_folders,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlashState {
    pub exam_id: ExamId,
    pub is_flashed: bool,
    pub lightning: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveState {
    pub exam_id: ExamId,
    pub is_saved: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderState {
    pub exam_id: ExamId,
    pub is_saved: bool,
    pub saved_in_folders: Vec<FolderId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSummary {
    pub id: FolderId,
    pub name: String,
    pub exams: Vec<ExamId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub saved_exams: Vec<ExamId>,
    pub flashed_exams: Vec<ExamId>,
    pub folders: Vec<FolderSummary>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        Profile {
            id: user.id,
            email: user.email,
            name: user.name,
            saved_exams: user.saved_exams.into_iter().collect(),
            flashed_exams: user.flashed_exams.into_iter().collect(),
            folders: user
                .folders
                .into_iter()
                .map(|folder| FolderSummary {
                    id: folder.id,
                    name: folder.name,
                    exams: folder.exams.into_iter().collect(),
                })
                .collect(),
        }
    }
}
