//! Local-side records and the collaborator seams the host application
//! implements: its course-module storage, its user directory and its
//! gradebook.

use crate::identity::{GradeItemId, RemoteClassId};

/// Boxed error type for collaborator implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An active local user, as enumerated by the user directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalUser {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
}

/// The locally persisted record of one course module bound to a WIMS class.
///
/// The owner fields are what the teacher typed into the activity form; they
/// seed the supervisor account when the remote class is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CourseModule {
    pub id: u64,
    pub course_id: u64,
    pub name: String,
    /// The remote class id, absent until the class has been created.
    pub class_id: Option<RemoteClassId>,
    pub institution: String,
    pub owner_first_name: String,
    pub owner_last_name: String,
    pub owner_email: String,
}

/// Course-level overrides applied when a class is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalCourse {
    pub id: u64,
    /// Overrides the configured default language.
    pub lang: Option<String>,
    /// Class expiration as `yyyymmdd`; the server picks one year from
    /// creation when absent.
    pub expiration: Option<String>,
}

/// A gradebook column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeColumn {
    pub title: String,
    pub min: f64,
    pub max: f64,
}

impl GradeColumn {
    /// The 0..10 scale every WIMS sheet score is reported on.
    pub fn wims_scale(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            min: 0.0,
            max: 10.0,
        }
    }
}

/// Read/write access to the course-module records owned by the host.
pub trait ModuleStore {
    /// Every course module bound to this activity type.
    fn modules(&self) -> Result<Vec<CourseModule>, BoxError>;
    /// Persists a newly assigned remote class id for a module.
    fn save_class_id(&mut self, module_id: u64, class_id: &RemoteClassId) -> Result<(), BoxError>;
}

/// Enumerates the active (neither deleted nor suspended) local users.
pub trait UserDirectory {
    fn active_users(&self) -> Result<Vec<LocalUser>, BoxError>;
}

/// The host gradebook.
pub trait GradeSink {
    fn upsert_grade_column(
        &mut self,
        course_id: u64,
        item: GradeItemId,
        column: &GradeColumn,
    ) -> Result<(), BoxError>;

    fn upsert_user_grade(
        &mut self,
        course_id: u64,
        item: GradeItemId,
        user_id: u64,
        raw_score: f64,
    ) -> Result<(), BoxError>;
}
