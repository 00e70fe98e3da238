//! Request-side types: the `adm/raw` job names and the multi-line property
//! blocks WIMS expects in its `data1`/`data2` parameters.

use std::fmt;

/// A job of the WIMS `adm/raw` module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Job {
    CheckIdent,
    CheckClass,
    GetClass,
    CheckUser,
    AddClass,
    ModClass,
    ModUser,
    AddUser,
    RecUser,
    AuthUser,
    GetUser,
    ListSheets,
    GetSheet,
    GetSheetScores,
    ModSheet,
    ListExams,
    GetExam,
    GetExamScores,
    ModExam,
    CleanClass,
    DelUser,
    GetScore,
    ListBackups,
    RestoreClass,
}

impl Job {
    /// The job name as it appears in the request query.
    pub fn as_str(self) -> &'static str {
        match self {
            Job::CheckIdent => "checkident",
            Job::CheckClass => "checkclass",
            Job::GetClass => "getclass",
            Job::CheckUser => "checkuser",
            Job::AddClass => "addclass",
            Job::ModClass => "modclass",
            Job::ModUser => "moduser",
            Job::AddUser => "adduser",
            Job::RecUser => "recuser",
            Job::AuthUser => "authuser",
            Job::GetUser => "getuser",
            Job::ListSheets => "listsheets",
            Job::GetSheet => "getsheet",
            Job::GetSheetScores => "getsheetscores",
            Job::ModSheet => "modsheet",
            Job::ListExams => "listexams",
            Job::GetExam => "getexam",
            Job::GetExamScores => "getexamscores",
            Job::ModExam => "modexam",
            Job::CleanClass => "cleanclass",
            Job::DelUser => "deluser",
            Job::GetScore => "getscore",
            Job::ListBackups => "listbackups",
            Job::RestoreClass => "restoreclass",
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of `key=value` lines, the format WIMS takes class, user
/// and sheet properties in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyBlock {
    lines: Vec<(String, String)>,
}

impl PropertyBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a property line. Keys are not deduplicated; WIMS applies the
    /// last occurrence.
    pub fn push(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.lines.push((key.to_string(), value.into()));
        self
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.push(key, value);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Renders the block as newline-terminated `key=value` lines.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.lines {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for PropertyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}
