//! The per-run session URL cache and the portal pages a session can open on.

use crate::identity::{OwnerToken, RemoteClassId, RemoteLogin};
use std::collections::HashMap;

/// Session URLs already issued during this run, keyed by
/// (class, owner token, login).
///
/// One instance lives for one request or one scheduled run and is dropped
/// with it; issued URLs are never persisted. The cache is owned by the
/// [`WimsInterface`](crate::WimsInterface) and needs no synchronisation.
#[derive(Debug, Default)]
pub struct AccessUrlCache {
    urls: HashMap<String, String>,
}

impl AccessUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(qcl: &RemoteClassId, rcl: &OwnerToken, login: &RemoteLogin) -> String {
        format!("{qcl}/{rcl}/{login}")
    }

    pub fn get(&self, qcl: &RemoteClassId, rcl: &OwnerToken, login: &RemoteLogin) -> Option<&str> {
        self.urls.get(&Self::key(qcl, rcl, login)).map(String::as_str)
    }

    pub fn contains(&self, qcl: &RemoteClassId, rcl: &OwnerToken, login: &RemoteLogin) -> bool {
        self.urls.contains_key(&Self::key(qcl, rcl, login))
    }

    pub fn insert(
        &mut self,
        qcl: &RemoteClassId,
        rcl: &OwnerToken,
        login: &RemoteLogin,
        home_url: String,
    ) {
        self.urls.insert(Self::key(qcl, rcl, login), home_url);
    }

    /// Drops the session of one purged participant.
    pub fn remove(&mut self, qcl: &RemoteClassId, rcl: &OwnerToken, login: &RemoteLogin) {
        self.urls.remove(&Self::key(qcl, rcl, login));
    }

    /// Drops every session issued for one purged class, leaving sessions of
    /// other classes alone.
    pub fn remove_class(&mut self, qcl: &RemoteClassId, rcl: &OwnerToken) {
        let prefix = format!("{qcl}/{rcl}/");
        self.urls.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// The WIMS pages a session URL can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalPage {
    /// The class home page.
    Home,
    /// The participant's score management page.
    Grades,
    /// One worksheet.
    Worksheet(u32),
    /// One exam.
    Exam(u32),
}

impl PortalPage {
    /// Module suffix appended to a session home URL to land on this page.
    pub(crate) fn suffix(self) -> String {
        match self {
            PortalPage::Home => String::new(),
            PortalPage::Grades => "&module=adm/class/userscore".to_string(),
            PortalPage::Worksheet(sheet) => format!("&module=adm/sheet&sh={sheet}"),
            PortalPage::Exam(exam) => format!("&module=adm/class/exam&exam={exam}"),
        }
    }
}
