//! The scheduled score synchronisation workflow: one pass over every course
//! module, mirroring the scores of graded sheets into the local gradebook.
//!
//! Failures are isolated as narrowly as possible. An unreachable class
//! skips its module, a failing sheet is counted and skipped, an unmapped
//! login is counted and skipped; only local collaborator failures abort the
//! run. The returned [`SyncReport`] is how operators detect partial
//! failure, so its counters are part of the contract, not decoration.

use crate::{
    data::{CourseModule, GradeColumn, GradeSink, ModuleStore, UserDirectory},
    error::SyncError,
    identity::{build_login_lookup, GradeItemId, SheetKind},
    interface::WimsInterface,
};
use std::collections::HashMap;
use std::fmt;
use wims_client::SheetSummary;

// Sheet state used while a teacher is still preparing it; the server
// refuses score queries for these.
const STATE_IN_PREPARATION: &str = "0";
// Trailing marker a teacher puts on a worksheet title to ask for gradebook
// tracking.
const GRADED_MARKER: char = '*';

/// One gradable sheet retained by the filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredSheet {
    pub kind: SheetKind,
    pub id: u32,
    /// Display title, with the graded marker stripped.
    pub title: String,
}

/// Decides whether a sheet participates in score synchronisation and strips
/// the graded marker from its title.
///
/// Sheets in preparation never participate. Worksheets participate only
/// when carrying the marker; exams always participate, marker or not.
pub fn required_sheet(kind: SheetKind, id: u32, summary: &SheetSummary) -> Option<RequiredSheet> {
    if summary.state == STATE_IN_PREPARATION {
        return None;
    }
    let title = summary.title.trim_end();
    match title.strip_suffix(GRADED_MARKER) {
        Some(stripped) => Some(RequiredSheet {
            kind,
            id,
            title: stripped.trim_end().to_string(),
        }),
        None if kind == SheetKind::Exam => Some(RequiredSheet {
            kind,
            id,
            title: title.to_string(),
        }),
        None => None,
    }
}

/// Outcome counters for one course module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleReport {
    pub module_id: u64,
    pub course_id: u64,
    /// When set, the module was skipped before touching the gradebook.
    pub skipped: Option<String>,
    pub items_updated: u32,
    pub items_failed: u32,
    pub grades_updated: u32,
    pub grades_failed: u32,
}

impl ModuleReport {
    fn for_module(cm: &CourseModule) -> Self {
        Self {
            module_id: cm.id,
            course_id: cm.course_id,
            ..Self::default()
        }
    }

    fn skip(mut self, reason: String) -> Self {
        log::info!("  skipping module {}: {reason}", self.module_id);
        self.skipped = Some(reason);
        self
    }
}

/// Summary of one synchronisation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub modules: Vec<ModuleReport>,
}

impl SyncReport {
    pub fn items_updated(&self) -> u32 {
        self.modules.iter().map(|m| m.items_updated).sum()
    }

    pub fn items_failed(&self) -> u32 {
        self.modules.iter().map(|m| m.items_failed).sum()
    }

    pub fn grades_updated(&self) -> u32 {
        self.modules.iter().map(|m| m.grades_updated).sum()
    }

    pub fn grades_failed(&self) -> u32 {
        self.modules.iter().map(|m| m.grades_failed).sum()
    }

    pub fn modules_skipped(&self) -> usize {
        self.modules.iter().filter(|m| m.skipped.is_some()).count()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} grade items updated ({} failed), {} user grades updated ({} failed) across {} modules ({} skipped)",
            self.items_updated(),
            self.items_failed(),
            self.grades_updated(),
            self.grades_failed(),
            self.modules.len(),
            self.modules_skipped(),
        )
    }
}

/// Synchronises the scores of every module in the store to the gradebook.
/// Meant to be driven by the host scheduler on a fixed interval; one run is
/// assumed exclusive.
pub fn run_sync(
    interface: &WimsInterface,
    store: &dyn ModuleStore,
    directory: &dyn UserDirectory,
    grades: &mut dyn GradeSink,
) -> Result<SyncReport, SyncError> {
    log::info!("synchronising WIMS activity scores to the gradebook");

    // One login lookup for the whole run, not one per module.
    let users = directory.active_users().map_err(SyncError::UserDirectory)?;
    let logins = build_login_lookup(&users, interface.login_policy());
    let modules = store.modules().map_err(SyncError::ModuleStore)?;

    let mut report = SyncReport::default();
    for module in &modules {
        report
            .modules
            .push(sync_module(interface, module, &logins, grades));
    }
    log::info!("score synchronisation done: {report}");
    Ok(report)
}

fn sync_module(
    interface: &WimsInterface,
    cm: &CourseModule,
    logins: &HashMap<String, u64>,
    grades: &mut dyn GradeSink,
) -> ModuleReport {
    log::info!("- processing module {} (course {})", cm.id, cm.course_id);
    let report = ModuleReport::for_module(cm);

    if cm.class_id.is_none() {
        return report.skip("no remote class bound yet".to_string());
    }
    match interface.verify_class_accessible(cm) {
        Ok(true) => {}
        Ok(false) => {
            return report.skip("class is not accessible; it may not have been set up yet".to_string())
        }
        Err(e) => return report.skip(format!("class check failed: {e}")),
    }
    let index = match interface.sheet_index(cm) {
        Ok(index) => index,
        Err(e) => return report.skip(format!("failed to fetch the sheet index: {e}")),
    };

    let mut required = Vec::new();
    for (kind, sheets) in [
        (SheetKind::Worksheet, &index.worksheets),
        (SheetKind::Exam, &index.exams),
    ] {
        for (id, summary) in sheets {
            match required_sheet(kind, *id, summary) {
                Some(sheet) => {
                    log::info!(
                        "  * keeping {kind} {id}: \"{}\" [state={}]",
                        sheet.title,
                        summary.state
                    );
                    required.push(sheet);
                }
                None => log::info!(
                    "  - ignoring {kind} {id}: \"{}\" [state={}]",
                    summary.title,
                    summary.state
                ),
            }
        }
    }

    let mut report = report;
    for sheet in &required {
        sync_sheet(interface, cm, sheet, logins, grades, &mut report);
    }
    report
}

fn sync_sheet(
    interface: &WimsInterface,
    cm: &CourseModule,
    sheet: &RequiredSheet,
    logins: &HashMap<String, u64>,
    grades: &mut dyn GradeSink,
    report: &mut ModuleReport,
) {
    let item = match GradeItemId::new(sheet.kind, sheet.id) {
        Ok(item) => item,
        Err(e) => {
            log::warn!("  {e}");
            report.items_failed += 1;
            return;
        }
    };
    let scores = match sheet.kind {
        SheetKind::Worksheet => interface.worksheet_scores(cm, sheet.id),
        SheetKind::Exam => interface.exam_scores(cm, sheet.id),
    };
    let scores = match scores {
        Ok(rows) => rows,
        Err(e) => {
            log::warn!(
                "  failed to fetch scores for {} {}: {e}",
                sheet.kind,
                sheet.id
            );
            report.items_failed += 1;
            return;
        }
    };

    let column = GradeColumn::wims_scale(sheet.title.clone());
    match grades.upsert_grade_column(cm.course_id, item, &column) {
        Ok(()) => report.items_updated += 1,
        Err(e) => {
            log::warn!(
                "  grade column update failed for {} {} (item {item}): {e}",
                sheet.kind,
                sheet.id
            );
            report.items_failed += 1;
            // Individual grade rows may still go through, keep pushing.
        }
    }

    for (login, value) in &scores {
        match logins.get(login.as_str()) {
            Some(user_id) => {
                match grades.upsert_user_grade(cm.course_id, item, *user_id, *value) {
                    Ok(()) => report.grades_updated += 1,
                    Err(e) => {
                        log::warn!(
                            "  grade update failed for user {user_id} on item {item}: {e}"
                        );
                        report.grades_failed += 1;
                    }
                }
            }
            None => {
                log::warn!("  no local user for remote login {login}");
                report.grades_failed += 1;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::data::{BoxError, LocalUser};
    use crate::identity::{LoginPolicy, RemoteClassId};
    use crate::WimsClient;
    use mockito::{Matcher, Server};
    use rand::rngs::mock::StepRng;

    fn init() {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
    }

    fn summary(title: &str, state: &str) -> SheetSummary {
        SheetSummary {
            title: title.to_string(),
            state: state.to_string(),
        }
    }

    #[test]
    fn marked_worksheet_is_required_and_title_is_cleaned() {
        let sheet = required_sheet(SheetKind::Worksheet, 7, &summary("Algebra Basics *", "1"))
            .expect("marked worksheet should be required");
        assert_eq!(sheet.title, "Algebra Basics");
    }

    #[test]
    fn unmarked_worksheet_is_not_required() {
        assert_eq!(
            required_sheet(SheetKind::Worksheet, 3, &summary("Draft Sheet", "1")),
            None
        );
    }

    #[test]
    fn exams_are_required_with_or_without_marker() {
        let marked = required_sheet(SheetKind::Exam, 2, &summary("Final *", "1")).unwrap();
        let plain = required_sheet(SheetKind::Exam, 2, &summary("Final", "1")).unwrap();
        assert_eq!(marked.title, "Final");
        assert_eq!(plain.title, "Final");
    }

    #[test]
    fn sheets_in_preparation_are_never_required() {
        assert_eq!(
            required_sheet(SheetKind::Worksheet, 1, &summary("HW1 *", "0")),
            None
        );
        assert_eq!(
            required_sheet(SheetKind::Exam, 1, &summary("Final", "0")),
            None
        );
    }

    #[test]
    fn expired_sheets_still_participate() {
        assert!(required_sheet(SheetKind::Worksheet, 1, &summary("HW1 *", "2")).is_some());
    }

    #[derive(Default)]
    struct MemoryCollaborators {
        modules: Vec<CourseModule>,
        users: Vec<LocalUser>,
    }

    impl ModuleStore for MemoryCollaborators {
        fn modules(&self) -> Result<Vec<CourseModule>, BoxError> {
            Ok(self.modules.clone())
        }

        fn save_class_id(&mut self, _: u64, _: &RemoteClassId) -> Result<(), BoxError> {
            unreachable!("the sync run never assigns class ids")
        }
    }

    impl UserDirectory for MemoryCollaborators {
        fn active_users(&self) -> Result<Vec<LocalUser>, BoxError> {
            Ok(self.users.clone())
        }
    }

    #[derive(Default)]
    struct MemoryGradebook {
        columns: Vec<(u64, u32, String)>,
        grades: Vec<(u64, u32, u64, f64)>,
    }

    impl GradeSink for MemoryGradebook {
        fn upsert_grade_column(
            &mut self,
            course_id: u64,
            item: GradeItemId,
            column: &GradeColumn,
        ) -> Result<(), BoxError> {
            assert_eq!(column.min, 0.0);
            assert_eq!(column.max, 10.0);
            self.columns
                .push((course_id, item.as_u32(), column.title.clone()));
            Ok(())
        }

        fn upsert_user_grade(
            &mut self,
            course_id: u64,
            item: GradeItemId,
            user_id: u64,
            raw_score: f64,
        ) -> Result<(), BoxError> {
            self.grades.push((course_id, item.as_u32(), user_id, raw_score));
            Ok(())
        }
    }

    fn job_matcher(job: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("job".into(), job.into()),
            Matcher::UrlEncoded("code".into(), "100".into()),
        ])
    }

    // One module, one marked worksheet (id 7), one unmarked exam (id 2) and
    // one worksheet left in preparation. The score rows include a login no
    // local user maps to.
    #[test]
    fn syncs_one_module_end_to_end() {
        init();
        let mut server = Server::new();
        let client = WimsClient::with_rng(
            server.url().parse().unwrap(),
            "s3cr3t".to_string(),
            false,
            Box::new(StepRng::new(0, 0)),
        )
        .unwrap();
        let interface = WimsInterface::with_client(client, LoginPolicy::Opaque, "en".to_string());

        let _reachable = server
            .mock("GET", "/")
            .match_query(job_matcher("getclass"))
            .with_body(r#"{"status":"OK","code":"100","description":"Algebra"}"#)
            .create();
        let _sheets = server
            .mock("GET", "/")
            .match_query(job_matcher("listsheets"))
            .with_body(
                r#"{"status":"OK","code":"100","nbsheet":2,
                    "sheetlist":["1","7"],
                    "sheettitlelist":["sheet 1 : Draft : 0","sheet 7 : HW1 * : 1"]}"#,
            )
            .create();
        let _exams = server
            .mock("GET", "/")
            .match_query(job_matcher("listexams"))
            .with_body(
                r#"{"status":"OK","code":"100","nbexam":1,
                    "examlist":["2"],
                    "examtitlelist":["exam 2 : Midterm : 1"]}"#,
            )
            .create();
        let sheet_scores = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                job_matcher("getsheetscores"),
                Matcher::UrlEncoded("qsheet".into(), "7".into()),
            ]))
            .with_body(
                r#"{"status":"OK","code":"100","data_scores":[
                    {"id":"moodleuser42","user_percent":"85"},
                    {"id":"stranger99","user_percent":"10"}
                ]}"#,
            )
            .expect(1)
            .create();
        let exam_scores = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                job_matcher("getexamscores"),
                Matcher::UrlEncoded("qexam".into(), "2".into()),
            ]))
            .with_body(
                r#"{"status":"OK","code":"100","data_scores":[
                    {"id":"moodleuser42","score":7}
                ]}"#,
            )
            .expect(1)
            .create();

        let collaborators = MemoryCollaborators {
            modules: vec![CourseModule {
                id: 7,
                course_id: 3,
                name: "Algebra 101".to_string(),
                class_id: Some(RemoteClassId::new("33333")),
                institution: "Example U".to_string(),
                owner_first_name: "Jeanne".to_string(),
                owner_last_name: "Dupont".to_string(),
                owner_email: "jeanne@example.org".to_string(),
            }],
            users: vec![LocalUser {
                id: 42,
                first_name: "Jean".to_string(),
                last_name: "Dupont".to_string(),
            }],
        };
        let mut gradebook = MemoryGradebook::default();

        let report = run_sync(&interface, &collaborators, &collaborators, &mut gradebook).unwrap();

        // Worksheet 7 lands at 1007, exam 2 at 2; the draft sheet is not
        // fetched at all.
        assert_eq!(
            gradebook.columns,
            vec![
                (3, 1007, "HW1".to_string()),
                (3, 2, "Midterm".to_string())
            ]
        );
        // The percent score is rescaled, the exam score is passed through,
        // and the unmapped login is skipped without aborting the row loop.
        assert_eq!(
            gradebook.grades,
            vec![(3, 1007, 42, 8.5), (3, 2, 42, 7.0)]
        );
        assert_eq!(report.items_updated(), 2);
        assert_eq!(report.items_failed(), 0);
        assert_eq!(report.grades_updated(), 2);
        assert_eq!(report.grades_failed(), 1);
        assert_eq!(report.modules_skipped(), 0);
        sheet_scores.assert();
        exam_scores.assert();
    }

    #[test]
    fn unreachable_class_skips_only_its_module() {
        init();
        let mut server = Server::new();
        let client = WimsClient::with_rng(
            server.url().parse().unwrap(),
            "s3cr3t".to_string(),
            false,
            Box::new(StepRng::new(0, 0)),
        )
        .unwrap();
        let interface = WimsInterface::with_client(client, LoginPolicy::Opaque, "en".to_string());

        let _unreachable = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                job_matcher("getclass"),
                Matcher::UrlEncoded("qclass".into(), "33333".into()),
            ]))
            .with_body(r#"{"status":"ERROR","code":"100","message":"class 33333 not existing"}"#)
            .create();
        let _reachable = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                job_matcher("getclass"),
                Matcher::UrlEncoded("qclass".into(), "44444".into()),
            ]))
            .with_body(r#"{"status":"OK","code":"100","description":"Geometry"}"#)
            .create();
        let _empty_sheets = server
            .mock("GET", "/")
            .match_query(job_matcher("listsheets"))
            .with_body(r#"{"status":"OK","code":"100","nbsheet":0,"sheetlist":[],"sheettitlelist":[]}"#)
            .create();
        let _empty_exams = server
            .mock("GET", "/")
            .match_query(job_matcher("listexams"))
            .with_body(r#"{"status":"OK","code":"100","nbexam":0,"examlist":[],"examtitlelist":[]}"#)
            .create();

        let template = CourseModule {
            id: 7,
            course_id: 3,
            name: "Algebra 101".to_string(),
            class_id: Some(RemoteClassId::new("33333")),
            institution: String::new(),
            owner_first_name: String::new(),
            owner_last_name: String::new(),
            owner_email: String::new(),
        };
        let collaborators = MemoryCollaborators {
            modules: vec![
                template.clone(),
                CourseModule {
                    id: 8,
                    course_id: 4,
                    class_id: Some(RemoteClassId::new("44444")),
                    ..template
                },
            ],
            users: Vec::new(),
        };
        let mut gradebook = MemoryGradebook::default();

        let report = run_sync(&interface, &collaborators, &collaborators, &mut gradebook).unwrap();

        assert_eq!(report.modules.len(), 2);
        assert_eq!(report.modules_skipped(), 1);
        assert!(report.modules[0].skipped.is_some());
        assert!(report.modules[1].skipped.is_none());
    }

    #[test]
    fn report_display_summarises_the_run() {
        let report = SyncReport {
            modules: vec![
                ModuleReport {
                    module_id: 1,
                    course_id: 1,
                    items_updated: 2,
                    grades_updated: 5,
                    grades_failed: 1,
                    ..ModuleReport::default()
                },
                ModuleReport {
                    module_id: 2,
                    course_id: 1,
                    skipped: Some("unreachable".to_string()),
                    ..ModuleReport::default()
                },
            ],
        };
        assert_eq!(
            report.to_string(),
            "2 grade items updated (0 failed), 5 user grades updated (1 failed) across 2 modules (1 skipped)"
        );
    }
}
