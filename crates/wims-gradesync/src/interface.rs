//! The identity and session manager: binds course modules to WIMS classes,
//! creates classes and participants lazily, and issues access URLs through
//! the per-run cache.

use crate::{
    config::WimsConfig,
    data::{CourseModule, LocalCourse, LocalUser, ModuleStore},
    error::SyncError,
    identity::{LoginPolicy, OwnerToken, RemoteClassId, RemoteLogin},
    session::{AccessUrlCache, PortalPage},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use wims_client::{
    adm_raw, ClassCheck, ExamProperties, PropertyBlock, SheetProperties, SheetSummary, WimsClient,
    WimsError,
};

/// Mode for class selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectMode {
    /// Reuse the stored class when it is reachable.
    #[default]
    Normal,
    /// Create a fresh class even when a stored id exists but cannot be
    /// reached.
    ForceCreate,
}

/// Outcome of class selection or backup restoration.
///
/// `ok == false` comes with diagnostics in `errors` and, when the server
/// holds yearly backups of the class, the restore candidates the view layer
/// can offer.
#[derive(Debug, Default)]
pub struct ClassSelection {
    pub ok: bool,
    pub class_id: Option<RemoteClassId>,
    pub restorable: Option<Vec<String>>,
    pub total: Option<u32>,
    pub errors: Vec<String>,
}

/// The worksheet and exam indexes of one class.
#[derive(Debug, Default)]
pub struct SheetIndex {
    pub worksheets: BTreeMap<u32, SheetSummary>,
    pub exams: BTreeMap<u32, SheetSummary>,
}

/// Aggregated configuration of one class: the class and supervisor
/// key/value pairs plus the properties of every worksheet and exam.
#[derive(Debug, Default)]
pub struct ClassConfig {
    pub properties: Map<String, Value>,
    pub worksheets: BTreeMap<u32, SheetProperties>,
    pub exams: BTreeMap<u32, ExamProperties>,
}

/// A configuration update pushed back to the server. Empty blocks are
/// skipped, so a partial update only touches what it names.
#[derive(Debug, Default)]
pub struct ClassConfigUpdate {
    pub class: PropertyBlock,
    pub supervisor: PropertyBlock,
    pub worksheets: BTreeMap<u32, PropertyBlock>,
    pub exams: BTreeMap<u32, PropertyBlock>,
}

/// High-level manager for one WIMS service binding. Owns the protocol
/// client and the access URL cache; construct one per request or per
/// scheduled run and drop it with the run.
pub struct WimsInterface {
    client: WimsClient,
    cache: AccessUrlCache,
    policy: LoginPolicy,
    lang: String,
    client_addr: Option<String>,
}

impl WimsInterface {
    /// Builds an interface (and its protocol client) from the service
    /// configuration.
    pub fn new(config: &WimsConfig) -> Result<Self, WimsError> {
        let client = WimsClient::new(
            config.server_url.clone(),
            config.service_password.clone(),
            config.allow_self_signed,
        )?;
        Ok(Self::with_client(
            client,
            config.login_policy(),
            config.lang.clone(),
        ))
    }

    /// Wraps an existing client, e.g. one with a custom random source.
    pub fn with_client(client: WimsClient, policy: LoginPolicy, lang: String) -> Self {
        Self {
            client,
            cache: AccessUrlCache::new(),
            policy,
            lang,
            client_addr: None,
        }
    }

    pub fn client(&self) -> &WimsClient {
        &self.client
    }

    pub fn login_policy(&self) -> LoginPolicy {
        self.policy
    }

    /// Binds issued sessions to the given requesting address. Some classes
    /// require the session to be used from the address that opened it.
    pub fn set_client_addr(&mut self, addr: Option<String>) {
        self.client_addr = addr;
    }

    fn bound_class(cm: &CourseModule) -> Result<(&RemoteClassId, OwnerToken), SyncError> {
        let qcl = cm.class_id.as_ref().ok_or(SyncError::ClassNotProvisioned)?;
        Ok((qcl, OwnerToken::for_module(cm.id)))
    }

    /// Verifies that the service credentials are accepted by the server.
    pub fn test_connection(&self) -> Result<(), WimsError> {
        adm_raw::check_ident(&self.client)
    }

    /// Extended reachability check for the class bound to `cm`: existence
    /// plus service access rights. An unprovisioned module is simply not
    /// accessible.
    pub fn verify_class_accessible(&self, cm: &CourseModule) -> Result<bool, WimsError> {
        let Some(qcl) = cm.class_id.as_ref() else {
            return Ok(false);
        };
        let rcl = OwnerToken::for_module(cm.id);
        Ok(adm_raw::check_class(&self.client, qcl.as_str(), rcl.as_str(), true)?.exists())
    }

    /// The remote login of a local user under the configured policy.
    pub fn remote_login(&self, user: &LocalUser) -> RemoteLogin {
        RemoteLogin::derive(user, self.policy)
    }

    /// Selects the class bound to `cm`, creating it on the server when
    /// missing. A newly assigned class id is persisted through `store`
    /// before the follow-up call that authorizes our connection routes, so
    /// a half-created class is still found again on the next attempt.
    pub fn select_class_for_module(
        &self,
        course: &LocalCourse,
        cm: &CourseModule,
        mode: SelectMode,
        store: &mut dyn ModuleStore,
    ) -> Result<ClassSelection, SyncError> {
        let rcl = OwnerToken::for_module(cm.id);
        let lang = course.lang.as_deref().unwrap_or(&self.lang).to_string();
        let mut selection = ClassSelection::default();

        // A stored id first: try to reach the existing class.
        if let Some(qcl) = cm.class_id.as_ref() {
            selection.class_id = Some(qcl.clone());
            match adm_raw::check_class(&self.client, qcl.as_str(), rcl.as_str(), false) {
                Ok(ClassCheck::Exists) => {
                    selection.ok = true;
                    return Ok(selection);
                }
                Ok(ClassCheck::Missing { message }) => {
                    selection.errors.push(message);
                    self.attach_backups(qcl, &mut selection);
                }
                Err(e) => selection.errors.push(e.to_string()),
            }
            if mode != SelectMode::ForceCreate {
                return Ok(selection);
            }
        }

        // No usable class: create one, then authorize our connection routes
        // in a second round trip.
        let class_data = class_creation_block(course, cm, &lang);
        let supervisor_data = supervisor_creation_block(cm);
        let qcl = match adm_raw::add_class(
            &self.client,
            rcl.as_str(),
            &class_data,
            &supervisor_data,
        ) {
            Ok(id) => RemoteClassId::new(id),
            Err(e) => {
                selection.errors.push(e.to_string());
                return Ok(selection);
            }
        };
        log::info!("created WIMS class {qcl} for module {}", cm.id);
        store
            .save_class_id(cm.id, &qcl)
            .map_err(|e| SyncError::PersistClassId(cm.id, e))?;
        selection.class_id = Some(qcl.clone());

        match adm_raw::update_class(&self.client, qcl.as_str(), rcl.as_str(), &connections_block(&rcl))
        {
            Ok(_) => selection.ok = true,
            Err(e) => selection.errors.push(e.to_string()),
        }
        Ok(selection)
    }

    /// Restores the class bound to `cm` from its backup of `backup_year`.
    /// A class that is still reachable is left untouched; a failed restore
    /// reports the years the server can offer instead.
    pub fn restore_class_backup(
        &self,
        cm: &CourseModule,
        backup_year: u32,
    ) -> Result<ClassSelection, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        let mut selection = ClassSelection {
            class_id: Some(qcl.clone()),
            ..ClassSelection::default()
        };
        match adm_raw::check_class(&self.client, qcl.as_str(), rcl.as_str(), false) {
            Ok(ClassCheck::Exists) => {
                selection.ok = true;
                return Ok(selection);
            }
            Ok(ClassCheck::Missing { message }) => selection.errors.push(message),
            Err(e) => {
                selection.errors.push(e.to_string());
                return Ok(selection);
            }
        }
        match adm_raw::restore_class_backup(&self.client, qcl.as_str(), backup_year) {
            Ok(()) => selection.ok = true,
            Err(e) => {
                selection.errors.push(e.to_string());
                self.attach_backups(qcl, &mut selection);
            }
        }
        Ok(selection)
    }

    fn attach_backups(&self, qcl: &RemoteClassId, selection: &mut ClassSelection) {
        match adm_raw::list_class_backups(&self.client, qcl.as_str()) {
            Ok(inventory) => {
                selection.total = Some(inventory.total);
                if !inventory.restorable.is_empty() {
                    selection.restorable = Some(inventory.restorable);
                }
            }
            Err(e) => log::debug!("no backup inventory for class {qcl}: {e}"),
        }
    }

    /// True when `login` exists in the class. With `use_cache`, a login
    /// that already holds a session URL is assumed present without a round
    /// trip.
    pub fn user_exists(
        &self,
        cm: &CourseModule,
        login: &RemoteLogin,
        use_cache: bool,
    ) -> Result<bool, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        if use_cache && self.cache.contains(qcl, &rcl, login) {
            return Ok(true);
        }
        Ok(adm_raw::check_user(
            &self.client,
            qcl.as_str(),
            rcl.as_str(),
            login.as_str(),
        )?)
    }

    /// Issues (or reuses) a session URL taking `user` to the requested
    /// page, creating the remote account on first contact.
    pub fn student_url(
        &mut self,
        cm: &CourseModule,
        user: &LocalUser,
        lang: Option<&str>,
        page: PortalPage,
    ) -> Result<String, SyncError> {
        let login = self.remote_login(user);
        if !self.user_exists(cm, &login, true)? {
            let (qcl, rcl) = Self::bound_class(cm)?;
            adm_raw::add_user(
                &self.client,
                qcl.as_str(),
                rcl.as_str(),
                &user.first_name,
                &user.last_name,
                login.as_str(),
            )?;
        }
        self.session_url(cm, &login, lang, page)
    }

    /// Issues (or reuses) a session URL for the reserved supervisor login,
    /// landing the teacher on their side of the class.
    pub fn supervisor_url(
        &mut self,
        cm: &CourseModule,
        lang: Option<&str>,
        page: PortalPage,
    ) -> Result<String, SyncError> {
        self.session_url(cm, &RemoteLogin::supervisor(), lang, page)
    }

    // Every session goes through the access URL cache: one authuser round
    // trip per (class, owner, login) per run.
    fn session_url(
        &mut self,
        cm: &CourseModule,
        login: &RemoteLogin,
        lang: Option<&str>,
        page: PortalPage,
    ) -> Result<String, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        let cached = self.cache.get(qcl, &rcl, login).map(str::to_string);
        let home = match cached {
            Some(url) => url,
            None => {
                let url = adm_raw::auth_user(
                    &self.client,
                    qcl.as_str(),
                    rcl.as_str(),
                    login.as_str(),
                    self.client_addr.as_deref(),
                )?;
                self.cache.insert(qcl, &rcl, login, url.clone());
                url
            }
        };
        let lang = lang.unwrap_or(&self.lang);
        Ok(format!("{home}&lang={lang}{}", page.suffix()))
    }

    /// Removes every participant and their work from the class, dropping
    /// the sessions issued for it.
    pub fn clean_class(&mut self, cm: &CourseModule) -> Result<(), SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        adm_raw::clean_class(&self.client, qcl.as_str(), rcl.as_str())?;
        self.cache.remove_class(qcl, &rcl);
        Ok(())
    }

    /// Removes one participant and their work, dropping their session.
    pub fn delete_user(&mut self, cm: &CourseModule, login: &RemoteLogin) -> Result<(), SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        adm_raw::del_user(&self.client, qcl.as_str(), rcl.as_str(), login.as_str())?;
        self.cache.remove(qcl, &rcl, login);
        Ok(())
    }

    /// Ids and summaries of every worksheet and exam of the class.
    pub fn sheet_index(&self, cm: &CourseModule) -> Result<SheetIndex, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        Ok(SheetIndex {
            worksheets: adm_raw::list_worksheets(&self.client, qcl.as_str(), rcl.as_str())?,
            exams: adm_raw::list_exams(&self.client, qcl.as_str(), rcl.as_str())?,
        })
    }

    /// Score snapshot of one worksheet, scaled from percent to the 0..10
    /// gradebook scale. One (remote login, score) pair per participant.
    pub fn worksheet_scores(
        &self,
        cm: &CourseModule,
        sheet: u32,
    ) -> Result<Vec<(String, f64)>, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        let rows = adm_raw::get_sheet_scores(&self.client, qcl.as_str(), rcl.as_str(), sheet)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.id, row.user_percent * 0.1))
            .collect())
    }

    /// Score snapshot of one exam; exam scores are already on the 0..10
    /// scale.
    pub fn exam_scores(
        &self,
        cm: &CourseModule,
        exam: u32,
    ) -> Result<Vec<(String, f64)>, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        let rows = adm_raw::get_exam_scores(&self.client, qcl.as_str(), rcl.as_str(), exam)?;
        Ok(rows.into_iter().map(|row| (row.id, row.score)).collect())
    }

    /// The aggregated configuration of the class: class and supervisor
    /// key/value pairs (class entries win on clashes) plus the properties
    /// of every worksheet and exam.
    pub fn class_config(&self, cm: &CourseModule) -> Result<ClassConfig, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        let mut properties =
            adm_raw::get_user_config(&self.client, qcl.as_str(), rcl.as_str(), "supervisor")?;
        properties.extend(adm_raw::get_class_config(
            &self.client,
            qcl.as_str(),
            rcl.as_str(),
        )?);

        let mut worksheets = BTreeMap::new();
        for id in adm_raw::list_worksheets(&self.client, qcl.as_str(), rcl.as_str())?.keys() {
            worksheets.insert(
                *id,
                adm_raw::get_sheet_properties(&self.client, qcl.as_str(), rcl.as_str(), *id)?,
            );
        }
        let mut exams = BTreeMap::new();
        for id in adm_raw::list_exams(&self.client, qcl.as_str(), rcl.as_str())?.keys() {
            exams.insert(
                *id,
                adm_raw::get_exam_properties(&self.client, qcl.as_str(), rcl.as_str(), *id)?,
            );
        }
        Ok(ClassConfig {
            properties,
            worksheets,
            exams,
        })
    }

    /// Pushes a configuration update to the server. Empty blocks are
    /// skipped; "nothing changed" answers are not errors.
    pub fn update_class_config(
        &self,
        cm: &CourseModule,
        update: &ClassConfigUpdate,
    ) -> Result<(), SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        if !update.class.is_empty() {
            adm_raw::update_class(&self.client, qcl.as_str(), rcl.as_str(), &update.class)?;
        }
        if !update.supervisor.is_empty() {
            adm_raw::update_class_supervisor(
                &self.client,
                qcl.as_str(),
                rcl.as_str(),
                &update.supervisor,
            )?;
        }
        for (id, block) in &update.worksheets {
            if !block.is_empty() {
                adm_raw::update_sheet_properties(
                    &self.client,
                    qcl.as_str(),
                    rcl.as_str(),
                    *id,
                    block,
                )?;
            }
        }
        for (id, block) in &update.exams {
            if !block.is_empty() {
                adm_raw::update_exam_properties(
                    &self.client,
                    qcl.as_str(),
                    rcl.as_str(),
                    *id,
                    block,
                )?;
            }
        }
        Ok(())
    }

    /// The remote logins currently enrolled in the class.
    pub fn user_list(&self, cm: &CourseModule) -> Result<Vec<String>, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        let config = adm_raw::get_class_config(&self.client, qcl.as_str(), rcl.as_str())?;
        Ok(match config.get("userlist") {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .filter(|login| !login.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Configuration key/value pairs of one participant.
    pub fn user_config(
        &self,
        cm: &CourseModule,
        login: &RemoteLogin,
    ) -> Result<Map<String, Value>, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        Ok(adm_raw::get_user_config(
            &self.client,
            qcl.as_str(),
            rcl.as_str(),
            login.as_str(),
        )?)
    }

    /// Raw per-sheet score data of one participant.
    pub fn user_score(
        &self,
        cm: &CourseModule,
        login: &RemoteLogin,
    ) -> Result<Map<String, Value>, SyncError> {
        let (qcl, rcl) = Self::bound_class(cm)?;
        Ok(adm_raw::get_user_score(
            &self.client,
            qcl.as_str(),
            rcl.as_str(),
            login.as_str(),
        )?)
    }
}

// The property block seeding a new class. The class and its supervisor get
// throwaway passwords from the client when the blocks are sent.
fn class_creation_block(course: &LocalCourse, cm: &CourseModule, lang: &str) -> PropertyBlock {
    let mut block = PropertyBlock::new()
        .with("description", cm.name.as_str())
        .with("institution", cm.institution.as_str())
        .with(
            "supervisor",
            format!("{} {}", cm.owner_first_name, cm.owner_last_name),
        )
        .with("email", cm.owner_email.as_str())
        .with("lang", lang)
        .with("secure", "all");
    if let Some(expiration) = course.expiration.as_deref() {
        block.push("expiration", expiration);
    }
    block
}

fn supervisor_creation_block(cm: &CourseModule) -> PropertyBlock {
    PropertyBlock::new()
        .with("lastname", cm.owner_last_name.as_str())
        .with("firstname", cm.owner_first_name.as_str())
}

// The allow-list naming both of our service identities, so the class keeps
// answering whichever route (plain or TLS) the host is configured with.
fn connections_block(rcl: &OwnerToken) -> PropertyBlock {
    PropertyBlock::new().with(
        "connections",
        format!("+moodlejson/{rcl}+ +moodlejsonhttps/{rcl}+"),
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod test {
    use super::*;
    use crate::data::BoxError;
    use mockito::{Matcher, Server, ServerGuard};
    use rand::rngs::mock::StepRng;

    fn init() {
        let _ = simple_logger::SimpleLogger::new()
            .with_level(log::LevelFilter::Debug)
            .init();
    }

    // The step RNG pins every correlation code to "100" and every throwaway
    // password to its range low bound.
    const CODE: &str = "100";

    fn make_interface(server: &Server) -> WimsInterface {
        let client = WimsClient::with_rng(
            server.url().parse().unwrap(),
            "s3cr3t".to_string(),
            false,
            Box::new(StepRng::new(0, 0)),
        )
        .unwrap();
        WimsInterface::with_client(client, LoginPolicy::Opaque, "en".to_string())
    }

    fn job_matcher(job: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("job".into(), job.into()),
            Matcher::UrlEncoded("code".into(), CODE.into()),
        ])
    }

    fn module() -> CourseModule {
        CourseModule {
            id: 7,
            course_id: 3,
            name: "Algebra 101".to_string(),
            class_id: Some(RemoteClassId::new("33333")),
            institution: "Example U".to_string(),
            owner_first_name: "Jeanne".to_string(),
            owner_last_name: "Dupont".to_string(),
            owner_email: "jeanne@example.org".to_string(),
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        saved: Vec<(u64, RemoteClassId)>,
    }

    impl ModuleStore for MemoryStore {
        fn modules(&self) -> Result<Vec<CourseModule>, BoxError> {
            Ok(Vec::new())
        }

        fn save_class_id(
            &mut self,
            module_id: u64,
            class_id: &RemoteClassId,
        ) -> Result<(), BoxError> {
            self.saved.push((module_id, class_id.clone()));
            Ok(())
        }
    }

    fn mock_auth_user(server: &mut ServerGuard, login: &str, session: &str) -> mockito::Mock {
        server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                job_matcher("authuser"),
                Matcher::UrlEncoded("quser".into(), login.into()),
            ]))
            .with_body(format!(
                r#"{{"status":"OK","code":"100","home_url":"https://wims.example.org/wims/wims.cgi?session={session}"}}"#
            ))
            .expect(1)
            .create()
    }

    #[test]
    fn issues_each_session_url_once() {
        init();
        let mut server = Server::new();
        let mut iface = make_interface(&server);
        let cm = module();
        let user = LocalUser {
            id: 42,
            first_name: "Jean".to_string(),
            last_name: "Dupont".to_string(),
        };

        let check = server
            .mock("GET", "/")
            .match_query(job_matcher("checkuser"))
            .with_body(r#"{"status":"OK","code":"100","job":"checkuser"}"#)
            .expect(1)
            .create();
        let auth = mock_auth_user(&mut server, "moodleuser42", "ABC123");

        let first = iface
            .student_url(&cm, &user, None, PortalPage::Grades)
            .unwrap();
        let second = iface
            .student_url(&cm, &user, None, PortalPage::Grades)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first,
            "https://wims.example.org/wims/wims.cgi?session=ABC123&lang=en&module=adm/class/userscore"
        );
        check.assert();
        auth.assert();
    }

    #[test]
    fn creates_missing_class_and_persists_its_id() {
        init();
        let mut server = Server::new();
        let iface = make_interface(&server);
        let mut cm = module();
        cm.class_id = None;
        let course = LocalCourse {
            id: 3,
            ..LocalCourse::default()
        };
        let mut store = MemoryStore::default();

        let create = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                job_matcher("addclass"),
                Matcher::UrlEncoded("rclass".into(), "moodle_7".into()),
            ]))
            .with_body(r#"{"status":"OK","code":"100","class_id":"33333"}"#)
            .expect(1)
            .create();
        let authorize = server
            .mock("GET", "/")
            .match_query(Matcher::AllOf(vec![
                job_matcher("modclass"),
                Matcher::UrlEncoded("qclass".into(), "33333".into()),
                Matcher::UrlEncoded(
                    "data1".into(),
                    "connections=+moodlejson/moodle_7+ +moodlejsonhttps/moodle_7+\n".into(),
                ),
            ]))
            .with_body(r#"{"status":"OK","code":"100","job":"modclass"}"#)
            .expect(1)
            .create();

        let selection = iface
            .select_class_for_module(&course, &cm, SelectMode::Normal, &mut store)
            .unwrap();

        assert!(selection.ok, "errors: {:?}", selection.errors);
        assert_eq!(selection.class_id, Some(RemoteClassId::new("33333")));
        assert_eq!(store.saved, vec![(7, RemoteClassId::new("33333"))]);
        create.assert();
        authorize.assert();
    }

    #[test]
    fn unreachable_class_reports_restore_candidates() {
        init();
        let mut server = Server::new();
        let iface = make_interface(&server);
        let cm = module();
        let mut store = MemoryStore::default();

        let _check = server
            .mock("GET", "/")
            .match_query(job_matcher("checkclass"))
            .with_body(r#"{"status":"ERROR","code":"100","message":"class 33333 not existing"}"#)
            .create();
        let _backups = server
            .mock("GET", "/")
            .match_query(job_matcher("listbackups"))
            .with_body(r#"{"status":"OK","code":"100","restorable":["2023","2024"],"total":2}"#)
            .create();

        let selection = iface
            .select_class_for_module(
                &LocalCourse::default(),
                &cm,
                SelectMode::Normal,
                &mut store,
            )
            .unwrap();

        assert!(!selection.ok);
        assert_eq!(
            selection.restorable,
            Some(vec!["2023".to_string(), "2024".to_string()])
        );
        assert_eq!(selection.total, Some(2));
        assert_eq!(selection.errors, vec!["class 33333 not existing"]);
        assert!(store.saved.is_empty());
    }

    #[test]
    fn restore_is_a_no_op_when_the_class_answers() {
        init();
        let mut server = Server::new();
        let iface = make_interface(&server);
        let _check = server
            .mock("GET", "/")
            .match_query(job_matcher("checkclass"))
            .with_body(r#"{"status":"OK","code":"100","job":"checkclass"}"#)
            .create();

        let selection = iface.restore_class_backup(&module(), 2024).unwrap();
        assert!(selection.ok);
    }

    #[test]
    fn cached_login_short_circuits_the_existence_check() {
        init();
        let server = Server::new();
        let iface = {
            let mut iface = make_interface(&server);
            let cm = module();
            let qcl = cm.class_id.clone().unwrap();
            iface.cache.insert(
                &qcl,
                &OwnerToken::for_module(cm.id),
                &RemoteLogin::new("moodleuser42"),
                "https://w/?session=A".to_string(),
            );
            iface
        };

        // No mock is registered: a round trip would fail with a comms error.
        let exists = iface
            .user_exists(&module(), &RemoteLogin::new("moodleuser42"), true)
            .unwrap();
        assert!(exists);
        let err = iface
            .user_exists(&module(), &RemoteLogin::new("moodleuser42"), false)
            .unwrap_err();
        assert!(matches!(err, SyncError::Wims(e) if e.is_comms()));
    }

    #[test]
    fn deleting_a_user_drops_their_cached_session() {
        init();
        let mut server = Server::new();
        let mut iface = make_interface(&server);
        let cm = module();
        let qcl = cm.class_id.clone().unwrap();
        let login = RemoteLogin::new("moodleuser42");
        iface.cache.insert(
            &qcl,
            &OwnerToken::for_module(cm.id),
            &login,
            "https://w/?session=A".to_string(),
        );
        let _del = server
            .mock("GET", "/")
            .match_query(job_matcher("deluser"))
            .with_body(r#"{"status":"OK","code":"100","job":"deluser"}"#)
            .create();

        iface.delete_user(&cm, &login).unwrap();
        assert!(iface.cache.is_empty());
    }

    #[test]
    fn cleaning_a_class_drops_only_its_sessions() {
        init();
        let mut server = Server::new();
        let mut iface = make_interface(&server);
        let cm = module();
        let qcl = cm.class_id.clone().unwrap();
        let other = RemoteClassId::new("44444");
        let login = RemoteLogin::new("moodleuser42");
        iface
            .cache
            .insert(&qcl, &OwnerToken::for_module(cm.id), &login, "a".to_string());
        iface
            .cache
            .insert(&other, &OwnerToken::for_module(8), &login, "b".to_string());
        let _clean = server
            .mock("GET", "/")
            .match_query(job_matcher("cleanclass"))
            .with_body(r#"{"status":"OK","code":"100","job":"cleanclass"}"#)
            .create();

        iface.clean_class(&cm).unwrap();
        assert_eq!(iface.cache.len(), 1);
    }

    #[test]
    fn unprovisioned_module_is_not_accessible() {
        init();
        let server = Server::new();
        let iface = make_interface(&server);
        let mut cm = module();
        cm.class_id = None;
        assert!(!iface.verify_class_accessible(&cm).unwrap());
    }
}
