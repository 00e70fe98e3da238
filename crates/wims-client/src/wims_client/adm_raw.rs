//! Models the job API of the WIMS `adm/raw` module
//! (`?module=adm/raw&job=help` on any WIMS server).
//!
//! Every function issues one signed, correlated request and validates the
//! JSON envelope of the answer before projecting it into a typed result.

use crate::{
    error::WimsError,
    request::{Job, PropertyBlock},
    response::{
        self, AddedClass, AuthorizedSession, BackupInventory, ClassCheck, ExamProperties,
        ExamScore, ScoreRows, SheetProperties, SheetSummary, WorksheetScore,
    },
    WimsClient,
};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Substrings of the server's free-text `message` field that the protocol
/// forces us to match on. They are an external contract owned by the WIMS
/// server, not by this crate; keep them in sync with the server sources.
pub mod server_messages {
    /// A modify-type job that changed nothing. Reported as an empty success.
    /// The server sends this message on its own, so the match is exact.
    pub const NOTHING_DONE: &str = "nothing done";
    /// A user-existence check on an absent user, embedded in a longer
    /// sentence. Reported as an empty success. Substring match.
    pub const NOT_IN_CLASS: &str = "not in this class";
    /// The server refuses this job for our service identity. Substring match.
    pub const ILLEGAL_JOB: &str = "illegal job";
    /// `adduser` found the login in the classroom trash; recoverable with
    /// job `recuser`. Substring match.
    pub const DELETED_USER_FOUND: &str = "Deleted user found";
}

/// A validated response: the job-specific payload, or nothing for the
/// recoverable empty-result conditions.
#[derive(Debug)]
enum Validated {
    Payload(Map<String, Value>),
    Empty,
}

// Issues one GET to the adm/raw endpoint and returns the raw body. Transport
// failures (connection errors, timeouts, non-2xx statuses) surface as
// `Comms`; no retry is attempted here.
fn execute(
    client: &WimsClient,
    job: Job,
    code: &str,
    params: &[(&str, String)],
) -> Result<String, WimsError> {
    let core = &client.0;
    let mut query: Vec<(&str, String)> = vec![
        ("module", "adm/raw".to_string()),
        ("job", job.as_str().to_string()),
        ("code", code.to_string()),
        ("ident", core.ident.clone()),
        ("passwd", core.service_password.clone()),
    ];
    query.extend(params.iter().map(|(k, v)| (*k, v.clone())));

    log::debug!("WIMS execute: job {job} at {} (code {code})", core.server_url);
    let res = core
        .http
        .get(core.server_url.clone())
        .query(&query)
        .send()
        .map_err(|e| WimsError::Comms { job, source: e })?
        .error_for_status()
        .map_err(|e| WimsError::Comms { job, source: e })?;
    res.text().map_err(|e| WimsError::Comms { job, source: e })
}

// Checks the envelope of a response body against the correlation code we
// sent, classifies the documented ERROR shapes and strips the protocol
// bookkeeping keys from the payload.
fn validate(job: Job, body: &str, sent_code: &str) -> Result<Validated, WimsError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| WimsError::ProtocolBreak { job, source: e })?;
    let Value::Object(mut object) = value else {
        return Err(WimsError::Rejected {
            job,
            message: "response is not a JSON object".to_string(),
        });
    };

    let status = object
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let received_code = match object.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    // Some jobs, like authuser, answer without a message field.
    let message = object
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let code_matches = received_code == sent_code;
    if status == "ERROR" && code_matches && message.contains(server_messages::ILLEGAL_JOB) {
        log::warn!("job {job} is not enabled for this service identity on the WIMS server");
        return Err(WimsError::NotAllowed { job });
    }
    if status == "OK" && code_matches {
        for key in ["code", "job"] {
            object.remove(key);
        }
        return Ok(Validated::Payload(object));
    }
    if status == "ERROR"
        && code_matches
        && (message == server_messages::NOTHING_DONE
            || message.contains(server_messages::NOT_IN_CLASS))
    {
        return Ok(Validated::Empty);
    }
    if status == "OK" {
        return Err(WimsError::CodeMismatch {
            job,
            sent: sent_code.to_string(),
            received: received_code,
        });
    }
    log::debug!("job {job} not matched by any accepted response shape: {message}");
    Err(WimsError::Rejected { job, message })
}

// One full round trip: draw a code, execute, validate.
fn call(client: &WimsClient, job: Job, params: &[(&str, String)]) -> Result<Validated, WimsError> {
    let code = client.next_code();
    let body = execute(client, job, &code, params)?;
    validate(job, &body, &code)
}

fn project<T: DeserializeOwned>(job: Job, payload: Map<String, Value>) -> Result<T, WimsError> {
    serde_json::from_value(Value::Object(payload)).map_err(|e| WimsError::Payload { job, source: e })
}

fn class_params(qcl: &str, rcl: &str) -> Vec<(&'static str, String)> {
    vec![("qclass", qcl.to_string()), ("rclass", rcl.to_string())]
}

/// job `checkident`: verifies that the service credentials are accepted.
pub fn check_ident(client: &WimsClient) -> Result<(), WimsError> {
    call(client, Job::CheckIdent, &[]).map(|_| ())
}

/// job `checkclass` or, with `extended`, `getclass`: verifies that class
/// `qcl` exists and is bound to the owner token `rcl`. The extended form
/// also verifies that our service identity has access rights on it.
pub fn check_class(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    extended: bool,
) -> Result<ClassCheck, WimsError> {
    let job = if extended { Job::GetClass } else { Job::CheckClass };
    match call(client, job, &class_params(qcl, rcl)) {
        Ok(_) => Ok(ClassCheck::Exists),
        Err(WimsError::Rejected { message, .. }) => Ok(ClassCheck::Missing { message }),
        Err(e) => Err(e),
    }
}

/// job `checkuser`: true when `login` exists within the class.
pub fn check_user(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    login: &str,
) -> Result<bool, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("quser", login.to_string()));
    match call(client, Job::CheckUser, &params)? {
        Validated::Payload(_) => Ok(true),
        Validated::Empty => Ok(false),
    }
}

/// job `addclass`: creates a new class from the given class and supervisor
/// property blocks and returns the class id the server assigned.
///
/// Both the class and its supervisor account are given throwaway passwords;
/// nobody ever logs in with them, sessions go through [`auth_user`].
pub fn add_class(
    client: &WimsClient,
    rcl: &str,
    class_data: &PropertyBlock,
    supervisor_data: &PropertyBlock,
) -> Result<String, WimsError> {
    let class_pw = client.next_secret(100_000, 1_000_000);
    let supervisor_pw = client.next_secret(100_000, 1_000_000);
    let data1 = class_data.clone().with("password", format!("Pwd{class_pw}"));
    let data2 = supervisor_data
        .clone()
        .with("password", format!("Pwd{supervisor_pw}"));
    let params = vec![
        ("rclass", rcl.to_string()),
        ("data1", data1.render()),
        ("data2", data2.render()),
    ];
    match call(client, Job::AddClass, &params)? {
        Validated::Payload(payload) => {
            let added: AddedClass = project(Job::AddClass, payload)?;
            Ok(added.class_id)
        }
        Validated::Empty => Err(WimsError::MissingField {
            job: Job::AddClass,
            field: "class_id",
        }),
    }
}

/// job `modclass`: updates class properties. Returns false when the server
/// reports that nothing changed.
pub fn update_class(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    class_data: &PropertyBlock,
) -> Result<bool, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("data1", class_data.render()));
    Ok(matches!(
        call(client, Job::ModClass, &params)?,
        Validated::Payload(_)
    ))
}

/// job `moduser` on the reserved `supervisor` login: updates the properties
/// of the class owner account.
pub fn update_class_supervisor(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    supervisor_data: &PropertyBlock,
) -> Result<bool, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("quser", "supervisor".to_string()));
    params.push(("data1", supervisor_data.render()));
    Ok(matches!(
        call(client, Job::ModUser, &params)?,
        Validated::Payload(_)
    ))
}

/// job `adduser`: creates `login` within the class, with a throwaway
/// password. When the server reports that the login sits in the classroom
/// trash, the account is recovered with job `recuser` instead; this is the
/// only recoverable condition, not a generic retry.
pub fn add_user(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    first_name: &str,
    last_name: &str,
    login: &str,
) -> Result<(), WimsError> {
    let secret = client.next_secret(1000, 10_000);
    let data1 = PropertyBlock::new()
        .with("firstname", first_name)
        .with("lastname", last_name)
        .with("password", format!("{secret}{secret}"));
    let mut params = class_params(qcl, rcl);
    params.push(("quser", login.to_string()));
    params.push(("data1", data1.render()));
    match call(client, Job::AddUser, &params) {
        Ok(_) => Ok(()),
        Err(WimsError::Rejected { message, .. })
            if message.contains(server_messages::DELETED_USER_FOUND) =>
        {
            log::debug!("recovering user {login} from the classroom trash");
            call(client, Job::RecUser, &params).map(|_| ())
        }
        Err(e) => Err(e),
    }
}

/// job `authuser`: opens a session for `login` and returns its home URL.
/// When given, `client_addr` binds the session to the requesting address.
pub fn auth_user(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    login: &str,
    client_addr: Option<&str>,
) -> Result<String, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("quser", login.to_string()));
    if let Some(addr) = client_addr {
        params.push(("data1", addr.to_string()));
    }
    match call(client, Job::AuthUser, &params)? {
        Validated::Payload(payload) => {
            let session: AuthorizedSession = project(Job::AuthUser, payload)?;
            Ok(session.home_url)
        }
        Validated::Empty => Err(WimsError::MissingField {
            job: Job::AuthUser,
            field: "home_url",
        }),
    }
}

/// job `getclass`: the configuration key/value pairs of the class, with the
/// protocol bookkeeping entries removed.
pub fn get_class_config(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
) -> Result<Map<String, Value>, WimsError> {
    match call(client, Job::GetClass, &class_params(qcl, rcl))? {
        Validated::Payload(payload) => Ok(response::strip_keys(
            payload,
            &["status", "query_class", "rclass", "password"],
        )),
        Validated::Empty => Ok(Map::new()),
    }
}

/// job `getuser`: the configuration key/value pairs of one participant.
pub fn get_user_config(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    login: &str,
) -> Result<Map<String, Value>, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("quser", login.to_string()));
    match call(client, Job::GetUser, &params)? {
        Validated::Payload(payload) => Ok(response::strip_keys(
            payload,
            &["status", "query_class", "queryuser"],
        )),
        Validated::Empty => Ok(Map::new()),
    }
}

/// job `getscore`: the raw per-sheet score data of one participant.
pub fn get_user_score(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    login: &str,
) -> Result<Map<String, Value>, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("quser", login.to_string()));
    match call(client, Job::GetScore, &params)? {
        Validated::Payload(payload) => Ok(response::strip_keys(
            payload,
            &["status", "query_class", "query_user"],
        )),
        Validated::Empty => Ok(Map::new()),
    }
}

/// job `listsheets`: ids and summaries of the class worksheets.
pub fn list_worksheets(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
) -> Result<BTreeMap<u32, SheetSummary>, WimsError> {
    match call(client, Job::ListSheets, &class_params(qcl, rcl))? {
        Validated::Payload(payload) => {
            let index: response::WorksheetIndex = project(Job::ListSheets, payload)?;
            if index.sheetlist.len() != index.nbsheet as usize {
                log::warn!(
                    "listsheets announced {} sheets but listed {}",
                    index.nbsheet,
                    index.sheetlist.len()
                );
            }
            Ok(response::zip_index(index.sheetlist, index.sheettitlelist))
        }
        Validated::Empty => Ok(BTreeMap::new()),
    }
}

/// job `listexams`: ids and summaries of the class exams.
pub fn list_exams(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
) -> Result<BTreeMap<u32, SheetSummary>, WimsError> {
    match call(client, Job::ListExams, &class_params(qcl, rcl))? {
        Validated::Payload(payload) => {
            let index: response::ExamIndex = project(Job::ListExams, payload)?;
            if index.examlist.len() != index.nbexam as usize {
                log::warn!(
                    "listexams announced {} exams but listed {}",
                    index.nbexam,
                    index.examlist.len()
                );
            }
            Ok(response::zip_index(index.examlist, index.examtitlelist))
        }
        Validated::Empty => Ok(BTreeMap::new()),
    }
}

/// job `getsheet`: properties of one worksheet.
pub fn get_sheet_properties(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    sheet: u32,
) -> Result<SheetProperties, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("qsheet", sheet.to_string()));
    match call(client, Job::GetSheet, &params)? {
        Validated::Payload(payload) => project(Job::GetSheet, payload),
        Validated::Empty => Err(WimsError::MissingField {
            job: Job::GetSheet,
            field: "sheet_status",
        }),
    }
}

/// job `getexam`: properties of one exam.
pub fn get_exam_properties(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    exam: u32,
) -> Result<ExamProperties, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("qexam", exam.to_string()));
    match call(client, Job::GetExam, &params)? {
        Validated::Payload(payload) => project(Job::GetExam, payload),
        Validated::Empty => Err(WimsError::MissingField {
            job: Job::GetExam,
            field: "exam_status",
        }),
    }
}

/// job `getsheetscores`: the score snapshot of one worksheet, one row per
/// participant.
pub fn get_sheet_scores(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    sheet: u32,
) -> Result<Vec<WorksheetScore>, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("qsheet", sheet.to_string()));
    match call(client, Job::GetSheetScores, &params)? {
        Validated::Payload(payload) => {
            let rows: ScoreRows<WorksheetScore> = project(Job::GetSheetScores, payload)?;
            Ok(rows.data_scores)
        }
        Validated::Empty => Ok(Vec::new()),
    }
}

/// job `getexamscores`: the score snapshot of one exam.
pub fn get_exam_scores(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    exam: u32,
) -> Result<Vec<ExamScore>, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("qexam", exam.to_string()));
    match call(client, Job::GetExamScores, &params)? {
        Validated::Payload(payload) => {
            let rows: ScoreRows<ExamScore> = project(Job::GetExamScores, payload)?;
            Ok(rows.data_scores)
        }
        Validated::Empty => Ok(Vec::new()),
    }
}

/// job `modsheet`: updates worksheet properties. Returns false when the
/// server reports that nothing changed.
pub fn update_sheet_properties(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    sheet: u32,
    sheet_data: &PropertyBlock,
) -> Result<bool, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("qsheet", sheet.to_string()));
    params.push(("data1", sheet_data.render()));
    Ok(matches!(
        call(client, Job::ModSheet, &params)?,
        Validated::Payload(_)
    ))
}

/// job `modexam`: updates exam properties. Returns false when the server
/// reports that nothing changed.
pub fn update_exam_properties(
    client: &WimsClient,
    qcl: &str,
    rcl: &str,
    exam: u32,
    exam_data: &PropertyBlock,
) -> Result<bool, WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("qexam", exam.to_string()));
    params.push(("data1", exam_data.render()));
    Ok(matches!(
        call(client, Job::ModExam, &params)?,
        Validated::Payload(_)
    ))
}

/// job `cleanclass`: removes every participant and their work from the
/// class.
pub fn clean_class(client: &WimsClient, qcl: &str, rcl: &str) -> Result<(), WimsError> {
    call(client, Job::CleanClass, &class_params(qcl, rcl)).map(|_| ())
}

/// job `deluser`: removes one participant and their work from the class.
pub fn del_user(client: &WimsClient, qcl: &str, rcl: &str, login: &str) -> Result<(), WimsError> {
    let mut params = class_params(qcl, rcl);
    params.push(("quser", login.to_string()));
    call(client, Job::DelUser, &params).map(|_| ())
}

/// job `listbackups`: the yearly backups of the class held by the server.
pub fn list_class_backups(client: &WimsClient, qcl: &str) -> Result<BackupInventory, WimsError> {
    let params = vec![("qclass", qcl.to_string())];
    match call(client, Job::ListBackups, &params)? {
        Validated::Payload(payload) => project(Job::ListBackups, payload),
        Validated::Empty => Ok(BackupInventory::default()),
    }
}

/// job `restoreclass`: restores the class from its backup of the given year.
pub fn restore_class_backup(
    client: &WimsClient,
    qcl: &str,
    backup_year: u32,
) -> Result<(), WimsError> {
    let params = vec![
        ("qclass", qcl.to_string()),
        ("year", backup_year.to_string()),
    ];
    call(client, Job::RestoreClass, &params).map(|_| ())
}
