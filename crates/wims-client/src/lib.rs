#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

//! Used to communicate with a WIMS server over its `adm/raw` HTTP+JSON
//! protocol. See the [`WimsClient`] struct and the [`adm_raw`] module for
//! more details.

mod error;
mod request;
mod response;
mod wims_client;

pub use self::error::WimsError;
pub use self::request::{Job, PropertyBlock};
pub use self::response::{
    BackupInventory, ClassCheck, ExamProperties, ExamScore, SheetProperties, SheetSummary,
    WorksheetScore,
};
pub use self::wims_client::{adm_raw, WimsClient};
