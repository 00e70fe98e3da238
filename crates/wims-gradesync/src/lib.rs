#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

//! Binds local course modules to classes on a WIMS server: remote identity
//! derivation, session issuance through a per-run URL cache, and the
//! scheduled workflow that mirrors sheet scores into the local gradebook.
//! See the [`WimsInterface`] struct and [`sync::run_sync`] for more details.

mod config;
mod data;
mod error;
mod identity;
mod interface;
mod session;
pub mod sync;

pub use self::config::WimsConfig;
pub use self::data::{
    BoxError, CourseModule, GradeColumn, GradeSink, LocalCourse, LocalUser, ModuleStore,
    UserDirectory,
};
pub use self::error::SyncError;
pub use self::identity::{
    build_login_lookup, GradeItemId, LoginPolicy, OwnerToken, RemoteClassId, RemoteLogin,
    SheetIdOutOfRange, SheetKind,
};
pub use self::interface::{
    ClassConfig, ClassConfigUpdate, ClassSelection, SelectMode, SheetIndex, WimsInterface,
};
pub use self::session::{AccessUrlCache, PortalPage};
pub use self::sync::{ModuleReport, SyncReport};
pub use wims_client::{WimsClient, WimsError};
