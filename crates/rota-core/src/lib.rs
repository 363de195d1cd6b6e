//! `rota-core`: identifiers, configuration and base errors shared by every
//! crate in the shift-scheduling workspace.

pub mod config;
pub mod error;
pub mod types;

pub use config::RotaConfig;
pub use error::{CoreError, Result};
pub use types::{MasterId, OperatorId, SiteId, TenantId, OCCURRENCE_ID_SEPARATOR};
