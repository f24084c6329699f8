#![doc = include_str!("../README.md")]

pub(crate) mod internal_prelude {
    #![allow(unused_imports)]
    pub use tracing::{debug, error, info, info_span, trace, warn};
}

pub mod auth;
pub mod credential;
pub mod error;
pub mod frame;
pub mod message;
pub mod network_blocking;
pub mod response;
pub mod session;
#[cfg(feature = "settings")]
mod setting_defaults;
#[cfg(feature = "settings")]
pub mod settings;
pub mod signal;

pub use credential::Credential;
pub use error::Error;
pub use message::{ConnectionRole, ProtocolVersion};
pub use response::Terminator;
pub use session::{Session, SessionConfig};
#[cfg(feature = "settings")]
pub use settings::{ConnectionSettings, Settings};
pub use signal::Signal;

pub mod prelude {
    pub use super::credential::Credential;
    pub use super::error::Error;
    pub use super::message::{ConnectionRole, ProtocolVersion};
    pub use super::response::Terminator;
    pub use super::session::{Session, SessionConfig};
    #[cfg(feature = "settings")]
    pub use super::settings::{ConnectionSettings, Settings};
    pub use super::signal::Signal;
}
