#![doc = include_str!("../../README.md")]

pub(crate) mod internal_prelude {
    #[allow(unused_imports)]
    pub(crate) use tracing::{debug, error, info, trace, warn};

    pub(crate) use crate::errors::*;
}

pub(crate) mod errors {
    pub use color_eyre::eyre::{WrapErr, bail};
    pub use color_eyre::Result;
}

pub mod cli;
pub mod console;
pub mod tracing;
