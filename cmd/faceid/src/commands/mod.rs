//! CLI commands module.

mod admin;
mod face;
mod util;

pub use admin::AdminCommand;
pub use face::FaceCommand;

pub(crate) use util::*;
