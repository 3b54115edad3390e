pub(crate) mod api;
pub mod config;
pub mod error;
pub mod modes;
pub mod observability;
pub mod protocol;
pub mod routing;
pub mod state;
pub mod stream;
pub mod transport;

pub(crate) mod json_scan;
mod util;
