pub mod health;
pub(crate) mod optimize;
pub(crate) mod request;
