mod http_transport;
mod prepared_upstream;

pub(crate) use http_transport::transport_error;
pub use http_transport::HttpTransport;
pub use prepared_upstream::PreparedUpstream;
