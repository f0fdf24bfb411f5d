pub mod catch_panic;
pub mod redirect;
pub mod request_metadata;
pub mod server_information;
pub mod trace;

pub use redirect::redirect_to_domain;
pub use request_metadata::RequestMetadata;
