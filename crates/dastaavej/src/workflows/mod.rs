pub mod accounts;
pub mod applications;
pub(crate) mod http;
