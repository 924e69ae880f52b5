pub mod extractors;
pub mod password;
pub mod policy;
pub mod service;
pub mod token;
