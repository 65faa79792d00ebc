// src/cert/mod.rs
pub mod catalog;
pub mod hostnames;
mod openssl;
pub mod operations;
mod service_account;
mod types;
pub mod verification;

pub use hostnames::resolve_sans;
pub use operations::{CertificateManager, CertificateOperations};
pub use service_account::ServiceAccountGenerator;
pub use types::{CertificateRequest, IssuedCertificate, Provisioned};
pub use verification::{CertificateVerifier, VerificationReport};
