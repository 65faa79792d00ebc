// cert/types.rs
use std::path::PathBuf;

/// One leaf certificate to issue.
///
/// `name` picks the output files (`<name>.crt`, `<name>.key`); `common_name` and
/// `organization` are the identity Kubernetes RBAC sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub name: String,
    pub common_name: String,
    pub organization: String,
    pub ca_cert: PathBuf,
    pub ca_key: PathBuf,
    pub hostnames: Vec<String>,
}

impl CertificateRequest {
    pub fn is_server(&self) -> bool {
        !self.hostnames.is_empty()
    }
}

/// PEM material of an issued (or previously issued) certificate.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub cert: String,
    pub key: String,
}

// Key material stays out of debug output.
impl std::fmt::Debug for IssuedCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedCertificate")
            .field("cert_len", &self.cert.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Whether an ensure step had to create its artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioned {
    Generated,
    Reused,
}

impl std::fmt::Display for Provisioned {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provisioned::Generated => write!(f, "generated"),
            Provisioned::Reused => write!(f, "reused"),
        }
    }
}
