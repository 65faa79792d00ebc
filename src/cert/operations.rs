// src/cert/operations.rs

use crate::config::PkiPaths;
use crate::error::{PkiError, Result};
use crate::utils::fs::{all_exist, ensure_dir, read_to_string, write_atomic, FileOwner};
use crate::utils::logging::Logger;
use std::path::Path;

use super::openssl::{
    build_ca, cert_pem, generate_private_key, parse_cert, parse_key, private_key_pem,
    sign_certificate, KEY_SIZE,
};
use super::types::{CertificateRequest, IssuedCertificate, Provisioned};

pub const CERT_MODE: u32 = 0o644;
pub const KEY_MODE: u32 = 0o600;

/// The CA/issuer capability the bootstrap needs. Any signing backend that can honour
/// these two calls can stand in for the local one.
pub trait CertificateManager {
    /// Creates `<name>.crt`/`<name>.key` as a self-signed CA unless both already exist.
    fn ensure_ca(&mut self, name: &str, common_name: &str) -> Result<Provisioned>;

    /// Returns the material for `request.name`, signing it first if either file is missing.
    fn ensure_certificate(
        &mut self,
        request: &CertificateRequest,
        owner: &FileOwner,
    ) -> Result<(IssuedCertificate, Provisioned)>;
}

/// Local-disk certificate manager rooted at a single PKI directory.
pub struct CertificateOperations {
    logger: Box<dyn Logger>,
    paths: PkiPaths,
}

impl CertificateOperations {
    pub fn new(logger: Box<dyn Logger>, paths: PkiPaths) -> Self {
        Self { logger, paths }
    }

    #[cfg(test)]
    pub fn paths(&self) -> &PkiPaths {
        &self.paths
    }

    pub fn log(&mut self, message: &str) {
        self.logger.log(message);
    }

    pub fn debug_log(&mut self, message: &str) {
        self.logger.debug_log(message);
    }

    fn read_pair(&self, cert_path: &Path, key_path: &Path, name: &str) -> Result<IssuedCertificate> {
        Ok(IssuedCertificate {
            cert: read_to_string(cert_path, &format!("{} certificate", name))?,
            key: read_to_string(key_path, &format!("{} private key", name))?,
        })
    }
}

impl CertificateManager for CertificateOperations {
    fn ensure_ca(&mut self, name: &str, common_name: &str) -> Result<Provisioned> {
        let cert_path = self.paths.cert(name);
        let key_path = self.paths.key(name);

        if all_exist(&[&cert_path, &key_path]) {
            self.debug_log(&format!("CA {} already exists, reusing", name));
            return Ok(Provisioned::Reused);
        }

        self.log(&format!("Generating CA {} (CN={})", name, common_name));
        ensure_dir(self.paths.root())?;

        let key = generate_private_key(KEY_SIZE, self.logger.as_mut())?;
        let cert = build_ca(common_name, &key, self.logger.as_mut())?;

        // Key before cert.
        write_atomic(&key_path, private_key_pem(&key)?.as_bytes(), KEY_MODE, None)?;
        write_atomic(&cert_path, cert_pem(&cert)?.as_bytes(), CERT_MODE, None)?;

        self.log(&format!("CA {} written to {}", name, cert_path.display()));
        Ok(Provisioned::Generated)
    }

    fn ensure_certificate(
        &mut self,
        request: &CertificateRequest,
        owner: &FileOwner,
    ) -> Result<(IssuedCertificate, Provisioned)> {
        let cert_path = self.paths.cert(&request.name);
        let key_path = self.paths.key(&request.name);

        if all_exist(&[&cert_path, &key_path]) {
            self.debug_log(&format!("Certificate {} already exists, reusing", request.name));
            let issued = self.read_pair(&cert_path, &key_path, &request.name)?;
            return Ok((issued, Provisioned::Reused));
        }

        self.log(&format!(
            "Generating certificate {} (CN={}, O={})",
            request.name, request.common_name, request.organization
        ));

        if !all_exist(&[&request.ca_cert, &request.ca_key]) {
            return Err(PkiError::storage(
                &request.ca_cert,
                format!("signing CA for {} is missing", request.name),
                std::io::Error::new(std::io::ErrorKind::NotFound, "CA certificate or key not found"),
            ));
        }
        let ca_cert = parse_cert(
            &read_to_string(&request.ca_cert, "CA certificate")?,
            &format!("CA certificate {}", request.ca_cert.display()),
        )?;
        let ca_key = parse_key(
            &read_to_string(&request.ca_key, "CA private key")?,
            &format!("CA private key {}", request.ca_key.display()),
        )?;

        let key = generate_private_key(KEY_SIZE, self.logger.as_mut())?;
        let cert = sign_certificate(request, &key, &ca_cert, &ca_key, self.logger.as_mut())?;

        let issued = IssuedCertificate {
            cert: cert_pem(&cert)?,
            key: private_key_pem(&key)?,
        };
        write_atomic(&key_path, issued.key.as_bytes(), KEY_MODE, Some(owner))?;
        write_atomic(&cert_path, issued.cert.as_bytes(), CERT_MODE, Some(owner))?;

        self.log(&format!(
            "Certificate {} written to {} (owner {})",
            request.name,
            cert_path.display(),
            owner.name
        ));
        Ok((issued, Provisioned::Generated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::logging::testing::MockLogger;
    use std::fs;
    use tempfile::TempDir;

    fn operations(dir: &TempDir) -> (CertificateOperations, MockLogger) {
        let logger = MockLogger::new();
        let ops = CertificateOperations::new(Box::new(logger.clone()), PkiPaths::new(dir.path()));
        (ops, logger)
    }

    fn admin_request(paths: &PkiPaths) -> CertificateRequest {
        CertificateRequest {
            name: "admin".to_string(),
            common_name: "kubernetes-admin".to_string(),
            organization: "system:masters".to_string(),
            ca_cert: paths.cert("ca"),
            ca_key: paths.key("ca"),
            hostnames: vec![],
        }
    }

    #[test]
    fn ensure_ca_generates_once() {
        let dir = TempDir::new().unwrap();
        let (mut ops, _) = operations(&dir);

        assert_eq!(ops.ensure_ca("ca", "kubernetes-ca").unwrap(), Provisioned::Generated);
        let first = fs::read(dir.path().join("ca.crt")).unwrap();

        assert_eq!(ops.ensure_ca("ca", "kubernetes-ca").unwrap(), Provisioned::Reused);
        assert_eq!(fs::read(dir.path().join("ca.crt")).unwrap(), first);
        assert!(dir.path().join("ca.key").exists());
    }

    #[test]
    fn ensure_ca_regenerates_when_a_file_is_missing() {
        let dir = TempDir::new().unwrap();
        let (mut ops, _) = operations(&dir);
        ops.ensure_ca("front-proxy-ca", "kubernetes-front-proxy-ca").unwrap();

        fs::remove_file(dir.path().join("front-proxy-ca.key")).unwrap();
        assert_eq!(
            ops.ensure_ca("front-proxy-ca", "kubernetes-front-proxy-ca").unwrap(),
            Provisioned::Generated
        );
    }

    #[test]
    fn ensure_certificate_returns_existing_material_without_resigning() {
        let dir = TempDir::new().unwrap();
        let (mut ops, logger) = operations(&dir);
        ops.ensure_ca("ca", "kubernetes-ca").unwrap();
        let request = admin_request(ops.paths());
        let owner = FileOwner::named("root");

        let (first, state) = ops.ensure_certificate(&request, &owner).unwrap();
        assert_eq!(state, Provisioned::Generated);

        let (second, state) = ops.ensure_certificate(&request, &owner).unwrap();
        assert_eq!(state, Provisioned::Reused);
        assert_eq!(first, second);
        assert_eq!(fs::read_to_string(dir.path().join("admin.crt")).unwrap(), first.cert);
        assert!(logger.lines().iter().any(|l| l.contains("admin already exists")));
    }

    #[test]
    fn ensure_certificate_fails_when_ca_is_missing() {
        let dir = TempDir::new().unwrap();
        let (mut ops, _) = operations(&dir);
        let request = admin_request(ops.paths());

        let err = ops
            .ensure_certificate(&request, &FileOwner::named("root"))
            .unwrap_err();
        assert!(matches!(err, PkiError::Storage { .. }));
        assert!(err.to_string().contains("ca.crt"));
        assert!(!dir.path().join("admin.crt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn keys_are_private_and_certs_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let (mut ops, _) = operations(&dir);
        ops.ensure_ca("ca", "kubernetes-ca").unwrap();
        let request = admin_request(ops.paths());
        ops.ensure_certificate(&request, &FileOwner::named("root")).unwrap();

        let mode = |p: &str| fs::metadata(dir.path().join(p)).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode("admin.key"), 0o600);
        assert_eq!(mode("admin.crt"), 0o644);
        assert_eq!(mode("ca.key"), 0o600);
    }
}
