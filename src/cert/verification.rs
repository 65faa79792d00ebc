// src/cert/verification.rs
use super::catalog::{CaSpec, CatalogEntry, CATALOG, FRONT_PROXY_CA, ROOT_CA};
use super::hostnames::resolve_sans;
use super::openssl::parse_cert;
use crate::config::{ClusterConfig, PkiPaths};
use crate::error::{CryptoContext, PkiError, Result};
use crate::kubeconfig::{decode_data, KubeConfig};
use crate::utils::fs::{file_exists, read_to_string};
use crate::utils::logging::Logger;
use openssl::{hash::MessageDigest, pkey::PKey, rsa::Rsa};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use x509_parser::{extensions::GeneralName, pem::parse_x509_pem};

/// The parts of a certificate the bootstrap binds identities to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertSummary {
    pub common_name: String,
    pub organizations: Vec<String>,
    pub subject_raw: Vec<u8>,
    pub issuer_raw: Vec<u8>,
    pub dns_names: Vec<String>,
    pub ip_addresses: Vec<IpAddr>,
}

impl CertSummary {
    pub fn from_pem(pem: &str, what: &str) -> Result<Self> {
        let (_, pem) = parse_x509_pem(pem.as_bytes())
            .map_err(|e| PkiError::verification(format!("{} is not PEM: {}", what, e)))?;
        let cert = pem
            .parse_x509()
            .map_err(|e| PkiError::verification(format!("{} is not an X.509 certificate: {}", what, e)))?;

        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or_default()
            .to_string();
        let organizations = cert
            .subject()
            .iter_organization()
            .filter_map(|o| o.as_str().ok())
            .map(str::to_string)
            .collect();

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        Ok(Self {
            common_name,
            organizations,
            subject_raw: cert.subject().as_raw().to_vec(),
            issuer_raw: cert.issuer().as_raw().to_vec(),
            dns_names,
            ip_addresses,
        })
    }

    pub fn covers(&self, hostname: &str) -> bool {
        match hostname.parse::<IpAddr>() {
            Ok(ip) => self.ip_addresses.contains(&ip),
            Err(_) => self.dns_names.iter().any(|d| d == hostname),
        }
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedArtifact {
    pub name: String,
    pub fingerprint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct VerificationReport {
    pub artifacts: Vec<VerifiedArtifact>,
}

/// Read-only audit of a PKI root against the catalog.
pub struct CertificateVerifier<'a> {
    paths: &'a PkiPaths,
    config: &'a ClusterConfig,
    logger: &'a mut dyn Logger,
}

impl<'a> CertificateVerifier<'a> {
    pub fn new(paths: &'a PkiPaths, config: &'a ClusterConfig, logger: &'a mut dyn Logger) -> Self {
        Self {
            paths,
            config,
            logger,
        }
    }

    pub fn verify_all(&mut self) -> Result<VerificationReport> {
        let mut report = VerificationReport::default();
        let sans = resolve_sans(self.config)?;

        for ca in [ROOT_CA, FRONT_PROXY_CA] {
            report.artifacts.push(self.verify_ca(ca)?);
        }
        for entry in CATALOG.iter() {
            report.artifacts.push(self.verify_certificate(entry, &sans)?);
            if let Some(file_name) = entry.kubeconfig {
                report.artifacts.push(self.verify_kubeconfig(entry, file_name)?);
            }
        }
        report
            .artifacts
            .push(self.verify_service_account_keypair("sa")?);

        self.logger.log(&format!(
            "Verified {} artifacts under {}",
            report.artifacts.len(),
            self.paths.root().display()
        ));
        Ok(report)
    }

    pub fn verify_ca(&mut self, ca: CaSpec) -> Result<VerifiedArtifact> {
        let pem = read_to_string(&self.paths.cert(ca.name), "CA certificate")?;
        let summary = CertSummary::from_pem(&pem, ca.name)?;
        if summary.common_name != ca.common_name {
            return Err(PkiError::verification(format!(
                "{} has CN {:?}, expected {:?}",
                ca.name, summary.common_name, ca.common_name
            )));
        }
        if summary.issuer_raw != summary.subject_raw {
            return Err(PkiError::verification(format!("{} is not self-signed", ca.name)));
        }

        let cert = parse_cert(&pem, ca.name)?;
        let key = read_to_string(&self.paths.key(ca.name), "CA private key")?;
        let key = PKey::private_key_from_pem(key.as_bytes())
            .crypto_context(format!("failed to parse {} private key", ca.name))?;
        let public = cert
            .public_key()
            .crypto_context(format!("failed to read {} public key", ca.name))?;
        if !public.public_eq(&key) {
            return Err(PkiError::verification(format!(
                "{} certificate does not match its private key",
                ca.name
            )));
        }

        self.logger.debug_log(&format!("CA {} verified", ca.name));
        Ok(VerifiedArtifact {
            name: format!("{}.crt", ca.name),
            fingerprint: Some(fingerprint(&cert)?),
        })
    }

    pub fn verify_certificate(&mut self, entry: &CatalogEntry, sans: &[String]) -> Result<VerifiedArtifact> {
        let ca = entry.issuer.ca();
        let pem = read_to_string(&self.paths.cert(entry.name), "certificate")?;
        let summary = CertSummary::from_pem(&pem, entry.name)?;

        if summary.common_name != entry.common_name {
            return Err(PkiError::verification(format!(
                "{} has CN {:?}, expected {:?}",
                entry.name, summary.common_name, entry.common_name
            )));
        }
        if summary.organizations != [entry.organization] {
            return Err(PkiError::verification(format!(
                "{} has O {:?}, expected {:?}",
                entry.name, summary.organizations, entry.organization
            )));
        }

        let ca_pem = read_to_string(&self.paths.cert(ca.name), "CA certificate")?;
        let ca_summary = CertSummary::from_pem(&ca_pem, ca.name)?;
        if summary.issuer_raw != ca_summary.subject_raw {
            return Err(PkiError::verification(format!(
                "{} was not issued by {}",
                entry.name, ca.name
            )));
        }

        let cert = parse_cert(&pem, entry.name)?;
        let ca_cert = parse_cert(&ca_pem, ca.name)?;
        let ca_public = ca_cert
            .public_key()
            .crypto_context(format!("failed to read {} public key", ca.name))?;
        let signed = cert
            .verify(&ca_public)
            .crypto_context(format!("failed to check {} signature", entry.name))?;
        if !signed {
            return Err(PkiError::verification(format!(
                "{} signature does not verify against {}",
                entry.name, ca.name
            )));
        }

        if entry.server {
            if let Some(missing) = sans.iter().find(|h| !summary.covers(h)) {
                return Err(PkiError::verification(format!(
                    "{} does not cover SAN {}",
                    entry.name, missing
                )));
            }
        }

        self.logger.debug_log(&format!("Certificate {} verified", entry.name));
        Ok(VerifiedArtifact {
            name: format!("{}.crt", entry.name),
            fingerprint: Some(fingerprint(&cert)?),
        })
    }

    pub fn verify_kubeconfig(&mut self, entry: &CatalogEntry, file_name: &str) -> Result<VerifiedArtifact> {
        let path = self.paths.kubeconfig(file_name);
        let config = KubeConfig::from_yaml(&read_to_string(&path, "kubeconfig")?)?;

        let (cluster, user) = match (config.clusters.first(), config.users.first()) {
            (Some(c), Some(u)) => (&c.cluster, &u.user),
            _ => {
                return Err(PkiError::verification(format!(
                    "{} has no cluster or user entry",
                    file_name
                )))
            }
        };

        let expected = [
            (
                "certificate-authority-data",
                &cluster.certificate_authority_data,
                self.paths.cert(ROOT_CA.name),
            ),
            (
                "client-certificate-data",
                &user.client_certificate_data,
                self.paths.cert(entry.name),
            ),
            ("client-key-data", &user.client_key_data, self.paths.key(entry.name)),
        ];
        for (field, data, source) in expected {
            let decoded = decode_data(field, data)?;
            if decoded != read_to_string(&source, field)? {
                return Err(PkiError::verification(format!(
                    "{} {} does not match {}",
                    file_name,
                    field,
                    source.display()
                )));
            }
        }

        self.logger.debug_log(&format!("Kubeconfig {} verified", file_name));
        Ok(VerifiedArtifact {
            name: file_name.to_string(),
            fingerprint: None,
        })
    }

    pub fn verify_service_account_keypair(&mut self, name: &str) -> Result<VerifiedArtifact> {
        let key_path = self.paths.key(name);
        let pub_path = self.paths.public_key(name);
        if !file_exists(&key_path) || !file_exists(&pub_path) {
            return Err(PkiError::verification(format!(
                "service account keypair {} is incomplete",
                name
            )));
        }

        let private = Rsa::private_key_from_pem(read_to_string(&key_path, "service account key")?.as_bytes())
            .crypto_context(format!("failed to parse {}", key_path.display()))?;
        if !private.check_key().crypto_context("service account key check failed")? {
            return Err(PkiError::verification(format!("{} is not a valid RSA key", name)));
        }
        let derived = private
            .public_key_to_pem()
            .crypto_context("failed to derive service account public key")?;
        let stored = read_to_string(&pub_path, "service account public key")?;
        if derived != stored.as_bytes() {
            return Err(PkiError::verification(format!(
                "{} does not match the public half of {}",
                pub_path.display(),
                key_path.display()
            )));
        }

        self.logger
            .log("Service account key pair verification successful");
        Ok(VerifiedArtifact {
            name: format!("{}.pub", name),
            fingerprint: None,
        })
    }
}

fn fingerprint(cert: &openssl::x509::X509Ref) -> Result<String> {
    let digest = cert
        .digest(MessageDigest::sha256())
        .crypto_context("failed to fingerprint certificate")?;
    Ok(hex::encode(digest))
}
