// src/cert/openssl.rs
use super::types::CertificateRequest;
use crate::error::{CryptoContext, Result};
use crate::utils::logging::Logger;
use openssl::{
    asn1::Asn1Time,
    bn::{BigNum, MsbOption},
    hash::MessageDigest,
    nid::Nid,
    pkey::{PKey, Private},
    rsa::Rsa,
    x509::{
        extension::{
            AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
            SubjectAlternativeName, SubjectKeyIdentifier,
        },
        X509Builder, X509Name, X509NameBuilder, X509Ref, X509,
    },
};
use std::net::IpAddr;

pub const KEY_SIZE: u32 = 2048;
pub const CA_VALIDITY_DAYS: u32 = 3650;
pub const LEAF_VALIDITY_DAYS: u32 = 375;

pub fn generate_private_key(key_size: u32, logger: &mut dyn Logger) -> Result<Rsa<Private>> {
    logger.debug_log(&format!("Generating {}-bit RSA key", key_size));
    Rsa::generate(key_size).crypto_context("failed to generate RSA key")
}

/// PKCS#1 `RSA PRIVATE KEY` block.
pub fn private_key_pem(key: &Rsa<Private>) -> Result<String> {
    let pem = key
        .private_key_to_pem()
        .crypto_context("failed to encode private key")?;
    Ok(String::from_utf8_lossy(&pem).into_owned())
}

/// PKIX `PUBLIC KEY` block.
pub fn public_key_pem(key: &Rsa<Private>) -> Result<String> {
    let pem = key
        .public_key_to_pem()
        .crypto_context("failed to encode public key")?;
    Ok(String::from_utf8_lossy(&pem).into_owned())
}

pub fn cert_pem(cert: &X509) -> Result<String> {
    let pem = cert.to_pem().crypto_context("failed to encode certificate")?;
    Ok(String::from_utf8_lossy(&pem).into_owned())
}

pub fn parse_cert(pem: &str, what: &str) -> Result<X509> {
    X509::from_pem(pem.as_bytes()).crypto_context(format!("failed to parse {}", what))
}

pub fn parse_key(pem: &str, what: &str) -> Result<PKey<Private>> {
    PKey::private_key_from_pem(pem.as_bytes()).crypto_context(format!("failed to parse {}", what))
}

fn subject_name(common_name: &str, organization: Option<&str>) -> Result<X509Name> {
    let mut name = X509NameBuilder::new().crypto_context("failed to create subject")?;
    if let Some(o) = organization {
        name.append_entry_by_nid(Nid::ORGANIZATIONNAME, o)
            .crypto_context(format!("invalid organization {:?}", o))?;
    }
    name.append_entry_by_nid(Nid::COMMONNAME, common_name)
        .crypto_context(format!("invalid common name {:?}", common_name))?;
    Ok(name.build())
}

fn new_builder(validity_days: u32, context: &str) -> Result<X509Builder> {
    let mut builder = X509Builder::new().crypto_context(context)?;
    builder.set_version(2).crypto_context(context)?;

    let serial = {
        let mut serial = BigNum::new().crypto_context(context)?;
        serial
            .rand(128, MsbOption::MAYBE_ZERO, false)
            .crypto_context(context)?;
        serial.to_asn1_integer().crypto_context(context)?
    };
    builder.set_serial_number(&serial).crypto_context(context)?;

    let not_before = Asn1Time::days_from_now(0).crypto_context(context)?;
    let not_after = Asn1Time::days_from_now(validity_days).crypto_context(context)?;
    builder.set_not_before(&not_before).crypto_context(context)?;
    builder.set_not_after(&not_after).crypto_context(context)?;
    Ok(builder)
}

/// Self-signed CA certificate for `common_name`.
pub fn build_ca(common_name: &str, key: &Rsa<Private>, logger: &mut dyn Logger) -> Result<X509> {
    let context = format!("failed to build CA {}", common_name);
    logger.debug_log(&format!("Self-signing CA certificate: CN={}", common_name));

    let pkey = PKey::from_rsa(key.clone()).crypto_context(&context)?;
    let name = subject_name(common_name, None)?;

    let mut builder = new_builder(CA_VALIDITY_DAYS, &context)?;
    builder.set_subject_name(&name).crypto_context(&context)?;
    builder.set_issuer_name(&name).crypto_context(&context)?;
    builder.set_pubkey(&pkey).crypto_context(&context)?;

    let basic_constraints = BasicConstraints::new()
        .critical()
        .ca()
        .build()
        .crypto_context(&context)?;
    builder.append_extension(basic_constraints).crypto_context(&context)?;

    let key_usage = KeyUsage::new()
        .critical()
        .digital_signature()
        .key_encipherment()
        .key_cert_sign()
        .crl_sign()
        .build()
        .crypto_context(&context)?;
    builder.append_extension(key_usage).crypto_context(&context)?;

    let ski = SubjectKeyIdentifier::new()
        .build(&builder.x509v3_context(None, None))
        .crypto_context(&context)?;
    builder.append_extension(ski).crypto_context(&context)?;

    builder
        .sign(&pkey, MessageDigest::sha256())
        .crypto_context(&context)?;
    Ok(builder.build())
}

/// Signs a leaf certificate for `request` with the given CA.
///
/// SANs that parse as IP addresses become IP entries, everything else a DNS entry.
pub fn sign_certificate(
    request: &CertificateRequest,
    key: &Rsa<Private>,
    ca_cert: &X509Ref,
    ca_key: &PKey<Private>,
    logger: &mut dyn Logger,
) -> Result<X509> {
    let context = format!("failed to sign certificate {}", request.name);
    logger.debug_log(&format!(
        "Signing {}: CN={} O={} SANs={:?}",
        request.name, request.common_name, request.organization, request.hostnames
    ));

    let pkey = PKey::from_rsa(key.clone()).crypto_context(&context)?;
    let name = subject_name(&request.common_name, Some(&request.organization))?;

    let mut builder = new_builder(LEAF_VALIDITY_DAYS, &context)?;
    builder.set_subject_name(&name).crypto_context(&context)?;
    builder
        .set_issuer_name(ca_cert.subject_name())
        .crypto_context(&context)?;
    builder.set_pubkey(&pkey).crypto_context(&context)?;

    let basic_constraints = BasicConstraints::new()
        .critical()
        .build()
        .crypto_context(&context)?;
    builder.append_extension(basic_constraints).crypto_context(&context)?;

    let key_usage = KeyUsage::new()
        .critical()
        .digital_signature()
        .key_encipherment()
        .build()
        .crypto_context(&context)?;
    builder.append_extension(key_usage).crypto_context(&context)?;

    let mut eku = ExtendedKeyUsage::new();
    eku.client_auth();
    if request.is_server() {
        eku.server_auth();
    }
    let eku = eku.build().crypto_context(&context)?;
    builder.append_extension(eku).crypto_context(&context)?;

    let aki = AuthorityKeyIdentifier::new()
        .keyid(false)
        .build(&builder.x509v3_context(Some(ca_cert), None))
        .crypto_context(&context)?;
    builder.append_extension(aki).crypto_context(&context)?;

    if request.is_server() {
        let mut san = SubjectAlternativeName::new();
        for host in &request.hostnames {
            if host.parse::<IpAddr>().is_ok() {
                san.ip(host);
            } else {
                san.dns(host);
            }
        }
        let san = san
            .build(&builder.x509v3_context(Some(ca_cert), None))
            .crypto_context(&context)?;
        builder.append_extension(san).crypto_context(&context)?;
    }

    builder
        .sign(ca_key, MessageDigest::sha256())
        .crypto_context(&context)?;
    Ok(builder.build())
}
