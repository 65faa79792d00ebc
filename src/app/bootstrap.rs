// src/app/bootstrap.rs
use crate::cert::catalog::{self, CaSpec, CatalogEntry, FRONT_PROXY_CA, ROOT_CA};
use crate::cert::{resolve_sans, CertificateManager, Provisioned, ServiceAccountGenerator};
use crate::config::{ClusterConfig, PkiPaths};
use crate::error::{PkiError, Result};
use crate::kubeconfig::KubeConfigGenerator;
use crate::utils::fs::read_to_string;
use crate::utils::logging::Logger;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative cancellation, honoured between steps only.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, step: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(PkiError::Cancelled {
                step: step.to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    EnsureCa(CaSpec),
    LoadRootCa,
    /// Catalog row by name; writes its kubeconfig right after when the row has one.
    Issue(&'static str),
    ServiceAccountKeyPair(&'static str),
    ResolveSans,
}

pub const PLAN: [Step; 12] = [
    Step::EnsureCa(ROOT_CA),
    Step::EnsureCa(FRONT_PROXY_CA),
    Step::LoadRootCa,
    Step::Issue("front-proxy-client"),
    Step::Issue("admin"),
    Step::ServiceAccountKeyPair("sa"),
    Step::Issue("ccm"),
    Step::Issue("scheduler"),
    Step::Issue("apiserver-kubelet-client"),
    Step::ResolveSans,
    Step::Issue("server"),
    Step::Issue("mke-api"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub artifact: String,
    pub state: Provisioned,
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapReport {
    pub outcomes: Vec<StepOutcome>,
}

impl BootstrapReport {
    fn record(&mut self, artifact: impl Into<String>, state: Provisioned) {
        self.outcomes.push(StepOutcome {
            artifact: artifact.into(),
            state,
        });
    }

    pub fn generated(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.state == Provisioned::Generated)
            .map(|o| o.artifact.as_str())
    }
}

/// Control-plane PKI component: one idempotent pass over [`PLAN`].
pub struct Certificates<M: CertificateManager> {
    manager: M,
    config: ClusterConfig,
    paths: PkiPaths,
    logger: Box<dyn Logger>,
    ca_cert: Option<String>,
}

impl<M: CertificateManager> Certificates<M> {
    pub fn new(manager: M, config: ClusterConfig, paths: PkiPaths, logger: Box<dyn Logger>) -> Self {
        Self {
            manager,
            config,
            paths,
            logger,
            ca_cert: None,
        }
    }

    /// Runs every step in order and stops at the first failure. Finished artifacts stay
    /// on disk and are picked up as-is by the next run.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<BootstrapReport> {
        self.config.validate()?;
        let api_url = self.config.api_url();

        self.logger.log(&format!(
            "Bootstrapping control-plane PKI in {}",
            self.paths.root().display()
        ));

        let mut report = BootstrapReport::default();
        let mut sans: Option<Vec<String>> = None;

        for step in PLAN {
            match step {
                Step::EnsureCa(ca) => {
                    cancel.check(&format!("ensure CA {}", ca.name))?;
                    let state = self.manager.ensure_ca(ca.name, ca.common_name)?;
                    report.record(format!("{}.crt", ca.name), state);
                }
                Step::LoadRootCa => {
                    // Kubeconfigs embed the root CA, so it has to be readable now.
                    let pem = read_to_string(&self.paths.cert(ROOT_CA.name), "root CA certificate")?;
                    self.ca_cert = Some(pem);
                }
                Step::Issue(name) => {
                    let entry = catalog::entry(name).ok_or_else(|| {
                        PkiError::config(format!("no catalog entry named {}", name))
                    })?;
                    if entry.server && sans.is_none() {
                        sans = Some(resolve_sans(&self.config)?);
                    }
                    self.issue(entry, sans.as_deref().unwrap_or(&[]), &api_url, cancel, &mut report)?;
                }
                Step::ServiceAccountKeyPair(name) => {
                    cancel.check(&format!("ensure keypair {}", name))?;
                    let state = ServiceAccountGenerator::new(&self.paths, self.logger.as_mut())
                        .ensure_key_pair(name)?;
                    report.record(format!("{}.key", name), state);
                }
                Step::ResolveSans => {
                    let resolved = resolve_sans(&self.config)?;
                    self.logger
                        .debug_log(&format!("Server certificate SANs: {}", resolved.join(", ")));
                    sans = Some(resolved);
                }
            }
        }

        let generated = report.generated().count();
        self.logger.log(&format!(
            "PKI bootstrap complete: {} generated, {} reused",
            generated,
            report.outcomes.len() - generated
        ));
        Ok(report)
    }

    fn issue(
        &mut self,
        entry: &CatalogEntry,
        sans: &[String],
        api_url: &str,
        cancel: &CancelToken,
        report: &mut BootstrapReport,
    ) -> Result<()> {
        cancel.check(&format!("ensure certificate {}", entry.name))?;
        let request = entry.request(&self.paths, sans);
        let owner = entry.owner(&self.config);
        let (issued, state) = self.manager.ensure_certificate(&request, &owner)?;
        report.record(format!("{}.crt", entry.name), state);

        let Some(file_name) = entry.kubeconfig else {
            return Ok(());
        };

        cancel.check(&format!("write kubeconfig {}", file_name))?;
        let ca_cert = self.ca_cert.as_deref().ok_or_else(|| {
            PkiError::storage(
                self.paths.cert(ROOT_CA.name),
                "root CA certificate not loaded before kubeconfig generation",
                std::io::Error::new(std::io::ErrorKind::NotFound, "root CA not loaded"),
            )
        })?;
        let written = KubeConfigGenerator::new(api_url, ca_cert)
            .with_owner(owner)
            .write_kubeconfig(
                &self.paths.kubeconfig(file_name),
                &issued.cert,
                &issued.key,
                self.logger.as_mut(),
            )?;
        let state = if written {
            Provisioned::Generated
        } else {
            Provisioned::Reused
        };
        report.record(file_name, state);
        Ok(())
    }

    /// Bootstrap material outlives the process; nothing to tear down.
    pub fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}
