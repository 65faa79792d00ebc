// src/cert/catalog.rs
//
// The fixed set of identities a control-plane node needs. Adding or removing an
// identity is an edit to CATALOG, not to the bootstrap sequence.

use super::types::CertificateRequest;
use crate::config::{
    ClusterConfig, PkiPaths, APISERVER_USER, CONTROLLER_MANAGER_USER, ROOT_USER, SCHEDULER_USER,
};
use crate::utils::fs::FileOwner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaSpec {
    pub name: &'static str,
    pub common_name: &'static str,
}

pub const ROOT_CA: CaSpec = CaSpec {
    name: "ca",
    common_name: "kubernetes-ca",
};

pub const FRONT_PROXY_CA: CaSpec = CaSpec {
    name: "front-proxy-ca",
    common_name: "kubernetes-front-proxy-ca",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Issuer {
    Root,
    FrontProxy,
}

impl Issuer {
    pub fn ca(self) -> CaSpec {
        match self {
            Issuer::Root => ROOT_CA,
            Issuer::FrontProxy => FRONT_PROXY_CA,
        }
    }
}

/// Which service identity owns the issued files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerRole {
    Root,
    Apiserver,
    ControllerManager,
    Scheduler,
    /// Taken from `api.mkeApiOwner` in the cluster config.
    MkeApi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub common_name: &'static str,
    pub organization: &'static str,
    pub issuer: Issuer,
    /// Server certificates get the full SAN set.
    pub server: bool,
    pub owner: OwnerRole,
    pub kubeconfig: Option<&'static str>,
}

pub const CATALOG: [CatalogEntry; 7] = [
    CatalogEntry {
        name: "front-proxy-client",
        common_name: "front-proxy-client",
        organization: "front-proxy-client",
        issuer: Issuer::FrontProxy,
        server: false,
        owner: OwnerRole::Apiserver,
        kubeconfig: None,
    },
    CatalogEntry {
        name: "admin",
        common_name: "kubernetes-admin",
        organization: "system:masters",
        issuer: Issuer::Root,
        server: false,
        owner: OwnerRole::Root,
        kubeconfig: Some("admin.conf"),
    },
    CatalogEntry {
        name: "ccm",
        common_name: "system:kube-controller-manager",
        organization: "system:kube-controller-manager",
        issuer: Issuer::Root,
        server: false,
        owner: OwnerRole::ControllerManager,
        kubeconfig: Some("ccm.conf"),
    },
    CatalogEntry {
        name: "scheduler",
        common_name: "system:kube-scheduler",
        organization: "system:kube-scheduler",
        issuer: Issuer::Root,
        server: false,
        owner: OwnerRole::Scheduler,
        kubeconfig: Some("scheduler.conf"),
    },
    CatalogEntry {
        name: "apiserver-kubelet-client",
        common_name: "apiserver-kubelet-client",
        organization: "system:masters",
        issuer: Issuer::Root,
        server: false,
        owner: OwnerRole::Apiserver,
        kubeconfig: None,
    },
    CatalogEntry {
        name: "server",
        common_name: "kubernetes",
        organization: "kubernetes",
        issuer: Issuer::Root,
        server: true,
        owner: OwnerRole::Apiserver,
        kubeconfig: None,
    },
    CatalogEntry {
        name: "mke-api",
        common_name: "mke-api",
        organization: "kubernetes",
        issuer: Issuer::Root,
        server: true,
        owner: OwnerRole::MkeApi,
        kubeconfig: None,
    },
];

pub fn entry(name: &str) -> Option<&'static CatalogEntry> {
    CATALOG.iter().find(|e| e.name == name)
}

impl CatalogEntry {
    pub fn request(&self, paths: &PkiPaths, hostnames: &[String]) -> CertificateRequest {
        let ca = self.issuer.ca();
        CertificateRequest {
            name: self.name.to_string(),
            common_name: self.common_name.to_string(),
            organization: self.organization.to_string(),
            ca_cert: paths.cert(ca.name),
            ca_key: paths.key(ca.name),
            hostnames: if self.server { hostnames.to_vec() } else { Vec::new() },
        }
    }

    pub fn owner(&self, config: &ClusterConfig) -> FileOwner {
        let name = match self.owner {
            OwnerRole::Root => ROOT_USER,
            OwnerRole::Apiserver => APISERVER_USER,
            OwnerRole::ControllerManager => CONTROLLER_MANAGER_USER,
            OwnerRole::Scheduler => SCHEDULER_USER,
            OwnerRole::MkeApi => config.api.mke_api_owner.as_str(),
        };
        config.owner(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn names_never_collide_across_identities() {
        let mut seen: HashMap<&str, (&str, &str)> = HashMap::new();
        for e in CATALOG.iter() {
            let identity = (e.common_name, e.organization);
            if let Some(previous) = seen.insert(e.name, identity) {
                panic!("{} declared twice ({:?} vs {:?})", e.name, previous, identity);
            }
        }
        assert!(!seen.contains_key(ROOT_CA.name));
        assert!(!seen.contains_key(FRONT_PROXY_CA.name));
    }

    #[test]
    fn kubeconfig_targets_are_admin_ccm_and_scheduler() {
        let targets: HashSet<_> = CATALOG.iter().filter_map(|e| e.kubeconfig).collect();
        assert_eq!(
            targets,
            ["admin.conf", "ccm.conf", "scheduler.conf"].into_iter().collect()
        );
    }

    #[test]
    fn only_server_rows_receive_sans() {
        let paths = PkiPaths::new("/pki");
        let sans = vec!["kubernetes".to_string(), "10.96.0.1".to_string()];

        for e in CATALOG.iter() {
            let request = e.request(&paths, &sans);
            assert_eq!(request.is_server(), e.server, "{}", e.name);
        }
        let server = entry("server").unwrap().request(&paths, &sans);
        assert_eq!(server.hostnames, sans);
        assert_eq!(server.ca_cert, PkiPaths::new("/pki").cert("ca"));
    }

    #[test]
    fn front_proxy_client_is_signed_by_front_proxy_ca() {
        let request = entry("front-proxy-client")
            .unwrap()
            .request(&PkiPaths::new("/pki"), &[]);
        assert!(request.ca_cert.ends_with("front-proxy-ca.crt"));
        assert!(request.ca_key.ends_with("front-proxy-ca.key"));
    }

    #[test]
    fn mke_api_owner_follows_config() {
        let mut config = ClusterConfig::new("10.0.0.5");
        assert_eq!(entry("mke-api").unwrap().owner(&config).name, "kube-apiserver");

        config.api.mke_api_owner = "mke-api".to_string();
        assert_eq!(entry("mke-api").unwrap().owner(&config).name, "mke-api");
        assert_eq!(entry("admin").unwrap().owner(&config).name, "root");
    }
}
