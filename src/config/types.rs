// config/types.rs
use crate::error::{PkiError, Result};
use crate::utils::fs::FileOwner;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    path::{Path, PathBuf},
};

pub const DEFAULT_API_PORT: u16 = 6443;
pub const DEFAULT_SERVICE_CIDR: &str = "10.96.0.0/12";

pub const APISERVER_USER: &str = "kube-apiserver";
pub const CONTROLLER_MANAGER_USER: &str = "kube-controller-manager";
pub const SCHEDULER_USER: &str = "kube-scheduler";
pub const ROOT_USER: &str = "root";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApiSpec {
    pub address: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
    #[serde(default)]
    pub sans: Vec<String>,
    /// Identity owning the `mke-api` certificate files.
    #[serde(default = "default_mke_api_owner")]
    pub mke_api_owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    #[serde(default = "default_service_cidr")]
    pub service_cidr: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerIds {
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterConfig {
    pub api: ApiSpec,
    #[serde(default)]
    pub network: NetworkSpec,
    #[serde(default)]
    pub owners: BTreeMap<String, OwnerIds>,
}

fn default_api_port() -> u16 {
    DEFAULT_API_PORT
}

fn default_service_cidr() -> String {
    DEFAULT_SERVICE_CIDR.to_string()
}

fn default_mke_api_owner() -> String {
    APISERVER_USER.to_string()
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            service_cidr: default_service_cidr(),
        }
    }
}

impl NetworkSpec {
    /// First host address of the service CIDR, which the apiserver's in-cluster
    /// `kubernetes` Service is assigned.
    pub fn internal_api_address(&self) -> Result<String> {
        let cidr = self.service_cidr.trim();
        let net: IpNet = cidr
            .parse()
            .map_err(|e| PkiError::config(format!("service CIDR {:?} is invalid: {}", cidr, e)))?;

        // Only the canonical decimal prefix is accepted ("/12", not "/012" or "/+12").
        let canonical = cidr
            .rsplit_once('/')
            .map_or(false, |(_, prefix)| prefix == net.prefix_len().to_string());
        if !canonical {
            return Err(PkiError::config(format!(
                "service CIDR {:?} has a malformed prefix length",
                cidr
            )));
        }
        if net.prefix_len() == net.max_prefix_len() {
            return Err(PkiError::config(format!(
                "service CIDR {} has no host addresses",
                cidr
            )));
        }

        let first = match net {
            IpNet::V4(v4) => IpAddr::V4(Ipv4Addr::from(u32::from(v4.network()) | 1)),
            IpNet::V6(v6) => IpAddr::V6(Ipv6Addr::from(u128::from(v6.network()) | 1)),
        };
        Ok(first.to_string())
    }
}

impl ClusterConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            api: ApiSpec {
                address: address.into(),
                port: DEFAULT_API_PORT,
                sans: Vec::new(),
                mke_api_owner: default_mke_api_owner(),
            },
            network: NetworkSpec::default(),
            owners: BTreeMap::new(),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let config_str = fs::read_to_string(path)
            .map_err(|e| PkiError::config(format!("failed to read {}: {}", path.display(), e)))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            serde_yaml::from_str(&config_str)
                .map_err(|e| PkiError::config(format!("invalid YAML in {}: {}", path.display(), e)))
        } else {
            serde_json::from_str(&config_str)
                .map_err(|e| PkiError::config(format!("invalid JSON in {}: {}", path.display(), e)))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.address.trim().is_empty() {
            return Err(PkiError::config("api.address must not be empty"));
        }
        if let Some(i) = self.api.sans.iter().position(|s| s.trim().is_empty()) {
            return Err(PkiError::config(format!("api.sans[{}] is empty", i)));
        }
        if self.api.mke_api_owner.trim().is_empty() {
            return Err(PkiError::config("api.mkeApiOwner must not be empty"));
        }
        self.network.internal_api_address()?;
        Ok(())
    }

    /// Local apiserver endpoint written into every kubeconfig.
    pub fn api_url(&self) -> String {
        format!("https://localhost:{}", self.api.port)
    }

    /// Resolves a service identity to the uid/gid configured for it, if any.
    pub fn owner(&self, name: &str) -> FileOwner {
        match self.owners.get(name) {
            Some(ids) => FileOwner {
                name: name.to_string(),
                uid: Some(ids.uid),
                gid: Some(ids.gid),
            },
            None => FileOwner::named(name),
        }
    }
}

/// Where every artifact lives. Passed explicitly so each test can use its own root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiPaths {
    root: PathBuf,
}

impl PkiPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cert(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.crt", name))
    }

    pub fn key(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.key", name))
    }

    pub fn public_key(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.pub", name))
    }

    pub fn kubeconfig(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn network(cidr: &str) -> NetworkSpec {
        NetworkSpec {
            service_cidr: cidr.to_string(),
        }
    }

    #[test]
    fn internal_api_address_is_first_host_of_service_cidr() {
        assert_eq!(network("10.96.0.0/12").internal_api_address().unwrap(), "10.96.0.1");
        assert_eq!(network("10.100.5.7/16").internal_api_address().unwrap(), "10.100.0.1");
        assert_eq!(network("fd00:10:96::/108").internal_api_address().unwrap(), "fd00:10:96::1");
    }

    #[test]
    fn internal_api_address_rejects_malformed_cidr() {
        for bad in [
            "10.96.0.0",
            "10.96.0.0/33",
            "banana/12",
            "10.96.0.0/x",
            "10.0.0.1/32",
            "fd00::1/128",
            "10.96.0.0/+12",
            "10.96.0.0/012",
            "10.96.0.0/12/4",
        ] {
            let err = network(bad).internal_api_address().unwrap_err();
            assert!(matches!(err, PkiError::Configuration(_)), "{} -> {:?}", bad, err);
        }
    }

    #[test]
    fn validate_rejects_empty_address_and_sans() {
        let mut config = ClusterConfig::new("");
        assert!(matches!(config.validate(), Err(PkiError::Configuration(_))));

        config.api.address = "10.0.0.5".to_string();
        config.api.sans = vec!["ok.example.com".to_string(), " ".to_string()];
        assert!(matches!(config.validate(), Err(PkiError::Configuration(_))));

        config.api.sans.pop();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_json_and_yaml_with_defaults() {
        let dir = TempDir::new().unwrap();

        let json = dir.path().join("cluster.json");
        fs::write(&json, r#"{"api": {"address": "10.0.0.5", "sans": ["foo.example.com"]}}"#).unwrap();
        let from_json = ClusterConfig::load_from_file(&json).unwrap();
        assert_eq!(from_json.api.port, 6443);
        assert_eq!(from_json.api.mke_api_owner, "kube-apiserver");
        assert_eq!(from_json.network.service_cidr, "10.96.0.0/12");

        let yaml = dir.path().join("cluster.yaml");
        fs::write(
            &yaml,
            "api:\n  address: 10.0.0.5\n  sans: [foo.example.com]\nnetwork:\n  serviceCidr: 10.128.0.0/16\nowners:\n  kube-apiserver: {uid: 998, gid: 998}\n",
        )
        .unwrap();
        let from_yaml = ClusterConfig::load_from_file(&yaml).unwrap();
        assert_eq!(from_yaml.api.sans, vec!["foo.example.com"]);
        assert_eq!(from_yaml.network.internal_api_address().unwrap(), "10.128.0.1");
        assert_eq!(from_yaml.owner("kube-apiserver").uid, Some(998));
        assert_eq!(from_yaml.owner("kube-scheduler").uid, None);
    }

    #[test]
    fn api_url_uses_local_endpoint() {
        let mut config = ClusterConfig::new("10.0.0.5");
        assert_eq!(config.api_url(), "https://localhost:6443");
        config.api.port = 7443;
        assert_eq!(config.api_url(), "https://localhost:7443");
    }
}
