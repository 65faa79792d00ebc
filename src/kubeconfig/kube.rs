use crate::error::{PkiError, Result};
use crate::utils::fs::{file_exists, write_atomic, FileOwner};
use crate::utils::logging::Logger;
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CLUSTER_NAME: &str = "local";
pub const CONTEXT_NAME: &str = "Default";
pub const USER_NAME: &str = "user";
pub const KUBECONFIG_MODE: u32 = 0o600;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct KubeConfig {
    #[serde(rename = "apiVersion")]
    pub api_version: String,
    pub clusters: Vec<NamedCluster>,
    pub contexts: Vec<NamedContext>,
    pub current_context: String,
    pub kind: String,
    #[serde(default)]
    pub preferences: Preferences,
    pub users: Vec<NamedUser>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Preferences {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedCluster {
    pub cluster: Cluster,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct Cluster {
    pub server: String,
    pub certificate_authority_data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedContext {
    pub context: Context,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Context {
    pub cluster: String,
    pub namespace: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedUser {
    pub name: String,
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct User {
    pub client_certificate_data: String,
    pub client_key_data: String,
}

impl KubeConfig {
    /// Single-cluster, single-user document with all PEM material inlined.
    pub fn new(api_url: &str, ca_cert: &str, client_cert: &str, client_key: &str) -> Self {
        let encode = |pem: &str| general_purpose::STANDARD.encode(pem.as_bytes());
        Self {
            api_version: "v1".to_string(),
            clusters: vec![NamedCluster {
                cluster: Cluster {
                    server: api_url.to_string(),
                    certificate_authority_data: encode(ca_cert),
                },
                name: CLUSTER_NAME.to_string(),
            }],
            contexts: vec![NamedContext {
                context: Context {
                    cluster: CLUSTER_NAME.to_string(),
                    namespace: "default".to_string(),
                    user: USER_NAME.to_string(),
                },
                name: CONTEXT_NAME.to_string(),
            }],
            current_context: CONTEXT_NAME.to_string(),
            kind: "Config".to_string(),
            preferences: Preferences::default(),
            users: vec![NamedUser {
                name: USER_NAME.to_string(),
                user: User {
                    client_certificate_data: encode(client_cert),
                    client_key_data: encode(client_key),
                },
            }],
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| PkiError::config(format!("failed to render kubeconfig: {}", e)))
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| PkiError::verification(format!("unreadable kubeconfig: {}", e)))
    }
}

/// Decodes one of the inline `*-data` fields back to PEM text.
pub fn decode_data(field: &str, value: &str) -> Result<String> {
    let bytes = general_purpose::STANDARD
        .decode(value)
        .map_err(|e| PkiError::verification(format!("{} is not valid base64: {}", field, e)))?;
    String::from_utf8(bytes)
        .map_err(|_| PkiError::verification(format!("{} does not decode to PEM text", field)))
}

pub struct KubeConfigGenerator<'a> {
    api_url: String,
    ca_cert: &'a str,
    owner: Option<FileOwner>,
}

impl<'a> KubeConfigGenerator<'a> {
    pub fn new(api_url: impl Into<String>, ca_cert: &'a str) -> Self {
        Self {
            api_url: api_url.into(),
            ca_cert,
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: FileOwner) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Writes a kubeconfig to `dest` unless something already lives there. The existing
    /// file is not read: an operator-edited kubeconfig must survive re-runs.
    pub fn write_kubeconfig(
        &self,
        dest: &Path,
        client_cert: &str,
        client_key: &str,
        logger: &mut dyn Logger,
    ) -> Result<bool> {
        if file_exists(dest) {
            logger.debug_log(&format!("Kubeconfig {} already exists, skipping", dest.display()));
            return Ok(false);
        }

        let yaml = KubeConfig::new(&self.api_url, self.ca_cert, client_cert, client_key).to_yaml()?;
        write_atomic(dest, yaml.as_bytes(), KUBECONFIG_MODE, self.owner.as_ref())?;

        logger.log(&format!("Kubeconfig written to {}", dest.display()));
        Ok(true)
    }
}
