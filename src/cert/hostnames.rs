// src/cert/hostnames.rs
use crate::config::ClusterConfig;
use crate::error::Result;

/// In-cluster names and loopback aliases every apiserver certificate must cover.
pub const DEFAULT_HOSTNAMES: [&str; 7] = [
    "kubernetes",
    "kubernetes.default",
    "kubernetes.default.svc",
    "kubernetes.default.svc.cluster",
    "kubernetes.svc.cluster.local",
    "127.0.0.1",
    "localhost",
];

/// SAN list for server certificates: defaults, advertise address, extra SANs, then the
/// internal API service address. Duplicates are kept; order is stable.
pub fn resolve_sans(config: &ClusterConfig) -> Result<Vec<String>> {
    let internal = config.network.internal_api_address()?;

    let mut hostnames: Vec<String> = DEFAULT_HOSTNAMES.iter().map(|h| h.to_string()).collect();
    hostnames.push(config.api.address.clone());
    hostnames.extend(config.api.sans.iter().cloned());
    hostnames.push(internal);
    Ok(hostnames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PkiError;

    #[test]
    fn resolves_in_documented_order() {
        let mut config = ClusterConfig::new("10.0.0.5");
        config.api.sans = vec!["foo.example.com".to_string()];
        config.network.service_cidr = "10.96.0.0/12".to_string();

        assert_eq!(
            resolve_sans(&config).unwrap(),
            vec![
                "kubernetes",
                "kubernetes.default",
                "kubernetes.default.svc",
                "kubernetes.default.svc.cluster",
                "kubernetes.svc.cluster.local",
                "127.0.0.1",
                "localhost",
                "10.0.0.5",
                "foo.example.com",
                "10.96.0.1",
            ]
        );
    }

    #[test]
    fn keeps_duplicates_and_extra_san_order() {
        let mut config = ClusterConfig::new("localhost");
        config.api.sans = vec!["b.example".to_string(), "a.example".to_string()];

        let sans = resolve_sans(&config).unwrap();
        assert_eq!(sans.iter().filter(|s| *s == "localhost").count(), 2);
        assert_eq!(&sans[8..10], &["b.example".to_string(), "a.example".to_string()]);
    }

    #[test]
    fn malformed_network_is_a_configuration_error() {
        let mut config = ClusterConfig::new("10.0.0.5");
        config.network.service_cidr = "not-a-cidr".to_string();

        assert!(matches!(resolve_sans(&config), Err(PkiError::Configuration(_))));
    }
}
