mod kube;

pub use kube::{decode_data, KubeConfig, KubeConfigGenerator};
