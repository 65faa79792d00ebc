mod types;

pub use types::{
    ClusterConfig, PkiPaths, APISERVER_USER, CONTROLLER_MANAGER_USER, ROOT_USER, SCHEDULER_USER,
};
