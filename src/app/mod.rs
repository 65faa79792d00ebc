mod bootstrap;

pub use bootstrap::{BootstrapReport, CancelToken, Certificates};
