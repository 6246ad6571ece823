use std::{net::SocketAddr, path::PathBuf, time::Duration};

use admission_webhook::{
    config::{Config, TlsConfig},
    policies::{ComputeUnitCatalog, DEFAULT_ANNOTATION_PREFIX},
    WebhookServer,
};
use axum::Router;

pub(crate) fn default_test_config() -> Config {
    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        tls_config: TlsConfig {
            cert_file: PathBuf::from("/does/not/exist/tls.crt"),
            key_file: PathBuf::from("/does/not/exist/tls.key"),
        },
        annotation_prefix: DEFAULT_ANNOTATION_PREFIX.to_owned(),
        compute_units: None,
        request_timeout: Some(Duration::from_secs(2)),
        log_level: "info".to_owned(),
        log_fmt: "json".to_owned(),
        log_no_color: false,
    }
}

pub(crate) fn compute_units_catalog() -> ComputeUnitCatalog {
    serde_yaml::from_str(include_str!("../data/compute_units.yml"))
        .expect("test catalog should be valid")
}

pub(crate) fn app(config: Config) -> Router {
    let server = WebhookServer::new_from_config(config).unwrap();

    server.router()
}
