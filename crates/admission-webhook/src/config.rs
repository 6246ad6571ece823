use anyhow::{anyhow, Result};
use clap::ArgMatches;
use lazy_static::lazy_static;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::policies::ComputeUnitCatalog;

pub static SERVICE_NAME: &str = "admission-webhook";

lazy_static! {
    pub(crate) static ref HOSTNAME: String =
        std::env::var("HOSTNAME").unwrap_or_else(|_| String::from("unknown"));
}

#[derive(Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub tls_config: TlsConfig,
    pub annotation_prefix: String,
    pub compute_units: Option<ComputeUnitCatalog>,
    pub request_timeout: Option<Duration>,
    pub log_level: String,
    pub log_fmt: String,
    pub log_no_color: bool,
}

#[derive(Clone, Debug)]
pub struct TlsConfig {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl Config {
    pub fn from_args(matches: &ArgMatches) -> Result<Self> {
        let addr = api_bind_address(matches)?;
        let tls_config = tls_files(matches)?;

        let annotation_prefix = matches
            .get_one::<String>("annotation-prefix")
            .expect("This should not happen, there's a default value for annotation-prefix")
            .to_owned();
        if annotation_prefix.trim_end_matches('/').is_empty() {
            return Err(anyhow!(
                "error parsing arguments: --annotation-prefix cannot be empty"
            ));
        }

        let compute_units = compute_units(matches)?;

        let request_timeout = if *matches
            .get_one::<bool>("disable-request-timeout")
            .expect("clap should have set a default value")
        {
            None
        } else {
            let seconds = matches
                .get_one::<String>("request-timeout")
                .expect("request-timeout should always be set")
                .parse::<u64>()
                .map_err(|e| anyhow!("error parsing --request-timeout: {}", e))?;
            Some(Duration::from_secs(seconds))
        };

        let log_level = matches
            .get_one::<String>("log-level")
            .expect("This should not happen, there's a default value for log-level")
            .to_owned();
        let log_fmt = matches
            .get_one::<String>("log-fmt")
            .expect("This should not happen, there's a default value for log-fmt")
            .to_owned();
        let log_no_color = matches
            .get_one::<bool>("log-no-color")
            .expect("clap should have assigned a default value")
            .to_owned();

        Ok(Self {
            addr,
            tls_config,
            annotation_prefix,
            compute_units,
            request_timeout,
            log_level,
            log_fmt,
            log_no_color,
        })
    }
}

fn api_bind_address(matches: &ArgMatches) -> Result<SocketAddr> {
    let address = matches
        .get_one::<String>("address")
        .expect("This should not happen, there's a default value for addr");
    let port = matches
        .get_one::<String>("port")
        .expect("This should not happen, there's a default value for port");

    format!("{address}:{port}")
        .parse()
        .map_err(|e| anyhow!("error parsing arguments: {}", e))
}

fn tls_files(matches: &ArgMatches) -> Result<TlsConfig> {
    let cert_file = matches
        .get_one::<String>("cert-file")
        .expect("This should not happen, there's a default value for cert-file");
    let key_file = matches
        .get_one::<String>("key-file")
        .expect("This should not happen, there's a default value for key-file");

    if cert_file.is_empty() || key_file.is_empty() {
        return Err(anyhow!(
            "error parsing arguments: both --cert-file and --key-file must be provided, HTTPS cannot be disabled"
        ));
    }

    Ok(TlsConfig {
        cert_file: PathBuf::from(cert_file),
        key_file: PathBuf::from(key_file),
    })
}

fn compute_units(matches: &ArgMatches) -> Result<Option<ComputeUnitCatalog>> {
    match matches.get_one::<String>("compute-units") {
        None => Ok(None),
        Some(path) => {
            let catalog = ComputeUnitCatalog::read_from_file(Path::new(path))?;
            if catalog.is_empty() {
                return Err(anyhow!(
                    "compute units file {:?} does not define any compute unit",
                    path
                ));
            }
            Ok(Some(catalog))
        }
    }
}
