use clap::builder::PossibleValue;
use clap::{crate_authors, crate_description, crate_name, crate_version, Arg, ArgAction, Command};

use crate::policies::DEFAULT_ANNOTATION_PREFIX;

pub fn build_cli() -> Command {
    let mut args = vec![
            Arg::new("log-level")
                .long("log-level")
                .value_name("LOG_LEVEL")
                .env("ADMISSION_WEBHOOK_LOG_LEVEL")
                .default_value("info")
                .value_parser([
                    PossibleValue::new("trace"),
                    PossibleValue::new("debug"),
                    PossibleValue::new("info"),
                    PossibleValue::new("warn"),
                    PossibleValue::new("error"),
                ])
                .help("Log level"),
            Arg::new("log-fmt")
                .long("log-fmt")
                .value_name("LOG_FMT")
                .env("ADMISSION_WEBHOOK_LOG_FMT")
                .default_value("text")
                .value_parser([PossibleValue::new("text"), PossibleValue::new("json")])
                .help("Log output format"),
            Arg::new("log-no-color")
                .long("log-no-color")
                .env("NO_COLOR")
                .action(ArgAction::SetTrue)
                .help("Disable colored output for logs"),
            Arg::new("address")
                .long("addr")
                .value_name("BIND_ADDRESS")
                .default_value("0.0.0.0")
                .env("ADMISSION_WEBHOOK_BIND_ADDRESS")
                .help("Bind against ADDRESS"),
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .default_value("8443")
                .env("ADMISSION_WEBHOOK_PORT")
                .help("Listen on PORT"),
            Arg::new("cert-file")
                .long("cert-file")
                .value_name("CERT_FILE")
                .default_value("/run/secrets/tls/tls.crt")
                .env("ADMISSION_WEBHOOK_CERT_FILE")
                .help("Path to the X.509 certificate file served over HTTPS"),
            Arg::new("key-file")
                .long("key-file")
                .value_name("KEY_FILE")
                .default_value("/run/secrets/tls/tls.key")
                .env("ADMISSION_WEBHOOK_KEY_FILE")
                .help("Path to the private key of the HTTPS certificate"),
            Arg::new("annotation-prefix")
                .long("annotation-prefix")
                .value_name("PREFIX")
                .default_value(DEFAULT_ANNOTATION_PREFIX)
                .env("ADMISSION_WEBHOOK_ANNOTATION_PREFIX")
                .help("Prefix of the pod annotations read by the compute unit policy"),
            Arg::new("compute-units")
                .long("compute-units")
                .value_name("COMPUTE_UNITS_FILE")
                .env("ADMISSION_WEBHOOK_COMPUTE_UNITS")
                .help("YAML file holding the resources of each compute unit. When not set, compute unit annotations are only validated"),
            Arg::new("request-timeout")
                .long("request-timeout")
                .value_name("MAXIMUM_PROCESSING_TIME_SECONDS")
                .default_value("10")
                .env("ADMISSION_WEBHOOK_REQUEST_TIMEOUT")
                .help("Abort the processing of an admission request after the given time"),
            Arg::new("disable-request-timeout")
                .long("disable-request-timeout")
                .env("ADMISSION_WEBHOOK_DISABLE_REQUEST_TIMEOUT")
                .action(ArgAction::SetTrue)
                .help("Disable the request timeout protection"),
    ];
    args.sort_by(|a, b| a.get_id().cmp(b.get_id()));

    Command::new(crate_name!())
        .author(crate_authors!())
        .version(crate_version!())
        .about(crate_description!())
        .args(args)
}
