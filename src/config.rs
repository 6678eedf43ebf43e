use clap::{Arg, ArgMatches, Command};

use crate::{model, util};

const DEFAULT_BUCKET_PATH: &str = "/";
const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";

#[derive(Debug)]
pub struct ServeConfig {
    pub endpoint: util::object::Endpoint,
    pub bucket: String,
    pub bucket_path: String,
    pub address: String,
    pub allowed_origins: Vec<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

pub fn command() -> Command {
    Command::new("s3serve")
        .about("Serves the contents of an S3 bucket as a static website")
        .arg(
            Arg::new("endpoint")
                .long("endpoint")
                .required(true)
                .help("S3 endpoint URL, e.g. https://s3.eu-west-1.amazonaws.com"),
        )
        .arg(
            Arg::new("bucket")
                .long("bucket")
                .required(true)
                .help("Bucket to serve"),
        )
        .arg(
            Arg::new("bucketPath")
                .long("bucketPath")
                .default_value(DEFAULT_BUCKET_PATH)
                .help("Path inside the bucket used as the site root"),
        )
        .arg(
            Arg::new("address")
                .long("address")
                .default_value(DEFAULT_ADDRESS)
                .help("Address to listen on"),
        )
        .arg(
            Arg::new("allowed-cors-origins")
                .long("allowed-cors-origins")
                .help("Comma separated origin patterns, `*` and `?` wildcards allowed"),
        )
        .arg(Arg::new("accessKey").long("accessKey").help("S3 access key"))
        .arg(Arg::new("secretKey").long("secretKey").help("S3 secret key"))
        .arg(
            Arg::new("accessKeyFile")
                .long("accessKeyFile")
                .help("File holding the S3 access key, overrides --accessKey"),
        )
        .arg(
            Arg::new("secretKeyFile")
                .long("secretKeyFile")
                .help("File holding the S3 secret key, overrides --secretKey"),
        )
}

impl ServeConfig {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, model::fs::FSError> {
        let endpoint = util::object::parse_endpoint(&required(matches, "endpoint")?)?;
        let bucket = required(matches, "bucket")?;

        let bucket_path = matches
            .get_one::<String>("bucketPath")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_BUCKET_PATH.to_string());

        let address = matches
            .get_one::<String>("address")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string());

        let allowed_origins = matches
            .get_one::<String>("allowed-cors-origins")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            endpoint,
            bucket,
            bucket_path,
            address,
            allowed_origins,
            access_key: credential(matches, "accessKey", "accessKeyFile")?,
            secret_key: credential(matches, "secretKey", "secretKeyFile")?,
        })
    }

    /// Both keys, or `None` to fall back to the default credential chain.
    pub fn static_credentials(&self) -> Option<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(access_key), Some(secret_key)) => Some((access_key, secret_key)),
            _ => None,
        }
    }
}

fn required(matches: &ArgMatches, id: &str) -> Result<String, model::fs::FSError> {
    match matches.get_one::<String>(id).map(|v| v.trim()) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(model::fs::FSError::Config {
            message: format!("--{} must not be empty", id),
        }),
    }
}

fn credential(
    matches: &ArgMatches,
    inline: &str,
    file: &str,
) -> Result<Option<String>, model::fs::FSError> {
    let value = match matches.get_one::<String>(file) {
        Some(path) => std::fs::read_to_string(path).map_err(|err| model::fs::FSError::Config {
            message: format!("failed to read --{} {}: {}", file, path, err),
        })?,
        None => matches.get_one::<String>(inline).cloned().unwrap_or_default(),
    };

    let value = value.trim();
    Ok(if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    })
}
