use std::{process, sync::Arc};

use aws_sdk_s3::config::{Credentials, Region};
use tracing::{error, info, span, Instrument, Level};

mod adapters;
mod config;
mod file;
mod fs;
mod model;
mod server;
mod util;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().json().init();

    let span = span!(Level::INFO, "main", context = "main");
    let matches = config::command().get_matches();

    let config = match config::ServeConfig::from_matches(&matches) {
        Ok(config) => config,
        Err(err) => {
            error!(error_message = %err, error_group = "config");
            process::exit(2);
        }
    };

    if let Err(err) = serve(config).instrument(span).await {
        error!(error_message = %err, error_group = "serve");
        process::exit(1);
    }
}

async fn serve(config: config::ServeConfig) -> Result<(), model::fs::FSError> {
    info!(
        endpoint = %config.endpoint.url,
        host = %config.endpoint.host,
        secure = config.endpoint.secure,
        bucket = %config.bucket,
        bucket_path = %config.bucket_path,
        "called"
    );

    let client = s3_client(&config).await;
    let fs = fs::ObjectFS::new(Arc::new(client), &config.bucket, &config.bucket_path);

    server::run(Arc::new(fs), &config.address, config.allowed_origins).await
}

async fn s3_client(config: &config::ServeConfig) -> aws_sdk_s3::Client {
    let mut loader = aws_config::from_env()
        .endpoint_url(&config.endpoint.url)
        .region(Region::new(config.endpoint.region.clone()));

    if let Some((access_key, secret_key)) = config.static_credentials() {
        loader = loader.credentials_provider(Credentials::new(
            access_key, secret_key, None, None, "static",
        ));
    }

    let sdk_config = loader.load().await;
    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.endpoint.path_style)
        .build();

    aws_sdk_s3::Client::from_conf(s3_config)
}
