use crate::model::fs::FSError;

const DEFAULT_REGION: &str = "us-east-1";
const AWS_DOMAIN: &str = ".amazonaws.com";

#[derive(Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub url: String,
    pub host: String,
    pub secure: bool,
    pub region: String,
    /// Non-AWS endpoints are addressed path-style, AWS ones virtual-hosted.
    pub path_style: bool,
}

pub fn parse_endpoint(endpoint: &str) -> Result<Endpoint, FSError> {
    let endpoint = endpoint.trim();

    let (secure, rest) = if let Some(rest) = endpoint.strip_prefix("https://") {
        (true, rest)
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        (false, rest)
    } else {
        return Err(FSError::Config {
            message: format!("failed to parse scheme of endpoint: {}", endpoint),
        });
    };

    let host = rest.split('/').next().unwrap_or("");
    if host.is_empty() {
        return Err(FSError::Config {
            message: format!("failed to parse host of endpoint: {}", endpoint),
        });
    }

    let region = parse_region_from_host(host);
    let is_aws = host_name(host).ends_with(AWS_DOMAIN);

    Ok(Endpoint {
        url: format!("{}://{}", if secure { "https" } else { "http" }, host),
        host: host.to_string(),
        secure,
        region: region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
        path_style: !is_aws,
    })
}

/// Extracts the region from AWS style hosts such as `s3.eu-west-1.amazonaws.com`
/// or `s3-eu-west-1.amazonaws.com`.
pub fn parse_region_from_host(host: &str) -> Option<String> {
    let host = host_name(host);
    if !host.ends_with(AWS_DOMAIN) {
        return None;
    }

    let labels: Vec<&str> = host.split('.').collect();
    for (i, label) in labels.iter().enumerate() {
        if let Some(region) = label.strip_prefix("s3-") {
            if region == "external-1" {
                return Some(DEFAULT_REGION.to_string());
            }
            return Some(region.to_string());
        }

        if *label == "s3" {
            let next = labels.get(i + 1)?;
            let region = if *next == "dualstack" {
                labels.get(i + 2)?
            } else {
                next
            };

            return if *region == "amazonaws" {
                None
            } else {
                Some(region.to_string())
            };
        }
    }

    None
}

fn host_name(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}
