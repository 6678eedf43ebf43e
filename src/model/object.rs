use std::time::SystemTime;

/// Metadata of a single remote object, as reported by a HEAD request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub modified_time: Option<SystemTime>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// One item of a listing. Common prefixes come back with `is_prefix` set and a
/// key ending in `/`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: u64,
    pub modified_time: Option<SystemTime>,
    pub is_prefix: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    pub prefix: String,
    /// Upper bound on the total number of entries yielded.
    pub max_keys: Option<usize>,
    /// Without recursion the listing is grouped on `/`.
    pub recursive: bool,
}

impl ListOptions {
    pub fn probe(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            max_keys: Some(1),
            recursive: true,
        }
    }

    pub fn children(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            max_keys: None,
            recursive: false,
        }
    }
}
