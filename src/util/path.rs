pub const SEPARATOR: char = '/';

/// Cleans `path` as a rooted path: empty and `.` segments are dropped and `..`
/// never climbs above `/`. The result always starts with `/`.
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split(SEPARATOR) {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    format!("/{}", segments.join("/"))
}

/// Joins a request path under `root`. The result carries no leading or
/// trailing separator, so the bucket root is the empty string.
pub fn join(root: &str, name: &str) -> String {
    let root = clean(root);
    let name = clean(name);

    let joined = if name == "/" {
        root
    } else if root == "/" {
        name
    } else {
        format!("{}{}", root, name)
    };

    joined.trim_start_matches(SEPARATOR).to_string()
}

/// Last element of `path`, or `/` when nothing is left after trimming.
pub fn base(path: &str) -> &str {
    let path = path.trim_end_matches(SEPARATOR);

    match path.rfind(SEPARATOR) {
        Some(pos) => &path[pos + 1..],
        None if path.is_empty() => "/",
        None => path,
    }
}
