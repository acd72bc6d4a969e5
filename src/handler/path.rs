/// Returns the canonical form of a request path: a single leading `/`,
/// no empty or `.` segments, `..` resolved without climbing above the root.
/// A trailing slash is kept so subtree paths stay subtree paths.
///
/// ```
/// use rustymux::handler::clean_path;
///
/// assert_eq!(clean_path("//a/./b/../c/"), "/a/c/");
/// assert_eq!(clean_path("/../.."), "/");
/// ```
pub fn clean_path(p: &str) -> String {
    if p.is_empty() {
        return "/".to_string();
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in p.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }

    let mut cleaned = String::with_capacity(p.len() + 1);
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }

    if cleaned.is_empty() || p.ends_with('/') {
        cleaned.push('/');
    }
    cleaned
}
