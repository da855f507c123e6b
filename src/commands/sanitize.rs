use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Result, WpaiError};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\-_]").unwrap());
static HYPHEN_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-+").unwrap());

/// Path segments that introduce a plugin or theme directory.
pub const PROJECT_ROOT_MARKERS: [&str; 2] = ["plugins", "themes"];

/// Normalizes a project name into a WordPress plugin/theme directory slug.
///
/// Lowercases, turns whitespace runs into a single hyphen, drops anything
/// outside `[a-z0-9-_]`, collapses repeated hyphens and trims hyphens from
/// both ends. The result may be empty; see [`slug_for`].
pub fn sanitize(raw_name: &str) -> String {
    let lowered = raw_name.to_lowercase();
    let hyphenated = WHITESPACE.replace_all(&lowered, "-");
    let stripped = DISALLOWED.replace_all(&hyphenated, "");
    let collapsed = HYPHEN_RUNS.replace_all(&stripped, "-");
    collapsed.trim_matches('-').to_string()
}

/// Like [`sanitize`], but rejects names that leave nothing usable behind.
pub fn slug_for(raw_name: &str) -> Result<String> {
    let slug = sanitize(raw_name);
    if slug.is_empty() {
        return Err(WpaiError::SanitizationDegenerate {
            raw: raw_name.to_string(),
        });
    }
    Ok(slug)
}

/// Renames the directory segment that carries the raw project name.
///
/// Only a whole segment equal to `raw_name` is replaced, never a substring.
/// The segment right after a `plugins`/`themes` marker wins; otherwise the
/// first matching segment is used. Paths without a match come back as-is.
pub fn rewrite_path(path: &str, raw_name: &str, slug: &str) -> String {
    if raw_name.is_empty() || raw_name == slug {
        return path.to_string();
    }

    let parts: Vec<&str> = path.split('/').collect();
    let after_marker = parts
        .iter()
        .position(|p| PROJECT_ROOT_MARKERS.contains(p))
        .map(|i| i + 1)
        .filter(|&i| parts.get(i) == Some(&raw_name));
    let target = after_marker.or_else(|| parts.iter().position(|p| *p == raw_name));

    match target {
        Some(index) => parts
            .iter()
            .enumerate()
            .map(|(i, p)| if i == index { slug } else { *p })
            .collect::<Vec<_>>()
            .join("/"),
        None => path.to_string(),
    }
}
