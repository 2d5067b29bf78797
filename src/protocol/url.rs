//! Repository URL canonicalization.
//!
//! The canonical form is `https://` scheme, lowercase host, path case
//! preserved, no `.git` suffix, no trailing slash. The SSH shorthand
//! `git@host:path` canonicalizes to `https://host/path`.

use std::sync::LazyLock;

use regex::Regex;

static SSH_FORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^git@([^:/\s]+):(.+)$").expect("ssh url regex"));

static HTTPS_FORM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https://[^/\s]+(/[^/\s]+){2,}$").expect("https url regex"));

static SSH_VALID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^git@[^:/\s]+:[^/\s]+(/[^/\s]+)+$").expect("ssh validation regex")
});

/// Canonicalize a repository URL. Best-effort and total: invalid input
/// comes back cleaned up but may still fail [`validate`].
pub fn normalize(input: &str) -> String {
    // Whitespace never survives canonicalization, wherever it appears.
    let mut url: String = input.split_whitespace().collect();

    if let Some(caps) = SSH_FORM.captures(&url) {
        url = format!("https://{}/{}", &caps[1], &caps[2]);
    }

    if let Some(rest) = url.strip_prefix("http://") {
        url = format!("https://{rest}");
    }

    while url.ends_with('/') {
        url.pop();
    }

    if let Some(stripped) = url.strip_suffix(".git") {
        url = stripped.to_string();
    }

    lowercase_host(&url)
}

/// True for an HTTPS URL with at least two path segments, or the SSH
/// shorthand `git@host:a/b`.
pub fn validate(input: &str) -> bool {
    HTTPS_FORM.is_match(input) || SSH_VALID.is_match(input)
}

/// Append the `.git` suffix, idempotently.
pub fn to_git(input: &str) -> String {
    if input.ends_with(".git") {
        input.to_string()
    } else {
        format!("{input}.git")
    }
}

fn lowercase_host(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let host_start = scheme_end + 3;
    let host_end = url[host_start..]
        .find('/')
        .map(|i| host_start + i)
        .unwrap_or(url.len());

    let mut out = String::with_capacity(url.len());
    out.push_str(&url[..host_start]);
    out.push_str(&url[host_start..host_end].to_ascii_lowercase());
    out.push_str(&url[host_end..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_git_suffix_and_slash() {
        assert_eq!(
            normalize("https://github.com/user/repo.git"),
            "https://github.com/user/repo"
        );
        assert_eq!(
            normalize("https://github.com/user/repo/"),
            "https://github.com/user/repo"
        );
    }

    #[test]
    fn test_normalize_lowercases_host_preserves_path() {
        assert_eq!(
            normalize("https://GitHub.com/User/Repo"),
            "https://github.com/User/Repo"
        );
    }

    #[test]
    fn test_normalize_ssh_form() {
        assert_eq!(
            normalize("git@github.com:user/repo.git"),
            "https://github.com/user/repo"
        );
    }

    #[test]
    fn test_normalize_http_upgrade() {
        assert_eq!(
            normalize("http://example.com/a/b"),
            "https://example.com/a/b"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "https://GitHub.com/User/Repo.git",
            "git@gitlab.com:group/project",
            "http://example.com/a/b/",
        ];
        for input in inputs {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn test_validate() {
        assert!(validate("https://github.com/user/repo"));
        assert!(validate("https://example.com/a/b/c"));
        assert!(validate("git@github.com:user/repo"));
        assert!(!validate("https://github.com/user"));
        assert!(!validate("ftp://github.com/user/repo"));
        assert!(!validate("not a url"));
    }

    #[test]
    fn test_to_git_idempotent() {
        assert_eq!(
            to_git("https://github.com/user/repo"),
            "https://github.com/user/repo.git"
        );
        assert_eq!(
            to_git("https://github.com/user/repo.git"),
            "https://github.com/user/repo.git"
        );
    }
}
