//! Cache keys derived from a repository and its latest commit
//!
//! A slug is `owner-repo-sha`, lower-cased. Two requests for the same
//! repository at the same upstream commit always produce the same slug,
//! so cache hits need no coordination beyond resolving the commit.

use crate::config::schema::GithubConfig;
use crate::error::{RepoCacheError, RepoCacheResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// A validated `https://<host>/<owner>/<repo>` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub url: String,
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Validate `url` against the strict repository shape for `host`.
    ///
    /// Exactly two path segments, each `[A-Za-z0-9_-]+`, no trailing slash,
    /// query or fragment.
    pub fn parse(url: &str, host: &str) -> RepoCacheResult<Self> {
        let invalid = || RepoCacheError::InvalidUrl(url.to_string());

        let path = url
            .strip_prefix("https://")
            .and_then(|rest| rest.strip_prefix(host))
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?;

        let mut segments = path.split('/');
        let owner = segments.next().filter(|s| is_segment(s)).ok_or_else(invalid)?;
        let name = segments.next().filter(|s| is_segment(s)).ok_or_else(invalid)?;
        if segments.next().is_some() {
            return Err(invalid());
        }

        Ok(Self {
            url: url.to_string(),
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

fn is_segment(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Abbreviated (7) up to SHA-256 (64) hex digits
const SHA_LEN: std::ops::RangeInclusive<usize> = 7..=64;

/// Whether `sha` can end a slug that [`Slug::parse`] accepts again
pub fn is_commit_sha(sha: &str) -> bool {
    SHA_LEN.contains(&sha.len()) && sha.chars().all(|c| c.is_ascii_hexdigit())
}

/// Content-addressed cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Slug(String);

impl Slug {
    /// Build the slug for a repository at a resolved commit
    pub fn new(repo: &RepoRef, sha: &str) -> Self {
        Self(format!("{}-{}-{}", repo.owner, repo.name, sha).to_lowercase())
    }

    /// Accept an existing slug string (e.g. a directory name or a request
    /// parameter), rejecting anything that is not safe as a path component.
    pub fn parse(s: &str) -> Option<Self> {
        let (prefix, sha) = s.rsplit_once('-')?;
        let valid_sha = is_commit_sha(sha) && !sha.chars().any(|c| c.is_ascii_uppercase());
        let valid_prefix = prefix.contains('-')
            && !prefix.starts_with('-')
            && prefix
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-');

        (valid_sha && valid_prefix).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolves the latest commit on a repository's default branch
#[async_trait]
pub trait CommitResolver: Send + Sync {
    async fn latest_commit(&self, repo: &RepoRef) -> RepoCacheResult<String>;
}

/// Compute the slug for `repo` by resolving its latest commit
pub async fn generate_slug(
    resolver: &dyn CommitResolver,
    repo: &RepoRef,
) -> RepoCacheResult<Slug> {
    let sha = resolver.latest_commit(repo).await?;
    if !is_commit_sha(&sha) {
        return Err(RepoCacheError::UpstreamResolutionFailed {
            url: repo.url.clone(),
            reason: format!("malformed commit SHA '{}'", sha),
        });
    }
    let slug = Slug::new(repo, &sha);
    debug!("Resolved {} to {}", repo.url, slug);
    Ok(slug)
}

#[derive(Deserialize)]
struct CommitResponse {
    sha: Option<String>,
}

/// Commit resolver backed by the GitHub REST API
pub struct GithubResolver {
    api_base: String,
    token: Option<String>,
    timeout: Duration,
}

impl GithubResolver {
    pub fn new(config: &GithubConfig) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn commit_url(&self, repo: &RepoRef) -> String {
        format!(
            "{}/repos/{}/{}/commits/HEAD",
            self.api_base, repo.owner, repo.name
        )
    }

    /// Blocking fetch; always called from `spawn_blocking`
    fn fetch_sha(url: &str, token: Option<&str>, timeout: Duration) -> Result<String, String> {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        let mut request = agent
            .get(url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", concat!("repocache/", env!("CARGO_PKG_VERSION")));
        if let Some(token) = token {
            request = request.header("Authorization", &format!("Bearer {}", token));
        }

        let mut response = request.call().map_err(|e| e.to_string())?;
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| e.to_string())?;

        parse_commit_sha(&body)
    }
}

/// Extract a commit SHA from an API response body
fn parse_commit_sha(body: &str) -> Result<String, String> {
    let parsed: CommitResponse =
        serde_json::from_str(body).map_err(|e| format!("unexpected response: {}", e))?;

    match parsed.sha {
        Some(sha) if is_commit_sha(&sha) => Ok(sha),
        Some(sha) => Err(format!("malformed commit SHA '{}'", sha)),
        None => Err("response has no commit SHA".to_string()),
    }
}

#[async_trait]
impl CommitResolver for GithubResolver {
    async fn latest_commit(&self, repo: &RepoRef) -> RepoCacheResult<String> {
        let url = self.commit_url(repo);
        let token = self.token.clone();
        let timeout = self.timeout;
        debug!("Resolving latest commit: GET {}", url);

        let result = tokio::task::spawn_blocking(move || {
            Self::fetch_sha(&url, token.as_deref(), timeout)
        })
        .await
        .map_err(|e| RepoCacheError::Internal(format!("commit lookup task failed: {}", e)))?;

        result.map_err(|reason| RepoCacheError::UpstreamResolutionFailed {
            url: repo.url.clone(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(&'static str);

    #[async_trait]
    impl CommitResolver for FixedResolver {
        async fn latest_commit(&self, _repo: &RepoRef) -> RepoCacheResult<String> {
            Ok(self.0.to_string())
        }
    }

    #[test]
    fn parses_valid_url() {
        let repo = RepoRef::parse("https://github.com/acme/widgets", "github.com").unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
    }

    #[test]
    fn rejects_malformed_urls() {
        for url in [
            "http://github.com/acme/widgets",
            "https://github.com/acme/widgets/",
            "https://github.com/acme/widgets?tab=readme",
            "https://github.com/acme/widgets/tree/main",
            "https://github.com/acme",
            "https://gitlab.com/acme/widgets",
            "https://github.com.evil.io/acme/widgets",
            "https://github.com/acme/wid;gets",
            "https://github.com/../widgets",
            "",
        ] {
            assert!(
                matches!(RepoRef::parse(url, "github.com"), Err(RepoCacheError::InvalidUrl(_))),
                "accepted {url}"
            );
        }
    }

    #[test]
    fn slug_is_lowercase() {
        let repo = RepoRef::parse("https://github.com/Acme/Widgets", "github.com").unwrap();
        let slug = Slug::new(&repo, "ABCDEF1234567");
        assert_eq!(slug.as_str(), "acme-widgets-abcdef1234567");
    }

    #[test]
    fn slug_parse_rejects_traversal() {
        assert!(Slug::parse("acme-widgets-0123abc").is_some());
        assert!(Slug::parse("../etc-passwd-0123abc").is_none());
        assert!(Slug::parse("acme-widgets").is_none());
        assert!(Slug::parse("widgets-0123abc").is_none());
        assert!(Slug::parse("acme-widgets-XYZ").is_none());
    }

    #[tokio::test]
    async fn slug_is_deterministic() {
        let resolver = FixedResolver("9f1c2e3d4b5a69788796a5b4c3d2e1f0a9b8c7d6");
        let repo = RepoRef::parse("https://github.com/acme/widgets", "github.com").unwrap();

        let first = generate_slug(&resolver, &repo).await.unwrap();
        let second = generate_slug(&resolver, &repo).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(
            first.as_str(),
            "acme-widgets-9f1c2e3d4b5a69788796a5b4c3d2e1f0a9b8c7d6"
        );
    }

    #[test]
    fn commit_sha_extraction() {
        assert_eq!(
            parse_commit_sha(r#"{"sha": "abc1234", "commit": {}}"#).unwrap(),
            "abc1234"
        );
        assert!(parse_commit_sha(r#"{"sha": "abc123"}"#).is_err());
        assert!(parse_commit_sha(r#"{"message": "Not Found"}"#).is_err());
        assert!(parse_commit_sha(r#"{"sha": "not a sha"}"#).is_err());
        assert!(parse_commit_sha("<html>").is_err());
    }

    #[tokio::test]
    async fn generated_slugs_parse_back() {
        let repo = RepoRef::parse("https://github.com/acme/widgets", "github.com").unwrap();
        let longest = "a".repeat(64);
        let too_long = "a".repeat(65);

        for sha in ["ABCDEF1", longest.as_str()] {
            let resolver = crate::test_support::FixedResolver::new(sha);
            let slug = generate_slug(&resolver, &repo).await.unwrap();
            assert_eq!(Slug::parse(slug.as_str()), Some(slug));
        }

        for sha in ["abc123", too_long.as_str(), "xyz1234"] {
            let resolver = crate::test_support::FixedResolver::new(sha);
            assert!(matches!(
                generate_slug(&resolver, &repo).await,
                Err(RepoCacheError::UpstreamResolutionFailed { .. })
            ));
        }
    }

    #[test]
    fn commit_url_uses_default_branch() {
        let resolver = GithubResolver::new(&GithubConfig {
            api_base: "https://api.github.com/".to_string(),
            ..GithubConfig::default()
        });
        let repo = RepoRef::parse("https://github.com/acme/widgets", "github.com").unwrap();
        assert_eq!(
            resolver.commit_url(&repo),
            "https://api.github.com/repos/acme/widgets/commits/HEAD"
        );
    }
}
