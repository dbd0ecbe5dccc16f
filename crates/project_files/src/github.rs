use std::time::Duration;

use core_types::{ProjectFile, ProjectFileSet};
use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, Url};
use resilience::{Backoff, fetch_with_retry};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::IngestError;
use crate::filter::{file_type, skip_reason};

const GITHUB_JSON: &str = "application/vnd.github+json";
const GITHUB_RAW: &str = "application/vnd.github.raw";
const CLIENT_NAME: &str = concat!("lumen/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// Accepts `https://github.com/owner/repo(.git)`, `github.com/owner/repo`,
/// `git@github.com:owner/repo.git` and bare `owner/repo`. Anything after the
/// repository segment (`/tree/main/...`) is ignored.
pub fn parse_repo_url(raw: &str) -> Result<RepoRef, IngestError> {
    let invalid = || IngestError::InvalidRepoUrl(raw.to_string());
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let segments: Vec<String> = if let Some(rest) = trimmed.strip_prefix("git@") {
        split_path(&rest.replacen(':', "/", 1), true)
    } else if trimmed.contains("://") {
        let url = Url::parse(trimmed).map_err(|_| invalid())?;
        url.path_segments()
            .map(|parts| {
                parts
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    } else {
        split_path(trimmed, false)
    };

    let [owner, repo, ..] = segments.as_slice() else {
        return Err(invalid());
    };
    let repo = repo.strip_suffix(".git").unwrap_or(repo.as_str());
    if !is_valid_name(owner) || !is_valid_name(repo) {
        return Err(invalid());
    }
    Ok(RepoRef {
        owner: owner.clone(),
        repo: repo.to_string(),
    })
}

fn split_path(path: &str, has_host: bool) -> Vec<String> {
    let mut parts: Vec<String> = path
        .split('/')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    let starts_with_host = parts.first().is_some_and(|first| first.contains('.'));
    if !parts.is_empty() && (has_host || (starts_with_host && parts.len() > 2)) {
        parts.remove(0);
    }
    parts
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    name: String,
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Listing {
    Directory(Vec<ContentEntry>),
    Other(serde_json::Value),
}

/// Copies the text files of a public repository through the GitHub contents
/// API.
#[derive(Debug, Clone)]
pub struct RepoCloner {
    client: Client,
    api_base: String,
    token: Option<String>,
    attempts: u32,
    backoff: Backoff,
}

impl RepoCloner {
    pub fn new(client: Client, api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            attempts: 2,
            backoff: Backoff::linear(Duration::from_millis(500)),
        }
    }

    pub fn with_retry(mut self, attempts: u32, backoff: Backoff) -> Self {
        self.attempts = attempts;
        self.backoff = backoff;
        self
    }

    /// Walks the whole tree depth-first. Only a failure to list the root is
    /// an error; unreadable files and sub-directories are logged and skipped.
    pub async fn clone_repo(&self, repo: &RepoRef) -> Result<Vec<ProjectFile>, IngestError> {
        let root = self.list(repo, "").await?;
        let mut files = ProjectFileSet::new();
        self.walk(repo, root, &mut files).await;
        info!(owner = %repo.owner, repo = %repo.repo, files = files.len(), "repository cloned");
        Ok(files.into_vec())
    }

    fn walk<'a>(
        &'a self,
        repo: &'a RepoRef,
        entries: Vec<ContentEntry>,
        files: &'a mut ProjectFileSet,
    ) -> BoxFuture<'a, ()> {
        async move {
            for entry in entries {
                match entry.kind.as_str() {
                    "file" => {
                        if let Some(reason) = skip_reason(&entry.name, entry.size) {
                            debug!(path = %entry.path, reason = reason.as_str(), "skipping repository file");
                            continue;
                        }
                        match self.fetch_raw(repo, &entry.path).await {
                            Ok(content) => {
                                let file_type = file_type(&entry.name);
                                files.insert(ProjectFile::new(entry.path, content, file_type));
                            }
                            Err(err) => warn!(path = %entry.path, "skipping repository file: {err}"),
                        }
                    }
                    "dir" => match self.list(repo, &entry.path).await {
                        Ok(children) => self.walk(repo, children, files).await,
                        Err(err) => warn!(path = %entry.path, "skipping repository directory: {err}"),
                    },
                    other => debug!(path = %entry.path, kind = other, "ignoring repository entry"),
                }
            }
        }
        .boxed()
    }

    async fn list(&self, repo: &RepoRef, path: &str) -> Result<Vec<ContentEntry>, IngestError> {
        let response = self.get(repo, path, GITHUB_JSON).await?;
        match response.json::<Listing>().await? {
            Listing::Directory(entries) => Ok(entries),
            Listing::Other(_) => Ok(Vec::new()),
        }
    }

    async fn fetch_raw(&self, repo: &RepoRef, path: &str) -> Result<String, IngestError> {
        let response = self.get(repo, path, GITHUB_RAW).await?;
        let bytes = response.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| IngestError::NotText(path.to_string()))
    }

    async fn get(
        &self,
        repo: &RepoRef,
        path: &str,
        accept: &str,
    ) -> Result<reqwest::Response, IngestError> {
        let mut url = format!(
            "{}/repos/{}/{}/contents",
            self.api_base, repo.owner, repo.repo
        );
        if !path.is_empty() {
            url.push('/');
            url.push_str(path);
        }

        let mut request = self
            .client
            .get(&url)
            .header(USER_AGENT, CLIENT_NAME)
            .header(ACCEPT, accept);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response =
            fetch_with_retry(&self.client, request.build()?, self.attempts, self.backoff).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::UpstreamStatus {
                status: status.as_u16(),
                path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            });
        }
        Ok(response)
    }
}
