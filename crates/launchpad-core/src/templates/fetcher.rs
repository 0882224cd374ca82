//! Source tree fetching from remote (GitHub) or local directory
//!
//! Every source is addressed by a [`SourceLocator`], rendered as
//! `<owner>/<repo>[/<subpath>][#<ref>]`. Existing template repositories rely
//! on that exact form, so parsing and rendering are kept symmetric.
//!
//! - Remote: downloads the repository zipball at the ref and extracts only the subpath
//! - Local: copies `<root>/<owner>/<repo>/<subpath>` (for template development)

use super::merger::{MergeError, MergePolicy, TreeMerger};
use crate::product::ProductConfig;
use crate::registry::is_valid_name;
use anyhow::Context;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::future::Future;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use url::Url;
use zip::ZipArchive;

/// Default API used to download repository archives
pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Errors raised while materializing a source tree
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid source locator '{locator}': {message}")]
    InvalidLocator { locator: String, message: String },

    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    #[error("Failed to read archive for {locator}: {message}")]
    Archive { locator: String, message: String },

    #[error("Could not find {locator}")]
    NotFound { locator: String },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Copy(#[from] MergeError),
}

impl FetchError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A repository, an optional path inside it, and an optional ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocator {
    /// `owner/repo`
    pub repository: String,
    pub subpath: Option<String>,
    pub reference: Option<String>,
}

impl SourceLocator {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            subpath: None,
            reference: None,
        }
    }

    pub fn with_subpath(mut self, subpath: impl Into<String>) -> Self {
        self.subpath = Some(subpath.into());
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Split the repository into owner and name
    pub fn owner_and_repo(&self) -> Result<(&str, &str), FetchError> {
        match self.repository.split_once('/') {
            Some((owner, repo)) if is_valid_name(owner) && is_valid_name(repo) => Ok((owner, repo)),
            _ => Err(FetchError::InvalidLocator {
                locator: self.to_string(),
                message: "repository must be of the form owner/repo".to_string(),
            }),
        }
    }
}

impl fmt::Display for SourceLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repository)?;
        if let Some(subpath) = &self.subpath {
            write!(f, "/{}", subpath)?;
        }
        if let Some(reference) = &self.reference {
            write!(f, "#{}", reference)?;
        }
        Ok(())
    }
}

impl FromStr for SourceLocator {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| FetchError::InvalidLocator {
            locator: s.to_string(),
            message: message.to_string(),
        };

        let (path, reference) = match s.split_once('#') {
            Some((_, "")) => return Err(invalid("empty ref after '#'")),
            Some((path, reference)) => (path, Some(reference.to_string())),
            None => (s, None),
        };

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if segments.len() < 2 || segments.iter().any(|s| s.is_empty()) {
            return Err(invalid("expected owner/repo[/subpath][#ref]"));
        }

        let repository = format!("{}/{}", segments[0], segments[1]);
        let subpath = (segments.len() > 2).then(|| segments[2..].join("/"));

        Ok(Self {
            repository,
            subpath,
            reference,
        })
    }
}

/// Materializes a source tree into a local directory
///
/// Implementations create `destination` if needed, overwrite files already
/// present there, and return the paths they wrote, relative to `destination`.
pub trait TreeFetcher: Send + Sync {
    fn fetch(
        &self,
        locator: &SourceLocator,
        destination: &Path,
    ) -> impl Future<Output = Result<BTreeSet<PathBuf>, FetchError>> + Send;
}

impl<T: TreeFetcher> TreeFetcher for &T {
    fn fetch(
        &self,
        locator: &SourceLocator,
        destination: &Path,
    ) -> impl Future<Output = Result<BTreeSet<PathBuf>, FetchError>> + Send {
        (**self).fetch(locator, destination)
    }
}

/// Fetches repository archives over HTTP
pub struct GithubFetcher {
    api_base: Url,
    client: reqwest::Client,
}

impl GithubFetcher {
    /// Create a new fetcher with a custom user agent
    pub fn new(api_base: Url, user_agent: &str) -> Self {
        Self {
            api_base,
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Create a fetcher from a product config, honouring its API override variable
    pub fn from_config<C: ProductConfig>(config: &C) -> anyhow::Result<Self> {
        let url_str = std::env::var(config.github_api_env())
            .unwrap_or_else(|_| DEFAULT_GITHUB_API.to_string());
        let url = Url::parse(&url_str).with_context(|| format!("Invalid API URL: {}", url_str))?;
        Ok(Self::new(url, config.user_agent()))
    }

    /// `<api>/repos/<owner>/<repo>/zipball[/<ref>]`, preserving query parameters
    pub fn archive_url(&self, locator: &SourceLocator) -> Result<Url, FetchError> {
        let (owner, repo) = locator.owner_and_repo()?;
        let mut url = self.api_base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| FetchError::InvalidLocator {
                    locator: locator.to_string(),
                    message: format!("URL cannot have path segments: {}", self.api_base),
                })?;
            segments
                .pop_if_empty()
                .extend(["repos", owner, repo, "zipball"]);
            if let Some(reference) = &locator.reference {
                segments.push(reference);
            }
        }
        Ok(url)
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let download_error = |message: String| FetchError::Download {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(download_error(format!("HTTP {}", response.status())));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

impl TreeFetcher for GithubFetcher {
    async fn fetch(
        &self,
        locator: &SourceLocator,
        destination: &Path,
    ) -> Result<BTreeSet<PathBuf>, FetchError> {
        let url = self.archive_url(locator)?;
        tracing::debug!(%locator, %url, "Downloading source archive");
        let zip_bytes = self.download(&url).await?;

        let locator_str = locator.to_string();
        let subpath = locator.subpath.clone();
        let destination = destination.to_path_buf();
        let archive_locator = locator_str.clone();
        tokio::task::spawn_blocking(move || {
            extract_subtree(&zip_bytes, subpath.as_deref(), &destination, &archive_locator)
        })
        .await
        .map_err(|e| FetchError::Archive {
            locator: locator_str,
            message: e.to_string(),
        })?
    }
}

/// Extract the files under `subpath` from a repository zipball into `destination`
///
/// Archive entries are nested under a single top-level directory
/// (`<owner>-<repo>-<sha>/`), which is stripped along with the subpath.
pub fn extract_subtree(
    zip_bytes: &[u8],
    subpath: Option<&str>,
    destination: &Path,
    locator: &str,
) -> Result<BTreeSet<PathBuf>, FetchError> {
    let archive_error = |message: String| FetchError::Archive {
        locator: locator.to_string(),
        message,
    };

    let mut archive =
        ZipArchive::new(Cursor::new(zip_bytes)).map_err(|e| archive_error(e.to_string()))?;

    let prefix = subpath.map(PathBuf::from).unwrap_or_default();
    let mut written = BTreeSet::new();
    let mut found = false;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| archive_error(e.to_string()))?;

        // Entries that would escape the destination yield no name
        let Some(name) = entry.enclosed_name() else {
            tracing::warn!(entry = entry.name(), "Skipping unsafe archive entry");
            continue;
        };

        let mut components = name.components();
        components.next();
        let Ok(relative) = components.as_path().strip_prefix(&prefix) else {
            continue;
        };
        found = true;

        if relative.as_os_str().is_empty() {
            continue;
        }

        let target = destination.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| FetchError::io(&target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::io(parent, e))?;
        }
        let mut file = fs::File::create(&target).map_err(|e| FetchError::io(&target, e))?;
        std::io::copy(&mut entry, &mut file).map_err(|e| FetchError::io(&target, e))?;
        written.insert(relative.to_path_buf());
    }

    if !found {
        return Err(FetchError::NotFound {
            locator: locator.to_string(),
        });
    }

    fs::create_dir_all(destination).map_err(|e| FetchError::io(destination, e))?;
    Ok(written)
}

/// Reads sources from a directory laid out as `<root>/<owner>/<repo>/...`
///
/// Refs are ignored: the directory holds exactly one checkout per repository.
pub struct LocalFetcher {
    root: PathBuf,
}

impl LocalFetcher {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Directory a locator resolves to
    pub fn source_dir(&self, locator: &SourceLocator) -> PathBuf {
        let mut dir = self.root.join(&locator.repository);
        if let Some(subpath) = &locator.subpath {
            dir = dir.join(subpath);
        }
        dir
    }
}

impl TreeFetcher for LocalFetcher {
    async fn fetch(
        &self,
        locator: &SourceLocator,
        destination: &Path,
    ) -> Result<BTreeSet<PathBuf>, FetchError> {
        let source = self.source_dir(locator);
        if !source.is_dir() {
            return Err(FetchError::NotFound {
                locator: locator.to_string(),
            });
        }
        if locator.reference.is_some() {
            tracing::debug!(%locator, "Local sources ignore refs");
        }

        let written = TreeMerger::new(MergePolicy::Overwrite).merge_into(&source, destination)?;
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zipball(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            let options = SimpleFileOptions::default();
            zip.add_directory("acme-tpl-abc123/", options).unwrap();
            for (path, content) in entries {
                zip.start_file(format!("acme-tpl-abc123/{}", path), options)
                    .unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buffer
    }

    #[test]
    fn test_module_locator_format() {
        let locator = SourceLocator::new("acme/tpl")
            .with_subpath("modules/auth-oauth")
            .with_reference("main");
        assert_eq!(locator.to_string(), "acme/tpl/modules/auth-oauth#main");
    }

    #[test]
    fn test_parse_locator() {
        let locator: SourceLocator = "acme/tpl/modules/auth-oauth#feature".parse().unwrap();
        assert_eq!(locator.repository, "acme/tpl");
        assert_eq!(locator.subpath.as_deref(), Some("modules/auth-oauth"));
        assert_eq!(locator.reference.as_deref(), Some("feature"));

        let base: SourceLocator = "acme/tpl".parse().unwrap();
        assert_eq!(base.subpath, None);
        assert_eq!(base.reference, None);
        assert_eq!(base.to_string(), "acme/tpl");
    }

    #[test]
    fn test_parse_invalid_locators() {
        assert!("acme".parse::<SourceLocator>().is_err());
        assert!("acme//tpl".parse::<SourceLocator>().is_err());
        assert!("acme/tpl#".parse::<SourceLocator>().is_err());
    }

    #[test]
    fn test_owner_and_repo_rejects_path_tricks() {
        let rejected = [
            "../outside",
            "acme/..",
            "/abs",
            "acme/tpl/extra",
            "acme",
            ".hidden/tpl",
        ];
        for repository in rejected {
            assert!(
                SourceLocator::new(repository).owner_and_repo().is_err(),
                "{}",
                repository
            );
        }
        assert_eq!(
            SourceLocator::new("acme/tpl").owner_and_repo().unwrap(),
            ("acme", "tpl")
        );
    }

    #[test]
    fn test_archive_url() {
        let fetcher = GithubFetcher::new(Url::parse(DEFAULT_GITHUB_API).unwrap(), "test");
        let locator = SourceLocator::new("acme/tpl")
            .with_subpath("modules/x")
            .with_reference("main");
        assert_eq!(
            fetcher.archive_url(&locator).unwrap().as_str(),
            "https://api.github.com/repos/acme/tpl/zipball/main"
        );

        let no_ref = SourceLocator::new("acme/tpl");
        assert_eq!(
            fetcher.archive_url(&no_ref).unwrap().as_str(),
            "https://api.github.com/repos/acme/tpl/zipball"
        );
    }

    #[test]
    fn test_archive_url_with_mirror_prefix() {
        let base = Url::parse("https://mirror.example.com/github/?token=abc").unwrap();
        let fetcher = GithubFetcher::new(base, "test");
        let locator = SourceLocator::new("acme/tpl").with_reference("v1");
        assert_eq!(
            fetcher.archive_url(&locator).unwrap().as_str(),
            "https://mirror.example.com/github/repos/acme/tpl/zipball/v1?token=abc"
        );
    }

    #[test]
    fn test_extract_subtree_only_takes_subpath() {
        let zip = zipball(&[
            ("package.json", "{}"),
            ("modules/auth-oauth/src/login.js", "login"),
            ("modules/auth-oauth-extra/x.js", "nope"),
            ("modules/theme/theme.css", "css"),
        ]);
        let dest = TempDir::new().unwrap();

        let written =
            extract_subtree(&zip, Some("modules/auth-oauth"), dest.path(), "acme/tpl").unwrap();

        assert_eq!(
            written.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("src/login.js")]
        );
        assert_eq!(
            fs::read_to_string(dest.path().join("src/login.js")).unwrap(),
            "login"
        );
        assert!(!dest.path().join("package.json").exists());
    }

    #[test]
    fn test_extract_whole_repository_overwrites() {
        let zip = zipball(&[("package.json", "{\"name\":\"app\"}"), ("src/index.js", "")]);
        let dest = TempDir::new().unwrap();
        fs::write(dest.path().join("package.json"), "old").unwrap();

        let written = extract_subtree(&zip, None, dest.path(), "acme/tpl").unwrap();

        assert!(written.contains(Path::new("package.json")));
        assert!(written.contains(Path::new("src/index.js")));
        assert_eq!(
            fs::read_to_string(dest.path().join("package.json")).unwrap(),
            "{\"name\":\"app\"}"
        );
    }

    #[test]
    fn test_extract_missing_subpath() {
        let zip = zipball(&[("package.json", "{}")]);
        let dest = TempDir::new().unwrap();
        let err = extract_subtree(&zip, Some("modules/ghost"), dest.path(), "acme/tpl")
            .unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_local_fetcher_copies_subpath() {
        let root = TempDir::new().unwrap();
        let module_dir = root.path().join("acme/tpl/modules/theme");
        fs::create_dir_all(module_dir.join("styles")).unwrap();
        fs::write(module_dir.join("styles/theme.css"), "body {}").unwrap();

        let fetcher = LocalFetcher::new(root.path().to_path_buf());
        let dest = TempDir::new().unwrap();
        let locator: SourceLocator = "acme/tpl/modules/theme#main".parse().unwrap();

        let written = fetcher.fetch(&locator, dest.path()).await.unwrap();

        assert!(written.contains(Path::new("styles/theme.css")));
        assert!(dest.path().join("styles/theme.css").exists());
    }

    #[tokio::test]
    async fn test_local_fetcher_missing_source() {
        let root = TempDir::new().unwrap();
        let fetcher = LocalFetcher::new(root.path().to_path_buf());
        let dest = TempDir::new().unwrap();
        let locator: SourceLocator = "acme/tpl/modules/ghost".parse().unwrap();

        let err = fetcher.fetch(&locator, dest.path()).await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }
}
