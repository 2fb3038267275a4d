//! GitHub REST implementation of [`RemoteGateway`].
//!
//! Only the handful of endpoints the editor needs: the viewer, the viewer's
//! repositories, the default branch tree and the contents API.

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use gitmark_core::gateway::{is_markdown_path, require_token};
use gitmark_core::{
    AccessToken, GatewayError, GatewayResult, RemoteFile, RemoteGateway, RemoteRepository,
    RemoteUser,
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const ACCEPT: &str = "application/vnd.github+json";

/// Upper bound on followed repository pages (100 repositories each).
const MAX_REPOSITORY_PAGES: usize = 50;

/// Client for the GitHub REST API.
#[derive(Debug, Clone)]
pub struct GitHubGateway {
    client: reqwest::Client,
    api_url: String,
    user_agent: String,
}

// Response shapes (only the fields we read)

#[derive(Deserialize)]
struct ViewerResponse {
    id: u64,
    login: String,
    avatar_url: Option<String>,
}

#[derive(Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Deserialize)]
struct RepositoryResponse {
    id: u64,
    name: String,
    full_name: String,
    owner: OwnerResponse,
    #[serde(default)]
    private: bool,
}

#[derive(Deserialize)]
struct RepositoryDetails {
    default_branch: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeEntry>,
}

#[derive(Deserialize)]
struct TreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    sha: String,
    encoding: Option<String>,
    content: Option<String>,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    message: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct WriteResponse {
    content: WrittenContent,
}

#[derive(Deserialize)]
struct WrittenContent {
    sha: String,
}

impl From<RepositoryResponse> for RemoteRepository {
    fn from(repo: RepositoryResponse) -> Self {
        RemoteRepository {
            github_id: repo.id.to_string(),
            name: repo.name,
            full_name: repo.full_name,
            owner: repo.owner.login,
            is_private: repo.private,
        }
    }
}

/// Percent-encodes each segment of a slash-separated path.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_content(encoded: &str) -> GatewayResult<String> {
    let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| GatewayError::Unavailable(format!("invalid base64 content: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|_| GatewayError::Unavailable("file content is not UTF-8".to_string()))
}

/// Extracts the `rel="next"` target from a `Link` response header.
fn next_page_url(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        let is_next = params
            .split(';')
            .any(|p| p.trim().replace(' ', "") == "rel=\"next\"");
        if !is_next {
            return None;
        }
        let url = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Some(url.to_string())
    })
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Unavailable(e.to_string())
}

/// Maps a non-success status to a gateway error. `what` names the resource.
fn status_error(status: StatusCode, what: &str) -> GatewayError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GatewayError::Unauthenticated,
        StatusCode::NOT_FOUND => GatewayError::NotFound(what.to_string()),
        other => GatewayError::Unavailable(format!("{} returned {}", what, other)),
    }
}

impl GitHubGateway {
    pub fn new(api_url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            user_agent: user_agent.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn request(&self, method: Method, token: &AccessToken, path: &str) -> RequestBuilder {
        self.request_url(method, token, &format!("{}{}", self.api_url, path))
    }

    fn request_url(&self, method: Method, token: &AccessToken, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token.as_str()))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT, ACCEPT)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        token: &AccessToken,
        path: &str,
        what: &str,
    ) -> GatewayResult<T> {
        let response = self
            .request(Method::GET, token, path)
            .send()
            .await
            .map_err(transport_error)?;
        Self::parse(response, what).await
    }

    async fn parse<T: for<'de> Deserialize<'de>>(response: Response, what: &str) -> GatewayResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, what));
        }
        response.json().await.map_err(transport_error)
    }

    async fn contents(
        &self,
        token: &AccessToken,
        repo_full_name: &str,
        path: &str,
    ) -> GatewayResult<ContentsResponse> {
        let url = format!(
            "/repos/{}/contents/{}",
            encode_path(repo_full_name),
            encode_path(path)
        );
        self.get_json(token, &url, &format!("{}/{}", repo_full_name, path))
            .await
    }
}

#[async_trait]
impl RemoteGateway for GitHubGateway {
    async fn fetch_viewer(&self, token: Option<&AccessToken>) -> GatewayResult<RemoteUser> {
        let token = require_token(token)?;
        let viewer: ViewerResponse = self.get_json(token, "/user", "viewer").await?;
        Ok(RemoteUser {
            github_id: viewer.id.to_string(),
            login: viewer.login,
            avatar_url: viewer.avatar_url,
        })
    }

    async fn list_repositories(
        &self,
        token: Option<&AccessToken>,
    ) -> GatewayResult<Vec<RemoteRepository>> {
        let token = require_token(token)?;
        let mut repos = Vec::new();
        let mut url = format!("{}/user/repos?sort=updated&per_page=100", self.api_url);

        // Every page is read or the call fails; never a partial listing
        for page in 1..=MAX_REPOSITORY_PAGES {
            let response = self
                .request_url(Method::GET, token, &url)
                .send()
                .await
                .map_err(transport_error)?;
            let next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|h| h.to_str().ok())
                .and_then(next_page_url);
            let batch: Vec<RepositoryResponse> = Self::parse(response, "repositories").await?;
            repos.extend(batch.into_iter().map(RemoteRepository::from));

            match next {
                Some(next) => url = next,
                None => {
                    tracing::debug!(count = repos.len(), pages = page, "listed remote repositories");
                    return Ok(repos);
                }
            }
        }
        Err(GatewayError::Unavailable(format!(
            "repository listing exceeds {} pages",
            MAX_REPOSITORY_PAGES
        )))
    }

    async fn fetch_file(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
    ) -> GatewayResult<RemoteFile> {
        let token = require_token(token)?;
        let contents = self.contents(token, repo_full_name, path).await?;
        // Files over 1 MB come back with encoding "none" and empty content
        let encoded = match (contents.encoding.as_deref(), contents.content) {
            (Some("base64"), Some(encoded)) => encoded,
            _ => {
                return Err(GatewayError::Unavailable(format!(
                    "{}/{} has no inline content",
                    repo_full_name, path
                )))
            }
        };
        Ok(RemoteFile {
            content: decode_content(&encoded)?,
            sha: contents.sha,
        })
    }

    async fn fetch_current_sha(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
    ) -> GatewayResult<Option<String>> {
        let token = require_token(token)?;
        match self.contents(token, repo_full_name, path).await {
            Ok(contents) => Ok(Some(contents.sha)),
            Err(GatewayError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn write_file(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
        path: &str,
        content: &str,
        base_sha: Option<&str>,
    ) -> GatewayResult<String> {
        let token = require_token(token)?;
        let body = WriteRequest {
            message: format!("Update {} via gitmark", path),
            content: base64::engine::general_purpose::STANDARD.encode(content),
            sha: base_sha,
        };
        let url = format!(
            "/repos/{}/contents/{}",
            encode_path(repo_full_name),
            encode_path(path)
        );
        let response = self
            .request(Method::PUT, token, &url)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            let reason = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| status.to_string());
            return Err(GatewayError::Rejected {
                path: path.to_string(),
                reason,
            });
        }
        let written: WriteResponse =
            Self::parse(response, &format!("{}/{}", repo_full_name, path)).await?;
        Ok(written.content.sha)
    }

    async fn list_markdown_paths(
        &self,
        token: Option<&AccessToken>,
        repo_full_name: &str,
    ) -> GatewayResult<Vec<String>> {
        let token = require_token(token)?;
        let repo = encode_path(repo_full_name);
        let details: RepositoryDetails = self
            .get_json(token, &format!("/repos/{}", repo), repo_full_name)
            .await?;
        let branch = details.default_branch.ok_or_else(|| {
            GatewayError::Unavailable(format!("{} has no default branch", repo_full_name))
        })?;

        let tree: TreeResponse = self
            .get_json(
                token,
                &format!(
                    "/repos/{}/git/trees/{}?recursive=1",
                    repo,
                    urlencoding::encode(&branch)
                ),
                repo_full_name,
            )
            .await?;
        Ok(tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob" && is_markdown_path(&entry.path))
            .map(|entry| entry.path)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token() -> AccessToken {
        AccessToken::new("ghp_test")
    }

    async fn setup() -> (MockServer, GitHubGateway) {
        let server = MockServer::start().await;
        let gateway = GitHubGateway::new(server.uri(), "gitmark-test");
        (server, gateway)
    }

    #[test]
    fn test_encode_path_keeps_separators() {
        assert_eq!(encode_path("docs/my notes.md"), "docs/my%20notes.md");
        assert_eq!(encode_path("octo/notes"), "octo/notes");
    }

    #[test]
    fn test_next_page_url() {
        let link = r#"<https://api.github.com/user/repos?page=2>; rel="next", <https://api.github.com/user/repos?page=5>; rel="last""#;
        assert_eq!(
            next_page_url(link).as_deref(),
            Some("https://api.github.com/user/repos?page=2")
        );
        let last = r#"<https://api.github.com/user/repos?page=1>; rel="prev", <https://api.github.com/user/repos?page=1>; rel="first""#;
        assert_eq!(next_page_url(last), None);
    }

    #[test]
    fn test_decode_content_ignores_line_breaks() {
        assert_eq!(decode_content("IyBI\naQ==\n").unwrap(), "# Hi");
    }

    #[tokio::test]
    async fn test_fetch_viewer_sends_credentials() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .and(header("authorization", "Bearer ghp_test"))
            .and(header("user-agent", "gitmark-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 583231,
                "login": "octocat",
                "avatar_url": "https://avatars.example.com/u/583231"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let viewer = gateway.fetch_viewer(Some(&token())).await.unwrap();
        assert_eq!(viewer.github_id, "583231");
        assert_eq!(viewer.login, "octocat");
    }

    #[tokio::test]
    async fn test_missing_token_makes_no_request() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(
            gateway.list_repositories(None).await,
            Err(GatewayError::Unauthenticated)
        );
        assert_eq!(
            gateway.fetch_file(None, "octo/notes", "README.md").await,
            Err(GatewayError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_refused_token_is_unauthenticated() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Bad credentials"
            })))
            .mount(&server)
            .await;

        assert_eq!(
            gateway.list_repositories(Some(&token())).await,
            Err(GatewayError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_list_repositories() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .and(query_param("sort", "updated"))
            .and(query_param("per_page", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "name": "notes", "full_name": "octo/notes",
                 "owner": {"login": "octo"}, "private": true},
                {"id": 2, "name": "blog", "full_name": "octo/blog",
                 "owner": {"login": "octo"}, "private": false}
            ])))
            .mount(&server)
            .await;

        let repos = gateway.list_repositories(Some(&token())).await.unwrap();
        assert_eq!(
            repos,
            vec![
                RemoteRepository::new("1", "octo/notes").with_private(true),
                RemoteRepository::new("2", "octo/blog"),
            ]
        );
    }

    #[tokio::test]
    async fn test_list_repositories_follows_next_page() {
        let (server, gateway) = setup().await;
        let first_page: Vec<serde_json::Value> = (1..=100)
            .map(|i| {
                json!({"id": i, "name": format!("repo{}", i), "full_name": format!("octo/repo{}", i),
                       "owner": {"login": "octo"}, "private": false})
            })
            .collect();
        let next = format!("<{}/user/repos?sort=updated&per_page=100&page=2>; rel=\"next\"", server.uri());

        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 101, "name": "late", "full_name": "octo/late",
                 "owner": {"login": "octo"}, "private": false}
            ])))
            .with_priority(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", next.as_str())
                    .set_body_json(json!(first_page)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let repos = gateway.list_repositories(Some(&token())).await.unwrap();
        assert_eq!(repos.len(), 101);
        assert_eq!(repos[100].full_name, "octo/late");
    }

    #[tokio::test]
    async fn test_failed_later_page_fails_listing() {
        let (server, gateway) = setup().await;
        let next = format!("<{}/user/repos?page=2>; rel=\"next\"", server.uri());
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/user/repos"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", next.as_str())
                    .set_body_json(json!([])),
            )
            .mount(&server)
            .await;

        let result = gateway.list_repositories(Some(&token())).await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_large_file_without_inline_content_is_unavailable() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/notes/contents/big.md"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "bigsha",
                "encoding": "none",
                "content": ""
            })))
            .mount(&server)
            .await;

        let result = gateway
            .fetch_file(Some(&token()), "octo/notes", "big.md")
            .await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));

        // The SHA lookup used before a push still works
        let sha = gateway
            .fetch_current_sha(Some(&token()), "octo/notes", "big.md")
            .await
            .unwrap();
        assert_eq!(sha.as_deref(), Some("bigsha"));
    }

    #[tokio::test]
    async fn test_fetch_file_decodes_content() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/notes/contents/docs/guide.md"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sha": "abc",
                "encoding": "base64",
                "content": "IyBI\naQ==\n"
            })))
            .mount(&server)
            .await;

        let file = gateway
            .fetch_file(Some(&token()), "octo/notes", "docs/guide.md")
            .await
            .unwrap();
        assert_eq!(file.content, "# Hi");
        assert_eq!(file.sha, "abc");
    }

    #[tokio::test]
    async fn test_fetch_missing_file() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/notes/contents/missing.md"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = gateway
            .fetch_file(Some(&token()), "octo/notes", "missing.md")
            .await;
        assert!(matches!(result, Err(GatewayError::NotFound(_))));

        let sha = gateway
            .fetch_current_sha(Some(&token()), "octo/notes", "missing.md")
            .await
            .unwrap();
        assert_eq!(sha, None);
    }

    #[tokio::test]
    async fn test_write_file_with_base_sha() {
        let (server, gateway) = setup().await;
        Mock::given(method("PUT"))
            .and(path("/repos/octo/notes/contents/README.md"))
            .and(body_partial_json(json!({
                "message": "Update README.md via gitmark",
                "content": "IyBIaSB0aGVyZQ==",
                "sha": "abc"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": {"sha": "def", "path": "README.md"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sha = gateway
            .write_file(
                Some(&token()),
                "octo/notes",
                "README.md",
                "# Hi there",
                Some("abc"),
            )
            .await
            .unwrap();
        assert_eq!(sha, "def");
    }

    #[tokio::test]
    async fn test_write_conflict_is_rejected() {
        let (server, gateway) = setup().await;
        Mock::given(method("PUT"))
            .and(path("/repos/octo/notes/contents/README.md"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "message": "README.md does not match abc"
            })))
            .mount(&server)
            .await;

        let result = gateway
            .write_file(Some(&token()), "octo/notes", "README.md", "x", Some("abc"))
            .await;
        assert_eq!(
            result,
            Err(GatewayError::Rejected {
                path: "README.md".to_string(),
                reason: "README.md does not match abc".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_server_error_is_unavailable() {
        let (server, gateway) = setup().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let result = gateway
            .write_file(Some(&token()), "octo/notes", "README.md", "x", None)
            .await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_list_markdown_paths_reads_default_branch() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/notes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "default_branch": "trunk"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/notes/git/trees/trunk"))
            .and(query_param("recursive", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tree": [
                    {"path": "README.md", "type": "blob"},
                    {"path": "docs", "type": "tree"},
                    {"path": "docs/guide.md", "type": "blob"},
                    {"path": "src/main.rs", "type": "blob"},
                    {"path": "odd.md", "type": "tree"}
                ]
            })))
            .mount(&server)
            .await;

        let paths = gateway
            .list_markdown_paths(Some(&token()), "octo/notes")
            .await
            .unwrap();
        assert_eq!(paths, vec!["README.md", "docs/guide.md"]);
    }

    #[tokio::test]
    async fn test_missing_default_branch_is_unavailable() {
        let (server, gateway) = setup().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let result = gateway
            .list_markdown_paths(Some(&token()), "octo/empty")
            .await;
        assert!(matches!(result, Err(GatewayError::Unavailable(_))));
    }
}
