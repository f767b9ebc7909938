//! Backend RPCs used by the import pipeline, and their HTTP binding.

use async_trait::async_trait;
use reqwest::{
    Client,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::{future::Future, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{ImportError, Result},
    source::SourceType,
};

/// Upload progress sink, called with a percentage in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Chunk size used to report upload progress.
const UPLOAD_CHUNK: usize = 64 * 1024;

/// Stored file handle returned by the upload endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub key: String,
    pub filename: String,
}

/// Which document a scrape call addresses.
#[derive(Debug, Clone, Copy)]
pub enum ScrapeTarget<'a> {
    Url {
        url: &'a str,
        orchestration_id: &'a str,
    },
    Doc {
        id: &'a str,
        orchestration_id: &'a str,
    },
    Feishu {
        id: &'a str,
        space_id: &'a str,
        file_type: &'a str,
        credentials: &'a FeishuCredentials,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeResult {
    /// Job handle, when the backend keeps processing asynchronously.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobResult {
    pub status: JobState,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A document discovered by an archive parse or a listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParsedDoc {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParsedArchive {
    #[serde(rename = "id")]
    pub orchestration_id: String,
    pub docs: Vec<ParsedDoc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedEntry {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// RSS/Sitemap listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedListing {
    #[serde(rename = "id")]
    pub orchestration_id: String,
    pub entries: Vec<FeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotionListing {
    #[serde(rename = "id")]
    pub orchestration_id: String,
    pub pages: Vec<ParsedDoc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeishuCredentials {
    pub app_id: String,
    pub app_secret: String,
    pub user_access_token: String,
}

impl FeishuCredentials {
    pub fn is_complete(&self) -> bool {
        !self.app_id.is_empty() && !self.app_secret.is_empty() && !self.user_access_token.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeishuSpace {
    pub space_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeishuDoc {
    pub id: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub space_id: Option<String>,
    #[serde(default)]
    pub file_type: String,
    pub title: String,
}

/// Payload for creating a document node.
#[derive(Debug, Clone, Serialize)]
pub struct NewDocument<'a> {
    pub kb_id: &'a str,
    pub parent_id: &'a str,
    pub name: &'a str,
    pub content: &'a str,
}

/// Asynchronous RPCs the import pipeline depends on.
///
/// Every call must reject with [`ImportError::Aborted`] promptly once the
/// token is cancelled.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn upload(
        &self,
        file: &Path,
        kb_id: &str,
        on_progress: ProgressFn,
        token: &CancellationToken,
    ) -> Result<UploadedFile>;

    /// Turn a stored upload into a tracked parse job and return its id.
    async fn register_parsed_upload(
        &self,
        kb_id: &str,
        source: SourceType,
        key: &str,
        filename: &str,
        token: &CancellationToken,
    ) -> Result<String>;

    async fn scrape(
        &self,
        kb_id: &str,
        target: ScrapeTarget<'_>,
        token: &CancellationToken,
    ) -> Result<ScrapeResult>;

    async fn poll_job_result(&self, task_id: &str, token: &CancellationToken) -> Result<JobResult>;

    /// Create a document and return its node id.
    async fn create_document(
        &self,
        doc: NewDocument<'_>,
        token: &CancellationToken,
    ) -> Result<String>;

    async fn upload_and_parse(
        &self,
        kb_id: &str,
        source: SourceType,
        file: &Path,
        on_progress: ProgressFn,
        token: &CancellationToken,
    ) -> Result<ParsedArchive>;

    async fn parse_feed(
        &self,
        kb_id: &str,
        source: SourceType,
        feed_url: &str,
        token: &CancellationToken,
    ) -> Result<FeedListing>;

    async fn list_notion_pages(
        &self,
        kb_id: &str,
        integration_token: &str,
        token: &CancellationToken,
    ) -> Result<NotionListing>;

    async fn list_feishu_spaces(
        &self,
        credentials: &FeishuCredentials,
        token: &CancellationToken,
    ) -> Result<Vec<FeishuSpace>>;

    async fn list_feishu_docs(
        &self,
        credentials: &FeishuCredentials,
        token: &CancellationToken,
    ) -> Result<Vec<FeishuDoc>>;

    async fn search_feishu_wiki(
        &self,
        credentials: &FeishuCredentials,
        space_id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<FeishuDoc>>;
}

/// Race a request against the token; dropping the request aborts it.
async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ImportError::Aborted),
        r = fut => r,
    }
}

/// Response envelope used by every endpoint.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct IdData {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    task_id: String,
}

/// Backend reached over HTTP/JSON.
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize + Sync + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        unwrap_envelope(resp).await
    }

    async fn file_part(path: &Path, on_progress: ProgressFn) -> Result<Part> {
        let data = tokio::fs::read(path).await?;
        let total = data.len() as u64;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());

        let chunks: Vec<Vec<u8>> = data.chunks(UPLOAD_CHUNK).map(<[u8]>::to_vec).collect();
        let mut sent = 0u64;
        let stream = futures::stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            let pct = if total == 0 { 100 } else { sent * 100 / total };
            on_progress(pct.min(100) as u8);
            Ok::<_, std::io::Error>(chunk)
        }));

        Ok(Part::stream_with_length(reqwest::Body::wrap_stream(stream), total).file_name(filename))
    }
}

/// Convert non-2xx responses and failed envelopes into errors.
async fn unwrap_envelope<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ImportError::Api {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = resp.bytes().await?;
    let envelope: Envelope<T> = serde_json::from_slice(&bytes)?;
    match (envelope.success, envelope.data) {
        (true, Some(data)) => Ok(data),
        (_, _) => Err(ImportError::Api {
            status: status.as_u16(),
            body: envelope.message.unwrap_or_else(|| "empty response".into()),
        }),
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn upload(
        &self,
        file: &Path,
        kb_id: &str,
        on_progress: ProgressFn,
        token: &CancellationToken,
    ) -> Result<UploadedFile> {
        cancellable(token, async {
            let form = Form::new()
                .text("kb_id", kb_id.to_string())
                .part("file", Self::file_part(file, on_progress).await?);
            let resp = self
                .http
                .post(self.url("/api/v1/file/upload"))
                .multipart(form)
                .send()
                .await?;
            unwrap_envelope(resp).await
        })
        .await
    }

    async fn register_parsed_upload(
        &self,
        kb_id: &str,
        source: SourceType,
        key: &str,
        filename: &str,
        token: &CancellationToken,
    ) -> Result<String> {
        let body = serde_json::json!({
            "kb_id": kb_id,
            "source": source,
            "key": key,
            "filename": filename,
        });
        let data: TaskData =
            cancellable(token, self.post_json("/api/v1/crawler/parse", &body)).await?;
        Ok(data.task_id)
    }

    async fn scrape(
        &self,
        kb_id: &str,
        target: ScrapeTarget<'_>,
        token: &CancellationToken,
    ) -> Result<ScrapeResult> {
        let body = match target {
            ScrapeTarget::Url {
                url,
                orchestration_id,
            } => serde_json::json!({ "kb_id": kb_id, "url": url, "id": orchestration_id }),
            ScrapeTarget::Doc {
                id,
                orchestration_id,
            } => serde_json::json!({ "kb_id": kb_id, "doc_id": id, "id": orchestration_id }),
            ScrapeTarget::Feishu {
                id,
                space_id,
                file_type,
                credentials,
            } => serde_json::json!({
                "kb_id": kb_id,
                "doc_id": id,
                "space_id": space_id,
                "file_type": file_type,
                "app_id": credentials.app_id,
                "app_secret": credentials.app_secret,
                "user_access_token": credentials.user_access_token,
            }),
        };
        let path = match target {
            ScrapeTarget::Feishu { .. } => "/api/v1/crawler/feishu/scrape",
            _ => "/api/v1/crawler/scrape",
        };
        cancellable(token, self.post_json(path, &body)).await
    }

    async fn poll_job_result(&self, task_id: &str, token: &CancellationToken) -> Result<JobResult> {
        cancellable(token, async {
            let url = self.url(&format!(
                "/api/v1/crawler/result?task_id={}",
                urlencoding::encode(task_id)
            ));
            let resp = self.http.get(url).send().await?;
            unwrap_envelope(resp).await
        })
        .await
    }

    async fn create_document(
        &self,
        doc: NewDocument<'_>,
        token: &CancellationToken,
    ) -> Result<String> {
        let data: IdData = cancellable(token, self.post_json("/api/v1/node", &doc)).await?;
        Ok(data.id)
    }

    async fn upload_and_parse(
        &self,
        kb_id: &str,
        source: SourceType,
        file: &Path,
        on_progress: ProgressFn,
        token: &CancellationToken,
    ) -> Result<ParsedArchive> {
        cancellable(token, async {
            let form = Form::new()
                .text("kb_id", kb_id.to_string())
                .text("source", source.as_str())
                .part("file", Self::file_part(file, on_progress).await?);
            let resp = self
                .http
                .post(self.url("/api/v1/crawler/parse-archive"))
                .multipart(form)
                .send()
                .await?;
            unwrap_envelope(resp).await
        })
        .await
    }

    async fn parse_feed(
        &self,
        kb_id: &str,
        source: SourceType,
        feed_url: &str,
        token: &CancellationToken,
    ) -> Result<FeedListing> {
        let body = serde_json::json!({ "kb_id": kb_id, "source": source, "url": feed_url });
        cancellable(token, self.post_json("/api/v1/crawler/list", &body)).await
    }

    async fn list_notion_pages(
        &self,
        kb_id: &str,
        integration_token: &str,
        token: &CancellationToken,
    ) -> Result<NotionListing> {
        let body = serde_json::json!({ "kb_id": kb_id, "integration": integration_token });
        cancellable(token, self.post_json("/api/v1/crawler/notion/list", &body)).await
    }

    async fn list_feishu_spaces(
        &self,
        credentials: &FeishuCredentials,
        token: &CancellationToken,
    ) -> Result<Vec<FeishuSpace>> {
        cancellable(
            token,
            self.post_json("/api/v1/crawler/feishu/list-spaces", credentials),
        )
        .await
    }

    async fn list_feishu_docs(
        &self,
        credentials: &FeishuCredentials,
        token: &CancellationToken,
    ) -> Result<Vec<FeishuDoc>> {
        cancellable(
            token,
            self.post_json("/api/v1/crawler/feishu/list-docs", credentials),
        )
        .await
    }

    async fn search_feishu_wiki(
        &self,
        credentials: &FeishuCredentials,
        space_id: &str,
        token: &CancellationToken,
    ) -> Result<Vec<FeishuDoc>> {
        let body = serde_json::json!({
            "app_id": credentials.app_id,
            "app_secret": credentials.app_secret,
            "user_access_token": credentials.user_access_token,
            "space_id": space_id,
        });
        cancellable(
            token,
            self.post_json("/api/v1/crawler/feishu/search-wiki", &body),
        )
        .await
    }
}

/// Scriptable in-memory backend for tests.
#[cfg(test)]
pub mod mock {
    use super::*;
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
        time::Duration,
    };

    /// Every call sleeps `latency`, then answers from canned data.
    ///
    /// Identifiers listed in `failing` reject with `JobFailed` (polls report
    /// `failed` instead). Identifiers in `blocking` never answer and only
    /// settle once their token is cancelled.
    #[derive(Default)]
    pub struct MockBackend {
        latency: Duration,
        pending_polls: usize,
        failing: HashSet<String>,
        blocking: HashSet<String>,
        archive: Vec<ParsedDoc>,
        feed: Vec<FeedEntry>,
        feeds: HashMap<String, Vec<FeedEntry>>,
        spaces: Vec<FeishuSpace>,
        space_docs: Vec<FeishuDoc>,
        calls: Mutex<HashMap<&'static str, usize>>,
        polls: Mutex<HashMap<String, usize>>,
        scraped_with: Mutex<HashMap<String, String>>,
    }

    impl MockBackend {
        pub fn latency(mut self, ms: u64) -> Self {
            self.latency = Duration::from_millis(ms);
            self
        }

        pub fn pending_polls(mut self, n: usize) -> Self {
            self.pending_polls = n;
            self
        }

        pub fn failing(mut self, id: &str) -> Self {
            self.failing.insert(id.to_string());
            self
        }

        pub fn blocking(mut self, id: &str) -> Self {
            self.blocking.insert(id.to_string());
            self
        }

        pub fn archive(mut self, docs: &[(&str, &str)]) -> Self {
            self.archive = docs
                .iter()
                .map(|(id, title)| ParsedDoc {
                    id: id.to_string(),
                    title: title.to_string(),
                })
                .collect();
            self
        }

        pub fn feed(mut self, urls: &[&str]) -> Self {
            self.feed = urls
                .iter()
                .map(|u| FeedEntry {
                    url: u.to_string(),
                    title: String::new(),
                })
                .collect();
            self
        }

        /// Entries returned only for `feed_url`.
        pub fn feed_at(mut self, feed_url: &str, urls: &[&str]) -> Self {
            let entries = urls
                .iter()
                .map(|u| FeedEntry {
                    url: u.to_string(),
                    title: String::new(),
                })
                .collect();
            self.feeds.insert(feed_url.to_string(), entries);
            self
        }

        pub fn feishu(mut self, spaces: &[(&str, &str)], docs: &[(&str, &str)]) -> Self {
            self.spaces = spaces
                .iter()
                .map(|(id, name)| FeishuSpace {
                    space_id: id.to_string(),
                    name: name.to_string(),
                })
                .collect();
            self.space_docs = docs
                .iter()
                .map(|(id, title)| FeishuDoc {
                    id: id.to_string(),
                    url: format!("https://feishu.example/{id}"),
                    space_id: None,
                    file_type: "docx".into(),
                    title: title.to_string(),
                })
                .collect();
            self
        }

        pub fn calls(&self, op: &str) -> usize {
            self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
        }

        /// Orchestration id sent with the last scrape of `id`.
        pub fn scraped_with(&self, id: &str) -> Option<String> {
            self.scraped_with.lock().unwrap().get(id).cloned()
        }

        fn note_orchestration(&self, id: &str, orchestration_id: &str) {
            self.scraped_with
                .lock()
                .unwrap()
                .insert(id.to_string(), orchestration_id.to_string());
        }

        async fn enter(&self, op: &'static str, id: &str, token: &CancellationToken) -> Result<()> {
            *self.calls.lock().unwrap().entry(op).or_default() += 1;
            if self.blocking.contains(id) {
                token.cancelled().await;
                return Err(ImportError::Aborted);
            }
            cancellable(token, async {
                tokio::time::sleep(self.latency).await;
                Ok(())
            })
            .await?;
            if self.failing.contains(id) && op != "poll" {
                return Err(ImportError::JobFailed(format!("{op} failed for {id}")));
            }
            Ok(())
        }
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    #[async_trait]
    impl Backend for MockBackend {
        async fn upload(
            &self,
            file: &Path,
            _kb_id: &str,
            on_progress: ProgressFn,
            token: &CancellationToken,
        ) -> Result<UploadedFile> {
            let name = file_name(file);
            on_progress(0);
            self.enter("upload", &name, token).await?;
            on_progress(100);
            Ok(UploadedFile {
                key: format!("file-{name}"),
                filename: name,
            })
        }

        async fn register_parsed_upload(
            &self,
            _kb_id: &str,
            _source: SourceType,
            _key: &str,
            filename: &str,
            token: &CancellationToken,
        ) -> Result<String> {
            self.enter("register", filename, token).await?;
            Ok(format!("task-{filename}"))
        }

        async fn scrape(
            &self,
            _kb_id: &str,
            target: ScrapeTarget<'_>,
            token: &CancellationToken,
        ) -> Result<ScrapeResult> {
            let (id, content) = match target {
                ScrapeTarget::Url {
                    url,
                    orchestration_id,
                } => {
                    self.note_orchestration(url, orchestration_id);
                    (url, format!("scraped {url}"))
                }
                ScrapeTarget::Doc {
                    id,
                    orchestration_id,
                } => {
                    self.note_orchestration(id, orchestration_id);
                    (id, format!("doc {id}"))
                }
                ScrapeTarget::Feishu {
                    id,
                    space_id,
                    file_type,
                    ..
                } => (id, format!("feishu {id} in {space_id} ({file_type})")),
            };
            self.enter("scrape", id, token).await?;
            Ok(ScrapeResult {
                id: None,
                title: Some(format!("title {id}")),
                content,
            })
        }

        async fn poll_job_result(
            &self,
            task_id: &str,
            token: &CancellationToken,
        ) -> Result<JobResult> {
            self.enter("poll", task_id, token).await?;
            if self.failing.contains(task_id) {
                return Ok(JobResult {
                    status: JobState::Failed,
                    title: None,
                    content: None,
                    error: Some(format!("parse failed for {task_id}")),
                });
            }
            let seen = {
                let mut polls = self.polls.lock().unwrap();
                let n = polls.entry(task_id.to_string()).or_default();
                *n += 1;
                *n
            };
            if seen <= self.pending_polls {
                return Ok(JobResult {
                    status: JobState::Pending,
                    title: None,
                    content: None,
                    error: None,
                });
            }
            Ok(JobResult {
                status: JobState::Completed,
                title: None,
                content: Some(format!("content of {task_id}")),
                error: None,
            })
        }

        async fn create_document(
            &self,
            doc: NewDocument<'_>,
            token: &CancellationToken,
        ) -> Result<String> {
            self.enter("create", doc.name, token).await?;
            Ok(format!("node-{}", doc.name))
        }

        async fn upload_and_parse(
            &self,
            _kb_id: &str,
            _source: SourceType,
            file: &Path,
            on_progress: ProgressFn,
            token: &CancellationToken,
        ) -> Result<ParsedArchive> {
            on_progress(0);
            self.enter("upload_and_parse", &file_name(file), token)
                .await?;
            on_progress(100);
            Ok(ParsedArchive {
                orchestration_id: "archive-orch".into(),
                docs: self.archive.clone(),
            })
        }

        async fn parse_feed(
            &self,
            _kb_id: &str,
            _source: SourceType,
            feed_url: &str,
            token: &CancellationToken,
        ) -> Result<FeedListing> {
            self.enter("parse_feed", feed_url, token).await?;
            Ok(FeedListing {
                orchestration_id: format!("orch-{feed_url}"),
                entries: self
                    .feeds
                    .get(feed_url)
                    .cloned()
                    .unwrap_or_else(|| self.feed.clone()),
            })
        }

        async fn list_notion_pages(
            &self,
            _kb_id: &str,
            integration_token: &str,
            token: &CancellationToken,
        ) -> Result<NotionListing> {
            self.enter("notion", integration_token, token).await?;
            Ok(NotionListing {
                orchestration_id: "notion-orch".into(),
                pages: self.archive.clone(),
            })
        }

        async fn list_feishu_spaces(
            &self,
            credentials: &FeishuCredentials,
            token: &CancellationToken,
        ) -> Result<Vec<FeishuSpace>> {
            self.enter("feishu_spaces", &credentials.app_id, token)
                .await?;
            Ok(self.spaces.clone())
        }

        async fn list_feishu_docs(
            &self,
            credentials: &FeishuCredentials,
            token: &CancellationToken,
        ) -> Result<Vec<FeishuDoc>> {
            self.enter("feishu_docs", &credentials.app_id, token).await?;
            Ok(Vec::new())
        }

        async fn search_feishu_wiki(
            &self,
            _credentials: &FeishuCredentials,
            space_id: &str,
            token: &CancellationToken,
        ) -> Result<Vec<FeishuDoc>> {
            self.enter("feishu_search", space_id, token).await?;
            Ok(self
                .space_docs
                .iter()
                .cloned()
                .map(|mut d| {
                    d.space_id = Some(space_id.to_string());
                    d
                })
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slash_from_base_url() {
        let b = HttpBackend::new("http://localhost:8000/");
        assert_eq!(b.url("/api/v1/node"), "http://localhost:8000/api/v1/node");
    }

    #[test]
    fn envelope_maps_archive_payload() {
        let json = r#"{"success":true,"data":{"id":"o-1","docs":[{"id":"d1","title":"Intro"}]}}"#;
        let env: Envelope<ParsedArchive> = serde_json::from_str(json).unwrap();
        let data = env.data.unwrap();
        assert_eq!(data.orchestration_id, "o-1");
        assert_eq!(data.docs[0].title, "Intro");
    }

    #[test]
    fn job_result_status_is_snake_case() {
        let r: JobResult = serde_json::from_str(r#"{"status":"completed","content":"x"}"#).unwrap();
        assert_eq!(r.status, JobState::Completed);
        assert_eq!(r.content.as_deref(), Some("x"));
    }

    #[test]
    fn feishu_credentials_need_all_fields() {
        let mut c = FeishuCredentials {
            app_id: "a".into(),
            app_secret: "s".into(),
            user_access_token: String::new(),
        };
        assert!(!c.is_complete());
        c.user_access_token = "u".into();
        assert!(c.is_complete());
    }

    #[tokio::test]
    async fn cancellable_prefers_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let r: Result<()> = cancellable(&token, std::future::pending()).await;
        assert!(r.unwrap_err().is_abort());
    }
}
