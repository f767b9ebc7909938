//! Import sources and their per-stage strategies.
//!
//! Each [`SourceType`] resolves to at most one [`UploadStrategy`] and exactly
//! one [`PullStrategy`]. Strategies hold no state; everything they need comes
//! in through a [`StageContext`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{Backend, FeishuCredentials, JobState, ParsedArchive, ProgressFn, ScrapeTarget},
    error::{ImportError, Result},
    items::Item,
};

/// External document source being imported from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    #[default]
    OfflineFile,
    Epub,
    Url,
    Rss,
    Sitemap,
    Notion,
    Feishu,
    Confluence,
    #[serde(rename = "wikijs")]
    WikiJs,
    Siyuan,
    #[serde(rename = "mindoc")]
    MinDoc,
    Yuque,
}

/// How a source produces its initial items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    /// Local files, one item per file.
    Files,
    /// A single export archive, replaced by its documents after upload.
    Archive,
    /// A list of page URLs.
    Urls,
    /// One RSS or sitemap URL listed by the backend.
    Feed,
    /// Pages visible to a Notion integration token.
    Notion,
    /// Feishu wiki spaces and cloud documents.
    Feishu,
}

impl SourceType {
    pub const ALL: [SourceType; 12] = [
        SourceType::OfflineFile,
        SourceType::Epub,
        SourceType::Url,
        SourceType::Rss,
        SourceType::Sitemap,
        SourceType::Notion,
        SourceType::Feishu,
        SourceType::Confluence,
        SourceType::WikiJs,
        SourceType::Siyuan,
        SourceType::MinDoc,
        SourceType::Yuque,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::OfflineFile => "offline-file",
            SourceType::Epub => "epub",
            SourceType::Url => "url",
            SourceType::Rss => "rss",
            SourceType::Sitemap => "sitemap",
            SourceType::Notion => "notion",
            SourceType::Feishu => "feishu",
            SourceType::Confluence => "confluence",
            SourceType::WikiJs => "wikijs",
            SourceType::Siyuan => "siyuan",
            SourceType::MinDoc => "mindoc",
            SourceType::Yuque => "yuque",
        }
    }

    pub fn input_mode(&self) -> InputMode {
        match self {
            SourceType::OfflineFile | SourceType::Epub => InputMode::Files,
            SourceType::Url => InputMode::Urls,
            SourceType::Rss | SourceType::Sitemap => InputMode::Feed,
            SourceType::Notion => InputMode::Notion,
            SourceType::Feishu => InputMode::Feishu,
            SourceType::Confluence
            | SourceType::WikiJs
            | SourceType::Siyuan
            | SourceType::MinDoc
            | SourceType::Yuque => InputMode::Archive,
        }
    }

    /// Next source in [`SourceType::ALL`], wrapping around.
    pub fn cycle(&self) -> SourceType {
        let idx = Self::ALL.iter().position(|s| s == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    /// Upload handler, if this source has an upload stage.
    pub fn upload_strategy(&self) -> Option<&'static dyn UploadStrategy> {
        match self {
            SourceType::OfflineFile | SourceType::Epub => Some(&RegisteredFileUpload),
            SourceType::Url => Some(&DirectScrapeUpload),
            SourceType::Confluence
            | SourceType::WikiJs
            | SourceType::Siyuan
            | SourceType::MinDoc
            | SourceType::Yuque => Some(&ArchiveUpload),
            SourceType::Rss | SourceType::Sitemap | SourceType::Notion | SourceType::Feishu => {
                None
            }
        }
    }

    pub fn pull_strategy(&self) -> &'static dyn PullStrategy {
        match self {
            SourceType::Rss | SourceType::Sitemap => &UrlScrapePull,
            SourceType::Confluence
            | SourceType::WikiJs
            | SourceType::Siyuan
            | SourceType::MinDoc
            | SourceType::Notion => &DocScrapePull,
            SourceType::Feishu => &FeishuPull,
            SourceType::OfflineFile | SourceType::Epub | SourceType::Url | SourceType::Yuque => {
                &PollingPull
            }
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs a strategy needs besides the item itself.
#[derive(Clone)]
pub struct StageContext {
    pub backend: Arc<dyn Backend>,
    pub source: SourceType,
    pub kb_id: String,
    /// Backend id tying pulls to an earlier listing or archive parse.
    pub orchestration_id: String,
    pub feishu: FeishuCredentials,
    pub poll_interval: Duration,
    pub progress: Option<ProgressFn>,
}

/// Result of an upload stage.
#[derive(Debug)]
pub enum Uploaded {
    /// File stored; `id` is the backend job handle when one was registered.
    Stored { id: Option<String> },
    /// Upload and pull collapsed into one scrape.
    Scraped {
        id: Option<String>,
        title: Option<String>,
        content: String,
    },
    /// Archive split into documents; replaces the whole collection.
    Parsed(ParsedArchive),
}

/// Result of a pull stage.
#[derive(Debug, Clone, PartialEq)]
pub struct Pulled {
    pub title: Option<String>,
    pub content: String,
}

#[async_trait]
pub trait UploadStrategy: Send + Sync {
    async fn upload(
        &self,
        ctx: &StageContext,
        item: &Item,
        token: &CancellationToken,
    ) -> Result<Uploaded>;
}

#[async_trait]
pub trait PullStrategy: Send + Sync {
    async fn pull(&self, ctx: &StageContext, item: &Item, token: &CancellationToken)
    -> Result<Pulled>;
}

/// Pulls belong to the listing that produced the item, not the latest one.
fn orchestration_of<'a>(ctx: &'a StageContext, item: &'a Item) -> &'a str {
    if item.orchestration_id.is_empty() {
        &ctx.orchestration_id
    } else {
        &item.orchestration_id
    }
}

fn local_file(item: &Item) -> Result<&std::path::Path> {
    item.file
        .as_deref()
        .ok_or_else(|| ImportError::Validation(format!("{} has no local file", item.title)))
}

fn noop_progress() -> ProgressFn {
    Arc::new(|_| {})
}

/// Multipart upload followed by a parse registration that yields a job id.
struct RegisteredFileUpload;

#[async_trait]
impl UploadStrategy for RegisteredFileUpload {
    async fn upload(
        &self,
        ctx: &StageContext,
        item: &Item,
        token: &CancellationToken,
    ) -> Result<Uploaded> {
        let path = local_file(item)?;
        let progress = ctx.progress.clone().unwrap_or_else(noop_progress);
        let stored = ctx.backend.upload(path, &ctx.kb_id, progress, token).await?;
        let task_id = ctx
            .backend
            .register_parsed_upload(&ctx.kb_id, ctx.source, &stored.key, &stored.filename, token)
            .await?;
        Ok(Uploaded::Stored { id: Some(task_id) })
    }
}

/// URL source: the scrape is the upload and already carries the content.
struct DirectScrapeUpload;

#[async_trait]
impl UploadStrategy for DirectScrapeUpload {
    async fn upload(
        &self,
        ctx: &StageContext,
        item: &Item,
        token: &CancellationToken,
    ) -> Result<Uploaded> {
        let target = ScrapeTarget::Url {
            url: &item.key,
            orchestration_id: &ctx.orchestration_id,
        };
        let scraped = ctx.backend.scrape(&ctx.kb_id, target, token).await?;
        Ok(Uploaded::Scraped {
            id: scraped.id,
            title: scraped.title,
            content: scraped.content,
        })
    }
}

/// Export archive parsed server side into a list of documents.
struct ArchiveUpload;

#[async_trait]
impl UploadStrategy for ArchiveUpload {
    async fn upload(
        &self,
        ctx: &StageContext,
        item: &Item,
        token: &CancellationToken,
    ) -> Result<Uploaded> {
        let path = local_file(item)?;
        let progress = ctx.progress.clone().unwrap_or_else(noop_progress);
        let parsed = ctx
            .backend
            .upload_and_parse(&ctx.kb_id, ctx.source, path, progress, token)
            .await?;
        Ok(Uploaded::Parsed(parsed))
    }
}

/// RSS/Sitemap entries: the item key is the page URL.
struct UrlScrapePull;

#[async_trait]
impl PullStrategy for UrlScrapePull {
    async fn pull(
        &self,
        ctx: &StageContext,
        item: &Item,
        token: &CancellationToken,
    ) -> Result<Pulled> {
        let target = ScrapeTarget::Url {
            url: &item.key,
            orchestration_id: orchestration_of(ctx, item),
        };
        let scraped = ctx.backend.scrape(&ctx.kb_id, target, token).await?;
        Ok(Pulled {
            title: scraped.title,
            content: scraped.content,
        })
    }
}

/// Documents addressed by backend id within an orchestration.
struct DocScrapePull;

#[async_trait]
impl PullStrategy for DocScrapePull {
    async fn pull(
        &self,
        ctx: &StageContext,
        item: &Item,
        token: &CancellationToken,
    ) -> Result<Pulled> {
        let target = ScrapeTarget::Doc {
            id: &item.id,
            orchestration_id: orchestration_of(ctx, item),
        };
        let scraped = ctx.backend.scrape(&ctx.kb_id, target, token).await?;
        Ok(Pulled {
            title: scraped.title,
            content: scraped.content,
        })
    }
}

struct FeishuPull;

#[async_trait]
impl PullStrategy for FeishuPull {
    async fn pull(
        &self,
        ctx: &StageContext,
        item: &Item,
        token: &CancellationToken,
    ) -> Result<Pulled> {
        let target = ScrapeTarget::Feishu {
            id: &item.id,
            space_id: item.group_key.as_deref().unwrap_or(""),
            file_type: item.file_type.as_deref().unwrap_or(""),
            credentials: &ctx.feishu,
        };
        let scraped = ctx.backend.scrape(&ctx.kb_id, target, token).await?;
        Ok(Pulled {
            title: scraped.title,
            content: scraped.content,
        })
    }
}

/// Asynchronous backend job, polled by id until it completes or fails.
struct PollingPull;

#[async_trait]
impl PullStrategy for PollingPull {
    async fn pull(
        &self,
        ctx: &StageContext,
        item: &Item,
        token: &CancellationToken,
    ) -> Result<Pulled> {
        // A direct scrape may already have delivered the body.
        if !item.content.is_empty() {
            return Ok(Pulled {
                title: None,
                content: item.content.clone(),
            });
        }
        if item.id.is_empty() {
            return Err(ImportError::JobFailed(format!(
                "{} has no backend task id",
                item.title
            )));
        }

        loop {
            if token.is_cancelled() {
                return Err(ImportError::Aborted);
            }
            let result = ctx.backend.poll_job_result(&item.id, token).await?;
            match result.status {
                JobState::Completed => {
                    return Ok(Pulled {
                        title: result.title,
                        content: result.content.unwrap_or_default(),
                    });
                }
                JobState::Failed => {
                    return Err(ImportError::JobFailed(
                        result.error.unwrap_or_else(|| "parse job failed".into()),
                    ));
                }
                JobState::Pending => {
                    tracing::debug!("job {} pending, retrying", item.id);
                }
            }
            tokio::select! {
                _ = token.cancelled() => return Err(ImportError::Aborted),
                _ = tokio::time::sleep(ctx.poll_interval) => {}
            }
        }
    }
}
