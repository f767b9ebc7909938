//! Import session: turns user actions into queue tasks for the active source.
//!
//! The session owns the item store. Every operation first flips the targeted
//! items into the stage's in-progress status, then enqueues one task per item.
//! Task callbacks never touch the store directly; they send
//! [`SessionEvent`]s that [`ImportSession::pump`] applies in order.
//! Events carry the generation they were produced in, and `pump` drops
//! those from before the last reset or archive swap.

use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    backend::{
        Backend, FeedListing, FeishuCredentials, FeishuDoc, FeishuSpace, NewDocument,
        NotionListing, ProgressFn,
    },
    config::Config,
    error::{ImportError, Result},
    items::{Item, ItemKind, Stage, Step},
    queue::{Task, TaskQueue},
    source::{InputMode, Pulled, SourceType, StageContext, UploadStrategy, Uploaded},
    store::{ItemPatch, ItemStore},
    view::{self, Summary},
};

/// State changes produced by settled tasks.
#[derive(Debug)]
pub enum SessionEvent {
    Patch {
        key: String,
        patch: ItemPatch,
    },
    /// Items discovered by a source listing.
    Listed {
        orchestration_id: Option<String>,
        items: Vec<Item>,
    },
    /// An archive was parsed; its documents replace the collection.
    Archive {
        orchestration_id: String,
        items: Vec<Item>,
    },
    Children {
        folder_key: String,
        children: Vec<Item>,
    },
    /// Human readable message for the log panel.
    Notice(String),
}

/// Cloneable sender handed to task callbacks.
#[derive(Clone)]
struct Emitter {
    tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
    generation: u64,
}

impl Emitter {
    fn send(&self, event: SessionEvent) {
        // The receiver lives as long as the session; after that nobody cares.
        let _ = self.tx.send((self.generation, event));
    }

    fn patch(&self, key: &str, patch: ItemPatch) {
        self.send(SessionEvent::Patch {
            key: key.to_string(),
            patch,
        });
    }

    fn notice(&self, msg: impl Into<String>) {
        self.send(SessionEvent::Notice(msg.into()));
    }
}

pub struct ImportSession {
    source: SourceType,
    kb_id: String,
    parent_id: String,
    notion_token: String,
    feishu: FeishuCredentials,
    poll_interval: Duration,
    orchestration_id: String,
    store: ItemStore,
    queue: TaskQueue,
    backend: Arc<dyn Backend>,
    /// Bumped whenever the collection is thrown away.
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, SessionEvent)>,
    rx: mpsc::UnboundedReceiver<(u64, SessionEvent)>,
}

impl ImportSession {
    pub fn new(cfg: &Config, backend: Arc<dyn Backend>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            source: cfg.import.source,
            kb_id: cfg.server.kb_id.clone(),
            parent_id: cfg.server.parent_id.clone(),
            notion_token: cfg.notion.integration_token.clone(),
            feishu: cfg.feishu.clone(),
            poll_interval: cfg.import.poll_interval(),
            orchestration_id: String::new(),
            store: ItemStore::default(),
            queue: TaskQueue::new(cfg.import.max_concurrent),
            backend,
            generation: 0,
            tx,
            rx,
        }
    }

    pub fn source(&self) -> SourceType {
        self.source
    }

    pub fn store(&self) -> &ItemStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut ItemStore {
        &mut self.store
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.queue
    }

    pub fn orchestration_id(&self) -> &str {
        &self.orchestration_id
    }

    pub fn summary(&self) -> Summary {
        view::summarize(self.store.items(), self.store.selection())
    }

    // --- item producers ---

    /// Add local files. Archive sources take exactly one file and start over.
    pub fn add_files(&mut self, paths: Vec<PathBuf>) -> Result<usize> {
        match self.source.input_mode() {
            InputMode::Files => Ok(self.store.insert(paths.into_iter().map(Item::from_file))),
            InputMode::Archive => {
                let [path] = <[PathBuf; 1]>::try_from(paths).map_err(|_| {
                    let msg = format!("{} imports one archive at a time", self.source);
                    ImportError::Validation(msg)
                })?;
                self.generation += 1;
                self.queue.cancel_all();
                self.orchestration_id.clear();
                self.store.replace_all(vec![Item::from_file(path)]);
                Ok(1)
            }
            _ => Err(self.unsupported("file input")),
        }
    }

    /// Add page URLs separated by whitespace or commas.
    pub fn add_urls(&mut self, text: &str) -> Result<usize> {
        if self.source.input_mode() != InputMode::Urls {
            return Err(self.unsupported("url input"));
        }
        let urls: Vec<&str> = text
            .split(|c: char| c.is_whitespace() || c == ',')
            .map(str::trim)
            .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
            .collect();
        if urls.is_empty() {
            return Err(ImportError::Validation("no http(s) URL given".into()));
        }
        Ok(self.store.insert(urls.into_iter().map(Item::from_url)))
    }

    /// List an RSS feed or sitemap through the backend.
    pub fn load_feed(&mut self, feed_url: &str) -> Result<()> {
        if self.source.input_mode() != InputMode::Feed {
            return Err(self.unsupported("feed listing"));
        }
        self.require_kb()?;
        let feed_url = feed_url.trim().to_string();
        if feed_url.is_empty() {
            return Err(ImportError::Validation("feed URL is required".into()));
        }

        let backend = self.backend.clone();
        let (kb_id, source) = (self.kb_id.clone(), self.source);
        let emit = self.emitter();
        let url = feed_url.clone();
        let task = Task::new(
            format!("feed:{feed_url}"),
            move |token: CancellationToken| async move {
                backend.parse_feed(&kb_id, source, &url, &token).await
            },
            move |listing: FeedListing| {
                let orchestration = listing.orchestration_id.as_str();
                let items = listing
                    .entries
                    .into_iter()
                    .map(|e| {
                        let title = if e.title.is_empty() { e.url.clone() } else { e.title };
                        Item::listed(e.url, "", title).in_orchestration(orchestration)
                    })
                    .collect();
                emit.send(SessionEvent::Listed {
                    orchestration_id: Some(listing.orchestration_id),
                    items,
                });
            },
        );
        self.queue.enqueue([self.listing_failure(task, "feed listing")]);
        Ok(())
    }

    /// List pages visible to the configured Notion integration.
    pub fn load_notion(&mut self) -> Result<()> {
        if self.source.input_mode() != InputMode::Notion {
            return Err(self.unsupported("notion listing"));
        }
        self.require_kb()?;
        if self.notion_token.is_empty() {
            return Err(ImportError::Validation(
                "notion integration token is required".into(),
            ));
        }

        let backend = self.backend.clone();
        let (kb_id, secret) = (self.kb_id.clone(), self.notion_token.clone());
        let emit = self.emitter();
        let task = Task::new(
            "notion",
            move |token: CancellationToken| async move {
                backend.list_notion_pages(&kb_id, &secret, &token).await
            },
            move |listing: NotionListing| {
                let orchestration = listing.orchestration_id.as_str();
                let items = listing
                    .pages
                    .into_iter()
                    .map(|p| {
                        Item::listed(p.id.clone(), p.id, p.title).in_orchestration(orchestration)
                    })
                    .collect();
                emit.send(SessionEvent::Listed {
                    orchestration_id: Some(listing.orchestration_id),
                    items,
                });
            },
        );
        self.queue.enqueue([self.listing_failure(task, "notion listing")]);
        Ok(())
    }

    /// List Feishu wiki spaces as folders and cloud documents as items.
    pub fn load_feishu(&mut self) -> Result<()> {
        if self.source.input_mode() != InputMode::Feishu {
            return Err(self.unsupported("feishu listing"));
        }
        self.require_feishu()?;

        let backend = self.backend.clone();
        let creds = self.feishu.clone();
        let emit = self.emitter();
        let task = Task::new(
            "feishu",
            move |token: CancellationToken| async move {
                let spaces = backend.list_feishu_spaces(&creds, &token).await?;
                let docs = backend.list_feishu_docs(&creds, &token).await?;
                Ok::<_, ImportError>((spaces, docs))
            },
            move |(spaces, docs): (Vec<FeishuSpace>, Vec<FeishuDoc>)| {
                let items = spaces
                    .into_iter()
                    .map(|s| Item::folder(s.space_id, s.name))
                    .chain(docs.into_iter().map(feishu_item))
                    .collect();
                emit.send(SessionEvent::Listed {
                    orchestration_id: None,
                    items,
                });
            },
        );
        self.queue.enqueue([self.listing_failure(task, "feishu listing")]);
        Ok(())
    }

    /// Fetch the documents inside a Feishu space folder.
    pub fn fetch_children(&mut self, folder_key: &str) -> Result<()> {
        self.require_feishu()?;
        let Some(folder) = self.store.get(folder_key) else {
            return Ok(());
        };
        if folder.kind != ItemKind::Folder {
            return Err(ImportError::Validation(format!("{folder_key} is not a folder")));
        }
        let space_id = folder.group_key.clone().unwrap_or_default();
        let title = folder.title.clone();

        let moved = self
            .store
            .update_multiple_items_status(&[folder_key.to_string()], Step::Start(Stage::Upload));
        if moved.is_empty() {
            return Ok(());
        }

        let backend = self.backend.clone();
        let creds = self.feishu.clone();
        let emit = self.emitter();
        let key = folder_key.to_string();
        let task = Task::new(
            key.clone(),
            move |token: CancellationToken| async move {
                backend.search_feishu_wiki(&creds, &space_id, &token).await
            },
            move |docs: Vec<FeishuDoc>| {
                emit.send(SessionEvent::Children {
                    folder_key: key.clone(),
                    children: docs.into_iter().map(feishu_item).collect(),
                });
                emit.patch(&key, ItemPatch::step(Step::Succeed(Stage::Upload)));
            },
        );
        let task = self.stage_failure(task, &title, Stage::Upload);
        self.queue.enqueue([task]);
        Ok(())
    }

    // --- stage operations ---

    /// Upload the given items. Items not eligible for upload are skipped.
    pub fn upload(&mut self, keys: &[String]) -> Result<usize> {
        let strategy = self
            .source
            .upload_strategy()
            .ok_or_else(|| self.unsupported("upload"))?;
        self.require_kb()?;

        let eligible: Vec<String> = keys
            .iter()
            .filter(|k| self.store.get(k).is_some_and(Item::needs_upload))
            .cloned()
            .collect();
        let moved = self
            .store
            .update_multiple_items_status(&eligible, Step::Start(Stage::Upload));
        let tasks: Vec<Task> = moved
            .iter()
            .filter_map(|k| self.store.get(k).cloned())
            .map(|item| self.upload_task(strategy, item))
            .collect();
        tracing::info!("upload: {} of {} items submitted", tasks.len(), keys.len());
        let n = tasks.len();
        self.queue.enqueue(tasks);
        Ok(n)
    }

    /// Fetch content for items whose upload is done.
    pub fn pull(&mut self, keys: &[String]) -> Result<usize> {
        self.require_kb()?;
        if self.source == SourceType::Feishu {
            self.require_feishu()?;
        }
        let strategy = self.source.pull_strategy();

        let moved = self
            .store
            .update_multiple_items_status(keys, Step::Start(Stage::Pull));
        let tasks: Vec<Task> = moved
            .iter()
            .filter_map(|k| self.store.get(k).cloned())
            .map(|item| {
                let ctx = self.stage_context(None);
                let emit = self.emitter();
                let (key, title) = (item.key.clone(), item.title.clone());
                let task = Task::new(
                    item.key.clone(),
                    move |token: CancellationToken| async move {
                        strategy.pull(&ctx, &item, &token).await
                    },
                    move |pulled: Pulled| {
                        emit.patch(
                            &key,
                            ItemPatch::step(Step::Succeed(Stage::Pull))
                                .with_title(pulled.title)
                                .with_content(pulled.content),
                        );
                    },
                );
                self.stage_failure(task, &title, Stage::Pull)
            })
            .collect();
        tracing::info!("pull: {} of {} items submitted", tasks.len(), keys.len());
        let n = tasks.len();
        self.queue.enqueue(tasks);
        Ok(n)
    }

    /// Create documents from pulled content.
    pub fn create(&mut self, keys: &[String]) -> Result<usize> {
        self.require_kb()?;

        let moved = self
            .store
            .update_multiple_items_status(keys, Step::Start(Stage::Create));
        let tasks: Vec<Task> = moved
            .iter()
            .filter_map(|k| self.store.get(k).cloned())
            .map(|item| {
                let backend = self.backend.clone();
                let (kb_id, parent_id) = (self.kb_id.clone(), self.parent_id.clone());
                let emit = self.emitter();
                let (key, title) = (item.key.clone(), item.title.clone());
                let task = Task::new(
                    item.key.clone(),
                    move |token: CancellationToken| async move {
                        let doc = NewDocument {
                            kb_id: &kb_id,
                            parent_id: &parent_id,
                            name: &item.title,
                            content: &item.content,
                        };
                        backend.create_document(doc, &token).await
                    },
                    move |id: String| {
                        emit.patch(
                            &key,
                            ItemPatch::step(Step::Succeed(Stage::Create)).with_id(Some(id)),
                        );
                    },
                );
                self.stage_failure(task, &title, Stage::Create)
            })
            .collect();
        tracing::info!("create: {} of {} items submitted", tasks.len(), keys.len());
        let n = tasks.len();
        self.queue.enqueue(tasks);
        Ok(n)
    }

    /// Re-run the failed stage of each item.
    pub fn retry(&mut self, keys: &[String]) -> Result<usize> {
        let mut uploads = Vec::new();
        let mut pulls = Vec::new();
        let mut creates = Vec::new();
        let mut folders = Vec::new();
        for key in keys {
            let Some(item) = self.store.get(key) else {
                continue;
            };
            match (item.kind, item.status.failed_stage()) {
                (ItemKind::Folder, Some(Stage::Upload)) => folders.push(key.clone()),
                (_, Some(Stage::Upload)) => uploads.push(key.clone()),
                (_, Some(Stage::Pull)) => pulls.push(key.clone()),
                (_, Some(Stage::Create)) => creates.push(key.clone()),
                (_, None) => {}
            }
        }

        let mut n = 0;
        for folder in &folders {
            self.fetch_children(folder)?;
            n += 1;
        }
        if !uploads.is_empty() {
            n += self.upload(&uploads)?;
        }
        if !pulls.is_empty() {
            n += self.pull(&pulls)?;
        }
        if !creates.is_empty() {
            n += self.create(&creates)?;
        }
        Ok(n)
    }

    /// Cancel in-flight work for the given items.
    pub fn abort(&mut self, keys: &[String]) -> usize {
        let targets: Vec<&str> = keys
            .iter()
            .filter(|k| self.store.get(k).is_some_and(|i| i.status.is_in_flight()))
            .map(String::as_str)
            .collect();
        let n = targets.len();
        self.queue.cancel_many(targets);
        self.pump();
        n
    }

    pub fn abort_all(&mut self) {
        self.queue.cancel_all();
        self.pump();
    }

    /// Remove items. Refused while any of them is still in flight.
    pub fn delete(&mut self, keys: &[String]) -> Result<usize> {
        if keys
            .iter()
            .any(|k| self.store.get(k).is_some_and(|i| i.status.is_in_flight()))
        {
            return Err(ImportError::Validation(
                "abort running items before deleting them".into(),
            ));
        }
        Ok(self.store.remove(keys))
    }

    /// Cancel everything and forget all items.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.queue.cancel_all();
        while self.rx.try_recv().is_ok() {}
        self.store.clear();
        self.orchestration_id.clear();
        tracing::info!("session reset");
    }

    // --- batch actions over the selection ---

    pub fn upload_selected(&mut self) -> Result<usize> {
        let keys = self.summary().actions.uploadable;
        self.upload(&keys)
    }

    pub fn pull_selected(&mut self) -> Result<usize> {
        let keys = self.summary().actions.pullable;
        self.pull(&keys)
    }

    pub fn create_selected(&mut self) -> Result<usize> {
        let keys = self.summary().actions.creatable;
        self.create(&keys)
    }

    pub fn retry_selected(&mut self) -> Result<usize> {
        let keys = self.summary().actions.retryable;
        self.retry(&keys)
    }

    pub fn abort_selected(&mut self) -> usize {
        let keys = self.summary().actions.abortable;
        self.abort(&keys)
    }

    pub fn delete_selected(&mut self) -> Result<usize> {
        let actions = self.summary().actions;
        if !actions.can_delete() {
            return Err(ImportError::Validation(
                "nothing deletable selected, or selection still in flight".into(),
            ));
        }
        self.delete(&actions.deletable)
    }

    // --- event application ---

    /// Apply every pending event. Returns the notices for display.
    pub fn pump(&mut self) -> Vec<String> {
        let mut notices = Vec::new();
        while let Ok((generation, event)) = self.rx.try_recv() {
            if generation != self.generation {
                tracing::debug!("dropping stale event from generation {generation}: {event:?}");
                continue;
            }
            match event {
                SessionEvent::Patch { key, patch } => {
                    self.store.update_item_status(&key, patch);
                }
                SessionEvent::Listed {
                    orchestration_id,
                    items,
                } => {
                    if let Some(id) = orchestration_id {
                        self.orchestration_id = id;
                    }
                    let added = self.store.insert(items);
                    notices.push(format!("listed {added} new items"));
                }
                SessionEvent::Archive {
                    orchestration_id,
                    items,
                } => {
                    notices.push(format!("archive parsed into {} documents", items.len()));
                    self.orchestration_id = orchestration_id;
                    self.store.replace_all(items);
                }
                SessionEvent::Children {
                    folder_key,
                    children,
                } => {
                    let added = self.store.append_children(&folder_key, children);
                    notices.push(format!("{added} documents found in {folder_key}"));
                }
                SessionEvent::Notice(msg) => notices.push(msg),
            }
        }
        notices
    }

    /// Wait for the queue to drain, then apply everything it produced.
    pub async fn settle(&mut self) -> Vec<String> {
        self.queue.idle().await;
        self.pump()
    }

    // --- helpers ---

    fn emitter(&self) -> Emitter {
        Emitter {
            tx: self.tx.clone(),
            generation: self.generation,
        }
    }

    fn unsupported(&self, operation: &'static str) -> ImportError {
        ImportError::UnsupportedSource {
            kind: self.source,
            operation,
        }
    }

    fn require_kb(&self) -> Result<()> {
        if self.kb_id.is_empty() {
            return Err(ImportError::Validation("knowledge base id is not set".into()));
        }
        Ok(())
    }

    fn require_feishu(&self) -> Result<()> {
        if !self.feishu.is_complete() {
            return Err(ImportError::Validation(
                "feishu app id, secret and user token are required".into(),
            ));
        }
        Ok(())
    }

    fn stage_context(&self, progress: Option<ProgressFn>) -> StageContext {
        StageContext {
            backend: self.backend.clone(),
            source: self.source,
            kb_id: self.kb_id.clone(),
            orchestration_id: self.orchestration_id.clone(),
            feishu: self.feishu.clone(),
            poll_interval: self.poll_interval,
            progress,
        }
    }

    fn upload_task(&self, strategy: &'static dyn UploadStrategy, item: Item) -> Task {
        let progress: ProgressFn = {
            let emit = self.emitter();
            let key = item.key.clone();
            Arc::new(move |pct| emit.patch(&key, ItemPatch::progress(pct)))
        };
        let ctx = self.stage_context(Some(progress));
        let emit = self.emitter();
        let (key, title) = (item.key.clone(), item.title.clone());

        let task = Task::new(
            item.key.clone(),
            move |token: CancellationToken| async move {
                strategy.upload(&ctx, &item, &token).await
            },
            move |uploaded: Uploaded| match uploaded {
                Uploaded::Stored { id } => {
                    emit.patch(
                        &key,
                        ItemPatch::step(Step::Succeed(Stage::Upload)).with_id(id),
                    );
                }
                Uploaded::Scraped { id, title, content } => {
                    emit.patch(
                        &key,
                        ItemPatch::step(Step::Succeed(Stage::Upload))
                            .with_id(id)
                            .with_title(title)
                            .with_content(content),
                    );
                }
                Uploaded::Parsed(archive) => {
                    let orchestration = archive.orchestration_id.as_str();
                    let items = archive
                        .docs
                        .into_iter()
                        .map(|d| {
                            Item::listed(uuid::Uuid::new_v4().to_string(), d.id, d.title)
                                .in_orchestration(orchestration)
                        })
                        .collect();
                    emit.send(SessionEvent::Archive {
                        orchestration_id: archive.orchestration_id,
                        items,
                    });
                }
            },
        );
        self.stage_failure(task, &title, Stage::Upload)
    }

    /// Route error and abort outcomes to the stage's failure status.
    fn stage_failure(&self, task: Task, title: &str, stage: Stage) -> Task {
        let key = task.key().to_string();
        let (on_err, on_abort) = (self.emitter(), self.emitter());
        let (err_key, err_title) = (key.clone(), title.to_string());
        let abort_title = title.to_string();
        task.on_error(move |e| {
            tracing::error!("{} failed for {err_key}: {e}", stage.as_str());
            on_err.patch(&err_key, ItemPatch::step(Step::Fail(stage)));
            on_err.notice(format!("{} failed: {err_title}: {e}", stage.as_str()));
        })
        .on_abort(move || {
            on_abort.patch(&key, ItemPatch::step(Step::Fail(stage)));
            on_abort.notice(format!("{} aborted: {abort_title}", stage.as_str()));
        })
    }

    /// Listing failures only produce a notice; no item exists yet.
    fn listing_failure(&self, task: Task, what: &'static str) -> Task {
        let (on_err, on_abort) = (self.emitter(), self.emitter());
        task.on_error(move |e| {
            tracing::error!("{what} failed: {e}");
            on_err.notice(format!("{what} failed: {e}"));
        })
        .on_abort(move || on_abort.notice(format!("{what} aborted")))
    }
}

fn feishu_item(doc: FeishuDoc) -> Item {
    let key = if doc.url.is_empty() {
        doc.id.clone()
    } else {
        doc.url.clone()
    };
    Item {
        group_key: doc.space_id,
        file_type: Some(doc.file_type),
        ..Item::listed(key, doc.id, doc.title)
    }
}
