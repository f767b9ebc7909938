//! Import items and their status state machine.

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Which stages apply to an item.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemKind {
    /// Needs the upload stage (a local file, or a URL whose upload is the scrape).
    File,
    /// Already known to the backend; starts at the pull stage.
    #[default]
    Other,
    /// Grouping node of a hierarchical source; only fetches children.
    Folder,
}

/// Stored per-item status. `waiting` is derived in the view, never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Default,
    Uploading,
    UploadDone,
    UploadError,
    Pulling,
    PullDone,
    PullError,
    Creating,
    Success,
    Error,
}

impl Status {
    pub const ALL: [Status; 10] = [
        Status::Default,
        Status::Uploading,
        Status::UploadDone,
        Status::UploadError,
        Status::Pulling,
        Status::PullDone,
        Status::PullError,
        Status::Creating,
        Status::Success,
        Status::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Default => "default",
            Status::Uploading => "uploading",
            Status::UploadDone => "upload-done",
            Status::UploadError => "upload-error",
            Status::Pulling => "pulling",
            Status::PullDone => "pull-done",
            Status::PullError => "pull-error",
            Status::Creating => "creating",
            Status::Success => "success",
            Status::Error => "error",
        }
    }

    /// A stage operation is outstanding for the item.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Status::Uploading | Status::Pulling | Status::Creating)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Status::UploadError | Status::PullError | Status::Error)
    }

    /// The stage whose failure produced this status, used by retry.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            Status::UploadError => Some(Stage::Upload),
            Status::PullError => Some(Stage::Pull),
            Status::Error => Some(Stage::Create),
            _ => None,
        }
    }

    /// Apply one stage step. `None` means the step is not a legal transition.
    pub fn apply(self, kind: ItemKind, step: Step) -> Option<Status> {
        use Stage::*;
        use Status::*;
        use Step::*;

        match (self, step) {
            (Default | UploadError, Start(Upload)) => Some(Uploading),
            (Uploading, Succeed(Upload)) if kind == ItemKind::Folder => Some(Default),
            (Uploading, Succeed(Upload)) => Some(UploadDone),
            (Uploading, Fail(Upload)) => Some(UploadError),
            (UploadDone | PullError, Start(Pull)) if kind != ItemKind::Folder => Some(Pulling),
            (Pulling, Succeed(Pull)) => Some(PullDone),
            (Pulling, Fail(Pull)) => Some(PullError),
            (PullDone | Error, Start(Create)) if kind != ItemKind::Folder => Some(Creating),
            (Creating, Succeed(Create)) => Some(Success),
            (Creating, Fail(Create)) => Some(Error),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage. For folders, `Upload` is the fetch-children operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Upload,
    Pull,
    Create,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Pull => "pull",
            Stage::Create => "create",
        }
    }
}

/// Outcome-driven step of the state machine. Abort is a `Fail`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Start(Stage),
    Succeed(Stage),
    Fail(Stage),
}

/// One document pending import.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Backend handle; empty until a stage assigns one.
    pub id: String,
    /// Local identity used for tasks and selection.
    pub key: String,
    pub title: String,
    pub content: String,
    pub kind: ItemKind,
    pub group_key: Option<String>,
    pub progress: Option<u8>,
    /// Display only.
    pub expanded: bool,
    pub status: Status,
    /// Local file to upload, for file-bearing sources.
    pub file: Option<PathBuf>,
    /// Source specific type hint (Feishu `obj_type`).
    pub file_type: Option<String>,
    /// Listing or archive parse that produced this item; empty for local input.
    pub orchestration_id: String,
}

impl Item {
    /// A local file waiting to be uploaded.
    pub fn from_file(path: PathBuf) -> Self {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            key: uuid::Uuid::new_v4().to_string(),
            title,
            kind: ItemKind::File,
            file: Some(path),
            ..Self::default()
        }
    }

    /// A URL whose upload stage is a direct scrape.
    pub fn from_url(url: &str) -> Self {
        Self {
            key: url.to_string(),
            title: url.to_string(),
            kind: ItemKind::File,
            ..Self::default()
        }
    }

    /// An entry already known to the backend, ready for the pull stage.
    pub fn listed(key: impl Into<String>, id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            title: title.into(),
            kind: ItemKind::Other,
            status: Status::UploadDone,
            ..Self::default()
        }
    }

    /// A grouping node for hierarchical sources.
    pub fn folder(group_key: impl Into<String>, title: impl Into<String>) -> Self {
        let group_key = group_key.into();
        Self {
            id: group_key.clone(),
            key: format!("folder:{group_key}"),
            title: title.into(),
            kind: ItemKind::Folder,
            group_key: Some(group_key),
            ..Self::default()
        }
    }

    /// Tag the item with the listing or archive parse it came from.
    pub fn in_orchestration(mut self, orchestration_id: &str) -> Self {
        self.orchestration_id = orchestration_id.to_string();
        self
    }

    /// Whether the upload stage applies to this item at all.
    pub fn needs_upload(&self) -> bool {
        self.kind == ItemKind::File
    }
}
