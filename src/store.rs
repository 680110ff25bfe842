use crate::errors::{AppError, AppResult};
use crate::models::{
    truncate_images, CreateItemRequest, ItemViews, StartDateResponse, TimelineDocument, TimelineItem,
    UpdateItemRequest,
};
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::NamedTempFile;

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Raw persistence seam under the document store.
///
/// `read_raw` returns `None` when nothing has been persisted yet.
pub trait DocumentBackend: Send + Sync {
    fn read_raw(&self) -> AppResult<Option<Vec<u8>>>;
    fn write_raw(&self, contents: &[u8]) -> AppResult<()>;
    fn describe(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentBackend for JsonFileBackend {
    fn read_raw(&self) -> AppResult<Option<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(AppError::Io(error.to_string())),
        }
    }

    fn write_raw(&self, contents: &[u8]) -> AppResult<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|error| AppError::Io(error.to_string()))?;

        let mut staged = NamedTempFile::new_in(parent).map_err(|error| AppError::Io(error.to_string()))?;
        staged
            .write_all(contents)
            .map_err(|error| AppError::Io(error.to_string()))?;
        staged
            .as_file()
            .sync_all()
            .map_err(|error| AppError::Io(error.to_string()))?;
        staged
            .persist(&self.path)
            .map_err(|error| AppError::Io(error.error.to_string()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.to_string_lossy().to_string()
    }
}

/// In-memory backend for tests and ephemeral deployments.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<Vec<u8>>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn contents(&self) -> Option<Vec<u8>> {
        self.contents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl DocumentBackend for MemoryBackend {
    fn read_raw(&self) -> AppResult<Option<Vec<u8>>> {
        let contents = self
            .contents
            .lock()
            .map_err(|_| AppError::Internal("memory backend lock poisoned".to_string()))?;
        Ok(contents.clone())
    }

    fn write_raw(&self, contents: &[u8]) -> AppResult<()> {
        let mut stored = self
            .contents
            .lock()
            .map_err(|_| AppError::Internal("memory backend lock poisoned".to_string()))?;
        *stored = Some(contents.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// Items without a usable id were given one and the document was re-saved.
    Backfilled { assigned: usize },
    /// Missing or unreadable document; the default timeline was substituted.
    RecoveredDefault { reason: String },
}

#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub document: TimelineDocument,
    pub outcome: LoadOutcome,
}

/// Whole-document store: every operation reads the full document, and every
/// mutation writes it back, under a single write gate.
#[derive(Clone)]
pub struct DocumentStore {
    backend: Arc<dyn DocumentBackend>,
    write_gate: Arc<Mutex<()>>,
}

impl DocumentStore {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(JsonFileBackend::new(path)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn load(&self) -> LoadedDocument {
        let _gate = self.gate();
        self.load_unlocked()
    }

    pub fn save(&self, document: &TimelineDocument) -> AppResult<()> {
        let _gate = self.gate();
        self.save_unlocked(document)
    }

    pub fn document(&self) -> TimelineDocument {
        self.load().document
    }

    /// Runs `f` against a fresh load while holding the write gate, so no save
    /// through this store can interleave with it. `f` sees the load outcome
    /// and must not treat a recovered default as the real document.
    pub fn with_snapshot<T>(&self, f: impl FnOnce(&LoadedDocument) -> T) -> T {
        let _gate = self.gate();
        let loaded = self.load_unlocked();
        f(&loaded)
    }

    pub fn create_item(&self, request: CreateItemRequest) -> AppResult<TimelineItem> {
        let CreateItemRequest {
            title,
            date,
            images,
            views,
        } = request;
        let title = required_field(title, "title")?;
        let date = required_field(date, "date")?;

        self.mutate(|document| {
            let views = views.unwrap_or_default();
            let item = TimelineItem {
                id: next_item_id(document, Utc::now().timestamp_millis()),
                date,
                title,
                images: truncate_images(images.unwrap_or_default()),
                image: None,
                views: ItemViews {
                    zhl: views.zhl.unwrap_or_default(),
                    yxh: views.yxh.unwrap_or_default(),
                },
                extra: Default::default(),
            };
            document.items.push(item.clone());
            tracing::info!(item_id = %item.id, "timeline item created");
            Ok(item)
        })
    }

    pub fn update_item(&self, id: &str, request: UpdateItemRequest) -> AppResult<TimelineItem> {
        self.mutate(|document| {
            let index = document
                .position_of(id)
                .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;
            let item = &mut document.items[index];

            // Empty title/date keep the stored value so an item never loses either.
            if let Some(title) = request.title.filter(|value| !value.is_empty()) {
                item.title = title;
            }
            if let Some(date) = request.date.filter(|value| !value.is_empty()) {
                item.date = date;
            }
            if let Some(images) = request.images {
                item.images = truncate_images(images);
            }
            if let Some(views) = request.views {
                if let Some(zhl) = views.zhl {
                    item.views.zhl = zhl;
                }
                if let Some(yxh) = views.yxh {
                    item.views.yxh = yxh;
                }
            }

            tracing::info!(item_id = %item.id, "timeline item updated");
            Ok(item.clone())
        })
    }

    pub fn delete_item(&self, id: &str) -> AppResult<TimelineItem> {
        self.mutate(|document| {
            let index = document
                .position_of(id)
                .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;
            let removed = document.items.remove(index);
            tracing::info!(item_id = %removed.id, "timeline item deleted");
            Ok(removed)
        })
    }

    pub fn set_start_date(&self, value: &str) -> AppResult<StartDateResponse> {
        if value.is_empty() {
            return Err(AppError::Validation("startDate is required".to_string()));
        }
        self.mutate(|document| {
            document.start_date = value.to_string();
            Ok(StartDateResponse {
                start_date: document.start_date.clone(),
            })
        })
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut TimelineDocument) -> AppResult<T>) -> AppResult<T> {
        let _gate = self.gate();
        let mut document = self.load_unlocked().document;
        let result = f(&mut document)?;
        self.save_unlocked(&document)?;
        Ok(result)
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        // The gate guards no data, so a panic elsewhere cannot leave it inconsistent.
        self.write_gate
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn load_unlocked(&self) -> LoadedDocument {
        let mut document = match self.read_document() {
            Ok(document) => document,
            Err(reason) => {
                tracing::warn!(
                    source = %self.backend.describe(),
                    reason = %reason,
                    "timeline document unavailable; using default document"
                );
                return LoadedDocument {
                    document: TimelineDocument::default(),
                    outcome: LoadOutcome::RecoveredDefault { reason },
                };
            }
        };

        let assigned = backfill_ids(&mut document, Utc::now().timestamp_millis());
        if assigned == 0 {
            return LoadedDocument {
                document,
                outcome: LoadOutcome::Loaded,
            };
        }

        tracing::info!(assigned, "backfilled missing timeline item ids");
        if let Err(error) = self.save_unlocked(&document) {
            tracing::warn!(error = %error, "failed to persist backfilled item ids");
        }
        LoadedDocument {
            document,
            outcome: LoadOutcome::Backfilled { assigned },
        }
    }

    fn read_document(&self) -> Result<TimelineDocument, String> {
        let bytes = self
            .backend
            .read_raw()
            .map_err(|error| error.to_string())?
            .ok_or_else(|| "document does not exist".to_string())?;
        let text = String::from_utf8(bytes).map_err(|error| error.to_string())?;
        let text = text.strip_prefix(BYTE_ORDER_MARK).unwrap_or(&text);
        serde_json::from_str(text).map_err(|error| error.to_string())
    }

    fn save_unlocked(&self, document: &TimelineDocument) -> AppResult<()> {
        let bytes = serde_json::to_vec_pretty(document)?;
        self.backend.write_raw(&bytes).map_err(|error| {
            tracing::warn!(
                target_path = %self.backend.describe(),
                error = %error,
                "failed to save timeline document"
            );
            error
        })
    }
}

fn required_field(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

fn next_item_id(document: &TimelineDocument, now_millis: i64) -> String {
    let mut millis = now_millis;
    loop {
        let candidate = format!("item-{}", millis);
        if document.find_item(&candidate).is_none() {
            return candidate;
        }
        millis += 1;
    }
}

/// Gives every item lacking a usable id (empty, or a repeat of an earlier
/// item's id) a fresh `item-<millis>-<index>` id. Returns how many changed.
fn backfill_ids(document: &mut TimelineDocument, load_millis: i64) -> usize {
    let original: HashSet<String> = document
        .items
        .iter()
        .filter(|item| !item.id.is_empty())
        .map(|item| item.id.clone())
        .collect();
    let mut seen = HashSet::new();
    let mut assigned = 0usize;

    for (index, item) in document.items.iter_mut().enumerate() {
        if !item.id.is_empty() && seen.insert(item.id.clone()) {
            continue;
        }

        let mut candidate = format!("item-{}-{}", load_millis, index);
        let mut attempt = 1;
        while original.contains(&candidate) || seen.contains(&candidate) {
            candidate = format!("item-{}-{}-{}", load_millis, index, attempt);
            attempt += 1;
        }
        seen.insert(candidate.clone());
        item.id = candidate;
        assigned += 1;
    }

    assigned
}
