use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::models::{
    CreateItemRequest, StartDateResponse, StoredUpload, TimelineDocument, TimelineItem, UpdateItemRequest,
    UploadListing,
};
use crate::resolver::{StaticAsset, StaticBase, StaticResolvers};
use crate::store::DocumentStore;
use crate::uploads::UploadStore;
use std::sync::Arc;

/// Entry point for the request layer: one method per public operation.
#[derive(Clone)]
pub struct TimelineCore {
    store: DocumentStore,
    uploads: UploadStore,
    resolvers: StaticResolvers,
}

impl TimelineCore {
    pub fn new(store: DocumentStore, uploads: UploadStore, resolvers: StaticResolvers) -> Arc<Self> {
        Arc::new(Self {
            store,
            uploads,
            resolvers,
        })
    }

    pub fn from_config(config: &AppConfig) -> AppResult<Arc<Self>> {
        let store = DocumentStore::file(config.document_path());
        let uploads = UploadStore::new(config.uploads_path(), config.max_upload_bytes)?;
        let resolvers = StaticResolvers::from_config(config);
        tracing::info!(
            document = %config.document_path().to_string_lossy(),
            uploads = %config.uploads_path().to_string_lossy(),
            "timeline core ready"
        );
        Ok(Self::new(store, uploads, resolvers))
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub async fn get_document(self: &Arc<Self>) -> AppResult<TimelineDocument> {
        self.blocking(|core| Ok(core.store.document())).await
    }

    pub async fn create_item(self: &Arc<Self>, request: CreateItemRequest) -> AppResult<TimelineItem> {
        self.blocking(move |core| core.store.create_item(request)).await
    }

    pub async fn update_item(self: &Arc<Self>, id: &str, request: UpdateItemRequest) -> AppResult<TimelineItem> {
        let id = id.to_string();
        self.blocking(move |core| core.store.update_item(&id, request)).await
    }

    pub async fn delete_item(self: &Arc<Self>, id: &str) -> AppResult<TimelineItem> {
        let id = id.to_string();
        self.blocking(move |core| core.store.delete_item(&id)).await
    }

    pub async fn set_start_date(self: &Arc<Self>, value: &str) -> AppResult<StartDateResponse> {
        let value = value.to_string();
        self.blocking(move |core| core.store.set_start_date(&value)).await
    }

    pub async fn resolve_static(self: &Arc<Self>, base: StaticBase, relative: &str) -> AppResult<StaticAsset> {
        let relative = relative.to_string();
        self.blocking(move |core| core.resolvers.open(base, &relative)).await
    }

    /// Also sweeps orphaned uploads; see [`UploadStore::list_uploads`].
    pub async fn list_uploads(self: &Arc<Self>) -> AppResult<UploadListing> {
        self.blocking(|core| core.uploads.list_uploads(&core.store)).await
    }

    pub async fn store_upload(self: &Arc<Self>, filename: &str, payload: &str) -> AppResult<StoredUpload> {
        let filename = filename.to_string();
        let payload = payload.to_string();
        self.blocking(move |core| core.uploads.store_upload(&filename, &payload))
            .await
    }

    async fn blocking<T, F>(self: &Arc<Self>, f: F) -> AppResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&TimelineCore) -> AppResult<T> + Send + 'static,
    {
        let core = Arc::clone(self);
        match tokio::task::spawn_blocking(move || f(&core)).await {
            Ok(result) => result,
            Err(error) => Err(AppError::Internal(format!("blocking task failed: {}", error))),
        }
    }
}
