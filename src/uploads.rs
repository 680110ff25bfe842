use crate::errors::{AppError, AppResult};
use crate::models::{upload_uri, StoredUpload, TimelineDocument, UploadListing};
use crate::store::{DocumentStore, LoadOutcome, LoadedDocument};
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;
use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

static DATA_URI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^data:([A-Za-z0-9.+/-]*)((?:;[A-Za-z0-9.+=-]+)*);base64,(.*)$")
        .expect("valid data uri regex")
});

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const MAX_STEM_CHARS: usize = 64;
const MAX_EXTENSION_CHARS: usize = 10;

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/gif", "gif"),
    ("image/webp", "webp"),
    ("image/avif", "avif"),
    ("image/bmp", "bmp"),
    ("image/svg+xml", "svg"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Public URIs of the files removed in this pass.
    pub deleted: Vec<String>,
    pub failed: usize,
}

/// The flat upload directory: stores new uploads and sweeps the ones no
/// timeline item references any more.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    max_bytes: usize,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>, max_bytes: usize) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|error| AppError::Io(error.to_string()))?;
        Ok(Self { dir, max_bytes })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Lists uploads as public URIs. Sweeps orphaned files first, as a
    /// deliberate side effect; a failed or skipped sweep reports `cleaned: 0`.
    pub fn list_uploads(&self, store: &DocumentStore) -> AppResult<UploadListing> {
        let cleaned = store.with_snapshot(|loaded| self.sweep(loaded));

        let mut uploads: Vec<String> = self
            .file_names()?
            .iter()
            .filter_map(|name| name.to_str().map(upload_uri))
            .collect();
        uploads.sort();
        Ok(UploadListing { uploads, cleaned })
    }

    /// Deletes every regular file whose public URI no item references.
    pub fn collect_orphans(&self, document: &TimelineDocument) -> AppResult<CleanupReport> {
        let referenced = referenced_uris(document);
        let mut report = CleanupReport::default();

        for name in self.file_names()? {
            let uri = upload_uri(&name.to_string_lossy());
            // A name that is not UTF-8 has no URI an item could hold.
            if name.to_str().is_some() && referenced.contains(&uri) {
                continue;
            }
            match fs::remove_file(self.dir.join(&name)) {
                Ok(()) => report.deleted.push(uri),
                Err(error) if error.kind() == ErrorKind::NotFound => {}
                Err(error) => {
                    tracing::warn!(file = %uri, error = %error, "failed to delete orphaned upload");
                    report.failed += 1;
                }
            }
        }

        if !report.deleted.is_empty() {
            tracing::info!(count = report.deleted.len(), "deleted orphaned uploads");
        }
        Ok(report)
    }

    pub fn store_upload(&self, filename: &str, payload: &str) -> AppResult<StoredUpload> {
        if filename.trim().is_empty() {
            return Err(AppError::Validation("filename is required".to_string()));
        }
        let (mime, bytes) = decode_payload(payload, self.max_bytes)?;
        let stored_name = stored_filename(filename, mime.as_deref(), Utc::now().timestamp_millis());
        let path = self.dir.join(&stored_name);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|error| AppError::Io(error.to_string()))?;
        if let Err(error) = file.write_all(&bytes).and_then(|_| file.sync_all()) {
            tracing::warn!(file = %stored_name, error = %error, "failed to write upload");
            let _ = fs::remove_file(&path);
            return Err(AppError::Io(error.to_string()));
        }

        tracing::info!(file = %stored_name, bytes = bytes.len(), "stored upload");
        Ok(StoredUpload {
            uri: upload_uri(&stored_name),
            filename: stored_name,
            bytes: bytes.len(),
        })
    }

    /// Sweeps against a loaded document. A recovered default says nothing
    /// about what is referenced, so nothing is deleted against it.
    fn sweep(&self, loaded: &LoadedDocument) -> usize {
        if let LoadOutcome::RecoveredDefault { reason } = &loaded.outcome {
            tracing::warn!(
                dir = %self.dir.to_string_lossy(),
                reason = %reason,
                "timeline document unavailable; skipping upload cleanup"
            );
            return 0;
        }

        match self.collect_orphans(&loaded.document) {
            Ok(report) => report.deleted.len(),
            Err(error) => {
                tracing::warn!(
                    dir = %self.dir.to_string_lossy(),
                    error = %error,
                    "upload cleanup failed"
                );
                0
            }
        }
    }

    fn file_names(&self) -> AppResult<Vec<OsString>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(AppError::Io(error.to_string())),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|error| AppError::Io(error.to_string()))?;
            let file_type = entry.file_type().map_err(|error| AppError::Io(error.to_string()))?;
            if !file_type.is_file() {
                tracing::debug!(entry = %entry.path().to_string_lossy(), "skipping non-file upload entry");
                continue;
            }
            names.push(entry.file_name());
        }
        Ok(names)
    }
}

/// Every image URI the document references, including legacy `image` fields.
pub fn referenced_uris(document: &TimelineDocument) -> HashSet<String> {
    let mut referenced = HashSet::new();
    for item in &document.items {
        referenced.extend(item.images.iter().cloned());
        if let Some(image) = item.image.as_ref() {
            referenced.insert(image.clone());
        }
    }
    referenced
}

/// Accepts `data:<mime>;base64,<data>` or bare base64.
fn decode_payload(payload: &str, max_bytes: usize) -> AppResult<(Option<String>, Vec<u8>)> {
    let payload = payload.trim();
    let (mime, encoded) = if payload.starts_with("data:") {
        let captures = DATA_URI_RE
            .captures(payload)
            .ok_or_else(|| AppError::Validation("payload is not a base64 data URI".to_string()))?;
        let mime = captures
            .get(1)
            .map(|value| value.as_str().to_ascii_lowercase())
            .filter(|value| !value.is_empty());
        let encoded = captures.get(3).map(|value| value.as_str()).unwrap_or_default();
        (mime, encoded)
    } else {
        (None, payload)
    };

    let encoded: String = encoded.chars().filter(|ch| !ch.is_ascii_whitespace()).collect();
    if encoded.is_empty() {
        return Err(AppError::Validation("upload payload is empty".to_string()));
    }
    if encoded.len() / 4 * 3 > max_bytes.saturating_add(3) {
        return Err(AppError::Validation(format!("upload exceeds {} bytes", max_bytes)));
    }

    let bytes = PAYLOAD_ENGINE.decode(encoded.as_bytes())?;
    if bytes.is_empty() {
        return Err(AppError::Validation("upload payload is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::Validation(format!("upload exceeds {} bytes", max_bytes)));
    }
    Ok((mime, bytes))
}

/// `<millis>-<8 hex>-<stem>[.<ext>]`, built only from characters that are
/// safe in a single path component.
fn stored_filename(original: &str, mime: Option<&str>, now_millis: i64) -> String {
    let base_name = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let (stem, extension) = match base_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => (stem, extension),
        _ => (base_name, ""),
    };

    let mut extension: String = extension
        .chars()
        .filter(|ch| ch.is_ascii_alphanumeric())
        .take(MAX_EXTENSION_CHARS)
        .collect::<String>()
        .to_ascii_lowercase();
    if extension.is_empty() {
        extension = mime
            .and_then(|mime| {
                MIME_EXTENSIONS
                    .iter()
                    .find(|(known, _)| *known == mime)
                    .map(|(_, extension)| extension.to_string())
            })
            .unwrap_or_default();
    }

    let short = Uuid::new_v4().simple().to_string();
    let mut name = format!("{}-{}-{}", now_millis, &short[..8], sanitize_stem(stem));
    if !extension.is_empty() {
        name.push('.');
        name.push_str(&extension);
    }
    name
}

fn sanitize_stem(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let candidate: String = out.trim_matches('_').chars().take(MAX_STEM_CHARS).collect();
    if candidate.is_empty() {
        "upload".to_string()
    } else {
        candidate
    }
}
