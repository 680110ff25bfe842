use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use std::fs;
use std::path::{Component, Path, PathBuf};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "text/javascript; charset=utf-8"),
    ("mjs", "text/javascript; charset=utf-8"),
    ("json", "application/json; charset=utf-8"),
    ("map", "application/json; charset=utf-8"),
    ("txt", "text/plain; charset=utf-8"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("bmp", "image/bmp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticBase {
    Uploads,
    Public,
    Admin,
}

impl StaticBase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploads => "uploads",
            Self::Public => "public",
            Self::Admin => "admin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticAsset {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Serves regular files from exactly one base directory.
#[derive(Debug, Clone)]
pub struct StaticResolver {
    base: PathBuf,
}

impl StaticResolver {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Maps `relative` onto an existing regular file under the base, or
    /// `NotFound` when it does not exist or would land outside the base.
    pub fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        let not_found = || AppError::NotFound(format!("Static resource {} not found", relative));

        let Some(normalized) = normalize_relative(relative) else {
            tracing::debug!(relative, "rejected static path");
            return Err(not_found());
        };

        let base = self.base.canonicalize().map_err(|_| not_found())?;
        let candidate = base.join(&normalized).canonicalize().map_err(|_| not_found())?;
        if !candidate.starts_with(&base) {
            tracing::debug!(
                relative,
                resolved = %candidate.to_string_lossy(),
                "static path escaped base directory"
            );
            return Err(not_found());
        }

        let metadata = fs::metadata(&candidate).map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(not_found());
        }
        Ok(candidate)
    }

    pub fn open(&self, relative: &str) -> AppResult<StaticAsset> {
        let path = self.resolve(relative)?;
        let bytes = fs::read(&path).map_err(|error| AppError::Io(error.to_string()))?;
        Ok(StaticAsset {
            content_type: content_type_for(&path),
            path,
            bytes,
        })
    }
}

/// One resolver per served base directory.
#[derive(Debug, Clone)]
pub struct StaticResolvers {
    uploads: StaticResolver,
    public: StaticResolver,
    admin: StaticResolver,
}

impl StaticResolvers {
    pub fn new(uploads: StaticResolver, public: StaticResolver, admin: StaticResolver) -> Self {
        Self { uploads, public, admin }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            StaticResolver::new(config.uploads_path()),
            StaticResolver::new(config.public_path()),
            StaticResolver::new(config.admin_path()),
        )
    }

    pub fn get(&self, base: StaticBase) -> &StaticResolver {
        match base {
            StaticBase::Uploads => &self.uploads,
            StaticBase::Public => &self.public,
            StaticBase::Admin => &self.admin,
        }
    }

    pub fn open(&self, base: StaticBase, relative: &str) -> AppResult<StaticAsset> {
        self.get(base).open(relative)
    }
}

pub fn content_type_for(path: &Path) -> &'static str {
    let Some(extension) = path.extension().and_then(|value| value.to_str()) else {
        return DEFAULT_CONTENT_TYPE;
    };
    let extension = extension.to_ascii_lowercase();
    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == extension)
        .map(|(_, content_type)| *content_type)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Collapses `.`/`..` lexically and drops any `..` that would climb above the
/// base. Returns `None` for input that names nothing under the base.
fn normalize_relative(relative: &str) -> Option<PathBuf> {
    if relative.contains('\0') {
        return None;
    }

    let unified = relative.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(segment) => segments.push(segment.to_str()?),
            Component::ParentDir => {
                segments.pop();
            }
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }

    if segments.is_empty() {
        return None;
    }
    Some(segments.iter().collect())
}
