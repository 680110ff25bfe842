use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use timeline_keeper_lib::models::{CreateItemRequest, UpdateItemRequest, ViewsPatch, MAX_ITEM_IMAGES};
use timeline_keeper_lib::{AppConfig, AppError, StaticBase, TimelineCore};

fn configured_core(root: &Path) -> (AppConfig, Arc<TimelineCore>) {
    let config = AppConfig {
        data_dir: root.join("data"),
        public_dir: root.join("public"),
        admin_dir: root.join("admin"),
        ..AppConfig::default()
    };
    fs::create_dir_all(config.public_path()).expect("public dir");
    fs::create_dir_all(config.admin_path()).expect("admin dir");
    fs::write(config.public_path().join("app.js"), "console.log(1)").expect("public asset");
    fs::write(config.admin_path().join("index.html"), "<html/>").expect("admin asset");
    let core = timeline_keeper_lib::bootstrap(&config).expect("bootstrap");
    (config, core)
}

fn trip() -> CreateItemRequest {
    CreateItemRequest {
        title: Some("Trip".to_string()),
        date: Some("2023-05-01".to_string()),
        ..CreateItemRequest::default()
    }
}

#[tokio::test]
async fn create_then_attach_image_preserves_title_and_date() {
    let root = tempfile::tempdir().expect("tempdir");
    let (config, core) = configured_core(root.path());

    let created = core.create_item(trip()).await.expect("created");
    core.update_item(
        &created.id,
        UpdateItemRequest {
            images: Some(vec!["/uploads/a.png".to_string()]),
            ..UpdateItemRequest::default()
        },
    )
    .await
    .expect("updated");

    let document = core.get_document().await.expect("document");
    assert_eq!(document.items.len(), 1);
    let item = &document.items[0];
    assert_eq!(item.id, created.id);
    assert_eq!(item.images, vec!["/uploads/a.png".to_string()]);
    assert_eq!(item.title, "Trip");
    assert_eq!(item.date, "2023-05-01");

    let on_disk: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(config.document_path()).expect("document file"))
            .expect("valid json");
    assert_eq!(on_disk["items"][0]["images"][0], "/uploads/a.png");
}

#[tokio::test]
async fn ids_stay_unique_and_image_lists_stay_bounded() {
    let root = tempfile::tempdir().expect("tempdir");
    let (_config, core) = configured_core(root.path());

    let mut ids = HashSet::new();
    for n in 0..5 {
        let item = core
            .create_item(CreateItemRequest {
                images: Some((0..(n * 4)).map(|i| format!("/uploads/{i}.png")).collect()),
                views: Some(ViewsPatch {
                    zhl: Some(format!("view {n}")),
                    yxh: None,
                }),
                ..trip()
            })
            .await
            .expect("created");
        assert!(item.images.len() <= MAX_ITEM_IMAGES);
        assert!(!item.id.is_empty());
        assert!(ids.insert(item.id));
    }
}

#[tokio::test]
async fn start_date_round_trip() {
    let root = tempfile::tempdir().expect("tempdir");
    let (_config, core) = configured_core(root.path());

    assert_eq!(core.get_document().await.expect("document").start_date, "2022-12-25");
    assert!(matches!(core.set_start_date("").await, Err(AppError::Validation(_))));
    core.set_start_date("2023-01-01").await.expect("start date");
    assert_eq!(core.get_document().await.expect("document").start_date, "2023-01-01");
}

#[tokio::test]
async fn delete_twice_reports_not_found() {
    let root = tempfile::tempdir().expect("tempdir");
    let (_config, core) = configured_core(root.path());

    let item = core.create_item(trip()).await.expect("created");
    let removed = core.delete_item(&item.id).await.expect("deleted");
    assert_eq!(removed.id, item.id);
    assert!(core.get_document().await.expect("document").items.is_empty());
    assert!(matches!(core.delete_item(&item.id).await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn listing_sweeps_exactly_the_orphans() {
    let root = tempfile::tempdir().expect("tempdir");
    let (config, core) = configured_core(root.path());
    let uploads = config.uploads_path();
    for name in ["a.png", "b.png", "c.png"] {
        fs::write(uploads.join(name), b"img").expect("seed upload");
    }

    let item = core.create_item(trip()).await.expect("created");
    core.update_item(
        &item.id,
        UpdateItemRequest {
            images: Some(vec!["/uploads/a.png".to_string(), "/uploads/b.png".to_string()]),
            ..UpdateItemRequest::default()
        },
    )
    .await
    .expect("updated");

    let first = core.list_uploads().await.expect("first listing");
    assert_eq!(first.cleaned, 1);
    assert_eq!(first.uploads, vec!["/uploads/a.png".to_string(), "/uploads/b.png".to_string()]);
    assert!(!uploads.join("c.png").exists());

    let second = core.list_uploads().await.expect("second listing");
    assert_eq!(second.cleaned, 0);
    assert_eq!(second.uploads.len(), 2);
}

#[tokio::test]
async fn no_base_serves_outside_itself() {
    let root = tempfile::tempdir().expect("tempdir");
    let (config, core) = configured_core(root.path());
    fs::write(config.uploads_path().join("photo.png"), b"png").expect("upload");

    for base in [StaticBase::Uploads, StaticBase::Public, StaticBase::Admin] {
        for attempt in ["../../etc/passwd", "../data/timeline.json", "../../data/timeline.json", "..\\..\\etc\\passwd"] {
            assert!(
                matches!(core.resolve_static(base, attempt).await, Err(AppError::NotFound(_))),
                "{} served {}",
                base.as_str(),
                attempt
            );
        }
    }

    let script = core.resolve_static(StaticBase::Public, "app.js").await.expect("public asset");
    assert_eq!(script.content_type, "text/javascript; charset=utf-8");
    let admin = core.resolve_static(StaticBase::Admin, "index.html").await.expect("admin asset");
    assert_eq!(admin.bytes, b"<html/>");
    let photo = core.resolve_static(StaticBase::Uploads, "photo.png").await.expect("upload");
    assert_eq!(photo.content_type, "image/png");
    assert!(matches!(
        core.resolve_static(StaticBase::Public, "index.html").await,
        Err(AppError::NotFound(_))
    ));
}
