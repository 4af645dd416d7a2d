//! Cloud relay queue processing while host.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use common::{MockCloud, png, spawn_router, wait_for_router, wait_until};
use t02relay::router::{RenderKind, Role};
use t02relay::transport::LinkEvent;

fn image_document() -> String {
    STANDARD.encode(png(384, 40, 0))
}

#[tokio::test(start_paused = true)]
async fn test_host_prints_and_deletes_oldest_job() {
    let cloud = Arc::new(MockCloud::default());
    cloud.push("first", &image_document(), RenderKind::ImageRender);
    cloud.push("second", &image_document(), RenderKind::TextRender);

    let h = spawn_router("desk", Some(Arc::clone(&cloud)));
    h.radio.emit(LinkEvent::RadioPoweredOn);
    wait_for_router(&h.router, |s| s.role == Role::Host).await;

    wait_until(|| cloud.deleted().len() == 2).await;
    assert_eq!(cloud.deleted(), vec!["first", "second"]);
    assert!(h.radio.written().starts_with(&[0x1B, 0x40]));
    wait_for_router(&h.router, |s| s.cloud_status == "Job completed & deleted").await;
}

#[tokio::test(start_paused = true)]
async fn test_invalid_document_is_skipped() {
    let cloud = Arc::new(MockCloud::default());
    cloud.push("broken", "%%% not base64 %%%", RenderKind::ImageRender);
    cloud.push("good", &image_document(), RenderKind::ImageRender);

    let h = spawn_router("desk", Some(Arc::clone(&cloud)));
    h.radio.emit(LinkEvent::RadioPoweredOn);

    wait_until(|| cloud.deleted() == vec!["good".to_string()]).await;
    assert_eq!(cloud.remaining(), vec!["broken"]);

    // later polls keep ignoring it
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(cloud.deleted(), vec!["good"]);
}

#[tokio::test(start_paused = true)]
async fn test_client_does_not_poll() {
    let cloud = Arc::new(MockCloud::default());
    cloud.push("first", &image_document(), RenderKind::ImageRender);

    let h = spawn_router("phone", Some(Arc::clone(&cloud)));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(h.router.snapshot().cloud_status, "Idle");
    assert!(cloud.deleted().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_write_keeps_document() {
    let cloud = Arc::new(MockCloud::default());
    cloud.push("first", &image_document(), RenderKind::ImageRender);

    let h = spawn_router("desk", Some(Arc::clone(&cloud)));
    h.radio.fail_writes.store(true, Ordering::SeqCst);
    h.radio.emit(LinkEvent::RadioPoweredOn);

    wait_for_router(&h.router, |s| s.cloud_status.starts_with("Error:")).await;
    assert!(cloud.deleted().is_empty());
    assert_eq!(cloud.remaining(), vec!["first"]);

    // retried on a later poll once the link accepts writes
    h.radio.fail_writes.store(false, Ordering::SeqCst);
    wait_until(|| cloud.deleted() == vec!["first".to_string()]).await;
}
