//! Preview publishing against the in-memory tracker.

mod common;

use bridge_traits::entity::FrameRange;
use bridge_traits::testing::InMemoryCatalog;
use common::{Harness, Options};
use core_runtime::config::KitsuSettings;
use core_sync::{
    PreviewPublisher, PublishRequest, PublishTarget, RemoteWrite, SyncError,
};
use serde_json::{json, Map};
use std::path::Path;

const MOVIE: &str = "/renders/SQ01-SH010_anm_v003.mov";

async fn harness_with_shot(settings: Option<KitsuSettings>) -> Harness {
    let options = match settings {
        Some(settings) => Options {
            settings,
            ..Options::default()
        },
        None => Options::default(),
    };
    let h = Harness::with_options(InMemoryCatalog::new(), options).await;
    let sequence = h.tracker.add_sequence(&h.project, None, "SQ01");
    h.tracker
        .add_shot(&sequence, "SH010", Some(FrameRange::new(1, 48).unwrap()));
    h.tracker.add_task_type("Animation");
    h.tracker.add_task_status("Todo", "todo");
    h.tracker.add_task_status("Waiting For Approval", "wfa");
    h.fs.put(Path::new(MOVIE), b"movie-bytes");
    h
}

fn publisher(h: &Harness) -> PreviewPublisher {
    PreviewPublisher::new(h.fs.clone())
}

#[tokio::test]
async fn test_publish_shot_preview() {
    let h = harness_with_shot(None).await;
    let session = h.session().await;
    let mut pipeline_data = Map::new();
    pipeline_data.insert("version".to_string(), json!("v003"));
    let mut request = PublishRequest::new(PublishTarget::Shot("SQ01-SH010".into()), "anm", MOVIE)
        .with_comment("blocking pass")
        .with_status("wfa")
        .as_main_preview();
    request.pipeline_data = pipeline_data;

    let outcome = publisher(&h).publish(&session, request).await.unwrap();

    let shot = h.tracker.shot_named("SH010").unwrap();
    assert_eq!(outcome.entity_id, shot.id);
    assert_eq!(outcome.metadata, RemoteWrite::Applied);
    assert!(outcome.set_as_main);
    assert_eq!(h.tracker.main_previews(), [outcome.preview_id.clone()]);
    assert_eq!(
        h.tracker.uploaded_file_name(&outcome.preview_id).as_deref(),
        Some("SQ01-SH010_anm_v003.mov")
    );

    let comments = h.tracker.comments();
    let (task_id, comment) = &comments[0];
    assert_eq!(task_id, &outcome.task_id);
    assert_eq!(comment.text.as_deref(), Some("blocking pass"));

    let media = &shot.data.metadata.rv_media["Animation"];
    assert_eq!(media.last.as_deref(), Some(MOVIE));
    assert_eq!(
        shot.data.metadata.prism["Animation"].get("version"),
        Some(&json!("v003"))
    );
}

#[tokio::test]
async fn test_second_publish_reuses_task_and_keeps_history() {
    let h = harness_with_shot(None).await;
    let session = h.session().await;
    let publisher = publisher(&h);
    let second_movie = "/renders/SQ01-SH010_anm_v004.mov";
    h.fs.put(Path::new(second_movie), b"v4");

    let first = publisher
        .publish(
            &session,
            PublishRequest::new(PublishTarget::Shot("SQ01-SH010".into()), "anm", MOVIE),
        )
        .await
        .unwrap();
    let second = publisher
        .publish(
            &session,
            PublishRequest::new(PublishTarget::Shot("SQ01-SH010".into()), "anm", second_movie),
        )
        .await
        .unwrap();

    assert_eq!(first.task_id, second.task_id);
    assert_eq!(h.tracker.tasks().len(), 1);
    assert_eq!(h.tracker.call_count("create_task"), 1);
    assert!(h.tracker.main_previews().is_empty());

    let shot = h.tracker.shot_named("SH010").unwrap();
    let media = &shot.data.metadata.rv_media["Animation"];
    assert_eq!(media.last.as_deref(), Some(second_movie));
    assert_eq!(media.previous, [MOVIE]);
}

#[tokio::test]
async fn test_status_falls_back_to_settings_then_todo() {
    let mut settings =
        KitsuSettings::new("https://kitsu.studio.test", common::PROJECT, common::USER);
    settings.publish_status = Some("wfa".to_string());
    let h = harness_with_shot(Some(settings)).await;
    let session = h.session().await;

    publisher(&h)
        .publish(
            &session,
            PublishRequest::new(PublishTarget::Shot("SQ01-SH010".into()), "anm", MOVIE),
        )
        .await
        .unwrap();
    assert_eq!(h.tracker.call_count("find_task_status"), 1);
    assert!(h.tracker.calls().contains(&"find_task_status:wfa".to_string()));

    let h = harness_with_shot(None).await;
    let session = h.session().await;
    publisher(&h)
        .publish(
            &session,
            PublishRequest::new(PublishTarget::Shot("SQ01-SH010".into()), "anm", MOVIE),
        )
        .await
        .unwrap();
    assert!(h.tracker.calls().contains(&"find_task_status:todo".to_string()));
}

#[tokio::test]
async fn test_publish_asset_preview() {
    let h = harness_with_shot(None).await;
    let props = h.tracker.add_asset_type("Props");
    let chair = h.tracker.add_asset(&h.project, &props, "Chair", None);
    h.tracker.add_task_type("Modeling");
    h.fs.put(Path::new("/renders/chair_turn.mp4"), b"turn");
    let session = h.session().await;

    let outcome = publisher(&h)
        .publish(
            &session,
            PublishRequest::new(
                PublishTarget::Asset("Chair".into()),
                "Modeling",
                "/renders/chair_turn.mp4",
            ),
        )
        .await
        .unwrap();

    assert_eq!(outcome.entity_id, chair.id);
    let chair = h.tracker.asset_named("Chair").unwrap();
    assert_eq!(
        chair.data.metadata.rv_media["Modeling"].last.as_deref(),
        Some("/renders/chair_turn.mp4")
    );
}

#[tokio::test]
async fn test_image_sequences_are_rejected_before_any_request() {
    let h = harness_with_shot(None).await;
    let session = h.session().await;
    h.tracker.clear_calls();

    let err = publisher(&h)
        .publish(
            &session,
            PublishRequest::new(
                PublishTarget::Shot("SQ01-SH010".into()),
                "anm",
                "/renders/SQ01-SH010.0001.exr",
            ),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::UnsupportedMedia { .. }));
    assert!(h.tracker.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_targets_and_task_types() {
    let h = harness_with_shot(None).await;
    let session = h.session().await;
    let publisher = publisher(&h);

    let err = publisher
        .publish(
            &session,
            PublishRequest::new(PublishTarget::Shot("SQ01-SH999".into()), "anm", MOVIE),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::EntityNotFound { kind: "shot", .. }));

    let err = publisher
        .publish(
            &session,
            PublishRequest::new(PublishTarget::Shot("SQ01-SH010".into()), "lgt", MOVIE),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::TaskTypeNotFound(ref name) if name == "Lighting"));

    let err = publisher
        .publish(
            &session,
            PublishRequest::new(PublishTarget::Shot("SQ01-SH010".into()), "anm", MOVIE)
                .with_status("nope"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::TaskStatusNotFound(_)));
    assert!(h.tracker.tasks().is_empty());
}

#[tokio::test]
async fn test_failed_metadata_push_keeps_the_preview() {
    let h = harness_with_shot(None).await;
    h.tracker.fail_writes_for("SH010");
    let session = h.session().await;

    let outcome = publisher(&h)
        .publish(
            &session,
            PublishRequest::new(PublishTarget::Shot("SQ01-SH010".into()), "anm", MOVIE),
        )
        .await
        .unwrap();

    assert!(matches!(outcome.metadata, RemoteWrite::Failed(_)));
    assert_eq!(h.tracker.comments().len(), 1);
}
