use std::io::Cursor;
use std::time::Duration;

use proptest::prelude::*;

use super::*;
use crate::test_utils::{MockStorage, init_dummy_tracing_subscriber};
use crate::types::error::exit_code_from_error;
use crate::types::token::create_run_cancellation_token;

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

fn uploader(storage: &MockStorage, part_size: usize, queue_size: usize) -> MultipartUploader {
    MultipartUploader::new(storage.boxed(), RunContext::default(), PutOptions::default())
        .with_part_size(part_size)
        .with_queue_size(queue_size)
}

#[tokio::test]
async fn uploads_parts_and_commits_in_order() {
    init_dummy_tracing_subscriber();

    let storage = MockStorage::new("bkt");
    let data = payload(4500);
    let context = RunContext::default();

    let summary = MultipartUploader::new(storage.boxed(), context.clone(), PutOptions::default())
        .with_part_size(1000)
        .with_queue_size(3)
        .upload("big.bin", Cursor::new(data.clone()), None)
        .await
        .unwrap();

    assert_eq!(summary.parts, 5);
    assert_eq!(summary.bytes, 4500);
    assert!(summary.e_tag.is_some());

    let state = storage.state();
    let sizes: Vec<usize> = {
        let mut calls = state.upload_part_calls.clone();
        calls.sort();
        calls.into_iter().map(|(_, size)| size).collect()
    };
    assert_eq!(sizes, vec![1000, 1000, 1000, 1000, 500]);

    assert_eq!(state.complete_calls.len(), 1);
    let numbers: Vec<i32> = state.complete_calls[0]
        .iter()
        .map(|p| p.part_number().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    assert!(state.abort_calls.is_empty());
    assert_eq!(state.objects["big.bin"].body.as_ref(), data.as_slice());
    drop(state);

    let snapshot = context.snapshot();
    assert_eq!(snapshot.bytes_buffered, 4500);
    assert_eq!(snapshot.bytes_delivered, 4500);
}

#[tokio::test]
async fn exact_multiple_has_no_trailing_empty_part() {
    let storage = MockStorage::new("bkt");
    let summary = uploader(&storage, 1000, 2)
        .upload("k", Cursor::new(payload(3000)), None)
        .await
        .unwrap();

    assert_eq!(summary.parts, 3);
    assert!(storage.state().upload_part_calls.iter().all(|(_, size)| *size == 1000));
}

#[tokio::test]
async fn empty_source_still_uploads_one_part() {
    let storage = MockStorage::new("bkt");
    let summary = uploader(&storage, 1000, 1)
        .upload("empty", Cursor::new(Vec::new()), None)
        .await
        .unwrap();

    assert_eq!(summary.parts, 1);
    assert_eq!(summary.bytes, 0);
    let state = storage.state();
    assert_eq!(state.upload_part_calls, vec![(1, 0)]);
    assert_eq!(state.complete_calls.len(), 1);
    assert!(state.objects["empty"].body.is_empty());
}

#[tokio::test(start_paused = true)]
async fn in_flight_parts_are_bounded_by_queue_size() {
    let storage = MockStorage::new("bkt");
    storage.configure(|state| state.upload_delay = Some(Duration::from_millis(50)));

    uploader(&storage, 100, 3)
        .upload("k", Cursor::new(payload(1000)), None)
        .await
        .unwrap();

    let state = storage.state();
    assert_eq!(state.upload_part_calls.len(), 10);
    assert_eq!(state.max_uploads_in_flight, 3);
}

#[tokio::test(start_paused = true)]
async fn queue_size_one_uploads_sequentially() {
    let storage = MockStorage::new("bkt");
    storage.configure(|state| state.upload_delay = Some(Duration::from_millis(5)));

    uploader(&storage, 100, 1)
        .upload("k", Cursor::new(payload(450)), None)
        .await
        .unwrap();

    let state = storage.state();
    assert_eq!(state.max_uploads_in_flight, 1);
    let order: Vec<i32> = state.upload_part_calls.iter().map(|(n, _)| *n).collect();
    assert_eq!(order, vec![1, 2, 3, 4, 5]);
}

#[tokio::test(start_paused = true)]
async fn out_of_order_completion_commits_sorted_manifest() {
    let storage = MockStorage::new("bkt");
    storage.configure(|state| {
        state.part_delays.insert(1, Duration::from_millis(300));
        state.part_delays.insert(2, Duration::from_millis(200));
        state.part_delays.insert(3, Duration::from_millis(100));
    });
    let data = payload(400);

    uploader(&storage, 100, 4)
        .upload("k", Cursor::new(data.clone()), None)
        .await
        .unwrap();

    let state = storage.state();
    assert_eq!(state.upload_part_completions, vec![4, 3, 2, 1]);
    assert_eq!(state.complete_calls.len(), 1);
    let numbers: Vec<i32> = state.complete_calls[0]
        .iter()
        .map(|p| p.part_number().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
    assert_eq!(state.objects["k"].body.as_ref(), data.as_slice());
}

#[tokio::test]
async fn failed_part_aborts_without_commit() {
    let storage = MockStorage::new("bkt");
    storage.configure(|state| state.fail_upload_part = Some(2));

    let err = uploader(&storage, 1000, 2)
        .upload("k", Cursor::new(payload(5000)), None)
        .await
        .unwrap_err();

    match err.downcast_ref::<S3tkError>() {
        Some(S3tkError::UploadPart { part_number, .. }) => assert_eq!(*part_number, 2),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(exit_code_from_error(&err), 1);

    let state = storage.state();
    assert!(state.complete_calls.is_empty());
    assert_eq!(state.abort_calls.len(), 1);
    assert!(state.uploads.is_empty());
    assert!(!state.objects.contains_key("k"));
}

#[tokio::test]
async fn cancelled_upload_is_aborted() {
    let storage = MockStorage::new("bkt");
    let token = create_run_cancellation_token();
    token.cancel();

    let err = MultipartUploader::new(
        storage.boxed(),
        RunContext::new(token, false),
        PutOptions::default(),
    )
    .with_part_size(100)
    .upload("k", Cursor::new(payload(1000)), None)
    .await
    .unwrap_err();

    assert!(crate::types::error::is_cancelled_error(&err));
    let state = storage.state();
    assert!(state.upload_part_calls.is_empty());
    assert!(state.complete_calls.is_empty());
    assert_eq!(state.abort_calls.len(), 1);
}

#[tokio::test]
async fn put_options_reach_the_created_upload() {
    let storage = MockStorage::new("bkt");
    let options = PutOptions::from_entries(
        &["Content-Type: text/plain".to_string()],
        &["owner:me".to_string()],
        true,
    )
    .unwrap();

    MultipartUploader::new(storage.boxed(), RunContext::default(), options)
        .with_part_size(1000)
        .upload("notes.txt", Cursor::new(b"hello".to_vec()), None)
        .await
        .unwrap();

    let state = storage.state();
    assert_eq!(state.objects["notes.txt"].metadata["owner"], "me");
}

#[test]
fn manifest_requires_contiguous_complete_parts() {
    let mut manifest = UploadManifest::default();
    assert!(!manifest.is_complete());

    manifest.add(2, 10);
    manifest.add(1, 10);
    manifest.mark_complete(2, "\"b\"".to_string());
    assert!(!manifest.is_complete());
    assert!(manifest.completed_parts().is_err());

    manifest.mark_complete(1, "\"a\"".to_string());
    assert!(manifest.is_complete());
    let parts = manifest.completed_parts().unwrap();
    assert_eq!(parts[0].part_number(), Some(1));
    assert_eq!(parts[0].e_tag(), Some("\"a\""));
    assert_eq!(parts[1].part_number(), Some(2));

    manifest.add(4, 10);
    manifest.mark_complete(4, "\"d\"".to_string());
    assert!(!manifest.is_complete());
}

#[test]
fn failed_part_blocks_commit() {
    let mut manifest = UploadManifest::default();
    manifest.add(1, 10);
    manifest.mark_uploading(1);
    assert_eq!(manifest.parts()[0].status, PartStatus::Uploading);
    manifest.mark_failed(1);
    assert_eq!(manifest.parts()[0].status, PartStatus::Failed);
    assert!(!manifest.is_complete());
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 24,
        .. ProptestConfig::default()
    })]

    #[test]
    fn source_of_s_bytes_takes_ceil_s_over_p_parts(size in 0usize..20_000, part_size in 1000usize..5000, queue_size in 1usize..4) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let storage = MockStorage::new("bkt");
            let data = payload(size);
            let summary = uploader(&storage, part_size, queue_size)
                .upload("k", Cursor::new(data.clone()), None)
                .await
                .unwrap();

            let expected = size.div_ceil(part_size).max(1);
            prop_assert_eq!(summary.parts, expected);
            let state = storage.state();
            prop_assert_eq!(state.complete_calls.len(), 1);
            let numbers: Vec<i32> = state.complete_calls[0].iter().filter_map(|p| p.part_number()).collect();
            prop_assert_eq!(numbers, (1..=expected as i32).collect::<Vec<_>>());
            prop_assert_eq!(state.objects["k"].body.as_ref(), data.as_slice());
            Ok(())
        })?;
    }
}
