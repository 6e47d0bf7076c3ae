mod common;

use common::{FakeConverter, FakeNormalizer, FakeUploader, Fixture, Upload};
use futures::StreamExt;
use offload_card::{FileKind, FileRecord};
use offload_pipeline::error::ErrorKind;
use offload_pipeline::{CleanupReport, ConversionJob, PoolEvent, Pipeline, Toolbox, WorkerPool};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use time::OffsetDateTime;

fn toolbox(converter: &Arc<FakeConverter>, uploader: &Arc<FakeUploader>) -> Toolbox {
    Toolbox { converter: Some(converter.clone()), normalizer: None, uploader: Some(uploader.clone()) }
}

fn tags(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

#[tokio::test]
async fn test_converts_new_raws_and_pairs_camera_jpegs() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF", "B.ORF", "A.JPG"]);
    let config = fixture.config();
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let uploader = Arc::new(FakeUploader::default());
    let mut state = fixture.state();

    let summary = Pipeline::new(&config, &fixture.resolver(), toolbox(&converter, &uploader)).run(&mut state).await.unwrap();

    assert_eq!(converter.converted(), ["A.ORF", "B.ORF"]);
    assert_eq!(summary.selected, ["A.ORF", "B.ORF"]);
    assert_eq!((summary.succeeded, summary.failed), (2, 0));
    assert_eq!(uploader.uploads(), [
        Upload { files: tags(&["A.jpg", "B.jpg"]), tags: tags(&["profile:Vivid", "processed"]) },
        Upload { files: tags(&["A.JPG"]), tags: tags(&["camera-original"]) },
    ]);
    assert_eq!(summary.batches_uploaded, 2);

    // Processed output is removed after a good upload; the card is untouched.
    assert_eq!(summary.cleaned.removed, 2);
    assert!(!fixture.output().join("A.jpg").exists());
    assert!(fixture.card().join("DCIM/100OMSYS/A.ORF").exists());

    let saved = fixture.state();
    assert!(saved.is_processed("A.ORF"));
    assert!(saved.is_processed("B.ORF"));
    assert!(!saved.is_processed("A.JPG"));
    assert_eq!(saved.get("A.ORF").unwrap().profile_used, "Vivid");
    assert_eq!(saved.card_id(), Some("card"));
}

#[tokio::test]
async fn test_already_processed_submits_nothing() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF", "B.ORF"]);
    let config = fixture.config();
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let uploader = Arc::new(FakeUploader::default());
    let mut state = fixture.state_with(&["A.ORF", "B.ORF"]);

    let summary = Pipeline::new(&config, &fixture.resolver(), toolbox(&converter, &uploader)).run(&mut state).await.unwrap();

    assert!(summary.selected.is_empty());
    assert!(converter.converted().is_empty());
    assert!(uploader.uploads().is_empty());
    assert_eq!(state.len(), 2);
}

#[tokio::test]
async fn test_forgets_files_removed_from_card() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF"]);
    let config = fixture.config();
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let uploader = Arc::new(FakeUploader::default());
    let mut state = fixture.state_with(&["A.ORF", "Z.ORF"]);

    let summary = Pipeline::new(&config, &fixture.resolver(), toolbox(&converter, &uploader)).run(&mut state).await.unwrap();

    assert_eq!(summary.forgotten, 1);
    assert!(converter.converted().is_empty());
    let saved = fixture.state();
    assert!(saved.is_processed("A.ORF"));
    assert!(!saved.is_processed("Z.ORF"));
}

#[tokio::test]
async fn test_limit_takes_a_prefix() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF", "B.ORF"]);
    let mut config = fixture.config();
    config.limit = Some(1);
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let uploader = Arc::new(FakeUploader::default());
    let mut state = fixture.state();

    let summary = Pipeline::new(&config, &fixture.resolver(), toolbox(&converter, &uploader)).run(&mut state).await.unwrap();

    assert_eq!(converter.converted(), ["A.ORF"]);
    assert_eq!(summary.deferred, 1);
    assert!(state.is_processed("A.ORF"));
    assert!(!state.is_processed("B.ORF"));
}

#[tokio::test]
async fn test_failed_conversion_is_not_remembered() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF", "B.ORF", "C.ORF"]);
    let config = fixture.config();
    let converter = Arc::new(FakeConverter::new(fixture.output()).failing(&["B.ORF"]));
    let uploader = Arc::new(FakeUploader::default());
    let mut state = fixture.state();

    let summary = Pipeline::new(&config, &fixture.resolver(), toolbox(&converter, &uploader)).run(&mut state).await.unwrap();

    assert_eq!(converter.converted(), ["A.ORF", "B.ORF", "C.ORF"]);
    assert_eq!((summary.succeeded, summary.failed), (2, 1));
    assert!(state.is_processed("A.ORF"));
    assert!(!state.is_processed("B.ORF"));
    assert!(state.is_processed("C.ORF"));
    assert_eq!(uploader.uploads()[0].files, ["A.jpg", "C.jpg"]);
}

#[tokio::test]
async fn test_dry_run_writes_nothing() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF", "B.ORF"]);
    let mut config = fixture.config();
    config.dry_run = true;
    let mut state = fixture.state();

    // No tools at all: a dry run never needs them.
    let summary = Pipeline::new(&config, &fixture.resolver(), Toolbox::default()).run(&mut state).await.unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.selected, ["A.ORF", "B.ORF"]);
    assert_eq!(summary.succeeded, 0);
    assert!(!fixture.dir.path().join("state.json").exists());
    assert!(!fixture.output().exists());
}

#[tokio::test]
async fn test_skip_upload_needs_no_uploader_and_keeps_output() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF"]);
    let mut config = fixture.config();
    config.skip_upload = true;
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let tools = Toolbox { converter: Some(converter.clone()), ..Toolbox::default() };
    let mut state = fixture.state();

    let summary = Pipeline::new(&config, &fixture.resolver(), tools).run(&mut state).await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.batches_uploaded, 0);
    assert!(fixture.output().join("A.jpg").exists());
    assert!(fixture.state().is_processed("A.ORF"));
}

#[tokio::test]
async fn test_failed_upload_keeps_output() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF", "A.JPG"]);
    let config = fixture.config();
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let uploader = Arc::new(FakeUploader::failing());
    let mut state = fixture.state();

    let summary = Pipeline::new(&config, &fixture.resolver(), toolbox(&converter, &uploader)).run(&mut state).await.unwrap();

    assert_eq!(summary.batches_failed, 2);
    assert_eq!(summary.cleaned.removed, 0);
    assert!(fixture.output().join("A.jpg").exists());
    // Conversion succeeded, so the file is still remembered.
    assert!(state.is_processed("A.ORF"));
}

#[tokio::test]
async fn test_cleanup_spares_outputs_that_were_not_uploaded() {
    let fixture = Fixture::new();
    fixture.put_in("100OMSYS", &["P1.ORF"]);
    fixture.put_in("101OMSYS", &["P1.ORF"]);
    let config = fixture.config();
    let converter = Arc::new(FakeConverter::new(fixture.output()).per_folder());
    let uploader = Arc::new(FakeUploader::default());
    let mut state = fixture.state();

    let summary = Pipeline::new(&config, &fixture.resolver(), toolbox(&converter, &uploader)).run(&mut state).await.unwrap();

    // Both convert, but the second `P1.jpg` collides with the first in the
    // staging directory and is never sent.
    assert_eq!(summary.succeeded, 2);
    assert_eq!(uploader.uploads()[0].files, ["P1.jpg"]);
    assert_eq!(summary.cleaned, CleanupReport { removed: 1, failed: 0 });
    let left: Vec<_> = ["100OMSYS", "101OMSYS"]
        .iter()
        .map(|folder| fixture.output().join(folder).join("P1.jpg"))
        .filter(|path| path.exists())
        .collect();
    assert_eq!(left.len(), 1);
}

#[tokio::test]
async fn test_missing_converter_stops_before_any_file() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF"]);
    let config = fixture.config();
    let uploader = Arc::new(FakeUploader::default());
    let tools = Toolbox { uploader: Some(uploader.clone()), ..Toolbox::default() };
    let mut state = fixture.state();

    let err = Pipeline::new(&config, &fixture.resolver(), tools).run(&mut state).await.unwrap_err();

    assert!(matches!(&*err, ErrorKind::MissingTool("converter")));
    assert!(state.is_empty());
    assert!(uploader.uploads().is_empty());
}

#[tokio::test]
async fn test_missing_card_is_a_volume_error() {
    let fixture = Fixture::new();
    let mut config = fixture.config();
    config.volume.path = Some(fixture.dir.path().join("nowhere"));
    let resolver = offload_card::FixedPath::new(fixture.dir.path().join("nowhere"));
    let mut state = fixture.state();

    let err = Pipeline::new(&config, &resolver, Toolbox::default()).run(&mut state).await.unwrap_err();
    assert!(matches!(&*err, ErrorKind::Volume | ErrorKind::Scan));
}

#[tokio::test]
async fn test_jpeg_only_uploads_each_file() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF", "A.JPG", "B.JPG"]);
    let mut config = fixture.config();
    config.process_raw = false;
    let uploader = Arc::new(FakeUploader::default());
    let tools = Toolbox { uploader: Some(uploader.clone()), ..Toolbox::default() };
    let mut state = fixture.state_with(&["A.JPG"]);

    let summary = Pipeline::new(&config, &fixture.resolver(), tools).run(&mut state).await.unwrap();

    assert_eq!(summary.selected, ["B.JPG"]);
    assert_eq!(uploader.uploads(), [Upload { files: tags(&["B.JPG"]), tags: tags(&["camera-original"]) }]);
    let saved = fixture.state();
    assert_eq!(saved.get("B.JPG").unwrap().profile_used, "jpg-only");
    assert!(!saved.is_processed("A.ORF"));
}

#[tokio::test]
async fn test_normalizer_runs_first_and_intermediates_are_cleaned() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF"]);
    let mut config = fixture.config();
    config.normalize.enabled = true;
    config.skip_upload = true;
    let scratch = fixture.dir.path().join("dng");
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let tools = Toolbox {
        converter: Some(converter.clone()),
        normalizer: Some(Arc::new(FakeNormalizer::new(&scratch))),
        uploader: None,
    };
    let mut state = fixture.state();

    let summary = Pipeline::new(&config, &fixture.resolver(), tools).run(&mut state).await.unwrap();

    assert_eq!(converter.calls.lock().unwrap().as_slice(), [scratch.join("A.dng")]);
    assert_eq!(summary.intermediates_cleaned.removed, 1);
    assert!(!scratch.join("A.dng").exists());
}

#[tokio::test]
async fn test_intermediates_are_cleaned_after_failed_upload() {
    let fixture = Fixture::new();
    fixture.put(&["A.ORF"]);
    let mut config = fixture.config();
    config.normalize.enabled = true;
    let scratch = fixture.dir.path().join("dng");
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let tools = Toolbox {
        converter: Some(converter.clone()),
        normalizer: Some(Arc::new(FakeNormalizer::new(&scratch))),
        uploader: Some(Arc::new(FakeUploader::failing())),
    };
    let mut state = fixture.state();

    let summary = Pipeline::new(&config, &fixture.resolver(), tools).run(&mut state).await.unwrap();

    assert_eq!(summary.batches_failed, 1);
    assert_eq!(summary.intermediates_cleaned.removed, 1);
    assert!(!scratch.join("A.dng").exists());
    assert!(fixture.output().join("A.jpg").exists());
}

fn jobs(card: &std::path::Path, count: usize) -> Vec<ConversionJob> {
    (0..count)
        .map(|sequence| {
            let path = card.join(format!("P{sequence:03}.ORF"));
            std::fs::write(&path, b"raw").unwrap();
            let source = FileRecord::new(path, 3, OffsetDateTime::UNIX_EPOCH, FileKind::Raw).unwrap();
            ConversionJob { sequence, source }
        })
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_respects_worker_bound() {
    let fixture = Fixture::new();
    let converter = Arc::new(FakeConverter::new(fixture.output()).slow(Duration::from_millis(20)));
    let pool = WorkerPool::new(converter.clone(), None, Some(2));

    let events: Vec<_> = pool.run(jobs(&fixture.card(), 8)).collect().await;

    assert!(matches!(events.first(), Some(PoolEvent::Started { jobs: 8, workers: 2 })));
    assert!(matches!(events.last(), Some(PoolEvent::Complete)));
    let sequences: BTreeSet<usize> = events
        .iter()
        .filter_map(|e| match e {
            PoolEvent::Converted(outcome) => {
                assert!(outcome.result.is_ok());
                Some(outcome.sequence)
            },
            _ => None,
        })
        .collect();
    assert_eq!(sequences, (0..8).collect());
    assert_eq!(events.len(), 10);
    let high_water = converter.high_water.load(Ordering::SeqCst);
    assert!((1..=2).contains(&high_water), "{high_water} conversions overlapped");
}

#[tokio::test]
async fn test_pool_with_no_jobs() {
    let fixture = Fixture::new();
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let pool = WorkerPool::new(converter.clone(), None, None);

    let events: Vec<_> = pool.run(Vec::new()).collect().await;
    assert!(matches!(events.as_slice(), [PoolEvent::Started { jobs: 0, .. }, PoolEvent::Complete]));
    assert!(converter.converted().is_empty());
}

#[tokio::test]
async fn test_pool_keeps_intermediate_when_conversion_fails() {
    let fixture = Fixture::new();
    let scratch = fixture.dir.path().join("dng");
    let converter = Arc::new(FakeConverter::new(fixture.output()).failing(&["P000.dng"]));
    let normalizer = Arc::new(FakeNormalizer::new(&scratch));
    let pool = WorkerPool::new(converter, Some(normalizer), Some(1));

    let mut outcomes = Vec::new();
    let mut events = std::pin::pin!(pool.run(jobs(&fixture.card(), 2)));
    while let Some(event) = events.next().await {
        if let PoolEvent::Converted(outcome) = event {
            outcomes.push(outcome);
        }
    }
    outcomes.sort_by_key(|o| o.sequence);

    assert!(outcomes[0].result.is_err());
    assert_eq!(outcomes[0].intermediate.as_deref(), Some(scratch.join("P000.dng").as_path()));
    assert!(outcomes[1].result.is_ok());
    assert_eq!(outcomes[1].intermediate.as_deref(), Some(scratch.join("P001.dng").as_path()));
}

#[tokio::test]
async fn test_pool_normalizer_failure_skips_conversion() {
    let fixture = Fixture::new();
    let scratch = fixture.dir.path().join("dng");
    let converter = Arc::new(FakeConverter::new(fixture.output()));
    let mut normalizer = FakeNormalizer::new(&scratch);
    normalizer.fail.insert("P000.ORF".to_string());
    let pool = WorkerPool::new(converter.clone(), Some(Arc::new(normalizer)), Some(1));

    let events: Vec<_> = pool.run(jobs(&fixture.card(), 1)).collect().await;
    let Some(PoolEvent::Converted(outcome)) = events.get(1) else { panic!("expected an outcome") };
    assert!(outcome.result.is_err());
    assert!(outcome.intermediate.is_none());
    assert!(converter.converted().is_empty());
}
