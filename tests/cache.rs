use anyhow::Result;
use pixelbeam::cache::{ExtractOrigin, ExtractionCache};
use pixelbeam::dataset::EventType;
use pixelbeam::error::{ExtractionError, SourceError};
use pixelbeam::source::{FetchParams, SourceClient};
use pixelbeam::testing::*;
use std::fs;

fn battles() -> EventType {
    EventType::new("battles", "BATTLE_END")
}

fn fetcher<'a>(src: &'a MockSource, et: &'a EventType) -> impl FnOnce() -> Result<Vec<pixelbeam::EventRecord>, SourceError> + 'a {
    move || src.fetch(et, &FetchParams::for_action(&et.action))
}

#[test]
fn second_call_makes_no_fetch() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = MockSource::new().with_records("BATTLE_END", battle_records(5));
    let cache = ExtractionCache::new(tmp.path());
    let et = battles();

    let (first, o1) = cache.get_or_fetch_traced(&et, fetcher(&src, &et))?;
    let (second, o2) = cache.get_or_fetch_traced(&et, fetcher(&src, &et))?;
    assert_eq!(src.calls("BATTLE_END"), 1);
    assert_eq!(first, second);
    assert_eq!((o1, o2), (ExtractOrigin::Network, ExtractOrigin::Memory));
    assert!(cache.artifact_path(&et).is_file());
    Ok(())
}

#[test]
fn artifact_survives_the_process() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = MockSource::new().with_records("BATTLE_END", battle_records(5));
    let et = battles();
    let first = ExtractionCache::new(tmp.path()).get_or_fetch(&et, fetcher(&src, &et))?;

    // a fresh cache over the same directory stands in for the next process
    let (second, origin) = ExtractionCache::new(tmp.path()).get_or_fetch_traced(&et, fetcher(&src, &et))?;
    assert_eq!(origin, ExtractOrigin::Disk);
    assert_eq!(src.calls("BATTLE_END"), 1);
    assert_eq!(first.table(), second.table());
    Ok(())
}

#[test]
fn empty_result_is_not_written() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = MockSource::new().with_records("BATTLE_END", Vec::new());
    let et = battles();
    let cache = ExtractionCache::new(tmp.path());

    let raw = cache.get_or_fetch(&et, fetcher(&src, &et))?;
    assert_eq!(raw.row_count(), 0);
    assert!(!cache.is_cached(&et));
    // memoized for the rest of this process
    cache.get_or_fetch(&et, fetcher(&src, &et))?;
    assert_eq!(src.calls("BATTLE_END"), 1);

    ExtractionCache::new(tmp.path()).get_or_fetch(&et, fetcher(&src, &et))?;
    assert_eq!(src.calls("BATTLE_END"), 2);
    Ok(())
}

#[test]
fn fetch_failure_is_typed() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = MockSource::new().with_failure("BATTLE_END", "connection refused");
    let et = battles();
    let err = ExtractionCache::new(tmp.path())
        .get_or_fetch(&et, fetcher(&src, &et))
        .unwrap_err();
    assert!(matches!(
        err,
        ExtractionError::Fetch {
            source: SourceError::RetriesExhausted { .. },
            ..
        }
    ));
    Ok(())
}

#[test]
fn corrupt_artifact_is_refetched() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let et = battles();
    let cache = ExtractionCache::new(tmp.path());
    fs::write(cache.artifact_path(&et), "{not json\n")?;

    let src = MockSource::new().with_records("BATTLE_END", battle_records(2));
    let (raw, origin) = cache.get_or_fetch_traced(&et, fetcher(&src, &et))?;
    assert_eq!(origin, ExtractOrigin::Network);
    assert_eq!(raw.row_count(), 2);

    let broken = ExtractionCache::new(tmp.path());
    fs::write(broken.artifact_path(&et), "{not json\n")?;
    let down = MockSource::new().with_auth_failure("BATTLE_END");
    let err = broken.get_or_fetch(&et, fetcher(&down, &et)).unwrap_err();
    assert!(matches!(err, ExtractionError::CacheAndFetch { .. }));
    Ok(())
}

#[test]
fn invalidate_forces_a_new_fetch() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let src = MockSource::new().with_records("BATTLE_END", battle_records(3));
    let et = battles();
    let cache = ExtractionCache::new(tmp.path());

    cache.get_or_fetch(&et, fetcher(&src, &et))?;
    assert!(cache.invalidate(&et)?);
    assert!(!cache.invalidate(&et)?);
    cache.get_or_fetch(&et, fetcher(&src, &et))?;
    assert_eq!(src.calls("BATTLE_END"), 2);
    Ok(())
}
