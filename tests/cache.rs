mod common;

use common::{qa_task_builder, sequence_length, unique_name, write_qa_source};
use std::fs;
use t5_data::dataset::Example;
use t5_data::registry::DatasetOptions;
use t5_data::tasks::{add_global_cache_dirs, cache_task, CachedSplitInfo, COMPLETED_FILE};
use t5_data::{Config, T5DataError};

fn sorted_by_plaintext(mut examples: Vec<Example>) -> Vec<Example> {
    examples.sort_by(|a, b| {
        a.text("inputs_plaintext")
            .ok()
            .cmp(&b.text("inputs_plaintext").ok())
    });
    examples
}

#[test]
fn test_cache_and_read_back() -> anyhow::Result<()> {
    //    Set-up task
    let data_dir = tempfile::tempdir()?;
    let cache_root = tempfile::tempdir()?;
    let source = write_qa_source(data_dir.path(), &unique_name("qa"), "question ", 7, 3)?;
    let task = qa_task_builder(&unique_name("cached_task"), &source, data_dir.path()).build()?;
    assert!(!task.cached());

    //    Write the cache
    let task_cache = cache_task(&task, cache_root.path(), &["train", "validation"], 3)?;
    assert_eq!(task_cache, cache_root.path().join(task.name()));
    assert!(task_cache.join(COMPLETED_FILE).exists());
    assert!(task_cache.join("train.jsonl-00000-of-00003").exists());
    let info = CachedSplitInfo::from_file(task_cache.join("info.train.json"))?;
    assert_eq!(info.num_shards, 3);
    assert!(info.features.contains_key("inputs"));
    assert!(info.features.contains_key("targets_plaintext"));

    //    Register the cache directory
    add_global_cache_dirs(vec![cache_root.path().to_path_buf()]);
    assert!(task.cached());
    assert_eq!(task.cache_dir()?, task_cache);

    let stats = task.get_cached_stats("train")?;
    assert_eq!(stats.examples, 7);
    // "question N" is 10 bytes
    assert_eq!(stats.tokens("inputs"), Some(70));
    assert_eq!(stats.max_tokens("inputs"), Some(10));
    assert!(matches!(
        task.get_cached_stats("test"),
        Err(T5DataError::CacheError(_))
    ));

    //    Cached and on-the-fly datasets hold the same examples
    let cached_options = DatasetOptions {
        shuffle: false,
        ..DatasetOptions::for_split("train")
    };
    let generated_options = DatasetOptions {
        use_cached: false,
        ..cached_options.clone()
    };
    let cached = task
        .get_dataset(&sequence_length(6, 4), &cached_options)?
        .collect()?;
    let generated = task
        .get_dataset(&sequence_length(6, 4), &generated_options)?
        .collect()?;
    assert_eq!(cached.len(), 7);
    assert_eq!(sorted_by_plaintext(cached), sorted_by_plaintext(generated));
    Ok(())
}

#[test]
fn test_uncached_task() -> anyhow::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let source = write_qa_source(data_dir.path(), &unique_name("qa"), "q", 2, 1)?;
    let task = qa_task_builder(&unique_name("uncached_task"), &source, data_dir.path()).build()?;

    assert!(!task.cached());
    assert!(matches!(task.cache_dir(), Err(T5DataError::CacheError(_))));
    assert!(matches!(
        task.get_cached_stats("train"),
        Err(T5DataError::CacheError(_))
    ));
    assert!(matches!(
        task.get_dataset(&sequence_length(8, 8), &DatasetOptions::default()),
        Err(T5DataError::CacheError(_))
    ));
    Ok(())
}

#[test]
fn test_incomplete_cache_is_ignored() -> anyhow::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let cache_root = tempfile::tempdir()?;
    let source = write_qa_source(data_dir.path(), &unique_name("qa"), "q", 2, 1)?;
    let task = qa_task_builder(&unique_name("incomplete_task"), &source, data_dir.path()).build()?;

    let task_cache = cache_task(&task, cache_root.path(), &["train"], 1)?;
    fs::remove_file(task_cache.join(COMPLETED_FILE))?;
    add_global_cache_dirs(vec![cache_root.path().to_path_buf()]);
    assert!(!task.cached());
    Ok(())
}

#[test]
fn test_cache_task_errors() -> anyhow::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let cache_root = tempfile::tempdir()?;
    let source = write_qa_source(data_dir.path(), &unique_name("qa"), "q", 2, 1)?;
    let task = qa_task_builder(&unique_name("failing_task"), &source, data_dir.path()).build()?;

    assert!(matches!(
        cache_task(&task, cache_root.path(), &["train"], 0),
        Err(T5DataError::InvalidConfigurationError(_))
    ));

    //    A failed split leaves no cache behind
    assert!(cache_task(&task, cache_root.path(), &["train", "test"], 1).is_err());
    assert_eq!(fs::read_dir(cache_root.path())?.count(), 0);

    cache_task(&task, cache_root.path(), &["train"], 1)?;
    assert!(matches!(
        cache_task(&task, cache_root.path(), &["train"], 1),
        Err(T5DataError::CacheError(_))
    ));
    Ok(())
}
