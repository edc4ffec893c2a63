#![allow(dead_code)]

use serde_json::json;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use t5_data::dataset::Example;
use t5_data::registry::SequenceLength;
use t5_data::tasks::preprocessors::rekey;
use t5_data::tasks::TaskBuilder;
use t5_data::vocabulary::ByteVocabulary;
use uuid::Uuid;

pub const VERSION: &str = "1.0.0";

/// Name unique across tests sharing the process-wide registries
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

pub fn qa_examples(prefix: &str, count: usize) -> Vec<Example> {
    (0..count)
        .map(|index| {
            Example::new()
                .with("question", format!("{}{}", prefix, index))
                .with("answer", format!("answer {}", index))
                .with("idx", index as i64)
        })
        .collect()
}

/// Writes a dataset version directory: `dataset_info.json` and JSON-lines shards, examples being
/// distributed round-robin over `num_shards` files.
pub fn write_source(
    version_dir: &Path,
    dataset: &str,
    configs: &[&str],
    splits: &[(&str, &[Example])],
    num_shards: usize,
) -> anyhow::Result<()> {
    fs::create_dir_all(version_dir)?;
    let mut split_infos = vec![];
    for (split, examples) in splits {
        let mut writers = (0..num_shards)
            .map(|shard| -> anyhow::Result<BufWriter<File>> {
                let path = version_dir.join(format!(
                    "{}-{}.jsonl-{:05}-of-{:05}",
                    dataset, split, shard, num_shards
                ));
                Ok(BufWriter::new(File::create(path)?))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        let mut shard_lengths = vec![0u64; num_shards];
        for (index, example) in examples.iter().enumerate() {
            let writer = &mut writers[index % num_shards];
            serde_json::to_writer(&mut *writer, example)?;
            writer.write_all(b"\n")?;
            shard_lengths[index % num_shards] += 1;
        }
        for writer in writers.iter_mut() {
            writer.flush()?;
        }
        split_infos.push(json!({
            "name": split,
            "num_examples": examples.len(),
            "shard_lengths": shard_lengths,
        }));
    }
    let info = json!({
        "name": dataset,
        "version": VERSION,
        "configs": configs,
        "splits": split_infos,
    });
    fs::write(
        version_dir.join("dataset_info.json"),
        serde_json::to_string_pretty(&info)?,
    )?;
    Ok(())
}

/// Writes `<data_dir>/<dataset>/1.0.0` with `train` and `validation` question/answer splits and
/// returns the source reference `<dataset>:1.0.0`.
pub fn write_qa_source(
    data_dir: &Path,
    dataset: &str,
    prefix: &str,
    num_train: usize,
    num_validation: usize,
) -> anyhow::Result<String> {
    let version_dir: PathBuf = data_dir.join(dataset).join(VERSION);
    write_source(
        &version_dir,
        dataset,
        &[],
        &[
            ("train", &qa_examples(prefix, num_train)[..]),
            ("validation", &qa_examples(prefix, num_validation)[..]),
        ],
        2,
    )?;
    Ok(format!("{}:{}", dataset, VERSION))
}

/// Question answering task over a source written by `write_qa_source`
pub fn qa_task_builder(name: &str, source: &str, data_dir: &Path) -> TaskBuilder {
    let mut builder = TaskBuilder::new(name, source);
    builder
        .with_data_dir(data_dir)
        .with_text_preprocessor(rekey(&[("inputs", "question"), ("targets", "answer")]))
        .with_vocabulary(Arc::new(ByteVocabulary::new()));
    builder
}

pub fn sequence_length(inputs: usize, targets: usize) -> SequenceLength {
    vec![
        ("inputs".to_string(), inputs),
        ("targets".to_string(), targets),
    ]
    .into_iter()
    .collect()
}
