mod common;

use common::{qa_task_builder, sequence_length, unique_name, write_qa_source};
use std::path::Path;
use std::sync::Arc;
use t5_data::mixtures::{
    rate_num_examples, rate_unsupervised, MixingProportions, Mixture, MixtureComponent,
    MixtureRegistry, Rate, DEFAULT_UNSUPERVISED_RATE,
};
use t5_data::registry::DatasetOptions;
use t5_data::tasks::{add_global_cache_dirs, cache_task, Task, TaskRegistry};
use t5_data::vocabulary::Vocabulary;
use t5_data::T5DataError;
use tracing_test::traced_test;

#[derive(Debug)]
struct UppercaseVocabulary;

impl Vocabulary for UppercaseVocabulary {
    fn vocab_size(&self) -> usize {
        259
    }

    fn encode(&self, text: &str) -> Vec<i64> {
        text.to_uppercase().bytes().map(|b| b as i64 + 3).collect()
    }

    fn decode(&self, ids: &[i64]) -> String {
        ids.iter()
            .filter(|id| **id >= 3)
            .map(|id| (*id - 3) as u8 as char)
            .collect()
    }

    fn identifier(&self) -> String {
        "uppercase".to_string()
    }
}

/// Registers a question answering task whose inputs all start with `prefix`
fn register_task(data_dir: &Path, prefix: &str, num_train: usize) -> anyhow::Result<Arc<Task>> {
    let source = write_qa_source(data_dir, &unique_name("qa"), prefix, num_train, 4)?;
    let task = qa_task_builder(&unique_name("mixed_task"), &source, data_dir).build()?;
    Ok(TaskRegistry::add(task)?)
}

fn on_the_fly(split: &str, seed: u64) -> DatasetOptions {
    DatasetOptions {
        use_cached: false,
        seed: Some(seed),
        ..DatasetOptions::for_split(split)
    }
}

#[test]
fn test_mixture_follows_rates() -> anyhow::Result<()> {
    //    Set-up tasks and mixture
    let data_dir = tempfile::tempdir()?;
    let task_a = register_task(data_dir.path(), "a", 10)?;
    let task_b = register_task(data_dir.path(), "b", 10)?;
    let mixture = Mixture::new(
        vec![
            MixtureComponent::from((task_a.name(), 3.0)),
            MixtureComponent::from(task_b.name()),
        ],
        Some(Rate::Fixed(1.0)),
    )?;
    assert_eq!(mixture.get_rate(&task_a)?, 3.0);
    assert_eq!(mixture.get_rate(&task_b)?, 1.0);

    //    Sample
    let examples = mixture
        .get_dataset(&sequence_length(8, 8), &on_the_fly("train", 0))?
        .take_examples(2000)?;

    //    Check proportions and features
    assert_eq!(examples.len(), 2000);
    let mut from_a = 0;
    for example in &examples {
        assert_eq!(
            example.keys().cloned().collect::<Vec<String>>(),
            vec!["inputs", "targets"]
        );
        if example.tokens("inputs")?[0] == 100 {
            from_a += 1;
        }
    }
    let fraction_a = from_a as f64 / examples.len() as f64;
    assert!((fraction_a - 0.75).abs() < 0.05, "got {}", fraction_a);
    Ok(())
}

#[test]
fn test_mixture_definition_errors() -> anyhow::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let task_a = register_task(data_dir.path(), "a", 2)?;
    let task_b = register_task(data_dir.path(), "b", 2)?;

    match Mixture::new(vec![task_a.name(), task_b.name()], None) {
        Err(T5DataError::InvalidConfigurationError(message)) => {
            assert_eq!(message, "need a rate for each task")
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(matches!(
        Mixture::new(vec![task_a.name(), "not_registered_task"], Some(1.0.into())),
        Err(T5DataError::RegistryError(_))
    ));
    assert!(matches!(
        Mixture::new(vec![task_a.name(), task_a.name()], Some(1.0.into())),
        Err(T5DataError::InvalidConfigurationError(_))
    ));
    assert!(matches!(
        Mixture::new(Vec::<&str>::new(), Some(1.0.into())),
        Err(T5DataError::InvalidConfigurationError(_))
    ));
    Ok(())
}

#[test]
fn test_mixture_requires_compatible_tasks() -> anyhow::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let task_a = register_task(data_dir.path(), "a", 2)?;
    let source = write_qa_source(data_dir.path(), &unique_name("qa"), "c", 2, 2)?;

    let inputs_only = TaskRegistry::add(
        qa_task_builder(&unique_name("inputs_only"), &source, data_dir.path())
            .with_output_features(&["inputs"])
            .build()?,
    )?;
    assert!(matches!(
        Mixture::new(vec![task_a.name(), inputs_only.name()], Some(1.0.into())),
        Err(T5DataError::InvalidConfigurationError(_))
    ));

    let other_vocabulary = TaskRegistry::add(
        qa_task_builder(&unique_name("uppercase"), &source, data_dir.path())
            .with_vocabulary(Arc::new(UppercaseVocabulary))
            .build()?,
    )?;
    assert!(matches!(
        Mixture::new(
            vec![task_a.name(), other_vocabulary.name()],
            Some(1.0.into())
        ),
        Err(T5DataError::InvalidConfigurationError(_))
    ));
    Ok(())
}

#[test]
fn test_mixture_skips_tasks_without_split() -> anyhow::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let task_a = register_task(data_dir.path(), "a", 4)?;
    let source = write_qa_source(data_dir.path(), &unique_name("qa"), "b", 4, 4)?;
    let train_only = TaskRegistry::add(
        qa_task_builder(&unique_name("train_only"), &source, data_dir.path())
            .with_splits(&["train"])
            .build()?,
    )?;

    let mixture = Mixture::new(vec![task_a.name(), train_only.name()], Some(1.0.into()))?;
    let examples = mixture
        .get_dataset(&sequence_length(8, 8), &on_the_fly("validation", 1))?
        .take_examples(50)?;
    assert_eq!(examples.len(), 50);
    for example in &examples {
        assert_eq!(example.tokens("inputs")?[0], 100);
    }

    let train_only_mixture = Mixture::new(vec![train_only.name()], Some(1.0.into()))?;
    match train_only_mixture.get_dataset(&sequence_length(8, 8), &on_the_fly("validation", 1)) {
        Err(T5DataError::DatasetError(message)) => {
            assert_eq!(message, "No datasets have a 'validation' split")
        }
        other => panic!("unexpected result {:?}", other.map(|_| ())),
    }
    Ok(())
}

#[test]
fn test_rates_from_cached_stats() -> anyhow::Result<()> {
    //    Set-up cached tasks
    let data_dir = tempfile::tempdir()?;
    let cache_root = tempfile::tempdir()?;
    let task_a = register_task(data_dir.path(), "a", 16)?;
    let task_b = register_task(data_dir.path(), "b", 4)?;
    cache_task(&task_a, cache_root.path(), &["train"], 2)?;
    cache_task(&task_b, cache_root.path(), &["train"], 1)?;
    add_global_cache_dirs(vec![cache_root.path().to_path_buf()]);

    //    Rate functions
    assert_eq!(rate_num_examples(None, 1.0, 1.0).evaluate(&task_a)?, 16.0);
    assert_eq!(rate_num_examples(Some(8.0), 1.0, 1.0).evaluate(&task_a)?, 8.0);
    assert_eq!(rate_num_examples(Some(0.0), 1.0, 1.0).evaluate(&task_a)?, 16.0);
    assert_eq!(rate_num_examples(None, 2.0, 1.0).evaluate(&task_a)?, 4.0);
    assert_eq!(rate_num_examples(None, 1.0, 0.5).evaluate(&task_b)?, 2.0);
    assert_eq!(
        rate_unsupervised(None).evaluate(&task_b)?,
        DEFAULT_UNSUPERVISED_RATE
    );

    //    Cached training mixture, with mixing proportions logged
    let mixture = Mixture::new(
        vec![task_a.name(), task_b.name()],
        Some(rate_num_examples(None, 1.0, 1.0)),
    )?;
    for compute_stats_empirically in &[false, true] {
        let options = DatasetOptions {
            seed: Some(3),
            compute_stats_empirically: *compute_stats_empirically,
            ..Default::default()
        };
        let examples = mixture
            .get_dataset(&sequence_length(8, 8), &options)?
            .take_examples(100)?;
        assert_eq!(examples.len(), 100);
    }

    let proportions = MixingProportions::compute(
        mixture.tasks(),
        &[],
        &[16.0, 4.0],
        &sequence_length(64, 64),
        mixture.output_features(),
        false,
    )?;
    assert_eq!(proportions.tasks[0].examples_fraction, 0.8);
    // "aN" is 2 bytes for N < 10 and 3 bytes otherwise
    let mean_inputs_length = (10.0 * 2.0 + 6.0 * 3.0) / 16.0;
    assert!((proportions.tasks[0].mean_lengths["inputs"] - mean_inputs_length).abs() < 1e-12);
    assert!((proportions.tasks[1].mean_lengths["inputs"] - 2.0).abs() < 1e-12);
    Ok(())
}

#[test]
#[traced_test]
fn test_cached_mixture_on_validation_split() -> anyhow::Result<()> {
    //    Set-up cached tasks
    let data_dir = tempfile::tempdir()?;
    let cache_root = tempfile::tempdir()?;
    let task_a = register_task(data_dir.path(), "a", 6)?;
    let task_b = register_task(data_dir.path(), "b", 2)?;
    cache_task(&task_a, cache_root.path(), &["train", "validation"], 2)?;
    cache_task(&task_b, cache_root.path(), &["train", "validation"], 1)?;
    add_global_cache_dirs(vec![cache_root.path().to_path_buf()]);
    let mixture = Mixture::new(
        vec![task_a.name(), task_b.name()],
        Some(rate_num_examples(None, 1.0, 1.0)),
    )?;

    //    Validation examples are read from the cache, without mixing proportions
    let options = DatasetOptions {
        seed: Some(5),
        ..DatasetOptions::for_split("validation")
    };
    assert!(options.use_cached);
    let examples = mixture
        .get_dataset(&sequence_length(8, 8), &options)?
        .take_examples(100)?;
    assert_eq!(examples.len(), 100);
    let mut first_tokens = vec![];
    for example in &examples {
        assert_eq!(
            example.keys().cloned().collect::<Vec<String>>(),
            vec!["inputs", "targets"]
        );
        first_tokens.push(example.tokens("inputs")?[0]);
    }
    assert!(first_tokens.contains(&100));
    assert!(first_tokens.contains(&101));
    assert!(!logs_contain("ex.frac."));

    //    The training split logs them
    let train = DatasetOptions {
        seed: Some(5),
        ..Default::default()
    };
    assert_eq!(
        mixture
            .get_dataset(&sequence_length(8, 8), &train)?
            .take_examples(5)?
            .len(),
        5
    );
    assert!(logs_contain("ex.frac."));
    Ok(())
}

#[test]
fn test_mixture_rejects_empty_sequence_length() -> anyhow::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let task_a = register_task(data_dir.path(), "a", 2)?;
    let mixture = Mixture::new(vec![task_a.name()], Some(1.0.into()))?;
    assert!(matches!(
        mixture.get_dataset(&sequence_length(8, 0), &on_the_fly("train", 0)),
        Err(T5DataError::InvalidConfigurationError(_))
    ));
    Ok(())
}

#[test]
fn test_mixture_registry() -> anyhow::Result<()> {
    let data_dir = tempfile::tempdir()?;
    let task_a = register_task(data_dir.path(), "a", 3)?;
    let task_b = register_task(data_dir.path(), "b", 3)?;
    let name = unique_name("mixture");

    MixtureRegistry::add(&name, vec![task_a.name(), task_b.name()], Some(1.0.into()))?;
    assert!(MixtureRegistry::names().contains(&name));
    assert!(matches!(
        MixtureRegistry::add(&name, vec![task_a.name()], Some(1.0.into())),
        Err(T5DataError::RegistryError(_))
    ));
    assert_eq!(MixtureRegistry::get(&name)?.tasks().len(), 2);

    let examples =
        MixtureRegistry::get_dataset(&name, &sequence_length(8, 8), &on_the_fly("train", 2))?
            .take_examples(10)?;
    assert_eq!(examples.len(), 10);

    assert!(MixtureRegistry::remove(&name).is_some());
    assert!(MixtureRegistry::get(&name).is_err());
    Ok(())
}
