//! # Source datasets
//!
//! Raw datasets are stored as JSON-lines shards under a data directory, one directory per
//! dataset version:
//!
//! ```text
//! <data_dir>/<name>[/<config>]/<version>/dataset_info.json
//! <data_dir>/<name>[/<config>]/<version>/<name>-<split>.jsonl-00000-of-00002
//! <data_dir>/<name>[/<config>]/<version>/<name>-<split>.jsonl-00001-of-00002
//! ```
//!
//! Datasets are referred to as `name[/config]:version`. The data directory is resolved, in
//! order, from the global override (`set_data_dir_override`), the task-specific directory, the
//! `T5DATA_DIR` environment variable and finally `<user cache dir>/.t5data/datasets`.

mod info;
mod loader;

pub use info::{DatasetInfo, SplitInfo, DATASET_INFO_FILE};
pub(crate) use loader::interleave_files;
pub use loader::{
    data_dir_override, default_data_dir, set_data_dir_override, LazyDatasetLoader, SourceName,
};
