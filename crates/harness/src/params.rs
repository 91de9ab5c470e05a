use hierarchy::HierarchyParams;
use std::path::PathBuf;
use store::StoreConfig;

/// Columns every experiment database carries (plus the store's own
/// `default` sentinel CF).
pub const DEFAULT_COLUMNS: &[&str] = &["phone", "mail", "address"];

/// Records inserted into the shared experiment database by `--db`.
pub const DEFAULT_NUM_RECORDS: usize = 100_000;

/// One experiment configuration.
#[derive(Debug, Clone)]
pub struct ExperimentParams {
    pub db_path: PathBuf,
    pub num_records: usize,
    /// Hierarchy shape shared by the query experiments.
    pub hierarchy: HierarchyParams,
    /// Partition sizes swept by the build-metrics experiment.
    pub partition_sweep: Vec<usize>,
}

impl Default for ExperimentParams {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/shared_db"),
            num_records: DEFAULT_NUM_RECORDS,
            hierarchy: HierarchyParams {
                bloom_bits: 1_000_000,
                hash_count: 6,
                branching: 3,
                partition_size: 5_000,
            },
            partition_sweep: vec![1_000, 5_000, 10_000, 25_000],
        }
    }
}

/// Store tuning for the experiment databases: a flush threshold small
/// enough that bulk loads produce a healthy number of L0 tables before the
/// final compaction.
pub fn experiment_store_config() -> StoreConfig {
    StoreConfig {
        flush_threshold: 4 * 1024 * 1024,
        wal_sync: false,
        l0_compaction_trigger: 0,
    }
}
