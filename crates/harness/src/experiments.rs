//! The experiments: parameter sweeps over the build path, and timed
//! comparisons of the three query strategies.

use anyhow::Result;
use hierarchy::{Hierarchy, HierarchyBuilder, HierarchyParams};
use rand::Rng;
use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;
use store::ColumnStore;
use tracing::{info, warn};

use crate::csv::{append_row, ensure_header};
use crate::fixtures;
use crate::params::ExperimentParams;
use crate::stats::{false_positive_probability, summarize};

const BUILD_METRICS_CSV: &str = "build_metrics.csv";
const QUERY_BENCH_CSV: &str = "query_bench.csv";
const TARGET_BENCH_CSV: &str = "target_bench.csv";

/// Builds one hierarchy per column, in column order.
pub fn build_hierarchies(
    db: &ColumnStore,
    columns: &[&str],
    params: &HierarchyParams,
) -> Result<Vec<Hierarchy>> {
    columns
        .iter()
        .map(|cf| {
            let tree = HierarchyBuilder::build_for_column(db, cf, params)?;
            info!(cf, leaves = tree.leaf_count(), "hierarchy built");
            Ok(tree)
        })
        .collect()
}

/// Sweeps `partition_size` and records build cost and overlay footprint.
pub fn run_build_metrics(
    db: &ColumnStore,
    columns: &[&str],
    params: &ExperimentParams,
) -> Result<()> {
    ensure_header(
        BUILD_METRICS_CSV,
        "numRecords,branching,partitionSize,bloomBits,hashCount,leaves,falsePositiveProb,diskFilterBytes,memoryFilterBytes,buildMicros",
    )?;

    for &partition_size in &params.partition_sweep {
        let hp = HierarchyParams {
            partition_size,
            ..params.hierarchy.clone()
        };
        info!(partition_size, "build-metrics iteration");

        let started = Instant::now();
        let trees = build_hierarchies(db, columns, &hp)?;
        let build_micros = started.elapsed().as_micros() as u64;

        // Disk footprint: dump every leaf filter in the on-disk format and
        // count the bytes. The dump is measurement-only; nothing reads it.
        let mut disk_bytes = 0u64;
        let mut memory_bytes = 0u64;
        for (cf, tree) in columns.iter().zip(&trees) {
            let dump_dir = params.db_path.join(cf).join("filters");
            fixtures::clear_bloom_files(&dump_dir)?;
            disk_bytes += tree.dump_leaf_filters(&dump_dir)?;
            memory_bytes += tree.memory_bytes();
        }

        let leaves = trees.first().map(Hierarchy::leaf_count).unwrap_or(0);
        append_row(
            BUILD_METRICS_CSV,
            &format!(
                "{},{},{},{},{},{},{:.6e},{},{},{}",
                params.num_records,
                hp.branching,
                hp.partition_size,
                hp.bloom_bits,
                hp.hash_count,
                leaves,
                false_positive_probability(hp.bloom_bits, hp.hash_count, hp.partition_size),
                disk_bytes,
                memory_bytes,
                build_micros
            ),
        )?;
    }
    Ok(())
}

/// Per-run measurements for one strategy.
#[derive(Default)]
struct StrategySeries {
    micros: Vec<u64>,
    bloom_probes: Vec<u64>,
    leaf_bloom_probes: Vec<u64>,
    sst_scans: Vec<u64>,
}

impl StrategySeries {
    fn record<F: FnOnce() -> usize>(&mut self, run: F) {
        let before = metrics::snapshot();
        let started = Instant::now();
        let matches = run();
        let micros = started.elapsed().as_micros() as u64;
        let delta = metrics::snapshot() - before;

        self.micros.push(micros);
        self.bloom_probes.push(delta.bloom_probes);
        self.leaf_bloom_probes.push(delta.leaf_bloom_probes);
        self.sst_scans.push(delta.sst_scans);
        info!(
            micros,
            matches,
            bloom_probes = delta.bloom_probes,
            sst_scans = delta.sst_scans,
            "strategy run finished"
        );
    }

    fn write_row(&self, csv: &str, strategy: &str) -> Result<()> {
        let time = summarize(&self.micros);
        let bloom = summarize(&self.bloom_probes);
        let leaf = summarize(&self.leaf_bloom_probes);
        let sst = summarize(&self.sst_scans);
        append_row(
            csv,
            &format!(
                "{},{},{},{},{:.1},{:.1},{:.1},{:.1},{:.1}",
                strategy,
                self.micros.len(),
                time.min,
                time.max,
                time.median,
                time.average,
                bloom.average,
                leaf.average,
                sst.average
            ),
        )?;
        Ok(())
    }
}

const STRATEGY_HEADER: &str =
    "strategy,runs,minMicros,maxMicros,medianMicros,avgMicros,avgBloomProbes,avgLeafBloomProbes,avgSstScans";

/// Runs the three strategies `runs` times against random record ids and
/// writes one aggregated row per strategy.
pub fn run_query_bench(
    db: &ColumnStore,
    columns: &[&str],
    params: &ExperimentParams,
    runs: usize,
    skip_db_scan: bool,
) -> Result<()> {
    if runs == 0 {
        warn!("query-bench asked for 0 runs, skipping");
        return Ok(());
    }
    ensure_header(QUERY_BENCH_CSV, STRATEGY_HEADER)?;

    let trees = build_hierarchies(db, columns, &params.hierarchy)?;
    let tree_refs: Vec<&Hierarchy> = trees.iter().collect();

    let mut rng = rand::thread_rng();
    let mut global = StrategySeries::default();
    let mut multi = StrategySeries::default();
    let mut single = StrategySeries::default();

    for run in 0..runs {
        let record_id = rng.gen_range(1..=params.num_records);
        let values: Vec<Vec<u8>> = columns
            .iter()
            .map(|cf| fixtures::make_value(cf, record_id))
            .collect();
        info!(run = run + 1, runs, record_id, "query-bench run");

        // The naive scan is run once; it reads every record and would
        // otherwise dominate the wall clock of the whole sweep.
        if !skip_db_scan && run == 0 {
            global.record(|| match query::scan_for_records(db, columns, &values) {
                Ok(keys) => keys.len(),
                Err(e) => {
                    warn!(error = %e, "baseline scan failed");
                    0
                }
            });
        }

        multi.record(|| query::multi_column_query(db, &tree_refs, &values, b"", b"").len());
        single.record(|| query::single_hierarchy_query(db, &trees[0], columns, &values).len());
    }

    if !global.micros.is_empty() {
        global.write_row(QUERY_BENCH_CSV, "globalScan")?;
    }
    multi.write_row(QUERY_BENCH_CSV, "multiColumn")?;
    single.write_row(QUERY_BENCH_CSV, "singleHierarchy")?;
    Ok(())
}

/// Stride between injected target rows in the target database.
const TARGET_STRIDE: usize = 1_000;
/// Pattern appended to the column name at target rows.
const TARGET_PATTERN: &str = "_target";

/// Builds (once) a database with a known target pattern injected at every
/// [`TARGET_STRIDE`]-th record and benchmarks the strategies against the
/// pattern values instead of random per-record values.
pub fn run_target_bench(
    base_dir: &Path,
    columns: &[&str],
    params: &ExperimentParams,
    runs: usize,
) -> Result<()> {
    if runs == 0 {
        warn!("target-bench asked for 0 runs, skipping");
        return Ok(());
    }
    ensure_header(TARGET_BENCH_CSV, STRATEGY_HEADER)?;

    let db_path = base_dir.join("target_db");
    let num_records = params.num_records;
    let target_indices: HashSet<usize> =
        (TARGET_STRIDE..=num_records).step_by(TARGET_STRIDE).collect();

    let fresh = !db_path.exists();
    let mut db = fixtures::open_experiment_db(&db_path)?;
    if fresh {
        info!(
            records = num_records,
            targets = target_indices.len(),
            "initialising target database"
        );
        fixtures::insert_records_with_targets(
            &mut db,
            columns,
            num_records,
            &target_indices,
            TARGET_PATTERN,
        )?;
        db.flush_all()?;
        db.compact_all()?;
    }

    let trees = build_hierarchies(&db, columns, &params.hierarchy)?;
    let tree_refs: Vec<&Hierarchy> = trees.iter().collect();
    let values: Vec<Vec<u8>> = columns
        .iter()
        .map(|cf| fixtures::make_target_value(cf, TARGET_PATTERN))
        .collect();

    let mut multi = StrategySeries::default();
    let mut single = StrategySeries::default();
    for run in 0..runs {
        info!(run = run + 1, runs, "target-bench run");
        multi.record(|| query::multi_column_query(&db, &tree_refs, &values, b"", b"").len());
        single.record(|| query::single_hierarchy_query(&db, &trees[0], columns, &values).len());
    }

    multi.write_row(TARGET_BENCH_CSV, "multiColumnTarget")?;
    single.write_row(TARGET_BENCH_CSV, "singleHierarchyTarget")?;
    Ok(())
}
