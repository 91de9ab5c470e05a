/// # Manifest - SSTable Level Metadata
///
/// Tracks which SSTable files of one column family belong to which level
/// (L0 or L1) so the CF can reconstruct its state after a restart.
///
/// ## File Format
///
/// One SSTable entry per line:
///
/// ```text
/// L0:sst-00000000000000000005-1708600000000.sst
/// L0:sst-00000000000000000003-1708599999000.sst
/// L1:sst-00000000000000000010-1708600001000.sst
/// ```
///
/// Lines starting with `#` are comments. Empty lines are ignored.
///
/// ## Crash Safety
///
/// The manifest is rewritten atomically: write to a `.tmp` file, fsync, then
/// rename over the existing manifest, so it is never partially written.
/// A text format keeps it inspectable with any editor; the file is one line
/// per SSTable, so parsing overhead is negligible.
use anyhow::{bail, Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Name of the manifest file within a CF directory.
pub const MANIFEST_FILENAME: &str = "MANIFEST";

/// Temporary file used during atomic manifest writes.
const MANIFEST_TMP_FILENAME: &str = "MANIFEST.tmp";

/// Level assignment for a single SSTable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SstMeta {
    /// The SSTable filename (basename, not the full path).
    pub filename: String,
    /// The level this SSTable belongs to (0 = L0, 1 = L1).
    pub level: u32,
}

/// In-memory representation of one CF's manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    /// All SSTable entries, in the order they appear in the file
    /// (newest first within each level).
    pub entries: Vec<SstMeta>,
}

impl Manifest {
    /// Loads an existing manifest from `cf_dir/MANIFEST`, or creates an
    /// empty one if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest file exists but cannot be parsed.
    pub fn load_or_create(cf_dir: &Path) -> Result<Self> {
        let path = cf_dir.join(MANIFEST_FILENAME);

        if !path.exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }

        let file = File::open(&path)
            .with_context(|| format!("failed to open manifest at {}", path.display()))?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line =
                line.with_context(|| format!("failed to read manifest line {}", line_num + 1))?;
            let trimmed = line.trim();

            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            // Expected format: "<level>:<filename>"
            let (level_str, filename) = trimmed.split_once(':').ok_or_else(|| {
                anyhow::anyhow!(
                    "manifest line {}: invalid format (expected 'L<n>:<filename>'): {}",
                    line_num + 1,
                    trimmed
                )
            })?;

            let level = match level_str {
                "L0" => 0,
                "L1" => 1,
                other => bail!(
                    "manifest line {}: unknown level '{}' (expected L0 or L1)",
                    line_num + 1,
                    other
                ),
            };

            entries.push(SstMeta {
                filename: filename.to_string(),
                level,
            });
        }

        Ok(Self { path, entries })
    }

    /// Persists the current manifest state to disk (atomic tmp + rename,
    /// with a truncate-and-write fallback where rename-over fails).
    pub fn save(&self) -> Result<()> {
        let tmp_path = self.path.with_file_name(MANIFEST_TMP_FILENAME);

        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)
                .with_context(|| {
                    format!("failed to create manifest tmp at {}", tmp_path.display())
                })?;

            Self::write_contents(&mut f, &self.entries)?;
            f.flush()?;
            f.sync_all()?;
        }

        if fs::rename(&tmp_path, &self.path).is_err() {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)
                .with_context(|| format!("failed to open manifest at {}", self.path.display()))?;

            Self::write_contents(&mut f, &self.entries)?;
            f.flush()?;
            f.sync_all()?;

            let _ = fs::remove_file(&tmp_path);
        }

        Ok(())
    }

    fn write_contents(f: &mut File, entries: &[SstMeta]) -> Result<()> {
        writeln!(f, "# SieveKV column-family manifest")?;
        writeln!(f, "# Format: <level>:<filename>")?;
        for entry in entries {
            let level_str = match entry.level {
                0 => "L0",
                1 => "L1",
                other => panic!("invalid level {}", other),
            };
            writeln!(f, "{}:{}", level_str, entry.filename)?;
        }
        Ok(())
    }

    /// Filenames of all L0 SSTables, newest first.
    pub fn l0_filenames(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.level == 0)
            .map(|e| e.filename.as_str())
            .collect()
    }

    /// Filenames of all L1 SSTables, newest first.
    pub fn l1_filenames(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.level == 1)
            .map(|e| e.filename.as_str())
            .collect()
    }

    /// Adds an SSTable entry (does **not** save to disk). New entries go to
    /// the front of their level to keep newest-first ordering.
    pub fn add(&mut self, filename: String, level: u32) {
        let insert_pos = self
            .entries
            .iter()
            .position(|e| e.level == level)
            .unwrap_or(self.entries.len());
        self.entries.insert(insert_pos, SstMeta { filename, level });
    }

    /// Replaces all entries with a single L1 entry (after full compaction).
    pub fn replace_all_with_l1(&mut self, filename: String) {
        self.entries.clear();
        self.entries.push(SstMeta { filename, level: 1 });
    }

    /// Drops every entry (after a compaction that eliminated all data).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
