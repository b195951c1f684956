//! Folder-backed writer identification dataset.

use crate::identity::IdentityRule;
use crate::index_table::{table_file_name, IdentityIndexTable};
use crate::normalize::{normalize, ScaleSize, DEFAULT_SCALE_SIZE, MIN_SCALE_SIDE};
use crate::types::{DatasetError, DatasetResult, Placement, SampleRecord, WriterSample};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Image extension for datasets that do not ship PNGs.
pub fn default_image_ext(dataset: &str) -> &'static str {
    match dataset {
        "CVL" => "tif",
        _ => "png",
    }
}

#[derive(Debug, Clone)]
pub struct DatasetConfig {
    /// Canvas `(height, width)`.
    pub scale_size: ScaleSize,
    /// Extension of image files to pick up, without the dot.
    pub image_ext: String,
    pub identity: IdentityRule,
    /// Random placement when true, centered otherwise.
    pub is_training: bool,
}

impl DatasetConfig {
    pub fn for_dataset(dataset: &str, is_training: bool) -> Self {
        Self {
            scale_size: DEFAULT_SCALE_SIZE,
            image_ext: default_image_ext(dataset).to_string(),
            identity: IdentityRule::for_dataset(dataset),
            is_training,
        }
    }

    /// Reject canvases the normalizer and network cannot handle.
    pub fn validate(&self) -> DatasetResult<()> {
        let (height, width) = self.scale_size;
        if height < MIN_SCALE_SIDE || width < MIN_SCALE_SIDE {
            return Err(DatasetError::InvalidScale {
                height,
                width,
                min: MIN_SCALE_SIDE,
            });
        }
        Ok(())
    }

    pub fn placement(&self) -> Placement {
        Placement::for_training(self.is_training)
    }
}

#[derive(Debug)]
pub struct WriterDataset {
    folder: PathBuf,
    files: Vec<String>,
    table: Arc<IdentityIndexTable>,
    cfg: DatasetConfig,
}

impl WriterDataset {
    /// Scan `folder` and resolve labels through the table stored in `label_dir`.
    ///
    /// The table is created from this folder's identities if it does not exist
    /// yet, so the training split should be opened first.
    pub fn open(
        name: &str,
        folder: &Path,
        label_dir: &Path,
        cfg: DatasetConfig,
    ) -> DatasetResult<Self> {
        cfg.validate()?;
        ensure_folder(name, folder)?;
        let files = list_images(folder, &cfg.image_ext)?;
        let identities = collect_identities(&files, &cfg.identity)?;
        let table_path = label_dir.join(table_file_name(name));
        let table = IdentityIndexTable::build_or_load(&table_path, &identities)?;
        Self::with_table(name, folder, files, identities, Arc::new(table), cfg)
    }

    /// Scan `folder` and resolve labels through an already loaded table.
    pub fn open_with_table(
        name: &str,
        folder: &Path,
        table: Arc<IdentityIndexTable>,
        cfg: DatasetConfig,
    ) -> DatasetResult<Self> {
        cfg.validate()?;
        ensure_folder(name, folder)?;
        let files = list_images(folder, &cfg.image_ext)?;
        let identities = collect_identities(&files, &cfg.identity)?;
        Self::with_table(name, folder, files, identities, table, cfg)
    }

    fn with_table(
        name: &str,
        folder: &Path,
        files: Vec<String>,
        identities: BTreeSet<String>,
        table: Arc<IdentityIndexTable>,
        cfg: DatasetConfig,
    ) -> DatasetResult<Self> {
        table.ensure_covers(&identities)?;
        info!(
            dataset = name,
            folder = %folder.display(),
            images = files.len(),
            writers = table.len(),
            "loaded dataset"
        );
        Ok(Self {
            folder: folder.to_path_buf(),
            files,
            table,
            cfg,
        })
    }

    pub fn record(&self, index: usize) -> DatasetResult<SampleRecord> {
        let filename = self
            .files
            .get(index)
            .ok_or_else(|| DatasetError::IndexOutOfRange {
                index,
                len: self.files.len(),
            })?;
        let identity = self.cfg.identity.extract(filename)?;
        let label = self.table.index_of(&identity)?;
        Ok(SampleRecord {
            filename: filename.clone(),
            identity,
            index: label,
        })
    }

    /// Decode, normalize and label the `index`-th image.
    pub fn get(&self, index: usize, rng: &mut dyn rand::RngCore) -> DatasetResult<WriterSample> {
        let record = self.record(index)?;
        let path = self.folder.join(&record.filename);
        let img = image::open(&path)
            .map_err(|e| DatasetError::Decode {
                path: path.clone(),
                source: e,
            })?
            .to_luma8();
        if img.width() == 0 || img.height() == 0 {
            return Err(DatasetError::EmptyImage { path });
        }
        let normalized = normalize(&img, self.cfg.scale_size, self.cfg.placement(), rng);
        let (height, width) = self.cfg.scale_size;
        Ok(WriterSample {
            pixels: normalized.to_unit_f32(),
            width,
            height,
            label: record.index,
            filename: record.filename,
            height_limited: normalized.height_limited,
        })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn num_writers(&self) -> usize {
        self.table.len()
    }

    pub fn table(&self) -> &Arc<IdentityIndexTable> {
        &self.table
    }
}

fn ensure_folder(name: &str, folder: &Path) -> DatasetResult<()> {
    if folder.is_dir() {
        Ok(())
    } else {
        Err(DatasetError::Config {
            dataset: name.to_string(),
            path: folder.to_path_buf(),
        })
    }
}

/// File names in `folder` with extension `ext`, sorted.
pub fn list_images(folder: &Path, ext: &str) -> DatasetResult<Vec<String>> {
    let entries = fs::read_dir(folder).map_err(|e| DatasetError::Io {
        path: folder.to_path_buf(),
        source: e,
    })?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| DatasetError::Io {
            path: folder.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let matches = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(ext));
        if !matches {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => files.push(name),
            Err(raw) => {
                return Err(DatasetError::Identity {
                    filename: raw.to_string_lossy().into_owned(),
                    msg: "file name is not valid UTF-8".to_string(),
                })
            }
        }
    }
    if files.is_empty() {
        return Err(DatasetError::EmptyDataset {
            folder: folder.to_path_buf(),
            ext: ext.to_string(),
        });
    }
    files.sort();
    Ok(files)
}

fn collect_identities(files: &[String], rule: &IdentityRule) -> DatasetResult<BTreeSet<String>> {
    files.iter().map(|f| rule.extract(f)).collect()
}
