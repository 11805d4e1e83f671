//! Dataset loading and windowing
//!
//! Reads the per-sensor velocity CSV, cuts it into sliding time windows
//! split by whole days into train / validation / test partitions, and
//! z-scores every split with the training statistics.

use std::fs::File;
use std::path::Path;

use ndarray::{s, Array2, Array4, ArrayBase, Axis, Data, Dimension};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("bad value at row {row}, col {col} of {path}")]
    Parse { path: String, row: usize, col: usize },

    #[error("{0}")]
    Shape(String),
}

/// Headerless CSV into a dense matrix, row lengths checked.
pub fn read_csv_matrix(path: &Path) -> Result<Array2<f64>, DataError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|source| DataError::Io {
        path: display.clone(),
        source,
    })?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(file);

    let mut values = Vec::new();
    let mut cols = 0usize;
    let mut rows = 0usize;
    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(|source| DataError::Csv {
            path: display.clone(),
            source,
        })?;
        if row == 0 {
            cols = record.len();
        } else if record.len() != cols {
            return Err(DataError::Shape(format!(
                "row {} of {} has {} columns, expected {}",
                row,
                display,
                record.len(),
                cols
            )));
        }
        for (col, field) in record.iter().enumerate() {
            let v: f64 = field.trim().parse().map_err(|_| DataError::Parse {
                path: display.clone(),
                row,
                col,
            })?;
            values.push(v);
        }
        rows += 1;
    }

    Array2::from_shape_vec((rows, cols), values).map_err(|e| DataError::Shape(e.to_string()))
}

/// Z-score parameters, computed over the raw training windows and applied to
/// every split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Stats {
    pub mean: f64,
    pub std: f64,
}

impl Stats {
    /// No-op normalization
    pub fn identity() -> Self {
        Self {
            mean: 0.0,
            std: 1.0,
        }
    }

    /// Mean and population standard deviation over the whole tensor. A
    /// constant series would divide by zero, so its std clamps to 1.
    pub fn from_data<S, D>(data: &ArrayBase<S, D>) -> Self
    where
        S: Data<Elem = f64>,
        D: Dimension,
    {
        let mean = data.mean().unwrap_or(0.0);
        let std = data.std(0.0);
        Self {
            mean,
            std: if std > 0.0 { std } else { 1.0 },
        }
    }

    pub fn z_score(&self, x: f64) -> f64 {
        (x - self.mean) / self.std
    }

    pub fn z_inverse(&self, x: f64) -> f64 {
        x * self.std + self.mean
    }
}

/// Dataset partition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

/// Windowed, z-scored dataset. Window tensors are laid out as
/// `(n_window, n_frame, n_route, 1)`.
#[derive(Debug)]
pub struct Dataset {
    train: Array4<f64>,
    val: Array4<f64>,
    test: Array4<f64>,
    stats: Stats,
}

impl Dataset {
    pub fn get(&self, split: Split) -> &Array4<f64> {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self, split: Split) -> usize {
        self.get(split).len_of(Axis(0))
    }

    pub fn is_empty(&self, split: Split) -> bool {
        self.len(split) == 0
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }
}

/// Sliding windows over `len_seq` whole days of readings.
///
/// Each day of `day_slot` readings yields `day_slot - n_frame + 1` windows of
/// `n_frame` consecutive frames, starting `offset` days into the series.
pub fn seq_gen(
    len_seq: usize,
    data: &Array2<f64>,
    offset: usize,
    n_frame: usize,
    n_route: usize,
    day_slot: usize,
) -> Result<Array4<f64>, DataError> {
    if data.ncols() < n_route {
        return Err(DataError::Shape(format!(
            "series has {} routes, need {}",
            data.ncols(),
            n_route
        )));
    }
    if n_frame == 0 || day_slot < n_frame {
        return Err(DataError::Shape(format!(
            "window of {} frames does not fit a {}-slot day",
            n_frame, day_slot
        )));
    }
    let needed = (offset + len_seq) * day_slot;
    if data.nrows() < needed {
        return Err(DataError::Shape(format!(
            "series has {} rows, need {} for {} days at offset {}",
            data.nrows(),
            needed,
            len_seq,
            offset
        )));
    }

    let n_slot = day_slot - n_frame + 1;
    let mut seq = Array4::zeros((len_seq * n_slot, n_frame, n_route, 1));
    for i in 0..len_seq {
        for j in 0..n_slot {
            let sta = (i + offset) * day_slot + j;
            seq.slice_mut(s![i * n_slot + j, .., .., 0])
                .assign(&data.slice(s![sta..sta + n_frame, ..n_route]));
        }
    }
    Ok(seq)
}

/// Load the velocity series, window each split at its day offset, and
/// z-score everything with statistics from the raw training windows.
pub fn data_gen(
    path: &Path,
    splits: (usize, usize, usize),
    n_route: usize,
    n_frame: usize,
    day_slot: usize,
) -> Result<Dataset, DataError> {
    let (n_train, n_val, n_test) = splits;
    let series = read_csv_matrix(path)?;

    let mut train = seq_gen(n_train, &series, 0, n_frame, n_route, day_slot)?;
    let mut val = seq_gen(n_val, &series, n_train, n_frame, n_route, day_slot)?;
    let mut test = seq_gen(n_test, &series, n_train + n_val, n_frame, n_route, day_slot)?;

    let stats = Stats::from_data(&train);
    for part in [&mut train, &mut val, &mut test] {
        part.mapv_inplace(|v| stats.z_score(v));
    }

    Ok(Dataset {
        train,
        val,
        test,
        stats,
    })
}

/// Batch iterator over the window axis. `dynamic_batch` keeps the short tail
/// batch instead of dropping it; `shuffle` permutes window order first.
pub fn gen_batch(
    data: &Array4<f64>,
    batch_size: usize,
    dynamic_batch: bool,
    shuffle: bool,
) -> impl Iterator<Item = Array4<f64>> + '_ {
    let len = data.len_of(Axis(0));
    let batch_size = batch_size.max(1);

    let mut idx: Vec<usize> = (0..len).collect();
    if shuffle {
        idx.shuffle(&mut rand::thread_rng());
    }

    (0..len).step_by(batch_size).filter_map(move |start| {
        let end = start + batch_size;
        let end = if end > len {
            if !dynamic_batch {
                return None;
            }
            len
        } else {
            end
        };
        Some(data.select(Axis(0), &idx[start..end]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(rows: &[String]) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        for row in rows {
            writeln!(f, "{}", row).unwrap();
        }
        f.flush().unwrap();
        f
    }

    #[test]
    fn read_csv_matrix_parses_rows() {
        let f = write_csv(&["1,2,3".to_string(), "4,5,6".to_string()]);
        let m = read_csv_matrix(f.path()).unwrap();
        assert_eq!(m.shape(), &[2, 3]);
        assert_eq!(m[(1, 2)], 6.0);
    }

    #[test]
    fn read_csv_matrix_rejects_ragged_rows() {
        let f = write_csv(&["1,2".to_string(), "3".to_string()]);
        assert!(matches!(read_csv_matrix(f.path()), Err(DataError::Shape(_))));
    }

    #[test]
    fn read_csv_matrix_rejects_non_numeric() {
        let f = write_csv(&["1,x".to_string()]);
        assert!(matches!(
            read_csv_matrix(f.path()),
            Err(DataError::Parse { row: 0, col: 1, .. })
        ));
    }

    #[test]
    fn seq_gen_windows_slide_within_each_day() {
        // 2 days of 6 slots, 2 routes; values encode the time index.
        let data = Array2::from_shape_fn((12, 2), |(t, r)| (t * 10 + r) as f64);
        let seq = seq_gen(2, &data, 0, 4, 2, 6).unwrap();

        // 6 - 4 + 1 = 3 windows per day
        assert_eq!(seq.shape(), &[6, 4, 2, 1]);
        assert_eq!(seq[(0, 0, 0, 0)], 0.0);
        // Second window starts one slot later.
        assert_eq!(seq[(1, 0, 0, 0)], 10.0);
        // Second day starts at slot 6 regardless of window overlap.
        assert_eq!(seq[(3, 0, 0, 0)], 60.0);
        assert_eq!(seq[(3, 3, 1, 0)], 91.0);
    }

    #[test]
    fn seq_gen_honors_day_offset() {
        let data = Array2::from_shape_fn((18, 1), |(t, _)| t as f64);
        let seq = seq_gen(1, &data, 2, 4, 1, 6).unwrap();
        assert_eq!(seq[(0, 0, 0, 0)], 12.0);
    }

    #[test]
    fn seq_gen_rejects_short_series() {
        let data = Array2::zeros((5, 2));
        assert!(seq_gen(2, &data, 0, 4, 2, 6).is_err());
    }

    #[test]
    fn z_score_roundtrip() {
        let stats = Stats {
            mean: 10.0,
            std: 2.0,
        };
        let z = stats.z_score(14.0);
        assert_eq!(z, 2.0);
        assert_eq!(stats.z_inverse(z), 14.0);
    }

    #[test]
    fn stats_guard_constant_series() {
        let data = Array4::from_elem((2, 2, 2, 1), 3.0);
        let stats = Stats::from_data(&data);
        assert_eq!(stats.std, 1.0);
        assert_eq!(stats.z_score(3.0), 0.0);
    }

    #[test]
    fn data_gen_splits_and_normalizes() {
        // 4 days of 6 slots, 2 routes.
        let rows: Vec<String> = (0..24).map(|t| format!("{},{}", t, t * 2)).collect();
        let f = write_csv(&rows);
        let ds = data_gen(f.path(), (2, 1, 1), 2, 4, 6).unwrap();

        assert_eq!(ds.len(Split::Train), 6);
        assert_eq!(ds.len(Split::Val), 3);
        assert_eq!(ds.len(Split::Test), 3);

        // Training windows are z-scored with their own statistics.
        let train_mean = ds.get(Split::Train).mean().unwrap();
        assert!(train_mean.abs() < 1e-9);

        // The later splits sit above the training mean in z-space.
        assert!(ds.get(Split::Test).mean().unwrap() > 0.0);
    }

    #[test]
    fn gen_batch_fixed_and_dynamic() {
        let data = Array4::from_shape_fn((5, 1, 1, 1), |(i, _, _, _)| i as f64);

        let fixed: Vec<_> = gen_batch(&data, 2, false, false).collect();
        assert_eq!(fixed.len(), 2);
        assert_eq!(fixed[1][(1, 0, 0, 0)], 3.0);

        let dynamic: Vec<_> = gen_batch(&data, 2, true, false).collect();
        assert_eq!(dynamic.len(), 3);
        assert_eq!(dynamic[2].len_of(Axis(0)), 1);
    }

    #[test]
    fn gen_batch_shuffle_keeps_all_windows() {
        let data = Array4::from_shape_fn((6, 1, 1, 1), |(i, _, _, _)| i as f64);
        let mut seen: Vec<f64> = gen_batch(&data, 2, true, true)
            .flat_map(|b| b.iter().copied().collect::<Vec<_>>())
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }
}
