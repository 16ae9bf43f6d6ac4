//! Writes training records as TFRecord files for Tensorboard.
use log::warn;
use offrl_core::record::{Record, RecordStorage, RecordValue, Recorder};
use std::path::Path;
use tensorboard_rs::summary_writer::SummaryWriter;

/// Write records to TFRecord.
///
/// Records given by [`Recorder::store`] are aggregated with [`RecordStorage`]
/// and written on [`Recorder::flush`], with the number of optimization steps
/// as the step of the summary.
pub struct TensorboardRecorder {
    writer: SummaryWriter,
    storage: RecordStorage,
    step_key: String,
    ignore_unsupported_value: bool,
}

impl TensorboardRecorder {
    /// Construct a [`TensorboardRecorder`].
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            writer: SummaryWriter::new(logdir),
            storage: RecordStorage::new(),
            step_key: "opt_steps".to_string(),
            ignore_unsupported_value: true,
        }
    }

    /// Construct a [`TensorboardRecorder`] which warns on unsupported record values.
    ///
    /// TFRecord will be stored in `logdir`.
    pub fn new_with_check_unsupported_value<P: AsRef<Path>>(logdir: P) -> Self {
        Self {
            ignore_unsupported_value: false,
            ..Self::new(logdir)
        }
    }

    /// Writes a 2-dimensional array as a grayscale image normalized to `[0, 255]`.
    fn add_array2(&mut self, key: &str, data: &[f32], shape: &[usize; 2], step: usize) {
        let min = data.iter().copied().fold(f32::INFINITY, f32::min);
        let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let scale = if max > min { max - min } else { 1.0 };
        let gray = data
            .iter()
            .map(|&e| ((e - min) / scale * 255f32) as u8)
            .collect::<Vec<_>>();
        let rgb = [gray.as_slice(), gray.as_slice(), gray.as_slice()].concat();
        self.writer
            .add_image(key, rgb.as_slice(), &[3, shape[0], shape[1]], step)
    }
}

impl Recorder for TensorboardRecorder {
    /// Write a given [`Record`] into a TFRecord.
    ///
    /// The record must have a scalar of key `"opt_steps"`, otherwise nothing is written.
    /// [`RecordValue::Scalar`] and [`RecordValue::Array2`] are written.
    /// [`RecordValue::DateTime`] is discarded.
    fn write(&mut self, record: Record) {
        let step = match record.get(&self.step_key) {
            Some(RecordValue::Scalar(v)) => *v as usize,
            _ => {
                warn!("Record without scalar {:?} is not written", self.step_key);
                return;
            }
        };

        for (k, v) in record.iter() {
            if *k == self.step_key {
                continue;
            }
            match v {
                RecordValue::Scalar(v) => self.writer.add_scalar(k, *v, step),
                RecordValue::DateTime(_) => {}
                RecordValue::Array2(data, shape) => self.add_array2(k, data, shape, step),
                _ => {
                    if !self.ignore_unsupported_value {
                        warn!("Unsupported value: {:?}", (k, v));
                    }
                }
            };
        }
    }

    fn store(&mut self, record: Record) {
        self.storage.store(record);
    }

    fn flush(&mut self, step: i64) {
        if self.storage.is_empty() {
            return;
        }
        let mut record = self.storage.aggregate();
        record.insert(self.step_key.clone(), RecordValue::Scalar(step as _));
        self.write(record);
        self.writer.flush();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn test_store_and_flush() -> anyhow::Result<()> {
        let dir = TempDir::new("tensorboard")?;
        let mut recorder = TensorboardRecorder::new(dir.path());
        for v in [1.0f32, 2.0, 3.0] {
            recorder.store(Record::from_scalar("loss", v));
        }
        recorder.store(Record::from_slice(&[(
            "q",
            RecordValue::Array2(vec![0.0, 1.0, 2.0, 3.0], [2, 2]),
        )]));
        recorder.flush(10);
        assert!(recorder.storage.is_empty());

        // Flushing an empty storage writes nothing
        recorder.flush(20);

        let n_files = std::fs::read_dir(dir.path())?.count();
        assert!(n_files > 0);

        Ok(())
    }
}
