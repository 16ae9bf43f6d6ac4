use super::Record;

/// Writes records to an output destination.
///
/// [`Trainer`](crate::Trainer) calls [`Recorder::store`] at every training step
/// and [`Recorder::flush`] at intervals, so that values are aggregated
/// over the interval before being written.
pub trait Recorder {
    /// Write a record to the [`Recorder`].
    fn write(&mut self, record: Record);

    /// Store the record.
    fn store(&mut self, record: Record);

    /// Writes values aggregated from the stored records.
    ///
    /// `step` is usually the number of optimization steps.
    fn flush(&mut self, step: i64);
}
