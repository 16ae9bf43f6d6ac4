//! Types and traits for recording training metrics.
//!
//! * [`Record`] - A container of key-value pairs of various data types
//! * [`RecordValue`] - Values that can be stored in a [`Record`]
//! * [`Recorder`] - Interface for writing and aggregating records
//! * [`RecordStorage`] - A storage of records with aggregation of scalars
//! * [`BufferedRecorder`] - A recorder keeping written records in memory
//! * [`NullRecorder`] - A recorder that discards all records
//!
//! ```rust
//! use offrl_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("opt_steps", RecordValue::Scalar(100.0));
//! record.insert("loss_critic", RecordValue::Scalar(0.5));
//! record.insert("obs", RecordValue::Array1(vec![1.0, 0.0, -0.3]));
//! assert_eq!(record.get_scalar("loss_critic").unwrap(), 0.5);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
