//! Base implementation of records for logging.
use crate::error::OffrlError;
use chrono::prelude::{DateTime, Local};
use std::{
    collections::{
        hash_map::{IntoIter, Iter, Keys},
        HashMap,
    },
    convert::Into,
    iter::IntoIterator,
};

/// Represents possible types of values in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// Represents a scalar, e.g., optimization steps and loss value.
    Scalar(f32),

    /// Represents a datetime.
    DateTime(DateTime<Local>),

    /// A 1-dimensional array
    Array1(Vec<f32>),

    /// A 2-dimensional array
    Array2(Vec<f32>, [usize; 2]),

    /// String
    String(String),
}

/// Represents a record.
#[derive(Debug, Clone)]
pub struct Record(HashMap<String, RecordValue>);

impl Record {
    /// Construct empty record.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Create `Record` from slice of `(Into<String>, RecordValue)`.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Create `Record` with a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(HashMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Get keys.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Insert a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Return an iterator over key-value pairs in the record.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Return an iterator over key-value pairs in the record.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Get the value of the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merge records. Values of `record` win on duplicated keys.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Get scalar value.
    ///
    /// * `key` - The key of an entry in the record.
    pub fn get_scalar(&self, k: &str) -> Result<f32, OffrlError> {
        match self.0.get(k) {
            Some(RecordValue::Scalar(v)) => Ok(*v),
            Some(_) => Err(OffrlError::RecordValueTypeError("Scalar".to_string())),
            None => Err(OffrlError::RecordKeyError(k.to_string())),
        }
    }

    /// Get Array1 value.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, OffrlError> {
        match self.0.get(k) {
            Some(RecordValue::Array1(v)) => Ok(v.clone()),
            Some(_) => Err(OffrlError::RecordValueTypeError("Array1".to_string())),
            None => Err(OffrlError::RecordKeyError(k.to_string())),
        }
    }

    /// Get Array2 value.
    pub fn get_array2(&self, k: &str) -> Result<(Vec<f32>, [usize; 2]), OffrlError> {
        match self.0.get(k) {
            Some(RecordValue::Array2(v, s)) => Ok((v.clone(), *s)),
            Some(_) => Err(OffrlError::RecordValueTypeError("Array2".to_string())),
            None => Err(OffrlError::RecordKeyError(k.to_string())),
        }
    }

    /// Get String value.
    pub fn get_string(&self, k: &str) -> Result<String, OffrlError> {
        match self.0.get(k) {
            Some(RecordValue::String(s)) => Ok(s.clone()),
            Some(_) => Err(OffrlError::RecordValueTypeError("String".to_string())),
            None => Err(OffrlError::RecordKeyError(k.to_string())),
        }
    }

    /// Returns true if the record is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the scalar value if the record has exactly one scalar entry.
    ///
    /// This is used to take the return of an evaluation without knowing its key.
    pub fn get_scalar_without_key(&self) -> Option<f32> {
        if self.0.len() != 1 {
            return None;
        }
        match self.0.values().next() {
            Some(RecordValue::Scalar(value)) => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_get_scalar_errors() {
        let mut record = Record::from_scalar("loss", 1.5);
        record.insert("name", RecordValue::String("sac".to_string()));

        assert_eq!(record.get_scalar("loss").unwrap(), 1.5);
        assert!(matches!(
            record.get_scalar("name"),
            Err(OffrlError::RecordValueTypeError(_))
        ));
        assert!(matches!(
            record.get_scalar("missing"),
            Err(OffrlError::RecordKeyError(_))
        ));
        assert_eq!(record.get_scalar_without_key(), None);
        assert_eq!(
            Record::from_scalar("Episode return", -3.0).get_scalar_without_key(),
            Some(-3.0)
        );
    }
}
