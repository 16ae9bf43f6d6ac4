use anyhow::Result;
use candle_core::{IndexOp, Tensor};
use offrl_core::{error::OffrlError, generic_replay_buffer::BatchBase};
use std::convert::TryFrom;

/// A buffer consisting of a [`Tensor`].
///
/// The first axis of the tensor is the batch axis. The internal tensor is allocated
/// at the first push, with shape `[capacity, data.dims()[1..]]`, on the device of the data.
#[derive(Clone, Debug)]
pub struct TensorBatch {
    buf: Option<Tensor>,
    capacity: usize,
}

impl TensorBatch {
    /// Creates a batch from a tensor, whose first axis is the batch axis.
    pub fn from_tensor(t: Tensor) -> Self {
        let capacity = t.dims()[0];
        Self {
            buf: Some(t),
            capacity,
        }
    }
}

impl BatchBase for TensorBatch {
    fn new(capacity: usize) -> Self {
        Self {
            buf: None,
            capacity,
        }
    }

    /// Pushes given data at `index`, wrapping around at the capacity.
    fn push(&mut self, index: usize, data: Self) -> Result<()> {
        let data = match data.buf {
            Some(data) => data,
            None => return Ok(()),
        };
        let batch_size = data.dims()[0];
        if batch_size == 0 {
            return Ok(());
        }

        let buf = match self.buf.take() {
            Some(buf) => buf,
            None => {
                let mut shape = data.dims().to_vec();
                shape[0] = self.capacity;
                Tensor::zeros(shape, data.dtype(), data.device())?
            }
        };

        if index + batch_size > self.capacity {
            let n1 = self.capacity - index;
            buf.slice_set(&data.i((..n1,))?.contiguous()?, 0, index)?;
            buf.slice_set(&data.i((n1..,))?.contiguous()?, 0, 0)?;
        } else {
            buf.slice_set(&data.contiguous()?, 0, index)?;
        }
        self.buf = Some(buf);

        Ok(())
    }

    fn sample(&self, ixs: &[usize]) -> Result<Self> {
        let buf = self.buf.as_ref().ok_or(OffrlError::EmptyReplayBuffer)?;
        let capacity = ixs.len();
        let ixs = {
            let ixs = ixs.iter().map(|x| *x as u32).collect::<Vec<_>>();
            Tensor::from_vec(ixs, (capacity,), buf.device())?
        };
        let buf = Some(buf.index_select(&ixs, 0)?);
        Ok(Self { buf, capacity })
    }
}

impl TryFrom<TensorBatch> for Tensor {
    type Error = anyhow::Error;

    fn try_from(b: TensorBatch) -> Result<Self> {
        Ok(b.buf.ok_or(OffrlError::EmptyReplayBuffer)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use candle_core::Device;

    fn rows(values: &[f32]) -> Result<TensorBatch> {
        let t = Tensor::from_slice(values, (values.len(), 1), &Device::Cpu)?;
        Ok(TensorBatch::from_tensor(t))
    }

    #[test]
    fn test_push_and_sample() -> Result<()> {
        let mut batch = TensorBatch::new(4);
        batch.push(0, rows(&[1.0, 2.0, 3.0])?)?;

        // Wraps around
        batch.push(3, rows(&[4.0, 5.0])?)?;
        let t = Tensor::try_from(batch.clone())?;
        assert_eq!(t.flatten_all()?.to_vec1::<f32>()?, vec![5.0, 2.0, 3.0, 4.0]);

        let sample = Tensor::try_from(batch.sample(&[3, 0, 0])?)?;
        assert_eq!(sample.dims(), &[3, 1]);
        assert_eq!(sample.flatten_all()?.to_vec1::<f32>()?, vec![4.0, 5.0, 5.0]);

        Ok(())
    }

    #[test]
    fn test_empty() {
        let batch = TensorBatch::new(4);
        assert!(batch.sample(&[0]).is_err());
        assert!(Tensor::try_from(batch).is_err());
    }
}
