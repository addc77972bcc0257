//! Safetensors-backed model weight loading.
//!
//! Tensors are keyed `<layer>/<param>`; the `:0` suffix Keras puts on variable
//! names is accepted too.

use ndarray::{ArrayD, IxDyn};
use safetensors::tensor::{Dtype, SafeTensorError, TensorView};
use safetensors::SafeTensors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeightError {
    #[error("safetensors error: {0}")]
    SafeTensors(#[from] SafeTensorError),
    #[error("unsupported dtype for {name}: {dtype:?}")]
    UnsupportedDtype { name: String, dtype: Dtype },
    #[error("invalid tensor byte length for {name}: got {bytes}, expected multiple of {elem_size}")]
    InvalidByteLen {
        name: String,
        bytes: usize,
        elem_size: usize,
    },
    #[error("tensor {name} does not fit its declared shape {shape:?}")]
    Shape { name: String, shape: Vec<usize> },
}

/// Weight file held in memory; the header is validated on construction.
#[derive(Debug)]
pub struct WeightStore {
    bytes: Vec<u8>,
}

impl WeightStore {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, WeightError> {
        SafeTensors::deserialize(&bytes)?;
        Ok(Self { bytes })
    }

    pub fn names(&self) -> Result<Vec<String>, WeightError> {
        let st = SafeTensors::deserialize(&self.bytes)?;
        let mut names: Vec<String> = st.names().into_iter().cloned().collect();
        names.sort();
        Ok(names)
    }

    pub fn tensor(&self, name: &str) -> Result<ArrayD<f32>, WeightError> {
        let st = SafeTensors::deserialize(&self.bytes)?;
        let view = st.tensor(name)?;
        to_array(name, &view)
    }

    /// Look up `<layer>/<param>` (or `<layer>/<param>:0`); `None` when absent
    pub fn layer_param(&self, layer: &str, param: &str) -> Result<Option<ArrayD<f32>>, WeightError> {
        for name in [format!("{layer}/{param}"), format!("{layer}/{param}:0")] {
            match self.tensor(&name) {
                Ok(tensor) => return Ok(Some(tensor)),
                Err(WeightError::SafeTensors(SafeTensorError::TensorNotFound(_))) => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(None)
    }
}

fn to_array(name: &str, view: &TensorView<'_>) -> Result<ArrayD<f32>, WeightError> {
    let raw = view.data();
    let shape = view.shape().to_vec();

    let data: Vec<f32> = match view.dtype() {
        Dtype::F32 => {
            check_len(name, raw, 4)?;
            raw.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        }
        Dtype::F64 => {
            check_len(name, raw, 8)?;
            raw.chunks_exact(8)
                .map(|c| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(c);
                    f64::from_le_bytes(b) as f32
                })
                .collect()
        }
        Dtype::BF16 => {
            check_len(name, raw, 2)?;
            raw.chunks_exact(2)
                .map(|c| {
                    let bits = u16::from_le_bytes([c[0], c[1]]) as u32;
                    f32::from_bits(bits << 16)
                })
                .collect()
        }
        dtype => {
            return Err(WeightError::UnsupportedDtype {
                name: name.to_string(),
                dtype,
            });
        }
    };

    ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|_| WeightError::Shape {
        name: name.to_string(),
        shape,
    })
}

fn check_len(name: &str, raw: &[u8], elem_size: usize) -> Result<(), WeightError> {
    if raw.len() % elem_size != 0 {
        return Err(WeightError::InvalidByteLen {
            name: name.to_string(),
            bytes: raw.len(),
            elem_size,
        });
    }
    Ok(())
}
