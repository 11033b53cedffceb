use std::collections::HashMap;
use std::path::Path;

use safetensors::tensor::{Dtype, TensorView};
use safetensors::SafeTensors;

use crate::error::ModelError;

/// Named `f32` tensors plus string metadata, read from and written to the
/// safetensors format.
#[derive(Debug, Default, Clone)]
pub struct TensorStore {
    tensors: HashMap<String, (Vec<usize>, Vec<f32>)>,
    /// Tensors present in the source file with a dtype other than F32
    /// (e.g. torchvision's `num_batches_tracked`). Kept so that asking for
    /// one produces a precise error instead of "missing".
    unsupported: HashMap<String, String>,
    metadata: HashMap<String, String>,
}

impl TensorStore {
    pub fn new() -> TensorStore {
        TensorStore::default()
    }

    pub fn read(path: &Path) -> Result<TensorStore, ModelError> {
        let bytes = std::fs::read(path).map_err(|e| ModelError::io(path, e))?;
        TensorStore::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<TensorStore, ModelError> {
        let (_, header) = SafeTensors::read_metadata(bytes)?;
        let st = SafeTensors::deserialize(bytes)?;
        let mut store = TensorStore::new();
        if let Some(meta) = header.metadata() {
            store.metadata = meta.clone();
        }
        for (name, view) in st.tensors() {
            match view.dtype() {
                Dtype::F32 => {
                    let values: Vec<f32> = bytemuck::pod_collect_to_vec(view.data());
                    store.tensors.insert(name, (view.shape().to_vec(), values));
                }
                other => {
                    store.unsupported.insert(name, format!("{:?}", other));
                }
            }
        }
        Ok(store)
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn insert(&mut self, name: impl Into<String>, shape: Vec<usize>, data: Vec<f32>) {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len());
        self.tensors.insert(name.into(), (shape, data));
    }

    /// Removes a tensor and checks its shape.
    pub fn take(&mut self, name: &str, expected: &[usize]) -> Result<Vec<f32>, ModelError> {
        if let Some(dtype) = self.unsupported.get(name) {
            return Err(ModelError::UnsupportedDtype { name: name.to_owned(), dtype: dtype.clone() });
        }
        let (shape, data) = self
            .tensors
            .remove(name)
            .ok_or_else(|| ModelError::MissingTensor(name.to_owned()))?;
        if shape != expected {
            return Err(ModelError::ShapeMismatch {
                name: name.to_owned(),
                expected: expected.to_vec(),
                actual: shape,
            });
        }
        Ok(data)
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ModelError> {
        let mut names: Vec<&String> = self.tensors.keys().collect();
        names.sort();
        let mut views = Vec::with_capacity(names.len());
        for name in names {
            let (shape, data) = &self.tensors[name];
            let view = TensorView::new(Dtype::F32, shape.clone(), bytemuck::cast_slice(data))?;
            views.push((name.as_str(), view));
        }
        let metadata = if self.metadata.is_empty() { None } else { Some(self.metadata.clone()) };
        Ok(safetensors::serialize(views, metadata)?)
    }

    pub fn write(&self, path: &Path) -> Result<(), ModelError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).map_err(|e| ModelError::io(path, e))
    }
}
