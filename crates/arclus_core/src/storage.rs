//! Pre-computed representation stores.
//!
//! A store maps claim or premise identifiers to fixed-length embeddings.
//! Stores are loaded once and only read afterwards.

use std::collections::HashMap;
use std::fmt::Display;
use std::fs::File;
use std::hash::Hash;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use arrow::array::{Array, AsArray, RecordBatch};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Float32Type};
use nalgebra::DMatrix;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ArclusError, Result};
use crate::model::{ClaimId, PremiseId, Representation};

/// Identifier types a store can be keyed by.
pub trait RepresentationKey: Eq + Hash + Clone + Display + Serialize + DeserializeOwned {
    fn parse_key(raw: &str) -> Result<Self>;
}

impl RepresentationKey for ClaimId {
    fn parse_key(raw: &str) -> Result<Self> {
        raw.trim()
            .parse()
            .map_err(|_| ArclusError::invalid(format!("claim id is not an integer: {raw:?}")))
    }
}

impl RepresentationKey for PremiseId {
    fn parse_key(raw: &str) -> Result<Self> {
        Ok(raw.to_string())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRepresentation<K> {
    id: K,
    embedding: Representation,
}

#[derive(Debug, Clone)]
pub struct RepresentationStore<K: RepresentationKey> {
    dim: usize,
    vectors: HashMap<K, Representation>,
}

pub type ClaimStore = RepresentationStore<ClaimId>;
pub type PremiseStore = RepresentationStore<PremiseId>;

impl<K: RepresentationKey> RepresentationStore<K> {
    /// Build a store, rejecting empty input and inconsistent dimensionality.
    pub fn from_entries(entries: impl IntoIterator<Item = (K, Representation)>) -> Result<Self> {
        let mut dim: Option<usize> = None;
        let mut vectors = HashMap::new();

        for (id, embedding) in entries {
            match dim {
                None => dim = Some(embedding.len()),
                Some(expected) if expected != embedding.len() => {
                    return Err(ArclusError::DimensionMismatch {
                        expected,
                        actual: embedding.len(),
                    });
                }
                Some(_) => {}
            }
            if vectors.insert(id.clone(), embedding).is_some() {
                return Err(ArclusError::invalid(format!("duplicate representation id: {id}")));
            }
        }

        match dim {
            Some(0) => Err(ArclusError::invalid("representations must not be empty vectors")),
            Some(dim) => Ok(Self { dim, vectors }),
            None => Err(ArclusError::invalid("representation store is empty")),
        }
    }

    /// Load from a `.parquet` file or, for any other extension, JSON lines.
    pub fn load(path: &Path) -> Result<Self> {
        let store = match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") => Self::load_parquet(path)?,
            _ => Self::load_jsonl(path)?,
        };
        info!(
            path = %path.display(),
            count = store.len(),
            dim = store.dim(),
            "loaded representations"
        );
        Ok(store)
    }

    pub fn load_jsonl(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();

        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let stored: StoredRepresentation<K> = serde_json::from_str(&line)?;
            entries.push((stored.id, stored.embedding));
        }

        Self::from_entries(entries)
    }

    /// Read an `id` column (any type castable to string) and an `embedding`
    /// list-of-float column.
    pub fn load_parquet(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let mut entries = Vec::new();

        for batch_result in reader {
            let batch: RecordBatch = batch_result?;

            let id_col = batch
                .column_by_name("id")
                .ok_or_else(|| ArclusError::invalid("missing column 'id'"))?;
            let id_col = cast(id_col, &DataType::Utf8)?;
            let ids = id_col.as_string::<i32>();

            let embedding_col = batch
                .column_by_name("embedding")
                .ok_or_else(|| ArclusError::invalid("missing column 'embedding'"))?;
            let embeddings = embedding_col
                .as_list_opt::<i32>()
                .ok_or_else(|| ArclusError::invalid("column 'embedding' must be a list"))?;

            for i in 0..batch.num_rows() {
                if !ids.is_valid(i) || !embeddings.is_valid(i) {
                    return Err(ArclusError::invalid(format!("null id or embedding in row {i}")));
                }
                let values = cast(&embeddings.value(i), &DataType::Float32)?;
                let values = values.as_primitive::<Float32Type>();
                entries.push((K::parse_key(ids.value(i))?, values.values().to_vec()));
            }
        }

        Self::from_entries(entries)
    }

    pub fn save_jsonl(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        for (id, embedding) in &self.vectors {
            let line = serde_json::to_string(&StoredRepresentation {
                id: id.clone(),
                embedding: embedding.clone(),
            })?;
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn contains(&self, id: &K) -> bool {
        self.vectors.contains_key(id)
    }

    pub fn get(&self, id: &K) -> Result<&Representation> {
        self.vectors
            .get(id)
            .ok_or_else(|| ArclusError::key_not_found(id))
    }

    /// Stack the representations of `ids` as matrix rows, in order.
    pub fn stack(&self, ids: &[K]) -> Result<DMatrix<f32>> {
        let mut data = Vec::with_capacity(ids.len() * self.dim);
        for id in ids {
            data.extend_from_slice(self.get(id)?);
        }
        Ok(DMatrix::from_row_slice(ids.len(), self.dim, &data))
    }

    /// Single representation as a 1×D matrix.
    pub fn row(&self, id: &K) -> Result<DMatrix<f32>> {
        Ok(DMatrix::from_row_slice(1, self.dim, self.get(id)?))
    }
}
