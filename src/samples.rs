//! Columnar sample table.
//!
//! `SampleCollection` holds one split of one task: sample ids, labels and the
//! optional embedding columns. All row-wise columns always have the same
//! length; every mutating operation either keeps that invariant or fails
//! without touching the collection.

use std::ops::Range;

use log::{debug, trace};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::split::EmbeddingSource;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleCollection {
    id: Vec<u64>,
    y: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    relative_embeddings: Option<Vec<Vec<f64>>>,
}

/// Checks that `rows` has `expected` rows of one common width and returns it.
fn check_rows(rows: &[Vec<f64>], expected: usize, context: &str) -> Result<usize> {
    if rows.len() != expected {
        return Err(Error::DimensionMismatch {
            context: format!("{context} rows"),
            expected,
            got: rows.len(),
        });
    }
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    if let Some(bad) = rows.iter().find(|r| r.len() != width) {
        return Err(Error::DimensionMismatch {
            context: format!("{context} width"),
            expected: width,
            got: bad.len(),
        });
    }
    Ok(width)
}

impl SampleCollection {
    /// Builds a collection from ids and labels, without embeddings.
    pub fn new(id: Vec<u64>, y: Vec<i64>) -> Result<Self> {
        if id.len() != y.len() {
            return Err(Error::DimensionMismatch {
                context: "labels".to_string(),
                expected: id.len(),
                got: y.len(),
            });
        }
        Ok(Self {
            id,
            y,
            embedding: None,
            relative_embeddings: None,
        })
    }

    /// Attaches the absolute `embedding` column.
    pub fn with_embeddings(mut self, rows: Vec<Vec<f64>>) -> Result<Self> {
        self.set_column(EmbeddingSource::Absolute, rows)?;
        Ok(self)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.id.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    #[inline]
    pub fn ids(&self) -> &[u64] {
        &self.id
    }

    #[inline]
    pub fn labels(&self) -> &[i64] {
        &self.y
    }

    pub fn has_column(&self, source: EmbeddingSource) -> bool {
        self.column(source).is_some()
    }

    pub fn column(&self, source: EmbeddingSource) -> Option<&[Vec<f64>]> {
        match source {
            EmbeddingSource::Absolute => self.embedding.as_deref(),
            EmbeddingSource::Relative => self.relative_embeddings.as_deref(),
        }
    }

    /// Like [`column`](Self::column) but reports which collection lacked it.
    pub fn require_column(&self, source: EmbeddingSource, key: &str) -> Result<&[Vec<f64>]> {
        self.column(source).ok_or_else(|| Error::MissingColumn {
            key: key.to_string(),
            column: source.column(),
        })
    }

    /// Width of an embedding column, `None` if absent or empty.
    pub fn dim(&self, source: EmbeddingSource) -> Option<usize> {
        self.column(source).and_then(|rows| rows.first()).map(|r| r.len())
    }

    /// Replaces (or adds) an embedding column.
    pub fn set_column(&mut self, source: EmbeddingSource, rows: Vec<Vec<f64>>) -> Result<()> {
        check_rows(&rows, self.len(), source.column())?;
        match source {
            EmbeddingSource::Absolute => self.embedding = Some(rows),
            EmbeddingSource::Relative => self.relative_embeddings = Some(rows),
        }
        Ok(())
    }

    pub fn set_relative_embeddings(&mut self, rows: Vec<Vec<f64>>) -> Result<()> {
        self.set_column(EmbeddingSource::Relative, rows)
    }

    /// Re-checks column lengths, used after deserialising.
    pub fn validate(&self) -> Result<()> {
        if self.y.len() != self.id.len() {
            return Err(Error::DimensionMismatch {
                context: "labels".to_string(),
                expected: self.id.len(),
                got: self.y.len(),
            });
        }
        for source in [EmbeddingSource::Absolute, EmbeddingSource::Relative] {
            if let Some(rows) = self.column(source) {
                check_rows(rows, self.len(), source.column())?;
            }
        }
        Ok(())
    }

    /// Rewrites every label through `f(row, label)`.
    ///
    /// The new labels are computed first; on error the collection is unchanged.
    pub fn map_labels<F>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(usize, i64) -> Result<i64>,
    {
        let mapped = self
            .y
            .iter()
            .enumerate()
            .map(|(row, &label)| f(row, label))
            .collect::<Result<Vec<i64>>>()?;
        self.y = mapped;
        Ok(())
    }

    /// Rows at `indices`, in that order.
    ///
    /// # Panics
    /// Panics if an index is out of bounds.
    pub fn subset(&self, indices: &[usize]) -> Self {
        let pick = |rows: &Vec<Vec<f64>>| indices.iter().map(|&i| rows[i].clone()).collect();
        Self {
            id: indices.iter().map(|&i| self.id[i]).collect(),
            y: indices.iter().map(|&i| self.y[i]).collect(),
            embedding: self.embedding.as_ref().map(pick),
            relative_embeddings: self.relative_embeddings.as_ref().map(pick),
        }
    }

    /// Contiguous row range.
    pub fn select(&self, range: Range<usize>) -> Result<Self> {
        if range.start > range.end || range.end > self.len() {
            return Err(Error::DimensionMismatch {
                context: format!("select {}..{}", range.start, range.end),
                expected: self.len(),
                got: range.end,
            });
        }
        let indices: Vec<usize> = range.collect();
        Ok(self.subset(&indices))
    }

    /// Stacks collections row-wise, keeping part order.
    ///
    /// Every part must carry the same embedding columns with the same widths.
    pub fn concatenate(parts: &[&SampleCollection]) -> Result<Self> {
        let Some(first) = parts.first() else {
            return Err(Error::EmptyCollection("nothing to concatenate".to_string()));
        };

        let mut out = Self::default();
        for source in [EmbeddingSource::Absolute, EmbeddingSource::Relative] {
            let present = first.has_column(source);
            let width = first.dim(source);
            for (i, part) in parts.iter().enumerate() {
                if part.has_column(source) != present {
                    return Err(Error::MissingColumn {
                        key: format!("concatenation part {i}"),
                        column: source.column(),
                    });
                }
                if let (Some(w), Some(pw)) = (width, part.dim(source)) {
                    if w != pw {
                        return Err(Error::DimensionMismatch {
                            context: format!("concatenation part {i} {}", source.column()),
                            expected: w,
                            got: pw,
                        });
                    }
                }
            }
            if present {
                let rows: Vec<Vec<f64>> = parts
                    .iter()
                    .flat_map(|p| p.column(source).unwrap_or(&[]).iter().cloned())
                    .collect();
                match source {
                    EmbeddingSource::Absolute => out.embedding = Some(rows),
                    EmbeddingSource::Relative => out.relative_embeddings = Some(rows),
                }
            }
        }

        for part in parts {
            out.id.extend_from_slice(&part.id);
            out.y.extend_from_slice(&part.y);
        }
        debug!(
            "Concatenated {} collections into {} samples",
            parts.len(),
            out.len()
        );
        Ok(out)
    }

    /// Stable ascending sort by sample id.
    pub fn sorted_by_id(&self) -> Self {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by_key(|&i| self.id[i]);
        self.subset(&order)
    }

    /// Seeded shuffle split into `(train, test)`.
    ///
    /// The held-out side gets `ceil(len * test_fraction)` rows; both sides must
    /// end up non-empty.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "test fraction must lie in (0, 1), got {test_fraction}"
            )));
        }
        let n = self.len();
        let n_test = (n as f64 * test_fraction).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(Error::EmptyCollection(format!(
                "cannot split {n} samples with test fraction {test_fraction}"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        let (test_idx, train_idx) = indices.split_at(n_test);
        trace!("Split {} samples into {} train / {} test", n, train_idx.len(), n_test);

        Ok((self.subset(train_idx), self.subset(test_idx)))
    }

    /// Column mean, `None` if the column is absent or empty.
    pub fn column_mean(&self, source: EmbeddingSource) -> Option<Vec<f64>> {
        let rows = self.column(source)?;
        let first = rows.first()?;
        let n = rows.len() as f64;
        let mean = (0..first.len())
            .into_par_iter()
            .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        Some(mean)
    }

    /// Subtracts the column mean from every row of `source`.
    pub fn center(&mut self, source: EmbeddingSource) -> Result<()> {
        let Some(mean) = self.column_mean(source) else {
            return Err(Error::EmptyCollection(format!(
                "cannot center empty or missing `{}`",
                source.column()
            )));
        };
        let rows = match source {
            EmbeddingSource::Absolute => self.embedding.as_mut(),
            EmbeddingSource::Relative => self.relative_embeddings.as_mut(),
        };
        if let Some(rows) = rows {
            rows.par_iter_mut().for_each(|row| {
                row.iter_mut().zip(&mean).for_each(|(x, m)| *x -= m);
            });
        }
        Ok(())
    }
}

/// Gives train samples ids `0..N` and test samples ids `N..N+M`.
pub fn assign_sequential_ids(train: &mut SampleCollection, test: &mut SampleCollection) {
    let n = train.len() as u64;
    train.id = (0..n).collect();
    test.id = (n..n + test.len() as u64).collect();
}
