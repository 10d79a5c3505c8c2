//! Data
//!
//! The in-memory containers the estimators work on: a named-column [`Table`]
//! and a borrowed column-major [`Matrix`] view handed to the models.
use crate::errors::CausalError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contiguous Column Major Matrix data container.
///
/// Holds a dense matrix of values in a single borrowed slice, column after
/// column, which allows efficient column slicing.
///
/// # Type Parameters
/// * `T` - The numeric type of the data (e.g., `f32`, `f64`).
pub struct Matrix<'a, T> {
    /// The raw data stored in a single slice.
    pub data: &'a [T],
    /// Number of rows in the matrix.
    pub rows: usize,
    /// Number of columns in the matrix.
    pub cols: usize,
}

impl<'a, T> Matrix<'a, T> {
    /// Create a new Matrix.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Self {
        debug_assert_eq!(data.len(), rows * cols);
        Matrix { data, rows, cols }
    }

    /// Get a single reference to an item in the matrix.
    ///
    /// * `i` - The ith row of the data to get.
    /// * `j` - the jth column of the data to get.
    pub fn get(&self, i: usize, j: usize) -> &T {
        &self.data[j * self.rows + i]
    }

    /// Get access to a row of the data, as an iterator.
    pub fn get_row_iter(&self, row: usize) -> std::iter::StepBy<std::iter::Skip<std::slice::Iter<'a, T>>> {
        self.data.iter().skip(row).step_by(self.rows.max(1))
    }

    /// Get an entire column in the matrix.
    ///
    /// * `col` - The index of the column to get.
    pub fn get_col(&self, col: usize) -> &[T] {
        &self.data[col * self.rows..(col + 1) * self.rows]
    }
}

impl<'a, T> Matrix<'a, T>
where
    T: Copy,
{
    /// Get a row of the data as a vector.
    pub fn get_row(&self, row: usize) -> Vec<T> {
        self.get_row_iter(row).copied().collect()
    }

    /// Copy the given rows, in order, into a new column-major buffer.
    pub fn select_rows(&self, indices: &[usize]) -> Vec<T> {
        let mut sub = Vec::with_capacity(indices.len() * self.cols);
        for col in 0..self.cols {
            let col_data = self.get_col(col);
            for &i in indices {
                sub.push(col_data[i]);
            }
        }
        sub
    }

    /// Append constant columns to the right of the matrix.
    pub fn with_constant_columns(&self, values: &[T]) -> Vec<T> {
        let mut data = Vec::with_capacity(self.data.len() + self.rows * values.len());
        data.extend_from_slice(self.data);
        for v in values {
            data.resize(data.len() + self.rows, *v);
        }
        data
    }
}

impl<'a, T> fmt::Display for Matrix<'a, T>
where
    T: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for i in 0..self.rows {
            for j in 0..self.cols {
                write!(f, "{}", self.get(i, j))?;
                if j + 1 == self.cols {
                    writeln!(f)?;
                } else {
                    write!(f, " ")?;
                }
            }
        }
        Ok(())
    }
}

/// A table of named `f64` columns, one row per unit.
///
/// Rows have no identity beyond their position. Every transformation returns
/// a new table and leaves the receiver untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TableColumns", into = "TableColumns")]
pub struct Table {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    index: HashMap<String, usize>,
    rows: usize,
}

/// Serialized form of a [`Table`], rebuilt through [`Table::from_columns`]
/// on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableColumns {
    pub names: Vec<String>,
    pub columns: Vec<Vec<f64>>,
}

impl TryFrom<TableColumns> for Table {
    type Error = CausalError;

    fn try_from(raw: TableColumns) -> Result<Self, Self::Error> {
        if raw.names.len() != raw.columns.len() {
            return Err(CausalError::LengthMismatch {
                column: "names".to_string(),
                expected: raw.columns.len(),
                found: raw.names.len(),
            });
        }
        Table::from_columns(raw.names.into_iter().zip(raw.columns).collect())
    }
}

impl From<Table> for TableColumns {
    fn from(table: Table) -> Self {
        TableColumns {
            names: table.names,
            columns: table.columns,
        }
    }
}

impl Table {
    /// An empty table with no columns and no rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `(name, values)` pairs.
    ///
    /// All columns must have the same length and distinct names.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<f64>)>) -> Result<Self, CausalError> {
        let mut table = Table::new();
        for (name, values) in columns {
            table.push_column(name.into(), values)?;
        }
        Ok(table)
    }

    fn push_column(&mut self, name: String, values: Vec<f64>) -> Result<(), CausalError> {
        if self.index.contains_key(&name) {
            return Err(CausalError::DuplicateColumn(name));
        }
        if !self.names.is_empty() && values.len() != self.rows {
            return Err(CausalError::LengthMismatch {
                column: name,
                expected: self.rows,
                found: values.len(),
            });
        }
        if self.names.is_empty() {
            self.rows = values.len();
        }
        self.index.insert(name.clone(), self.names.len());
        self.names.push(name);
        self.columns.push(values);
        Ok(())
    }

    /// Number of rows.
    pub fn n_rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Borrow a column by name.
    pub fn column(&self, name: &str) -> Result<&[f64], CausalError> {
        self.index
            .get(name)
            .map(|&i| self.columns[i].as_slice())
            .ok_or_else(|| CausalError::MissingColumn(name.to_string()))
    }

    /// A copy of the table with `name` appended, or replaced if it exists.
    pub fn with_column(&self, name: &str, values: Vec<f64>) -> Result<Table, CausalError> {
        if values.len() != self.rows && !self.names.is_empty() {
            return Err(CausalError::LengthMismatch {
                column: name.to_string(),
                expected: self.rows,
                found: values.len(),
            });
        }
        let mut table = self.clone();
        match table.index.get(name) {
            Some(&i) => table.columns[i] = values,
            None => table.push_column(name.to_string(), values)?,
        }
        Ok(table)
    }

    /// Column-major data of the requested columns, ready for [`Matrix::new`].
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<f64>, CausalError> {
        let mut data = Vec::with_capacity(self.rows * names.len());
        for name in names {
            data.extend_from_slice(self.column(name.as_ref())?);
        }
        Ok(data)
    }

    /// A new table holding the given rows, in the given order.
    ///
    /// Indices may repeat, which is how bootstrap resamples are drawn.
    pub fn take(&self, indices: &[usize]) -> Table {
        let columns = self
            .columns
            .iter()
            .map(|c| indices.iter().map(|&i| c[i]).collect())
            .collect();
        Table {
            names: self.names.clone(),
            columns,
            index: self.index.clone(),
            rows: indices.len(),
        }
    }
}
