use serde::Serialize;

use crate::field::{Field, FieldValue};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldColumn {
    pub field: Field,
    pub values: Vec<FieldValue>,
}

/// Every projected row of a run, gathered into one column per requested field.
///
/// Columns keep the order in which the fields were requested, and each column holds
/// one entry per output row.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InferResult {
    columns: Vec<FieldColumn>,
}

impl InferResult {
    pub fn new(fields: &[Field]) -> Self {
        Self {
            columns: fields
                .iter()
                .map(|field| FieldColumn {
                    field: *field,
                    values: Vec::new(),
                })
                .collect(),
        }
    }

    /// Appends one projected row. Its values must follow the order of the columns.
    pub fn push_row(&mut self, row: Vec<FieldValue>) {
        debug_assert_eq!(row.len(), self.columns.len());
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
    }

    pub fn column(&self, field: Field) -> Option<&[FieldValue]> {
        self.columns
            .iter()
            .find(|column| column.field == field)
            .map(|column| column.values.as_slice())
    }

    pub fn columns(&self) -> &[FieldColumn] {
        &self.columns
    }

    /// The only column, when exactly one field was requested.
    pub fn into_single(self) -> Option<Vec<FieldValue>> {
        let [column]: [FieldColumn; 1] = self.columns.try_into().ok()?;
        Some(column.values)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |column| column.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
