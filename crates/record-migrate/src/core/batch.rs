//! Fixed-size chunking of a lazy row sequence.

use crate::error::Result;

use super::value::Row;

/// A bounded slice of coerced rows processed by one plan invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Rows in this batch.
    pub rows: Vec<Row>,

    /// Zero-based position of the batch within the import.
    pub index: usize,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(rows: Vec<Row>, index: usize) -> Self {
        Self { rows, index }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Iterator adapter yielding [`Batch`]es of at most `size` rows.
///
/// The first row error is yielded in place of the batch that would have
/// contained it; iteration stops after it.
pub struct Batches<I> {
    rows: I,
    size: usize,
    index: usize,
    done: bool,
}

impl<I> Batches<I>
where
    I: Iterator<Item = Result<Row>>,
{
    /// `size` is clamped to at least one row.
    pub fn new(rows: I, size: usize) -> Self {
        Self {
            rows,
            size: size.max(1),
            index: 0,
            done: false,
        }
    }
}

impl<I> Iterator for Batches<I>
where
    I: Iterator<Item = Result<Row>>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut rows = Vec::with_capacity(self.size);
        while rows.len() < self.size {
            match self.rows.next() {
                Some(Ok(row)) => rows.push(row),
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if rows.is_empty() {
            return None;
        }

        let batch = Batch::new(rows, self.index);
        self.index += 1;
        Some(Ok(batch))
    }
}
