use crate::algebra::{FloatT, SparseFormatError};
use std::cmp::{max, min};

/// Shape of the compressed representation produced by a
/// [`TripletToCscConverter`].
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum CompressedShape {
    /// Upper triangle in CSC format.   Each symmetric position
    /// appears once.  Equivalent to lower triangular CSR.
    Triu,
    /// Both triangles in CSC format.  Off-diagonal positions appear twice.
    Full,
}

// marks a triplet with no mirrored slot (diagonal entries,
// or any entry when converting to triangular shape)
const NO_SLOT: usize = usize::MAX;

/// Conversion from symmetric triplet format to compressed column format.
///
/// The converter is built once for a nonzero pattern.  It records the
/// compressed slot of every triplet, so that values of later matrices
/// with the same pattern can be moved over without sorting again.
/// Triplets that address the same symmetric position share a slot and
/// their values are summed.
#[derive(Debug, Clone)]
pub struct TripletToCscConverter {
    shape: CompressedShape,
    dim: usize,
    colptr: Vec<usize>,
    rowval: Vec<usize>,
    // compressed slot of each triplet
    ipos_first: Vec<usize>,
    // mirrored slot of each triplet for the full shape
    ipos_second: Vec<usize>,
}

impl TripletToCscConverter {
    /// Analyze the pattern given by `irow` and `jcol` for an `dim x dim`
    /// symmetric matrix.  Entries may come from either triangle.
    pub fn new(
        dim: usize,
        irow: &[usize],
        jcol: &[usize],
        shape: CompressedShape,
    ) -> Result<Self, SparseFormatError> {
        if irow.len() != jcol.len() {
            return Err(SparseFormatError::IncompatibleDimension);
        }
        if !irow.iter().all(|&r| r < dim) {
            return Err(SparseFormatError::BadRowval);
        }
        if !jcol.iter().all(|&c| c < dim) {
            return Err(SparseFormatError::BadColval);
        }

        let nnz = irow.len();

        // (col, row, triplet, is_mirror) for every slot we need to fill
        let mut entries = Vec::with_capacity(2 * nnz);
        for (k, (&i, &j)) in irow.iter().zip(jcol).enumerate() {
            let (row, col) = (min(i, j), max(i, j));
            entries.push((col, row, k, false));
            if shape == CompressedShape::Full && row != col {
                entries.push((row, col, k, true));
            }
        }
        entries.sort_unstable_by_key(|&(col, row, _, _)| (col, row));

        let mut colptr = vec![0; dim + 1];
        let mut rowval = Vec::with_capacity(entries.len());
        let mut ipos_first = vec![NO_SLOT; nnz];
        let mut ipos_second = vec![NO_SLOT; nnz];
        let mut last = None;

        for (col, row, k, is_mirror) in entries {
            if last != Some((col, row)) {
                rowval.push(row);
                colptr[col + 1] += 1;
                last = Some((col, row));
            }
            let slot = rowval.len() - 1;
            if is_mirror {
                ipos_second[k] = slot;
            } else {
                ipos_first[k] = slot;
            }
        }

        for col in 0..dim {
            colptr[col + 1] += colptr[col];
        }

        Ok(Self {
            shape,
            dim,
            colptr,
            rowval,
            ipos_first,
            ipos_second,
        })
    }

    /// shape of the compressed representation
    pub fn shape(&self) -> CompressedShape {
        self.shape
    }

    /// matrix dimension
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// number of triplets the converter was built for
    pub fn nnz_triplet(&self) -> usize {
        self.ipos_first.len()
    }

    /// number of entries in compressed form
    pub fn nnz_compressed(&self) -> usize {
        self.rowval.len()
    }

    /// CSC column pointers, length `dim + 1`
    pub fn colptr(&self) -> &[usize] {
        &self.colptr
    }

    /// CSC row indices, sorted within each column
    pub fn rowval(&self) -> &[usize] {
        &self.rowval
    }

    /// Move triplet values into compressed order, summing values
    /// that share a slot.
    ///
    /// # Panics
    /// Panics if the array lengths do not match the analyzed pattern.
    pub fn convert_values<T: FloatT>(&self, triplet_values: &[T], compressed_values: &mut [T]) {
        assert_eq!(triplet_values.len(), self.nnz_triplet());
        assert_eq!(compressed_values.len(), self.nnz_compressed());

        compressed_values.fill(T::zero());
        for (k, &v) in triplet_values.iter().enumerate() {
            compressed_values[self.ipos_first[k]] += v;
            let second = self.ipos_second[k];
            if second != NO_SLOT {
                compressed_values[second] += v;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A =
    //[ 1.0  2.0   ⋅ ]
    //[ 2.0   ⋅   4.0]
    //[  ⋅   4.0  6.0]
    //
    // with (0,0) split into two triplets, (1,0)
    // given from the lower triangle and (2,1) split
    // between the triangles
    fn test_pattern() -> (Vec<usize>, Vec<usize>, Vec<f64>) {
        let irow = vec![0, 1, 0, 2, 1, 2];
        let jcol = vec![0, 0, 0, 1, 2, 2];
        let vals = vec![0.5, 2., 0.5, 1., 3., 6.];
        (irow, jcol, vals)
    }

    #[test]
    fn test_convert_triu() {
        let (irow, jcol, vals) = test_pattern();
        let conv = TripletToCscConverter::new(3, &irow, &jcol, CompressedShape::Triu).unwrap();

        assert_eq!(conv.nnz_compressed(), 4);
        assert_eq!(conv.colptr(), &[0, 1, 2, 4]);
        assert_eq!(conv.rowval(), &[0, 0, 1, 2]);

        let mut out = vec![99.; 4];
        conv.convert_values(&vals, &mut out);
        assert_eq!(out, vec![1., 2., 4., 6.]);
    }

    #[test]
    fn test_convert_full() {
        let (irow, jcol, vals) = test_pattern();
        let conv = TripletToCscConverter::new(3, &irow, &jcol, CompressedShape::Full).unwrap();

        assert_eq!(conv.nnz_compressed(), 6);
        assert_eq!(conv.colptr(), &[0, 2, 4, 6]);
        assert_eq!(conv.rowval(), &[0, 1, 0, 2, 1, 2]);

        let mut out = vec![0.; 6];
        conv.convert_values(&vals, &mut out);
        assert_eq!(out, vec![1., 2., 2., 4., 4., 6.]);
    }

    #[test]
    fn test_convert_empty_and_bad() {
        let conv = TripletToCscConverter::new(0, &[], &[], CompressedShape::Triu).unwrap();
        assert_eq!(conv.colptr(), &[0]);
        assert_eq!(conv.nnz_compressed(), 0);

        let err = TripletToCscConverter::new(2, &[0, 2], &[0, 0], CompressedShape::Triu);
        assert_eq!(err.unwrap_err(), SparseFormatError::BadRowval);
        let err = TripletToCscConverter::new(2, &[0], &[0, 1], CompressedShape::Full);
        assert_eq!(err.unwrap_err(), SparseFormatError::IncompatibleDimension);
    }
}
