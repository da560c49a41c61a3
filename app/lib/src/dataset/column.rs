//! Width-narrowed integer columns.
//!
//! A column picks the smallest integer width that holds every value it was
//! built from, so a log of 16-bit pixel values costs two bytes per value
//! instead of eight. Reads always widen back to `u64` / `i64`.

use std::ops::Range;

macro_rules! narrowed_column {
    (
        $(#[$meta:meta])*
        $name:ident, $iter:ident, $wide:ty,
        [$( $variant:ident($narrow:ty) ),+]
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub enum $name {
            $(
                #[allow(missing_docs)]
                $variant(Vec<$narrow>),
            )+
        }

        impl $name {
            /// Number of values in the column.
            pub fn len(&self) -> usize {
                match self {
                    $( $name::$variant(v) => v.len(), )+
                }
            }

            /// Whether the column holds no values.
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Value at `index`, widened.
            pub fn get(&self, index: usize) -> Option<$wide> {
                match self {
                    $( $name::$variant(v) => v.get(index).map(|&x| x as $wide), )+
                }
            }

            /// Iterate over all values, widened.
            pub fn iter(&self) -> $iter<'_> {
                self.iter_range(0..self.len())
            }

            /// Iterate over a sub-range of values, widened.
            ///
            /// # Panics
            ///
            /// Panics if the range is out of bounds.
            pub fn iter_range(&self, range: Range<usize>) -> $iter<'_> {
                match self {
                    $( $name::$variant(v) => $iter::$variant(v[range].iter()), )+
                }
            }

            /// Bytes used per stored value.
            pub fn width_bytes(&self) -> usize {
                match self {
                    $( $name::$variant(_) => std::mem::size_of::<$narrow>(), )+
                }
            }

            /// Approximate heap footprint of the stored values.
            pub fn memory_usage(&self) -> usize {
                self.len() * self.width_bytes()
            }

            /// Build a column from a gather of this one's values.
            pub fn take(&self, indices: &[usize]) -> Self {
                let values: Vec<$wide> = indices
                    .iter()
                    .filter_map(|&i| self.get(i))
                    .collect();
                Self::from_values(&values)
            }

            /// Build a column from a contiguous slice of this one's values.
            pub fn slice(&self, range: Range<usize>) -> Self {
                match self {
                    $( $name::$variant(v) => $name::$variant(v[range].to_vec()), )+
                }
            }

            /// Concatenate several columns, re-narrowing the result.
            pub fn concat<'a, I>(columns: I) -> Self
            where
                I: IntoIterator<Item = &'a $name>,
            {
                let values: Vec<$wide> = columns.into_iter().flat_map(|c| c.iter()).collect();
                Self::from_values(&values)
            }
        }

        /// Widening iterator over a narrowed column.
        #[derive(Debug, Clone)]
        pub enum $iter<'a> {
            $(
                #[allow(missing_docs)]
                $variant(std::slice::Iter<'a, $narrow>),
            )+
        }

        impl Iterator for $iter<'_> {
            type Item = $wide;

            #[inline]
            fn next(&mut self) -> Option<$wide> {
                match self {
                    $( $iter::$variant(it) => it.next().map(|&x| x as $wide), )+
                }
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                match self {
                    $( $iter::$variant(it) => it.size_hint(), )+
                }
            }
        }

        impl ExactSizeIterator for $iter<'_> {}
    };
}

narrowed_column!(
    /// Unsigned integer column stored at the narrowest sufficient width.
    UIntColumn, UIntIter, u64,
    [U8(u8), U16(u16), U32(u32), U64(u64)]
);

narrowed_column!(
    /// Signed integer column stored at the narrowest sufficient width.
    IntColumn, IntIter, i64,
    [I8(i8), I16(i16), I32(i32), I64(i64)]
);

impl UIntColumn {
    /// Build a column, choosing the width from the largest value.
    pub fn from_values(values: &[u64]) -> Self {
        let max = values.iter().copied().max().unwrap_or(0);
        if max <= u8::MAX as u64 {
            UIntColumn::U8(values.iter().map(|&v| v as u8).collect())
        } else if max <= u16::MAX as u64 {
            UIntColumn::U16(values.iter().map(|&v| v as u16).collect())
        } else if max <= u32::MAX as u64 {
            UIntColumn::U32(values.iter().map(|&v| v as u32).collect())
        } else {
            UIntColumn::U64(values.to_vec())
        }
    }
}

impl IntColumn {
    /// Build a column, choosing the width from the value range.
    pub fn from_values(values: &[i64]) -> Self {
        let min = values.iter().copied().min().unwrap_or(0);
        let max = values.iter().copied().max().unwrap_or(0);
        let fits = |lo: i64, hi: i64| min >= lo && max <= hi;
        if fits(i8::MIN as i64, i8::MAX as i64) {
            IntColumn::I8(values.iter().map(|&v| v as i8).collect())
        } else if fits(i16::MIN as i64, i16::MAX as i64) {
            IntColumn::I16(values.iter().map(|&v| v as i16).collect())
        } else if fits(i32::MIN as i64, i32::MAX as i64) {
            IntColumn::I32(values.iter().map(|&v| v as i32).collect())
        } else {
            IntColumn::I64(values.to_vec())
        }
    }
}
