// Zero-copy typed view over payload bytes

use crate::core::error::{Result, SignalError};
use crate::core::format::{Endian, ScalarType};

/// Bounds-checked, strided view decoding scalars to `f64` on access.
#[derive(Debug, Clone, Copy)]
pub struct TypedView<'a> {
    bytes: &'a [u8],
    scalar: ScalarType,
    endian: Endian,
    scalars_per_atom: usize,
    atoms: usize,
}

impl<'a> TypedView<'a> {
    /// View `atoms` atoms starting at `byte_offset`. Fails if the range
    /// exceeds `bytes`.
    pub fn new(
        bytes: &'a [u8],
        byte_offset: usize,
        atoms: usize,
        scalar: ScalarType,
        scalars_per_atom: usize,
        endian: Endian,
    ) -> Result<Self> {
        let out_of_range = |len| SignalError::OutOfRange {
            offset: byte_offset,
            len,
            available: bytes.len(),
        };
        let len = atoms
            .checked_mul(scalars_per_atom)
            .and_then(|n| n.checked_mul(scalar.bits()))
            .map(|bits| bits.div_ceil(8))
            .ok_or_else(|| out_of_range(usize::MAX))?;
        let end = byte_offset.checked_add(len).ok_or_else(|| out_of_range(len))?;
        if end > bytes.len() {
            return Err(SignalError::OutOfRange {
                offset: byte_offset,
                len,
                available: bytes.len(),
            });
        }
        Ok(Self {
            bytes: &bytes[byte_offset..end],
            scalar,
            endian,
            scalars_per_atom: scalars_per_atom.max(1),
            atoms,
        })
    }

    pub fn atoms(&self) -> usize {
        self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms * self.scalars_per_atom
    }

    pub fn is_empty(&self) -> bool {
        self.atoms == 0
    }

    pub fn scalars_per_atom(&self) -> usize {
        self.scalars_per_atom
    }

    pub fn scalar_type(&self) -> ScalarType {
        self.scalar
    }

    /// Scalar `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<f64> {
        if index >= self.len() {
            return None;
        }
        Some(decode_scalar(self.bytes, self.scalar, self.endian, index))
    }

    /// First two scalars of atom `index`; the second is 0 for one-scalar atoms.
    pub fn pair(&self, index: usize) -> Option<(f64, f64)> {
        if index >= self.atoms {
            return None;
        }
        let base = index * self.scalars_per_atom;
        let re = decode_scalar(self.bytes, self.scalar, self.endian, base);
        let im = if self.scalars_per_atom > 1 {
            decode_scalar(self.bytes, self.scalar, self.endian, base + 1)
        } else {
            0.0
        };
        Some((re, im))
    }

    /// Decode scalars `start..start + out.len()` into `out`.
    pub fn read_into(&self, start: usize, out: &mut [f64]) -> Result<()> {
        let end = start.checked_add(out.len()).unwrap_or(usize::MAX);
        if end > self.len() {
            return Err(SignalError::OutOfRange {
                offset: start,
                len: out.len(),
                available: self.len(),
            });
        }
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = decode_scalar(self.bytes, self.scalar, self.endian, start + i);
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(move |i| decode_scalar(self.bytes, self.scalar, self.endian, i))
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }
}

macro_rules! read_num {
    ($ty:ty, $bytes:expr, $idx:expr, $endian:expr) => {{
        const N: usize = std::mem::size_of::<$ty>();
        let mut raw = [0u8; N];
        raw.copy_from_slice(&$bytes[$idx * N..$idx * N + N]);
        match $endian {
            Endian::Little => <$ty>::from_le_bytes(raw),
            Endian::Big => <$ty>::from_be_bytes(raw),
        }
    }};
}

// Caller guarantees `index` is in range for `bytes`.
fn decode_scalar(bytes: &[u8], scalar: ScalarType, endian: Endian, index: usize) -> f64 {
    match scalar {
        ScalarType::PackedBit => {
            let bit = 7 - (index % 8);
            ((bytes[index / 8] >> bit) & 1) as f64
        }
        ScalarType::Ascii | ScalarType::UnsignedByte => bytes[index] as f64,
        ScalarType::Byte => bytes[index] as i8 as f64,
        ScalarType::Int16 => read_num!(i16, bytes, index, endian) as f64,
        ScalarType::Int32 => read_num!(i32, bytes, index, endian) as f64,
        ScalarType::Int64 => read_num!(i64, bytes, index, endian) as f64,
        ScalarType::Float32 => read_num!(f32, bytes, index, endian) as f64,
        ScalarType::Float64 => read_num!(f64, bytes, index, endian),
    }
}

macro_rules! write_num {
    ($ty:ty, $value:expr, $endian:expr, $out:expr) => {{
        let v = $value as $ty;
        match $endian {
            Endian::Little => $out.extend_from_slice(&v.to_le_bytes()),
            Endian::Big => $out.extend_from_slice(&v.to_be_bytes()),
        }
    }};
}

/// Encode `values` in the given scalar type, appending to `out`.
/// Integer types saturate; packed bits are set for non-zero values.
pub fn encode_scalars(values: &[f64], scalar: ScalarType, endian: Endian, out: &mut Vec<u8>) {
    match scalar {
        ScalarType::PackedBit => {
            for chunk in values.chunks(8) {
                let mut byte = 0u8;
                for (i, v) in chunk.iter().enumerate() {
                    if *v != 0.0 {
                        byte |= 1 << (7 - i);
                    }
                }
                out.push(byte);
            }
        }
        ScalarType::Ascii | ScalarType::UnsignedByte => {
            out.extend(values.iter().map(|v| *v as u8));
        }
        ScalarType::Byte => out.extend(values.iter().map(|v| *v as i8 as u8)),
        ScalarType::Int16 => values.iter().for_each(|v| write_num!(i16, *v, endian, out)),
        ScalarType::Int32 => values.iter().for_each(|v| write_num!(i32, *v, endian, out)),
        ScalarType::Int64 => values.iter().for_each(|v| write_num!(i64, *v, endian, out)),
        ScalarType::Float32 => values.iter().for_each(|v| write_num!(f32, *v, endian, out)),
        ScalarType::Float64 => values.iter().for_each(|v| write_num!(f64, *v, endian, out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_f32_little() {
        let mut bytes = vec![0xAAu8; 4];
        encode_scalars(&[1.5, -2.0, 3.25], ScalarType::Float32, Endian::Little, &mut bytes);
        let view = TypedView::new(&bytes, 4, 3, ScalarType::Float32, 1, Endian::Little).unwrap();
        assert_eq!(view.to_vec(), vec![1.5, -2.0, 3.25]);
        assert_eq!(view.get(3), None);
    }

    #[test]
    fn test_view_i16_big_complex() {
        let mut bytes = Vec::new();
        encode_scalars(&[1.0, -1.0, 300.0, -300.0], ScalarType::Int16, Endian::Big, &mut bytes);
        assert_eq!(&bytes[0..2], &[0x00, 0x01]);
        let view = TypedView::new(&bytes, 0, 2, ScalarType::Int16, 2, Endian::Big).unwrap();
        assert_eq!(view.len(), 4);
        assert_eq!(view.pair(1), Some((300.0, -300.0)));
        assert_eq!(view.pair(2), None);
    }

    #[test]
    fn test_view_packed_bits() {
        let bytes = [0b1010_0000u8, 0b0000_0001];
        let view = TypedView::new(&bytes, 0, 16, ScalarType::PackedBit, 1, Endian::Little).unwrap();
        assert_eq!(view.get(0), Some(1.0));
        assert_eq!(view.get(1), Some(0.0));
        assert_eq!(view.get(2), Some(1.0));
        assert_eq!(view.get(15), Some(1.0));
        assert_eq!(view.iter().sum::<f64>(), 3.0);
    }

    #[test]
    fn test_view_out_of_range() {
        let bytes = [0u8; 10];
        let err = TypedView::new(&bytes, 4, 2, ScalarType::Float32, 1, Endian::Little).unwrap_err();
        assert!(matches!(err, SignalError::OutOfRange { offset: 4, len: 8, available: 10 }));

        let view = TypedView::new(&bytes, 0, 5, ScalarType::Int16, 1, Endian::Little).unwrap();
        let mut out = [0.0; 3];
        assert!(view.read_into(3, &mut out).is_err());
        assert!(view.read_into(2, &mut out).is_ok());
    }

    #[test]
    fn test_signed_bytes() {
        let bytes = [0xFFu8, 0x80, 0x7F];
        let signed = TypedView::new(&bytes, 0, 3, ScalarType::Byte, 1, Endian::Little).unwrap();
        assert_eq!(signed.to_vec(), vec![-1.0, -128.0, 127.0]);
        let unsigned =
            TypedView::new(&bytes, 0, 3, ScalarType::UnsignedByte, 1, Endian::Little).unwrap();
        assert_eq!(unsigned.to_vec(), vec![255.0, 128.0, 127.0]);
    }
}
