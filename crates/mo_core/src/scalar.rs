//! 32-bit immediate values.

/// A 32-bit scalar.
///
/// Integer and float views share the same 32 bits, so reading a float slot as an integer
/// yields its bit pattern and vice versa.
#[derive(Debug, Clone, Copy)]
pub enum Scalar {
    Int(i32),
    Float(f32),
}

impl Scalar {
    #[inline]
    pub fn bits(self) -> u32 {
        match self {
            Scalar::Int(i) => i as u32,
            Scalar::Float(f) => f.to_bits(),
        }
    }

    #[inline]
    pub fn as_i32(self) -> i32 {
        self.bits() as i32
    }

    #[inline]
    pub fn as_i16(self) -> i16 {
        self.bits() as i16
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self.bits() as u8
    }

    #[inline]
    pub fn as_f32(self) -> f32 {
        match self {
            Scalar::Float(f) => f,
            Scalar::Int(i) => f32::from_bits(i as u32),
        }
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Scalar::Int(a), Scalar::Int(b)) => a == b,
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Scalar {}
