//! Tagged-union value type standing in for a reflection-style `Object[]`
//! row representation.
//!
//! Every SQL scalar type this engine supports has exactly one variant
//! here. `SqlValue::Null` replaces a null reference; there is no separate
//! "nullable wrapper" type, matching how the teacher's own `SqlValue`
//! collapses NULL into the value enum rather than an `Option<T>` layer.

use enum_as_inner::EnumAsInner;
use std::cmp::Ordering;

/// A packed bit string, MSB-first within each byte. `len` is the number of
/// significant bits; trailing bits in the last byte beyond `len` are unused
/// padding and must be zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitString {
    pub bits: Vec<u8>,
    pub len: usize,
}

impl BitString {
    pub fn from_bits(bits: &[bool]) -> Self {
        let mut bytes = vec![0u8; (bits.len() + 7) / 8];
        for (i, b) in bits.iter().enumerate() {
            if *b {
                bytes[i / 8] |= 0x80 >> (i % 8);
            }
        }
        BitString {
            bits: bytes,
            len: bits.len(),
        }
    }

    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.len);
        (self.bits[i / 8] & (0x80 >> (i % 8))) != 0
    }
}

/// An exact-scale decimal: `unscaled * 10^-scale`. Preserves scale
/// exactly through serialization round trips, never normalizing it away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: u16,
}

impl Decimal {
    pub fn scale(&self) -> u16 {
        self.scale
    }
}

/// `YEAR TO MONTH` interval, stored as a signed total-months count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalYearMonth {
    pub months: i64,
}

/// `DAY TO SECOND` interval, stored as signed seconds plus a nanosecond
/// remainder with the same sign as `seconds` (or zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalDaySecond {
    pub seconds: i64,
    pub nanos: i32,
}

#[derive(Debug, Clone, PartialEq, EnumAsInner)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Real(f32),
    Double(f64),
    Numeric(Decimal),
    Char(String),
    VarChar(String),
    /// A handle into the CLOB side-store; the CLOB bytes themselves are
    /// outside this crate's scope (catalog/executor concern).
    ClobHandle(u64),
    Binary(Vec<u8>),
    VarBinary(Vec<u8>),
    Uuid([u8; 16]),
    Bit(BitString),
    BitVarying(BitString),
    /// Days since the epoch (1970-01-01).
    Date(i32),
    /// Nanoseconds since midnight.
    Time(i64),
    /// Days since the epoch, plus nanoseconds since midnight.
    Timestamp(i32, i64),
    IntervalYearMonth(IntervalYearMonth),
    IntervalDaySecond(IntervalDaySecond),
    Array(Vec<SqlValue>),
    /// A handle into the BLOB side-store, analogous to `ClobHandle`.
    BlobHandle(u64),
    /// An opaque, engine-specific payload that the codec round-trips
    /// byte-for-byte without interpreting it.
    Other(Vec<u8>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Null => write!(f, "NULL"),
            SqlValue::Boolean(b) => write!(f, "{}", b),
            SqlValue::TinyInt(v) => write!(f, "{}", v),
            SqlValue::SmallInt(v) => write!(f, "{}", v),
            SqlValue::Int(v) => write!(f, "{}", v),
            SqlValue::BigInt(v) => write!(f, "{}", v),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Double(v) => write!(f, "{}", v),
            SqlValue::Numeric(d) => write!(f, "{}e-{}", d.unscaled, d.scale),
            SqlValue::Char(s) | SqlValue::VarChar(s) => write!(f, "{}", s),
            SqlValue::ClobHandle(h) => write!(f, "<CLOB:{}>", h),
            SqlValue::Binary(b) | SqlValue::VarBinary(b) => write!(f, "<BINARY:{}B>", b.len()),
            SqlValue::Uuid(u) => write!(f, "{}", hex_string(u)),
            SqlValue::Bit(b) | SqlValue::BitVarying(b) => write!(f, "<BIT:{}b>", b.len),
            SqlValue::Date(d) => write!(f, "<DATE:{}>", d),
            SqlValue::Time(t) => write!(f, "<TIME:{}>", t),
            SqlValue::Timestamp(d, t) => write!(f, "<TS:{}:{}>", d, t),
            SqlValue::IntervalYearMonth(i) => write!(f, "{}mo", i.months),
            SqlValue::IntervalDaySecond(i) => write!(f, "{}s{}ns", i.seconds, i.nanos),
            SqlValue::Array(v) => write!(f, "<ARRAY:{}>", v.len()),
            SqlValue::BlobHandle(h) => write!(f, "<BLOB:{}>", h),
            SqlValue::Other(b) => write!(f, "<OTHER:{}B>", b.len()),
        }
    }
}

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect()
}

/// Null-ordering used by an index's comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrder {
    First,
    Last,
}

/// Compares two values of (assumed) the same underlying type for ordering
/// purposes. `NULL` compares according to `null_order`; among non-null
/// values, comparison follows the natural ordering for that variant.
/// Cross-variant comparisons (which should not occur for a well-typed
/// column) fall back to a stable, arbitrary-but-deterministic tag order so
/// that the AVL tree's total order invariant is never violated even if
/// misused.
pub fn compare_values(a: &SqlValue, b: &SqlValue, null_order: NullOrder) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => return Ordering::Equal,
        (true, false) => {
            return match null_order {
                NullOrder::First => Ordering::Less,
                NullOrder::Last => Ordering::Greater,
            }
        }
        (false, true) => {
            return match null_order {
                NullOrder::First => Ordering::Greater,
                NullOrder::Last => Ordering::Less,
            }
        }
        (false, false) => {}
    }
    use SqlValue::*;
    match (a, b) {
        (Boolean(x), Boolean(y)) => x.cmp(y),
        (TinyInt(x), TinyInt(y)) => x.cmp(y),
        (SmallInt(x), SmallInt(y)) => x.cmp(y),
        (Int(x), Int(y)) => x.cmp(y),
        (BigInt(x), BigInt(y)) => x.cmp(y),
        (Real(x), Real(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Double(x), Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Numeric(x), Numeric(y)) => compare_decimal(x, y),
        (Char(x), VarChar(y)) | (VarChar(x), Char(y)) | (Char(x), Char(y)) | (VarChar(x), VarChar(y)) => x.cmp(y),
        (Binary(x), Binary(y)) | (VarBinary(x), VarBinary(y)) | (Binary(x), VarBinary(y)) | (VarBinary(x), Binary(y)) => x.cmp(y),
        (Uuid(x), Uuid(y)) => x.cmp(y),
        (Date(x), Date(y)) => x.cmp(y),
        (Time(x), Time(y)) => x.cmp(y),
        (Timestamp(xd, xt), Timestamp(yd, yt)) => (xd, xt).cmp(&(yd, yt)),
        (IntervalYearMonth(x), IntervalYearMonth(y)) => x.months.cmp(&y.months),
        (IntervalDaySecond(x), IntervalDaySecond(y)) => {
            (x.seconds, x.nanos).cmp(&(y.seconds, y.nanos))
        }
        (ClobHandle(x), ClobHandle(y)) | (BlobHandle(x), BlobHandle(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn compare_decimal(a: &Decimal, b: &Decimal) -> Ordering {
    // Align to the larger scale before comparing, so that 1.20 == 1.2.
    if a.scale == b.scale {
        return a.unscaled.cmp(&b.unscaled);
    }
    let (a_u, b_u, shift) = if a.scale < b.scale {
        (a.unscaled, b.unscaled, b.scale - a.scale)
    } else {
        (b.unscaled, a.unscaled, a.scale - b.scale)
    };
    let scaled = a_u.saturating_mul(10i128.saturating_pow(shift as u32));
    if a.scale < b.scale {
        scaled.cmp(&b_u)
    } else {
        b_u.cmp(&scaled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_ordering_last() {
        assert_eq!(
            compare_values(&SqlValue::Null, &SqlValue::Int(1), NullOrder::Last),
            Ordering::Greater
        );
        assert_eq!(
            compare_values(&SqlValue::Null, &SqlValue::Int(1), NullOrder::First),
            Ordering::Less
        );
    }

    #[test]
    fn decimal_scale_equivalence() {
        let a = Decimal { unscaled: 120, scale: 2 };
        let b = Decimal { unscaled: 12, scale: 1 };
        assert_eq!(compare_decimal(&a, &b), Ordering::Equal);
    }

    #[test]
    fn bitstring_roundtrip_bits() {
        let bs = BitString::from_bits(&[true, false, true, true]);
        assert!(bs.get(0));
        assert!(!bs.get(1));
        assert!(bs.get(2));
        assert!(bs.get(3));
    }

    #[test]
    fn as_inner_accessor() {
        let v = SqlValue::Int(42);
        assert_eq!(v.as_int(), Some(&42));
        assert_eq!(v.into_int().unwrap(), 42);
    }
}
