//! Binary row codec — the format used by the cached data file:
//! `{u32 size, nodes[], row-fields[], u32 terminator}`, size rounded up
//! to a multiple of the data-file scale `S`.
//!
//! Each field is tagged with a one-byte type code, mirroring the
//! teacher's `serial_type.rs` tag-then-payload approach (there: a SQLite
//! varint serial type number; here: a fixed one-byte tag for our own
//! type list, since this is not a SQLite-compatible format).

use super::{Error, Node, Row};
use crate::header::Scale;
use crate::value::{BitString, Decimal, IntervalDaySecond, IntervalYearMonth, SqlValue};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

const TERMINATOR: u32 = 0xFEED_FACE;
const NODE_LEN: usize = 8 + 8 + 8 + 1; // parent, left, right, balance

mod tag {
    pub const NULL: u8 = 0;
    pub const BOOLEAN: u8 = 1;
    pub const TINY_INT: u8 = 2;
    pub const SMALL_INT: u8 = 3;
    pub const INT: u8 = 4;
    pub const BIG_INT: u8 = 5;
    pub const REAL: u8 = 6;
    pub const DOUBLE: u8 = 7;
    pub const NUMERIC: u8 = 8;
    pub const CHAR: u8 = 9;
    pub const VARCHAR: u8 = 10;
    pub const CLOB_HANDLE: u8 = 11;
    pub const BINARY: u8 = 12;
    pub const VARBINARY: u8 = 13;
    pub const UUID: u8 = 14;
    pub const BIT: u8 = 15;
    pub const BIT_VARYING: u8 = 16;
    pub const DATE: u8 = 17;
    pub const TIME: u8 = 18;
    pub const TIMESTAMP: u8 = 19;
    pub const INTERVAL_YM: u8 = 20;
    pub const INTERVAL_DS: u8 = 21;
    pub const ARRAY: u8 = 22;
    pub const BLOB_HANDLE: u8 = 23;
    pub const OTHER: u8 = 24;
}

fn write_node<W: Write>(w: &mut W, n: Node) -> Result<(), Error> {
    w.write_i64::<BigEndian>(n.parent)?;
    w.write_i64::<BigEndian>(n.left)?;
    w.write_i64::<BigEndian>(n.right)?;
    w.write_i8(n.balance)?;
    Ok(())
}

fn read_node<R: Read>(r: &mut R) -> Result<Node, Error> {
    let parent = r.read_i64::<BigEndian>()?;
    let left = r.read_i64::<BigEndian>()?;
    let right = r.read_i64::<BigEndian>()?;
    let balance = r.read_i8()?;
    Ok(Node {
        parent,
        left,
        right,
        balance,
    })
}

fn write_value<W: Write>(w: &mut W, v: &SqlValue) -> Result<(), Error> {
    match v {
        SqlValue::Null => w.write_u8(tag::NULL)?,
        SqlValue::Boolean(b) => {
            w.write_u8(tag::BOOLEAN)?;
            w.write_u8(*b as u8)?;
        }
        SqlValue::TinyInt(x) => {
            w.write_u8(tag::TINY_INT)?;
            w.write_i8(*x)?;
        }
        SqlValue::SmallInt(x) => {
            w.write_u8(tag::SMALL_INT)?;
            w.write_i16::<BigEndian>(*x)?;
        }
        SqlValue::Int(x) => {
            w.write_u8(tag::INT)?;
            w.write_i32::<BigEndian>(*x)?;
        }
        SqlValue::BigInt(x) => {
            w.write_u8(tag::BIG_INT)?;
            w.write_i64::<BigEndian>(*x)?;
        }
        SqlValue::Real(x) => {
            w.write_u8(tag::REAL)?;
            w.write_f32::<BigEndian>(*x)?;
        }
        SqlValue::Double(x) => {
            w.write_u8(tag::DOUBLE)?;
            w.write_f64::<BigEndian>(*x)?;
        }
        SqlValue::Numeric(d) => {
            w.write_u8(tag::NUMERIC)?;
            w.write_u16::<BigEndian>(d.scale)?;
            w.write_i128::<BigEndian>(d.unscaled)?;
        }
        SqlValue::Char(s) => write_text(w, tag::CHAR, s)?,
        SqlValue::VarChar(s) => write_text(w, tag::VARCHAR, s)?,
        SqlValue::ClobHandle(h) => {
            w.write_u8(tag::CLOB_HANDLE)?;
            w.write_u64::<BigEndian>(*h)?;
        }
        SqlValue::Binary(b) => write_bytes(w, tag::BINARY, b)?,
        SqlValue::VarBinary(b) => write_bytes(w, tag::VARBINARY, b)?,
        SqlValue::Uuid(u) => {
            w.write_u8(tag::UUID)?;
            w.write_all(u)?;
        }
        SqlValue::Bit(b) => write_bits(w, tag::BIT, b)?,
        SqlValue::BitVarying(b) => write_bits(w, tag::BIT_VARYING, b)?,
        SqlValue::Date(d) => {
            w.write_u8(tag::DATE)?;
            w.write_i32::<BigEndian>(*d)?;
        }
        SqlValue::Time(t) => {
            w.write_u8(tag::TIME)?;
            w.write_i64::<BigEndian>(*t)?;
        }
        SqlValue::Timestamp(d, t) => {
            w.write_u8(tag::TIMESTAMP)?;
            w.write_i32::<BigEndian>(*d)?;
            w.write_i64::<BigEndian>(*t)?;
        }
        SqlValue::IntervalYearMonth(i) => {
            w.write_u8(tag::INTERVAL_YM)?;
            w.write_i64::<BigEndian>(i.months)?;
        }
        SqlValue::IntervalDaySecond(i) => {
            w.write_u8(tag::INTERVAL_DS)?;
            w.write_i64::<BigEndian>(i.seconds)?;
            w.write_i32::<BigEndian>(i.nanos)?;
        }
        SqlValue::Array(items) => {
            w.write_u8(tag::ARRAY)?;
            w.write_u32::<BigEndian>(items.len() as u32)?;
            for item in items {
                write_value(w, item)?;
            }
        }
        SqlValue::BlobHandle(h) => {
            w.write_u8(tag::BLOB_HANDLE)?;
            w.write_u64::<BigEndian>(*h)?;
        }
        SqlValue::Other(b) => write_bytes(w, tag::OTHER, b)?,
    }
    Ok(())
}

fn write_text<W: Write>(w: &mut W, tag: u8, s: &str) -> Result<(), Error> {
    w.write_u8(tag)?;
    let bytes = s.as_bytes();
    w.write_u32::<BigEndian>(bytes.len() as u32)?;
    w.write_all(bytes)?;
    Ok(())
}

fn write_bytes<W: Write>(w: &mut W, tag: u8, b: &[u8]) -> Result<(), Error> {
    w.write_u8(tag)?;
    w.write_u32::<BigEndian>(b.len() as u32)?;
    w.write_all(b)?;
    Ok(())
}

fn write_bits<W: Write>(w: &mut W, tag: u8, b: &BitString) -> Result<(), Error> {
    w.write_u8(tag)?;
    w.write_u32::<BigEndian>(b.len as u32)?;
    w.write_all(&b.bits)?;
    Ok(())
}

fn read_value<R: Read>(r: &mut R) -> Result<SqlValue, Error> {
    let t = r.read_u8()?;
    Ok(match t {
        tag::NULL => SqlValue::Null,
        tag::BOOLEAN => SqlValue::Boolean(r.read_u8()? != 0),
        tag::TINY_INT => SqlValue::TinyInt(r.read_i8()?),
        tag::SMALL_INT => SqlValue::SmallInt(r.read_i16::<BigEndian>()?),
        tag::INT => SqlValue::Int(r.read_i32::<BigEndian>()?),
        tag::BIG_INT => SqlValue::BigInt(r.read_i64::<BigEndian>()?),
        tag::REAL => SqlValue::Real(r.read_f32::<BigEndian>()?),
        tag::DOUBLE => SqlValue::Double(r.read_f64::<BigEndian>()?),
        tag::NUMERIC => {
            let scale = r.read_u16::<BigEndian>()?;
            let unscaled = r.read_i128::<BigEndian>()?;
            SqlValue::Numeric(Decimal { unscaled, scale })
        }
        tag::CHAR => SqlValue::Char(read_text(r)?),
        tag::VARCHAR => SqlValue::VarChar(read_text(r)?),
        tag::CLOB_HANDLE => SqlValue::ClobHandle(r.read_u64::<BigEndian>()?),
        tag::BINARY => SqlValue::Binary(read_bytes(r)?),
        tag::VARBINARY => SqlValue::VarBinary(read_bytes(r)?),
        tag::UUID => {
            let mut u = [0u8; 16];
            r.read_exact(&mut u)?;
            SqlValue::Uuid(u)
        }
        tag::BIT => SqlValue::Bit(read_bits(r)?),
        tag::BIT_VARYING => SqlValue::BitVarying(read_bits(r)?),
        tag::DATE => SqlValue::Date(r.read_i32::<BigEndian>()?),
        tag::TIME => SqlValue::Time(r.read_i64::<BigEndian>()?),
        tag::TIMESTAMP => {
            let d = r.read_i32::<BigEndian>()?;
            let t = r.read_i64::<BigEndian>()?;
            SqlValue::Timestamp(d, t)
        }
        tag::INTERVAL_YM => SqlValue::IntervalYearMonth(IntervalYearMonth {
            months: r.read_i64::<BigEndian>()?,
        }),
        tag::INTERVAL_DS => {
            let seconds = r.read_i64::<BigEndian>()?;
            let nanos = r.read_i32::<BigEndian>()?;
            SqlValue::IntervalDaySecond(IntervalDaySecond { seconds, nanos })
        }
        tag::ARRAY => {
            let n = r.read_u32::<BigEndian>()?;
            let mut items = Vec::with_capacity(n as usize);
            for _ in 0..n {
                items.push(read_value(r)?);
            }
            SqlValue::Array(items)
        }
        tag::BLOB_HANDLE => SqlValue::BlobHandle(r.read_u64::<BigEndian>()?),
        tag::OTHER => SqlValue::Other(read_bytes(r)?),
        other => return Err(Error::CorruptRow(other)),
    })
}

fn read_text<R: Read>(r: &mut R) -> Result<String, Error> {
    let bytes = read_bytes(r)?;
    String::from_utf8(bytes).map_err(|_| Error::CorruptRow(tag::CHAR))
}

fn read_bytes<R: Read>(r: &mut R) -> Result<Vec<u8>, Error> {
    let len = r.read_u32::<BigEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_bits<R: Read>(r: &mut R) -> Result<BitString, Error> {
    let len = r.read_u32::<BigEndian>()? as usize;
    let mut bytes = vec![0u8; (len + 7) / 8];
    r.read_exact(&mut bytes)?;
    Ok(BitString { bits: bytes, len })
}

/// Encodes `row` into its on-disk binary image, rounded up to a multiple
/// of `scale`. The returned size (the leading `u32`) is the rounded
/// total, matching the row's own `storageSize`.
pub fn encode(row: &Row, scale: Scale) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    for node in &row.nodes {
        write_node(&mut body, *node)?;
    }
    for field in &row.fields {
        write_value(&mut body, field)?;
    }
    body.write_u32::<BigEndian>(TERMINATOR)?;

    let unpadded = 4 + body.len() as u64;
    let total = scale.round_up(unpadded);

    let mut out = Vec::with_capacity(total as usize);
    out.write_u32::<BigEndian>(total as u32)?;
    out.extend_from_slice(&body);
    out.resize(total as usize, 0);
    Ok(out)
}

/// Decodes a row image produced by `encode`. `num_indexes` must match the
/// number of per-index AVL nodes the row was serialized with.
pub fn decode(bytes: &[u8], num_indexes: usize) -> Result<Row, Error> {
    let mut c = Cursor::new(bytes);
    let size = c.read_u32::<BigEndian>()?;
    let mut nodes = Vec::with_capacity(num_indexes);
    for _ in 0..num_indexes {
        nodes.push(read_node(&mut c)?);
    }
    let mut fields = Vec::new();
    loop {
        let pos = c.position() as usize;
        if pos + 4 <= bytes.len() {
            let maybe_term = BigEndian::read_u32(&bytes[pos..pos + 4]);
            if maybe_term == TERMINATOR {
                c.set_position((pos + 4) as u64);
                break;
            }
        }
        if pos >= bytes.len() {
            return Err(Error::CorruptRowTerminator);
        }
        fields.push(read_value(&mut c)?);
    }
    Ok(Row {
        position: -1,
        storage_size: size,
        has_data_changed: false,
        has_nodes_changed: false,
        keep_count: 0,
        is_in_memory: false,
        is_new: false,
        nodes,
        fields,
    })
}
