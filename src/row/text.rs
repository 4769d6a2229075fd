//! TEXT TABLE row codec: a textual, line-oriented encoding for rows
//! backed by an external delimited file, as opposed to
//! the binary cache format in `codec.rs`. Grounded on the teacher's
//! `formatting.rs`, which renders `SqlValue`s to display text — this
//! module reuses that same value-to-text mapping but adds separators,
//! quoting, and a matching parser, since a TEXT TABLE round-trips through
//! its file rather than merely displaying to a terminal.

use super::Error;
use crate::value::{Decimal, SqlValue};

/// The three configurable separators a TEXT TABLE supports:
/// - `fs` separates ordinary fields.
/// - `vs` separates the last two fields (lets a trailing varchar column
///   use a different, less-likely-to-collide separator than `fs`).
/// - `lvs` separates a long-varchar-style trailing field; if it ends
///   with `'\n'`, the row terminates immediately after that field rather
///   than continuing to the OS-newline terminator.
#[derive(Debug, Clone)]
pub struct TextSeparators {
    pub fs: String,
    pub vs: String,
    pub lvs: String,
    pub quoted: bool,
}

impl Default for TextSeparators {
    fn default() -> Self {
        TextSeparators {
            fs: ",".to_string(),
            vs: ",".to_string(),
            lvs: ",".to_string(),
            quoted: false,
        }
    }
}

/// Declares how to parse each column back into a `SqlValue` on read,
/// since the text encoding carries no type tags of its own (the catalog
/// that would normally supply column types is outside this crate).
#[derive(Debug, Clone, Copy)]
pub enum TextType {
    Boolean,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Numeric(u16),
    Char,
    VarChar,
}

fn separator_before(config: &TextSeparators, field_index: usize, num_fields: usize) -> &str {
    if num_fields <= 1 || field_index == 0 {
        return "";
    }
    if field_index == num_fields - 1 {
        &config.vs
    } else {
        &config.fs
    }
}

fn render_value(v: &SqlValue) -> String {
    match v {
        SqlValue::Null => String::new(),
        SqlValue::Boolean(b) => b.to_string(),
        SqlValue::TinyInt(x) => x.to_string(),
        SqlValue::SmallInt(x) => x.to_string(),
        SqlValue::Int(x) => x.to_string(),
        SqlValue::BigInt(x) => x.to_string(),
        SqlValue::Real(x) => x.to_string(),
        SqlValue::Double(x) => x.to_string(),
        SqlValue::Numeric(d) => render_decimal(d),
        SqlValue::Char(s) | SqlValue::VarChar(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_decimal(d: &Decimal) -> String {
    if d.scale == 0 {
        return d.unscaled.to_string();
    }
    let negative = d.unscaled < 0;
    let digits = d.unscaled.unsigned_abs().to_string();
    let scale = d.scale as usize;
    let padded = if digits.len() <= scale {
        format!("{}{}", "0".repeat(scale - digits.len() + 1), digits)
    } else {
        digits
    };
    let split = padded.len() - scale;
    let (int_part, frac_part) = padded.split_at(split);
    format!(
        "{}{}.{}",
        if negative { "-" } else { "" },
        int_part,
        frac_part
    )
}

/// Quotes `text` if it contains any configured separator, or returns it
/// unchanged; in unquoted mode, a collision is an error.
fn quote_if_needed(text: &str, config: &TextSeparators) -> Result<String, Error> {
    let collides =
        text.contains(config.fs.as_str()) || text.contains(config.vs.as_str()) || text.contains(config.lvs.as_str());
    if !collides {
        return Ok(text.to_string());
    }
    if !config.quoted {
        return Err(Error::TextEncodingError);
    }
    let escaped = text.replace('"', "\"\"");
    Ok(format!("\"{}\"", escaped))
}

/// Encodes a row's fields into one line of TEXT TABLE output, not
/// including the trailing OS newline terminator.
pub fn encode_row(fields: &[SqlValue], config: &TextSeparators) -> Result<String, Error> {
    let mut out = String::new();
    let n = fields.len();
    for (i, field) in fields.iter().enumerate() {
        out.push_str(separator_before(config, i, n));
        let rendered = render_value(field);
        out.push_str(&quote_if_needed(&rendered, config)?);
    }
    if config.lvs.ends_with('\n') {
        out.push('\n');
    }
    Ok(out)
}

/// Splits one TEXT TABLE line back into field strings, honoring quoting,
/// then parses each field per `types`.
pub fn decode_row(line: &str, config: &TextSeparators, types: &[TextType]) -> Result<Vec<SqlValue>, Error> {
    let raw_fields = split_fields(line, config, types.len())?;
    if raw_fields.len() != types.len() {
        return Err(Error::TextEncodingError);
    }
    raw_fields
        .into_iter()
        .zip(types.iter())
        .map(|(raw, ty)| parse_value(&raw, *ty))
        .collect()
}

fn split_fields(line: &str, config: &TextSeparators, num_fields: usize) -> Result<Vec<String>, Error> {
    let mut fields = Vec::with_capacity(num_fields);
    let mut rest = line.trim_end_matches('\n');
    for i in 0..num_fields {
        let sep = if num_fields <= 1 {
            ""
        } else if i == num_fields - 1 {
            ""
        } else if i == num_fields - 2 {
            config.vs.as_str()
        } else {
            config.fs.as_str()
        };
        if rest.starts_with('"') && config.quoted {
            let (field, remainder) = read_quoted(rest)?;
            fields.push(field);
            rest = remainder.strip_prefix(sep).unwrap_or(remainder);
        } else if sep.is_empty() {
            fields.push(rest.to_string());
            rest = "";
        } else {
            match rest.find(sep) {
                Some(pos) => {
                    fields.push(rest[..pos].to_string());
                    rest = &rest[pos + sep.len()..];
                }
                None => {
                    fields.push(rest.to_string());
                    rest = "";
                }
            }
        }
    }
    Ok(fields)
}

fn read_quoted(s: &str) -> Result<(String, &str), Error> {
    let mut chars = s.char_indices().skip(1);
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if s[i + 1..].starts_with('"') {
                out.push('"');
                chars.next();
                continue;
            }
            return Ok((out, &s[i + 1..]));
        }
        out.push(c);
    }
    Err(Error::TextEncodingError)
}

fn parse_value(raw: &str, ty: TextType) -> Result<SqlValue, Error> {
    if raw.is_empty() {
        return Ok(SqlValue::Null);
    }
    let io_err = |_| Error::CorruptRowTerminator;
    Ok(match ty {
        TextType::Boolean => SqlValue::Boolean(raw.parse().map_err(io_err)?),
        TextType::TinyInt => SqlValue::TinyInt(raw.parse().map_err(io_err)?),
        TextType::SmallInt => SqlValue::SmallInt(raw.parse().map_err(io_err)?),
        TextType::Int => SqlValue::Int(raw.parse().map_err(io_err)?),
        TextType::BigInt => SqlValue::BigInt(raw.parse().map_err(io_err)?),
        TextType::Real => SqlValue::Real(raw.parse().map_err(io_err)?),
        TextType::Double => SqlValue::Double(raw.parse().map_err(io_err)?),
        TextType::Numeric(scale) => SqlValue::Numeric(parse_decimal(raw, scale)?),
        TextType::Char => SqlValue::Char(raw.to_string()),
        TextType::VarChar => SqlValue::VarChar(raw.to_string()),
    })
}

fn parse_decimal(raw: &str, scale: u16) -> Result<Decimal, Error> {
    let (negative, raw) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw),
    };
    let (int_part, frac_part) = match raw.split_once('.') {
        Some((i, f)) => (i, f),
        None => (raw, ""),
    };
    let mut frac = frac_part.to_string();
    while frac.len() < scale as usize {
        frac.push('0');
    }
    frac.truncate(scale as usize);
    let digits = format!("{}{}", int_part, frac);
    let unscaled: i128 = digits.parse().map_err(|_| Error::CorruptRowTerminator)?;
    Ok(Decimal {
        unscaled: if negative { -unscaled } else { unscaled },
        scale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_simple_row() {
        let config = TextSeparators::default();
        let fields = vec![SqlValue::Int(7), SqlValue::VarChar("hi".into())];
        assert_eq!(encode_row(&fields, &config).unwrap(), "7,hi");
    }

    #[test]
    fn unquoted_separator_collision_is_error() {
        let config = TextSeparators::default();
        let fields = vec![SqlValue::VarChar("a,b".into())];
        assert!(matches!(
            encode_row(&fields, &config),
            Err(Error::TextEncodingError)
        ));
    }

    #[test]
    fn quoted_separator_collision_roundtrips() {
        let mut config = TextSeparators::default();
        config.quoted = true;
        let fields = vec![SqlValue::VarChar("a,b".into()), SqlValue::Int(1)];
        let line = encode_row(&fields, &config).unwrap();
        assert_eq!(line, "\"a,b\",1");
        let decoded = decode_row(&line, &config, &[TextType::VarChar, TextType::Int]).unwrap();
        assert_eq!(decoded[0], SqlValue::VarChar("a,b".into()));
        assert_eq!(decoded[1], SqlValue::Int(1));
    }

    #[test]
    fn decimal_text_roundtrip() {
        let d = Decimal {
            unscaled: -12345,
            scale: 2,
        };
        let text = render_decimal(&d);
        assert_eq!(text, "-123.45");
        let parsed = parse_decimal(&text, 2).unwrap();
        assert_eq!(parsed, d);
    }

    #[test]
    fn empty_field_is_null() {
        let config = TextSeparators::default();
        let line = "1,";
        let decoded = decode_row(line, &config, &[TextType::Int, TextType::VarChar]).unwrap();
        assert_eq!(decoded[1], SqlValue::Null);
    }
}
