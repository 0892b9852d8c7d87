//! Data types and numeric literal values (component A).
//!
//! `DataType` describes the element type of a port or arc; `NumericValue`
//! describes a literal (initial condition, constant) that is rendered
//! against a target `DataType` when emitted.

use crate::error::DataflowError;
use serde::{Deserialize, Serialize};

/// Element kind, orthogonal to signedness/width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseKind {
    Bool,
    Int,
    Float,
}

/// What to do when a rendered literal does not fit the target type's range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverflowBehavior {
    Saturate,
    Wrap,
}

/// `(base_kind, signed, total_bits, fractional_bits, dims)` plus complexity.
///
/// `dims` is an ordered list of positive dimension sizes; a scalar is
/// `dims == [1]`. `dims[0]` is the outer sample dimension that blocking
/// expands.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    pub base_kind: BaseKind,
    pub signed: bool,
    pub total_bits: u32,
    pub fractional_bits: u32,
    pub dims: Vec<u32>,
    pub complex: bool,
}

impl DataType {
    pub fn scalar(base_kind: BaseKind, signed: bool, total_bits: u32) -> Self {
        DataType {
            base_kind,
            signed,
            total_bits,
            fractional_bits: 0,
            dims: vec![1],
            complex: false,
        }
    }

    pub fn bool_scalar() -> Self {
        DataType::scalar(BaseKind::Bool, false, 1)
    }

    /// Checks the invariants:
    /// - fractional_bits == 0 for bool and float
    /// - total_bits for float is 32 or 64
    /// - dims is non-empty and every entry is positive
    pub fn validate(&self) -> Result<(), DataflowError> {
        if self.dims.is_empty() {
            return Err(DataflowError::Structural {
                path: String::new(),
                rule: "DataType.dims must be non-empty".into(),
            });
        }
        if self.dims.iter().any(|&d| d == 0) {
            return Err(DataflowError::Structural {
                path: String::new(),
                rule: "DataType.dims entries must be positive".into(),
            });
        }
        match self.base_kind {
            BaseKind::Bool | BaseKind::Float if self.fractional_bits != 0 => {
                Err(DataflowError::Structural {
                    path: String::new(),
                    rule: format!(
                        "fractional_bits must be 0 for {:?}, got {}",
                        self.base_kind, self.fractional_bits
                    ),
                })
            }
            BaseKind::Float if !matches!(self.total_bits, 32 | 64) => {
                Err(DataflowError::Structural {
                    path: String::new(),
                    rule: format!("float total_bits must be 32 or 64, got {}", self.total_bits),
                })
            }
            _ => Ok(()),
        }
    }

    /// Multiplies the outer dimension by `n`, inserting a new outer
    /// dimension of `n` if this type is currently scalar (dims == [1]).
    pub fn expand_for_block(&self, n: u32) -> DataType {
        let mut dims = self.dims.clone();
        if dims == [1] {
            dims = vec![n];
        } else {
            dims[0] *= n;
        }
        DataType { dims, ..self.clone() }
    }

    pub fn is_scalar(&self) -> bool {
        self.dims == [1]
    }

    /// Integer range `[min, max]` representable by this type, if integral.
    fn int_range(&self) -> Option<(i128, i128)> {
        match self.base_kind {
            BaseKind::Float => None,
            BaseKind::Bool => Some((0, 1)),
            BaseKind::Int => {
                let bits = self.total_bits;
                if self.signed {
                    let max = (1i128 << (bits - 1)) - 1;
                    let min = -(1i128 << (bits - 1));
                    Some((min, max))
                } else {
                    Some((0, (1i128 << bits) - 1))
                }
            }
        }
    }
}

/// Fixed-point scale: raw = round(value * 2^fractional_bits).
pub fn to_fixed_point_scaled(value: f64, fractional_bits: u32) -> i128 {
    (value * (1u64 << fractional_bits) as f64).round() as i128
}

pub fn from_fixed_point_scaled(raw: i128, fractional_bits: u32) -> f64 {
    raw as f64 / (1u64 << fractional_bits) as f64
}

/// A literal value: an integer or float, optionally complex.
///
/// Integer values are kept exact (`i64`); float values carry an explicit
/// `fractional` marker distinguishing "this came from a float literal" from
/// "this is an integer that happens to be rendered against a fixed-point
/// type", which matters for the sign-/bit-/scale checks render performs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum NumericValue {
    Int { re: i64, im: Option<i64> },
    Float { re: f64, im: Option<f64> },
}

impl NumericValue {
    pub fn is_complex(&self) -> bool {
        match self {
            NumericValue::Int { im, .. } => im.is_some(),
            NumericValue::Float { im, .. } => im.is_some(),
        }
    }

    pub fn is_fractional(&self) -> bool {
        matches!(self, NumericValue::Float { .. })
    }

    /// Parses one scalar literal: `a`, `a+bi`, `a-bi`, `bi`, `bi+a`, with
    /// optional whitespace around the sign. `a`/`b` may be integer or
    /// floating literals; the result is integer-typed only if *both* parts
    /// parse as integers.
    pub fn parse(input: &str) -> Result<NumericValue, DataflowError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(parse_err(input, "empty literal"));
        }

        // Split on a top-level '+' or '-' that is not the leading sign and
        // not part of an exponent (e/E).
        let bytes = s.as_bytes();
        let mut split_at = None;
        for i in 1..bytes.len() {
            let c = bytes[i] as char;
            if (c == '+' || c == '-') && !matches!(bytes[i - 1] as char, 'e' | 'E') {
                split_at = Some(i);
                break;
            }
        }

        if let Some(idx) = split_at {
            let (a, b) = s.split_at(idx);
            parse_two_term(a.trim(), b.trim(), input)
        } else if let Some(stripped) = s.strip_suffix(['i', 'j']) {
            // Pure imaginary: "bi"
            parse_one_term(stripped.trim(), input, true)
        } else {
            parse_one_term(s, input, false)
        }
    }

    /// Parses a bracketed, comma-separated vector: `[1, 2, 3+4i]`.
    pub fn parse_vector(input: &str) -> Result<Vec<NumericValue>, DataflowError> {
        let s = input.trim();
        let inner = s
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .ok_or_else(|| parse_err(input, "vector literal must be bracketed"))?;
        if inner.trim().is_empty() {
            return Ok(Vec::new());
        }
        inner.split(',').map(NumericValue::parse).collect()
    }

    /// Renders this value as a C literal targeting `target`, applying
    /// sign/bit/fixed-point checks. Fails if the value does not fit
    /// (unless `overflow == Saturate`, in which case it clamps).
    pub fn render(
        &self,
        target: &DataType,
        overflow: OverflowBehavior,
    ) -> Result<String, DataflowError> {
        target.validate()?;

        if self.is_complex() && !target.complex {
            return Err(DataflowError::Structural {
                path: String::new(),
                rule: "complex literal rendered against a non-complex DataType".into(),
            });
        }

        let render_real = |re: f64, is_int_src: bool| -> Result<String, DataflowError> {
            match target.base_kind {
                BaseKind::Bool => Ok(if re != 0.0 { "1".into() } else { "0".into() }),
                BaseKind::Float => Ok(format!("{}", re)),
                BaseKind::Int => {
                    let raw = if target.fractional_bits > 0 {
                        to_fixed_point_scaled(re, target.fractional_bits)
                    } else {
                        re.round() as i128
                    };
                    let (min, max) = target
                        .int_range()
                        .expect("Int base_kind always has an int_range");
                    let clamped = if raw < min || raw > max {
                        match overflow {
                            OverflowBehavior::Saturate => raw.clamp(min, max),
                            OverflowBehavior::Wrap => {
                                let span = max - min + 1;
                                let wrapped = ((raw - min).rem_euclid(span)) + min;
                                if is_int_src {
                                    wrapped
                                } else {
                                    return Err(DataflowError::Structural {
                                        path: String::new(),
                                        rule: format!(
                                            "literal {} out of range [{}, {}] for target type",
                                            re, min, max
                                        ),
                                    });
                                }
                            }
                        }
                    } else {
                        raw
                    };
                    Ok(format!("{}", clamped))
                }
            }
        };

        match self {
            NumericValue::Int { re, im } => {
                let r = render_real(*re as f64, true)?;
                match im {
                    Some(im) if target.complex => {
                        let i = render_real(*im as f64, true)?;
                        Ok(format!("{} + {}*I", r, i))
                    }
                    _ => Ok(r),
                }
            }
            NumericValue::Float { re, im } => {
                let r = render_real(*re, false)?;
                match im {
                    Some(im) if target.complex => {
                        let i = render_real(*im, false)?;
                        Ok(format!("{} + {}*I", r, i))
                    }
                    _ => Ok(r),
                }
            }
        }
    }
}

fn parse_err(input: &str, why: &str) -> DataflowError {
    DataflowError::Parse {
        detail: format!("cannot parse numeric literal '{}': {}", input, why),
    }
}

fn parse_num(term: &str) -> Result<(f64, bool), DataflowError> {
    if let Ok(i) = term.parse::<i64>() {
        return Ok((i as f64, true));
    }
    term.parse::<f64>()
        .map(|f| (f, false))
        .map_err(|_| parse_err(term, "not a number"))
}

fn parse_one_term(term: &str, orig: &str, imaginary: bool) -> Result<NumericValue, DataflowError> {
    if term.is_empty() {
        // bare "i" means 1i
        return Ok(NumericValue::Int { re: 0, im: Some(1) });
    }
    let (v, is_int) = parse_num(term).map_err(|_| parse_err(orig, "bad term"))?;
    if imaginary {
        if is_int {
            Ok(NumericValue::Int {
                re: 0,
                im: Some(v as i64),
            })
        } else {
            Ok(NumericValue::Float { re: 0.0, im: Some(v) })
        }
    } else if is_int {
        Ok(NumericValue::Int { re: v as i64, im: None })
    } else {
        Ok(NumericValue::Float { re: v, im: None })
    }
}

fn parse_two_term(a: &str, b: &str, orig: &str) -> Result<NumericValue, DataflowError> {
    // One of a/b is the imaginary part (suffixed with i/j), the other real.
    let (sign, b_mag) = if let Some(rest) = b.strip_prefix('-') {
        (-1.0, rest.trim())
    } else if let Some(rest) = b.strip_prefix('+') {
        (1.0, rest.trim())
    } else {
        (1.0, b)
    };

    let (real_term, imag_term, imag_sign) = if let Some(stripped) = b_mag.strip_suffix(['i', 'j']) {
        (a, stripped, sign)
    } else if let Some(stripped) = a.strip_suffix(['i', 'j']) {
        (b_mag, stripped, sign)
    } else {
        return Err(parse_err(
            orig,
            "two-term literal must have one imaginary part",
        ));
    };

    let (re, re_int) = parse_num(real_term)?;
    let (im_mag, im_int) = if imag_term.is_empty() {
        (1.0, true)
    } else {
        parse_num(imag_term)?
    };
    let im = im_mag * imag_sign;

    if re_int && im_int {
        Ok(NumericValue::Int {
            re: re as i64,
            im: Some(im as i64),
        })
    } else {
        Ok(NumericValue::Float { re, im: Some(im) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_integer() {
        assert_eq!(
            NumericValue::parse("42").unwrap(),
            NumericValue::Int { re: 42, im: None }
        );
    }

    #[test]
    fn parses_plain_float() {
        assert_eq!(
            NumericValue::parse("3.5").unwrap(),
            NumericValue::Float { re: 3.5, im: None }
        );
    }

    #[test]
    fn parses_complex_a_plus_bi() {
        assert_eq!(
            NumericValue::parse("3+4i").unwrap(),
            NumericValue::Int { re: 3, im: Some(4) }
        );
        assert_eq!(
            NumericValue::parse("3 + 4i").unwrap(),
            NumericValue::Int { re: 3, im: Some(4) }
        );
    }

    #[test]
    fn parses_pure_imaginary() {
        assert_eq!(
            NumericValue::parse("4i").unwrap(),
            NumericValue::Int { re: 0, im: Some(4) }
        );
    }

    #[test]
    fn parses_bi_plus_a_order() {
        assert_eq!(
            NumericValue::parse("4i + 3").unwrap(),
            NumericValue::Int { re: 3, im: Some(4) }
        );
    }

    #[test]
    fn parses_negative_imaginary() {
        assert_eq!(
            NumericValue::parse("3-4i").unwrap(),
            NumericValue::Int { re: 3, im: Some(-4) }
        );
    }

    #[test]
    fn parses_bracketed_vector() {
        let v = NumericValue::parse_vector("[1, 2, 3]").unwrap();
        assert_eq!(v.len(), 3);
        assert_eq!(v[1], NumericValue::Int { re: 2, im: None });
    }

    #[test]
    fn expand_for_block_scalar_inserts_dim() {
        let dt = DataType::scalar(BaseKind::Int, true, 16);
        let expanded = dt.expand_for_block(4);
        assert_eq!(expanded.dims, vec![4]);
    }

    #[test]
    fn expand_for_block_existing_multiplies() {
        let dt = DataType {
            dims: vec![2, 3],
            ..DataType::scalar(BaseKind::Int, true, 16)
        };
        let expanded = dt.expand_for_block(4);
        assert_eq!(expanded.dims, vec![8, 3]);
    }

    #[test]
    fn render_saturates_on_overflow() {
        let dt = DataType::scalar(BaseKind::Int, false, 8);
        let v = NumericValue::Int { re: 300, im: None };
        assert_eq!(v.render(&dt, OverflowBehavior::Saturate).unwrap(), "255");
    }

    #[test]
    fn render_rejects_float_fractional_bits() {
        let dt = DataType {
            fractional_bits: 4,
            ..DataType::scalar(BaseKind::Float, true, 32)
        };
        assert!(dt.validate().is_err());
    }

    #[test]
    fn round_trip_integer_vector() {
        let parsed = NumericValue::parse_vector("[1, -2, 3]").unwrap();
        let dt = DataType::scalar(BaseKind::Int, true, 32);
        let rendered: Vec<String> = parsed
            .iter()
            .map(|v| v.render(&dt, OverflowBehavior::Saturate).unwrap())
            .collect();
        assert_eq!(rendered, vec!["1", "-2", "3"]);
    }
}
