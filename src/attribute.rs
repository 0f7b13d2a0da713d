//! Tagged value holding any [`Datatype`] instance, plus the conversion
//! rules a caller's requested type must satisfy against the stored type.
//!
//! Grounded on the closed-enum-of-scalar-widths style of
//! `storage_v2::types::SegmentType`/`NodeRecordV2` in the teacher, but the
//! conversion matrix itself is openPMD-specific (§4.1 of the
//! specification): scalar widening, vector elementwise casts, and the
//! scalar/vector/fixed-array interconversions.

use crate::complex::{Complex32, Complex64};
use crate::datatype::Datatype;
use crate::error::{Error, ReadErrorKind, ReadTarget, Result};

/// The value held by an [`Attribute`], one variant per concrete
/// [`Datatype`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum AttributeValue {
    Char(i8),
    Uchar(u8),
    Short(i16),
    Int(i32),
    Long(i64),
    Longlong(i64),
    Ushort(u16),
    Uint(u32),
    Ulong(u64),
    Ulonglong(u64),
    Float(f32),
    Double(f64),
    LongDouble(f64),
    Cfloat(Complex32),
    Cdouble(Complex64),
    ClongDouble(Complex64),
    String(String),
    VecChar(Vec<i8>),
    VecShort(Vec<i16>),
    VecInt(Vec<i32>),
    VecLong(Vec<i64>),
    VecLonglong(Vec<i64>),
    VecUchar(Vec<u8>),
    VecUshort(Vec<u16>),
    VecUint(Vec<u32>),
    VecUlong(Vec<u64>),
    VecUlonglong(Vec<u64>),
    VecFloat(Vec<f32>),
    VecDouble(Vec<f64>),
    VecLongDouble(Vec<f64>),
    VecCfloat(Vec<Complex32>),
    VecCdouble(Vec<Complex64>),
    VecClongDouble(Vec<Complex64>),
    VecString(Vec<String>),
    ArrDbl7([f64; 7]),
    Bool(bool),
    Datatype(Datatype),
}

impl AttributeValue {
    /// The [`Datatype`] tag of this value.
    pub fn dtype(&self) -> Datatype {
        use AttributeValue::*;
        match self {
            Char(_) => Datatype::Char,
            Uchar(_) => Datatype::Uchar,
            Short(_) => Datatype::Short,
            Int(_) => Datatype::Int,
            Long(_) => Datatype::Long,
            Longlong(_) => Datatype::Longlong,
            Ushort(_) => Datatype::Ushort,
            Uint(_) => Datatype::Uint,
            Ulong(_) => Datatype::Ulong,
            Ulonglong(_) => Datatype::Ulonglong,
            Float(_) => Datatype::Float,
            Double(_) => Datatype::Double,
            LongDouble(_) => Datatype::LongDouble,
            Cfloat(_) => Datatype::Cfloat,
            Cdouble(_) => Datatype::Cdouble,
            ClongDouble(_) => Datatype::ClongDouble,
            String(_) => Datatype::String,
            VecChar(_) => Datatype::VecChar,
            VecShort(_) => Datatype::VecShort,
            VecInt(_) => Datatype::VecInt,
            VecLong(_) => Datatype::VecLong,
            VecLonglong(_) => Datatype::VecLonglong,
            VecUchar(_) => Datatype::VecUchar,
            VecUshort(_) => Datatype::VecUshort,
            VecUint(_) => Datatype::VecUint,
            VecUlong(_) => Datatype::VecUlong,
            VecUlonglong(_) => Datatype::VecUlonglong,
            VecFloat(_) => Datatype::VecFloat,
            VecDouble(_) => Datatype::VecDouble,
            VecLongDouble(_) => Datatype::VecLongDouble,
            VecCfloat(_) => Datatype::VecCfloat,
            VecCdouble(_) => Datatype::VecCdouble,
            VecClongDouble(_) => Datatype::VecClongDouble,
            VecString(_) => Datatype::VecString,
            ArrDbl7(_) => Datatype::ArrDbl7,
            Bool(_) => Datatype::Bool,
            AttributeValue::Datatype(_) => Datatype::Datatype,
        }
    }
}

/// Variadic value holding any of the openPMD [`Datatype`]s.
///
/// Construct via `Attribute::from(value)` for any type with a matching
/// `AttributeValue` variant, and read back via [`Attribute::get`], which
/// applies the conversion rules of §4.1: identical type, scalar
/// widening/narrowing, elementwise vector conversion, scalar-to-1-element
/// vector, and fixed-array/vector interconversion for the 7-element
/// `unitDimension` array.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Attribute(AttributeValue);

impl Attribute {
    pub fn new(value: impl Into<AttributeValue>) -> Self {
        Attribute(value.into())
    }

    pub fn dtype(&self) -> Datatype {
        self.0.dtype()
    }

    pub fn value(&self) -> &AttributeValue {
        &self.0
    }

    /// Retrieve the stored value, converted to `U` if the stored type and
    /// `U` satisfy one of the conversion rules in §4.1. Otherwise, fails
    /// with a type-mismatch [`Error::Read`] naming both the stored and
    /// requested type.
    pub fn get<U: FromAttribute>(&self) -> Result<U> {
        U::from_attribute(&self.0).map_err(|what| {
            Error::read(
                ReadErrorKind::UnexpectedContent,
                ReadTarget::Attribute,
                "",
                format!(
                    "stored type {} cannot be converted to {}: {what}",
                    self.0.dtype(),
                    std::any::type_name::<U>()
                ),
            )
        })
    }

    /// Like [`Attribute::get`], but returns `None` instead of an error
    /// when the conversion is not allowed.
    pub fn get_optional<U: FromAttribute>(&self) -> Option<U> {
        U::from_attribute(&self.0).ok()
    }
}

/// Implemented for every Rust type that [`Attribute::get`] can produce.
///
/// `from_attribute` returns `Err(message)` rather than [`crate::error::Error`]
/// directly so that callers with more context (an [`Attribute`] does not
/// know its own path) can wrap it appropriately.
pub trait FromAttribute: Sized {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String>;
}

fn extract_integer(v: &AttributeValue) -> Option<i128> {
    use AttributeValue::*;
    Some(match *v {
        Char(x) => x as i128,
        Uchar(x) => x as i128,
        Short(x) => x as i128,
        Int(x) => x as i128,
        Long(x) => x as i128,
        Longlong(x) => x as i128,
        Ushort(x) => x as i128,
        Uint(x) => x as i128,
        Ulong(x) => x as i128,
        Ulonglong(x) => x as i128,
        Bool(x) => x as i128,
        _ => return None,
    })
}

fn extract_float(v: &AttributeValue) -> Option<f64> {
    use AttributeValue::*;
    Some(match *v {
        Float(x) => x as f64,
        Double(x) => x,
        LongDouble(x) => x,
        _ => return None,
    })
}

fn extract_integer_vec(v: &AttributeValue) -> Option<Vec<i128>> {
    use AttributeValue::*;
    match v {
        VecChar(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecUchar(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecShort(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecInt(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecLong(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecLonglong(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecUshort(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecUint(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecUlong(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        VecUlonglong(xs) => Some(xs.iter().map(|&x| x as i128).collect()),
        // rule (d): scalar -> 1-element vector
        _ => extract_integer(v).map(|x| vec![x]),
    }
}

fn extract_float_vec(v: &AttributeValue) -> Option<Vec<f64>> {
    use AttributeValue::*;
    match v {
        VecFloat(xs) => Some(xs.iter().map(|&x| x as f64).collect()),
        VecDouble(xs) => Some(xs.clone()),
        VecLongDouble(xs) => Some(xs.clone()),
        // rule (e): fixed array -> vector
        ArrDbl7(arr) => Some(arr.to_vec()),
        // rule (d): scalar -> 1-element vector
        _ => extract_float(v).map(|x| vec![x]),
    }
}

fn conversion_err(what: &str) -> String {
    what.to_string()
}

macro_rules! impl_from_attribute_integer {
    ($t:ty) => {
        impl FromAttribute for $t {
            fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
                if let Some(i) = extract_integer(v) {
                    return Ok(i as $t);
                }
                if let Some(f) = extract_float(v) {
                    return Ok(f as $t);
                }
                Err(conversion_err("not a scalar numeric value"))
            }
        }
    };
}

impl_from_attribute_integer!(i8);
impl_from_attribute_integer!(u8);
impl_from_attribute_integer!(i16);
impl_from_attribute_integer!(u16);
impl_from_attribute_integer!(i32);
impl_from_attribute_integer!(u32);
impl_from_attribute_integer!(i64);
impl_from_attribute_integer!(u64);
impl_from_attribute_integer!(i128);
impl_from_attribute_integer!(u128);

macro_rules! impl_from_attribute_float {
    ($t:ty) => {
        impl FromAttribute for $t {
            fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
                if let Some(f) = extract_float(v) {
                    return Ok(f as $t);
                }
                if let Some(i) = extract_integer(v) {
                    return Ok(i as $t);
                }
                Err(conversion_err("not a scalar numeric value"))
            }
        }
    };
}

impl_from_attribute_float!(f32);
impl_from_attribute_float!(f64);

impl FromAttribute for bool {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::Bool(b) => Ok(*b),
            _ => extract_integer(v)
                .map(|i| i != 0)
                .ok_or_else(|| conversion_err("not a bool-convertible value")),
        }
    }
}

impl FromAttribute for String {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::String(s) => Ok(s.clone()),
            _ => Err(conversion_err("not a string")),
        }
    }
}

impl FromAttribute for Datatype {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::Datatype(d) => Ok(*d),
            _ => Err(conversion_err("not a Datatype value")),
        }
    }
}

impl FromAttribute for Complex32 {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::Cfloat(c) => Ok(*c),
            _ => Err(conversion_err("not a CFLOAT value")),
        }
    }
}

impl FromAttribute for Complex64 {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::Cdouble(c) => Ok(*c),
            AttributeValue::ClongDouble(c) => Ok(*c),
            AttributeValue::Cfloat(c) => Ok((*c).into()),
            _ => Err(conversion_err("not a complex floating-point value")),
        }
    }
}

macro_rules! impl_from_attribute_vec_integer {
    ($t:ty) => {
        impl FromAttribute for Vec<$t> {
            fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
                if let Some(vals) = extract_integer_vec(v) {
                    return Ok(vals.into_iter().map(|x| x as $t).collect());
                }
                if let Some(vals) = extract_float_vec(v) {
                    return Ok(vals.into_iter().map(|x| x as $t).collect());
                }
                Err(conversion_err("not a numeric vector"))
            }
        }
    };
}

impl_from_attribute_vec_integer!(i8);
impl_from_attribute_vec_integer!(u8);
impl_from_attribute_vec_integer!(i16);
impl_from_attribute_vec_integer!(u16);
impl_from_attribute_vec_integer!(i32);
impl_from_attribute_vec_integer!(u32);
impl_from_attribute_vec_integer!(i64);
impl_from_attribute_vec_integer!(u64);

macro_rules! impl_from_attribute_vec_float {
    ($t:ty) => {
        impl FromAttribute for Vec<$t> {
            fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
                if let Some(vals) = extract_float_vec(v) {
                    return Ok(vals.into_iter().map(|x| x as $t).collect());
                }
                if let Some(vals) = extract_integer_vec(v) {
                    return Ok(vals.into_iter().map(|x| x as $t).collect());
                }
                Err(conversion_err("not a numeric vector"))
            }
        }
    };
}

impl_from_attribute_vec_float!(f32);
impl_from_attribute_vec_float!(f64);

impl FromAttribute for Vec<String> {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::VecString(xs) => Ok(xs.clone()),
            // rule (d): scalar -> 1-element vector
            AttributeValue::String(s) => Ok(vec![s.clone()]),
            _ => Err(conversion_err("not a string vector")),
        }
    }
}

impl FromAttribute for Vec<Complex32> {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::VecCfloat(xs) => Ok(xs.clone()),
            AttributeValue::Cfloat(c) => Ok(vec![*c]),
            _ => Err(conversion_err("not a CFLOAT vector")),
        }
    }
}

impl FromAttribute for Vec<Complex64> {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::VecCdouble(xs) => Ok(xs.clone()),
            AttributeValue::VecClongDouble(xs) => Ok(xs.clone()),
            AttributeValue::VecCfloat(xs) => Ok(xs.iter().map(|&c| c.into()).collect()),
            AttributeValue::Cdouble(c) => Ok(vec![*c]),
            AttributeValue::ClongDouble(c) => Ok(vec![*c]),
            AttributeValue::Cfloat(c) => Ok(vec![(*c).into()]),
            _ => Err(conversion_err("not a complex floating-point vector")),
        }
    }
}

/// `unitDimension`: the fixed 7-element array of SI base exponents.
impl FromAttribute for [f64; 7] {
    fn from_attribute(v: &AttributeValue) -> std::result::Result<Self, String> {
        match v {
            AttributeValue::ArrDbl7(arr) => Ok(*arr),
            // rule (e): vector -> fixed array, length must match
            AttributeValue::VecDouble(xs) if xs.len() == 7 => {
                let mut arr = [0.0; 7];
                arr.copy_from_slice(xs);
                Ok(arr)
            }
            AttributeValue::VecDouble(xs) => Err(conversion_err(&format!(
                "vector to array conversion needs length 7, got {}",
                xs.len()
            ))),
            _ => Err(conversion_err("not convertible to a 7-element double array")),
        }
    }
}

macro_rules! impl_into_attribute_value {
    ($t:ty, $variant:ident) => {
        impl From<$t> for AttributeValue {
            fn from(v: $t) -> Self {
                AttributeValue::$variant(v)
            }
        }
        impl From<$t> for Attribute {
            fn from(v: $t) -> Self {
                Attribute::new(v)
            }
        }
    };
}

impl_into_attribute_value!(i8, Char);
impl_into_attribute_value!(u8, Uchar);
impl_into_attribute_value!(i16, Short);
impl_into_attribute_value!(i32, Int);
impl_into_attribute_value!(i64, Long);
impl_into_attribute_value!(u16, Ushort);
impl_into_attribute_value!(u32, Uint);
impl_into_attribute_value!(u64, Ulong);
impl_into_attribute_value!(f32, Float);
impl_into_attribute_value!(f64, Double);
impl_into_attribute_value!(bool, Bool);
impl_into_attribute_value!(String, String);
impl_into_attribute_value!(Complex32, Cfloat);
impl_into_attribute_value!(Complex64, Cdouble);
impl_into_attribute_value!(Vec<i8>, VecChar);
impl_into_attribute_value!(Vec<u8>, VecUchar);
impl_into_attribute_value!(Vec<i16>, VecShort);
impl_into_attribute_value!(Vec<i32>, VecInt);
impl_into_attribute_value!(Vec<i64>, VecLong);
impl_into_attribute_value!(Vec<u16>, VecUshort);
impl_into_attribute_value!(Vec<u32>, VecUint);
impl_into_attribute_value!(Vec<u64>, VecUlong);
impl_into_attribute_value!(Vec<f32>, VecFloat);
impl_into_attribute_value!(Vec<f64>, VecDouble);
impl_into_attribute_value!(Vec<String>, VecString);
impl_into_attribute_value!(Vec<Complex32>, VecCfloat);
impl_into_attribute_value!(Vec<Complex64>, VecCdouble);
impl_into_attribute_value!([f64; 7], ArrDbl7);
impl_into_attribute_value!(Datatype, Datatype);

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}
impl From<&str> for Attribute {
    fn from(v: &str) -> Self {
        Attribute::new(v.to_string())
    }
}
