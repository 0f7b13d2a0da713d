//! Closed enumeration of supported scalar/vector/array element types.
//!
//! Mirrors the `Datatype` enum of the openPMD standard: every [`Attribute`]
//! value and every [`RecordComponent`] dataset carries exactly one of these
//! tags, and the tag determines serialized size, signedness, and which
//! conversions [`crate::attribute::Attribute::get`] will allow.
//!
//! [`Attribute`]: crate::attribute::Attribute
//! [`RecordComponent`]: crate::record_component::RecordComponent

use std::fmt;

/// Concrete datatype of an object available at runtime.
///
/// Two tags are sentinels rather than real storage types:
/// [`Datatype::Undefined`] (never written, means "not yet known") and
/// [`Datatype::Datatype`] (a type tag stored as a value, used by backends
/// that persist `Datatype` itself as attribute metadata). [`to_bytes`] and
/// [`to_bits`] are undefined for both.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[non_exhaustive]
pub enum Datatype {
    Char,
    Uchar,
    Short,
    Int,
    Long,
    Longlong,
    Ushort,
    Uint,
    Ulong,
    Ulonglong,
    Float,
    Double,
    LongDouble,
    Cfloat,
    Cdouble,
    ClongDouble,
    String,
    VecChar,
    VecShort,
    VecInt,
    VecLong,
    VecLonglong,
    VecUchar,
    VecUshort,
    VecUint,
    VecUlong,
    VecUlonglong,
    VecFloat,
    VecDouble,
    VecLongDouble,
    VecCfloat,
    VecCdouble,
    VecClongDouble,
    VecString,
    ArrDbl7,
    Bool,
    /// A value that is itself a `Datatype` tag.
    Datatype,
    /// Not yet determined.
    Undefined,
}

/// All concrete (non-sentinel) datatypes, in declaration order.
pub const ALL_DATATYPES: &[Datatype] = &[
    Datatype::Char,
    Datatype::Uchar,
    Datatype::Short,
    Datatype::Int,
    Datatype::Long,
    Datatype::Longlong,
    Datatype::Ushort,
    Datatype::Uint,
    Datatype::Ulong,
    Datatype::Ulonglong,
    Datatype::Float,
    Datatype::Double,
    Datatype::LongDouble,
    Datatype::Cfloat,
    Datatype::Cdouble,
    Datatype::ClongDouble,
    Datatype::String,
    Datatype::VecChar,
    Datatype::VecShort,
    Datatype::VecInt,
    Datatype::VecLong,
    Datatype::VecLonglong,
    Datatype::VecUchar,
    Datatype::VecUshort,
    Datatype::VecUint,
    Datatype::VecUlong,
    Datatype::VecUlonglong,
    Datatype::VecFloat,
    Datatype::VecDouble,
    Datatype::VecLongDouble,
    Datatype::VecCfloat,
    Datatype::VecCdouble,
    Datatype::VecClongDouble,
    Datatype::VecString,
    Datatype::ArrDbl7,
    Datatype::Bool,
];

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(datatype_to_string(*self))
    }
}

/// Number of bytes a single element of `d` occupies.
///
/// # Errors
/// Returns `None` for [`Datatype::Undefined`] and [`Datatype::Datatype`],
/// which do not have a fixed in-memory representation.
pub fn to_bytes(d: Datatype) -> Option<usize> {
    use Datatype::*;
    Some(match d {
        Char | VecChar | String | VecString => std::mem::size_of::<i8>(),
        Uchar | VecUchar => std::mem::size_of::<u8>(),
        Short | VecShort => std::mem::size_of::<i16>(),
        Int | VecInt => std::mem::size_of::<i32>(),
        Long | VecLong => std::mem::size_of::<i64>(),
        Longlong | VecLonglong => std::mem::size_of::<i64>(),
        Ushort | VecUshort => std::mem::size_of::<u16>(),
        Uint | VecUint => std::mem::size_of::<u32>(),
        Ulong | VecUlong => std::mem::size_of::<u64>(),
        Ulonglong | VecUlonglong => std::mem::size_of::<u64>(),
        Float | VecFloat => std::mem::size_of::<f32>(),
        Double | VecDouble | ArrDbl7 => std::mem::size_of::<f64>(),
        LongDouble | VecLongDouble => 16,
        Cfloat | VecCfloat => std::mem::size_of::<f32>() * 2,
        Cdouble | VecCdouble => std::mem::size_of::<f64>() * 2,
        ClongDouble | VecClongDouble => 16 * 2,
        Bool => std::mem::size_of::<bool>(),
        Datatype | Undefined => return None,
    })
}

/// Number of bits a single element of `d` occupies (`8 * to_bytes(d)`).
pub fn to_bits(d: Datatype) -> Option<usize> {
    to_bytes(d).map(|b| b * 8)
}

/// Whether `d` is one of the `Vec*` variants.
pub fn is_vector(d: Datatype) -> bool {
    use Datatype::*;
    matches!(
        d,
        VecChar
            | VecShort
            | VecInt
            | VecLong
            | VecLonglong
            | VecUchar
            | VecUshort
            | VecUint
            | VecUlong
            | VecUlonglong
            | VecFloat
            | VecDouble
            | VecLongDouble
            | VecCfloat
            | VecCdouble
            | VecClongDouble
            | VecString
    )
}

/// Whether `d` is a (real) floating-point type, scalar or vector.
///
/// Complex floating-point types are excluded; see
/// [`is_complex_floating_point`].
pub fn is_floating_point(d: Datatype) -> bool {
    use Datatype::*;
    matches!(
        d,
        Float | VecFloat | Double | VecDouble | LongDouble | VecLongDouble
    )
}

/// Whether `d` is a complex floating-point type, scalar or vector.
pub fn is_complex_floating_point(d: Datatype) -> bool {
    use Datatype::*;
    matches!(
        d,
        Cfloat | VecCfloat | Cdouble | VecCdouble | ClongDouble | VecClongDouble
    )
}

/// Whether `d` is an integer type, and if so, whether it is signed.
///
/// Unlike `std::is_integral`, `bool` and the character types are not
/// considered integers here.
pub fn is_integer(d: Datatype) -> (bool, bool) {
    use Datatype::*;
    match d {
        Short | VecShort | Int | VecInt | Long | VecLong | Longlong | VecLonglong => (true, true),
        Ushort | VecUshort | Uint | VecUint | Ulong | VecUlong | Ulonglong | VecUlonglong => {
            (true, false)
        }
        _ => (false, false),
    }
}

/// Strip the vector/array outer level, returning the underlying scalar
/// datatype. `ArrDbl7` strips to `Double`; scalar types are the identity.
pub fn basic_datatype(d: Datatype) -> Datatype {
    use Datatype::*;
    match d {
        VecChar => Char,
        VecShort => Short,
        VecInt => Int,
        VecLong => Long,
        VecLonglong => Longlong,
        VecUchar => Uchar,
        VecUshort => Ushort,
        VecUint => Uint,
        VecUlong => Ulong,
        VecUlonglong => Ulonglong,
        VecFloat => Float,
        VecDouble => Double,
        VecLongDouble => LongDouble,
        VecCfloat => Cfloat,
        VecCdouble => Cdouble,
        VecClongDouble => ClongDouble,
        VecString => String,
        ArrDbl7 => Double,
        other => other,
    }
}

/// Promote a scalar datatype to its vector counterpart. Already-vector
/// types (and the sentinels) are returned unchanged.
pub fn to_vector_type(d: Datatype) -> Datatype {
    use Datatype::*;
    match d {
        Char => VecChar,
        Short => VecShort,
        Int => VecInt,
        Long => VecLong,
        Longlong => VecLonglong,
        Uchar => VecUchar,
        Ushort => VecUshort,
        Uint => VecUint,
        Ulong => VecUlong,
        Ulonglong => VecUlonglong,
        Float => VecFloat,
        Double => VecDouble,
        LongDouble => VecLongDouble,
        Cfloat => VecCfloat,
        Cdouble => VecCdouble,
        ClongDouble => VecClongDouble,
        String => VecString,
        other => other,
    }
}

/// Fundamental equivalence check for two datatypes.
///
/// Besides exact equality, this also identifies types that share
/// bit-width, signedness and vector-ness even when their tags differ
/// (the way `long` and `long long` compare equal on platforms where they
/// have an identical representation).
pub fn is_same(d: Datatype, e: Datatype) -> bool {
    if d == e {
        return true;
    }
    if is_vector(d) != is_vector(e) {
        return false;
    }
    let (d_int, d_sig) = is_integer(d);
    let (e_int, e_sig) = is_integer(e);
    if d_int && e_int {
        return d_sig == e_sig && to_bits(d) == to_bits(e);
    }
    if is_floating_point(d) && is_floating_point(e) {
        return to_bits(d) == to_bits(e);
    }
    if is_complex_floating_point(d) && is_complex_floating_point(e) {
        return to_bits(d) == to_bits(e);
    }
    false
}

/// Canonical name of a datatype, as used in configuration and diagnostics.
pub fn datatype_to_string(d: Datatype) -> &'static str {
    use Datatype::*;
    match d {
        Char => "CHAR",
        Uchar => "UCHAR",
        Short => "SHORT",
        Int => "INT",
        Long => "LONG",
        Longlong => "LONGLONG",
        Ushort => "USHORT",
        Uint => "UINT",
        Ulong => "ULONG",
        Ulonglong => "ULONGLONG",
        Float => "FLOAT",
        Double => "DOUBLE",
        LongDouble => "LONG_DOUBLE",
        Cfloat => "CFLOAT",
        Cdouble => "CDOUBLE",
        ClongDouble => "CLONG_DOUBLE",
        String => "STRING",
        VecChar => "VEC_CHAR",
        VecShort => "VEC_SHORT",
        VecInt => "VEC_INT",
        VecLong => "VEC_LONG",
        VecLonglong => "VEC_LONGLONG",
        VecUchar => "VEC_UCHAR",
        VecUshort => "VEC_USHORT",
        VecUint => "VEC_UINT",
        VecUlong => "VEC_ULONG",
        VecUlonglong => "VEC_ULONGLONG",
        VecFloat => "VEC_FLOAT",
        VecDouble => "VEC_DOUBLE",
        VecLongDouble => "VEC_LONG_DOUBLE",
        VecCfloat => "VEC_CFLOAT",
        VecCdouble => "VEC_CDOUBLE",
        VecClongDouble => "VEC_CLONG_DOUBLE",
        VecString => "VEC_STRING",
        ArrDbl7 => "ARR_DBL_7",
        Bool => "BOOL",
        Datatype::Datatype => "DATATYPE",
        Undefined => "UNDEFINED",
    }
}

/// Parse a canonical datatype name (as produced by [`datatype_to_string`]).
pub fn string_to_datatype(s: &str) -> Option<Datatype> {
    use Datatype::*;
    Some(match s {
        "CHAR" => Char,
        "UCHAR" => Uchar,
        "SHORT" => Short,
        "INT" => Int,
        "LONG" => Long,
        "LONGLONG" => Longlong,
        "USHORT" => Ushort,
        "UINT" => Uint,
        "ULONG" => Ulong,
        "ULONGLONG" => Ulonglong,
        "FLOAT" => Float,
        "DOUBLE" => Double,
        "LONG_DOUBLE" => LongDouble,
        "CFLOAT" => Cfloat,
        "CDOUBLE" => Cdouble,
        "CLONG_DOUBLE" => ClongDouble,
        "STRING" => String,
        "VEC_CHAR" => VecChar,
        "VEC_SHORT" => VecShort,
        "VEC_INT" => VecInt,
        "VEC_LONG" => VecLong,
        "VEC_LONGLONG" => VecLonglong,
        "VEC_UCHAR" => VecUchar,
        "VEC_USHORT" => VecUshort,
        "VEC_UINT" => VecUint,
        "VEC_ULONG" => VecUlong,
        "VEC_ULONGLONG" => VecUlonglong,
        "VEC_FLOAT" => VecFloat,
        "VEC_DOUBLE" => VecDouble,
        "VEC_LONG_DOUBLE" => VecLongDouble,
        "VEC_CFLOAT" => VecCfloat,
        "VEC_CDOUBLE" => VecCdouble,
        "VEC_CLONG_DOUBLE" => VecClongDouble,
        "VEC_STRING" => VecString,
        "ARR_DBL_7" => ArrDbl7,
        "BOOL" => Bool,
        "DATATYPE" => Datatype::Datatype,
        "UNDEFINED" => Undefined,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_bytes_undefined_and_datatype_are_none() {
        assert_eq!(to_bytes(Datatype::Undefined), None);
        assert_eq!(to_bytes(Datatype::Datatype), None);
    }

    #[test]
    fn to_bytes_matches_rust_primitive_sizes() {
        assert_eq!(to_bytes(Datatype::Int), Some(4));
        assert_eq!(to_bytes(Datatype::Double), Some(8));
        assert_eq!(to_bytes(Datatype::Cdouble), Some(16));
        assert_eq!(to_bits(Datatype::Int), Some(32));
    }

    #[test]
    fn is_same_identifies_identical_bitwidth_signed_integers() {
        // On every platform relevant here, Long and Longlong share bit
        // width and signedness, matching the openPMD `isSame` contract.
        assert!(is_same(Datatype::Long, Datatype::Longlong));
        assert!(!is_same(Datatype::Long, Datatype::Ulong));
        assert!(!is_same(Datatype::Int, Datatype::Long));
    }

    #[test]
    fn is_same_distinguishes_vector_from_scalar() {
        assert!(!is_same(Datatype::Int, Datatype::VecInt));
    }

    #[test]
    fn basic_datatype_strips_vector_and_array() {
        assert_eq!(basic_datatype(Datatype::VecFloat), Datatype::Float);
        assert_eq!(basic_datatype(Datatype::ArrDbl7), Datatype::Double);
        assert_eq!(basic_datatype(Datatype::Int), Datatype::Int);
    }

    #[test]
    fn to_vector_type_promotes_scalars() {
        assert_eq!(to_vector_type(Datatype::Double), Datatype::VecDouble);
        assert_eq!(to_vector_type(Datatype::VecDouble), Datatype::VecDouble);
    }

    #[test]
    fn string_roundtrip_covers_every_concrete_datatype() {
        for &d in ALL_DATATYPES {
            let s = datatype_to_string(d);
            assert_eq!(string_to_datatype(s), Some(d), "roundtrip failed for {s}");
        }
    }

    #[test]
    fn is_integer_reports_signedness() {
        assert_eq!(is_integer(Datatype::Int), (true, true));
        assert_eq!(is_integer(Datatype::Uint), (true, false));
        assert_eq!(is_integer(Datatype::Bool), (false, false));
        assert_eq!(is_integer(Datatype::Char), (false, false));
    }
}
