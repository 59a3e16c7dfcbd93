// SPDX-License-Identifier: (MIT OR Apache-2.0)

//! `MirType` → Cranelift type translation.
//!
//! Cranelift has no first-class aggregate type. `Struct` and `Time` values
//! are represented in a function's signature and in `Variable`s as a plain
//! `i64` pointer to heap storage laid out by [`StructLayout`]; `Function`
//! values compile away entirely (calls are resolved directly, see
//! `builder::lower_fcall`).

use cranelift::prelude::*;
use mimium_diagnostics::CodegenError;
use mimium_mir::MirType;

pub fn mir_to_cranelift_type(ty: &MirType) -> Result<Type, CodegenError> {
    match ty {
        MirType::Float => Ok(types::F64),
        MirType::Void => Ok(types::I64), // never loaded; placeholder so callers can treat it uniformly
        MirType::Function(..) => Ok(types::I64), // a function value is a {func_ptr, env_ptr} pair, itself behind a pointer
        MirType::Struct(_) => Ok(types::I64),
        MirType::Time(_) => Ok(types::I64),
    }
}

/// Byte layout of a `Struct(fields)` type: cumulative 8-byte-aligned offsets.
/// Every field occupies a full 8-byte slot — this backend does not pack
/// sub-word fields, trading density for a single, uniform load/store width.
pub struct StructLayout {
    pub offsets: Vec<u32>,
    pub size: u32,
}

impl StructLayout {
    pub fn of(fields: &[MirType]) -> Self {
        let offsets = (0..fields.len()).map(|i| i as u32 * 8).collect();
        StructLayout { offsets, size: fields.len() as u32 * 8 }
    }
}

/// Layout of a `Time(T)` value: `{ f64 timestamp; T value }`, value always
/// at offset 8 regardless of `T` (every lowered type is 8 bytes wide).
pub const TIME_TIMESTAMP_OFFSET: i32 = 0;
pub const TIME_VALUE_OFFSET: i32 = 8;
pub const TIME_SIZE: u32 = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_layout_packs_fields_in_eight_byte_slots() {
        let layout = StructLayout::of(&[MirType::Float, MirType::Float, MirType::Float]);
        assert_eq!(layout.offsets, vec![0, 8, 16]);
        assert_eq!(layout.size, 24);
    }

    #[test]
    fn float_lowers_to_f64() {
        assert_eq!(mir_to_cranelift_type(&MirType::Float).unwrap(), types::F64);
    }

    #[test]
    fn struct_and_time_lower_to_pointer_width() {
        assert_eq!(mir_to_cranelift_type(&MirType::Struct(vec![])).unwrap(), types::I64);
        assert_eq!(mir_to_cranelift_type(&MirType::time(MirType::Float)).unwrap(), types::I64);
    }
}
