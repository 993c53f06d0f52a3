//! Uniform configuration record shared with the relaxation kernels.
//!
//! The byte layout is a contract with the WGSL side:
//!
//! ```text
//! offset  field            type
//!      0  grid_width       u32
//!      4  grid_height      u32
//!      8  sqrt2            f32
//!     12  inv_sqrt2        f32
//!     16  iterations_hint  u32
//!     20  early_out        u32
//!     24  _pad0            u32
//!     28  (tail padding to the 16-byte uniform rounding)
//! ```
//!
//! Serialization writes each field at its fixed offset in little-endian
//! order instead of relying on the host struct layout.

/// Bytes carried by the seven fields.
pub const UNIFORM_FIELDS_SIZE: usize = 7 * 4;

/// Size of the uniform buffer, rounded up to the uniform address space
/// alignment.
pub const UNIFORM_BUFFER_SIZE: usize = 32;

const OFFSET_GRID_WIDTH: usize = 0;
const OFFSET_GRID_HEIGHT: usize = 4;
const OFFSET_SQRT2: usize = 8;
const OFFSET_INV_SQRT2: usize = 12;
const OFFSET_ITERATIONS_HINT: usize = 16;
const OFFSET_EARLY_OUT: usize = 20;
const OFFSET_PAD0: usize = 24;

const _: () = assert!(OFFSET_PAD0 + 4 == UNIFORM_FIELDS_SIZE);
const _: () = assert!(UNIFORM_FIELDS_SIZE == 28);
const _: () = assert!(UNIFORM_BUFFER_SIZE % 16 == 0 && UNIFORM_BUFFER_SIZE >= UNIFORM_FIELDS_SIZE);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelaxUniforms {
    pub grid_width: u32,
    pub grid_height: u32,
    pub sqrt2: f32,
    pub inv_sqrt2: f32,
    /// Inner-iteration hint for tiled kernels.  Does not change the number
    /// of host-issued dispatches.
    pub iterations_hint: u32,
    pub early_out: bool,
}

impl RelaxUniforms {
    pub fn new(grid_size: u32, iterations_hint: u32, early_out: bool) -> Self {
        Self {
            grid_width: grid_size,
            grid_height: grid_size,
            sqrt2: std::f32::consts::SQRT_2,
            inv_sqrt2: std::f32::consts::FRAC_1_SQRT_2,
            iterations_hint,
            early_out,
        }
    }

    pub fn to_bytes(&self) -> [u8; UNIFORM_BUFFER_SIZE] {
        let mut out = [0u8; UNIFORM_BUFFER_SIZE];
        put(&mut out, OFFSET_GRID_WIDTH, self.grid_width.to_le_bytes());
        put(&mut out, OFFSET_GRID_HEIGHT, self.grid_height.to_le_bytes());
        put(&mut out, OFFSET_SQRT2, self.sqrt2.to_le_bytes());
        put(&mut out, OFFSET_INV_SQRT2, self.inv_sqrt2.to_le_bytes());
        put(&mut out, OFFSET_ITERATIONS_HINT, self.iterations_hint.to_le_bytes());
        put(&mut out, OFFSET_EARLY_OUT, u32::from(self.early_out).to_le_bytes());
        put(&mut out, OFFSET_PAD0, 0u32.to_le_bytes());
        out
    }
}

fn put(out: &mut [u8], offset: usize, bytes: [u8; 4]) {
    out[offset..offset + 4].copy_from_slice(&bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(bytes: &[u8], offset: usize) -> [u8; 4] {
        bytes[offset..offset + 4].try_into().unwrap()
    }

    #[test]
    fn fields_land_at_fixed_offsets() {
        let bytes = RelaxUniforms::new(2048, 1000, true).to_bytes();
        assert_eq!(bytes.len(), 32);
        assert_eq!(u32::from_le_bytes(word(&bytes, 0)), 2048);
        assert_eq!(u32::from_le_bytes(word(&bytes, 4)), 2048);
        assert_eq!(f32::from_le_bytes(word(&bytes, 8)), std::f32::consts::SQRT_2);
        assert_eq!(f32::from_le_bytes(word(&bytes, 12)), std::f32::consts::FRAC_1_SQRT_2);
        assert_eq!(u32::from_le_bytes(word(&bytes, 16)), 1000);
        assert_eq!(u32::from_le_bytes(word(&bytes, 20)), 1);
        assert_eq!(&bytes[24..], &[0u8; 8]);
    }

    #[test]
    fn early_out_disabled_encodes_zero() {
        let bytes = RelaxUniforms::new(8, 1, false).to_bytes();
        assert_eq!(u32::from_le_bytes(word(&bytes, 20)), 0);
    }
}
