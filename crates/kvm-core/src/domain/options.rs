//! Screen option codes.
//!
//! Options travel as flat `(code, value)` pairs.  A code is four ASCII bytes
//! packed big-endian into a `u32`, so `"XTXU"` is `0x5854_5855`.

/// Packs a four-character option name into its numeric code.
pub const fn option_code(name: &[u8; 4]) -> u32 {
    (name[0] as u32) << 24 | (name[1] as u32) << 16 | (name[2] as u32) << 8 | name[3] as u32
}

/// "XTest is Xinerama-unaware": fake pointer motion must use a direct
/// pointer warp on multi-head Xinerama setups.  Non-zero means `true`.
pub const OPTION_XTEST_XINERAMA_UNAWARE: u32 = option_code(b"XTXU");

/// Ordered list of `(code, value)` option pairs.
pub type OptionsList = Vec<(u32, i32)>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_code_packs_big_endian() {
        assert_eq!(OPTION_XTEST_XINERAMA_UNAWARE, 0x5854_5855);
        assert_eq!(option_code(b"XTXU").to_be_bytes(), *b"XTXU");
    }
}
