//! Error codes surfaced across the translation boundary
//!
//! The legacy API reports failures through a small set of HRESULT-style
//! codes. Callers on the far side of the ABI only ever see these values, so
//! every fallible operation in this crate resolves to one of them.

use thiserror::Error;

/// Legacy-convention error codes
///
/// Numeric values follow the D3D9 HRESULT convention so that handles passed
/// back across the translation boundary match what legacy callers expect.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum D3d9Error {
    /// Malformed or out-of-range caller parameters; no side effects occurred
    #[error("invalid call")]
    InvalidCall,

    /// The requested operation is not available on this adapter or device
    #[error("not available")]
    NotAvailable,

    /// Native memory allocation failed; partial objects were destroyed
    #[error("out of video memory")]
    OutOfVideoMemory,

    /// The output buffer was too small; a best-effort partial result was written
    #[error("more data available")]
    MoreData,
}

impl D3d9Error {
    /// Numeric HRESULT value of this error code
    pub fn hresult(self) -> u32 {
        match self {
            D3d9Error::InvalidCall => 0x8876_086C,
            D3d9Error::NotAvailable => 0x8876_086A,
            D3d9Error::OutOfVideoMemory => 0x8876_017C,
            D3d9Error::MoreData => 0x8876_0872,
        }
    }
}

/// Result type for operations surfaced to legacy callers
pub type D3d9Result<T> = Result<T, D3d9Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hresult_values_follow_legacy_convention() {
        assert_eq!(D3d9Error::InvalidCall.hresult(), 0x8876_086C);
        assert_eq!(D3d9Error::NotAvailable.hresult(), 0x8876_086A);
        assert_eq!(D3d9Error::OutOfVideoMemory.hresult(), 0x8876_017C);
        assert_eq!(D3d9Error::MoreData.hresult(), 0x8876_0872);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let codes = [
            D3d9Error::InvalidCall,
            D3d9Error::NotAvailable,
            D3d9Error::OutOfVideoMemory,
            D3d9Error::MoreData,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a.hresult(), b.hresult());
            }
        }
    }
}
