//! Status codes reported across the driver interface.

use core::fmt;

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(u32)]
pub enum StatusCode {
    Success = 0,
    Failed = 1,
    IncorrectVersion = 2,
    IncorrectParameter = 3,
    IncorrectSlot = 4,
    IncorrectObject = 5,
    InsufficientSpace = 6,
    NotImplemented = 7,
    NotSupported = 8,
    NotInitialized = 9,
    OutOfMemory = 10,
    ReportNotReady = 11,
    ReportLost = 12,
    ReportInconsistent = 13,
}

impl StatusCode {
    pub const fn is_success(self) -> bool {
        matches!(self, StatusCode::Success)
    }

    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::FieldOverflow { .. }
            | Error::MisalignedAddress { .. }
            | Error::AddressOutOfRange { .. }
            | Error::AluInstructionCount { .. }
            | Error::InvalidAluInstruction { .. }
            | Error::InvalidRegisterIndex { .. }
            | Error::TooManyRegisters { .. } => StatusCode::IncorrectParameter,
            Error::UnsupportedField { .. } | Error::UnsupportedByExecutor(_) => StatusCode::NotSupported,
            Error::EmptyBuffer
            | Error::UnknownCommand { .. }
            | Error::UnexpectedCommand { .. }
            | Error::BadLength { .. }
            | Error::Truncated { .. }
            | Error::UnalignedLength { .. } => StatusCode::IncorrectObject,
            Error::InsufficientSpace { .. } | Error::ReportTooSmall { .. } => StatusCode::InsufficientSpace,
            Error::ReportNotReady { .. } => StatusCode::ReportNotReady,
            Error::ReportInconsistent(_) => StatusCode::ReportInconsistent,
            Error::Memory { .. } => StatusCode::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_to_status_codes() {
        assert_eq!(
            Error::InsufficientSpace { needed: 8, available: 4 }.status_code(),
            StatusCode::InsufficientSpace
        );
        assert_eq!(Error::ReportNotReady { found: 0 }.status_code(), StatusCode::ReportNotReady);
        assert_eq!(
            Error::UnsupportedByExecutor("store data index").status_code(),
            StatusCode::NotSupported
        );
        assert_eq!(StatusCode::ReportInconsistent.as_u32(), 13);
        assert!(StatusCode::Success.is_success());
    }
}
