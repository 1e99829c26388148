//! Process exit codes
//!
//! Scripts can branch on these without parsing error messages.

use ca_core::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    /// Bad arguments or an unparsable path
    UsageError = 2,
    /// Transport failures and unexpected server answers
    NetworkError = 3,
    /// Credentials rejected or permission denied
    AuthError = 4,
    NotFound = 5,
    /// Target exists and replacing it was not allowed
    Conflict = 6,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a provider failure onto an exit code
    pub fn from_error(error: &Error) -> Self {
        match error {
            Error::Unauthorized | Error::Forbidden => ExitCode::AuthError,
            Error::NotFound(_) => ExitCode::NotFound,
            Error::AlreadyExists(_) => ExitCode::Conflict,
            Error::InsufficientStorage | Error::ServerNotCompatible(_) | Error::Backend { .. } => {
                ExitCode::NetworkError
            }
            Error::InvalidPath(_) => ExitCode::UsageError,
            Error::Config(_) | Error::Io(_) => ExitCode::GeneralError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::Conflict.as_i32(), 6);
    }

    #[test]
    fn test_from_error() {
        assert_eq!(ExitCode::from_error(&Error::Unauthorized), ExitCode::AuthError);
        assert_eq!(ExitCode::from_error(&Error::Forbidden), ExitCode::AuthError);
        assert_eq!(
            ExitCode::from_error(&Error::NotFound("/a".into())),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from_error(&Error::AlreadyExists("/a".into())),
            ExitCode::Conflict
        );
        assert_eq!(ExitCode::from_error(&Error::status(500)), ExitCode::NetworkError);
        assert_eq!(
            ExitCode::from_error(&Error::InvalidPath("..".into())),
            ExitCode::UsageError
        );
        assert_eq!(
            ExitCode::from_error(&Error::Config("broken".into())),
            ExitCode::GeneralError
        );
    }
}
