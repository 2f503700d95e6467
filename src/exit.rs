use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    InvalidArgs,
    AssessFailed,
    TargetUnreachable,
    EnumerationFailed,
    EmptyScope,
    InsufficientPermissions,
    ContinuationDeclined,
}

impl ExitCode {
    pub const fn as_i32(self) -> i32 {
        match self {
            ExitCode::InvalidArgs => 2,
            ExitCode::AssessFailed => 10,
            ExitCode::TargetUnreachable => 11,
            ExitCode::EnumerationFailed => 12,
            ExitCode::EmptyScope => 13,
            ExitCode::InsufficientPermissions => 14,
            ExitCode::ContinuationDeclined => 15,
        }
    }
}

#[derive(Debug)]
pub struct ExitError {
    pub code: ExitCode,
    pub err: anyhow::Error,
}

impl ExitError {
    pub fn new(code: ExitCode, err: anyhow::Error) -> Self {
        Self { code, err }
    }
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl std::error::Error for ExitError {
    // Display already prints `err`; continue the chain from its cause.
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    fatal_kind(err)
        .unwrap_or(ExitCode::AssessFailed)
        .as_i32()
}

/// Finds the first `ExitError` in the chain, so added context does not hide the kind.
pub fn fatal_kind(err: &anyhow::Error) -> Option<ExitCode> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ExitError>())
        .map(|exit| exit.code)
}

fn with_code(code: ExitCode, message: impl Into<String>) -> anyhow::Error {
    ExitError::new(code, anyhow::anyhow!(message.into())).into()
}

pub fn invalid_args(message: impl Into<String>) -> anyhow::Error {
    with_code(ExitCode::InvalidArgs, message)
}

pub fn invalid_args_err(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(ExitCode::InvalidArgs, err).into()
}

pub fn invalid_scope(message: impl Into<String>) -> anyhow::Error {
    invalid_args(message)
}

pub fn target_unreachable(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(ExitCode::TargetUnreachable, err).into()
}

pub fn enumeration_failed(err: anyhow::Error) -> anyhow::Error {
    ExitError::new(ExitCode::EnumerationFailed, err).into()
}

pub fn empty_scope(message: impl Into<String>) -> anyhow::Error {
    with_code(ExitCode::EmptyScope, message)
}

pub fn insufficient_permissions(message: impl Into<String>) -> anyhow::Error {
    with_code(ExitCode::InsufficientPermissions, message)
}

pub fn continuation_declined(message: impl Into<String>) -> anyhow::Error {
    with_code(ExitCode::ContinuationDeclined, message)
}
