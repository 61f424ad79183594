use crate::manifest::SourceName;
use thiserror::Error;

/// Errors surfaced by the resolver service.
///
/// Query algorithms never fail; these cover configuration mistakes and
/// talking to a service that has already stopped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolverError {
    #[error("source '{name}' registered after query binding began")]
    LateSourceRegistration { name: SourceName },

    #[error("source '{name}' is already registered")]
    DuplicateSource { name: SourceName },

    #[error("resolver service has stopped")]
    ServiceStopped,
}

pub type Result<T, E = ResolverError> = std::result::Result<T, E>;
