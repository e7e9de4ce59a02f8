//! Error type shared by the harness, the drivers and the reduction engine.
//!
//! Every failure is fatal: the harness never retries, it reports where the failure happened and
//! aborts the run. Device errors keep the OpenCL status code reported by the driver (when there is
//! one) and the call site that propagated them.

use std::{fmt, panic::Location};

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HarpError>;

#[derive(Debug, thiserror::Error)]
pub enum HarpError {
    /// An OpenCL call (allocation, transfer, build, launch, query) failed.
    #[error("OpenCL error{} encountered at {location}: {source}", StatusCode(*.status))]
    Device {
        source: ocl::Error,
        status: Option<i32>,
        location: &'static Location<'static>,
    },

    /// A device (or host) result differs from the reference.
    #[error(
        "{what} should be consistent, but expected {expected} != actual {actual}{} at {location}",
        AtIndex(*.index)
    )]
    Mismatch {
        what: String,
        index: Option<usize>,
        expected: String,
        actual: String,
        location: &'static Location<'static>,
    },

    /// Invalid parameters or an unsatisfiable device selection.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure to write a report or a device listing.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<ocl::Error> for HarpError {
    #[track_caller]
    fn from(source: ocl::Error) -> Self {
        let status = source.api_status().map(|status| status as i32);
        Self::Device {
            source,
            status,
            location: Location::caller(),
        }
    }
}

struct StatusCode(Option<i32>);

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, " code {code}"),
            None => Ok(()),
        }
    }
}

struct AtIndex(Option<usize>);

impl fmt::Display for AtIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(index) => write!(f, " (index {index})"),
            None => Ok(()),
        }
    }
}

/// Fails with [`HarpError::Mismatch`] if `expected` and `actual` differ.
#[track_caller]
pub fn ensure_same<T>(expected: T, actual: T, what: &str) -> Result<()>
where
    T: PartialEq + fmt::Display,
{
    ensure_same_at(expected, actual, what, None)
}

/// Same as [`ensure_same`], tagging the mismatch with the index of the differing element.
#[track_caller]
pub fn ensure_same_at<T>(expected: T, actual: T, what: &str, index: Option<usize>) -> Result<()>
where
    T: PartialEq + fmt::Display,
{
    if expected == actual {
        return Ok(());
    }
    Err(HarpError::Mismatch {
        what: what.to_owned(),
        index,
        expected: expected.to_string(),
        actual: actual.to_string(),
        location: Location::caller(),
    })
}
