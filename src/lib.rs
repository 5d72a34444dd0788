//! keyharden: password hardening with adaptive keystroke-timing biometrics.
//!
//! A login succeeds only if the user both knows the password and types it
//! the way they have been typing it. Keystroke timing features decide which
//! masked share of a secret polynomial is used for each feature; the
//! password unmasks the shares; exact interpolation recovers the hardened
//! secret, which in turn unlocks the user's encrypted typing history.
//!
//! # Architecture
//!
//! - [`poly`]: exact big-integer polynomials and Newton interpolation
//! - [`encoder`]: password-keyed masks and the per-user [`InstructionTable`]
//! - [`history`]: the fixed-size encrypted keystroke history
//! - [`analyzer`]: the distinguishing-feature test and its statistics
//! - [`service`]: [`Hardener`], which enrolls users and runs logins
//! - [`store`]: the [`Store`] trait with in-memory and file backends
//!
//! # Example
//!
//! ```rust
//! use keyharden::{HardeningConfig, Hardener, MemoryStore};
//!
//! // Four-character password => 7 features. Real timings print wider than
//! // the default block allows for a full window, so give it room.
//! let store = MemoryStore::new(vec![0.5; 7]);
//! let config = HardeningConfig::default().with_history_size(8192);
//! let mut hardener = Hardener::with_os_rng(store, config).unwrap();
//!
//! hardener.enroll("alice", "abcd").unwrap();
//! assert!(hardener.login("alice", "abcd", &[0.1; 7]));
//! assert!(!hardener.login("alice", "abce", &[0.1; 7]));
//! ```
//!
//! # Security Model
//!
//! While the history window is filling up no feature is trusted, so the
//! password alone logs in. Once a feature's mean sits clearly on one side of
//! its threshold, the next table corrupts the share on the other side: typing
//! that feature out of profile then reconstructs a wrong secret and fails.
//!
//! The history is encrypted with a fixed IV. Each key is derived from the
//! hardened secret, which is fresh for every enrollment; an attacker who can
//! read the store directly is out of scope.
//!
//! Enroll and login are read-modify-write over the store. Calls for the same
//! username must be serialized by the caller; [`Hardener`] methods take
//! `&mut self` for that reason.

#![forbid(unsafe_code)]

pub mod analyzer;
pub mod config;
pub mod encoder;
pub mod history;
pub mod poly;
pub mod service;
pub mod store;

// Re-exports
pub use analyzer::{classify, DistinguishingCounters, FeatureStats};
pub use config::HardeningConfig;
pub use encoder::{Branch, InstructionTable, TableRow};
pub use poly::{InterpolationError, NewtonForm, Point, Polynomial};
pub use service::{Hardener, LoginReport};
pub use store::{FileStore, MemoryStore, Store, ThresholdVector};

/// One keystroke-timing sample: a value per monitored feature.
pub type FeatureVector = Vec<f64>;

/// Error types for hardening operations.
///
/// [`Hardener::login`] collapses all of these to `false`; they are only
/// visible through [`Hardener::try_login`] and the lower-level modules.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No table or history stored for the user.
    #[error("User not enrolled: {0}")]
    NotEnrolled(String),

    /// Wrong password, out-of-profile features, or undecryptable history.
    #[error("Bad credential")]
    BadCredential,

    /// History decrypted but its declared count disagrees with its contents.
    #[error("Corrupt history: declared {declared} entries, found {found}")]
    CorruptHistory { declared: usize, found: usize },

    /// Store reported or returned unusable data.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Store I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller supplied malformed input or configuration.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialized history does not fit the configured block size.
    #[error("History needs {size} bytes, block holds {limit}")]
    HistoryOverflow { size: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(Error::BadCredential.to_string(), "Bad credential");
        assert_eq!(
            Error::CorruptHistory {
                declared: 3,
                found: 1
            }
            .to_string(),
            "Corrupt history: declared 3 entries, found 1"
        );
        assert_eq!(
            Error::NotEnrolled("bob".into()).to_string(),
            "User not enrolled: bob"
        );
    }

    #[test]
    fn test_io_error_converts() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert!(matches!(err, Error::Io(_)));
    }
}
