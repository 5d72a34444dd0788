//! Enrollment and login.
//!
//! A login reconstructs the hardened secret from the instruction table using
//! the password and the side of each threshold the typed features fall on,
//! proves it by opening the encrypted history, then re-randomizes the table.
//! Nothing is written until every check has passed.

use num_bigint::BigInt;
use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analyzer::{classify, column_stats, DistinguishingCounters, FeatureStats};
use crate::config::HardeningConfig;
use crate::encoder::{decode_node, encode_row, Branch, InstructionTable};
use crate::history::{block_size_for, decrypt_and_validate, derive_history_key, seal};
use crate::poly::{evaluate, interpolate, random_polynomial, random_polynomial_with_secret};
use crate::store::{Store, ThresholdVector};
use crate::Error;

/// Number of features covered by a password: `2 * len - 1`.
pub fn feature_count_for(password: &str) -> usize {
    (2 * password.chars().count()).saturating_sub(1)
}

fn validate_username(username: &str) -> Result<(), Error> {
    if username.is_empty()
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::InvalidInput(format!(
            "Username {:?} must be non-empty ASCII alphanumerics, '_' or '-'",
            username
        )));
    }
    Ok(())
}

/// Printed width of a typical timing value, e.g. `0.1034`.
const TYPICAL_VALUE_WIDTH: usize = 6;

/// Nonzero offset in `[-max, max)`.
fn random_offset<R: Rng>(rng: &mut R, max: i64) -> BigInt {
    loop {
        let offset = rng.gen_range(-max..max);
        if offset != 0 {
            return BigInt::from(offset);
        }
    }
}

/// Outcome of a successful login.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoginReport {
    /// History entries retained after this login.
    pub window: usize,
    /// Per-feature statistics over the window.
    pub stats: Vec<FeatureStats>,
    /// Which features the new table treats as distinguishing.
    pub distinguishing: Vec<bool>,
}

/// Password hardener over a store and a randomness source.
///
/// Methods take `&mut self`, which serializes enroll/login for everything
/// behind one instance. Separate instances over a shared backing store must
/// be serialized per username by the caller.
#[derive(Debug)]
pub struct Hardener<S, R = OsRng>
where
    S: Store,
    R: RngCore + CryptoRng,
{
    store: S,
    rng: R,
    config: HardeningConfig,
    thresholds: ThresholdVector,
    counters: DistinguishingCounters,
}

impl<S: Store> Hardener<S, OsRng> {
    /// Hardener drawing randomness from the operating system.
    pub fn with_os_rng(store: S, config: HardeningConfig) -> Result<Self, Error> {
        Self::new(store, OsRng, config)
    }
}

impl<S, R> Hardener<S, R>
where
    S: Store,
    R: RngCore + CryptoRng,
{
    /// Create a hardener. The threshold vector is read from the store once.
    pub fn new(store: S, rng: R, config: HardeningConfig) -> Result<Self, Error> {
        config.validate()?;
        let thresholds = store.threshold_vector()?;
        if thresholds.is_empty() || thresholds.iter().any(|t| !t.is_finite()) {
            return Err(Error::InvalidInput(
                "Threshold vector must be non-empty and finite".into(),
            ));
        }
        let needed = block_size_for(thresholds.len(), config.history_window, TYPICAL_VALUE_WIDTH);
        if needed > config.history_size {
            warn!(
                history_size = config.history_size,
                needed,
                features = thresholds.len(),
                window = config.history_window,
                "History block too small for a full window of typical timings"
            );
        }
        let counters = DistinguishingCounters::new(thresholds.len());
        Ok(Self {
            store,
            rng,
            config,
            thresholds,
            counters,
        })
    }

    /// Number of features `F` (the threshold vector length).
    pub fn feature_count(&self) -> usize {
        self.thresholds.len()
    }

    /// Active configuration.
    pub fn config(&self) -> &HardeningConfig {
        &self.config
    }

    /// Threshold vector in use.
    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    /// Classification tallies since this hardener was created.
    pub fn counters(&self) -> &DistinguishingCounters {
        &self.counters
    }

    /// Backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Backing store, mutably.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Create (or fully replace) the account for `username`.
    pub fn enroll(&mut self, username: &str, password: &str) -> Result<(), Error> {
        validate_username(username)?;
        let f = self.feature_count();
        if feature_count_for(password) != f {
            return Err(Error::InvalidInput(format!(
                "Password must have {} characters",
                (f + 1) / 2
            )));
        }

        let poly = random_polynomial(&mut self.rng, f, self.config.coefficient_bits.clone());
        let rows = (0..f)
            .map(|i| {
                let y0 = evaluate(&poly, 2 * i as i64);
                let y1 = evaluate(&poly, 2 * i as i64 + 1);
                encode_row(&y0, &y1, i, password)
            })
            .collect();
        let table = InstructionTable::new(rows);

        let key = derive_history_key(username, &poly[0]);
        let blob = seal(&key, username, &[], self.config.history_size)?;

        self.store.put_state(username, &table, &blob)?;

        info!(username = %username, features = f, "Enrolled user");
        Ok(())
    }

    /// Attempt a login. Every failure is `false`.
    pub fn login(&mut self, username: &str, password: &str, features: &[f64]) -> bool {
        match self.try_login(username, password, features) {
            Ok(report) => {
                info!(
                    username = %username,
                    window = report.window,
                    distinguishing = report.distinguishing.iter().filter(|&&d| d).count(),
                    "Login succeeded"
                );
                true
            }
            Err(e) => {
                debug!(username = %username, error = %e, "Login failed");
                false
            }
        }
    }

    /// Login with the failure cause kept, for diagnostics.
    ///
    /// Credential failures are always [`Error::BadCredential`];
    /// [`Error::CorruptHistory`] only appears when
    /// [`HardeningConfig::diagnostics`] is set. On any error the stored table
    /// and history are untouched.
    pub fn try_login(
        &mut self,
        username: &str,
        password: &str,
        features: &[f64],
    ) -> Result<LoginReport, Error> {
        validate_username(username)?;
        let f = self.feature_count();
        if features.len() != f {
            return Err(Error::InvalidInput(format!(
                "Expected {} features, got {}",
                f,
                features.len()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(Error::InvalidInput("Features must be finite".into()));
        }

        let table = self
            .store
            .get_table(username)?
            .ok_or_else(|| Error::NotEnrolled(username.to_string()))?;
        let blob = self
            .store
            .get_history(username)?
            .ok_or_else(|| Error::NotEnrolled(username.to_string()))?;
        if table.len() != f {
            return Err(Error::Storage(format!(
                "Table for {} has {} rows, expected {}",
                username,
                table.len(),
                f
            )));
        }
        if feature_count_for(password) != f {
            return Err(Error::BadCredential);
        }

        let mut points = Vec::with_capacity(f);
        for (i, (row, &value)) in table.rows().iter().zip(features).enumerate() {
            let branch = Branch::select(value, self.thresholds[i]);
            let point = decode_node(row, i, password, branch).ok_or_else(|| {
                debug!(feature = i, "Masked value did not divide exactly");
                Error::BadCredential
            })?;
            points.push(point);
        }

        let form = interpolate(&points).map_err(|e| {
            debug!(error = %e, "Interpolation failed");
            Error::BadCredential
        })?;
        let hpwd = form.evaluate(0);

        let key = derive_history_key(username, &hpwd);
        let mut history = decrypt_and_validate(&key, &blob, username, f).map_err(|e| match e {
            Error::CorruptHistory { .. } if !self.config.diagnostics => Error::BadCredential,
            other => other,
        })?;

        let h = self.config.history_window;
        history.push(features.to_vec());
        if history.len() > h {
            let excess = history.len() - h;
            history.drain(..excess);
        }

        let stats = column_stats(&history, f);
        let distinguishing: Vec<bool> = stats
            .iter()
            .zip(&self.thresholds)
            .map(|(s, &t)| classify(history.len(), s.mean, s.std_dev, t, h, self.config.k))
            .collect();

        let table = self.rotate_table(&hpwd, password, &stats, &distinguishing);
        let blob = seal(&key, username, &history, self.config.history_size)?;

        self.store.put_state(username, &table, &blob)?;

        for (i, &d) in distinguishing.iter().enumerate() {
            self.counters.record(i, d);
        }

        Ok(LoginReport {
            window: history.len(),
            stats,
            distinguishing,
        })
    }

    /// Fresh table for the same secret. Distinguishing features keep the
    /// true value only on the side of the threshold the user's mean is on.
    fn rotate_table(
        &mut self,
        hpwd: &BigInt,
        password: &str,
        stats: &[FeatureStats],
        distinguishing: &[bool],
    ) -> InstructionTable {
        let f = self.feature_count();
        let poly = random_polynomial_with_secret(
            &mut self.rng,
            f,
            self.config.coefficient_bits.clone(),
            hpwd,
        );

        let mut rows = Vec::with_capacity(f);
        for i in 0..f {
            let mut y0 = evaluate(&poly, 2 * i as i64);
            let mut y1 = evaluate(&poly, 2 * i as i64 + 1);
            if distinguishing[i] {
                let offset = random_offset(&mut self.rng, self.config.max_offset);
                match Branch::select(stats[i].mean, self.thresholds[i]) {
                    Branch::Alpha => y1 += offset,
                    Branch::Beta => y0 += offset,
                }
            }
            rows.push(encode_row(&y0, &y1, i, password));
        }
        InstructionTable::new(rows)
    }

    /// Delete the table and history of `username`.
    pub fn remove_user(&mut self, username: &str) -> Result<(), Error> {
        self.store.delete_table(username)?;
        self.store.delete_history(username)?;
        info!(username = %username, "Removed user");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{encrypt, HISTORY_HEADER, HISTORY_SIZE};
    use crate::store::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const PASSWORD: &str = "abcd";

    fn hardener(h: usize) -> Hardener<MemoryStore, StdRng> {
        let store = MemoryStore::new(vec![0.5; 7]);
        let config = HardeningConfig::default().with_history_window(h);
        Hardener::new(store, StdRng::seed_from_u64(1), config).unwrap()
    }

    #[test]
    fn test_feature_count_for() {
        assert_eq!(feature_count_for("abcd"), 7);
        assert_eq!(feature_count_for(".tie5Roanl"), 19);
        assert_eq!(feature_count_for(""), 0);
    }

    #[test]
    fn test_username_validation() {
        assert!(validate_username("user_1-a").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("../etc").is_err());
        assert!(validate_username("a b").is_err());
        assert!(validate_username("line\nbreak").is_err());
    }

    #[test]
    fn test_random_offset_nonzero() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..1000 {
            let offset = random_offset(&mut rng, 2);
            assert!(offset != BigInt::from(0));
            assert!(offset >= BigInt::from(-2) && offset < BigInt::from(2));
        }
    }

    #[test]
    fn test_enroll_rejects_wrong_password_length() {
        let mut hardener = hardener(3);
        assert!(matches!(
            hardener.enroll("alice", "abc"),
            Err(Error::InvalidInput(_))
        ));
        assert_eq!(hardener.store().user_count(), 0);
    }

    #[test]
    fn test_login_unknown_user() {
        let mut hardener = hardener(3);
        assert!(matches!(
            hardener.try_login("ghost", PASSWORD, &[0.0; 7]),
            Err(Error::NotEnrolled(_))
        ));
    }

    #[test]
    fn test_login_wrong_feature_length() {
        let mut hardener = hardener(3);
        hardener.enroll("alice", PASSWORD).unwrap();
        assert!(matches!(
            hardener.try_login("alice", PASSWORD, &[0.0; 6]),
            Err(Error::InvalidInput(_))
        ));
        assert!(!hardener.login("alice", PASSWORD, &[f64::NAN; 7]));
    }

    #[test]
    fn test_login_and_window() {
        let mut hardener = hardener(3);
        hardener.enroll("alice", PASSWORD).unwrap();
        for expected in [1, 2, 3, 3, 3] {
            let report = hardener.try_login("alice", PASSWORD, &[0.0; 7]).unwrap();
            assert_eq!(report.window, expected);
            let warm = expected < 3;
            assert_eq!(report.distinguishing.iter().any(|&d| d), !warm);
        }
        assert_eq!(hardener.counters().distinguishing, vec![3; 7]);
        assert_eq!(hardener.counters().non_distinguishing, vec![2; 7]);
    }

    #[test]
    fn test_wrong_password_is_bad_credential() {
        let mut hardener = hardener(3);
        hardener.enroll("alice", PASSWORD).unwrap();
        assert!(matches!(
            hardener.try_login("alice", "abce", &[0.0; 7]),
            Err(Error::BadCredential)
        ));
        assert!(matches!(
            hardener.try_login("alice", "abcde", &[0.0; 7]),
            Err(Error::BadCredential)
        ));
    }

    #[test]
    fn test_remove_user() {
        let mut hardener = hardener(3);
        hardener.enroll("alice", PASSWORD).unwrap();
        hardener.remove_user("alice").unwrap();
        assert!(!hardener.login("alice", PASSWORD, &[0.0; 7]));
        assert_eq!(hardener.store().user_count(), 0);
    }

    /// Rebuild the hardened secret from a freshly enrolled table.
    fn recover_hpwd(hardener: &Hardener<MemoryStore, StdRng>, username: &str) -> BigInt {
        let table = hardener.store().get_table(username).unwrap().unwrap();
        let points: Vec<_> = table
            .rows()
            .iter()
            .enumerate()
            .map(|(i, row)| decode_node(row, i, PASSWORD, Branch::Alpha).unwrap())
            .collect();
        interpolate(&points).unwrap().evaluate(0)
    }

    #[test]
    fn test_corrupt_history_hidden_unless_diagnostics() {
        let mut hardener = hardener(3);
        hardener.enroll("alice", PASSWORD).unwrap();

        // Declares two entries, holds one.
        let key = derive_history_key("alice", &recover_hpwd(&hardener, "alice"));
        let text = format!("{}\nalice\n2\n{}\n", HISTORY_HEADER, ["0"; 7].join(" "));
        let mut block = text.into_bytes();
        block.resize(HISTORY_SIZE, 0);
        hardener
            .store_mut()
            .put_history("alice", &encrypt(&key, &block))
            .unwrap();

        let config = HardeningConfig::default()
            .with_history_window(3)
            .with_diagnostics(true);
        let mut diagnostic =
            Hardener::new(hardener.store().clone(), StdRng::seed_from_u64(2), config).unwrap();

        assert!(matches!(
            hardener.try_login("alice", PASSWORD, &[0.0; 7]),
            Err(Error::BadCredential)
        ));
        assert!(!hardener.login("alice", PASSWORD, &[0.0; 7]));
        assert!(matches!(
            diagnostic.try_login("alice", PASSWORD, &[0.0; 7]),
            Err(Error::CorruptHistory {
                declared: 2,
                found: 1
            })
        ));
    }

    #[test]
    fn test_rejects_bad_thresholds() {
        let store = MemoryStore::new(Vec::new());
        assert!(Hardener::new(store, StdRng::seed_from_u64(0), HardeningConfig::default()).is_err());
        let store = MemoryStore::new(vec![0.5, f64::INFINITY]);
        assert!(Hardener::new(store, StdRng::seed_from_u64(0), HardeningConfig::default()).is_err());
    }
}
