//! Account jobs and the account file.
//!
//! One account per line: `privateKey;minTier[-maxTier];quantity`.
//! Blank lines and lines starting with `#` are skipped.

use std::fmt;
use std::path::Path;

use alloy::primitives::Address;
use alloy::signers::local::PrivateKeySigner;
use tracing::warn;
use zeroize::Zeroizing;

use crate::errors::ConfigError;
use crate::tiers::{min_allocation_cap, Tier, TierCatalog, TierRange};

/// Purchase plan of one account. Owned by exactly one job for its lifetime.
#[derive(Clone)]
pub struct AccountJob {
    signer: PrivateKeySigner,
    range: TierRange,
    quantity: u64,
    tiers: Vec<Tier>,
    /// Requested quantity before clamping, if it was lowered
    clamped_from: Option<u64>,
}

impl AccountJob {
    /// Build a job over `tiers` (ascending, non-empty), clamping `requested`
    /// to the smallest per-account cap of the range.
    pub fn new(signer: PrivateKeySigner, range: TierRange, tiers: Vec<Tier>, requested: u64) -> Self {
        let cap = min_allocation_cap(&tiers).unwrap_or(requested);
        let (quantity, clamped_from) = if requested > cap {
            (cap, Some(requested))
        } else {
            (requested, None)
        };

        Self {
            signer,
            range,
            quantity,
            tiers,
            clamped_from,
        }
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn signer(&self) -> &PrivateKeySigner {
        &self.signer
    }

    pub fn range(&self) -> TierRange {
        self.range
    }

    /// Effective quantity bought in every tier.
    pub fn quantity(&self) -> u64 {
        self.quantity
    }

    pub fn tiers(&self) -> &[Tier] {
        &self.tiers
    }

    pub fn clamped_from(&self) -> Option<u64> {
        self.clamped_from
    }
}

impl fmt::Debug for AccountJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountJob")
            .field("address", &self.address())
            .field("range", &self.range)
            .field("quantity", &self.quantity)
            .field("clamped_from", &self.clamped_from)
            .finish()
    }
}

/// Parse a hex private key, with or without `0x`.
pub fn parse_credential(raw: &str) -> Option<PrivateKeySigner> {
    let trimmed = raw.trim();
    let hex_key = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex_key.len() != 64 {
        return None;
    }

    let bytes = Zeroizing::new(hex::decode(hex_key).ok()?);
    if bytes.iter().all(|&b| b == 0) {
        return None;
    }
    PrivateKeySigner::from_slice(&bytes).ok()
}

/// Parse the account file contents into jobs.
pub fn parse_accounts(contents: &str, catalog: &TierCatalog) -> Result<Vec<AccountJob>, ConfigError> {
    let mut jobs = Vec::new();

    for (index, raw_line) in contents.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split(';');
        let credential = fields.next().unwrap_or_default();
        let tier_field = fields.next().unwrap_or_default();
        let quantity_field = fields.next().unwrap_or_default().trim();

        let signer =
            parse_credential(credential).ok_or(ConfigError::InvalidCredential { line: line_no })?;

        let range: TierRange = tier_field
            .parse()
            .map_err(|source| ConfigError::InvalidTierRange { line: line_no, source })?;
        let tiers = catalog
            .select(range)
            .map_err(|source| ConfigError::InvalidTierRange { line: line_no, source })?;

        let requested = match quantity_field.parse::<u64>() {
            Ok(q) if q >= 1 => q,
            _ => {
                let shown = if quantity_field.is_empty() {
                    "<empty>"
                } else {
                    quantity_field
                };
                warn!(
                    line = line_no,
                    value = shown,
                    "Invalid quantity, using 1; edit the accounts file and restart for a different amount"
                );
                1
            }
        };

        let job = AccountJob::new(signer, range, tiers, requested);
        if let Some(requested) = job.clamped_from() {
            warn!(
                line = line_no,
                account = %job.address(),
                requested,
                max_allocation = job.quantity(),
                "Quantity exceeds the per-account allocation of the selected tiers, clamping"
            );
        }
        jobs.push(job);
    }

    if jobs.is_empty() {
        return Err(ConfigError::NoAccounts);
    }
    Ok(jobs)
}

/// Read and parse the account file.
pub fn load_accounts(path: &Path, catalog: &TierCatalog) -> Result<Vec<AccountJob>, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map(Zeroizing::new)
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
    parse_accounts(&contents, catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;

    const KEY_A: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
    const KEY_B: &str = "5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";

    #[test]
    fn test_parse_credential() {
        assert!(parse_credential(KEY_A).is_some());
        assert!(parse_credential(KEY_B).is_some());
        assert!(parse_credential("0x1234").is_none());
        assert!(parse_credential(&"zz".repeat(32)).is_none());
        assert!(parse_credential(&"0".repeat(64)).is_none());
    }

    #[test]
    fn test_parse_accounts_skips_comments_and_blank_lines() {
        let contents = format!("# header\n\n{KEY_A};1;3\r\n  \n{KEY_B};2-4;2\n");
        let jobs = parse_accounts(&contents, &TierCatalog::builtin()).unwrap();

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].range(), TierRange { min: 1, max: 1 });
        assert_eq!(jobs[0].quantity(), 3);
        assert_eq!(jobs[1].tiers().len(), 3);
        assert_eq!(jobs[1].tiers()[0].index, 2);
        assert_eq!(jobs[1].quantity(), 2);
    }

    #[test]
    fn test_quantity_defaults_to_one() {
        let contents = format!("{KEY_A};1;0\n{KEY_B};1;abc\n{KEY_A};2\n");
        let jobs = parse_accounts(&contents, &TierCatalog::builtin()).unwrap();
        assert!(jobs.iter().all(|j| j.quantity() == 1));
    }

    #[test]
    fn test_quantity_is_clamped_not_rejected() {
        // tiers 1..=3 have caps 5, 5, 10
        let contents = format!("{KEY_A};1-3;50\n");
        let jobs = parse_accounts(&contents, &TierCatalog::builtin()).unwrap();
        assert_eq!(jobs[0].quantity(), 5);
        assert_eq!(jobs[0].clamped_from(), Some(50));
    }

    #[test]
    fn test_fatal_line_errors_name_the_line() {
        let catalog = TierCatalog::builtin();

        let err = parse_accounts(&format!("# c\n{KEY_A};1;1\nnot-a-key;1;1\n"), &catalog).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCredential { line: 3 }));

        let err = parse_accounts(&format!("{KEY_A};5-2;1\n"), &catalog).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTierRange { line: 1, .. }));

        let err = parse_accounts(&format!("{KEY_A};40;1\n"), &catalog).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTierRange { line: 1, .. }));

        let err = parse_accounts(&format!("{KEY_A};;1\n"), &catalog).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTierRange { line: 1, .. }));
    }

    #[test]
    fn test_empty_list_is_fatal() {
        let err = parse_accounts("# nothing here\n\n", &TierCatalog::builtin()).unwrap_err();
        assert!(matches!(err, ConfigError::NoAccounts));
    }

    #[test]
    fn test_load_accounts_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{KEY_A};3-4;7").unwrap();

        let jobs = load_accounts(file.path(), &TierCatalog::builtin()).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].quantity(), 7);

        let missing = load_accounts(Path::new("/nonexistent/wallets.txt"), &TierCatalog::builtin());
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_debug_does_not_print_key() {
        let contents = format!("{KEY_A};1;1\n");
        let jobs = parse_accounts(&contents, &TierCatalog::builtin()).unwrap();
        let debug = format!("{:?}", jobs[0]);
        assert!(!debug.contains(&KEY_A[2..]));
        assert!(debug.contains("AccountJob"));
    }

    proptest! {
        #[test]
        fn prop_quantity_never_exceeds_range_cap(min in 1usize..=32, extra in 0usize..8, requested in 1u64..5000) {
            let catalog = TierCatalog::builtin();
            let range = TierRange::new(min, (min + extra).min(32)).unwrap();
            let tiers = catalog.select(range).unwrap();
            let cap = min_allocation_cap(&tiers).unwrap();
            let signer = parse_credential(KEY_A).unwrap();

            let job = AccountJob::new(signer, range, tiers, requested);
            prop_assert_eq!(job.quantity(), requested.min(cap));
            prop_assert_eq!(job.clamped_from().is_some(), requested > cap);
        }
    }
}
