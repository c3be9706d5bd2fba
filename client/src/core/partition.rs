//! Roster selection for this client: per-team, single shared run, or one
//! share of an address-hash partition.

use std::str::FromStr;

use thiserror::Error;

use crate::core::types::Roster;

/// Name of the synthetic team used by `--not-per-team`.
pub const SHARED_TEAM_NAME: &str = "*";
/// Address handed to the sploit by `--not-per-team`.
pub const SHARED_TEAM_ADDRESS: &str = "0.0.0.0";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("wrong syntax for --distribute '{0}', use --distribute=K/N (N >= 2, 1 <= K <= N)")]
pub struct DistributeError(String);

/// `--distribute K/N`: this client owns partition `k` (1-based) of `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Distribute {
    k: u32,
    n: u32,
}

impl Distribute {
    pub fn new(k: u32, n: u32) -> Result<Self, DistributeError> {
        if n >= 2 && (1..=n).contains(&k) {
            Ok(Self { k, n })
        } else {
            Err(DistributeError(format!("{k}/{n}")))
        }
    }

    /// Whether `address` hashes into this client's partition.
    pub fn owns(&self, address: &str) -> bool {
        partition_of(address, self.n) == self.k - 1
    }
}

impl FromStr for Distribute {
    type Err = DistributeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || DistributeError(value.to_string());
        let (k, n) = value.split_once('/').ok_or_else(invalid)?;
        let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(k) || !all_digits(n) {
            return Err(invalid());
        }
        let k = k.parse().map_err(|_| invalid())?;
        let n = n.parse().map_err(|_| invalid())?;
        Self::new(k, n).map_err(|_| invalid())
    }
}

/// Zero-based partition index of `address` among `n` partitions.
///
/// CRC-32 (IEEE) of the address bytes, so every client computes the same
/// assignment regardless of roster order.
pub fn partition_of(address: &str, n: u32) -> u32 {
    crc32fast::hash(address.as_bytes()) % n
}

/// How the server roster maps onto the teams this client attacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetMode {
    /// One instance per team in the server roster.
    #[default]
    PerTeam,
    /// A single instance against a placeholder address.
    Shared,
    /// Only the teams whose address falls into this client's partition.
    Distributed(Distribute),
}

/// Teams to attack this round.
pub fn select_targets(roster: &Roster, mode: TargetMode) -> Roster {
    match mode {
        TargetMode::PerTeam => roster.clone(),
        TargetMode::Shared => Roster::from([(
            SHARED_TEAM_NAME.to_string(),
            SHARED_TEAM_ADDRESS.to_string(),
        )]),
        TargetMode::Distributed(distribute) => roster
            .iter()
            .filter(|(_, address)| distribute.owns(address))
            .map(|(name, address)| (name.clone(), address.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> Roster {
        (1..=n)
            .map(|i| (format!("team{i}"), format!("10.60.{i}.2")))
            .collect()
    }

    #[test]
    fn parses_valid_distribute_values() {
        assert_eq!("1/2".parse(), Ok(Distribute { k: 1, n: 2 }));
        assert_eq!("3/3".parse(), Ok(Distribute { k: 3, n: 3 }));
    }

    #[test]
    fn rejects_malformed_distribute_values() {
        for value in ["", "1", "0/2", "3/2", "1/1", "a/b", "1/2/3", "-1/2", "+1/2", " 1/2"] {
            assert!(value.parse::<Distribute>().is_err(), "{value:?} accepted");
        }
    }

    #[test]
    fn crc32_matches_reference_value() {
        // CRC-32/IEEE check value.
        assert_eq!(crc32fast::hash(b"123456789"), 0xCBF4_3926);
        assert_eq!(partition_of("123456789", 2), 0xCBF4_3926 % 2);
    }

    #[test]
    fn every_target_lands_in_exactly_one_partition() {
        let roster = roster(40);
        let n = 3;
        let shares: Vec<Roster> = (1..=n)
            .map(|k| {
                let distribute = Distribute::new(k, n).expect("distribute");
                select_targets(&roster, TargetMode::Distributed(distribute))
            })
            .collect();

        for (name, address) in &roster {
            let owners = shares.iter().filter(|s| s.contains_key(name)).count();
            assert_eq!(owners, 1, "{name} ({address}) owned by {owners} partitions");
        }
        let total: usize = shares.iter().map(Roster::len).sum();
        assert_eq!(total, roster.len());
    }

    #[test]
    fn partition_ignores_roster_order_and_names() {
        let distribute = Distribute::new(2, 4).expect("distribute");
        let mut renamed = Roster::new();
        for (i, address) in roster(20).values().rev().enumerate() {
            renamed.insert(format!("z{i:02}"), address.clone());
        }

        let mode = TargetMode::Distributed(distribute);
        let mut owned_a: Vec<String> = select_targets(&roster(20), mode).into_values().collect();
        let mut owned_b: Vec<String> = select_targets(&renamed, mode).into_values().collect();
        owned_a.sort();
        owned_b.sort();
        assert_eq!(owned_a, owned_b);
    }

    #[test]
    fn shared_mode_replaces_roster_with_placeholder() {
        let selected = select_targets(&roster(5), TargetMode::Shared);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected.get("*").map(String::as_str), Some("0.0.0.0"));
    }

    #[test]
    fn shared_mode_works_with_empty_roster() {
        let selected = select_targets(&Roster::new(), TargetMode::Shared);
        assert_eq!(selected.len(), 1);
    }
}
