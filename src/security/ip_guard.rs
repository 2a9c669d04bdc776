//! Client address filtering.
//!
//! # Responsibilities
//! - Parse allow/deny entries (single addresses or CIDR networks)
//! - Decide whether an address may reach the application
//! - Count login failures per address and block it for a while once the
//!   configured limit is reached
//!
//! # Design Decisions
//! - Deny list wins over allow list
//! - A non-empty allow list means "only these"
//! - Every time-dependent operation has an `_at` variant taking the clock
//!   value so tests control time

use std::net::IpAddr;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use thiserror::Error;

use crate::config::SecurityConfig;

/// Longest block or session lifetime accepted, about a century.
pub(crate) const MAX_BLOCK_MINUTES: u64 = 60 * 24 * 365 * 100;

/// `now + span`, saturating at the largest representable instant.
pub(crate) fn deadline(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address rule '{rule}': {reason}")]
pub struct IpRuleError {
    pub rule: String,
    pub reason: &'static str,
}

/// A single address or a network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRule {
    network: IpAddr,
    prefix: u8,
}

impl IpRule {
    /// Whether `ip` belongs to this rule.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                prefix_eq(u32::from(net).into(), u32::from(ip).into(), self.prefix, 32)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                prefix_eq(u128::from(net), u128::from(ip), self.prefix, 128)
            }
            (IpAddr::V4(_), IpAddr::V6(v6)) => match v6.to_ipv4_mapped() {
                Some(v4) => self.contains(IpAddr::V4(v4)),
                None => false,
            },
            (IpAddr::V6(_), IpAddr::V4(_)) => false,
        }
    }
}

fn prefix_eq(a: u128, b: u128, prefix: u8, width: u8) -> bool {
    if prefix == 0 {
        return true;
    }
    let shift = u32::from(width - prefix);
    (a >> shift) == (b >> shift)
}

impl FromStr for IpRule {
    type Err = IpRuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fail = |reason| IpRuleError {
            rule: s.to_string(),
            reason,
        };
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (s.trim(), None),
        };
        let network: IpAddr = addr.parse().map_err(|_| fail("not an IP address"))?;
        let width = if network.is_ipv4() { 32 } else { 128 };
        let prefix = match prefix {
            Some(p) => p.parse::<u8>().map_err(|_| fail("bad prefix length"))?,
            None => width,
        };
        if prefix > width {
            return Err(fail("prefix length out of range"));
        }
        Ok(Self { network, prefix })
    }
}

/// Outcome of checking a client address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpVerdict {
    Allowed,
    /// Refused by the allow/deny lists.
    Denied,
    /// Temporarily blocked after too many login failures.
    Blocked { until: DateTime<Utc> },
}

#[derive(Debug, Default, Clone, Copy)]
struct FaultCounter {
    count: u32,
    last_fault: Option<DateTime<Utc>>,
    blocked_until: Option<DateTime<Utc>>,
}

/// Address filter of one application.
#[derive(Debug)]
pub struct IpGuard {
    allow: Vec<IpRule>,
    deny: Vec<IpRule>,
    allowed_faults: u32,
    block_for: Duration,
    faults: DashMap<IpAddr, FaultCounter>,
}

impl IpGuard {
    pub fn new(allow: Vec<IpRule>, deny: Vec<IpRule>, allowed_faults: u32, block_minutes: u64) -> Self {
        Self {
            allow,
            deny,
            allowed_faults,
            block_for: Duration::minutes(block_minutes.min(MAX_BLOCK_MINUTES) as i64),
            faults: DashMap::new(),
        }
    }

    pub fn from_config(config: &SecurityConfig) -> Result<Self, IpRuleError> {
        let parse = |list: &[String]| {
            list.iter()
                .map(|s| s.parse::<IpRule>())
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self::new(
            parse(&config.allow_ips)?,
            parse(&config.deny_ips)?,
            config.allowed_fault_by_ip,
            config.ip_block_timeout,
        ))
    }

    /// Whether the lists let `ip` through, ignoring fault blocks.
    pub fn is_listed_allowed(&self, ip: IpAddr) -> bool {
        if self.deny.iter().any(|r| r.contains(ip)) {
            return false;
        }
        self.allow.is_empty() || self.allow.iter().any(|r| r.contains(ip))
    }

    pub fn check(&self, ip: IpAddr) -> IpVerdict {
        self.check_at(ip, Utc::now())
    }

    pub fn check_at(&self, ip: IpAddr, now: DateTime<Utc>) -> IpVerdict {
        if !self.is_listed_allowed(ip) {
            return IpVerdict::Denied;
        }
        match self.blocked_until_at(ip, now) {
            Some(until) => IpVerdict::Blocked { until },
            None => IpVerdict::Allowed,
        }
    }

    /// End of the current block of `ip`, if any. Expired blocks are cleared.
    pub fn blocked_until_at(&self, ip: IpAddr, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let mut counter = self.faults.get_mut(&ip)?;
        match counter.blocked_until {
            Some(until) if until > now => Some(until),
            Some(_) => {
                *counter = FaultCounter::default();
                None
            }
            None => None,
        }
    }

    pub fn record_fault(&self, ip: IpAddr) -> bool {
        self.record_fault_at(ip, Utc::now())
    }

    /// Count a login failure. Returns true when this failure blocks `ip`.
    pub fn record_fault_at(&self, ip: IpAddr, now: DateTime<Utc>) -> bool {
        if self.allowed_faults == 0 {
            return false;
        }
        let mut counter = self.faults.entry(ip).or_default();
        if matches!(counter.blocked_until, Some(until) if until <= now) {
            *counter = FaultCounter::default();
        }
        counter.count += 1;
        counter.last_fault = Some(now);
        if counter.count >= self.allowed_faults && counter.blocked_until.is_none() {
            counter.blocked_until = Some(deadline(now, self.block_for));
            tracing::warn!(client_ip = %ip, faults = counter.count, "Client address blocked");
            return true;
        }
        false
    }

    /// Drop counters whose block is over, and unblocked counters whose last
    /// failure is older than one block period. Returns how many were removed.
    pub fn purge_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.faults.len();
        let stale_before = now.checked_sub_signed(self.block_for);
        self.faults.retain(|_, counter| match counter.blocked_until {
            Some(until) => until > now,
            None => match (counter.last_fault, stale_before) {
                (Some(last), Some(limit)) => last > limit,
                _ => false,
            },
        });
        before - self.faults.len()
    }

    /// Number of addresses with recorded failures.
    pub fn tracked(&self) -> usize {
        self.faults.len()
    }

    /// Forget the failures of `ip` (after a successful login).
    pub fn clear(&self, ip: IpAddr) {
        self.faults.remove(&ip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn rules_parse_addresses_and_networks() {
        let rule: IpRule = "10.1.0.0/16".parse().unwrap();
        assert!(rule.contains(ip("10.1.200.3")));
        assert!(!rule.contains(ip("10.2.0.1")));
        assert!(rule.contains(ip("::ffff:10.1.0.9")));

        let single: IpRule = "192.168.1.4".parse().unwrap();
        assert!(single.contains(ip("192.168.1.4")));
        assert!(!single.contains(ip("192.168.1.5")));

        let v6: IpRule = "2001:db8::/32".parse().unwrap();
        assert!(v6.contains(ip("2001:db8:1::1")));

        let any: IpRule = "0.0.0.0/0".parse().unwrap();
        assert!(any.contains(ip("8.8.8.8")));

        assert!("10.0.0.0/33".parse::<IpRule>().is_err());
        assert!("example.com".parse::<IpRule>().is_err());
    }

    #[test]
    fn deny_wins_over_allow() {
        let guard = IpGuard::new(
            vec!["10.0.0.0/8".parse().unwrap()],
            vec!["10.0.0.66".parse().unwrap()],
            5,
            10,
        );
        assert_eq!(guard.check(ip("10.0.0.1")), IpVerdict::Allowed);
        assert_eq!(guard.check(ip("10.0.0.66")), IpVerdict::Denied);
        assert_eq!(guard.check(ip("172.16.0.1")), IpVerdict::Denied);
    }

    #[test]
    fn faults_block_then_expire() {
        let guard = IpGuard::new(Vec::new(), Vec::new(), 3, 10);
        let client = ip("203.0.113.7");
        let now = Utc::now();

        assert!(!guard.record_fault_at(client, now));
        assert!(!guard.record_fault_at(client, now));
        assert!(guard.record_fault_at(client, now));
        assert!(matches!(guard.check_at(client, now), IpVerdict::Blocked { .. }));

        let later = now + Duration::minutes(11);
        assert_eq!(guard.check_at(client, later), IpVerdict::Allowed);
        assert!(!guard.record_fault_at(client, later));
    }

    #[test]
    fn clear_resets_counter() {
        let guard = IpGuard::new(Vec::new(), Vec::new(), 2, 10);
        let client = ip("198.51.100.1");
        guard.record_fault(client);
        guard.clear(client);
        assert!(!guard.record_fault(client));
    }

    #[test]
    fn purge_forgets_expired_and_stale_counters() {
        let guard = IpGuard::new(Vec::new(), Vec::new(), 2, 10);
        let now = Utc::now();
        guard.record_fault_at(ip("10.0.0.1"), now);
        guard.record_fault_at(ip("10.0.0.1"), now);
        guard.record_fault_at(ip("10.0.0.2"), now);
        guard.record_fault_at(ip("10.0.0.3"), now + Duration::minutes(8));
        assert_eq!(guard.tracked(), 3);

        assert_eq!(guard.purge_at(now + Duration::minutes(5)), 0);

        // Block of .1 ended and .2 went quiet; .3 failed recently.
        assert_eq!(guard.purge_at(now + Duration::minutes(11)), 2);
        assert_eq!(guard.tracked(), 1);
        assert_eq!(guard.purge_at(now + Duration::minutes(19)), 1);
        assert_eq!(guard.tracked(), 0);
    }
}
