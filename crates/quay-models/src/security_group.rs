//! Egress security rules.
//!
//! Each rule whitelists outbound traffic for a protocol and destination
//! set. The per-protocol invariants are enforced at ingest so that cell
//! agents never see a rule they cannot program.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::validator::{Validate, ValidationError};

/// Transport protocol a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP traffic.
    Tcp,
    /// UDP traffic.
    Udp,
    /// ICMP traffic.
    Icmp,
    /// Every protocol.
    All,
}

/// ICMP type/code selector; required for ICMP rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcmpInfo {
    /// ICMP type (-1 matches all).
    #[serde(rename = "type")]
    pub icmp_type: i32,
    /// ICMP code (-1 matches all).
    pub code: i32,
}

/// Inclusive destination port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    /// First port in the range.
    pub start: u16,
    /// Last port in the range.
    pub end: u16,
}

/// An egress whitelist rule attached to a desired LRP or task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroupRule {
    /// Protocol the rule matches.
    pub protocol: Protocol,
    /// Destination addresses: an IPv4 address, a CIDR, or an `IP-IP` range.
    pub destinations: Vec<String>,
    /// Destination ports (tcp/udp only; exclusive with `port_range`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<u16>>,
    /// Destination port range (tcp/udp only; exclusive with `ports`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_range: Option<PortRange>,
    /// ICMP selector (icmp only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icmp_info: Option<IcmpInfo>,
    /// Log matching traffic (tcp and all only).
    #[serde(default)]
    pub log: bool,
}

impl Validate for SecurityGroupRule {
    fn validate(&self) -> Result<(), ValidationError> {
        let mut err = ValidationError::new();

        match self.protocol {
            Protocol::Tcp | Protocol::Udp => {
                self.validate_port_selection(&mut err);
                if self.icmp_info.is_some() {
                    err.invalid_field("icmp_info");
                }
                if self.protocol == Protocol::Udp && self.log {
                    err.invalid_field("log");
                }
            }
            Protocol::Icmp => {
                self.forbid_ports(&mut err);
                if self.icmp_info.is_none() {
                    err.invalid_field("icmp_info");
                }
                if self.log {
                    err.invalid_field("log");
                }
            }
            Protocol::All => {
                self.forbid_ports(&mut err);
                if self.icmp_info.is_some() {
                    err.invalid_field("icmp_info");
                }
            }
        }

        if self.destinations.is_empty() {
            err.invalid_field("destinations");
        }
        for destination in &self.destinations {
            if !valid_destination(destination) {
                err.invalid_field("destinations");
            }
        }

        err.into_result()
    }
}

impl SecurityGroupRule {
    // tcp and udp require exactly one of ports or port_range.
    fn validate_port_selection(&self, err: &mut ValidationError) {
        match (&self.ports, &self.port_range) {
            (Some(ports), None) => {
                if ports.is_empty() || ports.contains(&0) {
                    err.invalid_field("ports");
                }
            }
            (None, Some(range)) => {
                if range.start == 0 || range.start > range.end {
                    err.invalid_field("port_range");
                }
            }
            (Some(_), Some(_)) | (None, None) => {
                err.invalid_field("ports");
                err.invalid_field("port_range");
            }
        }
    }

    fn forbid_ports(&self, err: &mut ValidationError) {
        if self.ports.is_some() {
            err.invalid_field("ports");
        }
        if self.port_range.is_some() {
            err.invalid_field("port_range");
        }
    }
}

fn valid_destination(destination: &str) -> bool {
    if destination.parse::<Ipv4Addr>().is_ok() {
        return true;
    }
    if let Some((ip, prefix)) = destination.split_once('/') {
        return ip.parse::<Ipv4Addr>().is_ok()
            && prefix.parse::<u8>().is_ok_and(|bits| bits <= 32);
    }
    if let Some((first, second)) = destination.split_once('-') {
        if let (Ok(first), Ok(second)) = (first.parse::<Ipv4Addr>(), second.parse::<Ipv4Addr>()) {
            return u32::from(first) <= u32::from(second);
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tcp_rule() -> SecurityGroupRule {
        SecurityGroupRule {
            protocol: Protocol::Tcp,
            destinations: vec!["10.0.0.0/8".to_string()],
            ports: Some(vec![80, 443]),
            port_range: None,
            icmp_info: None,
            log: false,
        }
    }

    #[test]
    fn test_valid_tcp_rule_passes() {
        assert!(tcp_rule().validate().is_ok());
    }

    #[test]
    fn test_tcp_requires_exactly_one_port_form() {
        let mut rule = tcp_rule();
        rule.port_range = Some(PortRange { start: 1, end: 2 });
        let err = rule.validate().unwrap_err().to_string();
        assert!(err.contains("ports") && err.contains("port_range"));

        let mut rule = tcp_rule();
        rule.ports = None;
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_port_range_must_be_ordered_and_positive() {
        let mut rule = tcp_rule();
        rule.ports = None;
        rule.port_range = Some(PortRange { start: 9, end: 3 });
        assert!(rule.validate().unwrap_err().to_string().contains("port_range"));

        rule.port_range = Some(PortRange { start: 0, end: 3 });
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_udp_forbids_logging() {
        let mut rule = tcp_rule();
        rule.protocol = Protocol::Udp;
        rule.log = true;
        assert!(rule.validate().unwrap_err().to_string().contains("log"));
    }

    #[test]
    fn test_icmp_requires_icmp_info_and_no_ports() {
        let rule = SecurityGroupRule {
            protocol: Protocol::Icmp,
            destinations: vec!["8.8.8.8".to_string()],
            ports: Some(vec![80]),
            port_range: None,
            icmp_info: None,
            log: false,
        };
        let err = rule.validate().unwrap_err().to_string();
        assert!(err.contains("ports") && err.contains("icmp_info"));
    }

    #[test]
    fn test_all_forbids_ports_and_icmp_info() {
        let rule = SecurityGroupRule {
            protocol: Protocol::All,
            destinations: vec!["0.0.0.0-255.255.255.255".to_string()],
            ports: None,
            port_range: None,
            icmp_info: Some(IcmpInfo { icmp_type: -1, code: -1 }),
            log: true,
        };
        let err = rule.validate().unwrap_err().to_string();
        assert!(err.contains("icmp_info"));
    }

    #[test]
    fn test_destination_grammar() {
        for good in ["1.2.3.4", "10.0.0.0/8", "1.2.3.4-1.2.3.9", "1.2.3.4-1.2.3.4"] {
            assert!(valid_destination(good), "{good}");
        }
        for bad in ["", "example.com", "10.0.0.0/33", "1.2.3.9-1.2.3.4", "::1"] {
            assert!(!valid_destination(bad), "{bad}");
        }
    }

    #[test]
    fn test_rule_reports_every_violation() {
        let rule = SecurityGroupRule {
            protocol: Protocol::Udp,
            destinations: vec![],
            ports: None,
            port_range: None,
            icmp_info: None,
            log: true,
        };
        let err = rule.validate().unwrap_err().to_string();
        assert!(err.contains("ports"));
        assert!(err.contains("log"));
        assert!(err.contains("destinations"));
    }
}
