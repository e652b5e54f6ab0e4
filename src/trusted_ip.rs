//! Trusted IP and comma-list codecs.
//!
//! The API returns trusted IPs as `{ipAddress, prefix}` pairs while Terraform
//! configurations carry a single `ip_address` string in CIDR notation. Several
//! auth-method fields are stored by the API as comma-joined strings but exposed
//! to users as lists.
//!
//! Nothing here validates address syntax: malformed input is passed through
//! and rejected by the API.

use serde::{Deserialize, Serialize};

/// A trusted IP as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustedIp {
    /// The address part.
    pub ip_address: String,
    /// The CIDR prefix length, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<u8>,
}

impl TrustedIp {
    /// Create a trusted IP from its parts.
    pub fn new(ip_address: impl Into<String>, prefix: Option<u8>) -> Self {
        Self {
            ip_address: ip_address.into(),
            prefix,
        }
    }

    /// Parse `ip` or `ip/prefix`. A prefix that is not a number is kept as part
    /// of the address.
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if let Some((ip, prefix)) = value.rsplit_once('/') {
            if let Ok(prefix) = prefix.parse::<u8>() {
                return Self::new(ip, Some(prefix));
            }
        }
        Self::new(value, None)
    }

    /// Render as `ip/prefix`, or `ip` when there is no prefix.
    pub fn encode(&self) -> String {
        match self.prefix {
            Some(prefix) => format!("{}/{}", self.ip_address, prefix),
            None => self.ip_address.clone(),
        }
    }
}

/// Split a comma-joined API value into trimmed, non-empty items.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join list items into the comma-separated form the API stores.
pub fn join_list<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|item| item.as_ref().trim())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_with_and_without_prefix() {
        assert_eq!(TrustedIp::new("10.0.0.0", Some(8)).encode(), "10.0.0.0/8");
        assert_eq!(TrustedIp::new("1.2.3.4", None).encode(), "1.2.3.4");
        assert_eq!(TrustedIp::new("::", Some(0)).encode(), "::/0");
    }

    #[test]
    fn test_parse_splits_prefix() {
        assert_eq!(TrustedIp::parse("10.0.0.0/8"), TrustedIp::new("10.0.0.0", Some(8)));
        assert_eq!(TrustedIp::parse(" 1.2.3.4 "), TrustedIp::new("1.2.3.4", None));
        assert_eq!(TrustedIp::parse("2001:db8::/32").encode(), "2001:db8::/32");
    }

    #[test]
    fn test_parse_passes_malformed_input_through() {
        let ip = TrustedIp::parse("10.0.0.0/abc");
        assert_eq!(ip.ip_address, "10.0.0.0/abc");
        assert_eq!(ip.prefix, None);
        assert_eq!(TrustedIp::parse("not-an-ip").encode(), "not-an-ip");
    }

    #[test]
    fn test_deserialize_api_shape() {
        let ips: Vec<TrustedIp> = serde_json::from_value(serde_json::json!([
            {"ipAddress": "0.0.0.0", "prefix": 0, "type": "ipv4"},
            {"ipAddress": "1.2.3.4", "type": "ipv4"}
        ]))
        .unwrap();
        let encoded: Vec<String> = ips.iter().map(TrustedIp::encode).collect();
        assert_eq!(encoded, vec!["0.0.0.0/0", "1.2.3.4"]);
    }

    #[test]
    fn test_comma_lists() {
        assert_eq!(
            split_list("123456789012, 210987654321 ,,"),
            vec!["123456789012", "210987654321"]
        );
        assert!(split_list("").is_empty());
        assert_eq!(join_list(&["a", " b"]), "a,b");
        assert_eq!(join_list::<String>(&[]), "");
    }
}
