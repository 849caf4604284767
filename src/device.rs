//! Target device model and discovery reply parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A discovered or manually addressed device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub ip: String,
    /// Stable device identity, empty if unknown.
    #[serde(default)]
    pub id: String,
    /// Display only.
    #[serde(default)]
    pub model: String,
    /// HTTP session token, empty until issued.
    #[serde(default)]
    pub token: String,
    /// Device advertised SACP support.
    #[serde(default)]
    pub sacp: bool,
}

impl Device {
    /// Device addressed directly by IP or hostname.
    pub fn from_host(host: &str) -> Self {
        Self {
            ip: host.to_string(),
            ..Self::default()
        }
    }

    /// Parse a discovery reply.
    ///
    /// Format: `<id>@<ip>|model:<model>|status:<status>|SACP:<0|1>`.
    /// The id may itself contain `@`; the last one separates the ip.
    pub fn from_discovery_reply(reply: &str) -> Result<Self> {
        if !reply.contains("|model:") || !reply.contains('@') {
            return Err(AppError::InvalidReply(reply.to_string()));
        }

        let mut fields = reply.trim_end_matches(['\0', '\r', '\n']).split('|');
        let identity = fields.next().unwrap_or_default();
        let (id, ip) = identity
            .rsplit_once('@')
            .ok_or_else(|| AppError::InvalidReply(reply.to_string()))?;

        let mut device = Self {
            ip: ip.trim().to_string(),
            id: id.trim().to_string(),
            ..Self::default()
        };

        for field in fields {
            match field.split_once(':') {
                Some(("model", model)) => device.model = model.to_string(),
                Some(("SACP", flag)) => device.sacp = flag.trim() == "1",
                _ => {}
            }
        }

        if device.ip.is_empty() {
            return Err(AppError::InvalidReply(reply.to_string()));
        }
        Ok(device)
    }

    /// True when `host` names this device by id or ip.
    pub fn matches(&self, host: &str) -> bool {
        (!self.id.is_empty() && self.id == host) || (!self.ip.is_empty() && self.ip == host)
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.id.is_empty() {
            write!(f, "{}", self.ip)?;
        } else {
            write!(f, "{}@{}", self.id, self.ip)?;
        }
        if !self.model.is_empty() {
            write!(f, " - {}", self.model)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sacp_reply() {
        let device =
            Device::from_discovery_reply("J1X123P@192.168.1.201|model:Snapmaker J1|status:IDLE|SACP:1").unwrap();
        assert_eq!(device.id, "J1X123P");
        assert_eq!(device.ip, "192.168.1.201");
        assert_eq!(device.model, "Snapmaker J1");
        assert!(device.sacp);
        assert!(device.token.is_empty());
    }

    #[test]
    fn test_parse_http_reply() {
        let device =
            Device::from_discovery_reply("Snapmaker A350@10.0.0.7|model:Snapmaker 2 Model A350|status:IDLE").unwrap();
        assert_eq!(device.id, "Snapmaker A350");
        assert_eq!(device.ip, "10.0.0.7");
        assert!(!device.sacp);
    }

    #[test]
    fn test_parse_sacp_zero() {
        let device = Device::from_discovery_reply("A@1.2.3.4|model:M|status:RUNNING|SACP:0").unwrap();
        assert!(!device.sacp);
    }

    #[test]
    fn test_reject_missing_markers() {
        assert!(Device::from_discovery_reply("J1X123P@192.168.1.201|status:IDLE").is_err());
        assert!(Device::from_discovery_reply("J1X123P 192.168.1.201|model:Snapmaker J1").is_err());
        assert!(Device::from_discovery_reply("").is_err());
    }

    #[test]
    fn test_display() {
        let device = Device::from_discovery_reply("J1@10.0.0.2|model:Snapmaker J1|status:IDLE|SACP:1").unwrap();
        assert_eq!(device.to_string(), "J1@10.0.0.2 - Snapmaker J1");
        assert_eq!(Device::from_host("printer.local").to_string(), "printer.local");
    }

    #[test]
    fn test_matches() {
        let device = Device::from_discovery_reply("J1@10.0.0.2|model:M").unwrap();
        assert!(device.matches("J1"));
        assert!(device.matches("10.0.0.2"));
        assert!(!device.matches(""));
        assert!(!device.matches("other"));
    }
}
