//! Supported OCPP-J protocol versions

use serde::{Deserialize, Serialize};

use super::messages::ErrorCode;

/// Closed set of protocol versions this charge point can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "ocpp1.6")]
    Ocpp16,
    #[serde(rename = "ocpp2.0.1")]
    Ocpp201,
}

impl ProtocolVersion {
    /// WebSocket subprotocol token negotiated at connect time
    pub fn subprotocol(&self) -> &'static str {
        match self {
            ProtocolVersion::Ocpp16 => "ocpp1.6",
            ProtocolVersion::Ocpp201 => "ocpp2.0.1",
        }
    }

    /// Error code used to reject a payload that fails validation.
    ///
    /// 1.6 calls it `FormationViolation`, 2.0.1 renamed it to `FormatViolation`.
    pub fn format_violation(&self) -> ErrorCode {
        match self {
            ProtocolVersion::Ocpp16 => ErrorCode::FormationViolation,
            ProtocolVersion::Ocpp201 => ErrorCode::FormatViolation,
        }
    }
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.subprotocol())
    }
}

/// Unrecognised protocol version token
#[derive(Debug, thiserror::Error)]
#[error("unsupported OCPP version: {0}")]
pub struct UnsupportedVersion(pub String);

impl std::str::FromStr for ProtocolVersion {
    type Err = UnsupportedVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ocpp1.6" | "ocpp16" | "1.6" | "ocpp1.6j" => Ok(ProtocolVersion::Ocpp16),
            "ocpp2.0.1" | "ocpp201" | "2.0.1" => Ok(ProtocolVersion::Ocpp201),
            _ => Err(UnsupportedVersion(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_versions() {
        assert_eq!("ocpp1.6".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::Ocpp16);
        assert_eq!("1.6".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::Ocpp16);
        assert_eq!("OCPP2.0.1".parse::<ProtocolVersion>().unwrap(), ProtocolVersion::Ocpp201);
        assert!("ocpp1.5".parse::<ProtocolVersion>().is_err());
    }

    #[test]
    fn test_subprotocol_tokens() {
        assert_eq!(ProtocolVersion::Ocpp16.subprotocol(), "ocpp1.6");
        assert_eq!(ProtocolVersion::Ocpp201.to_string(), "ocpp2.0.1");
        assert_eq!(ProtocolVersion::Ocpp16.format_violation(), ErrorCode::FormationViolation);
        assert_eq!(ProtocolVersion::Ocpp201.format_violation(), ErrorCode::FormatViolation);
    }
}
