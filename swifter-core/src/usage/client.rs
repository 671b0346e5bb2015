//! Client identity and ledger key composition

use crate::error::SwifterError;
use crate::tools::normalize_tool_key;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Who a tool invocation is attributed to.
///
/// Authenticated callers are identified by user id alone. Anonymous callers
/// are identified by IP address plus an optional browser token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientIdentity {
    /// Caller IP address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    /// Secondary disambiguator for anonymous sessions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Authenticated user id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl ClientIdentity {
    /// An authenticated user
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    /// An anonymous caller identified by IP address
    pub fn anonymous(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            ..Self::default()
        }
    }

    /// Builder: set the session token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Whether the identity names a user or an IP address
    pub fn is_identified(&self) -> bool {
        non_empty(&self.user_id).is_some() || non_empty(&self.ip).is_some()
    }

    /// Reject identities with neither a user id nor an IP address.
    ///
    /// # Errors
    ///
    /// Returns [`SwifterError::InvalidClient`] for an unidentified caller.
    pub fn ensure_identified(&self) -> crate::error::Result<()> {
        if self.is_identified() {
            Ok(())
        } else {
            Err(SwifterError::InvalidClient(
                "provide either a user id or an IP address".to_string(),
            ))
        }
    }

    /// Ledger key of this client: `user:<id>` or `ip:<ip>::token:<token>`
    pub fn client_key(&self) -> String {
        if let Some(user_id) = non_empty(&self.user_id) {
            return format!("user:{}", user_id);
        }
        let ip = non_empty(&self.ip).unwrap_or("unknown");
        let token = non_empty(&self.token).unwrap_or("");
        format!("ip:{}::token:{}", ip, token)
    }
}

/// UTC calendar month in `YYYY-MM` form
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MonthKey(String);

impl MonthKey {
    /// Month containing `at`, in UTC
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.format("%Y-%m").to_string())
    }

    /// Current UTC month
    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// The `YYYY-MM` string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Midnight UTC on the first day of this month.
    ///
    /// # Errors
    ///
    /// Returns [`SwifterError::InvalidMonth`] if the key does not name a month.
    pub fn first_instant(&self) -> crate::error::Result<DateTime<Utc>> {
        let invalid = || SwifterError::InvalidMonth(self.0.clone());
        let (year, month) = self.0.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .ok_or_else(invalid)
    }
}

impl FromStr for MonthKey {
    type Err = SwifterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        let bytes = value.as_bytes();
        let shape_ok = bytes.len() == 7
            && bytes[4] == b'-'
            && bytes[..4].iter().all(u8::is_ascii_digit)
            && bytes[5..].iter().all(u8::is_ascii_digit);
        if !shape_ok {
            return Err(SwifterError::InvalidMonth(s.to_string()));
        }
        match value[5..].parse::<u8>() {
            Ok(1..=12) => Ok(Self(value.to_string())),
            _ => Err(SwifterError::InvalidMonth(s.to_string())),
        }
    }
}

impl TryFrom<String> for MonthKey {
    type Error = SwifterError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MonthKey> for String {
    fn from(key: MonthKey) -> Self {
        key.0
    }
}

impl std::fmt::Display for MonthKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ledger key: `<clientKey>::<toolKey>::<monthKey>`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UsageKey(String);

impl UsageKey {
    /// Compose the key for a client, tool and month
    pub fn new(client: &ClientIdentity, tool_key: &str, month: &MonthKey) -> Self {
        Self(format!(
            "{}::{}::{}",
            client.client_key(),
            normalize_tool_key(tool_key),
            month
        ))
    }

    /// The composed key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UsageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_user_key_wins_over_ip() {
        let client = ClientIdentity::anonymous("1.2.3.4").with_token("abc");
        let client = ClientIdentity {
            user_id: Some("42".to_string()),
            ..client
        };
        assert_eq!(client.client_key(), "user:42");
    }

    #[test]
    fn test_anonymous_key() {
        assert_eq!(
            ClientIdentity::anonymous("1.2.3.4").with_token("demo").client_key(),
            "ip:1.2.3.4::token:demo"
        );
        assert_eq!(
            ClientIdentity::anonymous("5.6.7.8").client_key(),
            "ip:5.6.7.8::token:"
        );
        assert_eq!(ClientIdentity::default().client_key(), "ip:unknown::token:");
    }

    #[test]
    fn test_empty_user_id_falls_back_to_ip() {
        let client = ClientIdentity {
            user_id: Some("  ".to_string()),
            ..ClientIdentity::anonymous("9.9.9.9")
        };
        assert_eq!(client.client_key(), "ip:9.9.9.9::token:");
    }

    #[test]
    fn test_ensure_identified() {
        assert!(ClientIdentity::user("7").ensure_identified().is_ok());
        assert!(ClientIdentity::anonymous("1.1.1.1").ensure_identified().is_ok());
        assert!(ClientIdentity::default().with_token("t").ensure_identified().is_err());
    }

    #[test]
    fn test_month_key_is_utc() {
        let at = Utc.with_ymd_and_hms(2024, 10, 31, 23, 59, 59).unwrap();
        assert_eq!(MonthKey::from_datetime(at).as_str(), "2024-10");
        let at = Utc.with_ymd_and_hms(2024, 11, 1, 0, 0, 0).unwrap();
        assert_eq!(MonthKey::from_datetime(at).as_str(), "2024-11");
    }

    #[test]
    fn test_month_key_parsing() {
        assert_eq!("2026-01".parse::<MonthKey>().unwrap().as_str(), "2026-01");
        for bad in ["2026-1", "2026-13", "2026-00", "26-01", "2026/01", "abcd-ef", ""] {
            assert!(bad.parse::<MonthKey>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_first_instant_round_trips() {
        let month: MonthKey = "2024-02".parse().unwrap();
        let at = month.first_instant().unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap());
        assert_eq!(MonthKey::from_datetime(at), month);
    }

    #[test]
    fn test_usage_key() {
        let month: MonthKey = "2024-10".parse().unwrap();
        let key = UsageKey::new(&ClientIdentity::user("42"), "Compress-PDF", &month);
        assert_eq!(key.as_str(), "user:42::compress-pdf::2024-10");
    }
}
