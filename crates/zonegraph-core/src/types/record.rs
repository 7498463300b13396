use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::net::IpAddr;
use std::str::FromStr;

use crate::name::normalize_name;

/// DNS resource record type
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordType {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Srv,
    Txt,
    Soa,
    Caa,
    Ptr,
    Dnskey,
    Ds,
    Rrsig,
    Nsec,
    Nsec3,
    Nsec3Param,
    Svcb,
    Https,
    Tlsa,
    Sshfp,
    Uri,
    Naptr,
    Loc,
    Cert,
    Smimea,
    Openpgpkey,
    /// Any type the engine has no special handling for
    Other(String),
}

impl RecordType {
    /// Canonical upper-case mnemonic
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Cname => "CNAME",
            Self::Mx => "MX",
            Self::Ns => "NS",
            Self::Srv => "SRV",
            Self::Txt => "TXT",
            Self::Soa => "SOA",
            Self::Caa => "CAA",
            Self::Ptr => "PTR",
            Self::Dnskey => "DNSKEY",
            Self::Ds => "DS",
            Self::Rrsig => "RRSIG",
            Self::Nsec => "NSEC",
            Self::Nsec3 => "NSEC3",
            Self::Nsec3Param => "NSEC3PARAM",
            Self::Svcb => "SVCB",
            Self::Https => "HTTPS",
            Self::Tlsa => "TLSA",
            Self::Sshfp => "SSHFP",
            Self::Uri => "URI",
            Self::Naptr => "NAPTR",
            Self::Loc => "LOC",
            Self::Cert => "CERT",
            Self::Smimea => "SMIMEA",
            Self::Openpgpkey => "OPENPGPKEY",
            Self::Other(s) => s.as_str(),
        }
    }

    /// Returns true if this is an A or AAAA record type
    #[must_use]
    pub const fn is_address(&self) -> bool {
        matches!(self, Self::A | Self::Aaaa)
    }

    /// Record types whose content names another host the engine follows
    #[must_use]
    pub const fn has_host_target(&self) -> bool {
        matches!(self, Self::Cname | Self::Ns | Self::Mx | Self::Srv)
    }
}

impl FromStr for RecordType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Ok(match upper.as_str() {
            "A" => Self::A,
            "AAAA" => Self::Aaaa,
            "CNAME" => Self::Cname,
            "MX" => Self::Mx,
            "NS" => Self::Ns,
            "SRV" => Self::Srv,
            "TXT" => Self::Txt,
            "SOA" => Self::Soa,
            "CAA" => Self::Caa,
            "PTR" => Self::Ptr,
            "DNSKEY" => Self::Dnskey,
            "DS" => Self::Ds,
            "RRSIG" => Self::Rrsig,
            "NSEC" => Self::Nsec,
            "NSEC3" => Self::Nsec3,
            "NSEC3PARAM" => Self::Nsec3Param,
            "SVCB" => Self::Svcb,
            "HTTPS" => Self::Https,
            "TLSA" => Self::Tlsa,
            "SSHFP" => Self::Sshfp,
            "URI" => Self::Uri,
            "NAPTR" => Self::Naptr,
            "LOC" => Self::Loc,
            "CERT" => Self::Cert,
            "SMIMEA" => Self::Smimea,
            "OPENPGPKEY" => Self::Openpgpkey,
            _ => Self::Other(upper),
        })
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RecordType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RecordType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|never| match never {}))
    }
}

/// Record TTL: explicit seconds or provider-managed ("auto")
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Ttl {
    /// Provider-chosen TTL (Cloudflare encodes this as `1`)
    #[default]
    Auto,
    /// Explicit TTL in seconds
    Seconds(u32),
}

impl std::fmt::Display for Ttl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Seconds(s) => write!(f, "{s}"),
        }
    }
}

impl Serialize for Ttl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Auto => serializer.serialize_str("auto"),
            Self::Seconds(s) => serializer.serialize_u32(*s),
        }
    }
}

impl<'de> Deserialize<'de> for Ttl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u32),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(1) => Ok(Self::Auto),
            Raw::Number(n) => Ok(Self::Seconds(n)),
            Raw::Text(s) if s.trim().eq_ignore_ascii_case("auto") => Ok(Self::Auto),
            Raw::Text(s) => s
                .trim()
                .parse()
                .map(Self::Seconds)
                .map_err(|_| serde::de::Error::custom(format!("invalid ttl: {s}"))),
        }
    }
}

/// One record of a zone, as delivered by the zone provider.
///
/// The engine never mutates records; it only reads them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Provider-assigned record identifier
    #[serde(default)]
    pub id: String,

    /// Record type
    #[serde(rename = "type")]
    pub record_type: RecordType,

    /// Owner name (`@` for the apex)
    pub name: String,

    /// Raw record content
    #[serde(default)]
    pub content: String,

    /// Time to live
    #[serde(default)]
    pub ttl: Ttl,

    /// Priority (MX, SRV, URI)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u16>,

    /// Whether the provider proxies traffic for this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxied: Option<bool>,
}

impl Record {
    /// Create a record with automatic TTL and no priority
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        record_type: RecordType,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            record_type,
            name: name.into(),
            content: content.into(),
            ttl: Ttl::Auto,
            priority: None,
            proxied: None,
        }
    }

    /// Set the priority field
    #[must_use]
    pub const fn with_priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Parse the content into a typed payload.
    ///
    /// Returns `None` when the content is malformed for the record type.
    #[must_use]
    pub fn payload(&self) -> Option<RecordPayload> {
        RecordPayload::parse(&self.record_type, &self.content, self.priority)
    }

    /// The host or address this record points at, normalized.
    ///
    /// CNAME/NS yield the target host, MX the exchange, SRV the service
    /// target, A/AAAA the literal address. Everything else yields `None`.
    #[must_use]
    pub fn extract_target(&self) -> Option<String> {
        self.payload().and_then(|p| p.target())
    }
}

/// Typed view over a record's content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordPayload {
    /// A or AAAA literal address
    Address(IpAddr),
    /// CNAME target
    Alias {
        /// Canonical name
        target: String,
    },
    /// NS target
    NameServer {
        /// Name server host
        target: String,
    },
    /// MX preference and exchange
    MailExchange {
        /// Preference (lower wins)
        priority: u16,
        /// Mail exchange host
        exchange: String,
    },
    /// SRV service location
    Service {
        /// Priority
        priority: u16,
        /// Weight
        weight: u16,
        /// Port
        port: u16,
        /// Target host
        target: String,
    },
    /// TXT data
    Text(String),
    /// Anything else, kept verbatim
    Other(String),
}

impl RecordPayload {
    /// Parse raw content for a record type.
    ///
    /// `priority_field` is the provider's separate priority column, used when
    /// the content itself does not carry the priority.
    #[must_use]
    pub fn parse(
        record_type: &RecordType,
        content: &str,
        priority_field: Option<u16>,
    ) -> Option<Self> {
        let content = content.trim();
        match record_type {
            RecordType::A => match content.parse::<IpAddr>().ok()? {
                ip @ IpAddr::V4(_) => Some(Self::Address(ip)),
                IpAddr::V6(_) => None,
            },
            RecordType::Aaaa => match content.parse::<IpAddr>().ok()? {
                ip @ IpAddr::V6(_) => Some(Self::Address(ip)),
                IpAddr::V4(_) => None,
            },
            RecordType::Cname => host(content).map(|target| Self::Alias { target }),
            RecordType::Ns => host(content).map(|target| Self::NameServer { target }),
            RecordType::Mx => parse_mx(content, priority_field),
            RecordType::Srv => parse_srv(content, priority_field),
            RecordType::Txt => Some(Self::Text(unquote(content))),
            _ => Some(Self::Other(content.to_string())),
        }
    }

    /// Host or address this payload points at
    #[must_use]
    pub fn target(&self) -> Option<String> {
        match self {
            Self::Address(ip) => Some(ip.to_string()),
            Self::Alias { target } | Self::NameServer { target } | Self::Service { target, .. } => {
                Some(target.clone())
            }
            Self::MailExchange { exchange, .. } => Some(exchange.clone()),
            Self::Text(_) | Self::Other(_) => None,
        }
    }
}

/// Normalize a single host token; rejects empty, root and multi-token input.
fn host(raw: &str) -> Option<String> {
    let mut tokens = raw.split_whitespace();
    let first = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }
    let name = normalize_name(first);
    (!name.is_empty()).then_some(name)
}

fn parse_mx(content: &str, priority_field: Option<u16>) -> Option<RecordPayload> {
    let tokens: Vec<&str> = content.split_whitespace().collect();
    let (priority, exchange) = match tokens.as_slice() {
        [priority, exchange] => (priority.parse().ok()?, *exchange),
        [exchange] => (priority_field.unwrap_or(0), *exchange),
        _ => return None,
    };
    host(exchange).map(|exchange| RecordPayload::MailExchange { priority, exchange })
}

fn parse_srv(content: &str, priority_field: Option<u16>) -> Option<RecordPayload> {
    let tokens: Vec<&str> = content.split_whitespace().collect();
    let (priority, weight, port, target) = match tokens.as_slice() {
        [priority, weight, port, target] => (
            priority.parse().ok()?,
            weight.parse().ok()?,
            port.parse().ok()?,
            *target,
        ),
        [weight, port, target] => (
            priority_field?,
            weight.parse().ok()?,
            port.parse().ok()?,
            *target,
        ),
        _ => return None,
    };
    host(target).map(|target| RecordPayload::Service {
        priority,
        weight,
        port,
        target,
    })
}

/// Strip surrounding quotes and join multi-string TXT content.
fn unquote(content: &str) -> String {
    if !content.starts_with('"') {
        return content.to_string();
    }
    content
        .split('"')
        .enumerate()
        .filter(|(i, _)| i % 2 == 1)
        .map(|(_, part)| part)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rtype: &str, name: &str, content: &str) -> Record {
        Record::new("r1", rtype.parse().unwrap(), name, content)
    }

    #[test]
    fn test_extract_cname_and_ns_targets() {
        assert_eq!(
            record("CNAME", "www", "Edge.Example.NET.").extract_target().as_deref(),
            Some("edge.example.net")
        );
        assert_eq!(
            record("NS", "@", "ns1.provider.net").extract_target().as_deref(),
            Some("ns1.provider.net")
        );
    }

    #[test]
    fn test_extract_mx_target_after_priority() {
        let mx = record("MX", "@", "10 mail.example.net");
        assert_eq!(mx.extract_target().as_deref(), Some("mail.example.net"));
        assert_eq!(
            mx.payload(),
            Some(RecordPayload::MailExchange {
                priority: 10,
                exchange: "mail.example.net".into()
            })
        );
    }

    #[test]
    fn test_mx_without_inline_priority_uses_field() {
        let mx = record("MX", "@", "mx.example.net").with_priority(20);
        assert_eq!(
            mx.payload(),
            Some(RecordPayload::MailExchange {
                priority: 20,
                exchange: "mx.example.net".into()
            })
        );
    }

    #[test]
    fn test_extract_srv_target_after_three_fields() {
        let srv = record("SRV", "_sip._tcp", "10 60 5060 sip.example.net.");
        assert_eq!(srv.extract_target().as_deref(), Some("sip.example.net"));

        let split = record("SRV", "_sip._tcp", "60 5060 sip.example.net").with_priority(5);
        assert_eq!(
            split.payload(),
            Some(RecordPayload::Service {
                priority: 5,
                weight: 60,
                port: 5060,
                target: "sip.example.net".into()
            })
        );
    }

    #[test]
    fn test_extract_address_literal() {
        assert_eq!(
            record("A", "edge", "203.0.113.5").extract_target().as_deref(),
            Some("203.0.113.5")
        );
        assert_eq!(
            record("AAAA", "edge", "2001:db8::1").extract_target().as_deref(),
            Some("2001:db8::1")
        );
    }

    #[test]
    fn test_malformed_content_yields_none() {
        assert_eq!(record("MX", "@", "ten mail.example.net").extract_target(), None);
        assert_eq!(record("MX", "@", "").extract_target(), None);
        assert_eq!(record("MX", "@", "0 .").extract_target(), None);
        assert_eq!(record("SRV", "_x._tcp", "1 2 host").extract_target(), None);
        assert_eq!(record("SRV", "_x._tcp", "1 2 99999 host").extract_target(), None);
        assert_eq!(record("A", "x", "not-an-ip").extract_target(), None);
        assert_eq!(record("A", "x", "2001:db8::1").extract_target(), None);
        assert_eq!(record("AAAA", "x", "10.0.0.1").extract_target(), None);
        assert_eq!(record("CNAME", "x", "   ").extract_target(), None);
        assert_eq!(record("TXT", "x", "v=spf1 -all").extract_target(), None);
    }

    #[test]
    fn test_txt_unquotes_segments() {
        let txt = record("TXT", "@", r#""v=spf1 " "include:_spf.example.net -all""#);
        assert_eq!(
            txt.payload(),
            Some(RecordPayload::Text("v=spf1 include:_spf.example.net -all".into()))
        );
    }

    #[test]
    fn test_record_type_round_trips_unknown() {
        let t: RecordType = "hinfo".parse().unwrap();
        assert_eq!(t, RecordType::Other("HINFO".into()));
        assert_eq!(t.to_string(), "HINFO");
        assert_eq!("aaaa".parse::<RecordType>().unwrap(), RecordType::Aaaa);
    }

    #[test]
    fn test_deserialize_provider_record() {
        let json = r#"{
            "id": "abc",
            "type": "MX",
            "name": "example.com",
            "content": "mail.example.net",
            "ttl": 1,
            "priority": 10,
            "proxied": false
        }"#;
        let rec: Record = serde_json::from_str(json).unwrap();
        assert_eq!(rec.record_type, RecordType::Mx);
        assert_eq!(rec.ttl, Ttl::Auto);
        assert_eq!(rec.priority, Some(10));
        assert_eq!(rec.extract_target().as_deref(), Some("mail.example.net"));
    }

    #[test]
    fn test_ttl_accepts_auto_and_numbers() {
        let auto: Ttl = serde_json::from_str(r#""auto""#).unwrap();
        assert_eq!(auto, Ttl::Auto);
        let secs: Ttl = serde_json::from_str("300").unwrap();
        assert_eq!(secs, Ttl::Seconds(300));
        assert!(serde_json::from_str::<Ttl>(r#""soon""#).is_err());
    }
}
