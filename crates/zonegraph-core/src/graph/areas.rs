//! Functional area tagging for owner names.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::types::{Record, RecordPayload, RecordType};

/// Functional area a name belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Area {
    /// Mail delivery and authentication
    Email,
    /// Web and service endpoints
    Web,
    /// Delegation, DNSSEC and zone metadata
    Infra,
    /// Nothing recognizable
    Misc,
}

impl std::fmt::Display for Area {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Web => write!(f, "web"),
            Self::Infra => write!(f, "infra"),
            Self::Misc => write!(f, "misc"),
        }
    }
}

const EMAIL_LABELS: [&str; 3] = ["_dmarc", "_domainkey", "_bimi"];
const EMAIL_TXT_PREFIXES: [&str; 4] = ["v=spf1", "v=dmarc1", "v=dkim1", "v=bimi1"];

/// Tag a normalized name with its areas.
///
/// `email_path_names` holds MX exchanges and the hops leading to them.
/// Always returns at least [`Area::Misc`].
#[must_use]
pub fn classify_areas(
    name: &str,
    records_at_name: &[&Record],
    email_path_names: &HashSet<String>,
) -> BTreeSet<Area> {
    let mut areas = BTreeSet::new();

    if email_path_names.contains(name) || name.split('.').any(|label| EMAIL_LABELS.contains(&label)) {
        areas.insert(Area::Email);
    }

    for record in records_at_name {
        match &record.record_type {
            RecordType::Mx => {
                areas.insert(Area::Email);
            }
            RecordType::Txt => {
                if let Some(RecordPayload::Text(text)) = record.payload() {
                    let lower = text.trim_start().to_ascii_lowercase();
                    if EMAIL_TXT_PREFIXES.iter().any(|p| lower.starts_with(p)) {
                        areas.insert(Area::Email);
                    }
                }
            }
            RecordType::Other(t) if t == "SPF" => {
                areas.insert(Area::Email);
            }
            RecordType::Ns
            | RecordType::Soa
            | RecordType::Caa
            | RecordType::Dnskey
            | RecordType::Ds
            | RecordType::Rrsig
            | RecordType::Nsec
            | RecordType::Nsec3
            | RecordType::Nsec3Param => {
                areas.insert(Area::Infra);
            }
            RecordType::A
            | RecordType::Aaaa
            | RecordType::Cname
            | RecordType::Svcb
            | RecordType::Https
            | RecordType::Srv => {
                areas.insert(Area::Web);
            }
            _ => {}
        }
    }

    if areas.is_empty() {
        areas.insert(Area::Misc);
    }
    areas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(rtype: RecordType, name: &str, content: &str) -> Record {
        Record::new("r", rtype, name, content)
    }

    #[test]
    fn test_mx_and_spf_are_email() {
        let mx = rec(RecordType::Mx, "@", "10 mail.example.net");
        let spf = rec(RecordType::Txt, "@", "\"v=spf1 include:_spf.example.net ~all\"");
        let areas = classify_areas("example.com", &[&mx, &spf], &HashSet::new());
        assert!(areas.contains(&Area::Email));
        assert!(!areas.contains(&Area::Misc));
    }

    #[test]
    fn test_dmarc_label_is_email() {
        let txt = rec(RecordType::Txt, "_dmarc", "v=DMARC1; p=reject");
        let areas = classify_areas("_dmarc.example.com", &[&txt], &HashSet::new());
        assert_eq!(areas, BTreeSet::from([Area::Email]));

        let dkim = classify_areas("s1._domainkey.example.com", &[], &HashSet::new());
        assert_eq!(dkim, BTreeSet::from([Area::Email]));
    }

    #[test]
    fn test_email_path_names_are_email() {
        let a = rec(RecordType::A, "mail", "192.0.2.25");
        let path = HashSet::from(["mail".to_string()]);
        let areas = classify_areas("mail", &[&a], &path);
        assert_eq!(areas, BTreeSet::from([Area::Email, Area::Web]));
    }

    #[test]
    fn test_infra_and_web_types() {
        let ns = rec(RecordType::Ns, "@", "ns1.example.net");
        let caa = rec(RecordType::Caa, "@", "0 issue \"letsencrypt.org\"");
        let https = rec(RecordType::Https, "@", "1 . alpn=h2");
        let areas = classify_areas("example.com", &[&ns, &caa, &https], &HashSet::new());
        assert_eq!(areas, BTreeSet::from([Area::Web, Area::Infra]));
    }

    #[test]
    fn test_unknown_is_misc() {
        let txt = rec(RecordType::Txt, "@", "google-site-verification=abc");
        let areas = classify_areas("example.com", &[&txt], &HashSet::new());
        assert_eq!(areas, BTreeSet::from([Area::Misc]));
        assert_eq!(
            classify_areas("x", &[], &HashSet::new()),
            BTreeSet::from([Area::Misc])
        );
    }
}
