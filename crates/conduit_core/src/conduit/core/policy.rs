//! # Access Policy Module
//!
//! Types describing the access policy attached to a conduit and the decision
//! helpers the forwarding proxy evaluates on every request.
//!
//! A policy has three dimensions:
//!
//! - **RACM** (Request Access Control Methods): the HTTP verbs permitted
//!   through the conduit, drawn from a fixed whitelist
//! - **Allowlist**: IP addresses and CIDR networks admitted as clients
//! - **Hidden form fields**: per-field redaction or pass-through rules
//!   applied to forwarded payloads
//!
//! ## Defaults
//!
//! Every dimension defaults to its most restrictive value: an empty RACM
//! permits no method, an allowlist without active entries admits nobody and
//! an empty rule list forwards payloads unchanged.
use std::{collections::BTreeSet, fmt, net::IpAddr, str::FromStr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// HTTP verbs a conduit can permit.
///
/// Declaration order is the order in which a [`Racm`] set is stored and
/// rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] =
        [HttpMethod::Get, HttpMethod::Post, HttpMethod::Put, HttpMethod::Patch, HttpMethod::Delete];

    pub const fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a token is not one of the supported verbs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedMethod(pub String);

impl fmt::Display for UnsupportedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported method {}", self.0)
    }
}

impl FromStr for HttpMethod {
    type Err = UnsupportedMethod;

    /// Matching is exact: `get` or `Get` are not accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|method| method.as_str() == s)
            .ok_or_else(|| UnsupportedMethod(s.to_string()))
    }
}

/// Set of HTTP methods permitted through a conduit.
pub type Racm = BTreeSet<HttpMethod>;

/// Activation state shared by conduits and allowlist entries.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Active,
    /// New conduits start inactive and are invisible to the proxy (default)
    #[default]
    Inactive,
}

impl Status {
    pub fn is_active(self) -> bool {
        self == Status::Active
    }
}

/// Kind of third-party backend a conduit forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuriType {
    Airtable,
    GoogleSheets,
    Smartsheet,
    Notion,
}

/// One client address admitted by a conduit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowlistEntry {
    /// IP address or CIDR network, as supplied by the owner
    pub address: String,
    /// Only active entries are enforced by the proxy
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl AllowlistEntry {
    pub fn new(address: impl Into<String>, status: Status) -> Self {
        Self { address: address.into(), status, comment: None }
    }

    /// Parses the address as a network. A bare IP becomes a host network.
    pub fn network(&self) -> Option<IpNet> {
        parse_network(&self.address)
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.network().is_some_and(|net| net.contains(&ip))
    }
}

pub(crate) fn parse_network(address: &str) -> Option<IpNet> {
    if let Ok(net) = address.parse::<IpNet>() {
        return Some(net);
    }
    let ip = address.parse::<IpAddr>().ok()?;
    let host_prefix = if ip.is_ipv4() { 32 } else { 128 };
    IpNet::new(ip, host_prefix).ok()
}

/// Treatment applied to a hidden form field before forwarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HffPolicy {
    /// Strip the field when it carries a value (honeypot fields)
    DropIfFilled,
    /// Forward the field only when it is included and equals the expected value
    PassIfMatch,
}

/// Redaction or pass-through rule for one payload field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HiddenFormField {
    pub field_name: String,
    pub policy: HffPolicy,
    #[serde(default)]
    pub include: bool,
    #[serde(default)]
    pub value: String,
}

impl HiddenFormField {
    pub fn drop_if_filled(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            policy: HffPolicy::DropIfFilled,
            include: false,
            value: String::new(),
        }
    }

    pub fn pass_if_match(field_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            policy: HffPolicy::PassIfMatch,
            include: true,
            value: value.into(),
        }
    }

    /// Decides whether the payload value of this field is forwarded.
    fn keeps(&self, value: &Value) -> bool {
        match self.policy {
            HffPolicy::DropIfFilled => !is_filled(value),
            HffPolicy::PassIfMatch => self.include && value_matches(value, &self.value),
        }
    }
}

fn is_filled(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn value_matches(value: &Value, expected: &str) -> bool {
    match value {
        Value::String(s) => s == expected,
        Value::Null => false,
        other => other.to_string() == expected,
    }
}

/// Returns whether `method` is permitted by `racm`.
pub fn racm_permits(racm: &Racm, method: &str) -> bool {
    method.parse::<HttpMethod>().is_ok_and(|method| racm.contains(&method))
}

/// Returns whether `ip` falls inside an active allowlist entry.
pub fn allowlist_admits(allowlist: &[AllowlistEntry], ip: IpAddr) -> bool {
    allowlist.iter().filter(|entry| entry.status.is_active()).any(|entry| entry.contains(ip))
}

/// Applies hidden form field rules to a payload.
///
/// Fields without a rule are forwarded unchanged. When several rules target
/// the same field, the field is forwarded only if every rule keeps it.
pub fn filter_form(rules: &[HiddenFormField], payload: &Map<String, Value>) -> Map<String, Value> {
    payload
        .iter()
        .filter(|(name, value)| {
            rules.iter().filter(|rule| &rule.field_name == *name).all(|rule| rule.keeps(value))
        })
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unit_policy_http_method_parsing_is_exact() {
        assert_eq!("GET".parse::<HttpMethod>(), Ok(HttpMethod::Get));
        assert_eq!("DELETE".parse::<HttpMethod>(), Ok(HttpMethod::Delete));
        assert_eq!("get".parse::<HttpMethod>(), Err(UnsupportedMethod("get".to_string())));
        assert!("HEAD".parse::<HttpMethod>().is_err());
        assert!("TRACE".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn unit_policy_racm_is_ordered_and_serialized_uppercase() {
        let racm: Racm =
            [HttpMethod::Delete, HttpMethod::Get, HttpMethod::Get].into_iter().collect();
        assert_eq!(serde_json::to_value(&racm).unwrap(), json!(["GET", "DELETE"]));
        assert!(racm_permits(&racm, "GET"));
        assert!(!racm_permits(&racm, "POST"));
        assert!(!racm_permits(&racm, "HEAD"));
        assert!(!racm_permits(&Racm::new(), "GET"));
    }

    #[test]
    fn unit_policy_allowlist_admits_active_entries_only() {
        let allowlist = vec![
            AllowlistEntry::new("10.0.0.0/8", Status::Active),
            AllowlistEntry::new("192.168.1.7", Status::Active),
            AllowlistEntry::new("172.16.0.0/12", Status::Inactive),
            AllowlistEntry::new("2001:db8::/32", Status::Active),
        ];
        assert!(allowlist_admits(&allowlist, "10.20.30.40".parse().unwrap()));
        assert!(allowlist_admits(&allowlist, "192.168.1.7".parse().unwrap()));
        assert!(!allowlist_admits(&allowlist, "192.168.1.8".parse().unwrap()));
        assert!(!allowlist_admits(&allowlist, "172.16.0.1".parse().unwrap()));
        assert!(allowlist_admits(&allowlist, "2001:db8::1".parse().unwrap()));
        assert!(!allowlist_admits(&[], "10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn unit_policy_allowlist_entry_rejects_unknown_keys() {
        let parsed: Result<AllowlistEntry, _> = serde_json::from_value(json!({"random": "random"}));
        assert!(parsed.is_err());
        let parsed: AllowlistEntry = serde_json::from_value(
            json!({"address": "123.234.123.234", "status": "inactive", "comment": "x"}),
        )
        .unwrap();
        assert_eq!(parsed.status, Status::Inactive);
        assert_eq!(parsed.comment.as_deref(), Some("x"));
    }

    #[test]
    fn unit_policy_filter_form_drop_if_filled() {
        let rules = vec![HiddenFormField::drop_if_filled("honeypot")];
        let payload = json!({"name": "Ada", "honeypot": "bot was here"});
        let filtered = filter_form(&rules, payload.as_object().unwrap());
        assert_eq!(Value::Object(filtered), json!({"name": "Ada"}));

        let payload = json!({"name": "Ada", "honeypot": "  "});
        let filtered = filter_form(&rules, payload.as_object().unwrap());
        assert_eq!(Value::Object(filtered), json!({"name": "Ada", "honeypot": "  "}));
    }

    #[test]
    fn unit_policy_filter_form_pass_if_match() {
        let rules = vec![
            HiddenFormField::pass_if_match("source", "landing-page"),
            HiddenFormField {
                field_name: "campaign".to_string(),
                policy: HffPolicy::PassIfMatch,
                include: false,
                value: "spring".to_string(),
            },
        ];
        let payload = json!({"source": "landing-page", "campaign": "spring", "email": "a@b.c"});
        let filtered = filter_form(&rules, payload.as_object().unwrap());
        assert_eq!(Value::Object(filtered), json!({"source": "landing-page", "email": "a@b.c"}));

        let payload = json!({"source": "elsewhere"});
        assert!(filter_form(&rules, payload.as_object().unwrap()).is_empty());
    }
}
