//! Conduit records and their defaults.
//!
//! The validator only reports which fields a request carries. Defaults for
//! omitted optional fields, as declared by [`ConduitField::default_value`],
//! are applied here when a draft becomes the mutable part of a stored record.
use std::{fmt, net::IpAddr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::conduit::{
    core::{
        policy::{
            AllowlistEntry, HiddenFormField, Racm, Status, SuriType, allowlist_admits,
            filter_form, racm_permits,
        },
        validation::{ConduitDraft, ConduitField},
    },
    error::FieldErrors,
};

/// Storage-assigned conduit key, monotonic.
pub type ConduitId = u64;
/// Owning user reference.
pub type OwnerId = u64;

/// Mutable part of a conduit.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConduitFields {
    pub suri_api_key: String,
    pub suri_type: SuriType,
    pub suri: String,
    pub suri_object_key: Option<String>,
    pub allowlist: Vec<AllowlistEntry>,
    pub racm: Racm,
    pub throttle: bool,
    pub status: Status,
    pub hidden_form_field: Vec<HiddenFormField>,
    pub description: Option<String>,
}

impl ConduitFields {
    /// Builds the fields of a new or fully replaced conduit: the declared
    /// schema defaults overlaid with every field present in `draft`.
    ///
    /// # Errors
    /// A required field missing from the draft is reported as a field error.
    pub fn from_draft(draft: ConduitDraft) -> Result<Self, FieldErrors> {
        let mut full = ConduitDraft::defaults();
        full.overlay(draft);

        match full {
            ConduitDraft {
                suri_api_key: Some(suri_api_key),
                suri_type: Some(suri_type),
                suri: Some(suri),
                suri_object_key: Some(suri_object_key),
                throttle: Some(throttle),
                status: Some(status),
                description: Some(description),
                hidden_form_field: Some(hidden_form_field),
                allowlist: Some(allowlist),
                racm: Some(racm),
            } => Ok(Self {
                suri_api_key,
                suri_type,
                suri,
                suri_object_key,
                allowlist,
                racm,
                throttle,
                status,
                hidden_form_field,
                description,
            }),
            incomplete => {
                let mut errors = FieldErrors::new();
                for field in ConduitField::ALL.into_iter().filter(|f| !incomplete.carries(*f)) {
                    errors.insert(field, "is required");
                }
                Err(errors)
            }
        }
    }

    /// Overwrites only the fields present in `draft`.
    pub fn merge(&mut self, draft: ConduitDraft) {
        let ConduitDraft {
            suri_api_key,
            suri_type,
            suri,
            suri_object_key,
            throttle,
            status,
            description,
            hidden_form_field,
            allowlist,
            racm,
        } = draft;

        if let Some(suri_api_key) = suri_api_key {
            self.suri_api_key = suri_api_key;
        }
        if let Some(suri_type) = suri_type {
            self.suri_type = suri_type;
        }
        if let Some(suri) = suri {
            self.suri = suri;
        }
        if let Some(suri_object_key) = suri_object_key {
            self.suri_object_key = suri_object_key;
        }
        if let Some(throttle) = throttle {
            self.throttle = throttle;
        }
        if let Some(status) = status {
            self.status = status;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(hidden_form_field) = hidden_form_field {
            self.hidden_form_field = hidden_form_field;
        }
        if let Some(allowlist) = allowlist {
            self.allowlist = allowlist;
        }
        if let Some(racm) = racm {
            self.racm = racm;
        }
    }
}

impl fmt::Debug for ConduitFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConduitFields")
            .field("suri_api_key", &"[REDACTED]")
            .field("suri_type", &self.suri_type)
            .field("suri", &self.suri)
            .field("suri_object_key", &self.suri_object_key)
            .field("allowlist", &self.allowlist)
            .field("racm", &self.racm)
            .field("throttle", &self.throttle)
            .field("status", &self.status)
            .field("hidden_form_field", &self.hidden_form_field)
            .field("description", &self.description)
            .finish()
    }
}

/// Conduit about to be persisted. The storage assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewConduit {
    pub curi: String,
    pub user_id: OwnerId,
    pub fields: ConduitFields,
}

/// A persisted conduit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConduitRecord {
    pub id: ConduitId,
    pub curi: String,
    pub user_id: OwnerId,
    #[serde(flatten)]
    pub fields: ConduitFields,
}

impl ConduitRecord {
    pub fn from_new(id: ConduitId, new: NewConduit) -> Self {
        Self { id, curi: new.curi, user_id: new.user_id, fields: new.fields }
    }

    pub fn is_active(&self) -> bool {
        self.fields.status.is_active()
    }

    pub fn route(&self) -> ProxyRoute {
        ProxyRoute {
            curi: self.curi.clone(),
            allowlist: self.fields.allowlist.clone(),
            racm: self.fields.racm.clone(),
            hidden_form_field: self.fields.hidden_form_field.clone(),
            throttle: self.fields.throttle,
            status: self.fields.status,
        }
    }
}

/// Routing policy of a conduit as seen by the forwarding proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRoute {
    pub curi: String,
    pub allowlist: Vec<AllowlistEntry>,
    pub racm: Racm,
    pub hidden_form_field: Vec<HiddenFormField>,
    pub throttle: bool,
    pub status: Status,
}

impl ProxyRoute {
    /// Whether requests with this HTTP method may be forwarded.
    pub fn permits(&self, method: &str) -> bool {
        racm_permits(&self.racm, method)
    }

    /// Whether a client at `ip` may use the conduit.
    pub fn admits(&self, ip: IpAddr) -> bool {
        allowlist_admits(&self.allowlist, ip)
    }

    /// Payload to forward once hidden form field rules are applied.
    pub fn filter_form(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        filter_form(&self.hidden_form_field, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conduit::core::policy::HttpMethod;

    fn draft() -> ConduitDraft {
        ConduitDraft {
            suri_api_key: Some("key".to_string()),
            suri_type: Some(SuriType::Airtable),
            suri: Some("https://api.airtable.com/v0/app".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn unit_record_from_draft_applies_defaults() {
        let fields = ConduitFields::from_draft(draft()).unwrap();
        assert_eq!(fields.status, Status::Inactive);
        assert!(fields.throttle);
        assert!(fields.racm.is_empty());
        assert!(fields.allowlist.is_empty());
        assert!(fields.hidden_form_field.is_empty());
        assert_eq!(fields.description, None);
        assert_eq!(fields.suri_object_key, None);
    }

    #[test]
    fn unit_record_from_draft_requires_required_fields() {
        let errors = ConduitFields::from_draft(ConduitDraft::default()).unwrap_err();
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec![ConduitField::SuriApiKey, ConduitField::SuriType, ConduitField::Suri]
        );
    }

    #[test]
    fn unit_record_merge_only_touches_present_fields() {
        let mut fields = ConduitFields::from_draft(ConduitDraft {
            description: Some(Some("orders".to_string())),
            racm: Some([HttpMethod::Get].into_iter().collect()),
            ..draft()
        })
        .unwrap();
        fields.merge(ConduitDraft {
            status: Some(Status::Active),
            description: Some(None),
            ..Default::default()
        });
        assert_eq!(fields.status, Status::Active);
        assert_eq!(fields.description, None);
        assert_eq!(fields.racm, [HttpMethod::Get].into_iter().collect());
        assert_eq!(fields.suri_api_key, "key");
    }

    #[test]
    fn unit_record_debug_redacts_api_key() {
        let fields = ConduitFields::from_draft(ConduitDraft {
            suri_api_key: Some("keyABCDEF123".to_string()),
            ..draft()
        })
        .unwrap();
        let rendered = format!("{fields:?}");
        assert!(!rendered.contains("keyABCDEF123"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn unit_record_serializes_camel_case_flat() {
        let record = ConduitRecord::from_new(
            7,
            NewConduit {
                curi: "cd-abcdefgh.conduit.run".to_string(),
                user_id: 3,
                fields: ConduitFields::from_draft(draft()).unwrap(),
            },
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["userId"], 3);
        assert_eq!(value["suriType"], "airtable");
        assert_eq!(value["status"], "inactive");
        assert_eq!(value["hiddenFormField"], serde_json::json!([]));
    }
}
