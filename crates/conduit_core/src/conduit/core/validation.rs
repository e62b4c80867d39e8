//! Policy validation for conduit inputs.
//!
//! Inputs arrive as JSON objects so that a missing field, an explicit
//! `null` and a wrongly typed value can be told apart. The set of accepted
//! fields is declared by [`ConduitField`]; every field has a wire name, a
//! required flag, a model default and a validator, each given by an
//! exhaustive `match` so adding a field cannot skip one of them.
//!
//! The validator never touches storage and never applies defaults: a
//! successful validation yields a [`ConduitDraft`] holding exactly the
//! fields the input carried.
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use url::Url;

use crate::conduit::{
    core::policy::{
        AllowlistEntry, HffPolicy, HiddenFormField, HttpMethod, Racm, Status, SuriType,
        parse_network,
    },
    error::{ConduitError, FieldErrors},
};

/// Raw conduit input as received from the transport layer.
pub type ConduitInput = Map<String, Value>;

/// Fields that are assigned once and can never be written by a request.
pub const IMMUTABLE_FIELDS: [&str; 1] = ["curi"];

/// Declared schema of the mutable conduit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConduitField {
    SuriApiKey,
    SuriType,
    Suri,
    SuriObjectKey,
    Throttle,
    Status,
    Description,
    HiddenFormField,
    Allowlist,
    Racm,
}

impl ConduitField {
    pub const ALL: [ConduitField; 10] = [
        ConduitField::SuriApiKey,
        ConduitField::SuriType,
        ConduitField::Suri,
        ConduitField::SuriObjectKey,
        ConduitField::Throttle,
        ConduitField::Status,
        ConduitField::Description,
        ConduitField::HiddenFormField,
        ConduitField::Allowlist,
        ConduitField::Racm,
    ];

    /// Wire name of the field.
    pub const fn name(self) -> &'static str {
        match self {
            ConduitField::SuriApiKey => "suriApiKey",
            ConduitField::SuriType => "suriType",
            ConduitField::Suri => "suri",
            ConduitField::SuriObjectKey => "suriObjectKey",
            ConduitField::Throttle => "throttle",
            ConduitField::Status => "status",
            ConduitField::Description => "description",
            ConduitField::HiddenFormField => "hiddenFormField",
            ConduitField::Allowlist => "allowlist",
            ConduitField::Racm => "racm",
        }
    }

    pub const fn is_required(self) -> bool {
        match self {
            ConduitField::SuriApiKey | ConduitField::SuriType | ConduitField::Suri => true,
            ConduitField::SuriObjectKey
            | ConduitField::Throttle
            | ConduitField::Status
            | ConduitField::Description
            | ConduitField::HiddenFormField
            | ConduitField::Allowlist
            | ConduitField::Racm => false,
        }
    }

    /// Value a stored conduit takes when the field is omitted.
    ///
    /// `None` for required fields, which have no default.
    pub fn default_value(self) -> Option<Value> {
        match self {
            ConduitField::SuriApiKey | ConduitField::SuriType | ConduitField::Suri => None,
            ConduitField::SuriObjectKey | ConduitField::Description => Some(Value::Null),
            ConduitField::Throttle => Some(json!(true)),
            ConduitField::Status => Some(json!("inactive")),
            ConduitField::HiddenFormField | ConduitField::Allowlist | ConduitField::Racm => {
                Some(json!([]))
            }
        }
    }

    /// Validates `value` and records the normalized result in `draft`.
    fn apply(self, value: &Value, draft: &mut ConduitDraft) -> Result<(), String> {
        match self {
            ConduitField::SuriApiKey => {
                draft.suri_api_key = Some(required_string(value)?);
            }
            ConduitField::SuriType => {
                let kind = required_string(value)?;
                let suri_type = serde_json::from_value::<SuriType>(Value::String(kind.clone()))
                    .map_err(|_| format!("unsupported service type {kind:?}"))?;
                draft.suri_type = Some(suri_type);
            }
            ConduitField::Suri => {
                let suri = required_string(value)?;
                let url = Url::parse(&suri).map_err(|e| format!("must be an absolute URL ({e})"))?;
                if url.host().is_none() {
                    return Err("must be an absolute URL with a host".to_string());
                }
                draft.suri = Some(suri);
            }
            ConduitField::SuriObjectKey => {
                draft.suri_object_key = Some(nullable_string(value)?);
            }
            ConduitField::Throttle => {
                draft.throttle = Some(value.as_bool().ok_or("must be a boolean")?);
            }
            ConduitField::Status => {
                let status = match value.as_str() {
                    Some("active") => Status::Active,
                    Some("inactive") => Status::Inactive,
                    _ => return Err("must be either \"active\" or \"inactive\"".to_string()),
                };
                draft.status = Some(status);
            }
            ConduitField::Description => {
                draft.description = Some(nullable_string(value)?);
            }
            ConduitField::HiddenFormField => {
                let rules = entries::<HiddenFormField>(value)?;
                for (index, rule) in rules.iter().enumerate() {
                    if rule.field_name.trim().is_empty() {
                        return Err(format!("entry {index}: fieldName must not be blank"));
                    }
                    if rule.policy == HffPolicy::PassIfMatch
                        && rule.include
                        && rule.value.is_empty()
                    {
                        return Err(format!(
                            "entry {index}: value is required when policy is pass-if-match \
                             and include is true"
                        ));
                    }
                }
                draft.hidden_form_field = Some(rules);
            }
            ConduitField::Allowlist => {
                let allowlist = entries::<AllowlistEntry>(value)?;
                for (index, entry) in allowlist.iter().enumerate() {
                    if parse_network(&entry.address).is_none() {
                        return Err(format!(
                            "entry {index}: {:?} is not an IP address or CIDR network",
                            entry.address
                        ));
                    }
                }
                draft.allowlist = Some(allowlist);
            }
            ConduitField::Racm => {
                let items = value.as_array().ok_or("must be an array of HTTP methods")?;
                let mut racm = Racm::new();
                for item in items {
                    let token = item.as_str().ok_or("must be an array of HTTP methods")?;
                    racm.insert(token.parse::<HttpMethod>().map_err(|e| e.to_string())?);
                }
                draft.racm = Some(racm);
            }
        }
        Ok(())
    }
}

fn required_string(value: &Value) -> Result<String, String> {
    match value {
        Value::Null => Err("is required".to_string()),
        Value::String(s) if s.trim().is_empty() => Err("is required".to_string()),
        Value::String(s) => Ok(s.trim().to_string()),
        _ => Err("must be a string".to_string()),
    }
}

fn nullable_string(value: &Value) -> Result<Option<String>, String> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        _ => Err("must be a string or null".to_string()),
    }
}

fn entries<T: DeserializeOwned>(value: &Value) -> Result<Vec<T>, String> {
    value
        .as_array()
        .ok_or_else(|| "must be an array".to_string())?
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            serde_json::from_value::<T>(entry.clone()).map_err(|e| format!("entry {index}: {e}"))
        })
        .collect()
}

/// Normalized fields carried by a request.
///
/// `None` means the field was absent. For nullable fields the inner option
/// distinguishes an explicit `null` (clear) from a value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConduitDraft {
    pub suri_api_key: Option<String>,
    pub suri_type: Option<SuriType>,
    pub suri: Option<String>,
    pub suri_object_key: Option<Option<String>>,
    pub throttle: Option<bool>,
    pub status: Option<Status>,
    pub description: Option<Option<String>>,
    pub hidden_form_field: Option<Vec<HiddenFormField>>,
    pub allowlist: Option<Vec<AllowlistEntry>>,
    pub racm: Option<Racm>,
}

impl ConduitDraft {
    /// Draft carrying the declared default of every optional field.
    pub fn defaults() -> Self {
        let mut draft = Self::default();
        for field in ConduitField::ALL {
            if let Some(value) = field.default_value() {
                let applied = field.apply(&value, &mut draft);
                debug_assert!(applied.is_ok(), "invalid default for {}", field.name());
            }
        }
        draft
    }

    /// Whether the draft carries a value for `field`.
    pub fn carries(&self, field: ConduitField) -> bool {
        match field {
            ConduitField::SuriApiKey => self.suri_api_key.is_some(),
            ConduitField::SuriType => self.suri_type.is_some(),
            ConduitField::Suri => self.suri.is_some(),
            ConduitField::SuriObjectKey => self.suri_object_key.is_some(),
            ConduitField::Throttle => self.throttle.is_some(),
            ConduitField::Status => self.status.is_some(),
            ConduitField::Description => self.description.is_some(),
            ConduitField::HiddenFormField => self.hidden_form_field.is_some(),
            ConduitField::Allowlist => self.allowlist.is_some(),
            ConduitField::Racm => self.racm.is_some(),
        }
    }

    /// Replaces the fields carried by `other`, keeping the rest.
    pub fn overlay(&mut self, other: ConduitDraft) {
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
        } = other;
        self.suri_api_key = suri_api_key.or(self.suri_api_key.take());
        self.suri_type = suri_type.or(self.suri_type);
        self.suri = suri.or(self.suri.take());
        self.suri_object_key = suri_object_key.or(self.suri_object_key.take());
        self.throttle = throttle.or(self.throttle);
        self.status = status.or(self.status);
        self.description = description.or(self.description.take());
        self.hidden_form_field = hidden_form_field.or(self.hidden_form_field.take());
        self.allowlist = allowlist.or(self.allowlist.take());
        self.racm = racm.or(self.racm.take());
    }
}

/// Validator for conduit policy fields.
///
/// Stateless; checks inputs independently of what is stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyValidator;

impl PolicyValidator {
    /// Validates the input of a creation or full replacement.
    ///
    /// Required fields must be present and non-blank; optional fields are
    /// copied only when present. Keys outside the schema are ignored.
    pub fn validate_create(&self, input: &ConduitInput) -> Result<ConduitDraft, FieldErrors> {
        self.validate(input, true)
    }

    /// Validates a partial update. No field is required, but a required
    /// field that is present must still be valid.
    pub fn validate_patch(&self, patch: &ConduitInput) -> Result<ConduitDraft, FieldErrors> {
        self.validate(patch, false)
    }

    /// Rejects any attempt to write a write-once field, even with its current value.
    pub fn validate_immutable_fields(&self, patch: &ConduitInput) -> Result<(), ConduitError> {
        match IMMUTABLE_FIELDS.into_iter().find(|field| patch.contains_key(*field)) {
            Some(field) => Err(ConduitError::ImmutableField(field)),
            None => Ok(()),
        }
    }

    fn validate(
        &self,
        input: &ConduitInput,
        enforce_required: bool,
    ) -> Result<ConduitDraft, FieldErrors> {
        let mut draft = ConduitDraft::default();
        let mut errors = FieldErrors::new();
        for field in ConduitField::ALL {
            match input.get(field.name()) {
                None if enforce_required && field.is_required() => {
                    errors.insert(field, "is required");
                }
                None => {}
                Some(value) => {
                    if let Err(message) = field.apply(value, &mut draft) {
                        errors.insert(field, message);
                    }
                }
            }
        }
        if errors.is_empty() { Ok(draft) } else { Err(errors) }
    }
}
