// Decoded record payloads
//
// Each catalog collection has its own schema. Fields the schema does not name
// are kept in a flattened `extra` map so nothing from the source is dropped.

use serde::de::{DeserializeOwned, Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

const ACCESS_POINT_HOST: &str = "accesspoint-jgeyja4kne59ihb37jud8qefh8ytsuse2a-s3alias.s3-accesspoint";
const PUBLIC_BUCKET_HOST: &str = "tft-set14.s3";

/// Payload schema selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Champion,
    Trait,
    Item,
    Augment,
}

/// A field that may arrive decoded or still JSON-encoded inside a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Encoded<T> {
    Decoded(T),
    Raw(String),
}

impl<T: DeserializeOwned> Encoded<T> {
    /// Decode a raw string in place
    ///
    /// On failure the field stays raw and the error is returned.
    pub fn resolve(&mut self) -> Result<(), serde_json::Error> {
        if let Encoded::Raw(s) = self {
            let value = serde_json::from_str(s)?;
            *self = Encoded::Decoded(value);
        }
        Ok(())
    }

    /// Wrap a JSON value; a value that is neither `T` nor a string keeps its
    /// JSON text as `Raw`
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => Encoded::Raw(s),
            other => match T::deserialize(&other) {
                Ok(decoded) => Encoded::Decoded(decoded),
                Err(_) => Encoded::Raw(other.to_string()),
            },
        }
    }

    pub fn decoded(&self) -> Option<&T> {
        match self {
            Encoded::Decoded(value) => Some(value),
            Encoded::Raw(_) => None,
        }
    }
}

/// Champion payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionPayload {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub cost: Option<u32>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient_encoded", skip_serializing_if = "Option::is_none")]
    pub stats: Option<Encoded<ChampionStats>>,
    #[serde(default, deserialize_with = "lenient_encoded", skip_serializing_if = "Option::is_none")]
    pub ability: Option<Encoded<ChampionAbility>>,
    /// A list of names, or a string encoding one; any JSON is accepted here
    /// and checked by `Payload::normalize`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<Value>,
    /// Normalized trait list, filled by `Payload::normalize`
    #[serde(skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub parsed_traits: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChampionPayload {
    fn normalize_traits(&mut self) -> Option<serde_json::Error> {
        let Some(value) = self.traits.take() else {
            self.parsed_traits.clear();
            return None;
        };

        let (traits, error) = trait_list(value);
        self.traits = Some(Value::Array(traits.iter().cloned().map(Value::String).collect()));
        self.parsed_traits = traits;
        error
    }
}

/// Champion base stats; numbers may arrive as strings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionStats {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub armor: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub attack_speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub crit_chance: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub crit_multiplier: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub damage: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub initial_mana: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub magic_resist: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub mana: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub range: Option<f64>,
}

/// Champion ability; per-ability variables (e.g. "Damage") land in `variables`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChampionAbility {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(flatten)]
    pub variables: Map<String, Value>,
}

/// Trait payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraitPayload {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Item payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub image_low_s3: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub image_high_s3: Option<String>,
    #[serde(default, deserialize_with = "lenient_encoded", skip_serializing_if = "Option::is_none")]
    pub tags: Option<Encoded<Vec<String>>>,
    #[serde(default, deserialize_with = "lenient_encoded", skip_serializing_if = "Option::is_none")]
    pub composition: Option<Encoded<Vec<String>>>,
    #[serde(default, deserialize_with = "lenient_encoded", skip_serializing_if = "Option::is_none")]
    pub effects: Option<Encoded<Map<String, Value>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Augment payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AugmentPayload {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub api_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub image_low_s3: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub image_high_s3: Option<String>,
    #[serde(default, deserialize_with = "lenient_encoded", skip_serializing_if = "Option::is_none")]
    pub tags: Option<Encoded<Vec<String>>>,
    #[serde(default, deserialize_with = "lenient_encoded", skip_serializing_if = "Option::is_none")]
    pub effects: Option<Encoded<Map<String, Value>>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded payload of a record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Champion(ChampionPayload),
    Trait(TraitPayload),
    Item(ItemPayload),
    Augment(AugmentPayload),
    /// Collections without a schema (builds, users)
    Other(Map<String, Value>),
}

impl Payload {
    /// Decode a raw payload with the schema for `kind`
    ///
    /// Any JSON object decodes. Typed fields of an unexpected shape are kept
    /// leniently; if the object still does not fit the schema it is kept
    /// untyped as `Payload::Other`.
    pub fn decode(kind: Option<PayloadKind>, raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(serde_json::Error::custom("payload is not a JSON object"));
        }

        let typed = match kind {
            Some(PayloadKind::Champion) => ChampionPayload::deserialize(&value).map(Payload::Champion),
            Some(PayloadKind::Trait) => TraitPayload::deserialize(&value).map(Payload::Trait),
            Some(PayloadKind::Item) => ItemPayload::deserialize(&value).map(Payload::Item),
            Some(PayloadKind::Augment) => AugmentPayload::deserialize(&value).map(Payload::Augment),
            None => return Ok(Payload::Other(into_map(value))),
        };

        match typed {
            Ok(payload) => Ok(payload),
            Err(e) => {
                warn!(?kind, error = %e, "Payload does not fit its schema, keeping it untyped");
                Ok(Payload::Other(into_map(value)))
            }
        }
    }

    /// Resolve encoded fields once, after decoding
    ///
    /// Champion traits always end up as a list. Every other field holding
    /// an encoded object or array is decoded when possible and left as the
    /// original string otherwise. Returns the error of malformed traits; the
    /// string entries of a list are kept and any other shape yields none.
    ///
    /// Running this on an already normalized payload changes nothing.
    ///
    /// Only `extra` and the encoded fields of the schema are checked for
    /// encoded objects or arrays; typed string fields such as `name`, `desc`
    /// and `role` stay as received.
    pub fn normalize(&mut self) -> Option<serde_json::Error> {
        let traits_error = match self {
            Payload::Champion(champion) => {
                resolve_quietly(&mut champion.stats);
                resolve_quietly(&mut champion.ability);
                champion.normalize_traits()
            }
            Payload::Item(item) => {
                resolve_quietly(&mut item.tags);
                resolve_quietly(&mut item.composition);
                resolve_quietly(&mut item.effects);
                None
            }
            Payload::Augment(augment) => {
                resolve_quietly(&mut augment.tags);
                resolve_quietly(&mut augment.effects);
                None
            }
            Payload::Trait(_) | Payload::Other(_) => None,
        };

        decode_nested(self.extra_mut());
        traits_error
    }

    pub fn kind(&self) -> Option<PayloadKind> {
        match self {
            Payload::Champion(_) => Some(PayloadKind::Champion),
            Payload::Trait(_) => Some(PayloadKind::Trait),
            Payload::Item(_) => Some(PayloadKind::Item),
            Payload::Augment(_) => Some(PayloadKind::Augment),
            Payload::Other(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Payload::Champion(p) => p.name.as_deref(),
            Payload::Trait(p) => p.name.as_deref(),
            Payload::Item(p) => p.name.as_deref(),
            Payload::Augment(p) => p.name.as_deref(),
            Payload::Other(map) => map.get("name").and_then(Value::as_str),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Payload::Champion(p) => p.ability.as_ref().and_then(Encoded::decoded).and_then(|a| a.desc.as_deref()),
            Payload::Trait(p) => p.desc.as_deref(),
            Payload::Item(p) => p.desc.as_deref(),
            Payload::Augment(p) => p.desc.as_deref(),
            Payload::Other(map) => map
                .get("desc")
                .or_else(|| map.get("description"))
                .and_then(Value::as_str),
        }
    }

    pub fn cost(&self) -> Option<u32> {
        match self {
            Payload::Champion(p) => p.cost,
            _ => None,
        }
    }

    pub fn role(&self) -> Option<&str> {
        match self {
            Payload::Champion(p) => p.role.as_deref(),
            _ => None,
        }
    }

    /// Normalized champion traits; empty for every other kind
    pub fn traits(&self) -> &[String] {
        match self {
            Payload::Champion(p) => &p.parsed_traits,
            _ => &[],
        }
    }

    /// Public URL of the low resolution image, when the payload has one
    pub fn image_url(&self) -> Option<String> {
        let url = match self {
            Payload::Item(p) => p.image_low_s3.as_deref(),
            Payload::Augment(p) => p.image_low_s3.as_deref(),
            _ => self.extra().get("imageLowS3").and_then(Value::as_str),
        };
        url.map(public_image_url)
    }

    /// Fields outside the schema
    pub fn extra(&self) -> &Map<String, Value> {
        match self {
            Payload::Champion(p) => &p.extra,
            Payload::Trait(p) => &p.extra,
            Payload::Item(p) => &p.extra,
            Payload::Augment(p) => &p.extra,
            Payload::Other(map) => map,
        }
    }

    fn extra_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Payload::Champion(p) => &mut p.extra,
            Payload::Trait(p) => &mut p.extra,
            Payload::Item(p) => &mut p.extra,
            Payload::Augment(p) => &mut p.extra,
            Payload::Other(map) => map,
        }
    }
}

/// Whether a string looks like an encoded object or array
pub fn looks_encoded(s: &str) -> bool {
    s.starts_with('{') || s.starts_with('[')
}

/// Best-effort decode of string fields holding encoded objects or arrays
pub fn decode_nested(fields: &mut Map<String, Value>) {
    for value in fields.values_mut() {
        let Value::String(s) = value else {
            continue;
        };
        if !looks_encoded(s) {
            continue;
        }
        if let Ok(decoded) = serde_json::from_str::<Value>(s) {
            *value = decoded;
        }
    }
}

/// Rewrite an S3 access-point image URL to the public bucket
pub fn public_image_url(url: &str) -> String {
    url.to_lowercase().replace(ACCESS_POINT_HOST, PUBLIC_BUCKET_HOST)
}

/// Normalize a traits value to a list of names
///
/// Accepts a list or a string encoding one. Non-string entries are skipped
/// and any other shape yields no traits; both report an error.
fn trait_list(value: Value) -> (Vec<String>, Option<serde_json::Error>) {
    match value {
        Value::Null => (Vec::new(), None),
        Value::Array(items) => trait_names(items),
        Value::String(s) if s.trim().is_empty() => (Vec::new(), None),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Array(items)) => trait_names(items),
            Ok(other) => (Vec::new(), Some(not_a_list(&other))),
            Err(e) => (Vec::new(), Some(e)),
        },
        other => (Vec::new(), Some(not_a_list(&other))),
    }
}

fn trait_names(items: Vec<Value>) -> (Vec<String>, Option<serde_json::Error>) {
    let total = items.len();
    let names: Vec<String> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name),
            _ => None,
        })
        .collect();

    let skipped = total - names.len();
    let error = (skipped > 0).then(|| serde_json::Error::custom(format!("skipped {} non-string trait(s)", skipped)));
    (names, error)
}

fn not_a_list(value: &Value) -> serde_json::Error {
    serde_json::Error::custom(format!("expected a list of traits, got {}", value))
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(fields) => fields,
        _ => Map::new(),
    }
}

fn resolve_quietly<T: DeserializeOwned>(field: &mut Option<Encoded<T>>) {
    if let Some(encoded) = field {
        if matches!(encoded, Encoded::Raw(s) if looks_encoded(s)) {
            // Not valid JSON, keep as is
            let _ = encoded.resolve();
        }
    }
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.map(|value| match value {
        Value::String(s) => s,
        other => other.to_string(),
    }))
}

fn lenient_encoded<'de, D, T>(deserializer: D) -> Result<Option<Encoded<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value.map(Encoded::from_value))
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Value> = Option::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(number_from)
        .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32))
}
