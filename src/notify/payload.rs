//! Push payloads sent by the server.

use color_eyre::{eyre::eyre, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Expiry of a day's data, in seconds since the Unix epoch.
///
/// Serialized as a decimal string so it can be used as a JSON object key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Expiry(pub i64);

impl Expiry {
  pub fn is_after(&self, unix_seconds: i64) -> bool {
    self.0 > unix_seconds
  }
}

impl fmt::Display for Expiry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl Serialize for Expiry {
  fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&self.0)
  }
}

impl<'de> Deserialize<'de> for Expiry {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
    struct ExpiryVisitor;

    impl de::Visitor<'_> for ExpiryVisitor {
      type Value = Expiry;

      fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a unix timestamp in seconds")
      }

      fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Expiry, E> {
        Ok(Expiry(v))
      }

      fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Expiry, E> {
        i64::try_from(v)
          .map(Expiry)
          .map_err(|_| E::custom(format!("timestamp {} out of range", v)))
      }

      fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Expiry, E> {
        v.trim()
          .parse()
          .map(Expiry)
          .map_err(|_| E::custom(format!("invalid expiry timestamp '{}'", v)))
      }
    }

    deserializer.deserialize_any(ExpiryVisitor)
  }
}

/// Groups affected on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedDay {
  /// Display name of the day, e.g. "Montag"
  pub name: String,
  pub groups: BTreeSet<String>,
}

impl AffectedDay {
  pub fn new<I, S>(name: impl Into<String>, groups: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      name: name.into(),
      groups: groups.into_iter().map(Into::into).collect(),
    }
  }

  /// Groups in sorted order, comma separated.
  pub fn groups_display(&self) -> String {
    self
      .groups
      .iter()
      .map(String::as_str)
      .collect::<Vec<_>>()
      .join(", ")
  }
}

/// Affected groups bucketed by the expiry of each day.
pub type AffectedGroupsByDay = BTreeMap<Expiry, AffectedDay>;

/// New substitutions for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubsUpdatePayload {
  pub plan_id: String,
  pub affected_groups_by_day: AffectedGroupsByDay,
}

/// A decoded push message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushPayload {
  /// Free-form message, shown as is
  GenericMessage { title: String, body: String },
  SubsUpdate(SubsUpdatePayload),
}

#[derive(Deserialize)]
struct PayloadKind {
  #[serde(rename = "type")]
  kind: Option<String>,
}

#[derive(Deserialize)]
struct GenericMessagePayload {
  title: String,
  #[serde(default)]
  body: Option<String>,
}

impl PushPayload {
  /// Decode the JSON body of a push event.
  pub fn parse(data: &[u8]) -> Result<Self> {
    let kind: PayloadKind =
      serde_json::from_slice(data).map_err(|e| eyre!("Invalid push payload: {}", e))?;

    match kind.kind.as_deref() {
      Some("generic_message") => {
        let message: GenericMessagePayload = serde_json::from_slice(data)
          .map_err(|e| eyre!("Invalid generic message payload: {}", e))?;
        Ok(PushPayload::GenericMessage {
          title: message.title,
          body: message.body.unwrap_or_default(),
        })
      }
      _ => {
        let update: SubsUpdatePayload = serde_json::from_slice(data)
          .map_err(|e| eyre!("Invalid substitution update payload: {}", e))?;
        Ok(PushPayload::SubsUpdate(update))
      }
    }
  }
}
