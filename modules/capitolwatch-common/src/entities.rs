use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Bill,
    Legislator,
    Committee,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bill => write!(f, "bill"),
            Self::Legislator => write!(f, "legislator"),
            Self::Committee => write!(f, "committee"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Chamber {
    Upper,
    Lower,
    Legislature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    Democratic,
    Republican,
    Independent,
    Libertarian,
    Green,
    Unaffiliated,
    Other,
}

// ---------------------------------------------------------------------------
// Natural keys
// ---------------------------------------------------------------------------

/// Stable, source-independent identity of a canonical entity. Components are
/// stored normalized so two spellings of the same key compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NaturalKey {
    Bill {
        jurisdiction: String,
        session: String,
        identifier: String,
    },
    Legislator {
        jurisdiction: String,
        name: String,
        district: String,
    },
    Committee {
        jurisdiction: String,
        chamber: String,
        name: String,
    },
}

impl NaturalKey {
    pub fn bill(jurisdiction: &str, session: &str, identifier: &str) -> Self {
        Self::Bill {
            jurisdiction: normalize_jurisdiction(jurisdiction),
            session: session.trim().to_string(),
            identifier: normalize_bill_identifier(identifier),
        }
    }

    pub fn legislator(jurisdiction: &str, name: &str, district: &str) -> Self {
        Self::Legislator {
            jurisdiction: normalize_jurisdiction(jurisdiction),
            name: normalize_text(name),
            district: normalize_text(district),
        }
    }

    pub fn committee(jurisdiction: &str, chamber: Option<Chamber>, name: &str) -> Self {
        let chamber = match chamber {
            Some(Chamber::Upper) => "upper",
            Some(Chamber::Lower) => "lower",
            Some(Chamber::Legislature) | None => "legislature",
        };
        Self::Committee {
            jurisdiction: normalize_jurisdiction(jurisdiction),
            chamber: chamber.to_string(),
            name: normalize_text(name),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Bill { .. } => EntityKind::Bill,
            Self::Legislator { .. } => EntityKind::Legislator,
            Self::Committee { .. } => EntityKind::Committee,
        }
    }

    /// Every component is non-empty after normalization.
    pub fn is_complete(&self) -> bool {
        let parts: [&str; 3] = match self {
            Self::Bill {
                jurisdiction,
                session,
                identifier,
            } => [jurisdiction, session, identifier],
            Self::Legislator {
                jurisdiction,
                name,
                district,
            } => [jurisdiction, name, district],
            Self::Committee {
                jurisdiction,
                chamber,
                name,
            } => [jurisdiction, chamber, name],
        };
        parts.iter().all(|p| !p.is_empty())
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bill {
                jurisdiction,
                session,
                identifier,
            } => write!(f, "bill/{jurisdiction}/{session}/{identifier}"),
            Self::Legislator {
                jurisdiction,
                name,
                district,
            } => write!(f, "legislator/{jurisdiction}/{district}/{name}"),
            Self::Committee {
                jurisdiction,
                chamber,
                name,
            } => write!(f, "committee/{jurisdiction}/{chamber}/{name}"),
        }
    }
}

/// `"CO"`, `"co"` and `"ocd-jurisdiction/country:us/state:co/government"` all become `"co"`.
pub fn normalize_jurisdiction(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(rest) = raw.strip_prefix("ocd-jurisdiction/") {
        if let Some(state) = rest
            .split('/')
            .find_map(|part| part.strip_prefix("state:"))
        {
            return state.to_ascii_lowercase();
        }
    }
    raw.to_ascii_lowercase()
}

/// `"hb 25-1001"` and `"HB25-1001"` both become `"HB25-1001"`.
pub fn normalize_bill_identifier(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Lowercase with runs of whitespace collapsed.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ---------------------------------------------------------------------------
// Canonical entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentLink {
    pub note: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bill {
    pub jurisdiction: String,
    pub session: String,
    pub identifier: String,
    pub title: String,
    pub chamber: Option<Chamber>,
    #[serde(default)]
    pub classification: Vec<String>,
    #[serde(default)]
    pub subjects: Vec<String>,
    #[serde(default)]
    pub sponsors: Vec<String>,
    pub latest_action: Option<String>,
    pub latest_action_date: Option<String>,
    #[serde(default)]
    pub documents: Vec<DocumentLink>,
    #[serde(default)]
    pub versions: Vec<DocumentLink>,
    pub source_url: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_synced_at: BTreeMap<String, DateTime<Utc>>,
}

impl Bill {
    pub fn fiscal_notes(&self) -> impl Iterator<Item = &DocumentLink> {
        self.documents
            .iter()
            .filter(|d| d.note.to_lowercase().contains("fiscal"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Legislator {
    pub jurisdiction: String,
    pub name: String,
    pub district: String,
    pub party: Party,
    pub chamber: Option<Chamber>,
    pub email: Option<String>,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_synced_at: BTreeMap<String, DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Committee {
    pub jurisdiction: String,
    pub name: String,
    pub chamber: Option<Chamber>,
    pub classification: Option<String>,
    #[serde(default)]
    pub members: Vec<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub last_synced_at: BTreeMap<String, DateTime<Utc>>,
}

/// Merged, de-duplicated record held by the persisted store. At most one
/// exists per natural key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CanonicalEntity {
    Bill(Bill),
    Legislator(Legislator),
    Committee(Committee),
}

/// One field that differs between the stored entity and an incoming record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub before: Value,
    pub after: Value,
}

impl CanonicalEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Bill(_) => EntityKind::Bill,
            Self::Legislator(_) => EntityKind::Legislator,
            Self::Committee(_) => EntityKind::Committee,
        }
    }

    pub fn natural_key(&self) -> NaturalKey {
        match self {
            Self::Bill(b) => NaturalKey::bill(&b.jurisdiction, &b.session, &b.identifier),
            Self::Legislator(l) => NaturalKey::legislator(&l.jurisdiction, &l.name, &l.district),
            Self::Committee(c) => NaturalKey::committee(&c.jurisdiction, c.chamber, &c.name),
        }
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::Bill(b) => b.updated_at,
            Self::Legislator(l) => l.updated_at,
            Self::Committee(c) => c.updated_at,
        }
    }

    pub fn set_updated_at(&mut self, at: DateTime<Utc>) {
        match self {
            Self::Bill(b) => b.updated_at = at,
            Self::Legislator(l) => l.updated_at = at,
            Self::Committee(c) => c.updated_at = at,
        }
    }

    pub fn last_synced_at(&self) -> &BTreeMap<String, DateTime<Utc>> {
        match self {
            Self::Bill(b) => &b.last_synced_at,
            Self::Legislator(l) => &l.last_synced_at,
            Self::Committee(c) => &c.last_synced_at,
        }
    }

    fn last_synced_at_mut(&mut self) -> &mut BTreeMap<String, DateTime<Utc>> {
        match self {
            Self::Bill(b) => &mut b.last_synced_at,
            Self::Legislator(l) => &mut l.last_synced_at,
            Self::Committee(c) => &mut c.last_synced_at,
        }
    }

    /// Record a sync by `source_id`. Never moves a source's timestamp backwards.
    pub fn mark_synced(&mut self, source_id: &str, at: DateTime<Utc>) {
        let entry = self
            .last_synced_at_mut()
            .entry(source_id.to_string())
            .or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    /// Merge another entity's sync timestamps into this one, keeping the max per source.
    pub fn merge_synced(&mut self, other: &BTreeMap<String, DateTime<Utc>>) {
        for (source, at) in other {
            self.mark_synced(source, *at);
        }
    }

    /// The fields the reconciler compares. Bookkeeping (timestamps) is excluded.
    pub fn mapped_fields(&self) -> BTreeMap<&'static str, Value> {
        let mut fields = BTreeMap::new();
        match self {
            Self::Bill(b) => {
                fields.insert("title", json!(b.title));
                fields.insert("chamber", json!(b.chamber));
                fields.insert("classification", json!(b.classification));
                fields.insert("subjects", json!(b.subjects));
                fields.insert("sponsors", json!(b.sponsors));
                fields.insert("latest_action", json!(b.latest_action));
                fields.insert("latest_action_date", json!(b.latest_action_date));
                fields.insert("documents", json!(b.documents));
                fields.insert("versions", json!(b.versions));
                fields.insert("source_url", json!(b.source_url));
            }
            Self::Legislator(l) => {
                fields.insert("name", json!(l.name));
                fields.insert("party", json!(l.party));
                fields.insert("chamber", json!(l.chamber));
                fields.insert("email", json!(l.email));
                fields.insert("active", json!(l.active));
            }
            Self::Committee(c) => {
                fields.insert("name", json!(c.name));
                fields.insert("classification", json!(c.classification));
                fields.insert("members", json!(c.members));
            }
        }
        fields
    }

    /// Field-level differences going from `self` to `incoming`, in field-name order.
    pub fn diff(&self, incoming: &CanonicalEntity) -> Vec<FieldChange> {
        let before = self.mapped_fields();
        let after = incoming.mapped_fields();
        after
            .into_iter()
            .filter_map(|(field, new)| {
                let old = before.get(field).cloned().unwrap_or(Value::Null);
                (old != new).then(|| FieldChange {
                    field: field.to_string(),
                    before: old,
                    after: new,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bill(title: &str) -> CanonicalEntity {
        CanonicalEntity::Bill(Bill {
            jurisdiction: "co".into(),
            session: "2025".into(),
            identifier: "HB25-1001".into(),
            title: title.into(),
            chamber: Some(Chamber::Lower),
            classification: vec![],
            subjects: vec![],
            sponsors: vec![],
            latest_action: None,
            latest_action_date: None,
            documents: vec![],
            versions: vec![],
            source_url: None,
            updated_at: Utc::now(),
            last_synced_at: BTreeMap::new(),
        })
    }

    #[test]
    fn jurisdiction_normalization_accepts_ocd_ids() {
        assert_eq!(normalize_jurisdiction("CO"), "co");
        assert_eq!(
            normalize_jurisdiction("ocd-jurisdiction/country:us/state:co/government"),
            "co"
        );
    }

    #[test]
    fn bill_keys_ignore_spacing_and_case() {
        assert_eq!(
            NaturalKey::bill("CO", "2025", "hb 25-1001"),
            NaturalKey::bill("co", " 2025 ", "HB25-1001")
        );
        assert_eq!(
            NaturalKey::bill("CO", "2025", "HB25-1001").to_string(),
            "bill/co/2025/HB25-1001"
        );
    }

    #[test]
    fn incomplete_key_is_detected() {
        assert!(!NaturalKey::legislator("co", "Jane Doe", "  ").is_complete());
        assert!(NaturalKey::legislator("co", "Jane Doe", "12").is_complete());
    }

    #[test]
    fn diff_reports_only_changed_fields() {
        let a = bill("A");
        let b = bill("B");
        let changes = a.diff(&b);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].field, "title");
        assert_eq!(changes[0].before, json!("A"));
        assert_eq!(changes[0].after, json!("B"));
        assert!(a.diff(&bill("A")).is_empty());
    }

    #[test]
    fn sync_timestamps_never_regress() {
        let mut entity = bill("A");
        let later = Utc::now();
        let earlier = later - chrono::Duration::hours(1);
        entity.mark_synced("openstates-bills", later);
        entity.mark_synced("openstates-bills", earlier);
        assert_eq!(entity.last_synced_at()["openstates-bills"], later);
    }
}
