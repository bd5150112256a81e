// Reference extraction for speed-layer content.
//
// Keyword/identifier matching only: bill identifiers by regex, legislators by
// name against what the store already knows. No model calls here.

use std::collections::HashMap;

use regex::Regex;

use capitolwatch_common::{
    normalize_text, CanonicalEntity, EntityKind, NaturalKey, Sentiment, StoreError,
};

use crate::store::EntityStore;

const BILL_PATTERN: &str = r"(?i)\b(HB|SB|HJR|SJR|HCR|SCR|HR|SR|HM|SM)\s?(\d{2})-(\d{3,4})\b";

const BILL_MATCH_RELEVANCE: f64 = 0.6;
const NAME_MATCH_RELEVANCE: f64 = 0.4;
const EXTRA_MATCH_BONUS: f64 = 0.1;

/// Relevance at or above which an item is also queued for analysis.
pub const ANALYSIS_RELEVANCE: f64 = 0.6;

const POSITIVE: &[&str] = &[
    "support", "supports", "supported", "pass", "passed", "passes", "win", "wins", "applaud",
    "champion", "protect", "protects", "benefit", "benefits", "bipartisan", "success", "approve",
    "approved", "celebrate", "praise", "good",
];

const NEGATIVE: &[&str] = &[
    "oppose", "opposes", "opposed", "against", "kill", "killed", "fail", "failed", "veto",
    "vetoed", "harmful", "attack", "reject", "rejected", "concern", "concerns", "outrage",
    "threat", "bad", "scandal",
];

#[derive(Debug, Clone, PartialEq)]
pub struct EntityMatch {
    pub key: NaturalKey,
    /// Text as it appeared in the content.
    pub matched_text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub matches: Vec<EntityMatch>,
    pub relevance: f64,
    pub sentiment: Sentiment,
}

struct KnownLegislator {
    full_name: String,
    last_name: String,
    key: NaturalKey,
}

/// What the store knows, indexed for matching.
#[derive(Default)]
pub struct EntityIndex {
    bills: HashMap<String, NaturalKey>,
    legislators: Vec<KnownLegislator>,
}

impl EntityIndex {
    pub fn from_entities<'a>(entities: impl IntoIterator<Item = &'a CanonicalEntity>) -> Self {
        let mut index = Self::default();
        for entity in entities {
            match entity {
                CanonicalEntity::Bill(bill) => {
                    let key = entity.natural_key();
                    // Prefer the most recent session when an identifier repeats.
                    let replace = match index.bills.get(&bill.identifier) {
                        Some(NaturalKey::Bill { session, .. }) => bill.session > *session,
                        _ => true,
                    };
                    if replace {
                        index.bills.insert(bill.identifier.clone(), key);
                    }
                }
                CanonicalEntity::Legislator(l) => {
                    let full_name = normalize_text(&l.name);
                    let Some(last_name) = full_name.split(' ').last().map(str::to_string) else {
                        continue;
                    };
                    index.legislators.push(KnownLegislator {
                        full_name,
                        last_name,
                        key: entity.natural_key(),
                    });
                }
                CanonicalEntity::Committee(_) => {}
            }
        }
        index
    }

    pub async fn load(store: &dyn EntityStore) -> Result<Self, StoreError> {
        let mut entities = store.list_all(EntityKind::Bill).await?;
        entities.extend(store.list_all(EntityKind::Legislator).await?);
        Ok(Self::from_entities(&entities))
    }
}

pub struct Extractor {
    bill_pattern: Regex,
    jurisdiction: String,
}

impl Extractor {
    pub fn new(jurisdiction: impl Into<String>) -> Self {
        Self {
            bill_pattern: Regex::new(BILL_PATTERN).expect("Invalid bill identifier regex"),
            jurisdiction: jurisdiction.into(),
        }
    }

    pub fn extract(&self, text: &str, index: &EntityIndex) -> Extraction {
        let mut matches: Vec<EntityMatch> = Vec::new();
        let mut push = |m: EntityMatch| {
            if !matches.iter().any(|existing| existing.key == m.key) {
                matches.push(m);
            }
        };

        let mut bill_hits = 0;
        for cap in self.bill_pattern.captures_iter(text) {
            let identifier = format!(
                "{}{}-{}",
                cap[1].to_ascii_uppercase(),
                &cap[2],
                &cap[3]
            );
            let key = index.bills.get(&identifier).cloned().unwrap_or_else(|| {
                NaturalKey::bill(&self.jurisdiction, &format!("20{}", &cap[2]), &identifier)
            });
            bill_hits += 1;
            push(EntityMatch {
                key,
                matched_text: cap[0].to_string(),
            });
        }

        let normalized = normalize_text(text);
        let mut name_hits = 0;
        for legislator in &index.legislators {
            let titled = ["sen.", "senator", "rep.", "representative"]
                .iter()
                .map(|title| format!("{title} {}", legislator.last_name));
            let hit = std::iter::once(legislator.full_name.clone())
                .chain(titled)
                .find(|needle| contains_phrase(&normalized, needle));
            if let Some(matched_text) = hit {
                name_hits += 1;
                push(EntityMatch {
                    key: legislator.key.clone(),
                    matched_text,
                });
            }
        }

        let relevance = relevance(bill_hits > 0, name_hits > 0, matches.len());
        Extraction {
            matches,
            relevance,
            sentiment: sentiment(&normalized),
        }
    }
}

fn relevance(bill_hit: bool, name_hit: bool, total_matches: usize) -> f64 {
    let base = if bill_hit {
        BILL_MATCH_RELEVANCE
    } else if name_hit {
        NAME_MATCH_RELEVANCE
    } else {
        return 0.0;
    };
    let extra = total_matches.saturating_sub(1) as f64 * EXTRA_MATCH_BONUS;
    ((base + extra) * 100.0).round().min(100.0) / 100.0
}

/// Lexicon tag over already-normalized text.
pub fn sentiment(normalized: &str) -> Sentiment {
    let words = normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty());
    let (mut pos, mut neg) = (0usize, 0usize);
    for word in words {
        if POSITIVE.contains(&word) {
            pos += 1;
        } else if NEGATIVE.contains(&word) {
            neg += 1;
        }
    }
    match (pos, neg) {
        (0, 0) => Sentiment::Neutral,
        (_, 0) => Sentiment::Positive,
        (0, _) => Sentiment::Negative,
        (p, n) if p >= 2 * n => Sentiment::Positive,
        (p, n) if n >= 2 * p => Sentiment::Negative,
        _ => Sentiment::Mixed,
    }
}

/// `needle` occurs in `haystack` on word boundaries.
fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
