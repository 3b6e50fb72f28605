//! Statement model
//!
//! Only the slice of the Wikibase data model the bot touches: value snaks
//! holding an item or a string, references made of such snaks, and
//! statements with an optional server-assigned GUID.

use crate::ids::{PropertyId, Qid};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::fmt;

/// "stated in"
pub const STATED_IN: &str = "P248";
/// "retrieved"; ignored when comparing references
pub const RETRIEVED: &str = "P813";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Item(Qid),
    String(String),
}

impl Value {
    pub fn as_item(&self) -> Option<&Qid> {
        match self {
            Value::Item(q) => Some(q),
            Value::String(_) => None,
        }
    }

    fn datavalue(&self) -> Json {
        match self {
            Value::Item(q) => json!({
                "type": "wikibase-entityid",
                "value": {
                    "entity-type": "item",
                    "numeric-id": q.numeric_id(),
                    "id": q.as_str(),
                },
            }),
            Value::String(s) => json!({ "type": "string", "value": s }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Item(q) => write!(f, "{}", q),
            Value::String(s) => write!(f, "\"{}\"", s),
        }
    }
}

/// A property/value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Snak {
    pub property: PropertyId,
    pub value: Value,
}

impl Snak {
    pub fn item(property: PropertyId, qid: Qid) -> Self {
        Self {
            property,
            value: Value::Item(qid),
        }
    }

    pub fn string(property: PropertyId, value: impl Into<String>) -> Self {
        Self {
            property,
            value: Value::String(value.into()),
        }
    }

    fn to_json(&self) -> Json {
        json!({
            "snaktype": "value",
            "property": self.property.as_str(),
            "datavalue": self.value.datavalue(),
        })
    }
}

/// One reference block: a list of snaks stating provenance
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reference {
    pub snaks: Vec<Snak>,
}

impl Reference {
    pub fn new(snaks: Vec<Snak>) -> Self {
        Self { snaks }
    }

    /// Item the reference cites through "stated in"
    pub fn stated_in(&self) -> Option<&Qid> {
        self.snaks
            .iter()
            .find(|s| s.property.as_str() == STATED_IN)
            .and_then(|s| s.value.as_item())
    }

    /// Same snaks, ignoring order and any "retrieved" date
    pub fn equivalent_to(&self, other: &Reference) -> bool {
        fn comparable(r: &Reference) -> Vec<&Snak> {
            let mut snaks: Vec<&Snak> = r
                .snaks
                .iter()
                .filter(|s| s.property.as_str() != RETRIEVED)
                .collect();
            snaks.sort();
            snaks.dedup();
            snaks
        }
        comparable(self) == comparable(other)
    }

    /// Properties in first-seen order
    pub fn snaks_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::new();
        for snak in &self.snaks {
            let prop = snak.property.as_str();
            if !order.contains(&prop) {
                order.push(prop);
            }
        }
        order
    }

    /// Snaks grouped by property, as `wbsetreference` and `wbeditentity` take them
    pub fn snaks_json(&self) -> Json {
        let mut snaks: BTreeMap<&str, Vec<Json>> = BTreeMap::new();
        for snak in &self.snaks {
            snaks
                .entry(snak.property.as_str())
                .or_default()
                .push(snak.to_json());
        }
        json!(snaks)
    }

    fn to_json(&self) -> Json {
        json!({ "snaks": self.snaks_json(), "snaks-order": self.snaks_order() })
    }
}

/// A statement. `id` is the GUID assigned by the knowledge base; statements
/// built locally have none until written.
///
/// Rank, qualifiers and snaks of other datatypes are not modelled, so a
/// statement read back from the knowledge base must never be sent as a claim
/// again; add references to it with [`crate::client::ReferenceAddition`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub id: Option<String>,
    pub main: Snak,
    pub references: Vec<Reference>,
}

impl Statement {
    pub fn new(main: Snak, references: Vec<Reference>) -> Self {
        Self {
            id: None,
            main,
            references,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn property(&self) -> &PropertyId {
        &self.main.property
    }

    pub fn value(&self) -> &Value {
        &self.main.value
    }

    /// Whether any reference cites `source` through "stated in"
    pub fn cites(&self, source: &Qid) -> bool {
        self.references.iter().any(|r| r.stated_in() == Some(source))
    }

    pub fn has_equivalent_reference(&self, reference: &Reference) -> bool {
        self.references.iter().any(|r| r.equivalent_to(reference))
    }

    /// `wbeditentity` claim JSON
    pub fn to_json(&self) -> Json {
        let mut claim = json!({
            "mainsnak": self.main.to_json(),
            "type": "statement",
            "rank": "normal",
            "references": self.references.iter().map(Reference::to_json).collect::<Vec<_>>(),
        });
        if let Some(id) = &self.id {
            claim["id"] = json!(id);
        }
        claim
    }
}

/// Restricts a query to items carrying every listed property; a `None` value
/// means "any value".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct BaseFilter {
    clauses: Vec<(PropertyId, Option<Value>)>,
}

impl BaseFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require the property with any value
    pub fn with_property(mut self, property: PropertyId) -> Self {
        self.clauses.push((property, None));
        self
    }

    /// Require the property with this exact value
    pub fn with_value(mut self, property: PropertyId, value: Value) -> Self {
        self.clauses.push((property, Some(value)));
        self
    }

    pub fn clauses(&self) -> &[(PropertyId, Option<Value>)] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether a set of statements satisfies every clause
    pub fn matches(&self, statements: &[Statement]) -> bool {
        self.clauses.iter().all(|(property, value)| {
            statements.iter().any(|s| {
                s.property() == property && value.as_ref().is_none_or(|v| s.value() == v)
            })
        })
    }
}

impl fmt::Display for BaseFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .clauses
            .iter()
            .map(|(p, v)| match v {
                Some(v) => format!("{}={}", p, v),
                None => format!("{}=*", p),
            })
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}
