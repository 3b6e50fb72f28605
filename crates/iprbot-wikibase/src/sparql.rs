//! SPARQL query construction and result parsing
//!
//! Queries target the Wikidata query service vocabulary (`wdt:`, `p:`,
//! `ps:`, `prov:wasDerivedFrom`). Parsing is kept separate from transport so
//! it can be tested on canned result documents.

use crate::error::{Result, WikibaseError};
use crate::ids::{PropertyId, Qid};
use crate::model::{BaseFilter, Reference, Snak, Statement, Value};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::warn;

const PREFIXES: &str = "PREFIX wd: <http://www.wikidata.org/entity/>
PREFIX wdt: <http://www.wikidata.org/prop/direct/>
PREFIX p: <http://www.wikidata.org/prop/>
PREFIX ps: <http://www.wikidata.org/prop/statement/>
PREFIX prov: <http://www.w3.org/ns/prov#>
PREFIX wikibase: <http://wikiba.se/ontology#>
";

const STATEMENT_URI_PREFIX: &str = "http://www.wikidata.org/entity/statement/";

#[derive(Debug, Deserialize)]
pub struct SparqlResponse {
    pub results: SparqlBindings,
}

#[derive(Debug, Deserialize)]
pub struct SparqlBindings {
    pub bindings: Vec<HashMap<String, SparqlTerm>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SparqlTerm {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl SparqlTerm {
    /// Items come back as URIs, everything else as a string value
    fn to_value(&self) -> Value {
        if self.kind == "uri" {
            if let Ok(q) = Qid::from_uri(&self.value) {
                return Value::Item(q);
            }
        }
        Value::String(self.value.clone())
    }
}

type Row = HashMap<String, SparqlTerm>;

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn filter_patterns(filter: &BaseFilter) -> String {
    let mut out = String::new();
    for (property, value) in filter.clauses() {
        let object = match value {
            None => "[]".to_string(),
            Some(Value::Item(q)) => format!("wd:{}", q),
            Some(Value::String(s)) => format!("\"{}\"", escape_literal(s)),
        };
        out.push_str(&format!("  ?item wdt:{} {} .\n", property, object));
    }
    out
}

pub fn id_mapper_query(property: &PropertyId, filter: &BaseFilter) -> String {
    format!(
        "{PREFIXES}SELECT ?item ?id WHERE {{\n  ?item wdt:{property} ?id .\n{}}}",
        filter_patterns(filter)
    )
}

pub fn items_with_claim_query(property: &PropertyId, value: &Qid) -> String {
    format!("{PREFIXES}SELECT ?item WHERE {{\n  ?item wdt:{property} wd:{value} .\n}}")
}

pub fn items_matching_query(filter: &BaseFilter) -> Result<String> {
    if filter.is_empty() {
        return Err(WikibaseError::Sparql(
            "refusing to enumerate items with an empty filter".to_string(),
        ));
    }
    Ok(format!(
        "{PREFIXES}SELECT DISTINCT ?item WHERE {{\n{}}}",
        filter_patterns(filter)
    ))
}

pub fn statements_query(filter: &BaseFilter, property: &PropertyId) -> String {
    format!(
        "{PREFIXES}SELECT ?item ?statement ?value ?ref ?refProp ?refValue WHERE {{
{}  ?item p:{property} ?statement .
  ?statement ps:{property} ?value .
  OPTIONAL {{
    ?statement prov:wasDerivedFrom ?ref .
    ?ref ?pr ?refValue .
    ?refProp wikibase:reference ?pr .
  }}
}}",
        filter_patterns(filter)
    )
}

/// `http://www.wikidata.org/entity/statement/Q42-F078E5B3-…` → `Q42$F078E5B3-…`
pub fn statement_guid(uri: &str) -> String {
    let local = uri.strip_prefix(STATEMENT_URI_PREFIX).unwrap_or(uri);
    local.replacen('-', "$", 1)
}

fn item(row: &Row, var: &str) -> Result<Qid> {
    let term = row
        .get(var)
        .ok_or_else(|| WikibaseError::Sparql(format!("binding '{}' missing", var)))?;
    Qid::from_uri(&term.value)
}

pub fn parse_items(bindings: &[Row]) -> Result<BTreeSet<Qid>> {
    bindings.iter().map(|row| item(row, "item")).collect()
}

/// Build the external-id map, dropping ambiguous pairs in both directions
pub fn parse_id_mapper(bindings: &[Row]) -> Result<BTreeMap<String, Qid>> {
    let mut by_id: BTreeMap<String, BTreeSet<Qid>> = BTreeMap::new();
    let mut by_item: BTreeMap<Qid, BTreeSet<String>> = BTreeMap::new();

    for row in bindings {
        let qid = item(row, "item")?;
        let id = row
            .get("id")
            .ok_or_else(|| WikibaseError::Sparql("binding 'id' missing".to_string()))?
            .value
            .clone();
        by_id.entry(id.clone()).or_default().insert(qid.clone());
        by_item.entry(qid).or_default().insert(id);
    }

    let mut mapping = BTreeMap::new();
    for (id, items) in by_id {
        if items.len() > 1 {
            warn!(external_id = %id, items = ?items, "Identifier on more than one item; skipped");
            continue;
        }
        let Some(qid) = items.into_iter().next() else {
            continue;
        };
        if by_item.get(&qid).is_some_and(|ids| ids.len() > 1) {
            warn!(qid = %qid, external_id = %id, "Item has more than one identifier; skipped");
            continue;
        }
        mapping.insert(id, qid);
    }

    Ok(mapping)
}

#[derive(Default)]
struct PartialStatement {
    qid: Option<Qid>,
    value: Option<Value>,
    references: BTreeMap<String, Vec<Snak>>,
}

/// Fold one-row-per-reference-snak results back into statements
pub fn parse_statements(bindings: &[Row], property: &PropertyId) -> Result<Vec<(Qid, Statement)>> {
    let mut statements: BTreeMap<String, PartialStatement> = BTreeMap::new();

    for row in bindings {
        let qid = item(row, "item")?;
        let statement_uri = row
            .get("statement")
            .ok_or_else(|| WikibaseError::Sparql("binding 'statement' missing".to_string()))?;
        let value = row
            .get("value")
            .ok_or_else(|| WikibaseError::Sparql("binding 'value' missing".to_string()))?
            .to_value();

        let entry = statements.entry(statement_guid(&statement_uri.value)).or_default();
        entry.qid = Some(qid);
        entry.value = Some(value);

        if let (Some(reference), Some(ref_prop), Some(ref_value)) =
            (row.get("ref"), row.get("refProp"), row.get("refValue"))
        {
            let snak = Snak {
                property: PropertyId::from_uri(&ref_prop.value)?,
                value: ref_value.to_value(),
            };
            let snaks = entry.references.entry(reference.value.clone()).or_default();
            if !snaks.contains(&snak) {
                snaks.push(snak);
            }
        }
    }

    let mut out = Vec::with_capacity(statements.len());
    for (guid, partial) in statements {
        let (Some(qid), Some(value)) = (partial.qid, partial.value) else {
            continue;
        };
        let references = partial.references.into_values().map(Reference::new).collect();
        let statement = Statement::new(
            Snak {
                property: property.clone(),
                value,
            },
            references,
        )
        .with_id(guid);
        out.push((qid, statement));
    }

    Ok(out)
}
