//! Parsing of `wbgetentities` entity JSON into [`Statement`]s
//!
//! Snaks without a value (`novalue`/`somevalue`) and datatypes other than
//! items and strings are skipped; the bot never writes them.

use crate::error::{Result, WikibaseError};
use crate::ids::{PropertyId, Qid};
use crate::model::{Reference, Snak, Statement, Value};
use serde_json::Value as Json;

fn parse_value(datavalue: &Json) -> Option<Value> {
    match datavalue.get("type")?.as_str()? {
        "wikibase-entityid" => {
            let id = datavalue.get("value")?.get("id")?.as_str()?;
            id.parse::<Qid>().ok().map(Value::Item)
        },
        "string" => datavalue
            .get("value")?
            .as_str()
            .map(|s| Value::String(s.to_string())),
        _ => None,
    }
}

fn parse_snak(snak: &Json) -> Option<Snak> {
    if snak.get("snaktype")?.as_str()? != "value" {
        return None;
    }
    let property: PropertyId = snak.get("property")?.as_str()?.parse().ok()?;
    let value = parse_value(snak.get("datavalue")?)?;
    Some(Snak { property, value })
}

fn parse_reference(reference: &Json) -> Reference {
    let mut snaks = Vec::new();
    let by_property = reference.get("snaks").and_then(Json::as_object);
    let order: Vec<String> = match reference.get("snaks-order").and_then(Json::as_array) {
        Some(order) => order
            .iter()
            .filter_map(|p| p.as_str().map(str::to_string))
            .collect(),
        None => by_property
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default(),
    };

    if let Some(by_property) = by_property {
        for property in &order {
            let Some(list) = by_property.get(property).and_then(Json::as_array) else {
                continue;
            };
            snaks.extend(list.iter().filter_map(parse_snak));
        }
    }

    Reference::new(snaks)
}

/// All supported statements of one entity object
pub fn parse_entity_statements(entity: &Json) -> Result<Vec<Statement>> {
    let Some(claims) = entity.get("claims") else {
        return Ok(Vec::new());
    };
    // An entity without statements serialises `claims` as an empty array
    if claims.as_array().is_some_and(Vec::is_empty) {
        return Ok(Vec::new());
    }
    let claims = claims
        .as_object()
        .ok_or_else(|| WikibaseError::unexpected("entity claims is not an object"))?;

    let mut statements = Vec::new();
    for list in claims.values() {
        let Some(list) = list.as_array() else {
            continue;
        };
        for claim in list {
            let Some(main) = claim.get("mainsnak").and_then(parse_snak) else {
                continue;
            };
            let references = claim
                .get("references")
                .and_then(Json::as_array)
                .map(|refs| refs.iter().map(parse_reference).collect())
                .unwrap_or_default();
            let mut statement = Statement::new(main, references);
            statement.id = claim.get("id").and_then(Json::as_str).map(str::to_string);
            statements.push(statement);
        }
    }

    Ok(statements)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_entity_statements() {
        let entity = json!({
            "id": "Q100",
            "claims": {
                "P361": [{
                    "id": "Q100$1",
                    "mainsnak": {
                        "snaktype": "value",
                        "property": "P361",
                        "datavalue": { "type": "wikibase-entityid", "value": { "entity-type": "item", "numeric-id": 999, "id": "Q999" } }
                    },
                    "references": [{
                        "snaks": {
                            "P854": [{ "snaktype": "value", "property": "P854", "datavalue": { "type": "string", "value": "http://www.ebi.ac.uk/interpro/protein/P12345" } }],
                            "P248": [{ "snaktype": "value", "property": "P248", "datavalue": { "type": "wikibase-entityid", "value": { "id": "Q500" } } }]
                        },
                        "snaks-order": ["P248", "P854"]
                    }]
                }],
                "P352": [{
                    "id": "Q100$2",
                    "mainsnak": { "snaktype": "value", "property": "P352", "datavalue": { "type": "string", "value": "P12345" } }
                }],
                "P2067": [{
                    "id": "Q100$3",
                    "mainsnak": { "snaktype": "value", "property": "P2067", "datavalue": { "type": "quantity", "value": { "amount": "+1" } } }
                }],
                "P527": [{
                    "id": "Q100$4",
                    "mainsnak": { "snaktype": "novalue", "property": "P527" }
                }]
            }
        });

        let statements = parse_entity_statements(&entity).unwrap();
        assert_eq!(statements.len(), 2);

        let part_of = statements.iter().find(|s| s.property().as_str() == "P361").unwrap();
        assert_eq!(part_of.id.as_deref(), Some("Q100$1"));
        assert_eq!(part_of.references[0].snaks[0].property.as_str(), "P248");
        assert_eq!(part_of.references[0].stated_in().unwrap().as_str(), "Q500");
    }

    #[test]
    fn test_empty_claims_array() {
        let entity = json!({ "id": "Q1", "claims": [] });
        assert!(parse_entity_statements(&entity).unwrap().is_empty());
    }
}
