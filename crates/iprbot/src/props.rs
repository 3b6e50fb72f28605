//! Wikidata properties, items and bot metadata

use iprbot_common::run_log::{BotMetadata, ReleaseInfo};
use iprbot_wikibase::{pid, PropertyId, Qid};

pub const BOT_NAME: &str = "InterproBot_Proteins";
pub const MAINTAINER: &str = "GSS";
pub const TAGS: [&str; 2] = ["protein", "interpro"];

/// Item for InterPro itself; releases are "edition of" this item
pub const INTERPRO_ITEM: &str = "Q3047275";

pub const MAIN_SUMMARY: &str = "add/update family and/or domains";
pub const CLEANUP_SUMMARY: &str = "remove deprecated statements";

pub fn uniprot_id() -> PropertyId {
    pid!("P352")
}

pub fn interpro_id() -> PropertyId {
    pid!("P2926")
}

pub fn found_in_taxon() -> PropertyId {
    pid!("P703")
}

pub fn stated_in() -> PropertyId {
    pid!("P248")
}

pub fn reference_url() -> PropertyId {
    pid!("P854")
}

pub fn edition_of() -> PropertyId {
    pid!("P629")
}

pub fn subclass_of() -> PropertyId {
    pid!("P279")
}

pub fn has_part() -> PropertyId {
    pid!("P527")
}

pub fn part_of() -> PropertyId {
    pid!("P361")
}

/// Properties the bot manages; also the ones cleanup may remove from
pub fn managed_properties() -> Vec<PropertyId> {
    vec![subclass_of(), has_part(), part_of()]
}

pub fn interpro_item() -> Option<Qid> {
    INTERPRO_ITEM.parse().ok()
}

pub fn protein_url(accession: &str) -> String {
    format!("http://www.ebi.ac.uk/interpro/protein/{}", accession)
}

/// Run-log header for one run against `release`
pub fn bot_metadata(run_id: &str, release: &Qid) -> BotMetadata {
    let mut metadata = BotMetadata::new(BOT_NAME, run_id);
    metadata.maintainer = MAINTAINER.to_string();
    metadata.tags = TAGS.iter().map(|t| t.to_string()).collect();
    metadata.properties = managed_properties()
        .into_iter()
        .map(String::from)
        .collect();
    metadata.release.insert(
        "InterPro".to_string(),
        ReleaseInfo {
            release: None,
            id: "InterPro".to_string(),
            wdid: release.to_string(),
            timestamp: None,
        },
    );
    metadata
}
