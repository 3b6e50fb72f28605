//! Entity and property identifiers

use crate::error::WikibaseError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static QID_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^Q[1-9][0-9]*$").ok());
static PID_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^P[1-9][0-9]*$").ok());

const ENTITY_URI_PREFIX: &str = "http://www.wikidata.org/entity/";

fn matches(re: &LazyLock<Option<Regex>>, s: &str) -> bool {
    re.as_ref().is_some_and(|re| re.is_match(s))
}

/// Item identifier, e.g. `Q42`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Qid(String);

impl Qid {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn numeric_id(&self) -> u64 {
        self.0[1..].parse().unwrap_or(0)
    }

    /// Parse either a bare id or a concept URI (`http://www.wikidata.org/entity/Q42`)
    pub fn from_uri(uri: &str) -> Result<Self, WikibaseError> {
        uri.strip_prefix(ENTITY_URI_PREFIX).unwrap_or(uri).parse()
    }
}

impl FromStr for Qid {
    type Err = WikibaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if matches(&QID_RE, s) {
            Ok(Self(s.to_string()))
        } else {
            Err(WikibaseError::InvalidId(s.to_string()))
        }
    }
}

impl TryFrom<String> for Qid {
    type Error = WikibaseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Qid> for String {
    fn from(q: Qid) -> Self {
        q.0
    }
}

impl fmt::Display for Qid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Property identifier, e.g. `P361`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PropertyId(String);

impl PropertyId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse either a bare id or a property entity URI
    pub fn from_uri(uri: &str) -> Result<Self, WikibaseError> {
        uri.strip_prefix(ENTITY_URI_PREFIX).unwrap_or(uri).parse()
    }
}

impl FromStr for PropertyId {
    type Err = WikibaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if matches(&PID_RE, s) {
            Ok(Self(s.to_string()))
        } else {
            Err(WikibaseError::InvalidId(s.to_string()))
        }
    }
}

impl TryFrom<String> for PropertyId {
    type Error = WikibaseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PropertyId> for String {
    fn from(p: PropertyId) -> Self {
        p.0
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `P…` literal for compile-time constants; panics on a malformed literal.
#[macro_export]
macro_rules! pid {
    ($s:literal) => {
        $crate::ids::PropertyId::from_static($s)
    };
}

impl PropertyId {
    #[doc(hidden)]
    #[allow(clippy::expect_used)]
    pub fn from_static(s: &'static str) -> Self {
        s.parse().expect("malformed property literal")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qid() {
        let q: Qid = "Q100".parse().unwrap();
        assert_eq!(q.as_str(), "Q100");
        assert_eq!(q.numeric_id(), 100);
        assert!("Q0".parse::<Qid>().is_err());
        assert!("P100".parse::<Qid>().is_err());
        assert!("q100".parse::<Qid>().is_err());
        assert!("".parse::<Qid>().is_err());
    }

    #[test]
    fn test_qid_from_uri() {
        let q = Qid::from_uri("http://www.wikidata.org/entity/Q15978631").unwrap();
        assert_eq!(q.as_str(), "Q15978631");
        assert_eq!(Qid::from_uri("Q5").unwrap().as_str(), "Q5");
        assert!(Qid::from_uri("http://example.org/Q5").is_err());
    }

    #[test]
    fn test_parse_property() {
        assert_eq!(pid!("P361").as_str(), "P361");
        assert!("Q361".parse::<PropertyId>().is_err());
        assert_eq!(
            PropertyId::from_uri("http://www.wikidata.org/entity/P248").unwrap(),
            pid!("P248")
        );
    }

    #[test]
    fn test_serde_validates() {
        let q: Qid = serde_json::from_str("\"Q7\"").unwrap();
        assert_eq!(serde_json::to_string(&q).unwrap(), "\"Q7\"");
        assert!(serde_json::from_str::<Qid>("\"X7\"").is_err());
    }
}
