//! Projection of loaded entities into RDF triples.
//!
//! Only resident data is projected; nothing here touches the network.

use crate::models::{Object, Reference, Value};
use serde_json::Value as Json;
use std::fmt;
use std::io::Write;

pub const DEFAULT_NAMESPACE: &str = "http://rdf.freebase.com";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";
const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

/// Qualifies a Freebase id (`/m/0x`) with a namespace.
pub fn qualify(ns: &str, id: &str) -> String {
    if id.starts_with('/') {
        format!("{}{}", ns.trim_end_matches('/'), id)
    } else {
        format!("{ns}{id}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    pub lexical: String,
    pub datatype: Option<String>,
}

impl Literal {
    pub fn plain(lexical: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: None,
        }
    }

    pub fn typed(lexical: impl Into<String>, datatype: impl Into<String>) -> Self {
        Self {
            lexical: lexical.into(),
            datatype: Some(datatype.into()),
        }
    }

    /// Literal for a JSON scalar, typed by its JSON kind. `null` has none.
    pub fn from_json(value: &Json) -> Option<Self> {
        match value {
            Json::Null => None,
            Json::Bool(b) => Some(Self::typed(b.to_string(), XSD_BOOLEAN)),
            Json::Number(n) if n.is_i64() || n.is_u64() => {
                Some(Self::typed(n.to_string(), XSD_INTEGER))
            }
            Json::Number(n) => Some(Self::typed(n.to_string(), XSD_DOUBLE)),
            Json::String(s) => Some(Self::plain(s.clone())),
            other => Some(Self::plain(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    Literal(Literal),
}

impl Term {
    pub fn as_iri(&self) -> Option<&str> {
        match self {
            Term::Iri(iri) => Some(iri),
            Term::Literal(_) => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Term::Literal(lit) => Some(lit),
            Term::Iri(_) => None,
        }
    }
}

/// A `(subject, predicate, object)` statement. Subject and predicate are
/// always IRIs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: String,
    pub predicate: String,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: impl Into<String>, predicate: impl Into<String>, object: Term) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object,
        }
    }

    /// Convert to an N-Triples line (without the trailing newline).
    pub fn to_ntriples(&self) -> String {
        let object = match &self.object {
            Term::Iri(iri) => format!("<{}>", escape_iri(iri)),
            Term::Literal(lit) => match &lit.datatype {
                Some(dt) => format!("\"{}\"^^<{}>", escape_literal(&lit.lexical), escape_iri(dt)),
                None => format!("\"{}\"", escape_literal(&lit.lexical)),
            },
        };
        format!(
            "<{}> <{}> {} .",
            escape_iri(&self.subject),
            escape_iri(&self.predicate),
            object
        )
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ntriples())
    }
}

fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn escape_iri(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' | '>' | '"' | '{' | '}' | '|' | '^' | '`' | '\\' | '\u{0}'..='\u{20}' => {
                out.push_str(&format!("\\u{:04X}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

/// Writes one N-Triples line per triple and returns how many were written.
pub fn write_ntriples<W, I>(mut writer: W, triples: I) -> std::io::Result<usize>
where
    W: Write,
    I: IntoIterator<Item = Triple>,
{
    let mut n = 0;
    for triple in triples {
        writeln!(writer, "{}", triple.to_ntriples())?;
        n += 1;
    }
    Ok(n)
}

/// Order in which an object's properties are projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProjectionOrder {
    /// Order in which properties were first loaded.
    #[default]
    Insertion,
    /// Lexicographic by property id, for reproducible output.
    Sorted,
}

fn head_triples<'a>(
    subject: &'a str,
    types: impl IntoIterator<Item = &'a String> + 'a,
    names: impl IntoIterator<Item = &'a str> + 'a,
    ns: &'a str,
) -> impl Iterator<Item = Triple> + 'a {
    let types = types
        .into_iter()
        .map(move |t| Triple::new(subject, RDF_TYPE, Term::Iri(qualify(ns, t))));
    let labels = names
        .into_iter()
        .map(move |n| Triple::new(subject, RDFS_LABEL, Term::Literal(Literal::plain(n))));
    types.chain(labels)
}

impl Reference {
    /// Type and label triples of the referenced entity. Never property
    /// triples; a reference carries none. Empty when the reference has no id.
    pub fn triples(&self, ns: &str) -> Vec<Triple> {
        let Some(id) = self.id() else {
            return Vec::new();
        };
        let subject = qualify(ns, id);
        head_triples(&subject, self.types(), self.name(), ns).collect()
    }
}

impl Object {
    pub fn triples<'a>(&'a self, ns: &'a str) -> Triples<'a> {
        self.triples_with(ns, ProjectionOrder::Insertion)
    }

    /// Lazily projects this object. Each call starts a fresh traversal; an
    /// object without an id projects nothing.
    pub fn triples_with<'a>(&'a self, ns: &'a str, order: ProjectionOrder) -> Triples<'a> {
        let Some(id) = self.id() else {
            return Triples {
                ns,
                subject: String::new(),
                pending: Vec::new(),
                work: Vec::new(),
                properties: Vec::new().into_iter(),
            };
        };
        let subject = qualify(ns, id);
        let mut pending: Vec<Triple> =
            head_triples(&subject, self.types(), self.names().iter().map(String::as_str), ns)
                .collect();
        pending.reverse();

        let mut properties: Vec<(&'a str, &'a Value)> = self
            .properties()
            .iter()
            .map(|(k, v)| (k.as_str(), v))
            .collect();
        if order == ProjectionOrder::Sorted {
            properties.sort_by(|a, b| a.0.cmp(b.0));
        }

        Triples {
            ns,
            subject,
            pending,
            work: Vec::new(),
            properties: properties.into_iter(),
        }
    }
}

/// Iterator returned by [`Object::triples`].
pub struct Triples<'a> {
    ns: &'a str,
    subject: String,
    // ready triples, popped from the back
    pending: Vec<Triple>,
    // (predicate IRI, value) still to expand, popped from the back
    work: Vec<(String, &'a Value)>,
    properties: std::vec::IntoIter<(&'a str, &'a Value)>,
}

impl<'a> Triples<'a> {
    fn expand(&mut self, predicate: String, value: &'a Value) -> Option<Triple> {
        match value {
            Value::List(items) => {
                for item in items.iter().rev() {
                    self.work.push((predicate.clone(), item));
                }
                None
            }
            Value::Reference(r) => match r.id() {
                Some(id) => {
                    let mut nested = r.triples(self.ns);
                    nested.reverse();
                    self.pending.extend(nested);
                    let object = Term::Iri(qualify(self.ns, id));
                    Some(Triple::new(self.subject.clone(), predicate, object))
                }
                None => {
                    let literal = match r.literal_value() {
                        Some(v) => Literal::from_json(v)?,
                        None => Literal::plain(Json::Object(r.raw().clone()).to_string()),
                    };
                    Some(Triple::new(
                        self.subject.clone(),
                        predicate,
                        Term::Literal(literal),
                    ))
                }
            },
            Value::Literal { value, .. } | Value::Raw(value) => {
                let literal = Literal::from_json(value)?;
                Some(Triple::new(
                    self.subject.clone(),
                    predicate,
                    Term::Literal(literal),
                ))
            }
        }
    }
}

impl<'a> Iterator for Triples<'a> {
    type Item = Triple;

    fn next(&mut self) -> Option<Triple> {
        loop {
            if let Some(t) = self.pending.pop() {
                return Some(t);
            }
            if let Some((predicate, value)) = self.work.pop() {
                if let Some(t) = self.expand(predicate, value) {
                    return Some(t);
                }
                continue;
            }
            let (property, value) = self.properties.next()?;
            self.work.push((qualify(self.ns, property), value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NS: &str = DEFAULT_NAMESPACE;

    fn object(v: Json) -> Object {
        match v {
            Json::Object(m) => Object::from_raw(&m),
            _ => unreachable!(),
        }
    }

    #[test]
    fn organization_with_one_name_yields_two_triples() {
        let sap = object(json!({
            "id": "/m/0x",
            "type": ["/organization/organization"],
            "name": "SAP AG"
        }));
        let triples: Vec<Triple> = sap.triples(NS).collect();
        assert_eq!(
            triples,
            [
                Triple::new(
                    "http://rdf.freebase.com/m/0x",
                    RDF_TYPE,
                    Term::Iri("http://rdf.freebase.com/organization/organization".into())
                ),
                Triple::new(
                    "http://rdf.freebase.com/m/0x",
                    RDFS_LABEL,
                    Term::Literal(Literal::plain("SAP AG"))
                ),
            ]
        );
    }

    #[test]
    fn bare_reference_never_yields_property_triples() {
        let r = Reference::new("/m/01", Some("Dietmar Hopp".into()), ["/people/person"]);
        let triples = r.triples(NS);
        assert_eq!(triples.len(), 2);
        assert_eq!(triples[0].predicate, RDF_TYPE);
        assert_eq!(triples[1].predicate, RDFS_LABEL);

        let untyped = Reference::new("/m/01", Some("Dietmar Hopp".into()), Vec::<String>::new());
        let triples = untyped.triples(NS);
        assert_eq!(triples.len(), 1);
        assert_eq!(triples[0].object, Term::Literal(Literal::plain("Dietmar Hopp")));
    }

    #[test]
    fn nested_references_add_relation_then_their_own_head() {
        let sap = object(json!({
            "id": "/m/0x",
            "/organization/organization/founders": [
                {"id": "/m/01", "name": "Dietmar Hopp", "type": ["/people/person"]},
                {"id": "/m/02", "name": "Hasso Plattner"}
            ]
        }));
        let triples: Vec<Triple> = sap.triples(NS).collect();
        let lines: Vec<String> = triples.iter().map(Triple::to_ntriples).collect();
        assert_eq!(
            lines,
            [
                "<http://rdf.freebase.com/m/0x> <http://rdf.freebase.com/organization/organization/founders> <http://rdf.freebase.com/m/01> .",
                "<http://rdf.freebase.com/m/01> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <http://rdf.freebase.com/people/person> .",
                "<http://rdf.freebase.com/m/01> <http://www.w3.org/2000/01/rdf-schema#label> \"Dietmar Hopp\" .",
                "<http://rdf.freebase.com/m/0x> <http://rdf.freebase.com/organization/organization/founders> <http://rdf.freebase.com/m/02> .",
                "<http://rdf.freebase.com/m/02> <http://www.w3.org/2000/01/rdf-schema#label> \"Hasso Plattner\" .",
            ]
        );
    }

    #[test]
    fn scalars_become_typed_literals() {
        let obj = object(json!({
            "id": "/m/0x",
            "/a/founded": [{"type": "/type/datetime", "value": "1972-04-01"}],
            "/a/employees": [{"type": "/type/int", "value": 65000}],
            "/a/revenue": [{"type": "/type/float", "value": 16.8}],
            "/a/public": [{"type": "/type/boolean", "value": true}],
            "/a/missing": null,
            "/a/raw": "plain"
        }));
        let objects: Vec<Term> = obj.triples(NS).map(|t| t.object).collect();
        assert_eq!(
            objects,
            [
                Term::Literal(Literal::plain("1972-04-01")),
                Term::Literal(Literal::typed("65000", XSD_INTEGER)),
                Term::Literal(Literal::typed("16.8", XSD_DOUBLE)),
                Term::Literal(Literal::typed("true", XSD_BOOLEAN)),
                Term::Literal(Literal::plain("plain")),
            ]
        );
    }

    #[test]
    fn value_only_reference_degrades_to_literal() {
        let obj = object(json!({
            "id": "/m/0x",
            "/a/lang": [{"type": "/lang/thing", "value": "en"}],
            "/a/opaque": [{"type": "/x/y", "link": 3}]
        }));
        let objects: Vec<Term> = obj.triples(NS).map(|t| t.object).collect();
        assert_eq!(objects[0], Term::Literal(Literal::plain("en")));
        assert_eq!(
            objects[1],
            Term::Literal(Literal::plain(r#"{"type":"/x/y","link":3}"#))
        );
    }

    #[test]
    fn sorted_mode_orders_properties_and_iteration_is_restartable() {
        let obj = object(json!({
            "id": "/m/0x",
            "/z/last": "z",
            "/a/first": "a",
            "/m/middle": ["m1", ["m2"]]
        }));
        let insertion: Vec<String> = obj.triples(NS).map(|t| t.predicate).collect();
        assert_eq!(
            insertion,
            [
                "http://rdf.freebase.com/z/last",
                "http://rdf.freebase.com/a/first",
                "http://rdf.freebase.com/m/middle",
                "http://rdf.freebase.com/m/middle",
            ]
        );
        let sorted: Vec<Triple> = obj.triples_with(NS, ProjectionOrder::Sorted).collect();
        assert_eq!(sorted[0].predicate, "http://rdf.freebase.com/a/first");
        assert_eq!(sorted[3].predicate, "http://rdf.freebase.com/z/last");
        assert_eq!(sorted[2].object, Term::Literal(Literal::plain("m2")));

        let again: Vec<Triple> = obj.triples_with(NS, ProjectionOrder::Sorted).collect();
        assert_eq!(sorted, again);
    }

    #[test]
    fn custom_namespace_and_missing_id() {
        let obj = object(json!({"id": "/m/0x", "type": ["/common/topic"]}));
        let t: Vec<Triple> = obj.triples("urn:fb:").collect();
        assert_eq!(t[0].subject, "urn:fb:/m/0x");
        assert_eq!(t[0].object.as_iri(), Some("urn:fb:/common/topic"));

        let anonymous = object(json!({"type": ["/common/topic"], "/a": 1}));
        assert_eq!(anonymous.triples(NS).count(), 0);
    }

    #[test]
    fn ntriples_output_escapes_literals() {
        let t = Triple::new(
            "http://rdf.freebase.com/m/0x",
            RDFS_LABEL,
            Term::Literal(Literal::plain("say \"hi\"\nback\\slash")),
        );
        assert_eq!(
            t.to_string(),
            r#"<http://rdf.freebase.com/m/0x> <http://www.w3.org/2000/01/rdf-schema#label> "say \"hi\"\nback\\slash" ."#
        );
        let odd = Triple::new("http://x/a b", RDF_TYPE, Term::Iri("http://x/<c>".into()));
        assert!(odd.to_ntriples().starts_with("<http://x/a\\u0020b>"));

        let mut buf = Vec::new();
        let n = write_ntriples(&mut buf, vec![t.clone(), t]).unwrap();
        assert_eq!(n, 2);
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 2);
    }
}
