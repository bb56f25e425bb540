//! IRIs of RDF, RDFS and XSD terms the store and query parser refer to.

pub const RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const RDFS: &str = "http://www.w3.org/2000/01/rdf-schema#";
pub const XSD: &str = "http://www.w3.org/2001/XMLSchema#";
pub const OWL: &str = "http://www.w3.org/2002/07/owl#";

// rdf
pub const TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
pub const FIRST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#first";
pub const REST: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#rest";
pub const NIL: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#nil";
pub const LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

// xsd
pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DECIMAL: &str = "http://www.w3.org/2001/XMLSchema#decimal";
pub const XSD_DOUBLE: &str = "http://www.w3.org/2001/XMLSchema#double";

/// Prefixes known to every [`crate::namespace::PrefixMap::with_defaults`] map.
pub const DEFAULT_PREFIXES: [(&str, &str); 4] =
    [("rdf", RDF), ("rdfs", RDFS), ("xsd", XSD), ("owl", OWL)];
