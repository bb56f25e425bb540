//! Parser for the textual pattern query syntax.
//!
//! ```text
//! PREFIX ex: <http://example.org/>
//! SELECT ?x ?y WHERE {
//!     ?x ex:knows ?y ; a ex:Person .
//!     GRAPH ?g { ?y ex:knows ?x }
//! }
//! ```
//!
//! The `SELECT` clause is optional, and so are the braces when it is absent,
//! so a bare `?s ?p ?o` is a complete query. Triples outside a `GRAPH` block
//! match quads in any graph; `GRAPH DEFAULT { … }` matches only the default
//! graph. Blank node labels are concrete terms, not variables.

use super::{PatternQuery, QuadPattern};
use crate::consts::{TYPE, XSD_DECIMAL, XSD_DOUBLE, XSD_INTEGER};
use crate::error::MalformedQueryError;
use crate::namespace::PrefixMap;
use crate::term::{BlankNode, Literal, NamedNode, Term, Variable};
use url::Url;

const MAX_TOKEN_CHARS: usize = 24;

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '-'
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    prefixes: PrefixMap,
    base: Option<Url>,
}

pub(crate) fn parse_query(text: &str) -> Result<PatternQuery, MalformedQueryError> {
    Parser::new(text, PrefixMap::with_defaults()).query()
}

/// Parses a single term (`<iri>`, `ex:name`, `"literal"@en`, `?var`, `( … )`)
/// using the default prefixes.
pub fn parse_term(text: &str) -> Result<Term, MalformedQueryError> {
    parse_term_with(text, &PrefixMap::with_defaults())
}

/// Parses a single term, resolving compact IRIs with `prefixes`.
pub fn parse_term_with(text: &str, prefixes: &PrefixMap) -> Result<Term, MalformedQueryError> {
    let mut parser = Parser::new(text, prefixes.clone());
    let term = parser.term()?;
    parser.skip_ws();
    if !parser.at_end() {
        return Err(parser.error("unexpected input after term"));
    }
    Ok(term)
}

impl<'a> Parser<'a> {
    fn new(input: &'a str, prefixes: PrefixMap) -> Self {
        Parser {
            input,
            pos: 0,
            prefixes,
            base: None,
        }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn token_at(&self, pos: usize) -> String {
        let token: String = self.input[pos..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .take(MAX_TOKEN_CHARS)
            .collect();
        if token.is_empty() {
            "end of input".to_string()
        } else {
            token
        }
    }

    fn error_at(&self, pos: usize, message: impl Into<String>) -> MalformedQueryError {
        MalformedQueryError::new(message, self.token_at(pos), pos)
    }

    fn error(&self, message: impl Into<String>) -> MalformedQueryError {
        self.error_at(self.pos, message)
    }

    /// Skips whitespace and consumes `c` if it comes next.
    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), MalformedQueryError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{c}'")))
        }
    }

    fn looking_at_keyword(&self, keyword: &str) -> bool {
        let rest = self.rest();
        match rest.get(..keyword.len()) {
            Some(head) if head.eq_ignore_ascii_case(keyword) => !rest[keyword.len()..]
                .chars()
                .next()
                .is_some_and(|c| is_name_char(c) || c == ':'),
            _ => false,
        }
    }

    fn keyword(&mut self, keyword: &str) -> bool {
        self.skip_ws();
        if self.looking_at_keyword(keyword) {
            self.pos += keyword.len();
            true
        } else {
            false
        }
    }

    /// Reads name characters, plus inner dots when `dots` is set. A trailing
    /// dot is left for the statement terminator.
    fn name(&mut self, dots: bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if is_name_char(c) || (dots && c == '.') {
                self.bump();
            } else {
                break;
            }
        }
        while dots && self.input[start..self.pos].ends_with('.') {
            self.pos -= 1;
        }
        &self.input[start..self.pos]
    }

    fn query(mut self) -> Result<PatternQuery, MalformedQueryError> {
        loop {
            if self.keyword("PREFIX") {
                self.prefix_decl()?;
            } else if self.keyword("BASE") {
                self.skip_ws();
                let start = self.pos;
                let iri = self.iri_text()?;
                let base = Url::parse(&iri)
                    .map_err(|e| self.error_at(start, format!("invalid BASE IRI: {e}")))?;
                self.base = Some(base);
            } else {
                break;
            }
        }

        let mut projection: Option<Vec<(Variable, usize)>> = None;
        let select = self.keyword("SELECT");
        if select {
            if !self.eat('*') {
                let mut vars: Vec<(Variable, usize)> = Vec::new();
                self.skip_ws();
                while matches!(self.peek(), Some('?') | Some('$')) {
                    let start = self.pos;
                    let v = self.variable()?;
                    if !vars.iter().any(|(seen, _)| *seen == v) {
                        vars.push((v, start));
                    }
                    self.skip_ws();
                }
                if vars.is_empty() {
                    return Err(self.error("expected '*' or variables after SELECT"));
                }
                projection = Some(vars);
            }
            self.keyword("WHERE");
        }

        let braced = self.eat('{');
        if select && !braced {
            return Err(self.error("expected '{' to open the pattern block"));
        }
        let mut patterns = Vec::new();
        self.block(None, &mut patterns)?;
        if braced {
            self.expect('}')?;
        }
        self.skip_ws();
        if !self.at_end() {
            return Err(self.error("unexpected input after query"));
        }

        match projection {
            None => PatternQuery::new(patterns),
            Some(vars) => {
                let mentioned = |v: &Variable| {
                    patterns
                        .iter()
                        .flat_map(QuadPattern::variables)
                        .any(|seen| seen == v)
                };
                if let Some((v, pos)) = vars.iter().find(|(v, _)| !mentioned(v)) {
                    return Err(MalformedQueryError::new(
                        format!("projected variable {v} does not appear in any pattern"),
                        v.to_string(),
                        *pos,
                    ));
                }
                PatternQuery::with_projection(patterns, vars.into_iter().map(|(v, _)| v).collect())
            }
        }
    }

    fn prefix_decl(&mut self) -> Result<(), MalformedQueryError> {
        self.skip_ws();
        let start = self.pos;
        let prefix = self.name(false).to_string();
        if self.peek() != Some(':') {
            return Err(self.error_at(start, "expected a prefix name ending in ':'"));
        }
        self.bump();
        self.skip_ws();
        let iri = self.iri_text()?;
        self.prefixes.insert(prefix, iri);
        Ok(())
    }

    /// Triples and GRAPH blocks up to a closing brace or the end of input.
    fn block(
        &mut self,
        graph: Option<&Term>,
        out: &mut Vec<QuadPattern>,
    ) -> Result<(), MalformedQueryError> {
        loop {
            self.skip_ws();
            if matches!(self.peek(), None | Some('}')) {
                return Ok(());
            }
            let start = self.pos;
            if self.keyword("GRAPH") {
                if graph.is_some() {
                    return Err(self.error_at(start, "GRAPH blocks cannot be nested"));
                }
                let name = self.graph_name()?;
                self.expect('{')?;
                self.block(Some(&name), out)?;
                self.expect('}')?;
                self.eat('.');
                continue;
            }
            self.triples(graph, out)?;
            if !self.eat('.') {
                self.skip_ws();
                let done = matches!(self.peek(), None | Some('}'));
                if !done && !self.looking_at_keyword("GRAPH") {
                    return Err(self.error("expected '.' between triples"));
                }
            }
        }
    }

    fn graph_name(&mut self) -> Result<Term, MalformedQueryError> {
        if self.keyword("DEFAULT") {
            return Ok(Term::DefaultGraph);
        }
        self.skip_ws();
        let start = self.pos;
        match self.term()? {
            t @ (Term::NamedNode(_) | Term::BlankNode(_) | Term::Variable(_)) => Ok(t),
            _ => Err(self.error_at(start, "GRAPH name must be an IRI, blank node or variable")),
        }
    }

    /// One subject with its predicate-object list (`;` and `,` abbreviations).
    fn triples(
        &mut self,
        graph: Option<&Term>,
        out: &mut Vec<QuadPattern>,
    ) -> Result<(), MalformedQueryError> {
        self.skip_ws();
        let start = self.pos;
        let subject = self.term()?;
        if !matches!(
            subject,
            Term::NamedNode(_) | Term::BlankNode(_) | Term::Variable(_)
        ) {
            return Err(self.error_at(start, "subject must be an IRI, blank node or variable"));
        }
        loop {
            let predicate = self.verb()?;
            loop {
                let object = self.term()?;
                out.push(QuadPattern {
                    subject: subject.clone(),
                    predicate: predicate.clone(),
                    object,
                    graph: graph.cloned(),
                });
                if !self.eat(',') {
                    break;
                }
            }
            if !self.eat(';') {
                return Ok(());
            }
            // a trailing ';' may close the list
            self.skip_ws();
            if matches!(self.peek(), None | Some('.') | Some('}')) {
                return Ok(());
            }
        }
    }

    fn verb(&mut self) -> Result<Term, MalformedQueryError> {
        self.skip_ws();
        let start = self.pos;
        if self.peek() == Some('a')
            && !self
                .peek_second()
                .is_some_and(|c| is_name_char(c) || c == ':')
        {
            self.bump();
            return Ok(Term::NamedNode(NamedNode::new_unchecked(TYPE)));
        }
        match self.term()? {
            t @ (Term::NamedNode(_) | Term::Variable(_)) => Ok(t),
            _ => Err(self.error_at(start, "predicate must be an IRI or variable")),
        }
    }

    fn term(&mut self) -> Result<Term, MalformedQueryError> {
        self.skip_ws();
        let start = self.pos;
        let c = self
            .peek()
            .ok_or_else(|| self.error("unexpected end of input, expected a term"))?;
        match c {
            '<' => {
                let iri = self.iri_text()?;
                NamedNode::new(iri)
                    .map(Term::NamedNode)
                    .map_err(|e| self.error_at(start, e.to_string()))
            }
            '?' | '$' => self.variable().map(Term::Variable),
            '_' if self.peek_second() == Some(':') => {
                self.pos += 2;
                let label = self.name(true);
                BlankNode::new(label)
                    .map(Term::BlankNode)
                    .map_err(|e| self.error_at(start, e.to_string()))
            }
            '"' | '\'' => self.literal(),
            '(' => self.collection(),
            c if c.is_ascii_digit() || c == '+' || c == '-' || c == '.' => self.number(),
            _ if self.looking_at_keyword("true") => {
                self.pos += 4;
                Ok(Literal::from(true).into())
            }
            _ if self.looking_at_keyword("false") => {
                self.pos += 5;
                Ok(Literal::from(false).into())
            }
            _ => self.prefixed_name().map(Term::NamedNode),
        }
    }

    fn variable(&mut self) -> Result<Variable, MalformedQueryError> {
        let start = self.pos;
        self.bump();
        let name = self.name(false);
        Variable::new(name).map_err(|e| self.error_at(start, e.to_string()))
    }

    /// The text of an `<iri>`, resolved against BASE when one is set.
    fn iri_text(&mut self) -> Result<String, MalformedQueryError> {
        let start = self.pos;
        if self.peek() != Some('<') {
            return Err(self.error("expected '<'"));
        }
        self.bump();
        let body_start = self.pos;
        loop {
            match self.bump() {
                Some('>') => break,
                Some(c) if c.is_whitespace() || c == '<' || c == '"' => {
                    return Err(self.error_at(start, "invalid character in IRI"))
                }
                Some(_) => {}
                None => return Err(self.error_at(start, "unterminated IRI")),
            }
        }
        let raw = &self.input[body_start..self.pos - 1];
        match &self.base {
            Some(base) => base
                .join(raw)
                .map(String::from)
                .map_err(|e| self.error_at(start, format!("cannot resolve IRI: {e}"))),
            None => Ok(raw.to_string()),
        }
    }

    fn prefixed_name(&mut self) -> Result<NamedNode, MalformedQueryError> {
        let start = self.pos;
        let prefix = self.name(false);
        if self.peek() != Some(':') {
            return Err(self.error_at(start, "expected a term"));
        }
        self.bump();
        let local = self.name(true);
        let namespace = self
            .prefixes
            .namespace(prefix)
            .ok_or_else(|| self.error_at(start, format!("unknown prefix '{prefix}'")))?;
        NamedNode::new(format!("{namespace}{local}"))
            .map_err(|e| self.error_at(start, e.to_string()))
    }

    fn literal(&mut self) -> Result<Term, MalformedQueryError> {
        let start = self.pos;
        let quote = self.bump().unwrap_or('"');
        let mut value = String::new();
        loop {
            match self.bump() {
                None | Some('\n') | Some('\r') => {
                    return Err(self.error_at(start, "unterminated string literal"))
                }
                Some(c) if c == quote => break,
                Some('\\') => {
                    let escape_pos = self.pos - 1;
                    let c = match self.bump() {
                        Some('t') => '\t',
                        Some('b') => '\u{8}',
                        Some('n') => '\n',
                        Some('r') => '\r',
                        Some('f') => '\u{c}',
                        Some('"') => '"',
                        Some('\'') => '\'',
                        Some('\\') => '\\',
                        Some('u') => self.hex_escape(4, escape_pos)?,
                        Some('U') => self.hex_escape(8, escape_pos)?,
                        _ => return Err(self.error_at(escape_pos, "invalid escape sequence")),
                    };
                    value.push(c);
                }
                Some(c) => value.push(c),
            }
        }

        if self.peek() == Some('@') {
            self.bump();
            let tag = self.name(false);
            return Literal::new_language_tagged(value, tag)
                .map(Term::Literal)
                .map_err(|e| self.error_at(start, e.to_string()));
        }
        if self.rest().starts_with("^^") {
            self.pos += 2;
            let datatype = if self.peek() == Some('<') {
                let dt_start = self.pos;
                let iri = self.iri_text()?;
                NamedNode::new(iri).map_err(|e| self.error_at(dt_start, e.to_string()))?
            } else {
                self.prefixed_name()?
            };
            return Literal::new_typed(value, datatype)
                .map(Term::Literal)
                .map_err(|e| self.error_at(start, e.to_string()));
        }
        Ok(Term::Literal(Literal::new_simple(value)))
    }

    fn hex_escape(&mut self, digits: usize, escape_pos: usize) -> Result<char, MalformedQueryError> {
        let hex = self
            .rest()
            .get(..digits)
            .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()))
            .ok_or_else(|| self.error_at(escape_pos, "invalid unicode escape"))?;
        let c = u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error_at(escape_pos, "invalid unicode code point"))?;
        self.pos += digits;
        Ok(c)
    }

    fn number(&mut self) -> Result<Term, MalformedQueryError> {
        let start = self.pos;
        if matches!(self.peek(), Some('+') | Some('-')) {
            self.bump();
        }
        let mut datatype = XSD_INTEGER;
        let mut count = self.digits();
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            count += self.digits();
            datatype = XSD_DECIMAL;
        }
        if count == 0 {
            return Err(self.error_at(start, "expected a term"));
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            self.bump();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.bump();
            }
            if self.digits() == 0 {
                return Err(self.error_at(start, "invalid exponent in number"));
            }
            datatype = XSD_DOUBLE;
        }
        let lexical = &self.input[start..self.pos];
        Literal::new_typed(lexical, NamedNode::new_unchecked(datatype))
            .map(Term::Literal)
            .map_err(|e| self.error_at(start, e.to_string()))
    }

    fn digits(&mut self) -> usize {
        let from = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.pos - from
    }

    fn collection(&mut self) -> Result<Term, MalformedQueryError> {
        self.bump();
        let mut items = Vec::new();
        loop {
            if self.eat(')') {
                return Ok(Term::Collection(items));
            }
            if self.at_end() {
                return Err(self.error("unterminated collection"));
            }
            items.push(self.term()?);
        }
    }
}
