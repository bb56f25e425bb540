//! In-memory multi-key index over quads.
//!
//! Terms are interned into a reference-counted dictionary so that every
//! sub-index is keyed by small integer ids. Quads live in an append-only slot
//! table whose position doubles as the insertion sequence number; scans return
//! matches in that order, which keeps "first match" lookups deterministic for a
//! fixed store state.
//!
//! Sub-indexes cover subject, predicate, object, graph and subject+predicate.
//! A scan picks the sub-index that binds the most positions, breaking ties on
//! candidate count and then on a fixed priority, and filters the remaining
//! positions by comparing ids. With no position bound the scan walks the slot
//! table.

use crate::error::Position;
use crate::quad::Quad;
use crate::term::Term;
use log::debug;
use rustc_hash::{FxHashMap, FxHashSet};

type TermId = u32;
type QuadId = usize;
type EncodedQuad = [TermId; 4];

/// A pattern over the four quad positions; `None` matches anything.
pub type QuadPattern<'a> = [Option<&'a Term>; 4];

/// Compaction only kicks in once this many slots are dead.
const MIN_TOMBSTONES_FOR_COMPACTION: usize = 1024;

#[derive(Debug, Default, Clone)]
struct TermDict {
    ids: FxHashMap<Term, TermId>,
    terms: Vec<Option<Term>>,
    refs: Vec<u32>,
    free: Vec<TermId>,
}

impl TermDict {
    fn lookup(&self, term: &Term) -> Option<TermId> {
        self.ids.get(term).copied()
    }

    /// Returns the id for `term`, allocating one if needed, and takes a reference.
    fn acquire(&mut self, term: &Term) -> TermId {
        if let Some(&id) = self.ids.get(term) {
            self.refs[id as usize] += 1;
            return id;
        }
        let id = match self.free.pop() {
            Some(id) => {
                self.terms[id as usize] = Some(term.clone());
                self.refs[id as usize] = 1;
                id
            }
            None => {
                let id = self.terms.len() as TermId;
                self.terms.push(Some(term.clone()));
                self.refs.push(1);
                id
            }
        };
        self.ids.insert(term.clone(), id);
        id
    }

    /// Drops one reference; the id is recycled when nothing refers to it.
    fn release(&mut self, id: TermId) {
        let slot = id as usize;
        self.refs[slot] -= 1;
        if self.refs[slot] == 0 {
            if let Some(term) = self.terms[slot].take() {
                self.ids.remove(&term);
            }
            self.free.push(id);
        }
    }

    /// Only called with ids taken from live slots, which hold a reference
    /// to their terms until removed.
    fn get(&self, id: TermId) -> &Term {
        self.terms[id as usize]
            .as_ref()
            .expect("term id referenced by a live quad must be interned")
    }

    fn len(&self) -> usize {
        self.ids.len()
    }
}

/// Which sub-index a scan reads its candidates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Access {
    SubjectPredicate,
    Object,
    Subject,
    Predicate,
    Graph,
}

impl Access {
    fn bound_positions(self) -> usize {
        match self {
            Access::SubjectPredicate => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct QuadIndex {
    dict: TermDict,
    slots: Vec<Option<EncodedQuad>>,
    live: FxHashMap<EncodedQuad, QuadId>,
    by_subject: FxHashMap<TermId, FxHashSet<QuadId>>,
    by_predicate: FxHashMap<TermId, FxHashSet<QuadId>>,
    by_object: FxHashMap<TermId, FxHashSet<QuadId>>,
    by_graph: FxHashMap<TermId, FxHashSet<QuadId>>,
    by_subject_predicate: FxHashMap<(TermId, TermId), FxHashSet<QuadId>>,
    tombstones: usize,
}

fn posting_insert<K: std::hash::Hash + Eq>(
    map: &mut FxHashMap<K, FxHashSet<QuadId>>,
    key: K,
    id: QuadId,
) {
    map.entry(key).or_default().insert(id);
}

fn posting_remove<K: std::hash::Hash + Eq>(
    map: &mut FxHashMap<K, FxHashSet<QuadId>>,
    key: K,
    id: QuadId,
) {
    if let Some(set) = map.get_mut(&key) {
        set.remove(&id);
        if set.is_empty() {
            map.remove(&key);
        }
    }
}

impl QuadIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored quads.
    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Number of distinct terms currently referenced by stored quads.
    pub fn term_count(&self) -> usize {
        self.dict.len()
    }

    /// Whether any stored quad mentions `term` in any position.
    pub fn has_term(&self, term: &Term) -> bool {
        self.dict.lookup(term).is_some()
    }

    fn encode(&self, quad: &Quad) -> Option<EncodedQuad> {
        Some([
            self.dict.lookup(quad.subject())?,
            self.dict.lookup(quad.predicate())?,
            self.dict.lookup(quad.object())?,
            self.dict.lookup(quad.graph())?,
        ])
    }

    pub fn contains(&self, quad: &Quad) -> bool {
        self.encode(quad)
            .map(|e| self.live.contains_key(&e))
            .unwrap_or(false)
    }

    /// Adds `quad`; returns `false` if it was already present.
    pub fn insert(&mut self, quad: &Quad) -> bool {
        if self.contains(quad) {
            return false;
        }
        let encoded = [
            self.dict.acquire(quad.subject()),
            self.dict.acquire(quad.predicate()),
            self.dict.acquire(quad.object()),
            self.dict.acquire(quad.graph()),
        ];
        let id = self.slots.len();
        self.slots.push(Some(encoded));
        self.live.insert(encoded, id);
        self.index_postings(encoded, id);
        true
    }

    fn index_postings(&mut self, [s, p, o, g]: EncodedQuad, id: QuadId) {
        posting_insert(&mut self.by_subject, s, id);
        posting_insert(&mut self.by_predicate, p, id);
        posting_insert(&mut self.by_object, o, id);
        posting_insert(&mut self.by_graph, g, id);
        posting_insert(&mut self.by_subject_predicate, (s, p), id);
    }

    /// Removes `quad`; returns `false` if it was not present.
    pub fn remove(&mut self, quad: &Quad) -> bool {
        let Some(encoded) = self.encode(quad) else {
            return false;
        };
        let Some(id) = self.live.remove(&encoded) else {
            return false;
        };
        let [s, p, o, g] = encoded;
        posting_remove(&mut self.by_subject, s, id);
        posting_remove(&mut self.by_predicate, p, id);
        posting_remove(&mut self.by_object, o, id);
        posting_remove(&mut self.by_graph, g, id);
        posting_remove(&mut self.by_subject_predicate, (s, p), id);
        self.slots[id] = None;
        self.tombstones += 1;
        for term_id in encoded {
            self.dict.release(term_id);
        }
        self.maybe_compact();
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Rebuilds the slot table without dead slots, keeping insertion order.
    fn maybe_compact(&mut self) {
        if self.tombstones < MIN_TOMBSTONES_FOR_COMPACTION || self.tombstones <= self.live.len() {
            return;
        }
        debug!(
            "Compacting quad index: {} live, {} tombstones",
            self.live.len(),
            self.tombstones
        );
        let slots: Vec<EncodedQuad> = self.slots.drain(..).flatten().collect();
        self.live.clear();
        self.by_subject.clear();
        self.by_predicate.clear();
        self.by_object.clear();
        self.by_graph.clear();
        self.by_subject_predicate.clear();
        self.tombstones = 0;
        for (id, encoded) in slots.into_iter().enumerate() {
            self.slots.push(Some(encoded));
            self.live.insert(encoded, id);
            self.index_postings(encoded, id);
        }
    }

    fn postings(&self, access: Access, bound: &[Option<TermId>; 4]) -> Option<&FxHashSet<QuadId>> {
        match access {
            Access::SubjectPredicate => self
                .by_subject_predicate
                .get(&(bound[0]?, bound[1]?)),
            Access::Subject => self.by_subject.get(&bound[0]?),
            Access::Predicate => self.by_predicate.get(&bound[1]?),
            Access::Object => self.by_object.get(&bound[2]?),
            Access::Graph => self.by_graph.get(&bound[3]?),
        }
    }

    /// Dictionary ids of the bound positions, or `None` when a bound term has
    /// never been seen (so nothing can match).
    fn encode_pattern(&self, pattern: &QuadPattern<'_>) -> Option<[Option<TermId>; 4]> {
        let mut bound: [Option<TermId>; 4] = [None; 4];
        for (slot, term) in bound.iter_mut().zip(pattern.iter()) {
            if let Some(term) = term {
                *slot = Some(self.dict.lookup(term)?);
            }
        }
        Some(bound)
    }

    /// The sub-index to read: the most bound positions first, then the
    /// smallest posting list, then the fixed order of [`Access`].
    /// `None` means a full scan.
    fn choose_access(&self, bound: &[Option<TermId>; 4]) -> Option<Access> {
        let mut candidates: Vec<Access> = Vec::with_capacity(5);
        if bound[0].is_some() && bound[1].is_some() {
            candidates.push(Access::SubjectPredicate);
        }
        if bound[2].is_some() {
            candidates.push(Access::Object);
        }
        if bound[0].is_some() {
            candidates.push(Access::Subject);
        }
        if bound[1].is_some() {
            candidates.push(Access::Predicate);
        }
        if bound[3].is_some() {
            candidates.push(Access::Graph);
        }
        candidates.into_iter().min_by_key(|access| {
            let cardinality = self.postings(*access, bound).map_or(0, |set| set.len());
            (
                std::cmp::Reverse(access.bound_positions()),
                cardinality,
                *access,
            )
        })
    }

    /// Ids of stored quads matching `pattern`, in insertion order.
    fn scan_ids(&self, pattern: &QuadPattern<'_>) -> Vec<QuadId> {
        let Some(bound) = self.encode_pattern(pattern) else {
            return Vec::new();
        };
        let Some(access) = self.choose_access(&bound) else {
            return self
                .slots
                .iter()
                .enumerate()
                .filter_map(|(id, slot)| slot.map(|_| id))
                .collect();
        };
        let matches = |encoded: &EncodedQuad| {
            encoded
                .iter()
                .zip(bound.iter())
                .all(|(have, want)| want.map_or(true, |w| *have == w))
        };
        let Some(postings) = self.postings(access, &bound) else {
            return Vec::new();
        };
        let mut ids: Vec<QuadId> = postings
            .iter()
            .copied()
            .filter(|id| self.slots[*id].as_ref().is_some_and(matches))
            .collect();
        ids.sort_unstable();
        ids
    }

    fn decode(&self, id: QuadId) -> Option<Quad> {
        let [s, p, o, g] = self.slots.get(id).copied().flatten()?;
        Some(Quad::new_unchecked(
            self.dict.get(s).clone(),
            self.dict.get(p).clone(),
            self.dict.get(o).clone(),
            self.dict.get(g).clone(),
        ))
    }

    /// All stored quads matching `pattern`, in insertion order.
    pub fn scan(&self, pattern: &QuadPattern<'_>) -> Vec<Quad> {
        self.scan_ids(pattern)
            .into_iter()
            .filter_map(|id| self.decode(id))
            .collect()
    }

    /// The terms at `position` of every match, in insertion order, without
    /// materializing whole quads.
    pub fn scan_position(&self, pattern: &QuadPattern<'_>, position: Position) -> Vec<&Term> {
        let column = match position {
            Position::Subject => 0,
            Position::Predicate => 1,
            Position::Object => 2,
            Position::Graph => 3,
        };
        self.scan_ids(pattern)
            .into_iter()
            .filter_map(|id| self.slots[id].map(|encoded| self.dict.get(encoded[column])))
            .collect()
    }

    /// Number of matches for `pattern`.
    pub fn count(&self, pattern: &QuadPattern<'_>) -> usize {
        if pattern.iter().all(Option::is_none) {
            return self.len();
        }
        self.scan_ids(pattern).len()
    }

    /// Every stored quad in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Quad> + '_ {
        (0..self.slots.len()).filter_map(move |id| self.decode(id))
    }

    /// Distinct graph terms in order of first appearance.
    pub fn graphs(&self) -> Vec<Term> {
        let mut firsts: Vec<(QuadId, TermId)> = self
            .by_graph
            .iter()
            .filter_map(|(g, ids)| ids.iter().min().map(|first| (*first, *g)))
            .collect();
        firsts.sort_unstable();
        firsts
            .into_iter()
            .map(|(_, g)| self.dict.get(g).clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> Term {
        Term::iri(format!("http://example.org/{s}")).unwrap()
    }

    fn quad(s: &str, p: &str, o: &str, g: &str) -> Quad {
        Quad::new(iri(s), iri(p), iri(o), iri(g)).unwrap()
    }

    #[test]
    fn insert_is_idempotent() {
        let mut idx = QuadIndex::new();
        assert!(idx.insert(&quad("a", "p", "b", "g")));
        assert!(!idx.insert(&quad("a", "p", "b", "g")));
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn terms_are_released_on_remove() {
        let mut idx = QuadIndex::new();
        idx.insert(&quad("a", "p", "b", "g"));
        idx.insert(&quad("a", "p", "c", "g"));
        assert_eq!(idx.term_count(), 5);
        assert!(idx.remove(&quad("a", "p", "b", "g")));
        assert_eq!(idx.term_count(), 4);
        assert!(!idx.remove(&quad("a", "p", "b", "g")));
        assert!(idx.remove(&quad("a", "p", "c", "g")));
        assert_eq!(idx.term_count(), 0);
        assert!(idx.is_empty());
    }

    #[test]
    fn scan_uses_bound_positions() {
        let mut idx = QuadIndex::new();
        idx.insert(&quad("a", "p", "b", "g1"));
        idx.insert(&quad("a", "q", "b", "g1"));
        idx.insert(&quad("c", "p", "b", "g2"));
        let (a, p, b, g2) = (iri("a"), iri("p"), iri("b"), iri("g2"));

        assert_eq!(idx.scan(&[Some(&a), Some(&p), None, None]).len(), 1);
        assert_eq!(idx.scan(&[None, None, Some(&b), None]).len(), 3);
        assert_eq!(idx.scan(&[None, Some(&p), None, Some(&g2)]).len(), 1);
        assert_eq!(idx.scan(&[Some(&a), None, Some(&b), Some(&g2)]).len(), 0);
        assert_eq!(idx.scan(&[None, None, None, None]).len(), 3);
        let unknown = iri("nope");
        assert!(idx.scan(&[Some(&unknown), None, None, None]).is_empty());
    }

    #[test]
    fn recycled_ids_resolve_to_their_new_terms() {
        let mut idx = QuadIndex::new();
        idx.insert(&quad("a", "p", "b", "g"));
        idx.remove(&quad("a", "p", "b", "g"));
        idx.insert(&quad("x", "q", "y", "h"));
        assert_eq!(
            idx.scan(&[None, None, None, None]),
            vec![quad("x", "q", "y", "h")]
        );
    }

    #[test]
    #[should_panic(expected = "must be interned")]
    fn released_ids_are_not_resolved() {
        let mut dict = TermDict::default();
        let id = dict.acquire(&iri("a"));
        dict.release(id);
        let _ = dict.get(id);
    }

    fn access(idx: &QuadIndex, pattern: [Option<&Term>; 4]) -> Option<Access> {
        let bound = idx.encode_pattern(&pattern).unwrap();
        idx.choose_access(&bound)
    }

    #[test]
    fn access_path_per_bound_positions() {
        let mut idx = QuadIndex::new();
        idx.insert(&quad("a", "p", "b", "g"));
        let (a, p, b, g) = (iri("a"), iri("p"), iri("b"), iri("g"));

        assert_eq!(access(&idx, [None, None, None, None]), None);
        assert_eq!(access(&idx, [Some(&a), None, None, None]), Some(Access::Subject));
        assert_eq!(access(&idx, [None, Some(&p), None, None]), Some(Access::Predicate));
        assert_eq!(access(&idx, [None, None, Some(&b), None]), Some(Access::Object));
        assert_eq!(access(&idx, [None, None, None, Some(&g)]), Some(Access::Graph));
        assert_eq!(
            access(&idx, [Some(&a), Some(&p), None, None]),
            Some(Access::SubjectPredicate)
        );
        assert_eq!(
            access(&idx, [Some(&a), Some(&p), Some(&b), Some(&g)]),
            Some(Access::SubjectPredicate)
        );
        // Every list has one entry, so the fixed order decides.
        assert_eq!(access(&idx, [Some(&a), None, Some(&b), None]), Some(Access::Object));
        assert_eq!(access(&idx, [None, Some(&p), None, Some(&g)]), Some(Access::Predicate));
        assert_eq!(access(&idx, [Some(&a), None, None, Some(&g)]), Some(Access::Subject));
        assert!(idx.encode_pattern(&[Some(&iri("nope")), None, None, None]).is_none());
    }

    #[test]
    fn access_path_prefers_smaller_postings() {
        let mut idx = QuadIndex::new();
        // Postings: a 3, c 1, p 4, o1 1, o2 3, g1 2, g2 1.
        idx.insert(&quad("a", "p", "o1", "g1"));
        idx.insert(&quad("a", "p", "o2", "g1"));
        idx.insert(&quad("a", "p", "o2", "g1x"));
        idx.insert(&quad("c", "p", "o2", "g2"));
        let (a, c, p) = (iri("a"), iri("c"), iri("p"));
        let (o1, o2, g1, g2) = (iri("o1"), iri("o2"), iri("g1"), iri("g2"));

        assert_eq!(access(&idx, [Some(&a), None, Some(&o1), None]), Some(Access::Object));
        assert_eq!(access(&idx, [Some(&c), None, Some(&o2), None]), Some(Access::Subject));
        // Equal sizes fall back to the fixed order.
        assert_eq!(access(&idx, [Some(&a), None, Some(&o2), None]), Some(Access::Object));
        assert_eq!(access(&idx, [None, Some(&p), None, Some(&g2)]), Some(Access::Graph));
        assert_eq!(access(&idx, [None, Some(&p), None, Some(&g1)]), Some(Access::Graph));
        assert_eq!(access(&idx, [Some(&a), None, None, Some(&g2)]), Some(Access::Graph));
        // Two bound positions win even over a smaller single list.
        assert_eq!(
            access(&idx, [Some(&a), Some(&p), Some(&o1), None]),
            Some(Access::SubjectPredicate)
        );
        assert_eq!(idx.scan(&[Some(&a), None, Some(&o2), None]).len(), 2);
        assert_eq!(idx.scan(&[None, Some(&p), None, Some(&g1)]).len(), 2);
    }

    #[test]
    fn scan_preserves_insertion_order() {
        let mut idx = QuadIndex::new();
        for o in ["z", "y", "x", "w"] {
            idx.insert(&quad("a", "p", o, "g"));
        }
        let a = iri("a");
        let objects: Vec<Term> = idx
            .scan(&[Some(&a), None, None, None])
            .into_iter()
            .map(|q| q.object().clone())
            .collect();
        assert_eq!(objects, vec![iri("z"), iri("y"), iri("x"), iri("w")]);
    }

    #[test]
    fn compaction_keeps_order_and_postings() {
        let mut idx = QuadIndex::new();
        let n = MIN_TOMBSTONES_FOR_COMPACTION * 3;
        for i in 0..n {
            idx.insert(&quad("s", "p", &format!("o{i}"), "g"));
        }
        // remove all but every third quad, which forces compaction
        for i in 0..n {
            if i % 3 != 0 {
                idx.remove(&quad("s", "p", &format!("o{i}"), "g"));
            }
        }
        assert_eq!(idx.len(), n / 3);
        assert!(idx.slots.len() < n);
        let s = iri("s");
        let objects: Vec<Term> = idx
            .scan(&[Some(&s), None, None, None])
            .into_iter()
            .map(|q| q.object().clone())
            .collect();
        let expected: Vec<Term> = (0..n).step_by(3).map(|i| iri(&format!("o{i}"))).collect();
        assert_eq!(objects, expected);
    }

    #[test]
    fn graphs_in_first_seen_order() {
        let mut idx = QuadIndex::new();
        idx.insert(&quad("a", "p", "b", "g2"));
        idx.insert(&quad("a", "p", "b", "g1"));
        idx.insert(&quad("a", "p", "c", "g2"));
        assert_eq!(idx.graphs(), vec![iri("g2"), iri("g1")]);
    }
}
