//! In-memory fuzzy/prefix full-text index over storage paths.
//!
//! Documents are keyed by storage path and tokenized on every
//! non-alphanumeric character, so `/Movies/The.Matrix.1999.mkv` indexes as
//! `movies the matrix 1999 mkv`. Each query token expands to the index terms
//! it matches exactly, by prefix, or within a bounded edit distance; every
//! expansion contributes a weighted BM25 score to the documents holding it.

use crate::config::{CombineMode, SearchConfig};
use crate::index::{Mutation, MutationSink};
use crate::path::{is_descendant, ROOT};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

const PREFIX_WEIGHT: f64 = 0.375;
const FUZZY_WEIGHT: f64 = 0.45;
const MAX_FUZZY_DISTANCE: usize = 6;
const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.7;
const BM25_DELTA: f64 = 0.5;

type DocId = u32;

/// Matching knobs for a single search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchOptions {
    /// Allow query tokens to match as a prefix of indexed tokens
    pub prefix: bool,
    /// Edit distance tolerance: a fraction of the token length when below 1,
    /// otherwise an absolute distance
    pub fuzzy: f64,
    pub combine: CombineMode,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            prefix: config.prefix,
            fuzzy: config.fuzzy,
            combine: config.combine,
        }
    }
}

/// A ranked search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub path: String,
    pub score: f64,
    /// Index terms that matched
    pub terms: Vec<String>,
}

struct Document {
    path: String,
    tokens: Vec<String>,
}

#[derive(Default)]
pub struct SearchIndex {
    ids: BTreeMap<String, DocId>,
    docs: HashMap<DocId, Document>,
    /// term -> (doc -> term frequency)
    terms: BTreeMap<String, HashMap<DocId, u32>>,
    next_id: DocId,
    total_tokens: u64,
}

/// Lowercased alphanumeric runs of `text`
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl SearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Add or replace the document for `path`
    pub fn add(&mut self, path: &str) {
        self.remove(path);

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let tokens = tokenize(path);
        for token in &tokens {
            *self
                .terms
                .entry(token.clone())
                .or_default()
                .entry(id)
                .or_insert(0) += 1;
        }
        self.total_tokens += tokens.len() as u64;

        self.ids.insert(path.to_string(), id);
        self.docs.insert(
            id,
            Document {
                path: path.to_string(),
                tokens,
            },
        );
    }

    /// Remove the document for `path`; returns whether it existed
    pub fn remove(&mut self, path: &str) -> bool {
        let Some(id) = self.ids.remove(path) else {
            return false;
        };
        let Some(doc) = self.docs.remove(&id) else {
            return false;
        };

        for token in &doc.tokens {
            if let Some(postings) = self.terms.get_mut(token) {
                postings.remove(&id);
                if postings.is_empty() {
                    self.terms.remove(token);
                }
            }
        }
        self.total_tokens -= doc.tokens.len() as u64;
        true
    }

    /// Remove `dir` and every document below it
    pub fn remove_tree(&mut self, dir: &str) {
        let scan_from = if dir == ROOT {
            ROOT.to_string()
        } else {
            format!("{}/", dir)
        };
        let doomed: Vec<String> = self
            .ids
            .range(scan_from.clone()..)
            .take_while(|(path, _)| path.starts_with(&scan_from))
            .filter(|(path, _)| is_descendant(path, dir))
            .map(|(path, _)| path.clone())
            .collect();

        for path in doomed {
            self.remove(&path);
        }
        self.remove(dir);
    }

    /// Ranked search. An empty query returns every document with score 0.
    ///
    /// Hits are ordered by descending score, ties in natural path order.
    pub fn search(&self, query: &str, options: &SearchOptions) -> Vec<SearchHit> {
        let mut query_terms = tokenize(query);
        query_terms.dedup();

        let mut hits: Vec<SearchHit> = if query_terms.is_empty() {
            self.docs
                .values()
                .map(|doc| SearchHit {
                    path: doc.path.clone(),
                    score: 0.0,
                    terms: Vec::new(),
                })
                .collect()
        } else {
            self.score_documents(&query_terms, options)
        };

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| alphanumeric_sort::compare_str(&a.path, &b.path))
        });
        hits
    }

    fn score_documents(&self, query_terms: &[String], options: &SearchOptions) -> Vec<SearchHit> {
        struct Accumulator {
            score: f64,
            matched: Vec<bool>,
            terms: Vec<String>,
        }

        let doc_count = self.docs.len() as f64;
        let avg_len = if self.docs.is_empty() {
            1.0
        } else {
            (self.total_tokens as f64 / doc_count).max(1.0)
        };

        let mut scores: HashMap<DocId, Accumulator> = HashMap::new();

        for (qi, query_term) in query_terms.iter().enumerate() {
            for (term, weight) in self.expand_term(query_term, options) {
                let Some(postings) = self.terms.get(term) else {
                    continue;
                };
                let df = postings.len() as f64;
                let idf = (1.0 + (doc_count - df + 0.5) / (df + 0.5)).ln();

                for (doc_id, tf) in postings {
                    let doc_len = self
                        .docs
                        .get(doc_id)
                        .map(|d| d.tokens.len() as f64)
                        .unwrap_or(avg_len);
                    let tf = *tf as f64;
                    let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * doc_len / avg_len);
                    let bm25 = idf * (BM25_DELTA + tf * (BM25_K1 + 1.0) / (tf + norm));

                    let acc = scores.entry(*doc_id).or_insert_with(|| Accumulator {
                        score: 0.0,
                        matched: vec![false; query_terms.len()],
                        terms: Vec::new(),
                    });
                    acc.score += weight * bm25;
                    acc.matched[qi] = true;
                    if !acc.terms.iter().any(|t| t == term) {
                        acc.terms.push(term.to_string());
                    }
                }
            }
        }

        scores
            .into_iter()
            .filter(|(_, acc)| match options.combine {
                CombineMode::And => acc.matched.iter().all(|m| *m),
                CombineMode::Or => acc.matched.iter().any(|m| *m),
            })
            .filter_map(|(doc_id, acc)| {
                self.docs.get(&doc_id).map(|doc| SearchHit {
                    path: doc.path.clone(),
                    score: acc.score,
                    terms: acc.terms,
                })
            })
            .collect()
    }

    /// Index terms matched by one query token, with their best weight
    fn expand_term<'a>(&'a self, query_term: &str, options: &SearchOptions) -> Vec<(&'a str, f64)> {
        let mut weights: HashMap<&'a str, f64> = HashMap::new();
        let mut keep_best = |term: &'a str, weight: f64| {
            let slot = weights.entry(term).or_insert(0.0);
            if weight > *slot {
                *slot = weight;
            }
        };

        let query_len = query_term.chars().count();

        if let Some((term, _)) = self.terms.get_key_value(query_term) {
            keep_best(term.as_str(), 1.0);
        }

        if options.prefix {
            for (term, _) in self
                .terms
                .range::<str, _>((
                    std::ops::Bound::Excluded(query_term),
                    std::ops::Bound::Unbounded,
                ))
                .take_while(|(term, _)| term.starts_with(query_term))
            {
                let extra = term.chars().count().saturating_sub(query_len) as f64;
                let weight = PREFIX_WEIGHT * query_len as f64 / (query_len as f64 + 0.3 * extra);
                keep_best(term.as_str(), weight);
            }
        }

        let max_distance = fuzzy_distance(query_len, options.fuzzy);
        if max_distance > 0 {
            for term in self.terms.keys() {
                let term_len = term.chars().count();
                if term_len.abs_diff(query_len) > max_distance {
                    continue;
                }
                if let Some(distance) = bounded_levenshtein(query_term, term, max_distance) {
                    if distance > 0 {
                        let weight = FUZZY_WEIGHT * query_len as f64 / (query_len + distance) as f64;
                        keep_best(term.as_str(), weight);
                    }
                }
            }
        }

        weights.into_iter().collect()
    }
}

impl MutationSink for SearchIndex {
    fn apply(&mut self, mutation: &Mutation) {
        match mutation {
            Mutation::Upsert(entry) => self.add(entry.path()),
            Mutation::Remove(path) => {
                self.remove(path);
            }
            Mutation::RemoveTree(path) => self.remove_tree(path),
        }
    }
}

/// Allowed edit distance for a token of `len` characters
fn fuzzy_distance(len: usize, fuzzy: f64) -> usize {
    if !(fuzzy > 0.0) {
        return 0;
    }
    let distance = if fuzzy < 1.0 {
        (len as f64 * fuzzy).round() as usize
    } else {
        fuzzy as usize
    };
    distance.min(MAX_FUZZY_DISTANCE)
}

/// Levenshtein distance, or `None` once it is certain to exceed `max`
fn bounded_levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return None;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
            row_min = row_min.min(curr[j + 1]);
        }
        if row_min > max {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let distance = prev[b.len()];
    (distance <= max).then_some(distance)
}
