//! Lexical TF-IDF retrieval over the context corpus.

use crate::context::Document;
use std::collections::{HashMap, HashSet};

pub const DEFAULT_TOP_K: usize = 5;

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Scores documents against a query by summed term frequency × inverse document frequency.
///
/// Deterministic: equal scores keep corpus order.
pub struct Retriever {
    documents: Vec<Document>,
    term_counts: Vec<HashMap<String, usize>>,
    idf: HashMap<String, f64>,
}

impl Retriever {
    pub fn new(documents: Vec<Document>) -> Self {
        let term_counts: Vec<HashMap<String, usize>> = documents
            .iter()
            .map(|doc| {
                let mut counts = HashMap::new();
                for term in tokenize(&doc.text) {
                    *counts.entry(term).or_insert(0) += 1;
                }
                counts
            })
            .collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for counts in &term_counts {
            for term in counts.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
        }

        let n = documents.len() as f64;
        let idf = doc_freq
            .into_iter()
            .map(|(term, df)| (term, ((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0))
            .collect();

        Self { documents, term_counts, idf }
    }

    /// Up to `k` documents, best first. Always returns `min(k, len)` documents.
    pub fn top_k(&self, query: &str, k: usize) -> Vec<&Document> {
        let terms: HashSet<String> = tokenize(query).collect();

        let mut scored: Vec<(usize, f64)> = self
            .term_counts
            .iter()
            .enumerate()
            .map(|(idx, counts)| {
                let score = terms
                    .iter()
                    .filter_map(|t| Some(*counts.get(t)? as f64 * self.idf.get(t)?))
                    .sum();
                (idx, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(idx, _)| &self.documents[idx]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::DocumentKind;

    fn doc(text: &str) -> Document {
        Document {
            kind: DocumentKind::Registration,
            text: text.into(),
            person_id: None,
            person_name: None,
            timestamp: None,
        }
    }

    #[test]
    fn test_most_relevant_document_first() {
        let retriever = Retriever::new(vec![
            doc("Person: Alice\nDepartment: Sales"),
            doc("Person: Bob\nDepartment: Engineering"),
            doc("Recognition Event:\nPerson: Bob"),
        ]);
        let top = retriever.top_k("Which department is Bob in?", 2);
        assert_eq!(top.len(), 2);
        assert!(top[0].text.contains("Engineering"));
    }

    #[test]
    fn test_rare_terms_outweigh_common_ones() {
        let retriever = Retriever::new(vec![
            doc("person person"),
            doc("person zebra"),
        ]);
        let top = retriever.top_k("person zebra", 1);
        assert_eq!(top[0].text, "person zebra");
    }

    #[test]
    fn test_ties_keep_corpus_order_and_k_is_capped() {
        let retriever = Retriever::new(vec![doc("a"), doc("b"), doc("c")]);
        let top = retriever.top_k("nothing matches", 5);
        let texts: Vec<&str> = top.iter().map(|d| d.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_empty_corpus() {
        let retriever = Retriever::new(vec![]);
        assert!(retriever.top_k("anything", 5).is_empty());
    }
}
