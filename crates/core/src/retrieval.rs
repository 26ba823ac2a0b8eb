//! Query-time retrieval: widened similarity search, then a lexical re-rank
//! that prefers extracted definitions and literal term matches.

use crate::config::{RetrievalOptions, WideningPlan};
use crate::index::ChunkIndex;
use crate::models::{MatchKind, RetrievedChunk, SearchScope};
use crate::terms::{is_short_acronym, matches_term, TermRules};
use crate::SearchError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

const ELLIPSIS: char = '…';

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedPattern {
    pub pattern: String,
    pub weight: f32,
}

/// Heuristic tables for definition extraction and term filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefinitionRules {
    /// Lines containing any of these (case-insensitive) are never definitions.
    pub boilerplate: Vec<String>,
    /// Tried in order on text whose dashes were unified to `—`, only for
    /// terms containing digits. The first capture group is the title.
    pub title_patterns: Vec<String>,
    pub title_exclusions: Vec<String>,
    pub canonical_phrases: Vec<String>,
    pub canonical_bonus: i64,
    /// Shorter lines earn `length_budget - length` points.
    pub length_budget: usize,
    pub max_line_chars: usize,
    /// Tie-break markers for chunks that merely contain the term.
    pub specificity: Vec<WeightedPattern>,
}

impl Default for DefinitionRules {
    fn default() -> Self {
        let boilerplate = [
            "foreword",
            "vorwort",
            "table of contents",
            "inhalt",
            "copyright",
            "all rights reserved",
            "wto",
            "technical barriers to trade",
            "patent",
            "feedback",
            "iec",
            "beuth",
            "best beuth",
            "figure",
            "overview of this document",
            "general considerations",
            "scope of this",
            "introduction",
            "normative references",
        ];

        Self {
            boilerplate: boilerplate.iter().map(|word| word.to_string()).collect(),
            title_patterns: vec![
                r"(?i)(Road\s+vehicles\s*—\s*Cybersecurity\s+engineering)".to_string(),
                r"(?i)([A-Za-z\s]+?\s*—\s*Cybersecurity\s+engineering)".to_string(),
            ],
            title_exclusions: vec!["foreword".to_string()],
            canonical_phrases: vec![
                "cybersecurity engineering".to_string(),
                "road vehicles".to_string(),
            ],
            canonical_bonus: 60,
            length_budget: 160,
            max_line_chars: 220,
            specificity: vec![
                WeightedPattern {
                    pattern: r"(?i)\b(?:ISO|SAE)[\s/-]*\d{3,6}\b".to_string(),
                    weight: 0.08,
                },
                WeightedPattern {
                    pattern: r"(?i)\bCAN(?:-FD)?\b".to_string(),
                    weight: 0.05,
                },
                WeightedPattern {
                    pattern: r"(?i)\b[A-Z]{2,10}(?:[/\-]?[A-Z0-9]{1,10})+\b".to_string(),
                    weight: 0.03,
                },
            ],
        }
    }
}

/// [`DefinitionRules`] with its patterns compiled.
#[derive(Debug, Clone)]
pub struct DefinitionMatcher {
    rules: DefinitionRules,
    boilerplate: Vec<String>,
    title_patterns: Vec<Regex>,
    specificity: Vec<(Regex, f32)>,
}

impl DefinitionMatcher {
    pub fn new(rules: &DefinitionRules) -> Result<Self, SearchError> {
        let title_patterns = rules
            .title_patterns
            .iter()
            .map(|pattern| Regex::new(pattern))
            .collect::<Result<Vec<_>, _>>()?;
        let specificity = rules
            .specificity
            .iter()
            .map(|weighted| Ok((Regex::new(&weighted.pattern)?, weighted.weight)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            rules: rules.clone(),
            boilerplate: rules.boilerplate.iter().map(|word| word.to_lowercase()).collect(),
            title_patterns,
            specificity,
        })
    }

    fn is_boilerplate(&self, line: &str) -> bool {
        let lowered = line.to_lowercase();
        self.boilerplate.iter().any(|word| lowered.contains(word.as_str()))
    }

    fn standard_title(&self, text: &str) -> Option<String> {
        let unified = text.replace(['–', '-'], "—");
        self.title_patterns.iter().find_map(|pattern| {
            let title = pattern.captures(&unified)?.get(1)?.as_str().trim().to_string();
            let lowered = title.to_lowercase();
            let excluded = self
                .rules
                .title_exclusions
                .iter()
                .any(|word| lowered.contains(&word.to_lowercase()));
            (!excluded).then_some(title)
        })
    }

    /// Chunks holding a definition of `term`, best first, with their text
    /// replaced by the definition line.
    pub fn find_definitions(&self, term: &str, chunks: &[RetrievedChunk]) -> Result<Vec<RetrievedChunk>, SearchError> {
        if term.is_empty() || chunks.is_empty() {
            return Ok(Vec::new());
        }

        // "CAN" defines, "can" is prose
        let case = if is_short_acronym(term) { "" } else { "(?i)" };
        let definition = Regex::new(&format!(
            r"{case}\b{}\b\s*(?:[-–—:]\s*)([^\n]{{5,200}})",
            regex::escape(term)
        ))?;
        let term_has_digits = term.chars().any(|ch| ch.is_ascii_digit());

        let mut hits = Vec::new();
        for chunk in chunks {
            // (line shown to the caller, part that is scored for length)
            let found = term_has_digits
                .then(|| self.standard_title(&chunk.text))
                .flatten()
                .map(|title| (title.clone(), title))
                .or_else(|| {
                    let captures = definition.captures(&chunk.text)?;
                    let line = captures.get(0)?.as_str().trim().to_string();
                    let explanation = captures.get(1)?.as_str().trim().to_string();
                    Some((line, explanation))
                });
            let Some((line, explanation)) = found else {
                continue;
            };
            if self.is_boilerplate(&line) {
                continue;
            }

            let line = truncate_with_ellipsis(&line, self.rules.max_line_chars);
            let explanation = truncate_with_ellipsis(&explanation, self.rules.max_line_chars);
            let lowered = line.to_lowercase();

            let length_score = self
                .rules
                .length_budget
                .saturating_sub(explanation.chars().count()) as i64;
            let bonus = if term_has_digits
                && self
                    .rules
                    .canonical_phrases
                    .iter()
                    .any(|phrase| lowered.contains(&phrase.to_lowercase()))
            {
                self.rules.canonical_bonus
            } else {
                0
            };
            let similarity = (chunk.similarity_score * 100.0) as i64;

            hits.push((
                RetrievedChunk {
                    text: line,
                    match_kind: MatchKind::Definition,
                    ..chunk.clone()
                },
                similarity + length_score + bonus,
            ));
        }

        hits.sort_by(|left, right| right.1.cmp(&left.1));
        Ok(hits.into_iter().map(|(chunk, _)| chunk).collect())
    }

    /// Chunks that literally contain `term`, ordered by similarity plus the
    /// weights of the specificity markers they carry.
    pub fn filter_by_term(&self, term: &str, chunks: &[RetrievedChunk]) -> Vec<RetrievedChunk> {
        if term.is_empty() {
            return Vec::new();
        }

        let mut scored = chunks
            .iter()
            .filter(|chunk| matches_term(term, &chunk.text))
            .map(|chunk| {
                let markers = self
                    .specificity
                    .iter()
                    .filter(|(pattern, _)| pattern.is_match(&chunk.text))
                    .map(|(_, weight)| weight)
                    .sum::<f32>();
                (
                    RetrievedChunk {
                        match_kind: MatchKind::TermMatch,
                        ..chunk.clone()
                    },
                    chunk.similarity_score + markers,
                )
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.into_iter().map(|(chunk, _)| chunk).collect()
    }
}

fn truncate_with_ellipsis(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{ELLIPSIS}", &text[..cut]),
        None => text.to_string(),
    }
}

fn dedup_key(chunk: &RetrievedChunk, prefix_chars: usize) -> (String, String) {
    (
        chunk.chunk_id.clone(),
        chunk.text.chars().take(prefix_chars).collect(),
    )
}

/// Drop repeated candidates, keeping the first occurrence.
pub fn dedup(chunks: Vec<RetrievedChunk>, prefix_chars: usize) -> Vec<RetrievedChunk> {
    let mut seen = HashSet::new();
    chunks
        .into_iter()
        .filter(|chunk| seen.insert(dedup_key(chunk, prefix_chars)))
        .collect()
}

fn unique_count(chunks: &[RetrievedChunk], prefix_chars: usize) -> usize {
    chunks
        .iter()
        .map(|chunk| dedup_key(chunk, prefix_chars))
        .collect::<HashSet<_>>()
        .len()
}

/// Split after `.`, `!` or `?` when whitespace follows.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((_, ch)) = chars.next() {
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        if let Some(&(next, following)) = chars.peek() {
            if following.is_whitespace() {
                sentences.push(&text[start..next]);
                start = next;
            }
        }
    }
    sentences.push(&text[start..]);
    sentences
}

fn is_quotable(term: &str, candidate: &str) -> bool {
    let length = candidate.chars().count();
    (20..=220).contains(&length) && matches_term(term, candidate)
}

/// A short quote mentioning `term`: a line, else a sentence, of 20 to 220
/// characters from the first chunk containing it, else that chunk's start.
pub fn find_sentence_with_term(term: &str, chunks: &[RetrievedChunk]) -> Option<String> {
    if term.is_empty() {
        return None;
    }

    let text = chunks
        .iter()
        .map(|chunk| chunk.text.trim())
        .find(|text| !text.is_empty() && matches_term(term, text))?;

    text.lines()
        .map(str::trim)
        .find(|line| is_quotable(term, line))
        .or_else(|| {
            split_sentences(text)
                .into_iter()
                .map(str::trim)
                .find(|sentence| is_quotable(term, sentence))
        })
        .map(str::to_string)
        .or_else(|| Some(truncate_with_ellipsis(text, 220)))
}

pub struct Retriever {
    index: Arc<ChunkIndex>,
    terms: TermRules,
    matcher: DefinitionMatcher,
    options: RetrievalOptions,
}

impl Retriever {
    pub fn new(
        index: Arc<ChunkIndex>,
        terms: TermRules,
        rules: &DefinitionRules,
        options: RetrievalOptions,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            index,
            terms,
            matcher: DefinitionMatcher::new(rules)?,
            options,
        })
    }

    pub fn detect_term(&self, query: &str) -> Option<String> {
        self.terms.detect_term(query)
    }

    fn plan_for(&self, scope: &SearchScope) -> &WideningPlan {
        match scope {
            SearchScope::Document(_) => &self.options.document_plan,
            SearchScope::Global => &self.options.global_plan,
        }
    }

    async fn search(
        &self,
        query: &str,
        scope: &SearchScope,
        k: usize,
        term: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        match scope.document_id() {
            Some(document_id) => self.index.search_in_document(query, document_id, k, term).await,
            None => self.index.search_global(query, k, term).await,
        }
    }

    /// Similarity candidates, widened until enough unique ones are found or
    /// the plan runs out; deduplicated, best first.
    async fn candidates(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
        term: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        let plan = self.plan_for(scope);
        let floor = plan.unique_floor(limit);
        let prefix = self.options.dedup_prefix_chars;

        let mut gathered = Vec::new();
        for (round, step) in plan.steps.iter().enumerate() {
            let k = step.candidates_for(limit);
            let found = self.search(query, scope, k, term).await?;
            if round == 0 && found.is_empty() && scope.document_id().is_some() {
                return Ok(Vec::new());
            }
            gathered.extend(found);

            let unique = unique_count(&gathered, prefix);
            if unique >= floor {
                break;
            }
            debug!(round, k, unique, floor, "few unique candidates, widening");
        }

        let mut unique = dedup(gathered, prefix);
        unique.sort_by(|left, right| right.similarity_score.total_cmp(&left.similarity_score));
        Ok(unique)
    }

    /// Ordered chunks most likely to answer `query` within `scope`.
    pub async fn retrieve(
        &self,
        query: &str,
        scope: &SearchScope,
        limit: usize,
    ) -> Result<Vec<RetrievedChunk>, SearchError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let term = self.detect_term(query);
        let mut chunks = self.candidates(query, scope, limit, term.as_deref()).await?;

        if let Some(term) = term.as_deref() {
            let mut definitions = self.matcher.find_definitions(term, &chunks)?;
            if !definitions.is_empty() {
                debug!(term, found = definitions.len(), "definition lines found");
                definitions.truncate(limit);
                return Ok(definitions);
            }

            let mut literal = self.matcher.filter_by_term(term, &chunks);
            if !literal.is_empty() {
                debug!(term, found = literal.len(), "chunks containing the term");
                literal.truncate(limit);
                return Ok(literal);
            }
        }

        chunks.truncate(limit);
        Ok(chunks)
    }

    /// Default result count for a scope.
    pub fn default_limit(&self, scope: &SearchScope) -> usize {
        match scope {
            SearchScope::Document(_) => self.options.document_limit,
            SearchScope::Global => self.options.global_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::{ChunkMetadata, ChunkRecord, DocumentVersion, ScoredRecord};
    use crate::stores::LocalStore;
    use crate::traits::{RecordFilter, VectorIndex};
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn chunk(id: &str, text: &str, similarity: f32) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: id.to_string(),
            document_id: "doc.pdf".to_string(),
            chunk_index: 0,
            total_chunks: 1,
            text: text.to_string(),
            similarity_score: similarity,
            boosted: false,
            match_kind: MatchKind::Similarity,
            metadata: ChunkMetadata::default(),
        }
    }

    fn matcher() -> DefinitionMatcher {
        DefinitionMatcher::new(&DefinitionRules::default()).expect("default rules compile")
    }

    #[test]
    fn extracts_term_dash_explanation_line() -> Result<(), SearchError> {
        let chunks = vec![
            chunk("a", "Bus systems overview. Nothing to define here.", 0.9),
            chunk("b", "CAN - Controller Area Network is a vehicle bus standard.", 0.5),
        ];
        let found = matcher().find_definitions("CAN", &chunks)?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chunk_id, "b");
        assert_eq!(found[0].text, "CAN - Controller Area Network is a vehicle bus standard.");
        assert_eq!(found[0].match_kind, MatchKind::Definition);
        Ok(())
    }

    #[test]
    fn lowercase_prose_does_not_define_an_acronym() -> Result<(), SearchError> {
        let chunks = vec![
            chunk("prose", "Gateways can - in practice - filter every frame.", 0.9),
            chunk("definition", "CAN - Controller Area Network", 0.4),
        ];
        let found = matcher().find_definitions("CAN", &chunks)?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chunk_id, "definition");

        let mixed = vec![chunk("a", "Threat analysis: a systematic review of attack paths", 0.5)];
        assert_eq!(matcher().find_definitions("threat analysis", &mixed)?.len(), 1);
        Ok(())
    }

    #[test]
    fn boilerplate_lines_are_not_definitions() -> Result<(), SearchError> {
        let chunks = vec![chunk("a", "ISO: see the foreword for details on this edition", 0.9)];
        assert!(matcher().find_definitions("ISO", &chunks)?.is_empty());
        Ok(())
    }

    #[test]
    fn shorter_definitions_rank_first_at_equal_similarity() -> Result<(), SearchError> {
        let chunks = vec![
            chunk(
                "long",
                "TARA: threat analysis and risk assessment, performed for every item and repeated whenever the item changes",
                0.6,
            ),
            chunk("short", "TARA - threat analysis and risk assessment", 0.6),
        ];
        let found = matcher().find_definitions("TARA", &chunks)?;
        assert_eq!(found[0].chunk_id, "short");
        Ok(())
    }

    #[test]
    fn standard_numbers_prefer_canonical_titles() -> Result<(), SearchError> {
        let chunks = vec![
            chunk("other", "21434: applies to series production road users", 0.8),
            chunk("title", "ISO/SAE 21434 Road vehicles - Cybersecurity engineering", 0.5),
        ];
        let found = matcher().find_definitions("21434", &chunks)?;
        assert_eq!(found[0].chunk_id, "title");
        assert_eq!(found[0].text, "Road vehicles — Cybersecurity engineering");
        Ok(())
    }

    #[test]
    fn long_definitions_are_truncated() -> Result<(), SearchError> {
        let text = format!("RASIC - {}", "responsible ".repeat(30));
        let found = matcher().find_definitions("RASIC", &[chunk("a", &text, 0.5)])?;
        assert!(found[0].text.chars().count() <= 221);
        Ok(())
    }

    #[test]
    fn term_filter_respects_acronym_boundaries_and_markers() {
        let chunks = vec![
            chunk("prose", "You can configure the gateway.", 0.9),
            chunk("plain", "The CAN bus is used here.", 0.5),
            chunk("std", "CAN frames per ISO 11898 are used.", 0.48),
        ];
        let found = matcher().filter_by_term("CAN", &chunks);
        let ids = found.iter().map(|c| c.chunk_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["std", "plain"]);
        assert!(found.iter().all(|c| c.match_kind == MatchKind::TermMatch));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let chunks = vec![
            chunk("a", "same text", 0.9),
            chunk("a", "same text", 0.7),
            chunk("b", "same text", 0.6),
        ];
        let unique = dedup(chunks, 64);
        assert_eq!(unique.len(), 2);
        assert_eq!(unique[0].similarity_score, 0.9);
    }

    #[test]
    fn sentence_finder_prefers_lines_then_sentences() {
        let chunks = vec![
            chunk("x", "No mention of the term at all.", 0.9),
            chunk("y", "Intro line\nThe TARA is done per item in the concept phase.\nMore", 0.5),
        ];
        assert_eq!(
            find_sentence_with_term("TARA", &chunks).as_deref(),
            Some("The TARA is done per item in the concept phase.")
        );

        let long = format!(
            "{}A TARA identifies threats to assets. {}",
            "Filler words. ".repeat(10),
            "More filler. ".repeat(10)
        );
        let chunks = vec![chunk("z", &long, 0.5)];
        assert_eq!(
            find_sentence_with_term("TARA", &chunks).as_deref(),
            Some("A TARA identifies threats to assets.")
        );
    }

    #[test]
    fn sentence_finder_falls_back_to_chunk_start() {
        let chunks = vec![chunk("a", "TARA.", 0.5)];
        assert_eq!(find_sentence_with_term("TARA", &chunks).as_deref(), Some("TARA."));
        assert_eq!(find_sentence_with_term("HARA", &chunks), None);
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        assert_eq!(split_sentences("One. Two! Three"), vec!["One.", " Two!", " Three"]);
        assert_eq!(split_sentences("v1.2 stays"), vec!["v1.2 stays"]);
    }

    /// Records the `limit` of every query it forwards.
    struct RecordingIndex {
        inner: LocalStore,
        limits: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl VectorIndex for RecordingIndex {
        async fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<(), SearchError> {
            self.inner.ensure_collection(collection, dimensions).await
        }

        async fn upsert(&self, collection: &str, records: &[ChunkRecord]) -> Result<usize, SearchError> {
            self.inner.upsert(collection, records).await
        }

        async fn query(
            &self,
            collection: &str,
            vector: &[f32],
            filter: &RecordFilter,
            limit: usize,
        ) -> Result<Vec<ScoredRecord>, SearchError> {
            if let Ok(mut limits) = self.limits.lock() {
                limits.push(limit);
            }
            self.inner.query(collection, vector, filter, limit).await
        }

        async fn delete(&self, collection: &str, filter: &RecordFilter) -> Result<usize, SearchError> {
            self.inner.delete(collection, filter).await
        }

        async fn first(&self, collection: &str, filter: &RecordFilter) -> Result<Option<ChunkRecord>, SearchError> {
            self.inner.first(collection, filter).await
        }

        async fn count(&self, collection: &str, filter: &RecordFilter) -> Result<usize, SearchError> {
            self.inner.count(collection, filter).await
        }

        async fn scan(&self, collection: &str, filter: &RecordFilter) -> Result<Vec<ChunkRecord>, SearchError> {
            self.inner.scan(collection, filter).await
        }

        fn location(&self) -> String {
            "recording".to_string()
        }
    }

    async fn retriever_over(chunks: &[&str]) -> Result<(Retriever, Arc<RecordingIndex>), SearchError> {
        let mut settings = Settings::default();
        settings.retrieval.min_similarity = 0.0;
        let store = Arc::new(RecordingIndex {
            inner: LocalStore::in_memory(),
            limits: Mutex::new(Vec::new()),
        });
        let index = Arc::new(ChunkIndex::new(
            Arc::new(CharacterNgramEmbedder { dimensions: 64 }),
            store.clone(),
            &settings,
        ));
        let texts = chunks.iter().map(|text| text.to_string()).collect::<Vec<_>>();
        let metadata = ChunkMetadata::for_pdf("doc.pdf", &DocumentVersion::from("1-1".to_string()));
        index.add_chunks("doc.pdf", &texts, &metadata).await?;

        let retriever = Retriever::new(
            index,
            settings.terms.clone(),
            &settings.definitions,
            settings.retrieval.clone(),
        )?;
        Ok((retriever, store))
    }

    fn recorded(store: &RecordingIndex) -> Vec<usize> {
        store.limits.lock().map(|limits| limits.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn sparse_document_search_widens_through_the_plan() -> Result<(), SearchError> {
        let (retriever, store) = retriever_over(&["alpha text", "beta text"]).await?;
        let scope = SearchScope::Document("doc.pdf".to_string());
        let found = retriever.retrieve("alpha", &scope, 4).await?;
        assert_eq!(found.len(), 2);
        assert_eq!(recorded(&store), vec![12, 40, 120]);
        Ok(())
    }

    #[tokio::test]
    async fn global_search_stops_widening_with_enough_candidates() -> Result<(), SearchError> {
        let (retriever, store) =
            retriever_over(&["one text", "two text", "three text", "four text"]).await?;
        let found = retriever.retrieve("text", &SearchScope::Global, 1).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(recorded(&store), vec![6]);
        Ok(())
    }

    #[tokio::test]
    async fn definition_wins_for_detected_term() -> Result<(), SearchError> {
        let (retriever, _) = retriever_over(&[
            "Vehicle networks connect many electronic control units together.",
            "CAN - Controller Area Network is a vehicle bus standard.",
        ])
        .await?;
        let found = retriever
            .retrieve("what is CAN?", &SearchScope::Document("doc.pdf".to_string()), 4)
            .await?;
        assert_eq!(found[0].match_kind, MatchKind::Definition);
        assert!(found[0].text.starts_with("CAN - Controller Area Network"));
        Ok(())
    }

    #[tokio::test]
    async fn without_term_hits_similarity_order_is_kept() -> Result<(), SearchError> {
        let (retriever, _) = retriever_over(&["gateway firewall rules", "brake control unit"]).await?;
        let found = retriever
            .retrieve("what is TARA?", &SearchScope::Global, 2)
            .await?;
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|c| c.match_kind == MatchKind::Similarity));
        assert!(found[0].similarity_score >= found[1].similarity_score);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_document_returns_nothing() -> Result<(), SearchError> {
        let (retriever, store) = retriever_over(&["alpha text"]).await?;
        let scope = SearchScope::Document("missing.pdf".to_string());
        assert!(retriever.retrieve("alpha", &scope, 4).await?.is_empty());
        assert_eq!(recorded(&store), vec![12]);
        assert!(retriever.retrieve("alpha", &SearchScope::Global, 0).await?.is_empty());
        Ok(())
    }
}
