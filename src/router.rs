//! Semantic topic gate.
//!
//! Every route owns a handful of example utterances. The examples are
//! embedded once when the router is built; after that, classifying a query
//! is a pure function of its vector and the frozen example set:
//!
//! 1. score every example by cosine similarity to the query;
//! 2. keep the `top_k` most similar examples;
//! 3. sum the kept similarities per route (a similarity-weighted
//!    nearest-neighbour vote);
//! 4. the route with the highest sum wins; a tie between routes of different
//!    labels is off-topic;
//! 5. if the winner's best single similarity is below `threshold`, the query
//!    is off-topic with no route.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::embedder::Embedder;
use crate::vector_store::cosine_similarity;

/// Whether a route may be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteLabel {
    /// Proceed to retrieval and answer generation.
    InDomain,
    /// Refuse without calling the language model.
    OffTopic,
}

/// Named group of labelled example utterances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Route identifier.
    pub name: String,
    /// Label applied to queries routed here.
    pub label: RouteLabel,
    /// Example utterances.
    pub utterances: Vec<String>,
}

impl Route {
    /// Builds a route from static strings.
    pub fn new(name: &str, label: RouteLabel, utterances: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            label,
            utterances: utterances.iter().map(|u| u.to_string()).collect(),
        }
    }
}

/// Classification knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterConfig {
    /// Minimum best-example similarity for the winning route to count.
    pub threshold: f32,
    /// Number of nearest examples that vote.
    pub top_k: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            top_k: 5,
        }
    }
}

/// Result of classifying one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    /// Winning route, or `None` when nothing was close enough.
    pub route: Option<String>,
    /// Final label.
    pub label: RouteLabel,
    /// Best similarity between the query and an example of the winning route.
    pub score: f32,
}

impl RouteDecision {
    /// True when the query may go on to retrieval.
    pub fn is_in_domain(&self) -> bool {
        self.label == RouteLabel::InDomain
    }

    fn off_topic(score: f32) -> Self {
        Self {
            route: None,
            label: RouteLabel::OffTopic,
            score,
        }
    }
}

#[derive(Debug)]
struct Example {
    route: usize,
    vector: Vec<f32>,
}

/// Topic gate over a frozen set of embedded examples.
#[derive(Debug)]
pub struct SemanticRouter {
    routes: Vec<(String, RouteLabel)>,
    examples: Vec<Example>,
    config: RouterConfig,
}

struct Tally {
    sum: f32,
    best: f32,
}

impl Default for Tally {
    fn default() -> Self {
        Self {
            sum: 0.0,
            best: f32::NEG_INFINITY,
        }
    }
}

impl SemanticRouter {
    /// Embeds every utterance with `embedder` and freezes the result.
    pub fn build(routes: Vec<Route>, embedder: &dyn Embedder, config: RouterConfig) -> Result<Self> {
        let utterances: Vec<&str> = routes
            .iter()
            .flat_map(|route| route.utterances.iter().map(String::as_str))
            .collect();
        let vectors = embedder
            .embed_all(&utterances)
            .context("failed to embed router examples")?;
        Self::from_embeddings(routes, vectors, config)
    }

    /// Builds a router from pre-computed example vectors, in route order.
    pub fn from_embeddings(
        routes: Vec<Route>,
        vectors: Vec<Vec<f32>>,
        config: RouterConfig,
    ) -> Result<Self> {
        let expected: usize = routes.iter().map(|r| r.utterances.len()).sum();
        anyhow::ensure!(expected > 0, "router needs at least one example utterance");
        anyhow::ensure!(
            vectors.len() == expected,
            "got {} example vectors for {} utterances",
            vectors.len(),
            expected
        );
        anyhow::ensure!(
            config.threshold.is_finite() && (-1.0..=1.0).contains(&config.threshold),
            "router threshold {} must be within [-1, 1]",
            config.threshold
        );
        let dimension = vectors.first().map(Vec::len).unwrap_or_default();
        anyhow::ensure!(
            dimension > 0 && vectors.iter().all(|v| v.len() == dimension),
            "router example vectors must share one non-zero dimension"
        );
        let mut vectors = vectors.into_iter();
        let mut examples = Vec::with_capacity(expected);
        for (idx, route) in routes.iter().enumerate() {
            for _ in &route.utterances {
                if let Some(vector) = vectors.next() {
                    examples.push(Example { route: idx, vector });
                }
            }
        }
        Ok(Self {
            routes: routes.into_iter().map(|r| (r.name, r.label)).collect(),
            examples,
            config: RouterConfig {
                top_k: config.top_k.max(1),
                ..config
            },
        })
    }

    /// Number of frozen examples.
    pub fn example_count(&self) -> usize {
        self.examples.len()
    }

    /// Vector length of the frozen examples.
    pub fn dimension(&self) -> usize {
        self.examples.first().map(|e| e.vector.len()).unwrap_or_default()
    }

    /// Embeds `query` and classifies it.
    pub fn route(&self, query: &str, embedder: &dyn Embedder) -> Result<RouteDecision> {
        if query.trim().is_empty() {
            return Ok(RouteDecision::off_topic(0.0));
        }
        let vector = embedder.embed_one(query)?;
        self.decide(&vector)
    }

    /// Classifies an already embedded query, rejecting vectors produced by a
    /// different model than the examples.
    pub fn decide(&self, query: &[f32]) -> Result<RouteDecision> {
        anyhow::ensure!(
            query.len() == self.dimension(),
            "query vector has {} dimensions; router examples have {}",
            query.len(),
            self.dimension()
        );
        Ok(self.classify(query))
    }

    /// Classifies a query vector against the frozen examples.
    pub fn classify(&self, query: &[f32]) -> RouteDecision {
        if query.iter().any(|v| !v.is_finite()) || query.iter().all(|v| *v == 0.0) {
            return RouteDecision::off_topic(0.0);
        }
        let mut scored: Vec<(usize, f32)> = self
            .examples
            .iter()
            .map(|example| (example.route, cosine_similarity(query, &example.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.config.top_k);

        let mut tallies: BTreeMap<usize, Tally> = BTreeMap::new();
        for (route, similarity) in scored {
            let tally = tallies.entry(route).or_default();
            tally.sum += similarity;
            tally.best = tally.best.max(similarity);
        }

        let Some(best_sum) = tallies
            .values()
            .map(|t| t.sum)
            .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        else {
            return RouteDecision::off_topic(0.0);
        };
        let leaders: Vec<(usize, &Tally)> = tallies
            .iter()
            .filter(|(_, t)| (t.sum - best_sum).abs() <= f32::EPSILON)
            .map(|(route, t)| (*route, t))
            .collect();
        let Some(&(winner, tally)) = leaders.first() else {
            return RouteDecision::off_topic(0.0);
        };
        let (name, label) = &self.routes[winner];
        if leaders.iter().any(|(route, _)| self.routes[*route].1 != *label) {
            return RouteDecision::off_topic(tally.best);
        }
        if tally.best < self.config.threshold {
            return RouteDecision::off_topic(tally.best);
        }
        RouteDecision {
            route: Some(name.clone()),
            label: *label,
            score: tally.best,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::hashing::HashingEmbedder;
    use crate::topics::{default_routes, OFF_TOPIC_ROUTE, PAUL_ALLEN_ROUTE};

    fn default_router() -> (SemanticRouter, HashingEmbedder) {
        let embedder = HashingEmbedder::new(2048);
        let router = SemanticRouter::build(default_routes(), &embedder, RouterConfig::default())
            .expect("router");
        (router, embedder)
    }

    fn axis_routes() -> Vec<Route> {
        vec![
            Route::new("allen", RouteLabel::InDomain, &["a1", "a2"]),
            Route::new("small_talk", RouteLabel::InDomain, &["s1"]),
            Route::new("other", RouteLabel::OffTopic, &["o1"]),
        ]
    }

    fn axis_router(threshold: f32) -> SemanticRouter {
        SemanticRouter::from_embeddings(
            axis_routes(),
            vec![
                vec![1.0, 0.0, 0.0],
                vec![0.9, 0.1, 0.0],
                vec![0.0, 1.0, 0.0],
                vec![0.0, 0.0, 1.0],
            ],
            RouterConfig {
                threshold,
                top_k: 5,
            },
        )
        .expect("router")
    }

    #[test]
    fn verbatim_in_domain_examples_are_in_domain() {
        let (router, embedder) = default_router();
        for utterance in [
            "who is paul allen?",
            "what is vulcan inc?",
            "tell me about the Stratolaunch project",
            "thanks for your help",
        ] {
            let decision = router.route(utterance, &embedder).expect("route");
            assert!(decision.is_in_domain(), "{utterance}: {decision:?}");
        }
        let decision = router.route("who is paul allen?", &embedder).expect("route");
        assert_eq!(decision.route.as_deref(), Some(PAUL_ALLEN_ROUTE));
    }

    #[test]
    fn unrelated_question_is_off_topic() {
        let (router, embedder) = default_router();
        let decision = router
            .route("What is the boiling point of nitrogen?", &embedder)
            .expect("route");
        assert!(!decision.is_in_domain(), "{decision:?}");
    }

    #[test]
    fn off_topic_examples_route_to_off_topic() {
        let (router, embedder) = default_router();
        let decision = router
            .route("give me a recipe for chocolate chip cookies", &embedder)
            .expect("route");
        assert_eq!(decision.route.as_deref(), Some(OFF_TOPIC_ROUTE));
        assert_eq!(decision.label, RouteLabel::OffTopic);
    }

    #[test]
    fn empty_and_degenerate_queries_fail_closed() {
        let (router, embedder) = default_router();
        assert!(!router.route("   ", &embedder).unwrap().is_in_domain());
        let r = axis_router(0.3);
        assert!(!r.classify(&[0.0, 0.0, 0.0]).is_in_domain());
        assert!(!r.classify(&[f32::NAN, 1.0, 0.0]).is_in_domain());
    }

    #[test]
    fn below_threshold_is_off_topic() {
        let r = axis_router(0.9);
        let weak = r.classify(&[0.6, 0.0, 0.8]);
        assert_eq!(weak.route, None);
        assert_eq!(weak.label, RouteLabel::OffTopic);
        let strong = r.classify(&[1.0, 0.05, 0.0]);
        assert_eq!(strong.route.as_deref(), Some("allen"));
    }

    #[test]
    fn cross_label_tie_fails_closed() {
        let r = axis_router(0.1);
        let decision = r.classify(&[0.0, 1.0, 1.0]);
        assert_eq!(decision.label, RouteLabel::OffTopic);
        assert_eq!(decision.route, None);
    }

    #[test]
    fn classification_is_deterministic() {
        let r = axis_router(0.3);
        let query = [0.8, 0.3, 0.1];
        assert_eq!(r.classify(&query), r.classify(&query));
    }

    #[test]
    fn vector_count_must_match_utterances() {
        let err = SemanticRouter::from_embeddings(
            axis_routes(),
            vec![vec![1.0]],
            RouterConfig::default(),
        )
        .expect_err("mismatch");
        assert!(err.to_string().contains("4 utterances"));
    }

    #[test]
    fn decide_rejects_foreign_dimension() {
        let r = axis_router(0.3);
        assert_eq!(r.dimension(), 3);
        assert!(r.decide(&[1.0, 0.0]).is_err());
        assert!(r.decide(&[1.0, 0.0, 0.0]).unwrap().is_in_domain());
    }
}
