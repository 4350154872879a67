pub mod cluster;
pub mod error;
pub mod eval;
pub mod ground_truth;
pub mod metrics;
pub mod model;
pub mod output;
pub mod ranking;
pub mod similarity;
pub mod storage;

pub use cluster::{
    num_clusters, Clusterer, Clustering, KMeans, KMeansConfig, DEFAULT_CLUSTER_RATIO, DEFAULT_SEED,
};
pub use error::{ArclusError, Result};
pub use eval::{
    evaluate_ranking_method, ClaimOutcome, EvalOptions, EvalSummary, KSummary, ZeroIdcgPolicy,
    DEFAULT_KS,
};
pub use ground_truth::{ClaimGroundTruth, GroundTruth};
pub use metrics::{accuracy, dcg, ndcg_score};
pub use model::{Assignment, ClaimId, PremiseId, Ranking, Representation, RepresentativeMode};
pub use output::{
    short_digest, write_results_tsv, ConfigValue, EvaluationRun, RunConfig, RunStatus,
    DEFAULT_OUTPUT_ROOT,
};
pub use ranking::{
    method_by_name, method_names, normalize_method_name, LearnedSimilarityClusterKnn,
    LearnedSimilarityKnn, MethodConfig, PairwiseScorer, PrecomputedScores, RankingMethod,
    ZeroShotClusterKnn, ZeroShotKnn,
};
pub use similarity::{
    similarity_by_name, CosineSimilarity, CslsSimilarity, LpSimilarity, Similarity,
    SimilarityConfig, DEFAULT_CSLS_K, DEFAULT_LP_P,
};
pub use storage::{ClaimStore, PremiseStore, RepresentationKey, RepresentationStore};
