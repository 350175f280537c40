//! PodiumForge: athlete archetype discovery for a single Olympic sport
//!
//! This library standardizes athlete body measurements, projects them onto two
//! principal components and groups them with K-Means. Clusters are named as
//! archetypes and compared by medal rate and sex composition.

pub mod aggregate;
pub mod archetype;
pub mod cli;
pub mod data;
pub mod error;
pub mod fetch;
pub mod model;
pub mod pca;
pub mod pipeline;
pub mod report;
pub mod standardize;
pub mod viz;

// Re-export public items for easier access
pub use aggregate::{aggregate, AggregateReport, ArchetypeSummary};
pub use archetype::{label_archetypes, Archetype, ArchetypeMap, ClusterAssignments};
pub use cli::Args;
pub use data::{load_athletes, AthleteRecord, AthleteTable, Feature, Medal, RecordId, Sex};
pub use error::{AnalysisError, Degeneracy};
pub use fetch::ensure_dataset;
pub use model::{fit_kmeans, KMeansModel, KMeansParams};
pub use pca::{fit_pca, reduce, PcaModel};
pub use pipeline::{run_analysis, AnalysisConfig, AnalysisRun};
pub use report::{Narrative, RunReport};
pub use standardize::{standardize, StandardScaler, ZeroVariancePolicy};
pub use viz::generate_visualization_report;

/// Common result type used throughout the library
pub type Result<T> = std::result::Result<T, AnalysisError>;
