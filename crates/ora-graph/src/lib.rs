//! # ora-graph
//!
//! Data-flow aggregation graph.
//!
//! A data model is a tree of nodes whose leaves hold prices fetched from
//! origins and whose inner nodes derive new prices (median, cross rates,
//! inversions). Evaluation is pull-based: calling [`Node::data_point`] on a
//! root evaluates its children recursively. Failures never abort
//! evaluation; they are carried on the returned [`ora_types::Point`].
//!
//! ## Modules
//!
//! - [`node`]: the node sum type and tree helpers
//! - [`origin_node`]: leaves holding origin prices with freshness policy
//! - [`median`]: median of same-pair children
//! - [`indirect`]: cross rates over chained pairs
//! - [`alias`]: pair renaming and inversion
//! - [`reference`]: links to other models by name
//! - [`origin`]: price sources
//! - [`updater`]: refreshes origin leaves
//! - [`provider`]: named models backed by the graph
//! - [`builder`]: assembles graphs from configuration

pub mod alias;
pub mod builder;
pub mod indirect;
pub mod median;
pub mod node;
pub mod origin;
pub mod origin_node;
pub mod provider;
pub mod reference;
pub mod updater;

pub use node::Node;
pub use origin::Origin;
pub use provider::{GraphProvider, Provider};
pub use updater::Updater;

/// Error types for graph construction and queries.
///
/// Evaluation errors are not reported here but on the returned points as
/// [`ora_types::PointError`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A node accepts fewer children than were added.
    #[error("{kind} node accepts at most {max} child nodes")]
    TooManyChildren { kind: &'static str, max: usize },

    /// Origin nodes are leaves.
    #[error("origin nodes cannot have children")]
    LeafNode,

    /// A point for another pair was assigned to an origin node.
    #[error("point for {got} assigned to origin node for {expected}")]
    PairMismatch { expected: String, got: String },

    /// A point older than the held one was assigned to an origin node.
    #[error("point is older than the current one")]
    OlderPoint,

    /// No model with this name exists.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// No origin with this name exists.
    #[error("unknown origin: {0}")]
    UnknownOrigin(String),

    /// The graph configuration is inconsistent.
    #[error("invalid graph configuration: {0}")]
    InvalidConfig(String),

    /// An origin failed as a whole.
    #[error("origin {origin} failed: {message}")]
    Origin { origin: String, message: String },
}

/// Convenience result type for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
