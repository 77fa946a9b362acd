//! Keystorm Graph — the project graph: typed nodes and edges over files,
//! packages, and imports, built in parallel by language parsers and queried
//! for structural relationships.

pub mod builder;
pub mod graph;
pub mod model;
pub mod parser;
pub mod query;

pub use builder::{BuildError, BuildOptions, BuildStats, GraphBuilder};
pub use graph::{GraphError, ProjectGraph};
pub use model::{
    CallSite, Edge, EdgeKind, EdgeMetadata, Node, NodeId, NodeKind, NodeMetadata,
    DEFAULT_EDGE_WEIGHT,
};
pub use parser::{
    impl_test_path, test_impl_path, GenericParser, GoParser, LanguageParser, ParseError,
    ParseResult, ParserRegistry,
};
pub use query::{
    all_dependencies, all_dependents, compute_impact, files_in_same_package, find_cycles,
    find_impl_for, find_tests_for, import_chain, related_files, Relation, RelatedFile,
};
