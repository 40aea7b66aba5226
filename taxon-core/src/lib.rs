pub mod closure;
pub mod data;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod scrape;
pub mod sources;
pub mod supplemental;
pub mod table;
pub mod verify;

pub use closure::{
    AncestorEdge, ClosureOutcome, ClosureSet, ExclusionPolicy, Truncation, TruncationKind,
    build_closure, immediate_parents,
};
pub use error::{CoreError, Result};
pub use model::RawNode;
pub use reconcile::{
    CoverageReport, JoinSpec, Presence, ReconciledTable, Reconciliation, check_coverage,
    reconcile,
};
pub use supplemental::SupplementalMapping;
pub use table::Table;
pub use verify::{Agreement, Identifier, Lineage, VerificationReport, VerifySchema};
