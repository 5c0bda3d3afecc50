//! Domain types shared by every pipeline stage.

pub mod change_set;
pub mod contribution;
pub mod metadata;
pub mod outcome;

pub use change_set::ChangeSet;
pub use contribution::{ContributionDescriptor, ContributionId, ExpectedPath, PathKind};
pub use metadata::{
    ContributionMetadata, DType, ExampleDecl, MetadataError, OutputContract, SymbolPath,
};
pub use outcome::{FailReason, OutcomeStatus, Stage, ValidationOutcome};
