//! Decision trees: nodes, the growing arena, histograms, split search.

pub mod dtree;
pub mod histogram;
pub mod node;
pub mod split;

pub use dtree::{CompiledTree, DTree, FrozenNode};
pub use histogram::{Bin, Histogram, NodeStats};
pub use node::{CategorySet, DNode, Decision, Split, SplitKind};
pub use split::{find_best_split, SplitCandidate};
