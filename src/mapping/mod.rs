//! The SKU mapping heuristic: normalization, edit-distance similarity, the
//! synchronized mapping cache, the resolver pipeline and catalog writes.

pub mod cache;
pub mod catalog;
pub mod normalize;
pub mod resolver;
pub mod similarity;
