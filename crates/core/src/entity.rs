//! Identity shared by every stored row of the stock domain.

/// Something stored and referenced by id.
///
/// Rows reference each other through these ids only, never by embedding.
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;
}
