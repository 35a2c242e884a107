//! Shared leaf types for the replty crates.
//!
//! - [`Visibility`]: method visibility, used by both the live object model
//!   and the signature database.
//! - [`sample`]: the bounded, deterministic subsampler that caps how many
//!   live objects are inspected when deriving a type from a collection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of live objects inspected per collection level when
/// deriving types from an execution-context snapshot.
pub const OBJECT_TO_TYPE_SAMPLE_SIZE: usize = 50;

/// Method visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn is_public(self) -> bool {
        self == Visibility::Public
    }

    pub fn is_private(self) -> bool {
        self == Visibility::Private
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Protected => write!(f, "protected"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// Pick at most `limit` items from `items`, evenly spaced.
///
/// Slices no longer than `limit` are returned whole. Longer slices are
/// strided so the sample spans the entire collection; the same input always
/// yields the same sample.
pub fn sample<T: Clone>(items: &[T], limit: usize) -> Vec<T> {
    if items.len() <= limit {
        return items.to_vec();
    }
    if limit == 0 {
        return Vec::new();
    }
    (0..limit)
        .map(|i| items[i * items.len() / limit].clone())
        .collect()
}
