//! The per-dataset handle returned by registry operations.

use strata_types::Address;

use crate::head::{Head, Ref};

/// A named dataset and its last-observed head.
///
/// A `Dataset` is a snapshot: operations that mutate the registry take the
/// handle's observed head as their optimistic-concurrency baseline and
/// return a refreshed handle on success. A stale handle surfaces as
/// `MergeNeeded` or `OptimisticLockFailed`, never as silent overwrite.
#[derive(Clone, Debug)]
pub struct Dataset {
    id: String,
    head_addr: Address,
    head: Option<Head>,
}

impl Dataset {
    /// A handle with no head (the dataset does not exist yet).
    pub(crate) fn absent(id: String) -> Self {
        Self {
            id,
            head_addr: Address::EMPTY,
            head: None,
        }
    }

    /// A handle with an observed head.
    pub(crate) fn with_head(id: String, head_addr: Address, head: Head) -> Self {
        Self {
            id,
            head_addr,
            head: Some(head),
        }
    }

    /// The dataset's identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The observed head object, if the dataset exists.
    pub fn head(&self) -> Option<&Head> {
        self.head.as_ref()
    }

    /// Returns `true` if the dataset existed when this handle was taken.
    pub fn has_head(&self) -> bool {
        self.head.is_some()
    }

    /// The observed head's address; empty if the dataset does not exist.
    pub fn head_addr(&self) -> Address {
        self.head_addr
    }

    /// A ref to the observed head, if the dataset exists.
    pub fn head_ref(&self) -> Option<Ref> {
        self.head
            .as_ref()
            .map(|head| Ref::new(self.head_addr, head.height()))
    }

    /// The variant name of the observed head, if the dataset exists.
    pub fn type_name(&self) -> Option<&'static str> {
        self.head.as_ref().map(Head::type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::head::CommitMeta;

    #[test]
    fn absent_dataset_has_no_head() {
        let ds = Dataset::absent("refs/heads/main".to_string());
        assert_eq!(ds.id(), "refs/heads/main");
        assert!(!ds.has_head());
        assert!(ds.head().is_none());
        assert!(ds.head_ref().is_none());
        assert!(ds.head_addr().is_empty());
        assert!(ds.type_name().is_none());
    }

    #[test]
    fn head_ref_carries_commit_height() {
        let head = Head::Commit {
            value: Ref::to_value(Address::digest(b"v")),
            parents: vec![Ref::new(Address::digest(b"p"), 4)],
            parents_closure: None,
            meta: CommitMeta::default(),
        };
        let addr = Address::digest(b"head chunk");
        let ds = Dataset::with_head("refs/heads/main".to_string(), addr, head);

        assert!(ds.has_head());
        assert_eq!(ds.type_name(), Some("commit"));
        let r = ds.head_ref().unwrap();
        assert_eq!(r.addr, addr);
        assert_eq!(r.height, 5);
    }
}
