//! In-memory allow-list.

use std::collections::BTreeSet;

use crate::collaborators::AllowListStore;
use crate::types::Address;

/// Ordered set of approved beneficiaries.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAllowList {
    members: BTreeSet<Address>,
}

impl InMemoryAllowList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.members.iter()
    }
}

impl FromIterator<Address> for InMemoryAllowList {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        InMemoryAllowList {
            members: iter.into_iter().collect(),
        }
    }
}

impl AllowListStore for InMemoryAllowList {
    fn is_whitelisted(&self, who: &Address) -> bool {
        self.members.contains(who)
    }

    fn add(&mut self, who: Address) -> bool {
        self.members.insert(who)
    }

    fn remove(&mut self, who: &Address) -> bool {
        self.members.remove(who)
    }
}
