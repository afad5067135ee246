use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::quote::{LineItem, LineItemId, LineItemInput, NewLineItem};

/// Row-level changes needed to make the persisted items match an incoming list.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    pub updates: Vec<LineItem>,
    pub inserts: Vec<NewLineItem>,
    pub deletes: Vec<LineItemId>,
}

impl ReconciliationPlan {
    pub fn is_noop(&self) -> bool {
        self.updates.is_empty() && self.inserts.is_empty() && self.deletes.is_empty()
    }
}

/// Matches incoming entries to persisted rows by id.
///
/// An id that is unknown, or already claimed by an earlier entry in the same list, becomes an
/// insert and the supplied id is discarded. Matched rows are only updated when description or
/// price actually changed. Persisted rows nobody claimed are deleted.
pub fn reconcile(persisted: &[LineItem], incoming: &[LineItemInput]) -> ReconciliationPlan {
    let by_id: HashMap<LineItemId, &LineItem> =
        persisted.iter().map(|item| (item.id, item)).collect();
    let mut claimed: HashSet<LineItemId> = HashSet::with_capacity(incoming.len());
    let mut plan = ReconciliationPlan::default();

    for entry in incoming {
        let matched = entry
            .id
            .and_then(|id| by_id.get(&id).copied())
            .filter(|existing| claimed.insert(existing.id));

        match matched {
            Some(existing) => {
                if existing.description != entry.description || existing.price != entry.price {
                    plan.updates.push(LineItem {
                        id: existing.id,
                        description: entry.description.clone(),
                        price: entry.price,
                    });
                }
            }
            None => plan
                .inserts
                .push(NewLineItem { description: entry.description.clone(), price: entry.price }),
        }
    }

    plan.deletes =
        persisted.iter().map(|item| item.id).filter(|id| !claimed.contains(id)).collect();
    plan
}
