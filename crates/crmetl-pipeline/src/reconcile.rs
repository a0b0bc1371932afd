//! Contact identity reconciliation.
//!
//! Deduplicating contacts by email can collapse several contact ids into one
//! surviving id. Reconciliation runs in two phases: [`CanonicalIds::build`]
//! derives the old-id -> surviving-id mapping from the contacts before and after
//! cleaning, then [`remap_contact_ids`] rewrites `contact_id` in a dependent
//! table. Unresolvable references are kept as they are.

use std::collections::{HashMap, HashSet};

use crmetl_core::{Activity, Contact, Entity, Opportunity};

use crate::cleaners::{Cleaner, ContactCleaner};
use crate::diagnostics::{Cleaned, Diagnostic};
use crate::fields::clean_email;

/// A record holding a weak reference to a contact.
pub trait ContactLinked: Entity {
    fn contact_id(&self) -> Option<&str>;

    fn set_contact_id(&mut self, contact_id: String);
}

impl ContactLinked for Opportunity {
    fn contact_id(&self) -> Option<&str> {
        self.contact_id.as_deref()
    }

    fn set_contact_id(&mut self, contact_id: String) {
        self.contact_id = Some(contact_id);
    }
}

impl ContactLinked for Activity {
    fn contact_id(&self) -> Option<&str> {
        self.contact_id.as_deref()
    }

    fn set_contact_id(&mut self, contact_id: String) {
        self.contact_id = Some(contact_id);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CanonicalIds {
    canonical: HashMap<String, String>,
}

impl CanonicalIds {
    /// `before` is the contacts table as read; `after` is the cleaned table.
    ///
    /// A surviving id maps to itself. Any other id maps to the surviving contact
    /// that owns the cleaned email of the first `before` row carrying that id.
    pub fn build(before: &[Contact], after: &[Contact]) -> Self {
        let mut owner_by_email: HashMap<&str, &str> = HashMap::new();
        let mut canonical: HashMap<String, String> = HashMap::new();
        for contact in after {
            let Some(id) = contact.id.as_deref() else {
                continue;
            };
            canonical.insert(id.to_string(), id.to_string());
            if let Some(email) = contact.email.as_deref() {
                owner_by_email.entry(email).or_insert(id);
            }
        }

        let mut seen = HashSet::new();
        for contact in before {
            let Some(id) = contact.id.as_deref() else {
                continue;
            };
            if !seen.insert(id) || canonical.contains_key(id) {
                continue;
            }
            let Some(email) = contact.email.as_deref().map(clean_email) else {
                continue;
            };
            if let Some(owner) = owner_by_email.get(email.as_str()) {
                canonical.insert(id.to_string(), owner.to_string());
            }
        }

        Self { canonical }
    }

    pub fn resolve(&self, contact_id: &str) -> Option<&str> {
        self.canonical.get(contact_id).map(String::as_str)
    }

    /// Number of ids that resolve to a different surviving id.
    pub fn merged(&self) -> usize {
        self.canonical.iter().filter(|(from, to)| from != to).count()
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

/// Rewrite `contact_id` through `ids`, preserving row count and order. Only the
/// `contact_id` column is ever changed.
pub fn remap_contact_ids<T: ContactLinked>(rows: Vec<T>, ids: &CanonicalIds) -> Cleaned<T> {
    let mut diagnostics = Vec::new();
    let rows = rows
        .into_iter()
        .map(|mut row| {
            let Some(current) = row.contact_id().map(str::to_string) else {
                return row;
            };
            match ids.resolve(&current) {
                Some(canonical) if canonical != current => {
                    diagnostics.push(Diagnostic::ContactRemapped {
                        table: T::TABLE,
                        id: row.id().map(str::to_string),
                        from: current,
                        to: canonical.to_string(),
                    });
                    row.set_contact_id(canonical.to_string());
                }
                Some(_) => {}
                None => diagnostics.push(Diagnostic::ContactUnresolved {
                    table: T::TABLE,
                    id: row.id().map(str::to_string),
                    contact_id: current,
                }),
            }
            row
        })
        .collect();
    Cleaned::new(rows, diagnostics)
}

/// Output of the contacts step: the cleaned contacts and both dependent tables
/// with their contact references migrated.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactsOutcome {
    pub contacts: Cleaned<Contact>,
    pub opportunities: Cleaned<Opportunity>,
    pub activities: Cleaned<Activity>,
    pub canonical_ids: CanonicalIds,
}

pub fn clean_contacts_and_reconcile(
    contacts: Vec<Contact>,
    opportunities: Vec<Opportunity>,
    activities: Vec<Activity>,
) -> ContactsOutcome {
    let cleaned = ContactCleaner.clean(contacts.clone());
    let canonical_ids = CanonicalIds::build(&contacts, &cleaned.rows);
    ContactsOutcome {
        opportunities: remap_contact_ids(opportunities, &canonical_ids),
        activities: remap_contact_ids(activities, &canonical_ids),
        contacts: cleaned,
        canonical_ids,
    }
}
