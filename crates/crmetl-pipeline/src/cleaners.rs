//! Per-table cleaning rules.
//!
//! Every cleaner takes its table by value and returns a new table plus the
//! diagnostics describing each dropped or altered row. Running a cleaner on its
//! own output changes nothing.

use std::collections::HashSet;

use crmetl_core::{Activity, Company, Contact, Entity, Opportunity};

use crate::diagnostics::{Cleaned, Diagnostic, DropReason};
use crate::fields::{clean_email, clean_phone, format_datetime, parse_optional_datetime, trim_title, ParsedTime};

pub trait Cleaner {
    type Record;

    fn clean(&self, rows: Vec<Self::Record>) -> Cleaned<Self::Record>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompanyCleaner;

#[derive(Debug, Clone, Copy, Default)]
pub struct ContactCleaner;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpportunityCleaner;

#[derive(Debug, Clone, Copy, Default)]
pub struct ActivityCleaner;

fn row_dropped<E: Entity>(row: &E, reason: DropReason) -> Diagnostic {
    Diagnostic::RowDropped {
        table: E::TABLE,
        id: row.id().map(str::to_string),
        reason,
    }
}

/// Keep rows for which `drop_reason` is `None`, recording a diagnostic for the rest.
fn retain_rows<E: Entity>(
    rows: Vec<E>,
    diagnostics: &mut Vec<Diagnostic>,
    mut drop_reason: impl FnMut(&E) -> Option<DropReason>,
) -> Vec<E> {
    rows.into_iter()
        .filter(|row| match drop_reason(row) {
            Some(reason) => {
                diagnostics.push(row_dropped(row, reason));
                false
            }
            None => true,
        })
        .collect()
}

fn non_negative(value: Option<i64>, missing: DropReason, negative: DropReason) -> Option<DropReason> {
    match value {
        None => Some(missing),
        Some(v) if v < 0 => Some(negative),
        Some(_) => None,
    }
}

impl Cleaner for CompanyCleaner {
    type Record = Company;

    fn clean(&self, rows: Vec<Company>) -> Cleaned<Company> {
        let mut diagnostics = Vec::new();
        let rows: Vec<Company> = rows
            .into_iter()
            .map(|mut company| {
                company.name = company.name.as_deref().map(trim_title);
                company.industry = company.industry.as_deref().map(trim_title);
                company
            })
            .collect();
        let rows = retain_rows(rows, &mut diagnostics, |company| {
            if company.id.is_none() {
                Some(DropReason::MissingId)
            } else if company.name.is_none() {
                Some(DropReason::MissingName)
            } else {
                None
            }
        });
        let rows = retain_rows(rows, &mut diagnostics, |company| {
            non_negative(
                company.annual_revenue,
                DropReason::MissingRevenue,
                DropReason::NegativeRevenue,
            )
        });
        Cleaned::new(rows, diagnostics)
    }
}

impl Cleaner for ContactCleaner {
    type Record = Contact;

    /// Normalise email, keep the first row per email, normalise phone, drop
    /// rows without id or email, then title-case `title`.
    fn clean(&self, rows: Vec<Contact>) -> Cleaned<Contact> {
        let mut diagnostics = Vec::new();

        let rows: Vec<Contact> = rows
            .into_iter()
            .map(|mut contact| {
                contact.email = contact.email.as_deref().map(clean_email);
                contact
            })
            .collect();

        let mut seen = HashSet::new();
        let rows = retain_rows(rows, &mut diagnostics, |contact| {
            let duplicate = contact
                .email
                .as_ref()
                .is_some_and(|email| !seen.insert(email.clone()));
            duplicate.then_some(DropReason::DuplicateEmail)
        });

        let rows: Vec<Contact> = rows
            .into_iter()
            .map(|mut contact| {
                if let Some(raw) = contact.phone.take() {
                    contact.phone = clean_phone(&raw);
                    if contact.phone.is_none() {
                        diagnostics.push(Diagnostic::PhoneDiscarded {
                            contact_id: contact.id.clone(),
                            raw,
                        });
                    }
                }
                contact
            })
            .collect();

        let rows = retain_rows(rows, &mut diagnostics, |contact| {
            if contact.id.is_none() {
                Some(DropReason::MissingId)
            } else if contact.email.is_none() {
                Some(DropReason::MissingEmail)
            } else {
                None
            }
        });

        let rows: Vec<Contact> = rows
            .into_iter()
            .map(|mut contact| {
                contact.title = contact.title.as_deref().map(trim_title);
                contact
            })
            .collect();

        Cleaned::new(rows, diagnostics)
    }
}

impl Cleaner for OpportunityCleaner {
    type Record = Opportunity;

    fn clean(&self, rows: Vec<Opportunity>) -> Cleaned<Opportunity> {
        let mut diagnostics = Vec::new();
        let rows = retain_rows(rows, &mut diagnostics, |opp| {
            non_negative(opp.amount, DropReason::MissingAmount, DropReason::NegativeAmount)
        });

        let mut kept = Vec::with_capacity(rows.len());
        for mut opp in rows {
            let created = parse_optional_datetime(opp.created_date.as_deref());
            let close = parse_optional_datetime(opp.close_date.as_deref());
            let verdict = match (created, close) {
                (ParsedTime::Invalid, _) => Err(DropReason::InvalidCreatedDate),
                (_, ParsedTime::Invalid) => Err(DropReason::InvalidCloseDate),
                (ParsedTime::Valid(created), ParsedTime::Valid(close)) if close <= created => {
                    Err(DropReason::CloseNotAfterCreated)
                }
                (ParsedTime::Valid(created), ParsedTime::Valid(close)) => Ok((created, close)),
            };
            match verdict {
                Ok((created, close)) => {
                    opp.created_date = Some(format_datetime(created));
                    opp.close_date = Some(format_datetime(close));
                    kept.push(opp);
                }
                Err(reason) => diagnostics.push(row_dropped(&opp, reason)),
            }
        }
        Cleaned::new(kept, diagnostics)
    }
}

impl Cleaner for ActivityCleaner {
    type Record = Activity;

    fn clean(&self, rows: Vec<Activity>) -> Cleaned<Activity> {
        let mut diagnostics = Vec::new();
        let mut kept = Vec::with_capacity(rows.len());
        for mut activity in rows {
            match parse_optional_datetime(activity.timestamp.as_deref()) {
                ParsedTime::Valid(ts) => {
                    activity.timestamp = Some(format_datetime(ts));
                    kept.push(activity);
                }
                ParsedTime::Invalid => {
                    diagnostics.push(row_dropped(&activity, DropReason::InvalidTimestamp));
                }
            }
        }
        Cleaned::new(kept, diagnostics)
    }
}
