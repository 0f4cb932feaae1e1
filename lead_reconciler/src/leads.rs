//! Lead reads and the per-lead claim.
//!
//! SQLite's write lock covers the whole database, so it is never held across a
//! network call. Instead an attempt claims its lead in a short `BEGIN
//! IMMEDIATE` transaction that re-reads `processed` and compares the current
//! claim before writing its own. Uploads then run with no lock held, and
//! [`LeadClaim::finish`] writes the results, the `processed` flag and the
//! release in one more short transaction. A claim that is never finished or
//! released lapses at its expiry and can be taken over.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared_utils::tz::{parse_rfc3339_utc, to_rfc3339_millis};
use tracing::{debug, warn};

use crate::{ledger::RepoResult, models::Lead, schema::leads};

static CLAIM_SEQ: AtomicU64 = AtomicU64::new(0);

/// Load a lead without taking any lock.
pub fn find_lead(conn: &mut SqliteConnection, lead_id: i32) -> RepoResult<Option<Lead>> {
    let lead = leads::table
        .find(lead_id)
        .select(Lead::as_select())
        .first(conn)
        .optional()?;
    Ok(lead)
}

/// Load a lead by its external id.
pub fn find_lead_by_external_id(
    conn: &mut SqliteConnection,
    external_id: &str,
) -> RepoResult<Option<Lead>> {
    let lead = leads::table
        .filter(leads::external_id.eq(external_id))
        .select(Lead::as_select())
        .first(conn)
        .optional()?;
    Ok(lead)
}

/// Outcome of [`claim_lead`].
#[derive(Debug)]
pub enum ClaimAttempt {
    Claimed(LeadClaim),
    /// The lead was finished by another attempt.
    Processed,
    /// Another attempt holds a live claim.
    Busy {
        owner: String,
        until: DateTime<Utc>,
    },
}

/// Exclusive right to report one lead's conversions.
#[derive(Debug)]
pub struct LeadClaim {
    lead_id: i32,
    token: String,
}

fn claim_token(now: DateTime<Utc>) -> String {
    let seq = CLAIM_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{seq}", std::process::id(), now.timestamp_millis())
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Claim `lead_id` until `now + ttl`.
///
/// Compares `processed` and the current claim inside one write transaction,
/// so at most one attempt holds a live claim on a lead.
pub fn claim_lead(
    conn: &mut SqliteConnection,
    lead_id: i32,
    ttl: Duration,
    now: DateTime<Utc>,
) -> RepoResult<ClaimAttempt> {
    conn.immediate_transaction(|conn| {
        let (processed, owner, expires_at) = leads::table
            .find(lead_id)
            .select((leads::processed, leads::claim_owner, leads::claim_expires_at))
            .first::<(bool, Option<String>, Option<String>)>(conn)
            .with_context(|| format!("claiming lead {lead_id}"))?;
        if processed {
            return Ok(ClaimAttempt::Processed);
        }

        if let (Some(owner), Some(expires_at)) = (owner, expires_at) {
            let until = parse_rfc3339_utc(&expires_at)
                .with_context(|| format!("claim expiry of lead {lead_id}"))?;
            if until > now {
                return Ok(ClaimAttempt::Busy { owner, until });
            }
            debug!(lead_id, stale_owner = %owner, "taking over lapsed claim");
        }

        let token = claim_token(now);
        diesel::update(leads::table.find(lead_id))
            .set((
                leads::claim_owner.eq(Some(token.as_str())),
                leads::claim_expires_at.eq(Some(to_rfc3339_millis(expiry(now, ttl)))),
            ))
            .execute(conn)?;
        Ok(ClaimAttempt::Claimed(LeadClaim { lead_id, token }))
    })
}

impl LeadClaim {
    pub fn lead_id(&self) -> i32 {
        self.lead_id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Run `write`, optionally set `processed`, and release the claim, all in
    /// one transaction.
    ///
    /// When the claim lapsed and another attempt took it over, the writes and
    /// the `processed` flag still land but the other attempt's claim is kept.
    pub fn finish<F>(self, conn: &mut SqliteConnection, mark_processed: bool, write: F) -> RepoResult<()>
    where
        F: FnOnce(&mut SqliteConnection) -> RepoResult<()>,
    {
        conn.immediate_transaction(|conn| {
            write(conn)?;
            if mark_processed {
                diesel::update(leads::table.find(self.lead_id))
                    .set(leads::processed.eq(true))
                    .execute(conn)?;
            }
            if release(conn, self.lead_id, &self.token)? == 0 {
                warn!(lead_id = self.lead_id, token = %self.token, "claim lapsed before it was finished");
            }
            Ok(())
        })
    }

    /// Give the lead back without writing anything.
    pub fn release(self, conn: &mut SqliteConnection) -> RepoResult<()> {
        release(conn, self.lead_id, &self.token)?;
        Ok(())
    }
}

fn release(conn: &mut SqliteConnection, lead_id: i32, token: &str) -> RepoResult<usize> {
    let n = diesel::update(
        leads::table
            .find(lead_id)
            .filter(leads::claim_owner.eq(token)),
    )
    .set((
        leads::claim_owner.eq(None::<String>),
        leads::claim_expires_at.eq(None::<String>),
    ))
    .execute(conn)?;
    Ok(n)
}
