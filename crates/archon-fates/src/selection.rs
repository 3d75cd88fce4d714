// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

//! Deterministic adjudicator selection (§4.6 step 1).
//!
//! Three distinct Judicial-branch Archons are drawn for a petition, seeded
//! by the petition's content hash so that re-running selection for the same
//! petition (e.g. after a crash before the session row was committed)
//! reproduces the same panel. Archons already carrying more than
//! `max_concurrent_sessions` open deliberations are excluded from the draw.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use archon_types::branch::Branch;
use archon_types::error::{ArchonError, ArchonResult};
use archon_types::roster::{rank_priority_order, ArchonProfile};

use crate::schema::deliberation_sessions;

fn seed_from_content_hash(content_hash: &str) -> [u8; 32] {
    let digest = blake3::hash(content_hash.as_bytes());
    *digest.as_bytes()
}

/// Counts open (non-`complete`) deliberation sessions referencing `archon_id`
/// in any of its three adjudicator slots.
async fn open_session_load(conn: &mut AsyncPgConnection, archon_id: &str) -> ArchonResult<i64> {
    use deliberation_sessions::dsl;

    let count: i64 = dsl::deliberation_sessions
        .filter(dsl::phase.ne("complete"))
        .filter(
            dsl::adjudicator_1
                .eq(archon_id)
                .or(dsl::adjudicator_2.eq(archon_id))
                .or(dsl::adjudicator_3.eq(archon_id)),
        )
        .count()
        .get_result(conn)
        .await
        .map_err(|e| ArchonError::Storage(e.to_string()))?;
    Ok(count)
}

/// Selects 3 distinct Judicial Archons for `content_hash`, excluding anyone
/// already at or above `max_concurrent_sessions` open deliberations.
///
/// Falls back to including overloaded Archons only if fewer than 3 eligible
/// candidates remain, since the Judicial branch is otherwise too small to
/// guarantee a quorum under load (§4.6 Open Questions).
pub async fn select_adjudicators(
    conn: &mut AsyncPgConnection,
    content_hash: &str,
    max_concurrent_sessions: i64,
) -> ArchonResult<[String; 3]> {
    let judicial: Vec<&'static ArchonProfile> = rank_priority_order()
        .into_iter()
        .filter(|p| p.branch == Branch::Judicial)
        .collect();

    if judicial.len() < 3 {
        return Err(ArchonError::Unrecoverable {
            attempts: 0,
            reason: "fewer than 3 Judicial Archons in roster".to_string(),
        });
    }

    let mut eligible = Vec::with_capacity(judicial.len());
    for profile in &judicial {
        let id_str = profile.id.get().to_string();
        let load = open_session_load(conn, &id_str).await?;
        if load < max_concurrent_sessions {
            eligible.push(id_str);
        }
    }

    let pool = if eligible.len() >= 3 {
        eligible
    } else {
        judicial.iter().map(|p| p.id.get().to_string()).collect()
    };

    let seed = seed_from_content_hash(content_hash);
    let mut rng = StdRng::from_seed(seed);
    let mut shuffled = pool.clone();
    shuffled.shuffle(&mut rng);

    let chosen: Vec<String> = shuffled.into_iter().take(3).collect();
    if chosen.len() < 3 {
        return Err(ArchonError::Unrecoverable {
            attempts: 0,
            reason: "unable to draw 3 distinct adjudicators".to_string(),
        });
    }
    Ok([chosen[0].clone(), chosen[1].clone(), chosen[2].clone()])
}
