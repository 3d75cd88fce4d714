// Copyright (c) Archon 72 Contributors
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;

use archon_types::ArchonResult;

use crate::models::ScheduledJobRow;

/// One registered job-type handler (§4.7). `handle` must be idempotent —
/// at-least-once delivery means a handler can see the same job payload
/// applied twice after a crash-and-retry (§4.7 "Idempotency is the
/// handler's responsibility").
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;

    async fn handle(&self, job: &ScheduledJobRow) -> ArchonResult<()>;
}
