use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::info;
use uuid::Uuid;

use genomic_core::config::RegistryConfig;
use genomic_core::{
    BiobankStoredSample, GcValidationMetrics, GenomeType, GenomicFileProcessed, GenomicJobRun,
    GenomicManifestFeedback, GenomicManifestFile, GenomicSampleContamination, GenomicSetMember,
    JobKind, JobRunId, ManifestKind, MemberId, ParticipantSummary, WorkflowState,
};

use crate::{Registry, RegistryError, Result, UnitOfWork};

/// PostgreSQL registry.
///
/// Every table keeps the indexed lookup columns next to a JSONB `body`
/// holding the whole entity, so entity fields can grow without a migration.
#[derive(Debug, Clone)]
pub struct PgRegistry {
    pool: PgPool,
}

fn decode<T: DeserializeOwned>(body: serde_json::Value) -> Result<T> {
    Ok(serde_json::from_value(body)?)
}

fn decode_all<T: DeserializeOwned>(bodies: Vec<serde_json::Value>) -> Result<Vec<T>> {
    bodies.into_iter().map(decode).collect()
}

fn encode<T: Serialize>(entity: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(entity)?)
}

impl PgRegistry {
    /// Connect and apply the embedded migrations.
    pub async fn connect(config: &RegistryConfig) -> Result<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| RegistryError::Database(sqlx::Error::Configuration("DATABASE_URL not set".into())))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await?;
        info!("PostgreSQL connected");
        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("Database migrations applied successfully");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn upsert_job_run(&self, run: &GenomicJobRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO genomic_job_run (id, job_kind, start_time, status, result, body)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status, result = EXCLUDED.result, body = EXCLUDED.body",
        )
        .bind(run.id)
        .bind(run.job_kind.as_str())
        .bind(run.start_time)
        .bind(run.status.as_str())
        .bind(run.result.map(|r| r.as_str()))
        .bind(encode(run)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fetch_bodies(&self, sql: &str, key: &str) -> Result<Vec<serde_json::Value>> {
        Ok(sqlx::query_scalar::<_, serde_json::Value>(sql)
            .bind(key)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn fetch_body_by_id(&self, sql: &str, id: Uuid) -> Result<Option<serde_json::Value>> {
        Ok(sqlx::query_scalar::<_, serde_json::Value>(sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }
}

// ── Commit helpers (one statement per row, inside the caller's tx) ──

async fn put_set(tx: &mut Transaction<'_, Postgres>, set: &genomic_core::GenomicSet) -> Result<()> {
    sqlx::query(
        "INSERT INTO genomic_set (id, name, version, body) VALUES ($1, $2, $3, $4)
         ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body",
    )
    .bind(set.id)
    .bind(&set.name)
    .bind(set.version)
    .bind(encode(set)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn put_member(tx: &mut Transaction<'_, Postgres>, m: &GenomicSetMember) -> Result<()> {
    sqlx::query(
        "INSERT INTO genomic_set_member
            (id, biobank_id, sample_id, genome_type, workflow_state, manifest_file_id, created, body)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         ON CONFLICT (id) DO UPDATE SET
            sample_id = EXCLUDED.sample_id,
            workflow_state = EXCLUDED.workflow_state,
            manifest_file_id = EXCLUDED.manifest_file_id,
            body = EXCLUDED.body",
    )
    .bind(m.id)
    .bind(&m.biobank_id)
    .bind(&m.sample_id)
    .bind(m.genome_type.as_str())
    .bind(m.workflow_state.as_str())
    .bind(m.manifest_file_id)
    .bind(m.created)
    .bind(encode(m)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn put_file(tx: &mut Transaction<'_, Postgres>, f: &GenomicFileProcessed) -> Result<()> {
    sqlx::query(
        "INSERT INTO genomic_file_processed (id, job_run_id, bucket_name, file_path, body)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET job_run_id = EXCLUDED.job_run_id, body = EXCLUDED.body",
    )
    .bind(f.id)
    .bind(f.job_run_id)
    .bind(&f.bucket_name)
    .bind(&f.file_path)
    .bind(encode(f)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn put_manifest(tx: &mut Transaction<'_, Postgres>, m: &GenomicManifestFile) -> Result<()> {
    sqlx::query(
        "INSERT INTO genomic_manifest_file (id, manifest_kind, bucket_name, file_path, body)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (id) DO UPDATE SET body = EXCLUDED.body",
    )
    .bind(m.id)
    .bind(m.manifest_kind.as_str())
    .bind(&m.bucket_name)
    .bind(&m.file_path)
    .bind(encode(m)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn put_feedback(tx: &mut Transaction<'_, Postgres>, f: &GenomicManifestFeedback) -> Result<()> {
    sqlx::query(
        "INSERT INTO genomic_manifest_feedback
            (id, input_manifest_file_id, feedback_complete, aw2f_job_run_id, aw2f_manifest_file_id, body)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (id) DO UPDATE SET
            feedback_complete = EXCLUDED.feedback_complete,
            aw2f_job_run_id = EXCLUDED.aw2f_job_run_id,
            aw2f_manifest_file_id = EXCLUDED.aw2f_manifest_file_id,
            body = EXCLUDED.body",
    )
    .bind(f.id)
    .bind(f.input_manifest_file_id)
    .bind(f.feedback_complete)
    .bind(f.aw2f_job_run_id)
    .bind(f.aw2f_manifest_file_id)
    .bind(encode(f)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn put_metrics(tx: &mut Transaction<'_, Postgres>, m: &GcValidationMetrics) -> Result<()> {
    sqlx::query(
        "INSERT INTO genomic_gc_validation_metrics
            (id, member_id, genome_type, reconcile_job_run_id, created, body)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (id) DO UPDATE SET
            reconcile_job_run_id = EXCLUDED.reconcile_job_run_id,
            body = EXCLUDED.body",
    )
    .bind(m.id)
    .bind(m.member_id)
    .bind(m.genome_type.as_str())
    .bind(m.reconcile_job_run_id)
    .bind(m.created)
    .bind(encode(m)?)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn append_contamination(
    tx: &mut Transaction<'_, Postgres>,
    c: &GenomicSampleContamination,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO genomic_sample_contamination (id, sample_id, failed_in_job, created)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(c.id)
    .bind(&c.sample_id)
    .bind(c.failed_in_job)
    .bind(c.created)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl Registry for PgRegistry {
    async fn open_job_run(&self, run: &GenomicJobRun) -> Result<()> {
        self.upsert_job_run(run).await
    }

    async fn close_job_run(&self, run: &GenomicJobRun) -> Result<()> {
        self.upsert_job_run(run).await
    }

    async fn job_runs(&self, kind: JobKind) -> Result<Vec<GenomicJobRun>> {
        let bodies = self
            .fetch_bodies(
                "SELECT body FROM genomic_job_run WHERE job_kind = $1 ORDER BY start_time DESC",
                kind.as_str(),
            )
            .await?;
        decode_all(bodies)
    }

    async fn last_successful_run(&self, kind: JobKind) -> Result<Option<GenomicJobRun>> {
        let body = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM genomic_job_run
             WHERE job_kind = $1 AND status = 'COMPLETED' AND result IN ('SUCCESS', 'NO_FILES_FOUND')
             ORDER BY start_time DESC LIMIT 1",
        )
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        body.map(decode).transpose()
    }

    async fn try_acquire_job_lock(&self, kind: JobKind, run_id: JobRunId) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO genomic_job_lock (job_kind, job_run_id, acquired_at)
             VALUES ($1, $2, now())
             ON CONFLICT (job_kind) DO NOTHING",
        )
        .bind(kind.as_str())
        .bind(run_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_job_lock(&self, kind: JobKind) -> Result<()> {
        sqlx::query("DELETE FROM genomic_job_lock WHERE job_kind = $1")
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for set in &unit.sets {
            put_set(&mut tx, set).await?;
        }
        for member in &unit.members {
            put_member(&mut tx, member).await?;
        }
        for file in &unit.files {
            put_file(&mut tx, file).await?;
        }
        for manifest in &unit.manifests {
            put_manifest(&mut tx, manifest).await?;
        }
        for feedback in &unit.feedback {
            put_feedback(&mut tx, feedback).await?;
        }
        for metrics in &unit.metrics {
            put_metrics(&mut tx, metrics).await?;
        }
        for entry in &unit.contamination {
            append_contamination(&mut tx, entry).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn file_processed(&self, bucket: &str, path: &str) -> Result<Option<GenomicFileProcessed>> {
        let body = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM genomic_file_processed WHERE bucket_name = $1 AND file_path = $2",
        )
        .bind(bucket)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        body.map(decode).transpose()
    }

    async fn file_processed_by_id(&self, id: Uuid) -> Result<Option<GenomicFileProcessed>> {
        self.fetch_body_by_id("SELECT body FROM genomic_file_processed WHERE id = $1", id)
            .await?
            .map(decode)
            .transpose()
    }

    async fn files_for_job_run(&self, job_run_id: JobRunId) -> Result<Vec<GenomicFileProcessed>> {
        let bodies = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM genomic_file_processed WHERE job_run_id = $1",
        )
        .bind(job_run_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn manifest_file(&self, id: Uuid) -> Result<Option<GenomicManifestFile>> {
        self.fetch_body_by_id("SELECT body FROM genomic_manifest_file WHERE id = $1", id)
            .await?
            .map(decode)
            .transpose()
    }

    async fn manifest_file_by_path(&self, bucket: &str, path: &str) -> Result<Option<GenomicManifestFile>> {
        let body = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM genomic_manifest_file WHERE bucket_name = $1 AND file_path = $2",
        )
        .bind(bucket)
        .bind(path)
        .fetch_optional(&self.pool)
        .await?;
        body.map(decode).transpose()
    }

    async fn manifest_files(&self, kind: ManifestKind) -> Result<Vec<GenomicManifestFile>> {
        let bodies = self
            .fetch_bodies(
                "SELECT body FROM genomic_manifest_file WHERE manifest_kind = $1",
                kind.as_str(),
            )
            .await?;
        decode_all(bodies)
    }

    async fn feedback_for_manifest(&self, input_manifest_file_id: Uuid) -> Result<Option<GenomicManifestFeedback>> {
        self.fetch_body_by_id(
            "SELECT body FROM genomic_manifest_feedback WHERE input_manifest_file_id = $1",
            input_manifest_file_id,
        )
        .await?
        .map(decode)
        .transpose()
    }

    async fn feedback_awaiting_aw2f(&self) -> Result<Vec<GenomicManifestFeedback>> {
        let bodies = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM genomic_manifest_feedback
             WHERE feedback_complete AND aw2f_job_run_id IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn max_set_version(&self, name: &str) -> Result<Option<i32>> {
        Ok(
            sqlx::query_scalar::<_, Option<i32>>("SELECT max(version) FROM genomic_set WHERE name = $1")
                .bind(name)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn member(&self, id: MemberId) -> Result<Option<GenomicSetMember>> {
        self.fetch_body_by_id("SELECT body FROM genomic_set_member WHERE id = $1", id)
            .await?
            .map(decode)
            .transpose()
    }

    async fn members_by_biobank_id(&self, biobank_id: &str) -> Result<Vec<GenomicSetMember>> {
        let bodies = self
            .fetch_bodies(
                "SELECT body FROM genomic_set_member WHERE biobank_id = $1 ORDER BY created",
                biobank_id,
            )
            .await?;
        decode_all(bodies)
    }

    async fn members_by_sample_id(&self, sample_id: &str) -> Result<Vec<GenomicSetMember>> {
        let bodies = self
            .fetch_bodies(
                "SELECT body FROM genomic_set_member WHERE sample_id = $1 ORDER BY created",
                sample_id,
            )
            .await?;
        decode_all(bodies)
    }

    async fn members_in_states(
        &self,
        states: &[WorkflowState],
        genome_type: Option<GenomeType>,
    ) -> Result<Vec<GenomicSetMember>> {
        let states: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
        let bodies = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM genomic_set_member
             WHERE workflow_state = ANY($1) AND ($2::text IS NULL OR genome_type = $2)
             ORDER BY created",
        )
        .bind(states)
        .bind(genome_type.map(|g| g.as_str()))
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn members_for_manifest(&self, manifest_file_id: Uuid) -> Result<Vec<GenomicSetMember>> {
        let bodies = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM genomic_set_member WHERE manifest_file_id = $1 ORDER BY created",
        )
        .bind(manifest_file_id)
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn metrics_for_member(&self, member_id: MemberId) -> Result<Option<GcValidationMetrics>> {
        self.fetch_body_by_id(
            "SELECT body FROM genomic_gc_validation_metrics WHERE member_id = $1
             ORDER BY created DESC LIMIT 1",
            member_id,
        )
        .await?
        .map(decode)
        .transpose()
    }

    async fn unreconciled_metrics(&self, genome_type: GenomeType) -> Result<Vec<GcValidationMetrics>> {
        let bodies = self
            .fetch_bodies(
                "SELECT body FROM genomic_gc_validation_metrics
                 WHERE genome_type = $1 AND reconcile_job_run_id IS NULL
                 ORDER BY created",
                genome_type.as_str(),
            )
            .await?;
        decode_all(bodies)
    }

    async fn contamination_entries(&self, sample_id: &str) -> Result<Vec<GenomicSampleContamination>> {
        let rows = sqlx::query_as::<_, (Uuid, String, Uuid, DateTime<Utc>)>(
            "SELECT id, sample_id, failed_in_job, created FROM genomic_sample_contamination
             WHERE sample_id = $1 ORDER BY created",
        )
        .bind(sample_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, sample_id, failed_in_job, created)| GenomicSampleContamination {
                id,
                sample_id,
                failed_in_job,
                created,
            })
            .collect())
    }

    async fn participant(&self, participant_id: &str) -> Result<Option<ParticipantSummary>> {
        self.fetch_bodies(
            "SELECT body FROM participant_summary WHERE participant_id = $1",
            participant_id,
        )
        .await?
        .into_iter()
        .next()
        .map(decode)
        .transpose()
    }

    async fn participant_by_biobank_id(&self, biobank_id: &str) -> Result<Option<ParticipantSummary>> {
        self.fetch_bodies("SELECT body FROM participant_summary WHERE biobank_id = $1", biobank_id)
            .await?
            .into_iter()
            .next()
            .map(decode)
            .transpose()
    }

    async fn participants_modified_since(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ParticipantSummary>> {
        let bodies = sqlx::query_scalar::<_, serde_json::Value>(
            "SELECT body FROM participant_summary
             WHERE $1::timestamptz IS NULL OR last_modified > $1
             ORDER BY biobank_id",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        decode_all(bodies)
    }

    async fn stored_samples(&self, biobank_id: &str) -> Result<Vec<BiobankStoredSample>> {
        let bodies = self
            .fetch_bodies(
                "SELECT body FROM biobank_stored_sample WHERE biobank_id = $1 ORDER BY created",
                biobank_id,
            )
            .await?;
        decode_all(bodies)
    }
}
