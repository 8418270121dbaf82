use anyhow::Result;
use axum::extract::{Extension, Path};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_PAID: &str = "PAID";

pub const MODE_CASH: &str = "CASH";
pub const MODE_UPI: &str = "UPI";
pub const MODE_NONE: &str = "NONE";

/// Which physical store a listing row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSource {
    AgentScoped,
    Public,
}

impl ListingSource {
    pub fn table(&self) -> &'static str {
        match self {
            ListingSource::AgentScoped => "agent_shops",
            ListingSource::Public => "public_shops",
        }
    }
}

/// key: listing-record -> denormalized shop entity, one row per store copy
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: Uuid,
    pub agent_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub source_listing_id: Option<Uuid>,
    pub shop_name: String,
    pub owner_name: String,
    pub mobile: String,
    pub category: Option<String>,
    pub address: Option<String>,
    pub district: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub photo_url: Option<String>,
    pub plan_type: String,
    pub plan_amount: i64,
    pub payment_status: String,
    pub payment_mode: String,
    pub receipt_no: Option<String>,
    pub agent_commission: i64,
    pub whatsapp_number: Option<String>,
    pub offers: Option<serde_json::Value>,
    pub priority_rank: i32,
    pub placement_slot: String,
    pub last_payment_date: Option<DateTime<Utc>>,
    pub payment_expiry_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingRecord {
    pub fn is_paid(&self) -> bool {
        self.payment_status == STATUS_PAID
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateListingRequest {
    pub agent_id: Option<Uuid>,
    pub created_by: Option<Uuid>,
    pub shop_name: String,
    pub owner_name: String,
    pub mobile: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub district: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub whatsapp_number: Option<String>,
}

/// key: listing-directory -> resolve/create/delete across both shop stores
#[derive(Clone)]
pub struct ListingDirectory {
    pool: PgPool,
}

impl ListingDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolves a listing id, searching the agent-scoped store first and the
    /// public store second. A listing may exist in only one of the two.
    pub async fn resolve(&self, id: Uuid) -> Result<Option<(ListingRecord, ListingSource)>> {
        if let Some(record) = self.fetch(ListingSource::AgentScoped, id).await? {
            return Ok(Some((record, ListingSource::AgentScoped)));
        }
        if let Some(record) = self.fetch(ListingSource::Public, id).await? {
            return Ok(Some((record, ListingSource::Public)));
        }
        Ok(None)
    }

    pub async fn fetch(
        &self,
        source: ListingSource,
        id: Uuid,
    ) -> Result<Option<ListingRecord>> {
        let record = sqlx::query_as::<_, ListingRecord>(&format!(
            "SELECT * FROM {} WHERE id = $1",
            source.table()
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// The public counterpart of an agent-scoped row, located strictly via the
    /// explicit `source_listing_id` link written at creation time.
    pub async fn public_counterpart(&self, agent_row_id: Uuid) -> Result<Option<ListingRecord>> {
        let record = sqlx::query_as::<_, ListingRecord>(
            "SELECT * FROM public_shops WHERE source_listing_id = $1",
        )
        .bind(agent_row_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Every (store, row id) pair holding this listing, resolved from whichever
    /// copy was found. Ordering puts the copy of record first.
    pub async fn copies(
        &self,
        record: &ListingRecord,
        source: ListingSource,
    ) -> Result<Vec<(ListingSource, Uuid)>> {
        let mut copies = vec![(source, record.id)];
        match source {
            ListingSource::AgentScoped => {
                if let Some(public) = self.public_counterpart(record.id).await? {
                    copies.push((ListingSource::Public, public.id));
                }
            }
            ListingSource::Public => {
                if let Some(origin) = record.source_listing_id {
                    if self.fetch(ListingSource::AgentScoped, origin).await?.is_some() {
                        copies.push((ListingSource::AgentScoped, origin));
                    }
                }
            }
        }
        Ok(copies)
    }

    /// Creates a PENDING listing. Agent-created listings get the denormalized
    /// pair (agent row + linked public row) and bump the agent's shop count;
    /// listings without an agent get a public row only.
    pub async fn create(&self, request: CreateListingRequest) -> Result<ListingRecord> {
        let id = Uuid::new_v4();
        if let Some(agent_id) = request.agent_id {
            let record = self
                .insert(ListingSource::AgentScoped, id, None, &request)
                .await?;
            self.insert(ListingSource::Public, Uuid::new_v4(), Some(id), &request)
                .await?;
            sqlx::query(
                "UPDATE agents SET total_shops = total_shops + 1, updated_at = NOW() WHERE id = $1",
            )
            .bind(agent_id)
            .execute(&self.pool)
            .await?;
            Ok(record)
        } else {
            self.insert(ListingSource::Public, id, None, &request).await
        }
    }

    async fn insert(
        &self,
        source: ListingSource,
        id: Uuid,
        source_listing_id: Option<Uuid>,
        request: &CreateListingRequest,
    ) -> Result<ListingRecord> {
        let record = sqlx::query_as::<_, ListingRecord>(&format!(
            r#"
            INSERT INTO {} (
                id, agent_id, created_by, source_listing_id,
                shop_name, owner_name, mobile, category, address, district,
                latitude, longitude, photo_url, whatsapp_number,
                payment_status, payment_mode
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
            source.table()
        ))
        .bind(id)
        .bind(request.agent_id)
        .bind(request.created_by)
        .bind(source_listing_id)
        .bind(&request.shop_name)
        .bind(&request.owner_name)
        .bind(&request.mobile)
        .bind(&request.category)
        .bind(&request.address)
        .bind(&request.district)
        .bind(request.latitude)
        .bind(request.longitude)
        .bind(&request.photo_url)
        .bind(&request.whatsapp_number)
        .bind(STATUS_PENDING)
        .bind(MODE_NONE)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    /// Removes every copy of the listing. Returns how many rows went away.
    pub async fn delete_everywhere(
        &self,
        record: &ListingRecord,
        source: ListingSource,
    ) -> Result<u64> {
        let mut removed = 0;
        for (copy_source, copy_id) in self.copies(record, source).await? {
            let result = sqlx::query(&format!(
                "DELETE FROM {} WHERE id = $1",
                copy_source.table()
            ))
            .bind(copy_id)
            .execute(&self.pool)
            .await?;
            removed += result.rows_affected();
        }
        Ok(removed)
    }
}

#[derive(Debug, Serialize)]
pub struct ListingEnvelope {
    pub listing: ListingRecord,
    pub source: ListingSource,
}

pub async fn create_listing(
    Extension(pool): Extension<PgPool>,
    Json(request): Json<CreateListingRequest>,
) -> AppResult<Json<ListingRecord>> {
    let directory = ListingDirectory::new(pool);
    let record = directory.create(request).await?;
    Ok(Json(record))
}

pub async fn get_listing(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ListingEnvelope>> {
    let directory = ListingDirectory::new(pool);
    let (listing, source) = directory.resolve(id).await?.ok_or(AppError::NotFound)?;
    Ok(Json(ListingEnvelope { listing, source }))
}
