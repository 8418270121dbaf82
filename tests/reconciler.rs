use chrono::Utc;
use shopdir::reconcile::{DeletionReconciler, MarkPaidRequest, PaymentReconciler, ReconcileError};
use sqlx::PgPool;
use uuid::Uuid;

// key: reconciler-tests -> pending->paid propagation and reversal

async fn seed_agent(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO agents (id, code, name, mobile, total_shops, total_earnings) VALUES ($1, $2, $3, $4, 1, 0)",
    )
    .bind(id)
    .bind(format!("AG{}", &id.simple().to_string()[..6]))
    .bind("Field Agent")
    .bind("9876543210")
    .execute(pool)
    .await
    .unwrap();
    id
}

// Inserts the denormalized pair: an agent-scoped row plus its linked public
// copy. Returns the agent-scoped id (the id the action layer works with).
async fn seed_listing(pool: &PgPool, agent_id: Uuid, district: &str) -> Uuid {
    let agent_row = Uuid::new_v4();
    let public_row = Uuid::new_v4();
    for (table, id, source) in [
        ("agent_shops", agent_row, None::<Uuid>),
        ("public_shops", public_row, Some(agent_row)),
    ] {
        sqlx::query(&format!(
            "INSERT INTO {table} (id, agent_id, source_listing_id, shop_name, owner_name, mobile, district, whatsapp_number, payment_status, payment_mode)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', 'NONE')"
        ))
        .bind(id)
        .bind(agent_id)
        .bind(source)
        .bind("Corner Bakery")
        .bind("A. Varma")
        .bind("9000000000")
        .bind(district)
        .bind("9111111111")
        .execute(pool)
        .await
        .unwrap();
    }
    agent_row
}

async fn agent_earnings(pool: &PgPool, agent_id: Uuid) -> i64 {
    sqlx::query_scalar("SELECT total_earnings FROM agents WHERE id = $1")
        .bind(agent_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn ledger_totals(pool: &PgPool, district: &str) -> Option<(i64, i64, i64)> {
    sqlx::query_as(
        "SELECT total_revenue, total_agent_commission, net_revenue FROM revenue_ledger
         WHERE ledger_date = $1 AND district = $2",
    )
    .bind(Utc::now().date_naive())
    .bind(district)
    .fetch_optional(pool)
    .await
    .unwrap()
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn mark_paid_credits_commission_and_revenue(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;
    let listing_id = seed_listing(&pool, agent_id, "Kochi").await;

    let outcome = PaymentReconciler::new(pool.clone())
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: Some("BASIC".into()),
            amount: Some(100),
            payment_mode: Some("CASH".into()),
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap();

    // BASIC commissions at 0.2
    assert_eq!(outcome.commission, 20);
    assert!(outcome.warnings.is_empty());
    assert_eq!(outcome.listing.payment_status, "PAID");
    assert_eq!(outcome.listing.plan_amount, 100);
    assert!(outcome.listing.receipt_no.as_deref().unwrap().starts_with("REC"));
    assert!(outcome.listing.last_payment_date.is_some());
    assert!(outcome.listing.payment_expiry_date.is_some());

    assert_eq!(agent_earnings(&pool, agent_id).await, 20);
    assert_eq!(ledger_totals(&pool, "KOCHI").await, Some((100, 20, 80)));

    // both denormalized copies agree after the transition
    let public_status: String =
        sqlx::query_scalar("SELECT payment_status FROM public_shops WHERE source_listing_id = $1")
            .bind(listing_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(public_status, "PAID");
    let public_commission: i64 =
        sqlx::query_scalar("SELECT agent_commission FROM public_shops WHERE source_listing_id = $1")
            .bind(listing_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(public_commission, 20);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn mark_paid_twice_counts_commission_once(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;
    let listing_id = seed_listing(&pool, agent_id, "Kochi").await;

    let reconciler = PaymentReconciler::new(pool.clone());
    let first = reconciler
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: Some("BASIC".into()),
            amount: Some(100),
            payment_mode: Some("CASH".into()),
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap();
    assert_eq!(first.commission, 20);

    // re-submission with only the mode changed: display update, no ledger effect
    let second = reconciler
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: Some("BASIC".into()),
            amount: Some(100),
            payment_mode: Some("UPI".into()),
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap();

    assert_eq!(second.commission, 0);
    assert_eq!(second.listing.payment_mode, "UPI");
    assert_eq!(second.listing.receipt_no, first.listing.receipt_no);
    assert_eq!(agent_earnings(&pool, agent_id).await, 20);
    assert_eq!(ledger_totals(&pool, "KOCHI").await, Some((100, 20, 80)));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn delete_reverses_commission_and_revenue(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;
    let listing_id = seed_listing(&pool, agent_id, "Kochi").await;

    PaymentReconciler::new(pool.clone())
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: Some("BASIC".into()),
            amount: Some(100),
            payment_mode: Some("CASH".into()),
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap();

    let outcome = DeletionReconciler::new(pool.clone())
        .delete(listing_id)
        .await
        .unwrap();

    assert_eq!(outcome.commission_reversed, 20);
    assert_eq!(outcome.revenue_reversed, 100);
    assert_eq!(outcome.agent_name.as_deref(), Some("Field Agent"));
    assert_eq!(agent_earnings(&pool, agent_id).await, 0);
    assert_eq!(ledger_totals(&pool, "KOCHI").await, Some((0, 0, 0)));

    let remaining: i64 = sqlx::query_scalar(
        "SELECT (SELECT COUNT(*) FROM agent_shops WHERE id = $1)
              + (SELECT COUNT(*) FROM public_shops WHERE source_listing_id = $1)",
    )
    .bind(listing_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(remaining, 0);

    let shops: i32 = sqlx::query_scalar("SELECT total_shops FROM agents WHERE id = $1")
        .bind(agent_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(shops, 0);
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn delete_clamps_agent_earnings_at_zero(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;
    let listing_id = seed_listing(&pool, agent_id, "Kochi").await;

    PaymentReconciler::new(pool.clone())
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: Some("BASIC".into()),
            amount: Some(100),
            payment_mode: Some("CASH".into()),
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap();

    // simulate external drift so the stored balance is below the commission
    sqlx::query("UPDATE agents SET total_earnings = 5 WHERE id = $1")
        .bind(agent_id)
        .execute(&pool)
        .await
        .unwrap();

    let outcome = DeletionReconciler::new(pool.clone())
        .delete(listing_id)
        .await
        .unwrap();

    assert_eq!(agent_earnings(&pool, agent_id).await, 0);
    assert_eq!(outcome.commission_reversed, 5);
    assert!(outcome
        .warnings
        .iter()
        .any(|warning| warning.contains("clamped")));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn gold_plan_entitlements_reach_both_copies(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;
    let listing_id = seed_listing(&pool, agent_id, "Kochi").await;

    let outcome = PaymentReconciler::new(pool.clone())
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: Some("gold".into()),
            amount: None,
            payment_mode: None,
            receipt_no: Some("REC-MANUAL-1".into()),
            district: None,
        })
        .await
        .unwrap();

    // catalog amount applies when the caller sends none; 0.25 * 1999
    assert_eq!(outcome.listing.plan_amount, 1999);
    assert_eq!(outcome.commission, 500);
    assert_eq!(outcome.listing.receipt_no.as_deref(), Some("REC-MANUAL-1"));
    assert_eq!(outcome.listing.payment_mode, "CASH");

    let (slot, rank, whatsapp): (String, i32, Option<String>) = sqlx::query_as(
        "SELECT placement_slot, priority_rank, whatsapp_number FROM public_shops WHERE source_listing_id = $1",
    )
    .bind(listing_id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(slot, "LEFT_BAR");
    assert_eq!(rank, 2);
    assert_eq!(whatsapp.as_deref(), Some("9111111111"));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn unknown_plan_and_missing_listing_abort(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;
    let listing_id = seed_listing(&pool, agent_id, "Kochi").await;

    let reconciler = PaymentReconciler::new(pool.clone());
    let err = reconciler
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: Some("DIAMOND".into()),
            amount: None,
            payment_mode: None,
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::InvalidPlan(_)));

    let err = reconciler
        .mark_paid(MarkPaidRequest {
            listing_id: Uuid::new_v4(),
            plan_type: None,
            amount: None,
            payment_mode: None,
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound));

    let err = DeletionReconciler::new(pool.clone())
        .delete(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::NotFound));
}

#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn net_revenue_invariant_holds_across_sequences(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;

    let payment = PaymentReconciler::new(pool.clone());
    let deletion = DeletionReconciler::new(pool.clone());

    let first = seed_listing(&pool, agent_id, "Kochi").await;
    let second = seed_listing(&pool, agent_id, "Kochi").await;
    let third = seed_listing(&pool, agent_id, "Thrissur").await;

    for (listing_id, plan) in [(first, "BASIC"), (second, "GOLD"), (third, "SILVER")] {
        payment
            .mark_paid(MarkPaidRequest {
                listing_id,
                plan_type: Some(plan.into()),
                amount: None,
                payment_mode: Some("UPI".into()),
                receipt_no: None,
                district: None,
            })
            .await
            .unwrap();
    }
    deletion.delete(second).await.unwrap();

    let rows: Vec<(i64, i64, i64)> = sqlx::query_as(
        "SELECT total_revenue, total_agent_commission, net_revenue FROM revenue_ledger",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert!(!rows.is_empty());
    for (total, commission, net) in rows {
        assert_eq!(net, total - commission);
    }
}

// A failure inside the paid-fields statement must leave the row PENDING and
// the whole operation retryable; a torn PAID row with no commission or receipt
// would silently drop the ledger effects forever.
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn failed_paid_write_leaves_listing_retryable(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;
    let listing_id = seed_listing(&pool, agent_id, "Kochi").await;

    sqlx::query(
        "CREATE OR REPLACE FUNCTION reject_receipt_writes() RETURNS trigger AS $$
         BEGIN
             IF NEW.receipt_no IS DISTINCT FROM OLD.receipt_no THEN
                 RAISE EXCEPTION 'receipt writes disabled';
             END IF;
             RETURN NEW;
         END;
         $$ LANGUAGE plpgsql",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TRIGGER block_receipt_writes BEFORE UPDATE ON agent_shops
         FOR EACH ROW EXECUTE FUNCTION reject_receipt_writes()",
    )
    .execute(&pool)
    .await
    .unwrap();

    let reconciler = PaymentReconciler::new(pool.clone());
    let request = MarkPaidRequest {
        listing_id,
        plan_type: Some("BASIC".into()),
        amount: Some(100),
        payment_mode: Some("CASH".into()),
        receipt_no: None,
        district: None,
    };
    reconciler.mark_paid(request.clone()).await.unwrap_err();

    // nothing moved: no half-claimed status, no ledger effects
    let status: String = sqlx::query_scalar("SELECT payment_status FROM agent_shops WHERE id = $1")
        .bind(listing_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(status, "PENDING");
    assert_eq!(agent_earnings(&pool, agent_id).await, 0);
    assert_eq!(ledger_totals(&pool, "KOCHI").await, None);

    sqlx::query("DROP TRIGGER block_receipt_writes ON agent_shops")
        .execute(&pool)
        .await
        .unwrap();

    // the retry is a clean first transition
    let outcome = reconciler.mark_paid(request).await.unwrap();
    assert_eq!(outcome.commission, 20);
    assert_eq!(agent_earnings(&pool, agent_id).await, 20);
    assert_eq!(ledger_totals(&pool, "KOCHI").await, Some((100, 20, 80)));
}

// Both ids of a denormalized pair must funnel through the same idempotence
// gate; addressing the pair through its public id first must not open a second
// chance to claim the agent-scoped row.
#[sqlx::test]
#[ignore = "requires DATABASE_URL with Postgres server"]
async fn mark_paid_via_public_id_gates_on_canonical_row(pool: PgPool) {
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    let agent_id = seed_agent(&pool).await;
    let listing_id = seed_listing(&pool, agent_id, "Kochi").await;
    let public_id: Uuid =
        sqlx::query_scalar("SELECT id FROM public_shops WHERE source_listing_id = $1")
            .bind(listing_id)
            .fetch_one(&pool)
            .await
            .unwrap();

    let reconciler = PaymentReconciler::new(pool.clone());
    let first = reconciler
        .mark_paid(MarkPaidRequest {
            listing_id: public_id,
            plan_type: Some("BASIC".into()),
            amount: Some(100),
            payment_mode: Some("CASH".into()),
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap();
    assert_eq!(first.commission, 20);

    let agent_status: String =
        sqlx::query_scalar("SELECT payment_status FROM agent_shops WHERE id = $1")
            .bind(listing_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(agent_status, "PAID");

    let second = reconciler
        .mark_paid(MarkPaidRequest {
            listing_id,
            plan_type: Some("BASIC".into()),
            amount: Some(100),
            payment_mode: Some("UPI".into()),
            receipt_no: None,
            district: None,
        })
        .await
        .unwrap();
    assert_eq!(second.commission, 0);
    assert_eq!(agent_earnings(&pool, agent_id).await, 20);
    assert_eq!(ledger_totals(&pool, "KOCHI").await, Some((100, 20, 80)));
}
