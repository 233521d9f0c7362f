use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{RunQueryDsl, insert_into, prelude::*, result::Error as DieselError, update};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    domain,
    infra::db::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{payments, rentals},
    },
};
use domain::{
    entities::payments::{InsertPaymentEntity, PaymentEntity},
    repositories::payments::PaymentRepository,
    value_objects::enums::{
        payment_statuses::PaymentStatus, rental_payment_statuses::RentalPaymentStatus,
    },
};

fn mark_rental_paid(conn: &mut PgConnection, rental_id: Uuid) -> Result<(), DieselError> {
    update(rentals::table.filter(rentals::id.eq(rental_id)))
        .set((
            rentals::payment_status.eq(RentalPaymentStatus::Paid.to_string()),
            rentals::updated_at.eq(Utc::now()),
        ))
        .execute(conn)?;
    Ok(())
}

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn find_by_rental_id(&self, rental_id: Uuid) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = payments::table
            .filter(payments::rental_id.eq(rental_id))
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(payment)
    }

    async fn find_by_intent_id(&self, intent_id: String) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let payment = payments::table
            .filter(payments::stripe_payment_intent_id.eq(&intent_id))
            .select(PaymentEntity::as_select())
            .first::<PaymentEntity>(&mut conn)
            .optional()?;

        Ok(payment)
    }

    async fn create_pending(&self, payment: InsertPaymentEntity) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let created = conn.transaction::<Option<PaymentEntity>, DieselError, _>(|conn| {
            // The rental row lock taken here also orders this against a concurrent reschedule.
            let flagged = update(
                rentals::table
                    .filter(rentals::id.eq(payment.rental_id))
                    .filter(rentals::payment_status.eq(RentalPaymentStatus::Unpaid.to_string()))
                    .filter(rentals::total_price.eq(payment.amount)),
            )
            .set((
                rentals::payment_status.eq(RentalPaymentStatus::Pending.to_string()),
                rentals::updated_at.eq(Utc::now()),
            ))
            .execute(conn)?;

            if flagged == 0 {
                return Ok(None);
            }

            let created = insert_into(payments::table)
                .values(&payment)
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(conn)?;

            Ok(Some(created))
        })?;

        Ok(created)
    }

    async fn replace_intent(
        &self,
        payment_id: Uuid,
        intent_id: String,
    ) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(
            payments::table
                .filter(payments::id.eq(payment_id))
                .filter(payments::status.ne(PaymentStatus::Succeeded.to_string())),
        )
        .set((
            payments::stripe_payment_intent_id.eq(&intent_id),
            payments::status.eq(PaymentStatus::Pending.to_string()),
            payments::failure_message.eq(None::<String>),
            payments::updated_at.eq(Utc::now()),
        ))
        .returning(PaymentEntity::as_returning())
        .get_result::<PaymentEntity>(&mut conn)
        .optional()?;

        Ok(updated)
    }

    async fn mark_succeeded(&self, payment_id: Uuid) -> Result<PaymentEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = conn.transaction::<PaymentEntity, DieselError, _>(|conn| {
            let updated = update(payments::table.filter(payments::id.eq(payment_id)))
                .set((
                    payments::status.eq(PaymentStatus::Succeeded.to_string()),
                    payments::failure_message.eq(None::<String>),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(conn)?;

            mark_rental_paid(conn, updated.rental_id)?;

            Ok(updated)
        })?;

        Ok(updated)
    }

    async fn mark_failed(
        &self,
        payment_id: Uuid,
        failure_message: String,
    ) -> Result<Option<PaymentEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = update(
            payments::table
                .filter(payments::id.eq(payment_id))
                .filter(payments::status.ne(PaymentStatus::Succeeded.to_string())),
        )
        .set((
            payments::status.eq(PaymentStatus::Failed.to_string()),
            payments::failure_message.eq(Some(failure_message)),
            payments::updated_at.eq(Utc::now()),
        ))
        .returning(PaymentEntity::as_returning())
        .get_result::<PaymentEntity>(&mut conn)
        .optional()?;

        Ok(updated)
    }

    async fn attach_charge(
        &self,
        payment_id: Uuid,
        charge_id: String,
        receipt_url: Option<String>,
    ) -> Result<PaymentEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;
        let target = payments::table.filter(payments::id.eq(payment_id));

        let updated = match receipt_url {
            Some(receipt_url) => update(target)
                .set((
                    payments::stripe_charge_id.eq(Some(charge_id)),
                    payments::receipt_url.eq(Some(receipt_url)),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(&mut conn)?,
            None => update(target)
                .set((
                    payments::stripe_charge_id.eq(Some(charge_id)),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(&mut conn)?,
        };

        Ok(updated)
    }

    async fn record_receipt(
        &self,
        payment_id: Uuid,
        charge_id: String,
        receipt_url: String,
    ) -> Result<PaymentEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let updated = conn.transaction::<PaymentEntity, DieselError, _>(|conn| {
            let updated = update(payments::table.filter(payments::id.eq(payment_id)))
                .set((
                    payments::receipt_url.eq(Some(receipt_url)),
                    payments::stripe_charge_id.eq(Some(charge_id)),
                    payments::status.eq(PaymentStatus::Succeeded.to_string()),
                    payments::updated_at.eq(Utc::now()),
                ))
                .returning(PaymentEntity::as_returning())
                .get_result::<PaymentEntity>(conn)?;

            mark_rental_paid(conn, updated.rental_id)?;

            Ok(updated)
        })?;

        Ok(updated)
    }
}
