use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use courtbook::domain::{
    entities::{
        equipment::EquipmentEntity,
        facilities::FacilityEntity,
        payments::{DEFAULT_CURRENCY, InsertPaymentEntity, PaymentEntity},
        rentals::{InsertRentalEntity, RentalEntity, RescheduleRentalEntity},
    },
    repositories::{payments::PaymentRepository, rentals::RentalRepository},
    value_objects::{
        booking_rules::overlaps,
        enums::{
            equipment_statuses::EquipmentStatus, payment_statuses::PaymentStatus,
            rental_payment_statuses::RentalPaymentStatus, rental_statuses::RentalStatus,
        },
        inventory::{self, CancellationOutcome, ReservationOutcome},
    },
};
use uuid::Uuid;

pub fn facility(price_per_hour: f64, hours: Option<(u32, u32)>) -> FacilityEntity {
    let at = |hour: u32| NaiveTime::from_hms_opt(hour, 0, 0);
    FacilityEntity {
        id: Uuid::new_v4(),
        name: "Court 1".to_string(),
        opening_time: hours.and_then(|(opening, _)| at(opening)),
        closing_time: hours.and_then(|(_, closing)| at(closing)),
        price_per_hour,
    }
}

pub fn equipment_item(
    facility_id: Uuid,
    name: &str,
    quantity: i32,
    price_per_hour: f64,
) -> EquipmentEntity {
    EquipmentEntity {
        id: Uuid::new_v4(),
        facility_id,
        name: name.to_string(),
        quantity,
        price_per_hour,
        status: EquipmentStatus::Available.to_string(),
        updated_at: Utc::now(),
    }
}

pub fn rental_at(facility_id: Uuid, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> RentalEntity {
    let created_at = starts_at - chrono::Duration::days(1);
    RentalEntity {
        id: Uuid::new_v4(),
        renter_id: Uuid::new_v4(),
        facility_id,
        equipment_ids: Vec::new(),
        starts_at,
        ends_at,
        status: RentalStatus::Confirmed.to_string(),
        total_price: Some(30.0),
        payment_status: RentalPaymentStatus::Unpaid.to_string(),
        created_at,
        updated_at: created_at,
    }
}

pub fn payment_for(rental_id: Uuid, intent_id: &str, status: PaymentStatus) -> PaymentEntity {
    let now = Utc::now();
    PaymentEntity {
        id: Uuid::new_v4(),
        rental_id,
        stripe_payment_intent_id: intent_id.to_string(),
        stripe_charge_id: None,
        amount: 30.0,
        currency: DEFAULT_CURRENCY.to_string(),
        status: status.to_string(),
        receipt_url: None,
        customer_email: "renter@example.com".to_string(),
        failure_message: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
struct State {
    rentals: Vec<RentalEntity>,
    stock: HashMap<Uuid, EquipmentEntity>,
    payments: Vec<PaymentEntity>,
}

impl State {
    /// Applies every decrement to a copy first so a failure leaves stock untouched.
    fn reserve(&mut self, equipment_ids: &[Uuid]) -> Option<Uuid> {
        let mut stock = self.stock.clone();
        for id in equipment_ids {
            match stock.get_mut(id) {
                Some(item) if item.is_rentable() && item.quantity >= 1 => item.quantity -= 1,
                _ => return Some(*id),
            }
        }
        self.stock = stock;
        None
    }

    fn restore(&mut self, equipment_ids: &[Uuid]) {
        for id in equipment_ids {
            if let Some(item) = self.stock.get_mut(id) {
                item.quantity += 1;
            }
        }
    }

    fn rental_mut(&mut self, rental_id: Uuid) -> Result<&mut RentalEntity> {
        self.rentals
            .iter_mut()
            .find(|r| r.id == rental_id)
            .ok_or_else(|| anyhow!("rental {rental_id} not found"))
    }

    fn payment_mut(&mut self, payment_id: Uuid) -> Result<&mut PaymentEntity> {
        self.payments
            .iter_mut()
            .find(|p| p.id == payment_id)
            .ok_or_else(|| anyhow!("payment {payment_id} not found"))
    }

    fn set_rental_payment_status(&mut self, rental_id: Uuid, status: RentalPaymentStatus) {
        if let Some(rental) = self.rentals.iter_mut().find(|r| r.id == rental_id) {
            rental.payment_status = status.to_string();
        }
    }
}

/// Rental storage with the same all-or-nothing stock semantics as the Postgres
/// repository but without the exclusion constraint, so overlap safety rests on the
/// booking locks alone.
#[derive(Clone, Default)]
pub struct InMemoryRentals {
    state: Arc<Mutex<State>>,
}

impl InMemoryRentals {
    pub fn insert(&self, rental: RentalEntity) {
        self.state.lock().unwrap().rentals.push(rental);
    }

    pub fn stock(&self, items: &[EquipmentEntity]) {
        let mut state = self.state.lock().unwrap();
        for item in items {
            state.stock.insert(item.id, item.clone());
        }
    }

    pub fn quantity(&self, equipment_id: Uuid) -> i32 {
        self.state.lock().unwrap().stock[&equipment_id].quantity
    }

    pub fn snapshot(&self) -> Vec<RentalEntity> {
        self.state.lock().unwrap().rentals.clone()
    }

    pub fn rental(&self, rental_id: Uuid) -> RentalEntity {
        let state = self.state.lock().unwrap();
        state.rentals.iter().find(|r| r.id == rental_id).cloned().unwrap()
    }

    /// Applies a change as if another request had committed it.
    pub fn modify(&self, rental_id: Uuid, change: impl FnOnce(&mut RentalEntity)) {
        let mut state = self.state.lock().unwrap();
        if let Some(rental) = state.rentals.iter_mut().find(|r| r.id == rental_id) {
            change(rental);
        }
    }

    /// Payment storage backed by the same state, so payment writes show up on rentals.
    pub fn payments(&self) -> InMemoryPayments {
        InMemoryPayments {
            state: Arc::clone(&self.state),
        }
    }
}

/// Payment storage mirroring the Postgres repository's guards: a succeeded payment
/// is never replaced or failed, and settling a payment marks its rental paid.
#[derive(Clone)]
pub struct InMemoryPayments {
    state: Arc<Mutex<State>>,
}

impl InMemoryPayments {
    pub fn snapshot(&self) -> Vec<PaymentEntity> {
        self.state.lock().unwrap().payments.clone()
    }
}

#[async_trait]
impl RentalRepository for InMemoryRentals {
    async fn find_by_id(&self, rental_id: Uuid) -> Result<Option<RentalEntity>> {
        let state = self.state.lock().unwrap();
        Ok(state.rentals.iter().find(|r| r.id == rental_id).cloned())
    }

    async fn list_by_renter(&self, renter_id: Uuid) -> Result<Vec<RentalEntity>> {
        let state = self.state.lock().unwrap();
        let mut rentals: Vec<RentalEntity> = state
            .rentals
            .iter()
            .filter(|r| r.renter_id == renter_id)
            .cloned()
            .collect();
        rentals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rentals)
    }

    async fn find_overlapping(
        &self,
        facility_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<Vec<RentalEntity>> {
        // Give other tasks a chance to interleave between the read and the write.
        tokio::task::yield_now().await;

        let state = self.state.lock().unwrap();
        Ok(state
            .rentals
            .iter()
            .filter(|r| {
                r.facility_id == facility_id
                    && !r.is_cancelled()
                    && overlaps(r.starts_at, r.ends_at, starts_at, ends_at)
            })
            .cloned()
            .collect())
    }

    async fn insert_reserving_equipment(
        &self,
        rental: InsertRentalEntity,
    ) -> Result<ReservationOutcome> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if let Some(equipment_id) = state.reserve(&rental.equipment_ids) {
            return Ok(ReservationOutcome::OutOfStock(equipment_id));
        }

        let now = Utc::now();
        let inserted = RentalEntity {
            id: Uuid::new_v4(),
            renter_id: rental.renter_id,
            facility_id: rental.facility_id,
            equipment_ids: rental.equipment_ids,
            starts_at: rental.starts_at,
            ends_at: rental.ends_at,
            status: rental.status,
            total_price: rental.total_price,
            payment_status: rental.payment_status,
            created_at: now,
            updated_at: now,
        };
        state.rentals.push(inserted.clone());
        Ok(ReservationOutcome::Reserved(inserted))
    }

    async fn reschedule(
        &self,
        rental_id: Uuid,
        changes: RescheduleRentalEntity,
    ) -> Result<ReservationOutcome> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        let stored = state.rental_mut(rental_id)?.clone();
        match stored.rental_status() {
            Some(RentalStatus::Confirmed) => {}
            Some(status) => return Ok(ReservationOutcome::NotConfirmed(status)),
            None => return Err(anyhow!("rental has unknown status {}", stored.status)),
        }
        if !stored.accepts_price(changes.total_price) {
            return Ok(ReservationOutcome::PriceLocked);
        }

        if let Some(requested) = &changes.equipment_ids {
            if !inventory::same_equipment(&stored.equipment_ids, requested) {
                let saved_stock = state.stock.clone();
                state.restore(&stored.equipment_ids);
                if let Some(equipment_id) = state.reserve(requested) {
                    state.stock = saved_stock;
                    return Ok(ReservationOutcome::OutOfStock(equipment_id));
                }
            }
        }

        let rental = state.rental_mut(rental_id)?;
        rental.facility_id = changes.facility_id;
        rental.starts_at = changes.starts_at;
        rental.ends_at = changes.ends_at;
        if let Some(total_price) = changes.total_price {
            rental.total_price = Some(total_price);
        }
        if let Some(equipment_ids) = changes.equipment_ids {
            rental.equipment_ids = equipment_ids;
        }
        rental.updated_at = changes.updated_at;

        Ok(ReservationOutcome::Reserved(rental.clone()))
    }

    async fn cancel_restoring_equipment(&self, rental_id: Uuid) -> Result<CancellationOutcome> {
        let mut state = self.state.lock().unwrap();
        let rental = state.rental_mut(rental_id)?;
        match rental.rental_status() {
            Some(status) if status.can_transition_to(RentalStatus::Cancelled) => {}
            Some(status) => return Ok(CancellationOutcome::NotConfirmed(status)),
            None => return Err(anyhow!("rental has unknown status {}", rental.status)),
        }
        rental.status = RentalStatus::Cancelled.to_string();
        let cancelled = rental.clone();

        state.restore(&cancelled.equipment_ids);
        Ok(CancellationOutcome::Cancelled(cancelled))
    }

    async fn complete_elapsed(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let mut completed = 0;
        for rental in state.rentals.iter_mut() {
            let completes = rental
                .rental_status()
                .is_some_and(|status| status.can_transition_to(RentalStatus::Completed));
            if completes && rental.ends_at <= now {
                rental.status = RentalStatus::Completed.to_string();
                completed += 1;
            }
        }
        Ok(completed)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPayments {
    async fn find_by_rental_id(&self, rental_id: Uuid) -> Result<Option<PaymentEntity>> {
        let state = self.state.lock().unwrap();
        Ok(state.payments.iter().find(|p| p.rental_id == rental_id).cloned())
    }

    async fn find_by_intent_id(&self, intent_id: String) -> Result<Option<PaymentEntity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .payments
            .iter()
            .find(|p| p.stripe_payment_intent_id == intent_id)
            .cloned())
    }

    async fn create_pending(&self, payment: InsertPaymentEntity) -> Result<Option<PaymentEntity>> {
        let mut state = self.state.lock().unwrap();
        if state.payments.iter().any(|p| p.rental_id == payment.rental_id) {
            return Err(anyhow!("rental {} already has a payment", payment.rental_id));
        }

        let payable = state.rentals.iter().any(|r| {
            r.id == payment.rental_id
                && r.rental_payment_status() == Some(RentalPaymentStatus::Unpaid)
                && r.total_price == Some(payment.amount)
        });
        if !payable {
            return Ok(None);
        }

        let now = Utc::now();
        let created = PaymentEntity {
            id: Uuid::new_v4(),
            rental_id: payment.rental_id,
            stripe_payment_intent_id: payment.stripe_payment_intent_id,
            stripe_charge_id: None,
            amount: payment.amount,
            currency: payment.currency,
            status: payment.status,
            receipt_url: None,
            customer_email: payment.customer_email,
            failure_message: None,
            created_at: now,
            updated_at: now,
        };
        state.payments.push(created.clone());
        state.set_rental_payment_status(created.rental_id, RentalPaymentStatus::Pending);
        Ok(Some(created))
    }

    async fn replace_intent(
        &self,
        payment_id: Uuid,
        intent_id: String,
    ) -> Result<Option<PaymentEntity>> {
        let mut state = self.state.lock().unwrap();
        let payment = state.payment_mut(payment_id)?;
        if payment.payment_status() == Some(PaymentStatus::Succeeded) {
            return Ok(None);
        }
        payment.stripe_payment_intent_id = intent_id;
        payment.status = PaymentStatus::Pending.to_string();
        payment.failure_message = None;
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn mark_succeeded(&self, payment_id: Uuid) -> Result<PaymentEntity> {
        let mut state = self.state.lock().unwrap();
        let payment = state.payment_mut(payment_id)?;
        payment.status = PaymentStatus::Succeeded.to_string();
        payment.failure_message = None;
        payment.updated_at = Utc::now();
        let updated = payment.clone();

        state.set_rental_payment_status(updated.rental_id, RentalPaymentStatus::Paid);
        Ok(updated)
    }

    async fn mark_failed(
        &self,
        payment_id: Uuid,
        failure_message: String,
    ) -> Result<Option<PaymentEntity>> {
        let mut state = self.state.lock().unwrap();
        let payment = state.payment_mut(payment_id)?;
        if payment.payment_status() == Some(PaymentStatus::Succeeded) {
            return Ok(None);
        }
        payment.status = PaymentStatus::Failed.to_string();
        payment.failure_message = Some(failure_message);
        payment.updated_at = Utc::now();
        Ok(Some(payment.clone()))
    }

    async fn attach_charge(
        &self,
        payment_id: Uuid,
        charge_id: String,
        receipt_url: Option<String>,
    ) -> Result<PaymentEntity> {
        let mut state = self.state.lock().unwrap();
        let payment = state.payment_mut(payment_id)?;
        payment.stripe_charge_id = Some(charge_id);
        if receipt_url.is_some() {
            payment.receipt_url = receipt_url;
        }
        payment.updated_at = Utc::now();
        Ok(payment.clone())
    }

    async fn record_receipt(
        &self,
        payment_id: Uuid,
        charge_id: String,
        receipt_url: String,
    ) -> Result<PaymentEntity> {
        let mut state = self.state.lock().unwrap();
        let payment = state.payment_mut(payment_id)?;
        payment.stripe_charge_id = Some(charge_id);
        payment.receipt_url = Some(receipt_url);
        payment.status = PaymentStatus::Succeeded.to_string();
        payment.updated_at = Utc::now();
        let updated = payment.clone();

        state.set_rental_payment_status(updated.rental_id, RentalPaymentStatus::Paid);
        Ok(updated)
    }
}
