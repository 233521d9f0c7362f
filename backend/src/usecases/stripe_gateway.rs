use anyhow::Result as AnyResult;
use async_trait::async_trait;
use courtbook::payments::stripe_client::{
    CreatePaymentIntentRequest, CreatedPaymentIntent, StripeCharge, StripeClient, StripeEvent,
    StripePaymentIntent, WebhookVerificationError,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StripeGateway: Send + Sync {
    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> AnyResult<CreatedPaymentIntent>;

    async fn retrieve_payment_intent(&self, intent_id: &str) -> AnyResult<StripePaymentIntent>;

    async fn retrieve_charge(&self, charge_id: &str) -> AnyResult<StripeCharge>;

    fn construct_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, WebhookVerificationError>;
}

#[async_trait]
impl StripeGateway for StripeClient {
    async fn create_payment_intent(
        &self,
        request: CreatePaymentIntentRequest,
    ) -> AnyResult<CreatedPaymentIntent> {
        self.create_payment_intent(request).await
    }

    async fn retrieve_payment_intent(&self, intent_id: &str) -> AnyResult<StripePaymentIntent> {
        self.retrieve_payment_intent(intent_id).await
    }

    async fn retrieve_charge(&self, charge_id: &str) -> AnyResult<StripeCharge> {
        self.retrieve_charge(charge_id).await
    }

    fn construct_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, WebhookVerificationError> {
        self.construct_event(payload, signature)
    }
}
