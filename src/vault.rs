// Gateway customers and stored cards linked to host partners

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::AdapterError;
use crate::gateway::{CardRequest, CustomerRequest, PaymentGateway};
use crate::idempotency::{customer_reference, KeyKind};
use crate::model::{Partner, PaymentToken};
use crate::store::Context;

const CUSTOMER_REFERENCE_FALLBACK: &str = "CUST";

#[derive(Debug, Clone)]
pub struct CardTokenRequest {
    pub partner_id: String,
    pub card_nonce: String,
    /// Last digits reported by the card form, used when the gateway omits them.
    pub last_4: Option<String>,
    /// Mark the token verified right away.
    pub verify_validity: bool,
}

pub struct TokenVault {
    gateway: Arc<dyn PaymentGateway>,
    ctx: Context,
}

impl TokenVault {
    pub fn new(gateway: Arc<dyn PaymentGateway>, ctx: Context) -> Self {
        Self { gateway, ctx }
    }

    async fn partner(&self, partner_id: &str) -> Result<Partner, AdapterError> {
        self.ctx
            .partners
            .get_partner(partner_id)
            .await?
            .ok_or_else(|| AdapterError::NotFound(format!("partner {partner_id}")))
    }

    /// Store a partner handed over by the host, keeping a known gateway customer link.
    pub async fn register_partner(&self, mut partner: Partner) -> Result<(), AdapterError> {
        if partner.gateway_customer_id.is_none() {
            if let Some(current) = self.ctx.partners.get_partner(&partner.id).await? {
                partner.gateway_customer_id = current.gateway_customer_id;
            }
        }
        self.ctx.partners.save_partner(&partner).await
    }

    /// Gateway customer id of the partner, creating the customer on first use.
    #[instrument(skip(self))]
    pub async fn ensure_customer(&self, partner_id: &str) -> Result<String, AdapterError> {
        let mut partner = self.partner(partner_id).await?;
        if let Some(id) = partner.gateway_customer_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(id.to_string());
        }

        let (given_name, family_name) = partner.split_name();
        let prefix = if partner.address.country.is_empty() {
            CUSTOMER_REFERENCE_FALLBACK
        } else {
            partner.address.country.as_str()
        };
        let req = CustomerRequest {
            idempotency_key: KeyKind::Customer.generate(&partner.id),
            given_name,
            family_name,
            email: partner.email.clone(),
            address: partner.address.clone(),
            phone: partner.phone.clone(),
            reference_id: customer_reference(prefix, Utc::now().date_naive()),
            note: partner.note.clone().unwrap_or_default(),
        };
        let customer_id = self.gateway.create_customer(req).await?;

        partner.gateway_customer_id = Some(customer_id.clone());
        self.ctx.partners.save_partner(&partner).await?;
        info!(partner_id = %partner.id, customer_id = %customer_id, "Created gateway customer");
        Ok(customer_id)
    }

    /// Exchange a one-time card nonce for a stored card token.
    #[instrument(skip(self, req), fields(partner_id = %req.partner_id))]
    pub async fn create_card_token(&self, req: CardTokenRequest) -> Result<PaymentToken, AdapterError> {
        let customer_id = self.ensure_customer(&req.partner_id).await?;
        let partner = self.partner(&req.partner_id).await?;
        let profile = partner.billing_profile();

        let card = self
            .gateway
            .create_customer_card(CardRequest {
                idempotency_key: KeyKind::Card.generate(&partner.id),
                customer_id: customer_id.clone(),
                card_nonce: req.card_nonce,
                billing_address: profile.billing,
                cardholder_name: partner.name.clone(),
            })
            .await?;

        let last_4 = card.last_4.or(req.last_4).unwrap_or_default();
        let token = PaymentToken {
            id: Uuid::new_v4().to_string(),
            name: format!("XXXXXXXXXXXX{last_4}"),
            gateway_card_id: card.id,
            customer_id,
            partner_id: partner.id,
            verified: req.verify_validity,
        };
        self.ctx.tokens.save_token(&token).await?;
        info!(token_id = %token.id, "Stored card token");
        Ok(token)
    }

    /// Remove the gateway card, then the local token.
    #[instrument(skip(self))]
    pub async fn delete_token(&self, token_id: &str) -> Result<(), AdapterError> {
        let token = self
            .ctx
            .tokens
            .get_token(token_id)
            .await?
            .ok_or_else(|| AdapterError::NotFound(format!("payment token {token_id}")))?;

        if let Err(f) = self
            .gateway
            .delete_customer_card(&token.customer_id, &token.gateway_card_id)
            .await
        {
            warn!(token_id = %token_id, error = %f, "Gateway card deletion failed; keeping token");
            return Err(f.into());
        }
        self.ctx.tokens.delete_token(token_id).await
    }
}
