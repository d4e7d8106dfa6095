//! Storefront client orchestrator.
//!
//! Ties the read models, the channel resolver, and the chat session
//! together: every read-model change re-runs the resolver, and a
//! descriptor change drives the synchronizer (leave old room, join new,
//! re-fetch history over REST). A background loop keeps the read models
//! eventually consistent with the server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::chat::sync::ChatSession;
use crate::chat::transport::ChatTransport;
use crate::config::StorefrontConfig;
use crate::error::{ChatError, CommerceError};
use crate::ledger::LedgerEvaluation;
use crate::model::{
    ChannelDescriptor, ChatMessage, Order, PaymentMethod, Quotation, QuotationStatus,
};
use crate::quotation::QuoteDecision;
use crate::{channel, order};

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// The customer's server-derived state, refreshed as a whole.
#[derive(Default)]
struct ReadModels {
    cart: Option<Quotation>,
    quotations: Vec<Quotation>,
    orders: Vec<Order>,
}

/// A resolver decision that changed the active entity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSwitch {
    pub previous: Option<ChannelDescriptor>,
    pub current: Option<ChannelDescriptor>,
}

// ---------------------------------------------------------------------------
// Storefront
// ---------------------------------------------------------------------------

/// One customer's storefront client session.
pub struct Storefront {
    config: StorefrontConfig,
    api: ApiClient,
    models: Mutex<ReadModels>,
    session: Mutex<ChatSession>,
    refresh_running: AtomicBool,
    shutdown: CancellationToken,
}

impl Storefront {
    pub fn new(
        config: StorefrontConfig,
        transport: Box<dyn ChatTransport>,
    ) -> Result<Self, CommerceError> {
        let api = ApiClient::new(&config.base_url, &config.api_key)?;
        let session = ChatSession::new(transport, &config.customer_id);
        Ok(Self {
            config,
            api,
            models: Mutex::new(ReadModels::default()),
            session: Mutex::new(session),
            refresh_running: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn customer_id(&self) -> &str {
        &self.config.customer_id
    }

    /// Currently selected chat channel, if any.
    pub fn active_channel(&self) -> Option<ChannelDescriptor> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .channel()
            .cloned()
    }

    /// Snapshot of the active channel's messages, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .messages()
            .to_vec()
    }

    // -----------------------------------------------------------------------
    // Read-model application & channel resolution
    // -----------------------------------------------------------------------

    /// Install fresh read models, re-run the resolver, and drive the
    /// chat session on a descriptor change. Synchronous — history
    /// refetch is the caller's follow-up when a switch is returned.
    fn apply_read_models(
        &self,
        cart: Option<Quotation>,
        quotations: Vec<Quotation>,
        orders: Vec<Order>,
    ) -> Option<ChannelSwitch> {
        let resolved = channel::resolve_active_channel(cart.as_ref(), &quotations, &orders);

        {
            let mut models = self.models.lock().unwrap_or_else(|e| e.into_inner());
            models.cart = cart;
            models.quotations = quotations;
            models.orders = orders;
        }

        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let previous = session.channel().cloned();
        let switched = session.set_channel(resolved.clone());
        if switched {
            info!(
                previous = ?previous.as_ref().map(|c| c.entity_id.as_str()),
                current = ?resolved.as_ref().map(|c| c.entity_id.as_str()),
                "Active chat channel changed"
            );
            Some(ChannelSwitch {
                previous,
                current: resolved,
            })
        } else {
            None
        }
    }

    /// Fetch all three read models from the server and re-resolve. On a
    /// channel switch the new room's history is re-fetched immediately.
    pub async fn refresh(&self) -> Result<Option<ChannelSwitch>, CommerceError> {
        let cart = self.api.fetch_or_create_cart().await?;
        let quotations = self.api.my_quotations().await?;
        let orders = self.api.my_orders().await?;

        let switch = self.apply_read_models(Some(cart), quotations, orders);
        if let Some(ref switch) = switch {
            if let Some(current) = &switch.current {
                self.reload_history(&current.entity_id).await?;
            }
        }
        Ok(switch)
    }

    async fn reload_history(&self, entity_id: &str) -> Result<(), CommerceError> {
        let history = self.api.message_history(entity_id).await?;
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .load_history(history);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Chat
    // -----------------------------------------------------------------------

    /// Connect the chat transport and load history for the selected
    /// channel.
    pub async fn connect_chat(&self) -> Result<(), CommerceError> {
        let joined = {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session.connect()?;
            session.channel().map(|c| c.entity_id.clone())
        };
        if let Some(entity_id) = joined {
            self.reload_history(&entity_id).await?;
        }
        Ok(())
    }

    /// Drain inbound chat events. A lost connection is recovered locally
    /// — reconnect, re-join, re-fetch history — and never surfaces as a
    /// fatal error.
    pub async fn pump_chat(&self) -> Result<usize, CommerceError> {
        let result = {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session.pump()
        };
        match result {
            Ok(n) => Ok(n),
            Err(ChatError::ConnectionLost(reason)) => {
                warn!(reason = %reason, "Chat connection lost; rejoining");
                let rejoined = {
                    let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
                    session.reconnect()?;
                    session.channel().map(|c| c.entity_id.clone())
                };
                if let Some(entity_id) = rejoined {
                    // The live stream only carries post-join messages;
                    // completeness comes from the REST history.
                    self.reload_history(&entity_id).await?;
                }
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Optimistically send a chat message on the active channel.
    pub fn send_chat_message(&self, body: &str) -> Result<ChatMessage, CommerceError> {
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        Ok(session.send(body)?)
    }

    /// Explicitly retry unconfirmed messages.
    pub fn retry_pending_messages(&self) -> usize {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retry_pending()
    }

    // -----------------------------------------------------------------------
    // Customer actions
    // -----------------------------------------------------------------------

    /// Submit the active cart for pricing. The empty-cart check runs
    /// client-side before any network call.
    pub async fn submit_cart(&self) -> Result<Quotation, CommerceError> {
        let cart_id = {
            let models = self.models.lock().unwrap_or_else(|e| e.into_inner());
            let cart = models
                .cart
                .as_ref()
                .ok_or_else(|| CommerceError::Api("no active cart".into()))?;
            if cart.status != QuotationStatus::Cart {
                return Err(CommerceError::IllegalTransition {
                    entity: "quotation",
                    from: cart.status.to_string(),
                    attempted: QuotationStatus::Requested.to_string(),
                });
            }
            if cart.items.is_empty() {
                return Err(CommerceError::EmptyCart);
            }
            cart.id.clone()
        };

        let submitted = self.api.submit_quotation(&cart_id).await?;
        self.refresh().await?;
        Ok(submitted)
    }

    /// Decide on a quoted quotation. Approval promotes it to an order on
    /// the server; the refresh picks up both records.
    pub async fn decide_quotation(
        &self,
        quotation_id: &str,
        decision: QuoteDecision,
    ) -> Result<Quotation, CommerceError> {
        let decided = self.api.send_decision(quotation_id, decision).await?;
        self.refresh().await?;
        Ok(decided)
    }

    /// Record a payment, then evaluate the ledger against a **fresh**
    /// order fetch. Locally cached totals are advisory only; the fresh
    /// payment list is the sole input to the production gate.
    pub async fn pay_order(
        &self,
        order_id: &str,
        amount: f64,
        method: PaymentMethod,
    ) -> Result<(Order, LedgerEvaluation), CommerceError> {
        if amount <= 0.0 {
            return Err(CommerceError::InvalidAmount(amount));
        }
        self.api
            .record_order_payment(order_id, amount, method)
            .await?;

        // Never gate on the response of the write — re-read.
        let fresh = self.api.get_order(order_id).await?;
        let eval = order::evaluate_ledger(&fresh);
        debug!(
            order_id = %fresh.id,
            paid = eval.paid,
            remaining = eval.remaining,
            production_eligible = eval.production_eligible,
            "Ledger evaluated after payment"
        );

        self.refresh().await?;
        Ok((fresh, eval))
    }

    // -----------------------------------------------------------------------
    // Background refresh loop
    // -----------------------------------------------------------------------

    /// Stop the background loop.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Start the background refresh loop: periodically re-fetch read models
/// (re-resolving the chat channel) and pump the chat transport. Returns
/// immediately; the loop runs until [`Storefront::shutdown`].
pub fn start_refresh_loop(storefront: Arc<Storefront>) {
    if storefront.refresh_running.swap(true, Ordering::SeqCst) {
        warn!("Refresh loop already running");
        return;
    }
    let interval_secs = storefront.config.refresh_interval_secs;
    let token = storefront.shutdown.clone();

    tokio::spawn(async move {
        info!(interval_secs, "Storefront refresh loop started");
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = storefront.refresh().await {
                warn!(error = %e, "Read-model refresh failed");
            }
            if let Err(e) = storefront.pump_chat().await {
                warn!(error = %e, "Chat pump failed");
            }
        }
        storefront.refresh_running.store(false, Ordering::SeqCst);
        info!("Storefront refresh loop stopped");
    });
}

// ===========================================================================
// Tests
// ===========================================================================
