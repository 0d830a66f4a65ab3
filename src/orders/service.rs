use chrono::Utc;
use tokio::time::timeout;
use uuid::Uuid;

use crate::carts::{
    totals, CartError, CartItemsRepository, CartStatus, CartsRepository, ProductsRepository,
};
use crate::discounts::DiscountEngine;
use crate::inventory::InventoryRepository;
use crate::locks::MutationLocks;
use crate::money::Money;
use crate::orders::error::OrderError;
use crate::orders::models::{
    FulfillmentStatus, LineSnapshot, Order, OrderResponse, OrderStatus, PaymentStatus, RefundLine,
    TransitionRequest,
};
use crate::orders::repository::{NewOrder, NewOrderItem, OrdersRepository};
use crate::orders::status_machine::StatusMachine;
use crate::payments::{PaymentError, PaymentGateway, GATEWAY_TIMEOUT};

/// Service for the order lifecycle
///
/// Converts a finalized cart into an order, then drives the three status
/// axes through their transitions while keeping inventory counters
/// reconciled. Every transition runs under the order's mutation lock and
/// commits its side effects in one transaction; gateway calls happen before
/// the transaction opens so a timeout leaves the order untouched.
#[derive(Clone)]
pub struct OrderService<G> {
    pool: sqlx::PgPool,
    orders_repo: OrdersRepository,
    carts_repo: CartsRepository,
    cart_items_repo: CartItemsRepository,
    products_repo: ProductsRepository,
    discount_engine: DiscountEngine,
    gateway: G,
    locks: MutationLocks,
}

impl<G: PaymentGateway + Clone> OrderService<G> {
    /// Create a new OrderService
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: sqlx::PgPool,
        orders_repo: OrdersRepository,
        carts_repo: CartsRepository,
        cart_items_repo: CartItemsRepository,
        products_repo: ProductsRepository,
        discount_engine: DiscountEngine,
        gateway: G,
        locks: MutationLocks,
    ) -> Self {
        Self {
            pool,
            orders_repo,
            carts_repo,
            cart_items_repo,
            products_repo,
            discount_engine,
            gateway,
            locks,
        }
    }

    /// Convert a validated cart into an order
    ///
    /// The cart must be active, non-empty, have a destination, and carry
    /// fresh totals (callers route through the pricing API, which recomputes
    /// before handing over). Stock is reserved, not decremented, here — the
    /// decrement happens at payment confirmation so abandoned orders do not
    /// hold stock hostage. Reservation, order creation, and the cart status
    /// flip are one transaction.
    pub async fn checkout(&self, cart_id: Uuid) -> Result<OrderResponse, OrderError> {
        let _guard = self.locks.acquire(cart_id).await;

        let cart = self
            .carts_repo
            .find_by_id(cart_id)
            .await
            .map_err(OrderError::Cart)?
            .ok_or(OrderError::Cart(CartError::NotFound))?;
        if cart.is_expired(Utc::now()) {
            return Err(OrderError::Cart(CartError::Expired));
        }
        if cart.status != CartStatus::Active {
            return Err(OrderError::Cart(CartError::NotOpen(format!(
                "Cart is {}, not active",
                cart.status
            ))));
        }

        let items = self
            .cart_items_repo
            .find_by_cart_id(cart.id)
            .await
            .map_err(OrderError::Cart)?;
        if items.is_empty() {
            return Err(OrderError::Cart(CartError::Empty));
        }

        let cart_totals = cart.totals().map_err(OrderError::Cart)?;
        totals::verify_identity(&cart_totals).map_err(OrderError::Cart)?;

        let Some(destination) = cart.destination() else {
            return Err(OrderError::ValidationError(
                "Cart has no destination address; set one before checkout".to_string(),
            ));
        };
        let currency = cart.currency().map_err(OrderError::Cart)?;

        // Freeze catalog state into line snapshots before touching stock
        let mut new_items = Vec::with_capacity(items.len());
        for item in &items {
            let product = self
                .products_repo
                .find_by_id(item.product_id)
                .await
                .map_err(OrderError::Cart)?
                .ok_or(OrderError::Cart(CartError::ProductNotFound(
                    item.product_id,
                )))?;
            let (sku, attributes) = match item.variant_id {
                Some(variant_id) => {
                    let variant = self
                        .products_repo
                        .find_variant(product.id, variant_id)
                        .await
                        .map_err(OrderError::Cart)?
                        .ok_or(OrderError::Cart(CartError::VariantNotFound(variant_id)))?;
                    (variant.sku, variant.attributes)
                }
                None => (product.sku.clone(), serde_json::json!({})),
            };

            // The order's per-unit price folds add-ons in, so refunds can
            // price a returned unit from this one column
            let unit_price = item
                .unit_price_with_addons(currency)
                .map_err(OrderError::Cart)?;
            let line_total = item.line_total(currency).map_err(OrderError::Cart)?;

            new_items.push(NewOrderItem {
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price_minor: unit_price.amount_minor(),
                line_total_minor: line_total.amount_minor(),
                snapshot: LineSnapshot {
                    name: product.name.clone(),
                    sku,
                    image_url: product.image_url.clone(),
                    weight_grams: item.weight_grams,
                    attributes,
                },
            });
        }

        let new_order = NewOrder {
            user_id: cart.user_id,
            session_token: cart.session_token.clone(),
            cart_id: cart.id,
            currency: cart.currency.clone(),
            subtotal_minor: cart.subtotal_minor,
            discount_minor: cart.discount_minor,
            tax_minor: cart.tax_minor,
            shipping_minor: cart.shipping_minor,
            total_minor: cart.total_minor,
            ship_country: destination.country,
            ship_state: destination.state,
            ship_city: destination.city,
            ship_postal_code: destination.postal_code,
        };

        let mut tx = self.pool.begin().await?;
        for item in &items {
            InventoryRepository::reserve(
                &mut *tx,
                item.product_id,
                item.variant_id,
                item.quantity,
            )
            .await?;
        }
        let order = self.orders_repo.create(&mut tx, new_order, &new_items).await?;
        self.orders_repo.mark_cart_checked_out(&mut tx, cart.id).await?;
        tx.commit().await?;

        // Redemption counters are best-effort; a failure must not unwind a
        // committed order
        let codes = self
            .carts_repo
            .list_coupon_codes(cart.id)
            .await
            .unwrap_or_default();
        if let Err(e) = self.discount_engine.record_redemptions(&codes).await {
            tracing::warn!("Failed to record coupon redemptions for order {}: {}", order.id, e);
        }

        tracing::info!(
            "Created order {} from cart {} ({} lines, total {})",
            order.id,
            cart.id,
            items.len(),
            order.total_minor
        );

        let order_items = self.orders_repo.find_items_by_order_id(order.id).await?;
        Ok(OrderResponse::from_parts(order, order_items))
    }

    /// Get an order with its items
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderResponse, OrderError> {
        let order = self
            .orders_repo
            .find_by_id(order_id)
            .await?
            .ok_or(OrderError::NotFound)?;
        let items = self.orders_repo.find_items_by_order_id(order.id).await?;
        Ok(OrderResponse::from_parts(order, items))
    }

    /// Drive an order to a new status
    ///
    /// Policy is checked by the status machine against both the order and
    /// payment axes before any side effect runs; an out-of-policy request
    /// fails with `InvalidTransition` and changes nothing.
    pub async fn transition(
        &self,
        order_id: Uuid,
        request: TransitionRequest,
    ) -> Result<OrderResponse, OrderError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self
            .orders_repo
            .find_by_id(order_id)
            .await?
            .ok_or(OrderError::NotFound)?;

        if request.status == order.status {
            // Same-status no-op, except a confirmed-but-unpaid order being
            // handed its first payment
            if request.status == OrderStatus::Confirmed
                && !order.payment_status.is_captured()
                && request.payment_method.is_some()
            {
                return self.capture_payment(order, request.payment_method).await;
            }
            let items = self.orders_repo.find_items_by_order_id(order.id).await?;
            return Ok(OrderResponse::from_parts(order, items));
        }

        StatusMachine::transition(order.status, request.status, order.payment_status)
            .map_err(OrderError::InvalidTransition)?;

        match request.status {
            OrderStatus::Confirmed => self.confirm(order, request.payment_method).await,
            OrderStatus::Processing => self.advance_simple(order, OrderStatus::Processing).await,
            OrderStatus::Shipped => {
                self.ship(order, request.carrier, request.tracking_number).await
            }
            OrderStatus::Delivered => self.deliver(order).await,
            OrderStatus::Cancelled => self.cancel(order).await,
            OrderStatus::Refunded => self.apply_refund(order, None, None).await,
            OrderStatus::Pending => Err(OrderError::InvalidTransition(
                "Orders start at pending; nothing transitions back to it".to_string(),
            )),
        }
    }

    /// Refund part or all of a paid order
    ///
    /// With explicit lines, the amount derives from the refunded units and
    /// their inventory is released. With an amount only, money moves but
    /// goods stay counted as sold. With neither, the remaining balance is
    /// refunded and every not-yet-refunded unit restocked.
    pub async fn refund(
        &self,
        order_id: Uuid,
        amount_minor: Option<i64>,
        lines: Option<Vec<RefundLine>>,
    ) -> Result<OrderResponse, OrderError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self
            .orders_repo
            .find_by_id(order_id)
            .await?
            .ok_or(OrderError::NotFound)?;
        self.apply_refund(order, amount_minor, lines).await
    }

    /// Confirm an order, capturing payment when a method is provided
    ///
    /// Without a payment method the order confirms unpaid (deferred
    /// payment), leaving cancellation open and stock merely reserved.
    async fn confirm(
        &self,
        mut order: Order,
        payment_method: Option<String>,
    ) -> Result<OrderResponse, OrderError> {
        order.status = OrderStatus::Confirmed;
        order.confirmed_at = Some(Utc::now());

        match payment_method {
            Some(_) => self.capture_payment(order, payment_method).await,
            None => {
                let mut tx = self.pool.begin().await?;
                let saved = self.orders_repo.save_transition(&mut tx, &order).await?;
                tx.commit().await?;
                tracing::info!("Order {} confirmed (payment deferred)", saved.id);
                let items = self.orders_repo.find_items_by_order_id(saved.id).await?;
                Ok(OrderResponse::from_parts(saved, items))
            }
        }
    }

    /// Authorize the charge and, on the first successful capture, turn the
    /// stock reservation into a real decrement
    ///
    /// The gateway call runs before the transaction opens: a timeout or
    /// decline leaves the order's persisted state exactly as it was, apart
    /// from the payment axis being marked failed on a decline.
    async fn capture_payment(
        &self,
        mut order: Order,
        payment_method: Option<String>,
    ) -> Result<OrderResponse, OrderError> {
        let method = payment_method.ok_or_else(|| {
            OrderError::ValidationError("A payment method is required to capture".to_string())
        })?;
        let amount = order.total()?;
        let idempotency_key = Uuid::new_v4();

        let authorized = timeout(
            GATEWAY_TIMEOUT,
            self.gateway.authorize(amount, &method, idempotency_key),
        )
        .await
        .map_err(|_| OrderError::Payment(PaymentError::Timeout(GATEWAY_TIMEOUT)))?;

        let transaction_ref = match authorized {
            Ok(reference) => reference,
            Err(e) => {
                tracing::warn!("Payment for order {} failed: {}", order.id, e);
                self.orders_repo
                    .set_payment_status(order.id, PaymentStatus::Failed)
                    .await?;
                return Err(OrderError::Payment(e));
            }
        };

        order.status = OrderStatus::Confirmed;
        order.confirmed_at = order.confirmed_at.or_else(|| Some(Utc::now()));
        order.payment_status = PaymentStatus::Paid;
        order.transaction_ref = Some(transaction_ref);

        let items = self.orders_repo.find_items_by_order_id(order.id).await?;
        let mut tx = self.pool.begin().await?;
        for item in &items {
            InventoryRepository::commit(
                &mut *tx,
                item.product_id,
                item.variant_id,
                item.remaining_quantity(),
            )
            .await?;
        }
        let saved = self.orders_repo.save_transition(&mut tx, &order).await?;
        tx.commit().await?;

        tracing::info!("Order {} confirmed and paid ({} minor units)", saved.id, saved.total_minor);
        Ok(OrderResponse::from_parts(saved, items))
    }

    /// A transition with no side effects beyond the status write
    async fn advance_simple(
        &self,
        mut order: Order,
        to: OrderStatus,
    ) -> Result<OrderResponse, OrderError> {
        order.status = to;
        let mut tx = self.pool.begin().await?;
        let saved = self.orders_repo.save_transition(&mut tx, &order).await?;
        tx.commit().await?;
        let items = self.orders_repo.find_items_by_order_id(saved.id).await?;
        Ok(OrderResponse::from_parts(saved, items))
    }

    /// Mark the order shipped: fulfillment advances in lockstep and carrier
    /// tracking is recorded
    async fn ship(
        &self,
        mut order: Order,
        carrier: Option<String>,
        tracking_number: Option<String>,
    ) -> Result<OrderResponse, OrderError> {
        order.status = OrderStatus::Shipped;
        order.fulfillment_status = FulfillmentStatus::Shipped;
        order.shipped_at = Some(Utc::now());
        order.carrier = carrier;
        order.tracking_number = tracking_number;

        let items = self.orders_repo.find_items_by_order_id(order.id).await?;
        let mut tx = self.pool.begin().await?;
        for item in &items {
            // Full shipment of whatever was not refunded; the per-line
            // invariant shipped <= quantity - refunded holds by construction
            self.orders_repo
                .update_item_quantities(
                    &mut tx,
                    item.id,
                    item.refunded_quantity,
                    item.remaining_quantity(),
                )
                .await?;
        }
        let saved = self.orders_repo.save_transition(&mut tx, &order).await?;
        tx.commit().await?;

        tracing::info!(
            "Order {} shipped via {} ({})",
            saved.id,
            saved.carrier.as_deref().unwrap_or("unknown carrier"),
            saved.tracking_number.as_deref().unwrap_or("no tracking")
        );
        let items = self.orders_repo.find_items_by_order_id(saved.id).await?;
        Ok(OrderResponse::from_parts(saved, items))
    }

    async fn deliver(&self, mut order: Order) -> Result<OrderResponse, OrderError> {
        order.status = OrderStatus::Delivered;
        order.fulfillment_status = FulfillmentStatus::Delivered;
        order.delivered_at = Some(Utc::now());

        let mut tx = self.pool.begin().await?;
        let saved = self.orders_repo.save_transition(&mut tx, &order).await?;
        tx.commit().await?;
        let items = self.orders_repo.find_items_by_order_id(saved.id).await?;
        Ok(OrderResponse::from_parts(saved, items))
    }

    /// Cancel an unpaid order, releasing its reservations
    async fn cancel(&self, mut order: Order) -> Result<OrderResponse, OrderError> {
        order.status = OrderStatus::Cancelled;
        order.payment_status = PaymentStatus::Cancelled;
        order.cancelled_at = Some(Utc::now());

        let items = self.orders_repo.find_items_by_order_id(order.id).await?;
        let mut tx = self.pool.begin().await?;
        for item in &items {
            // Payment was never captured (the machine guarantees it), so
            // stock is still only reserved
            InventoryRepository::release(
                &mut *tx,
                item.product_id,
                item.variant_id,
                item.remaining_quantity(),
            )
            .await?;
        }
        let saved = self.orders_repo.save_transition(&mut tx, &order).await?;
        tx.commit().await?;

        tracing::info!("Order {} cancelled; reservations released", saved.id);
        Ok(OrderResponse::from_parts(saved, items))
    }

    /// Shared refund path for the refund API and the refunded transition
    async fn apply_refund(
        &self,
        mut order: Order,
        amount_minor: Option<i64>,
        lines: Option<Vec<RefundLine>>,
    ) -> Result<OrderResponse, OrderError> {
        if !order.payment_status.is_captured() {
            return Err(OrderError::RefundNotAllowed(
                "Order has no captured payment to refund".to_string(),
            ));
        }
        let transaction_ref = order.transaction_ref.clone().ok_or_else(|| {
            OrderError::RefundNotAllowed("Order has no transaction reference".to_string())
        })?;

        let items = self.orders_repo.find_items_by_order_id(order.id).await?;

        // Resolve the refund amount and which units get released
        let mut releases: Vec<(i32, i32, Option<i32>, i32, i32)> = Vec::new();
        let amount_minor = match &lines {
            Some(lines) if !lines.is_empty() => {
                let mut derived = 0i64;
                for line in lines {
                    let item = items
                        .iter()
                        .find(|i| i.id == line.order_item_id)
                        .ok_or_else(|| {
                            OrderError::ValidationError(format!(
                                "Order item {} not found",
                                line.order_item_id
                            ))
                        })?;
                    if line.quantity < 1 {
                        return Err(OrderError::ValidationError(
                            "Refund quantity must be at least 1".to_string(),
                        ));
                    }
                    if line.quantity > item.remaining_quantity() {
                        return Err(OrderError::ValidationError(format!(
                            "Refund quantity {} exceeds remaining {} on item {}",
                            line.quantity,
                            item.remaining_quantity(),
                            item.id
                        )));
                    }
                    derived += item.unit_price_minor * i64::from(line.quantity);
                    releases.push((
                        item.id,
                        item.product_id,
                        item.variant_id,
                        line.quantity,
                        item.refunded_quantity + line.quantity,
                    ));
                }
                derived
            }
            _ => match amount_minor {
                Some(amount) => amount,
                None => order.remaining_refundable_minor(),
            },
        };

        if amount_minor <= 0 {
            return Err(OrderError::ValidationError(
                "Refund amount must be positive".to_string(),
            ));
        }
        let remaining = order.remaining_refundable_minor();
        if amount_minor > remaining {
            return Err(OrderError::RefundExceedsTotal {
                requested: amount_minor,
                remaining,
            });
        }

        // Money moves before state does; the idempotency key keeps a retry
        // after an ambiguous failure from double-refunding
        let amount = Money::new(amount_minor, order.currency()?);
        let idempotency_key = Uuid::new_v4();
        let refund_ref = timeout(
            GATEWAY_TIMEOUT,
            self.gateway.refund(&transaction_ref, amount, idempotency_key),
        )
        .await
        .map_err(|_| OrderError::Payment(PaymentError::Timeout(GATEWAY_TIMEOUT)))?
        .map_err(OrderError::Payment)?;

        let (new_refunded, payment_status, fully_refunded) =
            refund_outcome(order.total_minor, order.refunded_amount_minor, amount_minor);
        order.refunded_amount_minor = new_refunded;
        order.payment_status = payment_status;
        if fully_refunded {
            order.status = OrderStatus::Refunded;
        }

        let mut tx = self.pool.begin().await?;
        if fully_refunded {
            // Release every unit not already refunded
            for item in &items {
                let quantity = item.remaining_quantity();
                if quantity > 0 {
                    InventoryRepository::restock(&mut *tx, item.product_id, item.variant_id, quantity)
                        .await?;
                }
                // shipped <= quantity - refunded forces shipped to zero once
                // the whole line is refunded
                self.orders_repo
                    .update_item_quantities(&mut tx, item.id, item.quantity, 0)
                    .await?;
            }
        } else {
            for (item_id, product_id, variant_id, quantity, new_refunded) in &releases {
                InventoryRepository::restock(&mut *tx, *product_id, *variant_id, *quantity).await?;
                let item = items.iter().find(|i| i.id == *item_id);
                let shipped = item
                    .map(|i| i.shipped_quantity.min(i.quantity - new_refunded))
                    .unwrap_or(0);
                self.orders_repo
                    .update_item_quantities(&mut tx, *item_id, *new_refunded, shipped.max(0))
                    .await?;
            }
        }
        let saved = self.orders_repo.save_transition(&mut tx, &order).await?;
        tx.commit().await?;

        tracing::info!(
            "Refunded {} minor units on order {} (ref {}, cumulative {}/{})",
            amount_minor,
            saved.id,
            refund_ref,
            saved.refunded_amount_minor,
            saved.total_minor
        );
        let items = self.orders_repo.find_items_by_order_id(saved.id).await?;
        Ok(OrderResponse::from_parts(saved, items))
    }
}

/// Fold a refund into the payment axis
///
/// Reaching the order total flips payment to refunded (and the caller moves
/// the order status with it); anything short of the total is a partial
/// refund that leaves the order status untouched.
fn refund_outcome(
    total_minor: i64,
    refunded_so_far: i64,
    amount_minor: i64,
) -> (i64, PaymentStatus, bool) {
    let new_refunded = refunded_so_far + amount_minor;
    if new_refunded >= total_minor {
        (new_refunded, PaymentStatus::Refunded, true)
    } else {
        (new_refunded, PaymentStatus::PartiallyRefunded, false)
    }
}
